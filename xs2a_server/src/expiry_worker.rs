use chrono::{Duration, Utc};
use log::*;
use tokio::task::JoinHandle;
use xs2a_engine::{traits::ExpiredAuthorisation, AuthorisationApi, SqliteDatabase};

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every `interval`, authorisations that were abandoned before reaching a final status are failed. Status-change
/// events are published for each of them by the API.
pub fn start_expiry_worker(api: AuthorisationApi<SqliteDatabase>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = interval.to_std().unwrap_or(std::time::Duration::from_secs(60));
        let mut timer = tokio::time::interval(period);
        info!("🕰️ Authorisation expiry worker started. Checking every {}s", period.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running authorisation expiry job");
            match api.expire_authorisations(Utc::now()).await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ No authorisations expired"),
                Ok(expired) => {
                    info!("🕰️ {} authorisations expired", expired.len());
                    debug!("🕰️ Expired authorisations: {}", authorisation_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running authorisation expiry job: {e}");
                },
            }
        }
    })
}

fn authorisation_list(expired: &[ExpiredAuthorisation]) -> String {
    expired
        .iter()
        .map(|e| {
            format!("[{}] {} (was {})", e.authorisation.id, e.authorisation.authorisation_type, e.previous_status)
        })
        .collect::<Vec<String>>()
        .join(", ")
}

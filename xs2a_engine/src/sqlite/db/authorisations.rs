use chrono::{DateTime, TimeZone, Utc};
use log::*;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    db_types::{Authorisation, AuthorisationId, NewAuthorisation, OpaqueState, PsuIdData, ScaMethod, ScaStatus},
    traits::{AuthorisationDbError, ExpiredAuthorisation, LeaseToken, ScaTransition},
};

impl FromRow<'_, SqliteRow> for Authorisation {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let psu = row
            .try_get::<Option<String>, _>("psu")?
            .map(|json| serde_json::from_str::<PsuIdData>(&json))
            .transpose()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let methods: String = row.try_get("available_sca_methods")?;
        let available_sca_methods =
            serde_json::from_str::<Vec<ScaMethod>>(&methods).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let opaque_state = match (
            row.try_get::<Option<Vec<u8>>, _>("opaque_state")?,
            row.try_get::<Option<String>, _>("opaque_state_provider")?,
        ) {
            (Some(data), Some(provider_id)) => Some(OpaqueState { data, provider_id }),
            _ => None,
        };
        Ok(Self {
            id: row.try_get("id")?,
            authorisation_type: row.try_get("authorisation_type")?,
            sca_status: row.try_get("sca_status")?,
            resource_id: row.try_get("resource_id")?,
            psu,
            chosen_sca_method: row.try_get("chosen_sca_method")?,
            available_sca_methods,
            opaque_state,
            explicit: row.try_get("explicit")?,
            periodic_payment: row.try_get("periodic_payment")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            expires_at: from_millis(row.try_get("expires_at")?)?,
        })
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, sqlx::Error> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| sqlx::Error::Decode(format!("{millis} is not a valid timestamp").into()))
}

/// Inserts a new authorisation in status `RECEIVED`. This is not atomic on its own; pass `&mut *tx` to embed it in a
/// transaction.
pub async fn insert_authorisation(
    authorisation: NewAuthorisation,
    conn: &mut SqliteConnection,
) -> Result<Authorisation, AuthorisationDbError> {
    let id = authorisation.id.clone();
    let psu = authorisation.psu.as_ref().map(serde_json::to_string).transpose()?;
    let result = sqlx::query_as(
        r#"
            INSERT INTO authorisations (
                id,
                authorisation_type,
                sca_status,
                resource_id,
                psu,
                explicit,
                periodic_payment,
                created_at,
                updated_at,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(authorisation.id)
    .bind(authorisation.authorisation_type)
    .bind(ScaStatus::Received)
    .bind(authorisation.resource_id)
    .bind(psu)
    .bind(authorisation.explicit)
    .bind(authorisation.periodic_payment)
    .bind(authorisation.created_at)
    .bind(authorisation.created_at)
    .bind(authorisation.expires_at.timestamp_millis())
    .fetch_one(conn)
    .await;
    match result {
        Ok(authorisation) => Ok(authorisation),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AuthorisationDbError::AlreadyExists(id)),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_authorisation(
    id: &AuthorisationId,
    conn: &mut SqliteConnection,
) -> Result<Option<Authorisation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM authorisations WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await
}

pub async fn fetch_authorisations_for_resource(
    resource_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Authorisation>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM authorisations WHERE resource_id = $1 ORDER BY created_at ASC")
        .bind(resource_id)
        .fetch_all(conn)
        .await
}

/// Claims the lease if nobody holds it or the current holder's lease ran out. Returns `false` if someone else holds a
/// live lease, or the authorisation does not exist.
pub async fn try_acquire_lease(
    id: &AuthorisationId,
    token: &LeaseToken,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE authorisations SET lease_token = $1, lease_expires_at = $2
            WHERE id = $3 AND (lease_token IS NULL OR lease_expires_at <= $4)
        "#,
    )
    .bind(token.as_str())
    .bind(expires_at.timestamp_millis())
    .bind(id.as_str())
    .bind(now.timestamp_millis())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Moves the lease's expiry to `expires_at`. Returns `false` if `token` no longer holds the lease.
pub async fn renew_lease(
    id: &AuthorisationId,
    token: &LeaseToken,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE authorisations SET lease_expires_at = $1 WHERE id = $2 AND lease_token = $3")
        .bind(expires_at.timestamp_millis())
        .bind(id.as_str())
        .bind(token.as_str())
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release_lease(
    id: &AuthorisationId,
    token: &LeaseToken,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE authorisations SET lease_token = NULL, lease_expires_at = NULL WHERE id = $1 AND lease_token = $2",
    )
    .bind(id.as_str())
    .bind(token.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Writes the new status, the opaque state and the other step results in a single statement, and clears the lease.
///
/// Nothing is written unless `token` still holds the lease and the stored status is the transition's starting status.
/// Returns `None` in that case.
pub async fn apply_transition(
    id: &AuthorisationId,
    token: &LeaseToken,
    transition: ScaTransition,
    conn: &mut SqliteConnection,
) -> Result<Option<Authorisation>, AuthorisationDbError> {
    let (from, to) = (transition.from_status(), transition.to_status());
    let psu = transition.psu.as_ref().map(serde_json::to_string).transpose()?;
    let methods = transition.available_sca_methods.as_ref().map(serde_json::to_string).transpose()?;
    let (state, provider) = match transition.opaque_state {
        Some(OpaqueState { data, provider_id }) => (Some(data), Some(provider_id)),
        None => (None, None),
    };
    let updated = sqlx::query_as(
        r#"
            UPDATE authorisations SET
                sca_status = $1,
                psu = COALESCE($2, psu),
                chosen_sca_method = COALESCE($3, chosen_sca_method),
                available_sca_methods = COALESCE($4, available_sca_methods),
                opaque_state = COALESCE($5, opaque_state),
                opaque_state_provider = COALESCE($6, opaque_state_provider),
                lease_token = NULL,
                lease_expires_at = NULL,
                updated_at = $7
            WHERE id = $8 AND lease_token = $9 AND sca_status = $10
            RETURNING *;
        "#,
    )
    .bind(to)
    .bind(psu)
    .bind(transition.chosen_sca_method)
    .bind(methods)
    .bind(state)
    .bind(provider)
    .bind(Utc::now())
    .bind(id.as_str())
    .bind(token.as_str())
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

/// Live, unleased authorisations whose expiry time is not after `now`.
pub async fn fetch_expired_authorisations(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Authorisation>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT * FROM authorisations
            WHERE sca_status NOT IN ('FINALISED', 'EXEMPTED', 'FAILED')
              AND expires_at <= $1
              AND (lease_token IS NULL OR lease_expires_at <= $1)
        "#,
    )
    .bind(now.timestamp_millis())
    .fetch_all(conn)
    .await
}

/// Fails a single expired authorisation, provided it is still in `previous` and nobody has leased it meanwhile.
pub async fn expire_authorisation(
    id: &AuthorisationId,
    previous: ScaStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<ExpiredAuthorisation>, sqlx::Error> {
    let updated: Option<Authorisation> = sqlx::query_as(
        r#"
            UPDATE authorisations SET sca_status = $1, lease_token = NULL, lease_expires_at = NULL, updated_at = $2
            WHERE id = $3 AND sca_status = $4 AND (lease_token IS NULL OR lease_expires_at <= $5)
            RETURNING *;
        "#,
    )
    .bind(ScaStatus::Failed)
    .bind(Utc::now())
    .bind(id.as_str())
    .bind(previous)
    .bind(now.timestamp_millis())
    .fetch_optional(conn)
    .await?;
    if updated.is_none() {
        trace!("🗃️ Authorisation {id} changed before it could be expired");
    }
    Ok(updated.map(|authorisation| ExpiredAuthorisation { previous_status: previous, authorisation }))
}

use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use xs2a_engine::{
    certificate::CertificateValidator,
    crypto::{CryptoProviderRegistry, ResourceIdCodec},
    events::{EventHandlers, EventHooks, EventProducers, ScaStatusChangedEvent},
    AuthorisationApi,
    ScaFlowApi,
    SqliteDatabase,
};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    middleware::QwacMiddlewareFactory,
    routes::{health, ListAuthorisationsRoute, ScaStatusRoute, StartAuthorisationRoute, UpdatePsuDataRoute},
    sandbox::SandboxBank,
};

const EVENT_BUFFER_SIZE: usize = 128;

/// Everything the request handlers share, built once at start-up.
#[derive(Clone)]
pub struct ServerState {
    pub db: SqliteDatabase,
    pub codec: Arc<ResourceIdCodec>,
    pub validator: Arc<CertificateValidator>,
    pub producers: EventProducers,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let registry = CryptoProviderRegistry::new().map_err(|e| ServerError::InitializeError(e.to_string()))?;
    info!("🚀️ Crypto providers ready: {registry:?}");
    let codec = Arc::new(ResourceIdCodec::new(Arc::new(registry), config.server_key.clone()));
    let validator = Arc::new(config.trust.load_validator()?);
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, create_event_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let state = ServerState { db, codec, validator, producers };

    let expiry_api =
        AuthorisationApi::new(state.db.clone(), state.codec.clone(), config.sca_config(), state.producers.clone());
    let _ = start_expiry_worker(expiry_api, config.expiry_check_interval);

    let srv = create_server_instance(config, state)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, state: ServerState) -> Result<Server, ServerError> {
    let bind_address = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        let sca_config = config.sca_config();
        let authorisation_api =
            AuthorisationApi::new(state.db.clone(), state.codec.clone(), sca_config.clone(), state.producers.clone());
        let flow_api = ScaFlowApi::new(
            state.db.clone(),
            SandboxBank::new(),
            state.codec.clone(),
            sca_config,
            state.producers.clone(),
        );
        let qwac_gate = QwacMiddlewareFactory::new(state.validator.clone(), ServerOptions::from_config(&config));
        let v1_scope = web::scope("/v1")
            .wrap(qwac_gate)
            .service(StartAuthorisationRoute::<SqliteDatabase>::new())
            .service(ListAuthorisationsRoute::<SqliteDatabase>::new())
            .service(UpdatePsuDataRoute::<SqliteDatabase, SandboxBank>::new())
            .service(ScaStatusRoute::<SqliteDatabase>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("xs2a::access_log"))
            .app_data(web::Data::new(authorisation_api))
            .app_data(web::Data::new(flow_api))
            .service(health)
            .service(v1_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind(bind_address)?
    .run();
    Ok(srv)
}

fn create_event_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks.on_sca_status_changed(|ev: ScaStatusChangedEvent| {
        Box::pin(async move {
            if ev.is_final() {
                info!(
                    "📬️ {} authorisation {} finished in status {} (was {})",
                    ev.authorisation_type, ev.authorisation_id, ev.new_status, ev.old_status
                );
            } else {
                debug!("📬️ Authorisation {} moved from {} to {}", ev.authorisation_id, ev.old_status, ev.new_status);
            }
        })
    });
    hooks
}

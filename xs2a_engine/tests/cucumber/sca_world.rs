use std::sync::Arc;

use cucumber::World;
use log::*;
use xs2a_common::Secret;
use xs2a_engine::{
    certificate::TppIdentity,
    crypto::{CryptoProviderRegistry, ResourceIdCodec},
    db_types::AuthorisationId,
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    AuthorisationApi,
    AuthorisationResult,
    ScaConfig,
    ScaError,
    ScaFlowApi,
    SqliteDatabase,
};

use crate::cucumber::ScriptedBank;

#[derive(Default, Debug, World)]
pub struct ScaWorld {
    pub system: Option<ScaSystem>,
    pub tpp: Option<TppIdentity>,
    pub resource_id: Option<String>,
    pub authorisation_id: Option<AuthorisationId>,
    pub last_result: Option<AuthorisationResult>,
    pub last_error: Option<ScaError>,
}

#[derive(Debug)]
pub struct ScaSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub codec: Arc<ResourceIdCodec>,
    pub bank: ScriptedBank,
    pub authorisations: AuthorisationApi<SqliteDatabase>,
    pub flow: ScaFlowApi<SqliteDatabase, ScriptedBank>,
}

impl ScaWorld {
    pub fn system(&self) -> &ScaSystem {
        self.system.as_ref().expect("System not initialised")
    }

    pub fn tpp(&self) -> &TppIdentity {
        self.tpp.as_ref().expect("No TPP has been set up")
    }

    pub fn authorisation_id(&self) -> &AuthorisationId {
        self.authorisation_id.as_ref().expect("No authorisation has been started")
    }

    pub fn record(&mut self, result: Result<AuthorisationResult, ScaError>) {
        match result {
            Ok(result) => {
                self.last_result = Some(result);
                self.last_error = None;
            },
            Err(e) => {
                debug!("🔄️ Request rejected: {e}");
                self.last_error = Some(e);
            },
        }
    }
}

impl ScaSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 1).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let registry = Arc::new(CryptoProviderRegistry::new().expect("Error creating crypto registry"));
        let codec = Arc::new(ResourceIdCodec::new(registry, Secret::new("cucumber-server-key".to_string())));
        let bank = ScriptedBank::default();
        let config = ScaConfig::default();
        let authorisations =
            AuthorisationApi::new(db.clone(), codec.clone(), config.clone(), EventProducers::default());
        let flow = ScaFlowApi::new(db.clone(), bank.clone(), codec.clone(), config, EventProducers::default());
        Self { db_path: url, db, codec, bank, authorisations, flow }
    }
}

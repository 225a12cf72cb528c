use std::sync::Arc;

use actix_web::{
    body::to_bytes,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    App,
};
use log::debug;
use serde_json::Value;
use xs2a_common::Secret;
use xs2a_engine::{
    certificate::{decode_certificate_bundle, BlockedSet, CertificateValidator},
    crypto::{CryptoProviderRegistry, ResourceIdCodec},
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{AuthorisationManagement, CoreBankingSpi},
    AuthorisationApi,
    ScaConfig,
    ScaFlowApi,
    SqliteDatabase,
};

use crate::{
    config::{ServerConfig, ServerOptions},
    middleware::QwacMiddlewareFactory,
    routes::{health, ListAuthorisationsRoute, ScaStatusRoute, StartAuthorisationRoute, UpdatePsuDataRoute},
    sandbox::SandboxBank,
};

pub const TPP_QWAC: &str = include_str!("../../../xs2a_engine/tests/data/tpp_qwac.pem");
pub const ROGUE_QWAC: &str = include_str!("../../../xs2a_engine/tests/data/rogue_leaf.pem");
const ROOT_CA: &[u8] = include_bytes!("../../../xs2a_engine/tests/data/root_ca.pem");
const ISSUING_CA: &[u8] = include_bytes!("../../../xs2a_engine/tests/data/issuing_ca.pem");

/// The certificate as a TLS-terminating proxy would forward it: PEM with the line breaks removed.
pub fn qwac_header(pem: &str) -> (String, String) {
    (ServerConfig::default().qwac_header, pem.replace(['\r', '\n'], ""))
}

pub fn tpp_request(req: TestRequest) -> TestRequest {
    req.insert_header(qwac_header(TPP_QWAC))
}

pub fn validator() -> Arc<CertificateValidator> {
    let roots = decode_certificate_bundle(ROOT_CA).unwrap();
    let intermediates = decode_certificate_bundle(ISSUING_CA).unwrap();
    Arc::new(CertificateValidator::new(roots, intermediates, BlockedSet::new()))
}

/// Runs one request through the gateway's `/v1` scope and the health route, returning the status and JSON body.
pub async fn call_gateway<B, S>(
    authorisations: AuthorisationApi<B>,
    flow: ScaFlowApi<B, S>,
    req: TestRequest,
) -> (StatusCode, Value)
where
    B: AuthorisationManagement + 'static,
    S: CoreBankingSpi + 'static,
{
    let options = ServerOptions::from_config(&ServerConfig::default());
    let app = App::new()
        .app_data(web::Data::new(authorisations))
        .app_data(web::Data::new(flow))
        .service(health)
        .service(
            web::scope("/v1")
                .wrap(QwacMiddlewareFactory::new(validator(), options))
                .service(StartAuthorisationRoute::<B>::new())
                .service(ListAuthorisationsRoute::<B>::new())
                .service(UpdatePsuDataRoute::<B, S>::new())
                .service(ScaStatusRoute::<B>::new()),
        );
    let service = test::init_service(app).await;
    let (status, body) = match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let status = res.status();
            (status, test::read_body(res).await)
        },
        Err(e) => {
            debug!("Request was rejected by middleware: {e}");
            let res = e.error_response();
            let status = res.status();
            (status, to_bytes(res.into_body()).await.unwrap_or_default())
        },
    };
    let json = serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into()));
    (status, json)
}

/// A gateway backed by a fresh SQLite database.
pub struct TestGateway {
    pub db: SqliteDatabase,
    pub codec: Arc<ResourceIdCodec>,
}

impl TestGateway {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        let registry = Arc::new(CryptoProviderRegistry::new().unwrap());
        let codec = Arc::new(ResourceIdCodec::new(registry, Secret::new("endpoint-test-key".to_string())));
        Self { db, codec }
    }

    /// Mints the external id a TPP would have received for the bank's resource `id`.
    pub fn resource_id(&self, id: &str) -> String {
        self.codec.encrypt_id(id).unwrap()
    }

    pub fn authorisation_api(&self) -> AuthorisationApi<SqliteDatabase> {
        AuthorisationApi::new(self.db.clone(), self.codec.clone(), ScaConfig::default(), EventProducers::default())
    }

    pub fn flow_api<S: CoreBankingSpi>(&self, bank: S) -> ScaFlowApi<SqliteDatabase, S> {
        ScaFlowApi::new(self.db.clone(), bank, self.codec.clone(), ScaConfig::default(), EventProducers::default())
    }

    pub async fn send(&self, req: TestRequest) -> (StatusCode, Value) {
        self.send_with_bank(SandboxBank::new(), req).await
    }

    pub async fn send_with_bank<S: CoreBankingSpi + 'static>(&self, bank: S, req: TestRequest) -> (StatusCode, Value) {
        call_gateway(self.authorisation_api(), self.flow_api(bank), req).await
    }

    /// Starts an authorisation and returns its path.
    pub async fn start(&self, service: &str, resource_id: &str, psu: Option<&str>) -> String {
        let mut req = tpp_request(TestRequest::post().uri(&format!("/v1/{service}/{resource_id}/authorisations")));
        if let Some(psu) = psu {
            req = req.insert_header(("PSU-ID", psu));
        }
        let (status, body) = self.send(req).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["_links"]["scaStatus"]["href"].as_str().unwrap().to_string()
    }

    pub async fn update(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(tpp_request(TestRequest::put().uri(path).set_json(body))).await
    }
}

use std::sync::Arc;

use actix_web::{http::StatusCode, test::TestRequest};
use chrono::{Duration, Utc};
use serde_json::json;
use xs2a_common::Secret;
use xs2a_engine::{
    crypto::{CryptoProviderRegistry, ResourceIdCodec},
    db_types::{Authorisation, AuthorisationId, AuthorisationType, ScaStatus},
    events::EventProducers,
    traits::{AuthorisationDbError, AuthorisationLease, LeaseToken, SpiFailure, SpiFailureKind, SpiResponse},
    AuthorisationApi,
    ScaConfig,
    ScaFlowApi,
};

use super::{
    helpers::{call_gateway, tpp_request, TestGateway},
    mocks::{MockAuthorisationStore, MockBank},
};

#[actix_web::test]
async fn start_an_authorisation() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("consent-1");
    let req = tpp_request(TestRequest::post().uri(&format!("/v1/consents/{resource_id}/authorisations")));
    let (status, body) = gateway.send(req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["scaStatus"], "received");
    assert_eq!(body["authorisationType"], "AIS");
    let id = body["authorisationId"].as_str().unwrap();
    let href = format!("/v1/consents/{resource_id}/authorisations/{id}");
    assert_eq!(body["_links"]["updatePsuIdentification"]["href"], href.as_str());

    let req = tpp_request(TestRequest::get().uri(&format!("/v1/consents/{resource_id}/authorisations")));
    let (status, body) = gateway.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authorisationIds"], json!([id]));
}

#[actix_web::test]
async fn start_with_a_known_psu() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("payment-1");
    let req = tpp_request(TestRequest::post().uri(&format!("/v1/payments/{resource_id}/authorisations")))
        .insert_header(("PSU-ID", "PSU-Successful"))
        .set_json(json!({"periodicPayment": true}));
    let (status, body) = gateway.send(req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["_links"].get("updatePsuAuthentication").is_some());
    let id = AuthorisationId::from(body["authorisationId"].as_str().unwrap());
    let stored = gateway.authorisation_api().authorisation_for_resource(&resource_id, &id).await.unwrap();
    assert!(stored.periodic_payment);
    assert_eq!(stored.psu.unwrap().psu_id, "PSU-Successful");
}

#[actix_web::test]
async fn unknown_services_and_resources() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("consent-1");
    let req = tpp_request(TestRequest::post().uri(&format!("/v1/accounts/{resource_id}/authorisations")));
    let (status, body) = gateway.send(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SERVICE_INVALID");

    let req = tpp_request(TestRequest::post().uri("/v1/consents/not-an-encrypted-id/authorisations"));
    let (status, body) = gateway.send(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "RESOURCE_UNKNOWN");
}

#[actix_web::test]
async fn full_sca_with_method_selection() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("payment-1");
    let path = gateway.start("payments", &resource_id, Some("PSU-Successful")).await;

    let (status, body) = gateway.update(&path, json!({"psuData": {"password": "12345"}})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scaStatus"], "psuAuthenticated");
    assert_eq!(body["scaMethods"].as_array().unwrap().len(), 2);
    assert!(body["_links"].get("selectAuthenticationMethod").is_some());

    let (status, body) = gateway.update(&path, json!({"authenticationMethodId": "push"})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scaStatus"], "scaMethodSelected");
    assert_eq!(body["chosenScaMethod"]["authenticationMethodId"], "push");
    assert_eq!(body["challengeData"]["otpMaxLength"], 6);

    let (status, body) = gateway.update(&path, json!({"scaAuthenticationData": "123456"})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scaStatus"], "finalised");

    let (status, body) = gateway.send(tpp_request(TestRequest::get().uri(&path))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"scaStatus": "finalised"}));
}

#[actix_web::test]
async fn identification_then_authentication() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("consent-1");
    let path = gateway.start("consents", &resource_id, None).await;

    let req = tpp_request(TestRequest::put().uri(&path)).insert_header(("PSU-ID", "PSU-OneMethod"));
    let (status, body) = gateway.send(req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scaStatus"], "psuIdentified");

    let (status, body) = gateway.update(&path, json!({"psuData": {"password": "12345"}})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scaStatus"], "scaMethodSelected");
    assert_eq!(body["chosenScaMethod"]["authenticationMethodId"], "sms");
}

#[actix_web::test]
async fn exempted_psu() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("payment-1");
    let path = gateway.start("payments", &resource_id, Some("PSU-Exempted")).await;
    let (status, body) = gateway.update(&path, json!({"psuData": {"password": "12345"}})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scaStatus"], "exempted");
    assert!(body["_links"].get("authoriseTransaction").is_none());
}

#[actix_web::test]
async fn wrong_password_fails_the_authorisation() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("payment-1");
    let path = gateway.start("payments", &resource_id, Some("PSU-Successful")).await;
    let (status, body) = gateway.update(&path, json!({"psuData": {"password": "54321"}})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["scaStatus"], "failed");
    assert_eq!(body["tppMessages"][0]["code"], "PSU_CREDENTIALS_INVALID");

    let (status, body) = gateway.send(tpp_request(TestRequest::get().uri(&path))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scaStatus"], "failed");

    let (status, body) = gateway.update(&path, json!({"psuData": {"password": "12345"}})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "STATUS_INVALID");
}

#[actix_web::test]
async fn malformed_updates_are_rejected() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("consent-1");
    let path = gateway.start("consents", &resource_id, None).await;

    let body = json!({"authenticationMethodId": "sms", "scaAuthenticationData": "123456"});
    let (status, body) = gateway.update(&path, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "FORMAT_ERROR");

    let (status, body) = gateway.send(tpp_request(TestRequest::put().uri(&path))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("PSU-ID missing"));

    let (status, _) = gateway.update(&path, json!({"scaAuthenticationData": "123456"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = gateway.send(tpp_request(TestRequest::get().uri(&path))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scaStatus"], "received");
}

#[actix_web::test]
async fn authorisations_are_only_found_under_their_own_path() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("payment-1");
    let path = gateway.start("payments", &resource_id, None).await;
    let (status, _) = gateway.send(tpp_request(TestRequest::get().uri(&path.replace("payments", "consents")))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let other_resource = gateway.resource_id("payment-2");
    let (status, body) = gateway.send(tpp_request(TestRequest::get().uri(&path.replace(&resource_id, &other_resource)))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "RESOURCE_UNKNOWN");

    let unknown = format!("/v1/payments/{resource_id}/authorisations/no-such-authorisation");
    let (status, _) = gateway.send(tpp_request(TestRequest::get().uri(&unknown))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn core_banking_outage_is_a_bad_gateway() {
    let gateway = TestGateway::new().await;
    let resource_id = gateway.resource_id("consent-1");
    let path = gateway.start("consents", &resource_id, None).await;
    let mut bank = MockBank::new();
    bank.expect_identify_psu().times(1).returning(|_, _| {
        SpiResponse::failure(SpiFailure::new(SpiFailureKind::TechnicalFailure, "core banking is down"), vec![])
    });
    let req = tpp_request(TestRequest::put().uri(&path)).insert_header(("PSU-ID", "PSU-Successful"));
    let (status, body) = gateway.send_with_bank(bank, req).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["scaStatus"], "failed");
}

#[actix_web::test]
async fn concurrent_update_is_a_conflict() {
    let _ = env_logger::try_init();
    let (codec, resource_id, authorisation) = payment_authorisation();
    let mut reader = MockAuthorisationStore::new();
    let stored = authorisation.clone();
    reader.expect_fetch_authorisation().times(1).returning(move |_| Ok(Some(stored.clone())));
    let mut writer = MockAuthorisationStore::new();
    writer.expect_fetch_authorisation().times(1).returning(move |_| Ok(Some(authorisation.clone())));
    writer
        .expect_acquire_lease()
        .times(1)
        .returning(|id, _| Err(AuthorisationDbError::AuthorisationBusy(id.clone())));
    writer.expect_commit_transition().times(0);
    let mut bank = MockBank::new();
    bank.expect_identify_psu().times(0);

    let authorisations = AuthorisationApi::new(reader, codec.clone(), ScaConfig::default(), EventProducers::default());
    let flow = ScaFlowApi::new(writer, bank, codec, ScaConfig::default(), EventProducers::default());
    let req = tpp_request(TestRequest::put().uri(&format!("/v1/payments/{resource_id}/authorisations/auth-1")))
        .insert_header(("PSU-ID", "PSU-Successful"));
    let (status, body) = call_gateway(authorisations, flow, req).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "STATUS_INVALID");
}

/// A freshly started payment authorisation, as a mocked store would hand it out.
fn payment_authorisation() -> (Arc<ResourceIdCodec>, String, Authorisation) {
    let registry = Arc::new(CryptoProviderRegistry::new().unwrap());
    let codec = Arc::new(ResourceIdCodec::new(registry, Secret::new("endpoint-test-key".to_string())));
    let resource_id = codec.encrypt_id("payment-1").unwrap();
    let now = Utc::now();
    let authorisation = Authorisation {
        id: AuthorisationId::from("auth-1"),
        authorisation_type: AuthorisationType::Pis,
        sca_status: ScaStatus::Received,
        resource_id: resource_id.clone(),
        psu: None,
        chosen_sca_method: None,
        available_sca_methods: vec![],
        opaque_state: None,
        explicit: false,
        periodic_payment: false,
        created_at: now,
        updated_at: now,
        expires_at: now + Duration::minutes(30),
    };

    (codec, resource_id, authorisation)
}

#[actix_web::test]
async fn failed_commit_gives_the_lease_back() {
    let _ = env_logger::try_init();
    let (codec, resource_id, authorisation) = payment_authorisation();
    let mut reader = MockAuthorisationStore::new();
    let stored = authorisation.clone();
    reader.expect_fetch_authorisation().times(1).returning(move |_| Ok(Some(stored.clone())));
    let mut writer = MockAuthorisationStore::new();
    let stored = authorisation.clone();
    writer.expect_fetch_authorisation().times(1).returning(move |_| Ok(Some(stored.clone())));
    writer.expect_acquire_lease().times(1).returning(move |_, _| {
        Ok(AuthorisationLease {
            authorisation: authorisation.clone(),
            token: LeaseToken::from("lease-1".to_string()),
            expires_at: Utc::now() + Duration::seconds(60),
        })
    });
    writer
        .expect_commit_transition()
        .times(1)
        .returning(|_, _, _| Err(AuthorisationDbError::DatabaseError("disk I/O error".into())));
    writer
        .expect_release_lease()
        .withf(|id, token| id.as_str() == "auth-1" && token.as_str() == "lease-1")
        .times(1)
        .returning(|_, _| Ok(()));
    let mut bank = MockBank::new();
    bank.expect_identify_psu().times(1).returning(|_, _| SpiResponse::success(Default::default(), vec![]));

    let authorisations = AuthorisationApi::new(reader, codec.clone(), ScaConfig::default(), EventProducers::default());
    let flow = ScaFlowApi::new(writer, bank, codec, ScaConfig::default(), EventProducers::default());
    let req = tpp_request(TestRequest::put().uri(&format!("/v1/payments/{resource_id}/authorisations/auth-1")))
        .insert_header(("PSU-ID", "PSU-Successful"));
    let (status, body) = call_gateway(authorisations, flow, req).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "INTERNAL_SERVER_ERROR");
}

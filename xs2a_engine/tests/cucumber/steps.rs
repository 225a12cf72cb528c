use std::str::FromStr;

use chrono::{Duration, Utc};
use cucumber::{then, when};
use xs2a_common::Secret;
use xs2a_engine::{
    db_types::{AuthorisationType, PsuIdData, ScaStatus},
    traits::AuthorisationManagement,
    AuthorisationRequest,
    PsuDataUpdate,
    ScaError,
};

use crate::cucumber::ScaWorld;

#[when(expr = "the TPP starts a(n) {word} authorisation for {string}")]
async fn start_authorisation(world: &mut ScaWorld, authorisation_type: String, resource: String) {
    let authorisation_type = AuthorisationType::from_str(&authorisation_type).expect("Not an authorisation type");
    let resource_id = world.system().codec.encrypt_id(&resource).expect("Error minting resource id");
    let request = AuthorisationRequest::new(authorisation_type, resource_id.clone());
    let result = world.system().authorisations.create_authorisation(world.tpp(), request).await;
    if let Ok(result) = &result {
        world.authorisation_id = Some(result.authorisation_id.clone());
        world.resource_id = Some(resource_id);
    }
    world.record(result);
}

#[when(expr = "the PSU identifies as {string}")]
async fn identify(world: &mut ScaWorld, psu_id: String) {
    advance(world, PsuDataUpdate::PsuIdentification(PsuIdData::new(psu_id))).await;
}

#[when(expr = "the PSU authenticates with password {string}")]
async fn authenticate(world: &mut ScaWorld, password: String) {
    advance(world, PsuDataUpdate::Password { psu: None, password: Secret::new(password) }).await;
}

#[when(expr = "the PSU selects the SCA method {string}")]
async fn select_method(world: &mut ScaWorld, method_id: String) {
    advance(world, PsuDataUpdate::ScaMethodSelection(method_id)).await;
}

#[when(expr = "the PSU enters the code {string}")]
async fn enter_code(world: &mut ScaWorld, code: String) {
    advance(world, PsuDataUpdate::AuthenticationCode(Secret::new(code))).await;
}

#[when(expr = "another TPP with roles {string} identifies the PSU as {string}")]
async fn identify_as_other_tpp(world: &mut ScaWorld, roles: String, psu_id: String) {
    let roles = roles.split(',').map(|r| r.trim().parse().expect("Not a TPP role")).collect::<Vec<_>>();
    let tpp = xs2a_engine::certificate::TppIdentity::new("PSDDE-BAFIN-000002", roles);
    let update = PsuDataUpdate::PsuIdentification(PsuIdData::new(psu_id));
    let result = world.system().flow.advance_authorisation(world.authorisation_id(), &tpp, update).await;
    world.record(result);
}

#[when(expr = "{int} hours pass")]
async fn hours_pass(world: &mut ScaWorld, hours: i64) {
    let now = Utc::now() + Duration::hours(hours);
    world.system().authorisations.expire_authorisations(now).await.expect("Error expiring authorisations");
}

async fn advance(world: &mut ScaWorld, update: PsuDataUpdate) {
    let result = world.system().flow.advance_authorisation(world.authorisation_id(), world.tpp(), update).await;
    world.record(result);
}

#[then(expr = "the SCA status is {word}")]
async fn sca_status_is(world: &mut ScaWorld, status: String) {
    let expected = ScaStatus::from_str(&status).expect("Not an SCA status");
    let resource_id = world.resource_id.as_deref().expect("No resource id");
    let status =
        world.system().authorisations.sca_status(resource_id, world.authorisation_id()).await.expect("Error reading status");
    assert_eq!(status, expected);
}

#[then(expr = "the chosen SCA method is {string}")]
async fn chosen_method(world: &mut ScaWorld, method_id: String) {
    let authorisation = world
        .system()
        .db
        .fetch_authorisation(world.authorisation_id())
        .await
        .expect("Error fetching authorisation")
        .expect("Authorisation does not exist");
    assert_eq!(authorisation.chosen_sca_method.as_deref(), Some(method_id.as_str()));
}

#[then(expr = "the TPP is offered the SCA methods {string}")]
async fn offered_methods(world: &mut ScaWorld, methods: String) {
    let result = world.last_result.as_ref().expect("No result");
    let offered = result
        .available_sca_methods
        .as_ref()
        .expect("No methods offered")
        .iter()
        .map(|m| m.authentication_method_id.as_str())
        .collect::<Vec<_>>()
        .join(",");
    assert_eq!(offered, methods);
}

#[then(expr = "the request is rejected as {word}")]
async fn request_rejected(world: &mut ScaWorld, kind: String) {
    let err = world.last_error.as_ref().expect("The request was not rejected");
    let matched = match kind.as_str() {
        "WrongAuthorisationStage" => matches!(err, ScaError::WrongAuthorisationStage { .. }),
        "RoleNotPermitted" => matches!(err, ScaError::RoleNotPermitted { .. }),
        "FormatError" => matches!(err, ScaError::FormatError(_)),
        other => panic!("Unknown rejection {other}"),
    };
    assert!(matched, "Expected {kind}, got {err:?}");
}

#[then(expr = "the authorisation failed with {word}")]
async fn authorisation_failed(world: &mut ScaWorld, kind: String) {
    let result = world.last_result.as_ref().expect("No result");
    let err = result.error.as_ref().expect("The authorisation did not fail");
    let matched = match kind.as_str() {
        "PsuCredentialsInvalid" => matches!(err, ScaError::PsuCredentialsInvalid(_)),
        "ScaMethodUnknown" => matches!(err, ScaError::ScaMethodUnknown(_)),
        "CoreBankingFailure" => matches!(err, ScaError::CoreBankingFailure(_)),
        other => panic!("Unknown failure {other}"),
    };
    assert!(matched, "Expected {kind}, got {err:?}");
}

#[then(expr = "the bank was called {int} time(s)")]
async fn bank_calls(world: &mut ScaWorld, calls: usize) {
    assert_eq!(world.system().bank.script().calls, calls);
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use xs2a_common::Secret;
use xs2a_engine::{
    db_types::{AuthorisationId, AuthorisationType, ChallengeData, ScaMethod, ScaStatus},
    AuthorisationResult,
    NextStep,
};

use crate::errors::{sca_code, ServerError};

/// Optional body of a start-authorisation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartAuthorisationRequest {
    #[serde(default)]
    pub periodic_payment: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PsuPassword {
    pub password: Secret<String>,
}

/// Body of an update-PSU-data request. At most one field may be present; an empty body identifies the PSU from the
/// PSU-ID header.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePsuDataRequest {
    #[serde(default)]
    pub psu_data: Option<PsuPassword>,
    #[serde(default)]
    pub authentication_method_id: Option<String>,
    #[serde(default)]
    pub sca_authentication_data: Option<Secret<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TppMessage {
    pub category: String,
    pub code: String,
    pub text: String,
}

impl TppMessage {
    pub fn error<S: Into<String>, T: Into<String>>(code: S, text: T) -> Self {
        Self { category: "ERROR".into(), code: code.into(), text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorisationResponse {
    pub authorisation_id: AuthorisationId,
    pub authorisation_type: AuthorisationType,
    pub sca_status: ScaStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sca_methods: Option<Vec<ScaMethod>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_sca_method: Option<ScaMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_data: Option<ChallengeData>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub multilevel_sca_required: bool,
    #[serde(rename = "_links")]
    pub links: BTreeMap<String, Link>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tpp_messages: Vec<TppMessage>,
}

impl AuthorisationResponse {
    /// Builds the response for an authorisation at `base`, the path of the authorisation itself.
    pub fn from_result(result: AuthorisationResult, base: &str) -> Self {
        let mut links = BTreeMap::new();
        links.insert("scaStatus".to_string(), Link { href: base.to_string() });
        if let Some(name) = link_name(result.next_step) {
            links.insert(name.to_string(), Link { href: base.to_string() });
        }
        let tpp_messages = result
            .error
            .as_ref()
            .map(|e| vec![TppMessage::error(sca_code(e), e.to_string())])
            .unwrap_or_default();
        Self {
            authorisation_id: result.authorisation_id,
            authorisation_type: result.authorisation_type,
            sca_status: result.sca_status,
            sca_methods: result.available_sca_methods,
            chosen_sca_method: result.chosen_sca_method,
            challenge_data: result.challenge_data,
            multilevel_sca_required: result.multilevel_sca_required,
            links,
            tpp_messages,
        }
    }
}

fn link_name(next_step: NextStep) -> Option<&'static str> {
    match next_step {
        NextStep::UpdatePsuIdentification => Some("updatePsuIdentification"),
        NextStep::UpdatePsuAuthentication => Some("updatePsuAuthentication"),
        NextStep::UpdatePsuIdentificationAndAuthentication => Some("updatePsuIdentificationAndAuthentication"),
        NextStep::SelectAuthenticationMethod => Some("selectAuthenticationMethod"),
        NextStep::AuthoriseTransaction => Some("authoriseTransaction"),
        NextStep::None => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaStatusResponse {
    pub sca_status: ScaStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorisationListResponse {
    pub authorisation_ids: Vec<AuthorisationId>,
}

impl TryFrom<&[u8]> for UpdatePsuDataRequest {
    type Error = ServerError;

    fn try_from(body: &[u8]) -> Result<Self, Self::Error> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| ServerError::InvalidRequestBody(e.to_string()))
    }
}

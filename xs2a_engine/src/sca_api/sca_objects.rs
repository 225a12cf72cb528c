use std::fmt::Display;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use xs2a_common::Secret;

use crate::{
    db_types::{AuthorisationId, AuthorisationType, ChallengeData, PsuIdData, ScaMethod, ScaStatus},
    sca_api::ScaError,
};

/// Bank-side settings that shape the SCA flow.
#[derive(Debug, Clone)]
pub struct ScaConfig {
    pub signing_basket_supported: bool,
    /// How long a new authorisation may take before the expiry job fails it
    pub authorisation_ttl: Duration,
    /// How long an update's lease lasts without renewal. Updates renew it while they wait on the bank, so this only
    /// bounds how long a request that died mid-update keeps others out.
    pub lease_ttl: Duration,
}

impl Default for ScaConfig {
    fn default() -> Self {
        Self {
            signing_basket_supported: false,
            authorisation_ttl: Duration::minutes(30),
            lease_ttl: Duration::seconds(60),
        }
    }
}

/// A request to start a new authorisation for a consent, payment or basket.
#[derive(Debug, Clone)]
pub struct AuthorisationRequest {
    pub authorisation_type: AuthorisationType,
    /// The encrypted resource id, as handed to the TPP
    pub resource_id: String,
    /// The PSU, if the TPP already knows who it is
    pub psu: Option<PsuIdData>,
    pub tpp_explicit_preferred: bool,
    pub periodic_payment: bool,
}

impl AuthorisationRequest {
    pub fn new<S: Into<String>>(authorisation_type: AuthorisationType, resource_id: S) -> Self {
        Self {
            authorisation_type,
            resource_id: resource_id.into(),
            psu: None,
            tpp_explicit_preferred: false,
            periodic_payment: false,
        }
    }

    pub fn with_psu(mut self, psu: PsuIdData) -> Self {
        self.psu = Some(psu);
        self
    }

    pub fn with_explicit_preferred(mut self, preferred: bool) -> Self {
        self.tpp_explicit_preferred = preferred;
        self
    }

    pub fn with_periodic_payment(mut self, periodic: bool) -> Self {
        self.periodic_payment = periodic;
        self
    }
}

/// The data a PSU submits in one update. Exactly one kind of data per request.
#[derive(Debug, Clone)]
pub enum PsuDataUpdate {
    PsuIdentification(PsuIdData),
    /// The PSU may be identified again alongside the password, and must be if it was never identified before.
    Password { psu: Option<PsuIdData>, password: Secret<String> },
    ScaMethodSelection(String),
    AuthenticationCode(Secret<String>),
}

impl PsuDataUpdate {
    pub fn kind(&self) -> UpdateKind {
        match self {
            PsuDataUpdate::PsuIdentification(_) => UpdateKind::PsuIdentification,
            PsuDataUpdate::Password { .. } => UpdateKind::Password,
            PsuDataUpdate::ScaMethodSelection(_) => UpdateKind::ScaMethodSelection,
            PsuDataUpdate::AuthenticationCode(_) => UpdateKind::AuthenticationCode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    PsuIdentification,
    Password,
    ScaMethodSelection,
    AuthenticationCode,
}

impl Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateKind::PsuIdentification => write!(f, "PSU identification"),
            UpdateKind::Password => write!(f, "PSU password"),
            UpdateKind::ScaMethodSelection => write!(f, "SCA method selection"),
            UpdateKind::AuthenticationCode => write!(f, "authentication code"),
        }
    }
}

/// What the TPP should send next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NextStep {
    UpdatePsuIdentification,
    UpdatePsuAuthentication,
    /// The bank wants the PSU identification repeated together with the password.
    UpdatePsuIdentificationAndAuthentication,
    SelectAuthenticationMethod,
    AuthoriseTransaction,
    None,
}

impl NextStep {
    pub fn for_status(status: ScaStatus, psu_known: bool) -> Self {
        match status {
            ScaStatus::Received if psu_known => NextStep::UpdatePsuAuthentication,
            ScaStatus::Received => NextStep::UpdatePsuIdentification,
            ScaStatus::PsuIdentified => NextStep::UpdatePsuAuthentication,
            ScaStatus::PsuAuthenticated => NextStep::SelectAuthenticationMethod,
            ScaStatus::ScaMethodSelected => NextStep::AuthoriseTransaction,
            ScaStatus::Finalised | ScaStatus::Exempted | ScaStatus::Failed => NextStep::None,
        }
    }
}

/// The state of an authorisation after a create or update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorisationResult {
    pub authorisation_id: AuthorisationId,
    pub authorisation_type: AuthorisationType,
    pub sca_status: ScaStatus,
    /// Offered when the PSU has to pick a method
    pub available_sca_methods: Option<Vec<ScaMethod>>,
    pub chosen_sca_method: Option<ScaMethod>,
    pub challenge_data: Option<ChallengeData>,
    pub next_step: NextStep,
    pub multilevel_sca_required: bool,
    pub explicit: bool,
    /// Why the authorisation failed, when `sca_status` is `FAILED`
    pub error: Option<ScaError>,
}

impl AuthorisationResult {
    pub fn is_failed(&self) -> bool {
        self.sca_status == ScaStatus::Failed
    }
}

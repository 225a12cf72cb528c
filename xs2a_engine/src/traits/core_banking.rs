use std::fmt::Display;

use serde::{Deserialize, Serialize};
use xs2a_common::Secret;

use crate::db_types::{AuthorisationId, AuthorisationType, ChallengeData, PsuIdData, ScaMethod};

/// What the bank is told about the authorisation a call belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiContext {
    pub authorisation_id: AuthorisationId,
    pub authorisation_type: AuthorisationType,
    /// The bank's own (decrypted) id for the consent, payment or basket
    pub resource_id: String,
    pub psu: PsuIdData,
    /// The calling TPP's authorisation number, from its certificate
    pub tpp_authorisation_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpiFailureKind {
    /// The request was understood and refused, e.g. insufficient funds.
    LogicalFailure,
    /// The bank could not be reached or failed internally.
    TechnicalFailure,
    /// The PSU's credentials or authorisation code were rejected.
    Unauthorized,
    /// The bank does not offer this operation.
    NotSupported,
}

impl Display for SpiFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpiFailureKind::LogicalFailure => write!(f, "LOGICAL_FAILURE"),
            SpiFailureKind::TechnicalFailure => write!(f, "TECHNICAL_FAILURE"),
            SpiFailureKind::Unauthorized => write!(f, "UNAUTHORIZED"),
            SpiFailureKind::NotSupported => write!(f, "NOT_SUPPORTED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpiFailure {
    pub kind: SpiFailureKind,
    pub message: String,
}

impl SpiFailure {
    pub fn new<S: Into<String>>(kind: SpiFailureKind, message: S) -> Self {
        Self { kind, message: message.into() }
    }
}

impl Display for SpiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The outcome of a core-banking call together with the opaque state the bank wants stored for the next call.
///
/// `consent_data` is returned whether or not the call succeeded; the bank may use it to count failed attempts.
#[derive(Debug, Clone)]
pub struct SpiResponse<T> {
    pub payload: Result<T, SpiFailure>,
    pub consent_data: Secret<Vec<u8>>,
}

impl<T> SpiResponse<T> {
    pub fn success(payload: T, consent_data: Vec<u8>) -> Self {
        Self { payload: Ok(payload), consent_data: Secret::new(consent_data) }
    }

    pub fn failure(failure: SpiFailure, consent_data: Vec<u8>) -> Self {
        Self { payload: Err(failure), consent_data: Secret::new(consent_data) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpiPsuIdentification {
    /// The bank wants the password in the same step as the identification.
    pub combined_authentication: bool,
    pub multilevel_sca_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiAuthenticationStatus {
    Success,
    /// The credentials were checked and found wrong.
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiPsuAuthentication {
    pub status: SpiAuthenticationStatus,
    pub sca_exempted: bool,
    pub multilevel_sca_required: bool,
}

impl SpiPsuAuthentication {
    pub fn success() -> Self {
        Self { status: SpiAuthenticationStatus::Success, sca_exempted: false, multilevel_sca_required: false }
    }

    pub fn failure() -> Self {
        Self { status: SpiAuthenticationStatus::Failure, sca_exempted: false, multilevel_sca_required: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpiAvailableScaMethods {
    pub methods: Vec<ScaMethod>,
    pub sca_exempted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpiAuthorisationCode {
    pub challenge_data: Option<ChallengeData>,
    pub sca_exempted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiExecution {
    /// The status of the consent or payment after execution, in the bank's vocabulary (e.g. `valid`, `ACCP`).
    pub resource_status: String,
}

/// The bank's half of the SCA protocol.
///
/// Implementations are expected to talk to slow remote systems. The engine never retries a call, so any retry policy
/// belongs inside the implementation. `consent_data` is the plaintext opaque state from the previous call (empty on
/// the first call) and is never logged by the engine.
#[allow(async_fn_in_trait)]
pub trait CoreBankingSpi {
    async fn identify_psu(&self, ctx: &SpiContext, consent_data: &[u8]) -> SpiResponse<SpiPsuIdentification>;

    async fn authenticate_psu(
        &self,
        ctx: &SpiContext,
        password: &Secret<String>,
        consent_data: &[u8],
    ) -> SpiResponse<SpiPsuAuthentication>;

    async fn list_available_sca_methods(
        &self,
        ctx: &SpiContext,
        consent_data: &[u8],
    ) -> SpiResponse<SpiAvailableScaMethods>;

    async fn request_authorisation_code(
        &self,
        ctx: &SpiContext,
        method_id: &str,
        consent_data: &[u8],
    ) -> SpiResponse<SpiAuthorisationCode>;

    /// Checks the one-time code and, if it is right, marks the consent valid or executes the payment.
    async fn verify_code_and_execute(
        &self,
        ctx: &SpiContext,
        code: &Secret<String>,
        consent_data: &[u8],
    ) -> SpiResponse<SpiExecution>;

    async fn execute_without_sca(&self, ctx: &SpiContext, consent_data: &[u8]) -> SpiResponse<SpiExecution>;
}

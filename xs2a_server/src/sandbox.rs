//! An in-memory core banking system for development and demos.
//!
//! | PSU            | Behaviour                                          |
//! |----------------|----------------------------------------------------|
//! | PSU-Successful | two SCA methods (`sms`, `push`); the PSU must pick |
//! | PSU-OneMethod  | a single SCA method, selected automatically        |
//! | PSU-NoSca      | no SCA methods; executed without SCA               |
//! | PSU-Exempted   | the bank waives SCA after authentication           |
//!
//! Every PSU has the password `12345` and every TAN is `123456`. Any other PSU id is unknown to the bank.
//!
//! The opaque state kept between calls is a small JSON document that counts attempts, so that it can be seen travelling
//! through the engine encrypted.
use log::*;
use serde::{Deserialize, Serialize};
use xs2a_common::Secret;
use xs2a_engine::{
    db_types::{AuthorisationType, ChallengeData, ScaMethod},
    traits::{
        CoreBankingSpi,
        SpiAuthorisationCode,
        SpiAvailableScaMethods,
        SpiContext,
        SpiExecution,
        SpiFailure,
        SpiFailureKind,
        SpiPsuAuthentication,
        SpiPsuIdentification,
        SpiResponse,
    },
};

pub const SANDBOX_PASSWORD: &str = "12345";
pub const SANDBOX_TAN: &str = "123456";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SandboxPsu {
    Successful,
    OneMethod,
    NoSca,
    Exempted,
}

impl SandboxPsu {
    fn from_id(psu_id: &str) -> Option<Self> {
        match psu_id {
            "PSU-Successful" => Some(Self::Successful),
            "PSU-OneMethod" => Some(Self::OneMethod),
            "PSU-NoSca" => Some(Self::NoSca),
            "PSU-Exempted" => Some(Self::Exempted),
            _ => None,
        }
    }

    fn sca_methods(&self) -> Vec<ScaMethod> {
        let sms = ScaMethod::new("sms", "SMS_OTP").with_name("SMS to +49 *** ** 123");
        let push = ScaMethod::new("push", "PUSH_OTP").with_name("Banking app");
        match self {
            Self::Successful => vec![sms, push],
            Self::OneMethod => vec![sms],
            Self::NoSca | Self::Exempted => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SandboxState {
    #[serde(default)]
    identifications: u32,
    #[serde(default)]
    password_attempts: u32,
    #[serde(default)]
    code_attempts: u32,
    #[serde(default)]
    method: Option<String>,
}

impl SandboxState {
    fn load(consent_data: &[u8]) -> Self {
        if consent_data.is_empty() {
            return Self::default();
        }
        serde_json::from_slice(consent_data).unwrap_or_else(|e| {
            warn!("🏦️ Sandbox state could not be read ({e}). Starting afresh.");
            Self::default()
        })
    }

    fn save(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    fn success<T>(&self, payload: T) -> SpiResponse<T> {
        SpiResponse::success(payload, self.save())
    }

    fn failure<T, S: Into<String>>(&self, kind: SpiFailureKind, message: S) -> SpiResponse<T> {
        SpiResponse::failure(SpiFailure::new(kind, message), self.save())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SandboxBank;

impl SandboxBank {
    pub fn new() -> Self {
        Self
    }
}

fn executed_status(authorisation_type: AuthorisationType) -> &'static str {
    match authorisation_type {
        AuthorisationType::Ais => "valid",
        AuthorisationType::Pis => "ACSC",
        AuthorisationType::PisCancellation => "CANC",
        AuthorisationType::SigningBasket => "ACTC",
    }
}

impl CoreBankingSpi for SandboxBank {
    async fn identify_psu(&self, ctx: &SpiContext, consent_data: &[u8]) -> SpiResponse<SpiPsuIdentification> {
        let mut state = SandboxState::load(consent_data);
        state.identifications += 1;
        match SandboxPsu::from_id(&ctx.psu.psu_id) {
            Some(_) => {
                debug!("🏦️ Sandbox identified {} for {}", ctx.psu, ctx.authorisation_id);
                state.success(SpiPsuIdentification::default())
            },
            None => state.failure(SpiFailureKind::Unauthorized, format!("PSU {} is unknown", ctx.psu)),
        }
    }

    async fn authenticate_psu(
        &self,
        ctx: &SpiContext,
        password: &Secret<String>,
        consent_data: &[u8],
    ) -> SpiResponse<SpiPsuAuthentication> {
        let mut state = SandboxState::load(consent_data);
        state.password_attempts += 1;
        let Some(psu) = SandboxPsu::from_id(&ctx.psu.psu_id) else {
            return state.failure(SpiFailureKind::Unauthorized, format!("PSU {} is unknown", ctx.psu));
        };
        if password.reveal() != SANDBOX_PASSWORD {
            debug!("🏦️ Wrong password for {} (attempt {})", ctx.psu, state.password_attempts);
            return state.success(SpiPsuAuthentication::failure());
        }
        let mut authentication = SpiPsuAuthentication::success();
        authentication.sca_exempted = psu == SandboxPsu::Exempted;
        state.success(authentication)
    }

    async fn list_available_sca_methods(
        &self,
        ctx: &SpiContext,
        consent_data: &[u8],
    ) -> SpiResponse<SpiAvailableScaMethods> {
        let state = SandboxState::load(consent_data);
        match SandboxPsu::from_id(&ctx.psu.psu_id) {
            Some(psu) => state.success(SpiAvailableScaMethods { methods: psu.sca_methods(), sca_exempted: false }),
            None => state.failure(SpiFailureKind::Unauthorized, format!("PSU {} is unknown", ctx.psu)),
        }
    }

    async fn request_authorisation_code(
        &self,
        ctx: &SpiContext,
        method_id: &str,
        consent_data: &[u8],
    ) -> SpiResponse<SpiAuthorisationCode> {
        let mut state = SandboxState::load(consent_data);
        let known = SandboxPsu::from_id(&ctx.psu.psu_id)
            .map(|psu| psu.sca_methods().iter().any(|m| m.authentication_method_id == method_id))
            .unwrap_or(false);
        if !known {
            return state.failure(SpiFailureKind::LogicalFailure, format!("SCA method {method_id} is not available"));
        }
        info!("🏦️ Sandbox TAN for {} sent via {method_id}", ctx.authorisation_id);
        state.method = Some(method_id.to_string());
        let challenge_data = ChallengeData {
            otp_format: Some("integer".into()),
            otp_max_length: Some(SANDBOX_TAN.len() as u32),
            image_link: None,
            additional_information: Some(format!("Enter the TAN sent via {method_id}")),
        };
        state.success(SpiAuthorisationCode { challenge_data: Some(challenge_data), sca_exempted: false })
    }

    async fn verify_code_and_execute(
        &self,
        ctx: &SpiContext,
        code: &Secret<String>,
        consent_data: &[u8],
    ) -> SpiResponse<SpiExecution> {
        let mut state = SandboxState::load(consent_data);
        state.code_attempts += 1;
        if code.reveal() != SANDBOX_TAN {
            return state.failure(SpiFailureKind::Unauthorized, "The TAN is wrong");
        }
        let resource_status = executed_status(ctx.authorisation_type).to_string();
        info!("🏦️ Sandbox executed {} {} ({resource_status})", ctx.authorisation_type, ctx.resource_id);
        state.success(SpiExecution { resource_status })
    }

    async fn execute_without_sca(&self, ctx: &SpiContext, consent_data: &[u8]) -> SpiResponse<SpiExecution> {
        let state = SandboxState::load(consent_data);
        let resource_status = executed_status(ctx.authorisation_type).to_string();
        info!("🏦️ Sandbox executed {} {} without SCA ({resource_status})", ctx.authorisation_type, ctx.resource_id);
        state.success(SpiExecution { resource_status })
    }
}

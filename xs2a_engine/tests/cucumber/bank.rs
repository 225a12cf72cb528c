use std::sync::{Arc, Mutex};

use xs2a_common::Secret;
use xs2a_engine::{
    db_types::ScaMethod,
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

#[derive(Debug, Clone)]
pub struct BankScript {
    pub password: String,
    pub tan: String,
    pub methods: Vec<ScaMethod>,
    pub sca_exempted: bool,
    pub calls: usize,
}

impl Default for BankScript {
    fn default() -> Self {
        Self {
            password: "12345".into(),
            tan: "123456".into(),
            methods: vec![ScaMethod::new("sms", "SMS_OTP")],
            sca_exempted: false,
            calls: 0,
        }
    }
}

/// A core banking system whose answers are set by the scenario. It counts the calls it receives and appends one byte
/// to the opaque state on every call.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBank {
    script: Arc<Mutex<BankScript>>,
}

impl ScriptedBank {
    pub fn script(&self) -> std::sync::MutexGuard<'_, BankScript> {
        self.script.lock().expect("bank script lock poisoned")
    }

    fn called(&self, consent_data: &[u8]) -> (BankScript, Vec<u8>) {
        let mut script = self.script();
        script.calls += 1;
        let mut state = consent_data.to_vec();
        state.push(b'.');
        (script.clone(), state)
    }
}

impl CoreBankingSpi for ScriptedBank {
    async fn identify_psu(&self, _ctx: &SpiContext, consent_data: &[u8]) -> SpiResponse<SpiPsuIdentification> {
        let (_, state) = self.called(consent_data);
        SpiResponse::success(SpiPsuIdentification::default(), state)
    }

    async fn authenticate_psu(
        &self,
        _ctx: &SpiContext,
        password: &Secret<String>,
        consent_data: &[u8],
    ) -> SpiResponse<SpiPsuAuthentication> {
        let (script, state) = self.called(consent_data);
        if password.reveal() == &script.password {
            let authentication = SpiPsuAuthentication { sca_exempted: script.sca_exempted, ..SpiPsuAuthentication::success() };
            SpiResponse::success(authentication, state)
        } else {
            SpiResponse::success(SpiPsuAuthentication::failure(), state)
        }
    }

    async fn list_available_sca_methods(
        &self,
        _ctx: &SpiContext,
        consent_data: &[u8],
    ) -> SpiResponse<SpiAvailableScaMethods> {
        let (script, state) = self.called(consent_data);
        SpiResponse::success(SpiAvailableScaMethods { methods: script.methods, sca_exempted: false }, state)
    }

    async fn request_authorisation_code(
        &self,
        _ctx: &SpiContext,
        _method_id: &str,
        consent_data: &[u8],
    ) -> SpiResponse<SpiAuthorisationCode> {
        let (_, state) = self.called(consent_data);
        SpiResponse::success(SpiAuthorisationCode::default(), state)
    }

    async fn verify_code_and_execute(
        &self,
        _ctx: &SpiContext,
        code: &Secret<String>,
        consent_data: &[u8],
    ) -> SpiResponse<SpiExecution> {
        let (script, state) = self.called(consent_data);
        if code.reveal() == &script.tan {
            SpiResponse::success(SpiExecution { resource_status: "ACSC".into() }, state)
        } else {
            SpiResponse::failure(SpiFailure::new(SpiFailureKind::Unauthorized, "wrong TAN"), state)
        }
    }

    async fn execute_without_sca(&self, _ctx: &SpiContext, consent_data: &[u8]) -> SpiResponse<SpiExecution> {
        let (_, state) = self.called(consent_data);
        SpiResponse::success(SpiExecution { resource_status: "ACSC".into() }, state)
    }
}

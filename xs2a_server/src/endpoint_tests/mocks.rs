use chrono::{DateTime, Duration, Utc};
use mockall::mock;
use xs2a_common::Secret;
use xs2a_engine::{
    db_types::{Authorisation, AuthorisationId, NewAuthorisation},
    traits::{
        AuthorisationDbError,
        AuthorisationLease,
        AuthorisationManagement,
        CoreBankingSpi,
        ExpiredAuthorisation,
        LeaseToken,
        ScaTransition,
        SpiAuthorisationCode,
        SpiAvailableScaMethods,
        SpiContext,
        SpiExecution,
        SpiPsuAuthentication,
        SpiPsuIdentification,
        SpiResponse,
    },
};

mock! {
    pub AuthorisationStore {}
    impl Clone for AuthorisationStore {
        fn clone(&self) -> Self;
    }
    impl AuthorisationManagement for AuthorisationStore {
        async fn insert_authorisation(&self, authorisation: NewAuthorisation) -> Result<Authorisation, AuthorisationDbError>;
        async fn fetch_authorisation(&self, id: &AuthorisationId) -> Result<Option<Authorisation>, AuthorisationDbError>;
        async fn fetch_authorisations_for_resource(&self, resource_id: &str) -> Result<Vec<Authorisation>, AuthorisationDbError>;
        async fn acquire_lease(&self, id: &AuthorisationId, ttl: Duration) -> Result<AuthorisationLease, AuthorisationDbError>;
        async fn renew_lease(&self, id: &AuthorisationId, token: &LeaseToken, ttl: Duration) -> Result<DateTime<Utc>, AuthorisationDbError>;
        async fn release_lease(&self, id: &AuthorisationId, token: &LeaseToken) -> Result<(), AuthorisationDbError>;
        async fn commit_transition(&self, id: &AuthorisationId, token: &LeaseToken, transition: ScaTransition) -> Result<Authorisation, AuthorisationDbError>;
        async fn expire_authorisations(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredAuthorisation>, AuthorisationDbError>;
    }
}

mock! {
    pub Bank {}
    impl CoreBankingSpi for Bank {
        async fn identify_psu(&self, ctx: &SpiContext, consent_data: &[u8]) -> SpiResponse<SpiPsuIdentification>;
        async fn authenticate_psu(&self, ctx: &SpiContext, password: &Secret<String>, consent_data: &[u8]) -> SpiResponse<SpiPsuAuthentication>;
        async fn list_available_sca_methods(&self, ctx: &SpiContext, consent_data: &[u8]) -> SpiResponse<SpiAvailableScaMethods>;
        async fn request_authorisation_code(&self, ctx: &SpiContext, method_id: &str, consent_data: &[u8]) -> SpiResponse<SpiAuthorisationCode>;
        async fn verify_code_and_execute(&self, ctx: &SpiContext, code: &Secret<String>, consent_data: &[u8]) -> SpiResponse<SpiExecution>;
        async fn execute_without_sca(&self, ctx: &SpiContext, consent_data: &[u8]) -> SpiResponse<SpiExecution>;
    }
}

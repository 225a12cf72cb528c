use thiserror::Error;

use crate::{
    certificate::CertificateError,
    crypto::{CryptoError, DecryptionFailure},
    db_types::{AuthorisationId, AuthorisationType, ScaStatus},
    sca_api::sca_objects::UpdateKind,
    traits::{AuthorisationDbError, SpiFailure},
};

/// Errors reported by the SCA APIs.
///
/// `WrongAuthorisationStage`, `RoleNotPermitted`, `FormatError`, `AuthorisationNotFound` and `AuthorisationBusy` are
/// returned without touching the authorisation. The failures that end an authorisation are reported inside an
/// [`AuthorisationResult`](crate::sca_api::AuthorisationResult) whose status is `FAILED`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaError {
    #[error("The TPP certificate is invalid. {0}")]
    CertificateInvalid(#[from] CertificateError),
    #[error("No crypto provider with id {0} is known")]
    CryptoProviderUnknown(String),
    #[error("Could not decrypt the authorisation data. {0}")]
    DecryptionFailed(DecryptionFailure),
    #[error("Cryptographic failure. {0}")]
    Crypto(String),
    #[error("The PSU credentials are invalid. {0}")]
    PsuCredentialsInvalid(String),
    #[error("SCA method {0} is not available for this authorisation")]
    ScaMethodUnknown(String),
    #[error("A {update} update cannot be applied to an authorisation in status {status}")]
    WrongAuthorisationStage { status: ScaStatus, update: UpdateKind },
    #[error("A TPP with roles [{roles}] may not authorise {authorisation_type}")]
    RoleNotPermitted { authorisation_type: AuthorisationType, roles: String },
    #[error("The core banking system reported a failure. {0}")]
    CoreBankingFailure(SpiFailure),
    #[error("Invalid request. {0}")]
    FormatError(String),
    #[error("Authorisation {0} does not exist")]
    AuthorisationNotFound(AuthorisationId),
    #[error("Authorisation {0} is being updated by another request")]
    AuthorisationBusy(AuthorisationId),
    #[error("Authorisation {0} has expired")]
    AuthorisationExpired(AuthorisationId),
    #[error("The resource id is not valid. {0}")]
    InvalidResourceId(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<CryptoError> for ScaError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::UnknownProvider(id) => ScaError::CryptoProviderUnknown(id),
            CryptoError::DecryptionFailed(f) => ScaError::DecryptionFailed(f),
            CryptoError::MalformedId(s) => ScaError::InvalidResourceId(s),
            e => ScaError::Crypto(e.to_string()),
        }
    }
}

impl From<AuthorisationDbError> for ScaError {
    fn from(e: AuthorisationDbError) -> Self {
        match e {
            AuthorisationDbError::NotFound(id) => ScaError::AuthorisationNotFound(id),
            AuthorisationDbError::AuthorisationBusy(id) => ScaError::AuthorisationBusy(id),
            e => ScaError::DatabaseError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn crypto_errors_keep_their_meaning() {
        let e = ScaError::from(CryptoError::UnknownProvider("abc".into()));
        assert_eq!(e, ScaError::CryptoProviderUnknown("abc".into()));
        let e = ScaError::from(CryptoError::DecryptionFailed(DecryptionFailure::WrongPassword));
        assert_eq!(e, ScaError::DecryptionFailed(DecryptionFailure::WrongPassword));
        let e = ScaError::from(CryptoError::MalformedId("no separator".into()));
        assert!(matches!(e, ScaError::InvalidResourceId(_)));
    }

    #[test]
    fn busy_and_missing_authorisations() {
        let id = AuthorisationId::from("a1");
        let e = ScaError::from(AuthorisationDbError::AuthorisationBusy(id.clone()));
        assert_eq!(e, ScaError::AuthorisationBusy(id.clone()));
        let e = ScaError::from(AuthorisationDbError::NotFound(id.clone()));
        assert_eq!(e, ScaError::AuthorisationNotFound(id));
        let e = ScaError::from(AuthorisationDbError::DatabaseError("disk full".into()));
        assert!(matches!(e, ScaError::DatabaseError(_)));
    }
}

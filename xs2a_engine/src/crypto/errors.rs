use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("No crypto provider is registered with id {0}")]
    UnknownProvider(String),
    #[error("A crypto provider with id {0} is already registered")]
    DuplicateProvider(String),
    #[error("Algorithm {0} is not supported: {1}")]
    UnsupportedAlgorithm(String, String),
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Decryption failed: {0}")]
    DecryptionFailed(#[from] DecryptionFailure),
    #[error("Malformed encrypted identifier: {0}")]
    MalformedId(String),
}

/// Why a decryption failed. A wrong password is reported separately so that callers can answer with an
/// "invalid credentials" response instead of an internal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionFailure {
    #[error("the password does not match the key used for encryption")]
    WrongPassword,
    #[error("the ciphertext is corrupt. {0}")]
    CorruptData(String),
}

impl CryptoError {
    pub fn is_wrong_password(&self) -> bool {
        matches!(self, CryptoError::DecryptionFailed(DecryptionFailure::WrongPassword))
    }
}

use thiserror::Error;

/// Every way a TPP certificate can be rejected. All of them amount to "certificate invalid" for the caller; the
/// variants exist so that the gateway can report blocked and expired certificates with their own codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertificateError {
    #[error("The certificate could not be decoded. {0}")]
    Malformed(String),
    #[error("The certificate is not valid at this time")]
    Expired,
    #[error("The certificate {0} is blocked")]
    Blocked(String),
    #[error("The certificate does not chain to a trusted root. {0}")]
    UntrustedChain(String),
    #[error("A signature in the certificate chain is invalid. {0}")]
    BadSignature(String),
    #[error("The PSD2 QC statement is missing or invalid. {0}")]
    InvalidQcStatement(String),
    #[error("The certificate subject has no {0}")]
    MissingSubjectField(&'static str),
}

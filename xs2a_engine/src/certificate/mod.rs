//! TPP certificate handling.
//!
//! A third-party provider presents an eIDAS qualified website authentication certificate (QWAC). This module decodes
//! it ([`decode_certificate`]), reads the PSD2 QC statement and subject into a [`TppIdentity`]
//! ([`extract_identity`]), and checks it against the configured trust anchors ([`CertificateValidator`]).
mod errors;
mod identity;
mod pem;
mod qc_statement;
mod validator;

pub use errors::CertificateError;
pub use identity::{extract_identity, identity_from_certificate, TppIdentity};
pub use pem::{decode_certificate, decode_certificate_bundle};
pub use qc_statement::{decode_qc_statements, Psd2QcStatement, PSD2_QC_STATEMENT_OID, QC_STATEMENTS_EXTENSION_OID};
pub use validator::{fingerprint, validate_chain, BlockedSet, CertificateValidator, Fingerprint};

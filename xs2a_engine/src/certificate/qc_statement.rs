//! Decoding of the PSD2 QC statement (ETSI TS 119 495).
//!
//! ```text
//! QCStatements ::= SEQUENCE OF QCStatement
//! QCStatement ::= SEQUENCE { statementId OBJECT IDENTIFIER, statementInfo ANY OPTIONAL }
//! PSD2QcType ::= SEQUENCE { rolesOfPSP RolesOfPSP, nCAName NCAName, nCAId NCAId }
//! RolesOfPSP ::= SEQUENCE OF SEQUENCE { roleOfPspOid OBJECT IDENTIFIER, roleOfPspName UTF8String }
//! ```
//!
//! Some authorities put a single bare `QCStatement` in the extension instead of the `QCStatements` sequence. Both
//! forms are accepted. The conformant form is always tried first.
use std::collections::BTreeSet;

use log::*;
use x509_parser::der_parser::{ber::BerObject, der::parse_der};

use super::CertificateError;
use crate::db_types::TppRole;

pub const QC_STATEMENTS_EXTENSION_OID: &str = "1.3.6.1.5.5.7.1.3";
pub const PSD2_QC_STATEMENT_OID: &str = "0.4.0.19495.2";

/// The NCA id separates the country code from the authority's short name with a dash, e.g. `DE-BAFIN`.
const NCA_ID_SEPARATOR: char = '-';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Psd2QcStatement {
    pub roles: BTreeSet<TppRole>,
    pub authority_name: String,
    pub authority_id: String,
}

impl Psd2QcStatement {
    /// Splits the NCA id into country code and short name. An id without a separator has no country.
    pub fn authority_country_and_name(&self) -> (Option<String>, String) {
        match self.authority_id.split_once(NCA_ID_SEPARATOR) {
            Some((country, name)) if !country.is_empty() => (Some(country.to_string()), name.to_string()),
            _ => (None, self.authority_id.clone()),
        }
    }
}

/// Decodes the value of the QC statements extension.
pub fn decode_qc_statements(extension_value: &[u8]) -> Result<Psd2QcStatement, CertificateError> {
    decode_statement_sequence(extension_value)
        .or_else(|strict_err| {
            debug!("📜️ QC statements are not a statement sequence ({strict_err}). Trying a bare PSD2 statement.");
            decode_bare_statement(extension_value)
        })
        .map_err(CertificateError::InvalidQcStatement)
}

/// `SEQUENCE OF QCStatement` with one PSD2 statement among them.
fn decode_statement_sequence(value: &[u8]) -> Result<Psd2QcStatement, String> {
    let (_, outer) = parse_der(value).map_err(|e| format!("invalid DER: {e}"))?;
    let statements = outer.as_sequence().map_err(|e| format!("not a sequence: {e}"))?;
    for statement in statements {
        let parts = statement.as_sequence().map_err(|e| format!("statement is not a sequence: {e}"))?;
        if statement_id(parts)? == PSD2_QC_STATEMENT_OID {
            return decode_psd2_statement_info(parts.get(1));
        }
    }
    Err("no PSD2 statement present".into())
}

/// A single `QCStatement` whose id must be the PSD2 statement id.
fn decode_bare_statement(value: &[u8]) -> Result<Psd2QcStatement, String> {
    let (_, statement) = parse_der(value).map_err(|e| format!("invalid DER: {e}"))?;
    let parts = statement.as_sequence().map_err(|e| format!("not a sequence: {e}"))?;
    let id = statement_id(parts)?;
    if id != PSD2_QC_STATEMENT_OID {
        return Err(format!("statement {id} is not a PSD2 statement"));
    }
    decode_psd2_statement_info(parts.get(1))
}

fn statement_id(parts: &[BerObject]) -> Result<String, String> {
    let first = parts.first().ok_or("empty statement")?;
    first.as_oid().map(|oid| oid.to_id_string()).map_err(|e| format!("statement id is not an OID: {e}"))
}

fn decode_psd2_statement_info(info: Option<&BerObject>) -> Result<Psd2QcStatement, String> {
    let info = info.ok_or("the PSD2 statement has no body")?;
    let fields = info.as_sequence().map_err(|e| format!("PSD2 statement body is not a sequence: {e}"))?;
    let [roles, name, id] = fields.as_slice() else {
        return Err(format!("PSD2 statement body has {} elements instead of 3", fields.len()));
    };
    let roles = decode_roles(roles)?;
    let authority_name = name.as_str().map_err(|e| format!("invalid NCA name: {e}"))?.to_string();
    let authority_id = id.as_str().map_err(|e| format!("invalid NCA id: {e}"))?.to_string();
    Ok(Psd2QcStatement { roles, authority_name, authority_id })
}

/// Each role is recognised by its OID or its name. Some issuers get only one of them right.
fn decode_roles(roles: &BerObject) -> Result<BTreeSet<TppRole>, String> {
    let entries = roles.as_sequence().map_err(|e| format!("rolesOfPSP is not a sequence: {e}"))?;
    let mut result = BTreeSet::new();
    for entry in entries {
        let pair = entry.as_sequence().map_err(|e| format!("role entry is not a sequence: {e}"))?;
        let oid = pair.first().and_then(|o| o.as_oid().ok()).map(|o| o.to_id_string());
        let name = pair.get(1).and_then(|n| n.as_str().ok());
        let role = oid.as_deref().and_then(TppRole::from_psd2_oid).or_else(|| name.and_then(TppRole::from_psd2_name));
        match role {
            Some(role) => {
                result.insert(role);
            },
            None => warn!("📜️ Ignoring unknown PSD2 role {oid:?} / {name:?}"),
        }
    }
    if result.is_empty() {
        return Err("no recognised PSD2 roles".into());
    }
    Ok(result)
}

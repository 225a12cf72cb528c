use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use log::*;
use serde::Serialize;
use x509_parser::prelude::*;

use super::{
    qc_statement::{decode_qc_statements, QC_STATEMENTS_EXTENSION_OID},
    CertificateError,
};
use crate::db_types::TppRole;

const OID_COMMON_NAME: &str = "2.5.4.3";
const OID_COUNTRY: &str = "2.5.4.6";
const OID_LOCALITY: &str = "2.5.4.7";
const OID_STATE: &str = "2.5.4.8";
const OID_ORGANISATION: &str = "2.5.4.10";
const OID_ORGANISATION_UNIT: &str = "2.5.4.11";
const OID_ORGANISATION_IDENTIFIER: &str = "2.5.4.97";

/// Who is calling, as established by their qualified certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TppIdentity {
    /// The subject's `organizationIdentifier`, e.g. `PSDDE-BAFIN-123456`.
    pub authorisation_number: String,
    /// The national competent authority id from the QC statement, e.g. `DE-BAFIN`.
    pub authority_id: String,
    pub authority_name: String,
    pub authority_country: Option<String>,
    pub authority_short_name: String,
    pub roles: BTreeSet<TppRole>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub alternate_names: Vec<String>,
    pub organisation: Option<String>,
    pub organisation_unit: Option<String>,
    pub common_name: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

impl TppIdentity {
    /// An identity that did not come from a certificate, for sandbox and test callers.
    pub fn new<S: Into<String>, I: IntoIterator<Item = TppRole>>(authorisation_number: S, roles: I) -> Self {
        let now = Utc::now();
        Self {
            authorisation_number: authorisation_number.into(),
            authority_id: String::new(),
            authority_name: String::new(),
            authority_country: None,
            authority_short_name: String::new(),
            roles: roles.into_iter().collect(),
            not_before: now,
            not_after: now + chrono::Duration::days(365),
            alternate_names: Vec::new(),
            organisation: None,
            organisation_unit: None,
            common_name: None,
            country: None,
            city: None,
            state: None,
        }
    }

    pub fn has_role(&self, role: TppRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn roles_string(&self) -> String {
        self.roles.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(",")
    }
}

/// Reads the TPP identity from a DER certificate. Fails unless the certificate carries a PSD2 QC statement with at
/// least one recognised role and an organisation identifier.
pub fn extract_identity(der: &[u8]) -> Result<TppIdentity, CertificateError> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| CertificateError::Malformed(e.to_string()))?;
    identity_from_certificate(&cert)
}

pub fn identity_from_certificate(cert: &X509Certificate<'_>) -> Result<TppIdentity, CertificateError> {
    let extension = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid.to_id_string() == QC_STATEMENTS_EXTENSION_OID)
        .ok_or_else(|| CertificateError::InvalidQcStatement("there is no QC statements extension".into()))?;
    let qc = decode_qc_statements(extension.value)?;
    let (authority_country, authority_short_name) = qc.authority_country_and_name();

    let mut identity = TppIdentity {
        authorisation_number: String::new(),
        authority_id: qc.authority_id,
        authority_name: qc.authority_name,
        authority_country,
        authority_short_name,
        roles: qc.roles,
        not_before: to_datetime(cert.validity().not_before.timestamp())?,
        not_after: to_datetime(cert.validity().not_after.timestamp())?,
        alternate_names: dns_names(cert),
        organisation: None,
        organisation_unit: None,
        common_name: None,
        country: None,
        city: None,
        state: None,
    };
    let mut authorisation_number = None;
    for attr in cert.subject().iter_attributes() {
        let value = attr.as_str().ok().map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        let slot = match attr.attr_type().to_id_string().as_str() {
            OID_ORGANISATION_IDENTIFIER => &mut authorisation_number,
            OID_ORGANISATION => &mut identity.organisation,
            OID_ORGANISATION_UNIT => &mut identity.organisation_unit,
            OID_COMMON_NAME => &mut identity.common_name,
            OID_COUNTRY => &mut identity.country,
            OID_LOCALITY => &mut identity.city,
            OID_STATE => &mut identity.state,
            _ => continue,
        };
        if slot.is_none() {
            *slot = value;
        }
    }
    identity.authorisation_number =
        authorisation_number.ok_or(CertificateError::MissingSubjectField("organizationIdentifier"))?;
    debug!(
        "📜️ Certificate identifies TPP {} with roles [{}], authorised by {}",
        identity.authorisation_number,
        identity.roles_string(),
        identity.authority_id
    );
    Ok(identity)
}

fn dns_names(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut names = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                names.push(dns.to_string());
            }
        }
    }
    names
}

fn to_datetime(timestamp: i64) -> Result<DateTime<Utc>, CertificateError> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| CertificateError::Malformed(format!("validity timestamp {timestamp} is out of range")))
}

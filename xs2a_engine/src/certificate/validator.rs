use std::collections::HashSet;

use chrono::{DateTime, Utc};
use log::*;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use super::CertificateError;

/// Longest chain (leaf and intermediates) that will be followed before giving up.
const MAX_CHAIN_LENGTH: usize = 8;

pub type Fingerprint = [u8; 32];

/// SHA-256 fingerprint of a DER certificate.
pub fn fingerprint(der: &[u8]) -> Fingerprint {
    Sha256::digest(der).into()
}

/// Certificates that are rejected unconditionally, identified by the SHA-256 fingerprint of their DER encoding.
#[derive(Debug, Clone, Default)]
pub struct BlockedSet {
    fingerprints: HashSet<Fingerprint>,
}

impl BlockedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from hex fingerprints. Colons, as printed by `openssl x509 -fingerprint`, are ignored.
    pub fn from_hex_fingerprints<S: AsRef<str>>(values: &[S]) -> Result<Self, CertificateError> {
        let mut result = Self::new();
        for value in values {
            let cleaned = value.as_ref().replace(':', "");
            let bytes = hex::decode(cleaned.trim())
                .map_err(|e| CertificateError::Malformed(format!("invalid fingerprint {}: {e}", value.as_ref())))?;
            let fp = Fingerprint::try_from(bytes.as_slice())
                .map_err(|_| CertificateError::Malformed(format!("{} is not a SHA-256 fingerprint", value.as_ref())))?;
            result.fingerprints.insert(fp);
        }
        Ok(result)
    }

    pub fn block_certificate(&mut self, der: &[u8]) {
        self.fingerprints.insert(fingerprint(der));
    }

    pub fn is_blocked(&self, der: &[u8]) -> bool {
        self.fingerprints.contains(&fingerprint(der))
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }
}

/// Checks a certificate against the trust anchors at time `now`.
///
/// The certificate must
/// * not be blocked, and neither may any certificate on its path,
/// * be within its validity window, as must every certificate on its path,
/// * chain, through zero or more CA intermediates, to one of the trusted roots with valid signatures at each link.
///
/// Membership in `blocked` fails the certificate even when the chain is otherwise sound.
pub fn validate_chain(
    certificate: &[u8],
    trusted_roots: &[Vec<u8>],
    trusted_intermediates: &[Vec<u8>],
    blocked: &BlockedSet,
    now: DateTime<Utc>,
) -> Result<(), CertificateError> {
    if blocked.is_blocked(certificate) {
        let fp = hex::encode(fingerprint(certificate));
        warn!("📜️ Rejecting blocked certificate {fp}");
        return Err(CertificateError::Blocked(fp));
    }
    let (_, leaf) = X509Certificate::from_der(certificate).map_err(|e| CertificateError::Malformed(e.to_string()))?;
    check_validity(&leaf, now)?;
    let roots = parse_all(trusted_roots);
    let intermediates = parse_all(trusted_intermediates);

    let mut current = &leaf;
    let mut bad_signature = None;
    for _ in 0..MAX_CHAIN_LENGTH {
        for (der, root) in &roots {
            if issued_by(current, root, &mut bad_signature) {
                if blocked.is_blocked(der) {
                    return Err(CertificateError::Blocked(hex::encode(fingerprint(der))));
                }
                check_validity(root, now)?;
                trace!("📜️ Certificate chain anchored at {}", root.subject());
                return Ok(());
            }
        }
        let next = intermediates.iter().find(|(_, candidate)| {
            candidate.is_ca() && issued_by(current, candidate, &mut bad_signature)
        });
        match next {
            Some((der, intermediate)) => {
                if blocked.is_blocked(der) {
                    return Err(CertificateError::Blocked(hex::encode(fingerprint(der))));
                }
                check_validity(intermediate, now)?;
                trace!("📜️ {} is issued by intermediate {}", current.subject(), intermediate.subject());
                current = intermediate;
            },
            None => break,
        }
    }
    match bad_signature {
        Some(reason) => Err(CertificateError::BadSignature(reason)),
        None => Err(CertificateError::UntrustedChain(format!("no trusted issuer found for {}", current.issuer()))),
    }
}

fn parse_all(certs: &[Vec<u8>]) -> Vec<(&[u8], X509Certificate<'_>)> {
    certs
        .iter()
        .filter_map(|der| match X509Certificate::from_der(der) {
            Ok((_, cert)) => Some((der.as_slice(), cert)),
            Err(e) => {
                warn!("📜️ Ignoring unparseable trust anchor: {e}");
                None
            },
        })
        .collect()
}

/// True if `issuer`'s subject matches `cert`'s issuer and `issuer`'s key verifies `cert`'s signature. A name match
/// with a failing signature is remembered in `bad_signature`.
fn issued_by(cert: &X509Certificate<'_>, issuer: &X509Certificate<'_>, bad_signature: &mut Option<String>) -> bool {
    if cert.issuer().as_raw() != issuer.subject().as_raw() {
        return false;
    }
    match cert.verify_signature(Some(issuer.public_key())) {
        Ok(()) => true,
        Err(e) => {
            debug!("📜️ {} names {} as issuer but the signature does not verify: {e}", cert.subject(), issuer.subject());
            *bad_signature = Some(format!("{} is not signed by {}", cert.subject(), issuer.subject()));
            false
        },
    }
}

fn check_validity(cert: &X509Certificate<'_>, now: DateTime<Utc>) -> Result<(), CertificateError> {
    let now = now.timestamp();
    let validity = cert.validity();
    if now < validity.not_before.timestamp() || now > validity.not_after.timestamp() {
        debug!("📜️ {} is not valid at {now}", cert.subject());
        return Err(CertificateError::Expired);
    }
    Ok(())
}

/// The trust configuration of a gateway: roots, intermediates and the blocked set, held as DER.
#[derive(Debug, Clone, Default)]
pub struct CertificateValidator {
    trusted_roots: Vec<Vec<u8>>,
    trusted_intermediates: Vec<Vec<u8>>,
    blocked: BlockedSet,
}

impl CertificateValidator {
    pub fn new(trusted_roots: Vec<Vec<u8>>, trusted_intermediates: Vec<Vec<u8>>, blocked: BlockedSet) -> Self {
        info!(
            "📜️ Certificate validator configured with {} roots, {} intermediates and {} blocked certificates",
            trusted_roots.len(),
            trusted_intermediates.len(),
            blocked.len()
        );
        Self { trusted_roots, trusted_intermediates, blocked }
    }

    pub fn validate(&self, certificate: &[u8], now: DateTime<Utc>) -> Result<(), CertificateError> {
        validate_chain(certificate, &self.trusted_roots, &self.trusted_intermediates, &self.blocked, now)
    }

    pub fn blocked(&self) -> &BlockedSet {
        &self.blocked
    }
}

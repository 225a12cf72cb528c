use x509_parser::pem::Pem;

use super::CertificateError;

const PEM_HEADER: &str = "-----BEGIN CERTIFICATE-----";
const PEM_FOOTER: &str = "-----END CERTIFICATE-----";

/// Decodes one certificate into DER.
///
/// Accepts raw DER, a regular PEM block, or the single-line PEM that proxies put in a request header (markers and
/// base64 body with all line breaks removed).
pub fn decode_certificate(input: &[u8]) -> Result<Vec<u8>, CertificateError> {
    if input.first() == Some(&0x30) {
        return Ok(input.to_vec());
    }
    let text = std::str::from_utf8(input)
        .map_err(|_| CertificateError::Malformed("the certificate is neither DER nor PEM text".into()))?;
    let body = text.trim();
    let body = body.strip_prefix(PEM_HEADER).unwrap_or(body);
    let body = body.strip_suffix(PEM_FOOTER).unwrap_or(body);
    let body = body.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    if body.is_empty() {
        return Err(CertificateError::Malformed("the certificate is empty".into()));
    }
    base64::decode(body).map_err(|e| CertificateError::Malformed(format!("invalid base64: {e}")))
}

/// Decodes every certificate in a PEM bundle, such as a file of trusted roots.
pub fn decode_certificate_bundle(input: &[u8]) -> Result<Vec<Vec<u8>>, CertificateError> {
    let mut result = Vec::new();
    for pem in Pem::iter_from_buffer(input) {
        let pem = pem.map_err(|e| CertificateError::Malformed(format!("invalid PEM: {e}")))?;
        if pem.label == "CERTIFICATE" || pem.label == "TRUSTED CERTIFICATE" {
            result.push(pem.contents);
        }
    }
    if result.is_empty() {
        return Err(CertificateError::Malformed("no certificates found".into()));
    }
    Ok(result)
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use xs2a_engine::certificate::{
    decode_certificate,
    decode_certificate_bundle,
    extract_identity,
    fingerprint,
    BlockedSet,
    CertificateValidator,
};

#[derive(Debug, Subcommand)]
pub enum CertCommand {
    /// Print the TPP identity carried by a QWAC, optionally validating it first.
    Inspect(InspectParams),
}

#[derive(Debug, Args)]
pub struct InspectParams {
    /// The certificate, as DER or PEM
    pub file: PathBuf,
    /// A PEM bundle of trusted root certificates. When given, the certificate is validated before it is inspected.
    /// May be repeated.
    #[arg(short, long = "roots")]
    pub roots: Vec<PathBuf>,
    /// A PEM bundle of intermediate certificates used to build the chain. May be repeated.
    #[arg(short, long = "intermediates")]
    pub intermediates: Vec<PathBuf>,
}

pub fn handle_cert_command(command: CertCommand) {
    match command {
        CertCommand::Inspect(params) => print_certificate(params),
    }
}

fn print_certificate(params: InspectParams) {
    match inspect(&params) {
        Ok(report) => println!("{report}"),
        Err(e) => eprintln!("Could not inspect {}. {e:#}", params.file.display()),
    }
}

fn inspect(params: &InspectParams) -> Result<String> {
    let bytes = std::fs::read(&params.file).with_context(|| format!("Cannot read {}", params.file.display()))?;
    let der = decode_certificate(&bytes)?;
    let mut lines = vec![format!("Fingerprint (SHA-256): {}", hex::encode(fingerprint(&der)))];
    if params.roots.is_empty() {
        lines.push("Validation: skipped (no trusted roots given)".to_string());
    } else {
        let validator =
            CertificateValidator::new(load_bundles(&params.roots)?, load_bundles(&params.intermediates)?, BlockedSet::new());
        match validator.validate(&der, Utc::now()) {
            Ok(()) => lines.push("Validation: OK".to_string()),
            Err(e) => lines.push(format!("Validation: FAILED. {e}")),
        }
    }
    let identity = extract_identity(&der)?;
    lines.push(serde_json::to_string_pretty(&identity)?);
    Ok(lines.join("\n"))
}

fn load_bundles(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    let mut result = Vec::new();
    for path in paths {
        result.extend(load_bundle(path)?);
    }
    Ok(result)
}

fn load_bundle(path: &Path) -> Result<Vec<Vec<u8>>> {
    let bytes = std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))?;
    let certificates = decode_certificate_bundle(&bytes).with_context(|| format!("Invalid bundle {}", path.display()))?;
    Ok(certificates)
}

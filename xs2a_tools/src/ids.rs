use std::{env, sync::Arc};

use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use xs2a_common::Secret;
use xs2a_engine::crypto::{CryptoProviderRegistry, ResourceIdCodec};

/// Commands for the encrypted resource ids handed to TPPs. The server key is read from `--key` or from
/// `XS2A_SERVER_KEY`, and must match the gateway's for the ids to be usable.
#[derive(Debug, Subcommand)]
pub enum IdCommand {
    /// Mint the external id for a bank-side consent or payment id.
    Encrypt(IdParams),
    /// Show what an external id decrypts to.
    Decrypt(IdParams),
}

#[derive(Debug, Args)]
pub struct IdParams {
    /// The gateway's server key. Defaults to `XS2A_SERVER_KEY`.
    #[arg(short, long)]
    pub key: Option<String>,
    pub id: String,
}

pub fn handle_id_command(command: IdCommand) {
    let result = match command {
        IdCommand::Encrypt(params) => codec(params.key).and_then(|c| encrypt_id(&c, &params.id)),
        IdCommand::Decrypt(params) => codec(params.key).and_then(|c| decrypt_id(&c, &params.id)),
    };
    match result {
        Ok(output) => println!("{output}"),
        Err(e) => eprintln!("{e}"),
    }
}

fn codec(key: Option<String>) -> Result<ResourceIdCodec> {
    let key = key
        .or_else(|| env::var("XS2A_SERVER_KEY").ok())
        .ok_or_else(|| anyhow!("No server key given. Use --key or set XS2A_SERVER_KEY"))?;
    let registry = CryptoProviderRegistry::new()?;
    Ok(ResourceIdCodec::new(Arc::new(registry), Secret::new(key)))
}

fn encrypt_id(codec: &ResourceIdCodec, id: &str) -> Result<String> {
    Ok(codec.encrypt_id(id)?)
}

fn decrypt_id(codec: &ResourceIdCodec, external_id: &str) -> Result<String> {
    let key = codec.decrypt_id(external_id.trim())?;
    Ok(format!(
        "Resource id  : {}\nData provider: {}\nConsent key  : {}",
        key.resource_id,
        key.data_provider,
        key.consent_key.reveal()
    ))
}

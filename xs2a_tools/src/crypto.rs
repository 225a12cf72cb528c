use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use xs2a_common::Secret;
use xs2a_engine::crypto::{CryptoProviderRegistry, CURRENT_DATA_PROVIDER};

#[derive(Debug, Subcommand)]
pub enum CryptoCommand {
    /// List the registered crypto providers and which ones are current.
    Providers,
    /// Encrypt a string with one of the registered providers. Prints base64.
    Encrypt(EncryptParams),
    /// Decrypt base64 ciphertext produced by `encrypt` (or by the gateway).
    Decrypt(DecryptParams),
}

#[derive(Debug, Args)]
pub struct EncryptParams {
    /// The provider's external id
    #[arg(short = 'i', long = "provider", default_value = CURRENT_DATA_PROVIDER)]
    pub provider: String,
    #[arg(short, long)]
    pub password: String,
    pub plaintext: String,
}

#[derive(Debug, Args)]
pub struct DecryptParams {
    /// The provider's external id
    #[arg(short = 'i', long = "provider", default_value = CURRENT_DATA_PROVIDER)]
    pub provider: String,
    #[arg(short, long)]
    pub password: String,
    /// Base64-encoded ciphertext
    pub ciphertext: String,
}

pub fn handle_crypto_command(command: CryptoCommand) {
    let registry = match CryptoProviderRegistry::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Could not build the crypto provider registry. {e}");
            return;
        },
    };
    let result = match command {
        CryptoCommand::Providers => Ok(providers_table(&registry)),
        CryptoCommand::Encrypt(params) => encrypt(&registry, params),
        CryptoCommand::Decrypt(params) => decrypt(&registry, params),
    };
    match result {
        Ok(output) => println!("{output}"),
        Err(e) => eprintln!("{e}"),
    }
}

fn providers_table(registry: &CryptoProviderRegistry) -> String {
    let mut lines = vec![format!("{:<12} {:<22} {:>4} {:>6}  {:<22} Current", "Id", "Cipher", "Bits", "Iter", "KDF")];
    for algorithm in registry.algorithms() {
        let current = match algorithm.external_id {
            id if id == registry.current_id_provider() => "ids",
            id if id == registry.current_data_provider() => "data",
            _ => "",
        };
        lines.push(format!(
            "{:<12} {:<22} {:>4} {:>6}  {:<22} {current}",
            algorithm.external_id,
            algorithm.cipher.to_string(),
            algorithm.key_bits,
            algorithm.kdf_iterations,
            algorithm.kdf.to_string()
        ));
    }
    lines.join("\n")
}

fn encrypt(registry: &CryptoProviderRegistry, params: EncryptParams) -> Result<String> {
    let password = Secret::new(params.password);
    let encrypted = registry.encrypt(&params.provider, params.plaintext.as_bytes(), password.reveal().as_bytes())?;
    Ok(base64::encode(encrypted.data))
}

fn decrypt(registry: &CryptoProviderRegistry, params: DecryptParams) -> Result<String> {
    let password = Secret::new(params.password);
    let ciphertext =
        base64::decode(params.ciphertext.trim()).map_err(|e| anyhow!("The ciphertext is not valid base64. {e}"))?;
    let plaintext = registry.decrypt(&params.provider, &ciphertext, password.reveal().as_bytes())?;
    match String::from_utf8(plaintext) {
        Ok(s) => Ok(s),
        Err(e) => Ok(format!("(binary) {}", hex::encode(e.into_bytes()))),
    }
}

use clap::{Parser, Subcommand};

mod certs;
mod crypto;
mod ids;
mod setup;

use crate::{
    certs::{handle_cert_command, CertCommand},
    crypto::{handle_crypto_command, CryptoCommand},
    ids::{handle_id_command, IdCommand},
    setup::{handle_setup_command, SetupCommand},
};

#[derive(Parser, Debug)]
#[command(version, about = "Operator tools for the XS2A gateway")]
pub struct Arguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inspect TPP certificates
    #[command(subcommand)]
    Cert(CertCommand),
    /// Work with the crypto provider registry
    #[command(subcommand)]
    Crypto(CryptoCommand),
    /// Mint and read encrypted resource ids
    #[command(subcommand)]
    Id(IdCommand),
    /// Prepare the gateway's database
    #[command(subcommand)]
    Setup(SetupCommand),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();
    let cli = Arguments::parse();
    match cli.command {
        Command::Cert(command) => handle_cert_command(command),
        Command::Crypto(command) => handle_crypto_command(command),
        Command::Id(command) => handle_id_command(command),
        Command::Setup(command) => handle_setup_command(command).await,
    }
}

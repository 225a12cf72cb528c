use std::{env, path::PathBuf};

use chrono::Duration;
use log::*;
use rand::{distributions::Alphanumeric, Rng};
use xs2a_common::{
    helpers::{parse_boolean_flag, parse_list},
    Secret,
};
use xs2a_engine::{
    certificate::{decode_certificate_bundle, BlockedSet, CertificateValidator},
    ScaConfig,
};

use crate::errors::ServerError;

const DEFAULT_XS2A_HOST: &str = "127.0.0.1";
const DEFAULT_XS2A_PORT: u16 = 8370;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/xs2a_store.db";
const DEFAULT_QWAC_HEADER: &str = "TPP-Signature-Certificate";
const DEFAULT_AUTHORISATION_TTL_SECS: i64 = 30 * 60;
const DEFAULT_EXPIRY_CHECK_INTERVAL_SECS: i64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The secret that encrypts the resource ids handed out to TPPs. Changing it invalidates every id in circulation.
    pub server_key: Secret<String>,
    pub trust: TrustConfig,
    pub signing_basket_supported: bool,
    /// How long a TPP has to complete an authorisation before it is failed.
    pub authorisation_ttl: Duration,
    pub expiry_check_interval: Duration,
    /// The request header carrying the TPP's QWAC, as forwarded by the TLS-terminating proxy.
    pub qwac_header: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_XS2A_HOST.to_string(),
            port: DEFAULT_XS2A_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            server_key: Secret::default(),
            trust: TrustConfig::default(),
            signing_basket_supported: false,
            authorisation_ttl: Duration::seconds(DEFAULT_AUTHORISATION_TTL_SECS),
            expiry_check_interval: Duration::seconds(DEFAULT_EXPIRY_CHECK_INTERVAL_SECS),
            qwac_header: DEFAULT_QWAC_HEADER.to_string(),
            use_x_forwarded_for: false,
            use_forwarded: false,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("XS2A_HOST").ok().unwrap_or_else(|| DEFAULT_XS2A_HOST.into());
        let port = env::var("XS2A_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for XS2A_PORT. {e} Using the default, {DEFAULT_XS2A_PORT}, instead."
                    );
                    DEFAULT_XS2A_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_XS2A_PORT);
        let database_url = env::var("XS2A_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ XS2A_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.to_string()
        });
        let server_key = env::var("XS2A_SERVER_KEY").ok().filter(|s| !s.is_empty()).unwrap_or_else(|| {
            warn!(
                "🚨️🚨️🚨️ XS2A_SERVER_KEY has not been set. I'm using a random value for this session. Resource ids \
                 issued now will be unreadable after a restart. DO NOT operate on production like this. 🚨️🚨️🚨️"
            );
            rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect()
        });
        let trust = TrustConfig::from_env();
        let signing_basket_supported = parse_boolean_flag(env::var("XS2A_SIGNING_BASKET_SUPPORTED").ok(), false);
        let authorisation_ttl = seconds_from_env("XS2A_AUTHORISATION_TTL", DEFAULT_AUTHORISATION_TTL_SECS);
        let expiry_check_interval = seconds_from_env("XS2A_EXPIRY_CHECK_INTERVAL", DEFAULT_EXPIRY_CHECK_INTERVAL_SECS);
        let qwac_header = env::var("XS2A_QWAC_HEADER").ok().unwrap_or_else(|| DEFAULT_QWAC_HEADER.into());
        let use_x_forwarded_for = parse_boolean_flag(env::var("XS2A_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("XS2A_USE_FORWARDED").ok(), false);
        Self {
            host,
            port,
            database_url,
            server_key: Secret::new(server_key),
            trust,
            signing_basket_supported,
            authorisation_ttl,
            expiry_check_interval,
            qwac_header,
            use_x_forwarded_for,
            use_forwarded,
        }
    }

    pub fn sca_config(&self) -> ScaConfig {
        ScaConfig {
            signing_basket_supported: self.signing_basket_supported,
            authorisation_ttl: self.authorisation_ttl,
            ..ScaConfig::default()
        }
    }
}

fn seconds_from_env(name: &str, default: i64) -> Duration {
    env::var(name)
        .map_err(|_| info!("🪛️ {name} is not set. Using the default value of {default}s."))
        .and_then(|s| {
            s.parse::<i64>()
                .ok()
                .filter(|v| *v > 0)
                .map(Duration::seconds)
                .ok_or_else(|| warn!("🪛️ Invalid configuration value for {name}: {s}. Using {default}s."))
        })
        .ok()
        .unwrap_or_else(|| Duration::seconds(default))
}

//-------------------------------------------------  TrustConfig  ------------------------------------------------------
/// Where the certificate validator gets its trust anchors from.
#[derive(Clone, Debug, Default)]
pub struct TrustConfig {
    pub trusted_roots: Vec<PathBuf>,
    pub trusted_intermediates: Vec<PathBuf>,
    /// Hex SHA-256 fingerprints of revoked or otherwise banned certificates.
    pub blocked_certificates: Vec<String>,
}

impl TrustConfig {
    pub fn from_env() -> Self {
        let paths = |name: &str| {
            env::var(name).map(|s| parse_list(&s).into_iter().map(PathBuf::from).collect()).unwrap_or_default()
        };
        let trusted_roots: Vec<PathBuf> = paths("XS2A_TRUSTED_ROOTS");
        if trusted_roots.is_empty() {
            warn!("🪛️ XS2A_TRUSTED_ROOTS is empty. Every TPP certificate will be rejected.");
        }
        let trusted_intermediates = paths("XS2A_TRUSTED_INTERMEDIATES");
        let blocked_certificates =
            env::var("XS2A_BLOCKED_CERTIFICATES").map(|s| parse_list(&s)).unwrap_or_default();
        Self { trusted_roots, trusted_intermediates, blocked_certificates }
    }

    /// Reads the PEM files and builds the validator.
    pub fn load_validator(&self) -> Result<CertificateValidator, ServerError> {
        let roots = load_bundles(&self.trusted_roots)?;
        let intermediates = load_bundles(&self.trusted_intermediates)?;
        let blocked = BlockedSet::from_hex_fingerprints(&self.blocked_certificates)
            .map_err(|e| ServerError::ConfigurationError(format!("XS2A_BLOCKED_CERTIFICATES: {e}")))?;
        Ok(CertificateValidator::new(roots, intermediates, blocked))
    }
}

fn load_bundles(paths: &[PathBuf]) -> Result<Vec<Vec<u8>>, ServerError> {
    let mut result = Vec::new();
    for path in paths {
        let pem = std::fs::read(path).map_err(|e| {
            ServerError::ConfigurationError(format!("Could not read certificate file {}. {e}", path.display()))
        })?;
        let certs = decode_certificate_bundle(&pem)
            .map_err(|e| ServerError::ConfigurationError(format!("{}: {e}", path.display())))?;
        debug!("🪛️ Loaded {} certificates from {}", certs.len(), path.display());
        result.extend(certs);
    }
    Ok(result)
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that is used to configure the server's behaviour. Generally we try to keep this
/// as small as possible, and exclude secrets to avoid passing sensitive information around the system.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub qwac_header: String,
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            qwac_header: config.qwac_header.clone(),
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
        }
    }
}

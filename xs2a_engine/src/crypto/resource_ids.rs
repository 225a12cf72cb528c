//! Encrypted consent and payment identifiers.
//!
//! TPPs never see internal resource ids. A resource id is handed out as
//!
//! ```text
//! base64url( encrypt_id_provider( internal_id "_=_" consent_key "_=_" data_provider_id, server_key ) ) "_=_" id_provider_id
//! ```
//!
//! The consent key is a random password minted together with the id. It is the password for the resource's opaque
//! state, which is encrypted with the data provider recorded inside the id. Neither the key nor the state can be
//! recovered without the server key.
use std::{fmt::Debug, sync::Arc};

use log::*;
use rand::{distributions::Alphanumeric, Rng};
use xs2a_common::Secret;

use super::{CryptoError, CryptoProviderRegistry};
use crate::db_types::OpaqueState;

pub const ID_SEPARATOR: &str = "_=_";
const CONSENT_KEY_LENGTH: usize = 16;

/// The decrypted contents of an external resource id.
#[derive(Debug, Clone)]
pub struct ResourceKey {
    pub resource_id: String,
    pub consent_key: Secret<String>,
    pub data_provider: String,
}

#[derive(Clone)]
pub struct ResourceIdCodec {
    registry: Arc<CryptoProviderRegistry>,
    server_key: Secret<String>,
}

impl Debug for ResourceIdCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceIdCodec({:?}, server_key: {})", self.registry, self.server_key)
    }
}

impl ResourceIdCodec {
    pub fn new(registry: Arc<CryptoProviderRegistry>, server_key: Secret<String>) -> Self {
        Self { registry, server_key }
    }

    pub fn registry(&self) -> &CryptoProviderRegistry {
        self.registry.as_ref()
    }

    /// Mints a new external id for `resource_id` under the current id and data providers.
    pub fn encrypt_id(&self, resource_id: &str) -> Result<String, CryptoError> {
        if resource_id.is_empty() || resource_id.contains(ID_SEPARATOR) {
            return Err(CryptoError::MalformedId(format!("'{resource_id}' cannot be used as a resource id")));
        }
        let consent_key = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CONSENT_KEY_LENGTH)
            .map(char::from)
            .collect::<String>();
        let data_provider = self.registry.current_data_provider();
        let composite =
            Secret::new(format!("{resource_id}{ID_SEPARATOR}{consent_key}{ID_SEPARATOR}{data_provider}").into_bytes());
        let encrypted = self.registry.encrypt(
            self.registry.current_id_provider(),
            composite.reveal(),
            self.server_key.reveal().as_bytes(),
        )?;
        let encoded = base64::encode_config(&encrypted.data, base64::URL_SAFE_NO_PAD);
        Ok(format!("{encoded}{ID_SEPARATOR}{}", encrypted.provider_id))
    }

    pub fn decrypt_id(&self, external_id: &str) -> Result<ResourceKey, CryptoError> {
        let (encoded, provider_id) = external_id
            .rsplit_once(ID_SEPARATOR)
            .ok_or_else(|| CryptoError::MalformedId("the crypto provider suffix is missing".into()))?;
        let ciphertext = base64::decode_config(encoded, base64::URL_SAFE_NO_PAD)
            .map_err(|e| CryptoError::MalformedId(format!("invalid base64: {e}")))?;
        let plaintext = self.registry.decrypt(provider_id, &ciphertext, self.server_key.reveal().as_bytes())?;
        let composite = Secret::new(
            String::from_utf8(plaintext).map_err(|_| CryptoError::MalformedId("the decrypted id is not UTF-8".into()))?,
        );
        let mut parts = composite.reveal().split(ID_SEPARATOR);
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(key), Some(data_provider), None) if !id.is_empty() && !key.is_empty() => {
                trace!("🔐️ Decrypted resource id {id} (data provider {data_provider})");
                Ok(ResourceKey {
                    resource_id: id.to_string(),
                    consent_key: Secret::new(key.to_string()),
                    data_provider: data_provider.to_string(),
                })
            },
            _ => Err(CryptoError::MalformedId("the decrypted id does not have three parts".into())),
        }
    }

    /// Encrypts opaque state for the resource with the data provider fixed when its id was minted.
    pub fn encrypt_state(&self, key: &ResourceKey, plaintext: &[u8]) -> Result<OpaqueState, CryptoError> {
        let encrypted =
            self.registry.encrypt(&key.data_provider, plaintext, key.consent_key.reveal().as_bytes())?;
        Ok(OpaqueState { data: encrypted.data, provider_id: encrypted.provider_id })
    }

    /// Decrypts opaque state with whichever provider wrote it.
    pub fn decrypt_state(&self, key: &ResourceKey, state: &OpaqueState) -> Result<Vec<u8>, CryptoError> {
        self.registry.decrypt(&state.provider_id, &state.data, key.consent_key.reveal().as_bytes())
    }
}

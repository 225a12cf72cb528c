use std::{collections::HashMap, fmt::Debug, sync::Arc};

use log::*;

use super::{
    aes_ecb::AesEcbProvider,
    aes_gcm::AesGcmProvider,
    algorithm::{CipherFamily, CryptoAlgorithm, CURRENT_DATA_PROVIDER, CURRENT_ID_PROVIDER, KNOWN_ALGORITHMS},
    CryptoError,
};

/// A concrete cipher bound to one immutable [`CryptoAlgorithm`].
pub trait CryptoProvider: Send + Sync {
    fn algorithm(&self) -> &CryptoAlgorithm;

    fn external_id(&self) -> &str {
        self.algorithm().external_id
    }

    fn encrypt(&self, plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, ciphertext: &[u8], password: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// Ciphertext together with the id of the provider that produced it. The id must be stored with the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedData {
    pub data: Vec<u8>,
    pub provider_id: String,
}

/// Builds the provider for one of the built-in cipher families.
pub fn provider_for(algorithm: CryptoAlgorithm) -> Result<Arc<dyn CryptoProvider>, CryptoError> {
    let provider: Arc<dyn CryptoProvider> = match algorithm.cipher {
        CipherFamily::AesEcb => Arc::new(AesEcbProvider::new(algorithm)?),
        CipherFamily::AesGcm => Arc::new(AesGcmProvider::new(algorithm)?),
    };
    Ok(provider)
}

/// Maps external algorithm ids to providers.
///
/// The registry is built once at start-up and handed to every consumer. Two of the registered providers are marked
/// "current": one for newly minted identifiers and one for newly written consent data. Providers that are no longer
/// current stay registered so that data written under them can still be decrypted.
#[derive(Clone)]
pub struct CryptoProviderRegistry {
    providers: HashMap<String, Arc<dyn CryptoProvider>>,
    current_id_provider: String,
    current_data_provider: String,
}

impl Debug for CryptoProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids = self.providers.keys().collect::<Vec<_>>();
        ids.sort();
        write!(
            f,
            "CryptoProviderRegistry(providers: {ids:?}, id: {}, data: {})",
            self.current_id_provider, self.current_data_provider
        )
    }
}

impl CryptoProviderRegistry {
    /// The registry with every built-in algorithm and the hard-coded current selection.
    pub fn new() -> Result<Self, CryptoError> {
        let providers = KNOWN_ALGORITHMS.into_iter().map(provider_for).collect::<Result<Vec<_>, _>>()?;
        Self::with_providers(providers, CURRENT_ID_PROVIDER, CURRENT_DATA_PROVIDER)
    }

    pub fn with_providers(
        providers: Vec<Arc<dyn CryptoProvider>>,
        current_id_provider: &str,
        current_data_provider: &str,
    ) -> Result<Self, CryptoError> {
        let mut map = HashMap::with_capacity(providers.len());
        for provider in providers {
            let id = provider.external_id().to_string();
            if map.contains_key(&id) {
                return Err(CryptoError::DuplicateProvider(id));
            }
            trace!("🔐️ Registering crypto provider {}", provider.algorithm());
            map.insert(id, provider);
        }
        for current in [current_id_provider, current_data_provider] {
            if !map.contains_key(current) {
                return Err(CryptoError::UnknownProvider(current.to_string()));
            }
        }
        debug!("🔐️ {} crypto providers registered", map.len());
        Ok(Self {
            providers: map,
            current_id_provider: current_id_provider.to_string(),
            current_data_provider: current_data_provider.to_string(),
        })
    }

    /// The provider for `provider_id`, if one is registered. Unknown ids are an expected condition when reading data
    /// written by a newer or foreign deployment.
    pub fn resolve(&self, provider_id: &str) -> Option<&dyn CryptoProvider> {
        self.providers.get(provider_id).map(|p| p.as_ref())
    }

    pub fn current_id_provider(&self) -> &str {
        self.current_id_provider.as_str()
    }

    pub fn current_data_provider(&self) -> &str {
        self.current_data_provider.as_str()
    }

    pub fn algorithms(&self) -> Vec<&CryptoAlgorithm> {
        let mut result = self.providers.values().map(|p| p.algorithm()).collect::<Vec<_>>();
        result.sort_by_key(|a| a.external_id);
        result
    }

    pub fn encrypt(&self, provider_id: &str, plaintext: &[u8], password: &[u8]) -> Result<EncryptedData, CryptoError> {
        let provider = self.resolve(provider_id).ok_or_else(|| CryptoError::UnknownProvider(provider_id.into()))?;
        let data = provider.encrypt(plaintext, password)?;
        Ok(EncryptedData { data, provider_id: provider_id.to_string() })
    }

    pub fn decrypt(&self, provider_id: &str, ciphertext: &[u8], password: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let provider = self.resolve(provider_id).ok_or_else(|| {
            warn!("🔐️ Cannot decrypt data: no crypto provider with id {provider_id}");
            CryptoError::UnknownProvider(provider_id.into())
        })?;
        provider.decrypt(ciphertext, password)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::{
        algorithm::{AES_ECB_256_1K, AES_ECB_256_65K, AES_GCM_256_1K, AES_GCM_256_65K},
        DecryptionFailure,
    };

    fn registry() -> CryptoProviderRegistry {
        CryptoProviderRegistry::new().expect("default registry")
    }

    #[test]
    fn current_providers() {
        let registry = registry();
        assert_eq!(registry.current_id_provider(), "gQ8wkMeo93");
        assert_eq!(registry.current_data_provider(), "psGLvQpt9Q");
        let id = registry.resolve(registry.current_id_provider()).unwrap().algorithm();
        assert_eq!(id.cipher, CipherFamily::AesEcb);
        assert_eq!(id.kdf_iterations, 1024);
        let data = registry.resolve(registry.current_data_provider()).unwrap().algorithm();
        assert_eq!(data.cipher, CipherFamily::AesGcm);
        assert_eq!(data.kdf_iterations, 65536);
        assert_eq!(registry.algorithms().len(), 4);
    }

    #[test]
    fn round_trip_every_provider_including_empty_payloads() {
        let registry = registry();
        let payloads: [&[u8]; 4] = [b"", b"a", b"exactly16bytes!!", &[0xffu8; 1000]];
        for algorithm in [AES_ECB_256_1K, AES_ECB_256_65K, AES_GCM_256_1K, AES_GCM_256_65K] {
            for payload in payloads {
                let encrypted = registry.encrypt(algorithm.external_id, payload, b"correct horse").unwrap();
                assert_eq!(encrypted.provider_id, algorithm.external_id);
                let decrypted = registry.decrypt(algorithm.external_id, &encrypted.data, b"correct horse").unwrap();
                assert_eq!(decrypted, payload, "{algorithm}");
            }
        }
    }

    #[test]
    fn wrong_password_is_always_reported_as_such() {
        let registry = registry();
        for algorithm in [AES_ECB_256_1K, AES_ECB_256_65K, AES_GCM_256_1K, AES_GCM_256_65K] {
            for n in 0..3u8 {
                let payload = vec![n; n as usize * 7];
                let encrypted = registry.encrypt(algorithm.external_id, &payload, b"right").unwrap();
                let password = format!("wrong-{n}");
                let err = registry.decrypt(algorithm.external_id, &encrypted.data, password.as_bytes()).unwrap_err();
                assert_eq!(err, CryptoError::DecryptionFailed(DecryptionFailure::WrongPassword), "{algorithm}");
                assert!(err.is_wrong_password());
            }
        }
    }

    #[test]
    fn unknown_provider_fails_cleanly() {
        let registry = registry();
        let err = registry.decrypt("retired123", b"whatever", b"pw").unwrap_err();
        assert_eq!(err, CryptoError::UnknownProvider("retired123".into()));
        assert!(registry.resolve("retired123").is_none());
        assert!(matches!(registry.encrypt("nope", b"x", b"pw"), Err(CryptoError::UnknownProvider(_))));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let providers = vec![provider_for(AES_ECB_256_1K).unwrap(), provider_for(AES_ECB_256_1K).unwrap()];
        let err = CryptoProviderRegistry::with_providers(providers, "gQ8wkMeo93", "gQ8wkMeo93").unwrap_err();
        assert_eq!(err, CryptoError::DuplicateProvider("gQ8wkMeo93".into()));
    }

    #[test]
    fn current_providers_must_be_registered() {
        let providers = vec![provider_for(AES_ECB_256_1K).unwrap()];
        let err = CryptoProviderRegistry::with_providers(providers, "gQ8wkMeo93", "psGLvQpt9Q").unwrap_err();
        assert_eq!(err, CryptoError::UnknownProvider("psGLvQpt9Q".into()));
    }

    #[test]
    fn retired_providers_still_decrypt() {
        let legacy = registry().encrypt(AES_GCM_256_1K.external_id, b"old state", b"pw").unwrap();
        // A deployment that moved on to a new current provider keeps the old one registered
        let providers = vec![
            provider_for(AES_ECB_256_65K).unwrap(),
            provider_for(AES_GCM_256_65K).unwrap(),
            provider_for(AES_GCM_256_1K).unwrap(),
        ];
        let registry = CryptoProviderRegistry::with_providers(providers, "nML0IXWdMa", "psGLvQpt9Q").unwrap();
        assert_eq!(registry.decrypt(&legacy.provider_id, &legacy.data, b"pw").unwrap(), b"old state");
    }
}

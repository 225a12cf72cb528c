use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit, Nonce};
use rand::{rngs::OsRng, RngCore};

use super::{
    algorithm::{CipherFamily, CryptoAlgorithm},
    kdf::derive_key,
    CryptoError,
    CryptoProvider,
    DecryptionFailure,
};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM with a PBKDF2 key. The output layout is `salt || nonce || ciphertext || tag`.
pub struct AesGcmProvider {
    algorithm: CryptoAlgorithm,
}

impl AesGcmProvider {
    pub fn new(algorithm: CryptoAlgorithm) -> Result<Self, CryptoError> {
        if algorithm.cipher != CipherFamily::AesGcm || algorithm.key_bits != 256 {
            return Err(CryptoError::UnsupportedAlgorithm(
                algorithm.external_id.to_string(),
                "the GCM provider requires AES-256".into(),
            ));
        }
        Ok(Self { algorithm })
    }
}

impl CryptoProvider for AesGcmProvider {
    fn algorithm(&self) -> &CryptoAlgorithm {
        &self.algorithm
    }

    fn encrypt(&self, plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);
        let key = derive_key(&self.algorithm, password, &salt);
        let cipher = Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        let mut result = Vec::with_capacity(SALT_LEN + NONCE_LEN + sealed.len());
        result.extend_from_slice(&salt);
        result.extend_from_slice(&nonce);
        result.extend_from_slice(&sealed);
        Ok(result)
    }

    fn decrypt(&self, ciphertext: &[u8], password: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < SALT_LEN + NONCE_LEN + TAG_LEN {
            return Err(DecryptionFailure::CorruptData(format!(
                "{} bytes is too short for a GCM ciphertext",
                ciphertext.len()
            ))
            .into());
        }
        let (salt, rest) = ciphertext.split_at(SALT_LEN);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        let key = derive_key(&self.algorithm, password, salt);
        let cipher =
            Aes256Gcm::new_from_slice(key.as_slice()).map_err(|e| DecryptionFailure::CorruptData(e.to_string()))?;
        // The tag cannot tell a wrong key from a modified message. A key mismatch is by far the common case.
        let plaintext =
            cipher.decrypt(Nonce::from_slice(nonce), sealed).map_err(|_| DecryptionFailure::WrongPassword)?;
        Ok(plaintext)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::algorithm::AES_GCM_256_1K;

    #[test]
    fn encryption_is_randomised() {
        let provider = AesGcmProvider::new(AES_GCM_256_1K).unwrap();
        let a = provider.encrypt(b"state", b"key").unwrap();
        let b = provider.encrypt(b"state", b"key").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), SALT_LEN + NONCE_LEN + 5 + TAG_LEN);
        assert_eq!(provider.decrypt(&a, b"key").unwrap(), b"state");
        assert_eq!(provider.decrypt(&b, b"key").unwrap(), b"state");
    }

    #[test]
    fn short_input_is_corrupt() {
        let provider = AesGcmProvider::new(AES_GCM_256_1K).unwrap();
        let err = provider.decrypt(&[0u8; 20], b"key").unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed(DecryptionFailure::CorruptData(_))));
    }
}

use aes::{
    cipher::{block_padding::Pkcs7, BlockDecrypt, BlockDecryptMut, BlockEncryptMut, KeyInit},
    Aes256,
    Block,
};
use subtle::ConstantTimeEq;

use super::{
    algorithm::{CipherFamily, CryptoAlgorithm},
    kdf::derive_key,
    CryptoError,
    CryptoProvider,
    DecryptionFailure,
};

type Aes256EcbEnc = ecb::Encryptor<Aes256>;
type Aes256EcbDec = ecb::Decryptor<Aes256>;

const BLOCK_SIZE: usize = 16;
/// ECB output must be reproducible for a given password, so the key derivation salt is fixed.
const ECB_SALT: &[u8] = b"xs2a-identifier-salt";
/// Prepended to every plaintext. ECB has no integrity check, so this block is how a wrong password is told apart
/// from valid-looking garbage.
const KEY_CHECK_BLOCK: [u8; BLOCK_SIZE] = *b"xs2a:key-check:1";

pub struct AesEcbProvider {
    algorithm: CryptoAlgorithm,
}

impl AesEcbProvider {
    pub fn new(algorithm: CryptoAlgorithm) -> Result<Self, CryptoError> {
        if algorithm.cipher != CipherFamily::AesEcb || algorithm.key_bits != 256 {
            return Err(CryptoError::UnsupportedAlgorithm(
                algorithm.external_id.to_string(),
                "the ECB provider requires AES-256".into(),
            ));
        }
        Ok(Self { algorithm })
    }
}

impl CryptoProvider for AesEcbProvider {
    fn algorithm(&self) -> &CryptoAlgorithm {
        &self.algorithm
    }

    fn encrypt(&self, plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = derive_key(&self.algorithm, password, ECB_SALT);
        let encryptor =
            Aes256EcbEnc::new_from_slice(key.as_slice()).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
        let mut buffer = Vec::with_capacity(BLOCK_SIZE + plaintext.len());
        buffer.extend_from_slice(&KEY_CHECK_BLOCK);
        buffer.extend_from_slice(plaintext);
        Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(&buffer))
    }

    fn decrypt(&self, ciphertext: &[u8], password: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < 2 * BLOCK_SIZE || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(DecryptionFailure::CorruptData(format!(
                "{} bytes is not a valid ECB ciphertext length",
                ciphertext.len()
            ))
            .into());
        }
        let key = derive_key(&self.algorithm, password, ECB_SALT);
        let cipher = Aes256::new_from_slice(key.as_slice())
            .map_err(|e| DecryptionFailure::CorruptData(e.to_string()))?;
        let mut check = Block::clone_from_slice(&ciphertext[..BLOCK_SIZE]);
        cipher.decrypt_block(&mut check);
        if !bool::from(check.as_slice().ct_eq(&KEY_CHECK_BLOCK)) {
            return Err(DecryptionFailure::WrongPassword.into());
        }
        let decryptor =
            Aes256EcbDec::new_from_slice(key.as_slice()).map_err(|e| DecryptionFailure::CorruptData(e.to_string()))?;
        let mut plaintext = decryptor
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| DecryptionFailure::CorruptData("invalid padding".into()))?;
        plaintext.drain(..BLOCK_SIZE);
        Ok(plaintext)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::algorithm::{AES_ECB_256_1K, AES_GCM_256_1K};

    #[test]
    fn ecb_is_deterministic() {
        let provider = AesEcbProvider::new(AES_ECB_256_1K).unwrap();
        let a = provider.encrypt(b"consent-1", b"server key").unwrap();
        let b = provider.encrypt(b"consent-1", b"server key").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_eq!(provider.decrypt(&a, b"server key").unwrap(), b"consent-1");
    }

    #[test]
    fn truncated_ciphertext_is_corrupt() {
        let provider = AesEcbProvider::new(AES_ECB_256_1K).unwrap();
        let ct = provider.encrypt(b"0123456789abcdef0123", b"pw").unwrap();
        let err = provider.decrypt(&ct[..ct.len() - 1], b"pw").unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed(DecryptionFailure::CorruptData(_))));
        // Dropping a whole block leaves the padding of the second block invalid
        let err = provider.decrypt(&ct[..32], b"pw").unwrap_err();
        assert!(matches!(err, CryptoError::DecryptionFailed(DecryptionFailure::CorruptData(_))));
    }

    #[test]
    fn rejects_other_families() {
        assert!(AesEcbProvider::new(AES_GCM_256_1K).is_err());
    }
}

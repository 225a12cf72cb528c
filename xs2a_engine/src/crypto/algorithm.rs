use std::fmt::Display;

use serde::Serialize;

/// The external id of the provider used for new encrypted identifiers. Identifiers are short and decrypted on every
/// request, so they use the cheap ECB family with the low-iteration key derivation.
pub const CURRENT_ID_PROVIDER: &str = AES_ECB_256_1K.external_id;
/// The external id of the provider used for new opaque consent and payment state.
pub const CURRENT_DATA_PROVIDER: &str = AES_GCM_256_65K.external_id;

/// Symmetric key size shared by every registered algorithm.
pub const KEY_BYTES: usize = 32;

//--------------------------------------   CipherFamily     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CipherFamily {
    /// Deterministic AES in ECB mode with PKCS#7 padding. Equal plaintexts under the same password produce equal
    /// ciphertexts, so this family is only used for compact identifiers, never for payloads.
    AesEcb,
    /// AES-GCM with a random salt and nonce per message. Tampering and wrong keys are detected by the tag.
    AesGcm,
}

impl Display for CipherFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CipherFamily::AesEcb => write!(f, "AES/ECB/PKCS7Padding"),
            CipherFamily::AesGcm => write!(f, "AES/GCM/NoPadding"),
        }
    }
}

//--------------------------------------      KdfHash       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KdfHash {
    Sha256,
    Sha512,
}

impl Display for KdfHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KdfHash::Sha256 => write!(f, "PBKDF2WithHmacSHA256"),
            KdfHash::Sha512 => write!(f, "PBKDF2WithHmacSHA512"),
        }
    }
}

//--------------------------------------  CryptoAlgorithm   ---------------------------------------------------------
/// The full parameter set of a cipher. Once an `external_id` has been used to produce ciphertext its parameters are
/// frozen: old data can only be decrypted if every value here is reproduced exactly. New variants get a new id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CryptoAlgorithm {
    pub external_id: &'static str,
    pub cipher: CipherFamily,
    pub key_bits: usize,
    pub kdf_iterations: u32,
    pub kdf: KdfHash,
}

impl Display for CryptoAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, {} bit key, {} x {})",
            self.external_id, self.cipher, self.key_bits, self.kdf_iterations, self.kdf
        )
    }
}

pub const AES_ECB_256_1K: CryptoAlgorithm = CryptoAlgorithm {
    external_id: "gQ8wkMeo93",
    cipher: CipherFamily::AesEcb,
    key_bits: 256,
    kdf_iterations: 1024,
    kdf: KdfHash::Sha256,
};

pub const AES_ECB_256_65K: CryptoAlgorithm = CryptoAlgorithm {
    external_id: "nML0IXWdMa",
    cipher: CipherFamily::AesEcb,
    key_bits: 256,
    kdf_iterations: 65536,
    kdf: KdfHash::Sha256,
};

pub const AES_GCM_256_1K: CryptoAlgorithm = CryptoAlgorithm {
    external_id: "bS6p6XvTWI",
    cipher: CipherFamily::AesGcm,
    key_bits: 256,
    kdf_iterations: 1024,
    kdf: KdfHash::Sha256,
};

pub const AES_GCM_256_65K: CryptoAlgorithm = CryptoAlgorithm {
    external_id: "psGLvQpt9Q",
    cipher: CipherFamily::AesGcm,
    key_bits: 256,
    kdf_iterations: 65536,
    kdf: KdfHash::Sha512,
};

/// Every algorithm this build knows how to decrypt, current or retired.
pub const KNOWN_ALGORITHMS: [CryptoAlgorithm; 4] = [AES_ECB_256_1K, AES_ECB_256_65K, AES_GCM_256_1K, AES_GCM_256_65K];

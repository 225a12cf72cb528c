//! Versioned symmetric encryption.
//!
//! Every cipher variant is described by an immutable [`CryptoAlgorithm`] with a short external id that is stored
//! next to the ciphertext it produced. The [`CryptoProviderRegistry`] resolves those ids back to providers, and
//! [`ResourceIdCodec`] builds the encrypted resource ids and opaque-state encryption on top of it.
mod aes_ecb;
mod aes_gcm;
mod algorithm;
mod errors;
mod kdf;
mod registry;
mod resource_ids;

pub use algorithm::{
    CipherFamily,
    CryptoAlgorithm,
    KdfHash,
    AES_ECB_256_1K,
    AES_ECB_256_65K,
    AES_GCM_256_1K,
    AES_GCM_256_65K,
    CURRENT_DATA_PROVIDER,
    CURRENT_ID_PROVIDER,
    KNOWN_ALGORITHMS,
};
pub use errors::{CryptoError, DecryptionFailure};
pub use registry::{provider_for, CryptoProvider, CryptoProviderRegistry, EncryptedData};
pub use resource_ids::{ResourceIdCodec, ResourceKey, ID_SEPARATOR};

//! XS2A Engine
//!
//! The engine holds the core of a PSD2 XS2A access gateway: the logic that decides whether a third-party provider may
//! act on a PSU's accounts, and walks the PSU through strong customer authentication (SCA) before the bank releases
//! data or executes a payment. It does not know about HTTP or about any particular bank.
//!
//! The library is divided into these sections:
//! 1. [`mod@crypto`]: versioned symmetric encryption, used for the opaque core-banking state and for the encrypted
//!    resource ids handed to TPPs.
//! 2. [`mod@certificate`]: decoding and validating the TPP's qualified certificate, and reading its PSD2 roles.
//! 3. [`mod@sca_api`]: the public API. [`AuthorisationApi`] creates and expires authorisations, [`ScaFlowApi`] moves
//!    them through the SCA state machine.
//! 4. [`mod@traits`]: the contracts for storage backends and the bank's core-banking interface. [`SqliteDatabase`] is
//!    the bundled storage backend.
//!
//! The engine also publishes events when an authorisation changes status. Hook into them through
//! [`events::EventHooks`].
pub mod certificate;
pub mod crypto;
pub mod db_types;
pub mod events;
pub mod sca_api;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use sca_api::{
    method_decider,
    AuthorisationApi,
    AuthorisationRequest,
    AuthorisationResult,
    NextStep,
    PsuDataUpdate,
    ScaConfig,
    ScaError,
    ScaFlowApi,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

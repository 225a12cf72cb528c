//! # SCA authorisation API
//!
//! The public, backend-agnostic API of the engine.
//!
//! * [`AuthorisationApi`] creates authorisations (deciding explicit vs. implicit flow with the [`method_decider`]),
//!   answers status queries and expires stale authorisations.
//! * [`ScaFlowApi`] advances an authorisation one PSU update at a time, calling the bank through a
//!   [`CoreBankingSpi`](crate::traits::CoreBankingSpi).
//!
//! Both are created from a storage backend implementing
//! [`AuthorisationManagement`](crate::traits::AuthorisationManagement):
//!
//! ```rust,ignore
//! use xs2a_engine::{ScaFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = ScaFlowApi::new(db, my_bank, codec, ScaConfig::default(), producers);
//! let result = api.advance_authorisation(&authorisation_id, &tpp, PsuDataUpdate::PsuIdentification(psu)).await?;
//! ```
mod authorisation_api;
mod errors;
pub mod method_decider;
mod sca_flow_api;
pub mod sca_objects;

pub use authorisation_api::AuthorisationApi;
pub use errors::ScaError;
pub use sca_flow_api::ScaFlowApi;
pub use sca_objects::{AuthorisationRequest, AuthorisationResult, NextStep, PsuDataUpdate, ScaConfig, UpdateKind};

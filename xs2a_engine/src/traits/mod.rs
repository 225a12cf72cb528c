//! # Backend contracts
//!
//! The SCA engine is written against two traits and never against a concrete backend.
//!
//! * [`AuthorisationManagement`] stores authorisation records. Backends must serialise concurrent updates of the same
//!   authorisation (see [`AuthorisationLease`]) and must write the SCA status together with the opaque core-banking
//!   state in a single atomic step ([`ScaTransition`]).
//! * [`CoreBankingSpi`] is the bank's side of the protocol: identifying and authenticating the PSU, offering SCA
//!   methods, sending and checking authorisation codes and finally executing the consent or payment. Every call
//!   receives the decrypted opaque state and hands back a (possibly modified) copy in its [`SpiResponse`].
mod authorisation_management;
mod core_banking;

pub use authorisation_management::{
    AuthorisationDbError,
    AuthorisationLease,
    AuthorisationManagement,
    ExpiredAuthorisation,
    LeaseToken,
    ScaTransition,
};
pub use core_banking::{
    CoreBankingSpi,
    SpiAuthenticationStatus,
    SpiAuthorisationCode,
    SpiAvailableScaMethods,
    SpiContext,
    SpiExecution,
    SpiFailure,
    SpiFailureKind,
    SpiPsuAuthentication,
    SpiPsuIdentification,
    SpiResponse,
};

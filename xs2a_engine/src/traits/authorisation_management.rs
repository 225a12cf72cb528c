use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use thiserror::Error;

use crate::db_types::{Authorisation, AuthorisationId, NewAuthorisation, OpaqueState, PsuIdData, ScaMethod, ScaStatus};

#[derive(Debug, Clone, Error)]
pub enum AuthorisationDbError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Authorisation {0} does not exist")]
    NotFound(AuthorisationId),
    #[error("Authorisation {0} already exists")]
    AlreadyExists(AuthorisationId),
    #[error("Authorisation {0} is being updated by another request")]
    AuthorisationBusy(AuthorisationId),
    #[error("The lease on authorisation {0} is not held by this request")]
    LeaseLost(AuthorisationId),
    #[error("Illegal SCA status transition from {from} to {to}")]
    IllegalTransition { from: ScaStatus, to: ScaStatus },
    #[error("Authorisation {id} is {actual}, not {expected}")]
    StatusMismatch { id: AuthorisationId, expected: ScaStatus, actual: ScaStatus },
    #[error("Could not read a stored authorisation. {0}")]
    CorruptRecord(String),
}

impl From<sqlx::Error> for AuthorisationDbError {
    fn from(e: sqlx::Error) -> Self {
        AuthorisationDbError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for AuthorisationDbError {
    fn from(e: serde_json::Error) -> Self {
        AuthorisationDbError::CorruptRecord(e.to_string())
    }
}

/// Proof that the holder has exclusive write access to an authorisation until the lease expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken(String);

impl LeaseToken {
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for LeaseToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for LeaseToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An authorisation, read while holding its lease.
#[derive(Debug, Clone)]
pub struct AuthorisationLease {
    pub authorisation: Authorisation,
    pub token: LeaseToken,
    pub expires_at: DateTime<Utc>,
}

/// An authorisation the expiry job has failed, and the status it had before.
#[derive(Debug, Clone)]
pub struct ExpiredAuthorisation {
    pub previous_status: ScaStatus,
    pub authorisation: Authorisation,
}

/// A single step of the SCA state machine, applied atomically.
///
/// The new status and the opaque state returned by the bank travel together, so a backend cannot persist one without
/// the other. Fields left as `None` keep their stored values.
#[derive(Debug, Clone)]
pub struct ScaTransition {
    from: ScaStatus,
    to: ScaStatus,
    pub opaque_state: Option<OpaqueState>,
    pub psu: Option<PsuIdData>,
    pub chosen_sca_method: Option<String>,
    pub available_sca_methods: Option<Vec<ScaMethod>>,
}

impl ScaTransition {
    /// Fails unless `from -> to` is an edge of the SCA status graph.
    pub fn new(from: ScaStatus, to: ScaStatus) -> Result<Self, AuthorisationDbError> {
        if !from.can_transition_to(to) {
            return Err(AuthorisationDbError::IllegalTransition { from, to });
        }
        Ok(Self { from, to, opaque_state: None, psu: None, chosen_sca_method: None, available_sca_methods: None })
    }

    pub fn from_status(&self) -> ScaStatus {
        self.from
    }

    pub fn to_status(&self) -> ScaStatus {
        self.to
    }

    pub fn with_opaque_state(mut self, state: Option<OpaqueState>) -> Self {
        self.opaque_state = state;
        self
    }

    pub fn with_psu(mut self, psu: PsuIdData) -> Self {
        self.psu = Some(psu);
        self
    }

    pub fn with_chosen_sca_method<S: Into<String>>(mut self, method_id: S) -> Self {
        self.chosen_sca_method = Some(method_id.into());
        self
    }

    pub fn with_available_sca_methods(mut self, methods: Vec<ScaMethod>) -> Self {
        self.available_sca_methods = Some(methods);
        self
    }
}

/// Storage of SCA authorisations.
///
/// Writes to an existing authorisation go through a lease: [`acquire_lease`](Self::acquire_lease) claims the record
/// for one request, [`commit_transition`](Self::commit_transition) applies a status change and releases it, and
/// [`release_lease`](Self::release_lease) gives it up without a change. A second request that tries to claim a leased
/// authorisation is turned away with [`AuthorisationDbError::AuthorisationBusy`]; it never waits and never runs the
/// transition a second time. The holder renews its lease while it waits on the core banking system, so only a holder
/// that has stopped (crashed, or lost its connection) can be taken over.
#[allow(async_fn_in_trait)]
pub trait AuthorisationManagement: Clone {
    async fn insert_authorisation(&self, authorisation: NewAuthorisation) -> Result<Authorisation, AuthorisationDbError>;

    async fn fetch_authorisation(&self, id: &AuthorisationId) -> Result<Option<Authorisation>, AuthorisationDbError>;

    /// All authorisations created for the given (external) resource id, oldest first.
    async fn fetch_authorisations_for_resource(&self, resource_id: &str)
        -> Result<Vec<Authorisation>, AuthorisationDbError>;

    /// Claims exclusive write access to the authorisation for `ttl`. An expired lease held by someone else may be
    /// taken over.
    async fn acquire_lease(
        &self,
        id: &AuthorisationId,
        ttl: Duration,
    ) -> Result<AuthorisationLease, AuthorisationDbError>;

    /// Extends a lease this request still holds to `ttl` from now, and returns the new expiry. Fails with
    /// [`AuthorisationDbError::LeaseLost`] if the lease has been released or taken over.
    async fn renew_lease(
        &self,
        id: &AuthorisationId,
        token: &LeaseToken,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, AuthorisationDbError>;

    /// Gives up a lease without changing the authorisation.
    async fn release_lease(&self, id: &AuthorisationId, token: &LeaseToken) -> Result<(), AuthorisationDbError>;

    /// Applies `transition` in one atomic write and releases the lease. Fails, changing nothing, if the lease is no
    /// longer held or the stored status is not the transition's starting status.
    async fn commit_transition(
        &self,
        id: &AuthorisationId,
        token: &LeaseToken,
        transition: ScaTransition,
    ) -> Result<Authorisation, AuthorisationDbError>;

    /// Marks every non-terminal authorisation whose `expires_at` is not after `now` as failed. Leased authorisations
    /// are skipped; they will be picked up on a later run.
    async fn expire_authorisations(&self, now: DateTime<Utc>)
        -> Result<Vec<ExpiredAuthorisation>, AuthorisationDbError>;
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{AuthorisationId, AuthorisationType, ScaStatus};

/// Published after an authorisation's SCA status has been committed to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaStatusChangedEvent {
    pub authorisation_id: AuthorisationId,
    pub authorisation_type: AuthorisationType,
    /// The resource id as the TPP sees it
    pub resource_id: String,
    pub old_status: ScaStatus,
    pub new_status: ScaStatus,
    pub timestamp: DateTime<Utc>,
}

impl ScaStatusChangedEvent {
    pub fn new(
        authorisation_id: AuthorisationId,
        authorisation_type: AuthorisationType,
        resource_id: String,
        old_status: ScaStatus,
        new_status: ScaStatus,
    ) -> Self {
        Self { authorisation_id, authorisation_type, resource_id, old_status, new_status, timestamp: Utc::now() }
    }

    pub fn is_final(&self) -> bool {
        self.new_status.is_terminal()
    }
}

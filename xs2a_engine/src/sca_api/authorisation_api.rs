use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    certificate::TppIdentity,
    crypto::ResourceIdCodec,
    db_types::{Authorisation, AuthorisationId, NewAuthorisation, ScaStatus},
    events::{EventProducers, ScaStatusChangedEvent},
    sca_api::{
        method_decider::is_explicit,
        sca_objects::{AuthorisationRequest, AuthorisationResult, NextStep, ScaConfig},
        ScaError,
    },
    traits::{AuthorisationManagement, ExpiredAuthorisation},
};

/// `AuthorisationApi` creates authorisations, reports their status and expires the ones that were abandoned.
///
/// Advancing an authorisation through the SCA protocol is the job of [`ScaFlowApi`](crate::ScaFlowApi).
pub struct AuthorisationApi<B> {
    db: B,
    codec: Arc<ResourceIdCodec>,
    config: ScaConfig,
    producers: EventProducers,
}

impl<B> Debug for AuthorisationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuthorisationApi")
    }
}

impl<B> AuthorisationApi<B> {
    pub fn new(db: B, codec: Arc<ResourceIdCodec>, config: ScaConfig, producers: EventProducers) -> Self {
        Self { db, codec, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn config(&self) -> &ScaConfig {
        &self.config
    }
}

impl<B> AuthorisationApi<B>
where B: AuthorisationManagement
{
    /// Starts a new authorisation in status `RECEIVED`.
    ///
    /// The caller's roles must allow the authorisation type and the resource id must be one this gateway issued. The
    /// explicit/implicit decision is taken here and stored with the authorisation.
    pub async fn create_authorisation(
        &self,
        tpp: &TppIdentity,
        request: AuthorisationRequest,
    ) -> Result<AuthorisationResult, ScaError> {
        if !request.authorisation_type.is_permitted_for(&tpp.roles) {
            warn!(
                "🔄️ TPP {} [{}] tried to start a {} authorisation",
                tpp.authorisation_number,
                tpp.roles_string(),
                request.authorisation_type
            );
            return Err(ScaError::RoleNotPermitted {
                authorisation_type: request.authorisation_type,
                roles: tpp.roles_string(),
            });
        }
        self.codec.decrypt_id(&request.resource_id)?;
        let explicit = is_explicit(request.tpp_explicit_preferred, self.config.signing_basket_supported);
        let expires_at = Utc::now() + self.config.authorisation_ttl;
        let mut new_authorisation = NewAuthorisation::new(request.authorisation_type, request.resource_id, expires_at)
            .with_explicit(explicit)
            .with_periodic_payment(request.periodic_payment);
        if let Some(psu) = request.psu.filter(|p| !p.is_empty()) {
            new_authorisation = new_authorisation.with_psu(psu);
        }
        let authorisation = self.db.insert_authorisation(new_authorisation).await?;
        info!(
            "🔄️ New {} authorisation {} created for TPP {} (explicit: {explicit})",
            authorisation.authorisation_type, authorisation.id, tpp.authorisation_number
        );
        Ok(AuthorisationResult {
            authorisation_id: authorisation.id.clone(),
            authorisation_type: authorisation.authorisation_type,
            sca_status: authorisation.sca_status,
            available_sca_methods: None,
            chosen_sca_method: None,
            challenge_data: None,
            next_step: NextStep::for_status(authorisation.sca_status, authorisation.psu.is_some()),
            multilevel_sca_required: false,
            explicit: authorisation.explicit,
            error: None,
        })
    }

    /// Fetches an authorisation, checking that it belongs to the given resource.
    pub async fn authorisation_for_resource(
        &self,
        resource_id: &str,
        id: &AuthorisationId,
    ) -> Result<Authorisation, ScaError> {
        match self.db.fetch_authorisation(id).await? {
            Some(a) if a.resource_id == resource_id => Ok(a),
            Some(_) => {
                debug!("🔄️ Authorisation {id} was requested for a resource it does not belong to");
                Err(ScaError::AuthorisationNotFound(id.clone()))
            },
            None => Err(ScaError::AuthorisationNotFound(id.clone())),
        }
    }

    pub async fn sca_status(&self, resource_id: &str, id: &AuthorisationId) -> Result<ScaStatus, ScaError> {
        self.authorisation_for_resource(resource_id, id).await.map(|a| a.sca_status)
    }

    pub async fn authorisation_ids_for_resource(&self, resource_id: &str) -> Result<Vec<AuthorisationId>, ScaError> {
        let authorisations = self.db.fetch_authorisations_for_resource(resource_id).await?;
        Ok(authorisations.into_iter().map(|a| a.id).collect())
    }

    /// Fails every live authorisation that has passed its expiry time and notifies the status-change subscribers.
    pub async fn expire_authorisations(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredAuthorisation>, ScaError> {
        let expired = self.db.expire_authorisations(now).await?;
        for ExpiredAuthorisation { previous_status, authorisation } in &expired {
            debug!("🔄️ Authorisation {} expired in status {previous_status}", authorisation.id);
            let event = ScaStatusChangedEvent::new(
                authorisation.id.clone(),
                authorisation.authorisation_type,
                authorisation.resource_id.clone(),
                *previous_status,
                authorisation.sca_status,
            );
            self.producers.publish_sca_status_changed(event).await;
        }
        Ok(expired)
    }
}

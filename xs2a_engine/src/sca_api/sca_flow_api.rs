use std::{fmt::Debug, future::Future, sync::Arc, time::Duration as StdDuration};

use chrono::{Duration, Utc};
use log::*;
use tokio::time::{self, MissedTickBehavior};
use xs2a_common::Secret;

use crate::{
    certificate::TppIdentity,
    crypto::{ResourceIdCodec, ResourceKey},
    db_types::{Authorisation, AuthorisationId, ChallengeData, PsuIdData, ScaMethod, ScaStatus},
    events::{EventProducers, ScaStatusChangedEvent},
    sca_api::{
        sca_objects::{AuthorisationResult, NextStep, PsuDataUpdate, ScaConfig, UpdateKind},
        ScaError,
    },
    traits::{
        AuthorisationManagement,
        CoreBankingSpi,
        LeaseToken,
        ScaTransition,
        SpiAuthenticationStatus,
        SpiContext,
        SpiFailure,
        SpiFailureKind,
        SpiResponse,
    },
};

/// `ScaFlowApi` drives an authorisation through the SCA protocol, one PSU update at a time.
///
/// Each call to [`advance_authorisation`](Self::advance_authorisation)
/// 1. checks that the calling TPP's roles allow the authorisation type,
/// 2. leases the authorisation, so that a concurrent retry of the same update is turned away,
/// 3. checks that the update fits the current SCA status,
/// 4. decrypts the opaque core-banking state and makes the core-banking calls for this stage,
/// 5. re-encrypts whatever state the bank returned and commits it together with the new status.
///
/// Steps 1 and 3 reject the request without changing anything. Once the bank has been called, the outcome is always
/// committed, and a failure ends the authorisation in `FAILED` with the reason attached to the result.
pub struct ScaFlowApi<B, S> {
    db: B,
    spi: S,
    codec: Arc<ResourceIdCodec>,
    config: ScaConfig,
    producers: EventProducers,
}

impl<B, S> Debug for ScaFlowApi<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScaFlowApi")
    }
}

impl<B, S> ScaFlowApi<B, S> {
    pub fn new(db: B, spi: S, codec: Arc<ResourceIdCodec>, config: ScaConfig, producers: EventProducers) -> Self {
        Self { db, spi, codec, config, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn spi(&self) -> &S {
        &self.spi
    }
}

/// The decisions of one update, waiting to be committed.
struct StepOutcome {
    transition: ScaTransition,
    challenge_data: Option<ChallengeData>,
    next_step: Option<NextStep>,
    multilevel_sca_required: bool,
    error: Option<ScaError>,
}

impl StepOutcome {
    fn new(transition: ScaTransition) -> Self {
        Self { transition, challenge_data: None, next_step: None, multilevel_sca_required: false, error: None }
    }

    /// Fails the authorisation before the bank was called. The stored opaque state is left as it is.
    fn failed_before_core_banking(from: ScaStatus, error: ScaError) -> Result<Self, ScaError> {
        info!("🔄️ Failing authorisation before calling the core banking system: {error}");
        let transition = ScaTransition::new(from, ScaStatus::Failed)?;
        Ok(Self::new(transition).with_error(error))
    }

    fn with_error(mut self, error: ScaError) -> Self {
        self.error = Some(error);
        self
    }

    fn with_next_step(mut self, next_step: NextStep) -> Self {
        self.next_step = Some(next_step);
        self
    }

    fn with_challenge_data(mut self, challenge_data: Option<ChallengeData>) -> Self {
        self.challenge_data = challenge_data;
        self
    }
}

/// Working state while the bank is being called for one update.
struct Step<'a> {
    authorisation: &'a Authorisation,
    codec: &'a ResourceIdCodec,
    key: ResourceKey,
    ctx: SpiContext,
    state: Secret<Vec<u8>>,
    multilevel_sca_required: bool,
}

impl<'a> Step<'a> {
    /// Keeps the opaque state from a core-banking response, whatever the outcome, and hands back the payload.
    fn absorb<T>(&mut self, response: SpiResponse<T>) -> Result<T, SpiFailure> {
        let SpiResponse { payload, consent_data } = response;
        self.state = consent_data;
        payload
    }

    fn exemption_allowed(&self) -> bool {
        !self.authorisation.periodic_payment
    }

    /// A transition to `to` that carries the latest opaque state, re-encrypted.
    fn transition(&self, to: ScaStatus) -> Result<ScaTransition, ScaError> {
        let opaque_state = self.codec.encrypt_state(&self.key, self.state.reveal())?;
        let transition = ScaTransition::new(self.authorisation.sca_status, to)?
            .with_psu(self.ctx.psu.clone())
            .with_opaque_state(Some(opaque_state));
        Ok(transition)
    }

    fn fail(&self, error: ScaError) -> Result<StepOutcome, ScaError> {
        info!("🔄️ Authorisation {} failed: {error}", self.authorisation.id);
        Ok(StepOutcome::new(self.transition(ScaStatus::Failed)?).with_error(error))
    }
}

impl<B, S> ScaFlowApi<B, S>
where
    B: AuthorisationManagement,
    S: CoreBankingSpi,
{
    /// Applies one PSU update to an authorisation.
    ///
    /// Returns `Err` when the request was rejected and nothing changed: an unknown authorisation, a TPP without the
    /// required role, an update that does not fit the current status (including any update to a finished
    /// authorisation), a missing PSU-ID, or another request currently updating the same authorisation.
    ///
    /// Every other outcome, failures included, has been committed and is described by the returned
    /// [`AuthorisationResult`].
    pub async fn advance_authorisation(
        &self,
        id: &AuthorisationId,
        tpp: &TppIdentity,
        update: PsuDataUpdate,
    ) -> Result<AuthorisationResult, ScaError> {
        let authorisation =
            self.db.fetch_authorisation(id).await?.ok_or_else(|| ScaError::AuthorisationNotFound(id.clone()))?;
        if !authorisation.authorisation_type.is_permitted_for(&tpp.roles) {
            warn!(
                "🔄️ TPP {} [{}] may not update {} authorisation {id}",
                tpp.authorisation_number,
                tpp.roles_string(),
                authorisation.authorisation_type
            );
            return Err(ScaError::RoleNotPermitted {
                authorisation_type: authorisation.authorisation_type,
                roles: tpp.roles_string(),
            });
        }
        let lease = self.db.acquire_lease(id, self.config.lease_ttl).await?;
        trace!("🔄️ Lease {} taken on authorisation {id}", lease.token);
        let authorisation = lease.authorisation;
        let work = self.apply_update(&authorisation, tpp, update);
        let outcome = match self.keep_lease_alive(id, &lease.token, work).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.release_lease(id, &lease.token).await;
                return Err(e);
            },
        };
        let StepOutcome { transition, challenge_data, next_step, multilevel_sca_required, error } = outcome;
        let from = transition.from_status();
        let updated = match self.db.commit_transition(id, &lease.token, transition).await {
            Ok(updated) => updated,
            Err(e) => {
                error!("🔄️ Could not commit the move of authorisation {id} out of {from}: {e}");
                self.release_lease(id, &lease.token).await;
                return Err(e.into());
            },
        };
        info!("🔄️ Authorisation {id} moved from {from} to {}", updated.sca_status);
        let event = ScaStatusChangedEvent::new(
            updated.id.clone(),
            updated.authorisation_type,
            updated.resource_id.clone(),
            from,
            updated.sca_status,
        );
        self.producers.publish_sca_status_changed(event).await;
        Ok(build_result(&updated, challenge_data, next_step, multilevel_sca_required, error))
    }

    /// Runs `work` while renewing the lease on `id` every third of the lease TTL, so that a retry arriving while the
    /// bank is still answering is turned away instead of taking the authorisation over.
    async fn keep_lease_alive<T>(&self, id: &AuthorisationId, token: &LeaseToken, work: impl Future<Output = T>) -> T {
        let period = renewal_period(self.config.lease_ttl);
        let mut renewals = time::interval_at(time::Instant::now() + period, period);
        renewals.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(work);
        loop {
            tokio::select! {
                result = &mut work => return result,
                _ = renewals.tick() => {
                    if let Err(e) = self.db.renew_lease(id, token, self.config.lease_ttl).await {
                        warn!("🔄️ Could not renew the lease on authorisation {id}: {e}");
                    }
                },
            }
        }
    }

    async fn release_lease(&self, id: &AuthorisationId, token: &LeaseToken) {
        if let Err(e) = self.db.release_lease(id, token).await {
            warn!("🔄️ Could not release the lease on authorisation {id}: {e}");
        }
    }

    async fn apply_update(
        &self,
        authorisation: &Authorisation,
        tpp: &TppIdentity,
        update: PsuDataUpdate,
    ) -> Result<StepOutcome, ScaError> {
        let status = authorisation.sca_status;
        check_stage(status, update.kind())?;
        let psu = psu_for_update(authorisation, &update)?;
        if authorisation.is_expired_at(Utc::now()) {
            return StepOutcome::failed_before_core_banking(
                status,
                ScaError::AuthorisationExpired(authorisation.id.clone()),
            );
        }
        let key = match self.codec.decrypt_id(&authorisation.resource_id) {
            Ok(key) => key,
            Err(e) => {
                error!("🔄️ The resource id of authorisation {} cannot be decrypted: {e}", authorisation.id);
                return StepOutcome::failed_before_core_banking(status, e.into());
            },
        };
        let state = match &authorisation.opaque_state {
            Some(opaque) => match self.codec.decrypt_state(&key, opaque) {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    error!("🔄️ The opaque state of authorisation {} cannot be decrypted: {e}", authorisation.id);
                    return StepOutcome::failed_before_core_banking(status, e.into());
                },
            },
            None => Vec::new(),
        };
        let ctx = SpiContext {
            authorisation_id: authorisation.id.clone(),
            authorisation_type: authorisation.authorisation_type,
            resource_id: key.resource_id.clone(),
            psu,
            tpp_authorisation_number: tpp.authorisation_number.clone(),
        };
        let mut step = Step {
            authorisation,
            codec: self.codec.as_ref(),
            key,
            ctx,
            state: Secret::new(state),
            multilevel_sca_required: false,
        };
        debug!("🔄️ Applying {} to authorisation {} in status {status}", update.kind(), authorisation.id);
        let mut outcome = match update {
            PsuDataUpdate::PsuIdentification(_) => self.identify(&mut step).await,
            PsuDataUpdate::Password { password, .. } => self.authenticate(&mut step, &password).await,
            PsuDataUpdate::ScaMethodSelection(method_id) => self.select_method(&mut step, method_id).await,
            PsuDataUpdate::AuthenticationCode(code) => self.verify_code(&mut step, &code).await,
        }?;
        outcome.multilevel_sca_required = step.multilevel_sca_required;
        Ok(outcome)
    }

    async fn identify(&self, step: &mut Step<'_>) -> Result<StepOutcome, ScaError> {
        let response = self.spi.identify_psu(&step.ctx, step.state.reveal()).await;
        match step.absorb(response) {
            Ok(identification) => {
                step.multilevel_sca_required = identification.multilevel_sca_required;
                let next_step = if identification.combined_authentication {
                    NextStep::UpdatePsuIdentificationAndAuthentication
                } else {
                    NextStep::UpdatePsuAuthentication
                };
                Ok(StepOutcome::new(step.transition(ScaStatus::PsuIdentified)?).with_next_step(next_step))
            },
            Err(failure) => step.fail(ScaError::CoreBankingFailure(failure)),
        }
    }

    async fn authenticate(&self, step: &mut Step<'_>, password: &Secret<String>) -> Result<StepOutcome, ScaError> {
        let response = self.spi.authenticate_psu(&step.ctx, password, step.state.reveal()).await;
        let authentication = match step.absorb(response) {
            Ok(a) if a.status == SpiAuthenticationStatus::Success => a,
            Ok(_) => {
                let message = format!("PSU {} could not be authenticated", step.ctx.psu);
                return step.fail(ScaError::PsuCredentialsInvalid(message));
            },
            Err(failure) => return step.fail(authentication_error(failure, true)),
        };
        step.multilevel_sca_required |= authentication.multilevel_sca_required;
        if authentication.sca_exempted && step.exemption_allowed() {
            debug!("🔄️ SCA exemption granted at authentication for {}", step.authorisation.id);
            return self.execute_without_sca(step, ScaStatus::Exempted).await;
        }

        let response = self.spi.list_available_sca_methods(&step.ctx, step.state.reveal()).await;
        let available = match step.absorb(response) {
            Ok(available) => available,
            Err(failure) => return step.fail(ScaError::CoreBankingFailure(failure)),
        };
        if available.sca_exempted && step.exemption_allowed() {
            debug!("🔄️ SCA exemption granted with the method list for {}", step.authorisation.id);
            return self.execute_without_sca(step, ScaStatus::Exempted).await;
        }
        match available.methods.len() {
            0 => {
                debug!("🔄️ No SCA methods for {}; executing without SCA", step.authorisation.id);
                self.execute_without_sca(step, ScaStatus::Finalised).await
            },
            1 => {
                let method_id = available.methods[0].authentication_method_id.clone();
                debug!("🔄️ Only one SCA method ({method_id}) for {}; selecting it", step.authorisation.id);
                self.request_code(step, &method_id, available.methods).await
            },
            n => {
                debug!("🔄️ {n} SCA methods offered for {}", step.authorisation.id);
                let transition =
                    step.transition(ScaStatus::PsuAuthenticated)?.with_available_sca_methods(available.methods);
                Ok(StepOutcome::new(transition))
            },
        }
    }

    async fn select_method(&self, step: &mut Step<'_>, method_id: String) -> Result<StepOutcome, ScaError> {
        let authorisation = step.authorisation;
        match authorisation.sca_method(&method_id) {
            Some(method) => {
                let methods = authorisation.available_sca_methods.clone();
                self.request_code(step, &method.authentication_method_id, methods).await
            },
            None => step.fail(ScaError::ScaMethodUnknown(method_id)),
        }
    }

    async fn request_code(
        &self,
        step: &mut Step<'_>,
        method_id: &str,
        methods: Vec<ScaMethod>,
    ) -> Result<StepOutcome, ScaError> {
        let response = self.spi.request_authorisation_code(&step.ctx, method_id, step.state.reveal()).await;
        match step.absorb(response) {
            Ok(code) if code.sca_exempted && step.exemption_allowed() => {
                debug!("🔄️ SCA exemption granted instead of a code for {}", step.authorisation.id);
                self.execute_without_sca(step, ScaStatus::Exempted).await
            },
            Ok(code) => {
                let transition = step
                    .transition(ScaStatus::ScaMethodSelected)?
                    .with_chosen_sca_method(method_id)
                    .with_available_sca_methods(methods);
                Ok(StepOutcome::new(transition).with_challenge_data(code.challenge_data))
            },
            Err(failure) => step.fail(ScaError::CoreBankingFailure(failure)),
        }
    }

    async fn verify_code(&self, step: &mut Step<'_>, code: &Secret<String>) -> Result<StepOutcome, ScaError> {
        let response = self.spi.verify_code_and_execute(&step.ctx, code, step.state.reveal()).await;
        match step.absorb(response) {
            Ok(execution) => {
                debug!("🔄️ {} executed with status {}", step.ctx.resource_id, execution.resource_status);
                Ok(StepOutcome::new(step.transition(ScaStatus::Finalised)?))
            },
            Err(failure) => step.fail(authentication_error(failure, false)),
        }
    }

    /// Marks the consent valid or executes the payment without SCA, ending in `success` or `FAILED`.
    async fn execute_without_sca(&self, step: &mut Step<'_>, success: ScaStatus) -> Result<StepOutcome, ScaError> {
        let response = self.spi.execute_without_sca(&step.ctx, step.state.reveal()).await;
        match step.absorb(response) {
            Ok(execution) => {
                debug!("🔄️ {} executed without SCA with status {}", step.ctx.resource_id, execution.resource_status);
                Ok(StepOutcome::new(step.transition(success)?))
            },
            Err(failure) => step.fail(ScaError::CoreBankingFailure(failure)),
        }
    }
}

/// Rejects updates that do not belong to the current stage. Finished authorisations accept nothing.
const MIN_RENEWAL_PERIOD: StdDuration = StdDuration::from_millis(50);

fn renewal_period(lease_ttl: Duration) -> StdDuration {
    (lease_ttl / 3).to_std().ok().filter(|p| *p >= MIN_RENEWAL_PERIOD).unwrap_or(MIN_RENEWAL_PERIOD)
}

fn check_stage(status: ScaStatus, update: UpdateKind) -> Result<(), ScaError> {
    use ScaStatus::*;
    let allowed = matches!(
        (status, update),
        (Received, UpdateKind::PsuIdentification)
            | (Received | PsuIdentified, UpdateKind::Password)
            | (PsuAuthenticated, UpdateKind::ScaMethodSelection)
            | (ScaMethodSelected, UpdateKind::AuthenticationCode)
    );
    if allowed {
        Ok(())
    } else {
        debug!("🔄️ A {update} update does not fit status {status}");
        Err(ScaError::WrongAuthorisationStage { status, update })
    }
}

/// The PSU the bank should be told about for this update.
fn psu_for_update(authorisation: &Authorisation, update: &PsuDataUpdate) -> Result<PsuIdData, ScaError> {
    let submitted = match update {
        PsuDataUpdate::PsuIdentification(psu) => Some(psu),
        PsuDataUpdate::Password { psu, .. } => psu.as_ref(),
        _ => None,
    }
    .filter(|psu| !psu.is_empty());
    match (submitted, &authorisation.psu) {
        (Some(submitted), Some(known)) if submitted.psu_id != known.psu_id => {
            Err(ScaError::FormatError("The PSU-ID does not match the PSU of this authorisation".into()))
        },
        (Some(submitted), _) => Ok(submitted.clone()),
        (None, Some(known)) => Ok(known.clone()),
        (None, None) => Err(ScaError::FormatError("PSU-ID missing".into())),
    }
}

/// Failures while checking credentials. A bank that refuses the credentials (or, during authentication, rejects them
/// on business grounds) means the PSU got them wrong; anything else is the bank's problem.
fn authentication_error(failure: SpiFailure, logical_is_credentials: bool) -> ScaError {
    match failure.kind {
        SpiFailureKind::Unauthorized => ScaError::PsuCredentialsInvalid(failure.message),
        SpiFailureKind::LogicalFailure if logical_is_credentials => ScaError::PsuCredentialsInvalid(failure.message),
        _ => ScaError::CoreBankingFailure(failure),
    }
}

fn build_result(
    authorisation: &Authorisation,
    challenge_data: Option<ChallengeData>,
    next_step: Option<NextStep>,
    multilevel_sca_required: bool,
    error: Option<ScaError>,
) -> AuthorisationResult {
    let status = authorisation.sca_status;
    let available_sca_methods = match status {
        ScaStatus::PsuAuthenticated | ScaStatus::ScaMethodSelected if !authorisation.available_sca_methods.is_empty() => {
            Some(authorisation.available_sca_methods.clone())
        },
        _ => None,
    };
    let chosen_sca_method =
        authorisation.chosen_sca_method.as_deref().and_then(|id| authorisation.sca_method(id)).cloned();
    AuthorisationResult {
        authorisation_id: authorisation.id.clone(),
        authorisation_type: authorisation.authorisation_type,
        sca_status: status,
        available_sca_methods,
        chosen_sca_method,
        challenge_data,
        next_step: next_step.unwrap_or_else(|| NextStep::for_status(status, authorisation.psu.is_some())),
        multilevel_sca_required,
        explicit: authorisation.explicit,
        error,
    }
}

//! `SqliteDatabase` is the SQLite authorisation store.
//!
//! It implements [`AuthorisationManagement`] on top of the functions in [`super::db`].
use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{authorisations, db_url, new_pool};
use crate::{
    db_types::{Authorisation, AuthorisationId, NewAuthorisation},
    traits::{
        AuthorisationDbError,
        AuthorisationLease,
        AuthorisationManagement,
        ExpiredAuthorisation,
        LeaseToken,
        ScaTransition,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl AuthorisationManagement for SqliteDatabase {
    async fn insert_authorisation(&self, authorisation: NewAuthorisation) -> Result<Authorisation, AuthorisationDbError> {
        let mut tx = self.pool.begin().await?;
        let authorisation = authorisations::insert_authorisation(authorisation, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Authorisation {} saved", authorisation.id);
        Ok(authorisation)
    }

    async fn fetch_authorisation(&self, id: &AuthorisationId) -> Result<Option<Authorisation>, AuthorisationDbError> {
        let mut conn = self.pool.acquire().await?;
        let authorisation = authorisations::fetch_authorisation(id, &mut conn).await?;
        Ok(authorisation)
    }

    async fn fetch_authorisations_for_resource(
        &self,
        resource_id: &str,
    ) -> Result<Vec<Authorisation>, AuthorisationDbError> {
        let mut conn = self.pool.acquire().await?;
        let result = authorisations::fetch_authorisations_for_resource(resource_id, &mut conn).await?;
        Ok(result)
    }

    async fn acquire_lease(
        &self,
        id: &AuthorisationId,
        ttl: Duration,
    ) -> Result<AuthorisationLease, AuthorisationDbError> {
        let mut tx = self.pool.begin().await?;
        let token = LeaseToken::random();
        let now = Utc::now();
        let expires_at = now + ttl;
        if !authorisations::try_acquire_lease(id, &token, now, expires_at, &mut tx).await? {
            let exists = authorisations::fetch_authorisation(id, &mut tx).await?.is_some();
            tx.rollback().await?;
            return if exists {
                debug!("🗃️ Authorisation {id} is already leased");
                Err(AuthorisationDbError::AuthorisationBusy(id.clone()))
            } else {
                Err(AuthorisationDbError::NotFound(id.clone()))
            };
        }
        let authorisation = authorisations::fetch_authorisation(id, &mut tx)
            .await?
            .ok_or_else(|| AuthorisationDbError::NotFound(id.clone()))?;
        tx.commit().await?;
        trace!("🗃️ Lease on {id} granted until {expires_at}");
        Ok(AuthorisationLease { authorisation, token, expires_at })
    }

    async fn renew_lease(
        &self,
        id: &AuthorisationId,
        token: &LeaseToken,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, AuthorisationDbError> {
        let mut conn = self.pool.acquire().await?;
        let expires_at = Utc::now() + ttl;
        if !authorisations::renew_lease(id, token, expires_at, &mut conn).await? {
            warn!("🗃️ Lease {token} on {id} could not be renewed. It is no longer held");
            return Err(AuthorisationDbError::LeaseLost(id.clone()));
        }
        trace!("🗃️ Lease on {id} renewed until {expires_at}");
        Ok(expires_at)
    }

    async fn release_lease(&self, id: &AuthorisationId, token: &LeaseToken) -> Result<(), AuthorisationDbError> {
        let mut conn = self.pool.acquire().await?;
        if !authorisations::release_lease(id, token, &mut conn).await? {
            warn!("🗃️ Lease {token} on {id} was already gone when it was released");
        }
        Ok(())
    }

    async fn commit_transition(
        &self,
        id: &AuthorisationId,
        token: &LeaseToken,
        transition: ScaTransition,
    ) -> Result<Authorisation, AuthorisationDbError> {
        let mut tx = self.pool.begin().await?;
        let expected = transition.from_status();
        match authorisations::apply_transition(id, token, transition, &mut tx).await? {
            Some(authorisation) => {
                tx.commit().await?;
                trace!("🗃️ Authorisation {id} is now {}", authorisation.sca_status);
                Ok(authorisation)
            },
            None => {
                let current = authorisations::fetch_authorisation(id, &mut tx).await?;
                tx.rollback().await?;
                match current {
                    None => Err(AuthorisationDbError::NotFound(id.clone())),
                    Some(a) if a.sca_status != expected => {
                        error!("🗃️ Authorisation {id} changed status under a lease. Expected {expected}");
                        Err(AuthorisationDbError::StatusMismatch { id: id.clone(), expected, actual: a.sca_status })
                    },
                    Some(_) => {
                        warn!("🗃️ The lease on {id} expired and was taken over before the transition was committed");
                        Err(AuthorisationDbError::LeaseLost(id.clone()))
                    },
                }
            },
        }
    }

    async fn expire_authorisations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredAuthorisation>, AuthorisationDbError> {
        let mut tx = self.pool.begin().await?;
        let candidates = authorisations::fetch_expired_authorisations(now, &mut tx).await?;
        let mut expired = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let result =
                authorisations::expire_authorisation(&candidate.id, candidate.sca_status, now, &mut tx).await?;
            expired.extend(result);
        }
        tx.commit().await?;
        Ok(expired)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using `XS2A_DATABASE_URL` or the default location.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

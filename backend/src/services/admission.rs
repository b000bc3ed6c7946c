//! Bounds how many refresh sessions a principal may hold at once.

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use crate::{
    error::AuthError,
    repositories::{bounded, SessionStore},
    types::PrincipalId,
};

/// Maximum number of concurrent sessions per principal. Always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionCeiling(NonZeroUsize);

impl SessionCeiling {
    pub fn new(value: usize) -> Result<Self, AuthError> {
        NonZeroUsize::new(value)
            .map(Self)
            .ok_or(AuthError::AdmissionLimitMisconfigured)
    }

    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let value = raw
            .trim()
            .parse::<usize>()
            .map_err(|_| AuthError::AdmissionLimitMisconfigured)?;
        Self::new(value)
    }

    pub fn get(&self) -> usize {
        self.0.get()
    }
}

#[derive(Clone)]
pub struct AdmissionLimiter {
    store: Arc<dyn SessionStore>,
    ceiling: SessionCeiling,
    store_timeout: Duration,
}

impl AdmissionLimiter {
    pub fn new(store: Arc<dyn SessionStore>, ceiling: SessionCeiling, store_timeout: Duration) -> Self {
        Self {
            store,
            ceiling,
            store_timeout,
        }
    }

    /// Frees one slot for a new session, evicting the oldest sessions when
    /// the principal is at or above the ceiling. Returns how many were evicted.
    pub async fn admit(&self, principal_id: PrincipalId) -> Result<u64, AuthError> {
        let ids = bounded(
            "session_ids_oldest_first",
            self.store_timeout,
            self.store.session_ids_oldest_first(principal_id),
        )
        .await?;

        let ceiling = self.ceiling.get();
        if ids.len() < ceiling {
            return Ok(0);
        }

        let excess = ids.len() - ceiling + 1;
        let evicted = bounded(
            "delete_sessions",
            self.store_timeout,
            self.store.delete_sessions(&ids[..excess]),
        )
        .await?;

        tracing::info!(
            principal_id = %principal_id,
            evicted,
            ceiling,
            "Evicted oldest sessions to admit a new one"
        );
        Ok(evicted)
    }
}

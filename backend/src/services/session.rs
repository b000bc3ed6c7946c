//! Refresh session lifecycle: creation, rotation, revocation.

use chrono::Utc;
use std::{sync::Arc, time::Duration};

use crate::{
    config::Config,
    error::AuthError,
    models::{Client, NewSession, Session, TokenResponse},
    repositories::{bounded, SessionStore},
    services::admission::AdmissionLimiter,
    types::{PrincipalId, SessionId},
    utils::jwt::{generate_refresh_token, IssuedToken, RefreshToken, TokenIssuer},
};

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: RefreshToken,
}

impl TokenPair {
    pub fn into_response(self, token_type: &str) -> TokenResponse {
        TokenResponse {
            expires_in: self.access.claims.exp - self.access.claims.iat,
            access_token: self.access.token,
            refresh_token: self.refresh.token,
            token_type: token_type.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    issuer: Arc<TokenIssuer>,
    limiter: AdmissionLimiter,
    refresh_ttl_seconds: u64,
    store_timeout: Duration,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        issuer: Arc<TokenIssuer>,
        limiter: AdmissionLimiter,
        refresh_ttl_seconds: u64,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            issuer,
            limiter,
            refresh_ttl_seconds,
            store_timeout,
        }
    }

    pub fn from_config(store: Arc<dyn SessionStore>, issuer: Arc<TokenIssuer>, config: &Config) -> Self {
        let limiter = AdmissionLimiter::new(
            store.clone(),
            config.max_sessions_per_principal,
            config.store_timeout(),
        );
        Self::new(
            store,
            issuer,
            limiter,
            config.refresh_token_ttl_seconds,
            config.store_timeout(),
        )
    }

    /// Admits the principal, persists a new session for `client` and issues
    /// its first token pair.
    pub async fn create_session(
        &self,
        principal_id: PrincipalId,
        client: &Client,
    ) -> Result<(Session, TokenPair), AuthError> {
        self.limiter.admit(principal_id).await?;

        let refresh = generate_refresh_token(principal_id, self.refresh_ttl_seconds)?;
        let session = bounded(
            "insert_session",
            self.store_timeout,
            self.store.insert_session(NewSession {
                principal_id,
                refresh_token: refresh.token.clone(),
                expires_at: refresh.expires_at,
                client_id: client.id.clone(),
                client_name: client.name.clone(),
            }),
        )
        .await?;
        let access = self.issuer.issue(principal_id)?;

        tracing::info!(
            principal_id = %principal_id,
            session_id = session.id,
            client_id = %client.id,
            "Session created"
        );
        Ok((session, TokenPair { access, refresh }))
    }

    /// Exchanges a live refresh token for a new pair.
    ///
    /// The old token stops working once this returns; of several concurrent
    /// calls presenting the same token, at most one succeeds.
    pub async fn rotate_session(
        &self,
        existing_token: &str,
        client: &Client,
    ) -> Result<TokenPair, AuthError> {
        self.rotate(existing_token, client, None).await
    }

    /// Rotation on behalf of an authenticated caller: the session must also
    /// belong to `principal_id`.
    pub async fn rotate_owned_session(
        &self,
        existing_token: &str,
        principal_id: PrincipalId,
        client: &Client,
    ) -> Result<TokenPair, AuthError> {
        self.rotate(existing_token, client, Some(principal_id)).await
    }

    async fn rotate(
        &self,
        existing_token: &str,
        client: &Client,
        owner: Option<PrincipalId>,
    ) -> Result<TokenPair, AuthError> {
        let session = bounded(
            "find_session_by_refresh_token",
            self.store_timeout,
            self.store.find_session_by_refresh_token(existing_token),
        )
        .await?
        .ok_or(AuthError::SessionNotFound)?;

        if session.is_expired_at(Utc::now()) {
            return Err(AuthError::SessionExpired);
        }
        if let Some(owner) = owner {
            if !session.belongs_to(owner) {
                tracing::warn!(
                    session_id = session.id,
                    principal_id = %owner,
                    "Verification presented another principal's refresh token"
                );
                return Err(AuthError::Forbidden);
            }
        }
        if session.client_id != client.id {
            tracing::warn!(
                session_id = session.id,
                session_client = %session.client_id,
                caller_client = %client.id,
                "Refresh presented by a different client"
            );
            return Err(AuthError::SessionClientMismatch);
        }

        let access = self.issuer.issue(session.principal_id)?;
        let refresh = generate_refresh_token(session.principal_id, self.refresh_ttl_seconds)?;
        let swapped = bounded(
            "rotate_refresh_token",
            self.store_timeout,
            self.store.rotate_refresh_token(
                session.id,
                existing_token,
                &refresh.token,
                refresh.expires_at,
            ),
        )
        .await?;
        if !swapped {
            return Err(AuthError::SessionNotFound);
        }

        tracing::debug!(session_id = session.id, "Session rotated");
        Ok(TokenPair { access, refresh })
    }

    pub async fn revoke_by_id(
        &self,
        id: SessionId,
        principal_id: PrincipalId,
    ) -> Result<(), AuthError> {
        let session = bounded(
            "find_session_by_id",
            self.store_timeout,
            self.store.find_session_by_id(id),
        )
        .await?
        .ok_or(AuthError::SessionNotFound)?;
        self.revoke(session, principal_id).await
    }

    pub async fn revoke_by_token(
        &self,
        refresh_token: &str,
        principal_id: PrincipalId,
    ) -> Result<(), AuthError> {
        let session = bounded(
            "find_session_by_refresh_token",
            self.store_timeout,
            self.store.find_session_by_refresh_token(refresh_token),
        )
        .await?
        .ok_or(AuthError::SessionNotFound)?;
        self.revoke(session, principal_id).await
    }

    async fn revoke(&self, session: Session, principal_id: PrincipalId) -> Result<(), AuthError> {
        if !session.belongs_to(principal_id) {
            tracing::warn!(
                session_id = session.id,
                principal_id = %principal_id,
                "Revocation attempted on another principal's session"
            );
            return Err(AuthError::Forbidden);
        }
        let deleted = bounded(
            "delete_session",
            self.store_timeout,
            self.store.delete_session(session.id),
        )
        .await?;
        if !deleted {
            return Err(AuthError::SessionNotFound);
        }
        tracing::info!(session_id = session.id, principal_id = %principal_id, "Session revoked");
        Ok(())
    }

    pub async fn list_sessions(&self, principal_id: PrincipalId) -> Result<Vec<Session>, AuthError> {
        let sessions = bounded(
            "list_sessions_for_principal",
            self.store_timeout,
            self.store.list_sessions_for_principal(principal_id),
        )
        .await?;
        Ok(sessions)
    }
}

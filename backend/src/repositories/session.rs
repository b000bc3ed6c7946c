use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StoreError;
use crate::models::{NewSession, Session};
use crate::types::{PrincipalId, SessionId};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, session: NewSession) -> Result<Session, StoreError>;

    async fn find_session_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<Session>, StoreError>;

    async fn find_session_by_id(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    /// Newest first.
    async fn list_sessions_for_principal(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<Session>, StoreError>;

    /// Ids of the principal's sessions in creation order, oldest first.
    async fn session_ids_oldest_first(
        &self,
        principal_id: PrincipalId,
    ) -> Result<Vec<SessionId>, StoreError>;

    /// Replaces the refresh token only while the row still holds `current`.
    ///
    /// Returns `false` when the row is gone or already rotated.
    async fn rotate_refresh_token(
        &self,
        id: SessionId,
        current: &str,
        replacement: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError>;

    async fn delete_sessions(&self, ids: &[SessionId]) -> Result<u64, StoreError>;
}

//! Refresh sessions held by a principal on behalf of one client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{PrincipalId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
/// Database representation of a refresh session.
pub struct Session {
    pub id: SessionId,
    pub principal_id: PrincipalId,
    /// Current refresh secret; replaced on every rotation.
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub client_id: String,
    pub client_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn belongs_to(&self, principal_id: PrincipalId) -> bool {
        self.principal_id == principal_id
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
/// Values required to persist a new session row.
pub struct NewSession {
    pub principal_id: PrincipalId,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub client_id: String,
    pub client_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
/// Session as listed to its owner. The refresh secret is never returned.
pub struct SessionResponse {
    pub id: SessionId,
    pub client_id: String,
    pub client_name: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            client_id: session.client_id,
            client_name: session.client_name,
            expires_at: session.expires_at,
            created_at: session.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(principal_id: PrincipalId, expires_at: DateTime<Utc>) -> Session {
        let now = Utc::now();
        Session {
            id: 1,
            principal_id,
            refresh_token: "secret".to_string(),
            expires_at,
            client_id: "web-console".to_string(),
            client_name: "Web Console".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ownership_is_by_principal_id() {
        let owner = PrincipalId::new();
        let s = session(owner, Utc::now());
        assert!(s.belongs_to(owner));
        assert!(!s.belongs_to(PrincipalId::new()));
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let now = Utc::now();
        let s = session(PrincipalId::new(), now);
        assert!(s.is_expired_at(now));
        assert!(!s.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn response_omits_refresh_secret() {
        let s = session(PrincipalId::new(), Utc::now());
        let json = serde_json::to_value(SessionResponse::from(s)).expect("json");
        assert!(json.get("refresh_token").is_none());
        assert_eq!(json["client_id"], "web-console");
    }
}

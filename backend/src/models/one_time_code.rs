//! Short-lived numeric codes: password reset and email verification.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::PrincipalId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodePurpose {
    PasswordReset,
    EmailVerification,
}

impl CodePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            CodePurpose::PasswordReset => "password_reset",
            CodePurpose::EmailVerification => "email_verification",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
/// Database representation of a pending code.
pub struct OneTimeCode {
    pub id: Uuid,
    pub user_id: PrincipalId,
    /// Hex SHA-256 of the code.
    pub code_hash: String,
    /// Wrong guesses recorded against this code.
    pub failed_attempts: i32,
    pub created_at: DateTime<Utc>,
}

impl OneTimeCode {
    pub fn created_within(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now - self.created_at < window
    }
}

#[derive(Debug, Clone)]
pub struct NewOneTimeCode {
    pub user_id: PrincipalId,
    pub purpose: CodePurpose,
    pub code_hash: String,
}

//! Failure taxonomy of the credential and session lifecycle.

use axum::http::StatusCode;

use crate::repositories::StoreError;
use crate::utils::jwt::TokenError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("client identifier header missing")]
    ClientHeaderMissing,
    #[error("unknown client")]
    UnknownClient,
    #[error("access credential missing")]
    CredentialMissing,
    #[error("access credential rejected: {0}")]
    Unauthenticated(#[source] TokenError),
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("session was issued to a different client")]
    SessionClientMismatch,
    #[error("session does not belong to the caller")]
    Forbidden,
    #[error("session admission limit is misconfigured")]
    AdmissionLimitMisconfigured,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::ClientHeaderMissing
            | AuthError::UnknownClient
            | AuthError::CredentialMissing
            | AuthError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AuthError::SessionNotFound => StatusCode::NOT_FOUND,
            AuthError::SessionExpired | AuthError::SessionClientMismatch | AuthError::Forbidden => {
                StatusCode::FORBIDDEN
            }
            AuthError::AdmissionLimitMisconfigured | AuthError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code returned to callers.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::ClientHeaderMissing => "CLIENT_REQUIRED",
            AuthError::UnknownClient => "INVALID_CLIENT",
            AuthError::CredentialMissing => "CREDENTIAL_MISSING",
            AuthError::Unauthenticated(TokenError::Malformed) => "CREDENTIAL_MALFORMED",
            AuthError::Unauthenticated(TokenError::InvalidSignature) => {
                "CREDENTIAL_INVALID_SIGNATURE"
            }
            AuthError::Unauthenticated(TokenError::InvalidClaims) => "CREDENTIAL_INVALID_CLAIMS",
            AuthError::Unauthenticated(TokenError::Expired) => "CREDENTIAL_EXPIRED",
            AuthError::Unauthenticated(TokenError::NotYetValid) => "CREDENTIAL_NOT_YET_VALID",
            AuthError::SessionNotFound => "SESSION_NOT_FOUND",
            AuthError::SessionExpired => "SESSION_EXPIRED",
            AuthError::SessionClientMismatch => "INVALID_CLIENT",
            AuthError::Forbidden => "FORBIDDEN",
            AuthError::AdmissionLimitMisconfigured | AuthError::Store(_) => {
                "INTERNAL_SERVER_ERROR"
            }
        }
    }

    /// Caller-facing message. Never includes store or key details.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::ClientHeaderMissing => "Client required",
            AuthError::UnknownClient | AuthError::SessionClientMismatch => "Invalid client",
            AuthError::CredentialMissing => "Authorization required",
            AuthError::Unauthenticated(TokenError::Expired) => "Token expired",
            AuthError::Unauthenticated(TokenError::Malformed) => "Token malformed",
            AuthError::Unauthenticated(_) => "Invalid token",
            AuthError::SessionNotFound => "Session not found",
            AuthError::SessionExpired => "Session expired",
            AuthError::Forbidden => "Forbidden",
            AuthError::AdmissionLimitMisconfigured | AuthError::Store(_) => "Internal server error",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Backend(err) => AuthError::Store(err),
            other => AuthError::Store(anyhow::Error::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_failures_are_unauthorized_with_distinct_codes() {
        let expired = AuthError::Unauthenticated(TokenError::Expired);
        let malformed = AuthError::Unauthenticated(TokenError::Malformed);
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(malformed.status(), StatusCode::UNAUTHORIZED);
        assert_ne!(expired.code(), malformed.code());
    }

    #[test]
    fn store_failures_hide_details() {
        let err = AuthError::Store(anyhow::anyhow!("connection refused to 10.0.0.3:5432"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("10.0.0.3"));
    }
}

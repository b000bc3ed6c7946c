pub mod auth;
pub mod sessions;
pub mod users;

use chrono::{Duration, Utc};

use crate::{
    error::AppError,
    models::CodePurpose,
    repositories::bounded,
    state::AppState,
    types::PrincipalId,
    utils::password::one_time_code_matches,
};

const TOO_MANY_ATTEMPTS: &str = "Too many failed attempts; request a new code";

/// Unmatched paths. Served outside the client gate.
pub async fn not_found() -> AppError {
    AppError::NotFound("Route not found".into())
}

/// Emails are stored and looked up trimmed and lowercased.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Checks `candidate` against the newest live code for `purpose`.
///
/// Every wrong guess is counted on the stored code. Once the configured
/// ceiling is reached the code is discarded and the caller must request a
/// new one. On success the code is left in place for the caller to remove
/// together with the change it authorises.
pub(crate) async fn redeem_code(
    state: &AppState,
    user_id: PrincipalId,
    purpose: CodePurpose,
    candidate: &str,
    ttl: Duration,
    invalid_message: &'static str,
) -> Result<(), AppError> {
    let timeout = state.config.store_timeout();
    let max_attempts = state.config.one_time_code_max_attempts;

    let code = bounded(
        "latest_code",
        timeout,
        state.users.latest_code(user_id, purpose),
    )
    .await?
    .ok_or_else(|| AppError::BadRequest(invalid_message.into()))?;

    if !code.created_within(Utc::now(), ttl) {
        return Err(AppError::BadRequest("Code expired".into()));
    }
    if code.failed_attempts >= max_attempts {
        discard_codes(state, user_id, purpose).await?;
        return Err(AppError::TooManyRequests(TOO_MANY_ATTEMPTS.into()));
    }
    if one_time_code_matches(&code.code_hash, candidate) {
        return Ok(());
    }

    let attempts = bounded(
        "record_failed_attempt",
        timeout,
        state.users.record_failed_attempt(code.id),
    )
    .await?
    .unwrap_or(max_attempts);
    if attempts >= max_attempts {
        tracing::warn!(
            user_id = %user_id,
            purpose = purpose.as_str(),
            attempts,
            "One-time code discarded after repeated wrong guesses"
        );
        discard_codes(state, user_id, purpose).await?;
        return Err(AppError::TooManyRequests(TOO_MANY_ATTEMPTS.into()));
    }
    Err(AppError::BadRequest(invalid_message.into()))
}

pub(crate) async fn discard_codes(
    state: &AppState,
    user_id: PrincipalId,
    purpose: CodePurpose,
) -> Result<(), AppError> {
    bounded(
        "delete_codes",
        state.config.store_timeout(),
        state.users.delete_codes(user_id, purpose),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization_folds_case_and_whitespace() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }
}

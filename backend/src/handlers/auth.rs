use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use super::{discard_codes, normalize_email, redeem_code};
use crate::{
    error::AppError,
    middleware::CallerClient,
    models::{
        user::{
            RefreshTokenRequest, ResetPasswordConfirmRequest, ResetPasswordRequest, SignInRequest,
            SignUpRequest,
        },
        CodePurpose, NewOneTimeCode, NewUser, TokenResponse,
    },
    repositories::bounded,
    state::AppState,
    utils::password::{generate_one_time_code, hash_one_time_code, hash_password, verify_password},
    validation::Validate,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_RESET_CODE: &str = "Invalid reset code";

pub async fn sign_up(
    State(state): State<AppState>,
    CallerClient(client): CallerClient,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    payload.validate()?;

    let password_hash = hash_password(&payload.password)?;
    let user = bounded(
        "insert_user",
        state.config.store_timeout(),
        state.users.insert_user(NewUser {
            name: payload.name.trim().to_string(),
            email: normalize_email(&payload.email),
            password_hash,
        }),
    )
    .await?;

    let (_, pair) = state.sessions.create_session(user.id, &client).await?;
    tracing::info!(user_id = %user.id, client_id = %client.id, "User signed up");
    Ok((
        StatusCode::CREATED,
        Json(pair.into_response(&state.config.auth_scheme)),
    ))
}

pub async fn sign_in(
    State(state): State<AppState>,
    CallerClient(client): CallerClient,
    Json(payload): Json<SignInRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    payload.validate()?;

    let user = bounded(
        "find_user_by_email",
        state.config.store_timeout(),
        state.users.find_user_by_email(&normalize_email(&payload.email)),
    )
    .await?
    .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Sign-in rejected: wrong password");
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.into()));
    }

    let (_, pair) = state.sessions.create_session(user.id, &client).await?;
    Ok(Json(pair.into_response(&state.config.auth_scheme)))
}

pub async fn refresh(
    State(state): State<AppState>,
    CallerClient(client): CallerClient,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    payload.validate()?;

    let pair = state
        .sessions
        .rotate_session(payload.refresh_token.trim(), &client)
        .await?;
    Ok(Json(pair.into_response(&state.config.auth_scheme)))
}

/// Issues a reset code. The response does not reveal whether the email is
/// registered.
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    payload.validate()?;
    let accepted = (
        StatusCode::ACCEPTED,
        Json(json!({"message": "If the account exists, a reset code has been issued"})),
    );
    let timeout = state.config.store_timeout();

    let Some(user) = bounded(
        "find_user_by_email",
        timeout,
        state.users.find_user_by_email(&normalize_email(&payload.email)),
    )
    .await?
    else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(accepted);
    };

    let throttle = Duration::minutes(state.config.password_reset_throttle_minutes);
    if let Some(last) = bounded(
        "latest_code",
        timeout,
        state.users.latest_code(user.id, CodePurpose::PasswordReset),
    )
    .await?
    {
        if last.created_within(Utc::now(), throttle) {
            return Err(AppError::TooManyRequests(
                "Too many password reset requests".into(),
            ));
        }
    }

    let code = generate_one_time_code();
    bounded(
        "insert_code",
        timeout,
        state.users.insert_code(NewOneTimeCode {
            user_id: user.id,
            purpose: CodePurpose::PasswordReset,
            code_hash: hash_one_time_code(&code),
        }),
    )
    .await?;

    // TODO: hand the code to a mail delivery service once one is wired in.
    tracing::info!(user_id = %user.id, "Password reset code issued");
    Ok(accepted)
}

pub async fn reset_password_confirm(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordConfirmRequest>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;
    let timeout = state.config.store_timeout();

    let mut user = bounded(
        "find_user_by_email",
        timeout,
        state.users.find_user_by_email(&normalize_email(&payload.email)),
    )
    .await?
    .ok_or_else(|| AppError::BadRequest(INVALID_RESET_CODE.into()))?;

    redeem_code(
        &state,
        user.id,
        CodePurpose::PasswordReset,
        &payload.code,
        Duration::hours(state.config.password_reset_code_ttl_hours),
        INVALID_RESET_CODE,
    )
    .await?;

    user.password_hash = hash_password(&payload.password)?;
    bounded("update_user", timeout, state.users.update_user(&user)).await?;
    discard_codes(&state, user.id, CodePurpose::PasswordReset).await?;
    state.cache.invalidate(&state.cache.user_key(user.id)).await;

    tracing::info!(user_id = %user.id, "Password reset completed");
    Ok(Json(json!({"message": "Password has been reset"})))
}

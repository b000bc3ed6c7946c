use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use super::{discard_codes, normalize_email, redeem_code};
use crate::{
    error::AppError,
    middleware::Authenticated,
    models::{
        user::{
            ChangeEmailRequest, ChangePasswordRequest, ListUsersQuery, UpdateUserRequest,
            VerifyEmailRequest, VerifyTokenRequest,
        },
        CodePurpose, NewOneTimeCode, PageMetadata, Profile, TokenResponse, User, UserListResponse,
        UserResponse,
    },
    repositories::bounded,
    state::AppState,
    types::PrincipalId,
    utils::password::{generate_one_time_code, hash_one_time_code, hash_password, verify_password},
    validation::Validate,
};

const ALREADY_VERIFIED: &str = "Email is already verified";
const INVALID_VERIFICATION_CODE: &str = "Invalid verification code";

pub async fn get_user(
    State(state): State<AppState>,
    caller: Authenticated,
) -> Result<Json<UserResponse>, AppError> {
    let key = state.cache.user_key(caller.principal_id);
    let user = state
        .cache
        .fetch(&key, state.cache.user_ttl_seconds(), || async {
            let user = load_user(&state, caller.principal_id).await?;
            Ok::<_, AppError>(Some(UserResponse::from(user)))
        })
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user))
}

pub async fn get_profile(
    State(state): State<AppState>,
    caller: Authenticated,
) -> Result<Json<Profile>, AppError> {
    let principal_id = caller.principal_id;
    let key = state.cache.profile_key(principal_id);
    let profile = state
        .cache
        .fetch(&key, state.cache.profile_ttl_seconds(), || async {
            let profile = bounded(
                "find_profile",
                state.config.store_timeout(),
                state.users.find_profile(principal_id),
            )
            .await?;
            Ok::<_, AppError>(profile)
        })
        .await?
        .unwrap_or_else(|| Profile::empty(principal_id));
    Ok(Json(profile))
}

pub async fn update_user(
    State(state): State<AppState>,
    caller: Authenticated,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    payload.validate()?;
    let timeout = state.config.store_timeout();
    let mut user = load_user(&state, caller.principal_id).await?;

    if let Some(name) = &payload.name {
        user.name = name.trim().to_string();
        user = bounded("update_user", timeout, state.users.update_user(&user)).await?;
    }

    if payload.touches_profile() {
        let mut profile = bounded("find_profile", timeout, state.users.find_profile(user.id))
            .await?
            .unwrap_or_else(|| Profile::empty(user.id));
        profile
            .apply(&payload)
            .map_err(|_| AppError::BadRequest("Invalid birthdate".into()))?;
        let profile = bounded("upsert_profile", timeout, state.users.upsert_profile(&profile)).await?;
        state
            .cache
            .overwrite(
                &state.cache.profile_key(user.id),
                &profile,
                state.cache.profile_ttl_seconds(),
            )
            .await?;
    }

    let response = UserResponse::from(user);
    refresh_user_cache(&state, &response).await?;
    Ok(Json(response))
}

pub async fn change_email(
    State(state): State<AppState>,
    caller: Authenticated,
    Json(payload): Json<ChangeEmailRequest>,
) -> Result<Json<UserResponse>, AppError> {
    payload.validate()?;
    let mut user = load_user(&state, caller.principal_id).await?;
    ensure_password_matches(&payload.password, &user.password_hash, "Password is incorrect")?;

    let email = normalize_email(&payload.email);
    if email == user.email {
        return Err(AppError::BadRequest(
            "New email must differ from current email".into(),
        ));
    }
    user.email = email;
    user.email_verified = false;
    let user = bounded(
        "update_user",
        state.config.store_timeout(),
        state.users.update_user(&user),
    )
    .await?;
    discard_codes(&state, user.id, CodePurpose::EmailVerification).await?;

    let response = UserResponse::from(user);
    refresh_user_cache(&state, &response).await?;
    tracing::info!(user_id = %response.id, "Email changed");
    Ok(Json(response))
}

pub async fn change_password(
    State(state): State<AppState>,
    caller: Authenticated,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;
    if payload.new_password == payload.current_password {
        return Err(AppError::BadRequest(
            "New password must differ from current password".into(),
        ));
    }

    let mut user = load_user(&state, caller.principal_id).await?;
    ensure_password_matches(
        &payload.current_password,
        &user.password_hash,
        "Current password is incorrect",
    )?;

    user.password_hash = hash_password(&payload.new_password)?;
    bounded(
        "update_user",
        state.config.store_timeout(),
        state.users.update_user(&user),
    )
    .await?;
    state.cache.invalidate(&state.cache.user_key(user.id)).await;

    tracing::info!(user_id = %user.id, "Password changed");
    Ok(Json(json!({"message": "Password updated successfully"})))
}

/// Paginated, searchable listing of every user. Access is decided by the
/// method table alone.
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UserListResponse>, AppError> {
    query.validate()?;
    let filter = query.into_filter();
    let (users, total) = bounded(
        "list_users",
        state.config.store_timeout(),
        state.users.list_users(&filter),
    )
    .await?;

    tracing::debug!(total, page = filter.page.page, "Users listed");
    Ok(Json(UserListResponse {
        users: users.into_iter().map(UserResponse::from).collect(),
        pagination: PageMetadata::new(filter.page, total),
    }))
}

/// Rotates a refresh token the caller proves to own with a live access
/// credential.
pub async fn verify_token(
    State(state): State<AppState>,
    caller: Authenticated,
    Json(payload): Json<VerifyTokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    payload.validate()?;
    let pair = state
        .sessions
        .rotate_owned_session(
            payload.refresh_token.trim(),
            caller.principal_id,
            &caller.client,
        )
        .await?;
    Ok(Json(pair.into_response(&state.config.auth_scheme)))
}

pub async fn send_verification_code(
    State(state): State<AppState>,
    caller: Authenticated,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let timeout = state.config.store_timeout();
    let user = load_user(&state, caller.principal_id).await?;
    if user.email_verified {
        return Err(AppError::BadRequest(ALREADY_VERIFIED.into()));
    }

    let throttle = Duration::minutes(state.config.email_verification_throttle_minutes);
    if let Some(last) = bounded(
        "latest_code",
        timeout,
        state.users.latest_code(user.id, CodePurpose::EmailVerification),
    )
    .await?
    {
        if last.created_within(Utc::now(), throttle) {
            return Err(AppError::TooManyRequests(
                "Too many verification requests".into(),
            ));
        }
    }

    let code = generate_one_time_code();
    bounded(
        "insert_code",
        timeout,
        state.users.insert_code(NewOneTimeCode {
            user_id: user.id,
            purpose: CodePurpose::EmailVerification,
            code_hash: hash_one_time_code(&code),
        }),
    )
    .await?;

    // TODO: hand the code to a mail delivery service once one is wired in.
    tracing::info!(user_id = %user.id, "Email verification code issued");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"message": "Verification code sent"})),
    ))
}

pub async fn verify_email(
    State(state): State<AppState>,
    caller: Authenticated,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<UserResponse>, AppError> {
    payload.validate()?;
    let mut user = load_user(&state, caller.principal_id).await?;
    if user.email_verified {
        return Err(AppError::BadRequest(ALREADY_VERIFIED.into()));
    }

    redeem_code(
        &state,
        user.id,
        CodePurpose::EmailVerification,
        &payload.code,
        Duration::hours(state.config.email_verification_code_ttl_hours),
        INVALID_VERIFICATION_CODE,
    )
    .await?;

    user.email_verified = true;
    let user = bounded(
        "update_user",
        state.config.store_timeout(),
        state.users.update_user(&user),
    )
    .await?;
    discard_codes(&state, user.id, CodePurpose::EmailVerification).await?;

    let response = UserResponse::from(user);
    refresh_user_cache(&state, &response).await?;
    tracing::info!(user_id = %response.id, "Email verified");
    Ok(Json(response))
}

async fn load_user(state: &AppState, principal_id: PrincipalId) -> Result<User, AppError> {
    bounded(
        "find_user_by_id",
        state.config.store_timeout(),
        state.users.find_user_by_id(principal_id),
    )
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".into()))
}

async fn refresh_user_cache(state: &AppState, user: &UserResponse) -> Result<(), AppError> {
    state
        .cache
        .overwrite(
            &state.cache.user_key(user.id),
            user,
            state.cache.user_ttl_seconds(),
        )
        .await?;
    Ok(())
}

fn ensure_password_matches(password: &str, hash: &str, message: &str) -> Result<(), AppError> {
    if verify_password(password, hash)? {
        Ok(())
    } else {
        Err(AppError::BadRequest(message.to_string()))
    }
}

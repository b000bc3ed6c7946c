use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppError,
    middleware::Authenticated,
    models::{user::SignOutRequest, SessionResponse},
    state::AppState,
    types::SessionId,
    validation::Validate,
};

pub async fn list_sessions(
    State(state): State<AppState>,
    caller: Authenticated,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let sessions = state.sessions.list_sessions(caller.principal_id).await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

pub async fn delete_session(
    State(state): State<AppState>,
    caller: Authenticated,
    Path(session_id): Path<SessionId>,
) -> Result<Json<Value>, AppError> {
    state
        .sessions
        .revoke_by_id(session_id, caller.principal_id)
        .await?;
    Ok(Json(json!({
        "message": "Session revoked",
        "session_id": session_id
    })))
}

pub async fn sign_out(
    State(state): State<AppState>,
    caller: Authenticated,
    Json(payload): Json<SignOutRequest>,
) -> Result<Json<Value>, AppError> {
    payload.validate()?;
    state
        .sessions
        .revoke_by_token(payload.refresh_token.trim(), caller.principal_id)
        .await?;
    Ok(Json(json!({"message": "Signed out"})))
}

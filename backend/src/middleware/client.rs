use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use super::{context::CallContext, request_id::RequestId};
use crate::{error::AppError, state::AppState};

/// Rejects calls from unregistered clients before any other work happens.
pub async fn client_gate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = state.clients.authenticate(request.headers())?;
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::debug!(request_id = %request_id, client_id = %client.id, "Client admitted");
    request
        .extensions_mut()
        .insert(CallContext::new(request_id, client));
    Ok(next.run(request).await)
}

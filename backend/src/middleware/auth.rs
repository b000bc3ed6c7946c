use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use super::context::CallContext;
use crate::{
    error::{AppError, AuthError},
    state::AppState,
    utils::jwt::{AccessClaims, TokenIssuer},
};

/// Per-route state for [`authorization_gate`]: the app plus the method name
/// looked up in the method table.
#[derive(Clone)]
pub struct GateState {
    pub app: AppState,
    pub method: &'static str,
}

pub async fn authorization_gate(
    State(gate): State<GateState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !gate.app.methods.requires_authorization(gate.method) {
        return Ok(next.run(request).await);
    }

    let claims = authenticate_bearer(
        request.headers(),
        &gate.app.config.auth_scheme,
        &gate.app.issuer,
    )
    .inspect_err(|err| {
        tracing::debug!(method = gate.method, code = err.code(), "Credential rejected");
    })?;

    let ctx = request
        .extensions_mut()
        .get_mut::<CallContext>()
        .ok_or(AuthError::ClientHeaderMissing)?;
    tracing::debug!(
        request_id = %ctx.request_id,
        method = gate.method,
        principal_id = %claims.sub,
        "Call authorized"
    );
    ctx.claims = Some(claims);

    Ok(next.run(request).await)
}

/// Extracts and verifies the credential from `Authorization: <scheme> <token>`.
pub fn authenticate_bearer(
    headers: &HeaderMap,
    scheme: &str,
    issuer: &TokenIssuer,
) -> Result<AccessClaims, AuthError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_credential(value, scheme))
        .ok_or(AuthError::CredentialMissing)?;

    issuer.verify(token).map_err(AuthError::Unauthenticated)
}

/// Scheme comparison is case-insensitive; an empty token counts as absent.
pub fn parse_credential<'a>(header: &'a str, scheme: &str) -> Option<&'a str> {
    let header = header.trim();
    let space_idx = header.find(' ')?;
    let (given, rest) = header.split_at(space_idx);
    if !given.eq_ignore_ascii_case(scheme) {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}

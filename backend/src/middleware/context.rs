//! Typed per-call context shared by the gates and handlers.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    error::{AppError, AuthError},
    models::Client,
    types::PrincipalId,
    utils::jwt::{AccessClaims, TokenError},
};

#[derive(Debug, Clone)]
pub struct CallContext {
    pub request_id: String,
    pub client: Client,
    /// Set only after the authorization gate verified a credential.
    pub claims: Option<AccessClaims>,
}

impl CallContext {
    pub fn new(request_id: String, client: Client) -> Self {
        Self {
            request_id,
            client,
            claims: None,
        }
    }
}

/// The calling client, as resolved by the client gate.
#[derive(Debug, Clone)]
pub struct CallerClient(pub Client);

impl<S> FromRequestParts<S> for CallerClient
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallContext>()
            .map(|ctx| CallerClient(ctx.client.clone()))
            .ok_or_else(|| AuthError::ClientHeaderMissing.into())
    }
}

/// A verified principal. Extraction fails on routes the authorization gate
/// did not verify.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal_id: PrincipalId,
    pub claims: AccessClaims,
    pub client: Client,
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts
            .extensions
            .get::<CallContext>()
            .ok_or(AuthError::ClientHeaderMissing)?;
        let claims = ctx.claims.clone().ok_or(AuthError::CredentialMissing)?;
        let principal_id = claims
            .principal_id()
            .ok_or(AuthError::Unauthenticated(TokenError::InvalidClaims))?;
        Ok(Authenticated {
            principal_id,
            claims,
            client: ctx.client.clone(),
        })
    }
}

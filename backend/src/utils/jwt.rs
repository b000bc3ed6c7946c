use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::Config,
    types::PrincipalId,
    utils::keys::{KeyMaterial, SIGNING_ALGORITHM},
};

const REFRESH_TOKEN_RANDOM_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String, // principal id
    pub exp: i64,
    pub nbf: i64,
    pub iat: i64,
    pub jti: String,
}

impl AccessClaims {
    pub fn principal_id(&self) -> Option<PrincipalId> {
        self.sub.parse().ok()
    }
}

/// Reason an access credential was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token malformed")]
    Malformed,
    #[error("token signature invalid")]
    InvalidSignature,
    #[error("token issuer or audience mismatch")]
    InvalidClaims,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: AccessClaims,
}

/// Builds and verifies PS512-signed access credentials.
///
/// Holds no mutable state; a single instance is shared across all calls.
#[derive(Debug)]
pub struct TokenIssuer {
    keys: Arc<KeyMaterial>,
    issuer: String,
    audience: String,
    access_ttl_seconds: u64,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(
        keys: Arc<KeyMaterial>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        access_ttl_seconds: u64,
    ) -> Self {
        let issuer = issuer.into();
        let audience = audience.into();

        // The time window is checked after issuer/audience, outside the library.
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);

        Self {
            keys,
            issuer,
            audience,
            access_ttl_seconds,
            validation,
        }
    }

    pub fn from_config(keys: Arc<KeyMaterial>, config: &Config) -> Self {
        Self::new(
            keys,
            config.jwt_issuer.clone(),
            config.jwt_audience.clone(),
            config.access_token_ttl_seconds,
        )
    }

    pub fn issue(&self, principal_id: PrincipalId) -> anyhow::Result<IssuedToken> {
        self.issue_at(principal_id, Utc::now())
    }

    pub fn issue_at(
        &self,
        principal_id: PrincipalId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<IssuedToken> {
        let expires_at = expiry_after(now, self.access_ttl_seconds)?;
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: principal_id.to_string(),
            exp: expires_at.timestamp(),
            nbf: now.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(SIGNING_ALGORITHM),
            &claims,
            self.keys.encoding_key(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign access token: {:?}", e.kind()))?;

        Ok(IssuedToken { token, claims })
    }

    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Signature, then issuer/audience, then the `[nbf, exp]` window.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        let data = decode::<AccessClaims>(token, self.keys.decoding_key(), &self.validation)
            .map_err(|e| classify(e.kind()))?;
        let claims = data.claims;

        let now = now.timestamp();
        if now < claims.nbf {
            return Err(TokenError::NotYetValid);
        }
        if now > claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

/// `now + ttl_seconds`, or an error when the instant is not representable.
fn expiry_after(now: DateTime<Utc>, ttl_seconds: u64) -> anyhow::Result<DateTime<Utc>> {
    i64::try_from(ttl_seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| anyhow::anyhow!("Token lifetime of {} seconds is out of range", ttl_seconds))
}

fn classify(kind: &ErrorKind) -> TokenError {
    match kind {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::MissingRequiredClaim(_) => TokenError::InvalidClaims,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        _ => TokenError::Malformed,
    }
}

#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Opaque refresh secret: hex(SHA-256(principal || unix seconds || hex(random))).
pub fn generate_refresh_token(
    principal_id: PrincipalId,
    ttl_seconds: u64,
) -> anyhow::Result<RefreshToken> {
    generate_refresh_token_at(principal_id, ttl_seconds, Utc::now())
}

pub fn generate_refresh_token_at(
    principal_id: PrincipalId,
    ttl_seconds: u64,
    now: DateTime<Utc>,
) -> anyhow::Result<RefreshToken> {
    let expires_at = expiry_after(now, ttl_seconds)?;
    let mut random = [0u8; REFRESH_TOKEN_RANDOM_BYTES];
    OsRng
        .try_fill_bytes(&mut random)
        .map_err(|e| anyhow::anyhow!("Failed to gather randomness: {}", e))?;

    let mut hasher = Sha256::new();
    hasher.update(principal_id.to_string().as_bytes());
    hasher.update(now.timestamp().to_string().as_bytes());
    hasher.update(hex::encode(random).as_bytes());
    let token = hex::encode(hasher.finalize());

    Ok(RefreshToken {
        token,
        expires_at,
    })
}

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use shared::config::AuthConfig;
use shared::{AppError, MemberIdentity};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::state::AppState;

/// Scope carried by member tokens that may use app features
pub const FEATURES_SCOPE: &str = "features";

/// JWT Claims structure matching the token payload
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtClaims {
    /// `"<member_id>-<registration_branch_id>"`
    pub sub: String,
    pub scope: String,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Member authenticated by the request's JWT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentMember(pub MemberIdentity);

pub const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| {
            debug!("Missing Authorization header");
            AppError::authentication("Missing Authorization header")
        })?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.contains(char::is_whitespace))
        .ok_or_else(|| {
            warn!("Invalid Authorization header format");
            AppError::authentication("Authorization header must be in format: Bearer <token>")
        })?;

    Ok(token)
}

/// Validates a member JWT and returns the identity in its subject
pub fn verify_member_token(token: &str, config: &AuthConfig) -> Result<MemberIdentity, AppError> {
    let mut validation = Validation::new(JWT_ALGORITHM);
    validation.set_issuer(&[config.jwt_issuer.as_str()]);
    validation.set_audience(&[config.jwt_audience.as_str()]);

    let claims = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(&config.jwt_signing_key),
        &validation,
    )
    .map_err(|e| {
        debug!("JWT validation failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::authentication("Token expired")
            }
            _ => AppError::authentication("Invalid token"),
        }
    })?
    .claims;

    if claims.scope != FEATURES_SCOPE {
        return Err(AppError::authorization("Token scope does not allow this feature"));
    }

    claims.sub.parse::<MemberIdentity>().map_err(|_| {
        warn!(sub = %claims.sub, "Invalid member identity in JWT sub field");
        AppError::authentication("Invalid token")
    })
}

/// Checks a base64 admin API key against the configured HMAC-SHA256 hash
pub fn verify_admin_api_key(api_key: &str, config: &AuthConfig) -> Result<(), AppError> {
    let raw_key = STANDARD
        .decode(api_key)
        .map_err(|_| AppError::authentication("Invalid API key"))?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&config.admin_api_key_hash_secret)
        .map_err(|_| AppError::internal("Admin API key secret is not usable"))?;
    mac.update(&raw_key);

    mac.verify_slice(&config.admin_api_key_hash)
        .map_err(|_| AppError::authentication("Invalid API key"))
}

/// Requires a member JWT and puts [`CurrentMember`] into the request extensions
pub async fn require_member(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let member = verify_member_token(token, &state.config.auth)?;

    debug!(member = %member, "JWT authentication successful");
    request.extensions_mut().insert(CurrentMember(member));

    Ok(next.run(request).await)
}

/// Requires the admin API key
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = bearer_token(request.headers())?;
    verify_admin_api_key(api_key, &state.config.auth).map_err(|e| {
        warn!("Rejected admin request: {}", e);
        e
    })?;

    Ok(next.run(request).await)
}

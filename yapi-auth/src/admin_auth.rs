//! Admin-surface auth: JWT bearer tokens or HTTP Basic (spec.md §6).
//! Separately scoped from the client-facing credential resolver above —
//! grounded on the teacher's `jwt_auth.rs`/`basic_auth.rs` plugins, adapted
//! from per-route plugin config to a single admin-wide login.

use base64::Engine;
use serde::{Deserialize, Serialize};
use yapi_core::error::GatewayError;

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub exp: i64,
}

/// Issue a signed admin session token valid for `ttl_secs`.
pub fn issue_token(signing_key: &str, username: &str, ttl_secs: i64) -> Result<String, GatewayError> {
    let exp = (chrono::Utc::now() + chrono::Duration::seconds(ttl_secs)).timestamp();
    let claims = AdminClaims {
        sub: username.to_string(),
        exp,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(signing_key.as_bytes()),
    )
    .map_err(|e| GatewayError::Unauthorized(format!("token issue failed: {e}")))
}

/// Verify a bearer token previously issued by `issue_token`.
pub fn verify_token(signing_key: &str, token: &str) -> Result<AdminClaims, GatewayError> {
    jsonwebtoken::decode::<AdminClaims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(signing_key.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| GatewayError::Unauthorized("invalid admin token".into()))
}

/// Verify an `Authorization: Basic <base64(user:pass)>` header against the
/// configured admin username and bcrypt password hash.
pub fn verify_basic(
    expected_username: &str,
    expected_password_hash: &str,
    header_value: &str,
) -> Result<(), GatewayError> {
    let encoded = header_value
        .strip_prefix("Basic ")
        .ok_or_else(|| GatewayError::Unauthorized("missing Basic credentials".into()))?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| GatewayError::Unauthorized("malformed Basic credentials".into()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|_| GatewayError::Unauthorized("malformed Basic credentials".into()))?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or_else(|| GatewayError::Unauthorized("malformed Basic credentials".into()))?;

    if username != expected_username {
        return Err(GatewayError::Unauthorized("invalid admin credentials".into()));
    }
    let ok = bcrypt::verify(password, expected_password_hash)
        .map_err(|_| GatewayError::Unauthorized("invalid admin credentials".into()))?;
    if !ok {
        return Err(GatewayError::Unauthorized("invalid admin credentials".into()));
    }
    Ok(())
}

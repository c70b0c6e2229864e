use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access tokens expire after 15 minutes; clients refresh in the background.
const ACCESS_TTL_SECS: i64 = 900;
/// Refresh tokens expire after 7 days.
const REFRESH_TTL_SECS: i64 = 7 * 24 * 3600;

pub const PURPOSE_ACCESS: &str = "access";
pub const PURPOSE_REFRESH: &str = "refresh";

/// WebSocket close codes for rejected connections. Clients react differently:
/// 4001 means "silently refresh and reconnect", 4002 means "force re-login".
pub const CLOSE_CREDENTIAL_EXPIRED: u16 = 4001;
pub const CLOSE_AUTH_FAILED: u16 = 4002;

/// JWT claims carried by both access and refresh tokens.
/// `purpose` distinguishes them; only access tokens may open a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Internal user id
    pub sub: i64,
    /// Public identity string (what other users see)
    pub name: String,
    /// Token purpose: "access" or "refresh"
    pub purpose: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

/// Why a credential was rejected. Collapses to one of two close codes on
/// the wire; the finer variants only show up in logs.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential expired")]
    Expired,
    #[error("credential rejected: {0}")]
    Invalid(jsonwebtoken::errors::Error),
    #[error("credential purpose `{0}` is not valid for connections")]
    WrongPurpose(String),
    #[error("credential does not match the active token for this user")]
    CacheMismatch,
}

impl AuthError {
    pub fn close_code(&self) -> u16 {
        match self {
            AuthError::Expired => CLOSE_CREDENTIAL_EXPIRED,
            _ => CLOSE_AUTH_FAILED,
        }
    }
}

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_signing_key(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        // Invalid key file — regenerate
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Issue an access token for a user.
pub fn issue_access_token(
    secret: &[u8],
    user_id: i64,
    identity: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue_token(secret, user_id, identity, PURPOSE_ACCESS, ACCESS_TTL_SECS)
}

/// Issue a refresh token for a user. The gateway never accepts these for
/// connections; they exist so the surrounding application can rotate access
/// tokens without re-authentication.
pub fn issue_refresh_token(
    secret: &[u8],
    user_id: i64,
    identity: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    issue_token(secret, user_id, identity, PURPOSE_REFRESH, REFRESH_TTL_SECS)
}

fn issue_token(
    secret: &[u8],
    user_id: i64,
    identity: &str,
    purpose: &str,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        name: identity.to_string(),
        purpose: purpose.to_string(),
        iat: now,
        exp: now + ttl_secs,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Validate a bearer credential for opening a connection: signature, expiry,
/// and declared purpose. The cross-check against the credential cache happens
/// at the connection handler, which owns a reference to the cache.
pub fn validate_access_token(secret: &[u8], token: &str) -> Result<Claims, AuthError> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| {
            if matches!(
                e.kind(),
                jsonwebtoken::errors::ErrorKind::ExpiredSignature
            ) {
                AuthError::Expired
            } else {
                AuthError::Invalid(e)
            }
        })?;

    let claims = token_data.claims;
    if claims.purpose != PURPOSE_ACCESS {
        return Err(AuthError::WrongPurpose(claims.purpose));
    }
    Ok(claims)
}

//! Passwords and Session Tokens
//!
//! Passwords are stored as `hex(salt):hex(scrypt key)`. Dashboard requests
//! carry an HS256 token whose subject is the user id.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use scrypt::{Params, scrypt};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use checkout_core::UserId;

use crate::error::ApiError;

/// Token lifetime
pub const TOKEN_TTL_HOURS: i64 = 24 * 7;

const SALT_LEN: usize = 16;
const KEY_LEN: usize = 64;

fn derive_key(password: &str, salt: &str) -> Result<Vec<u8>, ApiError> {
    // N = 2^14, r = 16, p = 1
    let params = Params::new(14, 16, 1, KEY_LEN)
        .map_err(|e| ApiError::Internal(format!("Invalid scrypt params: {e}")))?;

    let mut output = vec![0u8; KEY_LEN];
    scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut output)
        .map_err(|e| ApiError::Internal(format!("scrypt failed: {e}")))?;
    Ok(output)
}

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);

    let key = derive_key(password, &salt)?;
    Ok(format!("{salt}:{}", hex::encode(key)))
}

/// Check `password` against a stored hash. A malformed hash never matches.
pub fn verify_password(hash: &str, password: &str) -> Result<bool, ApiError> {
    let Some((salt, key_hex)) = hash.split_once(':') else {
        return Ok(false);
    };
    let Ok(expected) = hex::decode(key_hex) else {
        return Ok(false);
    };

    let derived = derive_key(password, salt)?;
    Ok(bool::from(derived.ct_eq(&expected)))
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

pub fn issue_token(secret: &str, user_id: &UserId) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Token signing failed: {e}")))
}

/// Decode a token, returning the user id it was issued for
pub fn verify_token(secret: &str, token: &str) -> Result<UserId, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        if *e.kind() == jsonwebtoken::errors::ErrorKind::ExpiredSignature {
            ApiError::Unauthorized("Token expired".into())
        } else {
            ApiError::Unauthorized("Invalid token".into())
        }
    })?;

    Ok(UserId::from_string(data.claims.sub))
}

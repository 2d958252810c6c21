use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::Claims;
use crate::error::AppError;
use crate::state::security_config::SecurityConfig;

const DEFAULT_TOKEN_TTL_SECONDS: i64 = 15 * 60;

/// Mint an access token the way the external issuer does.
///
/// Kept for local development and tests; production tokens come from the
/// external identity service and are only ever verified here.
pub fn mint_access_token(
    player_id: &str,
    name: Option<&str>,
    now: SystemTime,
    security: &SecurityConfig,
) -> Result<String, AppError> {
    let iat = now
        .duration_since(UNIX_EPOCH)
        .map_err(|_| AppError::internal("Failed to get current time".to_string()))?
        .as_secs() as i64;
    let exp = iat + DEFAULT_TOKEN_TTL_SECONDS;

    let claims = Claims {
        sub: player_id.to_string(),
        name: name.map(|n| n.to_string()),
        iat,
        exp,
    };

    encode(
        &Header::new(security.algorithm),
        &claims,
        &EncodingKey::from_secret(&security.jwt_secret),
    )
    .map_err(|e| AppError::internal(format!("Failed to encode JWT: {e}")))
}

/// Verify an access token and return its claims.
///
/// The algorithm is pinned to the configured one; expiry is always checked,
/// issuer/audience only when configured.
pub fn verify_access_token(token: &str, security: &SecurityConfig) -> Result<Claims, AppError> {
    let mut validation = Validation::new(security.algorithm);
    if let Some(issuer) = &security.issuer {
        validation.set_issuer(&[issuer]);
    }
    if let Some(audience) = &security.audience {
        validation.set_audience(&[audience]);
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(&security.jwt_secret),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::UnauthorizedExpiredJwt,
        _ => AppError::UnauthorizedInvalidJwt,
    })
}

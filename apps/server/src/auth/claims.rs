use serde::{Deserialize, Serialize};

/// Claims carried by externally issued access tokens.
///
/// The issuer binds a token to a stable player id; the server only verifies
/// the signature and lifts out `sub`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Stable opaque player id
    pub sub: String,
    /// Display name chosen at registration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Issued-at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

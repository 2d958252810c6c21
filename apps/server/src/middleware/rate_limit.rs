//! Rate limiting middleware configuration helpers
//!
//! The websocket upgrade endpoint is the only HTTP surface worth limiting:
//! 30 upgrade attempts per minute per IP. Established transports are
//! limited separately in-protocol (`sessions::rate_limit`).

use std::time::Duration;

use actix_extensible_rate_limit::backend::SimpleInputFunctionBuilder;

/// Configuration for websocket upgrade rate limiting.
/// Limits: 30 upgrade requests per 60 seconds per IP address.
pub fn upgrade_rate_limit_config() -> SimpleInputFunctionBuilder {
    SimpleInputFunctionBuilder::new(Duration::from_secs(60), 30).real_ip_key()
}

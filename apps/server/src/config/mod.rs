//! Environment-based server configuration.
//!
//! - `APP_LISTEN_ADDR` - listen address (default `127.0.0.1:3001`)
//! - `APP_REDIS_URL`   - StateStore connection string; unset falls back to
//!   the in-memory store (development only, no durability)
//! - `APP_JWT_SECRET`  - HS256 key for verifying issued tokens (required)

use std::env;

use crate::error::AppError;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreProfile {
    Redis(String),
    Memory,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub store: StoreProfile,
    pub jwt_secret: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let listen_addr =
            env::var("APP_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
        let store = match env::var("APP_REDIS_URL") {
            Ok(url) if !url.is_empty() => StoreProfile::Redis(url),
            _ => StoreProfile::Memory,
        };
        let jwt_secret = env::var("APP_JWT_SECRET")
            .map_err(|_| AppError::config("Missing APP_JWT_SECRET environment variable"))?;
        if jwt_secret.is_empty() {
            return Err(AppError::config("APP_JWT_SECRET must not be empty"));
        }

        Ok(Self {
            listen_addr,
            store,
            jwt_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var("APP_LISTEN_ADDR");
        env::remove_var("APP_REDIS_URL");
        env::remove_var("APP_JWT_SECRET");
    }

    #[test]
    #[serial]
    fn requires_jwt_secret() {
        clear_env();
        assert!(matches!(
            ServerConfig::from_env(),
            Err(AppError::Config { .. })
        ));
    }

    #[test]
    #[serial]
    fn defaults_and_overrides() {
        clear_env();
        env::set_var("APP_JWT_SECRET", "s3cret");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert_eq!(config.store, StoreProfile::Memory);

        env::set_var("APP_LISTEN_ADDR", "0.0.0.0:9000");
        env::set_var("APP_REDIS_URL", "redis://127.0.0.1:6379");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(
            config.store,
            StoreProfile::Redis("redis://127.0.0.1:6379".to_string())
        );
        clear_env();
    }
}

#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used, clippy::panic, clippy::todo, clippy::unimplemented))]

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod errors;
pub mod middleware;
pub mod rooms;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod store;
pub mod ws;

// Re-exports for public API
pub use auth::claims::Claims;
pub use auth::jwt::{mint_access_token, verify_access_token};
pub use error::AppError;
pub use errors::ErrorCode;
pub use rooms::{PlayerCommand, RoomInput, RoomRegistry};
pub use sessions::{ConnectionLimits, SessionManager};
pub use state::app_state::AppState;
pub use state::security_config::SecurityConfig;
pub use store::{MemoryStateStore, RedisStateStore, StateStore};

// Auto-initialize logging for unit tests
#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    server_test_support::logging::init();
}

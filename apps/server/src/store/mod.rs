//! Durable room/session state: the single source of truth across restarts.
//!
//! The store is a small key/value surface with one write primitive that
//! matters: `put_state` is a compare-and-swap on a per-room version number.
//! Room actors are the only in-process writers, so the CAS normally succeeds
//! first try; it exists to fence out a prior process instance that has not
//! yet noticed it lost ownership.

pub mod dto;
pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::state::{GameState, Slot};

pub use memory::MemoryStateStore;
pub use redis::RedisStateStore;

/// How long a session record outlives its last touch.
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict: expected {expected}, stored {actual}")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// A room state together with the version that guards its next write.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedState {
    pub version: u64,
    pub state: GameState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Disconnected,
}

/// Durable record tying a player to their seat; at most one per player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub player_id: String,
    pub room_code: String,
    pub slot: Slot,
    pub connection_status: ConnectionStatus,
    /// Seconds since the Unix epoch; whole seconds so the stored form
    /// round-trips exactly.
    pub last_seen: i64,
}

impl Session {
    pub fn new_active(player_id: impl Into<String>, room_code: impl Into<String>, slot: Slot) -> Self {
        Self {
            player_id: player_id.into(),
            room_code: room_code.into(),
            slot,
            connection_status: ConnectionStatus::Active,
            last_seen: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    pub fn touched(mut self, status: ConnectionStatus) -> Self {
        self.connection_status = status;
        self.last_seen = OffsetDateTime::now_utc().unix_timestamp();
        self
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load a room's state, or None when the room does not exist.
    async fn get_state(&self, room_code: &str) -> Result<Option<VersionedState>, StoreError>;

    /// Conditional write: succeeds only when the stored version equals
    /// `expected_version` (0 for an absent room) and returns the new version.
    async fn put_state(
        &self,
        room_code: &str,
        state: &GameState,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    async fn get_session(&self, player_id: &str) -> Result<Option<Session>, StoreError>;

    /// Unconditional write with a TTL.
    async fn put_session(&self, player_id: &str, session: &Session) -> Result<(), StoreError>;

    async fn delete_session(&self, player_id: &str) -> Result<(), StoreError>;

    /// Remove the room's state and membership keys.
    async fn delete_room(&self, room_code: &str) -> Result<(), StoreError>;

    /// All room codes with stored state. Used only at startup recovery.
    async fn active_rooms(&self) -> Result<Vec<String>, StoreError>;
}

//! In-memory StateStore.
//!
//! Used by tests and store-less development runs. Goes through the same JSON
//! encoding as the redis backend so the serialization contract is exercised
//! either way. No durability across restarts.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::domain::state::GameState;
use crate::store::dto::{decode_state, encode_state};
use crate::store::{Session, StateStore, StoreError, VersionedState, SESSION_TTL};

pub struct MemoryStateStore {
    rooms: Mutex<HashMap<String, (u64, String)>>,
    sessions: Mutex<HashMap<String, (String, OffsetDateTime)>>,
    session_ttl: Duration,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::with_session_ttl(SESSION_TTL)
    }

    /// TTL override for tests that exercise session expiry.
    pub fn with_session_ttl(session_ttl: Duration) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            session_ttl,
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_state(&self, room_code: &str) -> Result<Option<VersionedState>, StoreError> {
        let rooms = self.rooms.lock();
        match rooms.get(room_code) {
            Some((version, raw)) => Ok(Some(VersionedState {
                version: *version,
                state: decode_state(raw)?,
            })),
            None => Ok(None),
        }
    }

    async fn put_state(
        &self,
        room_code: &str,
        state: &GameState,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let raw = encode_state(state)?;
        let mut rooms = self.rooms.lock();
        let actual = rooms.get(room_code).map(|(v, _)| *v).unwrap_or(0);
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual,
            });
        }
        let next = expected_version + 1;
        rooms.insert(room_code.to_string(), (next, raw));
        Ok(next)
    }

    async fn get_session(&self, player_id: &str) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.lock();
        match sessions.get(player_id) {
            Some((raw, expires_at)) => {
                if *expires_at <= OffsetDateTime::now_utc() {
                    sessions.remove(player_id);
                    return Ok(None);
                }
                Ok(Some(serde_json::from_str(raw)?))
            }
            None => Ok(None),
        }
    }

    async fn put_session(&self, player_id: &str, session: &Session) -> Result<(), StoreError> {
        let raw = serde_json::to_string(session)?;
        let expires_at = OffsetDateTime::now_utc() + self.session_ttl;
        self.sessions
            .lock()
            .insert(player_id.to_string(), (raw, expires_at));
        Ok(())
    }

    async fn delete_session(&self, player_id: &str) -> Result<(), StoreError> {
        self.sessions.lock().remove(player_id);
        Ok(())
    }

    async fn delete_room(&self, room_code: &str) -> Result<(), StoreError> {
        self.rooms.lock().remove(room_code);
        Ok(())
    }

    async fn active_rooms(&self) -> Result<Vec<String>, StoreError> {
        let mut codes: Vec<String> = self.rooms.lock().keys().cloned().collect();
        codes.sort();
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ConnectionStatus;

    #[tokio::test]
    async fn put_state_is_a_cas() {
        let store = MemoryStateStore::new();
        let state = GameState::new_lobby("CASROOM");

        let v1 = store.put_state("CASROOM", &state, 0).await.unwrap();
        assert_eq!(v1, 1);

        // Stale writer loses.
        let err = store.put_state("CASROOM", &state, 0).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                expected: 0,
                actual: 1
            }
        ));

        let v2 = store.put_state("CASROOM", &state, v1).await.unwrap();
        assert_eq!(v2, 2);

        let loaded = store.get_state("CASROOM").await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.state, state);
    }

    #[tokio::test]
    async fn missing_room_reads_as_none_and_version_zero() {
        let store = MemoryStateStore::new();
        assert!(store.get_state("NOPE").await.unwrap().is_none());

        let state = GameState::new_lobby("NOPE");
        // Writing against version 1 on an absent key must conflict.
        let err = store.put_state("NOPE", &state, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { actual: 0, .. }));
    }

    #[tokio::test]
    async fn sessions_roundtrip_and_expire() {
        let store = MemoryStateStore::with_session_ttl(Duration::ZERO);
        let session = Session::new_active("p1", "ROOM01", 2);
        store.put_session("p1", &session).await.unwrap();
        // Zero TTL: already expired on read.
        assert!(store.get_session("p1").await.unwrap().is_none());

        let store = MemoryStateStore::new();
        store.put_session("p1", &session).await.unwrap();
        let loaded = store.get_session("p1").await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.connection_status, ConnectionStatus::Active);

        store.delete_session("p1").await.unwrap();
        assert!(store.get_session("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_room_and_iteration() {
        let store = MemoryStateStore::new();
        for code in ["AAAA", "BBBB"] {
            store
                .put_state(code, &GameState::new_lobby(code), 0)
                .await
                .unwrap();
        }
        assert_eq!(store.active_rooms().await.unwrap(), vec!["AAAA", "BBBB"]);

        store.delete_room("AAAA").await.unwrap();
        assert_eq!(store.active_rooms().await.unwrap(), vec!["BBBB"]);
        assert!(store.get_state("AAAA").await.unwrap().is_none());
    }
}

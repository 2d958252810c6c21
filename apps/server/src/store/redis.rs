//! Redis-backed StateStore.
//!
//! Key layout:
//! - `room:<code>:state`   - hash with `version` and `data` fields; the CAS
//!   compares and bumps `version` atomically in a Lua script.
//! - `room:<code>:members` - player ids ordered by slot, refreshed beside
//!   each successful state write (derived, not authoritative).
//! - `session:<player_id>` - JSON session record with a TTL.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::warn;

use crate::domain::state::GameState;
use crate::store::dto::{decode_state, encode_state, members_of};
use crate::store::{Session, StateStore, StoreError, VersionedState, SESSION_TTL};

/// Compare the stored version field and swap in the new state atomically.
/// Returns {1, new_version} on success, {0, stored_version} on conflict.
const CAS_SCRIPT: &str = r#"
local v = redis.call('HGET', KEYS[1], 'version')
if v == false then v = '0' end
if v == ARGV[1] then
  redis.call('HSET', KEYS[1], 'version', ARGV[2], 'data', ARGV[3])
  return {1, tonumber(ARGV[2])}
else
  return {0, tonumber(v)}
end
"#;

pub struct RedisStateStore {
    manager: ConnectionManager,
    cas: Script,
}

impl RedisStateStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|err| StoreError::Unavailable(format!("Invalid redis url: {err}")))?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self {
            manager,
            cas: Script::new(CAS_SCRIPT),
        })
    }

    fn state_key(room_code: &str) -> String {
        format!("room:{room_code}:state")
    }

    fn members_key(room_code: &str) -> String {
        format!("room:{room_code}:members")
    }

    fn session_key(player_id: &str) -> String {
        format!("session:{player_id}")
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn get_state(&self, room_code: &str) -> Result<Option<VersionedState>, StoreError> {
        let mut conn = self.manager.clone();
        let (version, data): (Option<String>, Option<String>) = redis::cmd("HMGET")
            .arg(Self::state_key(room_code))
            .arg("version")
            .arg("data")
            .query_async(&mut conn)
            .await?;
        match (version, data) {
            (Some(version), Some(data)) => {
                let version: u64 = version.parse().map_err(|_| {
                    StoreError::Corrupt(format!("non-integer version for room {room_code}"))
                })?;
                Ok(Some(VersionedState {
                    version,
                    state: decode_state(&data)?,
                }))
            }
            (None, None) => Ok(None),
            _ => Err(StoreError::Corrupt(format!(
                "half-written state hash for room {room_code}"
            ))),
        }
    }

    async fn put_state(
        &self,
        room_code: &str,
        state: &GameState,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let raw = encode_state(state)?;
        let next = expected_version + 1;
        let mut conn = self.manager.clone();
        let result: Vec<i64> = self
            .cas
            .key(Self::state_key(room_code))
            .arg(expected_version.to_string())
            .arg(next.to_string())
            .arg(raw)
            .invoke_async(&mut conn)
            .await?;
        match result.as_slice() {
            [1, new_version] => {
                // Membership is derived from the blob; a lost update here is
                // repaired by the next write.
                let members = serde_json::to_string(&members_of(state))?;
                if let Err(err) = conn
                    .set::<_, _, ()>(Self::members_key(room_code), members)
                    .await
                {
                    warn!(room_code, error = %err, "failed to refresh members key");
                }
                Ok(*new_version as u64)
            }
            [0, actual] => Err(StoreError::VersionConflict {
                expected: expected_version,
                actual: *actual as u64,
            }),
            other => Err(StoreError::Corrupt(format!(
                "unexpected CAS reply {other:?} for room {room_code}"
            ))),
        }
    }

    async fn get_session(&self, player_id: &str) -> Result<Option<Session>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(Self::session_key(player_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put_session(&self, player_id: &str, session: &Session) -> Result<(), StoreError> {
        let raw = serde_json::to_string(session)?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(Self::session_key(player_id), raw, SESSION_TTL.as_secs())
            .await?;
        Ok(())
    }

    async fn delete_session(&self, player_id: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(Self::session_key(player_id)).await?;
        Ok(())
    }

    async fn delete_room(&self, room_code: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(vec![
            Self::state_key(room_code),
            Self::members_key(room_code),
        ])
        .await?;
        Ok(())
    }

    async fn active_rooms(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        let mut codes = Vec::new();
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg("room:*:state")
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            for key in keys {
                if let Some(code) = key
                    .strip_prefix("room:")
                    .and_then(|rest| rest.strip_suffix(":state"))
                {
                    codes.push(code.to_string());
                }
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        codes.sort();
        codes.dedup();
        Ok(codes)
    }
}

//! In-memory index from room code to its single owning actor.
//!
//! Creation is idempotent: concurrent creators for the same code agree on
//! one actor (the dashmap entry lock decides). Reads are wait-free under a
//! shard snapshot; insert/remove touch only the code's shard.

use std::sync::{Arc, Weak};

use actix::prelude::*;
use dashmap::DashMap;
use tracing::info;

use crate::rooms::actor::RoomActor;
use crate::sessions::SessionManager;
use crate::store::{StateStore, StoreError};

pub struct RoomRegistry {
    store: Arc<dyn StateStore>,
    sessions: Arc<SessionManager>,
    rooms: DashMap<String, Addr<RoomActor>>,
    this: Weak<RoomRegistry>,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn StateStore>, sessions: Arc<SessionManager>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            store,
            sessions,
            rooms: DashMap::new(),
            this: weak.clone(),
        })
    }

    /// Fetch the actor for a code, creating it if absent.
    pub fn get_or_create(&self, room_code: &str) -> Addr<RoomActor> {
        self.rooms
            .entry(room_code.to_string())
            .or_insert_with(|| {
                info!(room_code, "creating room actor");
                RoomActor::new(
                    room_code.to_string(),
                    self.store.clone(),
                    self.sessions.clone(),
                    self.this.clone(),
                )
                .start()
            })
            .clone()
    }

    pub fn get(&self, room_code: &str) -> Option<Addr<RoomActor>> {
        self.rooms.get(room_code).map(|addr| addr.clone())
    }

    /// Called by a room actor tearing itself down.
    pub fn remove(&self, room_code: &str) {
        self.rooms.remove(room_code);
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Recreate an actor for every room with stored state. Run once at
    /// startup; players then resume via reconnect.
    pub async fn restore_active(&self) -> Result<usize, StoreError> {
        let codes = self.store.active_rooms().await?;
        for code in &codes {
            self.get_or_create(code);
        }
        if !codes.is_empty() {
            info!(count = codes.len(), "restored active rooms from store");
        }
        Ok(codes.len())
    }
}

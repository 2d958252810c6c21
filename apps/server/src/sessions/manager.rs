//! Transport bindings: which open channel currently speaks for a player.
//!
//! At most one binding per player; a new bind evicts the previous transport
//! with a `superseded` close. Binding and unbinding keep the durable
//! `Session` record fresh. Map operations never span an await, and actor
//! mailbox sends happen on owned handles, never under a shard lock.

use actix::prelude::*;
use dashmap::DashMap;
use tracing::{info, warn};
use uuid::Uuid;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::store::{ConnectionStatus, Session, StateStore, StoreError};
use crate::ws::protocol::ServerMsg;

/// Undelivered messages a transport may accumulate before it is closed as a
/// slow consumer.
pub const OUTBOUND_QUEUE_LIMIT: usize = 256;

/// Decrements the per-transport pending counter once the message has been
/// handled (or dropped with a stopping actor).
#[derive(Debug)]
pub struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Outbound wire message for a transport actor.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Outbound {
    pub msg: ServerMsg,
    #[allow(dead_code)]
    guard: Option<PendingGuard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Superseded,
    RateLimited,
    SlowConsumer,
}

/// Tell a transport actor to close with a reason.
#[derive(Message, Clone, Copy, Debug)]
#[rtype(result = "()")]
pub struct CloseTransport {
    pub reason: CloseReason,
}

struct TransportBinding {
    conn_id: Uuid,
    outbound: Recipient<Outbound>,
    control: Recipient<CloseTransport>,
    pending: Arc<AtomicUsize>,
}

/// Result of binding a transport to a player identity.
#[derive(Debug)]
pub struct BindOutcome {
    /// The live session the player can resume, if any.
    pub resumed: Option<Session>,
}

pub struct SessionManager {
    store: Arc<dyn StateStore>,
    bindings: DashMap<String, TransportBinding>,
    by_conn: DashMap<Uuid, String>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            bindings: DashMap::new(),
            by_conn: DashMap::new(),
        }
    }

    /// Bind a verified identity to a transport, evicting any previous one.
    pub async fn bind(
        &self,
        player_id: &str,
        conn_id: Uuid,
        outbound: Recipient<Outbound>,
        control: Recipient<CloseTransport>,
    ) -> Result<BindOutcome, StoreError> {
        // A transport re-authenticating as someone else must not leave its
        // previous identity pointing at this channel.
        if let Some((_, old_player)) = self.by_conn.remove(&conn_id) {
            if old_player != player_id {
                self.bindings
                    .remove_if(&old_player, |_, binding| binding.conn_id == conn_id);
            }
        }

        let evicted = self.bindings.insert(
            player_id.to_string(),
            TransportBinding {
                conn_id,
                outbound,
                control,
                pending: Arc::new(AtomicUsize::new(0)),
            },
        );
        self.by_conn.insert(conn_id, player_id.to_string());
        if let Some(old) = evicted {
            if old.conn_id != conn_id {
                self.by_conn.remove(&old.conn_id);
                info!(player_id, old_conn = %old.conn_id, "superseding previous transport");
                old.control.do_send(CloseTransport {
                    reason: CloseReason::Superseded,
                });
            }
        }

        let resumed = match self.store.get_session(player_id).await? {
            Some(session) => {
                let refreshed = session.touched(ConnectionStatus::Active);
                self.store.put_session(player_id, &refreshed).await?;
                Some(refreshed)
            }
            None => None,
        };
        Ok(BindOutcome { resumed })
    }

    /// Drop the binding for a closed transport.
    ///
    /// Returns the player id and their freshly disconnected session when the
    /// closed transport was still the player's current one; None when a newer
    /// bind already took over (the session stays active in that case).
    pub async fn unbind(
        &self,
        conn_id: Uuid,
    ) -> Result<Option<(String, Option<Session>)>, StoreError> {
        let Some((_, player_id)) = self.by_conn.remove(&conn_id) else {
            return Ok(None);
        };
        let still_current = self
            .bindings
            .get(&player_id)
            .map(|binding| binding.conn_id == conn_id)
            .unwrap_or(false);
        if !still_current {
            return Ok(None);
        }
        self.bindings
            .remove_if(&player_id, |_, binding| binding.conn_id == conn_id);

        let disconnected = match self.store.get_session(&player_id).await? {
            Some(session) => {
                let marked = session.touched(ConnectionStatus::Disconnected);
                self.store.put_session(&player_id, &marked).await?;
                Some(marked)
            }
            None => None,
        };
        Ok(Some((player_id, disconnected)))
    }

    /// Look up the durable session record for a player.
    pub async fn lookup_session(&self, player_id: &str) -> Result<Option<Session>, StoreError> {
        self.store.get_session(player_id).await
    }

    /// Send a message to the player's current transport, if any.
    ///
    /// Returns false when the player has no bound transport; the message is
    /// simply dropped (the room does not wait for absent players). A
    /// transport that stops draining its queue is closed as a slow consumer
    /// instead of buffering without bound.
    pub fn deliver(&self, player_id: &str, msg: ServerMsg) -> bool {
        let target = self.bindings.get(player_id).map(|binding| {
            (
                binding.outbound.clone(),
                binding.control.clone(),
                binding.pending.clone(),
            )
        });
        let Some((outbound, control, pending)) = target else {
            return false;
        };

        let queued = pending.fetch_add(1, Ordering::AcqRel);
        if queued >= OUTBOUND_QUEUE_LIMIT {
            pending.fetch_sub(1, Ordering::AcqRel);
            warn!(player_id, queued, "outbound queue overflow, closing transport");
            control.do_send(CloseTransport {
                reason: CloseReason::SlowConsumer,
            });
            return false;
        }
        outbound.do_send(Outbound {
            msg,
            guard: Some(PendingGuard(pending)),
        });
        true
    }

    pub fn is_bound(&self, player_id: &str) -> bool {
        self.bindings.contains_key(player_id)
    }

    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }
}

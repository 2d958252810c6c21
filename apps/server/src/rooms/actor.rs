//! One actor per room: the room's single writer.
//!
//! Inputs (player commands, transport events, grace timers) are processed
//! strictly serially; each one loads the state, runs the pure engine
//! transition, persists with a compare-and-swap, then fans events out
//! through the SessionManager. The CAS normally succeeds first try since
//! this actor is the only in-process writer; on conflict it reloads and
//! retries a bounded number of times, then tears the room down rather than
//! fight an out-of-process owner.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use actix::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{error, info, warn};

use crate::domain::engine::{self, GameCommand};
use crate::domain::events::{Audience, EventPayload, GameEvent};
use crate::domain::snapshot::snapshot_for;
use crate::domain::state::{GameState, Phase, Slot};
use crate::domain::{Card, Suit};
use crate::errors::domain::{ActionKind, DomainError};
use crate::rooms::registry::RoomRegistry;
use crate::sessions::SessionManager;
use crate::store::{Session, StateStore, StoreError, VersionedState};
use crate::ws::protocol::{ServerMsg, WsErrorCode};

pub const MAILBOX_CAPACITY: usize = 64;
const GRACE_PERIOD: Duration = Duration::from_secs(30);
const CAS_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub enum PlayerCommand {
    Join { display_name: String },
    Leave,
    SelectHokm { suit: Suit },
    PlayCard { card: Card },
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub enum RoomInput {
    Command {
        player_id: String,
        command: PlayerCommand,
    },
    Disconnected { player_id: String },
    Reconnected { player_id: String },
}

enum CommandOutcome {
    Applied {
        versioned: VersionedState,
        events: Vec<GameEvent>,
        teardown: bool,
    },
    Rejected {
        versioned: VersionedState,
        err: DomainError,
    },
    /// Join by an already-seated player: no mutation, snapshot restore.
    Resume {
        versioned: VersionedState,
    },
    /// The game cannot continue; room storage is already deleted.
    Cancelled {
        state: GameState,
        events: Vec<GameEvent>,
    },
}

pub struct RoomActor {
    code: String,
    store: Arc<dyn StateStore>,
    sessions: Arc<SessionManager>,
    registry: Weak<RoomRegistry>,
    cached: Option<VersionedState>,
    disconnected: HashSet<String>,
    grace_timers: HashMap<String, SpawnHandle>,
    closing: bool,
}

impl RoomActor {
    pub fn new(
        code: String,
        store: Arc<dyn StateStore>,
        sessions: Arc<SessionManager>,
        registry: Weak<RoomRegistry>,
    ) -> Self {
        Self {
            code,
            store,
            sessions,
            registry,
            cached: None,
            disconnected: HashSet::new(),
            grace_timers: HashMap::new(),
            closing: false,
        }
    }

    /// Load the room state, falling back to a fresh lobby for a new code.
    async fn load(
        store: &Arc<dyn StateStore>,
        cached: Option<VersionedState>,
        code: &str,
    ) -> Result<VersionedState, StoreError> {
        if let Some(versioned) = cached {
            return Ok(versioned);
        }
        Ok(store
            .get_state(code)
            .await?
            .unwrap_or_else(|| VersionedState {
                version: 0,
                state: GameState::new_lobby(code),
            }))
    }

    fn handle_command(
        &mut self,
        player_id: String,
        command: PlayerCommand,
        ctx: &mut Context<Self>,
    ) {
        let store = self.store.clone();
        let code = self.code.clone();
        let cached = self.cached.clone();
        let finish_player = player_id.clone();

        let fut = async move {
            let mut current = Self::load(&store, cached, &code).await?;

            // `join` doubles as resume for a seated player. A live session
            // in a different room blocks the join: one room per player.
            if matches!(command, PlayerCommand::Join { .. }) {
                if let Some(slot) = current.state.slot_of(&player_id) {
                    let session = Session::new_active(&player_id, &code, slot);
                    store.put_session(&player_id, &session).await?;
                    return Ok(CommandOutcome::Resume { versioned: current });
                }
                if let Some(session) = store.get_session(&player_id).await? {
                    if session.room_code != code {
                        return Ok(CommandOutcome::Rejected {
                            versioned: current,
                            err: DomainError::invalid_action(
                                ActionKind::AlreadySeated,
                                format!(
                                    "Already in room {}; leave it first",
                                    session.room_code
                                ),
                            ),
                        });
                    }
                }
            }

            let cmd = match command {
                PlayerCommand::Join { display_name } => GameCommand::Join {
                    player_id: player_id.clone(),
                    display_name,
                },
                PlayerCommand::Leave => GameCommand::Leave {
                    player_id: player_id.clone(),
                },
                PlayerCommand::SelectHokm { suit } => match current.state.slot_of(&player_id) {
                    Some(slot) => GameCommand::SelectHokm { slot, suit },
                    None => {
                        return Ok(CommandOutcome::Rejected {
                            versioned: current,
                            err: DomainError::invalid_action(
                                ActionKind::NotSeated,
                                "Player is not in this room",
                            ),
                        })
                    }
                },
                PlayerCommand::PlayCard { card } => match current.state.slot_of(&player_id) {
                    Some(slot) => GameCommand::PlayCard { slot, card },
                    None => {
                        return Ok(CommandOutcome::Rejected {
                            versioned: current,
                            err: DomainError::invalid_action(
                                ActionKind::NotSeated,
                                "Player is not in this room",
                            ),
                        })
                    }
                },
            };

            let mut attempt = 0;
            loop {
                attempt += 1;
                let mut rng = ChaCha20Rng::from_os_rng();
                let transition = match engine::apply(&current.state, cmd.clone(), &mut rng) {
                    Ok(t) => t,
                    Err(err) => {
                        return Ok(CommandOutcome::Rejected {
                            versioned: current,
                            err,
                        })
                    }
                };

                // A cancellation never persists; the room is deleted instead.
                if transition
                    .events
                    .iter()
                    .any(|e| matches!(e.payload, EventPayload::GameCancelled { .. }))
                {
                    Self::delete_room_storage(&store, &code, &current.state).await;
                    return Ok(CommandOutcome::Cancelled {
                        state: current.state,
                        events: transition.events,
                    });
                }

                match store
                    .put_state(&code, &transition.state, current.version)
                    .await
                {
                    Ok(new_version) => {
                        let versioned = VersionedState {
                            version: new_version,
                            state: transition.state,
                        };
                        Self::sync_sessions(&store, &code, &cmd, &versioned.state).await?;

                        let teardown = versioned.state.phase == Phase::GameComplete;
                        if teardown {
                            Self::delete_room_storage(&store, &code, &versioned.state).await;
                        }
                        return Ok(CommandOutcome::Applied {
                            versioned,
                            events: transition.events,
                            teardown,
                        });
                    }
                    Err(StoreError::VersionConflict { actual, .. }) if attempt < CAS_ATTEMPTS => {
                        warn!(
                            room_code = %code,
                            attempt,
                            actual_version = actual,
                            "state CAS conflict, reloading"
                        );
                        current = store.get_state(&code).await?.ok_or_else(|| {
                            StoreError::Corrupt("room state vanished during retry".into())
                        })?;
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        ctx.wait(fut.into_actor(self).map(move |res, actor, ctx| match res {
            Ok(outcome) => actor.finish_command(&finish_player, outcome, ctx),
            Err(err) => actor.fatal(&err, ctx),
        }));
    }

    /// Keep durable session records aligned with seating after a mutation.
    async fn sync_sessions(
        store: &Arc<dyn StateStore>,
        code: &str,
        cmd: &GameCommand,
        state: &GameState,
    ) -> Result<(), StoreError> {
        match cmd {
            // Seating may have been reshuffled by team assignment, so renew
            // every seated player's record, not just the joiner's.
            GameCommand::Join { .. } => {
                for (slot, seat) in state.seats.iter().enumerate() {
                    if let Some(seat) = seat {
                        let session =
                            Session::new_active(&seat.player_id, code, slot as Slot);
                        store.put_session(&seat.player_id, &session).await?;
                    }
                }
            }
            GameCommand::Leave { player_id } => {
                store.delete_session(player_id).await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Best-effort removal of room state and the seated players' sessions.
    async fn delete_room_storage(store: &Arc<dyn StateStore>, code: &str, state: &GameState) {
        if let Err(err) = store.delete_room(code).await {
            warn!(room_code = %code, error = %err, "failed to delete room state");
        }
        for seat in state.seats.iter().flatten() {
            if let Err(err) = store.delete_session(&seat.player_id).await {
                warn!(
                    room_code = %code,
                    player_id = %seat.player_id,
                    error = %err,
                    "failed to delete session"
                );
            }
        }
    }

    fn finish_command(
        &mut self,
        player_id: &str,
        outcome: CommandOutcome,
        ctx: &mut Context<Self>,
    ) {
        match outcome {
            CommandOutcome::Applied {
                versioned,
                events,
                teardown,
            } => {
                self.cached = Some(versioned.clone());
                self.dispatch_events(&versioned.state, &events);
                if teardown {
                    info!(room_code = %self.code, "game complete, closing room");
                    self.teardown(ctx);
                }
            }
            CommandOutcome::Rejected { versioned, err } => {
                self.cached = Some(versioned);
                self.reject(player_id, &err);
            }
            CommandOutcome::Resume { versioned } => {
                self.cached = Some(versioned.clone());
                self.restore(player_id, &versioned.state, ctx);
            }
            CommandOutcome::Cancelled { state, events } => {
                self.dispatch_events(&state, &events);
                info!(room_code = %self.code, "game cancelled, closing room");
                self.teardown(ctx);
            }
        }
    }

    /// Invalid actions are reported only to the offender.
    fn reject(&self, player_id: &str, err: &DomainError) {
        let msg = match err {
            DomainError::InvalidAction(ActionKind::RoomFull, detail) => {
                ServerMsg::error(WsErrorCode::RoomFull, detail.clone())
            }
            DomainError::InvalidAction(kind, detail) => ServerMsg::error_with_reason(
                WsErrorCode::InvalidAction,
                kind.reason(),
                detail.clone(),
            ),
            DomainError::Corrupt(detail) => {
                ServerMsg::error(WsErrorCode::Internal, detail.clone())
            }
        };
        self.sessions.deliver(player_id, msg);
    }

    fn handle_disconnected(&mut self, player_id: String, ctx: &mut Context<Self>) {
        self.disconnected.insert(player_id.clone());
        let store = self.store.clone();
        let code = self.code.clone();
        let cached = self.cached.clone();

        let fut = async move { Self::load(&store, cached, &code).await };
        ctx.wait(fut.into_actor(self).map(move |res, actor, ctx| {
            let versioned = match res {
                Ok(v) => v,
                Err(err) => return actor.fatal(&err, ctx),
            };
            actor.cached = Some(versioned.clone());
            let Some(slot) = versioned.state.slot_of(&player_id) else {
                return;
            };
            match versioned.state.phase {
                // Lobby members are removed immediately.
                Phase::Lobby => {
                    actor.disconnected.remove(&player_id);
                    actor.handle_command(player_id, PlayerCommand::Leave, ctx);
                }
                // Pre-gameplay the room only waits out a grace period.
                Phase::WaitingForHokm | Phase::TeamAssignment | Phase::InitialDeal => {
                    actor.broadcast_except(
                        &versioned.state,
                        &player_id,
                        ServerMsg::PlayerDisconnected { slot },
                    );
                    actor.schedule_grace(player_id, ctx);
                }
                // Mid-game the room pauses indefinitely on the absent seat.
                Phase::FinalDeal | Phase::Gameplay | Phase::RoundComplete => {
                    actor.broadcast_except(
                        &versioned.state,
                        &player_id,
                        ServerMsg::PlayerDisconnected { slot },
                    );
                }
                Phase::GameComplete => {}
            }
        }));
    }

    fn handle_reconnected(&mut self, player_id: String, ctx: &mut Context<Self>) {
        let store = self.store.clone();
        let code = self.code.clone();
        let cached = self.cached.clone();

        let fut = async move { Self::load(&store, cached, &code).await };
        ctx.wait(fut.into_actor(self).map(move |res, actor, ctx| {
            let versioned = match res {
                Ok(v) => v,
                Err(err) => return actor.fatal(&err, ctx),
            };
            actor.cached = Some(versioned.clone());
            actor.restore(&player_id, &versioned.state, ctx);
        }));
    }

    /// Cancel timers, announce the return and push a snapshot restore.
    fn restore(&mut self, player_id: &str, state: &GameState, ctx: &mut Context<Self>) {
        if let Some(handle) = self.grace_timers.remove(player_id) {
            ctx.cancel_future(handle);
        }
        let was_disconnected = self.disconnected.remove(player_id);
        let Some(slot) = state.slot_of(player_id) else {
            warn!(room_code = %self.code, player_id, "restore for unseated player");
            return;
        };
        if was_disconnected {
            self.broadcast_except(state, player_id, ServerMsg::PlayerReconnected { slot });
        }
        self.sessions.deliver(
            player_id,
            ServerMsg::GameState {
                snapshot: snapshot_for(state, slot),
            },
        );
    }

    fn schedule_grace(&mut self, player_id: String, ctx: &mut Context<Self>) {
        let key = player_id.clone();
        let handle = ctx.run_later(GRACE_PERIOD, move |actor, ctx| {
            actor.grace_expired(player_id.clone(), ctx);
        });
        if let Some(old) = self.grace_timers.insert(key, handle) {
            ctx.cancel_future(old);
        }
    }

    /// A fired timer re-checks membership: cancellation on reconnect is
    /// best-effort, so this must be a no-op for a player who came back.
    fn grace_expired(&mut self, player_id: String, ctx: &mut Context<Self>) {
        self.grace_timers.remove(&player_id);
        if self.closing || !self.disconnected.contains(&player_id) {
            return;
        }

        let store = self.store.clone();
        let code = self.code.clone();
        let cached = self.cached.clone();
        let fut = async move { Self::load(&store, cached, &code).await };
        ctx.wait(fut.into_actor(self).map(move |res, actor, ctx| {
            let versioned = match res {
                Ok(v) => v,
                Err(err) => return actor.fatal(&err, ctx),
            };
            let state = &versioned.state;
            let pre_gameplay = matches!(
                state.phase,
                Phase::TeamAssignment | Phase::InitialDeal | Phase::WaitingForHokm
            );
            let active = state
                .seats
                .iter()
                .flatten()
                .filter(|seat| !actor.disconnected.contains(&seat.player_id))
                .count();
            if pre_gameplay && active < 4 {
                info!(
                    room_code = %actor.code,
                    player_id,
                    "grace period expired, cancelling game"
                );
                let state = state.clone();
                let store = actor.store.clone();
                let code = actor.code.clone();
                let cleanup_state = state.clone();
                actor.broadcast(
                    &state,
                    ServerMsg::GameCancelled {
                        reason: "abandoned".to_string(),
                    },
                );
                actix::spawn(async move {
                    Self::delete_room_storage(&store, &code, &cleanup_state).await;
                });
                actor.teardown(ctx);
            }
        }));
    }

    fn dispatch_events(&self, state: &GameState, events: &[GameEvent]) {
        for event in events {
            let msg = self.to_server_msg(&event.payload, state);
            match event.audience {
                Audience::Broadcast => self.broadcast(state, msg),
                Audience::Slot(slot) => {
                    if let Some(seat) = state.player_at(slot) {
                        self.sessions.deliver(&seat.player_id, msg);
                    }
                }
            }
        }
    }

    fn to_server_msg(&self, payload: &EventPayload, state: &GameState) -> ServerMsg {
        match payload {
            EventPayload::JoinedRoom { slot, player_id } => ServerMsg::JoinSuccess {
                room_code: self.code.clone(),
                slot: *slot,
                you: player_id.clone(),
            },
            EventPayload::RoomUpdate { phase } => ServerMsg::RoomUpdate {
                connected_players: engine::roster(state)
                    .into_iter()
                    .filter(|seat| !self.disconnected.contains(&seat.player_id))
                    .collect(),
                phase: *phase,
            },
            EventPayload::TeamAssignment {
                teams,
                seating,
                hakem,
            } => ServerMsg::TeamAssignment {
                teams: *teams,
                seating: seating.clone(),
                hakem: *hakem,
            },
            EventPayload::InitialDeal { hand } => ServerMsg::InitialDeal { hand: hand.clone() },
            EventPayload::HokmChoiceRequired => ServerMsg::HokmChoiceRequired,
            EventPayload::HokmSelected { suit } => ServerMsg::HokmSelected { suit: *suit },
            EventPayload::FinalDeal { hand } => ServerMsg::FinalDeal { hand: hand.clone() },
            EventPayload::TurnStart { turn, led_suit } => ServerMsg::TurnStart {
                turn_slot: *turn,
                led_suit: *led_suit,
            },
            EventPayload::CardPlayed { slot, card } => ServerMsg::CardPlayed {
                slot: *slot,
                card: *card,
            },
            EventPayload::TrickComplete { winner, trick } => ServerMsg::TrickComplete {
                winner_slot: *winner,
                trick: trick.clone(),
            },
            EventPayload::RoundComplete {
                winner_team,
                round_scores,
            } => ServerMsg::RoundComplete {
                winner_team: *winner_team,
                round_scores: *round_scores,
            },
            EventPayload::GameComplete {
                winner_team,
                round_scores,
            } => ServerMsg::GameComplete {
                winner_team: *winner_team,
                round_scores: *round_scores,
            },
            EventPayload::GameCancelled { reason } => ServerMsg::GameCancelled {
                reason: reason.as_str().to_string(),
            },
        }
    }

    fn broadcast(&self, state: &GameState, msg: ServerMsg) {
        for seat in state.seats.iter().flatten() {
            self.sessions.deliver(&seat.player_id, msg.clone());
        }
    }

    fn broadcast_except(&self, state: &GameState, skip_player: &str, msg: ServerMsg) {
        for seat in state.seats.iter().flatten() {
            if seat.player_id != skip_player {
                self.sessions.deliver(&seat.player_id, msg.clone());
            }
        }
    }

    /// Sustained storage failure is fatal for this room, never the process.
    fn fatal(&mut self, err: &StoreError, ctx: &mut Context<Self>) {
        error!(room_code = %self.code, error = %err, "room hit a fatal store error");
        if let Some(versioned) = &self.cached {
            self.broadcast(
                &versioned.state,
                ServerMsg::GameCancelled {
                    reason: "internal".to_string(),
                },
            );
        }
        self.teardown(ctx);
    }

    fn teardown(&mut self, ctx: &mut Context<Self>) {
        if self.closing {
            return;
        }
        self.closing = true;
        for (_, handle) in self.grace_timers.drain() {
            ctx.cancel_future(handle);
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.code);
        }
        ctx.stop();
    }
}

impl Actor for RoomActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.set_mailbox_capacity(MAILBOX_CAPACITY);
        info!(room_code = %self.code, "room actor started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(room_code = %self.code, "room actor stopped");
    }
}

impl Handler<RoomInput> for RoomActor {
    type Result = ();

    fn handle(&mut self, input: RoomInput, ctx: &mut Context<Self>) -> Self::Result {
        if self.closing {
            return;
        }
        match input {
            RoomInput::Command { player_id, command } => {
                self.handle_command(player_id, command, ctx)
            }
            RoomInput::Disconnected { player_id } => self.handle_disconnected(player_id, ctx),
            RoomInput::Reconnected { player_id } => self.handle_reconnected(player_id, ctx),
        }
    }
}

//! Per-transport actor: the dispatcher's inbound and outbound halves.
//!
//! One actor per open websocket. Inbound frames run the full validation
//! pipeline (size cap, JSON shape, type whitelist, field patterns, auth
//! gate) before anything is routed to a room mailbox; a bad message earns a
//! typed error and the transport stays open. Outbound messages arrive as
//! `Outbound` envelopes from the session manager and are serialized here.

use std::time::{Duration, Instant};

use actix::dev::SendError;
use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use lazy_regex::{lazy_regex, Lazy};
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::jwt::verify_access_token;
use crate::domain::{Card, Suit};
use crate::error::AppError;
use crate::errors::domain::ActionKind;
use crate::rooms::{PlayerCommand, RoomInput};
use crate::sessions::{BindOutcome, CloseReason, CloseTransport, Outbound};
use crate::state::app_state::AppState;
use crate::store::StoreError;
use crate::ws::protocol::{ClientMsg, ServerMsg, WsErrorCode, KNOWN_TYPES, MAX_MESSAGE_BYTES};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(40);

static ROOM_CODE_RE: Lazy<Regex> = lazy_regex!(r"^[A-Z0-9_]{4,12}$");
static SUIT_RE: Lazy<Regex> = lazy_regex!(r"(?i)^(hearts|diamonds|clubs|spades)$");
static CARD_RE: Lazy<Regex> =
    lazy_regex!(r"^(2|3|4|5|6|7|8|9|10|J|Q|K|A)_(hearts|diamonds|clubs|spades)$");

pub async fn upgrade(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let remote = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    if !app_state.limits().try_register_transport(&remote) {
        return Err(AppError::rate_limited().into());
    }

    let session = WsSession::new(Uuid::new_v4(), remote.clone(), app_state.clone());
    match ws::start(session, &req, stream) {
        Ok(response) => Ok(response),
        Err(err) => {
            app_state.limits().release_transport(&remote);
            Err(err)
        }
    }
}

pub struct WsSession {
    conn_id: Uuid,
    remote: String,
    app_state: web::Data<AppState>,
    player_id: Option<String>,
    display_name: Option<String>,
    last_heartbeat: Instant,
}

impl WsSession {
    fn new(conn_id: Uuid, remote: String, app_state: web::Data<AppState>) -> Self {
        Self {
            conn_id,
            remote,
            app_state,
            player_id: None,
            display_name: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn send_json(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMsg) {
        match serde_json::to_string(msg) {
            Ok(payload) => ctx.text(payload),
            Err(err) => warn!(error = %err, "[WS SESSION] failed to serialize outbound message"),
        }
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |actor, ctx| {
            if Instant::now().duration_since(actor.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(
                    conn_id = %actor.conn_id,
                    "[WS SESSION] heartbeat timed out"
                );
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
                ctx.stop();
                return;
            }
            ctx.ping(b"keepalive");
        });
    }

    /// Send the typed close error, then drop the transport.
    fn close_with(&mut self, reason: CloseReason, ctx: &mut ws::WebsocketContext<Self>) {
        let (code, message) = match reason {
            CloseReason::Superseded => (
                WsErrorCode::Superseded,
                "Another transport took over this player",
            ),
            CloseReason::RateLimited => (WsErrorCode::RateLimited, "Message rate exceeded"),
            CloseReason::SlowConsumer => (WsErrorCode::SlowConsumer, "Outbound queue overflow"),
        };
        Self::send_json(ctx, &ServerMsg::error(code, message));
        ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Policy)));
        ctx.stop();
    }

    fn on_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        if text.len() > MAX_MESSAGE_BYTES {
            Self::send_json(
                ctx,
                &ServerMsg::error(WsErrorCode::Malformed, "Message exceeds 4 KiB"),
            );
            return;
        }
        if !self.app_state.limits().allow_message(&self.remote) {
            self.close_with(CloseReason::RateLimited, ctx);
            return;
        }

        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => {
                Self::send_json(
                    ctx,
                    &ServerMsg::error(WsErrorCode::Malformed, "Malformed JSON"),
                );
                return;
            }
        };
        let Some(msg_type) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
            Self::send_json(
                ctx,
                &ServerMsg::error(WsErrorCode::Malformed, "Missing type field"),
            );
            return;
        };
        if !KNOWN_TYPES.contains(&msg_type.as_str()) {
            Self::send_json(
                ctx,
                &ServerMsg::error(
                    WsErrorCode::UnknownType,
                    format!("Unknown message type {msg_type:?}"),
                ),
            );
            return;
        }
        let msg: ClientMsg = match serde_json::from_value(value) {
            Ok(msg) => msg,
            Err(err) => {
                Self::send_json(
                    ctx,
                    &ServerMsg::error(
                        WsErrorCode::Malformed,
                        format!("Invalid {msg_type} fields: {err}"),
                    ),
                );
                return;
            }
        };
        self.dispatch(msg, ctx);
    }

    fn dispatch(&mut self, msg: ClientMsg, ctx: &mut ws::WebsocketContext<Self>) {
        match msg {
            ClientMsg::Ping => Self::send_json(ctx, &ServerMsg::Pong),

            ClientMsg::Authenticate { token } => {
                match verify_access_token(&token, self.app_state.security()) {
                    Ok(claims) => self.bind_identity(claims.sub, claims.name, false, ctx),
                    Err(err) => {
                        let reason = match err {
                            AppError::UnauthorizedExpiredJwt => "token_expired",
                            _ => "invalid_token",
                        };
                        Self::send_json(
                            ctx,
                            &ServerMsg::AuthResponse {
                                ok: false,
                                player_id: None,
                                reason: Some(reason.to_string()),
                            },
                        );
                    }
                }
            }

            ClientMsg::Reconnect { player_id } => {
                if player_id.is_empty() || player_id.len() > 128 {
                    Self::send_json(
                        ctx,
                        &ServerMsg::error(WsErrorCode::Malformed, "Invalid player id"),
                    );
                    return;
                }
                self.bind_identity(player_id, None, true, ctx);
            }

            ClientMsg::Join { room_code } => {
                let display_name = self
                    .display_name
                    .clone()
                    .or_else(|| self.player_id.clone())
                    .unwrap_or_default();
                self.route_to_room(
                    &room_code,
                    true,
                    PlayerCommand::Join { display_name },
                    ctx,
                );
            }

            ClientMsg::Leave { room_code } => {
                self.route_to_room(&room_code, false, PlayerCommand::Leave, ctx);
            }

            ClientMsg::SelectHokm { room_code, suit } => {
                if !SUIT_RE.is_match(&suit) {
                    Self::send_json(
                        ctx,
                        &ServerMsg::error_with_reason(
                            WsErrorCode::InvalidAction,
                            ActionKind::InvalidSuit.reason(),
                            format!("Invalid suit {suit:?}"),
                        ),
                    );
                    return;
                }
                let Ok(suit) = suit.parse::<Suit>() else {
                    // Unreachable after the pattern check, kept defensive.
                    Self::send_json(
                        ctx,
                        &ServerMsg::error(WsErrorCode::Malformed, "Invalid suit"),
                    );
                    return;
                };
                self.route_to_room(&room_code, false, PlayerCommand::SelectHokm { suit }, ctx);
            }

            ClientMsg::PlayCard { room_code, card } => {
                if !CARD_RE.is_match(&card) {
                    Self::send_json(
                        ctx,
                        &ServerMsg::error_with_reason(
                            WsErrorCode::InvalidAction,
                            ActionKind::InvalidCard.reason(),
                            format!("Invalid card {card:?}"),
                        ),
                    );
                    return;
                }
                let Ok(card) = card.parse::<Card>() else {
                    Self::send_json(
                        ctx,
                        &ServerMsg::error(WsErrorCode::Malformed, "Invalid card"),
                    );
                    return;
                };
                self.route_to_room(&room_code, false, PlayerCommand::PlayCard { card }, ctx);
            }
        }
    }

    /// Validate the room code, resolve the actor and hand the command over.
    /// `create` is true only for `join`: rooms are created lazily on first
    /// join, never by other commands.
    fn route_to_room(
        &mut self,
        room_code: &str,
        create: bool,
        command: PlayerCommand,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let Some(player_id) = self.player_id.clone() else {
            Self::send_json(
                ctx,
                &ServerMsg::error(WsErrorCode::NotAuthenticated, "Authenticate first"),
            );
            return;
        };
        if !ROOM_CODE_RE.is_match(room_code) {
            Self::send_json(
                ctx,
                &ServerMsg::error(
                    WsErrorCode::Malformed,
                    format!("Invalid room code {room_code:?}"),
                ),
            );
            return;
        }

        let rooms = self.app_state.rooms();
        let addr = if create {
            Some(rooms.get_or_create(room_code))
        } else {
            rooms.get(room_code)
        };
        let Some(addr) = addr else {
            Self::send_json(
                ctx,
                &ServerMsg::error_with_reason(
                    WsErrorCode::InvalidAction,
                    ActionKind::NotSeated.reason(),
                    format!("No such room {room_code}"),
                ),
            );
            return;
        };

        match addr.try_send(RoomInput::Command { player_id, command }) {
            Ok(()) => {}
            Err(SendError::Full(_)) => {
                Self::send_json(
                    ctx,
                    &ServerMsg::error(WsErrorCode::ServerBusy, "Room is busy, retry shortly"),
                );
            }
            Err(SendError::Closed(_)) => {
                Self::send_json(
                    ctx,
                    &ServerMsg::error_with_reason(
                        WsErrorCode::InvalidAction,
                        ActionKind::NotSeated.reason(),
                        format!("Room {room_code} is closed"),
                    ),
                );
            }
        }
    }

    /// Bind this transport to a verified identity. With `require_session`
    /// (the `reconnect` path) the player must already have a durable session.
    fn bind_identity(
        &mut self,
        player_id: String,
        name: Option<String>,
        require_session: bool,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let sessions = self.app_state.sessions().clone();
        let rooms = self.app_state.rooms().clone();
        let conn_id = self.conn_id;
        let outbound = ctx.address().recipient::<Outbound>();
        let control = ctx.address().recipient::<CloseTransport>();
        let pid = player_id.clone();

        let fut = async move {
            if require_session && sessions.lookup_session(&pid).await?.is_none() {
                return Ok(None);
            }
            let outcome = sessions.bind(&pid, conn_id, outbound, control).await?;
            Ok::<Option<BindOutcome>, StoreError>(Some(outcome))
        };

        ctx.wait(fut.into_actor(self).map(move |res, actor, ctx| match res {
            Ok(None) => {
                Self::send_json(
                    ctx,
                    &ServerMsg::AuthResponse {
                        ok: false,
                        player_id: None,
                        reason: Some("unknown_player".to_string()),
                    },
                );
            }
            Ok(Some(outcome)) => {
                actor.player_id = Some(player_id.clone());
                if actor.display_name.is_none() {
                    actor.display_name = name.clone();
                }
                Self::send_json(
                    ctx,
                    &ServerMsg::AuthResponse {
                        ok: true,
                        player_id: Some(player_id.clone()),
                        reason: None,
                    },
                );
                if let Some(session) = outcome.resumed {
                    // get_or_create so a room that only exists in the store
                    // (post-restart) is revived on the spot.
                    let addr = rooms.get_or_create(&session.room_code);
                    let _ = addr.try_send(RoomInput::Reconnected {
                        player_id: player_id.clone(),
                    });
                }
            }
            Err(err) => {
                warn!(conn_id = %actor.conn_id, error = %err, "[WS SESSION] bind failed");
                Self::send_json(
                    ctx,
                    &ServerMsg::AuthResponse {
                        ok: false,
                        player_id: None,
                        reason: Some("internal".to_string()),
                    },
                );
            }
        }));
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(conn_id = %self.conn_id, remote = %self.remote, "[WS SESSION] started");
        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.app_state.limits().release_transport(&self.remote);
        info!(conn_id = %self.conn_id, "[WS SESSION] stopped");

        if self.player_id.is_some() {
            let sessions = self.app_state.sessions().clone();
            let rooms = self.app_state.rooms().clone();
            let conn_id = self.conn_id;
            actix::spawn(async move {
                match sessions.unbind(conn_id).await {
                    Ok(Some((player_id, Some(session)))) => {
                        if let Some(addr) = rooms.get(&session.room_code) {
                            let _ = addr.try_send(RoomInput::Disconnected { player_id });
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(conn_id = %conn_id, error = %err, "[WS SESSION] unbind failed");
                    }
                }
            });
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.on_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
                Self::send_json(
                    ctx,
                    &ServerMsg::error(WsErrorCode::Malformed, "Binary frames not supported"),
                );
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Nop) => {
                self.last_heartbeat = Instant::now();
            }
            Err(err) => {
                warn!(conn_id = %self.conn_id, error = %err, "[WS SESSION] protocol error");
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
                ctx.stop();
            }
        }
    }
}

impl Handler<Outbound> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) -> Self::Result {
        Self::send_json(ctx, &msg.msg);
    }
}

impl Handler<CloseTransport> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: CloseTransport, ctx: &mut Self::Context) -> Self::Result {
        self.close_with(msg.reason, ctx);
    }
}

//! Wire protocol: the closed set of messages crossing a transport.
//!
//! Text-encoded JSON objects discriminated by a `type` field. Inbound
//! messages carry raw strings for suits/cards/room codes; the dispatcher
//! validates and parses them before anything reaches a room.

use serde::{Deserialize, Serialize};

use crate::domain::cards::{Card, Suit};
use crate::domain::events::SeatView;
use crate::domain::snapshot::PlayerSnapshot;
use crate::domain::state::{Phase, Slot, TeamId};

/// Inbound frames above this size are rejected as malformed.
pub const MAX_MESSAGE_BYTES: usize = 4096;

/// The inbound `type` whitelist; anything else earns `unknown_type`.
pub const KNOWN_TYPES: [&str; 7] = [
    "authenticate",
    "join",
    "reconnect",
    "leave",
    "select_hokm",
    "play_card",
    "ping",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    Authenticate { token: String },
    Join { room_code: String },
    Reconnect { player_id: String },
    Leave { room_code: String },
    SelectHokm { room_code: String, suit: String },
    PlayCard { room_code: String, card: String },
    Ping,
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    AuthResponse {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    JoinSuccess {
        room_code: String,
        slot: Slot,
        you: String,
    },
    RoomUpdate {
        connected_players: Vec<SeatView>,
        phase: Phase,
    },
    TeamAssignment {
        teams: [[Slot; 2]; 2],
        seating: Vec<SeatView>,
        hakem: Slot,
    },
    /// Private to the recipient.
    InitialDeal { hand: Vec<Card> },
    /// Private to the hakem.
    HokmChoiceRequired,
    HokmSelected { suit: Suit },
    /// Private to the recipient.
    FinalDeal { hand: Vec<Card> },
    TurnStart {
        turn_slot: Slot,
        #[serde(skip_serializing_if = "Option::is_none")]
        led_suit: Option<Suit>,
    },
    CardPlayed { slot: Slot, card: Card },
    TrickComplete {
        winner_slot: Slot,
        trick: Vec<(Slot, Card)>,
    },
    RoundComplete {
        winner_team: TeamId,
        round_scores: [u8; 2],
    },
    GameComplete {
        winner_team: TeamId,
        round_scores: [u8; 2],
    },
    PlayerDisconnected { slot: Slot },
    PlayerReconnected { slot: Slot },
    GameCancelled { reason: String },
    /// Full per-player snapshot, sent on reconnect/resume.
    GameState {
        #[serde(flatten)]
        snapshot: PlayerSnapshot,
    },
    Error {
        code: WsErrorCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        message: String,
    },
    Pong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WsErrorCode {
    Malformed,
    UnknownType,
    NotAuthenticated,
    InvalidAction,
    RoomFull,
    ServerBusy,
    RateLimited,
    SlowConsumer,
    Superseded,
    Internal,
}

impl WsErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            WsErrorCode::Malformed => "malformed",
            WsErrorCode::UnknownType => "unknown_type",
            WsErrorCode::NotAuthenticated => "not_authenticated",
            WsErrorCode::InvalidAction => "invalid_action",
            WsErrorCode::RoomFull => "room_full",
            WsErrorCode::ServerBusy => "server_busy",
            WsErrorCode::RateLimited => "rate_limited",
            WsErrorCode::SlowConsumer => "slow_consumer",
            WsErrorCode::Superseded => "superseded",
            WsErrorCode::Internal => "internal",
        }
    }
}

impl ServerMsg {
    pub fn error(code: WsErrorCode, message: impl Into<String>) -> Self {
        ServerMsg::Error {
            code,
            reason: None,
            message: message.into(),
        }
    }

    pub fn error_with_reason(
        code: WsErrorCode,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ServerMsg::Error {
            code,
            reason: Some(reason.into()),
            message: message.into(),
        }
    }
}

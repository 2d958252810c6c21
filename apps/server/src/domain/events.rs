//! Engine output events.
//!
//! Every transition yields a list of events, each addressed to the whole
//! room or to a single slot. The room actor maps these to wire messages and
//! resolves slots to transports; the engine itself never sees a transport.

use serde::Serialize;

use crate::domain::cards::{Card, Suit};
use crate::domain::state::{Phase, Slot, TeamId};

/// Who should receive an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Broadcast,
    Slot(Slot),
}

/// Public view of one seat, used in roster-bearing events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeatView {
    pub slot: Slot,
    pub player_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    PlayerLeft,
    Abandoned,
    Internal,
}

impl CancelReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PlayerLeft => "player_left",
            Self::Abandoned => "abandoned",
            Self::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Private ack for the joining player.
    JoinedRoom { slot: Slot, player_id: String },
    RoomUpdate { phase: Phase },
    TeamAssignment {
        teams: [[Slot; 2]; 2],
        seating: Vec<SeatView>,
        hakem: Slot,
    },
    /// Private: the recipient's five-card starting hand.
    InitialDeal { hand: Vec<Card> },
    /// Private to the hakem.
    HokmChoiceRequired,
    HokmSelected { suit: Suit },
    /// Private: the recipient's full thirteen-card hand.
    FinalDeal { hand: Vec<Card> },
    TurnStart { turn: Slot, led_suit: Option<Suit> },
    CardPlayed { slot: Slot, card: Card },
    TrickComplete {
        winner: Slot,
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
    GameCancelled { reason: CancelReason },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    pub audience: Audience,
    pub payload: EventPayload,
}

impl GameEvent {
    pub fn broadcast(payload: EventPayload) -> Self {
        Self {
            audience: Audience::Broadcast,
            payload,
        }
    }

    pub fn to_slot(slot: Slot, payload: EventPayload) -> Self {
        Self {
            audience: Audience::Slot(slot),
            payload,
        }
    }
}

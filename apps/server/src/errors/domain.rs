//! Domain-level error type used by the game engine.
//!
//! This error type is transport- and store-agnostic. A rejected action never
//! mutates state and is reported only to the submitting player; the wire
//! layer maps `ActionKind` to the snake_case reason codes clients see.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// The closed set of reasons an action can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    WrongPhase,
    RoomFull,
    AlreadySeated,
    NotSeated,
    NotYourTurn,
    NotHakem,
    NotInHand,
    MustFollowSuit,
    InvalidSuit,
    InvalidCard,
    TrickUnderflow,
}

impl ActionKind {
    /// Canonical snake_case reason string reported on the wire.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::WrongPhase => "wrong_phase",
            Self::RoomFull => "room_full",
            Self::AlreadySeated => "already_seated",
            Self::NotSeated => "not_seated",
            Self::NotYourTurn => "not_your_turn",
            Self::NotHakem => "not_hakem",
            Self::NotInHand => "not_in_hand",
            Self::MustFollowSuit => "must_follow_suit",
            Self::InvalidSuit => "invalid_suit",
            Self::InvalidCard => "invalid_card",
            Self::TrickUnderflow => "trick_underflow",
        }
    }
}

/// Central domain error type.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// A player action that cannot be applied; state is untouched.
    InvalidAction(ActionKind, String),
    /// Stored or derived state violates the data model.
    Corrupt(String),
}

impl Display for DomainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DomainError::InvalidAction(kind, d) => {
                write!(f, "invalid action {}: {d}", kind.reason())
            }
            DomainError::Corrupt(d) => write!(f, "corrupt state: {d}"),
        }
    }
}

impl Error for DomainError {}

impl DomainError {
    pub fn invalid_action(kind: ActionKind, detail: impl Into<String>) -> Self {
        Self::InvalidAction(kind, detail.into())
    }

    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt(detail.into())
    }

    pub fn action_kind(&self) -> Option<ActionKind> {
        match self {
            Self::InvalidAction(kind, _) => Some(*kind),
            Self::Corrupt(_) => None,
        }
    }
}

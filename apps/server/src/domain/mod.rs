//! Domain layer: the pure Hokm game engine and its types.

pub mod cards;
pub mod cards_logic;
pub mod cards_parsing;
pub mod cards_serde;
pub mod cards_types;
pub mod dealing;
pub mod engine;
pub mod events;
pub mod rules;
pub mod snapshot;
pub mod state;

// Re-exports for ergonomics
pub use cards::{card_beats, hand_has_suit, try_parse_cards, Card, Rank, Suit};
pub use engine::{apply, legal_moves, resolve_trick, GameCommand, Transition};
pub use events::{Audience, CancelReason, EventPayload, GameEvent, SeatView};
pub use snapshot::{snapshot_for, PlayerSnapshot};
pub use state::{GameState, Phase, Seat, Slot, TeamId};

//! Card types and logic, re-exported as one module.

pub use super::cards_logic::{card_beats, hand_has_suit};
pub use super::cards_parsing::try_parse_cards;
pub use super::cards_types::{Card, Rank, Suit};

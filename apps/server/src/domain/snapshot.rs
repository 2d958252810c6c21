//! Per-player view of a room, used for reconnect restores.
//!
//! The same shape as steady-state notifications: everything public about the
//! room plus the viewer's own hand. Other hands never leave the engine.

use serde::Serialize;

use crate::domain::cards::{Card, Suit};
use crate::domain::engine::roster;
use crate::domain::events::SeatView;
use crate::domain::state::{GameState, Phase, Slot};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    pub room_code: String,
    pub phase: Phase,
    pub seating: Vec<SeatView>,
    pub teams: [[Slot; 2]; 2],
    pub hakem: Option<Slot>,
    pub trump: Option<Suit>,
    /// The viewer's own hand only.
    pub hand: Vec<Card>,
    pub turn_slot: Slot,
    pub led_suit: Option<Suit>,
    pub current_trick: Vec<(Slot, Card)>,
    pub tricks_won: [u8; 4],
    pub round_scores: [u8; 2],
    pub round_number: u8,
    pub trick_number: u8,
}

/// Produce the snapshot a given slot is allowed to see.
pub fn snapshot_for(state: &GameState, slot: Slot) -> PlayerSnapshot {
    PlayerSnapshot {
        room_code: state.room_code.clone(),
        phase: state.phase,
        seating: roster(state),
        teams: state.teams(),
        hakem: state.hakem,
        trump: state.trump,
        hand: state.hand(slot).to_vec(),
        turn_slot: state.turn,
        led_suit: state.led_suit,
        current_trick: state.current_trick.clone(),
        tricks_won: state.tricks_won,
        round_scores: state.round_scores,
        round_number: state.round_no,
        trick_number: state.trick_no,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cards::Rank;
    use crate::domain::state::Seat;

    #[test]
    fn snapshot_carries_only_the_viewers_hand() {
        let mut state = GameState::new_lobby("ROOM01");
        for i in 0..4u8 {
            state.seats[i as usize] = Some(Seat {
                player_id: format!("p{i}"),
                display_name: format!("Player {i}"),
            });
        }
        state.phase = Phase::Gameplay;
        state.trump = Some(Suit::Hearts);
        state.hakem = Some(1);
        state.hands[0] = vec![Card {
            suit: Suit::Spades,
            rank: Rank::Ace,
        }];
        state.hands[1] = vec![Card {
            suit: Suit::Clubs,
            rank: Rank::Two,
        }];

        let snap = snapshot_for(&state, 0);
        assert_eq!(snap.hand, state.hands[0]);
        assert_eq!(snap.trump, Some(Suit::Hearts));
        assert_eq!(snap.seating.len(), 4);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["hand"][0], "A_spades");
        assert!(json.get("hands").is_none());
    }
}

//! Storage DTO for `GameState`.
//!
//! Persisted JSON differs from the runtime struct in one deliberate way:
//! every integer-keyed map (seats, hands, tricks_won, round_scores) is
//! written with string keys and parsed back to integers on load, and hands
//! are written as lists ordered by (suit, rank). A serialize → persist →
//! load → deserialize round trip yields a structurally equal `GameState`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::cards::{Card, Suit};
use crate::domain::rules::{PLAYERS, TEAMS};
use crate::domain::state::{GameState, Phase, Seat, Slot, TrickRecord};
use crate::store::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTrick {
    pub winner: Slot,
    pub plays: Vec<(Slot, Card)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredGameState {
    pub room_code: String,
    pub phase: Phase,
    pub seats: BTreeMap<String, Seat>,
    pub hakem: Option<Slot>,
    pub trump: Option<Suit>,
    pub hands: BTreeMap<String, Vec<Card>>,
    pub undealt: Vec<Card>,
    pub current_trick: Vec<(Slot, Card)>,
    pub led_suit: Option<Suit>,
    pub turn: Slot,
    pub tricks_won: BTreeMap<String, u8>,
    pub taken: Vec<StoredTrick>,
    pub round_scores: BTreeMap<String, u8>,
    pub round_no: u8,
    pub trick_no: u8,
}

impl From<&GameState> for StoredGameState {
    fn from(state: &GameState) -> Self {
        let seats = state
            .seats
            .iter()
            .enumerate()
            .filter_map(|(slot, seat)| seat.as_ref().map(|s| (slot.to_string(), s.clone())))
            .collect();
        let hands = state
            .hands
            .iter()
            .enumerate()
            .map(|(slot, hand)| {
                let mut sorted = hand.clone();
                sorted.sort();
                (slot.to_string(), sorted)
            })
            .collect();
        let tricks_won = state
            .tricks_won
            .iter()
            .enumerate()
            .map(|(slot, &n)| (slot.to_string(), n))
            .collect();
        let round_scores = state
            .round_scores
            .iter()
            .enumerate()
            .map(|(team, &n)| (team.to_string(), n))
            .collect();
        let taken = state
            .taken
            .iter()
            .map(|t| StoredTrick {
                winner: t.winner,
                plays: t.plays.clone(),
            })
            .collect();

        StoredGameState {
            room_code: state.room_code.clone(),
            phase: state.phase,
            seats,
            hakem: state.hakem,
            trump: state.trump,
            hands,
            undealt: state.undealt.clone(),
            current_trick: state.current_trick.clone(),
            led_suit: state.led_suit,
            turn: state.turn,
            tricks_won,
            taken,
            round_scores,
            round_no: state.round_no,
            trick_no: state.trick_no,
        }
    }
}

fn parse_slot_key(key: &str, bound: usize, what: &str) -> Result<usize, StoreError> {
    let idx: usize = key
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("non-integer {what} key {key:?}")))?;
    if idx >= bound {
        return Err(StoreError::Corrupt(format!(
            "{what} key {idx} out of range 0..{bound}"
        )));
    }
    Ok(idx)
}

impl TryFrom<StoredGameState> for GameState {
    type Error = StoreError;

    fn try_from(stored: StoredGameState) -> Result<Self, Self::Error> {
        let mut seats: [Option<Seat>; 4] = Default::default();
        for (key, seat) in stored.seats {
            let slot = parse_slot_key(&key, PLAYERS, "seat")?;
            seats[slot] = Some(seat);
        }
        let mut hands: [Vec<Card>; 4] = Default::default();
        for (key, hand) in stored.hands {
            let slot = parse_slot_key(&key, PLAYERS, "hand")?;
            hands[slot] = hand;
        }
        let mut tricks_won = [0u8; 4];
        for (key, n) in stored.tricks_won {
            let slot = parse_slot_key(&key, PLAYERS, "tricks_won")?;
            tricks_won[slot] = n;
        }
        let mut round_scores = [0u8; 2];
        for (key, n) in stored.round_scores {
            let team = parse_slot_key(&key, TEAMS, "round_scores")?;
            round_scores[team] = n;
        }
        let taken = stored
            .taken
            .into_iter()
            .map(|t| TrickRecord {
                winner: t.winner,
                plays: t.plays,
            })
            .collect();

        Ok(GameState {
            room_code: stored.room_code,
            phase: stored.phase,
            seats,
            hakem: stored.hakem,
            trump: stored.trump,
            hands,
            undealt: stored.undealt,
            current_trick: stored.current_trick,
            led_suit: stored.led_suit,
            turn: stored.turn,
            tricks_won,
            taken,
            round_scores,
            round_no: stored.round_no,
            trick_no: stored.trick_no,
        })
    }
}

/// Canonical JSON encoding used by every store backend.
pub fn encode_state(state: &GameState) -> Result<String, StoreError> {
    Ok(serde_json::to_string(&StoredGameState::from(state))?)
}

pub fn decode_state(raw: &str) -> Result<GameState, StoreError> {
    let stored: StoredGameState = serde_json::from_str(raw)?;
    stored.try_into()
}

/// Player ids ordered by slot, for the room membership key.
pub fn members_of(state: &GameState) -> Vec<String> {
    state
        .seats
        .iter()
        .filter_map(|s| s.as_ref().map(|seat| seat.player_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine::{apply, GameCommand};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn dealt_state() -> GameState {
        let mut rng = ChaCha20Rng::seed_from_u64(99);
        let mut state = GameState::new_lobby("ROUNDTRIP");
        for i in 0..4 {
            state = apply(
                &state,
                GameCommand::Join {
                    player_id: format!("p{i}"),
                    display_name: format!("Player {i}"),
                },
                &mut rng,
            )
            .unwrap()
            .state;
        }
        state
    }

    #[test]
    fn roundtrip_preserves_structural_equality() {
        let state = dealt_state();
        let json = encode_state(&state).unwrap();
        let back = decode_state(&json).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn integer_keys_are_stringified() {
        let state = dealt_state();
        let json: serde_json::Value =
            serde_json::from_str(&encode_state(&state).unwrap()).unwrap();
        assert!(json["hands"].get("0").is_some());
        assert!(json["seats"].get("0").is_some());
        assert!(json["tricks_won"].get("3").is_some());
        assert!(json["round_scores"].get("1").is_some());
    }

    #[test]
    fn bad_keys_are_rejected() {
        let state = dealt_state();
        let json = encode_state(&state).unwrap();
        let broken = json.replacen("\"0\":", "\"9\":", 1);
        assert!(matches!(
            decode_state(&broken),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn stored_hands_are_ordered() {
        let state = dealt_state();
        let json: serde_json::Value =
            serde_json::from_str(&encode_state(&state).unwrap()).unwrap();
        for slot in 0..4 {
            let hand: Vec<Card> =
                serde_json::from_value(json["hands"][slot.to_string()].clone()).unwrap();
            let mut sorted = hand.clone();
            sorted.sort();
            assert_eq!(hand, sorted);
        }
    }
}

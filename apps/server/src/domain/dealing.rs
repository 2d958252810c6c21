//! Deck construction, shuffling and dealing.
//!
//! Shuffling goes through a caller-supplied `Rng`; production code passes an
//! OS-seeded ChaCha20 generator, tests pass a seeded one for determinism.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::cards::{Card, Rank, Suit};
use crate::domain::rules::{HAND_SIZE, INITIAL_DEAL, PLAYERS};
use crate::errors::domain::DomainError;

/// Generate a full 52-card deck in standard order.
pub fn full_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(52);
    for suit in Suit::ALL {
        for rank in Rank::ALL {
            deck.push(Card { suit, rank });
        }
    }
    deck
}

/// Shuffle a fresh deck into a uniform random permutation.
pub fn shuffled_deck<R: Rng>(rng: &mut R) -> Vec<Card> {
    let mut deck = full_deck();
    deck.shuffle(rng);
    deck
}

/// Deal the initial five cards to each player from a shuffled deck.
///
/// Returns the four hands (sorted) and the undealt remainder, which is held
/// until hokm is chosen.
pub fn deal_initial<R: Rng>(rng: &mut R) -> ([Vec<Card>; 4], Vec<Card>) {
    let mut deck = shuffled_deck(rng);
    let mut hands: [Vec<Card>; 4] = Default::default();
    for hand in hands.iter_mut() {
        let mut dealt: Vec<Card> = deck.drain(..INITIAL_DEAL).collect();
        dealt.sort();
        *hand = dealt;
    }
    (hands, deck)
}

/// Deal the remaining cards so every player ends with a full 13-card hand.
pub fn deal_remainder(
    hands: &[Vec<Card>; 4],
    undealt: &[Card],
) -> Result<[Vec<Card>; 4], DomainError> {
    let per_player = HAND_SIZE - INITIAL_DEAL;
    if undealt.len() != per_player * PLAYERS {
        return Err(DomainError::corrupt(format!(
            "Final deal expected {} undealt cards, found {}",
            per_player * PLAYERS,
            undealt.len()
        )));
    }
    let mut full: [Vec<Card>; 4] = Default::default();
    for (slot, target) in full.iter_mut().enumerate() {
        if hands[slot].len() != INITIAL_DEAL {
            return Err(DomainError::corrupt(format!(
                "Final deal expected {INITIAL_DEAL}-card hand at slot {slot}, found {}",
                hands[slot].len()
            )));
        }
        let start = slot * per_player;
        let mut hand = hands[slot].clone();
        hand.extend_from_slice(&undealt[start..start + per_player]);
        hand.sort();
        *target = hand;
    }
    Ok(full)
}

//! Room game state: the single structure the engine transitions over.

use serde::{Deserialize, Serialize};

use crate::domain::cards::{Card, Suit};
use crate::domain::rules::{team_of, PLAYERS, TEAM_SLOTS};

/// Table position 0..=3. Slot order is turn order; slots 0/2 are team 0,
/// slots 1/3 are team 1.
pub type Slot = u8;
pub type TeamId = u8;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Lobby,
    TeamAssignment,
    InitialDeal,
    WaitingForHokm,
    FinalDeal,
    Gameplay,
    RoundComplete,
    GameComplete,
}

/// A seated player: stable opaque id plus display name.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    pub player_id: String,
    pub display_name: String,
}

/// One completed trick of the current round.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TrickRecord {
    pub winner: Slot,
    pub plays: Vec<(Slot, Card)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub room_code: String,
    pub phase: Phase,
    pub seats: [Option<Seat>; 4],
    /// The round's trump caller; None only before the first deal.
    pub hakem: Option<Slot>,
    /// Non-null iff hokm has been chosen for the round in progress.
    pub trump: Option<Suit>,
    /// Private hands, kept sorted by (suit, rank).
    pub hands: [Vec<Card>; 4],
    /// Cards parked between the initial and final deal (32 while waiting for hokm).
    pub undealt: Vec<Card>,
    pub current_trick: Vec<(Slot, Card)>,
    /// Suit of the first card of the current trick; None iff the trick is empty.
    pub led_suit: Option<Suit>,
    pub turn: Slot,
    pub tricks_won: [u8; 4],
    /// Completed tricks of the round in progress.
    pub taken: Vec<TrickRecord>,
    /// Rounds won per team. Sums to `round_no - 1` while a round is running.
    pub round_scores: [u8; 2],
    /// 1-based; 0 until the first deal.
    pub round_no: u8,
    /// Completed tricks this round (0..=13).
    pub trick_no: u8,
}

impl GameState {
    pub fn new_lobby(room_code: impl Into<String>) -> Self {
        Self {
            room_code: room_code.into(),
            phase: Phase::Lobby,
            seats: Default::default(),
            hakem: None,
            trump: None,
            hands: Default::default(),
            undealt: Vec::new(),
            current_trick: Vec::new(),
            led_suit: None,
            turn: 0,
            tricks_won: [0; 4],
            taken: Vec::new(),
            round_scores: [0; 2],
            round_no: 0,
            trick_no: 0,
        }
    }

    pub fn seated_count(&self) -> usize {
        self.seats.iter().filter(|s| s.is_some()).count()
    }

    pub fn slot_of(&self, player_id: &str) -> Option<Slot> {
        self.seats.iter().position(|s| {
            s.as_ref()
                .map(|seat| seat.player_id == player_id)
                .unwrap_or(false)
        }).map(|i| i as Slot)
    }

    pub fn first_free_slot(&self) -> Option<Slot> {
        self.seats.iter().position(|s| s.is_none()).map(|i| i as Slot)
    }

    pub fn player_at(&self, slot: Slot) -> Option<&Seat> {
        self.seats.get(slot as usize).and_then(|s| s.as_ref())
    }

    /// Fixed team layout: team id → its two slots.
    pub fn teams(&self) -> [[Slot; 2]; 2] {
        TEAM_SLOTS
    }

    /// Tricks taken this round by each team.
    pub fn team_tricks(&self) -> [u8; 2] {
        let mut teams = [0u8; 2];
        for slot in 0..PLAYERS as u8 {
            teams[team_of(slot) as usize] += self.tricks_won[slot as usize];
        }
        teams
    }

    pub fn hand(&self, slot: Slot) -> &[Card] {
        &self.hands[slot as usize]
    }
}

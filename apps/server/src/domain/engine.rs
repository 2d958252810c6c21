//! The Hokm state machine.
//!
//! `apply` is a pure transition: given a state and a command it returns the
//! next state plus the events to deliver, or an error that leaves the state
//! untouched. It performs no I/O; randomness comes in through the caller's
//! `Rng` so replays and tests stay deterministic.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::domain::cards::{card_beats, hand_has_suit, Card, Suit};
use crate::domain::dealing::{deal_initial, deal_remainder};
use crate::domain::events::{CancelReason, EventPayload, GameEvent, SeatView};
use crate::domain::rules::{
    next_slot, PLAYERS, ROUNDS_TO_WIN_GAME, TEAM_SLOTS, TRICKS_PER_ROUND, TRICKS_TO_WIN_ROUND,
};
use crate::domain::state::{GameState, Phase, Seat, Slot, TrickRecord};
use crate::errors::domain::{ActionKind, DomainError};

#[derive(Debug, Clone, PartialEq)]
pub enum GameCommand {
    Join {
        player_id: String,
        display_name: String,
    },
    Leave {
        player_id: String,
    },
    SelectHokm {
        slot: Slot,
        suit: Suit,
    },
    PlayCard {
        slot: Slot,
        card: Card,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: GameState,
    pub events: Vec<GameEvent>,
}

pub fn apply<R: Rng>(
    state: &GameState,
    command: GameCommand,
    rng: &mut R,
) -> Result<Transition, DomainError> {
    match command {
        GameCommand::Join {
            player_id,
            display_name,
        } => apply_join(state, player_id, display_name, rng),
        GameCommand::Leave { player_id } => apply_leave(state, &player_id),
        GameCommand::SelectHokm { slot, suit } => apply_select_hokm(state, slot, suit),
        GameCommand::PlayCard { slot, card } => apply_play_card(state, slot, card, rng),
    }
}

fn apply_join<R: Rng>(
    state: &GameState,
    player_id: String,
    display_name: String,
    rng: &mut R,
) -> Result<Transition, DomainError> {
    if state.slot_of(&player_id).is_some() {
        return Err(DomainError::invalid_action(
            ActionKind::AlreadySeated,
            format!("Player already seated in room {}", state.room_code),
        ));
    }
    // A game past the lobby has all four seats taken by definition, so both
    // failure modes collapse into room_full.
    if state.phase != Phase::Lobby {
        return Err(DomainError::invalid_action(
            ActionKind::RoomFull,
            "Game already started",
        ));
    }
    let slot = state.first_free_slot().ok_or_else(|| {
        DomainError::invalid_action(ActionKind::RoomFull, "All four seats are taken")
    })?;

    let mut next = state.clone();
    next.seats[slot as usize] = Some(Seat {
        player_id: player_id.clone(),
        display_name,
    });

    let mut events = vec![
        GameEvent::to_slot(slot, EventPayload::JoinedRoom { slot, player_id }),
        GameEvent::broadcast(EventPayload::RoomUpdate { phase: next.phase }),
    ];

    if next.seated_count() == PLAYERS {
        start_game(&mut next, rng, &mut events)?;
    }

    Ok(Transition {
        state: next,
        events,
    })
}

fn apply_leave(state: &GameState, player_id: &str) -> Result<Transition, DomainError> {
    let slot = state.slot_of(player_id).ok_or_else(|| {
        DomainError::invalid_action(ActionKind::NotSeated, "Player is not in this room")
    })?;

    match state.phase {
        Phase::Lobby => {
            let mut next = state.clone();
            next.seats[slot as usize] = None;
            let events = vec![GameEvent::broadcast(EventPayload::RoomUpdate {
                phase: next.phase,
            })];
            Ok(Transition {
                state: next,
                events,
            })
        }
        Phase::GameComplete => Err(DomainError::invalid_action(
            ActionKind::WrongPhase,
            "Game is already over",
        )),
        // A four-player game cannot continue short-handed.
        _ => Ok(Transition {
            state: state.clone(),
            events: vec![GameEvent::broadcast(EventPayload::GameCancelled {
                reason: CancelReason::PlayerLeft,
            })],
        }),
    }
}

fn apply_select_hokm(state: &GameState, slot: Slot, suit: Suit) -> Result<Transition, DomainError> {
    if state.phase != Phase::WaitingForHokm {
        return Err(DomainError::invalid_action(
            ActionKind::WrongPhase,
            "Hokm cannot be chosen now",
        ));
    }
    let hakem = state
        .hakem
        .ok_or_else(|| DomainError::corrupt("Waiting for hokm without a hakem"))?;
    if slot != hakem {
        return Err(DomainError::invalid_action(
            ActionKind::NotHakem,
            "Only the hakem chooses hokm",
        ));
    }

    let mut next = state.clone();
    next.trump = Some(suit);
    next.phase = Phase::FinalDeal;
    next.hands = deal_remainder(&next.hands, &next.undealt)?;
    next.undealt.clear();
    next.phase = Phase::Gameplay;
    next.turn = hakem;
    next.led_suit = None;

    let mut events = vec![GameEvent::broadcast(EventPayload::HokmSelected { suit })];
    for slot in 0..PLAYERS as u8 {
        events.push(GameEvent::to_slot(
            slot,
            EventPayload::FinalDeal {
                hand: next.hands[slot as usize].clone(),
            },
        ));
    }
    events.push(GameEvent::broadcast(EventPayload::TurnStart {
        turn: hakem,
        led_suit: None,
    }));

    Ok(Transition {
        state: next,
        events,
    })
}

fn apply_play_card<R: Rng>(
    state: &GameState,
    slot: Slot,
    card: Card,
    rng: &mut R,
) -> Result<Transition, DomainError> {
    if state.phase != Phase::Gameplay {
        return Err(DomainError::invalid_action(
            ActionKind::WrongPhase,
            "No trick is in progress",
        ));
    }
    if slot != state.turn {
        return Err(DomainError::invalid_action(
            ActionKind::NotYourTurn,
            format!("It is slot {}'s turn", state.turn),
        ));
    }
    let hand = state.hand(slot);
    if !hand.contains(&card) {
        return Err(DomainError::invalid_action(
            ActionKind::NotInHand,
            format!("{card} is not in hand"),
        ));
    }
    if let Some(led) = state.led_suit {
        if card.suit != led && hand_has_suit(hand, led) {
            return Err(DomainError::invalid_action(
                ActionKind::MustFollowSuit,
                format!("Must follow {led}"),
            ));
        }
    }

    let mut next = state.clone();
    let hand = &mut next.hands[slot as usize];
    if let Some(pos) = hand.iter().position(|c| *c == card) {
        hand.remove(pos);
    }
    if next.current_trick.is_empty() {
        next.led_suit = Some(card.suit);
    }
    next.current_trick.push((slot, card));
    next.turn = next_slot(slot);

    let mut events = vec![GameEvent::broadcast(EventPayload::CardPlayed { slot, card })];

    if next.current_trick.len() == PLAYERS {
        finish_trick(&mut next, rng, &mut events)?;
    } else {
        events.push(GameEvent::broadcast(EventPayload::TurnStart {
            turn: next.turn,
            led_suit: next.led_suit,
        }));
    }

    Ok(Transition {
        state: next,
        events,
    })
}

/// Cards `slot` could legally play right now. Empty when it is not that
/// player's turn or no trick play is possible.
pub fn legal_moves(state: &GameState, slot: Slot) -> Vec<Card> {
    if state.phase != Phase::Gameplay || slot != state.turn {
        return Vec::new();
    }
    let hand = state.hand(slot);
    if let Some(led) = state.led_suit {
        if hand_has_suit(hand, led) {
            return hand.iter().copied().filter(|c| c.suit == led).collect();
        }
    }
    hand.to_vec()
}

/// Determine the winning slot of a completed trick.
///
/// The highest trump wins if any trump was played; otherwise the highest
/// card of the led suit. Off-suit cards can never win. An empty trick is a
/// caller bug and fails rather than inventing a winner.
pub fn resolve_trick(trick: &[(Slot, Card)], trump: Suit) -> Result<Slot, DomainError> {
    let (first_slot, first_card) = *trick.first().ok_or_else(|| {
        DomainError::invalid_action(ActionKind::TrickUnderflow, "Cannot resolve an empty trick")
    })?;
    let lead = first_card.suit;
    let mut winner = (first_slot, first_card);
    for &(slot, card) in &trick[1..] {
        if card_beats(card, winner.1, lead, trump) {
            winner = (slot, card);
        }
    }
    Ok(winner.0)
}

fn finish_trick<R: Rng>(
    state: &mut GameState,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) -> Result<(), DomainError> {
    let trump = state
        .trump
        .ok_or_else(|| DomainError::corrupt("Gameplay without a trump suit"))?;
    let winner = resolve_trick(&state.current_trick, trump)?;

    let plays = std::mem::take(&mut state.current_trick);
    events.push(GameEvent::broadcast(EventPayload::TrickComplete {
        winner,
        trick: plays.clone(),
    }));
    state.taken.push(TrickRecord { winner, plays });
    state.tricks_won[winner as usize] += 1;
    state.trick_no += 1;
    state.led_suit = None;
    state.turn = winner;

    let team_tricks = state.team_tricks();
    let round_over = team_tricks.iter().any(|&t| t >= TRICKS_TO_WIN_ROUND)
        || state.trick_no == TRICKS_PER_ROUND;
    if round_over {
        finish_round(state, rng, events)?;
    } else {
        events.push(GameEvent::broadcast(EventPayload::TurnStart {
            turn: winner,
            led_suit: None,
        }));
    }
    Ok(())
}

fn finish_round<R: Rng>(
    state: &mut GameState,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) -> Result<(), DomainError> {
    let team_tricks = state.team_tricks();
    let winner_team: u8 = if team_tricks[0] > team_tricks[1] { 0 } else { 1 };

    state.phase = Phase::RoundComplete;
    state.round_scores[winner_team as usize] += 1;
    events.push(GameEvent::broadcast(EventPayload::RoundComplete {
        winner_team,
        round_scores: state.round_scores,
    }));

    if state.round_scores[winner_team as usize] >= ROUNDS_TO_WIN_GAME {
        state.phase = Phase::GameComplete;
        state.hands = Default::default();
        state.undealt.clear();
        state.current_trick.clear();
        state.led_suit = None;
        state.trump = None;
        events.push(GameEvent::broadcast(EventPayload::GameComplete {
            winner_team,
            round_scores: state.round_scores,
        }));
        return Ok(());
    }

    // New hakem: most tricks on the winning team, ties to the lower slot.
    let hakem = TEAM_SLOTS[winner_team as usize]
        .iter()
        .copied()
        .max_by_key(|&slot| (state.tricks_won[slot as usize], std::cmp::Reverse(slot)))
        .unwrap_or(0);
    state.hakem = Some(hakem);
    state.round_no += 1;
    start_round(state, rng, events);
    Ok(())
}

/// Seat the four joined players: a uniform random partition into two teams,
/// team 0 on slots 0/2, team 1 on slots 1/3.
fn start_game<R: Rng>(
    state: &mut GameState,
    rng: &mut R,
    events: &mut Vec<GameEvent>,
) -> Result<(), DomainError> {
    state.phase = Phase::TeamAssignment;

    let mut joined: Vec<Seat> = Vec::with_capacity(PLAYERS);
    for seat in state.seats.iter_mut() {
        joined.push(
            seat.take()
                .ok_or_else(|| DomainError::corrupt("Team assignment with an empty seat"))?,
        );
    }

    // Partner of the first joiner is uniform over the other three players,
    // which makes the partition uniform over its three possibilities.
    let partner = rng.random_range(1..PLAYERS);
    let mut team_a = vec![joined[0].clone(), joined[partner].clone()];
    let mut team_b: Vec<Seat> = (1..PLAYERS)
        .filter(|&i| i != partner)
        .map(|i| joined[i].clone())
        .collect();
    team_a.shuffle(rng);
    team_b.shuffle(rng);
    let (even, odd) = if rng.random_bool(0.5) {
        (team_a, team_b)
    } else {
        (team_b, team_a)
    };
    state.seats[0] = Some(even[0].clone());
    state.seats[2] = Some(even[1].clone());
    state.seats[1] = Some(odd[0].clone());
    state.seats[3] = Some(odd[1].clone());

    let hakem = rng.random_range(0..PLAYERS) as Slot;
    state.hakem = Some(hakem);
    state.round_no = 1;
    state.round_scores = [0; 2];

    events.push(GameEvent::broadcast(EventPayload::TeamAssignment {
        teams: TEAM_SLOTS,
        seating: seating_view(state),
        hakem,
    }));

    start_round(state, rng, events);
    Ok(())
}

/// Shuffle, deal the initial five cards and wait for the hakem's call.
fn start_round<R: Rng>(state: &mut GameState, rng: &mut R, events: &mut Vec<GameEvent>) {
    state.phase = Phase::InitialDeal;
    let (hands, undealt) = deal_initial(rng);
    state.hands = hands;
    state.undealt = undealt;
    state.trump = None;
    state.current_trick.clear();
    state.led_suit = None;
    state.tricks_won = [0; 4];
    state.taken.clear();
    state.trick_no = 0;
    // The hakem leads the first trick of the round.
    state.turn = state.hakem.unwrap_or(0);
    state.phase = Phase::WaitingForHokm;

    events.push(GameEvent::broadcast(EventPayload::RoomUpdate {
        phase: state.phase,
    }));
    for slot in 0..PLAYERS as u8 {
        events.push(GameEvent::to_slot(
            slot,
            EventPayload::InitialDeal {
                hand: state.hands[slot as usize].clone(),
            },
        ));
    }
    if let Some(hakem) = state.hakem {
        events.push(GameEvent::to_slot(hakem, EventPayload::HokmChoiceRequired));
    }
}

fn seating_view(state: &GameState) -> Vec<SeatView> {
    state
        .seats
        .iter()
        .enumerate()
        .filter_map(|(slot, seat)| {
            seat.as_ref().map(|s| SeatView {
                slot: slot as Slot,
                player_id: s.player_id.clone(),
                display_name: s.display_name.clone(),
            })
        })
        .collect()
}

/// Roster view shared with the actor layer (room updates, reconnects).
pub fn roster(state: &GameState) -> Vec<SeatView> {
    seating_view(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(0xBEEF)
    }

    fn join_four() -> GameState {
        let mut state = GameState::new_lobby("ROOM01");
        let mut r = rng();
        for i in 0..4 {
            let t = apply(
                &state,
                GameCommand::Join {
                    player_id: format!("p{i}"),
                    display_name: format!("Player {i}"),
                },
                &mut r,
            )
            .unwrap();
            state = t.state;
        }
        state
    }

    #[test]
    fn lobby_fills_then_deals() {
        let state = join_four();
        assert_eq!(state.phase, Phase::WaitingForHokm);
        assert_eq!(state.seated_count(), 4);
        assert!(state.hakem.is_some());
        assert_eq!(state.round_no, 1);
        for slot in 0..4 {
            assert_eq!(state.hand(slot).len(), 5);
        }
        assert_eq!(state.undealt.len(), 32);
        assert_eq!(state.turn, state.hakem.unwrap());
    }

    #[test]
    fn fifth_join_is_rejected() {
        let state = join_four();
        let err = apply(
            &state,
            GameCommand::Join {
                player_id: "p9".into(),
                display_name: "Latecomer".into(),
            },
            &mut rng(),
        )
        .unwrap_err();
        assert_eq!(err.action_kind(), Some(ActionKind::RoomFull));
    }

    #[test]
    fn duplicate_join_is_rejected() {
        let state = join_four();
        let err = apply(
            &state,
            GameCommand::Join {
                player_id: "p2".into(),
                display_name: "Double".into(),
            },
            &mut rng(),
        )
        .unwrap_err();
        assert_eq!(err.action_kind(), Some(ActionKind::AlreadySeated));
    }

    #[test]
    fn hokm_only_from_hakem_and_only_while_waiting() {
        let state = join_four();
        let hakem = state.hakem.unwrap();
        let not_hakem = (hakem + 1) % 4;

        let err = apply(
            &state,
            GameCommand::SelectHokm {
                slot: not_hakem,
                suit: Suit::Hearts,
            },
            &mut rng(),
        )
        .unwrap_err();
        assert_eq!(err.action_kind(), Some(ActionKind::NotHakem));

        let t = apply(
            &state,
            GameCommand::SelectHokm {
                slot: hakem,
                suit: Suit::Hearts,
            },
            &mut rng(),
        )
        .unwrap();
        assert_eq!(t.state.phase, Phase::Gameplay);
        assert_eq!(t.state.trump, Some(Suit::Hearts));
        for slot in 0..4 {
            assert_eq!(t.state.hand(slot).len(), 13);
        }
        assert!(t.state.undealt.is_empty());

        let again = apply(
            &t.state,
            GameCommand::SelectHokm {
                slot: hakem,
                suit: Suit::Spades,
            },
            &mut rng(),
        )
        .unwrap_err();
        assert_eq!(again.action_kind(), Some(ActionKind::WrongPhase));
    }

    #[test]
    fn play_out_of_turn_is_rejected() {
        let mut r = rng();
        let state = join_four();
        let hakem = state.hakem.unwrap();
        let state = apply(
            &state,
            GameCommand::SelectHokm {
                slot: hakem,
                suit: Suit::Hearts,
            },
            &mut r,
        )
        .unwrap()
        .state;

        let off_turn = next_slot(state.turn);
        let card = state.hand(off_turn)[0];
        let err = apply(
            &state,
            GameCommand::PlayCard {
                slot: off_turn,
                card,
            },
            &mut r,
        )
        .unwrap_err();
        assert_eq!(err.action_kind(), Some(ActionKind::NotYourTurn));
    }

    #[test]
    fn played_card_leaves_the_hand_and_sets_the_lead() {
        let mut r = rng();
        let state = join_four();
        let hakem = state.hakem.unwrap();
        let state = apply(
            &state,
            GameCommand::SelectHokm {
                slot: hakem,
                suit: Suit::Hearts,
            },
            &mut r,
        )
        .unwrap()
        .state;

        let card = state.hand(hakem)[0];
        let t = apply(
            &state,
            GameCommand::PlayCard { slot: hakem, card },
            &mut r,
        )
        .unwrap();
        assert!(!t.state.hand(hakem).contains(&card));
        assert_eq!(t.state.led_suit, Some(card.suit));
        assert_eq!(t.state.current_trick, vec![(hakem, card)]);
        assert_eq!(t.state.turn, next_slot(hakem));

        // Replaying the same card must fail without touching state.
        let err = apply(
            &t.state,
            GameCommand::PlayCard { slot: hakem, card },
            &mut r,
        )
        .unwrap_err();
        assert_eq!(err.action_kind(), Some(ActionKind::NotYourTurn));
    }

    #[test]
    fn resolve_trick_rejects_underflow() {
        let err = resolve_trick(&[], Suit::Hearts).unwrap_err();
        assert_eq!(err.action_kind(), Some(ActionKind::TrickUnderflow));
    }

    #[test]
    fn leave_in_lobby_frees_the_seat() {
        let mut r = rng();
        let mut state = GameState::new_lobby("ROOM01");
        for i in 0..2 {
            state = apply(
                &state,
                GameCommand::Join {
                    player_id: format!("p{i}"),
                    display_name: format!("Player {i}"),
                },
                &mut r,
            )
            .unwrap()
            .state;
        }
        let t = apply(
            &state,
            GameCommand::Leave {
                player_id: "p0".into(),
            },
            &mut r,
        )
        .unwrap();
        assert_eq!(t.state.seated_count(), 1);
        assert_eq!(t.state.first_free_slot(), Some(0));
    }

    #[test]
    fn leave_mid_game_cancels() {
        let state = join_four();
        let t = apply(
            &state,
            GameCommand::Leave {
                player_id: "p1".into(),
            },
            &mut rng(),
        )
        .unwrap();
        // State is untouched; the cancellation event tells the room actor
        // to tear the room down.
        assert_eq!(t.state, state);
        assert!(matches!(
            t.events[0].payload,
            EventPayload::GameCancelled {
                reason: CancelReason::PlayerLeft
            }
        ));
    }
}

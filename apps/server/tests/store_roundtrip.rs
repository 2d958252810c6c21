mod common;

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use hokm_server::domain::engine::{apply, legal_moves, GameCommand};
use hokm_server::domain::state::{GameState, Phase};
use hokm_server::domain::Suit;
use hokm_server::store::{
    ConnectionStatus, MemoryStateStore, Session, StateStore, StoreError,
};

/// Drive a deterministic game some way into its first round.
fn mid_round_game(seed: u64, plays: usize) -> GameState {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut state = GameState::new_lobby("PERSIST1");
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
    let hakem = state.hakem.unwrap();
    state = apply(
        &state,
        GameCommand::SelectHokm {
            slot: hakem,
            suit: Suit::Spades,
        },
        &mut rng,
    )
    .unwrap()
    .state;

    for _ in 0..plays {
        if state.phase != Phase::Gameplay {
            break;
        }
        let slot = state.turn;
        let card = legal_moves(&state, slot)[0];
        state = apply(&state, GameCommand::PlayCard { slot, card }, &mut rng)
            .unwrap()
            .state;
    }
    state
}

#[tokio::test]
async fn mid_game_state_survives_a_store_roundtrip() {
    let store = MemoryStateStore::new();

    // Persist at several depths of the same game, including mid-trick.
    let mut version = 0;
    for plays in [0, 1, 6, 23] {
        let state = mid_round_game(11, plays);
        version = store.put_state("PERSIST1", &state, version).await.unwrap();

        let loaded = store.get_state("PERSIST1").await.unwrap().unwrap();
        assert_eq!(loaded.state, state, "round trip diverged after {plays} plays");
        assert_eq!(loaded.version, version);
    }
}

#[tokio::test]
async fn versions_advance_one_write_at_a_time() {
    let store = MemoryStateStore::new();
    let mut version = 0;
    for plays in 0..8 {
        let state = mid_round_game(42, plays);
        version = store.put_state("CHAIN001", &state, version).await.unwrap();
        assert_eq!(version, plays as u64 + 1);
    }

    // A writer that missed an update must fail and see the newer version.
    let state = mid_round_game(42, 2);
    let err = store
        .put_state("CHAIN001", &state, version - 1)
        .await
        .unwrap_err();
    match err {
        StoreError::VersionConflict { expected, actual } => {
            assert_eq!(expected, version - 1);
            assert_eq!(actual, version);
        }
        other => panic!("expected version conflict, got {other}"),
    }
}

#[tokio::test]
async fn sessions_track_connection_status() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

    let active = Session::new_active("p0", "PERSIST1", 2);
    store.put_session("p0", &active).await.unwrap();

    let loaded = store.get_session("p0").await.unwrap().unwrap();
    assert_eq!(loaded.connection_status, ConnectionStatus::Active);
    assert_eq!(loaded.slot, 2);
    assert_eq!(loaded.room_code, "PERSIST1");

    let marked = loaded.touched(ConnectionStatus::Disconnected);
    store.put_session("p0", &marked).await.unwrap();
    let loaded = store.get_session("p0").await.unwrap().unwrap();
    assert_eq!(loaded.connection_status, ConnectionStatus::Disconnected);
    assert!(loaded.last_seen >= active.last_seen);
}

#[tokio::test]
async fn startup_iteration_sees_only_live_rooms() {
    let store = MemoryStateStore::new();
    for (code, seed) in [("GAME0001", 1u64), ("GAME0002", 2), ("GAME0003", 3)] {
        let state = mid_round_game(seed, 5);
        store.put_state(code, &state, 0).await.unwrap();
    }

    store.delete_room("GAME0002").await.unwrap();
    assert_eq!(
        store.active_rooms().await.unwrap(),
        vec!["GAME0001", "GAME0003"]
    );

    // Recovery reads back exactly what was persisted.
    let recovered = store.get_state("GAME0003").await.unwrap().unwrap();
    assert_eq!(recovered.state, mid_round_game(3, 5));
}

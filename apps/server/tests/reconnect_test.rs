mod common;

use std::sync::Arc;

use uuid::Uuid;

use hokm_server::domain::state::Phase;
use hokm_server::rooms::{PlayerCommand, RoomInput};
use hokm_server::state::app_state::AppState;
use hokm_server::state::security_config::SecurityConfig;
use hokm_server::store::{ConnectionStatus, MemoryStateStore, StateStore};
use hokm_server::ws::protocol::ServerMsg;

use crate::common::{spawn_capture, wait_for_state, wait_until, CaptureHandle};

async fn bind_player(app: &AppState, player_id: &str) -> (CaptureHandle, Uuid) {
    let capture = spawn_capture();
    let conn_id = Uuid::new_v4();
    app.sessions()
        .bind(
            player_id,
            conn_id,
            capture.addr.clone().recipient(),
            capture.addr.clone().recipient(),
        )
        .await
        .unwrap();
    (capture, conn_id)
}

async fn seat_four(app: &AppState, room: &str) -> Vec<(CaptureHandle, Uuid)> {
    let mut transports = Vec::new();
    for i in 0..4 {
        transports.push(bind_player(app, &format!("p{i}")).await);
    }
    let addr = app.rooms().get_or_create(room);
    for i in 0..4 {
        addr.try_send(RoomInput::Command {
            player_id: format!("p{i}"),
            command: PlayerCommand::Join {
                display_name: format!("Player {i}"),
            },
        })
        .unwrap();
    }
    assert!(
        wait_until(|| {
            transports
                .iter()
                .all(|(c, _)| c.contains(|m| matches!(m, ServerMsg::InitialDeal { .. })))
        })
        .await
    );
    transports
}

#[actix_web::test]
async fn a_new_bind_supersedes_the_old_transport() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let app = AppState::new(store.clone(), SecurityConfig::default());

    let (first, _) = bind_player(&app, "p0").await;
    assert!(app.sessions().is_bound("p0"));

    let (second, _) = bind_player(&app, "p0").await;
    assert!(wait_until(|| first.was_closed()).await, "old transport stayed open");
    assert!(!second.was_closed());
    assert_eq!(app.sessions().bound_count(), 1);

    // Rebinding alone never touches room state.
    assert!(store.get_state("ANYROOM1").await.unwrap().is_none());

    // Deliveries now land on the new transport only.
    app.sessions().deliver("p0", ServerMsg::Pong);
    assert!(wait_until(|| second.contains(|m| matches!(m, ServerMsg::Pong))).await);
    assert!(!first.contains(|m| matches!(m, ServerMsg::Pong)));
}

#[actix_web::test]
async fn lobby_disconnect_frees_the_seat() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let app = AppState::new(store.clone(), SecurityConfig::default());

    for i in 0..2 {
        bind_player(&app, &format!("p{i}")).await;
    }
    let addr = app.rooms().get_or_create("LOBBY001");
    for i in 0..2 {
        addr.try_send(RoomInput::Command {
            player_id: format!("p{i}"),
            command: PlayerCommand::Join {
                display_name: format!("Player {i}"),
            },
        })
        .unwrap();
    }
    assert!(wait_for_state(&store, "LOBBY001", |s| s.seated_count() == 2).await);

    addr.try_send(RoomInput::Disconnected {
        player_id: "p1".to_string(),
    })
    .unwrap();

    assert!(
        wait_for_state(&store, "LOBBY001", |s| s.seated_count() == 1).await,
        "lobby seat was not freed on disconnect"
    );
    assert!(store.get_session("p1").await.unwrap().is_none());
}

#[actix_web::test]
async fn disconnect_and_reconnect_mid_table() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let app = AppState::new(store.clone(), SecurityConfig::default());
    let transports = seat_four(&app, "TABLE005").await;
    let addr = app.rooms().get("TABLE005").unwrap();

    let stored = store.get_state("TABLE005").await.unwrap().unwrap();
    let gone_slot = stored.state.slot_of("p2").unwrap();

    // Transport loss: the session manager marks the session and tells the room.
    app.sessions().unbind(transports[2].1).await.unwrap();
    addr.try_send(RoomInput::Disconnected {
        player_id: "p2".to_string(),
    })
    .unwrap();

    for (i, (capture, _)) in transports.iter().enumerate() {
        if i == 2 {
            continue;
        }
        let expected_slot = gone_slot;
        assert!(
            wait_until(move || {
                capture.contains(
                    |m| matches!(m, ServerMsg::PlayerDisconnected { slot } if *slot == expected_slot),
                )
            })
            .await,
            "p{i} never learned about the disconnect"
        );
    }
    let session = store.get_session("p2").await.unwrap().unwrap();
    assert_eq!(session.connection_status, ConnectionStatus::Disconnected);

    // Reconnect with a fresh transport; bind resumes the stored session.
    let (fresh, _) = bind_player(&app, "p2").await;
    addr.try_send(RoomInput::Reconnected {
        player_id: "p2".to_string(),
    })
    .unwrap();

    assert!(
        wait_until(|| {
            fresh.contains(|m| {
                matches!(
                    m,
                    ServerMsg::GameState { snapshot }
                        if snapshot.hand.len() == 5
                            && snapshot.phase == Phase::WaitingForHokm
                )
            })
        })
        .await,
        "reconnecting player never got a snapshot"
    );
    let expected_slot = gone_slot;
    assert!(
        wait_until(move || {
            transports[0].0.contains(
                |m| matches!(m, ServerMsg::PlayerReconnected { slot } if *slot == expected_slot),
            )
        })
        .await
    );

    // The snapshot hand matches the persisted one byte for byte.
    let stored = store.get_state("TABLE005").await.unwrap().unwrap();
    assert!(fresh.contains(|m| {
        matches!(
            m,
            ServerMsg::GameState { snapshot }
                if snapshot.hand == stored.state.hand(gone_slot)
        )
    }));

    let session = store.get_session("p2").await.unwrap().unwrap();
    assert_eq!(session.connection_status, ConnectionStatus::Active);
}

#[actix_web::test]
async fn restart_recovery_restores_hands_exactly() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

    // First process instance runs a table up to the hokm wait.
    let app_a = AppState::new(store.clone(), SecurityConfig::default());
    seat_four(&app_a, "TABLE006").await;
    let before = store.get_state("TABLE006").await.unwrap().unwrap();
    assert_eq!(before.state.phase, Phase::WaitingForHokm);

    // "Restart": a fresh AppState over the same store.
    let app_b = AppState::new(store.clone(), SecurityConfig::default());
    let restored = app_b.rooms().restore_active().await.unwrap();
    assert_eq!(restored, 1);
    assert!(app_b.rooms().get("TABLE006").is_some());

    // A player reconnects against the new instance.
    let (capture, _) = bind_player(&app_b, "p0").await;
    let resumed = app_b
        .sessions()
        .lookup_session("p0")
        .await
        .unwrap()
        .expect("session should have survived the restart");
    assert_eq!(resumed.room_code, "TABLE006");

    let addr = app_b.rooms().get_or_create("TABLE006");
    addr.try_send(RoomInput::Reconnected {
        player_id: "p0".to_string(),
    })
    .unwrap();

    let slot = before.state.slot_of("p0").unwrap();
    let expected_hand = before.state.hand(slot).to_vec();
    assert!(
        wait_until(move || {
            capture.contains(|m| {
                matches!(
                    m,
                    ServerMsg::GameState { snapshot }
                        if snapshot.hand == expected_hand
                            && snapshot.round_number == 1
                )
            })
        })
        .await,
        "restored hand did not match the pre-restart deal"
    );

    // Recovery did not rewrite anything.
    let after = store.get_state("TABLE006").await.unwrap().unwrap();
    assert_eq!(after.version, before.version);
    assert_eq!(after.state, before.state);
}

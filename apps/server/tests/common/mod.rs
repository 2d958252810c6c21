#![allow(dead_code)]

// tests/common/mod.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use parking_lot::Mutex;

use hokm_server::domain::state::{GameState, Phase, Seat, Slot};
use hokm_server::domain::{Card, Suit};
use hokm_server::sessions::{CloseTransport, Outbound};
use hokm_server::ws::protocol::ServerMsg;

pub mod proptest_prelude;

// Logging is auto-installed for most test binaries
#[ctor::ctor]
fn init_logging() {
    server_test_support::logging::init();
}

/// Transport stand-in: records everything a player would have received.
pub struct Capture {
    messages: Arc<Mutex<Vec<ServerMsg>>>,
    closed: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct CaptureHandle {
    pub messages: Arc<Mutex<Vec<ServerMsg>>>,
    pub closed: Arc<AtomicBool>,
    pub addr: Addr<Capture>,
}

impl Actor for Capture {
    type Context = Context<Self>;
}

impl Handler<Outbound> for Capture {
    type Result = ();

    fn handle(&mut self, msg: Outbound, _ctx: &mut Context<Self>) -> Self::Result {
        self.messages.lock().push(msg.msg);
    }
}

impl Handler<CloseTransport> for Capture {
    type Result = ();

    fn handle(&mut self, _msg: CloseTransport, ctx: &mut Context<Self>) -> Self::Result {
        self.closed.store(true, Ordering::SeqCst);
        ctx.stop();
    }
}

pub fn spawn_capture() -> CaptureHandle {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let addr = Capture {
        messages: messages.clone(),
        closed: closed.clone(),
    }
    .start();
    CaptureHandle {
        messages,
        closed,
        addr,
    }
}

impl CaptureHandle {
    pub fn snapshot(&self) -> Vec<ServerMsg> {
        self.messages.lock().clone()
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn contains(&self, predicate: impl Fn(&ServerMsg) -> bool) -> bool {
        self.messages.lock().iter().any(|m| predicate(m))
    }
}

/// Poll until `condition` holds or the deadline passes.
pub async fn wait_until(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll the store until the room's state satisfies `pred`.
pub async fn wait_for_state(
    store: &Arc<dyn hokm_server::store::StateStore>,
    room: &str,
    pred: impl Fn(&GameState) -> bool,
) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(versioned) = store.get_state(room).await.unwrap() {
            if pred(&versioned.state) {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll the store until the room's version moves past `above`.
pub async fn wait_for_version(
    store: &Arc<dyn hokm_server::store::StateStore>,
    room: &str,
    above: u64,
) -> u64 {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(versioned) = store.get_state(room).await.unwrap() {
            if versioned.version > above {
                return versioned.version;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("room {room} never advanced past version {above}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn parse_cards(tokens: &[&str]) -> Vec<Card> {
    tokens
        .iter()
        .map(|t| t.parse::<Card>().expect("hardcoded valid card token"))
        .collect()
}

pub fn card(token: &str) -> Card {
    token.parse().expect("hardcoded valid card token")
}

/// A mid-game state with explicit hands, for scenario tests.
pub fn gameplay_state(hands: [Vec<Card>; 4], hakem: Slot, trump: Suit, turn: Slot) -> GameState {
    let mut state = GameState::new_lobby("SCENARIO1");
    for (i, seat) in state.seats.iter_mut().enumerate() {
        *seat = Some(Seat {
            player_id: format!("p{i}"),
            display_name: format!("Player {i}"),
        });
    }
    state.phase = Phase::Gameplay;
    state.hakem = Some(hakem);
    state.trump = Some(trump);
    state.hands = hands;
    state.turn = turn;
    state.round_no = 1;
    state
}

// End-to-end tests for the client over real WebSockets.
//
// Each test starts a `ScriptedServer` on a random port, opens real menu or
// room sessions against it through `WebSocketTransport`, and plays the
// server's side of the protocol by hand. This covers the path
// controller → channel → worker thread → tungstenite → socket and back,
// including reconnects after the server drops a connection.

use std::time::Duration;

use envy_path_client::{
    MemoryTokenStore, MenuSession, RoomSession, RoomStatus, TokenStore, WebSocketTransport,
};
use envy_path_protocol::{Instance, PlayerToken};
use multiplayer_tests::{ScriptedServer, ServerConnection, TICK, pump_until, test_config};
use serde_json::{Value, json};

/// Values chosen so that actor 0 → slot 1, 1 → 0, 2 → 1 is complete,
/// distinct by value and envy-free.
fn puzzle() -> Instance {
    Instance::new(vec![vec![2, 0, 1], vec![1, 0, 2], vec![0, 2, 1]])
}

fn solved_puzzle() -> Instance {
    Instance {
        solution: Some(vec![1, 0, 1]),
        solved_by: Some("alice".into()),
        ..puzzle()
    }
}

fn transport() -> WebSocketTransport {
    WebSocketTransport::new(TICK)
}

fn players(me_ready: bool) -> Value {
    json!({"players": [
        {"token": "alice", "is_ready": me_ready, "username": "", "connected_to": "r1"},
        {"token": "bob", "is_ready": true}
    ]})
}

/// Join room `r1` as `alice` and answer the context request.
fn join_room(server: &ScriptedServer) -> (RoomSession, ServerConnection) {
    let config = test_config(&server.url());
    let mut room = RoomSession::open(&config, "r1".into(), "alice".into(), transport()).unwrap();
    let mut conn = server.accept(&mut room);
    assert_eq!(conn.path, "/room/r1/alice/");
    assert_eq!(
        conn.recv(&mut room),
        json!({"action": "load_context", "csmr_data": {}})
    );
    conn.send_action("load_context", players(false));
    pump_until(&mut room, "room context", |r| r.state().player().is_some());
    (room, conn)
}

// ---------------------------------------------------------------------------
// Menu
// ---------------------------------------------------------------------------

#[test]
fn menu_issues_and_persists_token() {
    let server = ScriptedServer::start().unwrap();
    let config = test_config(&server.url());
    let store = MemoryTokenStore::default();

    let mut menu = MenuSession::open(&config, Box::new(store.clone()), transport()).unwrap();
    let mut conn = server.accept(&mut menu);
    assert_eq!(conn.path, "/menu/");
    assert_eq!(conn.recv(&mut menu), json!({}));

    conn.send_action(
        "load_context",
        json!({
            "player_token": "alice",
            "next_room_token": "r2",
            "rooms": [{"token": "r1", "connected_count": 2}]
        }),
    );
    assert!(menu.wait_for_context(Duration::from_secs(5)));
    assert_eq!(store.load().unwrap(), Some(PlayerToken::from("alice")));
    assert_eq!(menu.state().rooms()[0].connected_count, 2);
    menu.close().unwrap();

    // A second visit announces the stored token.
    let mut menu = MenuSession::open(&config, Box::new(store.clone()), transport()).unwrap();
    let mut conn = server.accept(&mut menu);
    assert_eq!(conn.recv(&mut menu), json!({"player_token": "alice"}));
    menu.close().unwrap();
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

#[test]
fn room_plays_to_solved() {
    let server = ScriptedServer::start().unwrap();
    let (mut room, mut conn) = join_room(&server);
    assert_eq!(room.state().adversary().unwrap().token.as_str(), "bob");

    assert!(room.set_ready());
    assert_eq!(
        conn.recv(&mut room),
        json!({"action": "set_ready", "csmr_data": {"player_token": "alice"}})
    );

    conn.send_action("load_instance", json!({"instance": puzzle()}));
    pump_until(&mut room, "playing", |r| r.state().status() == RoomStatus::Playing);

    assert!(!room.select(0, 1).unwrap());
    assert!(!room.select(1, 0).unwrap());
    assert!(room.select(2, 1).unwrap());
    let submissions = conn.drain(&mut room, Duration::from_millis(100));
    assert_eq!(
        submissions,
        [json!({
            "action": "check_solution",
            "csmr_data": {"solution": {"0": 1, "1": 0, "2": 1}, "player_token": "alice"}
        })]
    );

    conn.send_action(
        "check_solution",
        json!({"is_solved": true, "instance": solved_puzzle()}),
    );
    pump_until(&mut room, "solved", |r| r.state().status() == RoomStatus::Solved);
    assert!(!room.select(0, 0).unwrap());
    assert_eq!(room.state().selection().get(&0), Some(&1));
    room.close().unwrap();
}

#[test]
fn rejoining_solved_room_shows_solution() {
    let server = ScriptedServer::start().unwrap();
    let (mut room, mut conn) = join_room(&server);
    conn.send_action("load_instance", json!({"instance": solved_puzzle()}));
    pump_until(&mut room, "solved", |r| r.state().status() == RoomStatus::Solved);
    let selection: Vec<_> = room.state().selection().iter().map(|(a, s)| (*a, *s)).collect();
    assert_eq!(selection, [(0, 1), (1, 0), (2, 1)]);
    room.close().unwrap();
}

#[test]
fn junk_frames_are_survived() {
    let server = ScriptedServer::start().unwrap();
    let (mut room, mut conn) = join_room(&server);
    conn.send_raw("not json");
    conn.send_action("self_destruct", json!({}));
    conn.send_action("check_solution", json!({"is_solved": "maybe"}));
    conn.send_action("load_instance", json!({"instance": puzzle()}));
    pump_until(&mut room, "playing", |r| r.state().status() == RoomStatus::Playing);
    assert!(room.is_open());
    room.close().unwrap();
}

#[test]
fn peer_disconnect_pauses_and_resumes() {
    let server = ScriptedServer::start().unwrap();
    let (mut room, mut conn) = join_room(&server);
    conn.send_action("load_instance", json!({"instance": puzzle()}));
    pump_until(&mut room, "playing", |r| r.state().status() == RoomStatus::Playing);
    room.select(0, 1).unwrap();

    conn.send_action("notify_disconnect", Value::Null);
    pump_until(&mut room, "paused", |r| r.state().status() == RoomStatus::Loading);
    assert_eq!(room.state().selection().get(&0), Some(&1));

    conn.send_action("load_instance", json!({"instance": puzzle()}));
    pump_until(&mut room, "resumed", |r| r.state().status() == RoomStatus::Playing);
    assert_eq!(room.state().selection().get(&0), Some(&1));
    room.close().unwrap();
}

#[test]
fn lost_connection_reconnects_and_resyncs() {
    let server = ScriptedServer::start().unwrap();
    let (mut room, mut conn) = join_room(&server);
    conn.send_action("load_instance", json!({"instance": puzzle()}));
    pump_until(&mut room, "playing", |r| r.state().status() == RoomStatus::Playing);
    room.select(0, 1).unwrap();

    // Server side hangs up; the client must come back on its own.
    drop(conn);
    let mut conn = server.accept(&mut room);
    assert_eq!(conn.path, "/room/r1/alice/");
    assert_eq!(
        conn.recv(&mut room),
        json!({"action": "load_context", "csmr_data": {}})
    );
    // One context request per open, nothing else.
    let after = conn.drain(&mut room, Duration::from_millis(100));
    assert!(after.is_empty(), "unexpected frames: {after:?}");

    conn.send_action("load_context", players(true));
    conn.send_action("load_instance", json!({"instance": puzzle()}));
    pump_until(&mut room, "re-sync", |r| {
        r.state().player().is_some_and(|p| p.is_ready)
    });
    assert_eq!(room.state().status(), RoomStatus::Playing);
    assert_eq!(room.state().selection().get(&0), Some(&1));
    // Already ready: nothing to send.
    assert!(!room.set_ready());
    room.close().unwrap();
}

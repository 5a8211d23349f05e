//! Integration tests for the Parkour server, handler, and full connection flow.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parkour::prelude::*;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Starts a server with default rooms on a random port.
async fn start_server() -> String {
    start_server_with(SessionConfig::default()).await
}

async fn start_server_with(session: SessionConfig) -> String {
    let server = ParkourServer::builder()
        .bind("127.0.0.1:0")
        .session_config(session)
        .build()
        .await
        .expect("server should build");

    let addr = server.local_addr().expect("should have local addr").to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    addr
}

/// Rooms short enough to play a whole match in a test.
fn quick_session() -> SessionConfig {
    SessionConfig {
        capacity: 2,
        start_delay: Duration::from_millis(50),
        round_duration_secs: 3,
        tick_period: Duration::from_millis(100),
        warning_thresholds: vec![1],
    }
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

fn envelope(payload: Payload) -> Message {
    let env = Envelope {
        seq: 0,
        timestamp: 0,
        payload,
    };
    Message::Binary(serde_json::to_vec(&env).expect("encode").into())
}

fn system(msg: SystemMessage) -> Message {
    envelope(Payload::System(msg))
}

async fn recv(ws: &mut ClientWs) -> Envelope {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for the server")
        .expect("stream ended")
        .expect("recv");
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

/// Reads envelopes until a notification with `topic` arrives.
async fn recv_topic(ws: &mut ClientWs, topic: &str) -> Notification {
    loop {
        if let Payload::Notify(n) = recv(ws).await.payload {
            if n.topic() == topic {
                return n;
            }
        }
    }
}

/// Reads envelopes until a system message arrives.
async fn recv_system(ws: &mut ClientWs) -> SystemMessage {
    loop {
        if let Payload::System(msg) = recv(ws).await.payload {
            return msg;
        }
    }
}

/// Sends a handshake and returns the session id from the ack.
async fn handshake(ws: &mut ClientWs) -> String {
    ws.send(system(SystemMessage::Handshake {
        version: PROTOCOL_VERSION,
    }))
    .await
    .expect("send handshake");
    match recv(ws).await.payload {
        Payload::System(SystemMessage::HandshakeAck { session_id, .. }) => session_id,
        other => panic!("expected HandshakeAck, got {other:?}"),
    }
}

/// Joins (or creates) a room and returns `(room_id, code)`.
async fn join_or_create(ws: &mut ClientWs, name: &str) -> (RoomId, String) {
    ws.send(system(SystemMessage::JoinOrCreate {
        player_name: Some(name.into()),
    }))
    .await
    .expect("send join");
    match recv_system(ws).await {
        SystemMessage::RoomJoined { room_id, code, .. } => (room_id, code),
        other => panic!("expected RoomJoined, got {other:?}"),
    }
}

async fn send_player(ws: &mut ClientWs, msg: PlayerMessage) {
    ws.send(envelope(Payload::Player(msg))).await.expect("send player message");
}

// =========================================================================
// Handshake and connection plumbing
// =========================================================================

#[tokio::test]
async fn test_handshake_success() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let session_id = handshake(&mut ws).await;
    assert!(session_id.starts_with("conn-"), "got {session_id}");
}

#[tokio::test]
async fn test_handshake_version_mismatch() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(system(SystemMessage::Handshake { version: 999 }))
        .await
        .expect("send");

    match recv(&mut ws).await.payload {
        Payload::System(SystemMessage::Error { code, message }) => {
            assert_eq!(code, 400);
            assert!(message.contains("version"));
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_non_handshake_first_message() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(system(SystemMessage::Heartbeat { client_time: 0 }))
        .await
        .expect("send");

    match recv(&mut ws).await.payload {
        Payload::System(SystemMessage::Error { code, .. }) => assert_eq!(code, 400),
        other => panic!("expected Error 400, got {other:?}"),
    }
}

#[tokio::test]
async fn test_heartbeat_response() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    ws.send(system(SystemMessage::Heartbeat { client_time: 12345 }))
        .await
        .expect("send");

    match recv(&mut ws).await.payload {
        Payload::System(SystemMessage::HeartbeatAck { client_time, .. }) => {
            assert_eq!(client_time, 12345);
        }
        other => panic!("expected HeartbeatAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_envelope_reported_and_connection_kept() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    ws.send(Message::Binary(b"not json".to_vec().into()))
        .await
        .expect("send");
    match recv(&mut ws).await.payload {
        Payload::System(SystemMessage::Error { code, .. }) => assert_eq!(code, 400),
        other => panic!("expected Error 400, got {other:?}"),
    }

    ws.send(system(SystemMessage::Heartbeat { client_time: 999 }))
        .await
        .expect("send");
    assert!(matches!(
        recv(&mut ws).await.payload,
        Payload::System(SystemMessage::HeartbeatAck { .. })
    ));
}

#[tokio::test]
async fn test_movement_without_position_is_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;
    join_or_create(&mut ws, "Alice").await;

    let raw = r#"{"seq":1,"timestamp":0,"payload":{"type":"Player","data":{"type":"playerMove","y":1,"z":0,"rotX":0,"rotY":0,"rotZ":0,"rotW":1}}}"#;
    ws.send(Message::Text(raw.into())).await.expect("send");

    match recv_system(&mut ws).await {
        SystemMessage::Error { code, .. } => assert_eq!(code, 400),
        other => panic!("expected Error 400, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnect_closes_connection() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    ws.send(system(SystemMessage::Disconnect { reason: "bye".into() }))
        .await
        .expect("send");

    let result = tokio::time::timeout(Duration::from_secs(2), ws.next()).await;
    match result {
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {}
        Ok(Some(Err(_))) => {}
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_player_message_not_in_room() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    send_player(&mut ws, PlayerMessage::ReadinessToggle).await;

    match recv(&mut ws).await.payload {
        Payload::System(SystemMessage::Error { code, message }) => {
            assert_eq!(code, 400);
            assert!(message.contains("not in any room"));
        }
        other => panic!("expected Error 400, got {other:?}"),
    }
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test]
async fn test_join_or_create_sends_room_info() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    let session_id = handshake(&mut ws).await;

    ws.send(system(SystemMessage::JoinOrCreate {
        player_name: Some("Alice".into()),
    }))
    .await
    .expect("send");

    let code = match recv(&mut ws).await.payload {
        Payload::System(SystemMessage::RoomJoined {
            code,
            session_id: joined_as,
            ..
        }) => {
            assert_eq!(joined_as, session_id);
            code
        }
        other => panic!("expected RoomJoined, got {other:?}"),
    };

    assert_eq!(
        recv_topic(&mut ws, "roomInfo").await,
        Notification::RoomInfo {
            code: code.clone(),
            participant_count: 1,
        }
    );
    assert_eq!(
        recv_topic(&mut ws, "lobbyUpdate").await,
        Notification::LobbyUpdate {
            participant_count: 1,
            capacity: 2,
            message: "Waiting for 1 more player(s)...".into(),
        }
    );

    loop {
        if let Payload::State(snapshot) = recv(&mut ws).await.payload {
            assert_eq!(snapshot.code, code);
            assert_eq!(snapshot.players[&session_id].name, "Alice");
            break;
        }
    }
}

#[tokio::test]
async fn test_join_by_code_reaches_same_room() {
    let addr = start_server().await;
    let mut ws1 = connect(&addr).await;
    let mut ws2 = connect(&addr).await;
    handshake(&mut ws1).await;
    handshake(&mut ws2).await;

    let (room_id, code) = join_or_create(&mut ws1, "Alice").await;

    ws2.send(system(SystemMessage::JoinByCode {
        code: code.to_lowercase(),
        player_name: Some("Bob".into()),
    }))
    .await
    .expect("send");
    match recv_system(&mut ws2).await {
        SystemMessage::RoomJoined { room_id: joined, .. } => assert_eq!(joined, room_id),
        other => panic!("expected RoomJoined, got {other:?}"),
    }

    let full = Notification::LobbyUpdate {
        participant_count: 2,
        capacity: 2,
        message: "All players joined! Press READY to start".into(),
    };
    loop {
        if recv_topic(&mut ws1, "lobbyUpdate").await == full {
            break;
        }
    }
}

#[tokio::test]
async fn test_join_by_unknown_code() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws).await;

    ws.send(system(SystemMessage::JoinByCode {
        code: "0000".into(),
        player_name: None,
    }))
    .await
    .expect("send");

    match recv_system(&mut ws).await {
        SystemMessage::Error { code, .. } => assert_eq!(code, 404),
        other => panic!("expected Error 404, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_rooms_shows_open_room() {
    let addr = start_server().await;
    let mut host = connect(&addr).await;
    let mut browser = connect(&addr).await;
    handshake(&mut host).await;
    handshake(&mut browser).await;

    let (room_id, code) = join_or_create(&mut host, "Host").await;

    browser.send(system(SystemMessage::ListRooms)).await.expect("send");
    match recv_system(&mut browser).await {
        SystemMessage::RoomList { rooms } => {
            let entry = rooms
                .iter()
                .find(|r| r.room_id == room_id)
                .expect("room should be listed");
            assert_eq!(entry.code, code);
            assert_eq!(entry.player_count, 1);
            assert_eq!(entry.max_players, 2);
        }
        other => panic!("expected RoomList, got {other:?}"),
    }
}

// =========================================================================
// Full match
// =========================================================================

#[tokio::test]
async fn test_full_match_over_websocket() {
    let addr = start_server_with(quick_session()).await;
    let mut ws1 = connect(&addr).await;
    let mut ws2 = connect(&addr).await;
    handshake(&mut ws1).await;
    handshake(&mut ws2).await;

    join_or_create(&mut ws1, "Alice").await;
    join_or_create(&mut ws2, "Bob").await;

    send_player(&mut ws1, PlayerMessage::ReadinessToggle).await;
    send_player(&mut ws2, PlayerMessage::ReadinessToggle).await;

    assert_eq!(
        recv_topic(&mut ws1, "gameStarted").await,
        Notification::GameStarted {
            message: "Game has started!".into(),
            round_duration_seconds: 3,
        }
    );
    recv_topic(&mut ws2, "gameStarted").await;

    send_player(&mut ws2, PlayerMessage::ScoreUpdate { score: 42 }).await;
    assert_eq!(
        recv_topic(&mut ws1, "scoreUpdate").await,
        Notification::ScoreUpdate {
            display_name: "Bob".into(),
            score: 42,
        }
    );

    assert_eq!(
        recv_topic(&mut ws1, "timeWarning").await,
        Notification::TimeWarning {
            message: "1 seconds remaining!".into(),
        }
    );
    recv_topic(&mut ws1, "timeUp").await;
    assert_eq!(
        recv_topic(&mut ws1, "gameEnded").await,
        Notification::GameEnded {
            winner_name: "Bob".into(),
            highest_score: 42,
        }
    );
}

#[tokio::test]
async fn test_movement_replicates_to_other_player() {
    let addr = start_server().await;
    let mut ws1 = connect(&addr).await;
    let mut ws2 = connect(&addr).await;
    let alice = handshake(&mut ws1).await;
    handshake(&mut ws2).await;

    join_or_create(&mut ws1, "Alice").await;
    join_or_create(&mut ws2, "Bob").await;

    let mut update = MovementUpdate::at([4.0, 2.5, -8.0], [0.0, 0.0, 0.0, 1.0]);
    update.current_animation = Some("Run".into());
    send_player(&mut ws1, PlayerMessage::MovementUpdate(update)).await;

    loop {
        if let Payload::State(snapshot) = recv(&mut ws2).await.payload {
            let Some(p) = snapshot.players.get(&alice) else {
                continue;
            };
            if p.x == 4.0 {
                assert_eq!(p.z, -8.0);
                assert_eq!(p.current_animation, "Run");
                break;
            }
        }
    }
}

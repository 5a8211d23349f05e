//! Integration tests for room actors and the room manager.
//!
//! Tests that wait on the countdown or the round clock run with Tokio's
//! clock paused, so a 180-second round finishes instantly.

use std::time::Duration;

use parkour_protocol::{MovementUpdate, Notification, PlayerMessage, RoomId, SessionSnapshot};
use parkour_room::{
    Phase, PlayerSender, RoomError, RoomManager, RoomOutbound, SessionConfig, join_first_open, joinable_rooms,
};
use parkour_transport::ConnectionId;
use tokio::sync::mpsc;

type Inbox = mpsc::UnboundedReceiver<RoomOutbound>;

// =========================================================================
// Helpers
// =========================================================================

fn conn(id: u64) -> ConnectionId {
    ConnectionId::new(id)
}

/// Creates a player sender whose receiver is dropped immediately.
fn dummy_sender() -> PlayerSender {
    mpsc::unbounded_channel().0
}

fn manager(capacity: usize) -> RoomManager {
    RoomManager::new(SessionConfig::with_capacity(capacity))
}

/// Next notification on `rx`, skipping state snapshots.
async fn next_notification(rx: &mut Inbox) -> Notification {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(600), rx.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("room closed the channel");
        if let RoomOutbound::Notification(n) = msg {
            return n;
        }
    }
}

/// Skips notifications until one with `topic` arrives.
async fn expect_topic(rx: &mut Inbox, topic: &str) -> Notification {
    loop {
        let n = next_notification(rx).await;
        if n.topic() == topic {
            return n;
        }
    }
}

async fn next_snapshot(rx: &mut Inbox) -> SessionSnapshot {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a snapshot")
            .expect("room closed the channel");
        if let RoomOutbound::State(s) = msg {
            return s;
        }
    }
}

/// Two players joined to one fresh room, with their inboxes.
async fn two_player_room(mgr: &mut RoomManager) -> (RoomId, Inbox, Inbox) {
    let room = mgr.create_room();
    let (tx1, rx1) = mpsc::unbounded_channel();
    let (tx2, rx2) = mpsc::unbounded_channel();
    mgr.join_room(conn(1), room, Some("Alice".into()), tx1).await.unwrap();
    mgr.join_room(conn(2), room, Some("Bob".into()), tx2).await.unwrap();
    (room, rx1, rx2)
}

async fn ready_both(mgr: &RoomManager) {
    mgr.route_message(conn(1), PlayerMessage::ReadinessToggle).await.unwrap();
    mgr.route_message(conn(2), PlayerMessage::ReadinessToggle).await.unwrap();
}

// =========================================================================
// RoomManager: joining and leaving
// =========================================================================

#[tokio::test]
async fn test_create_room_returns_unique_ids() {
    let mut mgr = manager(2);
    let r1 = mgr.create_room();
    let r2 = mgr.create_room();
    assert_ne!(r1, r2);
    assert_eq!(mgr.room_count(), 2);
    assert_eq!(mgr.room_code(r1).map(str::len), Some(4));
}

#[tokio::test]
async fn test_join_room_success() {
    let mut mgr = manager(2);
    let room = mgr.create_room();

    mgr.join_room(conn(1), room, None, dummy_sender()).await.unwrap();

    assert_eq!(mgr.player_room(conn(1)), Some(room));
}

#[tokio::test]
async fn test_join_room_not_found() {
    let mut mgr = manager(2);
    let result = mgr.join_room(conn(1), RoomId(999_999), None, dummy_sender()).await;
    assert!(matches!(result, Err(RoomError::NotFound(_))));
}

#[tokio::test]
async fn test_join_room_one_room_at_a_time() {
    let mut mgr = manager(2);
    let r1 = mgr.create_room();
    let r2 = mgr.create_room();

    mgr.join_room(conn(1), r1, None, dummy_sender()).await.unwrap();
    let other = mgr.join_room(conn(1), r2, None, dummy_sender()).await;
    assert!(matches!(other, Err(RoomError::InvalidState(_))));

    let same = mgr.join_room(conn(1), r1, None, dummy_sender()).await;
    assert!(matches!(same, Err(RoomError::AlreadyInRoom(..))));
}

#[tokio::test]
async fn test_join_room_full_is_rejected() {
    let mut mgr = manager(2);
    let room = mgr.create_room();
    mgr.join_room(conn(1), room, None, dummy_sender()).await.unwrap();
    mgr.join_room(conn(2), room, None, dummy_sender()).await.unwrap();

    let result = mgr.join_room(conn(3), room, None, dummy_sender()).await;
    assert!(matches!(result, Err(RoomError::CapacityExceeded(_))));
    assert_eq!(mgr.player_room(conn(3)), None);
}

#[tokio::test]
async fn test_join_sends_room_info_then_lobby_update() {
    let mut mgr = manager(2);
    let room = mgr.create_room();
    let code = mgr.room_code(room).unwrap().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel();

    mgr.join_room(conn(1), room, Some("Alice".into()), tx).await.unwrap();

    assert_eq!(
        next_notification(&mut rx).await,
        Notification::RoomInfo {
            code,
            participant_count: 1,
        }
    );
    assert_eq!(
        next_notification(&mut rx).await,
        Notification::LobbyUpdate {
            participant_count: 1,
            capacity: 2,
            message: "Waiting for 1 more player(s)...".into(),
        }
    );
}

#[tokio::test]
async fn test_join_replicates_state() {
    let mut mgr = manager(2);
    let (_, mut rx1, _rx2) = two_player_room(&mut mgr).await;

    let mut snapshot = next_snapshot(&mut rx1).await;
    while snapshot.players.len() < 2 {
        snapshot = next_snapshot(&mut rx1).await;
    }
    assert_eq!(snapshot.players["conn-1"].name, "Alice");
    assert_eq!(snapshot.players["conn-2"].name, "Bob");
    assert_eq!(snapshot.players["conn-2"].y, 1.0);
    assert!(!snapshot.game_started);
}

#[tokio::test]
async fn test_leave_room_success() {
    let mut mgr = manager(2);
    let room = mgr.create_room();
    mgr.join_room(conn(1), room, None, dummy_sender()).await.unwrap();
    mgr.join_room(conn(2), room, None, dummy_sender()).await.unwrap();

    mgr.leave_room(conn(1)).await.unwrap();

    assert_eq!(mgr.player_room(conn(1)), None);
    assert_eq!(mgr.get_room_info(room).await.unwrap().participant_count, 1);
}

#[tokio::test]
async fn test_last_leave_removes_room() {
    let mut mgr = manager(2);
    let room = mgr.create_room();
    mgr.join_room(conn(1), room, None, dummy_sender()).await.unwrap();

    mgr.leave_room(conn(1)).await.unwrap();

    assert_eq!(mgr.room_count(), 0);
    assert!(matches!(mgr.get_room_info(room).await, Err(RoomError::NotFound(_))));
}

#[tokio::test]
async fn test_leave_room_not_in_any_room() {
    let mut mgr = manager(2);
    let result = mgr.leave_room(conn(1)).await;
    assert!(matches!(result, Err(RoomError::InvalidState(_))));
}

#[tokio::test]
async fn test_leave_stops_receiving() {
    let mut mgr = manager(2);
    let (_, mut rx1, _rx2) = two_player_room(&mut mgr).await;

    mgr.leave_room(conn(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    while rx1.try_recv().is_ok() {}

    mgr.route_message(conn(2), PlayerMessage::ScoreUpdate { score: 5 })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(rx1.try_recv().is_err(), "player who left should not receive");
}

#[tokio::test]
async fn test_get_room_info() {
    let mut mgr = manager(2);
    let room = mgr.create_room();
    mgr.join_room(conn(1), room, None, dummy_sender()).await.unwrap();

    let info = mgr.get_room_info(room).await.unwrap();

    assert_eq!(info.room_id, room);
    assert_eq!(info.code, mgr.room_code(room).unwrap());
    assert_eq!(info.participant_count, 1);
    assert_eq!(info.capacity, 2);
    assert_eq!(info.phase, Phase::Lobby);
}

#[tokio::test]
async fn test_destroy_room() {
    let mut mgr = manager(2);
    let room = mgr.create_room();
    let other = mgr.create_room();
    mgr.join_room(conn(1), room, None, dummy_sender()).await.unwrap();

    mgr.destroy_room(room).await.unwrap();

    assert_eq!(mgr.room_ids(), vec![other]);
    mgr.destroy_room(other).await.unwrap();

    assert_eq!(mgr.room_count(), 0);
    assert_eq!(mgr.player_room(conn(1)), None);
    assert!(matches!(mgr.destroy_room(room).await, Err(RoomError::NotFound(_))));
}

#[tokio::test]
async fn test_route_message_not_in_room() {
    let mgr = manager(2);
    let result = mgr.route_message(conn(1), PlayerMessage::ReadinessToggle).await;
    assert!(matches!(result, Err(RoomError::InvalidState(_))));
}

// =========================================================================
// RoomManager: matchmaking
// =========================================================================

#[tokio::test]
async fn test_join_by_code_success_and_case_insensitive() {
    let mut mgr = manager(2);
    let room = mgr.create_room();
    let code = mgr.room_code(room).unwrap().to_lowercase();

    let joined = mgr
        .join_by_code(conn(1), &code, None, dummy_sender())
        .await
        .unwrap();
    assert_eq!(joined, room);
}

#[tokio::test]
async fn test_join_by_code_unknown_code() {
    let mut mgr = manager(2);
    mgr.create_room();
    // '0' is never generated, so this code cannot exist.
    let result = mgr.join_by_code(conn(1), "0000", None, dummy_sender()).await;
    assert!(matches!(result, Err(RoomError::CodeNotFound(c)) if c == "0000"));
}

#[tokio::test]
async fn test_join_by_code_full_room() {
    let mut mgr = manager(1);
    let room = mgr.create_room();
    let code = mgr.room_code(room).unwrap().to_string();
    mgr.join_room(conn(1), room, None, dummy_sender()).await.unwrap();

    let result = mgr.join_by_code(conn(2), &code, None, dummy_sender()).await;
    assert!(result.is_err());
    assert_eq!(mgr.player_room(conn(2)), None);
}

#[tokio::test]
async fn test_join_or_create_creates_when_empty() {
    let mut mgr = manager(2);
    let room = mgr
        .join_or_create(conn(1), None, dummy_sender())
        .await
        .unwrap();
    assert_eq!(mgr.room_count(), 1);
    assert_eq!(mgr.player_room(conn(1)), Some(room));
}

#[tokio::test]
async fn test_join_or_create_joins_existing_then_creates_when_full() {
    let mut mgr = manager(2);
    let first = mgr.join_or_create(conn(1), None, dummy_sender()).await.unwrap();
    let second = mgr.join_or_create(conn(2), None, dummy_sender()).await.unwrap();
    assert_eq!(first, second);

    let third = mgr.join_or_create(conn(3), None, dummy_sender()).await.unwrap();
    assert_ne!(third, first);
    assert_eq!(mgr.room_count(), 2);
}

#[tokio::test]
async fn test_join_or_create_already_in_room() {
    let mut mgr = manager(2);
    mgr.join_or_create(conn(1), None, dummy_sender()).await.unwrap();
    let result = mgr.join_or_create(conn(1), None, dummy_sender()).await;
    assert!(matches!(result, Err(RoomError::InvalidState(_))));
}

#[tokio::test]
async fn test_list_rooms_returns_joinable_only() {
    let mut mgr = manager(2);
    assert!(mgr.list_rooms().await.is_empty());

    let open = mgr.create_room();
    let full = mgr.create_room();
    mgr.join_room(conn(1), open, None, dummy_sender()).await.unwrap();
    mgr.join_room(conn(2), full, None, dummy_sender()).await.unwrap();
    mgr.join_room(conn(3), full, None, dummy_sender()).await.unwrap();

    let listed = mgr.list_rooms().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].room_id, open);
    assert_eq!(listed[0].player_count, 1);
    assert_eq!(listed[0].max_players, 2);
}

#[tokio::test]
async fn test_room_handles_are_queried_without_the_manager() {
    let shared = tokio::sync::Mutex::new(manager(2));
    let open = {
        let mut mgr = shared.lock().await;
        let room = mgr.create_room();
        mgr.join_room(conn(1), room, None, dummy_sender()).await.unwrap();
        room
    };

    let handles = shared.lock().await.room_handles();
    // Nothing holds the manager while the rooms answer.
    let listed = joinable_rooms(&handles).await;
    assert!(shared.try_lock().is_ok());
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].room_id, open);

    let joined = join_first_open(&handles, conn(2), Some("Bob".into()), &dummy_sender())
        .await
        .expect("open room should admit");
    assert_eq!(joined.room_id(), open);
    assert_eq!(shared.lock().await.player_room(conn(2)), None);

    shared.lock().await.record_join(conn(2), open).unwrap();
    assert_eq!(shared.lock().await.player_room(conn(2)), Some(open));
    assert!(joinable_rooms(&handles).await.is_empty());
}

#[tokio::test]
async fn test_join_first_open_skips_full_rooms() {
    let mut mgr = manager(1);
    let full = mgr.create_room();
    mgr.join_room(conn(1), full, None, dummy_sender()).await.unwrap();

    let handles = mgr.room_handles();
    assert!(join_first_open(&handles, conn(2), None, &dummy_sender()).await.is_none());
}

#[tokio::test]
async fn test_record_join_for_destroyed_room_fails() {
    let mut mgr = manager(2);
    let room = mgr.create_room();
    let handles = mgr.room_handles();
    join_first_open(&handles, conn(1), None, &dummy_sender()).await.unwrap();

    mgr.destroy_room(room).await.unwrap();
    assert!(matches!(mgr.record_join(conn(1), room), Err(RoomError::NotFound(_))));
    assert_eq!(mgr.player_room(conn(1)), None);
}

// =========================================================================
// Match flow through the actor
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ready_players_start_match() {
    let mut mgr = manager(2);
    let (room, mut rx1, mut rx2) = two_player_room(&mut mgr).await;

    ready_both(&mgr).await;

    let expected = Notification::GameStarted {
        message: "Game has started!".into(),
        round_duration_seconds: 180,
    };
    assert_eq!(expect_topic(&mut rx1, "gameStarted").await, expected);
    assert_eq!(expect_topic(&mut rx2, "gameStarted").await, expected);

    let info = mgr.get_room_info(room).await.unwrap();
    assert_eq!(info.phase, Phase::InProgress);

    let result = mgr.join_room(conn(3), room, None, dummy_sender()).await;
    assert!(result.is_err(), "running match must not admit");
}

#[tokio::test(start_paused = true)]
async fn test_unready_during_countdown_keeps_lobby() {
    let mut mgr = manager(2);
    let (room, _rx1, _rx2) = two_player_room(&mut mgr).await;

    ready_both(&mgr).await;
    mgr.route_message(conn(1), PlayerMessage::ReadinessToggle).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(mgr.get_room_info(room).await.unwrap().phase, Phase::Lobby);
}

#[tokio::test(start_paused = true)]
async fn test_full_round_warns_and_ends_with_winner() {
    let mut mgr = manager(2);
    let (room, mut rx1, _rx2) = two_player_room(&mut mgr).await;

    ready_both(&mgr).await;
    expect_topic(&mut rx1, "gameStarted").await;

    mgr.route_message(conn(2), PlayerMessage::ScoreUpdate { score: 50 })
        .await
        .unwrap();
    assert_eq!(
        expect_topic(&mut rx1, "scoreUpdate").await,
        Notification::ScoreUpdate {
            display_name: "Bob".into(),
            score: 50,
        }
    );

    let mut warnings = Vec::new();
    loop {
        match next_notification(&mut rx1).await {
            Notification::TimeWarning { message } => warnings.push(message),
            Notification::TimeUp { message } => {
                assert_eq!(message, "Time's up!");
                break;
            }
            other => panic!("unexpected notification {other:?}"),
        }
    }
    assert_eq!(
        warnings,
        vec!["1 minute remaining!", "30 seconds remaining!", "10 seconds remaining!"]
    );

    assert_eq!(
        next_notification(&mut rx1).await,
        Notification::GameEnded {
            winner_name: "Bob".into(),
            highest_score: 50,
        }
    );
    assert_eq!(mgr.get_room_info(room).await.unwrap().phase, Phase::Ended);
}

#[tokio::test(start_paused = true)]
async fn test_movement_is_replicated() {
    let mut mgr = manager(2);
    let (_, _rx1, mut rx2) = two_player_room(&mut mgr).await;

    let mut update = MovementUpdate::at([7.0, 2.0, -1.0], [0.0, 0.0, 0.0, 1.0]);
    update.current_animation = Some("Jump".into());
    update.is_grounded = Some(false);
    mgr.route_message(conn(1), PlayerMessage::MovementUpdate(update))
        .await
        .unwrap();

    loop {
        let snapshot = next_snapshot(&mut rx2).await;
        let alice = &snapshot.players["conn-1"];
        if alice.x == 7.0 {
            assert_eq!(alice.current_animation, "Jump");
            assert!(!alice.is_grounded);
            assert_eq!(alice.velocity_x, 0.0);
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_disconnects_end_running_match() {
    let mut mgr = manager(2);
    let (room, _rx1, mut rx2) = two_player_room(&mut mgr).await;
    ready_both(&mgr).await;
    expect_topic(&mut rx2, "gameStarted").await;

    mgr.leave_room(conn(1)).await.unwrap();
    let info = mgr.get_room_info(room).await.unwrap();
    assert_eq!(info.participant_count, 1);
    assert_eq!(info.phase, Phase::InProgress);

    mgr.leave_room(conn(2)).await.unwrap();
    assert_eq!(mgr.room_count(), 0);
}

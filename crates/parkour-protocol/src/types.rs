//! Every type that crosses the wire between a Parkour client and server.
//!
//! Field and topic names are what existing game clients already speak
//! (`playerMove`, `roomInfo`, `playerCount`, ...), so Rust names and wire
//! names differ in places. The serde attributes are the source of truth
//! for the wire form.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Process-unique identifier of one room (one match instance).
///
/// Distinct from the 4-character room code shown to players: codes are
/// short and may collide, ids never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The outer frame of every message.
///
/// `seq` is per-connection and per-direction; `timestamp` is milliseconds
/// since the sender's connection started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    pub timestamp: u64,
    pub payload: Payload,
}

/// What an [`Envelope`] carries.
///
/// Serialized adjacently tagged: `{ "type": "Player", "data": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    /// Connection plumbing: handshake, joining, heartbeats, errors.
    System(SystemMessage),
    /// Client → server gameplay message.
    Player(PlayerMessage),
    /// Server → client notification (targeted or broadcast).
    Notify(Notification),
    /// Server → client replicated session state.
    State(SessionSnapshot),
}

// ---------------------------------------------------------------------------
// SystemMessage
// ---------------------------------------------------------------------------

/// A summary of a joinable room, as returned by `ListRooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListEntry {
    pub room_id: RoomId,
    pub code: String,
    pub player_count: usize,
    pub max_players: usize,
}

/// Framework-level messages, internally tagged on `"type"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum SystemMessage {
    /// Client → Server, first message on a connection.
    Handshake { version: u32 },

    /// Server → Client. `session_id` is the participant handle the
    /// server will use for this connection (it keys the players map in
    /// every state snapshot).
    HandshakeAck { session_id: String, server_time: u64 },

    /// Client → Server: join the first room still in its lobby, or
    /// create a new one.
    JoinOrCreate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
    },

    /// Client → Server: join the room advertising `code`.
    JoinByCode {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
    },

    /// Server → Client: the join succeeded.
    RoomJoined {
        room_id: RoomId,
        code: String,
        session_id: String,
    },

    /// Client → Server: leave the current room but keep the connection.
    LeaveRoom,

    /// Client → Server: request joinable rooms.
    ListRooms,

    /// Server → Client: answer to `ListRooms`.
    RoomList { rooms: Vec<RoomListEntry> },

    /// Client → Server keep-alive.
    Heartbeat { client_time: u64 },

    /// Server → Client keep-alive answer.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Either direction: the sender is going away.
    Disconnect { reason: String },

    /// Server → Client: a request was rejected. `code` follows HTTP
    /// conventions (400 malformed, 404 unknown room, 409 full/not joinable).
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// PlayerMessage
// ---------------------------------------------------------------------------

/// Animation tag applied when a movement update omits `currentAnimation`.
pub const DEFAULT_ANIMATION: &str = "Idle";

/// A movement sample reported by a client.
///
/// Position and rotation are required; the remaining fields are optional
/// and fall back to defaults when the participant record is updated.
/// Nothing here is validated: the server stores what the client reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementUpdate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
    pub rot_w: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_z: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_animation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_grounded: Option<bool>,
}

impl MovementUpdate {
    /// A sample with only the required fields set.
    pub fn at(position: [f64; 3], rotation: [f64; 4]) -> Self {
        Self {
            x: position[0],
            y: position[1],
            z: position[2],
            rot_x: rotation[0],
            rot_y: rotation[1],
            rot_z: rotation[2],
            rot_w: rotation[3],
            velocity_x: None,
            velocity_y: None,
            velocity_z: None,
            current_animation: None,
            is_grounded: None,
        }
    }
}

/// Gameplay messages a participant may send. This set is closed: anything
/// else fails to decode at the connection boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerMessage {
    #[serde(rename = "playerMove")]
    MovementUpdate(MovementUpdate),

    /// Flips the sender's readiness.
    #[serde(rename = "toggleReady")]
    ReadinessToggle,

    /// Overwrites the sender's score with the reported value.
    #[serde(rename = "updateScore")]
    ScoreUpdate { score: i64 },
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Display name used in `gameEnded` when nobody is left to win.
pub const NO_WINNER: &str = "No winner";

/// Outbound notifications, adjacently tagged by topic:
/// `{ "type": "lobbyUpdate", "data": { "playerCount": 2, ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Notification {
    /// Sent to a newly admitted participant only.
    RoomInfo {
        #[serde(rename = "roomId")]
        code: String,
        #[serde(rename = "playerCount")]
        participant_count: usize,
    },

    LobbyUpdate {
        #[serde(rename = "playerCount")]
        participant_count: usize,
        #[serde(rename = "maxPlayers")]
        capacity: usize,
        message: String,
    },

    GameStarted {
        message: String,
        #[serde(rename = "roundTime")]
        round_duration_seconds: u32,
    },

    TimeWarning { message: String },

    TimeUp { message: String },

    ScoreUpdate {
        #[serde(rename = "playerName")]
        display_name: String,
        score: i64,
    },

    GameEnded {
        #[serde(rename = "winnerName")]
        winner_name: String,
        #[serde(rename = "highestScore")]
        highest_score: i64,
    },
}

impl Notification {
    /// The wire topic, e.g. `"timeWarning"`.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::RoomInfo { .. } => "roomInfo",
            Self::LobbyUpdate { .. } => "lobbyUpdate",
            Self::GameStarted { .. } => "gameStarted",
            Self::TimeWarning { .. } => "timeWarning",
            Self::TimeUp { .. } => "timeUp",
            Self::ScoreUpdate { .. } => "scoreUpdate",
            Self::GameEnded { .. } => "gameEnded",
        }
    }
}

// ---------------------------------------------------------------------------
// Replicated state
// ---------------------------------------------------------------------------

/// Replicated view of one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
    pub rot_w: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub velocity_z: f64,
    pub current_animation: String,
    pub is_grounded: bool,
    pub is_ready: bool,
    pub score: i64,
}

/// Replicated view of a whole session, broadcast after every mutation.
///
/// `players` is keyed by session id (the participant handle as a string)
/// and ordered so identical states encode to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[serde(rename = "roomId")]
    pub code: String,
    pub max_players: usize,
    pub game_started: bool,
    pub round_time: u32,
    pub players: BTreeMap<String, PlayerState>,
}

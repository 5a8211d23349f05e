//! Error types for the room layer.

use parkour_protocol::RoomId;
use parkour_transport::ConnectionId;

use crate::Phase;

/// Errors surfaced by rooms and the room manager.
///
/// Messages from unknown participants are not errors: the state machine
/// drops them silently, since the sender may be mid-teardown.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room already holds `capacity` participants. The transport
    /// should reject the connection's join.
    #[error("room {0} is full")]
    CapacityExceeded(RoomId),

    /// The room is past its lobby and admits nobody new.
    #[error("room {0} is not joinable in phase {1}")]
    NotJoinable(RoomId, Phase),

    /// The handle is already a participant of this room.
    #[error("{0} already in room {1}")]
    AlreadyInRoom(ConnectionId, RoomId),

    /// The handle is not a participant of this room.
    #[error("{0} not in room {1}")]
    NotInRoom(ConnectionId, RoomId),

    /// No room with this id exists.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// No live room advertises this code.
    #[error("no room with code {0}")]
    CodeNotFound(String),

    /// The room's actor is gone or its command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),

    /// The request does not fit the caller's current situation, e.g.
    /// joining while already in another room.
    #[error("invalid room state for this operation: {0}")]
    InvalidState(String),
}

//! Unified error type for the Parkour server.

use parkour_protocol::ProtocolError;
use parkour_room::RoomError;
use parkour_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParkourError {
    /// Connection, send, or receive failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode, decode, or an out-of-place message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Room full, not found, not joinable.
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl ParkourError {
    /// The `SystemMessage::Error` code reported to a client for this error.
    ///
    /// 404 when the room does not exist, 409 when it exists but cannot take
    /// the request, 400 for everything else.
    pub fn wire_code(&self) -> u16 {
        match self {
            Self::Room(e) => room_error_code(e),
            Self::Protocol(_) | Self::Transport(_) => 400,
        }
    }
}

pub(crate) fn room_error_code(err: &RoomError) -> u16 {
    match err {
        RoomError::NotFound(_) | RoomError::CodeNotFound(_) | RoomError::Unavailable(_) => 404,
        RoomError::CapacityExceeded(_)
        | RoomError::NotJoinable(..)
        | RoomError::AlreadyInRoom(..)
        | RoomError::InvalidState(_) => 409,
        RoomError::NotInRoom(..) => 400,
    }
}

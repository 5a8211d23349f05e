//! Wire protocol for Parkour.
//!
//! - **Types** ([`Envelope`], [`SystemMessage`], [`PlayerMessage`],
//!   [`Notification`], [`SessionSnapshot`]): what travels on the wire.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how it becomes bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room (session state machine)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    DEFAULT_ANIMATION, Envelope, MovementUpdate, NO_WINNER, Notification, Payload, PlayerMessage,
    PlayerState, RoomId, RoomListEntry, SessionSnapshot, SystemMessage,
};

//! # Parkour
//!
//! Session server for small multiplayer races.
//!
//! Players connect over WebSocket, get matched into a room (by code or
//! first-free), ready up, and race against a round clock. Each room is
//! an isolated Tokio task running the session state machine from
//! [`parkour_room`]; this crate is the network edge around it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use parkour::prelude::*;
//!
//! # async fn run() -> Result<(), ParkourError> {
//! let server = ParkourServer::builder()
//!     .config(ServerConfig::from_env())
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::ParkourError;
pub use server::{PROTOCOL_VERSION, ParkourServer, ParkourServerBuilder};

pub use parkour_protocol as protocol;
pub use parkour_room as room;
pub use parkour_transport as transport;

/// Everything needed to run a server or write a client against one.
pub mod prelude {
    pub use crate::{PROTOCOL_VERSION, ParkourError, ParkourServer, ParkourServerBuilder, ServerConfig};
    pub use parkour_protocol::{
        Codec, Envelope, JsonCodec, MovementUpdate, Notification, Payload, PlayerMessage, PlayerState,
        RoomId, RoomListEntry, SessionSnapshot, SystemMessage,
    };
    pub use parkour_room::{Phase, RoomError, SessionConfig};
}

//! Sessions for Parkour.
//!
//! One session is one match: a lobby that fills up to a fixed capacity,
//! a countdown once everyone is ready, a timed round, and a result. This
//! crate holds the session logic and the machinery that runs many
//! sessions side by side.
//!
//! # Key types
//!
//! - [`Registry`]: the participants of one session
//! - [`SessionMachine`]: the phase state machine, driven by inbound
//!   events and its own timers
//! - [`Notifier`]: where the machine's notifications go
//! - [`RoomHandle`]: talk to a session running as its own Tokio task
//! - [`RoomManager`]: creates rooms, matches players into them, and
//!   routes their messages
//! - [`SessionConfig`] / [`Phase`]: settings and lifecycle

pub mod code;
mod config;
mod error;
mod machine;
mod manager;
mod notifier;
mod registry;
mod room;

pub use config::{Phase, SessionConfig};
pub use error::RoomError;
pub use machine::{GAME_STARTED_MESSAGE, SessionMachine, TIME_UP_MESSAGE, TimerEvent};
pub use manager::{DEFAULT_CHANNEL_SIZE, RoomManager, join_first_open, joinable_rooms};
pub use notifier::{Notifier, RecordingNotifier};
pub use registry::{AdmitError, Participant, Registry, SPAWN_POSITION, SPAWN_ROTATION};
pub use room::{PlayerSender, RoomHandle, RoomInfo, RoomOutbound};

//! `ParkourServer` builder and accept loop.
//!
//! This ties the layers together: transport → protocol → room.

use std::sync::Arc;
use std::time::Duration;

use parkour_protocol::{Codec, JsonCodec};
use parkour_room::{RoomManager, SessionConfig};
use parkour_transport::{Transport, TransportError, WebSocketTransport};
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{ParkourError, ServerConfig};

/// The current protocol version. Clients must send this in their
/// handshake or be rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) rooms: Mutex<RoomManager>,
    pub(crate) codec: C,
    pub(crate) config: ServerConfig,
}

/// Builder for configuring and starting a Parkour server.
///
/// ```rust,no_run
/// # async fn run() -> Result<(), parkour::ParkourError> {
/// use parkour::prelude::*;
///
/// let server = ParkourServer::builder()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParkourServerBuilder {
    config: ServerConfig,
}

impl ParkourServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the settings every room is created with.
    pub fn session_config(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Binds the listener using [`JsonCodec`].
    pub async fn build(self) -> Result<ParkourServer<JsonCodec>, ParkourError> {
        self.build_with_codec(JsonCodec).await
    }

    /// Binds the listener using a custom codec.
    pub async fn build_with_codec<C: Codec>(self, codec: C) -> Result<ParkourServer<C>, ParkourError> {
        let transport = WebSocketTransport::bind(&self.config.bind_addr).await?;
        let rooms = RoomManager::with_channel_size(self.config.session.clone(), self.config.room_channel_size);

        let state = Arc::new(ServerState {
            rooms: Mutex::new(rooms),
            codec,
            config: self.config,
        });
        Ok(ParkourServer { transport, state })
    }
}

/// A bound Parkour server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct ParkourServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<C>>,
}

impl ParkourServer<JsonCodec> {
    pub fn builder() -> ParkourServerBuilder {
        ParkourServerBuilder::new()
    }
}

impl<C: Codec> ParkourServer<C> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop, spawning a handler task per connection.
    ///
    /// Failed upgrades are logged and skipped. Runs until the process
    /// is terminated.
    pub async fn run(self) -> Result<(), ParkourError> {
        self.run_until(std::future::pending()).await
    }

    /// Like [`run`](Self::run), but stops accepting once `shutdown`
    /// resolves. Connections already accepted keep running.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ParkourError> {
        tracing::info!(addr = %self.state.config.bind_addr, "Parkour server running");
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.transport.accept() => accepted,
                () = &mut shutdown => {
                    self.transport.shutdown().await?;
                    tracing::info!("accept loop stopped");
                    return Ok(());
                }
            };

            match accepted {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(TransportError::Shutdown) => return Ok(()),
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

//! Per-connection handler: handshake, joining, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version → send HandshakeAck
//!   2. Loop, selecting over three sources:
//!      - inbound envelopes → system messages or gameplay for the room
//!      - the room's outbound channel → forwarded as `Notify`/`State`
//!      - the idle deadline → drop the connection
//!   3. On exit, leave the room.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use parkour_protocol::{Codec, Envelope, Payload, PlayerMessage, ProtocolError, RoomId, SystemMessage};
use parkour_room::{PlayerSender, RoomError, RoomOutbound, join_first_open, joinable_rooms};
use parkour_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;

use crate::ParkourError;
use crate::error::room_error_code;
use crate::server::{PROTOCOL_VERSION, ServerState};

/// Drop guard that takes the connection out of its room when the
/// handler exits, including by panic. `Drop` is synchronous, so the
/// async leave runs in a fire-and-forget task.
struct RoomGuard<C: Codec> {
    handle: ConnectionId,
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Drop for RoomGuard<C> {
    fn drop(&mut self) {
        let handle = self.handle;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut rooms = state.rooms.lock().await;
            if rooms.player_room(handle).is_some() {
                let _ = rooms.leave_room(handle).await;
            }
        });
    }
}

/// Writes envelopes to one connection, numbering them.
struct Outgoing<'a, C: Codec> {
    conn: &'a WebSocketConnection,
    codec: &'a C,
    seq: u64,
    start: Instant,
}

impl<C: Codec> Outgoing<'_, C> {
    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn send(&mut self, payload: Payload) -> Result<(), ParkourError> {
        let envelope = Envelope {
            seq: self.seq,
            timestamp: self.elapsed_ms(),
            payload,
        };
        self.seq += 1;
        let bytes = self.codec.encode(&envelope)?;
        self.conn.send(&bytes).await?;
        Ok(())
    }

    async fn system(&mut self, msg: SystemMessage) -> Result<(), ParkourError> {
        self.send(Payload::System(msg)).await
    }

    async fn error(&mut self, code: u16, message: impl Into<String>) -> Result<(), ParkourError> {
        self.system(SystemMessage::Error {
            code,
            message: message.into(),
        })
        .await
    }

    async fn forward(&mut self, outbound: RoomOutbound) -> Result<(), ParkourError> {
        let payload = match outbound {
            RoomOutbound::Notification(n) => Payload::Notify(n),
            RoomOutbound::State(s) => Payload::State(s),
        };
        self.send(payload).await
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), ParkourError> {
    let handle = conn.id();
    tracing::debug!(%handle, peer = %conn.peer_addr(), "handling new connection");

    let mut out = Outgoing {
        conn: &conn,
        codec: &state.codec,
        seq: 0,
        start: Instant::now(),
    };

    // --- Step 1: Handshake ---
    perform_handshake(&conn, &state, &mut out).await?;
    tracing::info!(%handle, "client connected");

    let _guard = RoomGuard {
        handle,
        state: Arc::clone(&state),
    };

    // --- Step 2: Message loop ---
    let (room_tx, mut room_rx) = mpsc::unbounded_channel();
    let idle_timeout = state.config.idle_timeout;
    let mut idle_deadline = tokio::time::Instant::now() + idle_timeout;

    loop {
        tokio::select! {
            received = conn.recv() => {
                let data = match received {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%handle, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%handle, error = %e, "recv error");
                        break;
                    }
                };
                idle_deadline = tokio::time::Instant::now() + idle_timeout;

                let envelope: Envelope = match state.codec.decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::warn!(%handle, error = %e, "failed to decode envelope");
                        out.error(400, format!("malformed message: {e}")).await?;
                        continue;
                    }
                };

                let flow = match envelope.payload {
                    Payload::System(msg) => {
                        handle_system_message(&state, handle, msg, &room_tx, &mut out).await?
                    }
                    Payload::Player(msg) => {
                        handle_player_message(&state, handle, msg, &mut out).await?;
                        ControlFlow::Continue(())
                    }
                    Payload::Notify(_) | Payload::State(_) => {
                        tracing::warn!(%handle, "client sent a server-only payload");
                        out.error(400, "unexpected payload").await?;
                        ControlFlow::Continue(())
                    }
                };
                if flow.is_break() {
                    break;
                }
            }

            Some(outbound) = room_rx.recv() => {
                out.forward(outbound).await?;
            }

            () = tokio::time::sleep_until(idle_deadline) => {
                tracing::info!(%handle, "connection timed out");
                break;
            }
        }
    }

    let _ = conn.close().await;
    // _guard drops here → leave room fires.
    Ok(())
}

/// Receives the `Handshake`, checks the version, and acknowledges it.
async fn perform_handshake<C: Codec>(
    conn: &WebSocketConnection,
    state: &ServerState<C>,
    out: &mut Outgoing<'_, C>,
) -> Result<(), ParkourError> {
    let data = match tokio::time::timeout(state.config.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Envelope = match state.codec.decode(&data) {
        Ok(env) => env,
        Err(e) => {
            out.error(400, "expected Handshake").await?;
            return Err(e.into());
        }
    };

    let Payload::System(SystemMessage::Handshake { version }) = envelope.payload else {
        out.error(400, "expected Handshake").await?;
        return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
    };

    if version != PROTOCOL_VERSION {
        out.error(
            400,
            format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::UnsupportedVersion {
            expected: PROTOCOL_VERSION,
            got: version,
        }
        .into());
    }

    let server_time = out.elapsed_ms();
    out.system(SystemMessage::HandshakeAck {
        session_id: conn.id().to_string(),
        server_time,
    })
    .await
}

/// Handles a system message. Breaks when the connection should close.
async fn handle_system_message<C: Codec>(
    state: &ServerState<C>,
    handle: ConnectionId,
    msg: SystemMessage,
    room_tx: &PlayerSender,
    out: &mut Outgoing<'_, C>,
) -> Result<ControlFlow<()>, ParkourError> {
    match msg {
        SystemMessage::Heartbeat { client_time } => {
            let server_time = out.elapsed_ms();
            out.system(SystemMessage::HeartbeatAck {
                client_time,
                server_time,
            })
            .await?;
        }

        SystemMessage::JoinOrCreate { player_name } => {
            let result = join_or_create(state, handle, player_name, room_tx).await;
            reply_joined(handle, result, out).await?;
        }

        SystemMessage::JoinByCode { code, player_name } => {
            let result = {
                let mut rooms = state.rooms.lock().await;
                rooms
                    .join_by_code(handle, &code, player_name, room_tx.clone())
                    .await
                    .map(|room_id| (room_id, rooms.room_code(room_id).unwrap_or_default().to_string()))
            };
            reply_joined(handle, result, out).await?;
        }

        SystemMessage::ListRooms => {
            // Lock only to copy the handles; the rooms answer unlocked.
            let handles = state.rooms.lock().await.room_handles();
            let rooms = joinable_rooms(&handles).await;
            out.system(SystemMessage::RoomList { rooms }).await?;
        }

        SystemMessage::LeaveRoom => {
            let mut rooms = state.rooms.lock().await;
            if let Err(e) = rooms.leave_room(handle).await {
                tracing::debug!(%handle, error = %e, "leave room failed");
            }
        }

        SystemMessage::Disconnect { reason } => {
            tracing::info!(%handle, %reason, "client disconnected");
            return Ok(ControlFlow::Break(()));
        }

        other => {
            tracing::warn!(%handle, ?other, "unexpected system message");
            out.error(400, "unexpected system message").await?;
        }
    }

    Ok(ControlFlow::Continue(()))
}

/// Joins the oldest open room, or a new one.
///
/// Open rooms are probed without holding the manager lock, so a slow room
/// does not stall other connections. The lock is taken again only to
/// record the membership or to spawn a fresh room.
async fn join_or_create<C: Codec>(
    state: &ServerState<C>,
    handle: ConnectionId,
    player_name: Option<String>,
    sender: &PlayerSender,
) -> Result<(RoomId, String), RoomError> {
    let open = {
        let rooms = state.rooms.lock().await;
        rooms.ensure_unassigned(handle)?;
        rooms.room_handles()
    };

    if let Some(room) = join_first_open(&open, handle, player_name.clone(), sender).await {
        let recorded = state.rooms.lock().await.record_join(handle, room.room_id());
        if let Err(e) = recorded {
            let _ = room.leave(handle).await;
            return Err(e);
        }
        return Ok((room.room_id(), room.code().to_string()));
    }

    let mut rooms = state.rooms.lock().await;
    let room_id = rooms.create_and_join(handle, player_name, sender.clone()).await?;
    let code = rooms.room_code(room_id).unwrap_or_default().to_string();
    Ok((room_id, code))
}

async fn reply_joined<C: Codec>(
    handle: ConnectionId,
    result: Result<(RoomId, String), RoomError>,
    out: &mut Outgoing<'_, C>,
) -> Result<(), ParkourError> {
    match result {
        Ok((room_id, code)) => {
            tracing::info!(%handle, %room_id, %code, "joined room");
            out.system(SystemMessage::RoomJoined {
                room_id,
                code,
                session_id: handle.to_string(),
            })
            .await
        }
        Err(e) => {
            tracing::warn!(%handle, error = %e, "join rejected");
            out.error(room_error_code(&e), e.to_string()).await
        }
    }
}

/// Routes a gameplay message to the sender's room.
async fn handle_player_message<C: Codec>(
    state: &ServerState<C>,
    handle: ConnectionId,
    msg: PlayerMessage,
    out: &mut Outgoing<'_, C>,
) -> Result<(), ParkourError> {
    let result = state.rooms.lock().await.route_message(handle, msg).await;
    if let Err(e) = result {
        tracing::debug!(%handle, error = %e, "player message not routed");
        out.error(400, e.to_string()).await?;
    }
    Ok(())
}

//! Room actor: one Tokio task per session.
//!
//! The actor owns a [`SessionMachine`] and is the only code that touches
//! it. Commands arrive over an mpsc channel and timer firings come from
//! the machine's own clock; both are handled one at a time in the same
//! `select!` loop, so session state needs no locks.

use std::collections::HashMap;
use std::ops::ControlFlow;

use parkour_protocol::{Notification, PlayerMessage, RoomId, SessionSnapshot};
use parkour_transport::ConnectionId;
use tokio::sync::{mpsc, oneshot};

use crate::{Notifier, Phase, RoomError, SessionConfig, SessionMachine};

/// An outbound message from the room actor to a player's connection handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomOutbound {
    /// A targeted or broadcast notification.
    Notification(Notification),
    /// Replicated session state, sent after every change.
    State(SessionSnapshot),
}

/// Channel sender for delivering outbound messages to a player.
pub type PlayerSender = mpsc::UnboundedSender<RoomOutbound>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        handle: ConnectionId,
        player_name: Option<String>,
        sender: PlayerSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    /// Replies with the number of participants left.
    Leave {
        handle: ConnectionId,
        reply: oneshot::Sender<Result<usize, RoomError>>,
    },

    /// Fire-and-forget gameplay message.
    Message {
        handle: ConnectionId,
        msg: PlayerMessage,
    },

    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },

    Shutdown,
}

/// Room metadata (not the replicated state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub code: String,
    pub phase: Phase,
    pub participant_count: usize,
    pub capacity: usize,
}

/// Handle to a running room actor.
///
/// Cheap to clone: an `mpsc::Sender` plus the room's identity.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    code: String,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// The code players use to find this room.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Asks the room to admit `handle`. Outbound traffic for the new
    /// participant is delivered on `sender`.
    pub async fn join(
        &self,
        handle: ConnectionId,
        player_name: Option<String>,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            handle,
            player_name,
            sender,
            reply,
        })
        .await?;
        rx.await.map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    /// Removes `handle` and returns how many participants remain.
    ///
    /// On `Ok(0)` the room was emptied and its actor is stopping.
    pub async fn leave(&self, handle: ConnectionId) -> Result<usize, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Leave { handle, reply }).await?;
        rx.await.map_err(|_| RoomError::Unavailable(self.room_id))?
    }

    /// Delivers a gameplay message.
    pub async fn send_message(&self, handle: ConnectionId, msg: PlayerMessage) -> Result<(), RoomError> {
        self.send(RoomCommand::Message { handle, msg }).await
    }

    pub async fn get_info(&self) -> Result<RoomInfo, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::GetInfo { reply }).await?;
        rx.await.map_err(|_| RoomError::Unavailable(self.room_id))
    }

    /// Stops the actor. Timers are cancelled; participants are not told.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown).await
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id))
    }
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// [`Notifier`] over the participants' outbound channels.
///
/// A closed channel means the connection is going away; its messages are
/// dropped until the matching `Leave` arrives.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    senders: HashMap<ConnectionId, PlayerSender>,
}

impl Outbox {
    /// Registers a channel. Returns `false` if `handle` already had one,
    /// which is left in place.
    fn attach(&mut self, handle: ConnectionId, sender: PlayerSender) -> bool {
        if self.senders.contains_key(&handle) {
            return false;
        }
        self.senders.insert(handle, sender);
        true
    }

    fn detach(&mut self, handle: ConnectionId) {
        self.senders.remove(&handle);
    }

    fn push_state(&self, snapshot: SessionSnapshot) {
        for sender in self.senders.values() {
            let _ = sender.send(RoomOutbound::State(snapshot.clone()));
        }
    }
}

impl Notifier for Outbox {
    fn send_to(&mut self, handle: ConnectionId, notification: Notification) {
        if let Some(sender) = self.senders.get(&handle) {
            let _ = sender.send(RoomOutbound::Notification(notification));
        }
    }

    fn broadcast(&mut self, notification: Notification) {
        for sender in self.senders.values() {
            let _ = sender.send(RoomOutbound::Notification(notification.clone()));
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct RoomActor {
    room_id: RoomId,
    machine: SessionMachine<Outbox>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(room_id = %self.room_id, code = %self.machine.code(), "room actor started");

        loop {
            let flow = tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => ControlFlow::Break(()),
                },
                fired = self.machine.next_timer() => {
                    self.machine.handle_timer(fired);
                    ControlFlow::Continue(())
                }
            };

            self.flush_state();
            if flow.is_break() {
                break;
            }
        }

        self.machine.dispose();
        tracing::info!(room_id = %self.room_id, "room actor stopped");
    }

    fn handle_command(&mut self, cmd: RoomCommand) -> ControlFlow<()> {
        match cmd {
            RoomCommand::Join {
                handle,
                player_name,
                sender,
                reply,
            } => {
                let attached = self.machine.notifier_mut().attach(handle, sender);
                let result = self.machine.handle_join(handle, player_name.as_deref());
                if let Err(e) = &result {
                    tracing::warn!(room_id = %self.room_id, %handle, error = %e, "join rejected");
                    if attached {
                        self.machine.notifier_mut().detach(handle);
                    }
                }
                let _ = reply.send(result);
            }
            RoomCommand::Leave { handle, reply } => {
                self.machine.notifier_mut().detach(handle);
                let result = match self.machine.handle_leave(handle) {
                    Some(_) => Ok(self.machine.registry().len()),
                    None => Err(RoomError::NotInRoom(handle, self.room_id)),
                };
                let emptied = matches!(result, Ok(0));
                let _ = reply.send(result);
                if emptied {
                    tracing::info!(room_id = %self.room_id, "last participant left");
                    return ControlFlow::Break(());
                }
            }
            RoomCommand::Message { handle, msg } => {
                self.machine.handle_message(handle, msg);
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Shutdown => {
                tracing::info!(room_id = %self.room_id, "room shutting down");
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn flush_state(&mut self) {
        if let Some(snapshot) = self.machine.take_snapshot_if_dirty() {
            self.machine.notifier().push_state(snapshot);
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id,
            code: self.machine.code().to_string(),
            phase: self.machine.phase(),
            participant_count: self.machine.registry().len(),
            capacity: self.machine.config().capacity,
        }
    }
}

/// Spawns a room actor and returns a handle to it.
///
/// `channel_size` bounds the command queue; senders wait when it is full.
pub(crate) fn spawn_room(room_id: RoomId, config: SessionConfig, channel_size: usize) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let machine = SessionMachine::new(room_id, config, Outbox::default());
    let code = machine.code().to_string();

    tokio::spawn(
        RoomActor {
            room_id,
            machine,
            receiver: rx,
        }
        .run(),
    );

    RoomHandle {
        room_id,
        code,
        sender: tx,
    }
}

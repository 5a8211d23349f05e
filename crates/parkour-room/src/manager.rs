//! Room manager: creates, tracks, and routes players to rooms.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parkour_protocol::{PlayerMessage, RoomId, RoomListEntry};
use parkour_transport::ConnectionId;

use crate::code::normalize_code;
use crate::room::spawn_room;
use crate::{PlayerSender, RoomError, RoomHandle, RoomInfo, SessionConfig};

/// Counter for generating unique room IDs.
static NEXT_ROOM_ID: AtomicU64 = AtomicU64::new(1);

/// Default command channel size for room actors.
pub const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Every live session in the process, and which connection is in which.
///
/// A connection is in at most one room at a time. Rooms are iterated in
/// creation order, so matchmaking fills the oldest room first.
pub struct RoomManager {
    config: SessionConfig,
    channel_size: usize,
    rooms: BTreeMap<RoomId, RoomHandle>,
    player_rooms: HashMap<ConnectionId, RoomId>,
}

impl RoomManager {
    /// Creates an empty manager whose rooms all use `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_channel_size(config, DEFAULT_CHANNEL_SIZE)
    }

    pub fn with_channel_size(config: SessionConfig, channel_size: usize) -> Self {
        Self {
            config: config.validated(),
            channel_size: channel_size.max(1),
            rooms: BTreeMap::new(),
            player_rooms: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawns a new empty room and returns its ID.
    pub fn create_room(&mut self) -> RoomId {
        let room_id = RoomId(NEXT_ROOM_ID.fetch_add(1, Ordering::Relaxed));
        let handle = spawn_room(room_id, self.config.clone(), self.channel_size);
        tracing::info!(%room_id, code = %handle.code(), "room created");
        self.rooms.insert(room_id, handle);
        room_id
    }

    /// Adds a connection to a specific room.
    pub async fn join_room(
        &mut self,
        handle: ConnectionId,
        room_id: RoomId,
        player_name: Option<String>,
        sender: PlayerSender,
    ) -> Result<(), RoomError> {
        self.ensure_not_in_room(handle, room_id)?;
        let room = self.rooms.get(&room_id).ok_or(RoomError::NotFound(room_id))?;
        room.join(handle, player_name, sender).await?;
        self.player_rooms.insert(handle, room_id);
        Ok(())
    }

    /// Adds a connection to the room advertising `code`.
    ///
    /// Codes are not unique. When several rooms share one, the oldest
    /// room that accepts the join wins.
    pub async fn join_by_code(
        &mut self,
        handle: ConnectionId,
        code: &str,
        player_name: Option<String>,
        sender: PlayerSender,
    ) -> Result<RoomId, RoomError> {
        let code = normalize_code(code);
        let candidates: Vec<RoomId> = self
            .rooms
            .values()
            .filter(|r| r.code() == code)
            .map(RoomHandle::room_id)
            .collect();

        let mut last_err = RoomError::CodeNotFound(code);
        for room_id in candidates {
            match self
                .join_room(handle, room_id, player_name.clone(), sender.clone())
                .await
            {
                Ok(()) => return Ok(room_id),
                Err(e @ RoomError::InvalidState(_)) => return Err(e),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    /// Joins the oldest room still in its lobby with space left, or
    /// creates one.
    ///
    /// This awaits every room in turn. A caller sharing the manager behind
    /// a lock should snapshot [`room_handles`](Self::room_handles), call
    /// [`join_first_open`] unlocked, and only come back for
    /// [`record_join`](Self::record_join) or [`create_and_join`](Self::create_and_join).
    pub async fn join_or_create(
        &mut self,
        handle: ConnectionId,
        player_name: Option<String>,
        sender: PlayerSender,
    ) -> Result<RoomId, RoomError> {
        self.ensure_unassigned(handle)?;

        let open = self.room_handles();
        if let Some(room) = join_first_open(&open, handle, player_name.clone(), &sender).await {
            self.record_join(handle, room.room_id())?;
            return Ok(room.room_id());
        }
        self.create_and_join(handle, player_name, sender).await
    }

    /// Spawns a fresh room and puts `handle` in it.
    pub async fn create_and_join(
        &mut self,
        handle: ConnectionId,
        player_name: Option<String>,
        sender: PlayerSender,
    ) -> Result<RoomId, RoomError> {
        let room_id = self.create_room();
        self.join_room(handle, room_id, player_name, sender).await?;
        Ok(room_id)
    }

    /// Records that the room actor already admitted `handle`.
    ///
    /// Fails if the room was dropped from the manager in the meantime.
    pub fn record_join(&mut self, handle: ConnectionId, room_id: RoomId) -> Result<(), RoomError> {
        self.ensure_not_in_room(handle, room_id)?;
        if !self.rooms.contains_key(&room_id) {
            return Err(RoomError::NotFound(room_id));
        }
        self.player_rooms.insert(handle, room_id);
        Ok(())
    }

    /// Fails if `handle` is already in some room.
    pub fn ensure_unassigned(&self, handle: ConnectionId) -> Result<(), RoomError> {
        match self.player_rooms.get(&handle) {
            Some(existing) => Err(RoomError::InvalidState(format!(
                "{handle} is already in room {existing}"
            ))),
            None => Ok(()),
        }
    }

    /// Removes a connection from its current room. The room is forgotten
    /// once it is empty or its actor is gone.
    pub async fn leave_room(&mut self, handle: ConnectionId) -> Result<(), RoomError> {
        let room_id = self
            .player_rooms
            .remove(&handle)
            .ok_or_else(|| RoomError::InvalidState(format!("{handle} is not in any room")))?;

        let Some(room) = self.rooms.get(&room_id) else {
            return Ok(());
        };
        match room.leave(handle).await {
            Ok(0) | Err(RoomError::Unavailable(_)) => {
                self.rooms.remove(&room_id);
                self.player_rooms.retain(|_, rid| *rid != room_id);
                tracing::info!(%room_id, "room emptied and removed");
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Routes a gameplay message to the sender's current room.
    pub async fn route_message(&self, handle: ConnectionId, msg: PlayerMessage) -> Result<(), RoomError> {
        let room_id = self
            .player_rooms
            .get(&handle)
            .ok_or_else(|| RoomError::InvalidState(format!("{handle} is not in any room")))?;
        let room = self.rooms.get(room_id).ok_or(RoomError::NotFound(*room_id))?;
        room.send_message(handle, msg).await
    }

    pub async fn get_room_info(&self, room_id: RoomId) -> Result<RoomInfo, RoomError> {
        let room = self.rooms.get(&room_id).ok_or(RoomError::NotFound(room_id))?;
        room.get_info().await
    }

    /// Lists rooms that are in their lobby with space left.
    pub async fn list_rooms(&self) -> Vec<RoomListEntry> {
        joinable_rooms(&self.room_handles()).await
    }

    /// Shuts a room down and forgets its participants.
    pub async fn destroy_room(&mut self, room_id: RoomId) -> Result<(), RoomError> {
        let room = self.rooms.remove(&room_id).ok_or(RoomError::NotFound(room_id))?;
        let _ = room.shutdown().await;
        self.player_rooms.retain(|_, rid| *rid != room_id);
        tracing::info!(%room_id, "room destroyed");
        Ok(())
    }

    /// The room a connection is in, if any.
    pub fn player_room(&self, handle: ConnectionId) -> Option<RoomId> {
        self.player_rooms.get(&handle).copied()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Cloned handles of every live room, oldest first. Querying these
    /// does not need the manager.
    pub fn room_handles(&self) -> Vec<RoomHandle> {
        self.rooms.values().filter(|r| !r.is_closed()).cloned().collect()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().copied().collect()
    }

    /// The code of a live room.
    pub fn room_code(&self, room_id: RoomId) -> Option<&str> {
        self.rooms.get(&room_id).map(RoomHandle::code)
    }

    fn ensure_not_in_room(&self, handle: ConnectionId, target: RoomId) -> Result<(), RoomError> {
        match self.player_rooms.get(&handle) {
            Some(current) if *current == target => Err(RoomError::AlreadyInRoom(handle, target)),
            Some(current) => Err(RoomError::InvalidState(format!(
                "{handle} is already in room {current}"
            ))),
            None => Ok(()),
        }
    }
}

/// The rooms among `rooms` that are in their lobby with space left.
///
/// Rooms that fail to answer (e.g. shutting down) are skipped.
pub async fn joinable_rooms(rooms: &[RoomHandle]) -> Vec<RoomListEntry> {
    let mut entries = Vec::with_capacity(rooms.len());
    for room in rooms {
        let Ok(info) = room.get_info().await else {
            continue;
        };
        if info.phase.is_joinable() && info.participant_count < info.capacity {
            entries.push(RoomListEntry {
                room_id: info.room_id,
                code: info.code,
                player_count: info.participant_count,
                max_players: info.capacity,
            });
        }
    }
    entries
}

/// Asks each of `rooms` in order to admit `handle` and returns the first
/// that does. Rooms that are full or past their lobby are skipped.
///
/// Only the room actors are touched; the caller records the membership
/// with [`RoomManager::record_join`].
pub async fn join_first_open<'a>(
    rooms: &'a [RoomHandle],
    handle: ConnectionId,
    player_name: Option<String>,
    sender: &PlayerSender,
) -> Option<&'a RoomHandle> {
    for room in rooms {
        // A room can fill between get_info and join; keep looking.
        let Ok(info) = room.get_info().await else {
            continue;
        };
        if !info.phase.is_joinable() || info.participant_count >= info.capacity {
            continue;
        }
        if room.join(handle, player_name.clone(), sender.clone()).await.is_ok() {
            return Some(room);
        }
    }
    None
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

//! Participant registry: who is in a session and what they last reported.

use std::collections::BTreeMap;

use parkour_protocol::{DEFAULT_ANIMATION, MovementUpdate, PlayerState};
use parkour_transport::ConnectionId;

/// Where a participant spawns.
pub const SPAWN_POSITION: [f64; 3] = [0.0, 1.0, 0.0];

/// Identity quaternion.
pub const SPAWN_ROTATION: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

/// One connected player and its transient gameplay state.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub handle: ConnectionId,
    pub display_name: String,
    pub position: [f64; 3],
    /// Stored as received; not normalised.
    pub rotation: [f64; 4],
    pub velocity: [f64; 3],
    pub animation_state: String,
    pub is_grounded: bool,
    pub is_ready: bool,
    pub score: i64,
}

impl Participant {
    fn new(handle: ConnectionId, display_name: String) -> Self {
        Self {
            handle,
            display_name,
            position: SPAWN_POSITION,
            rotation: SPAWN_ROTATION,
            velocity: [0.0; 3],
            animation_state: DEFAULT_ANIMATION.to_string(),
            is_grounded: true,
            is_ready: false,
            score: 0,
        }
    }

    /// The replicated form of this participant.
    pub fn to_state(&self) -> PlayerState {
        let [x, y, z] = self.position;
        let [rot_x, rot_y, rot_z, rot_w] = self.rotation;
        let [velocity_x, velocity_y, velocity_z] = self.velocity;
        PlayerState {
            name: self.display_name.clone(),
            x,
            y,
            z,
            rot_x,
            rot_y,
            rot_z,
            rot_w,
            velocity_x,
            velocity_y,
            velocity_z,
            current_animation: self.animation_state.clone(),
            is_grounded: self.is_grounded,
            is_ready: self.is_ready,
            score: self.score,
        }
    }
}

/// Why [`Registry::admit`] refused a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitError {
    /// The registry already holds `capacity` participants.
    CapacityExceeded,
    /// The handle is already registered.
    Duplicate,
}

/// The participants of one session, keyed by handle.
///
/// Iteration follows handle order. Handles are issued in increasing
/// order, so in practice this is admission order.
#[derive(Debug)]
pub struct Registry {
    capacity: usize,
    participants: BTreeMap<ConnectionId, Participant>,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            participants: BTreeMap::new(),
        }
    }

    /// Adds a participant.
    ///
    /// A missing or empty `requested_name` gets the placeholder
    /// `Player<N>`, where N counts the newcomer. Any other name is kept
    /// verbatim, whitespace included.
    pub fn admit(
        &mut self,
        handle: ConnectionId,
        requested_name: Option<&str>,
    ) -> Result<&Participant, AdmitError> {
        if self.participants.contains_key(&handle) {
            return Err(AdmitError::Duplicate);
        }
        if self.is_full() {
            return Err(AdmitError::CapacityExceeded);
        }

        let display_name = match requested_name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("Player{}", self.participants.len() + 1),
        };
        Ok(self
            .participants
            .entry(handle)
            .or_insert_with(|| Participant::new(handle, display_name)))
    }

    /// Removes a participant. Absent handles are a no-op.
    pub fn remove(&mut self, handle: ConnectionId) -> Option<Participant> {
        self.participants.remove(&handle)
    }

    /// Applies a movement sample. Omitted optional fields take their
    /// defaults (zero velocity, `"Idle"`, grounded). Returns `false` for
    /// an unknown handle.
    pub fn update(&mut self, handle: ConnectionId, update: &MovementUpdate) -> bool {
        let Some(p) = self.participants.get_mut(&handle) else {
            return false;
        };
        p.position = [update.x, update.y, update.z];
        p.rotation = [update.rot_x, update.rot_y, update.rot_z, update.rot_w];
        p.velocity = [
            update.velocity_x.unwrap_or(0.0),
            update.velocity_y.unwrap_or(0.0),
            update.velocity_z.unwrap_or(0.0),
        ];
        p.animation_state = update
            .current_animation
            .clone()
            .unwrap_or_else(|| DEFAULT_ANIMATION.to_string());
        p.is_grounded = update.is_grounded.unwrap_or(true);
        true
    }

    /// True iff the registry is exactly full and everyone is ready.
    pub fn all_ready(&self) -> bool {
        self.participants.len() == self.capacity && self.participants.values().all(|p| p.is_ready)
    }

    /// The participant with the strictly highest score. On ties the first
    /// in iteration order wins.
    pub fn leader(&self) -> Option<&Participant> {
        self.participants.values().fold(None, |best, p| match best {
            Some(b) if b.score >= p.score => Some(b),
            _ => Some(p),
        })
    }

    /// Clears readiness and scores for a rematch.
    pub fn reset_for_rematch(&mut self) {
        for p in self.participants.values_mut() {
            p.is_ready = false;
            p.score = 0;
        }
    }

    pub fn get(&self, handle: ConnectionId) -> Option<&Participant> {
        self.participants.get(&handle)
    }

    pub fn get_mut(&mut self, handle: ConnectionId) -> Option<&mut Participant> {
        self.participants.get_mut(&handle)
    }

    pub fn contains(&self, handle: ConnectionId) -> bool {
        self.participants.contains_key(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn handles(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.participants.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

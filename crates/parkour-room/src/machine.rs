//! The session state machine.
//!
//! A [`SessionMachine`] owns everything about one match instance: the
//! participant registry, the phase, the countdown, and the timers that
//! drive them. It never awaits inside a handler. Delays are armed on its
//! [`SessionClock`] and come back later as [`Fired`] events, which the
//! owner feeds to [`SessionMachine::handle_timer`] in order with every
//! other event.
//!
//! Handlers are plain `&mut self` methods, so a test can drive a session
//! synchronously and inspect what its [`Notifier`] recorded.

use parkour_clock::{Fired, SessionClock, TimerHandle};
use parkour_protocol::{NO_WINNER, Notification, PlayerMessage, RoomId, SessionSnapshot};
use parkour_transport::ConnectionId;

use crate::code::generate_code;
use crate::registry::{AdmitError, Participant, Registry};
use crate::{Notifier, Phase, RoomError, SessionConfig};

/// Broadcast when the countdown fires.
pub const GAME_STARTED_MESSAGE: &str = "Game has started!";

/// Broadcast when the round clock runs out.
pub const TIME_UP_MESSAGE: &str = "Time's up!";

/// What a session timer asks the machine to do when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The pre-match countdown elapsed.
    StartMatch,
    /// One period of the round clock elapsed.
    RoundTick,
}

/// One match instance.
pub struct SessionMachine<N: Notifier> {
    room_id: RoomId,
    config: SessionConfig,
    code: String,
    phase: Phase,
    remaining_seconds: u32,
    registry: Registry,
    clock: SessionClock<TimerEvent>,
    start_timer: Option<TimerHandle>,
    round_timer: Option<TimerHandle>,
    notifier: N,
    /// Set when a replicated field changed since the last snapshot.
    dirty: bool,
}

impl<N: Notifier> SessionMachine<N> {
    /// Creates a session in the lobby and picks its code.
    pub fn new(room_id: RoomId, config: SessionConfig, notifier: N) -> Self {
        let config = config.validated();
        let code = generate_code();
        tracing::info!(
            %room_id,
            %code,
            capacity = config.capacity,
            "session created"
        );
        Self {
            room_id,
            registry: Registry::new(config.capacity),
            config,
            code,
            phase: Phase::Lobby,
            remaining_seconds: 0,
            clock: SessionClock::new(),
            start_timer: None,
            round_timer: None,
            notifier,
            dirty: true,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut N {
        &mut self.notifier
    }

    // -----------------------------------------------------------------------
    // Inbound events
    // -----------------------------------------------------------------------

    /// Admits a participant.
    ///
    /// Only the lobby admits. The newcomer gets a `roomInfo`, then every
    /// participant (newcomer included) gets a `lobbyUpdate`.
    pub fn handle_join(
        &mut self,
        handle: ConnectionId,
        requested_name: Option<&str>,
    ) -> Result<(), RoomError> {
        if !self.phase.is_joinable() {
            return Err(RoomError::NotJoinable(self.room_id, self.phase));
        }
        let name = match self.registry.admit(handle, requested_name) {
            Ok(p) => p.display_name.clone(),
            Err(AdmitError::CapacityExceeded) => {
                return Err(RoomError::CapacityExceeded(self.room_id));
            }
            Err(AdmitError::Duplicate) => {
                return Err(RoomError::AlreadyInRoom(handle, self.room_id));
            }
        };

        let count = self.registry.len();
        tracing::info!(
            room_id = %self.room_id,
            %handle,
            %name,
            participants = count,
            "participant admitted"
        );
        self.dirty = true;

        self.notifier.send_to(
            handle,
            Notification::RoomInfo {
                code: self.code.clone(),
                participant_count: count,
            },
        );
        self.notifier.broadcast(Notification::LobbyUpdate {
            participant_count: count,
            capacity: self.config.capacity,
            message: lobby_message(count, self.config.capacity),
        });
        Ok(())
    }

    /// Removes a participant. Unknown handles are ignored.
    ///
    /// Before the match, readiness is re-evaluated. During the match, the
    /// last participant leaving ends it.
    pub fn handle_leave(&mut self, handle: ConnectionId) -> Option<Participant> {
        let Some(removed) = self.registry.remove(handle) else {
            tracing::debug!(room_id = %self.room_id, %handle, "leave from unknown participant");
            return None;
        };
        tracing::info!(
            room_id = %self.room_id,
            %handle,
            name = %removed.display_name,
            participants = self.registry.len(),
            "participant removed"
        );
        self.dirty = true;

        match self.phase {
            Phase::InProgress if self.registry.is_empty() => self.end_match(),
            phase if phase.is_pre_match() => self.recompute_readiness(),
            _ => {}
        }
        Some(removed)
    }

    /// Applies a gameplay message from `handle`.
    pub fn handle_message(&mut self, handle: ConnectionId, msg: PlayerMessage) {
        if !self.registry.contains(handle) {
            tracing::debug!(room_id = %self.room_id, %handle, "message from unknown participant");
            return;
        }

        match msg {
            PlayerMessage::MovementUpdate(update) => {
                self.registry.update(handle, &update);
                self.dirty = true;
                tracing::trace!(room_id = %self.room_id, %handle, "movement applied");
            }
            PlayerMessage::ReadinessToggle => {
                if let Some(p) = self.registry.get_mut(handle) {
                    p.is_ready = !p.is_ready;
                    tracing::info!(
                        room_id = %self.room_id,
                        %handle,
                        ready = p.is_ready,
                        "readiness toggled"
                    );
                }
                self.dirty = true;
                self.recompute_readiness();
            }
            PlayerMessage::ScoreUpdate { score } => {
                let Some(p) = self.registry.get_mut(handle) else {
                    return;
                };
                p.score = score;
                let display_name = p.display_name.clone();
                self.dirty = true;
                self.notifier.broadcast(Notification::ScoreUpdate {
                    display_name,
                    score,
                });
            }
        }
    }

    /// Processes a timer firing from [`next_timer`](Self::next_timer).
    ///
    /// A firing whose handle no longer matches the live timer of that
    /// purpose is stale and ignored.
    pub fn handle_timer(&mut self, fired: Fired<TimerEvent>) {
        match fired.action {
            TimerEvent::StartMatch => {
                if self.start_timer != Some(fired.handle) {
                    tracing::debug!(room_id = %self.room_id, "stale start timer ignored");
                    return;
                }
                self.start_timer = None;
                self.start_match();
            }
            TimerEvent::RoundTick => {
                if self.round_timer != Some(fired.handle) {
                    tracing::debug!(room_id = %self.room_id, "stale round tick ignored");
                    return;
                }
                self.round_tick();
            }
        }
    }

    /// Waits for the next armed timer. Pends forever when none is armed.
    ///
    /// Cancel-safe, so it can sit in a `tokio::select!` beside the
    /// command channel.
    pub async fn next_timer(&mut self) -> Fired<TimerEvent> {
        self.clock.wait_for_fire().await
    }

    /// Waits for the next timer and handles it.
    pub async fn fire_next_timer(&mut self) {
        let fired = self.clock.wait_for_fire().await;
        self.handle_timer(fired);
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Arms the countdown when everyone is ready, or disarms it when
    /// readiness was lost. Only meaningful before the match.
    fn recompute_readiness(&mut self) {
        if !self.phase.is_pre_match() {
            return;
        }

        if self.registry.all_ready() {
            if let Some(stale) = self.start_timer.take() {
                self.clock.cancel(stale);
            }
            self.start_timer = Some(self.clock.after(self.config.start_delay, TimerEvent::StartMatch));
            self.set_phase(Phase::CountdownToStart);
            tracing::info!(
                room_id = %self.room_id,
                delay_ms = self.config.start_delay.as_millis() as u64,
                "all participants ready, countdown armed"
            );
        } else {
            if let Some(timer) = self.start_timer.take() {
                self.clock.cancel(timer);
                tracing::info!(room_id = %self.room_id, "countdown cancelled");
            }
            self.set_phase(Phase::Lobby);
        }
    }

    fn start_match(&mut self) {
        if self.phase != Phase::CountdownToStart {
            tracing::debug!(room_id = %self.room_id, phase = %self.phase, "start ignored");
            return;
        }

        self.set_phase(Phase::InProgress);
        self.remaining_seconds = self.config.round_duration_secs;
        self.dirty = true;
        tracing::info!(
            room_id = %self.room_id,
            participants = self.registry.len(),
            round_secs = self.remaining_seconds,
            "match started"
        );
        self.notifier.broadcast(Notification::GameStarted {
            message: GAME_STARTED_MESSAGE.to_string(),
            round_duration_seconds: self.remaining_seconds,
        });

        if let Some(stale) = self.round_timer.take() {
            self.clock.cancel(stale);
        }
        self.round_timer = Some(self.clock.every(self.config.tick_period, TimerEvent::RoundTick));
    }

    fn round_tick(&mut self) {
        if self.phase != Phase::InProgress {
            return;
        }

        if self.remaining_seconds > 0 {
            self.remaining_seconds -= 1;
            self.dirty = true;
            if self.config.warning_thresholds.contains(&self.remaining_seconds) {
                let message = warning_message(self.remaining_seconds);
                tracing::info!(room_id = %self.room_id, remaining = self.remaining_seconds, "time warning");
                self.notifier.broadcast(Notification::TimeWarning { message });
            }
        } else {
            tracing::info!(room_id = %self.room_id, "round clock expired");
            self.notifier.broadcast(Notification::TimeUp {
                message: TIME_UP_MESSAGE.to_string(),
            });
            self.end_match();
        }
    }

    /// Resolves the match and moves to [`Phase::Ended`].
    ///
    /// Only a running match can end; any later call is a no-op.
    fn end_match(&mut self) {
        if self.phase != Phase::InProgress {
            return;
        }

        if let Some(timer) = self.start_timer.take() {
            self.clock.cancel(timer);
        }
        if let Some(timer) = self.round_timer.take() {
            self.clock.cancel(timer);
        }

        let (winner_name, highest_score) = match self.registry.leader() {
            Some(p) => (p.display_name.clone(), p.score),
            None => (NO_WINNER.to_string(), 0),
        };
        tracing::info!(
            room_id = %self.room_id,
            winner = %winner_name,
            score = highest_score,
            "match ended"
        );
        self.notifier.broadcast(Notification::GameEnded {
            winner_name,
            highest_score,
        });

        self.registry.reset_for_rematch();
        self.remaining_seconds = 0;
        self.set_phase(Phase::Ended);
        self.dirty = true;
    }

    fn set_phase(&mut self, target: Phase) {
        if self.phase == target {
            return;
        }
        debug_assert!(
            self.phase.can_transition_to(target),
            "illegal phase change {} -> {target}",
            self.phase
        );
        tracing::debug!(room_id = %self.room_id, from = %self.phase, to = %target, "phase changed");
        self.phase = target;
    }

    /// Cancels every timer. Call before dropping the session.
    pub fn dispose(&mut self) {
        self.start_timer = None;
        self.round_timer = None;
        let cancelled = self.clock.cancel_all();
        tracing::debug!(room_id = %self.room_id, cancelled, "session disposed");
    }

    // -----------------------------------------------------------------------
    // Replication
    // -----------------------------------------------------------------------

    /// The replicated view of the session.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            code: self.code.clone(),
            max_players: self.config.capacity,
            game_started: self.phase == Phase::InProgress,
            round_time: self.remaining_seconds,
            players: self
                .registry
                .iter()
                .map(|p| (p.handle.to_string(), p.to_state()))
                .collect(),
        }
    }

    /// A snapshot if anything replicated changed since the last call.
    pub fn take_snapshot_if_dirty(&mut self) -> Option<SessionSnapshot> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.snapshot())
    }
}

fn lobby_message(count: usize, capacity: usize) -> String {
    if count < capacity {
        format!("Waiting for {} more player(s)...", capacity - count)
    } else {
        "All players joined! Press READY to start".to_string()
    }
}

fn warning_message(seconds: u32) -> String {
    match seconds {
        60 => "1 minute remaining!".to_string(),
        s if s % 60 == 0 => format!("{} minutes remaining!", s / 60),
        s => format!("{s} seconds remaining!"),
    }
}

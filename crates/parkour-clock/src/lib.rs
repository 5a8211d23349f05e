//! Per-session cooperative timer scheduler for Parkour.
//!
//! A [`SessionClock`] owns a small arena of timer slots. Callers arm a
//! one-shot ([`SessionClock::after`]) or repeating ([`SessionClock::every`])
//! timer and get back a [`TimerHandle`], a copyable token that can later
//! cancel the timer. Handles carry a generation, so a handle whose slot
//! has since been reused is recognised as stale and cancelling it does
//! nothing.
//!
//! Timers never run code. A firing hands the armed action value back to
//! the owner as a [`Fired`], to be processed like any other event on the
//! session's single logical thread:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle command */ }
//!         fired = clock.wait_for_fire() => { /* handle timer event */ }
//!     }
//! }
//! ```
//!
//! [`SessionClock::wait_for_fire`] is cancel-safe: dropping it before it
//! resolves leaves every timer armed.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Smallest accepted repeat period. Zero would spin the owning task.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// Handles and firings
// ---------------------------------------------------------------------------

/// Token identifying one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    slot: u32,
    generation: u32,
}

/// Whether a timer fires once or keeps firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Once,
    Every(Duration),
}

/// A timer that came due, returned by [`SessionClock::wait_for_fire`] and
/// [`SessionClock::poll_due`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<A> {
    /// Handle of the timer that fired. A repeating timer keeps the same
    /// handle across firings; a one-shot handle is dead once returned.
    pub handle: TimerHandle,
    /// The action value supplied when the timer was armed.
    pub action: A,
    /// When the timer was due (not when it was observed).
    pub deadline: Instant,
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Entry<A> {
    deadline: Instant,
    schedule: Schedule,
    action: A,
    /// Arm order, used to break ties between equal deadlines.
    seq: u64,
}

#[derive(Debug)]
struct Slot<A> {
    generation: u32,
    entry: Option<Entry<A>>,
}

/// Timer arena for one session.
#[derive(Debug)]
pub struct SessionClock<A> {
    slots: Vec<Slot<A>>,
    free: Vec<u32>,
    next_seq: u64,
    fired_total: u64,
}

impl<A> Default for SessionClock<A> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_seq: 0,
            fired_total: 0,
        }
    }
}

impl<A: Clone> SessionClock<A> {
    /// Creates a clock with no timers armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot timer that fires `delay` from now.
    pub fn after(&mut self, delay: Duration, action: A) -> TimerHandle {
        let handle = self.arm(Instant::now() + delay, Schedule::Once, action);
        debug!(?handle, delay_ms = delay.as_millis() as u64, "one-shot timer armed");
        handle
    }

    /// Arms a repeating timer whose first firing is one `period` from now.
    ///
    /// Periods below [`MIN_PERIOD`] are raised to it.
    pub fn every(&mut self, period: Duration, action: A) -> TimerHandle {
        let period = period.max(MIN_PERIOD);
        let handle = self.arm(Instant::now() + period, Schedule::Every(period), action);
        debug!(?handle, period_ms = period.as_millis() as u64, "repeating timer armed");
        handle
    }

    /// Cancels a timer. Returns `true` if it was still armed.
    ///
    /// Cancelling a fired one-shot, an already-cancelled timer, or a stale
    /// handle is a no-op.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let Some(slot) = self.slot_mut(handle) else {
            return false;
        };
        if slot.entry.take().is_none() {
            return false;
        }
        self.release(handle.slot);
        debug!(?handle, "timer cancelled");
        true
    }

    /// Cancels every armed timer. Returns how many were armed.
    pub fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for index in 0..self.slots.len() {
            if self.slots[index].entry.take().is_some() {
                self.release(index as u32);
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(cancelled, "all timers cancelled");
        }
        cancelled
    }

    /// Whether `handle` still refers to an armed timer.
    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.slots
            .get(handle.slot as usize)
            .is_some_and(|s| s.generation == handle.generation && s.entry.is_some())
    }

    /// Number of armed timers.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    /// Total firings delivered since creation.
    pub fn fired_total(&self) -> u64 {
        self.fired_total
    }

    /// The earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.earliest().map(|(_, deadline)| deadline)
    }

    /// Takes the earliest timer due at or before `now`.
    ///
    /// A due one-shot is disarmed and its slot freed. A due repeating timer
    /// is re-armed one period after its previous deadline; if the owner fell
    /// more than a whole period behind, the missed firings are skipped and
    /// the next one is scheduled a period from `now`.
    pub fn poll_due(&mut self, now: Instant) -> Option<Fired<A>> {
        let (index, deadline) = self.earliest()?;
        if deadline > now {
            return None;
        }

        let generation = self.slots[index].generation;
        let handle = TimerHandle {
            slot: index as u32,
            generation,
        };
        let schedule = self.slots[index].entry.as_ref()?.schedule;

        let fired = match schedule {
            Schedule::Once => {
                let entry = self.slots[index].entry.take()?;
                self.release(index as u32);
                Fired {
                    handle,
                    action: entry.action,
                    deadline: entry.deadline,
                }
            }
            Schedule::Every(period) => {
                let action = self.slots[index].entry.as_ref()?.action.clone();
                let mut next = deadline + period;
                if next <= now {
                    let behind = now.saturating_duration_since(deadline);
                    warn!(
                        ?handle,
                        behind_ms = behind.as_millis() as u64,
                        "repeating timer overrun, skipping missed firings"
                    );
                    next = now + period;
                }
                let seq = self.bump_seq();
                if let Some(entry) = self.slots[index].entry.as_mut() {
                    entry.deadline = next;
                    entry.seq = seq;
                }
                Fired {
                    handle,
                    action,
                    deadline,
                }
            }
        };

        self.fired_total += 1;
        trace!(?handle, "timer fired");
        Some(fired)
    }

    /// Waits until the earliest timer is due and returns it.
    ///
    /// With nothing armed this pends forever, which lets `tokio::select!`
    /// keep serving its other branches.
    pub async fn wait_for_fire(&mut self) -> Fired<A> {
        loop {
            let Some(deadline) = self.next_deadline() else {
                std::future::pending::<()>().await;
                unreachable!()
            };
            time::sleep_until(deadline).await;
            if let Some(fired) = self.poll_due(Instant::now()) {
                return fired;
            }
        }
    }

    // -- internals --------------------------------------------------------

    fn arm(&mut self, deadline: Instant, schedule: Schedule, action: A) -> TimerHandle {
        let seq = self.bump_seq();
        let entry = Entry {
            deadline,
            schedule,
            action,
            seq,
        };
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                TimerHandle {
                    slot: index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                TimerHandle {
                    slot: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    /// Returns a now-empty slot to the free list. Bumping the generation
    /// invalidates every handle issued for the previous occupant.
    fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
    }

    fn slot_mut(&mut self, handle: TimerHandle) -> Option<&mut Slot<A>> {
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|s| s.generation == handle.generation)
    }

    fn earliest(&self) -> Option<(usize, Instant)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.entry.as_ref().map(|e| (i, e.deadline, e.seq)))
            .min_by_key(|&(_, deadline, seq)| (deadline, seq))
            .map(|(i, deadline, _)| (i, deadline))
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

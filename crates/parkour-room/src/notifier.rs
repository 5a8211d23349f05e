//! Outbound seam between a session and whatever delivers its messages.

use parkour_protocol::Notification;
use parkour_transport::ConnectionId;

/// Delivers notifications produced by a [`SessionMachine`](crate::SessionMachine).
///
/// Implementations own no session state and must not fail: a recipient
/// that has gone away is simply skipped.
pub trait Notifier {
    /// Sends to one participant.
    fn send_to(&mut self, handle: ConnectionId, notification: Notification);

    /// Sends to every current participant.
    fn broadcast(&mut self, notification: Notification);
}

/// A [`Notifier`] that records instead of sending. Useful in tests and
/// for replaying what a session emitted.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Vec<(Option<ConnectionId>, Notification)>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcasts recorded so far.
    pub fn broadcasts(&self) -> impl Iterator<Item = &Notification> {
        self.sent.iter().filter(|(to, _)| to.is_none()).map(|(_, n)| n)
    }

    /// Notifications sent to `handle` alone.
    pub fn sent_to(&self, handle: ConnectionId) -> impl Iterator<Item = &Notification> {
        self.sent
            .iter()
            .filter(move |(to, _)| *to == Some(handle))
            .map(|(_, n)| n)
    }

    /// Number of recorded notifications with this wire topic.
    pub fn count(&self, topic: &str) -> usize {
        self.sent.iter().filter(|(_, n)| n.topic() == topic).count()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl Notifier for RecordingNotifier {
    fn send_to(&mut self, handle: ConnectionId, notification: Notification) {
        self.sent.push((Some(handle), notification));
    }

    fn broadcast(&mut self, notification: Notification) {
        self.sent.push((None, notification));
    }
}

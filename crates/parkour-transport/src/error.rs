/// Errors raised by a [`Transport`](crate::Transport) or
/// [`Connection`](crate::Connection).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer is gone; carries a short description for the logs.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener or accepting a TCP stream failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The TCP stream was accepted but the protocol upgrade was refused.
    #[error("upgrade failed: {0}")]
    UpgradeFailed(String),

    /// [`Transport::shutdown`](crate::Transport::shutdown) was called.
    #[error("transport shut down")]
    Shutdown,
}

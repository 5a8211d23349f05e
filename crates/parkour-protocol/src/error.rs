//! Errors raised while turning bytes into protocol messages and back.

/// Protocol-layer failures.
///
/// Decode failures are routine (clients send garbage), so handlers report
/// them to the client and keep the connection; they are never fatal.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A value could not be serialized.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Bytes were malformed, truncated, or had the wrong shape. Missing
    /// required fields (e.g. a `playerMove` without `x`) land here.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The client speaks a different protocol version.
    #[error("unsupported protocol version {got} (expected {expected})")]
    UnsupportedVersion { expected: u32, got: u32 },

    /// Well-formed but not allowed here, e.g. a first message that is not
    /// a handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

//! Pluggable serialization for envelopes.
//!
//! The server is generic over [`Codec`] so the wire format can change
//! without touching connection handling. [`JsonCodec`] is the only codec
//! shipped today: browser and engine clients can read it without extra
//! tooling.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts values to bytes and back.
///
/// Codecs are shared by every connection task, hence `Send + Sync +
/// 'static`. Decoding produces owned values so the receive buffer can be
/// dropped immediately.
pub trait Codec: Send + Sync + 'static {
    /// Serializes `value`.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a `T` from `data`.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` for malformed or mistyped input.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// JSON via `serde_json`. Behind the default `json` feature.
///
/// ```rust
/// use parkour_protocol::{Codec, Envelope, JsonCodec, Payload, PlayerMessage};
///
/// let codec = JsonCodec;
/// let envelope = Envelope {
///     seq: 1,
///     timestamp: 250,
///     payload: Payload::Player(PlayerMessage::ReadinessToggle),
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

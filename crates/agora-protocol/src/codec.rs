//! Codec trait and implementations for serializing events.
//!
//! The broadcaster encodes each [`DomainEvent`](crate::DomainEvent) once
//! per publish and hands the same bytes to every subscriber, so the codec
//! sits behind a trait: swapping the wire format never touches the
//! fan-out code.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because a single codec instance is shared by
/// every producer task through the server state.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Browsers consume these frames directly, so JSON is the default wire
/// format. Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use agora_protocol::{Codec, JsonCodec, MessageId, RoomEvent};
///
/// let codec = JsonCodec;
/// let event = RoomEvent::MessageAnswered { message_id: MessageId::new() };
///
/// let bytes = codec.encode(&event).unwrap();
/// let decoded: RoomEvent = codec.decode(&bytes).unwrap();
/// assert_eq!(event, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;

    #[test]
    fn test_json_codec_output_is_utf8_text() {
        let bytes = JsonCodec.encode(&vec!["a", "b"]).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), r#"["a","b"]"#);
    }

    #[test]
    fn test_json_codec_decode_rejects_garbage() {
        let result: Result<Vec<String>, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}

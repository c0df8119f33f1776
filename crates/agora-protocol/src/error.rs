//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// Serialization failures and malformed identifiers both land here, so
/// callers above the protocol layer deal with one error type regardless
/// of which codec or parser produced it.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// An identifier could not be parsed.
    ///
    /// Carries the raw input so it can be echoed back in a 400 response.
    #[error("invalid {kind} id: {raw:?}")]
    InvalidId {
        /// What kind of identifier was expected ("room", "message").
        kind: &'static str,
        /// The rejected input.
        raw: String,
    },
}

//! Error types for decoding wire messages.

/// Errors produced while decoding or encoding a wire message.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message is not a JSON object with a string `type` field")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

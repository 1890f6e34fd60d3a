use serde::{Deserialize, Serialize};

use crate::constants::MessageKind;
use crate::error::ProtocolError;
use crate::messages::{FileChunk, TransferStart};

/// Tagged union over every message the transfer core understands.
///
/// Serialized as a flat JSON object whose `type` field selects the variant,
/// e.g. `{"type":"file-chunk","transferId":"…",…}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    #[serde(rename = "transfer-start")]
    TransferStart(TransferStart),
    #[serde(rename = "file-chunk")]
    FileChunk(FileChunk),
}

impl WireMessage {
    /// Decodes a text frame received from the channel.
    ///
    /// A frame without a string `type`, with a `type` this protocol does not
    /// define, or whose fields do not match the tagged shape each yield a
    /// distinct [`ProtocolError`] so callers can tell foreign traffic from
    /// corrupt traffic.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::from_value(value)
    }

    /// Decodes an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolError> {
        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        let kind = MessageKind::from_tag(tag)
            .ok_or_else(|| ProtocolError::UnknownType(tag.to_string()))?;

        serde_json::from_value(value).map_err(|source| ProtocolError::Malformed {
            kind: kind.as_str(),
            source,
        })
    }

    /// Encodes the message as a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns the message discriminator.
    pub fn kind(&self) -> MessageKind {
        match self {
            WireMessage::TransferStart(_) => MessageKind::TransferStart,
            WireMessage::FileChunk(_) => MessageKind::FileChunk,
        }
    }

    /// Returns the transfer id the message refers to.
    pub fn transfer_id(&self) -> &str {
        match self {
            WireMessage::TransferStart(m) => &m.transfer_id,
            WireMessage::FileChunk(m) => &m.transfer_id,
        }
    }
}

impl From<TransferStart> for WireMessage {
    fn from(m: TransferStart) -> Self {
        WireMessage::TransferStart(m)
    }
}

impl From<FileChunk> for WireMessage {
    fn from(m: FileChunk) -> Self {
        WireMessage::FileChunk(m)
    }
}

use serde::{Deserialize, Serialize};

/// `type` tag of the message that opens a transfer.
pub const TRANSFER_START: &str = "transfer-start";

/// `type` tag of a single encrypted chunk.
pub const FILE_CHUNK: &str = "file-chunk";

/// Wire message discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "transfer-start")]
    TransferStart,
    #[serde(rename = "file-chunk")]
    FileChunk,
}

impl MessageKind {
    /// Returns the `type` tag used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::TransferStart => TRANSFER_START,
            MessageKind::FileChunk => FILE_CHUNK,
        }
    }

    /// Parses a wire tag. Returns `None` for tags this protocol does not know.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            TRANSFER_START => Some(MessageKind::TransferStart),
            FILE_CHUNK => Some(MessageKind::FileChunk),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_match_serde_names() {
        for kind in [MessageKind::TransferStart, MessageKind::FileChunk] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            assert_eq!(MessageKind::from_tag(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn unknown_tag() {
        assert_eq!(MessageKind::from_tag("offer"), None);
        assert_eq!(MessageKind::from_tag(""), None);
    }
}

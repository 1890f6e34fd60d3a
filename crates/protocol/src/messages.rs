use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Transfer payloads
// ---------------------------------------------------------------------------

/// Opens a transfer on the receiving peer.
///
/// Sent exactly once, before any [`FileChunk`] carrying the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStart {
    pub transfer_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
    /// Chunk size the sender split the file with.
    ///
    /// Absent when the sender predates chunk-size negotiation; the receiver
    /// then falls back to its locally configured size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u32>,
    /// Exported symmetric key for this transfer only.
    pub encryption_key: String,
    /// Hex SHA-256 of the whole file.
    pub checksum: String,
}

/// One encrypted window of the file.
///
/// `encrypted_data` and `iv` are base64-encoded in JSON so the message stays
/// a plain text frame on channels that only carry JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChunk {
    pub transfer_id: String,
    pub chunk_index: u32,
    #[serde(with = "base64_bytes")]
    pub encrypted_data: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
    /// Hex SHA-256 of the plaintext chunk.
    pub checksum: String,
    pub is_last_chunk: bool,
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

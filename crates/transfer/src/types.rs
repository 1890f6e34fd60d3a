use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::TransferKey;

/// Lifecycle state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Transferring,
    Paused,
    Completed,
    Failed,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Transferring => "transferring",
            TransferStatus::Paused => "paused",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Which side of the transfer this process is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// One file moving between this process and a peer.
///
/// The registry owns the live value; everything handed to callers and
/// observers is a clone and should be treated as a read-only snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: String,
    pub file_name: String,
    pub file_size: u64,
    pub chunk_size: u32,
    pub total_chunks: u32,
    pub status: TransferStatus,
    /// Percentage in `0.0..=100.0`.
    pub progress: f64,
    /// Bytes per second since the transfer started moving data.
    pub speed: f64,
    pub bytes_transferred: u64,
    /// Estimated seconds left at the average speed; unknown until data moves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    #[serde(skip)]
    pub encryption_key: TransferKey,
    /// Hex SHA-256 of the whole file.
    pub checksum: String,
    pub peer_id: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Transfer {
    /// Creates a transfer in the `pending` state with no progress.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        chunk_size: u32,
        total_chunks: u32,
        encryption_key: TransferKey,
        checksum: impl Into<String>,
        peer_id: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            file_size,
            chunk_size,
            total_chunks,
            status: TransferStatus::Pending,
            progress: 0.0,
            speed: 0.0,
            bytes_transferred: 0,
            eta_seconds: None,
            encryption_key,
            checksum: checksum.into(),
            peer_id: peer_id.into(),
            direction,
            error: None,
        }
    }
}

//! Chunked, end-to-end encrypted file transfer between two peers.
//!
//! The crate never opens a connection itself. It is handed an already-open,
//! ordered, reliable message channel ([`PeerChannel`]) and layers on top of it:
//!
//! - per-transfer AES-256-GCM keys and SHA-256 integrity checks ([`crypto`]),
//! - a single registry that owns every [`Transfer`] and its lifecycle,
//! - a sender pipeline that streams a file as encrypted chunks with
//!   pause/resume/cancel,
//! - a receiver pipeline that decrypts, verifies, buffers by index and
//!   reassembles the file before handing it to an [`OutputSink`].
//!
//! Progress, completion and failure are reported through a
//! [`TransferObserver`]; the crate holds no presentation logic.

mod channel;
mod chunked;
mod config;
pub mod crypto;
mod events;
mod progress;
mod receiver;
mod registry;
mod sender;
mod service;
mod sink;
mod state;
mod types;
mod validation;

pub use channel::{InboundFrame, LoopbackChannel, PeerChannel};
pub use chunked::{ChunkBuffer, ChunkReader, chunk_count, chunk_window};
pub use config::{OrphanPolicy, TransferConfig};
pub use crypto::{CryptoError, TransferKey};
pub use events::{EventForwarder, NoopObserver, TransferEvent, TransferObserver};
pub use progress::ProgressEstimator;
pub use receiver::{ChunkOutcome, ReceiverPipeline};
pub use registry::TransferRegistry;
pub use sender::{SendOutcome, SenderPipeline};
pub use service::TransferService;
pub use sink::{DirectorySink, MemorySink, OutputSink};
pub use types::{Direction, Transfer, TransferStatus};
pub use validation::validate_file_name;

/// Default chunk size: 16 KiB.
///
/// Small enough that a base64-encoded chunk plus its JSON envelope stays
/// well under the message size limits of typical peer data channels.
pub const DEFAULT_CHUNK_SIZE: u32 = 16 * 1024;

/// Largest chunk size either side accepts: 16 MiB.
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("wire error: {0}")]
    Wire(#[from] veildrop_protocol::ProtocolError),

    #[error("channel rejected {0}")]
    SendFailure(String),

    #[error("checksum mismatch for {0}")]
    ChecksumMismatch(String),

    #[error("incomplete transfer: missing chunks {missing:?}")]
    IncompleteTransfer { missing: Vec<u32> },

    #[error("unknown transfer: {0}")]
    UnknownTransfer(String),

    #[error("transfer not found: {0}")]
    NotFound(String),

    #[error("duplicate transfer id: {0}")]
    DuplicateTransfer(String),

    #[error("transfer {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TransferStatus,
        to: TransferStatus,
    },

    #[error("transfer still active: {0}")]
    StillActive(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransferError {
    /// Returns `true` for decryption (authentication tag) failures.
    pub fn is_decryption(&self) -> bool {
        matches!(self, TransferError::Crypto(CryptoError::Decryption))
    }
}

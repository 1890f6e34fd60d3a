//! Wire protocol for chunked encrypted file transfers.
//!
//! Two messages travel over an already-open, ordered, reliable peer channel:
//! a single `transfer-start` announcing the file and its key, followed by
//! one `file-chunk` per encrypted window of the file.

pub mod constants;
pub mod envelope;
pub mod error;
pub mod messages;

// Re-export primary types for convenience.
pub use constants::MessageKind;
pub use envelope::WireMessage;
pub use error::ProtocolError;
pub use messages::{FileChunk, TransferStart};

//! Transfer configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, TransferError};

/// What the receiver does with a chunk whose transfer id it does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrphanPolicy {
    /// Drop the chunk and report it as an orphan.
    #[default]
    Reject,
    /// Re-key the single incoming transfer that is transferring and has not
    /// buffered anything yet. For peers that mint their own ids.
    AdoptSingleCandidate,
}

/// Settings shared by the sender and receiver pipelines.
///
/// Deserializes from camelCase JSON; every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferConfig {
    /// Chunk size used when sending, and assumed for starts that do not
    /// announce one.
    pub chunk_size: u32,
    pub orphan_policy: OrphanPolicy,
    /// Where a [`DirectorySink`](crate::DirectorySink) should write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            orphan_policy: OrphanPolicy::Reject,
            output_dir: None,
        }
    }
}

impl TransferConfig {
    /// Loads and validates a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, TransferError> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| TransferError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(TransferError::Config(format!(
                "chunkSize must be in 1..={MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

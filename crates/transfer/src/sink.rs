//! Where reassembled incoming files go.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::TransferError;
use crate::validation::validate_file_name;

/// Materializes a completed incoming file (write to disk, hand to a UI, ...).
pub trait OutputSink: Send + Sync {
    fn materialize<'a>(
        &'a self,
        file_name: &'a str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>>;
}

/// Writes each file into a base directory.
///
/// The peer-supplied file name is validated first. Data lands in a `.part`
/// file that is renamed into place once fully written.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    base_path: PathBuf,
}

impl DirectorySink {
    /// Creates a sink rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the base output path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl OutputSink for DirectorySink {
    fn materialize<'a>(
        &'a self,
        file_name: &'a str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>> {
        Box::pin(async move {
            validate_file_name(file_name)?;
            tokio::fs::create_dir_all(&self.base_path).await?;

            let final_path = self.base_path.join(file_name);
            let part_path = self.base_path.join(format!("{file_name}.part"));
            let len = data.len();
            tokio::fs::write(&part_path, data).await?;
            tokio::fs::rename(&part_path, &final_path).await?;

            info!(path = %final_path.display(), bytes = len, "file written");
            Ok(())
        })
    }
}

/// Keeps every materialized file in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    files: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns copies of everything received so far, in arrival order.
    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the data of the first file named `file_name`.
    pub fn get(&self, file_name: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(name, _)| name == file_name)
            .map(|(_, data)| data.clone())
    }
}

impl OutputSink for MemorySink {
    fn materialize<'a>(
        &'a self,
        file_name: &'a str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>> {
        Box::pin(async move {
            self.files
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((file_name.to_string(), data));
            Ok(())
        })
    }
}

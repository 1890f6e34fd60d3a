use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::{MAX_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Chunk arithmetic
// ---------------------------------------------------------------------------

/// Number of chunks a file of `file_size` bytes splits into.
///
/// An empty file is one zero-length final chunk, so the result is never 0.
pub fn chunk_count(file_size: u64, chunk_size: u32) -> Result<u32, TransferError> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(TransferError::Config(format!(
            "chunk size must be in 1..={MAX_CHUNK_SIZE}, got {chunk_size}"
        )));
    }
    let count = file_size.div_ceil(u64::from(chunk_size)).max(1);
    u32::try_from(count).map_err(|_| {
        TransferError::Protocol(format!(
            "file of {file_size} bytes needs {count} chunks of {chunk_size} bytes"
        ))
    })
}

/// Byte range `[index * chunk_size, min(file_size, (index + 1) * chunk_size))`.
///
/// Indices past the end yield an empty range at `file_size`.
pub fn chunk_window(index: u32, file_size: u64, chunk_size: u32) -> Range<u64> {
    let size = u64::from(chunk_size);
    let start = u64::from(index).saturating_mul(size).min(file_size);
    let end = start.saturating_add(size).min(file_size);
    start..end
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads fixed-size windows of a file by chunk index.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: u32,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    pub async fn new(path: &Path, chunk_size: u32) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        // Validates the chunk size as a side effect.
        chunk_count(file_size, chunk_size)?;
        Ok(Self {
            file,
            chunk_size,
            file_size,
        })
    }

    /// Reads the plaintext window for chunk `index`.
    ///
    /// Fails with an `UnexpectedEof` I/O error if the file shrank since it
    /// was opened.
    pub async fn read_chunk(&mut self, index: u32) -> Result<Vec<u8>, TransferError> {
        let window = chunk_window(index, self.file_size, self.chunk_size);
        let len = usize::try_from(window.end - window.start)
            .map_err(|_| TransferError::Protocol("chunk window exceeds address space".into()))?;
        let mut buf = vec![0u8; len];
        if len > 0 {
            self.file.seek(SeekFrom::Start(window.start)).await?;
            self.file.read_exact(&mut buf).await?;
        }
        Ok(buf)
    }

    /// Total file size in bytes, as observed when the reader was opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of chunks the file splits into.
    pub fn total_chunks(&self) -> u32 {
        // Cannot fail: validated in `new`. The u32 overflow case is also
        // rejected there.
        chunk_count(self.file_size, self.chunk_size).unwrap_or(1)
    }
}

// ---------------------------------------------------------------------------
// ChunkBuffer
// ---------------------------------------------------------------------------

/// Receiver-side accumulator of decrypted chunks, addressed by index.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    chunks: BTreeMap<u32, Vec<u8>>,
    bytes: u64,
}

impl ChunkBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a chunk. Returns `false` (and keeps the first copy) if the
    /// index was already present.
    pub fn insert(&mut self, index: u32, data: Vec<u8>) -> bool {
        if self.chunks.contains_key(&index) {
            return false;
        }
        self.bytes += data.len() as u64;
        self.chunks.insert(index, data);
        true
    }

    /// Returns `true` if chunk `index` is buffered.
    pub fn contains(&self, index: u32) -> bool {
        self.chunks.contains_key(&index)
    }

    /// Number of buffered chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns `true` if nothing has been buffered yet.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total plaintext bytes buffered.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Indices in `0..total_chunks` that have not arrived.
    pub fn missing(&self, total_chunks: u32) -> Vec<u32> {
        (0..total_chunks)
            .filter(|i| !self.chunks.contains_key(i))
            .collect()
    }

    /// Concatenates every chunk in index order, consuming the buffer.
    pub fn assemble(self, total_chunks: u32) -> Result<Vec<u8>, TransferError> {
        let missing = self.missing(total_chunks);
        if !missing.is_empty() {
            return Err(TransferError::IncompleteTransfer { missing });
        }
        let capacity = usize::try_from(self.bytes).unwrap_or(0);
        let mut out = Vec::with_capacity(capacity);
        for (_, chunk) in self.chunks.into_iter().take(total_chunks as usize) {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

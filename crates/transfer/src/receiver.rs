//! Turns inbound `transfer-start` / `file-chunk` messages back into a file.

use std::sync::Arc;

use tracing::{debug, info, warn};
use veildrop_protocol::{FileChunk, TransferStart};

use crate::chunked::{ChunkBuffer, chunk_count};
use crate::config::{OrphanPolicy, TransferConfig};
use crate::crypto::{self, TransferKey};
use crate::events::TransferObserver;
use crate::progress::ProgressEstimator;
use crate::registry::{Role, TransferEntry, TransferRegistry};
use crate::sink::OutputSink;
use crate::types::{Direction, Transfer, TransferStatus};
use crate::{MAX_CHUNK_SIZE, TransferError};

/// What [`ReceiverPipeline::handle_chunk`] did with a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Decrypted, verified and stored.
    Buffered,
    /// Index already stored; the first copy was kept.
    Duplicate,
    /// The transfer is terminal; the chunk was dropped.
    Ignored,
    /// The file was reassembled and handed to the sink.
    Completed,
}

/// Pre-decryption view of a transfer, taken under the entry lock.
enum Lookup {
    Open { key: TransferKey, total_chunks: u32 },
    Done(ChunkOutcome),
    OutOfRange(u32),
}

/// Result of storing a verified chunk.
enum Stored {
    Done(ChunkOutcome),
    Progress(Transfer),
    Finalize(Transfer, ChunkBuffer),
}

/// Receiver half of the transfer protocol.
pub struct ReceiverPipeline {
    registry: Arc<TransferRegistry>,
    observer: Arc<dyn TransferObserver>,
    sink: Arc<dyn OutputSink>,
    default_chunk_size: u32,
    orphan_policy: OrphanPolicy,
}

impl ReceiverPipeline {
    pub fn new(
        registry: Arc<TransferRegistry>,
        observer: Arc<dyn TransferObserver>,
        sink: Arc<dyn OutputSink>,
        config: &TransferConfig,
    ) -> Self {
        Self {
            registry,
            observer,
            sink,
            default_chunk_size: config.chunk_size,
            orphan_policy: config.orphan_policy,
        }
    }

    /// Registers the incoming transfer announced by `start`.
    ///
    /// The sender's id is adopted as is and the transfer goes straight to
    /// `transferring`. Nothing is registered if validation fails.
    pub fn handle_start(&self, peer_id: &str, start: TransferStart) -> Result<Transfer, TransferError> {
        let id = start.transfer_id;
        if start.file_name.trim().is_empty() {
            return Err(TransferError::Protocol(format!("{id}: empty file name")));
        }
        let chunk_size = start.chunk_size.unwrap_or(self.default_chunk_size);
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(TransferError::Protocol(format!(
                "{id}: chunk size {chunk_size} out of range"
            )));
        }
        let derived = chunk_count(start.file_size, chunk_size)
            .map_err(|e| TransferError::Protocol(format!("{id}: {e}")))?;
        if derived != start.total_chunks {
            return Err(TransferError::Protocol(format!(
                "{id}: declared {} chunks, {} bytes at {chunk_size} per chunk is {derived}",
                start.total_chunks, start.file_size
            )));
        }
        let key = TransferKey::import(&start.encryption_key)
            .map_err(|e| TransferError::Protocol(format!("{id}: {e}")))?;

        let mut transfer = Transfer::new(
            id.clone(),
            start.file_name,
            start.file_size,
            chunk_size,
            derived,
            key,
            start.checksum,
            peer_id,
            Direction::Incoming,
        );
        transfer.transition_to(TransferStatus::Transferring)?;
        let snapshot = transfer.clone();

        let mut entry = TransferEntry::incoming(transfer);
        entry.estimator = Some(ProgressEstimator::start());
        self.registry.insert(entry)?;

        info!(
            transfer_id = %id,
            peer = %peer_id,
            file = %snapshot.file_name,
            size = snapshot.file_size,
            chunks = snapshot.total_chunks,
            "incoming transfer started"
        );
        self.observer.on_progress(&snapshot);
        Ok(snapshot)
    }

    /// Decrypts, verifies and buffers one chunk; reassembles the file once
    /// the chunk flagged last has arrived.
    ///
    /// Decryption, checksum, bounds and reassembly failures fail only this
    /// transfer. A chunk that resolves to no transfer is reported through
    /// [`TransferObserver::on_orphan_chunk`] and returned as
    /// [`TransferError::UnknownTransfer`].
    pub async fn handle_chunk(
        &self,
        peer_id: &str,
        chunk: FileChunk,
    ) -> Result<ChunkOutcome, TransferError> {
        let id = chunk.transfer_id.clone();
        let index = chunk.chunk_index;
        self.resolve(peer_id, &id)?;

        let lookup = self
            .registry
            .update(&id, |entry| {
                let Role::Incoming(incoming) = &entry.role else {
                    return Lookup::Done(ChunkOutcome::Ignored);
                };
                let t = &entry.transfer;
                if t.status.is_terminal() || incoming.finalizing {
                    Lookup::Done(ChunkOutcome::Ignored)
                } else if index >= t.total_chunks {
                    Lookup::OutOfRange(t.total_chunks)
                } else if incoming.buffer.contains(index) {
                    Lookup::Done(ChunkOutcome::Duplicate)
                } else {
                    Lookup::Open {
                        key: t.encryption_key.clone(),
                        total_chunks: t.total_chunks,
                    }
                }
            })
            .unwrap_or(Lookup::Done(ChunkOutcome::Ignored));

        let (key, total_chunks) = match lookup {
            Lookup::Open { key, total_chunks } => (key, total_chunks),
            Lookup::Done(outcome) => {
                debug!(transfer_id = %id, index, outcome = ?outcome, "chunk not stored");
                return Ok(outcome);
            }
            Lookup::OutOfRange(total) => {
                return Err(self.abort(
                    &id,
                    TransferError::Protocol(format!("chunk index {index} out of range 0..{total}")),
                ));
            }
        };

        let plaintext = match crypto::decrypt(&chunk.encrypted_data, &key, &chunk.iv) {
            Ok(data) => data,
            Err(e) => return Err(self.abort(&id, e.into())),
        };
        if !crypto::verify_checksum(&plaintext, &chunk.checksum) {
            return Err(self.abort(
                &id,
                TransferError::ChecksumMismatch(format!("chunk {index} of {id}")),
            ));
        }

        let len = plaintext.len() as u64;
        let is_last = chunk.is_last_chunk;
        let stored = self
            .registry
            .update(&id, |entry| {
                if entry.transfer.status.is_terminal() {
                    return Stored::Done(ChunkOutcome::Ignored);
                }
                let Role::Incoming(incoming) = &mut entry.role else {
                    return Stored::Done(ChunkOutcome::Ignored);
                };
                if incoming.finalizing {
                    return Stored::Done(ChunkOutcome::Ignored);
                }
                if !incoming.buffer.insert(index, plaintext) {
                    return Stored::Done(ChunkOutcome::Duplicate);
                }
                incoming.last_chunk_seen |= is_last;
                let received = buffered_count(&incoming.buffer);
                let finalize = incoming.last_chunk_seen
                    && entry.transfer.status == TransferStatus::Transferring;
                incoming.finalizing = finalize;
                let buffer = finalize.then(|| std::mem::take(&mut incoming.buffer));

                entry.transfer.bytes_transferred += len;
                entry.refresh_progress(received);
                match buffer {
                    Some(buffer) => Stored::Finalize(entry.transfer.clone(), buffer),
                    None if entry.transfer.status == TransferStatus::Transferring => {
                        Stored::Progress(entry.transfer.clone())
                    }
                    None => Stored::Done(ChunkOutcome::Buffered),
                }
            })
            .unwrap_or(Stored::Done(ChunkOutcome::Ignored));

        debug!(transfer_id = %id, index, bytes = len, last = is_last, "chunk received");
        match stored {
            Stored::Done(outcome) => Ok(outcome),
            Stored::Progress(snapshot) => {
                self.observer.on_progress(&snapshot);
                Ok(ChunkOutcome::Buffered)
            }
            Stored::Finalize(snapshot, buffer) => {
                self.observer.on_progress(&snapshot);
                self.finalize(&id, snapshot, buffer, total_chunks).await
            }
        }
    }

    /// `transferring -> paused`. Chunks keep being buffered; progress and
    /// reassembly wait for [`resume`](Self::resume).
    ///
    /// Refused while the reassembled file is being handed to the sink.
    pub fn pause(&self, id: &str) -> Result<Transfer, TransferError> {
        self.registry.pause(id)
    }

    /// `paused -> transferring`. Runs a reassembly deferred by the pause.
    pub async fn resume(&self, id: &str) -> Result<ChunkOutcome, TransferError> {
        let deferred = self
            .registry
            .update(id, |entry| -> Result<Option<(Transfer, ChunkBuffer)>, TransferError> {
                entry
                    .transfer
                    .transition_from(TransferStatus::Paused, TransferStatus::Transferring)?;
                let Role::Incoming(incoming) = &mut entry.role else {
                    return Ok(None);
                };
                let received = buffered_count(&incoming.buffer);
                incoming.finalizing = incoming.last_chunk_seen;
                let buffer = incoming
                    .last_chunk_seen
                    .then(|| std::mem::take(&mut incoming.buffer));
                entry.refresh_progress(received);
                Ok(buffer.map(|b| (entry.transfer.clone(), b)))
            })
            .ok_or_else(|| TransferError::NotFound(id.to_string()))??;

        info!(transfer_id = %id, "incoming transfer resumed");
        match deferred {
            Some((snapshot, buffer)) => {
                let total_chunks = snapshot.total_chunks;
                self.finalize(id, snapshot, buffer, total_chunks).await
            }
            None => Ok(ChunkOutcome::Buffered),
        }
    }

    /// Cancels transfer `id` and drops its buffer.
    pub fn cancel(&self, id: &str) -> Result<Transfer, TransferError> {
        self.registry.cancel(id)
    }

    /// Makes sure `id` names an incoming transfer from `peer_id`, applying
    /// the orphan policy when it does not.
    fn resolve(&self, peer_id: &str, id: &str) -> Result<(), TransferError> {
        if self.is_bound(id, peer_id) {
            return Ok(());
        }
        if self.orphan_policy == OrphanPolicy::AdoptSingleCandidate {
            if let Some(old_id) = self.registry.adopt_orphan(id, peer_id) {
                warn!(transfer_id = %id, previous_id = %old_id, peer = %peer_id, "adopted orphan chunk");
                return Ok(());
            }
        }
        warn!(transfer_id = %id, peer = %peer_id, "dropping orphan chunk");
        self.observer.on_orphan_chunk(peer_id, id);
        Err(TransferError::UnknownTransfer(id.to_string()))
    }

    fn is_bound(&self, id: &str, peer_id: &str) -> bool {
        self.registry
            .get(id)
            .is_some_and(|t| t.direction == Direction::Incoming && t.peer_id == peer_id)
    }

    async fn finalize(
        &self,
        id: &str,
        snapshot: Transfer,
        buffer: ChunkBuffer,
        total_chunks: u32,
    ) -> Result<ChunkOutcome, TransferError> {
        let data = match buffer.assemble(total_chunks) {
            Ok(data) => data,
            Err(e) => return Err(self.abort(id, e)),
        };
        if !crypto::verify_checksum(&data, &snapshot.checksum) {
            return Err(self.abort(
                id,
                TransferError::ChecksumMismatch(format!("reassembled file of {id}")),
            ));
        }
        let size = data.len();
        if let Err(e) = self.sink.materialize(&snapshot.file_name, data).await {
            return Err(self.abort(id, e));
        }

        let completed = self
            .registry
            .update(id, |entry| {
                entry
                    .transfer
                    .transition_to(TransferStatus::Completed)
                    .ok()
                    .map(|()| entry.transfer.clone())
            })
            .flatten();
        let Some(completed) = completed else {
            warn!(transfer_id = %id, "transfer left the registry during reassembly");
            return Ok(ChunkOutcome::Ignored);
        };
        self.registry.remove(id);
        info!(transfer_id = %id, file = %completed.file_name, bytes = size, "transfer received");
        self.observer.on_complete(&completed);
        Ok(ChunkOutcome::Completed)
    }

    /// Fails transfer `id` with `err` and notifies the observer.
    fn abort(&self, id: &str, err: TransferError) -> TransferError {
        warn!(transfer_id = %id, error = %err, "incoming transfer failed");
        if let Some(snapshot) = self.registry.fail(id, &err.to_string()) {
            self.observer.on_error(&snapshot, &err.to_string());
        }
        err
    }
}

fn buffered_count(buffer: &ChunkBuffer) -> u32 {
    u32::try_from(buffer.len()).unwrap_or(u32::MAX)
}

//! Streams a local file to a peer as encrypted `file-chunk` messages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;
use veildrop_protocol::{FileChunk, TransferStart, WireMessage};

use crate::TransferError;
use crate::channel::PeerChannel;
use crate::chunked::{ChunkReader, chunk_count};
use crate::config::TransferConfig;
use crate::crypto::{self, TransferKey};
use crate::events::TransferObserver;
use crate::progress::ProgressEstimator;
use crate::registry::{Role, TransferEntry, TransferRegistry};
use crate::types::{Direction, Transfer, TransferStatus};

/// How a call to [`SenderPipeline::send_chunks`] or
/// [`SenderPipeline::resume`] ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every chunk was accepted by the channel.
    Completed,
    /// The loop observed a pause and exited; resume re-enters it.
    Paused,
    /// The transfer was cancelled while the loop ran.
    Cancelled,
    /// Resume only flipped the status; a loop that had not yet seen the
    /// pause is still running.
    AlreadyRunning,
}

/// What the loop should do next, decided under the entry lock.
enum Step {
    Send(u32),
    Finished(Transfer),
    Stop(SendOutcome),
}

/// Everything the loop needs that does not change while it runs.
struct LoopContext {
    source: PathBuf,
    peer_id: String,
    key: TransferKey,
    chunk_size: u32,
    file_size: u64,
    total_chunks: u32,
}

/// Sender half of the transfer protocol.
pub struct SenderPipeline {
    registry: Arc<TransferRegistry>,
    channel: Arc<dyn PeerChannel>,
    observer: Arc<dyn TransferObserver>,
    chunk_size: u32,
}

impl SenderPipeline {
    pub fn new(
        registry: Arc<TransferRegistry>,
        channel: Arc<dyn PeerChannel>,
        observer: Arc<dyn TransferObserver>,
        config: &TransferConfig,
    ) -> Self {
        Self {
            registry,
            channel,
            observer,
            chunk_size: config.chunk_size,
        }
    }

    /// Registers a `pending` outgoing transfer of `path` to `peer_id`.
    ///
    /// Hashes the whole file and generates a fresh key before returning the
    /// new transfer id. Nothing is sent yet.
    pub async fn start_transfer(&self, path: &Path, peer_id: &str) -> Result<String, TransferError> {
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransferError::InvalidPath(path.display().to_string()))?
            .to_string();
        let file_size = metadata.len();
        let total_chunks = chunk_count(file_size, self.chunk_size)?;
        let checksum = crypto::calculate_file_checksum(path).await?;

        let id = Uuid::new_v4().to_string();
        let transfer = Transfer::new(
            id.clone(),
            file_name.clone(),
            file_size,
            self.chunk_size,
            total_chunks,
            TransferKey::generate(),
            checksum,
            peer_id,
            Direction::Outgoing,
        );
        self.registry
            .insert(TransferEntry::outgoing(transfer, path.to_path_buf()))?;

        info!(
            transfer_id = %id,
            peer = %peer_id,
            file = %file_name,
            size = file_size,
            chunks = total_chunks,
            "transfer registered"
        );
        Ok(id)
    }

    /// Announces transfer `id` with `transfer-start` and streams its chunks.
    ///
    /// Valid only from `pending`. Returns once every chunk was sent, or the
    /// transfer was paused or cancelled. A rejected send fails the transfer.
    pub async fn send_chunks(&self, id: &str) -> Result<SendOutcome, TransferError> {
        let (start, peer_id) = self
            .registry
            .update(id, |entry| -> Result<(TransferStart, String), TransferError> {
                let Role::Outgoing(outgoing) = &mut entry.role else {
                    return Err(not_outgoing(id));
                };
                entry
                    .transfer
                    .transition_from(TransferStatus::Pending, TransferStatus::Transferring)?;
                outgoing.loop_active = true;
                entry.estimator = Some(ProgressEstimator::start());

                let t = &entry.transfer;
                let start = TransferStart {
                    transfer_id: t.id.clone(),
                    file_name: t.file_name.clone(),
                    file_size: t.file_size,
                    total_chunks: t.total_chunks,
                    chunk_size: Some(t.chunk_size),
                    encryption_key: t.encryption_key.export(),
                    checksum: t.checksum.clone(),
                };
                Ok((start, t.peer_id.clone()))
            })
            .ok_or_else(|| TransferError::NotFound(id.to_string()))??;

        info!(transfer_id = %id, peer = %peer_id, "sending transfer-start");
        if !self.channel.send(&peer_id, &start.into()).await {
            return Err(self.abort(
                id,
                TransferError::SendFailure(format!("transfer-start for {id}")),
            ));
        }

        self.run_loop(id).await
    }

    /// `transferring -> paused`. The loop stops before its next chunk.
    pub fn pause(&self, id: &str) -> Result<Transfer, TransferError> {
        self.registry.pause(id)
    }

    /// `paused -> transferring`, then re-enters the send loop at the first
    /// unsent chunk.
    ///
    /// If the previous loop is still alive (it had not reached its pause
    /// check yet) only the status flips and [`SendOutcome::AlreadyRunning`]
    /// is returned.
    pub async fn resume(&self, id: &str) -> Result<SendOutcome, TransferError> {
        let relaunch = self
            .registry
            .update(id, |entry| -> Result<bool, TransferError> {
                let Role::Outgoing(outgoing) = &mut entry.role else {
                    return Err(not_outgoing(id));
                };
                entry
                    .transfer
                    .transition_from(TransferStatus::Paused, TransferStatus::Transferring)?;
                if outgoing.loop_active {
                    return Ok(false);
                }
                outgoing.loop_active = true;
                Ok(true)
            })
            .ok_or_else(|| TransferError::NotFound(id.to_string()))??;

        if !relaunch {
            debug!(transfer_id = %id, "send loop still running");
            return Ok(SendOutcome::AlreadyRunning);
        }
        info!(transfer_id = %id, "resuming send loop");
        self.run_loop(id).await
    }

    /// Cancels transfer `id`; the loop notices before its next chunk.
    pub fn cancel(&self, id: &str) -> Result<Transfer, TransferError> {
        self.registry.cancel(id)
    }

    async fn run_loop(&self, id: &str) -> Result<SendOutcome, TransferError> {
        let Some(ctx) = self.registry.update(id, |entry| {
            let Role::Outgoing(outgoing) = &entry.role else {
                return None;
            };
            let t = &entry.transfer;
            Some(LoopContext {
                source: outgoing.source.clone(),
                peer_id: t.peer_id.clone(),
                key: t.encryption_key.clone(),
                chunk_size: t.chunk_size,
                file_size: t.file_size,
                total_chunks: t.total_chunks,
            })
        }) else {
            return Ok(SendOutcome::Cancelled);
        };
        let ctx = ctx.ok_or_else(|| not_outgoing(id))?;

        let mut reader = match ChunkReader::new(&ctx.source, ctx.chunk_size).await {
            Ok(reader) => reader,
            Err(e) => return Err(self.abort(id, e)),
        };
        if reader.file_size() != ctx.file_size {
            return Err(self.abort(
                id,
                TransferError::Protocol(format!(
                    "{} changed size from {} to {} bytes",
                    ctx.source.display(),
                    ctx.file_size,
                    reader.file_size()
                )),
            ));
        }

        loop {
            let step = self
                .registry
                .update(id, |entry| next_step(entry, ctx.total_chunks))
                .unwrap_or(Step::Stop(SendOutcome::Cancelled));

            let index = match step {
                Step::Send(index) => index,
                Step::Finished(snapshot) => {
                    self.registry.remove(id);
                    info!(transfer_id = %id, bytes = snapshot.bytes_transferred, "transfer sent");
                    self.observer.on_complete(&snapshot);
                    return Ok(SendOutcome::Completed);
                }
                Step::Stop(outcome) => {
                    info!(transfer_id = %id, outcome = ?outcome, "send loop stopped");
                    return Ok(outcome);
                }
            };

            let plaintext = match reader.read_chunk(index).await {
                Ok(data) => data,
                Err(e) => return Err(self.abort(id, e)),
            };
            let checksum = crypto::checksum_bytes(&plaintext);
            let (encrypted_data, iv) = match crypto::encrypt(&plaintext, &ctx.key) {
                Ok(sealed) => sealed,
                Err(e) => return Err(self.abort(id, e.into())),
            };
            let is_last_chunk = index + 1 == ctx.total_chunks;
            let message = WireMessage::from(FileChunk {
                transfer_id: id.to_string(),
                chunk_index: index,
                encrypted_data,
                iv,
                checksum,
                is_last_chunk,
            });

            if !self.channel.send(&ctx.peer_id, &message).await {
                return Err(self.abort(
                    id,
                    TransferError::SendFailure(format!("chunk {index} of {id}")),
                ));
            }
            debug!(transfer_id = %id, index, bytes = plaintext.len(), last = is_last_chunk, "chunk sent");

            let sent = plaintext.len() as u64;
            let progressed = self.registry.update(id, |entry| {
                if let Role::Outgoing(outgoing) = &mut entry.role {
                    outgoing.next_index = index + 1;
                }
                entry.transfer.bytes_transferred += sent;
                entry.refresh_progress(index + 1);
                (entry.transfer.status == TransferStatus::Transferring)
                    .then(|| entry.transfer.clone())
            });
            match progressed {
                Some(Some(snapshot)) => self.observer.on_progress(&snapshot),
                Some(None) => {}
                None => {
                    info!(transfer_id = %id, "transfer cancelled mid-send");
                    return Ok(SendOutcome::Cancelled);
                }
            }
        }
    }

    /// Fails transfer `id` with `err` and notifies the observer.
    fn abort(&self, id: &str, err: TransferError) -> TransferError {
        warn!(transfer_id = %id, error = %err, "outgoing transfer failed");
        if let Some(snapshot) = self.registry.fail(id, &err.to_string()) {
            self.observer.on_error(&snapshot, &err.to_string());
        }
        err
    }
}

/// Decides the loop's next move under the entry lock.
///
/// Once every chunk is out the transfer completes, even if a pause landed
/// while the last send was in flight.
fn next_step(entry: &mut TransferEntry, total_chunks: u32) -> Step {
    let Role::Outgoing(outgoing) = &mut entry.role else {
        return Step::Stop(SendOutcome::Cancelled);
    };
    let all_sent = outgoing.next_index >= total_chunks;
    match entry.transfer.status {
        TransferStatus::Transferring => {}
        TransferStatus::Paused if all_sent => {
            if entry.transfer.transition_to(TransferStatus::Transferring).is_err() {
                outgoing.loop_active = false;
                return Step::Stop(SendOutcome::Cancelled);
            }
        }
        TransferStatus::Paused => {
            outgoing.loop_active = false;
            return Step::Stop(SendOutcome::Paused);
        }
        _ => {
            outgoing.loop_active = false;
            return Step::Stop(SendOutcome::Cancelled);
        }
    }
    if !all_sent {
        return Step::Send(outgoing.next_index);
    }
    outgoing.loop_active = false;
    match entry.transfer.transition_to(TransferStatus::Completed) {
        Ok(()) => Step::Finished(entry.transfer.clone()),
        Err(_) => Step::Stop(SendOutcome::Cancelled),
    }
}

fn not_outgoing(id: &str) -> TransferError {
    TransferError::Protocol(format!("{id} is not an outgoing transfer"))
}

//! The single owner of every live [`Transfer`].
//!
//! Each transfer sits behind its own mutex so unrelated transfers never
//! contend; the outer map lock is only held to find, insert, re-key or remove
//! entries. Lock order is always map, then entry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info};

use crate::TransferError;
use crate::chunked::ChunkBuffer;
use crate::progress::ProgressEstimator;
use crate::types::{Transfer, TransferStatus};

/// Reason recorded on a transfer removed by [`TransferRegistry::cancel`].
pub(crate) const CANCELLED: &str = "cancelled";

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Sender-side bookkeeping.
#[derive(Debug)]
pub(crate) struct Outgoing {
    pub(crate) source: PathBuf,
    /// Next chunk index the send loop will emit.
    pub(crate) next_index: u32,
    /// Set while a send loop owns this transfer.
    pub(crate) loop_active: bool,
}

/// Receiver-side bookkeeping.
#[derive(Debug, Default)]
pub(crate) struct Incoming {
    pub(crate) buffer: ChunkBuffer,
    /// The chunk flagged `isLastChunk` has been buffered.
    pub(crate) last_chunk_seen: bool,
    /// The buffer was handed to reassembly; the sink write is in flight.
    pub(crate) finalizing: bool,
}

#[derive(Debug)]
pub(crate) enum Role {
    Outgoing(Outgoing),
    Incoming(Incoming),
}

/// A transfer plus the pipeline state that lives and dies with it.
#[derive(Debug)]
pub(crate) struct TransferEntry {
    pub(crate) transfer: Transfer,
    pub(crate) estimator: Option<ProgressEstimator>,
    pub(crate) role: Role,
}

impl TransferEntry {
    pub(crate) fn outgoing(transfer: Transfer, source: PathBuf) -> Self {
        Self {
            transfer,
            estimator: None,
            role: Role::Outgoing(Outgoing {
                source,
                next_index: 0,
                loop_active: false,
            }),
        }
    }

    pub(crate) fn incoming(transfer: Transfer) -> Self {
        Self {
            transfer,
            estimator: None,
            role: Role::Incoming(Incoming::default()),
        }
    }

    /// Recomputes progress from `done_chunks`, never moving backwards, and
    /// refreshes speed and ETA. No-op unless transferring.
    pub(crate) fn refresh_progress(&mut self, done_chunks: u32) {
        if self.transfer.status != TransferStatus::Transferring {
            return;
        }
        let percent = ProgressEstimator::percent(done_chunks, self.transfer.total_chunks);
        self.transfer.progress = self.transfer.progress.max(percent);
        let bytes = self.transfer.bytes_transferred;
        self.transfer.speed = self.estimator.map(|e| e.speed(bytes)).unwrap_or(0.0);
        self.transfer.eta_seconds = self
            .estimator
            .and_then(|e| e.remaining(bytes, self.transfer.file_size))
            .map(|d| d.as_secs_f64());
    }

    /// Returns `true` while reassembly owns the buffer.
    pub(crate) fn is_finalizing(&self) -> bool {
        matches!(&self.role, Role::Incoming(incoming) if incoming.finalizing)
    }

    fn is_adoption_candidate(&self, peer_id: &str) -> bool {
        match &self.role {
            Role::Incoming(incoming) => {
                self.transfer.status == TransferStatus::Transferring
                    && self.transfer.peer_id == peer_id
                    && incoming.buffer.is_empty()
                    && !incoming.last_chunk_seen
                    && !incoming.finalizing
            }
            Role::Outgoing(_) => false,
        }
    }

    fn release(&mut self) {
        match &mut self.role {
            Role::Incoming(incoming) => *incoming = Incoming::default(),
            Role::Outgoing(outgoing) => outgoing.loop_active = false,
        }
    }
}

fn lock(entry: &Mutex<TransferEntry>) -> MutexGuard<'_, TransferEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// TransferRegistry
// ---------------------------------------------------------------------------

/// Maps transfer ids to their state; the sole authority for lifecycle changes.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    transfers: RwLock<HashMap<String, Arc<Mutex<TransferEntry>>>>,
}

impl TransferRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of transfer `id`.
    pub fn get(&self, id: &str) -> Option<Transfer> {
        self.entry(id).map(|e| lock(&e).transfer.clone())
    }

    /// Returns `true` if `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// Snapshots of every registered transfer, ordered by id.
    pub fn list(&self) -> Vec<Transfer> {
        let mut out: Vec<Transfer> = self
            .read()
            .values()
            .map(|e| lock(e).transfer.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Snapshots of every transfer bound to `peer_id`.
    pub fn list_for_peer(&self, peer_id: &str) -> Vec<Transfer> {
        self.list()
            .into_iter()
            .filter(|t| t.peer_id == peer_id)
            .collect()
    }

    /// Number of registered transfers.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if no transfer is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// `transferring -> paused`.
    ///
    /// Refused once an incoming transfer has started writing its output.
    pub fn pause(&self, id: &str) -> Result<Transfer, TransferError> {
        self.transition(id, TransferStatus::Transferring, TransferStatus::Paused)
    }

    /// `paused -> transferring`, status only.
    ///
    /// This does not restart a sender loop that already exited; use
    /// [`SenderPipeline::resume`](crate::SenderPipeline::resume) for that.
    pub fn resume(&self, id: &str) -> Result<Transfer, TransferError> {
        self.transition(id, TransferStatus::Paused, TransferStatus::Transferring)
    }

    /// Marks the transfer failed and removes it together with its buffer.
    ///
    /// Accepted from any non-terminal state, and from `failed` (which then
    /// behaves like [`dismiss`](Self::dismiss)). Returns the final snapshot.
    pub fn cancel(&self, id: &str) -> Result<Transfer, TransferError> {
        let mut map = self.write();
        let entry = map
            .get(id)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(id.to_string()))?;
        let snapshot = {
            let mut guard = lock(&entry);
            match guard.transfer.status {
                TransferStatus::Completed => {
                    return Err(TransferError::InvalidTransition {
                        id: id.to_string(),
                        from: TransferStatus::Completed,
                        to: TransferStatus::Failed,
                    });
                }
                TransferStatus::Failed => {}
                _ => {
                    guard.transfer.transition_to(TransferStatus::Failed)?;
                    guard.transfer.error = Some(CANCELLED.to_string());
                }
            }
            guard.release();
            guard.transfer.clone()
        };
        map.remove(id);
        info!(transfer_id = %id, "transfer cancelled");
        Ok(snapshot)
    }

    /// Removes a terminal transfer. Active transfers are left alone.
    pub fn dismiss(&self, id: &str) -> Result<Transfer, TransferError> {
        let mut map = self.write();
        let entry = map
            .get(id)
            .cloned()
            .ok_or_else(|| TransferError::NotFound(id.to_string()))?;
        let snapshot = lock(&entry).transfer.clone();
        if !snapshot.status.is_terminal() {
            return Err(TransferError::StillActive(id.to_string()));
        }
        map.remove(id);
        debug!(transfer_id = %id, "transfer dismissed");
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Pipeline-facing operations
    // -----------------------------------------------------------------------

    pub(crate) fn insert(&self, entry: TransferEntry) -> Result<(), TransferError> {
        let id = entry.transfer.id.clone();
        let mut map = self.write();
        if map.contains_key(&id) {
            return Err(TransferError::DuplicateTransfer(id));
        }
        map.insert(id, Arc::new(Mutex::new(entry)));
        Ok(())
    }

    pub(crate) fn entry(&self, id: &str) -> Option<Arc<Mutex<TransferEntry>>> {
        self.read().get(id).cloned()
    }

    /// Runs `f` with the entry locked. `None` if `id` is not registered.
    pub(crate) fn update<R>(&self, id: &str, f: impl FnOnce(&mut TransferEntry) -> R) -> Option<R> {
        let entry = self.entry(id)?;
        let mut guard = lock(&entry);
        Some(f(&mut guard))
    }

    /// Moves a live transfer to `failed` with `reason`, dropping any buffered
    /// chunks. The entry stays registered until dismissed or cancelled.
    ///
    /// Returns `None` if the transfer is gone or already terminal.
    pub(crate) fn fail(&self, id: &str, reason: &str) -> Option<Transfer> {
        self.update(id, |entry| {
            if entry.transfer.status.is_terminal() {
                return None;
            }
            entry.transfer.transition_to(TransferStatus::Failed).ok()?;
            entry.transfer.error = Some(reason.to_string());
            entry.release();
            Some(entry.transfer.clone())
        })
        .flatten()
    }

    pub(crate) fn remove(&self, id: &str) -> Option<Transfer> {
        let entry = self.write().remove(id)?;
        let snapshot = lock(&entry).transfer.clone();
        Some(snapshot)
    }

    /// Re-keys the single incoming, transferring, still-empty transfer from
    /// `peer_id` under `new_id`.
    ///
    /// Does nothing unless exactly one candidate exists. Returns the old id.
    pub(crate) fn adopt_orphan(&self, new_id: &str, peer_id: &str) -> Option<String> {
        let mut map = self.write();
        if map.contains_key(new_id) {
            return None;
        }
        let mut candidates = map
            .iter()
            .filter(|(_, e)| lock(e).is_adoption_candidate(peer_id))
            .map(|(id, _)| id.clone());
        let old_id = candidates.next()?;
        if candidates.next().is_some() {
            return None;
        }
        drop(candidates);

        let entry = map.remove(&old_id)?;
        lock(&entry).transfer.id = new_id.to_string();
        map.insert(new_id.to_string(), entry);
        Some(old_id)
    }

    fn transition(
        &self,
        id: &str,
        from: TransferStatus,
        to: TransferStatus,
    ) -> Result<Transfer, TransferError> {
        let snapshot = self
            .update(id, |entry| -> Result<Transfer, TransferError> {
                if entry.is_finalizing() {
                    return Err(TransferError::InvalidTransition {
                        id: id.to_string(),
                        from: entry.transfer.status,
                        to,
                    });
                }
                entry.transfer.transition_from(from, to)?;
                Ok(entry.transfer.clone())
            })
            .ok_or_else(|| TransferError::NotFound(id.to_string()))??;
        info!(transfer_id = %id, status = %to, "transfer status changed");
        Ok(snapshot)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Mutex<TransferEntry>>>> {
        self.transfers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Mutex<TransferEntry>>>> {
        self.transfers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TransferKey;
    use crate::types::Direction;

    fn transfer(id: &str, peer: &str, direction: Direction) -> Transfer {
        Transfer::new(id, "f.bin", 10, 4, 3, TransferKey::generate(), "", peer, direction)
    }

    fn incoming_transferring(id: &str, peer: &str) -> TransferEntry {
        let mut t = transfer(id, peer, Direction::Incoming);
        t.transition_to(TransferStatus::Transferring).unwrap();
        TransferEntry::incoming(t)
    }

    #[test]
    fn insert_rejects_duplicate_id() {
        let reg = TransferRegistry::new();
        reg.insert(incoming_transferring("t1", "p")).unwrap();
        let err = reg.insert(incoming_transferring("t1", "p")).unwrap_err();
        assert!(matches!(err, TransferError::DuplicateTransfer(id) if id == "t1"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn pause_resume_cycle() {
        let reg = TransferRegistry::new();
        reg.insert(incoming_transferring("t1", "p")).unwrap();

        assert_eq!(reg.pause("t1").unwrap().status, TransferStatus::Paused);
        // Pausing twice is not allowed.
        assert!(matches!(
            reg.pause("t1"),
            Err(TransferError::InvalidTransition { .. })
        ));
        assert_eq!(reg.resume("t1").unwrap().status, TransferStatus::Transferring);
        assert!(reg.resume("t1").is_err());
        assert!(matches!(reg.pause("nope"), Err(TransferError::NotFound(_))));
    }

    #[test]
    fn pause_not_allowed_from_pending() {
        let reg = TransferRegistry::new();
        reg.insert(TransferEntry::outgoing(
            transfer("t1", "p", Direction::Outgoing),
            PathBuf::from("/tmp/x"),
        ))
        .unwrap();
        assert!(reg.pause("t1").is_err());
    }

    #[test]
    fn cancel_removes_entry_and_buffer() {
        let reg = TransferRegistry::new();
        reg.insert(incoming_transferring("t1", "p")).unwrap();
        reg.update("t1", |e| {
            if let Role::Incoming(inc) = &mut e.role {
                inc.buffer.insert(0, vec![1, 2, 3]);
            }
        });

        let snapshot = reg.cancel("t1").unwrap();
        assert_eq!(snapshot.status, TransferStatus::Failed);
        assert_eq!(snapshot.error.as_deref(), Some(CANCELLED));
        assert!(!reg.contains("t1"));
        assert!(matches!(reg.cancel("t1"), Err(TransferError::NotFound(_))));
    }

    #[test]
    fn cancel_from_paused_and_pending() {
        let reg = TransferRegistry::new();
        reg.insert(incoming_transferring("a", "p")).unwrap();
        reg.pause("a").unwrap();
        assert!(reg.cancel("a").is_ok());

        reg.insert(TransferEntry::outgoing(
            transfer("b", "p", Direction::Outgoing),
            PathBuf::from("/tmp/x"),
        ))
        .unwrap();
        assert!(reg.cancel("b").is_ok());
        assert!(reg.is_empty());
    }

    #[test]
    fn fail_keeps_entry_until_dismissed() {
        let reg = TransferRegistry::new();
        reg.insert(incoming_transferring("t1", "p")).unwrap();
        reg.insert(incoming_transferring("t2", "p")).unwrap();

        let failed = reg.fail("t1", "boom").unwrap();
        assert_eq!(failed.status, TransferStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        // Second failure is a no-op.
        assert!(reg.fail("t1", "again").is_none());

        // Other transfers are untouched.
        assert_eq!(reg.get("t2").unwrap().status, TransferStatus::Transferring);

        assert!(matches!(reg.dismiss("t2"), Err(TransferError::StillActive(_))));
        assert_eq!(reg.dismiss("t1").unwrap().id, "t1");
        assert!(!reg.contains("t1"));
    }

    #[test]
    fn list_for_peer_filters() {
        let reg = TransferRegistry::new();
        reg.insert(incoming_transferring("b", "alice")).unwrap();
        reg.insert(incoming_transferring("a", "alice")).unwrap();
        reg.insert(incoming_transferring("c", "bob")).unwrap();

        let ids: Vec<_> = reg.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(reg.list_for_peer("alice").len(), 2);
        assert_eq!(reg.list_for_peer("carol").len(), 0);
    }

    #[test]
    fn adopt_single_candidate() {
        let reg = TransferRegistry::new();
        reg.insert(incoming_transferring("local-id", "alice")).unwrap();

        assert_eq!(
            reg.adopt_orphan("remote-id", "alice").as_deref(),
            Some("local-id")
        );
        assert!(!reg.contains("local-id"));
        assert_eq!(reg.get("remote-id").unwrap().id, "remote-id");
    }

    #[test]
    fn adopt_refuses_ambiguity_and_busy_transfers() {
        let reg = TransferRegistry::new();
        reg.insert(incoming_transferring("x", "alice")).unwrap();
        reg.insert(incoming_transferring("y", "alice")).unwrap();
        assert!(reg.adopt_orphan("z", "alice").is_none());

        let reg = TransferRegistry::new();
        reg.insert(incoming_transferring("x", "alice")).unwrap();
        reg.update("x", |e| {
            if let Role::Incoming(inc) = &mut e.role {
                inc.buffer.insert(0, vec![0]);
            }
        });
        assert!(reg.adopt_orphan("z", "alice").is_none());
        // Wrong peer.
        let reg = TransferRegistry::new();
        reg.insert(incoming_transferring("x", "alice")).unwrap();
        assert!(reg.adopt_orphan("z", "mallory").is_none());
    }

    #[test]
    fn refresh_progress_is_monotonic_and_frozen_when_paused() {
        let mut entry = incoming_transferring("t", "p");
        entry.estimator = Some(ProgressEstimator::start());
        entry.refresh_progress(2);
        let at_two = entry.transfer.progress;
        assert!(at_two > 0.0);

        entry.refresh_progress(1);
        assert_eq!(entry.transfer.progress, at_two);

        entry.transfer.transition_to(TransferStatus::Paused).unwrap();
        entry.refresh_progress(3);
        assert_eq!(entry.transfer.progress, at_two);
        assert!(entry.transfer.speed >= 0.0);
    }

    #[test]
    fn refresh_progress_estimates_eta() {
        let mut entry = incoming_transferring("t", "p");
        entry.estimator = Some(ProgressEstimator::started_at(
            std::time::Instant::now() - std::time::Duration::from_millis(100),
        ));
        entry.refresh_progress(0);
        // Nothing moved yet.
        assert_eq!(entry.transfer.eta_seconds, None);

        entry.transfer.bytes_transferred = 4;
        entry.refresh_progress(1);
        let eta = entry.transfer.eta_seconds.unwrap();
        assert!(eta > 0.0);

        entry.transfer.bytes_transferred = 10;
        entry.refresh_progress(3);
        assert_eq!(entry.transfer.eta_seconds, Some(0.0));

        entry.transfer.transition_to(TransferStatus::Completed).unwrap();
        assert_eq!(entry.transfer.eta_seconds, Some(0.0));
    }
}

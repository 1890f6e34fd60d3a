//! Callbacks from the pipelines to whatever presents transfers.

use tokio::sync::mpsc;

use crate::types::Transfer;

/// Receives transfer lifecycle notifications.
///
/// Called synchronously from the pipelines, never while registry locks are
/// held. Implementations should return quickly.
pub trait TransferObserver: Send + Sync {
    /// Progress or speed changed, or an incoming transfer appeared.
    fn on_progress(&self, transfer: &Transfer);

    /// The transfer finished; for incoming transfers the output has already
    /// been handed to the sink.
    fn on_complete(&self, transfer: &Transfer);

    /// The transfer failed terminally.
    fn on_error(&self, transfer: &Transfer, reason: &str);

    /// A chunk arrived for a transfer id that could not be resolved.
    fn on_orphan_chunk(&self, peer_id: &str, transfer_id: &str) {
        let _ = (peer_id, transfer_id);
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {
    fn on_progress(&self, _transfer: &Transfer) {}
    fn on_complete(&self, _transfer: &Transfer) {}
    fn on_error(&self, _transfer: &Transfer, _reason: &str) {}
}

/// Observer notification as a value.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Progress(Transfer),
    Completed(Transfer),
    Failed { transfer: Transfer, reason: String },
    OrphanChunk { peer_id: String, transfer_id: String },
}

impl TransferEvent {
    /// Transfer id the event refers to.
    pub fn transfer_id(&self) -> &str {
        match self {
            TransferEvent::Progress(t) | TransferEvent::Completed(t) => &t.id,
            TransferEvent::Failed { transfer, .. } => &transfer.id,
            TransferEvent::OrphanChunk { transfer_id, .. } => transfer_id,
        }
    }
}

/// Observer that forwards every notification into an mpsc channel.
#[derive(Debug, Clone)]
pub struct EventForwarder {
    tx: mpsc::UnboundedSender<TransferEvent>,
}

impl EventForwarder {
    /// Creates a forwarder and the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: TransferEvent) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl TransferObserver for EventForwarder {
    fn on_progress(&self, transfer: &Transfer) {
        self.forward(TransferEvent::Progress(transfer.clone()));
    }

    fn on_complete(&self, transfer: &Transfer) {
        self.forward(TransferEvent::Completed(transfer.clone()));
    }

    fn on_error(&self, transfer: &Transfer, reason: &str) {
        self.forward(TransferEvent::Failed {
            transfer: transfer.clone(),
            reason: reason.to_string(),
        });
    }

    fn on_orphan_chunk(&self, peer_id: &str, transfer_id: &str) {
        self.forward(TransferEvent::OrphanChunk {
            peer_id: peer_id.to_string(),
            transfer_id: transfer_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TransferKey;
    use crate::types::Direction;

    fn sample(id: &str) -> Transfer {
        Transfer::new(id, "f.bin", 4, 4, 1, TransferKey::generate(), "", "p", Direction::Incoming)
    }

    #[test]
    fn forwarder_emits_in_order() {
        let (fwd, mut rx) = EventForwarder::channel();
        fwd.on_progress(&sample("a"));
        fwd.on_error(&sample("b"), "disk full");
        fwd.on_complete(&sample("c"));
        fwd.on_orphan_chunk("peer", "d");

        assert!(matches!(rx.try_recv().unwrap(), TransferEvent::Progress(t) if t.id == "a"));
        match rx.try_recv().unwrap() {
            TransferEvent::Failed { transfer, reason } => {
                assert_eq!(transfer.id, "b");
                assert_eq!(reason, "disk full");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(rx.try_recv().unwrap().transfer_id(), "c");
        assert_eq!(rx.try_recv().unwrap().transfer_id(), "d");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn forwarder_survives_dropped_receiver() {
        let (fwd, rx) = EventForwarder::channel();
        drop(rx);
        // Should not panic.
        fwd.on_complete(&sample("a"));
    }
}

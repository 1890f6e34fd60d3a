//! Boundary with the already-established peer message channel.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::warn;
use veildrop_protocol::WireMessage;

/// Outbound half of an ordered, reliable, message-oriented peer channel.
///
/// Connection setup, NAT traversal and transport encryption all live behind
/// this trait. `send` resolves to `true` iff the channel accepted the message
/// for transmission; that is not a delivery receipt.
pub trait PeerChannel: Send + Sync {
    fn send<'a>(
        &'a self,
        peer_id: &'a str,
        message: &'a WireMessage,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>>;
}

/// A text frame travelling through a [`LoopbackChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Peer that sent the frame.
    pub from: String,
    /// Peer the frame is addressed to.
    pub to: String,
    pub text: String,
}

/// In-process channel that JSON-encodes messages into an mpsc queue.
///
/// Whoever drains the queue plays the remote peer and feeds each frame to
/// its own [`TransferService::handle_inbound`](crate::TransferService::handle_inbound)
/// with `from` as the peer id.
#[derive(Debug, Clone)]
pub struct LoopbackChannel {
    local_id: String,
    tx: mpsc::UnboundedSender<InboundFrame>,
}

impl LoopbackChannel {
    /// Creates a channel for the local peer `local_id`.
    pub fn new(local_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<InboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                local_id: local_id.into(),
                tx,
            },
            rx,
        )
    }
}

impl PeerChannel for LoopbackChannel {
    fn send<'a>(
        &'a self,
        peer_id: &'a str,
        message: &'a WireMessage,
    ) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            let text = match message.encode() {
                Ok(t) => t,
                Err(e) => {
                    warn!(peer = %peer_id, error = %e, "failed to encode message");
                    return false;
                }
            };
            self.tx
                .send(InboundFrame {
                    from: self.local_id.clone(),
                    to: peer_id.to_string(),
                    text,
                })
                .is_ok()
        })
    }
}

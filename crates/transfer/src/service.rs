//! One explicitly constructed endpoint: a registry plus both pipelines.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;
use veildrop_protocol::WireMessage;

use crate::TransferError;
use crate::channel::PeerChannel;
use crate::config::TransferConfig;
use crate::events::TransferObserver;
use crate::receiver::{ChunkOutcome, ReceiverPipeline};
use crate::registry::TransferRegistry;
use crate::sender::{SendOutcome, SenderPipeline};
use crate::sink::OutputSink;
use crate::types::{Direction, Transfer};

/// Transfer endpoint for one local peer.
///
/// Outbound messages go through the injected [`PeerChannel`]; inbound text
/// frames are fed to [`handle_inbound`](Self::handle_inbound).
pub struct TransferService {
    config: TransferConfig,
    registry: Arc<TransferRegistry>,
    sender: SenderPipeline,
    receiver: ReceiverPipeline,
}

impl TransferService {
    /// Builds a service with a fresh registry.
    pub fn new(
        config: TransferConfig,
        channel: Arc<dyn PeerChannel>,
        observer: Arc<dyn TransferObserver>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, TransferError> {
        Self::with_registry(
            config,
            Arc::new(TransferRegistry::new()),
            channel,
            observer,
            sink,
        )
    }

    /// Builds a service around an existing registry.
    pub fn with_registry(
        config: TransferConfig,
        registry: Arc<TransferRegistry>,
        channel: Arc<dyn PeerChannel>,
        observer: Arc<dyn TransferObserver>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        let sender = SenderPipeline::new(registry.clone(), channel, observer.clone(), &config);
        let receiver = ReceiverPipeline::new(registry.clone(), observer, sink, &config);
        Ok(Self {
            config,
            registry,
            sender,
            receiver,
        })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TransferRegistry> {
        &self.registry
    }

    pub fn sender(&self) -> &SenderPipeline {
        &self.sender
    }

    pub fn receiver(&self) -> &ReceiverPipeline {
        &self.receiver
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Decodes a text frame from `peer_id` and routes it.
    ///
    /// Frames that are not one of the two transfer messages are logged and
    /// returned as [`TransferError::Wire`]; they never touch the registry.
    pub async fn handle_inbound(&self, peer_id: &str, text: &str) -> Result<(), TransferError> {
        let message = match WireMessage::decode(text) {
            Ok(m) => m,
            Err(e) => {
                warn!(peer = %peer_id, error = %e, "discarding inbound frame");
                return Err(e.into());
            }
        };
        self.handle_message(peer_id, message).await
    }

    /// Routes an already decoded message from `peer_id`.
    pub async fn handle_message(
        &self,
        peer_id: &str,
        message: WireMessage,
    ) -> Result<(), TransferError> {
        match message {
            WireMessage::TransferStart(start) => {
                self.receiver.handle_start(peer_id, start)?;
            }
            WireMessage::FileChunk(chunk) => {
                self.receiver.handle_chunk(peer_id, chunk).await?;
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Outbound and control
    // -----------------------------------------------------------------------

    /// See [`SenderPipeline::start_transfer`].
    pub async fn start_transfer(&self, path: &Path, peer_id: &str) -> Result<String, TransferError> {
        self.sender.start_transfer(path, peer_id).await
    }

    /// See [`SenderPipeline::send_chunks`].
    pub async fn send_chunks(&self, id: &str) -> Result<SendOutcome, TransferError> {
        self.sender.send_chunks(id).await
    }

    /// Registers `path` and streams it to `peer_id` in one call.
    pub async fn send_file(
        &self,
        path: &Path,
        peer_id: &str,
    ) -> Result<(String, SendOutcome), TransferError> {
        let id = self.start_transfer(path, peer_id).await?;
        let outcome = self.send_chunks(&id).await?;
        Ok((id, outcome))
    }

    pub fn pause(&self, id: &str) -> Result<Transfer, TransferError> {
        self.registry.pause(id)
    }

    /// Resumes a paused transfer in either direction.
    ///
    /// Outgoing transfers re-enter the send loop, so this returns once the
    /// loop stops again. Incoming transfers run any deferred reassembly.
    pub async fn resume(&self, id: &str) -> Result<(), TransferError> {
        let transfer = self
            .registry
            .get(id)
            .ok_or_else(|| TransferError::NotFound(id.to_string()))?;
        match transfer.direction {
            Direction::Outgoing => {
                self.sender.resume(id).await?;
            }
            Direction::Incoming => {
                let _: ChunkOutcome = self.receiver.resume(id).await?;
            }
        }
        Ok(())
    }

    pub fn cancel(&self, id: &str) -> Result<Transfer, TransferError> {
        self.registry.cancel(id)
    }

    pub fn dismiss(&self, id: &str) -> Result<Transfer, TransferError> {
        self.registry.dismiss(id)
    }

    pub fn get(&self, id: &str) -> Option<Transfer> {
        self.registry.get(id)
    }

    pub fn list(&self) -> Vec<Transfer> {
        self.registry.list()
    }

    pub fn list_for_peer(&self, peer_id: &str) -> Vec<Transfer> {
        self.registry.list_for_peer(peer_id)
    }
}

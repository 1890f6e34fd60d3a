//! Sends a file from one in-process endpoint to another over a loopback
//! channel and writes it into an output directory.
//!
//! Usage: `veildrop-loopback-demo <file> [config.json]`

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use veildrop_transfer::{
    DirectorySink, EventForwarder, InboundFrame, LoopbackChannel, MemorySink, NoopObserver,
    TransferConfig, TransferEvent, TransferService,
};

const SENDER_ID: &str = "alice";
const RECEIVER_ID: &str = "bob";
const DEFAULT_OUTPUT_DIR: &str = "veildrop-inbox";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,veildrop=debug")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(file) = args.next().map(PathBuf::from) else {
        eprintln!("usage: veildrop-loopback-demo <file> [config.json]");
        std::process::exit(2);
    };
    let config = match args.next() {
        Some(path) => TransferConfig::from_json_file(Path::new(&path))?,
        None => TransferConfig::default(),
    };
    let output_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        chunk_size = config.chunk_size,
        output = %output_dir.display(),
        "starting loopback demo"
    );

    let (sender_channel, sender_out) = LoopbackChannel::new(SENDER_ID);
    let sender = TransferService::new(
        config.clone(),
        Arc::new(sender_channel),
        Arc::new(NoopObserver),
        Arc::new(MemorySink::new()),
    )?;

    let (receiver_channel, _receiver_out) = LoopbackChannel::new(RECEIVER_ID);
    let (observer, mut events) = EventForwarder::channel();
    let receiver = Arc::new(TransferService::new(
        config,
        Arc::new(receiver_channel),
        Arc::new(observer),
        Arc::new(DirectorySink::new(&output_dir)),
    )?);

    let pump = tokio::spawn(pump(sender_out, receiver.clone()));

    let (id, outcome) = sender.send_file(&file, RECEIVER_ID).await?;
    info!(transfer_id = %id, outcome = ?outcome, "sender finished");
    drop(sender);
    pump.await?;

    while let Ok(event) = events.try_recv() {
        match event {
            TransferEvent::Progress(t) => {
                info!(transfer_id = %t.id, progress = t.progress, speed = t.speed, "progress");
            }
            TransferEvent::Completed(t) => {
                info!(transfer_id = %t.id, file = %output_dir.join(&t.file_name).display(), "received");
            }
            TransferEvent::Failed { transfer, reason } => {
                warn!(transfer_id = %transfer.id, %reason, "transfer failed");
            }
            TransferEvent::OrphanChunk { peer_id, transfer_id } => {
                warn!(peer = %peer_id, %transfer_id, "orphan chunk");
            }
        }
    }
    Ok(())
}

/// Feeds every frame the sender emits to the receiving endpoint.
async fn pump(mut frames: mpsc::UnboundedReceiver<InboundFrame>, receiver: Arc<TransferService>) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = receiver.handle_inbound(&frame.from, &frame.text).await {
            warn!(from = %frame.from, error = %e, "receiver rejected frame");
        }
    }
}

//! Stream-backed transport: one writer task per connected peer.
//!
//! `send` hands the frame to the peer's writer over an unbounded channel and
//! returns immediately. The writer fires `Delivered` once the frame is
//! flushed, `Failed` if the write errors. Sends to a peer with no live
//! connection are answered `Offline` on the spot.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;

use feeds_services::{Receipt, ReceiptCallback, Transport};

use crate::frame::write_frame;

pub type Outgoing = (Bytes, ReceiptCallback);

#[derive(Clone, Default)]
pub struct PeerTransport {
    peers: Arc<DashMap<String, mpsc::UnboundedSender<Outgoing>>>,
}

impl PeerTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The receiver feeds that peer's writer task.
    pub fn register(&self, peer: &str) -> mpsc::UnboundedReceiver<Outgoing> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.peers.insert(peer.to_string(), tx).is_some() {
            tracing::warn!(peer, "peer re-registered, previous writer detached");
        }
        rx
    }

    pub fn unregister(&self, peer: &str) {
        self.peers.remove(peer);
    }

    pub fn connected(&self) -> usize {
        self.peers.len()
    }
}

impl Transport for PeerTransport {
    fn send(&self, peer: &str, data: Bytes, on_receipt: ReceiptCallback) {
        let sender = self.peers.get(peer).map(|s| s.value().clone());
        let Some(sender) = sender else {
            tracing::trace!(peer, "send to unknown peer");
            return on_receipt(Receipt::Offline);
        };
        if let Err(mpsc::error::SendError((_, on_receipt))) = sender.send((data, on_receipt)) {
            on_receipt(Receipt::Offline);
        }
    }
}

/// Drain `rx` onto `writer` until every sender is gone or a write fails.
pub async fn write_loop<W: AsyncWrite + Unpin>(
    peer: String,
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
) {
    while let Some((data, on_receipt)) = rx.recv().await {
        match write_frame(&mut writer, &data).await {
            Ok(()) => on_receipt(Receipt::Delivered),
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "frame write failed");
                on_receipt(Receipt::Failed);
                break;
            }
        }
    }
    rx.close();
    while let Ok((_, on_receipt)) = rx.try_recv() {
        on_receipt(Receipt::Offline);
    }
    tracing::debug!(peer = %peer, "writer stopped");
}

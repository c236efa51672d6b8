//! Outbound paths available to handlers.
//!
//! Replies and notifies normally go through the per-peer delivery queue.
//! The direct path bypasses it and is used by handlers that deliver their
//! own replies.

use std::sync::Arc;

use bytes::Bytes;

use feeds_core::rpc::{Notify, Response};
use feeds_core::{wire, ErrCode};

use crate::delivery::DeliveryQueue;
use crate::transport::{Receipt, ReceiptCallback, Transport};

#[derive(Clone)]
pub struct Outbox {
    transport: Arc<dyn Transport>,
    queue: DeliveryQueue,
}

impl Outbox {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let queue = DeliveryQueue::new(transport.clone());
        Self { transport, queue }
    }

    pub fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    /// Raw pass-through to the transport.
    pub fn send(&self, peer: &str, data: Bytes, on_receipt: ReceiptCallback) {
        self.transport.send(peer, data, on_receipt);
    }

    /// Send without queueing; the receipt is only logged.
    pub fn send_direct(&self, peer: &str, data: Bytes) {
        let owner = peer.to_string();
        self.transport.send(
            peer,
            data,
            Box::new(move |receipt| {
                if receipt != Receipt::Delivered {
                    tracing::debug!(peer = %owner, ?receipt, "direct send not delivered");
                }
            }),
        );
    }

    pub fn enqueue(&self, peer: &str, data: Bytes) {
        self.queue.enqueue(peer, data);
    }

    /// Encode and send a response on the direct path.
    pub fn reply_direct(&self, peer: &str, response: &Response) -> Result<(), ErrCode> {
        let bytes = encode_response(response)?;
        self.send_direct(peer, bytes);
        Ok(())
    }

    /// Encode and queue a response.
    pub fn enqueue_response(&self, peer: &str, response: &Response) -> Result<(), ErrCode> {
        let bytes = encode_response(response)?;
        self.enqueue(peer, bytes);
        Ok(())
    }

    /// Encode and queue a notification. Failures are logged; notifies are best-effort.
    pub fn notify(&self, peer: &str, notify: &Notify) {
        match wire::encode_notify(notify) {
            Ok(bytes) => self.enqueue(peer, Bytes::from(bytes)),
            Err(e) => {
                tracing::warn!(peer, method = %notify.method, error = %e, "failed to encode notify")
            }
        }
    }

    pub fn peer_offline(&self, peer: &str) {
        self.queue.peer_offline(peer);
    }
}

fn encode_response(response: &Response) -> Result<Bytes, ErrCode> {
    wire::encode_response(response).map(Bytes::from).map_err(|e| {
        tracing::error!(id = response.id, error = %e, "failed to encode response");
        ErrCode::MarshalResponseFailed
    })
}

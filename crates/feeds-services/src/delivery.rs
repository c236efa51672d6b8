//! Per-peer delivery queue.
//!
//! At most one message is in flight per peer. The next message is sent only
//! when the transport reports a receipt for the current one.
//!
//! Per-peer states:
//!   Idle        no entry in the map
//!   Sending     entry present, front of `pending` is in flight
//!   Deprecated  handle flagged, entry removed; late receipts are ignored
//!
//! Receipt callbacks hold an `Arc` to the queue handle they were issued for,
//! so a callback that outlives its queue finds the flag set and does nothing.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::transport::{Receipt, Transport};

struct QueueHandle {
    deprecated: AtomicBool,
}

struct PeerQueue {
    handle: Arc<QueueHandle>,
    /// Front is the message currently in flight.
    pending: VecDeque<Bytes>,
}

#[derive(Clone)]
pub struct DeliveryQueue {
    queues: Arc<Mutex<HashMap<String, PeerQueue>>>,
    transport: Arc<dyn Transport>,
}

impl DeliveryQueue {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            transport,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PeerQueue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `data` for `peer`, sending it right away if the peer is idle.
    pub fn enqueue(&self, peer: &str, data: Bytes) {
        let handle = {
            let mut queues = self.lock();
            if let Some(queue) = queues.get_mut(peer) {
                queue.pending.push_back(data);
                tracing::trace!(peer, depth = queue.pending.len(), "message queued");
                return;
            }
            let handle = Arc::new(QueueHandle {
                deprecated: AtomicBool::new(false),
            });
            queues.insert(
                peer.to_string(),
                PeerQueue {
                    handle: handle.clone(),
                    pending: VecDeque::from([data.clone()]),
                },
            );
            handle
        };
        self.transmit(peer, handle, data);
    }

    /// Mark the peer's queue deprecated and drop everything not yet sent.
    pub fn peer_offline(&self, peer: &str) {
        if let Some(queue) = self.lock().remove(peer) {
            queue.handle.deprecated.store(true, Ordering::SeqCst);
            tracing::debug!(
                peer,
                dropped = queue.pending.len(),
                "delivery queue deprecated"
            );
        }
    }

    /// Messages held for `peer`, including the one in flight.
    pub fn pending(&self, peer: &str) -> usize {
        self.lock().get(peer).map_or(0, |q| q.pending.len())
    }

    pub fn is_idle(&self, peer: &str) -> bool {
        !self.lock().contains_key(peer)
    }

    /// Number of peers with a live queue.
    pub fn active_peers(&self) -> usize {
        self.lock().len()
    }

    // Never called with the map lock held: transports may fire the receipt
    // synchronously, which re-enters `on_receipt`.
    fn transmit(&self, peer: &str, handle: Arc<QueueHandle>, data: Bytes) {
        let queue = self.clone();
        let owner = peer.to_string();
        self.transport.send(
            peer,
            data,
            Box::new(move |receipt| queue.on_receipt(&owner, &handle, receipt)),
        );
    }

    fn on_receipt(&self, peer: &str, handle: &Arc<QueueHandle>, receipt: Receipt) {
        if handle.deprecated.load(Ordering::SeqCst) {
            tracing::trace!(peer, ?receipt, "receipt for deprecated queue ignored");
            return;
        }

        let next = {
            let mut queues = self.lock();
            let Some(queue) = queues.get_mut(peer) else {
                return;
            };
            if !Arc::ptr_eq(&queue.handle, handle) {
                return;
            }

            match receipt {
                Receipt::Offline => {
                    if let Some(queue) = queues.remove(peer) {
                        queue.handle.deprecated.store(true, Ordering::SeqCst);
                        tracing::debug!(
                            peer,
                            dropped = queue.pending.len(),
                            "peer offline, delivery queue deprecated"
                        );
                    }
                    return;
                }
                Receipt::Failed => {
                    tracing::warn!(peer, "send failed, advancing delivery queue");
                }
                Receipt::Delivered => {}
            }

            queue.pending.pop_front();
            let next = queue.pending.front().cloned();
            if next.is_none() {
                queues.remove(peer);
            }
            next
        };
        if let Some(next) = next {
            self.transmit(peer, handle.clone(), next);
        }
    }
}

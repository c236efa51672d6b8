//! Transport collaborator: fire-and-forget sends with a delivery receipt.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;

/// Final status of one send, reported exactly once per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receipt {
    Delivered,
    /// The peer is not connected.
    Offline,
    Failed,
}

pub type ReceiptCallback = Box<dyn FnOnce(Receipt) + Send + 'static>;

/// Carrier-style message transport.
///
/// `send` must not block on delivery. The callback may run on any thread,
/// including synchronously inside `send`.
pub trait Transport: Send + Sync {
    fn send(&self, peer: &str, data: Bytes, on_receipt: ReceiptCallback);
}

/// In-process transport that records every frame.
///
/// In manual mode receipts are held until [`MemoryTransport::deliver_next`];
/// in auto mode each send is confirmed as soon as it is recorded.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<MemoryState>>,
    auto_deliver: bool,
}

#[derive(Default)]
struct MemoryState {
    sent: Vec<(String, Bytes)>,
    pending: HashMap<String, VecDeque<ReceiptCallback>>,
    offline: Vec<String>,
}

impl MemoryTransport {
    pub fn manual() -> Self {
        Self::default()
    }

    pub fn auto() -> Self {
        Self {
            auto_deliver: true,
            ..Self::default()
        }
    }

    /// Sends to this peer are answered with `Receipt::Offline`.
    pub fn set_offline(&self, peer: &str) {
        self.state().offline.push(peer.to_string());
    }

    /// Every recorded frame, in send order.
    pub fn sent(&self) -> Vec<(String, Bytes)> {
        self.state().sent.clone()
    }

    pub fn sent_to(&self, peer: &str) -> Vec<Bytes> {
        self.state()
            .sent
            .iter()
            .filter(|(p, _)| p == peer)
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Receipts still owed to `peer`.
    pub fn outstanding(&self, peer: &str) -> usize {
        self.state().pending.get(peer).map_or(0, VecDeque::len)
    }

    /// Fire the oldest outstanding receipt for `peer`. Returns false if none.
    pub fn deliver_next(&self, peer: &str, receipt: Receipt) -> bool {
        let callback = self
            .state()
            .pending
            .get_mut(peer)
            .and_then(VecDeque::pop_front);
        match callback {
            Some(cb) => {
                cb(receipt);
                true
            }
            None => false,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MemoryTransport {
    fn send(&self, peer: &str, data: Bytes, on_receipt: ReceiptCallback) {
        let immediate = {
            let mut state = self.state();
            if state.offline.iter().any(|p| p == peer) {
                Some(Receipt::Offline)
            } else {
                state.sent.push((peer.to_string(), data));
                if self.auto_deliver {
                    Some(Receipt::Delivered)
                } else {
                    state
                        .pending
                        .entry(peer.to_string())
                        .or_default()
                        .push_back(on_receipt);
                    return;
                }
            }
        };
        // Callbacks re-enter `send`; the state lock is released by now.
        if let Some(receipt) = immediate {
            on_receipt(receipt);
        }
    }
}

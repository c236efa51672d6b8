//! Active subscribers: peers that enabled notification, and the channels
//! each one is listening to.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use feeds_core::{Dialect, ErrCode, Version};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscriber {
    pub user_id: u64,
    /// Envelope style notifications are written in for this peer.
    pub dialect: Dialect,
    pub version: Version,
    pub channels: HashSet<u64>,
}

#[derive(Clone, Default)]
pub struct ActiveSubscribers {
    peers: Arc<DashMap<String, ActiveSubscriber>>,
}

impl ActiveSubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `peer` as an active subscriber. A peer can only enable once per
    /// connection.
    pub fn activate(&self, peer: &str, subscriber: ActiveSubscriber) -> Result<(), ErrCode> {
        use dashmap::mapref::entry::Entry;
        match self.peers.entry(peer.to_string()) {
            Entry::Occupied(_) => Err(ErrCode::WrongState),
            Entry::Vacant(slot) => {
                tracing::info!(
                    peer,
                    user_id = subscriber.user_id,
                    channels = subscriber.channels.len(),
                    "notification enabled"
                );
                slot.insert(subscriber);
                Ok(())
            }
        }
    }

    /// Drop the peer. Returns true if it was active.
    pub fn deactivate(&self, peer: &str) -> bool {
        self.peers.remove(peer).is_some()
    }

    /// A user subscribed to a channel: every active peer of theirs follows it.
    pub fn add_channel(&self, user_id: u64, channel_id: u64) {
        for mut entry in self.peers.iter_mut() {
            if entry.user_id == user_id {
                entry.channels.insert(channel_id);
            }
        }
    }

    pub fn remove_channel(&self, user_id: u64, channel_id: u64) {
        for mut entry in self.peers.iter_mut() {
            if entry.user_id == user_id {
                entry.channels.remove(&channel_id);
            }
        }
    }

    /// Peers to notify about activity in `channel_id`, with their envelope style.
    pub fn peers_for(&self, channel_id: u64) -> Vec<(String, Dialect, Version)> {
        self.peers
            .iter()
            .filter(|e| e.channels.contains(&channel_id))
            .map(|e| (e.key().clone(), e.dialect, e.version))
            .collect()
    }

    pub fn is_active(&self, peer: &str) -> bool {
        self.peers.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

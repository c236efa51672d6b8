//! Feeds integration test harness.
//!
//! Every test drives a full `CommandHandler` in-process: encoded envelopes go
//! in through `received`, and whatever the service sends back is read off a
//! `MemoryTransport`. No sockets, no daemon.
//!
//!   cargo test --test integration

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;

use feeds_core::obj::UserInfo;
use feeds_core::rpc::{CreateChannelParams, PostCommentParams, PublishPostParams, RawBytes, Request};
use feeds_core::wire::{self, EnvelopeView};
use feeds_services::{CommandHandler, FeedsStore, MemoryTransport, ServiceContext, StaticTokenResolver};

mod access;
mod delivery;
mod dialects;
mod moderation;
mod notifications;
mod queries;

// ── Harness ───────────────────────────────────────────────────────────────────

pub const OWNER_TOKEN: &str = "owner-token";
pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB_TOKEN: &str = "bob-token";

pub fn owner() -> UserInfo {
    UserInfo {
        user_id: 1,
        did: "did:elastos:owner".into(),
        name: "owner".into(),
        email: String::new(),
        is_owner: true,
    }
}

pub fn alice() -> UserInfo {
    UserInfo {
        user_id: 2,
        did: "did:elastos:alice".into(),
        name: "alice".into(),
        email: String::new(),
        is_owner: false,
    }
}

pub fn bob() -> UserInfo {
    UserInfo {
        user_id: 3,
        did: "did:elastos:bob".into(),
        name: "bob".into(),
        email: String::new(),
        is_owner: false,
    }
}

/// A running service plus handles on its collaborators.
pub struct Node {
    pub handler: CommandHandler,
    pub transport: MemoryTransport,
    pub store: Arc<FeedsStore>,
    pub resolver: StaticTokenResolver,
}

pub struct NodeBuilder {
    transport: MemoryTransport,
    ceiling: Option<usize>,
    ready: bool,
    resolver: Option<StaticTokenResolver>,
}

impl NodeBuilder {
    pub fn new() -> Self {
        Self {
            transport: MemoryTransport::auto(),
            ceiling: None,
            ready: true,
            resolver: None,
        }
    }

    /// Use `resolver` as is instead of the fixture token table.
    pub fn resolver(mut self, resolver: StaticTokenResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn manual_receipts(mut self) -> Self {
        self.transport = MemoryTransport::manual();
        self
    }

    pub fn ceiling(mut self, bytes: usize) -> Self {
        self.ceiling = Some(bytes);
        self
    }

    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn build(self) -> Result<Node> {
        let store = Arc::new(FeedsStore::in_memory().context("open in-memory store")?);
        let resolver = self.resolver.unwrap_or_else(|| {
            let resolver = StaticTokenResolver::new("did:elastos:owner");
            resolver.insert(OWNER_TOKEN, &owner());
            resolver.insert(ALICE_TOKEN, &alice());
            resolver.insert(BOB_TOKEN, &bob());
            resolver
        });
        resolver.set_ready(self.ready);

        let mut ctx = ServiceContext::new(
            store.clone(),
            Arc::new(resolver.clone()),
            Arc::new(self.transport.clone()),
        );
        if let Some(ceiling) = self.ceiling {
            ctx.max_envelope_bytes = ceiling;
        }
        ctx.version_code = 7;

        Ok(Node {
            handler: CommandHandler::new(ctx),
            transport: self.transport,
            store,
            resolver,
        })
    }
}

impl Node {
    /// Seed one channel with one post carrying `comments` comments by alice.
    pub fn seed(&self, comments: usize) -> Result<(u64, u64)> {
        self.store.upsert_user(&alice())?;
        let channel_id = self.store.create_channel(&CreateChannelParams {
            name: "news".into(),
            introduction: "daily".into(),
            ..Default::default()
        })?;
        let post = self.store.publish_post(&PublishPostParams {
            channel_id,
            content: RawBytes(b"first".to_vec()),
            ..Default::default()
        })?;
        for i in 0..comments {
            self.store.post_comment(
                &alice(),
                &PostCommentParams {
                    channel_id,
                    post_id: post.post_id,
                    content: RawBytes(format!("comment {i}").into_bytes()),
                    ..Default::default()
                },
            )?;
        }
        Ok((channel_id, post.post_id))
    }

    pub fn call(&self, peer: &str, request: &Request) -> Result<()> {
        let bytes = wire::encode_request(request).context("encode request")?;
        self.handler.received(peer, &bytes);
        Ok(())
    }

    pub fn raw(&self, peer: &str, bytes: &[u8]) {
        self.handler.received(peer, bytes);
    }

    /// Everything sent to `peer` so far, decoded.
    pub fn inbox(&self, peer: &str) -> Vec<EnvelopeView> {
        self.transport
            .sent_to(peer)
            .iter()
            .map(|b: &Bytes| wire::decode_view(b).expect("service sent an undecodable envelope"))
            .collect()
    }

    /// Envelopes sent to `peer` since the first `skip`.
    pub fn inbox_after(&self, peer: &str, skip: usize) -> Vec<EnvelopeView> {
        self.inbox(peer).into_iter().skip(skip).collect()
    }
}

/// Pack a loosely typed envelope.
pub fn envelope(pairs: Vec<(&str, rmpv::Value)>) -> Vec<u8> {
    let value = rmpv::Value::Map(
        pairs
            .into_iter()
            .map(|(k, v)| (rmpv::Value::from(k), v))
            .collect(),
    );
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &value).expect("encode envelope");
    buf
}

pub fn error_code(view: &EnvelopeView) -> Option<i64> {
    view.error.as_ref().map(|e| e.code)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_harness_starts_clean() {
    let node = NodeBuilder::new().build().unwrap();
    assert!(node.transport.sent().is_empty());
    assert!(node.handler.subscribers().is_empty());
    assert_eq!(node.resolver.len(), 3);
}

//! feeds-services: request routing, listeners, delivery and storage.
//!
//! `CommandHandler` is the entry point: the transport hands it inbound bytes
//! per peer and it answers through the per-peer delivery queue.

pub mod channel_method;
pub mod command;
pub mod delivery;
pub mod did;
pub mod legacy_method;
pub mod outbox;
pub mod paginator;
pub mod router;
pub mod service;
pub mod service_method;
pub mod standard_auth;
pub mod store;
pub mod subscribers;
pub mod transport;

pub use command::{CommandHandler, ServiceContext};
pub use did::{StaticTokenResolver, TokenResolver};
pub use outbox::Outbox;
pub use service::{CallContext, Listener, Outcome};
pub use store::FeedsStore;
pub use transport::{MemoryTransport, Receipt, ReceiptCallback, Transport};

//! Command handler: the single entry point for inbound peer bytes.
//!
//! ```text
//!   received(peer, bytes)
//!     -> decode (versioned dialect, then legacy dialect)
//!     -> router (listener lookup + access control)
//!     -> outcome: responses queued in order | handler already delivered
//!     -> errors keyed by the original transaction id
//! ```
//!
//! Everything the handler needs is passed in through `ServiceContext`; there
//! is no global state, so tests can run many independent instances.

use std::sync::Arc;

use bytes::Bytes;

use feeds_core::factory::{error_for, make_error};
use feeds_core::rpc::{Request, Response};
use feeds_core::wire::{self, DecodeStatus, Decoded, Dialect, Version, WireError};
use feeds_core::ErrCode;

use crate::channel_method::ChannelMethod;
use crate::did::TokenResolver;
use crate::legacy_method::LegacyMethod;
use crate::outbox::Outbox;
use crate::paginator::DEFAULT_CEILING;
use crate::router::Router;
use crate::service::Outcome;
use crate::service_method::{CloudDrive, ServiceMethod};
use crate::standard_auth::StandardAuth;
use crate::store::FeedsStore;
use crate::subscribers::ActiveSubscribers;
use crate::transport::{ReceiptCallback, Transport};

/// Process-wide collaborators, built once at startup.
#[derive(Clone)]
pub struct ServiceContext {
    pub store: Arc<FeedsStore>,
    pub resolver: Arc<dyn TokenResolver>,
    pub transport: Arc<dyn Transport>,
    /// Pagination ceiling for multi-query responses.
    pub max_envelope_bytes: usize,
    pub version_code: i64,
    pub drives: Vec<(String, Arc<dyn CloudDrive>)>,
}

impl ServiceContext {
    pub fn new(
        store: Arc<FeedsStore>,
        resolver: Arc<dyn TokenResolver>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            store,
            resolver,
            transport,
            max_envelope_bytes: DEFAULT_CEILING,
            version_code: 0,
            drives: Vec::new(),
        }
    }
}

pub struct CommandHandler {
    router: Router,
    outbox: Outbox,
    subscribers: ActiveSubscribers,
}

impl CommandHandler {
    /// Build the handler with the standard listener chain.
    pub fn new(ctx: ServiceContext) -> Self {
        let subscribers = ActiveSubscribers::new();
        let outbox = Outbox::new(ctx.transport.clone());

        let mut service = ServiceMethod::new(ctx.store.clone());
        for (name, drive) in ctx.drives {
            service = service.with_drive(&name, drive);
        }

        let mut router = Router::new(ctx.resolver.clone());
        router.register(Arc::new(LegacyMethod::new(
            ctx.store.clone(),
            subscribers.clone(),
            ctx.version_code,
        )));
        router.register(Arc::new(StandardAuth::new(ctx.resolver, ctx.store.clone())));
        router.register(Arc::new(ChannelMethod::new(ctx.store, ctx.max_envelope_bytes)));
        router.register(Arc::new(service));

        tracing::info!(listeners = ?router.listener_names(), "command handler ready");
        Self {
            router,
            outbox,
            subscribers,
        }
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn subscribers(&self) -> &ActiveSubscribers {
        &self.subscribers
    }

    /// Handle one inbound envelope from `peer`.
    pub fn received(&self, peer: &str, bytes: &[u8]) {
        let decoded = match decode_any(bytes) {
            Ok(d) => d,
            Err((dialect, e)) => {
                match e.transaction_id().or_else(|| wire::peek_id(bytes)) {
                    Some(id) => {
                        // Neither dialect understood it, but the id lets us answer.
                        let code = match &e {
                            WireError::Malformed(_) => ErrCode::Unimplemented,
                            other => other.code(),
                        };
                        tracing::debug!(peer, id, error = %e, "undecodable request");
                        let response = match dialect {
                            Dialect::Versioned => make_error(code, id),
                            Dialect::Legacy => error_for(
                                &Request::placeholder(dialect, Version::V1, String::new(), id),
                                code,
                            ),
                        };
                        self.queue(peer, &response);
                    }
                    None => tracing::warn!(peer, error = %e, "dropping undecodable message"),
                }
                return;
            }
        };

        let request = decoded.request;
        match decoded.status {
            DecodeStatus::Processed => {}
            DecodeStatus::UnknownMethod => {
                tracing::debug!(peer, method = %request.method, id = request.id, "unknown method");
                return self.fail(peer, &request, ErrCode::Unimplemented);
            }
            DecodeStatus::UnsupportedVersion => {
                tracing::debug!(peer, method = %request.method, id = request.id, "unsupported version");
                return self.fail(peer, &request, ErrCode::UnsupportedVersion);
            }
        }
        if request.id == 0 {
            return self.fail(peer, &request, ErrCode::InvalidArgument);
        }

        match self.router.route(peer, &self.outbox, &request) {
            Ok(Outcome::Responses(responses)) => {
                for response in &responses {
                    self.queue(peer, response);
                }
            }
            Ok(Outcome::Finished) => {}
            Err(code) => {
                tracing::debug!(
                    peer,
                    method = %request.method,
                    id = request.id,
                    code = code.code(),
                    "request failed"
                );
                self.fail(peer, &request, code);
            }
        }
    }

    /// Peer went away: deprecate its queue and drop its notification binding.
    pub fn peer_offline(&self, peer: &str) {
        self.outbox.peer_offline(peer);
        if self.subscribers.deactivate(peer) {
            tracing::debug!(peer, "active subscriber removed");
        }
    }

    /// Raw pass-through to the transport.
    pub fn send(&self, peer: &str, data: Bytes, on_receipt: ReceiptCallback) {
        self.outbox.send(peer, data, on_receipt);
    }

    fn fail(&self, peer: &str, request: &Request, code: ErrCode) {
        self.queue(peer, &error_for(request, code));
    }

    fn queue(&self, peer: &str, response: &Response) {
        if let Err(code) = self.outbox.enqueue_response(peer, response) {
            // The payload could not be marshalled; the bare error always can.
            let fallback = Response {
                body: make_error(code, response.id).body,
                ..response.clone()
            };
            if let Err(e) = self.outbox.enqueue_response(peer, &fallback) {
                tracing::error!(peer, id = response.id, code = e.code(), "failed to queue error response");
            }
        }
    }
}

/// Versioned dialect first. The legacy dialect gets a turn when the versioned
/// head is missing or its method is unknown there. Errors carry the dialect
/// that produced them.
fn decode_any(bytes: &[u8]) -> Result<Decoded, (Dialect, WireError)> {
    match wire::decode(bytes) {
        Ok(d) if d.status != DecodeStatus::UnknownMethod => Ok(d),
        Ok(unknown) => match wire::decode_legacy(bytes) {
            Ok(legacy) if legacy.processed() => Ok(legacy),
            _ => Ok(unknown),
        },
        Err(WireError::Malformed(reason)) => match wire::decode_legacy(bytes) {
            Ok(legacy) => Ok(legacy),
            Err(WireError::Malformed(_)) => Err((Dialect::Versioned, WireError::Malformed(reason))),
            Err(e) => Err((Dialect::Legacy, e)),
        },
        Err(e) => Err((Dialect::Versioned, e)),
    }
}

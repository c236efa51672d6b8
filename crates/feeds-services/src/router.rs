//! Request router: finds the listener that serves a method, enforces its
//! access level, then hands the request over.
//!
//! Listeners are consulted in registration order and the first one whose
//! table contains the method wins. Authorization failures never reach the
//! handler.

use std::sync::Arc;

use feeds_core::method::Access;
use feeds_core::obj::UserInfo;
use feeds_core::rpc::Request;
use feeds_core::ErrCode;

use crate::did::{fingerprint, TokenResolver};
use crate::outbox::Outbox;
use crate::service::{CallContext, Listener, Outcome};

pub struct Router {
    listeners: Vec<Arc<dyn Listener>>,
    resolver: Arc<dyn TokenResolver>,
}

impl Router {
    pub fn new(resolver: Arc<dyn TokenResolver>) -> Self {
        Self {
            listeners: Vec::new(),
            resolver,
        }
    }

    /// Append a listener; earlier registrations take precedence.
    pub fn register(&mut self, listener: Arc<dyn Listener>) {
        tracing::debug!(listener = listener.name(), "listener registered");
        self.listeners.push(listener);
    }

    pub fn listener_names(&self) -> Vec<&'static str> {
        self.listeners.iter().map(|l| l.name()).collect()
    }

    pub fn route(&self, peer: &str, outbox: &Outbox, request: &Request) -> Result<Outcome, ErrCode> {
        let method = request.known_method().ok_or(ErrCode::Unimplemented)?;
        let (listener, access) = self
            .listeners
            .iter()
            .find_map(|l| l.lookup(method).map(|a| (l, a)))
            .ok_or(ErrCode::Unimplemented)?;

        // Methods without a token field are open to anyone.
        let access = if method.descriptor().has_token {
            access
        } else {
            Access::Anyone
        };
        let user = self.authorize(access, request)?;

        tracing::debug!(
            peer,
            method = %method,
            id = request.id,
            listener = listener.name(),
            "request dispatched"
        );
        let ctx = CallContext {
            peer,
            user,
            outbox,
        };
        listener.handle(&ctx, request)
    }

    fn authorize(&self, access: Access, request: &Request) -> Result<Option<UserInfo>, ErrCode> {
        if access == Access::Anyone {
            return Ok(None);
        }
        if !self.resolver.is_ready() {
            return Err(ErrCode::DidNotReady);
        }
        let token = request.params.access_token().unwrap_or_default();
        if token.is_empty() {
            tracing::debug!(method = %request.method, id = request.id, "missing access token");
            return Err(ErrCode::InvalidAccessToken);
        }
        let user = self.resolver.verify(token).map_err(|e| {
            tracing::debug!(
                token = %fingerprint(token),
                method = %request.method,
                error = %e,
                "token rejected"
            );
            ErrCode::from(e)
        })?;
        if access == Access::Owner && !user.is_owner {
            tracing::warn!(
                token = %fingerprint(token),
                user_id = user.user_id,
                method = %request.method,
                "owner method refused"
            );
            return Err(ErrCode::NotAuthorized);
        }
        Ok(Some(user))
    }
}

//! Listener trait: the contract between the router and method handlers.
//!
//! A listener owns a partial method table. The router picks the first
//! listener whose table contains the method, checks access, then calls
//! `handle`.

use std::collections::HashMap;

use feeds_core::method::{Access, Method};
use feeds_core::obj::UserInfo;
use feeds_core::rpc::{Request, Response};
use feeds_core::ErrCode;

use crate::outbox::Outbox;

/// What a handler did with a request.
#[derive(Debug)]
pub enum Outcome {
    /// Responses for the router to deliver, in order. May be empty.
    Responses(Vec<Response>),
    /// The handler already delivered everything itself.
    Finished,
}

/// Per-call state handed to a handler.
pub struct CallContext<'a> {
    pub peer: &'a str,
    /// Resolved caller; `None` for `Access::Anyone` methods.
    pub user: Option<UserInfo>,
    pub outbox: &'a Outbox,
}

impl CallContext<'_> {
    /// The resolved caller, for handlers behind Member or Owner access.
    pub fn user(&self) -> Result<&UserInfo, ErrCode> {
        self.user.as_ref().ok_or(ErrCode::InvalidAccessToken)
    }
}

pub trait Listener: Send + Sync {
    fn name(&self) -> &'static str;

    /// Access level for `method` if this listener serves it.
    fn lookup(&self, method: Method) -> Option<Access>;

    fn handle(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode>;
}

pub type Handler<L> = fn(&L, &CallContext<'_>, &Request) -> Result<Outcome, ErrCode>;

/// Method table of one listener. Access levels come from the registry.
pub struct MethodTable<L> {
    entries: HashMap<Method, (Handler<L>, Access)>,
}

impl<L> MethodTable<L> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with(mut self, method: Method, handler: Handler<L>) -> Self {
        self.entries.insert(method, (handler, method.access()));
        self
    }

    pub fn access(&self, method: Method) -> Option<Access> {
        self.entries.get(&method).map(|(_, a)| *a)
    }

    /// Run the handler registered for the request's method.
    pub fn dispatch(
        &self,
        listener: &L,
        ctx: &CallContext<'_>,
        request: &Request,
    ) -> Result<Outcome, ErrCode> {
        let method = request.known_method().ok_or(ErrCode::Unimplemented)?;
        let (handler, _) = self.entries.get(&method).ok_or(ErrCode::Unimplemented)?;
        handler(listener, ctx, request)
    }

    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.entries.keys().copied()
    }
}

impl<L> Default for MethodTable<L> {
    fn default() -> Self {
        Self::new()
    }
}

/// Single reply answering `request`.
pub fn reply(request: &Request, payload: feeds_core::rpc::ResultPayload) -> Outcome {
    Outcome::Responses(vec![Response::reply(request, payload)])
}

//! Message factory: method name in, empty typed message out.
//!
//! Pure table lookups over the method registry. Error envelopes are built
//! here too so every error carries the same version stamp and message text.

use crate::error::ErrCode;
use crate::method::Method;
use crate::rpc::{Body, Notify, NotifyPayload, Params, Request, Response, ResultPayload};
use crate::wire::{Dialect, Version};

/// Empty request for `method`, or `None` if the name is not registered.
pub fn make_request(method: &str, id: u64) -> Option<Request> {
    let m = Method::from_name(method)?;
    Some(Request::new(Version::CURRENT, id, Params::default_for(m)))
}

/// Empty response shape for `method`, or `None` if the name is not registered.
pub fn make_response(method: &str, id: u64) -> Option<Response> {
    let m = Method::from_name(method)?;
    Some(Response {
        dialect: Dialect::Versioned,
        version: Version::CURRENT,
        id,
        body: Body::Result(ResultPayload::default_for(m)),
    })
}

/// Error envelope stamped with the current version.
pub fn make_error(code: ErrCode, id: u64) -> Response {
    Response {
        dialect: Dialect::Versioned,
        version: Version::CURRENT,
        id,
        body: Body::Error(code.into()),
    }
}

/// Error envelope answering `request` in the dialect it arrived in.
pub fn error_for(request: &Request, code: ErrCode) -> Response {
    let version = match request.dialect {
        Dialect::Versioned => Version::CURRENT,
        Dialect::Legacy => request.version,
    };
    Response {
        dialect: request.dialect,
        version,
        id: request.id,
        body: Body::Error(code.into()),
    }
}

/// Notification in the current version.
pub fn make_notify(method: &str, params: NotifyPayload) -> Notify {
    Notify {
        dialect: Dialect::Versioned,
        version: Version::CURRENT,
        method: method.to_string(),
        params,
    }
}

//! feeds-core: shared types, wire codec, method registry and configuration.
//! All other feeds crates depend on this one.

pub mod config;
pub mod error;
pub mod factory;
pub mod method;
pub mod obj;
pub mod rpc;
pub mod wire;

pub use error::ErrCode;
pub use method::{Access, Family, Method};
pub use rpc::{Body, Notify, NotifyPayload, Params, Request, Response, ResultPayload};
pub use wire::{DecodeStatus, Decoded, Dialect, Version, WireError};

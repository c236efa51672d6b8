//! Feeds wire format: msgpack envelopes.
//!
//! An inbound envelope is a single msgpack map. The versioned dialect carries
//! `version` ("1.0" or "2.0"), `method`, `id` and `params`; the legacy dialect
//! carries `jsonrpc: "2.0"` in place of `version` and always uses the 1.0
//! params layout.
//!
//! Outbound envelopes are written with named keys in a fixed order:
//! `version` (or `jsonrpc`), then `id`, then `result` or `error`. Binary
//! fields are msgpack `bin`, never text.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ErrCode;
use crate::method::Method;
use crate::rpc::{
    Body, CreateChannelParams, CreateChannelParamsV1, EditCommentParams, EditCommentParamsV1,
    EditPostParams, EditPostParamsV1, ErrorDetail, Notify, NotifyPayload, Params,
    PostCommentParams, PostCommentParamsV1, PublishPostParams, PublishPostParamsV1, Request,
    Response, ResultPayload,
};

/// Key value that marks the legacy dialect.
pub const LEGACY_JSONRPC: &str = "2.0";

// ── Versions and dialects ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    V1,
    V2,
}

impl Version {
    /// Version stamped on envelopes the service originates.
    pub const CURRENT: Version = Version::V2;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "1.0",
            Self::V2 => "2.0",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1.0" => Some(Self::V1),
            "2.0" => Some(Self::V2),
            _ => None,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which top-level key names the protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `version: "1.0" | "2.0"`
    Versioned,
    /// `jsonrpc: "2.0"`, 1.0 params layout.
    Legacy,
}

/// Outcome of a decode that found a well-formed head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    Processed,
    /// The method is not in the version's table. The request is a placeholder.
    UnknownMethod,
    /// The version string is not supported. The request is a placeholder.
    UnsupportedVersion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub request: Request,
    pub status: DecodeStatus,
}

impl Decoded {
    pub fn processed(&self) -> bool {
        self.status == DecodeStatus::Processed
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// No recoverable transaction id: the message can only be dropped.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// Head was fine, params were not.
    #[error("bad params for {method} (id {id}): {reason}")]
    BadParams {
        id: u64,
        method: String,
        reason: String,
    },
    #[error("encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl WireError {
    /// Transaction id an error envelope can be keyed by, if any.
    pub fn transaction_id(&self) -> Option<u64> {
        match self {
            Self::BadParams { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn code(&self) -> ErrCode {
        match self {
            Self::Encode(_) => ErrCode::MarshalResponseFailed,
            _ => ErrCode::UnmarshalRequestFailed,
        }
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Top-level keys every envelope is routed by.
#[derive(Debug, Default)]
struct Head {
    version: Option<String>,
    jsonrpc: Option<String>,
    method: Option<String>,
    id: Option<u64>,
}

fn read_head(bytes: &[u8]) -> Result<Head, WireError> {
    let mut cursor = std::io::Cursor::new(bytes);
    let value =
        rmpv::decode::read_value(&mut cursor).map_err(|e| WireError::Malformed(e.to_string()))?;
    let rmpv::Value::Map(entries) = value else {
        return Err(WireError::Malformed("envelope is not a map".into()));
    };

    let mut head = Head::default();
    for (key, val) in entries {
        let Some(key) = key.as_str() else { continue };
        match key {
            "version" => head.version = val.as_str().map(str::to_owned),
            "jsonrpc" => head.jsonrpc = val.as_str().map(str::to_owned),
            "method" => head.method = val.as_str().map(str::to_owned),
            "id" => head.id = val.as_u64(),
            _ => {}
        }
    }
    Ok(head)
}

#[derive(Deserialize)]
struct ParamsField<T> {
    params: Option<T>,
}

fn parse<T: DeserializeOwned + Default>(bytes: &[u8]) -> Result<T, rmp_serde::decode::Error> {
    let field: ParamsField<T> = rmp_serde::from_slice(bytes)?;
    Ok(field.params.unwrap_or_default())
}

type ParseResult = Result<Params, rmp_serde::decode::Error>;

/// Methods whose params layout is the same in every version.
fn parse_common(method: Method, bytes: &[u8]) -> ParseResult {
    Ok(match method {
        Method::StandardSignIn => Params::StandardSignIn(parse(bytes)?),
        Method::StandardDidAuth => Params::StandardDidAuth(parse(bytes)?),
        Method::DeclareOwner => Params::DeclareOwner(parse(bytes)?),
        Method::GetMultiComments => Params::GetMultiComments(parse(bytes)?),
        Method::GetMultiLikesAndCommentsCount => {
            Params::GetMultiLikesAndCommentsCount(parse(bytes)?)
        }
        Method::GetMultiSubscribersCount => Params::GetMultiSubscribersCount(parse(bytes)?),
        Method::BackupServiceData => Params::BackupServiceData(parse(bytes)?),
        Method::DeletePost => Params::DeletePost(parse(bytes)?),
        Method::DeleteComment => Params::DeleteComment(parse(bytes)?),
        Method::BlockComment => Params::BlockComment(parse(bytes)?),
        Method::UnblockComment => Params::UnblockComment(parse(bytes)?),
        Method::PostLike => Params::PostLike(parse(bytes)?),
        Method::PostUnlike => Params::PostUnlike(parse(bytes)?),
        Method::GetMyChannels => Params::GetMyChannels(parse(bytes)?),
        Method::GetChannels => Params::GetChannels(parse(bytes)?),
        Method::GetChannelDetail => Params::GetChannelDetail(parse(bytes)?),
        Method::GetSubscribedChannels => Params::GetSubscribedChannels(parse(bytes)?),
        Method::GetPosts => Params::GetPosts(parse(bytes)?),
        Method::GetLikedPosts => Params::GetLikedPosts(parse(bytes)?),
        Method::GetComments => Params::GetComments(parse(bytes)?),
        Method::GetStatistics => Params::GetStatistics(parse(bytes)?),
        Method::SubscribeChannel => Params::SubscribeChannel(parse(bytes)?),
        Method::UnsubscribeChannel => Params::UnsubscribeChannel(parse(bytes)?),
        Method::EnableNotification => Params::EnableNotification(parse(bytes)?),
        Method::GetServiceVersion => Params::GetServiceVersion,
        Method::CreateChannel => Params::CreateChannel(parse(bytes)?),
        Method::PublishPost => Params::PublishPost(parse(bytes)?),
        Method::PostComment => Params::PostComment(parse(bytes)?),
        Method::EditPost => Params::EditPost(parse(bytes)?),
        Method::EditComment => Params::EditComment(parse(bytes)?),
    })
}

/// 1.0 parser table: the extended methods read their narrower layout and
/// are widened with placeholders.
fn parse_v1(method: Method, bytes: &[u8]) -> ParseResult {
    Ok(match method {
        Method::CreateChannel => Params::CreateChannel(parse::<CreateChannelParamsV1>(bytes)?.into()),
        Method::PublishPost => Params::PublishPost(parse::<PublishPostParamsV1>(bytes)?.into()),
        Method::PostComment => Params::PostComment(parse::<PostCommentParamsV1>(bytes)?.into()),
        Method::EditPost => Params::EditPost(parse::<EditPostParamsV1>(bytes)?.into()),
        Method::EditComment => Params::EditComment(parse::<EditCommentParamsV1>(bytes)?.into()),
        _ => return parse_common(method, bytes),
    })
}

/// 2.0 parser table.
fn parse_v2(method: Method, bytes: &[u8]) -> ParseResult {
    parse_common(method, bytes)
}

fn parse_params(version: Version, method: Method, bytes: &[u8]) -> ParseResult {
    match version {
        Version::V1 => parse_v1(method, bytes),
        Version::V2 => parse_v2(method, bytes),
    }
}

fn typed(
    dialect: Dialect,
    version: Version,
    name: String,
    id: u64,
    bytes: &[u8],
) -> Result<Decoded, WireError> {
    let Some(method) = Method::from_name(&name) else {
        return Ok(Decoded {
            request: Request::placeholder(dialect, version, name, id),
            status: DecodeStatus::UnknownMethod,
        });
    };
    let params = parse_params(version, method, bytes).map_err(|e| WireError::BadParams {
        id,
        method: name.clone(),
        reason: e.to_string(),
    })?;
    Ok(Decoded {
        request: Request {
            dialect,
            version,
            method: name,
            id,
            params,
        },
        status: DecodeStatus::Processed,
    })
}

/// Decode a versioned-dialect request.
///
/// Missing `version`, `method` or `id` is `Malformed`. An unknown version or
/// method still yields a placeholder carrying the original id.
pub fn decode(bytes: &[u8]) -> Result<Decoded, WireError> {
    let head = read_head(bytes)?;
    let (Some(version), Some(method), Some(id)) = (head.version, head.method, head.id) else {
        return Err(WireError::Malformed("missing version, method or id".into()));
    };
    match Version::parse(&version) {
        Some(v) => typed(Dialect::Versioned, v, method, id, bytes),
        None => Ok(Decoded {
            request: Request::placeholder(Dialect::Versioned, Version::CURRENT, method, id),
            status: DecodeStatus::UnsupportedVersion,
        }),
    }
}

/// Decode a legacy-dialect request (`jsonrpc: "2.0"`, 1.0 params).
pub fn decode_legacy(bytes: &[u8]) -> Result<Decoded, WireError> {
    let head = read_head(bytes)?;
    let (Some(jsonrpc), Some(method), Some(id)) = (head.jsonrpc, head.method, head.id) else {
        return Err(WireError::Malformed("missing jsonrpc, method or id".into()));
    };
    if jsonrpc != LEGACY_JSONRPC {
        return Ok(Decoded {
            request: Request::placeholder(Dialect::Legacy, Version::V1, method, id),
            status: DecodeStatus::UnsupportedVersion,
        });
    }
    typed(Dialect::Legacy, Version::V1, method, id, bytes)
}

/// Best-effort transaction id of an envelope neither dialect could type.
pub fn peek_id(bytes: &[u8]) -> Option<u64> {
    read_head(bytes).ok().and_then(|h| h.id)
}

// ── Encoding ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct RequestOut<'a, P: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jsonrpc: Option<&'a str>,
    method: &'a str,
    id: u64,
    params: &'a P,
}

#[derive(Serialize)]
struct ResponseOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jsonrpc: Option<&'a str>,
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a ResultPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorDetail>,
}

#[derive(Serialize)]
struct NotifyOut<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    jsonrpc: Option<&'a str>,
    method: &'a str,
    params: &'a NotifyPayload,
}

fn version_keys(dialect: Dialect, version: Version) -> (Option<&'static str>, Option<&'static str>) {
    match dialect {
        Dialect::Versioned => (Some(version.as_str()), None),
        Dialect::Legacy => (None, Some(LEGACY_JSONRPC)),
    }
}

fn write_request<P: Serialize>(req: &Request, params: &P) -> Result<Vec<u8>, WireError> {
    let (version, jsonrpc) = version_keys(req.dialect, req.version);
    let out = RequestOut {
        version,
        jsonrpc,
        method: &req.method,
        id: req.id,
        params,
    };
    Ok(rmp_serde::to_vec_named(&out)?)
}

/// Encode a request. 1.0 requests are narrowed to the 1.0 layout.
pub fn encode_request(req: &Request) -> Result<Vec<u8>, WireError> {
    let v1 = req.version == Version::V1;
    match &req.params {
        Params::StandardSignIn(p) => write_request(req, p),
        Params::StandardDidAuth(p) => write_request(req, p),
        Params::DeclareOwner(p) => write_request(req, p),
        Params::GetMultiComments(p)
        | Params::GetMultiLikesAndCommentsCount(p)
        | Params::GetComments(p) => write_request(req, p),
        Params::GetMultiSubscribersCount(p) => write_request(req, p),
        Params::BackupServiceData(p) => write_request(req, p),
        Params::CreateChannel(p) if v1 => write_request(req, &CreateChannelParamsV1::from(p)),
        Params::CreateChannel(p) => write_request::<CreateChannelParams>(req, p),
        Params::PublishPost(p) if v1 => write_request(req, &PublishPostParamsV1::from(p)),
        Params::PublishPost(p) => write_request::<PublishPostParams>(req, p),
        Params::PostComment(p) if v1 => write_request(req, &PostCommentParamsV1::from(p)),
        Params::PostComment(p) => write_request::<PostCommentParams>(req, p),
        Params::EditPost(p) if v1 => write_request(req, &EditPostParamsV1::from(p)),
        Params::EditPost(p) => write_request::<EditPostParams>(req, p),
        Params::DeletePost(p) => write_request(req, p),
        Params::EditComment(p) if v1 => write_request(req, &EditCommentParamsV1::from(p)),
        Params::EditComment(p) => write_request::<EditCommentParams>(req, p),
        Params::DeleteComment(p) => write_request(req, p),
        Params::BlockComment(p) | Params::UnblockComment(p) => write_request(req, p),
        Params::PostLike(p) | Params::PostUnlike(p) => write_request(req, p),
        Params::GetMyChannels(p)
        | Params::GetChannels(p)
        | Params::GetSubscribedChannels(p)
        | Params::GetLikedPosts(p) => write_request(req, p),
        Params::GetChannelDetail(p)
        | Params::SubscribeChannel(p)
        | Params::UnsubscribeChannel(p) => write_request(req, p),
        Params::GetPosts(p) => write_request(req, p),
        Params::EnableNotification(p) | Params::GetStatistics(p) => write_request(req, p),
        Params::GetServiceVersion | Params::Unknown => write_request(req, &()),
    }
}

pub fn encode_response(resp: &Response) -> Result<Vec<u8>, WireError> {
    let (version, jsonrpc) = version_keys(resp.dialect, resp.version);
    let (result, error) = match &resp.body {
        Body::Result(r) => (Some(r), None),
        Body::Error(e) => (None, Some(e)),
    };
    let out = ResponseOut {
        version,
        jsonrpc,
        id: resp.id,
        result,
        error,
    };
    Ok(rmp_serde::to_vec_named(&out)?)
}

pub fn encode_notify(notify: &Notify) -> Result<Vec<u8>, WireError> {
    let (version, jsonrpc) = version_keys(notify.dialect, notify.version);
    let out = NotifyOut {
        version,
        jsonrpc,
        method: &notify.method,
        params: &notify.params,
    };
    Ok(rmp_serde::to_vec_named(&out)?)
}

// ── Client-side view ──────────────────────────────────────────────────────────

/// Loosely typed view of any outbound envelope, for clients and tests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnvelopeView {
    pub version: Option<String>,
    pub jsonrpc: Option<String>,
    pub method: Option<String>,
    pub id: Option<u64>,
    pub params: Option<rmpv::Value>,
    pub result: Option<rmpv::Value>,
    pub error: Option<ErrorDetail>,
}

impl EnvelopeView {
    /// Look up a key of the `result` map.
    pub fn result_field(&self, key: &str) -> Option<&rmpv::Value> {
        map_field(self.result.as_ref()?, key)
    }

    /// Look up a key of the `params` map.
    pub fn params_field(&self, key: &str) -> Option<&rmpv::Value> {
        map_field(self.params.as_ref()?, key)
    }
}

/// Look up a string key in a msgpack map value.
pub fn map_field<'a>(value: &'a rmpv::Value, key: &str) -> Option<&'a rmpv::Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

pub fn decode_view(bytes: &[u8]) -> Result<EnvelopeView, WireError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

//! Typed RPC messages.
//!
//! Every method has its own params struct; `Params` joins them into one sum
//! type so a decoded request is already the right variant. Results and
//! notifications follow the same pattern on the way out.

use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ErrCode;
use crate::method::Method;
use crate::obj::{ChannelRecord, CommentRecord, PostCounts, PostRecord, PLACEHOLDER};
use crate::wire::{Dialect, Version};

// ── Binary fields ─────────────────────────────────────────────────────────────

/// A binary field packed as msgpack `bin`.
///
/// Decoding accepts `bin` only; a `str` in a binary slot is a protocol
/// violation and fails the whole params struct.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawBytes(pub Vec<u8>);

impl RawBytes {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RawBytes {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl From<&[u8]> for RawBytes {
    fn from(v: &[u8]) -> Self {
        Self(v.to_vec())
    }
}

impl Serialize for RawBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_bytes::serialize(&self.0, serializer)
    }
}

struct RawBytesVisitor;

impl<'de> de::Visitor<'de> for RawBytesVisitor {
    type Value = RawBytes;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a raw byte string")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<RawBytes, E> {
        Ok(RawBytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<RawBytes, E> {
        Ok(RawBytes(v))
    }
}

impl<'de> Deserialize<'de> for RawBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_bytes(RawBytesVisitor)
    }
}

// ── Params ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignInParams {
    pub document: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DidAuthParams {
    pub user_name: String,
    pub jwt_vp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeclareOwnerParams {
    pub nonce: String,
    pub owner_did: String,
}

/// Bounded listing over comments or posts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub access_token: String,
    pub channel_id: i64,
    pub post_id: i64,
    pub by: i64,
    pub upper_bound: i64,
    pub lower_bound: i64,
    pub max_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscribersCountParams {
    pub access_token: String,
    pub channel_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupParams {
    pub access_token: String,
    pub drive_name: String,
    pub drive_url: String,
    pub drive_access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenParams {
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateChannelParams {
    pub access_token: String,
    pub name: String,
    pub introduction: String,
    pub avatar: RawBytes,
    pub tip_methods: String,
    pub proof: String,
}

/// 1.0 layout of `create_channel`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateChannelParamsV1 {
    pub access_token: String,
    pub name: String,
    pub introduction: String,
    pub avatar: RawBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishPostParams {
    pub access_token: String,
    pub channel_id: u64,
    pub content: RawBytes,
    pub thumbnails: RawBytes,
    pub hash_id: String,
    pub proof: String,
}

/// 1.0 layout of `publish_post`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishPostParamsV1 {
    pub access_token: String,
    pub channel_id: u64,
    pub content: RawBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostCommentParams {
    pub access_token: String,
    pub channel_id: u64,
    pub post_id: u64,
    /// Comment being replied to; 0 for a top-level comment.
    pub comment_id: u64,
    pub content: RawBytes,
    pub thumbnails: RawBytes,
    pub hash_id: String,
    pub proof: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditPostParams {
    pub access_token: String,
    pub channel_id: u64,
    /// Post being edited.
    pub id: u64,
    pub content: RawBytes,
    pub thumbnails: RawBytes,
    pub hash_id: String,
    pub proof: String,
}

/// 1.0 layout of `edit_post`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditPostParamsV1 {
    pub access_token: String,
    pub channel_id: u64,
    pub id: u64,
    pub content: RawBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostIdParams {
    pub access_token: String,
    pub channel_id: u64,
    pub id: u64,
}

/// 1.0 layout of `post_comment`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostCommentParamsV1 {
    pub access_token: String,
    pub channel_id: u64,
    pub post_id: u64,
    pub comment_id: u64,
    pub content: RawBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditCommentParams {
    pub access_token: String,
    pub channel_id: u64,
    pub post_id: u64,
    /// Comment being edited.
    pub id: u64,
    /// Comment it replies to. Carried for layout compatibility; never changed.
    pub comment_id: u64,
    pub content: RawBytes,
    pub thumbnails: RawBytes,
    pub hash_id: String,
    pub proof: String,
}

/// 1.0 layout of `edit_comment`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditCommentParamsV1 {
    pub access_token: String,
    pub channel_id: u64,
    pub post_id: u64,
    pub id: u64,
    pub comment_id: u64,
    pub content: RawBytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentIdParams {
    pub access_token: String,
    pub channel_id: u64,
    pub post_id: u64,
    pub id: u64,
}

/// Comment targeted by a moderation call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerateCommentParams {
    pub access_token: String,
    pub channel_id: u64,
    pub post_id: u64,
    pub comment_id: u64,
}

/// Target of a like; `comment_id` 0 targets the post itself.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LikeParams {
    pub access_token: String,
    pub channel_id: u64,
    pub post_id: u64,
    pub comment_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListParams {
    pub access_token: String,
    pub by: i64,
    pub upper_bound: i64,
    pub lower_bound: i64,
    pub max_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdParams {
    pub access_token: String,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostListParams {
    pub access_token: String,
    pub channel_id: u64,
    pub by: i64,
    pub upper_bound: i64,
    pub lower_bound: i64,
    pub max_count: i64,
}

// 1.0 clients never send these fields; fill the placeholders legacy readers expect.

impl From<CreateChannelParamsV1> for CreateChannelParams {
    fn from(p: CreateChannelParamsV1) -> Self {
        Self {
            access_token: p.access_token,
            name: p.name,
            introduction: p.introduction,
            avatar: p.avatar,
            tip_methods: PLACEHOLDER.to_string(),
            proof: PLACEHOLDER.to_string(),
        }
    }
}

impl From<&CreateChannelParams> for CreateChannelParamsV1 {
    fn from(p: &CreateChannelParams) -> Self {
        Self {
            access_token: p.access_token.clone(),
            name: p.name.clone(),
            introduction: p.introduction.clone(),
            avatar: p.avatar.clone(),
        }
    }
}

impl From<PublishPostParamsV1> for PublishPostParams {
    fn from(p: PublishPostParamsV1) -> Self {
        Self {
            access_token: p.access_token,
            channel_id: p.channel_id,
            content: p.content,
            thumbnails: RawBytes::default(),
            hash_id: PLACEHOLDER.to_string(),
            proof: PLACEHOLDER.to_string(),
        }
    }
}

impl From<&PublishPostParams> for PublishPostParamsV1 {
    fn from(p: &PublishPostParams) -> Self {
        Self {
            access_token: p.access_token.clone(),
            channel_id: p.channel_id,
            content: p.content.clone(),
        }
    }
}

impl From<PostCommentParamsV1> for PostCommentParams {
    fn from(p: PostCommentParamsV1) -> Self {
        Self {
            access_token: p.access_token,
            channel_id: p.channel_id,
            post_id: p.post_id,
            comment_id: p.comment_id,
            content: p.content,
            thumbnails: RawBytes::default(),
            hash_id: PLACEHOLDER.to_string(),
            proof: PLACEHOLDER.to_string(),
        }
    }
}

impl From<&PostCommentParams> for PostCommentParamsV1 {
    fn from(p: &PostCommentParams) -> Self {
        Self {
            access_token: p.access_token.clone(),
            channel_id: p.channel_id,
            post_id: p.post_id,
            comment_id: p.comment_id,
            content: p.content.clone(),
        }
    }
}

impl From<EditPostParamsV1> for EditPostParams {
    fn from(p: EditPostParamsV1) -> Self {
        Self {
            access_token: p.access_token,
            channel_id: p.channel_id,
            id: p.id,
            content: p.content,
            thumbnails: RawBytes::default(),
            hash_id: PLACEHOLDER.to_string(),
            proof: PLACEHOLDER.to_string(),
        }
    }
}

impl From<&EditPostParams> for EditPostParamsV1 {
    fn from(p: &EditPostParams) -> Self {
        Self {
            access_token: p.access_token.clone(),
            channel_id: p.channel_id,
            id: p.id,
            content: p.content.clone(),
        }
    }
}

impl From<EditCommentParamsV1> for EditCommentParams {
    fn from(p: EditCommentParamsV1) -> Self {
        Self {
            access_token: p.access_token,
            channel_id: p.channel_id,
            post_id: p.post_id,
            id: p.id,
            comment_id: p.comment_id,
            content: p.content,
            thumbnails: RawBytes::default(),
            hash_id: PLACEHOLDER.to_string(),
            proof: PLACEHOLDER.to_string(),
        }
    }
}

impl From<&EditCommentParams> for EditCommentParamsV1 {
    fn from(p: &EditCommentParams) -> Self {
        Self {
            access_token: p.access_token.clone(),
            channel_id: p.channel_id,
            post_id: p.post_id,
            id: p.id,
            comment_id: p.comment_id,
            content: p.content.clone(),
        }
    }
}

/// Params of every known method. `Unknown` is the placeholder for requests
/// whose method or version is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Params {
    StandardSignIn(SignInParams),
    StandardDidAuth(DidAuthParams),
    DeclareOwner(DeclareOwnerParams),
    GetMultiComments(QueryParams),
    GetMultiLikesAndCommentsCount(QueryParams),
    GetMultiSubscribersCount(SubscribersCountParams),
    BackupServiceData(BackupParams),

    CreateChannel(CreateChannelParams),
    PublishPost(PublishPostParams),
    EditPost(EditPostParams),
    DeletePost(PostIdParams),
    PostComment(PostCommentParams),
    EditComment(EditCommentParams),
    DeleteComment(CommentIdParams),
    BlockComment(ModerateCommentParams),
    UnblockComment(ModerateCommentParams),
    PostLike(LikeParams),
    PostUnlike(LikeParams),
    GetMyChannels(ListParams),
    GetChannels(ListParams),
    GetChannelDetail(IdParams),
    GetSubscribedChannels(ListParams),
    GetPosts(PostListParams),
    GetLikedPosts(ListParams),
    GetComments(QueryParams),
    GetStatistics(TokenParams),
    SubscribeChannel(IdParams),
    UnsubscribeChannel(IdParams),
    EnableNotification(TokenParams),
    GetServiceVersion,

    Unknown,
}

impl Params {
    /// Empty params for a method.
    pub fn default_for(method: Method) -> Self {
        match method {
            Method::StandardSignIn => Self::StandardSignIn(Default::default()),
            Method::StandardDidAuth => Self::StandardDidAuth(Default::default()),
            Method::DeclareOwner => Self::DeclareOwner(Default::default()),
            Method::GetMultiComments => Self::GetMultiComments(Default::default()),
            Method::GetMultiLikesAndCommentsCount => {
                Self::GetMultiLikesAndCommentsCount(Default::default())
            }
            Method::GetMultiSubscribersCount => Self::GetMultiSubscribersCount(Default::default()),
            Method::BackupServiceData => Self::BackupServiceData(Default::default()),
            Method::CreateChannel => Self::CreateChannel(Default::default()),
            Method::PublishPost => Self::PublishPost(Default::default()),
            Method::EditPost => Self::EditPost(Default::default()),
            Method::DeletePost => Self::DeletePost(Default::default()),
            Method::PostComment => Self::PostComment(Default::default()),
            Method::EditComment => Self::EditComment(Default::default()),
            Method::DeleteComment => Self::DeleteComment(Default::default()),
            Method::BlockComment => Self::BlockComment(Default::default()),
            Method::UnblockComment => Self::UnblockComment(Default::default()),
            Method::PostLike => Self::PostLike(Default::default()),
            Method::PostUnlike => Self::PostUnlike(Default::default()),
            Method::GetMyChannels => Self::GetMyChannels(Default::default()),
            Method::GetChannels => Self::GetChannels(Default::default()),
            Method::GetChannelDetail => Self::GetChannelDetail(Default::default()),
            Method::GetSubscribedChannels => Self::GetSubscribedChannels(Default::default()),
            Method::GetPosts => Self::GetPosts(Default::default()),
            Method::GetLikedPosts => Self::GetLikedPosts(Default::default()),
            Method::GetComments => Self::GetComments(Default::default()),
            Method::GetStatistics => Self::GetStatistics(Default::default()),
            Method::SubscribeChannel => Self::SubscribeChannel(Default::default()),
            Method::UnsubscribeChannel => Self::UnsubscribeChannel(Default::default()),
            Method::EnableNotification => Self::EnableNotification(Default::default()),
            Method::GetServiceVersion => Self::GetServiceVersion,
        }
    }

    pub fn method(&self) -> Option<Method> {
        let m = match self {
            Self::StandardSignIn(_) => Method::StandardSignIn,
            Self::StandardDidAuth(_) => Method::StandardDidAuth,
            Self::DeclareOwner(_) => Method::DeclareOwner,
            Self::GetMultiComments(_) => Method::GetMultiComments,
            Self::GetMultiLikesAndCommentsCount(_) => Method::GetMultiLikesAndCommentsCount,
            Self::GetMultiSubscribersCount(_) => Method::GetMultiSubscribersCount,
            Self::BackupServiceData(_) => Method::BackupServiceData,
            Self::CreateChannel(_) => Method::CreateChannel,
            Self::PublishPost(_) => Method::PublishPost,
            Self::EditPost(_) => Method::EditPost,
            Self::DeletePost(_) => Method::DeletePost,
            Self::PostComment(_) => Method::PostComment,
            Self::EditComment(_) => Method::EditComment,
            Self::DeleteComment(_) => Method::DeleteComment,
            Self::BlockComment(_) => Method::BlockComment,
            Self::UnblockComment(_) => Method::UnblockComment,
            Self::PostLike(_) => Method::PostLike,
            Self::PostUnlike(_) => Method::PostUnlike,
            Self::GetMyChannels(_) => Method::GetMyChannels,
            Self::GetChannels(_) => Method::GetChannels,
            Self::GetChannelDetail(_) => Method::GetChannelDetail,
            Self::GetSubscribedChannels(_) => Method::GetSubscribedChannels,
            Self::GetPosts(_) => Method::GetPosts,
            Self::GetLikedPosts(_) => Method::GetLikedPosts,
            Self::GetComments(_) => Method::GetComments,
            Self::GetStatistics(_) => Method::GetStatistics,
            Self::SubscribeChannel(_) => Method::SubscribeChannel,
            Self::UnsubscribeChannel(_) => Method::UnsubscribeChannel,
            Self::EnableNotification(_) => Method::EnableNotification,
            Self::GetServiceVersion => Method::GetServiceVersion,
            Self::Unknown => return None,
        };
        Some(m)
    }

    /// The access token embedded in the params, if the method carries one.
    pub fn access_token(&self) -> Option<&str> {
        let tk = match self {
            Self::GetMultiComments(p)
            | Self::GetMultiLikesAndCommentsCount(p)
            | Self::GetComments(p) => &p.access_token,
            Self::GetMultiSubscribersCount(p) => &p.access_token,
            Self::BackupServiceData(p) => &p.access_token,
            Self::CreateChannel(p) => &p.access_token,
            Self::PublishPost(p) => &p.access_token,
            Self::EditPost(p) => &p.access_token,
            Self::DeletePost(p) => &p.access_token,
            Self::PostComment(p) => &p.access_token,
            Self::EditComment(p) => &p.access_token,
            Self::DeleteComment(p) => &p.access_token,
            Self::BlockComment(p) | Self::UnblockComment(p) => &p.access_token,
            Self::PostLike(p) | Self::PostUnlike(p) => &p.access_token,
            Self::GetMyChannels(p)
            | Self::GetChannels(p)
            | Self::GetSubscribedChannels(p)
            | Self::GetLikedPosts(p) => &p.access_token,
            Self::GetChannelDetail(p) | Self::SubscribeChannel(p) | Self::UnsubscribeChannel(p) => {
                &p.access_token
            }
            Self::GetPosts(p) => &p.access_token,
            Self::EnableNotification(p) | Self::GetStatistics(p) => &p.access_token,
            Self::StandardSignIn(_)
            | Self::StandardDidAuth(_)
            | Self::DeclareOwner(_)
            | Self::GetServiceVersion
            | Self::Unknown => return None,
        };
        Some(tk.as_str())
    }
}

// ── Envelopes ─────────────────────────────────────────────────────────────────

/// A decoded inbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub dialect: Dialect,
    pub version: Version,
    /// Method name exactly as received, kept for placeholders.
    pub method: String,
    pub id: u64,
    pub params: Params,
}

impl Request {
    pub fn new(version: Version, id: u64, params: Params) -> Self {
        let method = params.method().map(|m| m.name()).unwrap_or_default();
        Self {
            dialect: Dialect::Versioned,
            version,
            method: method.to_string(),
            id,
            params,
        }
    }

    pub fn legacy(id: u64, params: Params) -> Self {
        Self {
            dialect: Dialect::Legacy,
            ..Self::new(Version::V1, id, params)
        }
    }

    /// Placeholder for a request that could not be typed.
    pub fn placeholder(dialect: Dialect, version: Version, method: String, id: u64) -> Self {
        Self {
            dialect,
            version,
            method,
            id,
            params: Params::Unknown,
        }
    }

    pub fn known_method(&self) -> Option<Method> {
        self.params.method()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: i64,
    pub message: String,
}

impl From<ErrCode> for ErrorDetail {
    fn from(code: ErrCode) -> Self {
        Self {
            code: code.code(),
            message: code.describe(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Result(ResultPayload),
    Error(ErrorDetail),
}

/// An outbound reply: a result or an error, keyed by transaction id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub dialect: Dialect,
    pub version: Version,
    pub id: u64,
    pub body: Body,
}

impl Response {
    /// A result answering `request`, echoing its dialect and version.
    pub fn reply(request: &Request, payload: ResultPayload) -> Self {
        Self {
            dialect: request.dialect,
            version: request.version,
            id: request.id,
            body: Body::Result(payload),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, Body::Error(_))
    }

    pub fn error_code(&self) -> Option<i64> {
        match &self.body {
            Body::Error(e) => Some(e.code),
            Body::Result(_) => None,
        }
    }
}

/// A fire-and-forget push to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notify {
    pub dialect: Dialect,
    pub version: Version,
    pub method: String,
    pub params: NotifyPayload,
}

// ── Results ───────────────────────────────────────────────────────────────────

/// Estimated packed size, used to bound pages without re-serializing.
pub trait WireSize {
    fn wire_size(&self) -> usize;
}

/// Fixed bytes of a page envelope around its rows:
/// `{version, id, result: {is_last, <rows>: [..]}}`.
pub const PAGE_OVERHEAD: usize = 64;

/// Key plus marker plus a worst-case 64-bit integer.
const INT_FIELD: usize = 9;
/// Marker plus 32-bit length header.
const VAR_HEADER: usize = 5;

fn int_fields(keys: &[&str]) -> usize {
    keys.iter().map(|k| k.len() + 1 + INT_FIELD).sum()
}

fn var_field(key: &str, len: usize) -> usize {
    key.len() + 1 + VAR_HEADER + len
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SignInResult {
    pub jwt_challenge: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DidAuthResult {
    pub access_token: String,
}

/// Progress of owner declaration. Only `owner_declared` is produced here;
/// `did` and `transaction_payload` are packed as nil.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DeclareOwnerResult {
    pub phase: String,
    pub did: Option<String>,
    pub transaction_payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CommentEntry {
    pub channel_id: u64,
    pub post_id: u64,
    pub comment_id: u64,
    pub refer_comment_id: u64,
    pub status: u8,
    pub user_did: String,
    pub user_name: String,
    pub content: RawBytes,
    pub likes: u64,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<RawBytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
}

impl CommentEntry {
    pub fn from_record(rec: &CommentRecord, version: Version) -> Self {
        let content = if rec.status.is_readable() {
            RawBytes(rec.content.clone())
        } else {
            RawBytes::default()
        };
        let v2 = version >= Version::V2;
        Self {
            channel_id: rec.channel_id,
            post_id: rec.post_id,
            comment_id: rec.comment_id,
            refer_comment_id: rec.refer_comment_id,
            status: rec.status as u8,
            user_did: rec.user_did.clone(),
            user_name: rec.user_name.clone(),
            content,
            likes: rec.likes,
            created_at: rec.created_at,
            updated_at: rec.updated_at,
            thumbnails: v2.then(|| RawBytes(rec.thumbnails.clone())),
            hash_id: v2.then(|| rec.hash_id.clone()),
            proof: v2.then(|| rec.proof.clone()),
        }
    }
}

impl WireSize for CommentEntry {
    fn wire_size(&self) -> usize {
        let mut size = 1
            + int_fields(&[
                "channel_id",
                "post_id",
                "comment_id",
                "refer_comment_id",
                "status",
                "likes",
                "created_at",
                "updated_at",
            ])
            + var_field("user_did", self.user_did.len())
            + var_field("user_name", self.user_name.len())
            + var_field("content", self.content.len());
        if let Some(t) = &self.thumbnails {
            size += var_field("thumbnails", t.len());
        }
        if let Some(h) = &self.hash_id {
            size += var_field("hash_id", h.len());
        }
        if let Some(p) = &self.proof {
            size += var_field("proof", p.len());
        }
        size
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CommentsPage {
    pub is_last: bool,
    pub comments: Vec<CommentEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PostCountEntry {
    pub channel_id: u64,
    pub post_id: u64,
    pub comments_count: u64,
    pub likes_count: u64,
}

impl From<PostCounts> for PostCountEntry {
    fn from(c: PostCounts) -> Self {
        Self {
            channel_id: c.channel_id,
            post_id: c.post_id,
            comments_count: c.comments,
            likes_count: c.likes,
        }
    }
}

impl WireSize for PostCountEntry {
    fn wire_size(&self) -> usize {
        1 + int_fields(&["channel_id", "post_id", "comments_count", "likes_count"])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PostCountsPage {
    pub is_last: bool,
    pub posts: Vec<PostCountEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SubscriberCountEntry {
    pub channel_id: u64,
    pub subscribers_count: u64,
}

impl WireSize for SubscriberCountEntry {
    fn wire_size(&self) -> usize {
        1 + int_fields(&["channel_id", "subscribers_count"])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SubscriberCountsPage {
    pub is_last: bool,
    pub channels: Vec<SubscriberCountEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IdResult {
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChannelEntry {
    pub id: u64,
    pub name: String,
    pub introduction: String,
    pub subscribers: u64,
    pub last_update: u64,
    pub avatar: RawBytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tip_methods: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
}

impl ChannelEntry {
    pub fn from_record(rec: &ChannelRecord, version: Version) -> Self {
        let v2 = version >= Version::V2;
        Self {
            id: rec.channel_id,
            name: rec.name.clone(),
            introduction: rec.intro.clone(),
            subscribers: rec.subscribers,
            last_update: rec.updated_at,
            avatar: RawBytes(rec.avatar.clone()),
            tip_methods: v2.then(|| rec.tip_methods.clone()),
            proof: v2.then(|| rec.proof.clone()),
        }
    }
}

/// Row layout of `get_my_channels`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MyChannelEntry {
    pub id: u64,
    pub name: String,
    pub introduction: String,
    pub subscribers: u64,
}

impl From<&ChannelRecord> for MyChannelEntry {
    fn from(rec: &ChannelRecord) -> Self {
        Self {
            id: rec.channel_id,
            name: rec.name.clone(),
            introduction: rec.intro.clone(),
            subscribers: rec.subscribers,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PostEntry {
    pub channel_id: u64,
    pub id: u64,
    pub content: RawBytes,
    pub comments: u64,
    pub likes: u64,
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<RawBytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
}

impl PostEntry {
    pub fn from_record(rec: &PostRecord, version: Version) -> Self {
        let v2 = version >= Version::V2;
        let content = if rec.status.is_readable() {
            RawBytes(rec.content.clone())
        } else {
            RawBytes::default()
        };
        Self {
            channel_id: rec.channel_id,
            id: rec.post_id,
            content,
            comments: rec.comments,
            likes: rec.likes,
            created_at: rec.created_at,
            thumbnails: v2.then(|| RawBytes(rec.thumbnails.clone())),
            hash_id: v2.then(|| rec.hash_id.clone()),
            proof: v2.then(|| rec.proof.clone()),
        }
    }
}

/// Row layout of the `get_comments` listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LegacyCommentEntry {
    pub channel_id: u64,
    pub post_id: u64,
    pub id: u64,
    /// Comment this one replies to.
    pub comment_id: u64,
    pub user_name: String,
    pub content: RawBytes,
    pub likes: u64,
    pub created_at: u64,
}

impl From<&CommentRecord> for LegacyCommentEntry {
    fn from(rec: &CommentRecord) -> Self {
        let content = if rec.status.is_readable() {
            RawBytes(rec.content.clone())
        } else {
            RawBytes::default()
        };
        Self {
            channel_id: rec.channel_id,
            post_id: rec.post_id,
            id: rec.comment_id,
            comment_id: rec.refer_comment_id,
            user_name: rec.user_name.clone(),
            content,
            likes: rec.likes,
            created_at: rec.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Statistics {
    /// Owner DID, or `NA` before one has signed in.
    pub did: String,
    pub connecting_clients: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ServiceVersion {
    pub version: String,
    pub version_code: i64,
}

/// Every result body the service produces. Serializes as the inner value;
/// `Empty` packs as `nil`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResultPayload {
    Empty,
    SignIn(SignInResult),
    DidAuth(DidAuthResult),
    DeclareOwner(DeclareOwnerResult),
    Comments(CommentsPage),
    PostCounts(PostCountsPage),
    SubscriberCounts(SubscriberCountsPage),
    Created(IdResult),
    Channels(Vec<ChannelEntry>),
    MyChannels(Vec<MyChannelEntry>),
    Channel(ChannelEntry),
    Posts(Vec<PostEntry>),
    LegacyComments(Vec<LegacyCommentEntry>),
    Statistics(Statistics),
    ServiceVersion(ServiceVersion),
}

impl ResultPayload {
    /// Empty result shape for a method.
    pub fn default_for(method: Method) -> Self {
        match method {
            Method::StandardSignIn => Self::SignIn(Default::default()),
            Method::StandardDidAuth => Self::DidAuth(Default::default()),
            Method::DeclareOwner => Self::DeclareOwner(Default::default()),
            Method::GetMultiComments => Self::Comments(Default::default()),
            Method::GetMultiLikesAndCommentsCount => Self::PostCounts(Default::default()),
            Method::GetMultiSubscribersCount => Self::SubscriberCounts(Default::default()),
            Method::CreateChannel | Method::PublishPost | Method::PostComment => {
                Self::Created(Default::default())
            }
            Method::GetChannels | Method::GetSubscribedChannels => Self::Channels(Vec::new()),
            Method::GetMyChannels => Self::MyChannels(Vec::new()),
            Method::GetChannelDetail => Self::Channel(Default::default()),
            Method::GetPosts | Method::GetLikedPosts => Self::Posts(Vec::new()),
            Method::GetComments => Self::LegacyComments(Vec::new()),
            Method::GetStatistics => Self::Statistics(Default::default()),
            Method::GetServiceVersion => Self::ServiceVersion(Default::default()),
            Method::BackupServiceData
            | Method::EditPost
            | Method::DeletePost
            | Method::EditComment
            | Method::DeleteComment
            | Method::BlockComment
            | Method::UnblockComment
            | Method::PostLike
            | Method::PostUnlike
            | Method::SubscribeChannel
            | Method::UnsubscribeChannel
            | Method::EnableNotification => Self::Empty,
        }
    }
}

// ── Notifications ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NewPostNotify {
    pub channel_id: u64,
    pub id: u64,
    pub content: RawBytes,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NewCommentNotify {
    pub channel_id: u64,
    pub post_id: u64,
    pub id: u64,
    pub comment_id: u64,
    pub user_name: String,
    pub content: RawBytes,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NewLikesNotify {
    pub channel_id: u64,
    pub post_id: u64,
    /// 0 when the post itself was liked.
    pub comment_id: u64,
    /// Like total of the target after this like.
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NotifyPayload {
    Empty,
    NewPost(NewPostNotify),
    NewComment(NewCommentNotify),
    NewLikes(NewLikesNotify),
}

//! Domain records shared by the store, the handlers, and the codec.

use crate::error::ErrCode;

pub const CHAN_ID_START: u64 = 1;
pub const POST_ID_START: u64 = 1;
pub const CMT_ID_START: u64 = 1;

/// Placeholder written for text fields a 1.0 client cannot supply.
pub const PLACEHOLDER: &str = "NA";

/// Resolved identity behind an access token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInfo {
    pub user_id: u64,
    pub did: String,
    pub name: String,
    pub email: String,
    pub is_owner: bool,
}

/// Lifecycle of posts and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    #[default]
    Available = 0,
    Deleted = 1,
    Edited = 2,
    /// Hidden by the channel owner; comments only.
    Blocked = 3,
}

impl Status {
    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::Deleted,
            2 => Self::Edited,
            3 => Self::Blocked,
            _ => Self::Available,
        }
    }

    /// Content is only served while the row is readable.
    pub fn is_readable(self) -> bool {
        !matches!(self, Self::Deleted | Self::Blocked)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelRecord {
    pub channel_id: u64,
    pub name: String,
    pub intro: String,
    pub avatar: Vec<u8>,
    pub created_at: u64,
    pub updated_at: u64,
    pub subscribers: u64,
    pub next_post_id: u64,
    pub tip_methods: String,
    pub proof: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostRecord {
    pub channel_id: u64,
    pub post_id: u64,
    pub created_at: u64,
    pub updated_at: u64,
    pub comments: u64,
    pub likes: u64,
    pub status: Status,
    pub content: Vec<u8>,
    pub thumbnails: Vec<u8>,
    pub hash_id: String,
    pub proof: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentRecord {
    pub channel_id: u64,
    pub post_id: u64,
    pub comment_id: u64,
    pub refer_comment_id: u64,
    pub user_did: String,
    pub user_name: String,
    pub content: Vec<u8>,
    pub likes: u64,
    pub status: Status,
    pub created_at: u64,
    pub updated_at: u64,
    pub thumbnails: Vec<u8>,
    pub hash_id: String,
    pub proof: String,
}

/// Per-post counters served by `get_multi_likes_and_comments_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostCounts {
    pub channel_id: u64,
    pub post_id: u64,
    pub comments: u64,
    pub likes: u64,
}

// ── Query criteria ────────────────────────────────────────────────────────────

/// Column a query is bounded and ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryField {
    #[default]
    None,
    Id,
    UpdatedAt,
    CreatedAt,
}

impl QueryField {
    pub fn from_wire(by: i64) -> Result<Self, ErrCode> {
        match by {
            0 => Ok(Self::None),
            1 => Ok(Self::Id),
            2 => Ok(Self::UpdatedAt),
            3 => Ok(Self::CreatedAt),
            _ => Err(ErrCode::InvalidArgument),
        }
    }

    /// Ids ascend, timestamps descend (newest first).
    pub fn ascending(self) -> bool {
        !matches!(self, Self::UpdatedAt | Self::CreatedAt)
    }
}

/// Bounds and limit applied to a listing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryCriteria {
    pub by: QueryField,
    /// Inclusive lower bound on `by`.
    pub lower: Option<u64>,
    /// Inclusive upper bound on `by`.
    pub upper: Option<u64>,
    pub limit: Option<u64>,
}

impl QueryCriteria {
    /// Build from wire values. Non-positive bounds and counts mean "unset".
    pub fn from_wire(by: i64, upper: i64, lower: i64, max_count: i64) -> Result<Self, ErrCode> {
        let by = QueryField::from_wire(by)?;
        let positive = |v: i64| (v > 0).then_some(v as u64);
        let (lower, upper) = if by == QueryField::None {
            (None, None)
        } else {
            (positive(lower), positive(upper))
        };
        Ok(Self {
            by,
            lower,
            upper,
            limit: positive(max_count),
        })
    }

    pub fn all() -> Self {
        Self::default()
    }
}

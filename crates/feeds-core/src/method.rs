//! Method registry: the static table of every RPC method the service knows.
//!
//! Each method carries the access level a caller must hold and the listener
//! family that serves it. The table is built at compile time and never
//! mutated, so lookups need no locking.

use std::fmt;

/// Authorization tier required to invoke a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// No token resolution at all.
    Anyone,
    /// Token must resolve to a known user.
    Member,
    /// Token must resolve to the service owner.
    Owner,
}

/// Which listener serves a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// DID sign-in flow.
    Auth,
    /// Paginated multi-queries over channel data.
    Channel,
    /// Owner-only service maintenance.
    Service,
    /// Feeds CRUD; replies are delivered by the handler itself.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    StandardSignIn,
    StandardDidAuth,
    DeclareOwner,
    GetMultiComments,
    GetMultiLikesAndCommentsCount,
    GetMultiSubscribersCount,
    BackupServiceData,

    CreateChannel,
    PublishPost,
    EditPost,
    DeletePost,
    PostComment,
    EditComment,
    DeleteComment,
    BlockComment,
    UnblockComment,
    PostLike,
    PostUnlike,
    GetMyChannels,
    GetChannels,
    GetChannelDetail,
    GetSubscribedChannels,
    GetPosts,
    GetLikedPosts,
    GetComments,
    GetStatistics,
    SubscribeChannel,
    UnsubscribeChannel,
    EnableNotification,
    GetServiceVersion,
}

/// Static facts about one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub method: Method,
    pub name: &'static str,
    pub access: Access,
    pub family: Family,
    /// False for methods whose params carry no `access_token`.
    pub has_token: bool,
}

const fn desc(
    method: Method,
    name: &'static str,
    access: Access,
    family: Family,
    has_token: bool,
) -> MethodDescriptor {
    MethodDescriptor {
        method,
        name,
        access,
        family,
        has_token,
    }
}

/// Every registered method, in registration order.
pub static REGISTRY: [MethodDescriptor; 30] = [
    desc(Method::StandardSignIn, "standard_sign_in", Access::Anyone, Family::Auth, false),
    desc(Method::StandardDidAuth, "standard_did_auth", Access::Anyone, Family::Auth, false),
    desc(Method::DeclareOwner, "declare_owner", Access::Anyone, Family::Auth, false),
    desc(Method::GetMultiComments, "get_multi_comments", Access::Member, Family::Channel, true),
    desc(
        Method::GetMultiLikesAndCommentsCount,
        "get_multi_likes_and_comments_count",
        Access::Member,
        Family::Channel,
        true,
    ),
    desc(
        Method::GetMultiSubscribersCount,
        "get_multi_subscribers_count",
        Access::Member,
        Family::Channel,
        true,
    ),
    desc(Method::BackupServiceData, "backup_service_data", Access::Owner, Family::Service, true),
    desc(Method::CreateChannel, "create_channel", Access::Owner, Family::Legacy, true),
    desc(Method::PublishPost, "publish_post", Access::Owner, Family::Legacy, true),
    desc(Method::EditPost, "edit_post", Access::Owner, Family::Legacy, true),
    desc(Method::DeletePost, "delete_post", Access::Owner, Family::Legacy, true),
    desc(Method::PostComment, "post_comment", Access::Member, Family::Legacy, true),
    desc(Method::EditComment, "edit_comment", Access::Member, Family::Legacy, true),
    desc(Method::DeleteComment, "delete_comment", Access::Member, Family::Legacy, true),
    desc(Method::BlockComment, "block_comment", Access::Owner, Family::Legacy, true),
    desc(Method::UnblockComment, "unblock_comment", Access::Owner, Family::Legacy, true),
    desc(Method::PostLike, "post_like", Access::Member, Family::Legacy, true),
    desc(Method::PostUnlike, "post_unlike", Access::Member, Family::Legacy, true),
    desc(Method::GetMyChannels, "get_my_channels", Access::Owner, Family::Legacy, true),
    desc(Method::GetChannels, "get_channels", Access::Member, Family::Legacy, true),
    desc(Method::GetChannelDetail, "get_channel_detail", Access::Member, Family::Legacy, true),
    desc(
        Method::GetSubscribedChannels,
        "get_subscribed_channels",
        Access::Member,
        Family::Legacy,
        true,
    ),
    desc(Method::GetPosts, "get_posts", Access::Member, Family::Legacy, true),
    desc(Method::GetLikedPosts, "get_liked_posts", Access::Member, Family::Legacy, true),
    desc(Method::GetComments, "get_comments", Access::Member, Family::Legacy, true),
    desc(Method::GetStatistics, "get_statistics", Access::Member, Family::Legacy, true),
    desc(Method::SubscribeChannel, "subscribe_channel", Access::Member, Family::Legacy, true),
    desc(Method::UnsubscribeChannel, "unsubscribe_channel", Access::Member, Family::Legacy, true),
    desc(Method::EnableNotification, "enable_notification", Access::Member, Family::Legacy, true),
    desc(Method::GetServiceVersion, "get_service_version", Access::Anyone, Family::Legacy, false),
];

impl Method {
    /// Exact-match lookup by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        REGISTRY.iter().find(|d| d.name == name).map(|d| d.method)
    }

    pub fn descriptor(self) -> &'static MethodDescriptor {
        // REGISTRY is declared in enum order.
        &REGISTRY[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn access(self) -> Access {
        self.descriptor().access
    }

    pub fn family(self) -> Family {
        self.descriptor().family
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Notification methods pushed to peers without a transaction id.
pub mod notify {
    pub const NEW_POST: &str = "new_post";
    pub const NEW_COMMENT: &str = "new_comment";
    pub const NEW_LIKES: &str = "new_likes";
    pub const BACKUP_SERVICE_DATA: &str = "backup_service_data";
}

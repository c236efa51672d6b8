//! Legacy listener: the feeds CRUD methods.
//!
//! Every handler here writes its own reply on the direct transport path and
//! returns `Outcome::Finished`, so the router never marshals a second reply.
//! Errors are still returned to the router, which answers them through the
//! delivery queue. Activity on a channel is pushed to every active
//! subscriber of that channel as a notify.

use std::sync::Arc;

use feeds_core::method::{notify, Access, Method};
use feeds_core::obj::{QueryCriteria, UserInfo, PLACEHOLDER};
use feeds_core::rpc::{
    ChannelEntry, IdResult, LegacyCommentEntry, ListParams, MyChannelEntry, NewCommentNotify,
    NewLikesNotify, NewPostNotify, Notify, NotifyPayload, Params, PostEntry, Request, Response,
    ResultPayload, ServiceVersion, Statistics,
};
use feeds_core::ErrCode;

use crate::did::OWNER_USER_ID;
use crate::outbox::Outbox;
use crate::service::{CallContext, Listener, MethodTable, Outcome};
use crate::store::FeedsStore;
use crate::subscribers::{ActiveSubscriber, ActiveSubscribers};

pub struct LegacyMethod {
    table: MethodTable<LegacyMethod>,
    store: Arc<FeedsStore>,
    subscribers: ActiveSubscribers,
    version_code: i64,
}

impl LegacyMethod {
    pub fn new(store: Arc<FeedsStore>, subscribers: ActiveSubscribers, version_code: i64) -> Self {
        let table = MethodTable::new()
            .with(Method::CreateChannel, Self::create_channel)
            .with(Method::PublishPost, Self::publish_post)
            .with(Method::EditPost, Self::edit_post)
            .with(Method::DeletePost, Self::delete_post)
            .with(Method::PostComment, Self::post_comment)
            .with(Method::EditComment, Self::edit_comment)
            .with(Method::DeleteComment, Self::delete_comment)
            .with(Method::BlockComment, Self::block_comment)
            .with(Method::UnblockComment, Self::unblock_comment)
            .with(Method::PostLike, Self::post_like)
            .with(Method::PostUnlike, Self::post_unlike)
            .with(Method::GetMyChannels, Self::get_my_channels)
            .with(Method::GetChannels, Self::get_channels)
            .with(Method::GetChannelDetail, Self::get_channel_detail)
            .with(Method::GetSubscribedChannels, Self::get_subscribed_channels)
            .with(Method::GetPosts, Self::get_posts)
            .with(Method::GetLikedPosts, Self::get_liked_posts)
            .with(Method::GetComments, Self::get_comments)
            .with(Method::GetStatistics, Self::get_statistics)
            .with(Method::SubscribeChannel, Self::subscribe_channel)
            .with(Method::UnsubscribeChannel, Self::unsubscribe_channel)
            .with(Method::EnableNotification, Self::enable_notification)
            .with(Method::GetServiceVersion, Self::get_service_version);
        Self {
            table,
            store,
            subscribers,
            version_code,
        }
    }

    // ── Writes ───────────────────────────────────────────────────────────────

    fn create_channel(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::CreateChannel(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        if p.name.is_empty() {
            return Err(ErrCode::InvalidArgument);
        }
        let id = self.store.create_channel(p)?;
        tracing::info!(peer = ctx.peer, channel_id = id, name = %p.name, "channel created");
        finish(ctx, request, ResultPayload::Created(IdResult { id }))
    }

    fn publish_post(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::PublishPost(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let post = self.store.publish_post(p)?;
        tracing::info!(
            peer = ctx.peer,
            channel_id = post.channel_id,
            post_id = post.post_id,
            "post published"
        );
        let outcome = finish(ctx, request, ResultPayload::Created(IdResult { id: post.post_id }))?;
        self.fan_out(
            ctx.outbox,
            post.channel_id,
            notify::NEW_POST,
            NotifyPayload::NewPost(NewPostNotify {
                channel_id: post.channel_id,
                id: post.post_id,
                content: post.content.into(),
                created_at: post.created_at,
            }),
        );
        Ok(outcome)
    }

    fn edit_post(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::EditPost(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let post = self.store.edit_post(p)?;
        tracing::info!(
            peer = ctx.peer,
            channel_id = post.channel_id,
            post_id = post.post_id,
            "post edited"
        );
        finish(ctx, request, ResultPayload::Empty)
    }

    fn delete_post(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::DeletePost(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        self.store.delete_post(p.channel_id, p.id)?;
        tracing::info!(peer = ctx.peer, channel_id = p.channel_id, post_id = p.id, "post deleted");
        finish(ctx, request, ResultPayload::Empty)
    }

    fn post_comment(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::PostComment(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let user = self.known_user(ctx)?;
        let comment = self.store.post_comment(user, p)?;
        tracing::debug!(
            peer = ctx.peer,
            channel_id = comment.channel_id,
            post_id = comment.post_id,
            comment_id = comment.comment_id,
            "comment posted"
        );
        let outcome = finish(
            ctx,
            request,
            ResultPayload::Created(IdResult {
                id: comment.comment_id,
            }),
        )?;
        self.fan_out(
            ctx.outbox,
            comment.channel_id,
            notify::NEW_COMMENT,
            NotifyPayload::NewComment(NewCommentNotify {
                channel_id: comment.channel_id,
                post_id: comment.post_id,
                id: comment.comment_id,
                comment_id: comment.refer_comment_id,
                user_name: comment.user_name,
                content: comment.content.into(),
                created_at: comment.created_at,
            }),
        );
        Ok(outcome)
    }

    fn edit_comment(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::EditComment(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let user = ctx.user()?;
        let comment = self.store.edit_comment(user.user_id, p)?;
        tracing::debug!(
            peer = ctx.peer,
            channel_id = comment.channel_id,
            post_id = comment.post_id,
            comment_id = comment.comment_id,
            "comment edited"
        );
        finish(ctx, request, ResultPayload::Empty)
    }

    fn delete_comment(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::DeleteComment(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let user = ctx.user()?;
        self.store
            .delete_comment(user, p.channel_id, p.post_id, p.id)?;
        tracing::debug!(
            peer = ctx.peer,
            channel_id = p.channel_id,
            post_id = p.post_id,
            comment_id = p.id,
            "comment deleted"
        );
        finish(ctx, request, ResultPayload::Empty)
    }

    fn block_comment(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::BlockComment(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        self.store
            .set_comment_blocked(p.channel_id, p.post_id, p.comment_id, true)?;
        tracing::info!(
            peer = ctx.peer,
            channel_id = p.channel_id,
            post_id = p.post_id,
            comment_id = p.comment_id,
            "comment blocked"
        );
        finish(ctx, request, ResultPayload::Empty)
    }

    fn unblock_comment(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::UnblockComment(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        self.store
            .set_comment_blocked(p.channel_id, p.post_id, p.comment_id, false)?;
        tracing::info!(
            peer = ctx.peer,
            channel_id = p.channel_id,
            post_id = p.post_id,
            comment_id = p.comment_id,
            "comment unblocked"
        );
        finish(ctx, request, ResultPayload::Empty)
    }

    fn post_like(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::PostLike(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let user = self.known_user(ctx)?;
        let count = self
            .store
            .like(user.user_id, p.channel_id, p.post_id, p.comment_id)?;
        let outcome = finish(ctx, request, ResultPayload::Empty)?;
        self.fan_out(
            ctx.outbox,
            p.channel_id,
            notify::NEW_LIKES,
            NotifyPayload::NewLikes(NewLikesNotify {
                channel_id: p.channel_id,
                post_id: p.post_id,
                comment_id: p.comment_id,
                count,
            }),
        );
        Ok(outcome)
    }

    fn post_unlike(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::PostUnlike(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let user = ctx.user()?;
        self.store
            .unlike(user.user_id, p.channel_id, p.post_id, p.comment_id)?;
        finish(ctx, request, ResultPayload::Empty)
    }

    fn subscribe_channel(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::SubscribeChannel(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let user = self.known_user(ctx)?;
        self.store.subscribe(user.user_id, p.id)?;
        self.subscribers.add_channel(user.user_id, p.id);
        tracing::debug!(peer = ctx.peer, user_id = user.user_id, channel_id = p.id, "subscribed");
        finish(ctx, request, ResultPayload::Empty)
    }

    fn unsubscribe_channel(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::UnsubscribeChannel(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let user = ctx.user()?;
        self.store.unsubscribe(user.user_id, p.id)?;
        self.subscribers.remove_channel(user.user_id, p.id);
        tracing::debug!(peer = ctx.peer, user_id = user.user_id, channel_id = p.id, "unsubscribed");
        finish(ctx, request, ResultPayload::Empty)
    }

    fn enable_notification(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let user = ctx.user()?;
        let channels = self.store.subscribed_channel_ids(user.user_id)?;
        self.subscribers.activate(
            ctx.peer,
            ActiveSubscriber {
                user_id: user.user_id,
                dialect: request.dialect,
                version: request.version,
                channels: channels.into_iter().collect(),
            },
        )?;
        finish(ctx, request, ResultPayload::Empty)
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Every channel on this node belongs to the owner.
    fn get_my_channels(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::GetMyChannels(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let channels = self.store.channels(&list_criteria(p)?)?;
        let entries = channels.iter().map(MyChannelEntry::from).collect();
        finish(ctx, request, ResultPayload::MyChannels(entries))
    }

    fn get_channels(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::GetChannels(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let channels = self.store.channels(&list_criteria(p)?)?;
        let entries = channels
            .iter()
            .map(|c| ChannelEntry::from_record(c, request.version))
            .collect();
        finish(ctx, request, ResultPayload::Channels(entries))
    }

    fn get_channel_detail(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::GetChannelDetail(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let channel = self.store.channel(p.id)?.ok_or(ErrCode::NotFound)?;
        finish(
            ctx,
            request,
            ResultPayload::Channel(ChannelEntry::from_record(&channel, request.version)),
        )
    }

    fn get_subscribed_channels(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::GetSubscribedChannels(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let user = ctx.user()?;
        let channels = self
            .store
            .subscribed_channels(user.user_id, &list_criteria(p)?)?;
        let entries = channels
            .iter()
            .map(|c| ChannelEntry::from_record(c, request.version))
            .collect();
        finish(ctx, request, ResultPayload::Channels(entries))
    }

    fn get_posts(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::GetPosts(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let qc = QueryCriteria::from_wire(p.by, p.upper_bound, p.lower_bound, p.max_count)?;
        let posts = self.store.posts(p.channel_id, &qc)?;
        let entries = posts
            .iter()
            .map(|r| PostEntry::from_record(r, request.version))
            .collect();
        finish(ctx, request, ResultPayload::Posts(entries))
    }

    fn get_liked_posts(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::GetLikedPosts(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let user = ctx.user()?;
        let posts = self.store.liked_posts(user.user_id, &list_criteria(p)?)?;
        let entries = posts
            .iter()
            .map(|r| PostEntry::from_record(r, request.version))
            .collect();
        finish(ctx, request, ResultPayload::Posts(entries))
    }

    fn get_comments(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::GetComments(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let channel_id = u64::try_from(p.channel_id).map_err(|_| ErrCode::InvalidArgument)?;
        let post_id = u64::try_from(p.post_id).map_err(|_| ErrCode::InvalidArgument)?;
        let qc = QueryCriteria::from_wire(p.by, p.upper_bound, p.lower_bound, p.max_count)?;
        let comments = self.store.comments(channel_id, post_id, &qc)?;
        let entries = comments.iter().map(LegacyCommentEntry::from).collect();
        finish(ctx, request, ResultPayload::LegacyComments(entries))
    }

    fn get_statistics(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let did = self
            .store
            .user(OWNER_USER_ID)?
            .map(|u| u.did)
            .unwrap_or_else(|| PLACEHOLDER.to_string());
        finish(
            ctx,
            request,
            ResultPayload::Statistics(Statistics {
                did,
                connecting_clients: self.subscribers.len() as u64,
            }),
        )
    }

    fn get_service_version(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        finish(
            ctx,
            request,
            ResultPayload::ServiceVersion(ServiceVersion {
                version: env!("CARGO_PKG_VERSION").to_string(),
                version_code: self.version_code,
            }),
        )
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Caller identity, recorded in the users table so its name shows up on
    /// comments and likes.
    fn known_user<'c>(&self, ctx: &'c CallContext<'_>) -> Result<&'c UserInfo, ErrCode> {
        let user = ctx.user()?;
        self.store.upsert_user(user)?;
        Ok(user)
    }

    fn fan_out(&self, outbox: &Outbox, channel_id: u64, method: &str, params: NotifyPayload) {
        let peers = self.subscribers.peers_for(channel_id);
        if peers.is_empty() {
            return;
        }
        tracing::debug!(channel_id, method, peers = peers.len(), "notify fan-out");
        for (peer, dialect, version) in peers {
            outbox.notify(
                &peer,
                &Notify {
                    dialect,
                    version,
                    method: method.to_string(),
                    params: params.clone(),
                },
            );
        }
    }
}

impl Listener for LegacyMethod {
    fn name(&self) -> &'static str {
        "legacy_method"
    }

    fn lookup(&self, method: Method) -> Option<Access> {
        self.table.access(method)
    }

    fn handle(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        self.table.dispatch(self, ctx, request)
    }
}

fn list_criteria(p: &ListParams) -> Result<QueryCriteria, ErrCode> {
    QueryCriteria::from_wire(p.by, p.upper_bound, p.lower_bound, p.max_count)
}

/// Reply on the direct path and tell the router delivery is done.
fn finish(ctx: &CallContext<'_>, request: &Request, payload: ResultPayload) -> Result<Outcome, ErrCode> {
    ctx.outbox
        .reply_direct(ctx.peer, &Response::reply(request, payload))?;
    Ok(Outcome::Finished)
}

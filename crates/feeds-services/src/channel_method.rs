//! Channel listener: the paginated multi-queries over channel data.
//!
//! Rows stream out of the store straight into a paginator. Each sealed page
//! becomes one response with the request's id; an empty result produces no
//! response at all.

use std::sync::Arc;

use feeds_core::method::{Access, Method};
use feeds_core::obj::QueryCriteria;
use feeds_core::rpc::{
    CommentEntry, CommentsPage, Params, PostCountEntry, PostCountsPage, QueryParams, Request,
    Response, ResultPayload, SubscriberCountEntry, SubscriberCountsPage,
};
use feeds_core::ErrCode;

use crate::paginator::{Page, Paginator};
use crate::service::{CallContext, Listener, MethodTable, Outcome};
use crate::store::FeedsStore;

pub struct ChannelMethod {
    table: MethodTable<ChannelMethod>,
    store: Arc<FeedsStore>,
    ceiling: usize,
}

impl ChannelMethod {
    pub fn new(store: Arc<FeedsStore>, ceiling: usize) -> Self {
        let table = MethodTable::new()
            .with(Method::GetMultiComments, Self::get_multi_comments)
            .with(
                Method::GetMultiLikesAndCommentsCount,
                Self::get_multi_likes_and_comments_count,
            )
            .with(Method::GetMultiSubscribersCount, Self::get_multi_subscribers_count);
        Self {
            table,
            store,
            ceiling,
        }
    }

    fn get_multi_comments(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        let Params::GetMultiComments(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let (channel_id, post_id, qc) = query_target(p)?;

        let mut pages = Paginator::new(self.ceiling);
        self.store.for_each_comment(channel_id, post_id, &qc, |rec| {
            pages.push(CommentEntry::from_record(&rec, request.version));
        })?;
        let responses = seal(request, pages.finish(), |is_last, comments| {
            ResultPayload::Comments(CommentsPage { is_last, comments })
        });
        tracing::debug!(
            peer = ctx.peer,
            id = request.id,
            channel_id,
            post_id,
            pages = responses.len(),
            "comments served"
        );
        Ok(Outcome::Responses(responses))
    }

    fn get_multi_likes_and_comments_count(
        &self,
        ctx: &CallContext<'_>,
        request: &Request,
    ) -> Result<Outcome, ErrCode> {
        let Params::GetMultiLikesAndCommentsCount(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let (channel_id, post_id, qc) = query_target(p)?;

        let mut pages = Paginator::new(self.ceiling);
        self.store
            .for_each_post_counts(channel_id, post_id, &qc, |counts| {
                pages.push(PostCountEntry::from(counts));
            })?;
        let responses = seal(request, pages.finish(), |is_last, posts| {
            ResultPayload::PostCounts(PostCountsPage { is_last, posts })
        });
        tracing::debug!(
            peer = ctx.peer,
            id = request.id,
            pages = responses.len(),
            "post counters served"
        );
        Ok(Outcome::Responses(responses))
    }

    fn get_multi_subscribers_count(
        &self,
        ctx: &CallContext<'_>,
        request: &Request,
    ) -> Result<Outcome, ErrCode> {
        let Params::GetMultiSubscribersCount(p) = &request.params else {
            return Err(ErrCode::InvalidArgument);
        };
        let channel_id = non_negative(p.channel_id)?;

        let mut pages = Paginator::new(self.ceiling);
        self.store
            .for_each_subscriber_count(channel_id, |channel_id, subscribers_count| {
                pages.push(SubscriberCountEntry {
                    channel_id,
                    subscribers_count,
                });
            })?;
        let responses = seal(request, pages.finish(), |is_last, channels| {
            ResultPayload::SubscriberCounts(SubscriberCountsPage { is_last, channels })
        });
        tracing::debug!(
            peer = ctx.peer,
            id = request.id,
            pages = responses.len(),
            "subscriber counters served"
        );
        Ok(Outcome::Responses(responses))
    }
}

impl Listener for ChannelMethod {
    fn name(&self) -> &'static str {
        "channel_method"
    }

    fn lookup(&self, method: Method) -> Option<Access> {
        self.table.access(method)
    }

    fn handle(&self, ctx: &CallContext<'_>, request: &Request) -> Result<Outcome, ErrCode> {
        self.table.dispatch(self, ctx, request)
    }
}

fn non_negative(id: i64) -> Result<u64, ErrCode> {
    u64::try_from(id).map_err(|_| ErrCode::InvalidArgument)
}

fn query_target(p: &QueryParams) -> Result<(u64, u64, QueryCriteria), ErrCode> {
    let channel_id = non_negative(p.channel_id)?;
    let post_id = non_negative(p.post_id)?;
    let qc = QueryCriteria::from_wire(p.by, p.upper_bound, p.lower_bound, p.max_count)?;
    Ok((channel_id, post_id, qc))
}

fn seal<T>(
    request: &Request,
    pages: Vec<Page<T>>,
    wrap: impl Fn(bool, Vec<T>) -> ResultPayload,
) -> Vec<Response> {
    pages
        .into_iter()
        .map(|page| Response::reply(request, wrap(page.is_last, page.rows)))
        .collect()
}

use feeds_core::rpc::{
    CreateChannelParams, Params, PostCommentParams, PublishPostParams, QueryParams, RawBytes,
    Request, SubscribersCountParams,
};
use feeds_core::wire::map_field;
use feeds_core::Version;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Paginated multi-queries
// ══════════════════════════════════════════════════════════════════════════════

fn comment_ids(view: &EnvelopeView) -> Vec<u64> {
    view.result_field("comments")
        .and_then(|v| v.as_array())
        .map(|rows| {
            rows.iter()
                .filter_map(|row| map_field(row, "comment_id").and_then(|v| v.as_u64()))
                .collect()
        })
        .unwrap_or_default()
}

fn is_last(view: &EnvelopeView) -> Option<bool> {
    view.result_field("is_last").and_then(|v| v.as_bool())
}

fn comments_query(id: u64, channel_id: i64, post_id: i64, max_count: i64) -> Request {
    Request::new(
        Version::V1,
        id,
        Params::GetMultiComments(QueryParams {
            access_token: ALICE_TOKEN.into(),
            channel_id,
            post_id,
            by: 1,
            lower_bound: 0,
            upper_bound: -1,
            max_count,
        }),
    )
}

/// Three channels; channel 3 carries five posts and post 5 carries five comments.
fn seed_channel_three(node: &Node) -> Result<()> {
    node.store.upsert_user(&alice())?;
    for name in ["one", "two", "three"] {
        node.store.create_channel(&CreateChannelParams {
            name: name.into(),
            introduction: "intro".into(),
            ..Default::default()
        })?;
    }
    for i in 0..5 {
        node.store.publish_post(&PublishPostParams {
            channel_id: 3,
            content: RawBytes(format!("post {i}").into_bytes()),
            ..Default::default()
        })?;
    }
    for i in 0..5 {
        node.store.post_comment(
            &alice(),
            &PostCommentParams {
                channel_id: 3,
                post_id: 5,
                content: RawBytes(format!("c{i}").into_bytes()),
                ..Default::default()
            },
        )?;
    }
    Ok(())
}

/// Five small matching rows, max_count 2: one response, two ascending ids.
#[test]
fn test_max_count_bounds_single_page() {
    let node = NodeBuilder::new().build().unwrap();
    seed_channel_three(&node).unwrap();

    node.call("peer-a", &comments_query(7, 3, 5, 2)).unwrap();

    let inbox = node.inbox("peer-a");
    assert_eq!(inbox.len(), 1, "expected exactly one response");
    let reply = &inbox[0];
    assert_eq!(reply.id, Some(7));
    assert_eq!(reply.version.as_deref(), Some("1.0"));
    assert!(reply.error.is_none());
    assert_eq!(is_last(reply), Some(true));
    assert_eq!(comment_ids(reply), vec![1, 2]);
}

/// A tight envelope ceiling splits the result into several responses that all
/// carry the request id; only the final one is marked last.
#[test]
fn test_large_result_is_paginated_in_order() {
    let node = NodeBuilder::new().ceiling(512).build().unwrap();
    let (channel_id, post_id) = node.seed(20).unwrap();

    node.call(
        "peer-a",
        &comments_query(9, channel_id as i64, post_id as i64, 0),
    )
    .unwrap();

    let inbox = node.inbox("peer-a");
    assert!(inbox.len() > 1, "expected several pages, got {}", inbox.len());

    let mut seen = Vec::new();
    for (i, page) in inbox.iter().enumerate() {
        assert_eq!(page.id, Some(9));
        let last = i + 1 == inbox.len();
        assert_eq!(is_last(page).unwrap_or(false), last, "page {i}");
        seen.extend(comment_ids(page));
    }
    assert_eq!(seen, (1..=20).collect::<Vec<u64>>());
}

/// No matching rows is a silent success: nothing goes out.
#[test]
fn test_empty_result_sends_nothing() {
    let node = NodeBuilder::new().build().unwrap();
    node.seed(0).unwrap();

    node.call("peer-a", &comments_query(4, 1, 1, 0)).unwrap();

    assert!(node.transport.sent_to("peer-a").is_empty());
    assert!(node.handler.outbox().queue().is_idle("peer-a"));
}

#[test]
fn test_counters_follow_activity() {
    let node = NodeBuilder::new().build().unwrap();
    let (channel_id, _) = node.seed(3).unwrap();
    node.store.upsert_user(&bob()).unwrap();
    node.store.subscribe(2, channel_id).unwrap();
    node.store.subscribe(3, channel_id).unwrap();

    node.call(
        "peer-a",
        &Request::new(
            Version::V2,
            11,
            Params::GetMultiLikesAndCommentsCount(QueryParams {
                access_token: ALICE_TOKEN.into(),
                ..Default::default()
            }),
        ),
    )
    .unwrap();
    node.call(
        "peer-a",
        &Request::new(
            Version::V2,
            12,
            Params::GetMultiSubscribersCount(SubscribersCountParams {
                access_token: ALICE_TOKEN.into(),
                channel_id: channel_id as i64,
            }),
        ),
    )
    .unwrap();

    let inbox = node.inbox("peer-a");
    assert_eq!(inbox.len(), 2);

    let posts = inbox[0].result_field("posts").and_then(|v| v.as_array()).unwrap();
    assert_eq!(
        map_field(&posts[0], "comments_count").and_then(|v| v.as_u64()),
        Some(3)
    );

    assert_eq!(inbox[1].id, Some(12));
    let channels = inbox[1].result_field("channels").and_then(|v| v.as_array()).unwrap();
    assert_eq!(
        map_field(&channels[0], "subscribers_count").and_then(|v| v.as_u64()),
        Some(2)
    );
}

#[test]
fn test_invalid_criteria_rejected_with_id() {
    let node = NodeBuilder::new().build().unwrap();
    node.seed(1).unwrap();

    let mut request = comments_query(21, 1, 1, 0);
    if let Params::GetMultiComments(p) = &mut request.params {
        p.by = 42;
    }
    node.call("peer-a", &request).unwrap();

    let inbox = node.inbox("peer-a");
    assert_eq!(inbox[0].id, Some(21));
    assert_eq!(error_code(&inbox[0]), Some(-104));
}

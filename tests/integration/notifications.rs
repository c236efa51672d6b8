use feeds_core::rpc::{
    IdParams, LikeParams, Params, PublishPostParams, RawBytes, Request, TokenParams,
};
use feeds_core::Version;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Active subscribers and notify fan-out
// ══════════════════════════════════════════════════════════════════════════════

fn enable(id: u64, token: &str) -> Request {
    Request::new(
        Version::V2,
        id,
        Params::EnableNotification(TokenParams {
            access_token: token.into(),
        }),
    )
}

fn subscribe(id: u64, token: &str, channel_id: u64) -> Request {
    Request::new(
        Version::V2,
        id,
        Params::SubscribeChannel(IdParams {
            access_token: token.into(),
            id: channel_id,
        }),
    )
}

fn publish(id: u64, channel_id: u64, body: &str) -> Request {
    Request::new(
        Version::V2,
        id,
        Params::PublishPost(PublishPostParams {
            access_token: OWNER_TOKEN.into(),
            channel_id,
            content: RawBytes(body.as_bytes().to_vec()),
            ..Default::default()
        }),
    )
}

/// The second enable without an intervening disconnect is a state conflict.
#[test]
fn test_enable_notification_twice_is_wrong_state() {
    let node = NodeBuilder::new().build().unwrap();

    node.call("peer-a", &enable(1, ALICE_TOKEN)).unwrap();
    node.call("peer-a", &enable(2, ALICE_TOKEN)).unwrap();

    let inbox = node.inbox("peer-a");
    assert_eq!(inbox.len(), 2);
    assert_eq!(inbox[0].id, Some(1));
    assert!(inbox[0].error.is_none());
    assert_eq!(inbox[1].id, Some(2));
    assert_eq!(error_code(&inbox[1]), Some(-111));
}

/// Going offline clears the active subscriber, so enabling again succeeds.
#[test]
fn test_offline_peer_can_enable_again() {
    let node = NodeBuilder::new().build().unwrap();

    node.call("peer-a", &enable(1, ALICE_TOKEN)).unwrap();
    assert!(node.handler.subscribers().is_active("peer-a"));
    node.handler.peer_offline("peer-a");
    assert!(!node.handler.subscribers().is_active("peer-a"));

    node.call("peer-a", &enable(2, ALICE_TOKEN)).unwrap();
    let inbox = node.inbox("peer-a");
    assert!(inbox[1].error.is_none());
}

#[test]
fn test_new_post_reaches_only_subscribed_active_peers() {
    let node = NodeBuilder::new().build().unwrap();
    let (channel_id, _) = node.seed(0).unwrap();

    // alice: subscribed and active. bob: active but not subscribed.
    node.call("peer-a", &subscribe(1, ALICE_TOKEN, channel_id)).unwrap();
    node.call("peer-a", &enable(2, ALICE_TOKEN)).unwrap();
    node.call("peer-b", &enable(1, BOB_TOKEN)).unwrap();
    let before_a = node.inbox("peer-a").len();
    let before_b = node.inbox("peer-b").len();

    node.call("peer-o", &publish(1, channel_id, "breaking")).unwrap();

    let pushes = node.inbox_after("peer-a", before_a);
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].method.as_deref(), Some("new_post"));
    assert_eq!(pushes[0].id, None);
    assert_eq!(
        pushes[0].params_field("channel_id").and_then(|v| v.as_u64()),
        Some(channel_id)
    );
    assert!(node.inbox_after("peer-b", before_b).is_empty());

    // the publisher still gets its own reply
    let reply = &node.inbox("peer-o")[0];
    assert_eq!(reply.id, Some(1));
    assert!(reply.error.is_none());
}

/// Subscribing after enable still routes later posts to the peer.
#[test]
fn test_subscribe_after_enable_is_tracked() {
    let node = NodeBuilder::new().build().unwrap();
    let (channel_id, _) = node.seed(0).unwrap();

    node.call("peer-a", &enable(1, ALICE_TOKEN)).unwrap();
    node.call("peer-a", &subscribe(2, ALICE_TOKEN, channel_id)).unwrap();
    let before = node.inbox("peer-a").len();

    node.call("peer-o", &publish(1, channel_id, "late news")).unwrap();

    let pushes = node.inbox_after("peer-a", before);
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].method.as_deref(), Some("new_post"));
}

/// A subscriber that enabled over the legacy dialect is notified in it.
#[test]
fn test_legacy_subscriber_gets_legacy_notify() {
    let node = NodeBuilder::new().build().unwrap();
    let (channel_id, _) = node.seed(0).unwrap();

    node.call("peer-a", &subscribe(1, ALICE_TOKEN, channel_id)).unwrap();
    node.call(
        "peer-a",
        &Request::legacy(
            2,
            Params::EnableNotification(TokenParams {
                access_token: ALICE_TOKEN.into(),
            }),
        ),
    )
    .unwrap();
    let before = node.inbox("peer-a").len();

    node.call("peer-o", &publish(1, channel_id, "hello")).unwrap();

    let pushes = node.inbox_after("peer-a", before);
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].jsonrpc.as_deref(), Some("2.0"));
    assert!(pushes[0].version.is_none());
}

/// Likes are pushed as `new_likes` carrying the target and its new total.
#[test]
fn test_like_pushes_new_likes_with_count() {
    let node = NodeBuilder::new().build().unwrap();
    let (channel_id, post_id) = node.seed(1).unwrap();

    node.call("peer-a", &subscribe(1, ALICE_TOKEN, channel_id)).unwrap();
    node.call("peer-a", &enable(2, ALICE_TOKEN)).unwrap();
    let before = node.inbox("peer-a").len();

    let like = |id, comment_id| {
        Request::new(
            Version::V2,
            id,
            Params::PostLike(LikeParams {
                access_token: BOB_TOKEN.into(),
                channel_id,
                post_id,
                comment_id,
            }),
        )
    };
    node.call("peer-b", &like(1, 0)).unwrap();
    node.call("peer-b", &like(2, 1)).unwrap();

    let pushes = node.inbox_after("peer-a", before);
    assert_eq!(pushes.len(), 2);
    for (push, comment_id) in pushes.iter().zip([0u64, 1]) {
        assert_eq!(push.method.as_deref(), Some("new_likes"));
        assert_eq!(push.id, None);
        let mut keys: Vec<_> = push
            .params
            .as_ref()
            .and_then(|p| p.as_map())
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_str().unwrap().to_string())
            .collect();
        keys.sort();
        assert_eq!(keys, ["channel_id", "comment_id", "count", "post_id"]);
        assert_eq!(
            push.params_field("comment_id").and_then(|v| v.as_u64()),
            Some(comment_id)
        );
        assert_eq!(push.params_field("count").and_then(|v| v.as_u64()), Some(1));
    }
}

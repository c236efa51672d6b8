use feeds_core::rpc::{
    CommentIdParams, EditCommentParams, EditPostParams, LikeParams, ListParams,
    ModerateCommentParams, Params, PostIdParams, PostListParams, QueryParams, RawBytes, Request,
    TokenParams,
};
use feeds_core::wire::map_field;
use feeds_core::Version;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Post and comment maintenance, owner listings, statistics
// ══════════════════════════════════════════════════════════════════════════════

fn v2(id: u64, params: Params) -> Request {
    Request::new(Version::V2, id, params)
}

fn last(node: &Node, peer: &str) -> EnvelopeView {
    node.inbox(peer).pop().expect("reply sent")
}

fn comment_rows(node: &Node, peer: &str, id: u64, channel_id: u64, post_id: u64) -> Vec<rmpv::Value> {
    node.call(
        peer,
        &v2(
            id,
            Params::GetComments(QueryParams {
                access_token: ALICE_TOKEN.into(),
                channel_id: channel_id as i64,
                post_id: post_id as i64,
                ..Default::default()
            }),
        ),
    )
    .unwrap();
    last(node, peer)
        .result
        .and_then(|r| r.as_array().cloned())
        .unwrap_or_default()
}

fn content_of(row: &rmpv::Value) -> Option<Vec<u8>> {
    map_field(row, "content").and_then(|v| v.as_slice()).map(<[u8]>::to_vec)
}

#[test]
fn test_edit_and_delete_post_are_owner_only() {
    let node = NodeBuilder::new().build().unwrap();
    let (channel_id, post_id) = node.seed(0).unwrap();
    let edit = |id, token: &str| {
        v2(
            id,
            Params::EditPost(EditPostParams {
                access_token: token.into(),
                channel_id,
                id: post_id,
                content: RawBytes(b"corrected".to_vec()),
                ..Default::default()
            }),
        )
    };

    node.call("peer-a", &edit(1, ALICE_TOKEN)).unwrap();
    assert_eq!(error_code(&last(&node, "peer-a")), Some(-122));

    node.call("peer-o", &edit(2, OWNER_TOKEN)).unwrap();
    let reply = last(&node, "peer-o");
    assert_eq!(reply.id, Some(2));
    assert!(reply.error.is_none());
    let post = node.store.post(channel_id, post_id).unwrap().unwrap();
    assert_eq!(post.content, b"corrected");

    let delete = |id| {
        v2(
            id,
            Params::DeletePost(PostIdParams {
                access_token: OWNER_TOKEN.into(),
                channel_id,
                id: post_id,
            }),
        )
    };
    node.call("peer-o", &delete(3)).unwrap();
    assert!(last(&node, "peer-o").error.is_none());
    node.call("peer-o", &delete(4)).unwrap();
    assert_eq!(error_code(&last(&node, "peer-o")), Some(-111));

    // Deleted posts stay listed with their content withheld.
    node.call(
        "peer-a",
        &v2(
            5,
            Params::GetPosts(PostListParams {
                access_token: ALICE_TOKEN.into(),
                channel_id,
                ..Default::default()
            }),
        ),
    )
    .unwrap();
    let rows = last(&node, "peer-a").result.unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(content_of(&rows[0]), Some(Vec::new()));
}

#[test]
fn test_v1_edit_post_fills_placeholders() {
    let node = NodeBuilder::new().build().unwrap();
    let (channel_id, post_id) = node.seed(0).unwrap();

    node.call(
        "peer-o",
        &Request::legacy(
            1,
            Params::EditPost(EditPostParams {
                access_token: OWNER_TOKEN.into(),
                channel_id,
                id: post_id,
                content: RawBytes(b"v1 edit".to_vec()),
                hash_id: "dropped in 1.0".into(),
                ..Default::default()
            }),
        ),
    )
    .unwrap();
    let reply = last(&node, "peer-o");
    assert_eq!(reply.jsonrpc.as_deref(), Some("2.0"));
    assert!(reply.error.is_none());
    let post = node.store.post(channel_id, post_id).unwrap().unwrap();
    assert_eq!(post.hash_id, "NA");
    assert_eq!(post.content, b"v1 edit");
}

#[test]
fn test_comment_edit_delete_block_unblock() {
    let node = NodeBuilder::new().build().unwrap();
    let (channel_id, post_id) = node.seed(2).unwrap();

    // Only alice wrote the seeded comments.
    let edit = |id, token: &str| {
        v2(
            id,
            Params::EditComment(EditCommentParams {
                access_token: token.into(),
                channel_id,
                post_id,
                id: 1,
                content: RawBytes(b"second thoughts".to_vec()),
                ..Default::default()
            }),
        )
    };
    node.call("peer-b", &edit(1, BOB_TOKEN)).unwrap();
    assert_eq!(error_code(&last(&node, "peer-b")), Some(-122));
    node.call("peer-a", &edit(2, ALICE_TOKEN)).unwrap();
    assert!(last(&node, "peer-a").error.is_none());

    let moderate = |id, comment_id, block: bool, token: &str| {
        let p = ModerateCommentParams {
            access_token: token.into(),
            channel_id,
            post_id,
            comment_id,
        };
        v2(
            id,
            if block {
                Params::BlockComment(p)
            } else {
                Params::UnblockComment(p)
            },
        )
    };
    node.call("peer-a", &moderate(3, 1, true, ALICE_TOKEN)).unwrap();
    assert_eq!(error_code(&last(&node, "peer-a")), Some(-122));
    node.call("peer-o", &moderate(4, 1, true, OWNER_TOKEN)).unwrap();
    assert!(last(&node, "peer-o").error.is_none());

    let rows = comment_rows(&node, "peer-a", 5, channel_id, post_id);
    assert_eq!(content_of(&rows[0]), Some(Vec::new()));
    assert_eq!(content_of(&rows[1]), Some(b"comment 1".to_vec()));

    node.call("peer-o", &moderate(6, 1, false, OWNER_TOKEN)).unwrap();
    assert!(last(&node, "peer-o").error.is_none());
    node.call("peer-o", &moderate(7, 1, false, OWNER_TOKEN)).unwrap();
    assert_eq!(error_code(&last(&node, "peer-o")), Some(-111));
    let rows = comment_rows(&node, "peer-a", 8, channel_id, post_id);
    assert_eq!(content_of(&rows[0]), Some(b"second thoughts".to_vec()));

    let delete = |id, token: &str| {
        v2(
            id,
            Params::DeleteComment(CommentIdParams {
                access_token: token.into(),
                channel_id,
                post_id,
                id: 2,
            }),
        )
    };
    node.call("peer-b", &delete(9, BOB_TOKEN)).unwrap();
    assert_eq!(error_code(&last(&node, "peer-b")), Some(-122));
    node.call("peer-a", &delete(10, ALICE_TOKEN)).unwrap();
    assert!(last(&node, "peer-a").error.is_none());
    node.call("peer-a", &delete(11, ALICE_TOKEN)).unwrap();
    assert_eq!(error_code(&last(&node, "peer-a")), Some(-111));

    let missing = v2(
        12,
        Params::DeleteComment(CommentIdParams {
            access_token: ALICE_TOKEN.into(),
            channel_id,
            post_id,
            id: 99,
        }),
    );
    node.call("peer-a", &missing).unwrap();
    assert_eq!(error_code(&last(&node, "peer-a")), Some(-103));
}

#[test]
fn test_get_my_channels_lists_owner_channels() {
    let node = NodeBuilder::new().build().unwrap();
    node.seed(0).unwrap();
    let mine = |id, token: &str| {
        v2(
            id,
            Params::GetMyChannels(ListParams {
                access_token: token.into(),
                ..Default::default()
            }),
        )
    };

    node.call("peer-a", &mine(1, ALICE_TOKEN)).unwrap();
    assert_eq!(error_code(&last(&node, "peer-a")), Some(-122));

    node.call("peer-o", &mine(2, OWNER_TOKEN)).unwrap();
    let reply = last(&node, "peer-o");
    let rows = reply.result.unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    let mut keys: Vec<_> = rows[0]
        .as_map()
        .unwrap()
        .iter()
        .map(|(k, _)| k.as_str().unwrap().to_string())
        .collect();
    keys.sort();
    assert_eq!(keys, ["id", "introduction", "name", "subscribers"]);
    assert_eq!(map_field(&rows[0], "name").and_then(|v| v.as_str()), Some("news"));
}

#[test]
fn test_get_liked_posts_returns_callers_likes() {
    let node = NodeBuilder::new().build().unwrap();
    let (channel_id, post_id) = node.seed(1).unwrap();
    node.call(
        "peer-b",
        &v2(
            1,
            Params::PostLike(LikeParams {
                access_token: BOB_TOKEN.into(),
                channel_id,
                post_id,
                comment_id: 0,
            }),
        ),
    )
    .unwrap();

    let liked = |id, token: &str| {
        v2(
            id,
            Params::GetLikedPosts(ListParams {
                access_token: token.into(),
                ..Default::default()
            }),
        )
    };
    node.call("peer-b", &liked(2, BOB_TOKEN)).unwrap();
    let rows = last(&node, "peer-b").result.unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(map_field(&rows[0], "id").and_then(|v| v.as_u64()), Some(post_id));
    assert_eq!(map_field(&rows[0], "likes").and_then(|v| v.as_u64()), Some(1));

    node.call("peer-a", &liked(3, ALICE_TOKEN)).unwrap();
    let rows = last(&node, "peer-a").result.unwrap();
    assert_eq!(rows.as_array().map(Vec::len), Some(0));
}

#[test]
fn test_get_statistics_counts_active_peers() {
    let node = NodeBuilder::new().build().unwrap();
    node.store.upsert_user(&owner()).unwrap();
    let token = |access_token: &str| TokenParams {
        access_token: access_token.into(),
    };

    node.call("peer-a", &v2(1, Params::EnableNotification(token(ALICE_TOKEN)))).unwrap();
    node.call("peer-b", &v2(1, Params::EnableNotification(token(BOB_TOKEN)))).unwrap();
    node.call("peer-a", &v2(2, Params::GetStatistics(token(ALICE_TOKEN)))).unwrap();

    let stats = last(&node, "peer-a");
    assert_eq!(
        stats.result_field("did").and_then(|v| v.as_str()),
        Some("did:elastos:owner")
    );
    assert_eq!(
        stats.result_field("connecting_clients").and_then(|v| v.as_u64()),
        Some(2)
    );

    node.call("peer-x", &v2(1, Params::GetStatistics(TokenParams::default()))).unwrap();
    assert_eq!(error_code(&last(&node, "peer-x")), Some(-121));
}

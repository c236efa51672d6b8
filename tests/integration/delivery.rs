use feeds_core::rpc::{Params, QueryParams, Request};
use feeds_core::Version;
use feeds_services::Receipt;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Per-peer delivery ordering
// ══════════════════════════════════════════════════════════════════════════════

fn all_comments(id: u64, channel_id: u64, post_id: u64) -> Request {
    Request::new(
        Version::V2,
        id,
        Params::GetMultiComments(QueryParams {
            access_token: ALICE_TOKEN.into(),
            channel_id: channel_id as i64,
            post_id: post_id as i64,
            by: 1,
            upper_bound: -1,
            ..Default::default()
        }),
    )
}

/// Pages go out one at a time; each receipt releases the next.
#[test]
fn test_pages_wait_for_receipts() {
    let node = NodeBuilder::new().manual_receipts().ceiling(512).build().unwrap();
    let (channel_id, post_id) = node.seed(20).unwrap();

    node.call("peer-a", &all_comments(5, channel_id, post_id)).unwrap();

    let queued = node.handler.outbox().queue().pending("peer-a");
    assert!(queued > 1, "expected several pages queued, got {queued}");
    assert_eq!(node.transport.sent_to("peer-a").len(), 1);
    assert_eq!(node.transport.outstanding("peer-a"), 1);

    let mut delivered = 1;
    while node.transport.deliver_next("peer-a", Receipt::Delivered) {
        let sent = node.transport.sent_to("peer-a").len();
        if sent > delivered {
            assert_eq!(sent, delivered + 1, "only one message may be in flight");
            delivered = sent;
        }
    }

    assert_eq!(delivered, queued);
    assert!(node.handler.outbox().queue().is_idle("peer-a"));
    let inbox = node.inbox("peer-a");
    assert!(inbox.iter().all(|v| v.id == Some(5)));
    assert_eq!(
        inbox.last().and_then(|v| v.result_field("is_last")).and_then(|v| v.as_bool()),
        Some(true)
    );
}

/// A failed send still advances the queue.
#[test]
fn test_failed_receipt_advances() {
    let node = NodeBuilder::new().manual_receipts().ceiling(512).build().unwrap();
    let (channel_id, post_id) = node.seed(20).unwrap();

    node.call("peer-a", &all_comments(5, channel_id, post_id)).unwrap();
    let queued = node.handler.outbox().queue().pending("peer-a");

    assert!(node.transport.deliver_next("peer-a", Receipt::Failed));
    assert_eq!(node.transport.sent_to("peer-a").len(), 2);
    assert_eq!(node.handler.outbox().queue().pending("peer-a"), queued - 1);
}

/// An offline receipt drops everything still queued for the peer.
#[test]
fn test_offline_receipt_deprecates_queue() {
    let node = NodeBuilder::new().manual_receipts().ceiling(512).build().unwrap();
    let (channel_id, post_id) = node.seed(20).unwrap();

    node.call("peer-a", &all_comments(5, channel_id, post_id)).unwrap();
    assert!(node.transport.deliver_next("peer-a", Receipt::Offline));

    assert!(node.handler.outbox().queue().is_idle("peer-a"));
    assert_eq!(node.transport.sent_to("peer-a").len(), 1);
    assert_eq!(node.transport.outstanding("peer-a"), 0);
}

/// Queues are per peer: a stalled peer does not hold up another.
#[test]
fn test_peers_do_not_block_each_other() {
    let node = NodeBuilder::new().manual_receipts().ceiling(512).build().unwrap();
    let (channel_id, post_id) = node.seed(20).unwrap();

    node.call("peer-a", &all_comments(1, channel_id, post_id)).unwrap();
    node.call("peer-b", &all_comments(2, channel_id, post_id)).unwrap();

    assert_eq!(node.transport.sent_to("peer-a").len(), 1);
    assert_eq!(node.transport.sent_to("peer-b").len(), 1);
    assert_eq!(node.handler.outbox().queue().active_peers(), 2);

    node.handler.peer_offline("peer-a");
    assert!(node.transport.deliver_next("peer-b", Receipt::Delivered));
    assert_eq!(node.transport.sent_to("peer-b").len(), 2);
    // late receipt for the dropped queue is ignored
    assert!(node.transport.deliver_next("peer-a", Receipt::Delivered));
    assert_eq!(node.transport.sent_to("peer-a").len(), 1);
}

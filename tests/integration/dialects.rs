use feeds_core::rpc::{IdParams, Params, Request};
use feeds_core::Version;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Dialects, versions and undecodable input
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_legacy_request_gets_legacy_reply() {
    let node = NodeBuilder::new().build().unwrap();
    node.raw(
        "peer-a",
        &envelope(vec![
            ("jsonrpc", "2.0".into()),
            ("method", "get_service_version".into()),
            ("id", 12u64.into()),
        ]),
    );

    let inbox = node.inbox("peer-a");
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].jsonrpc.as_deref(), Some("2.0"));
    assert!(inbox[0].version.is_none());
    assert_eq!(inbox[0].id, Some(12));
    assert_eq!(
        inbox[0].result_field("version_code").and_then(|v| v.as_i64()),
        Some(7)
    );
}

#[test]
fn test_versioned_reply_echoes_request_version() {
    let node = NodeBuilder::new().build().unwrap();
    node.seed(0).unwrap();
    let detail = |version, id| {
        Request::new(
            version,
            id,
            Params::GetChannelDetail(IdParams {
                access_token: ALICE_TOKEN.into(),
                id: 1,
            }),
        )
    };

    node.call("peer-a", &detail(Version::V1, 1)).unwrap();
    node.call("peer-a", &detail(Version::V2, 2)).unwrap();

    let inbox = node.inbox("peer-a");
    assert_eq!(inbox[0].version.as_deref(), Some("1.0"));
    assert_eq!(inbox[1].version.as_deref(), Some("2.0"));
    assert!(inbox.iter().all(|v| v.jsonrpc.is_none()));
}

#[test]
fn test_unknown_method_in_either_dialect() {
    let node = NodeBuilder::new().build().unwrap();
    node.raw(
        "peer-a",
        &envelope(vec![
            ("version", "2.0".into()),
            ("method", "teleport".into()),
            ("id", 1u64.into()),
        ]),
    );
    node.raw(
        "peer-a",
        &envelope(vec![
            ("jsonrpc", "2.0".into()),
            ("method", "teleport".into()),
            ("id", 2u64.into()),
        ]),
    );

    let inbox = node.inbox("peer-a");
    assert_eq!(inbox.len(), 2);
    assert_eq!((inbox[0].id, error_code(&inbox[0])), (Some(1), Some(-102)));
    assert_eq!(inbox[0].version.as_deref(), Some("2.0"));
    assert_eq!((inbox[1].id, error_code(&inbox[1])), (Some(2), Some(-102)));
    assert_eq!(inbox[1].jsonrpc.as_deref(), Some("2.0"));
}

#[test]
fn test_unsupported_version_keeps_id() {
    let node = NodeBuilder::new().build().unwrap();
    node.raw(
        "peer-a",
        &envelope(vec![
            ("version", "3.1".into()),
            ("method", "get_channels".into()),
            ("id", 30u64.into()),
        ]),
    );
    let inbox = node.inbox("peer-a");
    assert_eq!((inbox[0].id, error_code(&inbox[0])), (Some(30), Some(-153)));
}

#[test]
fn test_undecodable_without_id_is_dropped() {
    let node = NodeBuilder::new().build().unwrap();
    node.raw("peer-a", b"definitely not msgpack \xc1");
    node.raw("peer-a", &envelope(vec![("method", "get_channels".into())]));
    node.raw("peer-a", &[]);
    assert!(node.transport.sent().is_empty());
}

#[test]
fn test_bad_params_with_id_is_unmarshal_failure() {
    let node = NodeBuilder::new().build().unwrap();
    node.raw(
        "peer-a",
        &envelope(vec![
            ("version", "1.0".into()),
            ("method", "get_channel_detail".into()),
            ("id", 44u64.into()),
            (
                "params",
                rmpv::Value::Map(vec![(rmpv::Value::from("id"), rmpv::Value::from("one"))]),
            ),
        ]),
    );
    let inbox = node.inbox("peer-a");
    assert_eq!((inbox[0].id, error_code(&inbox[0])), (Some(44), Some(-151)));
}

/// A processing error on one request does not disturb the next.
#[test]
fn test_errors_do_not_poison_the_peer() {
    let node = NodeBuilder::new().build().unwrap();
    node.raw(
        "peer-a",
        &envelope(vec![
            ("version", "2.0".into()),
            ("method", "teleport".into()),
            ("id", 1u64.into()),
        ]),
    );
    node.raw(
        "peer-a",
        &envelope(vec![
            ("version", "2.0".into()),
            ("method", "get_service_version".into()),
            ("id", 2u64.into()),
        ]),
    );
    let inbox = node.inbox("peer-a");
    assert_eq!(inbox.len(), 2);
    assert!(inbox[1].error.is_none());
    assert_eq!(inbox[1].id, Some(2));
}

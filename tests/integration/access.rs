use feeds_core::rpc::{
    BackupParams, CreateChannelParams, DeclareOwnerParams, DidAuthParams, IdParams, Params,
    QueryParams, Request, SignInParams,
};
use feeds_core::Version;
use feeds_services::StaticTokenResolver;

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Access control
// ══════════════════════════════════════════════════════════════════════════════

fn create_channel(id: u64, token: &str) -> Request {
    Request::new(
        Version::V2,
        id,
        Params::CreateChannel(CreateChannelParams {
            access_token: token.into(),
            name: "fresh".into(),
            introduction: "made over rpc".into(),
            ..Default::default()
        }),
    )
}

/// Run the two-step sign-in for `did` on `peer` and return the issued token.
fn sign_in(node: &Node, peer: &str, did: &str, id: u64) -> String {
    node.call(
        peer,
        &Request::new(
            Version::V2,
            id,
            Params::StandardSignIn(SignInParams {
                document: did.into(),
            }),
        ),
    )
    .unwrap();
    let challenge = node
        .inbox(peer)
        .last()
        .and_then(|v| v.result_field("jwt_challenge"))
        .and_then(|v| v.as_str().map(str::to_string))
        .expect("challenge in result");

    node.call(
        peer,
        &Request::new(
            Version::V2,
            id + 1,
            Params::StandardDidAuth(DidAuthParams {
                user_name: "boss".into(),
                jwt_vp: challenge,
            }),
        ),
    )
    .unwrap();
    node.inbox(peer)
        .last()
        .and_then(|v| v.result_field("access_token"))
        .and_then(|v| v.as_str().map(str::to_string))
        .expect("token in result")
}

#[test]
fn test_owner_only_method_refuses_members() {
    let node = NodeBuilder::new().build().unwrap();

    node.call("peer-a", &create_channel(1, ALICE_TOKEN)).unwrap();
    node.call("peer-o", &create_channel(2, OWNER_TOKEN)).unwrap();

    let refused = node.inbox("peer-a");
    assert_eq!(refused[0].id, Some(1));
    assert_eq!(error_code(&refused[0]), Some(-122));
    let accepted = node.inbox("peer-o");
    assert_eq!(accepted[0].id, Some(2));
    assert!(accepted[0].error.is_none());
    assert!(node.store.channel(1).unwrap().is_some());
}

#[test]
fn test_missing_and_unknown_tokens() {
    let node = NodeBuilder::new().build().unwrap();
    node.seed(1).unwrap();

    let mut request = Request::new(
        Version::V2,
        5,
        Params::GetMultiComments(QueryParams::default()),
    );
    node.call("peer-a", &request).unwrap();
    request.id = 6;
    if let Params::GetMultiComments(p) = &mut request.params {
        p.access_token = "forged".into();
    }
    node.call("peer-a", &request).unwrap();

    let inbox = node.inbox("peer-a");
    assert_eq!(inbox.len(), 2);
    assert_eq!((inbox[0].id, error_code(&inbox[0])), (Some(5), Some(-121)));
    assert_eq!((inbox[1].id, error_code(&inbox[1])), (Some(6), Some(-121)));
}

#[test]
fn test_did_layer_not_ready() {
    let node = NodeBuilder::new().not_ready().build().unwrap();
    node.call(
        "peer-a",
        &Request::new(
            Version::V2,
            3,
            Params::GetChannelDetail(IdParams {
                access_token: ALICE_TOKEN.into(),
                id: 1,
            }),
        ),
    )
    .unwrap();
    let inbox = node.inbox("peer-a");
    assert_eq!(error_code(&inbox[0]), Some(-120));
}

#[test]
fn test_revoked_token_stops_working() {
    let node = NodeBuilder::new().build().unwrap();
    node.seed(0).unwrap();
    let detail = |id| {
        Request::new(
            Version::V2,
            id,
            Params::GetChannelDetail(IdParams {
                access_token: BOB_TOKEN.into(),
                id: 1,
            }),
        )
    };

    node.call("peer-b", &detail(1)).unwrap();
    node.resolver.revoke(BOB_TOKEN);
    node.call("peer-b", &detail(2)).unwrap();

    let inbox = node.inbox("peer-b");
    assert!(inbox[0].error.is_none());
    assert_eq!(error_code(&inbox[1]), Some(-121));
}

/// Sign in, then use the issued token on a member method.
#[test]
fn test_sign_in_flow_grants_access() {
    let node = NodeBuilder::new().build().unwrap();
    node.seed(2).unwrap();

    node.call(
        "peer-c",
        &Request::new(
            Version::V2,
            1,
            Params::StandardSignIn(SignInParams {
                document: r#"{"id":"did:elastos:carol"}"#.into(),
            }),
        ),
    )
    .unwrap();
    let challenge = node.inbox("peer-c")[0]
        .result_field("jwt_challenge")
        .and_then(|v| v.as_str().map(str::to_string))
        .expect("challenge in result");

    node.call(
        "peer-c",
        &Request::new(
            Version::V2,
            2,
            Params::StandardDidAuth(DidAuthParams {
                user_name: "carol".into(),
                jwt_vp: challenge,
            }),
        ),
    )
    .unwrap();
    let token = node.inbox("peer-c")[1]
        .result_field("access_token")
        .and_then(|v| v.as_str().map(str::to_string))
        .expect("token in result");

    node.call(
        "peer-c",
        &Request::new(
            Version::V2,
            3,
            Params::GetMultiComments(QueryParams {
                access_token: token,
                channel_id: 1,
                post_id: 1,
                ..Default::default()
            }),
        ),
    )
    .unwrap();
    let reply = &node.inbox("peer-c")[2];
    assert_eq!(reply.id, Some(3));
    assert!(reply.error.is_none());
}

#[test]
fn test_backup_requires_owner_and_known_drive() {
    let node = NodeBuilder::new().build().unwrap();
    let backup = |id, token: &str| {
        Request::new(
            Version::V2,
            id,
            Params::BackupServiceData(BackupParams {
                access_token: token.into(),
                drive_name: "nowhere".into(),
                drive_url: "x".into(),
                drive_access_token: "y".into(),
            }),
        )
    };

    node.call("peer-a", &backup(1, ALICE_TOKEN)).unwrap();
    node.call("peer-o", &backup(2, OWNER_TOKEN)).unwrap();

    assert_eq!(error_code(&node.inbox("peer-a")[0]), Some(-122));
    assert_eq!(error_code(&node.inbox("peer-o")[0]), Some(-104));
}

/// A node with no token table on disk gains an owner through
/// `declare_owner`, and the owner's next sign-in can create channels.
#[test]
fn test_fresh_node_declares_owner_then_creates_channel() {
    let dir = std::env::temp_dir().join(format!("feeds-fresh-owner-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("tokens.json");

    let resolver = StaticTokenResolver::with_persistence(path.clone()).unwrap();
    assert_eq!(resolver.owner_did(), None);
    let node = NodeBuilder::new().resolver(resolver).build().unwrap();

    // Before declaration the DID signs in as a plain member.
    let token = sign_in(&node, "peer-o", "did:elastos:boss", 1);
    node.call("peer-o", &create_channel(3, &token)).unwrap();
    assert_eq!(error_code(node.inbox("peer-o").last().unwrap()), Some(-122));

    node.call(
        "peer-o",
        &Request::new(
            Version::V2,
            4,
            Params::DeclareOwner(DeclareOwnerParams {
                nonce: "nonce-1".into(),
                owner_did: "did:elastos:boss".into(),
            }),
        ),
    )
    .unwrap();
    let declared = node.inbox("peer-o").pop().unwrap();
    assert_eq!(declared.id, Some(4));
    assert_eq!(
        declared.result_field("phase").and_then(|v| v.as_str()),
        Some("owner_declared")
    );

    let token = sign_in(&node, "peer-o", "did:elastos:boss", 5);
    node.call("peer-o", &create_channel(7, &token)).unwrap();
    let created = node.inbox("peer-o").pop().unwrap();
    assert_eq!(created.id, Some(7));
    assert!(created.error.is_none());
    assert_eq!(created.result_field("id").and_then(|v| v.as_u64()), Some(1));

    // A second peer cannot take the node over.
    node.call(
        "peer-x",
        &Request::new(
            Version::V2,
            1,
            Params::DeclareOwner(DeclareOwnerParams {
                nonce: "nonce-2".into(),
                owner_did: "did:elastos:mallory".into(),
            }),
        ),
    )
    .unwrap();
    assert_eq!(error_code(&node.inbox("peer-x")[0]), Some(-122));

    let reloaded = StaticTokenResolver::with_persistence(path).unwrap();
    assert_eq!(reloaded.owner_did(), Some("did:elastos:boss"));

    let _ = std::fs::remove_dir_all(&dir);
}

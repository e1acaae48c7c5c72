//! Identity linking protocol tests
//!
//! Cover idempotency, precondition enforcement, rejection handling and
//! abandonment when a session is superseded mid-flight.

use super::mocks::{safe_stack, MockIdentity, MockWallet};
use aa_session_core::{Error, IdentityProvider, LinkOutcome, LinkingProtocol, SessionOutcome};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Notify;

const OWNER_A: &str = "0x1111111111111111111111111111111111111111";
const OWNER_B: &str = "0x2222222222222222222222222222222222222222";

#[tokio::test]
async fn test_links_ready_session() {
    let stack = safe_stack();
    stack
        .manager
        .on_wallet_changed(Arc::new(MockWallet::new(OWNER_A)))
        .await
        .unwrap();
    let session = stack.manager.current_session().unwrap();

    let identity = Arc::new(MockIdentity::new());
    let linking = LinkingProtocol::new(Arc::clone(&identity) as Arc<dyn IdentityProvider>);

    let outcome = linking.ensure_linked(&stack.manager).await.unwrap();
    let record = match outcome {
        LinkOutcome::Linked(record) => record,
        other => panic!("expected new link, got {:?}", other),
    };

    assert_eq!(record.address, session.address());
    assert_eq!(record.chain_id, "eip155:84532");
    assert_eq!(identity.linked.lock().unwrap().len(), 1);
    assert_eq!(identity.challenges_issued.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ensure_linked_is_idempotent() {
    let stack = safe_stack();
    stack
        .manager
        .on_wallet_changed(Arc::new(MockWallet::new(OWNER_A)))
        .await
        .unwrap();

    let identity = Arc::new(MockIdentity::new());
    let linking = LinkingProtocol::new(Arc::clone(&identity) as Arc<dyn IdentityProvider>);

    let first = linking.ensure_linked(&stack.manager).await.unwrap();
    assert!(matches!(first, LinkOutcome::Linked(_)));

    // The repeat call performs no challenge/signature round-trip
    let second = linking.ensure_linked(&stack.manager).await.unwrap();
    assert_eq!(second, LinkOutcome::AlreadyLinked);
    assert_eq!(identity.challenges_issued.load(Ordering::SeqCst), 1);
    assert_eq!(identity.submissions.load(Ordering::SeqCst), 1);
    assert_eq!(identity.linked.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_provider_side_link_short_circuits() {
    let stack = safe_stack();
    stack
        .manager
        .on_wallet_changed(Arc::new(MockWallet::new(OWNER_A)))
        .await
        .unwrap();
    let session = stack.manager.current_session().unwrap();

    // Linked on the provider side, unknown to this protocol instance
    let identity = Arc::new(MockIdentity::prelinked(session.address(), "eip155:84532"));
    let linking = LinkingProtocol::new(Arc::clone(&identity) as Arc<dyn IdentityProvider>);

    let outcome = linking.ensure_linked(&stack.manager).await.unwrap();
    assert_eq!(outcome, LinkOutcome::AlreadyLinked);
    assert_eq!(identity.challenges_issued.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_linking_requires_published_session() {
    let stack = safe_stack();
    let identity = Arc::new(MockIdentity::new());
    let linking = LinkingProtocol::new(identity);

    let err = linking.ensure_linked(&stack.manager).await.unwrap_err();
    assert!(matches!(err, Error::SessionNotReady(_)));
}

#[tokio::test]
async fn test_rejected_submission_creates_no_record() {
    let stack = safe_stack();
    stack
        .manager
        .on_wallet_changed(Arc::new(MockWallet::new(OWNER_A)))
        .await
        .unwrap();

    let identity = Arc::new(MockIdentity::rejecting());
    let linking = LinkingProtocol::new(Arc::clone(&identity) as Arc<dyn IdentityProvider>);

    let err = linking.ensure_linked(&stack.manager).await.unwrap_err();
    assert!(matches!(err, Error::LinkingRejected(_)));
    assert!(identity.linked.lock().unwrap().is_empty());

    // The failure is not cached; the next attempt gets a fresh challenge
    let err = linking.ensure_linked(&stack.manager).await.unwrap_err();
    assert!(matches!(err, Error::LinkingRejected(_)));
    assert_eq!(identity.challenges_issued.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stale_challenge_is_rejected_without_duplicate() {
    let stack = safe_stack();
    stack
        .manager
        .on_wallet_changed(Arc::new(MockWallet::new(OWNER_A)))
        .await
        .unwrap();

    let identity = Arc::new(MockIdentity::with_stale_nonce());
    let linking = LinkingProtocol::new(Arc::clone(&identity) as Arc<dyn IdentityProvider>);

    let err = linking.ensure_linked(&stack.manager).await.unwrap_err();
    assert!(matches!(err, Error::LinkingRejected(_)));
    assert!(identity.linked.lock().unwrap().is_empty());
    assert_eq!(identity.submissions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_declined_signature_surfaces_by_kind() {
    let stack = safe_stack();
    stack
        .manager
        .on_wallet_changed(Arc::new(MockWallet::new(OWNER_A).refusing_sign()))
        .await
        .unwrap();

    let identity = Arc::new(MockIdentity::new());
    let linking = LinkingProtocol::new(Arc::clone(&identity) as Arc<dyn IdentityProvider>);

    let err = linking.ensure_linked(&stack.manager).await.unwrap_err();
    assert!(matches!(err, Error::SigningDeclined(_)));
    assert_eq!(identity.submissions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_superseded_session_abandons_link_attempt() {
    let stack = safe_stack();
    stack
        .manager
        .on_wallet_changed(Arc::new(MockWallet::new(OWNER_A)))
        .await
        .unwrap();

    let started = Arc::new(Notify::new());
    let gate = Arc::new(Notify::new());
    let identity = Arc::new(MockIdentity::with_challenge_rendezvous(
        Arc::clone(&started),
        Arc::clone(&gate),
    ));
    let linking = Arc::new(LinkingProtocol::new(
        Arc::clone(&identity) as Arc<dyn IdentityProvider>
    ));

    let manager = Arc::clone(&stack.manager);
    let protocol = Arc::clone(&linking);
    let inflight = tokio::spawn(async move { protocol.ensure_linked(&manager).await });

    // The link attempt is parked inside challenge generation; switch
    // the wallet underneath it
    started.notified().await;
    let outcome = stack
        .manager
        .on_wallet_changed(Arc::new(MockWallet::new(OWNER_B)))
        .await
        .unwrap();
    assert!(matches!(outcome, SessionOutcome::Published(_)));

    gate.notify_one();
    let abandoned = inflight.await.unwrap().unwrap();
    assert_eq!(abandoned, LinkOutcome::Abandoned);
    assert_eq!(identity.submissions.load(Ordering::SeqCst), 0);
    assert!(identity.linked.lock().unwrap().is_empty());

    // The replacement session links its own address (pre-arm the gate
    // so its challenge generation passes straight through)
    gate.notify_one();
    let outcome = linking.ensure_linked(&stack.manager).await.unwrap();
    let record = match outcome {
        LinkOutcome::Linked(record) => record,
        other => panic!("expected new link, got {:?}", other),
    };
    assert_eq!(
        record.address,
        stack.manager.current_session().unwrap().address()
    );
}

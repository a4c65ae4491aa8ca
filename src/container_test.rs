use super::*;

// =============================================================================
// bytes_to_hex / generate_session_id
// =============================================================================

#[test]
fn bytes_to_hex_formats_with_leading_zeros() {
    assert_eq!(bytes_to_hex(&[]), "");
    assert_eq!(bytes_to_hex(&[0x0a, 0xff]), "0aff");
}

#[test]
fn generate_session_id_is_32_hex_chars() {
    let id = generate_session_id();
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn generate_session_id_two_calls_differ() {
    assert_ne!(generate_session_id(), generate_session_id());
}

// =============================================================================
// REGISTRY
// =============================================================================

#[tokio::test]
async fn create_and_lookup_session() {
    let container = SessionContainer::new(true);
    let session = container.create_session(Some("w1".into()), HashMap::new()).await;

    let found = container
        .session_by_id(session.id())
        .await
        .expect("session registered");
    assert!(Arc::ptr_eq(&session, &found));
    assert_eq!(container.len().await, 1);
}

#[tokio::test]
async fn lookup_unknown_id_is_none() {
    let container = SessionContainer::new(true);
    assert!(container.session_by_id("nope").await.is_none());
}

#[tokio::test]
async fn remove_session_unregisters() {
    let container = SessionContainer::new(true);
    let session = container.create_session(None, HashMap::new()).await;

    let removed = container.remove_session(session.id()).await;
    assert!(removed.is_some());
    assert!(container.session_by_id(session.id()).await.is_none());
    assert!(container.is_empty().await);
}

// =============================================================================
// RECOVERY SCAN
// =============================================================================

#[tokio::test]
async fn claim_unbound_prefers_most_recently_created() {
    let container = SessionContainer::new(true);
    let older = container.create_session(None, HashMap::new()).await;
    let newer = container.create_session(None, HashMap::new()).await;

    let first = container.claim_unbound_session().await.expect("one unbound");
    assert_eq!(first.id(), newer.id());

    let second = container.claim_unbound_session().await.expect("one left");
    assert_eq!(second.id(), older.id());

    assert!(container.claim_unbound_session().await.is_none());
}

#[tokio::test]
async fn claim_skips_sessions_with_bound_sockets() {
    let container = SessionContainer::new(true);
    let bound = container.create_session(None, HashMap::new()).await;
    let (tx, _rx) = tokio::sync::mpsc::channel(4);
    bound.bind_socket(tx);

    assert!(container.claim_unbound_session().await.is_none());
}

#[tokio::test]
async fn claim_returns_none_when_not_window_scoped() {
    let container = SessionContainer::new(false);
    container.create_session(None, HashMap::new()).await;
    assert!(container.claim_unbound_session().await.is_none());
}

#[tokio::test]
async fn concurrent_claims_win_at_most_one_session_each() {
    let container = Arc::new(SessionContainer::new(true));
    container.create_session(None, HashMap::new()).await;

    let (a, b) = tokio::join!(container.claim_unbound_session(), container.claim_unbound_session());

    // Exactly one upgrade wins the single unbound session.
    assert!(a.is_some() ^ b.is_some());
}

use super::*;
use tokio::sync::mpsc;

use crate::app::{AppContext, AppEvent, Application, ApplicationError, ClientEvent};

fn noop_factory() -> ApplicationFactory {
    struct NoopApp;

    impl Application for NoopApp {
        fn init(&mut self, _cx: AppContext<'_>) -> Result<(), ApplicationError> {
            Ok(())
        }

        fn process_event(&mut self, _e: &ClientEvent, _cx: AppContext<'_>) -> Result<(), ApplicationError> {
            Ok(())
        }
    }

    Arc::new(|| Box::new(NoopApp))
}

// =============================================================================
// HTTP CONNECTION
// =============================================================================

#[tokio::test]
async fn resolve_without_uiid_creates_session_retaining_parameters() {
    let container = SessionContainer::new(true);
    let mut params = HashMap::new();
    params.insert(WINDOW_ID_PARAMETER.to_string(), "w9".to_string());
    params.insert("theme".to_string(), "dark".to_string());

    let conn = HttpConnection::resolve(&container, &params).await.unwrap();
    assert!(conn.created_session());
    assert_eq!(conn.session().window_id(), Some("w9"));
    assert_eq!(
        conn.session().initial_request_parameters().get("theme").map(String::as_str),
        Some("dark")
    );
    assert_eq!(container.len().await, 1);
}

#[tokio::test]
async fn resolve_with_known_uiid_targets_existing_session() {
    let container = SessionContainer::new(true);
    let session = container.create_session(None, HashMap::new()).await;

    let mut params = HashMap::new();
    params.insert(SESSION_ID_PARAMETER.to_string(), session.id().to_string());
    let conn = HttpConnection::resolve(&container, &params).await.unwrap();

    assert!(!conn.created_session());
    assert_eq!(conn.session().id(), session.id());
}

#[tokio::test]
async fn resolve_with_unknown_uiid_fails() {
    let container = SessionContainer::new(true);
    let mut params = HashMap::new();
    params.insert(SESSION_ID_PARAMETER.to_string(), "missing".to_string());

    assert!(matches!(
        HttpConnection::resolve(&container, &params).await,
        Err(BindError::UnresolvableSession(_))
    ));
}

#[tokio::test]
async fn init_http_twice_fails_with_already_initialized() {
    let container = SessionContainer::new(true);
    let conn = HttpConnection::resolve(&container, &HashMap::new()).await.unwrap();
    let factory = noop_factory();

    conn.init_http(&factory).await.unwrap();
    assert!(matches!(
        conn.init_http(&factory).await,
        Err(BindError::Session(SessionError::AlreadyInitialized))
    ));
}

// =============================================================================
// SOCKET BINDING STATE MACHINE
// =============================================================================

#[tokio::test]
async fn recovery_binding_becomes_ready_only_after_post_init() {
    // Session A created via HTTP with no socket bound; an id-less upgrade
    // against a window-scoped container holding only A resolves to A.
    let container = SessionContainer::new(true);
    let session_a = HttpConnection::resolve(&container, &HashMap::new())
        .await
        .unwrap()
        .session()
        .clone();

    let mut conn = SocketConnection::new(None);
    assert_eq!(conn.state(), SocketBindState::Unbound);
    assert!(!conn.is_ready());

    conn.pre_init(Some(&container)).await.unwrap();
    assert_eq!(conn.state(), SocketBindState::PreBound);
    assert!(!conn.is_ready());
    assert_eq!(conn.session().unwrap().id(), session_a.id());

    let (tx, _rx) = mpsc::channel(4);
    conn.post_init(tx).unwrap();
    assert!(conn.is_ready());
    assert!(session_a.has_socket());
}

#[tokio::test]
async fn pre_init_without_container_is_fatal() {
    let mut conn = SocketConnection::new(None);
    assert!(matches!(
        conn.pre_init(None).await,
        Err(BindError::UnresolvableSession(_))
    ));
    assert!(!conn.is_ready());
}

#[tokio::test]
async fn pre_init_with_no_resolvable_session_is_fatal() {
    let container = SessionContainer::new(true);
    let mut conn = SocketConnection::new(None);
    assert!(matches!(
        conn.pre_init(Some(&container)).await,
        Err(BindError::UnresolvableSession(_))
    ));
}

#[tokio::test]
async fn pre_init_twice_is_a_phase_error() {
    let container = SessionContainer::new(true);
    container.create_session(None, HashMap::new()).await;

    let mut conn = SocketConnection::new(None);
    conn.pre_init(Some(&container)).await.unwrap();
    assert!(matches!(
        conn.pre_init(Some(&container)).await,
        Err(BindError::Phase { .. })
    ));
}

#[tokio::test]
async fn post_init_before_pre_init_is_a_phase_error() {
    let mut conn = SocketConnection::new(None);
    let (tx, _rx) = mpsc::channel(4);
    assert!(matches!(conn.post_init(tx), Err(BindError::Phase { .. })));
    assert!(!conn.is_ready());
}

#[tokio::test]
async fn explicit_id_rebind_evicts_prior_socket() {
    let container = SessionContainer::new(true);
    let session = container.create_session(None, HashMap::new()).await;

    let mut first = SocketConnection::new(Some(session.id().to_string()));
    first.pre_init(Some(&container)).await.unwrap();
    let (tx1, mut rx1) = mpsc::channel(4);
    first.post_init(tx1).unwrap();

    let mut second = SocketConnection::new(Some(session.id().to_string()));
    second.pre_init(Some(&container)).await.unwrap();
    let (tx2, mut rx2) = mpsc::channel(4);
    second.post_init(tx2).unwrap();

    session.event_sink().emit(AppEvent::TaskEnqueued);
    assert!(rx1.try_recv().is_err());
    assert!(rx2.try_recv().is_ok());
}

#[tokio::test]
async fn releasing_a_superseded_connection_keeps_the_successor_bound() {
    let container = SessionContainer::new(true);
    let session = container.create_session(None, HashMap::new()).await;

    let mut first = SocketConnection::new(Some(session.id().to_string()));
    first.pre_init(Some(&container)).await.unwrap();
    let (tx1, _rx1) = mpsc::channel(4);
    first.post_init(tx1).unwrap();

    let mut second = SocketConnection::new(Some(session.id().to_string()));
    second.pre_init(Some(&container)).await.unwrap();
    let (tx2, _rx2) = mpsc::channel(4);
    second.post_init(tx2).unwrap();

    first.release();
    assert!(session.has_socket());

    second.release();
    assert!(!session.has_socket());
}

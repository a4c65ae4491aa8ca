use super::*;

use crate::app::AppEvent;
use crate::container::SessionContainer;
use crate::demo;

/// Build a connection bound through both phases to a fresh demo session,
/// returning the push receiver the session writes wake-ups into.
async fn ready_connection(
    container: &SessionContainer,
) -> (SocketConnection, mpsc::Receiver<ServerMessage>) {
    let session = container.create_session(None, HashMap::new()).await;
    session.initialize(&demo::factory()).await.unwrap();

    let mut conn = SocketConnection::new(Some(session.id().to_string()));
    conn.pre_init(Some(container)).await.unwrap();
    let (tx, rx) = mpsc::channel(8);
    conn.post_init(tx).unwrap();
    (conn, rx)
}

#[tokio::test]
async fn message_before_binding_completes_is_a_phase_error() {
    let conn = SocketConnection::new(None);

    let replies = process_inbound_text(&conn, r#"{"transaction_id": 0}"#).await;

    assert_eq!(replies.len(), 1);
    let ServerMessage::Error { code, recoverable, .. } = &replies[0] else {
        panic!("expected error reply");
    };
    assert_eq!(code, "E_BINDING_PHASE");
    assert!(!recoverable);
}

#[tokio::test]
async fn unparseable_message_is_recoverable() {
    let container = SessionContainer::new(true);
    let (conn, _rx) = ready_connection(&container).await;

    let replies = process_inbound_text(&conn, "not json").await;

    let ServerMessage::Error { code, recoverable, .. } = &replies[0] else {
        panic!("expected error reply");
    };
    assert_eq!(code, "E_INVALID_MESSAGE");
    assert!(recoverable);
}

#[tokio::test]
async fn sync_cycle_runs_over_the_socket_path() {
    let container = SessionContainer::new(true);
    let (conn, _rx) = ready_connection(&container).await;

    let replies = process_inbound_text(&conn, r#"{"transaction_id": 0}"#).await;

    let ServerMessage::Sync(response) = &replies[0] else {
        panic!("expected sync reply");
    };
    assert_eq!(response.transaction_id, 1);
    assert_eq!(response.updates.len(), 1);
}

#[tokio::test]
async fn stale_transaction_over_the_socket_reports_its_code() {
    let container = SessionContainer::new(true);
    let (conn, _rx) = ready_connection(&container).await;
    process_inbound_text(&conn, r#"{"transaction_id": 0}"#).await;

    let replies = process_inbound_text(&conn, r#"{"transaction_id": 0}"#).await;

    let ServerMessage::Error { code, recoverable, .. } = &replies[0] else {
        panic!("expected error reply");
    };
    assert_eq!(code, "E_STALE_TRANSACTION");
    assert!(recoverable);
}

#[tokio::test]
async fn task_enqueued_wakes_the_client_through_the_bound_channel() {
    let container = SessionContainer::new(true);
    let (conn, mut rx) = ready_connection(&container).await;

    let session = conn.session().unwrap();
    session.event_sink().emit(AppEvent::TaskEnqueued);

    let pushed = rx.try_recv().expect("push should land on the socket channel");
    assert!(matches!(pushed, ServerMessage::RequestSync));
}

#[tokio::test]
async fn idless_upgrade_recovers_the_unbound_session() {
    // A browser whose socket dropped reconnects without its uiid; the
    // window-scoped container resolves the surviving unbound session.
    let container = SessionContainer::new(true);
    let session = container.create_session(None, HashMap::new()).await;
    session.initialize(&demo::factory()).await.unwrap();

    let mut conn = SocketConnection::new(None);
    conn.pre_init(Some(&container)).await.unwrap();
    let (tx, _rx) = mpsc::channel(8);
    conn.post_init(tx).unwrap();

    assert!(conn.is_ready());
    assert_eq!(conn.session().unwrap().id(), session.id());

    let replies = process_inbound_text(&conn, r#"{"transaction_id": 0}"#).await;
    assert!(matches!(&replies[0], ServerMessage::Sync(_)));
}

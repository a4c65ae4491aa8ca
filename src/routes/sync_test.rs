use super::*;

use serde_json::{Value, json};

use crate::protocol::ClientEventMessage;
use crate::state::test_helpers::test_app_state;

async fn post_sync(state: &AppState, message: ClientMessage) -> (StatusCode, Value) {
    let response = handle_sync(
        State(state.clone()),
        Query(HashMap::new()),
        Json(message),
    )
    .await;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn message(session_id: Option<String>, transaction_id: u64) -> ClientMessage {
    ClientMessage { session_id, window_id: None, transaction_id, events: Vec::new() }
}

#[tokio::test]
async fn first_request_without_uiid_creates_session_and_syncs() {
    let state = test_app_state();

    let (status, body) = post_sync(&state, message(None, 0)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "sync");
    assert_eq!(body["transaction_id"], 1);
    assert!(body["uiid"].as_str().is_some_and(|id| !id.is_empty()));
    // Demo startup renders the initial tree as one structure update.
    assert_eq!(body["updates"].as_array().unwrap().len(), 1);
    assert_eq!(state.container.len().await, 1);
}

#[tokio::test]
async fn follow_up_request_reuses_the_session_from_the_body_uiid() {
    let state = test_app_state();
    let (_, first) = post_sync(&state, message(None, 0)).await;
    let uiid = first["uiid"].as_str().unwrap().to_string();

    let (status, second) = post_sync(&state, message(Some(uiid.clone()), 1)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["uiid"], uiid.as_str());
    assert_eq!(second["transaction_id"], 2);
    assert_eq!(state.container.len().await, 1);
}

#[tokio::test]
async fn stale_transaction_replay_is_a_409_with_structured_error() {
    let state = test_app_state();
    let (_, first) = post_sync(&state, message(None, 0)).await;
    let uiid = first["uiid"].as_str().unwrap().to_string();

    let (status, body) = post_sync(&state, message(Some(uiid), 0)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["type"], "error");
    assert_eq!(body["code"], "E_STALE_TRANSACTION");
    assert_eq!(body["recoverable"], true);
}

#[tokio::test]
async fn unknown_uiid_is_a_404() {
    let state = test_app_state();

    let (status, body) = post_sync(&state, message(Some("missing".into()), 0)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "E_UNRESOLVABLE_SESSION");
    assert!(state.container.is_empty().await);
}

#[tokio::test]
async fn invalid_render_id_in_an_event_is_recoverable() {
    let state = test_app_state();
    let (_, first) = post_sync(&state, message(None, 0)).await;
    let uiid = first["uiid"].as_str().unwrap().to_string();

    let mut bad = message(Some(uiid), 1);
    bad.events.push(ClientEventMessage {
        component: "C.424242".into(),
        event_type: "click".into(),
        payload: json!({}),
    });
    let (status, body) = post_sync(&state, bad).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "E_INVALID_RENDER_ID");
    assert_eq!(body["recoverable"], true);
}

#[tokio::test]
async fn application_failure_is_a_500() {
    let state = test_app_state();
    let (_, first) = post_sync(&state, message(None, 0)).await;
    let uiid = first["uiid"].as_str().unwrap().to_string();

    let session = state.container.session_by_id(&uiid).await.unwrap();
    let root = {
        let core = session.cycle().await;
        core.tree().root().unwrap()
    };

    let mut bad = message(Some(uiid), 1);
    bad.events.push(ClientEventMessage {
        component: crate::component::client_render_id(root),
        event_type: "hover".into(),
        payload: json!({}),
    });
    let (status, body) = post_sync(&state, bad).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "E_APPLICATION");
    assert_eq!(body["recoverable"], false);
}

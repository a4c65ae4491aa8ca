//! WebSocket handler — persistent socket transport.
//!
//! DESIGN
//! ======
//! The upgrade handler runs binding phase 1 (`pre_init`) on the upgrade
//! request; phase 2 (`post_init`) runs once the socket exists, attaching the
//! push channel to the session. Only then does the connection enter its
//! `select!` loop:
//! - Incoming client messages → synchronization cycles on the bound session
//! - Push messages from the session's signal path (`request-sync` wake-ups)
//!   → forwarded to the client
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade request → `pre_init` (fatal if no session resolvable)
//! 2. Socket open → `post_init` → connection ready
//! 3. Client messages → `run_sync_cycle` → sync/error responses
//! 4. Close → release the binding without evicting a successor socket

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::connection::{SESSION_ID_PARAMETER, SocketConnection};
use crate::protocol::{ClientMessage, ErrorCode, ServerMessage, run_sync_cycle};
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let mut conn = SocketConnection::new(params.get(SESSION_ID_PARAMETER).cloned());

    // Phase 1 runs on the upgrade request; a failure here never promotes the
    // socket to ready.
    if let Err(e) = conn.pre_init(Some(&state.container)).await {
        let correlation_id = Uuid::new_v4();
        error!(%correlation_id, error = %e, code = e.error_code(), "socket pre-bind failed");
        return (
            StatusCode::NOT_FOUND,
            format!("session binding failed ({correlation_id})"),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| run_ws(socket, conn))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, mut conn: SocketConnection) {
    // Per-connection channel the session pushes through (server-initiated
    // request-sync wake-ups).
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);

    if let Err(e) = conn.post_init(tx) {
        let correlation_id = Uuid::new_v4();
        error!(%correlation_id, error = %e, code = e.error_code(), "socket post-bind failed");
        return;
    }

    let session_id = conn
        .session()
        .map(|session| session.id().to_string())
        .unwrap_or_default();
    info!(%session_id, "ws: socket ready");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&conn, &text).await;
                        let mut closed = false;
                        for reply in replies {
                            if send_message(&mut socket, &reply).await.is_err() {
                                closed = true;
                                break;
                            }
                        }
                        if closed {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(push) = rx.recv() => {
                if send_message(&mut socket, &push).await.is_err() {
                    break;
                }
            }
        }
    }

    conn.release();
    info!(%session_id, "ws: socket closed");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Parse and process one inbound text message, returning replies for the
/// sender. Split from the socket loop so tests can exercise dispatch with a
/// hand-built connection.
async fn process_inbound_text(conn: &SocketConnection, text: &str) -> Vec<ServerMessage> {
    // No synchronization traffic before both binding phases completed.
    if !conn.is_ready() {
        warn!("ws: message on connection that is not ready");
        return vec![ServerMessage::Error {
            code: "E_BINDING_PHASE".into(),
            message: "connection not ready".into(),
            recoverable: false,
        }];
    }
    let Some(session) = conn.session() else {
        return vec![ServerMessage::Error {
            code: "E_BINDING_PHASE".into(),
            message: "connection has no session".into(),
            recoverable: false,
        }];
    };

    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(session_id = %session.id(), error = %e, "ws: invalid inbound message");
            return vec![ServerMessage::Error {
                code: "E_INVALID_MESSAGE".into(),
                message: format!("invalid json: {e}"),
                recoverable: true,
            }];
        }
    };

    match run_sync_cycle(session, &message).await {
        Ok(response) => vec![ServerMessage::Sync(response)],
        Err(e) => {
            warn!(session_id = %session.id(), error = %e, code = e.error_code(), "ws: sync cycle failed");
            vec![ServerMessage::error_from(&e)]
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize message");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;

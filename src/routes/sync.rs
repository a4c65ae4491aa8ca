//! HTTP synchronization endpoint.
//!
//! DESIGN
//! ======
//! One POST per synchronization cycle. The first request of a browser window
//! carries no `uiid` and creates the session (single-phase HTTP binding);
//! every later request targets it by id, from the message body or the query
//! string. Recoverable protocol errors (stale transaction, invalid render
//! id) come back as 409 with a structured error body — the session survives
//! and the client resynchronizes. Binding failures are fatal to the request
//! and logged with a generated correlation id.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};
use uuid::Uuid;

use crate::connection::{BindError, HttpConnection, SESSION_ID_PARAMETER};
use crate::protocol::{ClientMessage, ErrorCode, ServerMessage, SyncError, run_sync_cycle};
use crate::state::AppState;

pub async fn handle_sync(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    Json(message): Json<ClientMessage>,
) -> Response {
    let mut params = params;
    if let Some(id) = &message.session_id {
        params.insert(SESSION_ID_PARAMETER.into(), id.clone());
    }

    let conn = match HttpConnection::resolve(&state.container, &params).await {
        Ok(conn) => conn,
        Err(e) => return bind_error_response(&e),
    };

    if conn.created_session() {
        if let Err(e) = conn.init_http(&state.factory).await {
            return bind_error_response(&e);
        }
    }

    match run_sync_cycle(conn.session(), &message).await {
        Ok(response) => Json(ServerMessage::Sync(response)).into_response(),
        Err(e) => sync_error_response(&e),
    }
}

/// Map a binding failure to a response. Fatal to this request only; logged
/// with a correlation id.
fn bind_error_response(err: &BindError) -> Response {
    let correlation_id = Uuid::new_v4();
    error!(%correlation_id, error = %err, code = err.error_code(), "http binding failed");
    let status = match err {
        BindError::UnresolvableSession(_) => StatusCode::NOT_FOUND,
        BindError::Session(_) => StatusCode::CONFLICT,
        BindError::Phase { .. } => StatusCode::BAD_REQUEST,
    };
    (status, Json(ServerMessage::error_from(err))).into_response()
}

fn sync_error_response(err: &SyncError) -> Response {
    if err.recoverable() {
        warn!(error = %err, code = err.error_code(), "sync cycle rejected");
        (StatusCode::CONFLICT, Json(ServerMessage::error_from(err))).into_response()
    } else {
        let correlation_id = Uuid::new_v4();
        error!(%correlation_id, error = %err, code = err.error_code(), "sync cycle failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ServerMessage::error_from(err))).into_response()
    }
}

#[cfg(test)]
#[path = "sync_test.rs"]
mod tests;

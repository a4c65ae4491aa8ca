//! Wire messages and the synchronization cycle.
//!
//! DESIGN
//! ======
//! Both transports speak the same two message shapes: an inbound
//! `ClientMessage` (claimed transaction id plus input events keyed by client
//! render id) and an outbound `ServerMessage`. The cycle itself is transport
//! agnostic: resolve the session, take its cycle lock, validate the
//! transaction id, apply events, drain updates, sweep render states, fold in
//! dirty properties, stamp the next transaction id.
//!
//! ERROR HANDLING
//! ==============
//! Stale transactions and invalid render ids are recoverable at the protocol
//! level — the message fails but the session survives. Binding and
//! initialization errors are fatal to the offending request only.

use serde::{Deserialize, Serialize};

use crate::app::{ApplicationError, ClientEvent};
use crate::component::InvalidRenderId;
use crate::session::{SessionError, UserSession};
use crate::transaction::StaleTransaction;
use crate::update::UpdateRecord;

/// Wire tag of the socket control message requesting an immediate
/// synchronization poll from the client.
pub const REQUEST_SYNC: &str = "request-sync";

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and recoverability flag for outbound error messages.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    /// Recoverable errors leave the session usable; the client resyncs
    /// rather than reloading.
    fn recoverable(&self) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    StaleTransaction(#[from] StaleTransaction),
    #[error(transparent)]
    InvalidRenderId(#[from] InvalidRenderId),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::StaleTransaction(_) => "E_STALE_TRANSACTION",
            Self::InvalidRenderId(_) => "E_INVALID_RENDER_ID",
            Self::Session(SessionError::AlreadyInitialized) => "E_ALREADY_INITIALIZED",
            Self::Session(SessionError::NotInitialized) => "E_NOT_INITIALIZED",
            Self::Session(SessionError::ApplicationStartup(_)) => "E_APPLICATION_STARTUP",
            Self::Application(_) => "E_APPLICATION",
        }
    }

    fn recoverable(&self) -> bool {
        matches!(self, Self::StaleTransaction(_) | Self::InvalidRenderId(_))
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

/// One client-originated input event, keyed by client render id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEventMessage {
    /// Client render id, e.g. `"C.42"`.
    pub component: String,
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Inbound synchronization message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Target session id. Absent on the very first request, which creates a
    /// session.
    #[serde(rename = "uiid", skip_serializing_if = "Option::is_none", default)]
    pub session_id: Option<String>,
    /// Browser window id driving this session.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub window_id: Option<String>,
    /// The transaction id this message was generated against.
    pub transaction_id: u64,
    #[serde(default)]
    pub events: Vec<ClientEventMessage>,
}

/// Payload of a successful synchronization cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    #[serde(rename = "uiid")]
    pub session_id: String,
    /// Freshly issued transaction id the client must echo next time.
    pub transaction_id: u64,
    /// Polling cadence the client should use, in milliseconds.
    pub callback_interval_ms: u64,
    pub updates: Vec<UpdateRecord>,
    pub updated_properties: Vec<String>,
}

/// Outbound message, over HTTP response body or socket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Sync(SyncResponse),
    /// Control message: server state changed asynchronously, poll now.
    /// Serialized tag equals [`REQUEST_SYNC`].
    RequestSync,
    Error {
        code: String,
        message: String,
        recoverable: bool,
    },
}

impl ServerMessage {
    /// Build a structured error message from a typed error.
    #[must_use]
    pub fn error_from(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self::Error {
            code: err.error_code().to_string(),
            message: err.to_string(),
            recoverable: err.recoverable(),
        }
    }
}

// =============================================================================
// SYNCHRONIZATION CYCLE
// =============================================================================

/// Run one synchronization cycle against a session. Holds the session's
/// cycle lock for the full duration, serializing concurrent cycles.
///
/// # Errors
///
/// Returns [`SyncError::StaleTransaction`] without mutating anything when
/// the claimed transaction id is superseded; otherwise application, render-id
/// resolution, and startup failures as they occur.
pub async fn run_sync_cycle(session: &UserSession, message: &ClientMessage) -> Result<SyncResponse, SyncError> {
    let mut core = session.cycle().await;

    // Reject superseded messages before any mutation.
    session.sequencer().validate(message.transaction_id)?;

    core.ensure_application_started()?;

    for event in &message.events {
        let component_id = core.resolve_client_render_id(&event.component)?;
        core.process_client_event(&ClientEvent {
            component_id,
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
        })?;
    }

    let batch = core.drain_updates();
    core.sweep_render_states(&batch);

    // Taken after the drain: a property marked dirty during this read is
    // guaranteed to appear in the next batch, never dropped.
    let updated_properties = session.signals().take_dirty_properties();

    let transaction_id = session.sequencer().next();
    Ok(SyncResponse {
        session_id: session.id().to_string(),
        transaction_id,
        callback_interval_ms: core.callback_interval_ms(),
        updates: batch.records,
        updated_properties,
    })
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;

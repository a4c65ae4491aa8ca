//! Connection abstraction — HTTP and socket transport bindings.
//!
//! DESIGN
//! ======
//! An HTTP connection binds in a single phase: the request already carries a
//! resolved session id (or creates a session), and `init_http` may run once.
//!
//! A socket connection binds in two phases, because the socket upgrade and
//! the HTTP session lookup are not atomic with respect to each other across
//! the transport stack. The phases are modeled as an explicit state machine
//! (Unbound → PreBound → Ready) with guarded transitions rather than relying
//! on callback ordering:
//!
//! - `pre_init` resolves the target session, either by explicit id (rebind
//!   evicts the prior socket) or via the container's window-scoped recovery
//!   scan, which atomically claims the first unbound session.
//! - `post_init` attaches the concrete socket sender to both the connection
//!   and the session, making it visible to later HTTP requests through the
//!   container-held session.
//!
//! No synchronization traffic may be processed before `is_ready()`.
//!
//! CONCURRENCY
//! ===========
//! `pre_init`/`post_init` run on the upgrade task and may race an HTTP-drive
//! cycle on the same session. They never touch cycle-locked state; the claim
//! flag and socket slot have their own atomics/locks inside the session.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::app::ApplicationFactory;
use crate::container::SessionContainer;
use crate::protocol::{ErrorCode, ServerMessage};
use crate::session::{SessionError, UserSession};

/// Request parameter carrying the target session id.
pub const SESSION_ID_PARAMETER: &str = "uiid";

/// Request parameter carrying the browser window id.
pub const WINDOW_ID_PARAMETER: &str = "wid";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("socket binding phase error: expected {expected:?}, found {found:?}")]
    Phase {
        expected: SocketBindState,
        found: SocketBindState,
    },
    /// Socket phase-1 binding found no container or no resolvable session.
    /// Fatal: the socket is not promoted to ready.
    #[error("unresolvable session: {0}")]
    UnresolvableSession(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ErrorCode for BindError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Phase { .. } => "E_BINDING_PHASE",
            Self::UnresolvableSession(_) => "E_UNRESOLVABLE_SESSION",
            Self::Session(SessionError::AlreadyInitialized) => "E_ALREADY_INITIALIZED",
            Self::Session(SessionError::NotInitialized) => "E_NOT_INITIALIZED",
            Self::Session(SessionError::ApplicationStartup(_)) => "E_APPLICATION_STARTUP",
        }
    }
}

// =============================================================================
// HTTP CONNECTION
// =============================================================================

/// One request/response transport interaction, bound to exactly one session.
pub struct HttpConnection {
    session: Arc<UserSession>,
    created_session: bool,
}

impl HttpConnection {
    /// Resolve the target session from request parameters. A `uiid`
    /// parameter targets an existing session; its absence creates one,
    /// retaining the parameters as the session's initial request parameters.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::UnresolvableSession`] when `uiid` names no
    /// registered session.
    pub async fn resolve(
        container: &SessionContainer,
        params: &HashMap<String, String>,
    ) -> Result<Self, BindError> {
        if let Some(id) = params.get(SESSION_ID_PARAMETER) {
            let session = container
                .session_by_id(id)
                .await
                .ok_or_else(|| BindError::UnresolvableSession(format!("unknown session id: {id}")))?;
            return Ok(Self { session, created_session: false });
        }
        let window_id = params.get(WINDOW_ID_PARAMETER).cloned();
        let session = container.create_session(window_id, params.clone()).await;
        Ok(Self { session, created_session: true })
    }

    #[must_use]
    pub fn session(&self) -> &Arc<UserSession> {
        &self.session
    }

    /// True if this request created the session rather than resolving one.
    #[must_use]
    pub fn created_session(&self) -> bool {
        self.created_session
    }

    /// Single-phase HTTP initialization: create the application instance.
    ///
    /// # Errors
    ///
    /// Forbidden on an already-initialized session
    /// ([`SessionError::AlreadyInitialized`]).
    pub async fn init_http(&self, factory: &ApplicationFactory) -> Result<(), BindError> {
        self.session.initialize(factory).await?;
        Ok(())
    }
}

// =============================================================================
// SOCKET CONNECTION
// =============================================================================

/// Binding phase of a socket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketBindState {
    Unbound,
    PreBound,
    Ready,
}

/// A socket-backed connection. Constructed unbound; must pass both binding
/// phases before any synchronization message is processed on it.
pub struct SocketConnection {
    state: SocketBindState,
    requested_session_id: Option<String>,
    session: Option<Arc<UserSession>>,
    sender: Option<mpsc::Sender<ServerMessage>>,
}

impl SocketConnection {
    #[must_use]
    pub fn new(requested_session_id: Option<String>) -> Self {
        Self {
            state: SocketBindState::Unbound,
            requested_session_id,
            session: None,
            sender: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SocketBindState {
        self.state
    }

    /// True only once both binding phases have completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == SocketBindState::Ready
    }

    #[must_use]
    pub fn session(&self) -> Option<&Arc<UserSession>> {
        self.session.as_ref()
    }

    /// Phase 1: resolve the controlling session.
    ///
    /// With an explicit id the session is claimed unconditionally — a rebind
    /// evicts the prior socket without notifying it. Without one, the
    /// container's recovery scan claims the most recently created unbound
    /// session.
    ///
    /// # Errors
    ///
    /// [`BindError::Phase`] when not in `Unbound`;
    /// [`BindError::UnresolvableSession`] when no container or no session
    /// can be resolved — socket synchronization cannot proceed without
    /// server-side session state to attach to.
    pub async fn pre_init(&mut self, container: Option<&SessionContainer>) -> Result<(), BindError> {
        if self.state != SocketBindState::Unbound {
            return Err(BindError::Phase { expected: SocketBindState::Unbound, found: self.state });
        }
        let container = container
            .ok_or_else(|| BindError::UnresolvableSession("no session container".into()))?;

        let session = match &self.requested_session_id {
            Some(id) => {
                let session = container.session_by_id(id).await.ok_or_else(|| {
                    BindError::UnresolvableSession(format!("unknown session id: {id}"))
                })?;
                session.claim_socket();
                session
            }
            None => container.claim_unbound_session().await.ok_or_else(|| {
                BindError::UnresolvableSession("no unbound session to recover".into())
            })?,
        };

        info!(session_id = %session.id(), "socket pre-bound to session");
        self.session = Some(session);
        self.state = SocketBindState::PreBound;
        Ok(())
    }

    /// Phase 2: attach the concrete socket sender to the connection and the
    /// session, and invoke the session's socket hook. After this the sender
    /// is reachable from the container-held session, so a later HTTP request
    /// can detect the live socket.
    ///
    /// # Errors
    ///
    /// [`BindError::Phase`] when phase 1 has not completed.
    pub fn post_init(&mut self, sender: mpsc::Sender<ServerMessage>) -> Result<(), BindError> {
        if self.state != SocketBindState::PreBound {
            return Err(BindError::Phase { expected: SocketBindState::PreBound, found: self.state });
        }
        let Some(session) = self.session.as_ref() else {
            return Err(BindError::Phase { expected: SocketBindState::PreBound, found: self.state });
        };
        session.bind_socket(sender.clone());
        info!(session_id = %session.id(), "socket bound to session");
        self.sender = Some(sender);
        self.state = SocketBindState::Ready;
        Ok(())
    }

    /// Drop this connection's binding on close, without evicting a
    /// successor socket that has since rebound.
    pub fn release(&mut self) {
        if let (Some(session), Some(sender)) = (self.session.as_ref(), self.sender.as_ref()) {
            session.release_socket(sender);
        }
        self.sender = None;
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;

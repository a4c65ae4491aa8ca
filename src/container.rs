//! Session container — the process-wide session registry.
//!
//! DESIGN
//! ======
//! Maps generated session identifiers to live `UserSession`s. Lookup and
//! insertion are concurrent (an `RwLock`ed map, finer grained than any
//! per-session lock). Session ids are random hex strings, generated once at
//! creation and immutable for the session's lifetime.
//!
//! The window-scoped recovery scan handles a socket upgrade arriving with no
//! explicit session id: the browser opened a new tab before the server
//! learned which logical session it continues. The scan walks existing
//! sessions most-recently-created first and atomically claims the first one
//! not yet bound to a socket — claim-on-find, so concurrent upgrades racing
//! for the same unbound session cannot both win it.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use tokio::sync::RwLock;
use tracing::info;

use crate::session::UserSession;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a random 16-byte hex session identifier.
#[must_use]
pub fn generate_session_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// CONTAINER
// =============================================================================

pub struct SessionContainer {
    /// Whether sessions are scoped to browser windows, enabling the
    /// unbound-session recovery scan for id-less socket upgrades.
    window_scoped: bool,
    sessions: RwLock<HashMap<String, Arc<UserSession>>>,
    creation_seq: AtomicU64,
}

impl SessionContainer {
    #[must_use]
    pub fn new(window_scoped: bool) -> Self {
        Self {
            window_scoped,
            sessions: RwLock::new(HashMap::new()),
            creation_seq: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn is_window_scoped(&self) -> bool {
        self.window_scoped
    }

    /// Create and register a new session with a generated identifier.
    pub async fn create_session(
        &self,
        window_id: Option<String>,
        initial_request_parameters: HashMap<String, String>,
    ) -> Arc<UserSession> {
        let id = generate_session_id();
        let seq = self.creation_seq.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(UserSession::new(id.clone(), window_id, initial_request_parameters, seq));
        self.sessions.write().await.insert(id.clone(), Arc::clone(&session));
        info!(session_id = %id, "session created");
        session
    }

    pub async fn session_by_id(&self, id: &str) -> Option<Arc<UserSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session from the registry, returning it for disposal.
    pub async fn remove_session(&self, id: &str) -> Option<Arc<UserSession>> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            info!(session_id = %id, "session removed from container");
        }
        removed
    }

    /// Recovery scan: claim the most recently created session with no socket
    /// bound. Returns `None` when the container is not window-scoped or no
    /// unbound session exists. The claim is atomic — at most one caller wins
    /// a given session.
    pub async fn claim_unbound_session(&self) -> Option<Arc<UserSession>> {
        if !self.window_scoped {
            return None;
        }
        let mut candidates: Vec<Arc<UserSession>> = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect()
        };
        candidates.sort_by(|a, b| b.creation_seq().cmp(&a.creation_seq()));
        candidates.into_iter().find(|session| session.try_claim_socket())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
#[path = "container_test.rs"]
mod tests;

//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the process-wide session container and the application factory used
//! to populate new sessions.

use std::sync::Arc;

use crate::app::ApplicationFactory;
use crate::container::SessionContainer;

/// Shared application state, injected into Axum handlers via State
/// extractor. Clone is required by Axum — all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub container: Arc<SessionContainer>,
    pub factory: ApplicationFactory,
}

impl AppState {
    #[must_use]
    pub fn new(factory: ApplicationFactory, window_scoped: bool) -> Self {
        Self { container: Arc::new(SessionContainer::new(window_scoped)), factory }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

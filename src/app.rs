//! Application boundary — the logic layer hosted by a session.
//!
//! DESIGN
//! ======
//! The session owns the component tree and update manager; the application is
//! a set of callbacks that mutate them. Instead of a dynamic property-change
//! listener, applications report a small closed set of signals through
//! [`AppEvent`], dispatched as a tagged variant: the set of observed
//! properties is fixed and known at design time.
//!
//! `AppEvent::TaskEnqueued` is the server-push trigger: a background task was
//! enqueued and the client should poll now, independent of its normal
//! callback cadence.

use crate::component::{ComponentId, ComponentTree};
use crate::update::UpdateManager;

/// Session-level property name marked dirty when client configuration
/// changes.
pub const PROPERTY_CLIENT_CONFIGURATION: &str = "clientConfiguration";

/// Session-level property name marked dirty when the style sheet changes.
pub const PROPERTY_STYLE_SHEET_CHANGED: &str = "styleSheetChanged";

// =============================================================================
// EVENTS
// =============================================================================

/// Signals an application reports to its hosting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// A background task was enqueued; wake the client over an open socket.
    TaskEnqueued,
    /// The application style sheet changed; resend it on the next sync.
    StyleSheetChanged,
}

/// Sink through which an application delivers [`AppEvent`]s. Implemented by
/// the session. Emission is cheap and lock-free with respect to the session's
/// cycle lock, so it is safe to call from background tasks.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: AppEvent);
}

/// One client-originated input event, already resolved from its client
/// render id to a server component.
#[derive(Debug, Clone)]
pub struct ClientEvent {
    pub component_id: ComponentId,
    /// Event discriminator, e.g. `"click"` or `"property"`.
    pub event_type: String,
    pub payload: serde_json::Value,
}

// =============================================================================
// APPLICATION
// =============================================================================

/// Failure inside application logic. Startup failures are recorded by the
/// session and never retried.
#[derive(Debug, Clone, thiserror::Error)]
#[error("application failure: {0}")]
pub struct ApplicationError(pub String);

impl From<&str> for ApplicationError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// Mutable view handed to application callbacks for the duration of one
/// synchronization cycle. Borrowed from session state held under the cycle
/// lock.
pub struct AppContext<'a> {
    pub tree: &'a mut ComponentTree,
    pub updates: &'a mut UpdateManager,
    pub signals: &'a dyn EventSink,
}

/// Application logic hosted by a [`crate::session::UserSession`].
pub trait Application: Send {
    /// One-time startup hook. Invoked at most once per session, even when it
    /// fails.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplicationError`] if startup fails; the triggering
    /// request fails but the session stays usable for diagnostics.
    fn init(&mut self, cx: AppContext<'_>) -> Result<(), ApplicationError>;

    /// Handle one resolved client event.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplicationError`] if the event cannot be applied.
    fn process_event(&mut self, event: &ClientEvent, cx: AppContext<'_>) -> Result<(), ApplicationError>;

    /// Disposal hook. Called exactly once from `UserSession::dispose`.
    fn dispose(&mut self) {}
}

/// Factory creating application instances, one per session.
pub type ApplicationFactory = std::sync::Arc<dyn Fn() -> Box<dyn Application> + Send + Sync>;

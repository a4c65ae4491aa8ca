//! User session — the per-user-per-application synchronization object.
//!
//! DESIGN
//! ======
//! A `UserSession` owns the component tree, update manager, render-state
//! store, and transaction sequencer, and carries the live transport binding.
//! All of that mutable state lives inside `SessionCore` behind the session's
//! cycle lock: exactly one synchronization cycle (inbound message →
//! application mutation → update drain → outbound message) runs per session
//! at a time, because drain-then-clear and transaction validate-then-issue
//! are not safe under concurrent cycles.
//!
//! `SessionSignals` sits outside the cycle lock. It holds the dirty-property
//! set and the bound socket sender behind short `std::sync::Mutex` sections,
//! so a background task completing mid-cycle can mark properties dirty or
//! fire the socket wake-up without waiting for the cycle to finish.
//!
//! Render state is an explicit map plus an explicit sweep driven by each
//! drained update batch — entries for unregistered, render-invisible, or
//! removed-descendant components are purged every cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard, mpsc};
use tracing::debug;

use crate::app::{
    AppContext, AppEvent, Application, ApplicationError, ApplicationFactory, ClientEvent, EventSink,
    PROPERTY_CLIENT_CONFIGURATION, PROPERTY_STYLE_SHEET_CHANGED,
};
use crate::component::{ComponentId, ComponentTree, InvalidRenderId};
use crate::protocol::ServerMessage;
use crate::transaction::TransactionSequencer;
use crate::update::{UpdateBatch, UpdateManager};

/// Default asynchronous callback interval when no task queue registered one.
pub const DEFAULT_CALLBACK_INTERVAL_MS: u64 = 500;

/// Opaque per-component server-side rendering state.
pub type RenderState = serde_json::Value;

/// Handle identifying one registered background task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskQueueHandle(u64);

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session already initialized")]
    AlreadyInitialized,
    #[error("session not initialized")]
    NotInitialized,
    #[error("application startup failed: {0}")]
    ApplicationStartup(ApplicationError),
}

// =============================================================================
// SIGNALS (push path, outside the cycle lock)
// =============================================================================

/// Session state reachable from outside the cycle lock: the dirty-property
/// set and the bound socket sender.
#[derive(Debug, Default)]
pub struct SessionSignals {
    dirty_properties: StdMutex<HashSet<String>>,
    socket: StdMutex<Option<mpsc::Sender<ServerMessage>>>,
}

impl SessionSignals {
    pub fn mark_property_dirty(&self, name: impl Into<String>) {
        self.dirty_properties
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.into());
    }

    /// Atomically take the dirty-property set, leaving it empty. A property
    /// marked concurrently lands either in the returned set or the fresh
    /// one — never lost.
    #[must_use]
    pub fn take_dirty_properties(&self) -> Vec<String> {
        let taken = std::mem::take(
            &mut *self
                .dirty_properties
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        let mut names: Vec<String> = taken.into_iter().collect();
        names.sort();
        names
    }

    fn bind_socket(&self, sender: mpsc::Sender<ServerMessage>) {
        *self
            .socket
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(sender);
    }

    fn clear_socket(&self) {
        *self
            .socket
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
    }

    #[must_use]
    pub fn socket_sender(&self) -> Option<mpsc::Sender<ServerMessage>> {
        self.socket
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for SessionSignals {
    fn emit(&self, event: AppEvent) {
        match event {
            AppEvent::TaskEnqueued => {
                // Best-effort wake-up: a single control message telling the
                // client to poll now. A full channel is not an error.
                if let Some(sender) = self.socket_sender() {
                    let _ = sender.try_send(ServerMessage::RequestSync);
                }
            }
            AppEvent::StyleSheetChanged => {
                self.mark_property_dirty(PROPERTY_STYLE_SHEET_CHANGED);
            }
        }
    }
}

// =============================================================================
// CORE (cycle-locked state)
// =============================================================================

/// Session state mutated only while holding the cycle lock.
pub struct SessionCore {
    signals: Arc<SessionSignals>,
    application: Option<Box<dyn Application>>,
    application_started: bool,
    startup_error: Option<ApplicationError>,
    tree: ComponentTree,
    updates: UpdateManager,
    render_states: HashMap<ComponentId, RenderState>,
    task_intervals: HashMap<TaskQueueHandle, u64>,
    next_task_queue_id: u64,
    client_configuration: Option<serde_json::Value>,
}

impl SessionCore {
    fn new(signals: Arc<SessionSignals>) -> Self {
        Self {
            signals,
            application: None,
            application_started: false,
            startup_error: None,
            tree: ComponentTree::new(),
            updates: UpdateManager::new(),
            render_states: HashMap::new(),
            task_intervals: HashMap::new(),
            next_task_queue_id: 0,
            client_configuration: None,
        }
    }

    pub fn tree(&self) -> &ComponentTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut ComponentTree {
        &mut self.tree
    }

    pub fn updates_mut(&mut self) -> &mut UpdateManager {
        &mut self.updates
    }

    /// Run the one-time application startup hook. The instance is marked
    /// started even when startup fails, so a broken constructor is not
    /// retried; only the triggering request observes the failure.
    pub fn ensure_application_started(&mut self) -> Result<(), SessionError> {
        if self.application_started {
            return Ok(());
        }
        let Some(mut application) = self.application.take() else {
            return Err(SessionError::NotInitialized);
        };
        self.application_started = true;
        let signals = Arc::clone(&self.signals);
        let result = application.init(AppContext {
            tree: &mut self.tree,
            updates: &mut self.updates,
            signals: signals.as_ref(),
        });
        self.application = Some(application);
        if let Err(e) = result {
            self.startup_error = Some(e.clone());
            return Err(SessionError::ApplicationStartup(e));
        }
        Ok(())
    }

    /// The recorded startup failure, if the one-shot startup hook failed.
    #[must_use]
    pub fn startup_error(&self) -> Option<&ApplicationError> {
        self.startup_error.as_ref()
    }

    #[must_use]
    pub fn application_started(&self) -> bool {
        self.application_started
    }

    /// Dispatch one resolved client event to the application.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplicationError`] if no application instance exists or
    /// the application fails to apply the event.
    pub fn process_client_event(&mut self, event: &ClientEvent) -> Result<(), ApplicationError> {
        let Some(mut application) = self.application.take() else {
            return Err(ApplicationError("no application instance".into()));
        };
        let signals = Arc::clone(&self.signals);
        let result = application.process_event(
            event,
            AppContext {
                tree: &mut self.tree,
                updates: &mut self.updates,
                signals: signals.as_ref(),
            },
        );
        self.application = Some(application);
        result
    }

    /// Resolve a client render id against the current tree.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRenderId`] when the id does not map to a registered
    /// component.
    pub fn resolve_client_render_id(&self, client_id: &str) -> Result<ComponentId, InvalidRenderId> {
        self.tree.component_by_client_render_id(client_id)
    }

    /// Drain the accumulated update batch. Exactly-once per cycle.
    pub fn drain_updates(&mut self) -> UpdateBatch {
        self.updates.drain()
    }

    // =========================================================================
    // RENDER STATE
    // =========================================================================

    #[must_use]
    pub fn render_state(&self, component: ComponentId) -> Option<&RenderState> {
        self.render_states.get(&component)
    }

    pub fn set_render_state(&mut self, component: ComponentId, state: RenderState) {
        self.render_states.insert(component, state);
    }

    pub fn remove_render_state(&mut self, component: ComponentId) {
        self.render_states.remove(&component);
    }

    pub fn clear_render_states(&mut self) {
        self.render_states.clear();
    }

    #[must_use]
    pub fn render_state_count(&self) -> usize {
        self.render_states.len()
    }

    /// One pass over live render states, removing entries whose components
    /// are unregistered, render-invisible, or reported as removed
    /// descendants by the batch.
    pub fn sweep_render_states(&mut self, batch: &UpdateBatch) {
        let tree = &self.tree;
        self.render_states.retain(|id, _| {
            tree.is_registered(*id) && tree.is_render_visible(*id) && !batch.has_removed_descendant(*id)
        });
    }

    // =========================================================================
    // TASK QUEUES / CALLBACK INTERVAL
    // =========================================================================

    /// Register a task queue with its polling interval.
    pub fn create_task_queue(&mut self, interval_ms: u64) -> TaskQueueHandle {
        self.next_task_queue_id += 1;
        let handle = TaskQueueHandle(self.next_task_queue_id);
        self.task_intervals.insert(handle, interval_ms);
        handle
    }

    pub fn set_task_queue_callback_interval(&mut self, handle: TaskQueueHandle, interval_ms: u64) {
        self.task_intervals.insert(handle, interval_ms);
    }

    pub fn remove_task_queue(&mut self, handle: TaskQueueHandle) {
        self.task_intervals.remove(&handle);
    }

    /// Minimum of all registered task-queue intervals: the fastest consumer
    /// governs the shared polling cadence. Default 500 ms when none.
    #[must_use]
    pub fn callback_interval_ms(&self) -> u64 {
        self.task_intervals
            .values()
            .copied()
            .min()
            .unwrap_or(DEFAULT_CALLBACK_INTERVAL_MS)
    }

    // =========================================================================
    // CLIENT CONFIGURATION
    // =========================================================================

    /// Store application-specific client behavior settings and mark the
    /// `clientConfiguration` property dirty.
    pub fn set_client_configuration(&mut self, configuration: serde_json::Value) {
        self.client_configuration = Some(configuration);
        self.signals.mark_property_dirty(PROPERTY_CLIENT_CONFIGURATION);
    }

    #[must_use]
    pub fn client_configuration(&self) -> Option<&serde_json::Value> {
        self.client_configuration.as_ref()
    }
}

// =============================================================================
// USER SESSION
// =============================================================================

pub struct UserSession {
    id: String,
    window_id: Option<String>,
    initial_request_parameters: HashMap<String, String>,
    /// Container-assigned creation order, used by the window-scoped recovery
    /// scan (most recent first).
    creation_seq: u64,
    initialized: AtomicBool,
    disposed: AtomicBool,
    /// Claim flag for socket binding: set atomically when a socket upgrade
    /// selects this session, so racing upgrades cannot bind it twice.
    socket_claimed: AtomicBool,
    sequencer: TransactionSequencer,
    signals: Arc<SessionSignals>,
    core: Mutex<SessionCore>,
}

impl UserSession {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        window_id: Option<String>,
        initial_request_parameters: HashMap<String, String>,
        creation_seq: u64,
    ) -> Self {
        let signals = Arc::new(SessionSignals::default());
        Self {
            id: id.into(),
            window_id,
            initial_request_parameters,
            creation_seq,
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            socket_claimed: AtomicBool::new(false),
            sequencer: TransactionSequencer::new(),
            core: Mutex::new(SessionCore::new(Arc::clone(&signals))),
            signals,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn window_id(&self) -> Option<&str> {
        self.window_id.as_deref()
    }

    /// Query parameters of the HTTP request that created this session.
    #[must_use]
    pub fn initial_request_parameters(&self) -> &HashMap<String, String> {
        &self.initial_request_parameters
    }

    #[must_use]
    pub fn creation_seq(&self) -> u64 {
        self.creation_seq
    }

    #[must_use]
    pub fn sequencer(&self) -> &TransactionSequencer {
        &self.sequencer
    }

    /// Sink handed to application background tasks for server-push signals.
    #[must_use]
    pub fn event_sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.signals) as Arc<dyn EventSink>
    }

    #[must_use]
    pub fn signals(&self) -> &SessionSignals {
        &self.signals
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Create the application instance. The application is not started until
    /// the first synchronization cycle invokes its startup hook. The
    /// session's event sink is wired structurally: every application
    /// callback receives it through [`AppContext`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AlreadyInitialized`] on a second call.
    pub async fn initialize(&self, factory: &ApplicationFactory) -> Result<(), SessionError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyInitialized);
        }
        let mut core = self.core.lock().await;
        core.application = Some(factory());
        debug!(session_id = %self.id, "session initialized");
        Ok(())
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Acquire the cycle lock. Held for the duration of one synchronization
    /// cycle; all core mutation goes through the returned guard.
    pub async fn cycle(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().await
    }

    /// Dispose the session: dispose the application instance, drop the
    /// bound socket, release the claim. Idempotent, and safe on a partially
    /// initialized session.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut core = self.core.lock().await;
            if let Some(mut application) = core.application.take() {
                application.dispose();
            }
        }
        self.signals.clear_socket();
        self.socket_claimed.store(false, Ordering::SeqCst);
        debug!(session_id = %self.id, "session disposed");
    }

    // =========================================================================
    // SOCKET BINDING
    // =========================================================================

    /// Atomically claim this session for a socket upgrade. Returns false if
    /// another upgrade already holds the claim.
    pub fn try_claim_socket(&self) -> bool {
        self.socket_claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Claim unconditionally. Used by the explicit-id binding path, where
    /// rebinding evicts the prior socket without notifying it.
    pub fn claim_socket(&self) {
        self.socket_claimed.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_socket_claimed(&self) -> bool {
        self.socket_claimed.load(Ordering::SeqCst)
    }

    /// Record the active socket sender for server-push. At most one per
    /// session; rebinding replaces the previous without notifying it.
    pub fn bind_socket(&self, sender: mpsc::Sender<ServerMessage>) {
        self.signals.bind_socket(sender);
        self.socket_claimed.store(true, Ordering::SeqCst);
    }

    /// Drop the socket binding if `sender` is still the bound one. A socket
    /// that was already replaced by a rebind must not evict its successor.
    pub fn release_socket(&self, sender: &mpsc::Sender<ServerMessage>) {
        let mut socket = self
            .signals
            .socket
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if socket.as_ref().is_some_and(|bound| bound.same_channel(sender)) {
            *socket = None;
            drop(socket);
            self.socket_claimed.store(false, Ordering::SeqCst);
        }
    }

    #[must_use]
    pub fn has_socket(&self) -> bool {
        self.signals.socket_sender().is_some()
    }
}

impl std::fmt::Debug for UserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSession")
            .field("id", &self.id)
            .field("window_id", &self.window_id)
            .field("initialized", &self.is_initialized())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

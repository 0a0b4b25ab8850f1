//! Lifecycle controller
//!
//! The state machine gating creation and destruction of the single
//! language-server session. All entry points (user commands, configuration
//! toggles, editor shutdown) funnel through this type; it is the only owner
//! of a live session.
//!
//! Every operation takes `&mut self`, so two handlers can never run
//! concurrently against the same session and a `stop` issued while a start
//! attempt is in flight cannot begin until that attempt has resolved.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::diagnostics;
use crate::editor::EditorOps;
use crate::lsp::error::SessionError;
use crate::lsp::session::{SessionConfig, SessionEvent};

// ============================================================================
// Lifecycle States
// ============================================================================

/// Language-server lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LspState {
    /// No session exists
    Stopped,
    /// A start attempt is in flight
    Starting,
    /// The session completed its handshake and is serving
    Running,
    /// The last start attempt failed or the server crashed
    Error,
}

impl LspState {
    /// States in which a session exists or is being created
    pub fn is_active(&self) -> bool {
        matches!(self, LspState::Starting | LspState::Running)
    }
}

// ============================================================================
// Session Seams
// ============================================================================

/// The session operations the controller needs
///
/// Boxing behind this trait keeps the state machine testable with mock
/// sessions that never touch a real process.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    /// Sequence number identifying this session instance
    fn seq(&self) -> u64;

    /// Graceful async cleanup (consumes the session)
    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

/// Constructs sessions for the controller
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Launch a session; returning Ok means the server is ready
    async fn launch(
        &self,
        config: SessionConfig,
        seq: u64,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Box<dyn SessionHandle>, SessionError>;
}

// ============================================================================
// Lifecycle Controller
// ============================================================================

/// State machine owning the single language-server session
pub struct LifecycleController {
    /// Editor surface for notifications
    editor: Arc<dyn EditorOps>,

    /// Session construction seam
    launcher: Arc<dyn SessionLauncher>,

    /// Live settings snapshot; read at each start
    settings: Settings,

    /// Workspace root the server runs in
    workspace_root: Option<PathBuf>,

    /// The session, when one exists. At most one, ever.
    session: Option<Box<dyn SessionHandle>>,

    /// Observable lifecycle state
    state_tx: watch::Sender<LspState>,

    /// Sequence counter for sessions; stale exit events are filtered on it
    next_seq: u64,

    /// Sender handed to each session for exit/diagnostic events
    events_tx: mpsc::UnboundedSender<SessionEvent>,

    /// Receiver side, taken once by the host loop
    events_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl LifecycleController {
    /// Create a controller in the `Stopped` state
    pub fn new(
        editor: Arc<dyn EditorOps>,
        launcher: Arc<dyn SessionLauncher>,
        settings: Settings,
        workspace_root: Option<PathBuf>,
    ) -> Self {
        let (state_tx, _) = watch::channel(LspState::Stopped);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            editor,
            launcher,
            settings,
            workspace_root,
            session: None,
            state_tx,
            next_seq: 0,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LspState {
        *self.state_tx.borrow()
    }

    /// Subscribe to lifecycle state changes
    pub fn watch_state(&self) -> watch::Receiver<LspState> {
        self.state_tx.subscribe()
    }

    /// Current settings snapshot
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings snapshot
    ///
    /// Takes effect at the next start; a running session keeps the snapshot
    /// it was started with.
    pub fn update_settings(&mut self, settings: Settings) {
        debug!("Settings snapshot updated");
        self.settings = settings;
    }

    /// Take the session event receiver (host loop wiring; single use)
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.take()
    }

    fn set_state(&self, state: LspState) {
        let previous = self.state();
        if previous != state {
            info!("Lifecycle state: {:?} -> {:?}", previous, state);
        }
        self.state_tx.send_replace(state);
    }

    /// Start the language server
    ///
    /// No-op when a session is already starting or running. On failure the
    /// state becomes `Error` and the failure is surfaced to the user; there
    /// is no automatic retry.
    pub async fn start(&mut self) {
        match self.state() {
            LspState::Starting | LspState::Running => {
                debug!("start ignored; language server is already {:?}", self.state());
                return;
            }
            LspState::Stopped | LspState::Error => {}
        }

        self.set_state(LspState::Starting);

        let config =
            match SessionConfig::from_settings(&self.settings, self.workspace_root.as_deref()) {
                Ok(config) => config,
                Err(e) => {
                    self.set_state(LspState::Error);
                    error!("Invalid language server configuration: {}", e);
                    self.editor
                        .show_error(&startup_failure_message(&self.settings.binary_path, &e))
                        .await;
                    return;
                }
            };

        self.next_seq += 1;
        let seq = self.next_seq;

        match self.launcher.launch(config, seq, self.events_tx.clone()).await {
            Ok(session) => {
                self.session = Some(session);
                self.set_state(LspState::Running);
            }
            Err(e) => {
                self.set_state(LspState::Error);
                error!("Failed to start the language server: {}", e);
                self.editor
                    .show_error(&startup_failure_message(&self.settings.binary_path, &e))
                    .await;
            }
        }
    }

    /// Stop the language server
    ///
    /// Awaits the session's graceful shutdown before returning; callers
    /// never observe a torn-down session as still running. Shutdown errors
    /// are logged only, and the state always reaches `Stopped`.
    pub async fn stop(&mut self) {
        if self.state() == LspState::Stopped && self.session.is_none() {
            return;
        }

        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!("Language server shutdown error (ignored): {}", e);
            }
        }

        self.set_state(LspState::Stopped);
    }

    /// Restart the language server: a full stop, then a fresh start
    pub async fn restart(&mut self) {
        info!("Restarting language server");
        self.stop().await;
        self.start().await;
    }

    /// Editor shutdown path; no session survives the controller
    pub async fn dispose(&mut self) {
        self.stop().await;
    }

    /// Dispatch one session event from the host loop
    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Exited { seq } => self.on_session_exit(seq).await,
            SessionEvent::Diagnostics(params) => {
                let diagnostics = diagnostics::relay(params.diagnostics);
                self.editor.publish_diagnostics(params.uri, diagnostics).await;
            }
        }
    }

    /// Handle an unexpected server exit
    ///
    /// Events from sessions that have already been replaced or stopped are
    /// ignored; only the live session's death is a crash. No automatic
    /// restart happens, the restart command is the recovery path.
    pub async fn on_session_exit(&mut self, seq: u64) {
        let is_current = self.session.as_ref().map(|session| session.seq()) == Some(seq);
        if !is_current {
            debug!("Ignoring exit event from replaced session (seq {})", seq);
            return;
        }

        error!("Language server exited unexpectedly (seq {})", seq);

        // The process is already dead; dropping the handle releases the rest
        self.session = None;
        self.set_state(LspState::Error);

        self.editor
            .show_error(
                "The Mica language server exited unexpectedly. \
                 Use the 'Mica: Restart Language Server' command to start it again, \
                 or check the output log for details.",
            )
            .await;
    }
}

/// Startup failures carry remediation guidance
fn startup_failure_message(binary_path: &str, error: &dyn std::fmt::Display) -> String {
    format!(
        "Failed to start the Mica language server: {error}. \
         Verify that '{binary_path}' is installed and on your PATH, \
         then check the output log for details."
    )
}

// ============================================================================
// Tests
// ============================================================================

//! Test support
//!
//! Recorded mocks for the two seams the crate is built around: the editor
//! surface and the session launcher. Every interaction is recorded so tests
//! assert on observed behavior instead of internals.

use async_trait::async_trait;
use lsp_types::{Diagnostic, Uri};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

use crate::editor::{DocumentInfo, EditorOps, StatusIndicator};
use crate::lsp::error::SessionError;
use crate::lsp::lifecycle::{LspState, SessionHandle, SessionLauncher};
use crate::lsp::session::{SessionConfig, SessionEvent};

// ============================================================================
// Mock Editor
// ============================================================================

/// Editor mock recording every interaction
#[derive(Default)]
pub struct MockEditor {
    active_document: Mutex<Option<DocumentInfo>>,
    errors: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
    statuses: Mutex<Vec<Option<StatusIndicator>>>,
    saved: Mutex<Vec<DocumentInfo>>,
    format_calls: Mutex<usize>,
    terminals: Mutex<Vec<(String, String, Vec<String>)>>,
    show_output_calls: Mutex<usize>,
    published: Mutex<Vec<(Uri, Vec<Diagnostic>)>>,
}

impl MockEditor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_active_document(&self, document: Option<DocumentInfo>) {
        *self.active_document.lock().unwrap() = document;
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<Option<StatusIndicator>> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn saved(&self) -> Vec<DocumentInfo> {
        self.saved.lock().unwrap().clone()
    }

    pub fn format_count(&self) -> usize {
        *self.format_calls.lock().unwrap()
    }

    /// Terminal launches as (title, program, args)
    pub fn terminals(&self) -> Vec<(String, String, Vec<String>)> {
        self.terminals.lock().unwrap().clone()
    }

    pub fn show_output_count(&self) -> usize {
        *self.show_output_calls.lock().unwrap()
    }

    pub fn published(&self) -> Vec<(Uri, Vec<Diagnostic>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EditorOps for MockEditor {
    fn active_document(&self) -> Option<DocumentInfo> {
        self.active_document.lock().unwrap().clone()
    }

    async fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    async fn show_warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    async fn set_status(&self, indicator: Option<StatusIndicator>) {
        self.statuses.lock().unwrap().push(indicator);
    }

    async fn save_document(&self, document: &DocumentInfo) {
        self.saved.lock().unwrap().push(document.clone());
    }

    async fn format_active_document(&self) {
        *self.format_calls.lock().unwrap() += 1;
    }

    async fn run_in_terminal(&self, title: &str, program: &str, args: &[String]) {
        self.terminals.lock().unwrap().push((
            title.to_string(),
            program.to_string(),
            args.to_vec(),
        ));
    }

    async fn show_output(&self) {
        *self.show_output_calls.lock().unwrap() += 1;
    }

    async fn publish_diagnostics(&self, uri: Uri, diagnostics: Vec<Diagnostic>) {
        self.published.lock().unwrap().push((uri, diagnostics));
    }
}

// ============================================================================
// Mock Launcher / Session
// ============================================================================

/// Everything a lifecycle test wants to know about launcher activity
#[derive(Debug, Clone, Default)]
pub struct LaunchRecord {
    pub launches: usize,
    pub closes: usize,
    /// Sessions alive right now
    pub live: usize,
    /// High-water mark of concurrently live sessions
    pub max_live: usize,
    /// Sequence numbers in launch order
    pub seqs: Vec<u64>,
    /// Controller state observed at each launch
    pub state_at_launch: Vec<LspState>,
    /// Config snapshots each session was started with
    pub configs: Vec<SessionConfig>,
    /// Interleaving of session events ("launch", "close", "drop")
    pub order: Vec<&'static str>,
}

/// Launcher mock producing in-memory sessions
pub struct MockLauncher {
    record: Arc<Mutex<LaunchRecord>>,
    fail_launches: AtomicBool,
    state: Mutex<Option<watch::Receiver<LspState>>>,
}

impl MockLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            record: Arc::new(Mutex::new(LaunchRecord::default())),
            fail_launches: AtomicBool::new(false),
            state: Mutex::new(None),
        })
    }

    /// Give the launcher a state receiver so launches can record the
    /// controller state they were issued under
    pub fn observe_state(&self, receiver: watch::Receiver<LspState>) {
        *self.state.lock().unwrap() = Some(receiver);
    }

    /// Make launches fail until turned off again
    pub fn set_launch_failure(&self, fail: bool) {
        self.fail_launches.store(fail, Ordering::SeqCst);
    }

    pub fn record(&self) -> LaunchRecord {
        self.record.lock().unwrap().clone()
    }
}

struct MockSession {
    seq: u64,
    record: Arc<Mutex<LaunchRecord>>,
    closed: bool,
}

#[async_trait]
impl SessionHandle for MockSession {
    fn seq(&self) -> u64 {
        self.seq
    }

    async fn close(mut self: Box<Self>) -> Result<(), SessionError> {
        self.closed = true;
        let mut record = self.record.lock().unwrap();
        record.live -= 1;
        record.closes += 1;
        record.order.push("close");
        Ok(())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        // A dropped-but-not-closed session still stops being live (the
        // crash path drops the handle of an already-dead process)
        if !self.closed {
            let mut record = self.record.lock().unwrap();
            record.live -= 1;
            record.order.push("drop");
        }
    }
}

#[async_trait]
impl SessionLauncher for MockLauncher {
    async fn launch(
        &self,
        config: SessionConfig,
        seq: u64,
        _events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Box<dyn SessionHandle>, SessionError> {
        // Yield once so the Starting state is observable by watchers
        tokio::task::yield_now().await;

        if self.fail_launches.load(Ordering::SeqCst) {
            return Err(SessionError::operation_timeout(
                "mock launch",
                std::time::Duration::from_millis(1),
            ));
        }

        let state_at_launch = self
            .state
            .lock()
            .unwrap()
            .as_ref()
            .map(|receiver| *receiver.borrow());

        let mut record = self.record.lock().unwrap();
        record.launches += 1;
        record.live += 1;
        record.max_live = record.max_live.max(record.live);
        record.seqs.push(seq);
        record.order.push("launch");
        if let Some(state) = state_at_launch {
            record.state_at_launch.push(state);
        }
        record.configs.push(config);
        drop(record);

        Ok(Box::new(MockSession {
            seq,
            record: Arc::clone(&self.record),
            closed: false,
        }))
    }
}

// ============================================================================
// Test Logging
// ============================================================================

/// Opt-in logging for test debugging (the `test-logging` feature)
pub mod logging {
    use std::sync::Once;

    pub fn init() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

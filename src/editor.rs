//! Editor abstraction
//!
//! `EditorOps` is the only surface through which this crate touches the
//! host editor: notifications, the status item, terminal creation, the
//! save/format actions, and diagnostics display. Keeping it a trait keeps
//! every component testable against a recorded mock and keeps the editor
//! API out of the lifecycle code.

use async_trait::async_trait;
use lsp_types::{Diagnostic, Uri};
use std::path::PathBuf;

/// The document currently focused in the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Absolute path of the document on disk
    pub path: PathBuf,

    /// Editor language identifier (e.g. `"mica"`)
    pub language_id: String,
}

impl DocumentInfo {
    pub fn new(path: impl Into<PathBuf>, language_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language_id: language_id.into(),
        }
    }
}

/// What the status item should display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusIndicator {
    pub text: String,
    pub tooltip: String,
}

/// Operations the extension performs against the host editor
#[async_trait]
pub trait EditorOps: Send + Sync {
    /// The currently focused document, if any
    fn active_document(&self) -> Option<DocumentInfo>;

    /// Blocking error notification (startup failures, crashes)
    async fn show_error(&self, message: &str);

    /// Non-blocking warning notification
    async fn show_warning(&self, message: &str);

    /// Update the status item; `None` hides it
    async fn set_status(&self, indicator: Option<StatusIndicator>);

    /// Persist a document to disk
    async fn save_document(&self, document: &DocumentInfo);

    /// Invoke the editor's generic format-document action on the active
    /// document; the editor routes it through the registered provider
    async fn format_active_document(&self);

    /// Launch `program args...` in a fresh terminal titled `title`.
    /// Fire-and-forget: no output is parsed, the terminal is the only
    /// feedback channel.
    async fn run_in_terminal(&self, title: &str, program: &str, args: &[String]);

    /// Reveal the output/log surface
    async fn show_output(&self);

    /// Display a diagnostic batch for a document
    async fn publish_diagnostics(&self, uri: Uri, diagnostics: Vec<Diagnostic>);
}

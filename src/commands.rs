//! Command dispatcher
//!
//! Maps the user-invokable commands to a session operation or a
//! fire-and-forget terminal invocation. Every file-oriented command first
//! validates that the active document is a Mica file; otherwise it surfaces
//! a warning and does nothing.

use std::sync::Arc;
use tracing::debug;

use crate::config::LANGUAGE_ID;
use crate::editor::{DocumentInfo, EditorOps};
use crate::lsp::lifecycle::{LifecycleController, LspState};

/// Terminal titles; the check terminal is shared with the save hook
const RUN_TERMINAL: &str = "mica run";
const BUILD_TERMINAL: &str = "mica build";
const CHECK_TERMINAL: &str = "mica check";

// ============================================================================
// Commands
// ============================================================================

/// User-invokable commands, defined once at startup and never mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    RunFile,
    BuildFile,
    CheckFile,
    FormatFile,
    RestartLsp,
    ShowOutput,
}

impl Command {
    /// Every command, in registration order
    pub const ALL: [Command; 6] = [
        Command::RunFile,
        Command::BuildFile,
        Command::CheckFile,
        Command::FormatFile,
        Command::RestartLsp,
        Command::ShowOutput,
    ];

    /// Stable identifier the editor binds to
    pub fn id(self) -> &'static str {
        match self {
            Command::RunFile => "mica.runFile",
            Command::BuildFile => "mica.buildFile",
            Command::CheckFile => "mica.checkFile",
            Command::FormatFile => "mica.formatFile",
            Command::RestartLsp => "mica.restartLsp",
            Command::ShowOutput => "mica.showOutput",
        }
    }

    /// Human-readable title shown in the command palette
    pub fn title(self) -> &'static str {
        match self {
            Command::RunFile => "Mica: Run File",
            Command::BuildFile => "Mica: Build File",
            Command::CheckFile => "Mica: Check File",
            Command::FormatFile => "Mica: Format File",
            Command::RestartLsp => "Mica: Restart Language Server",
            Command::ShowOutput => "Mica: Show Output",
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes commands to the controller, the editor, or a terminal
pub struct CommandDispatcher {
    editor: Arc<dyn EditorOps>,
}

impl CommandDispatcher {
    pub fn new(editor: Arc<dyn EditorOps>) -> Self {
        Self { editor }
    }

    /// Execute one command
    pub async fn dispatch(&self, command: Command, lifecycle: &mut LifecycleController) {
        debug!("Dispatching command: {}", command.id());

        match command {
            Command::RestartLsp => lifecycle.restart().await,
            Command::ShowOutput => self.editor.show_output().await,
            Command::FormatFile => self.format_file(lifecycle).await,
            Command::RunFile => self.run_tool(lifecycle, RUN_TERMINAL, &[]).await,
            Command::BuildFile => self.run_tool(lifecycle, BUILD_TERMINAL, &["build"]).await,
            Command::CheckFile => self.run_tool(lifecycle, CHECK_TERMINAL, &["check"]).await,
        }
    }

    /// Document-saved hook
    ///
    /// Applies the `formatOnSave`/`checkOnSave` settings to saved Mica
    /// files. Neither path touches lifecycle state.
    pub async fn on_document_saved(
        &self,
        document: &DocumentInfo,
        lifecycle: &LifecycleController,
    ) {
        if document.language_id != LANGUAGE_ID {
            return;
        }

        let settings = lifecycle.settings();

        if settings.format_on_save && lifecycle.state() == LspState::Running {
            self.editor.format_active_document().await;
        }

        if settings.check_on_save {
            let args = vec![
                "check".to_string(),
                document.path.to_string_lossy().into_owned(),
            ];
            self.editor
                .run_in_terminal(CHECK_TERMINAL, &settings.binary_path, &args)
                .await;
        }
    }

    /// The active document, when it is a Mica file; warns otherwise
    async fn require_mica_document(&self) -> Option<DocumentInfo> {
        match self.editor.active_document() {
            Some(document) if document.language_id == LANGUAGE_ID => Some(document),
            _ => {
                self.editor
                    .show_warning("The active editor is not a Mica file.")
                    .await;
                None
            }
        }
    }

    /// Save the active document, then run the tool on it in a fresh terminal
    ///
    /// Fire-and-forget: no output is parsed, the terminal is the only
    /// feedback channel.
    async fn run_tool(&self, lifecycle: &LifecycleController, title: &str, subcommand: &[&str]) {
        let Some(document) = self.require_mica_document().await else {
            return;
        };

        // Persist the buffer first; the tool reads from disk
        self.editor.save_document(&document).await;

        let mut args: Vec<String> = subcommand.iter().map(|s| s.to_string()).collect();
        args.push(document.path.to_string_lossy().into_owned());

        self.editor
            .run_in_terminal(title, &lifecycle.settings().binary_path, &args)
            .await;
    }

    /// Delegate to the editor's generic format action; requires a running
    /// session since formatting round-trips through it
    async fn format_file(&self, lifecycle: &LifecycleController) {
        if self.require_mica_document().await.is_none() {
            return;
        }

        if lifecycle.state() != LspState::Running {
            self.editor
                .show_warning("Cannot format: the Mica language server is not running.")
                .await;
            return;
        }

        self.editor.format_active_document().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

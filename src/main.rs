//! Headless host for the mica-editor controller
//!
//! A development harness standing in for a real editor: notifications and
//! status updates go to the log, terminal commands run as plain child
//! processes, and diagnostics are summarized on stderr. Useful for
//! exercising the lifecycle against a real `mica` binary without an editor.

use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use mica_editor::config::DEFAULT_BINARY;
use mica_editor::editor::{DocumentInfo, EditorOps, StatusIndicator};
use mica_editor::logging::{LogConfig, init_logging};
use mica_editor::lsp::ProcessSessionLauncher;
use mica_editor::{LifecycleController, Settings};

/// CLI arguments for the headless host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workspace root the language server runs in (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Path to the mica binary (overrides MICA_PATH env var)
    #[arg(long, value_name = "PATH")]
    binary: Option<String>,

    /// Enable verbose protocol tracing
    #[arg(long)]
    trace: bool,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides MICA_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

/// Resolve the binary path from CLI args and environment
fn resolve_binary_path(binary_arg: Option<String>) -> String {
    // Priority: CLI arg > MICA_PATH env var > "mica" default
    binary_arg
        .or_else(|| std::env::var("MICA_PATH").ok())
        .unwrap_or_else(|| DEFAULT_BINARY.to_string())
}

/// Editor surface backed by nothing but the log
struct HeadlessEditor;

#[async_trait]
impl EditorOps for HeadlessEditor {
    fn active_document(&self) -> Option<DocumentInfo> {
        None
    }

    async fn show_error(&self, message: &str) {
        error!("{message}");
    }

    async fn show_warning(&self, message: &str) {
        warn!("{message}");
    }

    async fn set_status(&self, indicator: Option<StatusIndicator>) {
        match indicator {
            Some(indicator) => info!("status: {}", indicator.text),
            None => debug!("status hidden"),
        }
    }

    async fn save_document(&self, document: &DocumentInfo) {
        debug!("save requested for {}", document.path.display());
    }

    async fn format_active_document(&self) {
        warn!("format has no target in headless mode");
    }

    async fn run_in_terminal(&self, title: &str, program: &str, args: &[String]) {
        info!("[{title}] {program} {args:?}");
        match tokio::process::Command::new(program).args(args).spawn() {
            Ok(mut child) => {
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
            Err(e) => error!("Failed to launch '{program}': {e}"),
        }
    }

    async fn show_output(&self) {
        info!("logs are written to stderr (or MICA_LOG_FILE)");
    }

    async fn publish_diagnostics(
        &self,
        uri: lsp_types::Uri,
        diagnostics: Vec<lsp_types::Diagnostic>,
    ) {
        info!("{}: {} diagnostic(s)", uri.as_str(), diagnostics.len());
        for diagnostic in &diagnostics {
            info!(
                "  [{}] {}",
                diagnostic.source.as_deref().unwrap_or("?"),
                diagnostic.message
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_config =
        LogConfig::from_env().with_overrides(args.log_level.clone(), args.log_file.clone());
    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let workspace_root = args.root.clone().unwrap_or_else(|| {
        std::env::current_dir().unwrap_or_else(|e| {
            eprintln!("Failed to get current directory: {e}");
            std::process::exit(1);
        })
    });

    let settings = Settings {
        binary_path: resolve_binary_path(args.binary),
        lsp_trace: args.trace,
        ..Settings::default()
    };

    info!("Using mica binary: {}", settings.binary_path);
    info!("Workspace root: {}", workspace_root.display());

    let editor: Arc<dyn EditorOps> = Arc::new(HeadlessEditor);
    let mut controller = LifecycleController::new(
        editor,
        Arc::new(ProcessSessionLauncher),
        settings.clone(),
        Some(workspace_root),
    );

    let Some(mut events) = controller.take_events() else {
        eprintln!("Session event channel unavailable");
        std::process::exit(1);
    };

    // Auto-start mirrors editor activation with lspEnabled on
    if settings.lsp_enabled {
        controller.start().await;
    }

    info!("mica-editor host ready; Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(event) => controller.handle_event(event).await,
                    None => break,
                }
            }
        }
    }

    // No subprocess survives the controller
    controller.dispose().await;

    Ok(())
}

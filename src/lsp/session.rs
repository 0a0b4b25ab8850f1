//! Language-server session management
//!
//! An `LspSession` owns exactly one language-server process and the LSP
//! client speaking to it. Construction IS readiness: `spawn()` returns only
//! after the process is up and the initialize handshake has completed, so a
//! session value is always usable. `close()` consumes the session and
//! performs the graceful shutdown sequence.

use async_trait::async_trait;
use lsp_types::notification::{Notification, PublishDiagnostics};
use lsp_types::{PublishDiagnosticsParams, Uri};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::io::process::{ChildProcessManager, ProcessExitEvent, ProcessExitHandler, StopMode};
use crate::lsp::client::LspClient;
use crate::lsp::error::{ConfigError, SessionError};
use crate::lsp::lifecycle::{SessionHandle, SessionLauncher};

// ============================================================================
// Constants
// ============================================================================

/// Sub-command that puts the toolchain binary into language-server mode
pub const LSP_SUBCOMMAND: &str = "lsp";

/// Environment variable signalling native mode to the server. Informational
/// only; the controller never changes behavior based on it.
pub const NATIVE_MODE_ENV: &str = "MICA_NATIVE";

/// Default timeout for the initialize handshake (30 seconds)
pub const DEFAULT_INITIALIZATION_TIMEOUT_SECS: u64 = 30;

/// Default timeout for individual LSP requests (10 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Session Configuration
// ============================================================================

/// Validated per-start configuration snapshot
///
/// Derived from the live `Settings` when the lifecycle controller starts a
/// session; later settings changes never mutate an existing snapshot.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Path to the toolchain binary
    pub binary_path: String,

    /// Verbose protocol tracing
    pub trace: bool,

    /// Root URI for LSP initialization
    pub root_uri: Option<String>,

    /// Working directory for the server process
    pub working_directory: Option<PathBuf>,

    /// Timeout for the initialize handshake
    pub initialization_timeout: Duration,

    /// Timeout for individual LSP requests
    pub request_timeout: Duration,
}

impl SessionConfig {
    /// Build a session configuration from the current settings snapshot
    pub fn from_settings(
        settings: &Settings,
        workspace_root: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            binary_path: settings.binary_path.clone(),
            trace: settings.lsp_trace,
            root_uri: workspace_root.map(|root| format!("file://{}", root.to_string_lossy())),
            working_directory: workspace_root.map(Path::to_path_buf),
            initialization_timeout: Duration::from_secs(DEFAULT_INITIALIZATION_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.binary_path.is_empty() {
            return Err(ConfigError::invalid_binary_path(
                &self.binary_path,
                "binary path cannot be empty",
            ));
        }

        if self.binary_path.contains('\0') {
            return Err(ConfigError::invalid_binary_path(
                &self.binary_path,
                "binary path contains null character",
            ));
        }

        // Note: existence is not checked here; the binary may live on the
        // search path or be installed between configuration and start. The
        // spawn itself reports a missing binary.

        if self.initialization_timeout.is_zero() {
            return Err(ConfigError::invalid_timeout(
                self.initialization_timeout,
                "initialization timeout must be greater than zero",
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid_timeout(
                self.request_timeout,
                "request timeout must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Command-line arguments for the server process
    pub fn server_args(&self) -> Vec<String> {
        vec![LSP_SUBCOMMAND.to_string()]
    }

    /// Environment variables injected into the server process
    pub fn server_env(&self) -> Vec<(String, String)> {
        vec![(NATIVE_MODE_ENV.to_string(), "1".to_string())]
    }

    /// Parse the configured root URI, if any
    fn parse_root_uri(&self) -> Result<Option<Uri>, SessionError> {
        self.root_uri
            .as_deref()
            .map(|uri| {
                uri.parse::<Uri>()
                    .map_err(|_| SessionError::invalid_root_uri(uri))
            })
            .transpose()
    }
}

// ============================================================================
// Session Events
// ============================================================================

/// Events crossing from session background tasks to the host loop
#[derive(Debug)]
pub enum SessionEvent {
    /// The server process exited on its own
    Exited { seq: u64 },

    /// The server published a diagnostic batch
    Diagnostics(PublishDiagnosticsParams),
}

/// Exit handler forwarding process death as a sequence-tagged event
struct ExitNotifier {
    seq: u64,
    events: mpsc::UnboundedSender<SessionEvent>,
}

#[async_trait]
impl ProcessExitHandler for ExitNotifier {
    async fn on_process_exit(&self, event: ProcessExitEvent) {
        debug!(
            "Language server process exited (seq {}, code {:?})",
            self.seq, event.code
        );
        let _ = self.events.send(SessionEvent::Exited { seq: self.seq });
    }
}

// ============================================================================
// Session
// ============================================================================

/// One language-server process plus its protocol client
pub struct LspSession {
    /// Configuration snapshot this session was started with
    config: SessionConfig,

    /// Sequence number distinguishing this session from its predecessors
    seq: u64,

    /// Process manager for the server (running for the session's lifetime)
    process: ChildProcessManager,

    /// LSP client (always initialized)
    client: LspClient<crate::io::transport::StdioTransport>,

    /// Session start timestamp
    started_at: Instant,
}

impl LspSession {
    /// Spawn the server and complete the initialize handshake
    ///
    /// If this returns Ok, the session is fully operational. On any failure
    /// the partially started process is stopped before the error is
    /// returned, so no subprocess can leak from a failed start.
    pub async fn spawn(
        config: SessionConfig,
        seq: u64,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        info!("Starting language server session (seq {})", seq);
        debug!("Server binary: {}", config.binary_path);

        let mut process = ChildProcessManager::new(
            config.binary_path.clone(),
            config.server_args(),
            config.server_env(),
            config.working_directory.clone(),
        );

        process.on_exit(Arc::new(ExitNotifier {
            seq,
            events: events.clone(),
        }));

        // Server stderr feeds the log surface; promote to info under trace
        let trace = config.trace;
        process.on_stderr_line(move |line| {
            if trace {
                info!(target: "mica_editor::server", "{line}");
            } else {
                debug!(target: "mica_editor::server", "{line}");
            }
        });

        process.start().await?;

        let transport = match process.take_transport() {
            Ok(transport) => transport,
            Err(e) => {
                let _ = process.stop(StopMode::Force).await;
                return Err(e.into());
            }
        };

        let mut client = LspClient::new(transport, config.trace, config.request_timeout);

        // Forward diagnostic batches; every other notification is noise here
        let diagnostic_events = events.clone();
        client
            .on_notification(move |notification| {
                if notification.method != PublishDiagnostics::METHOD {
                    debug!("Ignoring notification: {}", notification.method);
                    return;
                }
                let Some(params) = notification.params else {
                    return;
                };
                match serde_json::from_value::<PublishDiagnosticsParams>(params) {
                    Ok(params) => {
                        let _ = diagnostic_events.send(SessionEvent::Diagnostics(params));
                    }
                    Err(e) => debug!("Malformed publishDiagnostics payload: {}", e),
                }
            })
            .await;

        let root_uri = match config.parse_root_uri() {
            Ok(root_uri) => root_uri,
            Err(e) => {
                let _ = process.stop(StopMode::Force).await;
                return Err(e);
            }
        };

        debug!("Initializing LSP connection");
        let init_result = tokio::time::timeout(
            config.initialization_timeout,
            client.initialize(root_uri),
        )
        .await;

        match init_result {
            Ok(Ok(result)) => {
                debug!("LSP initialization completed: {:?}", result.capabilities);
            }
            Ok(Err(e)) => {
                let _ = client.close().await;
                let _ = process.stop(StopMode::Force).await;
                return Err(e.into());
            }
            Err(_) => {
                let _ = client.close().await;
                let _ = process.stop(StopMode::Force).await;
                return Err(SessionError::operation_timeout(
                    "LSP initialization",
                    config.initialization_timeout,
                ));
            }
        }

        info!("Language server session started successfully");

        Ok(Self {
            config,
            seq,
            process,
            client,
            started_at: Instant::now(),
        })
    }

    /// Graceful async cleanup; consumes self to prevent further use
    ///
    /// Shutdown-request failures are logged and do not block teardown; the
    /// process still gets its termination signal.
    pub async fn close(mut self) -> Result<(), SessionError> {
        info!("Gracefully shutting down language server session");

        let shutdown_result = tokio::time::timeout(
            self.config.request_timeout,
            self.client.shutdown(),
        )
        .await;

        match shutdown_result {
            Ok(Ok(())) => debug!("LSP client shutdown completed"),
            Ok(Err(e)) => warn!("LSP client shutdown error: {}", e),
            Err(_) => warn!("LSP client shutdown timed out"),
        }

        let _ = self.client.close().await;

        debug!("Stopping language server process");
        self.process.stop(StopMode::Graceful).await?;

        info!("Language server session shutdown completed");
        Ok(())
    }

    /// Get session uptime
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Health accessor: whether the server process is still alive
    pub fn is_running(&self) -> bool {
        self.process.is_running()
    }

    /// Get the configuration snapshot this session was started with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

/// Force-kill fallback if close() was never called
impl Drop for LspSession {
    fn drop(&mut self) {
        if self.process.is_running() {
            warn!("LspSession dropped without close(); force killing process");
            self.process.kill_sync();
        }
    }
}

#[async_trait]
impl SessionHandle for LspSession {
    fn seq(&self) -> u64 {
        self.seq
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        LspSession::close(*self).await
    }
}

// ============================================================================
// Process-backed Launcher
// ============================================================================

/// Launcher spawning real server processes
pub struct ProcessSessionLauncher;

#[async_trait]
impl SessionLauncher for ProcessSessionLauncher {
    async fn launch(
        &self,
        config: SessionConfig,
        seq: u64,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Box<dyn SessionHandle>, SessionError> {
        let session = LspSession::spawn(config, seq, events).await?;
        Ok(Box::new(session))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Auto-initialize logging for all tests in this module
    #[cfg(feature = "test-logging")]
    #[ctor::ctor]
    fn init_test_logging() {
        crate::testing::logging::init();
    }

    fn test_config(binary_path: &str) -> SessionConfig {
        SessionConfig {
            binary_path: binary_path.to_string(),
            trace: false,
            root_uri: None,
            working_directory: None,
            initialization_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_config_from_settings_defaults() {
        let settings = Settings::default();
        let config = SessionConfig::from_settings(&settings, None).unwrap();

        assert_eq!(config.binary_path, "mica");
        assert!(!config.trace);
        assert!(config.root_uri.is_none());
        assert_eq!(
            config.initialization_timeout,
            Duration::from_secs(DEFAULT_INITIALIZATION_TIMEOUT_SECS)
        );
        assert_eq!(config.server_args(), vec!["lsp"]);
        assert_eq!(
            config.server_env(),
            vec![("MICA_NATIVE".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn test_config_root_uri_derivation() {
        let settings = Settings::default();
        let config =
            SessionConfig::from_settings(&settings, Some(Path::new("/work/project"))).unwrap();

        assert_eq!(config.root_uri.as_deref(), Some("file:///work/project"));
        assert_eq!(
            config.working_directory.as_deref(),
            Some(Path::new("/work/project"))
        );
    }

    #[test]
    fn test_config_validation_empty_binary() {
        let settings = Settings {
            binary_path: String::new(),
            ..Settings::default()
        };

        let result = SessionConfig::from_settings(&settings, None);
        assert!(matches!(result, Err(ConfigError::InvalidBinaryPath { .. })));
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = test_config("mica");
        config.request_timeout = Duration::ZERO;

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::InvalidTimeout { .. })));
    }

    #[tokio::test]
    async fn test_spawn_failure_with_missing_binary() {
        let (events, _rx) = mpsc::unbounded_channel();
        let config = test_config("nonexistent-mica-binary");

        let result = LspSession::spawn(config, 1, events).await;
        assert!(result.is_err());
    }

    // A scripted stand-in for `mica lsp`: answers the initialize request,
    // pushes one diagnostic batch, then idles until terminated.
    #[cfg(unix)]
    fn write_fake_server(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-mica");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn framed_printf(payload: &str) -> String {
        format!(
            "printf 'Content-Length: {}\\r\\n\\r\\n{}'",
            payload.len(),
            payload
        )
    }

    const INIT_RESPONSE: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"capabilities":{}}}"#;
    const DIAGNOSTICS_NOTIFICATION: &str = r#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{"uri":"file:///work/main.mica","diagnostics":[{"range":{"start":{"line":0,"character":0},"end":{"line":0,"character":3}},"message":"unused binding"}]}}"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_handshake_and_close() {
        let temp_dir = tempfile::tempdir().unwrap();
        let script = format!(
            "{}\n{}\nsleep 5",
            framed_printf(INIT_RESPONSE),
            framed_printf(DIAGNOSTICS_NOTIFICATION)
        );
        let server = write_fake_server(temp_dir.path(), &script);

        let (events, mut rx) = mpsc::unbounded_channel();
        let config = test_config(&server.to_string_lossy());

        let session = LspSession::spawn(config, 7, events).await.unwrap();
        assert_eq!(SessionHandle::seq(&session), 7);
        assert!(session.uptime().as_nanos() > 0);

        // The diagnostic batch printed by the server arrives as an event
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("diagnostics should arrive")
            .expect("channel should stay open");
        match event {
            SessionEvent::Diagnostics(params) => {
                assert_eq!(params.diagnostics.len(), 1);
                assert_eq!(params.diagnostics[0].message, "unused binding");
            }
            other => panic!("Expected diagnostics event, got: {other:?}"),
        }

        // The fake server never answers the shutdown request; close still
        // completes and terminates the process
        session.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_exit_event_after_crash() {
        let temp_dir = tempfile::tempdir().unwrap();
        let script = framed_printf(INIT_RESPONSE);
        let server = write_fake_server(temp_dir.path(), &script);

        let (events, mut rx) = mpsc::unbounded_channel();
        let config = test_config(&server.to_string_lossy());

        let _session = LspSession::spawn(config, 3, events).await.unwrap();

        // The script exits right after the handshake; the wait task reports it
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("exit event should arrive")
            .expect("channel should stay open");
        assert!(matches!(event, SessionEvent::Exited { seq: 3 }));
    }
}

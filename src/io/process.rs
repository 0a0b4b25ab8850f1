//! Process management layer
//!
//! Handles the language-server process lifecycle and stderr monitoring,
//! completely separate from transport concerns.

use crate::io::transport::StdioTransport;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{error, info, trace};

// ============================================================================
// Process State Management
// ============================================================================

/// How to stop a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Try graceful shutdown first (SIGTERM)
    Graceful,
    /// Force kill immediately (SIGKILL)
    Force,
}

/// Process lifecycle states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// Process has not been started yet
    NotStarted,
    /// Process is currently running
    Running { pid: u32 },
    /// Process has been stopped (either gracefully or forcefully)
    Stopped,
}

impl ProcessState {
    /// Get the process ID if the process is running
    pub fn pid(&self) -> Option<u32> {
        match self {
            ProcessState::Running { pid } => Some(*pid),
            _ => None,
        }
    }

    /// Check if the process is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }
}

// ============================================================================
// Process Exit Events
// ============================================================================

/// Event fired when the process exits on its own
#[derive(Debug, Clone)]
pub struct ProcessExitEvent {
    /// Exit code, when the platform reports one
    pub code: Option<i32>,
}

/// Trait for handling process exit events
#[async_trait]
pub trait ProcessExitHandler: Send + Sync {
    /// Called when the process exits on its own
    async fn on_process_exit(&self, event: ProcessExitEvent);
}

// ============================================================================
// Process Management
// ============================================================================

/// Error types for process management
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Process not started")]
    NotStarted,

    #[error("Process already started")]
    AlreadyStarted,

    #[error("Stdin not available")]
    StdinNotAvailable,

    #[error("Stdout not available")]
    StdoutNotAvailable,

    #[error("Stderr not available")]
    StderrNotAvailable,
}

/// Manages the language-server child process
///
/// Owns the spawn configuration (command, arguments, injected environment,
/// working directory), the framed stdio transport created at start, and the
/// background tasks draining stderr and waiting for process exit.
pub struct ChildProcessManager {
    /// Command to execute
    command: String,

    /// Command arguments
    args: Vec<String>,

    /// Extra environment variables set on the child
    envs: Vec<(String, String)>,

    /// Working directory for the process (optional)
    working_directory: Option<PathBuf>,

    /// Thread-safe process state
    state: Arc<Mutex<ProcessState>>,

    /// Stdio transport (created when process starts)
    stdio_transport: Option<StdioTransport>,

    /// Stderr handler
    stderr_handler: Option<Box<dyn Fn(String) + Send + Sync>>,

    /// Stderr monitoring task handle
    stderr_task: Option<JoinHandle<()>>,

    /// Process wait task handle (waits for child to exit)
    wait_task: Option<JoinHandle<()>>,

    /// Process exit event handler
    exit_handler: Option<Arc<dyn ProcessExitHandler>>,
}

impl ChildProcessManager {
    /// Create a new child process manager
    pub fn new(
        command: String,
        args: Vec<String>,
        envs: Vec<(String, String)>,
        working_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            command,
            args,
            envs,
            working_directory: working_dir,
            state: Arc::new(Mutex::new(ProcessState::NotStarted)),
            stdio_transport: None,
            stderr_handler: None,
            stderr_task: None,
            wait_task: None,
            exit_handler: None,
        }
    }

    /// Get current process state (thread-safe)
    pub fn state(&self) -> ProcessState {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        self.state.lock().unwrap().clone()
    }

    /// Check if the process is currently running
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Install a handler for stderr lines
    ///
    /// The handler is called for each non-empty line the child writes to
    /// stderr. Only one handler can be active; installing a new one replaces
    /// the previous one. Stderr is always drained even without a handler so
    /// the child cannot block on a full pipe.
    pub fn on_stderr_line<F>(&mut self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.stderr_handler = Some(Box::new(handler));
    }

    /// Install a handler fired when the process exits on its own
    pub fn on_exit(&mut self, handler: Arc<dyn ProcessExitHandler>) {
        self.exit_handler = Some(handler);
    }

    /// Start the child process
    pub async fn start(&mut self) -> Result<(), ProcessError> {
        if self.is_running() {
            return Err(ProcessError::AlreadyStarted);
        }

        info!("Starting process: {} {:?}", self.command, self.args);

        let mut command_builder = Command::new(&self.command);
        command_builder
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for (key, value) in &self.envs {
            command_builder.env(key, value);
        }

        if let Some(working_dir) = &self.working_directory {
            command_builder.current_dir(working_dir);
        }

        let mut child = command_builder.spawn()?;

        let pid = child.id();
        info!("Process started with PID: {:?}", pid);

        if let Some(pid) = pid {
            // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
            *self.state.lock().unwrap() = ProcessState::Running { pid };
        } else {
            return Err(ProcessError::Io(std::io::Error::other(
                "Failed to get process ID",
            )));
        }

        // Extract stdio streams before the child moves into the wait task
        let stdin = child.stdin.take().ok_or(ProcessError::StdinNotAvailable)?;
        let stdout = child
            .stdout
            .take()
            .ok_or(ProcessError::StdoutNotAvailable)?;
        let stderr = child
            .stderr
            .take()
            .ok_or(ProcessError::StderrNotAvailable)?;

        self.stdio_transport = Some(StdioTransport::new(stdin, stdout));

        self.spawn_stderr_monitor(stderr);
        self.spawn_wait_task(child);

        Ok(())
    }

    /// Stop the child process
    ///
    /// Graceful mode closes the transport and sends SIGTERM; the wait task
    /// observes the actual exit. Force mode sends SIGKILL.
    pub async fn stop(&mut self, mode: StopMode) -> Result<(), ProcessError> {
        let pid = match self.state().pid() {
            Some(pid) => pid,
            None => return Err(ProcessError::NotStarted),
        };

        match mode {
            StopMode::Graceful => info!("Gracefully stopping process with PID: {}", pid),
            StopMode::Force => info!("Force killing process with PID: {}", pid),
        }

        // Close stdio transport first so the child sees EOF on stdin
        if let Some(mut transport) = self.stdio_transport.take() {
            use crate::io::transport::Transport;
            let _ = transport.close().await;
        }

        #[cfg(unix)]
        {
            unsafe {
                match mode {
                    StopMode::Graceful => {
                        if libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 {
                            info!("Sent SIGTERM to process {}", pid);
                        }
                    }
                    StopMode::Force => {
                        libc::kill(pid as libc::pid_t, libc::SIGKILL);
                        info!("Sent SIGKILL to process {}", pid);
                    }
                }
            }
        }
        #[cfg(not(unix))]
        {
            tracing::warn!("Non-unix process termination not fully implemented");
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        // Update state immediately for API consistency; the wait task also
        // updates it when it observes the actual exit
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = ProcessState::Stopped;

        Ok(())
    }

    /// Take the stdio transport created at start
    ///
    /// Consumes the transport; a second call fails.
    pub fn take_transport(&mut self) -> Result<StdioTransport, ProcessError> {
        self.stdio_transport.take().ok_or(ProcessError::NotStarted)
    }

    /// Synchronous force kill for Drop implementations
    ///
    /// Skips async transport cleanup and directly kills the process.
    pub fn kill_sync(&mut self) {
        let pid = match self.state().pid() {
            Some(pid) => pid,
            None => return, // Already stopped
        };

        info!("Synchronously force killing process with PID: {}", pid);

        #[cfg(unix)]
        {
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGKILL);
                info!("Sent SIGKILL to process {}", pid);
            }
        }

        #[cfg(not(unix))]
        {
            tracing::warn!("Non-unix sync process kill not implemented - process may remain");
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = ProcessState::Stopped;
    }

    /// Spawn the stderr monitoring task
    ///
    /// Always drains stderr to prevent the child from blocking. If a handler
    /// is installed, lines are forwarded to it.
    fn spawn_stderr_monitor(&mut self, stderr: tokio::process::ChildStderr) {
        if self.stderr_task.is_some() {
            return;
        }

        let handler = self.stderr_handler.take();

        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut line = String::new();

            trace!(
                "ChildProcessManager: Starting stderr monitoring (handler: {})",
                if handler.is_some() {
                    "installed"
                } else {
                    "draining only"
                }
            );

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        trace!("ChildProcessManager: stderr EOF reached");
                        break;
                    }
                    Ok(_) => {
                        let line_content = line.trim().to_string();
                        if !line_content.is_empty() {
                            if let Some(ref handler) = handler {
                                handler(line_content);
                            } else {
                                trace!("ChildProcessManager: stderr drained: {}", line_content);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Failed to read from stderr: {}", e);
                        break;
                    }
                }
            }

            trace!("ChildProcessManager: stderr monitoring finished");
        });

        self.stderr_task = Some(task);
    }

    /// Spawn the wait task that observes child process exit
    fn spawn_wait_task(&mut self, mut child: Child) {
        let current_pid = self.state().pid();
        let exit_handler = self.exit_handler.clone();
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            trace!(
                "ChildProcessManager: Starting wait task for PID {:?}",
                current_pid
            );

            let code = match child.wait().await {
                Ok(exit_status) => {
                    info!(
                        "Process PID {:?} exited with status: {}",
                        current_pid, exit_status
                    );
                    exit_status.code()
                }
                Err(e) => {
                    error!("Error waiting for child process: {}", e);
                    None
                }
            };

            if let Ok(mut process_state) = state.lock() {
                *process_state = ProcessState::Stopped;
            }

            if let Some(handler) = &exit_handler {
                handler.on_process_exit(ProcessExitEvent { code }).await;
            }

            trace!(
                "ChildProcessManager: Wait task finished for PID {:?}",
                current_pid
            );
        });

        self.wait_task = Some(task);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    fn manager_for(command: &str, args: &[&str]) -> ChildProcessManager {
        ChildProcessManager::new(
            command.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
            Vec::new(),
            None,
        )
    }

    #[tokio::test]
    async fn test_child_process_manager_lifecycle() {
        let mut manager = manager_for("echo", &["hello"]);

        assert!(!manager.is_running());

        manager.start().await.unwrap();
        assert!(manager.is_running());

        manager.stop(StopMode::Graceful).await.unwrap();
        assert!(!manager.is_running());
    }

    #[tokio::test]
    async fn test_stderr_monitoring() {
        let mut manager = manager_for("sh", &["-c", "echo 'error message' >&2; sleep 1"]);

        let stderr_lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let stderr_lines_clone = Arc::clone(&stderr_lines);

        manager.on_stderr_line(move |line| {
            if let Ok(mut lines) = stderr_lines_clone.lock() {
                lines.push(line);
            }
        });

        manager.start().await.unwrap();

        // Wait a bit for stderr to be captured
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        manager.stop(StopMode::Graceful).await.unwrap();

        let lines = stderr_lines.lock().unwrap();
        assert!(!lines.is_empty());
        assert_eq!(lines[0], "error message");
    }

    #[tokio::test]
    async fn test_environment_injection() {
        let mut manager = ChildProcessManager::new(
            "sh".to_string(),
            vec!["-c".to_string(), "echo \"$PROBE_VAR\" >&2; sleep 1".to_string()],
            vec![("PROBE_VAR".to_string(), "probe-value".to_string())],
            None,
        );

        let stderr_lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let stderr_lines_clone = Arc::clone(&stderr_lines);
        manager.on_stderr_line(move |line| {
            stderr_lines_clone.lock().unwrap().push(line);
        });

        manager.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        manager.stop(StopMode::Graceful).await.unwrap();

        let lines = stderr_lines.lock().unwrap();
        assert_eq!(lines.first().map(String::as_str), Some("probe-value"));
    }

    #[tokio::test]
    async fn test_process_state_transitions() {
        let mut manager = manager_for("echo", &["hello"]);

        assert_eq!(manager.state(), ProcessState::NotStarted);
        assert!(!manager.is_running());

        manager.start().await.unwrap();
        assert!(matches!(manager.state(), ProcessState::Running { .. }));

        manager.stop(StopMode::Graceful).await.unwrap();
        assert_eq!(manager.state(), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_invalid_operations() {
        let mut manager = manager_for("echo", &["hello"]);

        let result = manager.stop(StopMode::Graceful).await;
        assert!(matches!(result, Err(ProcessError::NotStarted)));

        manager.start().await.unwrap();

        let result = manager.start().await;
        assert!(matches!(result, Err(ProcessError::AlreadyStarted)));

        manager.stop(StopMode::Graceful).await.unwrap();

        let result = manager.stop(StopMode::Graceful).await;
        assert!(matches!(result, Err(ProcessError::NotStarted)));
    }

    #[tokio::test]
    async fn test_take_transport() {
        let mut manager = manager_for("echo", &["hello"]);

        let result = manager.take_transport();
        assert!(matches!(result, Err(ProcessError::NotStarted)));

        manager.start().await.unwrap();

        let _transport = manager.take_transport().unwrap();

        // Transport is consumed, so a second call fails
        let result = manager.take_transport();
        assert!(matches!(result, Err(ProcessError::NotStarted)));
    }

    struct ChannelExitHandler {
        sender: mpsc::UnboundedSender<ProcessExitEvent>,
    }

    #[async_trait]
    impl ProcessExitHandler for ChannelExitHandler {
        async fn on_process_exit(&self, event: ProcessExitEvent) {
            let _ = self.sender.send(event);
        }
    }

    #[tokio::test]
    async fn test_exit_handler_fires_on_natural_exit() {
        let mut manager = manager_for("sh", &["-c", "exit 3"]);

        let (sender, mut receiver) = mpsc::unbounded_channel();
        manager.on_exit(Arc::new(ChannelExitHandler { sender }));

        manager.start().await.unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), receiver.recv())
            .await
            .expect("exit event should arrive")
            .expect("channel should stay open");

        assert_eq!(event.code, Some(3));
        assert!(!manager.is_running());
    }

    #[test]
    fn test_process_state_methods() {
        let not_started = ProcessState::NotStarted;
        assert!(!not_started.is_running());
        assert!(not_started.pid().is_none());

        let running = ProcessState::Running { pid: 12345 };
        assert!(running.is_running());
        assert_eq!(running.pid(), Some(12345));

        let stopped = ProcessState::Stopped;
        assert!(!stopped.is_running());
        assert!(stopped.pid().is_none());
    }
}

//! Language-server integration
//!
//! Layered client-side plumbing for the `mica lsp` subprocess:
//!
//! - **Protocol**: JSON-RPC 2.0 over the framed transport
//! - **Client**: the minimal handshake surface (initialize/shutdown)
//! - **Session**: one process + client pair; construction is readiness
//! - **Lifecycle**: the state machine owning the single session

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod protocol;
pub mod session;

// Re-export main types for convenience
pub use client::{LspClient, LspError};
pub use error::{ConfigError, SessionError};
pub use lifecycle::{LifecycleController, LspState, SessionHandle, SessionLauncher};
pub use session::{LspSession, ProcessSessionLauncher, SessionConfig, SessionEvent};

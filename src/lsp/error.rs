//! Error types for language-server session management

use crate::io::process::ProcessError;
use crate::lsp::client::LspError;
use std::time::Duration;

// ============================================================================
// Session Errors
// ============================================================================

/// Error types for session startup and shutdown
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// LSP client errors (handshake, requests)
    #[error("LSP error: {0}")]
    Lsp(#[from] LspError),

    /// Process management errors (spawn, stop, stdio)
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Configuration validation errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Workspace root could not be expressed as a URI
    #[error("Invalid root URI: {uri}")]
    InvalidRootUri { uri: String },

    /// Session operation timeout
    #[error("Session operation timeout: {operation} took longer than {timeout:?}")]
    OperationTimeout {
        operation: String,
        timeout: Duration,
    },
}

impl SessionError {
    /// Create an operation timeout error
    pub fn operation_timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::OperationTimeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create an invalid root URI error
    pub fn invalid_root_uri(uri: impl Into<String>) -> Self {
        Self::InvalidRootUri { uri: uri.into() }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid toolchain binary path
    #[error("Invalid binary path: {path} - {reason}")]
    InvalidBinaryPath { path: String, reason: String },

    /// Invalid timeout value
    #[error("Invalid timeout: {timeout:?} - {reason}")]
    InvalidTimeout { timeout: Duration, reason: String },
}

impl ConfigError {
    /// Create an invalid binary path error
    pub fn invalid_binary_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBinaryPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid timeout error
    pub fn invalid_timeout(timeout: Duration, reason: impl Into<String>) -> Self {
        Self::InvalidTimeout {
            timeout,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

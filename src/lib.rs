//! Editor integration host for the Mica language tooling
//!
//! This crate is the editor-side controller for `mica`'s language server:
//! it owns the lifecycle of the single `mica lsp` subprocess and relays
//! its protocol traffic to the host editor.
//!
//! # Architecture
//!
//! - [`io`]: child process management and the `Content-Length`-framed
//!   stdio transport
//! - [`lsp`]: JSON-RPC plumbing, the minimal handshake client, the
//!   session, and the [`LifecycleController`] state machine
//! - [`config`]: the editor settings snapshot
//! - [`watcher`]: configuration-change handling
//! - [`commands`]: the user-invokable command surface
//! - [`status`]: the status-item presenter
//! - [`diagnostics`]: the source-tag relay
//! - [`editor`]: the trait boundary to the host editor
//!
//! The controller is the only owner of a live session; configuration
//! toggles and user commands both funnel through it, and its `&mut self`
//! operations serialize every transition.

pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod editor;
pub mod io;
pub mod logging;
pub mod lsp;
pub mod status;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the types a host needs for wiring
pub use commands::{Command, CommandDispatcher};
pub use config::{LANGUAGE_ID, Settings};
pub use editor::{DocumentInfo, EditorOps, StatusIndicator};
pub use lsp::{LifecycleController, LspState, SessionEvent};
pub use status::StatusPresenter;
pub use watcher::ConfigWatcher;

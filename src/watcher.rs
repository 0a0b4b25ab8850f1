//! Configuration watcher
//!
//! One dedicated handler for the editor's configuration-change events.
//! Only the `lspEnabled` key drives a lifecycle transition; every other
//! key just replaces the stored snapshot and takes effect at the next
//! explicit start or restart.

use tracing::debug;

use crate::config::Settings;
use crate::lsp::lifecycle::LifecycleController;

/// Diffs settings snapshots and drives the lifecycle controller
pub struct ConfigWatcher {
    /// `lspEnabled` value from the previous snapshot
    lsp_enabled: bool,
}

impl ConfigWatcher {
    pub fn new(initial: &Settings) -> Self {
        Self {
            lsp_enabled: initial.lsp_enabled,
        }
    }

    /// Handle one configuration-change notification
    ///
    /// When `lspEnabled` flips on and no session is active, the server is
    /// started; when it flips off with an active session, the session is
    /// fully stopped before this returns.
    pub async fn on_config_changed(
        &mut self,
        settings: Settings,
        lifecycle: &mut LifecycleController,
    ) {
        let was_enabled = self.lsp_enabled;
        let now_enabled = settings.lsp_enabled;
        self.lsp_enabled = now_enabled;

        // Later starts read the new snapshot lazily
        lifecycle.update_settings(settings);

        if now_enabled == was_enabled {
            debug!("Configuration change without lspEnabled transition");
            return;
        }

        if now_enabled {
            if !lifecycle.state().is_active() {
                lifecycle.start().await;
            }
        } else if lifecycle.state().is_active() {
            lifecycle.stop().await;
        }
    }
}

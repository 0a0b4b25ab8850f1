//! Editor configuration snapshot
//!
//! `Settings` mirrors the `mica` section of the editor's settings store.
//! Snapshots are immutable; components read the fields they need at each
//! decision point instead of subscribing to individual keys.

use serde::Deserialize;

/// Language identifier of documents this extension manages
pub const LANGUAGE_ID: &str = "mica";

/// Settings section all keys live under
pub const CONFIG_SECTION: &str = "mica";

/// Default command name for the toolchain binary, resolved via the OS
/// search path when no explicit path is configured
pub const DEFAULT_BINARY: &str = "mica";

/// Snapshot of the editor settings relevant to this extension
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Path to the toolchain binary (`mica.binaryPath`)
    pub binary_path: String,

    /// Whether the language server should run (`mica.lspEnabled`)
    pub lsp_enabled: bool,

    /// Verbose protocol tracing (`mica.lspTrace`)
    pub lsp_trace: bool,

    /// Format documents on save (`mica.formatOnSave`)
    pub format_on_save: bool,

    /// Run `mica check` on save (`mica.checkOnSave`)
    pub check_on_save: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            binary_path: DEFAULT_BINARY.to_string(),
            lsp_enabled: true,
            lsp_trace: false,
            format_on_save: true,
            check_on_save: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.binary_path, "mica");
        assert!(settings.lsp_enabled);
        assert!(!settings.lsp_trace);
        assert!(settings.format_on_save);
        assert!(settings.check_on_save);
    }

    #[test]
    fn test_deserialize_partial_snapshot() {
        let settings: Settings =
            serde_json::from_str(r#"{"binaryPath":"/opt/mica/bin/mica","lspTrace":true}"#).unwrap();

        assert_eq!(settings.binary_path, "/opt/mica/bin/mica");
        assert!(settings.lsp_trace);
        // Untouched keys keep their defaults
        assert!(settings.lsp_enabled);
        assert!(settings.format_on_save);
    }

    #[test]
    fn test_deserialize_full_snapshot() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "binaryPath": "mica-nightly",
                "lspEnabled": false,
                "lspTrace": true,
                "formatOnSave": false,
                "checkOnSave": false
            }"#,
        )
        .unwrap();

        assert_eq!(settings.binary_path, "mica-nightly");
        assert!(!settings.lsp_enabled);
        assert!(settings.lsp_trace);
        assert!(!settings.format_on_save);
        assert!(!settings.check_on_save);
    }
}

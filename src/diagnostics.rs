//! Diagnostics relay
//!
//! Sits between the session's `publishDiagnostics` notifications and the
//! editor's display layer. The editor groups diagnostics by their source
//! tag, so every forwarded entry must carry a non-empty one; the server
//! does not always bother. The relay fills in the default tag and changes
//! nothing else: same length, same order, all other fields untouched.

use lsp_types::Diagnostic;

/// Source tag assigned to diagnostics the server left untagged
pub const DEFAULT_SOURCE: &str = "mica";

/// Tag untagged diagnostics in a batch
///
/// An empty-string source counts as untagged. Order-preserving; never
/// drops, reorders, or deduplicates entries.
pub fn relay(diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    diagnostics
        .into_iter()
        .map(|mut diagnostic| {
            let untagged = diagnostic
                .source
                .as_deref()
                .is_none_or(|source| source.is_empty());
            if untagged {
                diagnostic.source = Some(DEFAULT_SOURCE.to_string());
            }
            diagnostic
        })
        .collect()
}

//! Status presenter
//!
//! Pure mapping from (lifecycle state, active-document language) to the
//! status indicator. Two independent event sources feed this view (session
//! state transitions and editor focus changes), so the presenter always
//! recomputes from current values; nothing is patched incrementally.

use std::sync::Arc;

use crate::config::LANGUAGE_ID;
use crate::editor::{EditorOps, StatusIndicator};
use crate::lsp::lifecycle::LspState;

/// Compute the indicator for a state/language pair
///
/// Hidden (`None`) unless the active document is a Mica file. Pure: the
/// same inputs always produce the same indicator, regardless of history.
pub fn render(state: LspState, language: Option<&str>) -> Option<StatusIndicator> {
    if language != Some(LANGUAGE_ID) {
        return None;
    }

    let (text, tooltip) = match state {
        LspState::Starting => ("Mica: starting...", "The Mica language server is starting"),
        LspState::Running => ("Mica: ready", "The Mica language server is running"),
        LspState::Error => (
            "Mica: error",
            "The Mica language server failed; check the output log or restart it",
        ),
        LspState::Stopped => ("Mica: off", "The Mica language server is not running"),
    };

    Some(StatusIndicator {
        text: text.to_string(),
        tooltip: tooltip.to_string(),
    })
}

/// Pushes freshly derived indicators to the editor's status item
pub struct StatusPresenter {
    editor: Arc<dyn EditorOps>,
}

impl StatusPresenter {
    pub fn new(editor: Arc<dyn EditorOps>) -> Self {
        Self { editor }
    }

    /// Re-derive and display the indicator from current values
    ///
    /// The session-state handler and the focus-change handler both call
    /// this same entry point.
    pub async fn refresh(&self, state: LspState) {
        let language = self
            .editor
            .active_document()
            .map(|document| document.language_id);
        self.editor.set_status(render(state, language.as_deref())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::DocumentInfo;
    use crate::testing::MockEditor;

    #[test]
    fn test_hidden_without_mica_document() {
        assert!(render(LspState::Running, None).is_none());
        assert!(render(LspState::Running, Some("rust")).is_none());
        assert!(render(LspState::Error, Some("plaintext")).is_none());
    }

    #[test]
    fn test_each_state_renders_distinctly() {
        let states = [
            LspState::Stopped,
            LspState::Starting,
            LspState::Running,
            LspState::Error,
        ];

        let texts: Vec<String> = states
            .iter()
            .map(|state| render(*state, Some("mica")).unwrap().text)
            .collect();

        for (i, a) in texts.iter().enumerate() {
            for b in texts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_render_is_pure() {
        for state in [
            LspState::Stopped,
            LspState::Starting,
            LspState::Running,
            LspState::Error,
        ] {
            let first = render(state, Some("mica"));
            let second = render(state, Some("mica"));
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_refresh_pushes_indicator_for_mica_document() {
        let editor = MockEditor::new();
        editor.set_active_document(Some(DocumentInfo::new("/work/main.mica", "mica")));
        let presenter = StatusPresenter::new(editor.clone() as Arc<dyn EditorOps>);

        presenter.refresh(LspState::Running).await;

        let statuses = editor.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].as_ref().unwrap().text, "Mica: ready");
    }

    #[tokio::test]
    async fn test_refresh_hides_indicator_after_focus_change() {
        let editor = MockEditor::new();
        editor.set_active_document(Some(DocumentInfo::new("/work/main.mica", "mica")));
        let presenter = StatusPresenter::new(editor.clone() as Arc<dyn EditorOps>);

        presenter.refresh(LspState::Running).await;

        // Focus moves to a non-Mica document; same state, recomputed view
        editor.set_active_document(Some(DocumentInfo::new("/work/notes.md", "markdown")));
        presenter.refresh(LspState::Running).await;

        let statuses = editor.statuses();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].is_some());
        assert!(statuses[1].is_none());
    }
}

//! Messages exchanged with the preview view.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::view_diff::TextPatch;

/// Outbound events dispatched to the preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ViewEvent {
    /// Scroll the preview so `view_line` is in view. `source_name` is set
    /// when the editor shows a file other than the document.
    ScrollToLine {
        text_line: u32,
        view_line: u32,
        view_start_line: u32,
        view_end_line: u32,
        line_count: u32,
        source_name: Option<SmolStr>,
    },
    /// New rendered content. `old_text`/`new_text` are set when the view can
    /// patch a single text node instead of reloading.
    LoadContent {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old_text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_text: Option<String>,
        line_count: u32,
    },
    /// Switch the preview presentation (`normal`, `full`).
    View { view: SmolStr },
    /// Discard the preview and start over.
    Reload,
    /// Ask the view to report its scroll position back.
    ViewSync,
}

impl ViewEvent {
    pub fn load_content(content: impl Into<String>, patch: Option<&TextPatch>, line_count: u32) -> Self {
        Self::LoadContent {
            content: content.into(),
            old_text: patch.map(|p| p.old_text.clone()),
            new_text: patch.map(|p| p.new_text.clone()),
            line_count,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ScrollToLine { .. } => "scrollToLine",
            Self::LoadContent { .. } => "loadContent",
            Self::View { .. } => "view",
            Self::Reload => "reload",
            Self::ViewSync => "viewSync",
        }
    }
}

/// Inbound events from the preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PreviewEvent {
    /// The preview finished loading content and wants a scroll position.
    PreviewContentLoaded,
    /// The user clicked in the preview; reveal the source line.
    PreviewSyncEditor {
        line: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<SmolStr>,
    },
}

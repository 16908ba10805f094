//! Narrow interfaces to the host: editor widget, preview view, status area.

use std::fmt;

use tokio::sync::mpsc::UnboundedSender;
use weaver_preview_core::{Decoration, Position, ViewEvent};

/// The text editor widget.
pub trait EditorAdapter: Send + Sync + 'static {
    fn text(&self) -> String;

    fn set_text(&self, text: &str);

    fn position(&self) -> Position;

    /// Move the caret without scrolling.
    fn set_position(&self, position: Position);

    fn line_count(&self) -> u32;

    /// First and last visible line, 1-based inclusive.
    fn visible_lines(&self) -> (u32, u32);

    /// Replace the decorations shown for the active file.
    fn show_decorations(&self, decorations: &[Decoration]);
}

/// Receives events for the preview view.
pub trait ViewSink: Send + Sync + 'static {
    fn dispatch(&self, event: ViewEvent);
}

impl ViewSink for UnboundedSender<ViewEvent> {
    fn dispatch(&self, event: ViewEvent) {
        if self.send(event).is_err() {
            tracing::trace!("view receiver dropped");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Transient status line text.
    Status,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn status(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Status,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// What a busy indicator is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    View,
    Server,
    Sync,
    Export,
}

/// Status messages and busy indicators.
pub trait NoticeSink: Send + Sync + 'static {
    fn notify(&self, notice: Notice);

    fn busy(&self, _activity: Activity, _visible: bool) {}
}

impl NoticeSink for UnboundedSender<Notice> {
    fn notify(&self, notice: Notice) {
        if self.send(notice).is_err() {
            tracing::trace!("notice receiver dropped");
        }
    }
}

/// Logs notices instead of showing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotices;

impl NoticeSink for TracingNotices {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Error => tracing::error!("{notice}"),
            NoticeLevel::Warning => tracing::warn!("{notice}"),
            NoticeLevel::Info | NoticeLevel::Status => tracing::info!("{notice}"),
        }
    }

    fn busy(&self, activity: Activity, visible: bool) {
        tracing::debug!(?activity, visible, "busy");
    }
}

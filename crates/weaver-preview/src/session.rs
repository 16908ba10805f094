//! Per-document session context.
//!
//! A [`Session`] owns everything one open document needs: the coarse state
//! gate, the document and active edit file, the edit tracker, decorations,
//! label caches and the host adapters. The recompute pipeline and the sync
//! coordinator both borrow it through an `Arc`.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use smol_str::{SmolStr, format_smolstr};
use tokio::time::Instant;
use weaver_preview_core::{
    Citation, CitationIndex, Decoration, DecorationTracker, Document, Label, LineDiffer,
    MergeResult, Position, PreviewEvent, SessionSnapshot, SessionState, SourceMessage, ViewEvent,
    ViewUpdate, diff_view, is_bib_file, line_count, merge3, parse_labels,
};

use crate::adapter::{Activity, EditorAdapter, Notice, NoticeSink, ViewSink};
use crate::busy::BusyIndicator;
use crate::config::PreviewConfig;
use crate::error::PreviewError;
use crate::render::Renderer;
use crate::runner::panic_message;
use crate::snapshot::SnapshotStore;
use crate::storage::{RemoteStorage, WriteOptions};

/// Host-side collaborators of a session.
#[derive(Clone)]
pub struct Adapters {
    pub editor: Arc<dyn EditorAdapter>,
    pub view: Arc<dyn ViewSink>,
    pub notices: Arc<dyn NoticeSink>,
}

pub struct Session<S> {
    storage: Arc<S>,
    config: PreviewConfig,
    editor: Arc<dyn EditorAdapter>,
    view: Arc<dyn ViewSink>,
    notices: Arc<dyn NoticeSink>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    export_busy: BusyIndicator,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    state: SessionState,
    doc: Document,
    edit_name: SmolStr,
    /// Last known caret per tracked file.
    positions: BTreeMap<SmolStr, Position>,
    /// Edited since the pipeline last looked.
    changed: bool,
    last_edit: Option<Instant>,
    /// The document needs a local render.
    stale: bool,
    decorations: DecorationTracker,
    labels: Vec<Label>,
    links: Option<String>,
    citations: CitationIndex,
    last_view_line: Option<u32>,
    last_sync: Option<Instant>,
}

impl<S: RemoteStorage> Session<S> {
    pub fn new(storage: Arc<S>, config: PreviewConfig, adapters: Adapters) -> Self {
        let notices = Arc::clone(&adapters.notices);
        let export_busy = BusyIndicator::new(config.export_busy_delay(), move |visible| {
            notices.busy(Activity::Export, visible)
        });
        Self {
            storage,
            editor: adapters.editor,
            view: adapters.view,
            notices: adapters.notices,
            snapshots: None,
            export_busy,
            inner: Mutex::new(SessionInner {
                state: SessionState::Init,
                doc: Document::default(),
                edit_name: SmolStr::default(),
                positions: BTreeMap::new(),
                changed: false,
                last_edit: None,
                stale: true,
                decorations: DecorationTracker::new(config.merge_expiry()),
                labels: Vec::new(),
                links: None,
                citations: CitationIndex::default(),
                last_view_line: None,
                last_sync: None,
            }),
            config,
        }
    }

    pub fn with_snapshots(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub(crate) fn notices(&self) -> Arc<dyn NoticeSink> {
        Arc::clone(&self.notices)
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn doc_name(&self) -> SmolStr {
        self.lock().doc.name.clone()
    }

    pub fn document(&self) -> Document {
        self.lock().doc.clone()
    }

    pub fn edit_name(&self) -> SmolStr {
        self.lock().edit_name.clone()
    }

    pub fn position_of(&self, path: &str) -> Option<Position> {
        self.lock().positions.get(path).copied()
    }

    pub fn editor_position(&self) -> Position {
        self.editor.position()
    }

    pub fn notify(&self, notice: Notice) {
        self.notices.notify(notice);
    }

    // State gate

    /// Run `action` in state `target`.
    ///
    /// The action may only start from `Normal` or one of `ok_states`;
    /// otherwise a status notice is emitted and [`PreviewError::Busy`] is
    /// returned with the state untouched. Whatever the action does (return,
    /// fail, panic, or get dropped), the state goes back to `Normal`
    /// afterwards. Failures are surfaced as error notices.
    pub async fn run_gated<T>(
        &self,
        target: SessionState,
        ok_states: &[SessionState],
        action: impl Future<Output = Result<T, PreviewError>>,
    ) -> Result<T, PreviewError> {
        self.try_enter(target, ok_states)?;
        let _reset = StateReset { inner: &self.inner };

        let result = AssertUnwindSafe(action)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(PreviewError::Panicked {
                    message: panic_message(panic.as_ref()),
                })
            });
        if let Err(e) = &result {
            self.report_error(e);
        }
        result
    }

    fn try_enter(&self, target: SessionState, ok_states: &[SessionState]) -> Result<(), PreviewError> {
        let mut inner = self.lock();
        if !inner.state.admits(ok_states) {
            let state = inner.state;
            drop(inner);
            let err = PreviewError::Busy { state };
            tracing::debug!(?target, %state, "gated action rejected");
            metrics::counter!("preview_gate_rejected_total").increment(1);
            self.notices.notify(Notice::status(err.to_string()));
            return Err(err);
        }
        inner.state = target;
        Ok(())
    }

    /// Surface an error to the user.
    pub fn report_error(&self, err: &PreviewError) {
        tracing::warn!(error = %err, "preview error");
        self.notices.notify(Notice::error(err.to_string()));
    }

    // Edit tracking

    /// Record an editor change.
    pub fn note_edit(&self) {
        let mut inner = self.lock();
        inner.changed = true;
        inner.last_edit = Some(Instant::now());
    }

    pub fn last_edit(&self) -> Option<Instant> {
        self.lock().last_edit
    }

    pub fn set_stale(&self) {
        self.lock().stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.lock().stale
    }

    /// Fold pending edits into the stale flag and return it.
    pub(crate) fn absorb_edits(&self) -> bool {
        let mut inner = self.lock();
        if std::mem::take(&mut inner.changed) {
            inner.stale = true;
        }
        inner.stale
    }

    pub(crate) fn last_sync(&self) -> Option<Instant> {
        self.lock().last_sync
    }

    pub(crate) fn mark_synced(&self, at: Instant) {
        self.lock().last_sync = Some(at);
    }

    /// Copy editor content into the document when the document is the file
    /// being edited, clear the pending edit flags, and return the text to
    /// render.
    pub(crate) fn take_render_input(&self) -> (SmolStr, String) {
        let text = self.editor.text();
        let position = self.editor.position();
        let mut inner = self.lock();
        let edit_name = inner.edit_name.clone();
        inner.positions.insert(edit_name.clone(), position);
        if edit_name == inner.doc.name {
            inner.doc.text = text;
        }
        inner.stale = false;
        inner.changed = false;
        (inner.doc.name.clone(), inner.doc.text.clone())
    }

    /// Write the editor content of the active file back to storage.
    pub async fn flush_to_storage(&self) -> Result<(), PreviewError> {
        self.flush_editor().await.map(drop)
    }

    /// Like [`Session::flush_to_storage`], returning the text that was
    /// flushed.
    pub(crate) async fn flush_editor(&self) -> Result<String, PreviewError> {
        let text = self.editor.text();
        let position = self.editor.position();
        let edit_name = {
            let mut inner = self.lock();
            let edit_name = inner.edit_name.clone();
            if edit_name.is_empty() {
                return Ok(text);
            }
            inner.positions.insert(edit_name.clone(), position);
            if edit_name == inner.doc.name {
                inner.doc.text = text.clone();
            }
            edit_name
        };
        if self.storage.capabilities().readonly {
            return Ok(text);
        }
        self.storage
            .write_file(
                &edit_name,
                &text,
                WriteOptions {
                    position: Some(position),
                },
            )
            .await?;
        Ok(text)
    }

    // Preview view

    /// Show new rendered content, patching in place when possible.
    /// Returns true when no full reload was needed.
    pub fn view_html(&self, html: String) -> bool {
        let (update, lines) = {
            let mut inner = self.lock();
            let update = diff_view(inner.doc.html0.as_deref().unwrap_or(""), &html);
            inner.doc.html0 = Some(html.clone());
            (update, line_count(&inner.doc.text) as u32)
        };
        match update {
            ViewUpdate::Unchanged => true,
            ViewUpdate::Patch(patch) => {
                self.view.dispatch(ViewEvent::load_content(html, Some(&patch), lines));
                true
            }
            ViewUpdate::Replace => {
                self.view.dispatch(ViewEvent::load_content(html, None, lines));
                false
            }
        }
    }

    /// Scroll the preview to match the editor. Skipped while a document is
    /// loading, and when the target line is unchanged unless `force`.
    pub fn sync_view(&self, force: bool) -> bool {
        if matches!(self.state(), SessionState::Init | SessionState::Loading) {
            return false;
        }
        let (start, end) = self.editor.visible_lines();
        let line_count = self.editor.line_count();
        let line = if start <= 1 {
            1
        } else if end >= line_count {
            end
        } else {
            // Middle of the visible range.
            start + (end.saturating_sub(start) + 2) / 2
        };

        let source_name = {
            let mut inner = self.lock();
            if !force && inner.last_view_line == Some(line) {
                return false;
            }
            inner.last_view_line = Some(line);
            (inner.edit_name != inner.doc.name).then(|| inner.edit_name.clone())
        };
        self.view.dispatch(ViewEvent::ScrollToLine {
            text_line: line,
            view_line: line,
            view_start_line: start,
            view_end_line: end,
            line_count,
            source_name,
        });
        true
    }

    /// Ask the preview to report its scroll position. Ignored unless the
    /// session is idle.
    pub fn request_view_sync(&self) -> bool {
        if !self.state().is_idle() {
            return false;
        }
        self.view.dispatch(ViewEvent::ViewSync);
        true
    }

    pub fn set_view_mode(&self, view: impl Into<SmolStr>) {
        self.view.dispatch(ViewEvent::View { view: view.into() });
    }

    /// React to a message from the preview.
    pub async fn handle_preview_event(&self, event: PreviewEvent) -> Result<(), PreviewError> {
        match event {
            PreviewEvent::PreviewContentLoaded => {
                self.sync_view(true);
                Ok(())
            }
            PreviewEvent::PreviewSyncEditor { line, path } => {
                let path = path.unwrap_or_else(|| self.doc_name());
                self.edit_file(&path, Some(Position::new(line.max(1), 1))).await
            }
        }
    }

    // Labels and citations

    /// Refresh the label cache from renderer output; `None` clears it.
    pub fn update_labels(&self, labels: Option<&str>, links: Option<String>) {
        let parsed = labels.map(parse_labels).unwrap_or_default();
        let mut inner = self.lock();
        inner.labels = parsed;
        inner.links = links;
    }

    pub fn labels(&self) -> Vec<Label> {
        self.lock().labels.clone()
    }

    pub fn links(&self) -> Option<String> {
        self.lock().links.clone()
    }

    pub fn citations(&self) -> Vec<Citation> {
        self.lock().citations.all().into_iter().cloned().collect()
    }

    // Decorations

    fn with_decorations<T>(&self, f: impl FnOnce(&mut DecorationTracker) -> T) -> T {
        let (result, visible) = {
            let mut inner = self.lock();
            let result = f(&mut inner.decorations);
            let visible: Vec<Decoration> = inner.decorations.visible().into_iter().cloned().collect();
            (result, visible)
        };
        self.editor.show_decorations(&visible);
        result
    }

    pub fn show_errors(&self, errors: &[SourceMessage], kind: &str) {
        let now = web_time::Instant::now();
        self.with_decorations(|d| d.show_errors(errors, false, kind, now));
    }

    pub fn show_merges(&self, merges: &[MergeResult]) {
        let now = web_time::Instant::now();
        self.with_decorations(|d| d.show_merges(merges, now));
    }

    pub fn remove_decorations(&self, discard_sticky: bool, kind_prefix: Option<&str>) -> usize {
        let now = web_time::Instant::now();
        self.with_decorations(|d| d.remove(discard_sticky, kind_prefix, now))
    }

    /// Decorations shown for the active file.
    pub fn visible_decorations(&self) -> Vec<Decoration> {
        self.lock().decorations.visible().into_iter().cloned().collect()
    }

    /// Hover message for `line` of the active file.
    pub fn decoration_message(&self, line: u32) -> Option<String> {
        let inner = self.lock();
        inner
            .decorations
            .message_at(&inner.edit_name, line)
            .map(str::to_string)
    }

    // Files

    /// Open `path` in the editor, optionally at `position`. The current file
    /// is flushed to storage first.
    pub async fn edit_file(&self, path: &str, position: Option<Position>) -> Result<(), PreviewError> {
        if self.edit_name() == path {
            if let Some(position) = position {
                self.editor.set_position(position);
            }
            return Ok(());
        }
        self.flush_to_storage().await?;
        let file = self.storage.read_file(path, true).await?;

        let (position, visible) = {
            let mut inner = self.lock();
            inner.edit_name = path.into();
            if path == inner.doc.name {
                inner.doc.text = file.content.clone();
            }
            if is_bib_file(path) {
                inner.citations.update(path, &file.content);
            }
            let position = position
                .or_else(|| inner.positions.get(path).copied())
                .unwrap_or_default();
            inner.positions.insert(path.into(), position);
            inner.decorations.set_active_file(path);
            let visible: Vec<Decoration> = inner.decorations.visible().into_iter().cloned().collect();
            (position, visible)
        };
        if self.editor.text() != file.content {
            self.editor.set_text(&file.content);
        }
        self.editor.set_position(position);
        self.editor.show_decorations(&visible);
        tracing::debug!(path, line = position.line, "editing file");
        Ok(())
    }

    /// Make `path` the active file at its remembered caret.
    pub async fn switch_file(&self, path: &str) -> Result<(), PreviewError> {
        self.edit_file(path, None).await
    }

    /// Open `name` as the previewed document.
    pub async fn open_document(&self, name: &str) -> Result<(), PreviewError> {
        self.run_gated(SessionState::Loading, &[SessionState::Init], async {
            self.notices.notify(Notice::status("loading..."));
            let file = self.storage.read_file(name, false).await?;
            let visible = {
                let mut inner = self.lock();
                inner.doc = Document::new(name, file.content.clone());
                inner.edit_name = name.into();
                inner.positions.insert(name.into(), Position::default());
                inner.labels.clear();
                inner.links = None;
                inner.last_view_line = None;
                inner.stale = true;
                inner.decorations.set_active_file(name);
                inner.decorations.visible().into_iter().cloned().collect::<Vec<_>>()
            };
            self.editor.set_text(&file.content);
            self.editor.set_position(Position::default());
            self.editor.show_decorations(&visible);
            self.view.dispatch(ViewEvent::Reload);
            self.notices.notify(Notice::status(format!("loaded: {name}")));
            Ok(())
        })
        .await
    }

    /// Re-read files changed by a merge. Returns true if the document text
    /// changed, in which case the document is marked stale.
    ///
    /// `flushed` is the editor text written to storage before the sync. If
    /// the editor moved on since then, the new typing is merged on top of
    /// the merged file instead of being overwritten.
    pub(crate) async fn reload_merged(
        &self,
        merged: &[SmolStr],
        flushed: &str,
        differ: &dyn LineDiffer,
    ) -> Result<bool, PreviewError> {
        let (doc_name, edit_name) = {
            let inner = self.lock();
            (inner.doc.name.clone(), inner.edit_name.clone())
        };
        let mut doc_changed = false;
        for path in merged {
            let mut content = self.storage.read_file(path, true).await?.content;
            if *path == edit_name {
                let current = self.editor.text();
                if current != flushed {
                    let outcome = merge3(differ, flushed, &current, &content);
                    tracing::debug!(%path, conflicts = outcome.conflicts.len(), "merged edits made during sync");
                    content = outcome.text;
                    self.storage
                        .write_file(
                            path,
                            &content,
                            WriteOptions {
                                position: Some(self.editor.position()),
                            },
                        )
                        .await?;
                }
                if current != content {
                    self.editor.set_text(&content);
                }
            }
            let mut inner = self.lock();
            if *path == doc_name && inner.doc.text != content {
                inner.doc.text = content.clone();
                inner.stale = true;
                doc_changed = true;
            }
            if is_bib_file(path) {
                inner.citations.update(path.clone(), &content);
            }
        }
        Ok(doc_changed)
    }

    /// Remember caret lines reported back by a sync for files not in the editor.
    pub(crate) fn record_lines(&self, lines: impl IntoIterator<Item = (SmolStr, u32)>) {
        let mut inner = self.lock();
        let edit_name = inner.edit_name.clone();
        for (path, line) in lines {
            if path == edit_name {
                continue;
            }
            let position = inner.positions.entry(path).or_default();
            position.line = line;
        }
    }

    pub(crate) fn set_editor_position(&self, position: Position) {
        {
            let mut inner = self.lock();
            let edit_name = inner.edit_name.clone();
            inner.positions.insert(edit_name, position);
        }
        self.editor.set_position(position);
    }

    /// Render the document standalone and write it to `out/<stem>.html`.
    pub async fn export_html<R: Renderer>(&self, renderer: &R) -> Result<SmolStr, PreviewError> {
        self.run_gated(SessionState::Exporting, &[], async {
            let _busy = self.export_busy.enter();
            self.flush_to_storage().await?;
            let doc = self.document();
            let html = renderer.render_local_static(&doc.name, &doc.text).await?;
            let path = format_smolstr!("out/{}.html", doc.stem());
            self.storage
                .write_file(&path, &html, WriteOptions::default())
                .await?;
            self.notices.notify(Notice::status(format!("exported: {path}")));
            Ok(path)
        })
        .await
    }

    // Snapshots

    /// Encode the session snapshot. Storage state is included up to the
    /// configured limit; `minimal` persists metadata only.
    pub fn snapshot(&self, minimal: bool) -> Result<String, PreviewError> {
        let limit = self.config.snapshot_limit;
        let position = self.editor.position();
        let (doc_name, edit_name) = {
            let inner = self.lock();
            (inner.doc.name.clone(), inner.edit_name.clone())
        };
        let base = SessionSnapshot {
            doc_name,
            edit_name,
            position,
            storage: serde_json::Value::Null,
        };
        let full = SessionSnapshot {
            storage: self.storage.persist(if minimal { 0 } else { limit }),
            ..base.clone()
        };
        let encoded = full.encode_capped(limit, || SessionSnapshot {
            storage: self.storage.persist(0),
            ..base
        })?;
        Ok(encoded)
    }

    /// Flush the editor and persist the session snapshot. Returns false
    /// when no snapshot store is configured.
    pub async fn local_save(&self, minimal: bool) -> Result<bool, PreviewError> {
        self.flush_to_storage().await?;
        self.save_snapshot(minimal).await
    }

    /// Persist the session snapshot without flushing the editor.
    pub(crate) async fn save_snapshot(&self, minimal: bool) -> Result<bool, PreviewError> {
        let Some(store) = &self.snapshots else {
            return Ok(false);
        };
        let data = self.snapshot(minimal)?;
        store.save(data).await?;
        Ok(true)
    }

    /// Reopen the document and caret recorded in the last saved snapshot.
    pub async fn resume(&self) -> Result<Option<SessionSnapshot>, PreviewError> {
        let Some(store) = &self.snapshots else {
            return Ok(None);
        };
        let Some(data) = store.load().await? else {
            return Ok(None);
        };
        let snapshot = SessionSnapshot::decode(&data)?;
        self.open_document(&snapshot.doc_name).await?;
        self.edit_file(&snapshot.edit_name, Some(snapshot.position)).await?;
        Ok(Some(snapshot))
    }
}

/// Returns the session to `Normal` when a gated action ends.
struct StateReset<'a> {
    inner: &'a Mutex<SessionInner>,
}

impl Drop for StateReset<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.state = SessionState::Normal;
    }
}

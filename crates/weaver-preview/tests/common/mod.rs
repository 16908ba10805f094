#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;

use weaver_preview::{
    Activity, Adapters, EditorAdapter, MemoryStore, Notice, NoticeLevel, NoticeSink,
    PreviewConfig, RemoteCapabilities, RenderContext, RenderError, RenderOutput, Renderer,
    ServerOutput, Session, SnapshotStore, StorageError, ViewSink,
};
use weaver_preview_core::{Decoration, Position, SourceMessage, ViewEvent};

pub const DOC: &str = "doc.mdk";

#[derive(Default)]
struct EditorState {
    text: String,
    position: Position,
    visible: (u32, u32),
    decorations: Vec<Decoration>,
}

#[derive(Default)]
pub struct MockEditor {
    state: Mutex<EditorState>,
}

impl MockEditor {
    /// Simulate the user typing: replace the text without going through the session.
    pub fn type_text(&self, text: &str) {
        self.state.lock().unwrap().text = text.to_string();
    }

    pub fn move_to(&self, line: u32) {
        self.state.lock().unwrap().position = Position::new(line, 1);
    }

    pub fn scroll_to(&self, start: u32, end: u32) {
        self.state.lock().unwrap().visible = (start, end);
    }

    pub fn decorations(&self) -> Vec<Decoration> {
        self.state.lock().unwrap().decorations.clone()
    }
}

impl EditorAdapter for MockEditor {
    fn text(&self) -> String {
        self.state.lock().unwrap().text.clone()
    }

    fn set_text(&self, text: &str) {
        self.state.lock().unwrap().text = text.to_string();
    }

    fn position(&self) -> Position {
        self.state.lock().unwrap().position
    }

    fn set_position(&self, position: Position) {
        self.state.lock().unwrap().position = position;
    }

    fn line_count(&self) -> u32 {
        self.state.lock().unwrap().text.split('\n').count() as u32
    }

    fn visible_lines(&self) -> (u32, u32) {
        self.state.lock().unwrap().visible
    }

    fn show_decorations(&self, decorations: &[Decoration]) {
        self.state.lock().unwrap().decorations = decorations.to_vec();
    }
}

#[derive(Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
}

impl RecordingView {
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `(old_text, new_text)` of every content load, in order.
    pub fn loads(&self) -> Vec<(Option<String>, Option<String>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ViewEvent::LoadContent {
                    old_text, new_text, ..
                } => Some((old_text, new_text)),
                _ => None,
            })
            .collect()
    }
}

impl ViewSink for RecordingView {
    fn dispatch(&self, event: ViewEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct RecordingNotices {
    notices: Mutex<Vec<Notice>>,
    busy: Mutex<Vec<(Activity, bool)>>,
}

impl RecordingNotices {
    pub fn all(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    pub fn at(&self, level: NoticeLevel) -> Vec<String> {
        self.all()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.message)
            .collect()
    }

    pub fn busy_events(&self) -> Vec<(Activity, bool)> {
        self.busy.lock().unwrap().clone()
    }
}

impl NoticeSink for RecordingNotices {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    fn busy(&self, activity: Activity, visible: bool) {
        self.busy.lock().unwrap().push((activity, visible));
    }
}

/// Renders `<p>text</p>` and reports whatever it has been scripted to.
#[derive(Default)]
pub struct FakeRenderer {
    pub local_calls: AtomicUsize,
    pub server_calls: AtomicUsize,
    pub rendered: Mutex<Vec<String>>,
    pub run_on_server: AtomicBool,
    /// Popped per local pass; the last one repeats.
    pub fingerprints: Mutex<VecDeque<String>>,
    pub run_again_once: AtomicBool,
    pub fail_server: AtomicBool,
    pub labels: Mutex<Option<String>>,
    pub warnings: Mutex<Vec<SourceMessage>>,
}

impl FakeRenderer {
    pub fn with_fingerprints(fingerprints: &[&str]) -> Self {
        let renderer = Self::default();
        renderer.run_on_server.store(true, Ordering::SeqCst);
        *renderer.fingerprints.lock().unwrap() =
            fingerprints.iter().map(|f| f.to_string()).collect();
        renderer
    }

    pub fn local_calls(&self) -> usize {
        self.local_calls.load(Ordering::SeqCst)
    }

    pub fn server_calls(&self) -> usize {
        self.server_calls.load(Ordering::SeqCst)
    }

    pub fn last_rendered(&self) -> Option<String> {
        self.rendered.lock().unwrap().last().cloned()
    }

    fn next_fingerprint(&self) -> Option<String> {
        let mut fingerprints = self.fingerprints.lock().unwrap();
        if fingerprints.len() > 1 {
            fingerprints.pop_front()
        } else {
            fingerprints.front().cloned()
        }
    }
}

impl Renderer for FakeRenderer {
    async fn render_local(&self, text: &str, _ctx: &RenderContext) -> Result<RenderOutput, RenderError> {
        self.local_calls.fetch_add(1, Ordering::SeqCst);
        self.rendered.lock().unwrap().push(text.to_string());
        Ok(RenderOutput {
            content: format!("<p>{text}</p>"),
            labels: self.labels.lock().unwrap().clone(),
            links: None,
            run_again: self.run_again_once.swap(false, Ordering::SeqCst),
            run_on_server: self.run_on_server.load(Ordering::SeqCst),
            math_fingerprint: self.next_fingerprint(),
            avg_time_ms: 10,
            diagnostics: self.warnings.lock().unwrap().clone(),
        })
    }

    async fn render_server(&self, _text: &str, _ctx: &RenderContext) -> Result<ServerOutput, RenderError> {
        self.server_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_server.load(Ordering::SeqCst) {
            return Err(RenderError::Server {
                message: "math server unavailable".into(),
            });
        }
        Ok(ServerOutput::default())
    }

    async fn render_local_static(&self, name: &str, text: &str) -> Result<String, RenderError> {
        Ok(format!("<html><title>{name}</title><body><p>{text}</p></body></html>"))
    }
}

/// Keeps every saved snapshot in memory.
#[derive(Default)]
pub struct MemorySnapshots {
    saved: Mutex<Vec<String>>,
}

impl MemorySnapshots {
    pub fn saves(&self) -> usize {
        self.saved.lock().unwrap().len()
    }

    pub fn latest(&self) -> Option<String> {
        self.saved.lock().unwrap().last().cloned()
    }
}

impl SnapshotStore for MemorySnapshots {
    fn save(&self, data: String) -> BoxFuture<'_, Result<(), StorageError>> {
        self.saved.lock().unwrap().push(data);
        Box::pin(async { Ok(()) })
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<String>, StorageError>> {
        let latest = self.latest();
        Box::pin(async move { Ok(latest) })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub editor: Arc<MockEditor>,
    pub view: Arc<RecordingView>,
    pub notices: Arc<RecordingNotices>,
    pub session: Arc<Session<MemoryStore>>,
}

impl Harness {
    /// Type into the editor and tell the session about it.
    pub fn edit(&self, text: &str) {
        self.editor.type_text(text);
        self.session.note_edit();
    }

    pub fn editor_text(&self) -> String {
        self.editor.text()
    }
}

pub fn no_signin() -> RemoteCapabilities {
    RemoteCapabilities {
        need_signin: false,
        ..Default::default()
    }
}

/// A session with `DOC` opened from `store`.
pub async fn open(store: MemoryStore, config: PreviewConfig) -> Harness {
    open_with_snapshots(store, config, None).await
}

pub async fn open_with_snapshots(
    store: MemoryStore,
    config: PreviewConfig,
    snapshots: Option<Arc<dyn SnapshotStore>>,
) -> Harness {
    let store = Arc::new(store);
    let editor = Arc::new(MockEditor::default());
    editor.scroll_to(1, 40);
    let view = Arc::new(RecordingView::default());
    let notices = Arc::new(RecordingNotices::default());
    let mut session = Session::new(
        Arc::clone(&store),
        config,
        Adapters {
            editor: editor.clone(),
            view: view.clone(),
            notices: notices.clone(),
        },
    );
    if let Some(snapshots) = snapshots {
        session = session.with_snapshots(snapshots);
    }
    let session = Arc::new(session);
    session.open_document(DOC).await.unwrap();
    Harness {
        store,
        editor,
        view,
        notices,
        session,
    }
}

pub fn quiet_config() -> PreviewConfig {
    PreviewConfig {
        auto_sync: false,
        ..Default::default()
    }
}

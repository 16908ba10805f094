mod common;

use std::sync::Arc;
use std::time::Duration;

use smol_str::SmolStr;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep};
use weaver_preview::{
    Adapters, ConnectionStatus, EditorAdapter, MemoryStore, MergeCallback, NoticeLevel,
    PreviewConfig, PreviewError, RemoteCapabilities, RemoteStorage, Session, StorageError,
    SyncCoordinator, SyncReport, WriteOptions,
};
use weaver_preview_core::{CursorMap, FileInfo, LineDiffer, Position, SessionState};

use common::{
    DOC, Harness, MockEditor, RecordingNotices, RecordingView, no_signin, open, quiet_config,
};

const TEXT: &str = "l1\nl2\nl3\nl4\nl5";

async fn start(caps: RemoteCapabilities) -> (Harness, Arc<SyncCoordinator<MemoryStore>>) {
    let h = open(MemoryStore::new(caps).with_file(DOC, TEXT), PreviewConfig::default()).await;
    let sync = Arc::new(SyncCoordinator::new(Arc::clone(&h.session)));
    (h, sync)
}

#[tokio::test]
async fn test_caret_moves_with_insertion_above() {
    let (h, sync) = start(no_signin()).await;
    h.editor.move_to(4);
    h.store.remote_write(DOC, &format!("new0\nnew1\n{TEXT}")).unwrap();

    let outcome = sync.synchronize(false).await.unwrap();
    assert_eq!(outcome.report.merged.len(), 1);
    assert_eq!(outcome.caret_line, Some(6));
    assert_eq!(h.session.editor_position(), Position::new(6, 1));
    assert_eq!(h.editor.decorations().len(), 1);
    assert!(
        h.session
            .decoration_message(1)
            .is_some_and(|m| m.starts_with("Merged (insertion):"))
    );

    let doc = h.session.document();
    assert_eq!(doc.text, format!("new0\nnew1\n{TEXT}"));
    assert!(h.session.is_stale());
    assert_eq!(h.session.state(), SessionState::Normal);
}

#[tokio::test]
async fn test_caret_stays_above_remote_change() {
    let (h, sync) = start(no_signin()).await;
    h.editor.move_to(2);
    h.store.remote_write(DOC, "l1\nl2\nl3\nl4\nL5").unwrap();

    let outcome = sync.synchronize(false).await.unwrap();
    assert_eq!(outcome.caret_line, Some(2));
    assert_eq!(h.session.editor_position().line, 2);
    assert_eq!(h.session.document().text, "l1\nl2\nl3\nl4\nL5");
}

#[tokio::test]
async fn test_sync_rejected_while_another_action_runs() {
    let (h, sync) = start(no_signin()).await;
    h.store.remote_write(DOC, "changed").unwrap();

    let (release, hold) = oneshot::channel::<()>();
    let (entered_tx, entered) = oneshot::channel();
    let session = Arc::clone(&h.session);
    let running = tokio::spawn(async move {
        session
            .run_gated(SessionState::Syncing, &[], async move {
                let _ = entered_tx.send(());
                let _ = hold.await;
                Ok::<_, PreviewError>(())
            })
            .await
    });
    entered.await.unwrap();

    let err = sync.synchronize(false).await.unwrap_err();
    assert!(matches!(err, PreviewError::Busy { state: SessionState::Syncing }));
    assert_eq!(h.session.state(), SessionState::Syncing);
    assert!(
        h.notices
            .at(NoticeLevel::Status)
            .contains(&"sorry, cannot perform action while synchronizing".to_string())
    );
    // Nothing was pulled.
    assert_eq!(h.session.document().text, TEXT);

    release.send(()).unwrap();
    running.await.unwrap().unwrap();
    assert_eq!(h.session.state(), SessionState::Normal);
    assert!(sync.synchronize(false).await.is_ok());
    assert_eq!(h.session.document().text, "changed");
}

#[tokio::test]
async fn test_full_sync_pushes_and_commits() {
    let (h, sync) = start(RemoteCapabilities {
        can_commit: true,
        ..no_signin()
    })
    .await;
    h.edit("l1\nl2\nl3\nl4\nl5\nl6");

    // Automatic syncs only pull.
    let outcome = sync.synchronize(false).await.unwrap();
    assert!(!outcome.committed);
    assert!(outcome.report.pushed.is_empty());
    assert_eq!(h.store.remote_content(DOC).unwrap(), TEXT);
    assert_eq!(h.store.commits(), 0);

    let outcome = sync.synchronize(true).await.unwrap();
    assert!(outcome.committed);
    assert_eq!(outcome.report.pushed.len(), 1);
    assert_eq!(h.store.remote_content(DOC).unwrap(), "l1\nl2\nl3\nl4\nl5\nl6");
    assert_eq!(h.store.commits(), 1);
}

#[tokio::test]
async fn test_pull_only_remote_never_commits() {
    let (h, sync) = start(no_signin()).await;
    h.edit("local edit");

    let outcome = sync.synchronize(true).await.unwrap();
    assert!(!outcome.committed);
    assert_eq!(h.store.commits(), 0);
    assert_eq!(h.store.remote_content(DOC).unwrap(), TEXT);
}

#[tokio::test]
async fn test_login_only_on_request() {
    let store = MemoryStore::default().with_file(DOC, TEXT);
    // Sign in just long enough to open the document.
    store.login().await.unwrap();
    let h = open(store, quiet_config()).await;
    h.store.logout(false).await.unwrap();
    let sync = SyncCoordinator::new(Arc::clone(&h.session));

    let err = sync.synchronize(false).await.unwrap_err();
    assert!(matches!(
        err,
        PreviewError::Storage(StorageError::Unauthorized { .. })
    ));
    assert_eq!(h.notices.at(NoticeLevel::Error), vec!["not signed in to memory".to_string()]);

    let outcome = sync.synchronize(true).await.unwrap();
    assert!(!outcome.skipped);
    assert_eq!(h.store.connect().await.unwrap(), ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_readonly_remote_is_skipped() {
    let (h, sync) = start(RemoteCapabilities {
        readonly: true,
        ..no_signin()
    })
    .await;

    let outcome = sync.synchronize(false).await.unwrap();
    assert!(outcome.skipped);
    assert_eq!(h.notices.at(NoticeLevel::Info).len(), 1);
    assert_eq!(h.session.state(), SessionState::Normal);
}

#[tokio::test]
async fn test_remote_without_sync_only_saves() {
    let (h, sync) = start(RemoteCapabilities {
        can_sync: false,
        ..no_signin()
    })
    .await;
    h.edit("saved locally");
    h.store.remote_write(DOC, "remote").unwrap();

    let outcome = sync.synchronize(false).await.unwrap();
    assert!(outcome.skipped);
    let file = h.store.read_file(DOC, true).await.unwrap();
    assert_eq!(file.content, "saved locally");
    assert_eq!(h.session.document().text, "saved locally");
}

#[tokio::test(start_paused = true)]
async fn test_auto_sync_schedule() {
    let (h, sync) = start(no_signin()).await;

    // Never synced: sync right away.
    assert!(sync.auto_sync_tick(Instant::now()).await.unwrap().is_some());
    // Too soon after the last one.
    assert!(sync.auto_sync_tick(Instant::now()).await.unwrap().is_none());

    sleep(Duration::from_secs(31)).await;
    h.session.note_edit();
    // Interval passed, but the user is still typing.
    assert!(sync.auto_sync_tick(Instant::now()).await.unwrap().is_none());

    sleep(Duration::from_secs(6)).await;
    assert!(sync.auto_sync_tick(Instant::now()).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_auto_sync_waits_for_idle_session() {
    let (h, sync) = start(no_signin()).await;

    let (release, hold) = oneshot::channel::<()>();
    let (entered_tx, entered) = oneshot::channel();
    let session = Arc::clone(&h.session);
    let export = tokio::spawn(async move {
        session
            .run_gated(SessionState::Exporting, &[], async move {
                let _ = entered_tx.send(());
                let _ = hold.await;
                Ok::<_, PreviewError>(())
            })
            .await
    });
    entered.await.unwrap();

    assert!(sync.auto_sync_tick(Instant::now()).await.unwrap().is_none());
    // Skipped quietly, without a busy notice.
    assert!(h.notices.at(NoticeLevel::Status).iter().all(|m| !m.starts_with("sorry")));

    release.send(()).unwrap();
    export.await.unwrap().unwrap();
    assert!(sync.auto_sync_tick(Instant::now()).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_auto_sync_reports_offline() {
    let (h, sync) = start(no_signin()).await;
    h.store.set_status(ConnectionStatus::Offline);

    assert!(sync.auto_sync_tick(Instant::now()).await.unwrap().is_none());
    let info = h.notices.at(NoticeLevel::Info);
    assert_eq!(info.len(), 1);
    assert!(info[0].ends_with("(offline?)"));
}

#[tokio::test(start_paused = true)]
async fn test_spawned_auto_sync_pulls_remote_edits() {
    let (h, sync) = start(no_signin()).await;
    h.store.remote_write(DOC, "from elsewhere").unwrap();

    let auto = sync.spawn_auto_sync();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.editor_text(), "from elsewhere");

    drop(auto);
    h.store.remote_write(DOC, "later").unwrap();
    sleep(Duration::from_secs(60)).await;
    assert_eq!(h.editor_text(), "from elsewhere");
}

/// A store whose sync runs while the user keeps typing.
struct TypingStore {
    inner: MemoryStore,
    editor: Arc<MockEditor>,
    typed: &'static str,
}

impl TypingStore {
    fn type_more(&self) {
        let text = self.editor.text();
        self.editor.type_text(&format!("{text}\n{}", self.typed));
    }
}

impl RemoteStorage for TypingStore {
    fn kind(&self) -> &str {
        self.inner.kind()
    }

    fn capabilities(&self) -> RemoteCapabilities {
        self.inner.capabilities()
    }

    async fn connect(&self) -> Result<ConnectionStatus, StorageError> {
        self.inner.connect().await
    }

    async fn login(&self) -> Result<(), StorageError> {
        self.inner.login().await
    }

    async fn logout(&self, force: bool) -> Result<(), StorageError> {
        self.inner.logout(force).await
    }

    async fn user_name(&self) -> Result<Option<SmolStr>, StorageError> {
        self.inner.user_name().await
    }

    async fn read_file(&self, path: &str, cached: bool) -> Result<FileInfo, StorageError> {
        self.inner.read_file(path, cached).await
    }

    async fn write_file(&self, path: &str, content: &str, opts: WriteOptions) -> Result<(), StorageError> {
        self.inner.write_file(path, content, opts).await
    }

    async fn sync(
        &self,
        differ: &dyn LineDiffer,
        cursors: &mut CursorMap,
        on_merge: &MergeCallback<'_>,
        pull_only: bool,
    ) -> Result<SyncReport, StorageError> {
        self.type_more();
        self.inner.sync(differ, cursors, on_merge, pull_only).await
    }

    async fn pull(
        &self,
        differ: &dyn LineDiffer,
        cursors: &mut CursorMap,
        on_merge: &MergeCallback<'_>,
    ) -> Result<SyncReport, StorageError> {
        self.type_more();
        self.inner.pull(differ, cursors, on_merge).await
    }

    async fn commit(&self) -> Result<(), StorageError> {
        self.inner.commit().await
    }

    fn persist(&self, limit: usize) -> serde_json::Value {
        self.inner.persist(limit)
    }

    fn tracked_files(&self) -> Vec<SmolStr> {
        self.inner.tracked_files()
    }
}

#[tokio::test]
async fn test_typing_during_sync_is_kept() {
    let editor = Arc::new(MockEditor::default());
    let store = Arc::new(TypingStore {
        inner: MemoryStore::new(no_signin()).with_file(DOC, "a\nb"),
        editor: Arc::clone(&editor),
        typed: "typed during sync",
    });
    let session = Arc::new(Session::new(
        Arc::clone(&store),
        quiet_config(),
        Adapters {
            editor: editor.clone(),
            view: Arc::new(RecordingView::default()),
            notices: Arc::new(RecordingNotices::default()),
        },
    ));
    session.open_document(DOC).await.unwrap();
    store.inner.remote_write(DOC, "x\na\nb").unwrap();

    let sync = SyncCoordinator::new(Arc::clone(&session));
    let outcome = sync.synchronize(false).await.unwrap();
    assert_eq!(outcome.report.merged.len(), 1);

    let expected = "x\na\nb\ntyped during sync";
    assert_eq!(editor.text(), expected);
    assert_eq!(session.document().text, expected);
    // The typing reached storage too.
    assert_eq!(store.read_file(DOC, true).await.unwrap().content, expected);
}

//! Storage sync coordination.
//!
//! Manual syncs and the periodic auto-sync both go through the session's
//! state gate, so at most one sync (or export, or load) runs at a time.
//! Auto-sync only pulls; pushing and committing happen on an explicit
//! [`SyncCoordinator::synchronize`] with `login` set.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use weaver_preview_core::{CursorMap, LcsLineDiffer, LineDiffer, MergeResult, SessionState};

use crate::adapter::{Activity, Notice};
use crate::busy::BusyIndicator;
use crate::error::{PreviewError, StorageError};
use crate::session::Session;
use crate::storage::{ConnectionStatus, RemoteStorage, SyncReport};

/// What a sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub report: SyncReport,
    /// Caret line in the active file after remapping.
    pub caret_line: Option<u32>,
    pub committed: bool,
    /// Nothing was exchanged with the remote.
    pub skipped: bool,
}

impl SyncOutcome {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

pub struct SyncCoordinator<S> {
    session: Arc<Session<S>>,
    differ: Arc<dyn LineDiffer>,
    busy: BusyIndicator,
}

impl<S: RemoteStorage> SyncCoordinator<S> {
    pub fn new(session: Arc<Session<S>>) -> Self {
        let notices = session.notices();
        let busy = BusyIndicator::new(session.config().sync_busy_delay(), move |visible| {
            notices.busy(Activity::Sync, visible)
        });
        Self {
            session,
            differ: Arc::new(LcsLineDiffer),
            busy,
        }
    }

    pub fn with_differ(mut self, differ: Arc<dyn LineDiffer>) -> Self {
        self.differ = differ;
        self
    }

    pub fn session(&self) -> &Arc<Session<S>> {
        &self.session
    }

    /// Reconcile with the remote.
    ///
    /// With `login` the user asked for it: sign in if needed, push local
    /// changes and commit. Without it only remote changes are pulled.
    pub async fn synchronize(&self, login: bool) -> Result<SyncOutcome, PreviewError> {
        self.session
            .run_gated(SessionState::Syncing, &[], async {
                let storage = self.session.storage();
                let status = storage.connect().await?;
                if status != ConnectionStatus::Connected {
                    if !login {
                        return Err(StorageError::Unauthorized {
                            remote: storage.kind().into(),
                        }
                        .into());
                    }
                    storage.login().await?;
                    return self.sync_inner(false).await;
                }
                if storage.capabilities().readonly {
                    self.session.notify(Notice::info(format!(
                        "the {} remote is read-only; save a copy elsewhere to synchronize",
                        storage.kind()
                    )));
                    return Ok(SyncOutcome::skipped());
                }
                self.sync_inner(!login).await
            })
            .await
    }

    /// Sign in if needed and pull remote changes without pushing.
    pub async fn pull(&self) -> Result<SyncOutcome, PreviewError> {
        self.session
            .run_gated(SessionState::Syncing, &[], async {
                self.session.storage().login().await?;
                self.sync_inner(true).await
            })
            .await
    }

    async fn sync_inner(&self, pull_only: bool) -> Result<SyncOutcome, PreviewError> {
        let session = &self.session;
        let storage = session.storage();
        session.mark_synced(Instant::now());
        let flushed = session.flush_editor().await?;
        session.save_snapshot(false).await?;

        let edit_name = session.edit_name();
        let line0 = session.editor_position().line;
        let mut cursors = CursorMap::new();
        for path in storage.tracked_files() {
            if let Some(position) = session.position_of(&path) {
                cursors.insert(path, position.line);
            }
        }
        cursors.insert(edit_name.clone(), line0);

        let caps = storage.capabilities();
        if !caps.can_sync {
            return Ok(SyncOutcome::skipped());
        }

        let _busy = self.busy.enter();
        let on_merge = |merges: &[MergeResult]| session.show_merges(merges);
        let report = if caps.can_commit {
            storage
                .sync(self.differ.as_ref(), &mut cursors, &on_merge, pull_only)
                .await?
        } else {
            storage
                .pull(self.differ.as_ref(), &mut cursors, &on_merge)
                .await?
        };

        // Only a caret at or below the measured line moves with the merge.
        let line1 = cursors.get(&edit_name).unwrap_or(line0);
        let mut position = session.editor_position();
        let shift = position.line >= line0;
        if shift {
            position.line = (i64::from(position.line) + i64::from(line1) - i64::from(line0)).max(1) as u32;
        }
        if !report.merged.is_empty() {
            session
                .reload_merged(&report.merged, &flushed, self.differ.as_ref())
                .await?;
        }
        if shift {
            session.set_editor_position(position);
        }
        session.record_lines(cursors.iter().map(|(path, line)| (path.clone(), line)));

        let committed = caps.can_commit && !pull_only;
        if committed {
            storage.commit().await?;
        }

        metrics::counter!("preview_syncs_total", "pull_only" => pull_only.to_string()).increment(1);
        if report.conflicts > 0 {
            session.notify(Notice::info(format!(
                "{} merge conflict(s); both versions were kept",
                report.conflicts
            )));
        }
        tracing::info!(
            merged = report.merged.len(),
            pushed = report.pushed.len(),
            conflicts = report.conflicts,
            committed,
            "synchronized"
        );
        Ok(SyncOutcome {
            report,
            caret_line: Some(position.line),
            committed,
            skipped: false,
        })
    }

    /// One auto-sync check at `now`.
    ///
    /// Syncs (pull only) when connected, auto-sync is on, the session is
    /// idle, and either nothing was synced yet or the sync interval has
    /// passed with no edit inside the idle window.
    pub async fn auto_sync_tick(&self, now: Instant) -> Result<Option<SyncOutcome>, PreviewError> {
        let config = self.session.config();
        let storage = self.session.storage();
        if !config.auto_sync || !storage.capabilities().can_sync {
            return Ok(None);
        }
        match storage.connect().await? {
            ConnectionStatus::Offline => {
                self.session.notify(Notice::info(format!(
                    "could not synchronize because the {} remote could not be reached (offline?)",
                    storage.kind()
                )));
                Ok(None)
            }
            ConnectionStatus::Unauthorized => Ok(None),
            ConnectionStatus::Connected => {
                if !self.session.state().is_idle() {
                    return Ok(None);
                }
                let due = match self.session.last_sync() {
                    None => true,
                    Some(last) => {
                        now.saturating_duration_since(last) >= config.auto_sync_interval()
                            && self.session.last_edit().is_none_or(|edit| {
                                now.saturating_duration_since(edit) > config.auto_sync_idle()
                            })
                    }
                };
                if !due {
                    return Ok(None);
                }
                self.synchronize(false).await.map(Some)
            }
        }
    }

    /// Run [`Self::auto_sync_tick`] on the configured cadence until the
    /// returned handle is dropped.
    pub fn spawn_auto_sync(self: &Arc<Self>) -> AutoSync {
        let this = Arc::clone(self);
        let tick = this.session.config().auto_sync_tick();
        let task = tokio::spawn(async move {
            // First check shortly after startup.
            tokio::time::sleep(Duration::from_secs(1)).await;
            loop {
                if let Err(e) = this.auto_sync_tick(Instant::now()).await {
                    tracing::debug!(error = %e, "auto-sync tick failed");
                }
                tokio::time::sleep(tick).await;
            }
        });
        AutoSync { task }
    }
}

/// Running auto-sync loop; stops on drop.
#[derive(Debug)]
pub struct AutoSync {
    task: JoinHandle<()>,
}

impl AutoSync {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.task.abort();
    }
}

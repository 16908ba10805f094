use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::json;
use smol_str::{SmolStr, ToSmolStr};
use weaver_preview_core::{CursorMap, FileInfo, LineDiffer, MergeResult, Position, merge_results, merge3};

use super::{
    ConnectionStatus, MergeCallback, RemoteCapabilities, RemoteStorage, StorageError, SyncReport,
    WriteOptions,
};

/// In-memory remote with a local working copy per file.
///
/// Other writers are simulated with [`MemoryStore::remote_write`]. Syncing
/// merges their edits into the working copy with a three-way merge against
/// the last synced revision.
#[derive(Debug)]
pub struct MemoryStore {
    kind: SmolStr,
    caps: RemoteCapabilities,
    inner: Mutex<MemoryInner>,
}

#[derive(Debug)]
struct MemoryInner {
    status: ConnectionStatus,
    signed_in: bool,
    user: Option<SmolStr>,
    local: BTreeMap<SmolStr, LocalEntry>,
    remote: BTreeMap<SmolStr, RemoteEntry>,
    next_revision: u64,
    commits: u64,
}

#[derive(Debug, Clone)]
struct LocalEntry {
    content: String,
    /// Remote content as of the last sync; `None` if never synced.
    base: Option<String>,
    revision: Option<u64>,
    position: Option<Position>,
}

impl LocalEntry {
    fn modified(&self) -> bool {
        self.base.as_deref() != Some(self.content.as_str())
    }
}

#[derive(Debug, Clone)]
struct RemoteEntry {
    content: String,
    revision: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(RemoteCapabilities::default())
    }
}

impl MemoryStore {
    pub fn new(caps: RemoteCapabilities) -> Self {
        Self {
            kind: SmolStr::new_static("memory"),
            caps,
            inner: Mutex::new(MemoryInner {
                status: ConnectionStatus::Connected,
                signed_in: !caps.need_signin,
                user: None,
                local: BTreeMap::new(),
                remote: BTreeMap::new(),
                next_revision: 1,
                commits: 0,
            }),
        }
    }

    /// Seed a file that is identical locally and remotely.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        if let Ok(mut inner) = self.inner.lock() {
            let revision = inner.bump();
            inner.remote.insert(
                path.into(),
                RemoteEntry {
                    content: content.to_string(),
                    revision,
                },
            );
            inner.local.insert(
                path.into(),
                LocalEntry {
                    content: content.to_string(),
                    base: Some(content.to_string()),
                    revision: Some(revision),
                    position: None,
                },
            );
        }
        self
    }

    /// Write to the remote side as another writer would.
    pub fn remote_write(&self, path: &str, content: &str) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        let revision = inner.bump();
        inner.remote.insert(
            path.into(),
            RemoteEntry {
                content: content.to_string(),
                revision,
            },
        );
        Ok(())
    }

    pub fn remote_content(&self, path: &str) -> Option<String> {
        let inner = self.lock().ok()?;
        inner.remote.get(path).map(|entry| entry.content.clone())
    }

    /// Simulate connectivity changes.
    pub fn set_status(&self, status: ConnectionStatus) {
        if let Ok(mut inner) = self.lock() {
            inner.status = status;
        }
    }

    pub fn commits(&self) -> u64 {
        self.lock().map(|inner| inner.commits).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StorageError> {
        self.inner.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn ensure_connected(&self, inner: &MemoryInner) -> Result<(), StorageError> {
        match inner.status {
            ConnectionStatus::Offline => Err(StorageError::Offline {
                remote: self.kind.clone(),
            }),
            _ if self.caps.need_signin && !inner.signed_in => Err(StorageError::Unauthorized {
                remote: self.kind.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn reconcile(
        &self,
        differ: &dyn LineDiffer,
        cursors: &mut CursorMap,
        push: bool,
    ) -> Result<(SyncReport, Vec<MergeResult>), StorageError> {
        let mut guard = self.lock()?;
        self.ensure_connected(&guard)?;
        let inner = &mut *guard;

        let mut report = SyncReport::default();
        let mut merges = Vec::new();
        for (path, local) in inner.local.iter_mut() {
            if let Some(remote) = inner.remote.get(path)
                && local.revision != Some(remote.revision)
            {
                let base = local.base.as_deref().unwrap_or("");
                let outcome = merge3(differ, base, &local.content, &remote.content);
                if outcome.text != local.content {
                    let hunks = differ.diff(&local.content, &outcome.text);
                    cursors.remap(path, &hunks);
                    merges.extend(merge_results(
                        differ,
                        path,
                        &local.content,
                        &outcome.text,
                        &outcome.conflicts,
                    ));
                    report.merged.push(path.clone());
                }
                report.conflicts += outcome.conflicts.len();
                local.content = outcome.text;
                local.base = Some(remote.content.clone());
                local.revision = Some(remote.revision);
            }

            if push && local.modified() {
                let revision = inner.next_revision;
                inner.next_revision += 1;
                inner.remote.insert(
                    path.clone(),
                    RemoteEntry {
                        content: local.content.clone(),
                        revision,
                    },
                );
                local.base = Some(local.content.clone());
                local.revision = Some(revision);
                report.pushed.push(path.clone());
            }
        }
        tracing::debug!(
            merged = report.merged.len(),
            pushed = report.pushed.len(),
            conflicts = report.conflicts,
            "memory store reconciled"
        );
        Ok((report, merges))
    }
}

impl MemoryInner {
    fn bump(&mut self) -> u64 {
        let revision = self.next_revision;
        self.next_revision += 1;
        revision
    }
}

impl RemoteStorage for MemoryStore {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn capabilities(&self) -> RemoteCapabilities {
        self.caps
    }

    async fn connect(&self) -> Result<ConnectionStatus, StorageError> {
        let inner = self.lock()?;
        Ok(match inner.status {
            ConnectionStatus::Connected if self.caps.need_signin && !inner.signed_in => {
                ConnectionStatus::Unauthorized
            }
            status => status,
        })
    }

    async fn login(&self) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        if inner.status == ConnectionStatus::Offline {
            return Err(StorageError::Offline {
                remote: self.kind.clone(),
            });
        }
        inner.signed_in = true;
        inner.status = ConnectionStatus::Connected;
        inner.user.get_or_insert_with(|| SmolStr::new_static("local user"));
        Ok(())
    }

    async fn logout(&self, force: bool) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        inner.signed_in = !self.caps.need_signin;
        if force {
            inner.user = None;
        }
        Ok(())
    }

    async fn user_name(&self) -> Result<Option<SmolStr>, StorageError> {
        let inner = self.lock()?;
        Ok(inner.user.clone().filter(|_| inner.signed_in))
    }

    async fn read_file(&self, path: &str, cached: bool) -> Result<FileInfo, StorageError> {
        let mut inner = self.lock()?;
        if !cached && inner.local.get(path).is_none_or(|local| !local.modified()) {
            // Refresh an unmodified working copy from the remote.
            if let Some(remote) = inner.remote.get(path).cloned() {
                self.ensure_connected(&inner)?;
                let position = inner.local.get(path).and_then(|local| local.position);
                inner.local.insert(
                    path.into(),
                    LocalEntry {
                        content: remote.content.clone(),
                        base: Some(remote.content),
                        revision: Some(remote.revision),
                        position,
                    },
                );
            }
        }
        if !inner.local.contains_key(path) {
            let Some(remote) = inner.remote.get(path).cloned() else {
                return Err(StorageError::NotFound { path: path.into() });
            };
            self.ensure_connected(&inner)?;
            inner.local.insert(
                path.into(),
                LocalEntry {
                    content: remote.content.clone(),
                    base: Some(remote.content),
                    revision: Some(remote.revision),
                    position: None,
                },
            );
        }
        let local = &inner.local[path];
        let mut info = FileInfo::text(path, local.content.clone());
        info.modified = local.modified();
        info.revision = local.revision.map(|rev| rev.to_smolstr());
        Ok(info)
    }

    async fn write_file(&self, path: &str, content: &str, opts: WriteOptions) -> Result<(), StorageError> {
        if self.caps.readonly {
            return Err(StorageError::ReadOnly {
                remote: self.kind.clone(),
            });
        }
        let mut inner = self.lock()?;
        let entry = inner.local.entry(path.into()).or_insert_with(|| LocalEntry {
            content: String::new(),
            base: None,
            revision: None,
            position: None,
        });
        if entry.content != content {
            entry.content = content.to_string();
        }
        if opts.position.is_some() {
            entry.position = opts.position;
        }
        Ok(())
    }

    async fn sync(
        &self,
        differ: &dyn LineDiffer,
        cursors: &mut CursorMap,
        on_merge: &MergeCallback<'_>,
        pull_only: bool,
    ) -> Result<SyncReport, StorageError> {
        let (report, merges) = self.reconcile(differ, cursors, !pull_only)?;
        if !merges.is_empty() {
            on_merge(&merges);
        }
        Ok(report)
    }

    async fn pull(
        &self,
        differ: &dyn LineDiffer,
        cursors: &mut CursorMap,
        on_merge: &MergeCallback<'_>,
    ) -> Result<SyncReport, StorageError> {
        self.sync(differ, cursors, on_merge, true).await
    }

    async fn commit(&self) -> Result<(), StorageError> {
        let mut inner = self.lock()?;
        self.ensure_connected(&inner)?;
        inner.commits += 1;
        Ok(())
    }

    fn persist(&self, limit: usize) -> serde_json::Value {
        let Ok(inner) = self.lock() else {
            return serde_json::Value::Null;
        };
        let mut budget = limit;
        let files: Vec<serde_json::Value> = inner
            .local
            .iter()
            .map(|(path, local)| {
                let mut file = json!({
                    "path": path,
                    "revision": local.revision,
                    "modified": local.modified(),
                });
                if local.content.len() <= budget {
                    budget -= local.content.len();
                    file["content"] = json!(local.content);
                }
                file
            })
            .collect();
        json!({ "kind": self.kind, "files": files })
    }

    fn tracked_files(&self) -> Vec<SmolStr> {
        self.lock()
            .map(|inner| inner.local.keys().cloned().collect())
            .unwrap_or_default()
    }
}

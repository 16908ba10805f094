//! Remote storage interface used by the sync coordinator.
//!
//! A remote holds the files of an open session and knows how to reconcile
//! them with its backing store. Implementations do their own merging: the
//! coordinator only passes a line differ, the cursor map to remap, and a
//! callback that receives merge results for display.

mod memory;

use std::future::Future;

use smol_str::SmolStr;
use weaver_preview_core::{CursorMap, FileInfo, LineDiffer, MergeResult, Position};

use crate::error::StorageError;

pub use memory::MemoryStore;

/// Receives the blocks merged during a sync.
pub type MergeCallback<'a> = dyn Fn(&[MergeResult]) + Send + Sync + 'a;

/// What a remote supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteCapabilities {
    /// Files can be reconciled with the remote at all.
    pub can_sync: bool,
    /// The remote supports two-way sync followed by an explicit commit.
    pub can_commit: bool,
    pub need_signin: bool,
    pub readonly: bool,
}

impl Default for RemoteCapabilities {
    fn default() -> Self {
        Self {
            can_sync: true,
            can_commit: false,
            need_signin: true,
            readonly: false,
        }
    }
}

/// Result of a connection check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    /// Reachable, but the session is not signed in.
    Unauthorized,
    /// The remote could not be reached.
    Offline,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Caret position to remember with the file.
    pub position: Option<Position>,
}

/// Summary of one sync call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Files whose local content changed because of remote edits.
    pub merged: Vec<SmolStr>,
    /// Files pushed to the remote.
    pub pushed: Vec<SmolStr>,
    pub conflicts: usize,
}

pub trait RemoteStorage: Send + Sync + 'static {
    /// Short remote type name, e.g. `memory` or `dropbox`.
    fn kind(&self) -> &str;

    /// Logo asset shown next to the file name.
    fn logo(&self) -> &str {
        "icon-local.png"
    }

    fn capabilities(&self) -> RemoteCapabilities;

    fn connect(&self) -> impl Future<Output = Result<ConnectionStatus, StorageError>> + Send;

    fn login(&self) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Sign out. With `force` any cached credentials are dropped as well.
    fn logout(&self, force: bool) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn user_name(&self) -> impl Future<Output = Result<Option<SmolStr>, StorageError>> + Send;

    /// Read a file. With `cached` a locally held copy may be returned
    /// without asking the remote.
    fn read_file(
        &self,
        path: &str,
        cached: bool,
    ) -> impl Future<Output = Result<FileInfo, StorageError>> + Send;

    fn write_file(
        &self,
        path: &str,
        content: &str,
        opts: WriteOptions,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Pull remote changes, merge them into local files, and unless
    /// `pull_only` push local changes back.
    fn sync(
        &self,
        differ: &dyn LineDiffer,
        cursors: &mut CursorMap,
        on_merge: &MergeCallback<'_>,
        pull_only: bool,
    ) -> impl Future<Output = Result<SyncReport, StorageError>> + Send;

    /// Pull and merge remote changes without pushing.
    fn pull(
        &self,
        differ: &dyn LineDiffer,
        cursors: &mut CursorMap,
        on_merge: &MergeCallback<'_>,
    ) -> impl Future<Output = Result<SyncReport, StorageError>> + Send;

    /// Finalize pushed changes on remotes that support it.
    fn commit(&self) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Serializable state for the session snapshot, at most about `limit`
    /// bytes of file content. `limit == 0` persists metadata only.
    fn persist(&self, limit: usize) -> serde_json::Value;

    /// Paths of all files held locally.
    fn tracked_files(&self) -> Vec<SmolStr>;
}

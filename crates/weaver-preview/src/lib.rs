//! weaver-preview: keeps a rendered preview in step with an edited document.
//!
//! - [`DebouncedRunner`] - staleness-driven, non-overlapping task runner
//! - [`RecomputePipeline`] - local render stage plus fingerprint-gated server stage
//! - [`Session`] - state gate, document, decorations and host adapters
//! - [`SyncCoordinator`] - manual and automatic reconciliation with a [`RemoteStorage`]
//!
//! Pure logic (view diffing, decorations, merges) lives in `weaver-preview-core`.

pub mod adapter;
pub mod busy;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod runner;
pub mod session;
pub mod snapshot;
pub mod storage;
pub mod sync;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use adapter::{Activity, EditorAdapter, Notice, NoticeLevel, NoticeSink, TracingNotices, ViewSink};
pub use busy::{BusyGuard, BusyIndicator};
pub use config::PreviewConfig;
pub use error::{ConfigError, PreviewError, RenderError, StorageError};
pub use pipeline::RecomputePipeline;
pub use render::{RenderContext, RenderOutput, Renderer, ServerOutput};
pub use runner::{
    DebouncedRunner, MIN_POLL_INTERVAL, RunResult, RunnerConfig, RunnerHandle, RunnerState, RunnerTask,
};
pub use session::{Adapters, Session};
pub use snapshot::{FileSnapshotStore, SnapshotStore};
pub use storage::{
    ConnectionStatus, MemoryStore, MergeCallback, RemoteCapabilities, RemoteStorage, SyncReport,
    WriteOptions,
};
pub use sync::{AutoSync, SyncCoordinator, SyncOutcome};

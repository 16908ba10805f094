use std::path::PathBuf;

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;
use weaver_preview_core::{SessionState, SnapshotError};

/// Top-level error type for preview operations
#[derive(Debug, Error, Diagnostic)]
pub enum PreviewError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    /// A gated action was requested while another one is in flight.
    #[error("sorry, cannot perform action while {state}")]
    #[diagnostic(code(preview::busy))]
    Busy { state: SessionState },

    #[error("action panicked: {message}")]
    #[diagnostic(code(preview::panicked))]
    Panicked { message: String },
}

impl PreviewError {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Local or server render failures
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum RenderError {
    #[error("local render failed: {message}")]
    #[diagnostic(code(render::local))]
    Local { message: String },

    #[error("server render failed: {message}")]
    #[diagnostic(code(render::server), help("the preview keeps the last local render"))]
    Server { message: String },
}

/// Remote storage failures
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum StorageError {
    #[error("file not found: {path}")]
    #[diagnostic(code(storage::not_found))]
    NotFound { path: SmolStr },

    #[error("not signed in to {remote}")]
    #[diagnostic(code(storage::unauthorized), help("sign in again to resume syncing"))]
    Unauthorized { remote: SmolStr },

    #[error("access to {path} denied")]
    #[diagnostic(code(storage::forbidden))]
    Forbidden { path: SmolStr },

    #[error("could not reach {remote}")]
    #[diagnostic(code(storage::offline))]
    Offline { remote: SmolStr },

    #[error("{remote} storage is read-only")]
    #[diagnostic(code(storage::readonly))]
    ReadOnly { remote: SmolStr },

    #[error("storage I/O failed for {}", path.display())]
    #[diagnostic(code(storage::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage state lock poisoned")]
    #[diagnostic(code(storage::lock))]
    LockPoisoned,
}

/// Configuration errors
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {}", path.display())]
    #[diagnostic(code(config::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config in {}: {message}", path.display())]
    #[diagnostic(code(config::parse))]
    Parse { path: PathBuf, message: String },

    #[error("unsupported config format: {}", path.display())]
    #[diagnostic(code(config::format), help("use a .json or .toml file"))]
    Format { path: PathBuf },
}

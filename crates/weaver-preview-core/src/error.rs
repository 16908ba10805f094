//! Error types for preview core operations.

use miette::Diagnostic;
use thiserror::Error;

/// Session snapshot encoding errors.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("failed to encode session snapshot")]
    #[diagnostic(code(snapshot::encode))]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode session snapshot")]
    #[diagnostic(code(snapshot::decode))]
    Decode(#[source] serde_json::Error),

    /// Even the minimal fallback snapshot does not fit.
    #[error("session snapshot is {size} bytes, limit is {limit}")]
    #[diagnostic(
        code(snapshot::too_large),
        help("raise the snapshot limit or persist fewer storage entries")
    )]
    TooLarge { size: usize, limit: usize },
}

//! weaver-preview-core: live preview logic without runtime dependencies.
//!
//! This crate provides:
//! - `view_diff` - decide between patching one text node and a full reload
//! - `DecorationTracker` - gutter decorations with overlap reconciliation
//! - `LineDiffer`/`merge3` - line diffs and best-effort three-way merges
//! - `CursorMap`/`remap_line` - caret lines carried through merges
//! - Document, file and event types shared with `weaver-preview`

pub mod cursor;
pub mod decoration;
pub mod entities;
pub mod error;
pub mod events;
pub mod labels;
pub mod line_diff;
pub mod merge;
pub mod snapshot;
pub mod state;
pub mod types;
pub mod view_diff;

pub use cursor::{CursorMap, remap_line};
pub use decoration::{
    Decoration, DecorationId, DecorationTracker, MERGE_EXPIRY, MERGE_KIND, NewDecoration,
    SourceMessage,
};
pub use entities::decode_char_refs;
pub use error::SnapshotError;
pub use events::{PreviewEvent, ViewEvent};
pub use labels::{Citation, CitationIndex, Label, is_bib_file, parse_bib, parse_labels};
pub use line_diff::{LcsLineDiffer, LineDiffer, LineHunk};
pub use merge::{MergeOutcome, merge_results, merge3};
pub use smol_str::SmolStr;
pub use snapshot::SessionSnapshot;
pub use state::SessionState;
pub use types::{Document, Encoding, FileInfo, MergeKind, MergeResult, Position, line_count, mime_for};
pub use view_diff::{TextPatch, ViewUpdate, apply_patch, diff_view};

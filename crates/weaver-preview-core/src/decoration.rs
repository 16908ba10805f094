//! Line decorations shown in the editor gutter: render errors, warnings and
//! recently merged blocks.
//!
//! Decorations live in an arena keyed by [`DecorationId`], with a per-file
//! index ordered by start line so overlap queries only touch nearby entries.
//! After every [`DecorationTracker::add`] no two decorations on the same file
//! overlap.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use smol_str::{SmolStr, format_smolstr};
use web_time::Instant;

use crate::types::MergeResult;

/// How long merge decorations stay sticky.
pub const MERGE_EXPIRY: Duration = Duration::from_secs(60);

/// Kind prefix shared by all merge decorations.
pub const MERGE_KIND: &str = "merge";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecorationId(u64);

impl DecorationId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub id: DecorationId,
    pub file: SmolStr,
    /// 1-based, inclusive.
    pub start_line: u32,
    /// 1-based, inclusive.
    pub end_line: u32,
    /// Dotted kind, e.g. `error` or `merge.merge-insertion`. Removal filters
    /// on kind prefixes.
    pub kind: SmolStr,
    /// Gutter glyph class.
    pub glyph: SmolStr,
    /// Sticky decorations survive a non-discarding removal until they expire.
    pub sticky: bool,
    /// Demoted: still shown, but loses every overlap.
    pub outdated: bool,
    pub expire_at: Option<Instant>,
    pub message: String,
}

impl Decoration {
    fn overlaps(&self, start: u32, end: u32) -> bool {
        self.start_line <= end && start <= self.end_line
    }

    fn expired(&self, now: Instant) -> bool {
        self.expire_at.is_some_and(|at| now >= at)
    }

    pub fn contains_line(&self, line: u32) -> bool {
        self.start_line <= line && line <= self.end_line
    }
}

/// A decoration to be added; the tracker assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDecoration {
    pub file: SmolStr,
    pub start_line: u32,
    pub end_line: u32,
    pub kind: SmolStr,
    pub glyph: SmolStr,
    pub sticky: bool,
    pub expire_at: Option<Instant>,
    pub message: String,
}

impl NewDecoration {
    pub fn new(file: impl Into<SmolStr>, start_line: u32, end_line: u32, kind: impl Into<SmolStr>) -> Self {
        let kind = kind.into();
        Self {
            file: file.into(),
            start_line,
            end_line: end_line.max(start_line),
            glyph: kind.clone(),
            kind,
            sticky: false,
            expire_at: None,
            message: String::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn sticky_until(mut self, expire_at: Option<Instant>) -> Self {
        self.sticky = true;
        self.expire_at = expire_at;
        self
    }
}

/// A located message from a render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub path: SmolStr,
    pub start_line: u32,
    pub end_line: u32,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DecorationTracker {
    next_id: u64,
    arena: BTreeMap<DecorationId, Decoration>,
    by_file: BTreeMap<SmolStr, BTreeSet<(u32, DecorationId)>>,
    active_file: Option<SmolStr>,
    merge_expiry: Duration,
}

impl Default for DecorationTracker {
    fn default() -> Self {
        Self::new(MERGE_EXPIRY)
    }
}

impl DecorationTracker {
    pub fn new(merge_expiry: Duration) -> Self {
        Self {
            next_id: 0,
            arena: BTreeMap::new(),
            by_file: BTreeMap::new(),
            active_file: None,
            merge_expiry,
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn get(&self, id: DecorationId) -> Option<&Decoration> {
        self.arena.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Decoration> {
        self.arena.values()
    }

    /// Add a decoration, reconciling overlaps on the same file.
    ///
    /// Against an overlapping entry the non-outdated side wins; when both
    /// have the same standing the newer one wins.
    pub fn add(&mut self, new: NewDecoration) -> DecorationId {
        let overlapping: Vec<DecorationId> = self
            .by_file
            .get(&new.file)
            .into_iter()
            .flat_map(|index| index.range(..=(new.end_line, DecorationId(u64::MAX))))
            .map(|&(_, id)| id)
            .filter(|id| {
                self.arena
                    .get(id)
                    .is_some_and(|d| d.overlaps(new.start_line, new.end_line))
            })
            .collect();

        // Incoming decorations are never outdated, so every overlapping
        // entry loses: outdated ones by standing, the rest by age.
        for id in overlapping {
            self.delete(id);
        }

        let id = DecorationId(self.next_id);
        self.next_id += 1;
        self.by_file
            .entry(new.file.clone())
            .or_default()
            .insert((new.start_line, id));
        self.arena.insert(
            id,
            Decoration {
                id,
                file: new.file,
                start_line: new.start_line,
                end_line: new.end_line,
                kind: new.kind,
                glyph: new.glyph,
                sticky: new.sticky,
                outdated: false,
                expire_at: new.expire_at,
                message: new.message,
            },
        );
        id
    }

    /// Add a batch; later entries win overlaps against earlier ones.
    pub fn add_all(&mut self, decorations: impl IntoIterator<Item = NewDecoration>) -> Vec<DecorationId> {
        decorations.into_iter().map(|d| self.add(d)).collect()
    }

    /// Remove decorations whose kind starts with `kind_prefix` (all when `None`).
    ///
    /// A matching decoration is deleted when `discard_sticky` is set, when it
    /// is not sticky, or when it has expired. Otherwise it is demoted to
    /// outdated. Returns the number deleted.
    pub fn remove(&mut self, discard_sticky: bool, kind_prefix: Option<&str>, now: Instant) -> usize {
        let matching: Vec<DecorationId> = self
            .arena
            .values()
            .filter(|d| kind_prefix.is_none_or(|prefix| d.kind.starts_with(prefix)))
            .map(|d| d.id)
            .collect();

        let mut removed = 0;
        for id in matching {
            let Some(d) = self.arena.get_mut(&id) else {
                continue;
            };
            if discard_sticky || !d.sticky || d.expired(now) {
                self.delete(id);
                removed += 1;
            } else {
                d.outdated = true;
            }
        }
        removed
    }

    /// Replace all decorations of `kind` with the given messages.
    pub fn show_errors(&mut self, errors: &[SourceMessage], sticky: bool, kind: &str, now: Instant) {
        self.remove(true, Some(kind), now);
        for err in errors {
            let mut dec = NewDecoration::new(err.path.clone(), err.start_line, err.end_line, kind)
                .with_message(err.message.clone());
            dec.sticky = sticky;
            self.add(dec);
        }
    }

    /// Show merged blocks as sticky decorations that expire after the merge
    /// expiry. Previous merge decorations are demoted or cleared first.
    pub fn show_merges(&mut self, merges: &[MergeResult], now: Instant) {
        self.remove(false, Some(MERGE_KIND), now);
        let expire_at = now + self.merge_expiry;
        for merge in merges {
            let kind = merge.kind.as_str();
            let content = merge.content.as_deref().unwrap_or("");
            let mut dec = NewDecoration::new(
                merge.path.clone(),
                merge.start_line,
                merge.end_line,
                format_smolstr!("{MERGE_KIND}.merge-{kind}"),
            )
            .with_message(format!("Merged ({kind}):\n\"{content}\""))
            .sticky_until(Some(expire_at));
            dec.glyph = format_smolstr!("merge-{kind}");
            self.add(dec);
        }
    }

    /// Switch the file whose decorations are visible.
    pub fn set_active_file(&mut self, path: impl Into<SmolStr>) {
        self.active_file = Some(path.into());
    }

    pub fn active_file(&self) -> Option<&str> {
        self.active_file.as_deref()
    }

    /// Decorations on the active file, ordered by start line.
    pub fn visible(&self) -> Vec<&Decoration> {
        let Some(active) = &self.active_file else {
            return Vec::new();
        };
        self.on_file(active)
    }

    pub fn on_file(&self, file: &str) -> Vec<&Decoration> {
        self.by_file
            .get(file)
            .into_iter()
            .flatten()
            .filter_map(|(_, id)| self.arena.get(id))
            .collect()
    }

    /// Message of the first decoration covering `line` on `file`.
    pub fn message_at(&self, file: &str, line: u32) -> Option<&str> {
        self.on_file(file)
            .into_iter()
            .find(|d| d.contains_line(line))
            .map(|d| d.message.as_str())
    }

    fn delete(&mut self, id: DecorationId) {
        if let Some(d) = self.arena.remove(&id) {
            if let Some(index) = self.by_file.get_mut(&d.file) {
                index.remove(&(d.start_line, id));
                if index.is_empty() {
                    self.by_file.remove(&d.file);
                }
            }
        }
    }
}

//! Reference label and citation caches refreshed after each render.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use smol_str::SmolStr;

/// A cross-reference target (`#name`) produced by a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: SmolStr,
    pub text: String,
}

/// A bibliography entry (`@name`) found in a `.bib` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub name: SmolStr,
    pub title: String,
}

#[derive(Deserialize)]
struct RawLabel {
    name: String,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

/// Parse the renderer's label output: one JSON object per line.
///
/// Footnote labels (`fn-`) are dropped, as are labels shadowed by a citation
/// of the same name. Malformed lines are skipped. The result is sorted
/// case-insensitively by name.
pub fn parse_labels(labels_txt: &str) -> Vec<Label> {
    let mut labels = BTreeMap::new();
    let mut cites = BTreeSet::new();
    for line in labels_txt.lines().filter(|l| !l.trim().is_empty()) {
        let raw: RawLabel = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed label line");
                continue;
            }
        };
        if raw.name.starts_with("fn-") {
            continue;
        }
        if let Some(cite) = raw.name.strip_prefix('@') {
            cites.insert(cite.to_string());
            continue;
        }
        let text = raw.caption.filter(|c| !c.is_empty()).or(raw.text).unwrap_or_default();
        labels.insert(raw.name, text);
    }

    let mut out: Vec<Label> = labels
        .into_iter()
        .filter(|(name, _)| !cites.contains(name))
        .map(|(name, text)| Label {
            name: name.into(),
            text,
        })
        .collect();
    out.sort_by_key(|l| l.name.to_lowercase());
    out
}

static BIB_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*@(\w+)\s*\{\s*([\w:;\-.]+)\s*,").expect("valid bib entry regex")
});

static BIB_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:^|,)\s*title\s*=\s*").expect("valid bib title regex"));

/// Extract `(name, title)` pairs from bibtex source. Entries without a title
/// use their name.
pub fn parse_bib(bib: &str) -> Vec<Citation> {
    let headers: Vec<_> = BIB_ENTRY.captures_iter(bib).collect();
    headers
        .iter()
        .enumerate()
        .map(|(i, cap)| {
            let whole = cap.get(0).map_or(0..0, |m| m.range());
            let body_end = headers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(bib.len(), |m| m.start());
            let body = &bib[whole.end..body_end];
            let name = SmolStr::new(&cap[2]);
            let title = bib_title(body).unwrap_or_else(|| name.to_string());
            Citation { name, title }
        })
        .collect()
}

fn bib_title(body: &str) -> Option<String> {
    let m = BIB_TITLE.find(body)?;
    let rest = &body[m.end()..];
    let mut chars = rest.char_indices();
    let (_, open) = chars.next()?;
    match open {
        '{' => {
            let mut depth = 1;
            let mut escaped = false;
            for (i, c) in chars {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(rest[1..i].to_string());
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        '"' => {
            let mut escaped = false;
            for (i, c) in chars {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => return Some(rest[1..i].to_string()),
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

/// Citations collected per `.bib` file.
#[derive(Debug, Clone, Default)]
pub struct CitationIndex {
    by_file: BTreeMap<SmolStr, Vec<Citation>>,
}

impl CitationIndex {
    /// Re-parse one bibliography file.
    pub fn update(&mut self, path: impl Into<SmolStr>, bib: &str) {
        self.by_file.insert(path.into(), parse_bib(bib));
    }

    pub fn clear(&mut self) {
        self.by_file.clear();
    }

    /// All citations, sorted case-insensitively by name.
    pub fn all(&self) -> Vec<&Citation> {
        let mut all: Vec<&Citation> = self.by_file.values().flatten().collect();
        all.sort_by_key(|c| c.name.to_lowercase());
        all
    }
}

pub fn is_bib_file(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("bib"))
}

//! Core document and file types shared by the preview pipeline and sync layer.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The document currently being previewed.
///
/// `text` is the single source fed to both render stages. `html0` holds the
/// last rendered output so the view differ has something to compare against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub name: SmolStr,
    pub text: String,
    pub html0: Option<String>,
}

impl Document {
    pub fn new(name: impl Into<SmolStr>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            html0: None,
        }
    }

    /// File stem used for exported artifacts (`doc/intro.mdk` -> `intro`).
    pub fn stem(&self) -> &str {
        let base = self.name.rsplit('/').next().unwrap_or(&self.name);
        match base.rfind('.') {
            Some(0) | None => base,
            Some(dot) => &base[..dot],
        }
    }
}

/// 1-based caret position in an editor buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self { line: 1, column: 1 }
    }
}

/// Content encoding of a stored file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    Base64,
}

/// A file as held by the storage layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub path: SmolStr,
    pub content: String,
    /// Local content differs from the last synced remote revision.
    pub modified: bool,
    /// Opaque remote revision marker, `None` for never-synced files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<SmolStr>,
    pub mime: SmolStr,
    #[serde(default)]
    pub encoding: Encoding,
}

impl FileInfo {
    pub fn text(path: impl Into<SmolStr>, content: impl Into<String>) -> Self {
        let path = path.into();
        let mime = mime_for(&path);
        Self {
            path,
            content: content.into(),
            modified: false,
            revision: None,
            mime,
            encoding: Encoding::Utf8,
        }
    }

    pub fn line_count(&self) -> usize {
        line_count(&self.content)
    }
}

/// Guess a mime type from the file extension.
pub fn mime_for(path: &str) -> SmolStr {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
    let mime = match ext.to_ascii_lowercase().as_str() {
        "mdk" | "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "bib" => "text/x-bibtex",
        "tex" | "sty" => "text/x-tex",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        _ => "text/plain",
    };
    SmolStr::new_static(mime)
}

/// Number of lines in `text`; an empty text has one (empty) line.
pub fn line_count(text: &str) -> usize {
    text.split('\n').count()
}

/// What an automatic merge did to a block of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeKind {
    Insertion,
    Deletion,
    Modification,
    Conflict,
}

impl MergeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insertion => "insertion",
            Self::Deletion => "deletion",
            Self::Modification => "modification",
            Self::Conflict => "conflict",
        }
    }
}

/// One automatically merged block, in 1-based line coordinates of the merged text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub path: SmolStr,
    pub start_line: u32,
    pub end_line: u32,
    pub kind: MergeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_stem() {
        assert_eq!(Document::new("intro.mdk", "").stem(), "intro");
        assert_eq!(Document::new("papers/draft.v2.mdk", "").stem(), "draft.v2");
        assert_eq!(Document::new(".hidden", "").stem(), ".hidden");
        assert_eq!(Document::new("README", "").stem(), "README");
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("doc.mdk"), "text/markdown");
        assert_eq!(mime_for("refs.BIB"), "text/x-bibtex");
        assert_eq!(mime_for("noext"), "text/plain");
    }

    #[test]
    fn test_line_count() {
        assert_eq!(line_count(""), 1);
        assert_eq!(line_count("a\nb"), 2);
        assert_eq!(line_count("a\nb\n"), 3);
    }

    #[test]
    fn test_file_info_encoding_serde() {
        let file = FileInfo::text("a.mdk", "x");
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["encoding"], "utf-8");
        assert_eq!(json["mime"], "text/markdown");
        assert!(json.get("revision").is_none());
    }
}

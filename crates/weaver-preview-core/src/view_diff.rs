//! Incremental view diffing for rendered markup.
//!
//! When consecutive renders differ only inside a single text node, the
//! preview can patch that node in place instead of reloading the whole
//! document. [`diff_view`] detects that case conservatively: anything that
//! might touch markup structure falls back to [`ViewUpdate::Replace`], which
//! is always safe.

use crate::entities::decode_char_refs;

/// How the preview should move from the previous render to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    /// Renders are identical; nothing to do.
    Unchanged,
    /// Only one text node changed.
    Patch(TextPatch),
    /// Reload the full content.
    Replace,
}

impl ViewUpdate {
    pub fn is_patch(&self) -> bool {
        matches!(self, Self::Patch(_))
    }
}

/// A single text node replacement.
///
/// `old_raw`/`new_raw` are the markup-level spans (character references
/// intact) starting at byte `offset` of the old render. `old_text`/`new_text`
/// are the decoded text node contents a view uses to locate and rewrite the
/// node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPatch {
    pub offset: usize,
    pub old_raw: String,
    pub new_raw: String,
    pub old_text: String,
    pub new_text: String,
}

/// Compare two renders and decide between patching and a full reload.
pub fn diff_view(old: &str, new: &str) -> ViewUpdate {
    if old == new {
        return ViewUpdate::Unchanged;
    }
    if old.is_empty() || new.is_empty() {
        return ViewUpdate::Replace;
    }

    let prefix = common_prefix(old, new);
    // Old render is a prefix of the new one, or the new render shrank:
    // the change is not confined to an existing text node.
    if prefix >= old.len() || new.len() < old.len() {
        return ViewUpdate::Replace;
    }

    let suffix = common_suffix(old, new, prefix);
    let old_mid_end = old.len() - suffix;
    let new_mid_end = new.len() - suffix;

    let old_mid = &old[prefix..old_mid_end];
    let new_mid = &new[prefix..new_mid_end];
    if has_markup(old_mid) || has_markup(new_mid) {
        return ViewUpdate::Replace;
    }

    // The prefix is shared, so the left edge is the same in both renders.
    let Some(start) = expand_left(old, prefix) else {
        return ViewUpdate::Replace;
    };
    let Some(old_end) = expand_right(old, old_mid_end) else {
        return ViewUpdate::Replace;
    };
    let Some(new_end) = expand_right(new, new_mid_end) else {
        return ViewUpdate::Replace;
    };

    let old_raw = &old[start..old_end];
    let new_raw = &new[start..new_end];

    let old_text = decode_char_refs(old_raw);
    if old_text.is_empty() {
        return ViewUpdate::Replace;
    }
    // A view locates the node by its content; an earlier identical span
    // or text node would be found first and patched instead.
    if old.find(old_raw) != Some(start) || earlier_node_matches(&old[..start], &old_text) {
        return ViewUpdate::Replace;
    }

    let new_text = decode_char_refs(new_raw);
    tracing::trace!(offset = start, old_len = old_raw.len(), new_len = new_raw.len(), "text node patch");
    ViewUpdate::Patch(TextPatch {
        offset: start,
        old_raw: old_raw.to_string(),
        new_raw: new_raw.to_string(),
        old_text: old_text.into_owned(),
        new_text: new_text.into_owned(),
    })
}

/// Apply a patch produced by [`diff_view`] to the old render.
///
/// Returns `None` if the patch does not line up with `old`.
pub fn apply_patch(old: &str, patch: &TextPatch) -> Option<String> {
    let end = patch.offset.checked_add(patch.old_raw.len())?;
    if old.get(patch.offset..end)? != patch.old_raw {
        return None;
    }
    let mut out = String::with_capacity(old.len() + patch.new_raw.len() - patch.old_raw.len().min(old.len()));
    out.push_str(&old[..patch.offset]);
    out.push_str(&patch.new_raw);
    out.push_str(&old[end..]);
    Some(out)
}

/// Whether any text node in `head` decodes to `text`.
fn earlier_node_matches(head: &str, text: &str) -> bool {
    head.split('<').enumerate().any(|(i, piece)| {
        let node = if i == 0 {
            piece
        } else {
            match piece.split_once('>') {
                Some((_, node)) => node,
                None => return false,
            }
        };
        !node.is_empty() && decode_char_refs(node) == text
    })
}

fn has_markup(s: &str) -> bool {
    s.contains(['<', '>'])
}

/// Byte length of the common prefix, floored to a char boundary.
fn common_prefix(a: &str, b: &str) -> usize {
    let mut i = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    while !a.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Byte length of the common suffix that does not reach into the first
/// `prefix` bytes of either string, floored to a char boundary.
fn common_suffix(a: &str, b: &str, prefix: usize) -> usize {
    let max = (a.len() - prefix).min(b.len() - prefix);
    let mut j = a
        .bytes()
        .rev()
        .zip(b.bytes().rev())
        .take(max)
        .take_while(|(x, y)| x == y)
        .count();
    // Suffix bytes are identical, so a boundary in `a` is one in `b` too.
    while !a.is_char_boundary(a.len() - j) {
        j -= 1;
    }
    j
}

/// Walk left from `pos` to just after the nearest `>`. Meeting `<` first
/// means `pos` sits inside a tag.
fn expand_left(s: &str, pos: usize) -> Option<usize> {
    match s[..pos].rfind(['<', '>']) {
        Some(p) if s.as_bytes()[p] == b'>' => Some(p + 1),
        Some(_) => None,
        None => Some(0),
    }
}

/// Walk right from `pos` to the nearest `<`. Meeting `>` first means `pos`
/// sits inside a tag.
fn expand_right(s: &str, pos: usize) -> Option<usize> {
    match s[pos..].find(['<', '>']) {
        Some(q) if s.as_bytes()[pos + q] == b'<' => Some(pos + q),
        Some(_) => None,
        None => Some(s.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn patch(old: &str, new: &str) -> TextPatch {
        match diff_view(old, new) {
            ViewUpdate::Patch(p) => p,
            other => panic!("expected patch, got {other:?}"),
        }
    }

    #[test]
    fn test_identical_is_unchanged() {
        assert_eq!(diff_view("<p>a</p>", "<p>a</p>"), ViewUpdate::Unchanged);
        assert_eq!(diff_view("", ""), ViewUpdate::Unchanged);
    }

    #[test]
    fn test_text_node_patch() {
        let old = "<p>Hello <b>world</b></p>";
        let new = "<p>Hello <b>there</b></p>";
        let p = patch(old, new);
        assert_eq!(p.offset, 12);
        assert_eq!(p.old_raw, "world");
        assert_eq!(p.new_raw, "there");
        assert_eq!(apply_patch(old, &p).as_deref(), Some(new));
    }

    #[test]
    fn test_patch_expands_to_whole_node() {
        let old = "<p>Hello world</p><p>next</p>";
        let new = "<p>Hello there world</p><p>next</p>";
        let p = patch(old, new);
        assert_eq!(p.old_text, "Hello world");
        assert_eq!(p.new_text, "Hello there world");
        assert_eq!(apply_patch(old, &p).as_deref(), Some(new));
    }

    #[test]
    fn test_tag_change_is_replace() {
        assert_eq!(diff_view("<p>a</p>", "<div>a</div>"), ViewUpdate::Replace);
    }

    #[test]
    fn test_empty_side_is_replace() {
        assert_eq!(diff_view("", "<p>a</p>"), ViewUpdate::Replace);
        assert_eq!(diff_view("<p>a</p>", ""), ViewUpdate::Replace);
    }

    #[test]
    fn test_shrinking_is_replace() {
        assert_eq!(diff_view("<p>abc</p>", "<p>ab</p>"), ViewUpdate::Replace);
    }

    #[test]
    fn test_appended_content_is_replace() {
        assert_eq!(diff_view("<p>a</p>", "<p>a</p><p>b</p>"), ViewUpdate::Replace);
    }

    #[test]
    fn test_insert_into_empty_node_is_replace() {
        // No existing text node to rewrite.
        assert_eq!(diff_view("<p></p>", "<p>x</p>"), ViewUpdate::Replace);
    }

    #[test]
    fn test_change_inside_attribute_is_replace() {
        let old = r#"<a href="x">link</a>"#;
        let new = r#"<a href="xy">link</a>"#;
        assert_eq!(diff_view(old, new), ViewUpdate::Replace);
    }

    #[test]
    fn test_duplicate_earlier_node_is_replace() {
        let old = "<p>same</p><p>same</p>";
        let new = "<p>same</p><p>samey</p>";
        assert_eq!(diff_view(old, new), ViewUpdate::Replace);
    }

    #[test]
    fn test_earlier_node_with_same_text_is_replace() {
        // Different markup, same decoded text: the view would patch the first one.
        let old = "<p>a&amp;b</p><p>a&b</p>";
        let new = "<p>a&amp;b</p><p>a&bc</p>";
        assert_eq!(diff_view(old, new), ViewUpdate::Replace);

        let p = patch("<p>a&amp;b</p><p>x&b</p>", "<p>a&amp;b</p><p>x&bc</p>");
        assert_eq!(p.old_text, "x&b");
    }

    #[test]
    fn test_char_refs_decoded() {
        let old = "<p>caf&#233; time</p>";
        let new = "<p>caf&#233; times</p>";
        let p = patch(old, new);
        assert_eq!(p.old_text, "café time");
        assert_eq!(p.new_text, "café times");
        assert_eq!(p.old_raw, "caf&#233; time");
    }

    #[test]
    fn test_multibyte_boundaries() {
        let old = "<p>naïve</p>";
        let new = "<p>naïvety</p>";
        let p = patch(old, new);
        assert_eq!(apply_patch(old, &p).as_deref(), Some(new));

        let old = "<p>éa</p>";
        let new = "<p>èab</p>";
        let p = patch(old, new);
        assert_eq!(apply_patch(old, &p).as_deref(), Some(new));
    }

    #[test]
    fn test_apply_patch_mismatch() {
        let p = patch("<p>ab</p>", "<p>abc</p>");
        assert_eq!(apply_patch("<p>xy</p>", &p), None);
        assert_eq!(apply_patch("", &p), None);
    }

    proptest! {
        #[test]
        fn prop_patch_reproduces_new(old in "[ab<>/pé&;#]{0,24}", new in "[ab<>/pé&;#]{0,24}") {
            match diff_view(&old, &new) {
                ViewUpdate::Unchanged => prop_assert_eq!(&old, &new),
                ViewUpdate::Replace => {}
                ViewUpdate::Patch(p) => {
                    prop_assert!(!p.old_raw.contains(['<', '>']));
                    prop_assert!(!p.new_raw.contains(['<', '>']));
                    prop_assert_eq!(apply_patch(&old, &p), Some(new.clone()));
                }
            }
        }

        #[test]
        fn prop_identical_unchanged(text in "[ab<>/pé]{0,24}") {
            prop_assert_eq!(diff_view(&text, &text), ViewUpdate::Unchanged);
        }
    }
}

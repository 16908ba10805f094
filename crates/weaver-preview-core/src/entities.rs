//! Character reference decoding for rendered markup text nodes.

use std::borrow::Cow;

/// Decode numeric (`&#233;`, `&#xE9;`) and basic named character references.
///
/// Unknown or malformed references are left as-is. Borrows when the input
/// has no `&` at all.
pub fn decode_char_refs(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match decode_one(tail) {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Decode a single reference at the start of `s` (which begins with `&`).
/// Returns the character and the number of bytes consumed.
fn decode_one(s: &str) -> Option<(char, usize)> {
    // References are short; anything longer than this is not one of ours.
    let semi = s.bytes().take(12).position(|b| b == b';')?;
    let body = &s[1..semi];
    let ch = if let Some(num) = body.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        char::from_u32(code)?
    } else {
        match body {
            "amp" => '&',
            "lt" => '<',
            "gt" => '>',
            "quot" => '"',
            "apos" => '\'',
            "nbsp" => '\u{a0}',
            _ => return None,
        }
    };
    Some((ch, semi + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_borrows() {
        assert!(matches!(decode_char_refs("plain text"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_decode_numeric() {
        assert_eq!(decode_char_refs("caf&#233;"), "café");
        assert_eq!(decode_char_refs("caf&#xE9;"), "café");
        assert_eq!(decode_char_refs("&#955;x"), "λx");
    }

    #[test]
    fn test_decode_named() {
        assert_eq!(decode_char_refs("a &amp; b &lt;c&gt;"), "a & b <c>");
        assert_eq!(decode_char_refs("&quot;q&quot;"), "\"q\"");
    }

    #[test]
    fn test_decode_malformed_kept() {
        assert_eq!(decode_char_refs("AT&T"), "AT&T");
        assert_eq!(decode_char_refs("&bogus;"), "&bogus;");
        assert_eq!(decode_char_refs("&#xZZ;"), "&#xZZ;");
        assert_eq!(decode_char_refs("trailing &"), "trailing &");
    }
}

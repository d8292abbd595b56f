//! Text codec for payloads at rest
//!
//! Free-text columns are stored with `\` and `'` prefixed by the escape marker.
//! Reads undo that. Unescaping is fail-soft: a malformed sequence leaves the
//! stored string untouched instead of erroring out of the read path.

use std::borrow::Cow;
use thiserror::Error;
use tracing::debug;

/// Reserved escape marker
pub const ESCAPE_MARKER: char = '\\';

const QUOTE: char = '\'';

/// A marker followed by something other than the marker or a quote
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnexpectedEscape {
    #[error("unexpected escape character '{found}' at byte {position}")]
    Character { found: char, position: usize },
    #[error("dangling escape marker at end of input")]
    Dangling,
}

/// Escape a raw value for storage
pub fn escape(raw: &str) -> Cow<'_, str> {
    if !raw.contains([ESCAPE_MARKER, QUOTE]) {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        if c == ESCAPE_MARKER || c == QUOTE {
            out.push(ESCAPE_MARKER);
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Strict unescape. Returns the offending sequence on failure.
pub fn try_unescape(stored: &str) -> Result<Cow<'_, str>, UnexpectedEscape> {
    if !stored.contains(ESCAPE_MARKER) {
        return Ok(Cow::Borrowed(stored));
    }

    let mut out = String::with_capacity(stored.len());
    let mut chars = stored.char_indices();
    while let Some((_, c)) = chars.next() {
        if c != ESCAPE_MARKER {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some((_, next)) if next == ESCAPE_MARKER || next == QUOTE => out.push(next),
            Some((position, found)) => {
                return Err(UnexpectedEscape::Character { found, position });
            }
            None => return Err(UnexpectedEscape::Dangling),
        }
    }
    Ok(Cow::Owned(out))
}

/// Unescape a stored value, falling back to the stored text on malformed input.
///
/// Not idempotent: running it over already-unescaped text collapses literal
/// `\\` pairs.
pub fn unescape(stored: &str) -> Cow<'_, str> {
    match try_unescape(stored) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "returning stored text unmodified");
            Cow::Borrowed(stored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_plain_text_is_borrowed() {
        assert!(matches!(escape("hello world"), Cow::Borrowed(_)));
        assert!(matches!(unescape("hello world"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_escape_marker_and_quote() {
        assert_eq!(escape(r"C:\temp"), r"C:\\temp");
        assert_eq!(escape("it's"), r"it\'s");
        assert_eq!(escape(r"\'"), r"\\\'");
    }

    #[test]
    fn test_unescape_known_sequences() {
        assert_eq!(unescape(r"C:\\temp"), r"C:\temp");
        assert_eq!(unescape(r"it\'s"), "it's");
        assert_eq!(unescape(r"\\\\"), r"\\");
    }

    #[test]
    fn test_unexpected_sequence_returns_original() {
        // \n here is a literal backslash + 'n', not a newline
        let stored = r"line\nbreak";
        assert_eq!(unescape(stored), stored);
        assert_eq!(
            try_unescape(stored),
            Err(UnexpectedEscape::Character { found: 'n', position: 5 })
        );
    }

    #[test]
    fn test_dangling_marker_returns_original() {
        assert_eq!(unescape(r"trailing\"), r"trailing\");
        assert_eq!(try_unescape(r"trailing\"), Err(UnexpectedEscape::Dangling));
    }

    #[test]
    fn test_unescape_not_idempotent() {
        let once = unescape(r"a\\\\b");
        assert_eq!(once, r"a\\b");
        // A second pass collapses the literal pair
        assert_eq!(unescape(&once), r"a\b");
    }

    #[test]
    fn test_multibyte_neighbours() {
        let raw = "日本\\語'🎉";
        assert_eq!(unescape(&escape(raw)), raw);
    }

    proptest! {
        #[test]
        fn prop_escape_roundtrip(raw in ".*") {
            let escaped = escape(&raw);
            prop_assert_eq!(unescape(&escaped), raw.as_str());
        }

        #[test]
        fn prop_roundtrip_marker_heavy(raw in r"[a\\'b]{0,32}") {
            let escaped = escape(&raw);
            prop_assert_eq!(try_unescape(&escaped).unwrap(), raw.as_str());
        }
    }
}

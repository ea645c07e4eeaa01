//! Source-attribution highlighting.
//!
//! Given a document body and a cited character range, renders the escaped
//! text with the `[start, end)` slice wrapped in a highlight marker. Offsets
//! are interpreted against the raw body and each segment is escaped
//! separately, so provenance offsets stay exact even when the body contains
//! markup-significant characters.

use crate::chunk::slice_span;
use crate::error::{Error, Result};
use crate::models::Span;

/// Render `body` as escaped text with `[start, end)` wrapped in
/// `<highlight>…</highlight>`.
///
/// # Errors
///
/// `Error::InvalidRange` when `end > chars(body)` or `start > end`.
pub fn render_highlight(body: &str, start: usize, end: usize) -> Result<String> {
    let len = body.chars().count();
    if end > len || start > end {
        return Err(Error::InvalidRange { start, end, len });
    }

    let before = slice_span(body, Span::new(0, start));
    let marked = slice_span(body, Span::new(start, end));
    let after = slice_span(body, Span::new(end, len));

    Ok(format!(
        "{}<highlight>{}</highlight>{}",
        escape(before),
        escape(marked),
        escape(after)
    ))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_the_cited_slice() {
        let out = render_highlight("abcdef", 2, 4).unwrap();
        assert_eq!(out, "ab<highlight>cd</highlight>ef");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = render_highlight("abcdef", 5, 2).unwrap_err();
        assert!(matches!(err, Error::InvalidRange { start: 5, end: 2, .. }));
    }

    #[test]
    fn range_past_the_end_is_rejected() {
        assert!(render_highlight("abc", 0, 4).is_err());
    }

    #[test]
    fn full_and_empty_ranges_are_valid() {
        assert_eq!(
            render_highlight("abc", 0, 3).unwrap(),
            "<highlight>abc</highlight>"
        );
        assert_eq!(render_highlight("abc", 1, 1).unwrap(), "a<highlight></highlight>bc");
    }

    #[test]
    fn segments_are_escaped_independently() {
        let out = render_highlight("a<b>&c", 1, 4).unwrap();
        assert_eq!(out, "a<highlight>&lt;b&gt;</highlight>&amp;c");
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let out = render_highlight("héllo", 1, 2).unwrap();
        assert_eq!(out, "h<highlight>é</highlight>llo");
    }
}

//! Sliding-window text chunker with exact character-offset provenance.
//!
//! Splits document body text into overlapping [`Span`]s. Consecutive windows
//! advance by `chunk_size - overlap` characters and extend `chunk_size +
//! overlap` characters: each window reads ahead by one overlap past its
//! chunk boundary instead of only re-covering the previous window. Downstream
//! ranking relies on this read-ahead to surface boundary fragments from
//! either neighboring snippet.
//!
//! Offsets are character counts, never bytes; [`slice_span`] maps them back
//! onto the source text.

use crate::error::{Error, Result};
use crate::models::Span;

/// Split `text` into ordered, clamped spans covering `[0, chars(text))`.
///
/// Windows start at multiples of `chunk_size - overlap`. Production stops
/// once a window reaches the end of the text, so texts no longer than
/// `chunk_size` yield exactly one full-text span. Pure and deterministic.
///
/// # Errors
///
/// `Error::Validation` when `chunk_size == 0` or `overlap >= chunk_size`.
pub fn chunk_spans(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Span>> {
    if chunk_size == 0 {
        return Err(Error::Validation("chunk_size must be > 0".into()));
    }
    if overlap >= chunk_size {
        return Err(Error::Validation(format!(
            "overlap {overlap} must be < chunk_size {chunk_size}"
        )));
    }

    let len = text.chars().count();
    if len == 0 {
        return Ok(vec![Span::new(0, 0)]);
    }

    let advance = chunk_size - overlap;
    let window = chunk_size + overlap;

    let mut spans = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window).min(len);
        spans.push(Span::new(start, end));
        if end >= len {
            break;
        }
        start += advance;
        if start >= len {
            break;
        }
    }

    Ok(spans)
}

/// Slice `text` by a character-offset span, clamped to the text length.
pub fn slice_span(text: &str, span: Span) -> &str {
    let byte_start = char_to_byte(text, span.start);
    let byte_end = char_to_byte(text, span.end);
    &text[byte_start..byte_end]
}

fn char_to_byte(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(b, _)| b)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_single_full_span() {
        let spans = chunk_spans("Hello, world!", 1000, 200).unwrap();
        assert_eq!(spans, vec![Span::new(0, 13)]);
    }

    #[test]
    fn empty_text_single_empty_span() {
        let spans = chunk_spans("", 1000, 200).unwrap();
        assert_eq!(spans, vec![Span::new(0, 0)]);
    }

    #[test]
    fn advance_and_window_match_policy() {
        // chunk_size=1000, overlap=200 over 2400 chars: starts 0, 800, 1600
        // with window 1200 clamped to the text length.
        let text = "x".repeat(2400);
        let spans = chunk_spans(&text, 1000, 200).unwrap();
        assert_eq!(
            spans,
            vec![Span::new(0, 1200), Span::new(800, 2000), Span::new(1600, 2400)]
        );
    }

    #[test]
    fn stops_once_a_window_reaches_the_end() {
        let text = "The quick brown fox. The fox jumps.";
        assert_eq!(text.chars().count(), 35);
        let spans = chunk_spans(text, 20, 4).unwrap();
        assert_eq!(spans, vec![Span::new(0, 24), Span::new(16, 35)]);
    }

    #[test]
    fn spans_cover_text_without_gaps() {
        for len in [1usize, 5, 99, 100, 101, 250, 1000] {
            let text = "a".repeat(len);
            let spans = chunk_spans(&text, 100, 20).unwrap();
            assert_eq!(spans[0].start, 0);
            assert_eq!(spans.last().unwrap().end, len);
            for pair in spans.windows(2) {
                assert!(
                    pair[1].start <= pair[0].end,
                    "gap between {:?} and {:?} at len {}",
                    pair[0],
                    pair[1],
                    len
                );
            }
        }
    }

    #[test]
    fn zero_overlap_produces_contiguous_windows() {
        let text = "b".repeat(30);
        let spans = chunk_spans(&text, 10, 0).unwrap();
        assert_eq!(
            spans,
            vec![Span::new(0, 10), Span::new(10, 20), Span::new(20, 30)]
        );
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(chunk_spans("abc", 0, 0).is_err());
        assert!(chunk_spans("abc", 10, 10).is_err());
        assert!(chunk_spans("abc", 10, 12).is_err());
    }

    #[test]
    fn slice_span_counts_characters_not_bytes() {
        let text = "héllo wörld";
        let spans = chunk_spans(text, 6, 2).unwrap();
        assert_eq!(slice_span(text, spans[0]), "héllo wö");
        assert_eq!(slice_span(text, Span::new(1, 2)), "é");
    }

    #[test]
    fn deterministic() {
        let text = "Alpha beta gamma delta epsilon".repeat(40);
        let a = chunk_spans(&text, 50, 10).unwrap();
        let b = chunk_spans(&text, 50, 10).unwrap();
        assert_eq!(a, b);
    }
}

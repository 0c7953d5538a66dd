//! Splits text around matched search terms into typed [`Segment`]s and
//! renders them. Matching and rendering are separate steps: [`Highlighter`]
//! only produces segments, and [`to_html`] / [`to_terminal`] only consume
//! them.

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::value::escape;

/// A piece of displayed text. Concatenating the text of all segments
/// produced by [`Highlighter::split`] yields the input exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment<'t> {
    Plain(&'t str),
    Highlighted(&'t str),
}

impl<'t> Segment<'t> {
    pub fn text(&self) -> &'t str {
        match self {
            Segment::Plain(text) | Segment::Highlighted(text) => text,
        }
    }

    pub fn is_highlighted(&self) -> bool {
        matches!(self, Segment::Highlighted(_))
    }
}

/// A case-insensitive alternation of search terms.
#[derive(Debug)]
pub struct Highlighter {
    pattern: Regex,
}

impl Highlighter {
    /// Builds a highlighter for `terms`. Longer terms are tried first so
    /// that `graphs` wins over `graph`. Returns `None` when there is nothing
    /// to highlight.
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Option<Highlighter> {
        let mut terms: Vec<&str> = terms
            .iter()
            .map(AsRef::as_ref)
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return None;
        }
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        terms.dedup();

        let alternation = terms
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");
        match RegexBuilder::new(&alternation).case_insensitive(true).build() {
            Ok(pattern) => Some(Highlighter { pattern }),
            Err(e) => {
                warn!(error = %e, "cannot build highlight pattern");
                None
            }
        }
    }

    /// Splits `text` on the pattern, keeping the matched pieces.
    pub fn split<'t>(&self, text: &'t str) -> Vec<Segment<'t>> {
        let mut out = Vec::new();
        let mut last = 0;
        for m in self.pattern.find_iter(text) {
            if m.start() > last {
                out.push(Segment::Plain(&text[last..m.start()]));
            }
            out.push(Segment::Highlighted(m.as_str()));
            last = m.end();
        }
        if last < text.len() {
            out.push(Segment::Plain(&text[last..]));
        }
        out
    }

    /// Splits a window of roughly `width` bytes of `text` centred on the
    /// first match (or the start of the text when nothing matches). The
    /// window never cuts a character in half.
    pub fn snippet<'t>(&self, text: &'t str, width: usize) -> Vec<Segment<'t>> {
        self.split(window(text, self.pattern.find(text).map(|m| m.start()), width))
    }
}

/// Splits `text` with `highlighter`, or returns it as a single plain
/// segment when there's no highlighter.
pub fn split<'t>(highlighter: Option<&Highlighter>, text: &'t str) -> Vec<Segment<'t>> {
    match highlighter {
        Some(h) => h.split(text),
        None if text.is_empty() => Vec::new(),
        None => vec![Segment::Plain(text)],
    }
}

fn window(text: &str, anchor: Option<usize>, width: usize) -> &str {
    if text.len() <= width {
        return text;
    }
    let mut start = anchor.map_or(0, |a| a.saturating_sub(width / 4));
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (start + width).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}

/// Concatenates segment text.
pub fn join(segments: &[Segment]) -> String {
    segments.iter().map(Segment::text).collect()
}

/// Renders segments as HTML, wrapping highlighted ones in `<mark>`. Text is
/// HTML-escaped.
pub fn to_html(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Plain(text) => out.push_str(&escape(text)),
            Segment::Highlighted(text) => {
                out.push_str("<mark>");
                out.push_str(&escape(text));
                out.push_str("</mark>");
            }
        }
    }
    out
}

const BOLD: &str = "\x1b[1;33m";
const RESET: &str = "\x1b[0m";

/// Renders segments for a terminal, highlighting with ANSI bold yellow.
pub fn to_terminal(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Plain(text) => out.push_str(text),
            Segment::Highlighted(text) => {
                out.push_str(BOLD);
                out.push_str(text);
                out.push_str(RESET);
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split() {
        let h = Highlighter::new(&["graph", "graphs"]).unwrap();
        assert_eq!(
            h.split("Graphs and graph theory, GRAPH"),
            vec![
                Segment::Highlighted("Graphs"),
                Segment::Plain(" and "),
                Segment::Highlighted("graph"),
                Segment::Plain(" theory, "),
                Segment::Highlighted("GRAPH"),
            ]
        );
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let h = Highlighter::new(&["c++", "a.b"]).unwrap();
        assert_eq!(
            h.split("c++ axb a.b"),
            vec![
                Segment::Highlighted("c++"),
                Segment::Plain(" axb "),
                Segment::Highlighted("a.b"),
            ]
        );
    }

    #[test]
    fn test_no_terms() {
        assert!(Highlighter::new::<&str>(&[]).is_none());
        assert!(Highlighter::new(&[""]).is_none());
        assert_eq!(split(None, "text"), vec![Segment::Plain("text")]);
    }

    #[test]
    fn test_to_html_escapes() {
        let h = Highlighter::new(&["b"]).unwrap();
        assert_eq!(to_html(&h.split("<a&b>")), "&lt;a&amp;<mark>b</mark>&gt;");
    }

    #[test]
    fn test_snippet() {
        let text = format!("{}needle{}", "ä".repeat(100), "z".repeat(100));
        let h = Highlighter::new(&["needle"]).unwrap();
        let snippet = h.snippet(&text, 40);
        assert!(snippet.contains(&Segment::Highlighted("needle")));
        assert!(join(&snippet).len() <= 42);

        let short = h.snippet("a needle", 40);
        assert_eq!(join(&short), "a needle");
    }

    proptest! {
        #[test]
        fn split_round_trips(text in "\\PC{0,80}", terms in proptest::collection::vec("\\PC{1,4}", 1..4)) {
            let h = Highlighter::new(&terms).unwrap();
            let segments = h.split(&text);
            prop_assert_eq!(join(&segments), text.clone());
            prop_assert!(segments.iter().all(|s| !s.text().is_empty()));
        }

        #[test]
        fn snippet_is_a_substring(text in "\\PC{0,200}", term in "[a-z]{1,3}", width in 1usize..60) {
            let h = Highlighter::new(&[term]).unwrap();
            let snippet = join(&h.snippet(&text, width));
            prop_assert!(text.contains(&snippet));
        }
    }
}

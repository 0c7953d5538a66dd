//! Resolves `[[...]]` link targets to notes and rewrites markdown sources so
//! that embeds (`![[image.png]]`) become media markup and crosslinks
//! (`[[Page#anchor|text]]`) become anchors.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;
use tracing::{error, warn};

use crate::page::{canonical_path, sanitize_anchor, strip_fancy_name};
use crate::source::Note;

/// Looks notes up by the ways a note can be linked:
///
/// * pages by canonical title (`[[duckdb]]` finds `Duckdb.md` anywhere),
/// * pages by title path (`[[Data Analytics/Duckdb]]`),
/// * attachments by file name or by link path, verbatim.
///
/// When several notes match, the first one in scan order wins.
pub struct Resolver<'a> {
    notes: &'a [Note],
    by_title: HashMap<&'a str, usize>,
    by_title_path: HashMap<&'a str, usize>,
    attachments: HashMap<&'a str, usize>,
}

impl<'a> Resolver<'a> {
    pub fn new(notes: &'a [Note]) -> Resolver<'a> {
        let mut by_title = HashMap::new();
        let mut by_title_path = HashMap::new();
        let mut attachments = HashMap::new();
        for (i, note) in notes.iter().enumerate() {
            if note.is_page() {
                by_title.entry(note.canon_title.as_str()).or_insert(i);
                by_title_path.entry(note.title_path.as_str()).or_insert(i);
            } else {
                attachments.entry(note.file_name.as_str()).or_insert(i);
                attachments.entry(note.link_path.as_str()).or_insert(i);
            }
        }
        Resolver {
            notes,
            by_title,
            by_title_path,
            attachments,
        }
    }

    /// Finds the note referred to by `link`.
    pub fn find(&self, link: &str) -> Option<&'a Note> {
        self.find_page(link).or_else(|| {
            self.attachments
                .get(link)
                .map(|&i| &self.notes[i])
        })
    }

    /// Like [`Resolver::find`] but only considers pages.
    pub fn find_page(&self, link: &str) -> Option<&'a Note> {
        let canonical = canonical_path(link);
        let by_title = self.by_title.get(canonical.as_str());
        let by_path = self.by_title_path.get(canonical.as_str());
        match (by_title, by_path) {
            (Some(&a), Some(&b)) => Some(&self.notes[a.min(b)]),
            (Some(&i), None) | (None, Some(&i)) => Some(&self.notes[i]),
            (None, None) => None,
        }
    }

    /// Replaces every `![[file]]` with markup for the embedded file. Embeds
    /// that don't resolve are removed.
    pub fn substitute_embeds(&self, markdown: &str) -> String {
        EMBED_RE
            .replace_all(markdown, |caps: &Captures| {
                let target = caps.get(1).map_or("", |m| m.as_str());
                let target = strip_fancy_name(target).trim();
                match self.find(target) {
                    Some(note) => embed_markup(target, &note.link_path),
                    None => {
                        error!(link = target, "unable to find attachment");
                        String::new()
                    }
                }
            })
            .into_owned()
    }

    /// Replaces every `[[Page]]`, `[[Page|text]]`, `[[Page#anchor]]` with an
    /// HTML anchor. Unresolved crosslinks are left untouched; plenty of
    /// notes contain `[[` without meaning a link.
    pub fn substitute_crosslinks(&self, markdown: &str) -> String {
        CROSSLINK_RE
            .replace_all(markdown, |caps: &Captures| {
                let whole = caps.get(0).map_or("", |m| m.as_str());
                let raw = caps.get(1).map_or("", |m| m.as_str());
                let (target, nice_title) = match raw.split_once('|') {
                    Some((target, nice)) => (target, Some(nice)),
                    None => (raw, None),
                };
                let (title, anchor) = match target.split_once('#') {
                    Some((title, anchor)) => (title, Some(anchor)),
                    None => (target, None),
                };

                let page = match self.find_page(title.trim()) {
                    Some(page) => page,
                    None => {
                        warn!(link = title, "unable to find page");
                        return whole.to_owned();
                    }
                };
                let anchor = match anchor {
                    Some(anchor) => format!("#{}", sanitize_anchor(anchor)),
                    None => String::new(),
                };
                format!(
                    r#"<a href="/{}{}">{}</a>"#,
                    page.link_path,
                    anchor,
                    nice_title.unwrap_or(title)
                )
            })
            .into_owned()
    }
}

static EMBED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[\[(.*?)\]\]").unwrap());
static CROSSLINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[(.*?)\]\]").unwrap());

/// Picks markup by extension; anything not recognized is assumed to be an
/// image.
fn embed_markup(file_name: &str, link_path: &str) -> String {
    let video = |mime: &str| {
        format!(
            r#"<video controls><source src="/{0}" type="{1}" /><a href="/{0}">download</a></video>"#,
            link_path, mime
        )
    };
    let lower = file_name.to_lowercase();
    if lower.ends_with(".pdf") {
        format!(
            r#"<iframe src="/{}" width="800" height="1200"></iframe>"#,
            link_path
        )
    } else if lower.ends_with(".mov") {
        video("video/quicktime")
    } else if lower.ends_with(".mp4") {
        video("video/mp4")
    } else if lower.ends_with(".webm") {
        video("video/webm")
    } else {
        format!(
            r#"<a href="/{0}"><img src="/{0}" style="max-width: 800px"></a>"#,
            link_path
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::note;

    fn notes() -> Vec<Note> {
        vec![
            note("Data_Analytics", "Duckdb.md", true),
            note("", "duckdb.md", true),
            note("images", "chart 1.png", false),
            note("", "paper.pdf", false),
        ]
    }

    #[test]
    fn test_find() {
        let notes = notes();
        let resolver = Resolver::new(&notes);
        assert_eq!(
            resolver.find("Duckdb").map(|n| n.link_path.as_str()),
            Some("Data_Analytics/Duckdb.html")
        );
        assert_eq!(
            resolver.find("/duckdb").map(|n| n.link_path.as_str()),
            Some("Data_Analytics/Duckdb.html")
        );
        assert_eq!(
            resolver.find("Data Analytics/DUCKDB").map(|n| n.link_path.as_str()),
            Some("Data_Analytics/Duckdb.html")
        );
        assert_eq!(
            resolver.find("chart 1.png").map(|n| n.link_path.as_str()),
            Some("images/chart 1.png")
        );
        assert_eq!(
            resolver.find("images/chart 1.png").map(|n| n.link_path.as_str()),
            Some("images/chart 1.png")
        );
        assert!(resolver.find("Missing").is_none());
        assert!(resolver.find_page("chart 1.png").is_none());
    }

    #[test]
    fn test_substitute_crosslinks() {
        let notes = notes();
        let resolver = Resolver::new(&notes);
        assert_eq!(
            resolver.substitute_crosslinks("see [[Duckdb#Day 2|the db]] or [[nope]]"),
            r#"see <a href="/Data_Analytics/Duckdb.html#day-2">the db</a> or [[nope]]"#
        );
        assert_eq!(
            resolver.substitute_crosslinks("[[duckdb]]"),
            r#"<a href="/Data_Analytics/Duckdb.html">duckdb</a>"#
        );
    }

    #[test]
    fn test_substitute_embeds() {
        let notes = notes();
        let resolver = Resolver::new(&notes);
        assert_eq!(
            resolver.substitute_embeds("![[chart 1.png]]"),
            r#"<a href="/images/chart 1.png"><img src="/images/chart 1.png" style="max-width: 800px"></a>"#
        );
        assert_eq!(
            resolver.substitute_embeds("![[paper.pdf]]"),
            r#"<iframe src="/paper.pdf" width="800" height="1200"></iframe>"#
        );
        assert_eq!(resolver.substitute_embeds("a ![[gone.png]] b"), "a  b");
    }
}

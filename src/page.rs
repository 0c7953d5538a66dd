//! Defines [`PageRecord`], the normalized form of a single vault file, and the
//! naming rules which turn vault paths into output link paths. A record is
//! built once per source file (see [`PageRecord::from_note`]) and is never
//! mutated afterwards; the backlink index ([`crate::backlinks`]), the
//! directory tree ([`crate::tree`]), and the search payload
//! ([`crate::payload`]) are all derived from a slice of records.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

use crate::markdown;
use crate::resolve::Resolver;
use crate::source::{Note, NoteKind};

/// The markdown extension for page source files.
pub const MARKDOWN_EXTENSION: &str = ".md";

/// The extension for rendered page files.
pub const HTML_EXTENSION: &str = ".html";

/// A normalized page or attachment.
#[derive(Clone, Debug)]
pub struct PageRecord {
    /// The title as the author cased it (the file stem).
    pub title: String,

    /// The lower-cased title, used for link resolution.
    pub canon_title: String,

    /// The sanitized directory of the source file relative to the vault
    /// root, e.g. `Data_Analytics`. Empty for files at the vault root.
    pub relpath: String,

    /// The path of the source file relative to the vault root, unsanitized.
    pub source: PathBuf,

    /// The absolute path of the source file.
    pub full_path: PathBuf,

    /// `relpath` joined with `canon_title`, e.g. `visualization/bar charts`.
    pub title_path: String,

    /// The output path relative to the site root, e.g.
    /// `visualization/bar_charts.html`. This is the record's identity.
    pub link_path: String,

    /// The rendered HTML. Empty for attachments.
    pub contents: String,

    /// A plain-text projection of the page used for search. Empty for
    /// attachments.
    pub text: String,

    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,

    /// True for non-page assets (images, PDFs, ...).
    pub attachment: bool,

    /// Link paths of the records this page references, in order of first
    /// appearance.
    pub references: Vec<String>,

    /// Reference targets which did not resolve to any record.
    pub dangling: Vec<String>,
}

impl PageRecord {
    /// Builds a record from a scanned [`Note`]. For pages, embeds and
    /// crosslinks are substituted via `resolver` before the markdown is
    /// rendered, and every `[[...]]` target is resolved into
    /// [`PageRecord::references`] or [`PageRecord::dangling`].
    pub fn from_note(note: &Note, resolver: &Resolver) -> PageRecord {
        let mut record = PageRecord {
            title: note.title.clone(),
            canon_title: note.canon_title.clone(),
            relpath: note.relpath.clone(),
            source: note.source.clone(),
            full_path: note.full_path.clone(),
            title_path: note.title_path.clone(),
            link_path: note.link_path.clone(),
            contents: String::new(),
            text: String::new(),
            created: note.created,
            updated: note.updated,
            attachment: true,
            references: Vec::new(),
            dangling: Vec::new(),
        };

        if let NoteKind::Page { markdown: source } = &note.kind {
            record.attachment = false;
            for link in find_links(source) {
                match resolver.find(&link) {
                    Some(target) => {
                        if !record.references.contains(&target.link_path) {
                            record.references.push(target.link_path.clone());
                        }
                    }
                    None => {
                        if !record.dangling.contains(&link) {
                            record.dangling.push(link);
                        }
                    }
                }
            }

            let source = resolver.substitute_embeds(source);
            let source = resolver.substitute_crosslinks(&source);
            record.contents = markdown::to_html(&source);
            record.text = markdown::to_text(&source);
        }

        record
    }
}

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-\._~]").unwrap());
static PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-\._~\\/]").unwrap());
static ANCHOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]").unwrap());
static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[(.*?)\]\]").unwrap());

/// Turns a markdown file name into an HTML file name, e.g. `Bar Charts.md`
/// becomes `Bar_Charts.html`.
pub fn outname(file_name: &str) -> String {
    let clean = WORD_RE.replace_all(file_name, "_");
    match clean.strip_suffix(MARKDOWN_EXTENSION) {
        Some(stem) => format!("{}{}", stem, HTML_EXTENSION),
        None => clean.into_owned(),
    }
}

/// Sanitizes a relative directory path. Slashes are kept.
pub fn pathname(dir: &str) -> String {
    PATH_RE.replace_all(dir, "_").into_owned()
}

/// Returns the canonical form of a title.
pub fn canonicalize(title: &str) -> String {
    title.to_lowercase()
}

/// Returns the canonical form of a link written as a relative path. For
/// example `Data Analytics/Duckdb` becomes `Data_Analytics/duckdb`, which
/// matches the [`PageRecord::title_path`] of that page.
pub fn canonical_path(relative_path: &str) -> String {
    match relative_path.rsplit_once('/') {
        Some((dir, page)) if !dir.is_empty() => {
            format!("{}/{}", pathname(dir), canonicalize(page))
        }
        Some((_, page)) => canonicalize(page),
        None => canonicalize(relative_path),
    }
}

/// Joins a sanitized directory and a name, omitting the separator for the
/// vault root.
pub fn join(relpath: &str, name: &str) -> String {
    if relpath.is_empty() {
        name.to_owned()
    } else {
        format!("{}/{}", relpath, name)
    }
}

/// Converts heading text into an anchor id: trailing whitespace is trimmed,
/// every non-word character becomes `-`, and the result is lower-cased.
pub fn sanitize_anchor(s: &str) -> String {
    ANCHOR_RE.replace_all(s.trim_end(), "-").to_lowercase()
}

/// Strips display text (`[[Page|text]]`) and anchors (`[[Page#anchor]]`)
/// from a link target.
pub fn strip_fancy_name(link: &str) -> &str {
    let link = link.split('|').next().unwrap_or(link);
    link.split('#').next().unwrap_or(link)
}

/// Finds the targets of all `[[...]]` links in a markdown document,
/// including embeds (`![[...]]`).
pub fn find_links(markdown: &str) -> Vec<String> {
    // TODO: skip links inside fenced code blocks; `df[["a", "b"]]` in a
    // pandas snippet is reported as a dangling link today.
    LINK_RE
        .captures_iter(markdown)
        .filter_map(|cap| cap.get(1))
        .map(|m| strip_fancy_name(m.as_str()).trim().to_owned())
        .filter(|link| !link.is_empty())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_outname() {
        assert_eq!(outname("Bar Charts.md"), "Bar_Charts.html");
        assert_eq!(outname("c++ (notes).md"), "c____notes_.html");
        assert_eq!(outname("already_clean.md"), "already_clean.html");
    }

    #[test]
    fn test_pathname_keeps_slashes() {
        assert_eq!(pathname("Data Analytics/sub dir"), "Data_Analytics/sub_dir");
    }

    #[test]
    fn test_canonical_path() {
        assert_eq!(canonical_path("Data Analytics/Duckdb"), "Data_Analytics/duckdb");
        assert_eq!(canonical_path("Duckdb"), "duckdb");
        assert_eq!(canonical_path("/Duckdb"), "duckdb");
    }

    #[test]
    fn test_sanitize_anchor() {
        assert_eq!(sanitize_anchor("Day 2  "), "day-2");
        assert_eq!(sanitize_anchor("What's new?"), "what-s-new-");
    }

    #[test]
    fn test_find_links() {
        let md = "See [[Graph Theory]], [[trees#Binary|binary trees]] and ![[img.png]]. [[ ]]";
        assert_eq!(find_links(md), vec!["Graph Theory", "trees", "img.png"]);
    }

    #[test]
    fn test_strip_fancy_name() {
        assert_eq!(strip_fancy_name("Page#Anchor|Text"), "Page");
        assert_eq!(strip_fancy_name("Page|Text#x"), "Page");
        assert_eq!(strip_fancy_name("Page"), "Page");
    }
}

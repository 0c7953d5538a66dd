//! Builds the directory tree from a flat slice of [`PageRecord`]s and renders
//! it as nested list markup. Each link path is split into segments; every
//! segment but the last names a directory and the last one names the page.
//! Directories are annotated with the backlinks their pages receive from
//! outside the directory (see [`BacklinkIndex::for_directory`]).

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Component;

use crate::backlinks::{Backlink, BacklinkIndex};
use crate::page::PageRecord;
use crate::value::escape;

/// A tree node: either a directory or a leaf page. Attachments are kept as
/// leaves so that lookups see them; rendering skips them.
#[derive(Debug)]
pub enum Node<'a> {
    Directory(Directory<'a>),
    Page(&'a PageRecord),
}

impl<'a> Node<'a> {
    /// The node's path segment.
    pub fn segment(&self) -> &str {
        match self {
            Node::Directory(dir) => &dir.name,
            Node::Page(page) => last_segment(&page.link_path),
        }
    }

    /// Reports whether the node should appear in listings: pages that
    /// aren't attachments, and directories containing at least one.
    pub fn is_listed(&self) -> bool {
        match self {
            Node::Directory(dir) => dir.has_listed_pages(),
            Node::Page(page) => !page.attachment,
        }
    }
}

#[derive(Debug)]
pub struct Directory<'a> {
    /// The path segment, e.g. `Data_Analytics`. Empty for the root.
    pub name: String,

    /// The name for display, taken from the unsanitized source directory
    /// when available, e.g. `Data Analytics`.
    pub title: String,

    /// The full directory path, e.g. `notes/Data_Analytics`. Empty for the
    /// root.
    pub path: String,

    /// Children ordered by lower-cased segment, ties broken by segment.
    pub children: Vec<Node<'a>>,

    /// Backlinks to pages in this subtree from pages outside of it.
    pub backlinks: Vec<Backlink>,
}

impl<'a> Directory<'a> {
    /// Returns every record in the subtree in tree order.
    pub fn pages(&self) -> Vec<&'a PageRecord> {
        let mut out = Vec::new();
        self.collect_pages(&mut out);
        out
    }

    fn collect_pages(&self, out: &mut Vec<&'a PageRecord>) {
        for child in &self.children {
            match child {
                Node::Directory(dir) => dir.collect_pages(out),
                Node::Page(page) => out.push(page),
            }
        }
    }

    /// Returns this directory and every directory below it, parents first.
    pub fn directories(&self) -> Vec<&Directory<'a>> {
        let mut out = vec![self];
        for child in &self.children {
            if let Node::Directory(dir) = child {
                out.extend(dir.directories());
            }
        }
        out
    }

    /// Follows `link_path` segment by segment from this directory.
    pub fn find(&self, link_path: &str) -> Option<&Node<'a>> {
        let mut segments = link_path.split('/').peekable();
        let mut dir = self;
        while let Some(segment) = segments.next() {
            let child = dir.children.iter().find(|c| c.segment() == segment)?;
            match (child, segments.peek()) {
                (_, None) => return Some(child),
                (Node::Directory(next), Some(_)) => dir = next,
                (Node::Page(_), Some(_)) => return None,
            }
        }
        None
    }

    /// The directories below this one on the way to the directory at
    /// `path`, outermost first. Stops at the first segment that isn't a
    /// directory.
    pub fn trail(&self, path: &str) -> Vec<&Directory<'a>> {
        let mut out = Vec::new();
        let mut dir = self;
        for segment in path.split('/') {
            match dir.children.iter().find(|c| c.segment() == segment) {
                Some(Node::Directory(next)) => {
                    out.push(next);
                    dir = next;
                }
                _ => break,
            }
        }
        out
    }

    pub fn has_listed_pages(&self) -> bool {
        self.children.iter().any(Node::is_listed)
    }

    /// Renders the directory's children as nested `<ul>` markup with a
    /// collapsible `<details>` element per directory. Attachments and
    /// directories without listed pages are skipped.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.render(&mut out, 0);
        out
    }

    fn render(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&indent);
        out.push_str("<ul class=\"tree\">\n");
        for child in self.children.iter().filter(|c| c.is_listed()) {
            match child {
                Node::Directory(dir) => {
                    out.push_str(&format!(
                        "{}  <li class=\"dir\"><details open><summary><a href=\"/{}/index.html\">{}</a></summary>\n",
                        indent,
                        dir.path,
                        escape(&dir.title)
                    ));
                    dir.render(out, depth + 2);
                    out.push_str(&format!("{}  </details></li>\n", indent));
                }
                Node::Page(page) => {
                    out.push_str(&format!(
                        "{}  <li class=\"page\"><a href=\"/{}\">{}</a></li>\n",
                        indent,
                        page.link_path,
                        escape(&page.title)
                    ));
                }
            }
        }
        out.push_str(&indent);
        out.push_str("</ul>\n");
    }
}

/// Builds the tree. Fails on duplicate or malformed link paths rather than
/// silently dropping content.
pub fn build<'a>(records: &'a [PageRecord], backlinks: &BacklinkIndex) -> Result<Directory<'a>> {
    let mut seen = HashSet::new();
    let mut root = DirBuilder::new(String::new());

    for record in records {
        let segments = segments(&record.link_path)?;
        if !seen.insert(record.link_path.as_str()) {
            return Err(Error::DuplicateLinkPath(record.link_path.clone()));
        }

        let titles = directory_titles(record);
        let (file, dirs) = match segments.split_last() {
            Some(split) => split,
            None => return Err(Error::MalformedLinkPath(record.link_path.clone())),
        };

        let mut dir = &mut root;
        for (i, segment) in dirs.iter().enumerate() {
            let title = match titles.as_ref() {
                Some(titles) => titles[i].clone(),
                None => segment.to_string(),
            };
            let entry = dir
                .children
                .entry(sort_key(segment))
                .or_insert_with(|| Entry::Directory(DirBuilder::new(title)));
            dir = match entry {
                Entry::Directory(next) => next,
                Entry::Page(_) => return Err(Error::Conflict(record.link_path.clone())),
            };
        }

        match dir.children.insert(sort_key(file), Entry::Page(record)) {
            None => {}
            Some(_) => return Err(Error::Conflict(record.link_path.clone())),
        }
    }

    Ok(root.finish(String::new(), String::new(), backlinks))
}

type SortKey = (String, String);

fn sort_key(segment: &str) -> SortKey {
    (segment.to_lowercase(), segment.to_owned())
}

struct DirBuilder<'a> {
    title: String,
    children: BTreeMap<SortKey, Entry<'a>>,
}

enum Entry<'a> {
    Directory(DirBuilder<'a>),
    Page(&'a PageRecord),
}

impl<'a> DirBuilder<'a> {
    fn new(title: String) -> DirBuilder<'a> {
        DirBuilder {
            title,
            children: BTreeMap::new(),
        }
    }

    fn finish(self, name: String, path: String, backlinks: &BacklinkIndex) -> Directory<'a> {
        let children = self
            .children
            .into_iter()
            .map(|((_, segment), entry)| match entry {
                Entry::Page(page) => Node::Page(page),
                Entry::Directory(dir) => {
                    let path = crate::page::join(&path, &segment);
                    Node::Directory(dir.finish(segment, path, backlinks))
                }
            })
            .collect();
        let mut dir = Directory {
            name,
            title: self.title,
            path,
            children,
            backlinks: Vec::new(),
        };
        dir.backlinks = backlinks.for_directory(&dir.path, dir.pages());
        dir
    }
}

fn last_segment(link_path: &str) -> &str {
    link_path.rsplit('/').next().unwrap_or(link_path)
}

fn segments(link_path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = link_path.split('/').collect();
    if link_path.is_empty()
        || segments
            .iter()
            .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(Error::MalformedLinkPath(link_path.to_owned()));
    }
    Ok(segments)
}

/// Display names for the record's directories, from its source path. Falls
/// back to path segments (`None`) when the two don't line up.
fn directory_titles(record: &PageRecord) -> Option<Vec<String>> {
    let parent = record.source.parent()?;
    let names: Vec<String> = parent
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let dirs = record.link_path.matches('/').count();
    if names.len() == dirs {
        Some(names)
    } else {
        None
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem building the tree. All variants are fatal.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// Returned when two records share a link path.
    DuplicateLinkPath(String),

    /// Returned for empty or absolute link paths, or link paths with empty,
    /// `.` or `..` segments.
    MalformedLinkPath(String),

    /// Returned when a page's path is also used as a directory.
    Conflict(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::DuplicateLinkPath(path) => {
                write!(f, "two files map to the same output path `{}`", path)
            }
            Error::MalformedLinkPath(path) => write!(f, "malformed link path `{}`", path),
            Error::Conflict(path) => {
                write!(f, "`{}` is both a page and a directory", path)
            }
        }
    }
}

impl std::error::Error for Error {}

//! Fixtures shared by unit tests.

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::page::{join, outname, PageRecord};
use crate::source::{Note, NoteKind};

pub fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

/// A scanned note. `relpath` must already be sanitized.
pub fn note(relpath: &str, file_name: &str, page: bool) -> Note {
    let title = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem);
    let link_name = if page {
        outname(file_name)
    } else {
        file_name.to_owned()
    };
    Note {
        kind: if page {
            NoteKind::Page {
                markdown: String::new(),
            }
        } else {
            NoteKind::Attachment
        },
        title: title.to_owned(),
        canon_title: title.to_lowercase(),
        file_name: file_name.to_owned(),
        relpath: relpath.to_owned(),
        source: PathBuf::from(relpath).join(file_name),
        full_path: PathBuf::from("/vault").join(relpath).join(file_name),
        title_path: join(relpath, &title.to_lowercase()),
        link_path: join(relpath, &link_name),
        created: at("2021-01-01T00:00:00Z"),
        updated: at("2021-01-01T00:00:00Z"),
    }
}

/// A scanned page with a markdown body.
pub fn page_note(relpath: &str, file_name: &str, markdown: &str) -> Note {
    let mut n = note(relpath, file_name, true);
    n.kind = NoteKind::Page {
        markdown: markdown.to_owned(),
    };
    n
}

/// A record whose identity is `link_path`, titled after its last segment.
pub fn record(link_path: &str, references: &[&str]) -> PageRecord {
    let (relpath, name) = match link_path.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", link_path),
    };
    let attachment = !name.ends_with(".html");
    let title = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
    PageRecord {
        title: title.to_owned(),
        canon_title: title.to_lowercase(),
        relpath: relpath.to_owned(),
        source: PathBuf::from(link_path),
        full_path: PathBuf::from("/vault").join(link_path),
        title_path: join(relpath, &title.to_lowercase()),
        link_path: link_path.to_owned(),
        contents: String::new(),
        text: String::new(),
        created: at("2021-01-01T00:00:00Z"),
        updated: at("2021-01-01T00:00:00Z"),
        attachment,
        references: references.iter().map(|r| r.to_string()).collect(),
        dangling: Vec::new(),
    }
}

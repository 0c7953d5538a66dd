//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: scanning the vault
//! ([`crate::source`]), normalizing notes into page records
//! ([`crate::page`]), indexing backlinks ([`crate::backlinks`]), building
//! the directory tree ([`crate::tree`]) and the search payload
//! ([`crate::payload`]), and finally rendering everything to disk
//! ([`crate::write`], [`crate::feed`]).

use crate::backlinks::BacklinkIndex;
use crate::config::Config;
use crate::feed::{write_feed, Error as FeedError, FeedConfig};
use crate::markdown;
use crate::page::PageRecord;
use crate::payload;
use crate::resolve::Resolver;
use crate::source::{Error as ScanError, Scanner};
use crate::tree::{self, Error as TreeError};
use crate::write::{self, recently_updated, Error as WriteError, Theme, Writer};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The file marking an output directory as ours to delete and rebuild.
pub const WATERMARK: &str = ".notesite";

/// The Atom feed's file name.
pub const FEED_FILE: &str = "atom.xml";

/// Summarizes a build.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub pages: usize,
    pub attachments: usize,
    pub directories: usize,

    /// References which didn't resolve to a published record.
    pub dangling: usize,
}

/// Builds the site from a [`Config`] object, stamping it with the current
/// time.
pub fn build_site(config: &Config) -> Result<Report> {
    build_site_at(config, Utc::now())
}

/// Builds the site as of `now`, which decides the feed's `updated` time and
/// the weeks of `lastweek.html`.
pub fn build_site_at(config: &Config, now: DateTime<Utc>) -> Result<Report> {
    // Load the theme first so a broken template doesn't cost us the old
    // output.
    let theme = Theme::load(&config.theme_directory)?;

    let notes = Scanner::new(&config.ignore, config.time_source).scan(&config.vault_directory)?;
    let resolver = Resolver::new(&notes);
    let records: Vec<PageRecord> = notes
        .iter()
        .map(|note| PageRecord::from_note(note, &resolver))
        .collect();

    let backlinks = BacklinkIndex::build(&records);
    let root = tree::build(&records, &backlinks)?;
    let json = payload::to_json(&payload::build(&records))?;

    let output = &config.output_directory;
    clean(output)?;
    std::fs::create_dir_all(output)?;
    std::fs::write(output.join(WATERMARK), "")?;
    warn_about_shadowed_pages(&records);

    let writer = Writer {
        theme: &theme,
        output_directory: output,
        site_title: &config.title,
    };
    let mut report = Report {
        dangling: backlinks.dangling(),
        ..Report::default()
    };
    for record in &records {
        if record.attachment {
            copy_attachment(record, output)?;
            report.attachments += 1;
        } else {
            writer.write_page(&root, record, backlinks.get(&record.link_path))?;
            report.pages += 1;
        }
    }

    let directories = root.directories();
    for dir in &directories {
        writer.write_directory(&root, dir)?;
    }
    report.directories = directories.len().saturating_sub(1);

    writer.write_index(&root, &records, config.recent)?;
    writer.write_lastweek(&records, now)?;
    writer.write_search(&json)?;
    // a theme's own highlight.css, copied below, replaces the generated one
    writer.write_file(write::HIGHLIGHT_CSS_FILE, markdown::stylesheet()?.as_bytes())?;
    theme.copy_assets(output)?;

    write_feed(
        &FeedConfig {
            title: config.title.clone(),
            id: config.base_url.to_string(),
            author: config.author.clone(),
            home_page: config.base_url.clone(),
        },
        &recently_updated(&records, config.recent),
        now,
        File::create(output.join(FEED_FILE))?,
    )?;

    info!(
        pages = report.pages,
        attachments = report.attachments,
        directories = report.directories,
        dangling = report.dangling,
        output = %output.display(),
        "built site"
    );
    Ok(report)
}

fn copy_attachment(record: &PageRecord, output: &Path) -> Result<()> {
    let dst = output.join(&record.link_path);
    if let Some(dir) = dst.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::copy(&record.full_path, &dst).map_err(|err| Error::Copy {
        path: record.full_path.clone(),
        err,
    })?;
    Ok(())
}

/// Pages at the site root whose names collide with generated files are
/// overwritten by them.
fn warn_about_shadowed_pages(records: &[PageRecord]) {
    let generated = [
        write::INDEX_FILE,
        write::LASTWEEK_FILE,
        write::SEARCH_FILE,
        write::SEARCH_JSON_FILE,
        write::HIGHLIGHT_CSS_FILE,
        FEED_FILE,
    ];
    for record in records {
        if generated.contains(&record.link_path.as_str()) {
            warn!(link_path = %record.link_path, "page is replaced by a generated file");
        }
    }
}

/// Removes a previous build. Refuses to touch a non-empty directory that
/// doesn't carry our [`WATERMARK`], in case the user passed the wrong
/// directory.
fn clean(dir: &Path) -> Result<()> {
    let mut entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            })
        }
    };
    if entries.next().is_none() {
        return Ok(());
    }
    if !dir.join(WATERMARK).exists() {
        return Err(Error::NotOurs(dir.to_owned()));
    }
    std::fs::remove_dir_all(dir).map_err(|e| Error::Clean {
        path: dir.to_owned(),
        err: e,
    })
}

/// The result of a fallible build operation.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can be during scanning, tree
/// building, writing, cleaning the output directory, and other I/O.
#[derive(Debug)]
pub enum Error {
    /// Returned for errors scanning the vault.
    Scan(ScanError),

    /// Returned for malformed or clashing link paths.
    Tree(TreeError),

    /// Returned for errors loading the theme or writing pages.
    Write(WriteError),

    /// Returned for errors writing the feed.
    Feed(FeedError),

    /// Returned when the search payload can't be serialized.
    Json(serde_json::Error),

    /// Returned when the code highlighting stylesheet can't be generated.
    Highlight(syntect::Error),

    /// Returned for I/O problems while cleaning the output directory.
    Clean { path: PathBuf, err: std::io::Error },

    /// Returned when the output directory has content we didn't put there.
    NotOurs(PathBuf),

    /// Returned when an attachment can't be copied.
    Copy { path: PathBuf, err: std::io::Error },

    /// Returned for other I/O errors.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Scan(err) => err.fmt(f),
            Error::Tree(err) => err.fmt(f),
            Error::Write(err) => err.fmt(f),
            Error::Feed(err) => err.fmt(f),
            Error::Json(err) => err.fmt(f),
            Error::Highlight(err) => write!(f, "Generating the highlighting stylesheet: {}", err),
            Error::Clean { path, err } => {
                write!(f, "Cleaning directory '{}': {}", path.display(), err)
            }
            Error::NotOurs(path) => write!(
                f,
                "Refusing to overwrite '{}': it is not empty and has no `{}` file",
                path.display(),
                WATERMARK
            ),
            Error::Copy { path, err } => {
                write!(f, "Copying attachment '{}': {}", path.display(), err)
            }
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Scan(err) => Some(err),
            Error::Tree(err) => Some(err),
            Error::Write(err) => Some(err),
            Error::Feed(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Highlight(err) => Some(err),
            Error::Clean { path: _, err } => Some(err),
            Error::NotOurs(_) => None,
            Error::Copy { path: _, err } => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    /// Converts [`std::io::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ScanError> for Error {
    fn from(err: ScanError) -> Error {
        Error::Scan(err)
    }
}

impl From<TreeError> for Error {
    fn from(err: TreeError) -> Error {
        Error::Tree(err)
    }
}

impl From<WriteError> for Error {
    fn from(err: WriteError) -> Error {
        Error::Write(err)
    }
}

impl From<FeedError> for Error {
    fn from(err: FeedError) -> Error {
        Error::Feed(err)
    }
}

impl From<syntect::Error> for Error {
    fn from(err: syntect::Error) -> Error {
        Error::Highlight(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

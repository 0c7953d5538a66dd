//! Scans a vault directory into [`Note`]s. This is where the ignore rules
//! live (ignored names, untitled files, empty files, drafts), where front
//! matter is split from the markdown body, and where created/updated
//! timestamps are read from front matter, the filesystem or git.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::page::{canonicalize, join, outname, pathname, MARKDOWN_EXTENSION};

/// A file found in the vault, before link resolution and rendering.
#[derive(Clone, Debug)]
pub struct Note {
    pub kind: NoteKind,
    pub title: String,
    pub canon_title: String,

    /// The file name as found on disk, e.g. `some image 2928984588.png`.
    pub file_name: String,

    pub relpath: String,
    pub source: PathBuf,
    pub full_path: PathBuf,
    pub title_path: String,
    pub link_path: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Note {
    pub fn is_page(&self) -> bool {
        matches!(self.kind, NoteKind::Page { .. })
    }
}

#[derive(Clone, Debug)]
pub enum NoteKind {
    /// A markdown page. `markdown` is the body with front matter removed.
    Page { markdown: String },

    /// Any other file.
    Attachment,
}

/// Where created/updated times come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeSource {
    /// The file's own metadata.
    Filesystem,

    /// The first and last commits touching the file. Useful when the vault
    /// is a git checkout, where filesystem times reflect the clone.
    Git,
}

/// Walks a vault and produces [`Note`]s.
pub struct Scanner<'a> {
    /// File and directory names skipped at any depth.
    ignore: &'a HashSet<String>,
    times: TimeSource,
}

impl<'a> Scanner<'a> {
    pub fn new(ignore: &'a HashSet<String>, times: TimeSource) -> Scanner<'a> {
        Scanner { ignore, times }
    }

    /// Returns every page and attachment below `root` in case-insensitive
    /// path order. Symbolic links are followed.
    pub fn scan(&self, root: &Path) -> Result<Vec<Note>> {
        let mut notes = Vec::new();
        let ignore = self.ignore;
        let walker = WalkDir::new(root)
            .min_depth(1)
            .follow_links(true)
            .sort_by(|a, b| {
                let a = a.file_name().to_string_lossy().to_lowercase();
                let b = b.file_name().to_string_lossy().to_lowercase();
                a.cmp(&b)
            })
            .into_iter()
            .filter_entry(|entry| keep(ignore, entry));

        for result in walker {
            let entry = result?;
            if !entry.file_type().is_file() {
                continue;
            }
            if is_empty_file(entry.path())? {
                info!(path = %entry.path().display(), "ignoring empty file");
                continue;
            }
            if let Some(note) = self.note(root, entry.path())? {
                notes.push(note);
            }
        }

        Ok(notes)
    }

    fn note(&self, root: &Path, path: &Path) -> Result<Option<Note>> {
        match self.read_note(root, path) {
            Ok(note) => Ok(note),
            Err(e) => Err(Error::Annotated(
                format!("reading `{}`", path.display()),
                Box::new(e),
            )),
        }
    }

    fn read_note(&self, root: &Path, path: &Path) -> Result<Option<Note>> {
        let source = path
            .strip_prefix(root)
            .map_err(|_| Error::OutsideRoot(path.to_owned()))?
            .to_owned();
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::OutsideRoot(path.to_owned()))?;
        let title = Path::new(&file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());
        let relpath = pathname(
            &source
                .parent()
                .map(|dir| dir.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        let (kind, frontmatter) = if file_name.ends_with(MARKDOWN_EXTENSION) {
            let contents = std::fs::read_to_string(path)?;
            let (frontmatter, body) = split_front_matter(&contents)?;
            if is_draft(&frontmatter) {
                info!(path = %path.display(), "skipping draft");
                return Ok(None);
            }
            let kind = NoteKind::Page {
                markdown: body.to_owned(),
            };
            (kind, frontmatter)
        } else {
            (NoteKind::Attachment, serde_yaml::Mapping::new())
        };

        let link_path = match kind {
            NoteKind::Page { .. } => join(&relpath, &outname(&file_name)),
            NoteKind::Attachment => join(&relpath, &file_name),
        };
        let (mut created, mut updated) = self.timestamps(path)?;
        if let Some(time) = front_matter_time(&frontmatter, "created")? {
            created = time;
        }
        if let Some(time) = front_matter_time(&frontmatter, "updated")? {
            updated = time;
        }

        Ok(Some(Note {
            kind,
            canon_title: canonicalize(&title),
            title_path: join(&relpath, &canonicalize(&title)),
            title,
            file_name,
            relpath,
            source,
            full_path: path.to_owned(),
            link_path,
            created,
            updated,
        }))
    }

    fn timestamps(&self, path: &Path) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        if self.times == TimeSource::Git {
            if let Some(times) = git_times(path)? {
                return Ok(times);
            }
            warn!(path = %path.display(), "no git history, using filesystem times");
        }
        filesystem_times(path)
    }
}

fn keep(ignore: &HashSet<String>, entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if ignore.contains(name.as_ref()) {
        info!(path = %entry.path().display(), "ignoring file");
        return false;
    }
    if name == "Untitled.md" || name == "Untitled" {
        info!(path = %entry.path().display(), "ignoring untitled object");
        return false;
    }
    true
}

/// Reports whether the first 16 bytes of a file are all whitespace. The file
/// is read as bytes since attachments need not be valid UTF-8.
fn is_empty_file(path: &Path) -> Result<bool> {
    use std::io::Read;
    let mut buf = [0u8; 16];
    let mut file = File::open(path)?;
    let mut read = 0;
    while read < buf.len() {
        match file.read(&mut buf[read..])? {
            0 => break,
            n => read += n,
        }
    }
    Ok(buf[..read].iter().all(|b| b.is_ascii_whitespace()))
}

static FRONT_MATTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A\s*---(.*?)\n---\n").unwrap());

/// Splits YAML front matter from the rest of a markdown document. Documents
/// without front matter yield an empty mapping and the whole input.
pub fn split_front_matter(input: &str) -> Result<(serde_yaml::Mapping, &str)> {
    let caps = match FRONT_MATTER_RE.captures(input) {
        Some(caps) => caps,
        None => return Ok((serde_yaml::Mapping::new(), input)),
    };
    let (raw, end) = match (caps.get(1), caps.get(0)) {
        (Some(raw), Some(all)) => (raw.as_str(), all.end()),
        _ => return Ok((serde_yaml::Mapping::new(), input)),
    };
    if raw.trim().is_empty() {
        return Ok((serde_yaml::Mapping::new(), &input[end..]));
    }
    match serde_yaml::from_str::<serde_yaml::Value>(raw)? {
        serde_yaml::Value::Null => Ok((serde_yaml::Mapping::new(), &input[end..])),
        serde_yaml::Value::Mapping(m) => Ok((m, &input[end..])),
        _ => Err(Error::FrontmatterNotMapping),
    }
}

/// A page is a draft when its front matter has a truthy `draft` key.
fn is_draft(frontmatter: &serde_yaml::Mapping) -> bool {
    use serde_yaml::Value;
    match frontmatter.get(&Value::String("draft".to_owned())) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().map_or(true, |n| n != 0.0),
        Some(Value::Sequence(s)) => !s.is_empty(),
        Some(Value::Mapping(m)) => !m.is_empty(),
    }
}

/// Reads an RFC 3339 timestamp from the front matter's `key`. These take
/// precedence over filesystem and git times, which don't survive copies and
/// renames.
fn front_matter_time(
    frontmatter: &serde_yaml::Mapping,
    key: &'static str,
) -> Result<Option<DateTime<Utc>>> {
    use serde_yaml::Value;
    let value = match frontmatter.get(&Value::String(key.to_owned())) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| Error::InvalidTimestamp {
                key,
                value: raw.clone(),
            }),
        other => Err(Error::InvalidTimestamp {
            key,
            value: serde_yaml::to_string(other)
                .map(|s| s.trim_start_matches("---").trim().to_owned())
                .unwrap_or_default(),
        }),
    }
}

fn filesystem_times(path: &Path) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata.modified()?;
    // Not every platform/filesystem records a birth time.
    let created = metadata.created().unwrap_or(modified);
    Ok((DateTime::from(created), DateTime::from(modified)))
}

/// Reads created/updated times from git. Each line of
/// `git log --pretty=format:"%aI %cI"` holds the author and committer
/// timestamps of one commit, newest first:
///
/// ```text
/// 2023-10-30T08:18:52-04:00 2023-10-30T08:18:52-04:00
/// 2022-04-08T21:36:48-04:00 2022-04-08T21:36:48-04:00
/// ```
///
/// The updated time is the committer time on the first line and the created
/// time is the author time on the last line. Returns `None` for files with no
/// history.
fn git_times(path: &Path) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(&["log", "--pretty=format:%aI %cI", "--"])
        .arg(path)
        .output()?;
    if !output.status.success() {
        return Err(Error::Git(
            String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        ));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!(path = %path.display(), commits = stdout.lines().count(), "read git history");
    parse_git_log(&stdout)
}

fn parse_git_log(log: &str) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    let lines: Vec<&str> = log.lines().filter(|l| !l.trim().is_empty()).collect();
    let (first, last) = match (lines.first(), lines.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Ok(None),
    };
    let field = |line: &str, i: usize| -> Result<DateTime<Utc>> {
        let raw = line
            .split(' ')
            .nth(i)
            .ok_or_else(|| Error::Git(format!("malformed log line `{}`", line)))?;
        Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
    };
    Ok(Some((field(last, 0)?, field(first, 1)?)))
}

/// The result of a fallible scan operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error scanning the vault.
#[derive(Debug)]
pub enum Error {
    /// Returned when front matter parses to something other than a mapping.
    FrontmatterNotMapping,

    /// Returned when there was an error parsing the front matter as YAML.
    DeserializeYaml(serde_yaml::Error),

    /// Returned when `git log` fails or prints something unexpected.
    Git(String),

    /// Returned when a git timestamp isn't valid RFC 3339.
    Timestamp(chrono::ParseError),

    /// Returned when a `created` or `updated` front matter key isn't an
    /// RFC 3339 timestamp.
    InvalidTimestamp { key: &'static str, value: String },

    /// Returned when a walked path is not below the vault root.
    OutsideRoot(PathBuf),

    /// Returned for WalkDir I/O errors.
    WalkDir(walkdir::Error),

    /// Returned for other I/O errors.
    Io(std::io::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::FrontmatterNotMapping => {
                write!(f, "front matter must be a YAML mapping")
            }
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::Git(msg) => write!(f, "git: {}", msg),
            Error::Timestamp(err) => err.fmt(f),
            Error::InvalidTimestamp { key, value } => write!(
                f,
                "front matter key `{}` must be an RFC 3339 timestamp, got `{}`",
                key, value
            ),
            Error::OutsideRoot(path) => {
                write!(f, "`{}` is not inside the vault", path.display())
            }
            Error::WalkDir(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
            Error::Annotated(annotation, err) => {
                write!(f, "{}: {}", &annotation, err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FrontmatterNotMapping => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::Git(_) => None,
            Error::Timestamp(err) => Some(err),
            Error::InvalidTimestamp { .. } => None,
            Error::OutsideRoot(_) => None,
            Error::WalkDir(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}

impl From<chrono::ParseError> for Error {
    fn from(err: chrono::ParseError) -> Error {
        Error::Timestamp(err)
    }
}

impl From<walkdir::Error> for Error {
    /// Converts a [`walkdir::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator while walking the vault.
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

impl From<std::io::Error> for Error {
    /// Converts a [`std::io::Error`] into an [`Error`]. It allows us to
    /// use the `?` operator for fallible I/O functions.
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

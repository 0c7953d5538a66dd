//! Templates pages and writes them to disk. A [`Theme`] is a directory of
//! gtmpl templates plus static assets; [`Writer`] applies the templates to
//! page records, directories, and the site-wide listings.

use crate::backlinks::Backlink;
use crate::page::PageRecord;
use crate::tree::Directory;
use crate::value::{self, escape};
use chrono::{DateTime, Utc};
use gtmpl::{Template, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File names of generated site-wide pages.
pub const INDEX_FILE: &str = "index.html";
pub const LASTWEEK_FILE: &str = "lastweek.html";
pub const SEARCH_FILE: &str = "search.html";
pub const SEARCH_JSON_FILE: &str = "search.json";
pub const HIGHLIGHT_CSS_FILE: &str = "highlight.css";

/// The gtmpl templates making up a theme, plus the directory holding its
/// stylesheets and scripts.
pub struct Theme {
    pub page: Template,
    pub index: Template,
    pub directory: Template,
    pub lastweek: Template,
    pub search: Template,
    pub assets: PathBuf,
}

impl Theme {
    /// Loads `page.html`, `index.html`, `directory.html`, `lastweek.html`
    /// and `search.html` from `dir`.
    pub fn load(dir: &Path) -> Result<Theme> {
        Ok(Theme {
            page: parse_template(&dir.join("page.html"))?,
            index: parse_template(&dir.join("index.html"))?,
            directory: parse_template(&dir.join("directory.html"))?,
            lastweek: parse_template(&dir.join("lastweek.html"))?,
            search: parse_template(&dir.join("search.html"))?,
            assets: dir.to_owned(),
        })
    }

    /// Copies the theme's `*.css` and `*.js` files into `output`. Returns
    /// the number of files copied.
    pub fn copy_assets(&self, output: &Path) -> Result<usize> {
        let mut copied = 0;
        for entry in std::fs::read_dir(&self.assets)? {
            let entry = entry?;
            let path = entry.path();
            let is_asset = path
                .extension()
                .map_or(false, |ext| ext == "css" || ext == "js");
            if is_asset && entry.file_type()?.is_file() {
                std::fs::copy(&path, output.join(entry.file_name()))?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

// Loads a template file and parses it.
fn parse_template(path: &Path) -> Result<Template> {
    use std::io::Read;
    let mut contents = String::new();
    File::open(path)
        .map_err(|e| Error::OpenTemplateFile {
            path: path.to_owned(),
            err: e,
        })?
        .read_to_string(&mut contents)?;

    let mut template = Template::default();
    template
        .parse(contents)
        .map_err(|e| Error::ParseTemplate {
            path: path.to_owned(),
            err: e.to_string(),
        })?;
    Ok(template)
}

/// Responsible for templating and writing HTML pages to disk.
pub struct Writer<'a> {
    pub theme: &'a Theme,

    /// The site root on disk.
    pub output_directory: &'a Path,

    /// The site title, made available to every template as `site_title`.
    pub site_title: &'a str,
}

impl Writer<'_> {
    /// Renders `value` with `template` and writes the result to
    /// `relpath` below the output directory, creating parent directories
    /// as needed.
    fn write(&self, template: &Template, value: Value, relpath: &str) -> Result<()> {
        let html = render(template, self.with_site(value))?;
        self.write_file(relpath, html.as_bytes())
    }

    /// Writes raw bytes to `relpath` below the output directory.
    pub fn write_file(&self, relpath: &str, contents: &[u8]) -> Result<()> {
        let path = self.output_directory.join(relpath);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        debug!(path = %path.display(), "writing");
        std::fs::write(&path, contents)?;
        Ok(())
    }

    fn with_site(&self, mut value: Value) -> Value {
        if let Value::Object(obj) = &mut value {
            obj.insert(
                "site_title".to_owned(),
                Value::String(escape(self.site_title)),
            );
        }
        value
    }

    /// Writes a page with its backlinks and breadcrumb. `root` is the
    /// site's directory tree, which names the breadcrumb's directories.
    pub fn write_page(
        &self,
        root: &Directory,
        record: &PageRecord,
        backlinks: &[Backlink],
    ) -> Result<()> {
        let mut item = Value::from(record);
        if let Value::Object(m) = &mut item {
            m.insert("backlinks".to_owned(), value::backlinks(backlinks));
            let dir = record.link_path.rsplit_once('/').map_or("", |(dir, _)| dir);
            m.insert("breadcrumb".to_owned(), breadcrumb(root, dir));
        }
        self.write(&self.theme.page, item, &record.link_path)
    }

    /// Writes `<dir>/index.html` for a directory other than the root. Skips
    /// directories where a page already occupies that path.
    pub fn write_directory(&self, root: &Directory, dir: &Directory) -> Result<()> {
        if dir.path.is_empty() {
            return Ok(());
        }
        if dir.children.iter().any(|c| c.segment() == INDEX_FILE) {
            warn!(dir = %dir.path, "a page named index takes the place of the directory listing");
            return Ok(());
        }

        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("title".to_owned(), Value::String(escape(&dir.title)));
        m.insert("path".to_owned(), Value::String(dir.path.clone()));
        m.insert("tree".to_owned(), Value::String(dir.to_html()));
        m.insert("backlinks".to_owned(), value::backlinks(&dir.backlinks));
        let parent = dir.path.rsplit_once('/').map_or("", |(parent, _)| parent);
        m.insert("breadcrumb".to_owned(), breadcrumb(root, parent));
        self.write(
            &self.theme.directory,
            Value::Object(m),
            &crate::page::join(&dir.path, INDEX_FILE),
        )
    }

    /// Writes the home page: recently updated and created pages plus the
    /// whole tree.
    pub fn write_index(&self, root: &Directory, records: &[PageRecord], recent: usize) -> Result<()> {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert(
            "updated".to_owned(),
            value::summaries(recently_updated(records, recent)),
        );
        m.insert(
            "created".to_owned(),
            value::summaries(recently_created(records, recent)),
        );
        m.insert("tree".to_owned(), Value::String(root.to_html()));
        self.write(&self.theme.index, Value::Object(m), INDEX_FILE)
    }

    /// Writes the list of pages updated in each of the last four weeks.
    pub fn write_lastweek(&self, records: &[PageRecord], now: DateTime<Utc>) -> Result<()> {
        let weeks: Vec<Value> = updated_by_week(records, now)
            .iter()
            .enumerate()
            .map(|(i, pages)| {
                let mut m: HashMap<String, Value> = HashMap::new();
                m.insert("label".to_owned(), Value::String(week_label(i)));
                m.insert("pages".to_owned(), value::summaries(pages.iter().copied()));
                Value::Object(m)
            })
            .collect();
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("weeks".to_owned(), Value::Array(weeks));
        self.write(&self.theme.lastweek, Value::Object(m), LASTWEEK_FILE)
    }

    /// Writes the search page with `json` embedded, and `json` itself as
    /// [`SEARCH_JSON_FILE`].
    pub fn write_search(&self, json: &str) -> Result<()> {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert(
            "payload".to_owned(),
            Value::String(crate::payload::embed(json)),
        );
        self.write(&self.theme.search, Value::Object(m), SEARCH_FILE)?;
        self.write_file(SEARCH_JSON_FILE, json.as_bytes())
    }
}

fn render(template: &Template, value: Value) -> Result<String> {
    let context = gtmpl::Context::from(value).map_err(|e| Error::Template(e.to_string()))?;
    let mut out: Vec<u8> = Vec::new();
    template
        .execute(&mut out, &context)
        .map_err(|e| Error::Template(e.to_string()))?;
    String::from_utf8(out).map_err(|e| Error::Template(e.to_string()))
}

/// The directories from the root down to `dir`, as `{name, path}` objects
/// where `name` is the directory's title in the tree and `path` its index
/// page.
fn breadcrumb(root: &Directory, dir: &str) -> Value {
    Value::Array(
        root.trail(dir)
            .into_iter()
            .map(|d| {
                let mut m: HashMap<String, Value> = HashMap::new();
                m.insert("name".to_owned(), Value::String(escape(&d.title)));
                m.insert(
                    "path".to_owned(),
                    Value::String(format!("{}/{}", d.path, INDEX_FILE)),
                );
                Value::Object(m)
            })
            .collect(),
    )
}

/// The `n` most recently updated pages, newest first.
pub fn recently_updated(records: &[PageRecord], n: usize) -> Vec<&PageRecord> {
    newest(records, n, |r| r.updated)
}

/// The `n` most recently created pages, newest first.
pub fn recently_created(records: &[PageRecord], n: usize) -> Vec<&PageRecord> {
    newest(records, n, |r| r.created)
}

fn newest<F>(records: &[PageRecord], n: usize, time: F) -> Vec<&PageRecord>
where
    F: Fn(&PageRecord) -> DateTime<Utc>,
{
    let mut pages: Vec<&PageRecord> = records.iter().filter(|r| !r.attachment).collect();
    pages.sort_by(|a, b| {
        time(b)
            .cmp(&time(a))
            .then_with(|| a.link_path.cmp(&b.link_path))
    });
    pages.truncate(n);
    pages
}

/// Pages updated within four weeks of `now`, grouped by how many whole weeks
/// ago they were updated, newest first within each week. Times after `now`
/// count as this week.
pub fn updated_by_week(records: &[PageRecord], now: DateTime<Utc>) -> [Vec<&PageRecord>; 4] {
    let mut weeks: [Vec<&PageRecord>; 4] = Default::default();
    for page in recently_updated(records, records.len()) {
        let weeks_ago = (now - page.updated).num_days().max(0) / 7;
        if weeks_ago < 4 {
            weeks[weeks_ago as usize].push(page);
        }
    }
    weeks
}

fn week_label(weeks_ago: usize) -> String {
    match weeks_ago {
        0 => String::from("This week"),
        1 => String::from("Last week"),
        n => format!("{} weeks ago", n),
    }
}

/// The result of a fallible page-writing operation.
type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading a theme or writing pages.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems while opening template files.
    OpenTemplateFile { path: PathBuf, err: io::Error },

    /// Returned for errors parsing template files.
    ParseTemplate { path: PathBuf, err: String },

    /// An error during templating.
    Template(String),

    /// An error writing the output files.
    Io(io::Error),
}

impl From<io::Error> for Error {
    /// Converts an [`io::Error`] into an [`Error`]. This allows us to use the
    /// `?` operator for fallible I/O operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::OpenTemplateFile { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::ParseTemplate { path, err } => {
                write!(f, "Parsing template file '{}': {}", path.display(), err)
            }
            Error::Template(err) => err.fmt(f),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::OpenTemplateFile { path: _, err } => Some(err),
            Error::ParseTemplate { .. } => None,
            Error::Template(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backlinks::BacklinkIndex;
    use crate::testutil::{at, record};
    use tempfile::TempDir;

    fn theme(dir: &Path) -> Result<Theme> {
        let files = [
            (
                "page.html",
                "{{.site_title}}|{{.title}}|{{range .breadcrumb}}{{.name}}>{{end}}|{{range .backlinks}}{{.title}};{{end}}|{{.contents}}",
            ),
            ("index.html", "{{range .updated}}{{.link_path}};{{end}}|{{.tree}}"),
            (
                "directory.html",
                "{{.title}}|{{range .breadcrumb}}{{.name}}>{{end}}|{{range .backlinks}}{{.link_path}};{{end}}",
            ),
            (
                "lastweek.html",
                "{{range .weeks}}{{.label}}:{{range .pages}}{{.title}},{{end}};{{end}}",
            ),
            ("search.html", "<script>{{.payload}}</script>"),
            ("style.css", "body {}"),
            ("search.js", "// search"),
            ("notes.txt", "not an asset"),
        ];
        for (name, contents) in files.iter() {
            std::fs::write(dir.join(name), contents)?;
        }
        Theme::load(dir)
    }

    #[test]
    fn test_write_page() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let theme_dir = TempDir::new()?;
        let output = TempDir::new()?;
        let theme = theme(theme_dir.path())?;
        let writer = Writer {
            theme: &theme,
            output_directory: output.path(),
            site_title: "My <Notes>",
        };

        let mut page = record("graphs/deep_dive/Bfs.html", &[]);
        page.source = PathBuf::from("graphs/deep dive/Bfs.md");
        page.contents = String::from("<p>queue</p>");
        let records = vec![page];
        let root = crate::tree::build(&records, &BacklinkIndex::default())?;
        let backlinks = vec![Backlink {
            title: String::from("Trees"),
            link_path: String::from("graphs/Trees.html"),
        }];
        writer.write_page(&root, &records[0], &backlinks)?;

        // crumbs are named like the tree names the directories
        let html = std::fs::read_to_string(output.path().join("graphs/deep_dive/Bfs.html"))?;
        assert_eq!(html, "My &lt;Notes&gt;|Bfs|graphs>deep dive>|Trees;|<p>queue</p>");

        let deep = match root.find("graphs/deep_dive") {
            Some(crate::tree::Node::Directory(dir)) => dir,
            other => panic!("expected directory, got {:?}", other),
        };
        writer.write_directory(&root, deep)?;
        let html = std::fs::read_to_string(output.path().join("graphs/deep_dive/index.html"))?;
        assert_eq!(html, "deep dive|graphs>|");
        Ok(())
    }

    #[test]
    fn test_write_directory_and_index() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let theme_dir = TempDir::new()?;
        let output = TempDir::new()?;
        let theme = theme(theme_dir.path())?;
        let writer = Writer {
            theme: &theme,
            output_directory: output.path(),
            site_title: "Notes",
        };

        let mut records = vec![
            record("graphs/Trees.html", &[]),
            record("Index.html", &["graphs/Trees.html"]),
            record("other/index.html", &[]),
        ];
        records[1].updated = at("2021-02-01T00:00:00Z");
        let backlinks = BacklinkIndex::build(&records);
        let root = crate::tree::build(&records, &backlinks)?;
        for dir in root.directories() {
            writer.write_directory(&root, dir)?;
        }
        writer.write_index(&root, &records, 1)?;

        let html = std::fs::read_to_string(output.path().join("graphs/index.html"))?;
        assert_eq!(html, "graphs||Index.html;");
        let index = std::fs::read_to_string(output.path().join(INDEX_FILE))?;
        assert!(index.starts_with("Index.html;|<ul"), "{}", index);
        // a page named index takes the listing's place
        assert!(!output.path().join("other/index.html").exists());
        Ok(())
    }

    #[test]
    fn test_write_search_and_assets() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let theme_dir = TempDir::new()?;
        let output = TempDir::new()?;
        let theme = theme(theme_dir.path())?;
        let writer = Writer {
            theme: &theme,
            output_directory: output.path(),
            site_title: "Notes",
        };
        writer.write_search(r#"[{"title":"</script>"}]"#)?;
        let html = std::fs::read_to_string(output.path().join(SEARCH_FILE))?;
        assert_eq!(html, r#"<script>[{"title":"<\/script>"}]</script>"#);
        let json = std::fs::read_to_string(output.path().join(SEARCH_JSON_FILE))?;
        assert_eq!(json, r#"[{"title":"</script>"}]"#);

        assert_eq!(theme.copy_assets(output.path())?, 2);
        assert!(output.path().join("style.css").exists());
        assert!(!output.path().join("notes.txt").exists());
        Ok(())
    }

    #[test]
    fn test_missing_template() {
        let dir = TempDir::new().unwrap();
        match Theme::load(dir.path()) {
            Err(Error::OpenTemplateFile { path, .. }) => {
                assert_eq!(path, dir.path().join("page.html"))
            }
            other => panic!("expected OpenTemplateFile, got {:?}", other.err()),
        }
    }

    fn paths<'r>(records: &[&'r PageRecord]) -> Vec<&'r str> {
        records.iter().map(|r| r.link_path.as_str()).collect()
    }

    #[test]
    fn test_recent_lists() {
        let mut records = vec![
            record("a.html", &[]),
            record("b.html", &[]),
            record("c.html", &[]),
            record("img.png", &[]),
        ];
        records[0].updated = at("2024-03-01T00:00:00Z");
        records[1].updated = at("2024-03-04T00:00:00Z");
        records[2].created = at("2020-01-01T00:00:00Z");
        records[3].updated = at("2024-03-05T00:00:00Z");

        assert_eq!(paths(&recently_updated(&records, 2)), vec!["b.html", "a.html"]);
        assert_eq!(
            paths(&recently_created(&records, 3)),
            vec!["a.html", "b.html", "c.html"]
        );
    }

    #[test]
    fn test_updated_by_week() {
        let mut records = vec![
            record("today.html", &[]),
            record("last.html", &[]),
            record("old.html", &[]),
            record("future.html", &[]),
        ];
        records[0].updated = at("2024-03-05T09:00:00Z");
        records[1].updated = at("2024-02-26T09:00:00Z");
        records[2].updated = at("2024-01-01T00:00:00Z");
        records[3].updated = at("2024-03-06T00:00:00Z");
        let weeks = updated_by_week(&records, at("2024-03-05T10:00:00Z"));
        assert_eq!(paths(&weeks[0]), vec!["future.html", "today.html"]);
        assert_eq!(paths(&weeks[1]), vec!["last.html"]);
        assert!(weeks[2].is_empty());
        assert!(weeks[3].is_empty());
    }
}

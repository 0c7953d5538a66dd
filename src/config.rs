//! Loads the project configuration (`notesite.yaml`) and applies command
//! line overrides on top of it.

use crate::source::TimeSource;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;

/// The name of the project file.
pub const PROJECT_FILE: &str = "notesite.yaml";

/// File and directory names skipped at any depth unless the project says
/// otherwise.
pub const DEFAULT_IGNORE: &[&str] = &[
    ".DS_Store",
    "private",
    ".obsidian",
    ".github",
    ".git",
    ".gitignore",
];

#[derive(Clone, Debug, Deserialize)]
pub struct Author {
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize)]
struct Recent(usize);
impl Default for Recent {
    fn default() -> Self {
        Recent(15)
    }
}

#[derive(Deserialize)]
struct Project {
    title: String,

    #[serde(default)]
    author: Option<Author>,

    #[serde(default = "default_base_url")]
    base_url: Url,

    /// Relative to the project file's directory.
    #[serde(default)]
    vault: PathBuf,

    #[serde(default = "default_output")]
    output: PathBuf,

    #[serde(default = "default_theme")]
    theme: PathBuf,

    #[serde(default)]
    recent: Recent,

    #[serde(default = "default_ignore")]
    ignore: Vec<String>,

    #[serde(default)]
    use_git_times: bool,
}

fn default_base_url() -> Url {
    // a constant that always parses
    Url::parse("http://localhost/").unwrap()
}

fn default_output() -> PathBuf {
    PathBuf::from("output")
}

fn default_theme() -> PathBuf {
    PathBuf::from("theme")
}

fn default_ignore() -> Vec<String> {
    DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect()
}

/// Settings given on the command line. They win over the project file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub vault: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub theme: Option<PathBuf>,
    pub recent: Option<usize>,
    pub use_git_times: bool,
}

#[derive(Debug)]
pub struct Config {
    pub title: String,
    pub author: Option<Author>,

    /// The URL the site is served from. Feed entries are resolved against
    /// it.
    pub base_url: Url,

    pub vault_directory: PathBuf,
    pub output_directory: PathBuf,
    pub theme_directory: PathBuf,

    /// How many pages the recently updated and recently created lists (and
    /// the feed) show.
    pub recent: usize,

    pub ignore: HashSet<String>,
    pub time_source: TimeSource,
}

impl Config {
    /// Looks for [`PROJECT_FILE`] in `dir` and then in each of its parents.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            Config::from_project_file(&path).context("Loading configuration")
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    /// Loads a project file. Relative paths in it are relative to the
    /// file's directory.
    pub fn from_project_file(path: &Path) -> Result<Config> {
        let project: Project = serde_yaml::from_reader(open(path, "project")?)
            .with_context(|| format!("Parsing project file `{}`", path.display()))?;
        let project_root = match path.parent() {
            Some(root) => root,
            None => {
                return Err(anyhow!(
                    "Can't get parent directory for provided project file path '{:?}'",
                    path
                ))
            }
        };

        Ok(Config {
            title: project.title,
            author: project.author,
            base_url: project.base_url,
            vault_directory: project_root.join(project.vault),
            output_directory: project_root.join(project.output),
            theme_directory: project_root.join(project.theme),
            recent: project.recent.0,
            ignore: project.ignore.into_iter().collect(),
            time_source: if project.use_git_times {
                TimeSource::Git
            } else {
                TimeSource::Filesystem
            },
        })
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(vault) = overrides.vault {
            self.vault_directory = vault;
        }
        if let Some(output) = overrides.output {
            self.output_directory = output;
        }
        if let Some(theme) = overrides.theme {
            self.theme_directory = theme;
        }
        if let Some(recent) = overrides.recent {
            self.recent = recent;
        }
        if overrides.use_git_times {
            self.time_source = TimeSource::Git;
        }
    }
}

fn open(path: &Path, kind: &str) -> Result<File> {
    match File::open(path) {
        Err(e) => Err(anyhow!("Opening {} file `{}`: {}", kind, path.display(), e)),
        Ok(file) => Ok(file),
    }
}

use notesite::build::{build_site_at, Report};
use notesite::config::{Config, DEFAULT_IGNORE};
use notesite::engine::{SearchIndex, SearchOptions, SearchPage};
use notesite::payload;
use notesite::source::TimeSource;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

type Result<T> = std::result::Result<T, Box<dyn Error>>;

fn vault(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("graphs"))?;
    fs::create_dir_all(root.join(".obsidian"))?;
    fs::write(
        root.join("Graph Theory.md"),
        "# Graph Theory\n\nSee [[Trees]] and [[missing page]].\n",
    )?;
    fs::write(
        root.join("graphs/Trees.md"),
        "---\ntags: [cs]\n---\nTrees are graphs. Back to [[graph theory#Graph Theory|the overview]].\n\n![[tree.png]]\n",
    )?;
    fs::write(root.join("graphs/tree.png"), &b"\x89PNG\x0d\x0a\x1a\x0a"[..])?;
    fs::write(root.join("graphs/Draft.md"), "---\ndraft: true\n---\nsecret")?;
    fs::write(root.join(".obsidian/workspace.json"), "{}")?;
    Ok(())
}

fn config(dir: &Path) -> Config {
    Config {
        title: String::from("Test Notes"),
        author: None,
        base_url: url::Url::parse("http://localhost/").unwrap(),
        vault_directory: dir.join("vault"),
        output_directory: dir.join("out"),
        theme_directory: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("theme"),
        recent: 15,
        ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
        time_source: TimeSource::Filesystem,
    }
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[test]
fn builds_a_vault() -> Result<()> {
    let dir = TempDir::new()?;
    vault(&dir.path().join("vault"))?;
    let config = config(dir.path());

    let report = build_site_at(&config, now())?;
    assert_eq!(
        report,
        Report {
            pages: 2,
            attachments: 1,
            directories: 1,
            dangling: 1,
        }
    );

    let out = dir.path().join("out");
    for file in &[
        "index.html",
        "Graph_Theory.html",
        "graphs/Trees.html",
        "graphs/tree.png",
        "graphs/index.html",
        "lastweek.html",
        "search.html",
        "search.json",
        "atom.xml",
        "style.css",
        "highlight.css",
        "search.js",
    ] {
        assert!(out.join(file).exists(), "missing {}", file);
    }
    assert!(!out.join("graphs/Draft.html").exists());
    assert!(!out.join(".obsidian").exists());

    // crosslinks and embeds are rewritten
    let trees = fs::read_to_string(out.join("graphs/Trees.html"))?;
    assert!(
        trees.contains(r#"<a href="/Graph_Theory.html#graph-theory">the overview</a>"#),
        "{}",
        trees
    );
    assert!(trees.contains("/graphs/tree.png"), "{}", trees);

    // Trees is referenced from Graph Theory
    let backlinks = &trees[trees.find("Backlinks").expect("backlinks section")..];
    assert!(backlinks.contains(r#"href="/Graph_Theory.html""#), "{}", trees);

    // and so is the graphs directory, from outside of it
    let graphs = fs::read_to_string(out.join("graphs/index.html"))?;
    assert!(graphs.contains(r#"href="/Graph_Theory.html""#), "{}", graphs);
    assert!(graphs.contains(r#"href="/graphs/Trees.html""#), "{}", graphs);

    let index = fs::read_to_string(out.join("index.html"))?;
    assert!(index.contains(r#"<a href="/graphs/index.html">graphs</a>"#), "{}", index);
    assert!(!index.contains("tree.png"), "{}", index);

    let search = fs::read_to_string(out.join("search.html"))?;
    assert!(search.contains("Trees are graphs"), "{}", search);
    Ok(())
}

#[test]
fn search_json_is_searchable() -> Result<()> {
    let dir = TempDir::new()?;
    vault(&dir.path().join("vault"))?;
    let config = config(dir.path());
    build_site_at(&config, now())?;

    let json = fs::read_to_string(dir.path().join("out/search.json"))?;
    let documents = payload::load(&json)?;
    assert_eq!(documents.len(), 2);

    let index = SearchIndex::new(documents);
    let mut page = SearchPage::new(SearchOptions::default());
    page.load(&index);
    page.input("graph");
    let titles: Vec<&str> = page.hits().iter().map(|h| h.document.title.as_str()).collect();
    assert_eq!(titles.first(), Some(&"Graph Theory"));
    assert!(titles.contains(&"Trees"));
    Ok(())
}

#[test]
fn rebuilds_over_previous_output() -> Result<()> {
    let dir = TempDir::new()?;
    vault(&dir.path().join("vault"))?;
    let config = config(dir.path());
    build_site_at(&config, now())?;

    fs::remove_file(dir.path().join("vault/Graph Theory.md"))?;
    let report = build_site_at(&config, now())?;
    assert_eq!(report.pages, 1);
    assert!(!dir.path().join("out/Graph_Theory.html").exists());
    Ok(())
}

#[test]
fn refuses_foreign_output_directory() -> Result<()> {
    let dir = TempDir::new()?;
    vault(&dir.path().join("vault"))?;
    fs::create_dir_all(dir.path().join("out"))?;
    fs::write(dir.path().join("out/thesis.tex"), "precious")?;

    assert!(build_site_at(&config(dir.path()), now()).is_err());
    assert!(dir.path().join("out/thesis.tex").exists());
    Ok(())
}

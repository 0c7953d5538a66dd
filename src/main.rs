use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use notesite::build::build_site;
use notesite::config::{Config, Overrides};
use notesite::engine::{SearchIndex, SearchOptions, SearchPage};
use notesite::highlight::to_terminal;
use notesite::payload;
use notesite::write::SEARCH_JSON_FILE;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let matches = App::new("notesite")
        .about("Publishes a vault of markdown notes as a static website")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("build")
                .about("Builds the site")
                .arg(config_arg())
                .arg(
                    Arg::with_name("path")
                        .long("path")
                        .takes_value(true)
                        .help("The vault directory"),
                )
                .arg(output_arg())
                .arg(
                    Arg::with_name("theme")
                        .long("theme")
                        .takes_value(true)
                        .help("The theme directory"),
                )
                .arg(
                    Arg::with_name("recent")
                        .long("recent")
                        .takes_value(true)
                        .help("How many recently updated pages to list"),
                )
                .arg(
                    Arg::with_name("use-git-times")
                        .long("use-git-times")
                        .help("Read created/updated times from git history"),
                ),
        )
        .subcommand(
            SubCommand::with_name("search")
                .about("Searches a built site")
                .arg(config_arg())
                .arg(output_arg())
                .arg(Arg::with_name("QUERY").required(true).multiple(true)),
        )
        .get_matches();

    match matches.subcommand() {
        ("build", Some(m)) => build(m),
        ("search", Some(m)) => search(m),
        _ => Err(anyhow!("unknown subcommand")),
    }
}

fn config_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("config")
        .long("config")
        .takes_value(true)
        .help("The project file (default: notesite.yaml in this or a parent directory)")
}

fn output_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("output")
        .long("output")
        .takes_value(true)
        .help("The output directory")
}

fn load_config(m: &ArgMatches) -> Result<Config> {
    match m.value_of("config") {
        Some(path) => Config::from_project_file(Path::new(path)),
        None => Config::from_directory(&std::env::current_dir()?),
    }
}

fn build(m: &ArgMatches) -> Result<()> {
    let mut config = load_config(m)?;
    config.apply(Overrides {
        vault: m.value_of("path").map(PathBuf::from),
        output: m.value_of("output").map(PathBuf::from),
        theme: m.value_of("theme").map(PathBuf::from),
        recent: m
            .value_of("recent")
            .map(|s| s.parse::<usize>())
            .transpose()
            .context("--recent must be a number")?,
        use_git_times: m.is_present("use-git-times"),
    });
    build_site(&config)?;
    Ok(())
}

fn search(m: &ArgMatches) -> Result<()> {
    let output = match m.value_of("output") {
        Some(output) => PathBuf::from(output),
        None => load_config(m)?.output_directory,
    };
    let query = m
        .values_of("QUERY")
        .map(|values| values.collect::<Vec<_>>().join(" "))
        .unwrap_or_default();

    let path = output.join(SEARCH_JSON_FILE);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("Reading `{}`; has the site been built?", path.display()))?;
    let index = SearchIndex::new(payload::load(&json)?);
    let mut page = SearchPage::new(SearchOptions::default());
    page.load(&index);
    page.input(&query);

    if !page.suggestions().is_empty() {
        println!("Did you mean: {}", page.suggestions().join(", "));
        println!();
    }
    if page.hits().is_empty() {
        println!("No results for `{}`", query);
    }
    for hit in page.hits() {
        println!("{}  /{}", to_terminal(&hit.title), hit.document.link_path);
        if !hit.snippet.is_empty() {
            println!("    {}", to_terminal(&hit.snippet).replace('\n', " "));
        }
    }
    Ok(())
}

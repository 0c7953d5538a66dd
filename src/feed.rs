//! Support for creating an Atom feed of recently updated pages.

use crate::config::Author;
use crate::page::PageRecord;
use atom_syndication::{Content, Entry, Error as AtomError, Feed, Link, Person};
use chrono::{DateTime, FixedOffset, Utc};
use std::fmt;
use std::io::Write;
use url::Url;

/// Bundled configuration for creating a feed.
pub struct FeedConfig {
    pub title: String,
    pub id: String,
    pub author: Option<Author>,
    pub home_page: Url,
}

/// Creates a feed from some configuration ([`FeedConfig`]) and a list of
/// pages, newest first, and writes the result to a [`std::io::Write`]. The
/// feed's `updated` time is `now`.
pub fn write_feed<W: Write>(
    config: &FeedConfig,
    pages: &[&PageRecord],
    now: DateTime<Utc>,
    w: W,
) -> Result<()> {
    feed(config, pages, now)?.write_to(w)?;
    Ok(())
}

fn feed(config: &FeedConfig, pages: &[&PageRecord], now: DateTime<Utc>) -> Result<Feed> {
    let mut feed = Feed::default();
    feed.set_title(config.title.clone());
    feed.set_id(config.id.clone());
    feed.set_updated(now);
    feed.set_authors(author_to_people(config.author.as_ref()));
    feed.set_links(vec![alternate(config.home_page.to_string())]);
    feed.set_entries(feed_entries(config, pages)?);
    Ok(feed)
}

fn feed_entries(config: &FeedConfig, pages: &[&PageRecord]) -> Result<Vec<Entry>> {
    let mut entries: Vec<Entry> = Vec::with_capacity(pages.len());

    for page in pages {
        let url = config.home_page.join(&page.link_path)?.to_string();

        let mut content = Content::default();
        content.set_content_type(Some("html".to_owned()));
        content.set_value(Some(page.contents.clone()));

        let mut entry = Entry::default();
        entry.set_id(url.clone());
        entry.set_title(page.title.clone());
        entry.set_updated(page.updated);
        let published: DateTime<FixedOffset> = page.created.into();
        entry.set_published(Some(published));
        entry.set_authors(author_to_people(config.author.as_ref()));
        entry.set_links(vec![alternate(url)]);
        entry.set_content(Some(content));
        entries.push(entry);
    }
    Ok(entries)
}

fn alternate(href: String) -> Link {
    let mut link = Link::default();
    link.set_href(href);
    link.set_rel("alternate");
    link
}

fn author_to_people(author: Option<&Author>) -> Vec<Person> {
    match author {
        Some(author) => {
            let mut person = Person::default();
            person.set_name(author.name.clone());
            person.set_email(author.email.clone());
            vec![person]
        }
        None => Vec::new(),
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem creating a feed. Variants include I/O, Atom, and
/// URL issues.
#[derive(Debug)]
pub enum Error {
    /// Returned when there is a generic I/O error.
    Io(std::io::Error),

    /// Returned when there is an Atom-related error.
    Atom(AtomError),

    /// Returned when a page's link path can't be joined onto the base URL.
    Url(url::ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Atom(err) => err.fmt(f),
            Error::Url(err) => write!(f, "building entry URL: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Atom(err) => Some(err),
            Error::Url(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<AtomError> for Error {
    fn from(err: AtomError) -> Error {
        Error::Atom(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::Url(err)
    }
}

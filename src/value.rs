//! Conversions from domain types into template [`Value`]s, plus the HTML
//! escaping used wherever we assemble markup by hand.

use crate::backlinks::Backlink;
use crate::page::PageRecord;
use chrono::{DateTime, Utc};
use gtmpl_value::Value;
use std::collections::HashMap;

/// Escapes `&`, `<`, `>` and `"`.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    // writing into a String can't fail
    let _ = pulldown_cmark::escape::escape_html(&mut out, s);
    out
}

/// The human-readable date format used in templates, e.g. `Mar 05, 2024`.
pub const DATE_FORMAT: &str = "%b %d, %Y";

fn date(m: &mut HashMap<String, Value>, key: &str, t: &DateTime<Utc>) {
    m.insert(key.to_owned(), Value::String(t.format(DATE_FORMAT).to_string()));
    m.insert(format!("{}_rfc3339", key), Value::String(t.to_rfc3339()));
}

impl From<&Backlink> for Value {
    fn from(b: &Backlink) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("title".to_owned(), Value::String(escape(&b.title)));
        m.insert("link_path".to_owned(), Value::String(b.link_path.clone()));
        Value::Object(m)
    }
}

/// A page summary: everything but the contents. Used for listings.
pub fn summarize(record: &PageRecord) -> Value {
    let mut m: HashMap<String, Value> = HashMap::new();
    m.insert("title".to_owned(), Value::String(escape(&record.title)));
    m.insert("link_path".to_owned(), Value::String(record.link_path.clone()));
    m.insert(
        "title_path".to_owned(),
        Value::String(escape(&record.title_path)),
    );
    date(&mut m, "created", &record.created);
    date(&mut m, "updated", &record.updated);
    Value::Object(m)
}

impl From<&PageRecord> for Value {
    /// Converts a page into a [`Value::Object`] with the fields of
    /// [`summarize`] plus the rendered `contents`.
    fn from(record: &PageRecord) -> Value {
        let mut value = summarize(record);
        if let Value::Object(m) = &mut value {
            m.insert("contents".to_owned(), Value::String(record.contents.clone()));
        }
        value
    }
}

/// Converts backlinks into a [`Value::Array`].
pub fn backlinks(backlinks: &[Backlink]) -> Value {
    Value::Array(backlinks.iter().map(Value::from).collect())
}

/// Converts page summaries into a [`Value::Array`].
pub fn summaries<'a, I: IntoIterator<Item = &'a PageRecord>>(records: I) -> Value {
    Value::Array(records.into_iter().map(summarize).collect())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::record;

    fn string<'v>(value: &'v Value, key: &str) -> Option<&'v str> {
        match value {
            Value::Object(m) => match m.get(key) {
                Some(Value::String(s)) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">&</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_page_value() {
        let mut r = record("graphs/C_Tips.html", &[]);
        r.title = String::from("C<T> tips");
        r.contents = String::from("<p>hi</p>");
        let value = Value::from(&r);
        assert_eq!(string(&value, "title"), Some("C&lt;T&gt; tips"));
        assert_eq!(string(&value, "contents"), Some("<p>hi</p>"));
        let created = r.created.format(DATE_FORMAT).to_string();
        assert_eq!(string(&value, "created"), Some(created.as_str()));
        assert!(string(&summarize(&r), "contents").is_none());
    }
}

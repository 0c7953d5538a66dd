//! The search payload: a flat array of [`SearchDocument`]s, one per page,
//! serialized to JSON and embedded in the search page where the browser
//! indexes it at load time.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::page::PageRecord;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub title: String,

    /// Plain text of the page. May be empty, in which case only the title is
    /// searchable.
    #[serde(default)]
    pub contents: String,

    /// The breadcrumb, e.g. `data_analytics/duckdb`.
    #[serde(default)]
    pub title_path: String,

    pub link_path: String,
}

impl From<&PageRecord> for SearchDocument {
    fn from(record: &PageRecord) -> SearchDocument {
        SearchDocument {
            title: record.title.clone(),
            contents: record.text.clone(),
            title_path: record.title_path.clone(),
            link_path: record.link_path.clone(),
        }
    }
}

/// Projects every non-attachment record into a [`SearchDocument`].
pub fn build(records: &[PageRecord]) -> Vec<SearchDocument> {
    records
        .iter()
        .filter(|r| !r.attachment)
        .map(SearchDocument::from)
        .collect()
}

pub fn to_json(documents: &[SearchDocument]) -> serde_json::Result<String> {
    serde_json::to_string(documents)
}

/// Makes JSON safe to place inside a `<script>` element: a `</script>` in a
/// note must not end the element early.
pub fn embed(json: &str) -> String {
    json.replace("</", "<\\/")
}

/// Parses a payload. Elements that aren't valid documents (missing `title`
/// or `link_path`, wrong types) are skipped rather than failing the whole
/// payload; only a payload which isn't a JSON array is an error.
pub fn load(json: &str) -> serde_json::Result<Vec<SearchDocument>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    Ok(values
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value(value) {
            Ok(document) => Some(document),
            Err(e) => {
                warn!(index = i, error = %e, "skipping malformed search document");
                None
            }
        })
        .collect())
}

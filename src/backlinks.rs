//! The backlink index: for every record, the pages that reference it. The
//! index is a derived lookup table built in one pass over all records after
//! they are known; records themselves never point back at their referrers.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::page::PageRecord;

/// A reference *from* another page, recorded against the page it points to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Backlink {
    /// The referencing page's title.
    pub title: String,

    /// The referencing page's link path.
    pub link_path: String,
}

impl From<&PageRecord> for Backlink {
    fn from(record: &PageRecord) -> Backlink {
        Backlink {
            title: record.title.clone(),
            link_path: record.link_path.clone(),
        }
    }
}

/// Maps a link path to the pages that reference it.
#[derive(Debug, Default)]
pub struct BacklinkIndex {
    backlinks: HashMap<String, Vec<Backlink>>,
    dangling: usize,
}

impl BacklinkIndex {
    /// Builds the index. Backlinks for each target are listed in the order
    /// their source pages appear in `records`, each source at most once.
    /// Self references are dropped. References to link paths that no
    /// record has are counted as dangling, as are the targets which never
    /// resolved in the first place ([`PageRecord::dangling`]).
    pub fn build(records: &[PageRecord]) -> BacklinkIndex {
        let known: HashSet<&str> = records.iter().map(|r| r.link_path.as_str()).collect();
        let mut index = BacklinkIndex::default();

        for record in records {
            for target in &record.dangling {
                debug!(source = %record.link_path, target = %target, "dangling link");
                index.dangling += 1;
            }
            for target in &record.references {
                if target == &record.link_path {
                    continue;
                }
                if !known.contains(target.as_str()) {
                    debug!(source = %record.link_path, target = %target, "dangling link");
                    index.dangling += 1;
                    continue;
                }
                let entry = index.backlinks.entry(target.clone()).or_default();
                if !entry.iter().any(|b| b.link_path == record.link_path) {
                    entry.push(Backlink::from(record));
                }
            }
        }

        if index.dangling > 0 {
            info!(count = index.dangling, "links to unpublished pages");
        }
        index
    }

    /// Returns the pages which reference `link_path`.
    pub fn get(&self, link_path: &str) -> &[Backlink] {
        self.backlinks
            .get(link_path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the number of references which didn't resolve to a record.
    pub fn dangling(&self) -> usize {
        self.dangling
    }

    /// Aggregates backlinks for the directory at `dir` (empty for the
    /// root) over `descendants`, the records below it. Sources inside the
    /// directory are excluded. The result is deduplicated by source and
    /// sorted by lower-cased title, then by link path.
    pub fn for_directory<'r, I>(&self, dir: &str, descendants: I) -> Vec<Backlink>
    where
        I: IntoIterator<Item = &'r PageRecord>,
    {
        let mut seen = HashSet::new();
        let mut out: Vec<Backlink> = descendants
            .into_iter()
            .flat_map(|record| self.get(&record.link_path))
            .filter(|backlink| !is_within(dir, &backlink.link_path))
            .filter(|backlink| seen.insert(backlink.link_path.clone()))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then_with(|| a.link_path.cmp(&b.link_path))
        });
        out
    }
}

/// Reports whether `link_path` lies in the subtree of directory `dir`.
pub fn is_within(dir: &str, link_path: &str) -> bool {
    dir.is_empty()
        || link_path
            .strip_prefix(dir)
            .map_or(false, |rest| rest.starts_with('/'))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::record;
    use proptest::prelude::*;

    fn records() -> Vec<PageRecord> {
        vec![
            record("graphs/Graph_Theory.html", &["graphs/Trees.html", "graphs/Graph_Theory.html"]),
            record("graphs/Trees.html", &["Index.html", "images/tree.png"]),
            record("Index.html", &["graphs/Trees.html", "graphs/Trees.html", "missing.html"]),
            record("Notes.html", &["graphs/Graph_Theory.html", "Index.html"]),
            record("images/tree.png", &[]),
        ]
    }

    fn paths(backlinks: &[Backlink]) -> Vec<&str> {
        backlinks.iter().map(|b| b.link_path.as_str()).collect()
    }

    #[test]
    fn test_build() {
        let records = records();
        let index = BacklinkIndex::build(&records);
        assert_eq!(
            paths(index.get("graphs/Trees.html")),
            vec!["graphs/Graph_Theory.html", "Index.html"]
        );
        assert_eq!(paths(index.get("Index.html")), vec!["graphs/Trees.html", "Notes.html"]);
        assert_eq!(paths(index.get("images/tree.png")), vec!["graphs/Trees.html"]);
        // self references are dropped
        assert_eq!(paths(index.get("graphs/Graph_Theory.html")), vec!["Notes.html"]);
        assert!(index.get("Notes.html").is_empty());
        assert_eq!(index.dangling(), 1);
    }

    #[test]
    fn test_for_directory() {
        let records = records();
        let index = BacklinkIndex::build(&records);
        let graphs: Vec<&PageRecord> = records
            .iter()
            .filter(|r| is_within("graphs", &r.link_path))
            .collect();
        let backlinks = index.for_directory("graphs", graphs);
        assert_eq!(paths(&backlinks), vec!["Index.html", "Notes.html"]);

        assert!(index.for_directory("", records.iter()).is_empty());
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("graphs", "graphs/Trees.html"));
        assert!(is_within("graphs", "graphs/sub/Trees.html"));
        assert!(!is_within("graphs", "graphsx/Trees.html"));
        assert!(!is_within("graphs", "Trees.html"));
        assert!(is_within("", "Trees.html"));
    }

    proptest! {
        #[test]
        fn backlinks_point_from_referrer_and_never_to_self(
            edges in proptest::collection::vec((0usize..8, 0usize..8), 0..40)
        ) {
            let names: Vec<String> = (0..8).map(|i| format!("d{}/p{}.html", i % 3, i)).collect();
            let records: Vec<PageRecord> = (0..8)
                .map(|i| {
                    let refs: Vec<&str> = edges
                        .iter()
                        .filter(|(from, _)| *from == i)
                        .map(|(_, to)| names[*to].as_str())
                        .collect();
                    record(&names[i], &refs)
                })
                .collect();
            let index = BacklinkIndex::build(&records);
            for (from, to) in &edges {
                let listed = index.get(&names[*to]).iter().any(|b| b.link_path == names[*from]);
                prop_assert_eq!(listed, from != to);
            }
            for name in &names {
                prop_assert!(index.get(name).iter().all(|b| &b.link_path != name));
                let dir = name.split('/').next().unwrap();
                let inside: Vec<&PageRecord> = records.iter().filter(|r| is_within(dir, &r.link_path)).collect();
                for backlink in index.for_directory(dir, inside) {
                    prop_assert!(!is_within(dir, &backlink.link_path));
                }
            }
        }
    }
}

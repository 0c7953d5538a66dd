//! The search engine behind the search page. [`SearchIndex`] indexes the
//! search payload ([`crate::payload`]) and answers fuzzy, prefix-aware
//! queries ranked with BM25+; [`SearchPage`] is the page's state machine,
//! which re-runs a search on every change of the query text and keeps the
//! capped, highlighted results and autosuggestions for display.
//!
//! The theme's `search.js` implements the same behaviour in the browser;
//! the `search` subcommand runs this implementation against a built site.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::highlight::{self, Highlighter, Segment};
use crate::payload::SearchDocument;

/// Tuning knobs for search and autosuggest.
#[derive(Clone, Debug)]
pub struct SearchOptions {
    /// Maximum edit distance as a fraction of the query term's length.
    pub fuzzy: f64,

    /// Whether query terms also match indexed terms they are a prefix of.
    pub prefix: bool,

    /// Score multiplier for title matches. Contents matches count once.
    pub title_boost: f64,

    /// Cap on displayed results.
    pub max_results: usize,

    /// Cap on displayed suggestions.
    pub max_suggestions: usize,

    /// Width of contents snippets, in bytes.
    pub snippet_width: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            fuzzy: 0.2,
            prefix: true,
            title_boost: 2.0,
            max_results: 25,
            max_suggestions: 15,
            snippet_width: 240,
        }
    }
}

const PREFIX_WEIGHT: f64 = 0.375;
const FUZZY_WEIGHT: f64 = 0.45;
const MAX_FUZZY: usize = 6;

// BM25+ parameters
const K: f64 = 1.2;
const B: f64 = 0.7;
const D: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Title = 0,
    Contents = 1,
}

const FIELDS: [Field; 2] = [Field::Title, Field::Contents];

static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\n\r\p{Z}\p{P}]+").unwrap());

/// Splits text into lower-cased terms on runs of whitespace and
/// punctuation.
pub fn tokenize(text: &str) -> Vec<String> {
    SEPARATOR_RE
        .split(text)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Term frequencies per field for one document.
type Frequencies = [u32; 2];

/// An immutable inverted index over a set of [`SearchDocument`]s.
#[derive(Debug, Default)]
pub struct SearchIndex {
    documents: Vec<SearchDocument>,
    postings: BTreeMap<String, BTreeMap<usize, Frequencies>>,
    field_lengths: Vec<[usize; 2]>,
    average_lengths: [f64; 2],
}

/// A document matching a query.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchResult {
    /// The document's position in the index.
    pub id: usize,
    pub score: f64,

    /// The indexed terms that matched, in the order they were found.
    pub terms: Vec<String>,

    /// The query terms that matched something in the document.
    pub query_terms: Vec<String>,
}

/// A query completion.
#[derive(Clone, Debug, PartialEq)]
pub struct Suggestion {
    pub suggestion: String,
    pub terms: Vec<String>,
    pub score: f64,
}

#[derive(Clone, Copy)]
enum Combine {
    Or,
    And,
}

#[derive(Clone, Copy)]
enum Prefix {
    All,
    Last,
    None,
}

impl Prefix {
    fn applies(self, i: usize, len: usize) -> bool {
        match self {
            Prefix::All => true,
            Prefix::Last => i + 1 == len,
            Prefix::None => false,
        }
    }
}

struct Query {
    fuzzy: f64,
    prefix: Prefix,
    combine: Combine,
    title_boost: f64,
}

#[derive(Default)]
struct Accumulator {
    score: f64,
    terms: Vec<String>,
    query_terms: Vec<String>,
}

impl Accumulator {
    fn merge(&mut self, other: Accumulator) {
        self.score += other.score;
        for term in other.terms {
            if !self.terms.contains(&term) {
                self.terms.push(term);
            }
        }
        self.query_terms.extend(other.query_terms);
    }
}

impl SearchIndex {
    /// Indexes `documents`. Documents with empty contents are indexed by
    /// title alone.
    pub fn new(documents: Vec<SearchDocument>) -> SearchIndex {
        let mut postings: BTreeMap<String, BTreeMap<usize, Frequencies>> = BTreeMap::new();
        let mut field_lengths = Vec::with_capacity(documents.len());
        let mut totals = [0usize; 2];

        for (id, document) in documents.iter().enumerate() {
            let mut lengths = [0usize; 2];
            for field in FIELDS.iter().copied() {
                let text = match field {
                    Field::Title => &document.title,
                    Field::Contents => &document.contents,
                };
                let terms = tokenize(text);
                lengths[field as usize] = terms.len();
                totals[field as usize] += terms.len();
                for term in terms {
                    postings.entry(term).or_default().entry(id).or_insert([0, 0])
                        [field as usize] += 1;
                }
            }
            field_lengths.push(lengths);
        }

        let n = documents.len().max(1) as f64;
        SearchIndex {
            documents,
            postings,
            field_lengths,
            average_lengths: [totals[0] as f64 / n, totals[1] as f64 / n],
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn document(&self, id: usize) -> Option<&SearchDocument> {
        self.documents.get(id)
    }

    /// Searches titles and contents. Query terms are combined with OR; each
    /// may match indexed terms exactly, as a prefix, or within an edit
    /// distance of `fuzzy` times its length. Results are sorted by score,
    /// ties by document order. Results are not capped.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchResult> {
        self.execute(
            query,
            &Query {
                fuzzy: options.fuzzy,
                prefix: if options.prefix { Prefix::All } else { Prefix::None },
                combine: Combine::Or,
                title_boost: options.title_boost,
            },
        )
    }

    /// Suggests completions of `query`. Every query term must match (AND)
    /// and only the last one may match as a prefix. The matched terms of
    /// each result form a suggestion; scores of equal suggestions add up.
    /// Suggestions are sorted by score, ties by text. They are not capped
    /// or filtered; see [`SearchPage`] for that.
    pub fn suggest(&self, query: &str, options: &SearchOptions) -> Vec<Suggestion> {
        let results = self.execute(
            query,
            &Query {
                fuzzy: options.fuzzy,
                prefix: Prefix::Last,
                combine: Combine::And,
                title_boost: options.title_boost,
            },
        );

        let mut suggestions: Vec<Suggestion> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for result in results {
            let phrase = result.terms.join(" ");
            match positions.get(&phrase) {
                Some(&i) => suggestions[i].score += result.score,
                None => {
                    positions.insert(phrase.clone(), suggestions.len());
                    suggestions.push(Suggestion {
                        suggestion: phrase,
                        terms: result.terms,
                        score: result.score,
                    });
                }
            }
        }
        suggestions.sort_by(|a, b| {
            by_score(a.score, b.score).then_with(|| a.suggestion.cmp(&b.suggestion))
        });
        suggestions
    }

    fn execute(&self, query: &str, q: &Query) -> Vec<SearchResult> {
        let mut terms = tokenize(query);
        dedup_in_order(&mut terms);
        if terms.is_empty() || self.documents.is_empty() {
            return Vec::new();
        }

        let mut combined: Option<BTreeMap<usize, Accumulator>> = None;
        for (i, term) in terms.iter().enumerate() {
            let matches = self.expand(term, q.prefix.applies(i, terms.len()), q.fuzzy);
            let scored = self.score_term(term, &matches, q.title_boost);
            combined = Some(match (combined, q.combine) {
                (None, _) => scored,
                (Some(mut acc), Combine::Or) => {
                    for (id, a) in scored {
                        acc.entry(id).or_default().merge(a);
                    }
                    acc
                }
                (Some(acc), Combine::And) => {
                    let mut scored = scored;
                    acc.into_iter()
                        .filter_map(|(id, mut a)| {
                            scored.remove(&id).map(|b| {
                                a.merge(b);
                                (id, a)
                            })
                        })
                        .collect()
                }
            });
        }

        let mut results: Vec<SearchResult> = combined
            .unwrap_or_default()
            .into_iter()
            .map(|(id, a)| SearchResult {
                id,
                score: a.score,
                terms: a.terms,
                query_terms: a.query_terms,
            })
            .collect();
        results.sort_by(|a, b| by_score(a.score, b.score).then_with(|| a.id.cmp(&b.id)));
        results
    }

    /// Finds the indexed terms `term` matches and the weight of each match.
    /// A term matched several ways keeps its best weight.
    fn expand<'s>(&'s self, term: &str, prefix: bool, fuzzy: f64) -> BTreeMap<&'s str, f64> {
        let mut matches: BTreeMap<&str, f64> = BTreeMap::new();
        let mut keep_best = |matched: &'s str, weight: f64| {
            let slot = matches.entry(matched).or_insert(0.0);
            if weight > *slot {
                *slot = weight;
            }
        };
        let length = term.chars().count();

        if let Some((matched, _)) = self.postings.get_key_value(term) {
            keep_best(matched.as_str(), 1.0);
        }

        if prefix {
            let range = self
                .postings
                .range::<str, _>((Bound::Included(term), Bound::Unbounded))
                .take_while(|(candidate, _)| candidate.starts_with(term));
            for (candidate, _) in range {
                let distance = candidate.chars().count() - length;
                if distance > 0 {
                    let weight =
                        PREFIX_WEIGHT * length as f64 / (length as f64 + 0.3 * distance as f64);
                    keep_best(candidate.as_str(), weight);
                }
            }
        }

        let max_distance = ((fuzzy * length as f64).round() as usize).min(MAX_FUZZY);
        if max_distance > 0 {
            let chars: Vec<char> = term.chars().collect();
            for candidate in self.postings.keys() {
                if let Some(distance) = bounded_levenshtein(&chars, candidate, max_distance) {
                    if distance > 0 {
                        let weight =
                            FUZZY_WEIGHT * length as f64 / (length as f64 + distance as f64);
                        keep_best(candidate.as_str(), weight);
                    }
                }
            }
        }

        matches
    }

    fn score_term(
        &self,
        query_term: &str,
        matches: &BTreeMap<&str, f64>,
        title_boost: f64,
    ) -> BTreeMap<usize, Accumulator> {
        let n = self.documents.len() as f64;
        let mut scored: BTreeMap<usize, Accumulator> = BTreeMap::new();

        for (&matched, &weight) in matches {
            let postings = match self.postings.get(matched) {
                Some(postings) => postings,
                None => continue,
            };
            for field in FIELDS.iter().copied() {
                let f = field as usize;
                let df = postings.values().filter(|tf| tf[f] > 0).count() as f64;
                if df == 0.0 {
                    continue;
                }
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                let boost = match field {
                    Field::Title => title_boost,
                    Field::Contents => 1.0,
                };
                for (&id, tf) in postings {
                    if tf[f] == 0 {
                        continue;
                    }
                    let tf = tf[f] as f64;
                    let length = self.field_lengths[id][f] as f64;
                    let average = self.average_lengths[f].max(1.0);
                    let bm25 = idf
                        * (D + tf * (K + 1.0) / (tf + K * (1.0 - B + B * length / average)));
                    let acc = scored.entry(id).or_default();
                    acc.score += weight * boost * bm25;
                    if !acc.terms.iter().any(|t| t == matched) {
                        acc.terms.push(matched.to_owned());
                    }
                }
            }
        }

        for acc in scored.values_mut() {
            acc.query_terms.push(query_term.to_owned());
        }
        scored
    }
}

fn by_score(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn dedup_in_order(terms: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    terms.retain(|t| seen.insert(t.clone()));
}

/// Levenshtein distance between `a` and `b`, or `None` if it exceeds
/// `max`.
fn bounded_levenshtein(a: &[char], b: &str, max: usize) -> Option<usize> {
    let b: Vec<char> = b.chars().collect();
    let diff = if a.len() > b.len() {
        a.len() - b.len()
    } else {
        b.len() - a.len()
    };
    if diff > max {
        return None;
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        let mut row_min = current[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (previous[j] + cost)
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
            row_min = row_min.min(current[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut previous, &mut current);
    }

    let distance = previous[b.len()];
    if distance <= max {
        Some(distance)
    } else {
        None
    }
}

/// Where the search page is in its cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// No index yet.
    Idle,

    /// Index built; results reflect the last query (possibly nothing).
    Ready,

    /// A search for the current query is running.
    Querying,
}

/// A result prepared for display.
#[derive(Clone, Debug)]
pub struct Hit<'i> {
    pub document: &'i SearchDocument,
    pub score: f64,
    pub title: Vec<Segment<'i>>,
    pub snippet: Vec<Segment<'i>>,
}

/// The search page: one input driving a suggestion list and a result list.
/// Every input change runs one synchronous search against the immutable
/// index.
pub struct SearchPage<'i> {
    index: Option<&'i SearchIndex>,
    options: SearchOptions,
    phase: Phase,
    query: String,
    hits: Vec<Hit<'i>>,
    suggestions: Vec<String>,
}

impl<'i> SearchPage<'i> {
    pub fn new(options: SearchOptions) -> SearchPage<'i> {
        SearchPage {
            index: None,
            options,
            phase: Phase::Idle,
            query: String::new(),
            hits: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Attaches the index and shows results for any query typed so far.
    pub fn load(&mut self, index: &'i SearchIndex) {
        self.index = Some(index);
        self.phase = Phase::Ready;
        let query = std::mem::take(&mut self.query);
        self.input(&query);
    }

    /// Handles a change of the query text.
    pub fn input(&mut self, query: &str) {
        self.query = query.to_owned();
        self.hits.clear();
        self.suggestions.clear();

        let index = match self.index {
            Some(index) => index,
            None => return,
        };
        if query.trim().is_empty() {
            self.phase = Phase::Ready;
            return;
        }

        self.phase = Phase::Querying;
        self.suggestions = self.autosuggest(index, query);
        self.hits = index
            .search(query, &self.options)
            .into_iter()
            .take(self.options.max_results)
            .filter_map(|result| self.hit(index, result))
            .collect();
        self.phase = Phase::Ready;
    }

    fn autosuggest(&self, index: &SearchIndex, query: &str) -> Vec<String> {
        let literal = query.trim().to_lowercase();
        let mut first_terms = std::collections::HashSet::new();
        index
            .suggest(query, &self.options)
            .into_iter()
            .filter(|s| s.suggestion != literal)
            .filter(|s| first_terms.insert(s.terms.first().cloned().unwrap_or_default()))
            .take(self.options.max_suggestions)
            .map(|s| s.suggestion)
            .collect()
    }

    fn hit(&self, index: &'i SearchIndex, result: SearchResult) -> Option<Hit<'i>> {
        let document = index.document(result.id)?;
        let highlighter = Highlighter::new(result.terms.as_slice());
        let snippet = match &highlighter {
            Some(h) => h.snippet(&document.contents, self.options.snippet_width),
            None => highlight::split(None, &document.contents),
        };
        Some(Hit {
            document,
            score: result.score,
            title: highlight::split(highlighter.as_ref(), &document.title),
            snippet,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn hits(&self) -> &[Hit<'i>] {
        &self.hits
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }
}

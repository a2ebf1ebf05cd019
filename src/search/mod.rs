//! Keyword search: a BM25 inverted index over text chunks.
//!
//! [`SearchIndex`] is immutable once built. [`SharedIndex`] wraps it for
//! concurrent readers and atomic rebuilds, and [`corpus`] turns documentation
//! directories into indexable chunks.

pub mod corpus;
pub mod shared;

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::{SearchError, SearchResult};

pub use shared::SharedIndex;

static RE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}_]+").unwrap());

/// Split text into lower-cased runs of letters, digits and underscores,
/// after NFKC normalization.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text.nfkc().collect::<String>().to_lowercase();
    RE_TOKEN
        .find_iter(&normalized)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// BM25 tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization, in `[0, 1]`.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

impl Bm25Params {
    fn validate(&self) -> SearchResult<()> {
        if !self.k1.is_finite() || self.k1 < 0.0 {
            return Err(SearchError::IndexBuildFailure {
                message: format!("k1 must be a finite non-negative number, got {}", self.k1),
            });
        }
        if !self.b.is_finite() || !(0.0..=1.0).contains(&self.b) {
            return Err(SearchError::IndexBuildFailure {
                message: format!("b must lie in [0, 1], got {}", self.b),
            });
        }
        Ok(())
    }
}

/// A document submitted for indexing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDocument {
    pub id: String,
    /// Where the text came from (a file path, a URL, a label).
    pub source: String,
    pub text: String,
}

impl SearchDocument {
    pub fn new(id: impl Into<String>, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            text: text.into(),
        }
    }
}

/// A ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub source: String,
    pub score: f64,
    pub text: String,
}

#[derive(Debug)]
struct IndexedDoc {
    doc: SearchDocument,
    len: usize,
    term_counts: HashMap<String, u32>,
}

/// Immutable BM25 index.
#[derive(Debug)]
pub struct SearchIndex {
    docs: Vec<IndexedDoc>,
    doc_freq: HashMap<String, usize>,
    avg_len: f64,
    params: Bm25Params,
}

impl SearchIndex {
    /// Build an index. Document ids must be unique.
    pub fn build(documents: Vec<SearchDocument>, params: Bm25Params) -> SearchResult<Self> {
        params.validate()?;

        let mut seen = HashSet::with_capacity(documents.len());
        for doc in &documents {
            if !seen.insert(doc.id.as_str()) {
                return Err(SearchError::IndexBuildFailure {
                    message: format!("duplicate document id \"{}\"", doc.id),
                });
            }
        }

        let docs: Vec<IndexedDoc> = documents
            .into_par_iter()
            .map(|doc| {
                let tokens = tokenize(&doc.text);
                let mut term_counts: HashMap<String, u32> = HashMap::new();
                for token in &tokens {
                    *term_counts.entry(token.clone()).or_insert(0) += 1;
                }
                IndexedDoc {
                    doc,
                    len: tokens.len(),
                    term_counts,
                }
            })
            .collect();

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for d in &docs {
            for term in d.term_counts.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let total_len: usize = docs.iter().map(|d| d.len).sum();
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        Ok(Self {
            docs,
            doc_freq,
            avg_len,
            params,
        })
    }

    /// An index with no documents.
    pub fn empty() -> Self {
        Self {
            docs: Vec::new(),
            doc_freq: HashMap::new(),
            avg_len: 0.0,
            params: Bm25Params::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// Number of documents containing `term` (already tokenized).
    pub fn doc_freq(&self, term: &str) -> usize {
        self.doc_freq.get(term).copied().unwrap_or(0)
    }

    /// Always positive, even for terms present in every document.
    fn idf(&self, term: &str) -> f64 {
        let n = self.docs.len() as f64;
        let df = self.doc_freq(term) as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    fn score_doc(&self, doc: &IndexedDoc, query_terms: &[String]) -> f64 {
        let Bm25Params { k1, b } = self.params;
        let avg = if self.avg_len > 0.0 { self.avg_len } else { 1.0 };
        let norm = k1 * (1.0 - b + b * doc.len as f64 / avg);
        query_terms
            .iter()
            .filter_map(|term| {
                let tf = *doc.term_counts.get(term)? as f64;
                Some(self.idf(term) * tf * (k1 + 1.0) / (tf + norm))
            })
            .sum()
    }

    /// BM25 score of one document against `query`, or `None` for an unknown id.
    pub fn score(&self, query: &str, doc_id: &str) -> Option<f64> {
        let terms = tokenize(query);
        self.docs
            .iter()
            .find(|d| d.doc.id == doc_id)
            .map(|d| self.score_doc(d, &terms))
    }

    /// Rank every document against `query` and keep the best `top_k`.
    ///
    /// Ties keep corpus order. Repeated query terms count once per occurrence.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let terms = tokenize(query);
        let mut scored: Vec<(usize, f64)> = self
            .docs
            .iter()
            .enumerate()
            .map(|(i, d)| (i, self.score_doc(d, &terms)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| {
                let doc = &self.docs[i].doc;
                SearchHit {
                    id: doc.id.clone(),
                    source: doc.source.clone(),
                    score,
                    text: doc.text.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(docs: &[(&str, &str)]) -> SearchIndex {
        let docs = docs
            .iter()
            .map(|(id, text)| SearchDocument::new(*id, "test", *text))
            .collect();
        SearchIndex::build(docs, Bm25Params::default()).unwrap()
    }

    #[test]
    fn tokenize_normalizes() {
        assert_eq!(
            tokenize("Hello, WORLD! snake_case x2"),
            vec!["hello", "world", "snake_case", "x2"]
        );
        // Full-width letters fold under NFKC.
        assert_eq!(tokenize("ＡＢＣ"), vec!["abc"]);
        assert!(tokenize("  ... ").is_empty());
    }

    #[test]
    fn matching_doc_ranks_first() {
        let idx = index(&[
            ("d1", "alpha beta"),
            ("d2", "gamma delta"),
            ("d3", "alpha alpha"),
        ]);
        let hits = idx.search("alpha", 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "d3");
        assert_eq!(hits[1].id, "d1");
        assert_eq!(hits[2].id, "d2");
        assert_eq!(hits[2].score, 0.0);
    }

    #[test]
    fn length_normalization_on_short_and_long_docs() {
        let idx = index(&[("d1", "alpha beta"), ("d2", "alpha alpha beta beta gamma")]);
        // N = 2, df = 2, avgdl = 3.5, idf = ln(1.2).
        let idf = 1.2f64.ln();
        let d1 = idf * 2.5 / (1.0 + 1.5 * (0.25 + 0.75 * 2.0 / 3.5));
        let d2 = idf * 5.0 / (2.0 + 1.5 * (0.25 + 0.75 * 5.0 / 3.5));

        let hits = idx.search("alpha", 2);
        assert_eq!(hits[0].id, "d2");
        assert_eq!(hits[1].id, "d1");
        assert!((hits[0].score - d2).abs() < 1e-12);
        assert!((hits[1].score - d1).abs() < 1e-12);
        assert!(hits[0].score > hits[1].score);

        assert_eq!(idx.score("omega", "d1"), Some(0.0));
        assert_eq!(idx.score("omega", "d2"), Some(0.0));
    }

    #[test]
    fn score_monotone_in_term_frequency() {
        let idx = index(&[
            ("one", "rust tokio serde axum"),
            ("two", "rust rust serde axum"),
            ("three", "rust rust rust axum"),
            ("other", "python django flask celery"),
        ]);
        let s1 = idx.score("rust", "one").unwrap();
        let s2 = idx.score("rust", "two").unwrap();
        let s3 = idx.score("rust", "three").unwrap();
        assert!(s1 < s2 && s2 < s3);
    }

    #[test]
    fn absent_terms_contribute_nothing() {
        let idx = index(&[("a", "graph engine routing"), ("b", "bm25 index search")]);
        for id in ["a", "b"] {
            let base = idx.score("routing search", id).unwrap();
            let with_absent = idx.score("routing search zzzunknown", id).unwrap();
            assert_eq!(base, with_absent);
        }
    }

    #[test]
    fn idf_positive_for_ubiquitous_terms() {
        let idx = index(&[("a", "common x"), ("b", "common y")]);
        assert!(idx.score("common", "a").unwrap() > 0.0);
    }

    #[test]
    fn top_k_truncates_and_saturates() {
        let idx = index(&[("a", "x"), ("b", "y"), ("c", "z")]);
        assert_eq!(idx.search("x", 1).len(), 1);
        assert_eq!(idx.search("x", 10).len(), 3);
        assert!(idx.search("x", 0).is_empty());
    }

    #[test]
    fn ties_keep_corpus_order() {
        let idx = index(&[("first", "same words"), ("second", "same words")]);
        let hits = idx.search("same", 2);
        assert_eq!(hits[0].id, "first");
        assert_eq!(hits[1].id, "second");
    }

    #[test]
    fn duplicate_ids_rejected() {
        let docs = vec![
            SearchDocument::new("dup", "s", "a"),
            SearchDocument::new("dup", "s", "b"),
        ];
        assert!(matches!(
            SearchIndex::build(docs, Bm25Params::default()),
            Err(SearchError::IndexBuildFailure { .. })
        ));
    }

    #[test]
    fn invalid_params_rejected() {
        let bad = Bm25Params { k1: 1.2, b: 1.5 };
        assert!(SearchIndex::build(Vec::new(), bad).is_err());
        let bad = Bm25Params { k1: f64::NAN, b: 0.5 };
        assert!(SearchIndex::build(Vec::new(), bad).is_err());
    }

    #[test]
    fn empty_index_returns_nothing() {
        assert!(SearchIndex::empty().search("anything", 5).is_empty());
    }
}

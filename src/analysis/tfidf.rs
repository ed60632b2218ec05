//! TF-IDF (Term Frequency-Inverse Document Frequency) vectorizer implementation.
//!
//! Both feature spaces of the analysis use this vectorizer: the document
//! encoder over each user's raw tokens and the concept encoder over each
//! user's concept phrases. A document is a list of token groups; every group
//! is split on whitespace, so single tokens stay as they are and multi-word
//! concept phrases contribute their words.

use super::cache::ArtifactCache;
use crate::error::{AnalysisError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Row normalisation applied after IDF weighting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    /// Rows sum to one
    L1,
    /// Rows have unit Euclidean length
    #[default]
    L2,
    None,
}

/// TF-IDF vectorizer for converting token groups to numerical features.
///
/// This implementation:
/// - Selects the top N terms by total corpus frequency (ties by term)
/// - Orders columns lexicographically
/// - Uses smoothed IDF, `ln((1 + n) / (1 + df)) + 1`
/// - Applies the configured row normalisation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TfidfVectorizer {
    /// Term to column index mapping
    pub vocabulary: BTreeMap<String, usize>,
    /// Inverse document frequency for each column
    pub idf: Vec<f64>,
    /// Maximum number of columns to keep
    pub max_features: usize,
    pub norm: Norm,
    fitted: bool,
}

fn analyze<D: AsRef<[String]>>(document: &D) -> impl Iterator<Item = &str> {
    document
        .as_ref()
        .iter()
        .flat_map(|group| group.split_whitespace())
}

impl TfidfVectorizer {
    /// Create an unfitted vectorizer.
    ///
    /// # Arguments
    ///
    /// * `max_features` - Maximum number of terms to keep
    /// * `norm` - Row normalisation
    pub fn new(max_features: usize, norm: Norm) -> Self {
        TfidfVectorizer {
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
            max_features,
            norm,
            fitted: false,
        }
    }

    /// Fit the vectorizer on a collection of documents.
    ///
    /// This builds the vocabulary and calculates IDF values. Refitting replaces
    /// both.
    pub fn fit<D: AsRef<[String]>>(&mut self, documents: &[D]) {
        let mut term_freq: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();

        for doc in documents {
            let mut seen: HashSet<&str> = HashSet::new();
            for term in analyze(doc) {
                *term_freq.entry(term).or_insert(0) += 1;
                if seen.insert(term) {
                    *doc_freq.entry(term).or_insert(0) += 1;
                }
            }
        }

        // Select top max_features by frequency
        let mut ranked: Vec<(&str, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        let mut terms: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        terms.sort_unstable();

        let n_docs = documents.len() as f64;
        self.vocabulary = terms
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.to_string(), idx))
            .collect();
        self.idf = terms
            .iter()
            .map(|term| ((1.0 + n_docs) / (1.0 + doc_freq[term] as f64)).ln() + 1.0)
            .collect();
        self.fitted = true;

        if self.vocabulary.is_empty() {
            log::warn!("TF-IDF vocabulary is empty after fitting {} documents", documents.len());
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Number of output columns.
    pub fn n_features(&self) -> usize {
        self.vocabulary.len()
    }

    /// Transform documents into a dense `(documents, n_features)` matrix.
    ///
    /// Terms outside the vocabulary are ignored; the vocabulary never changes.
    pub fn transform<D: AsRef<[String]>>(&self, documents: &[D]) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(AnalysisError::NotFitted);
        }

        let mut matrix = Array2::<f64>::zeros((documents.len(), self.n_features()));
        for (doc, mut row) in documents.iter().zip(matrix.rows_mut()) {
            for term in analyze(doc) {
                if let Some(&idx) = self.vocabulary.get(term) {
                    row[idx] += 1.0;
                }
            }
            for (value, idf) in row.iter_mut().zip(&self.idf) {
                *value *= idf;
            }

            let scale = match self.norm {
                Norm::L1 => row.iter().map(|v| v.abs()).sum::<f64>(),
                Norm::L2 => row.iter().map(|v| v * v).sum::<f64>().sqrt(),
                Norm::None => 1.0,
            };
            if scale > 0.0 {
                row.mapv_inplace(|v| v / scale);
            }
        }
        Ok(matrix)
    }

    /// Fit on `documents` unless an encoder is already cached under `key`.
    pub fn fit_cached<C: ArtifactCache, D: AsRef<[String]>>(
        cache: &C,
        key: &str,
        max_features: usize,
        norm: Norm,
        documents: &[D],
    ) -> Result<Self> {
        cache.get_or_compute(key, || {
            let mut vectorizer = TfidfVectorizer::new(max_features, norm);
            vectorizer.fit(documents);
            log::info!("Fitted {} with {} features", key, vectorizer.n_features());
            Ok(vectorizer)
        })
    }

    /// Vocabulary terms in column order.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.vocabulary.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::cache::JsonFileCache;
    use approx::assert_relative_eq;

    fn docs(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|doc| doc.iter().map(|t| t.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_transform_before_fit_fails() {
        let vectorizer = TfidfVectorizer::new(10, Norm::L2);
        let result = vectorizer.transform(&docs(&[&["a"]]));
        assert!(matches!(result, Err(AnalysisError::NotFitted)));
    }

    #[test]
    fn test_vocabulary_capped_by_frequency() {
        let corpus = docs(&[&["a", "a", "b", "c"], &["a", "b"], &["d"]]);
        let mut vectorizer = TfidfVectorizer::new(2, Norm::L2);
        vectorizer.fit(&corpus);

        assert_eq!(vectorizer.terms().collect::<Vec<_>>(), vec!["a", "b"]);
        let train = vectorizer.transform(&corpus).unwrap();
        let test = vectorizer.transform(&docs(&[&["zzz", "a"], &[]])).unwrap();
        assert_eq!(train.ncols(), 2);
        assert_eq!(test.ncols(), 2);
        assert_eq!(vectorizer.n_features(), 2);
    }

    #[test]
    fn test_concept_phrases_split_into_words() {
        let corpus = docs(&[&["heart failure", "chest pain"]]);
        let mut vectorizer = TfidfVectorizer::new(100, Norm::None);
        vectorizer.fit(&corpus);
        assert_eq!(
            vectorizer.terms().collect::<Vec<_>>(),
            vec!["chest", "failure", "heart", "pain"]
        );
    }

    #[test]
    fn test_smoothed_idf_and_l1_rows() {
        let corpus = docs(&[&["a", "b"], &["a"]]);
        let mut vectorizer = TfidfVectorizer::new(10, Norm::L1);
        vectorizer.fit(&corpus);

        // df(a) = 2, df(b) = 1, n = 2
        assert_relative_eq!(vectorizer.idf[0], 1.0);
        assert_relative_eq!(vectorizer.idf[1], (3.0f64 / 2.0).ln() + 1.0);

        let matrix = vectorizer.transform(&corpus).unwrap();
        for row in matrix.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert_relative_eq!(matrix[[1, 0]], 1.0);
    }

    #[test]
    fn test_l2_rows_and_empty_document() {
        let corpus = docs(&[&["x", "y", "y"], &[]]);
        let mut vectorizer = TfidfVectorizer::new(10, Norm::L2);
        vectorizer.fit(&corpus);
        let matrix = vectorizer.transform(&corpus).unwrap();

        let norm: f64 = matrix.row(0).iter().map(|v| v * v).sum::<f64>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-12);
        assert!(matrix.row(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_transform_does_not_touch_vocabulary() {
        let corpus = docs(&[&["a", "b"]]);
        let mut vectorizer = TfidfVectorizer::new(10, Norm::L2);
        vectorizer.fit(&corpus);
        let before = vectorizer.clone();
        vectorizer.transform(&docs(&[&["c", "d", "a"]])).unwrap();
        assert_eq!(before, vectorizer);
    }

    #[test]
    fn test_fit_cached_reuses_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonFileCache::new(dir.path(), "demo");

        let first =
            TfidfVectorizer::fit_cached(&cache, "vectorizer_doc", 10, Norm::L1, &docs(&[&["a"]]))
                .unwrap();
        let second =
            TfidfVectorizer::fit_cached(&cache, "vectorizer_doc", 10, Norm::L1, &docs(&[&["b"]]))
                .unwrap();
        assert_eq!(first, second);
        assert!(second.is_fitted());
        assert_eq!(second.terms().collect::<Vec<_>>(), vec!["a"]);
    }
}

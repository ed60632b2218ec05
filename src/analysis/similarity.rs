//! Pairwise user similarity in document, concept and label space.
//!
//! A seeded sample of users is compared pair by pair. The resulting table is
//! the input of the correlation and regression summary, which asks whether
//! users with similar concepts (or documents) also share diagnoses.

use super::data::{UserRecord, UserRecords};
use super::metrics::cosine_similarity;
use super::stats::{ols, pearson, Correlation, OlsFit};
use super::tfidf::TfidfVectorizer;
use crate::error::{AnalysisError, Result};
use csv::{ReaderBuilder, WriterBuilder};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Similarities of one unordered user pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PairSimilarity {
    pub left: String,
    pub right: String,
    pub doc_sim: f64,
    pub concept_sim: f64,
    pub label_sim: f64,
}

/// One line of the tab-separated table.
#[derive(Debug, Serialize, Deserialize)]
struct TableRow {
    uids: String,
    doc_sim: f64,
    concept_sim: f64,
    label_sim: f64,
}

impl From<&PairSimilarity> for TableRow {
    fn from(pair: &PairSimilarity) -> Self {
        TableRow {
            uids: format!("{},{}", pair.left, pair.right),
            doc_sim: pair.doc_sim,
            concept_sim: pair.concept_sim,
            label_sim: pair.label_sim,
        }
    }
}

impl From<TableRow> for PairSimilarity {
    fn from(row: TableRow) -> Self {
        let (left, right) = row.uids.split_once(',').unwrap_or((row.uids.as_str(), ""));
        PairSimilarity {
            left: left.to_string(),
            right: right.to_string(),
            doc_sim: row.doc_sim,
            concept_sim: row.concept_sim,
            label_sim: row.label_sim,
        }
    }
}

/// Draw `size` distinct users with a seeded generator.
pub fn sample_users(records: &UserRecords, size: usize, seed: u64) -> Result<Vec<&UserRecord>> {
    if records.len() < size {
        return Err(AnalysisError::InsufficientUsers {
            needed: size,
            available: records.len(),
        });
    }
    let population: Vec<&UserRecord> = records.values().collect();
    let mut rng = StdRng::seed_from_u64(seed);
    Ok(population.choose_multiple(&mut rng, size).copied().collect())
}

/// Cosine similarities for every pair `i < j` of `users`, in sample order.
pub fn pairwise_similarities(
    users: &[&UserRecord],
    doc_encoder: &TfidfVectorizer,
    concept_encoder: &TfidfVectorizer,
) -> Result<Vec<PairSimilarity>> {
    let tokens: Vec<&[String]> = users.iter().map(|u| u.tokens.as_slice()).collect();
    let concepts: Vec<&[String]> = users.iter().map(|u| u.concepts.as_slice()).collect();
    let doc_vectors = doc_encoder.transform(&tokens)?;
    let concept_vectors = concept_encoder.transform(&concepts)?;

    let n_labels = users.first().map_or(0, |u| u.labels.len());
    let flat: Vec<f64> = users
        .iter()
        .flat_map(|u| u.labels.iter().map(|&v| f64::from(v)))
        .collect();
    let label_vectors = Array2::from_shape_vec((users.len(), n_labels), flat)?;

    let mut pairs = Vec::with_capacity(users.len() * users.len().saturating_sub(1) / 2);
    for i in 0..users.len() {
        for j in (i + 1)..users.len() {
            pairs.push(PairSimilarity {
                left: users[i].uid.clone(),
                right: users[j].uid.clone(),
                doc_sim: cosine_similarity(doc_vectors.row(i), doc_vectors.row(j)),
                concept_sim: cosine_similarity(concept_vectors.row(i), concept_vectors.row(j)),
                label_sim: cosine_similarity(label_vectors.row(i), label_vectors.row(j)),
            });
        }
    }
    Ok(pairs)
}

/// Write `user_sims.tsv`.
pub fn write_table(path: &Path, pairs: &[PairSimilarity]) -> Result<()> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    for pair in pairs {
        writer.serialize(TableRow::from(pair))?;
    }
    writer.flush().map_err(crate::error::io_error(path))?;
    Ok(())
}

/// Read a table produced by [`write_table`].
pub fn read_table(path: &Path) -> Result<Vec<PairSimilarity>> {
    let mut reader = ReaderBuilder::new().delimiter(b'\t').from_path(path)?;
    let mut pairs = Vec::new();
    for row in reader.deserialize::<TableRow>() {
        pairs.push(PairSimilarity::from(row?));
    }
    Ok(pairs)
}

/// Correlations between the three similarity columns and the regressions of
/// label similarity on the other two.
#[derive(Debug, Clone)]
pub struct SimilaritySummary {
    pub doc_concept: Correlation,
    pub doc_label: Correlation,
    pub concept_label: Correlation,
    pub label_on_doc: OlsFit,
    pub label_on_concept: OlsFit,
    pub label_on_both: OlsFit,
}

impl SimilaritySummary {
    pub fn from_pairs(pairs: &[PairSimilarity]) -> Result<Self> {
        let doc: Vec<f64> = pairs.iter().map(|p| p.doc_sim).collect();
        let concept: Vec<f64> = pairs.iter().map(|p| p.concept_sim).collect();
        let label: Vec<f64> = pairs.iter().map(|p| p.label_sim).collect();

        let (doc, concept, label) = (doc.as_slice(), concept.as_slice(), label.as_slice());
        let response = ("label_sim", label);
        Ok(SimilaritySummary {
            doc_concept: pearson(doc, concept)?,
            doc_label: pearson(doc, label)?,
            concept_label: pearson(concept, label)?,
            label_on_doc: ols(response, &[("doc_sim", doc)])?,
            label_on_concept: ols(response, &[("concept_sim", concept)])?,
            label_on_both: ols(response, &[("doc_sim", doc), ("concept_sim", concept)])?,
        })
    }
}

impl fmt::Display for SimilaritySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "doc_concept_corr: {}", self.doc_concept)?;
        writeln!(f, "doc_label_corr: {}", self.doc_label)?;
        writeln!(f, "concept_label_corr: {}", self.concept_label)?;
        writeln!(f)?;
        writeln!(f, "linear regression between doc_sim and label_sim")?;
        writeln!(f, "{}", self.label_on_doc)?;
        writeln!(f)?;
        writeln!(f, "linear regression between concept_sim and label_sim")?;
        writeln!(f, "{}", self.label_on_concept)?;
        writeln!(f)?;
        writeln!(f, "linear regression between concept_sim, doc_sim and label_sim")?;
        write!(f, "{}", self.label_on_both)
    }
}

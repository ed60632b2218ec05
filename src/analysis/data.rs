//! Data structures for corpus entries, extracted concepts, tag rankings and
//! the per-user aggregates built from them.

use crate::error::{io_error, AnalysisError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// One line of the corpus: a user with their tags and documents.
#[derive(Debug, Deserialize, Clone)]
pub struct CorpusEntry {
    pub uid: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub docs: Vec<DocEntry>,
}

/// A single clinical document fragment.
#[derive(Debug, Deserialize, Clone)]
pub struct DocEntry {
    pub doc_id: String,
    pub text: String,
}

/// A medical concept extracted from one document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Concept {
    /// Extraction confidence; stored as a number or a numeric string
    #[serde(deserialize_with = "score_from_number_or_text")]
    pub score: f64,
    #[serde(default)]
    pub semtypes: Vec<String>,
    pub preferred_name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScore {
    Number(f64),
    Text(String),
}

fn score_from_number_or_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    match RawScore::deserialize(deserializer)? {
        RawScore::Number(score) => Ok(score),
        RawScore::Text(text) => text.trim().parse().map_err(D::Error::custom),
    }
}

#[derive(Deserialize)]
struct TagStatsFile {
    tag_stats: Vec<(String, u64)>,
}

/// Tags ordered by descending corpus frequency; defines label-vector columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRanking {
    tags: Vec<String>,
}

impl TagRanking {
    pub fn new(tags: Vec<String>) -> Self {
        TagRanking { tags }
    }

    /// Read the `tag_stats` field of a dataset stats file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(io_error(path))?;
        let stats: TagStatsFile =
            serde_json::from_str(&content).map_err(|source| AnalysisError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(TagRanking {
            tags: stats.tag_stats.into_iter().map(|(tag, _)| tag).collect(),
        })
    }

    /// Keep only the `n` most frequent tags.
    pub fn top(mut self, n: usize) -> Self {
        self.tags.truncate(n);
        self
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Per-user aggregate of tokens, concepts and labels.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserRecord {
    pub uid: String,
    /// Whitespace tokens of every document, in corpus order
    pub tokens: Vec<String>,
    /// Lower-cased concept preferred names
    pub concepts: Vec<String>,
    /// One bit per ranked tag
    pub labels: Vec<u8>,
}

impl UserRecord {
    pub fn new(uid: &str, num_labels: usize) -> Self {
        UserRecord {
            uid: uid.to_string(),
            tokens: Vec::new(),
            concepts: Vec::new(),
            labels: vec![0; num_labels],
        }
    }

    /// Set the label bit of every ranked tag present in `tags`.
    pub fn mark_tags(&mut self, ranking: &TagRanking, tags: &[String]) {
        let present: HashSet<&str> = tags.iter().map(String::as_str).collect();
        for (idx, tag) in ranking.tags().iter().enumerate() {
            if present.contains(tag.as_str()) {
                self.labels[idx] = 1;
            }
        }
    }

    pub fn label_sum(&self) -> usize {
        self.labels.iter().map(|&bit| bit as usize).sum()
    }

    /// All-zero and all-one label vectors carry no signal for binary
    /// multi-label classification.
    pub fn is_informative(&self) -> bool {
        let sum = self.label_sum();
        sum > 0 && sum < self.labels.len()
    }
}

/// Users keyed by uid; ordered so that shuffles and caches are reproducible.
pub type UserRecords = BTreeMap<String, UserRecord>;

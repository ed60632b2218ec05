//! Access to the concept-extraction output and summary statistics over it.
//!
//! Every processed document has (at most) one pickle file named
//! `{uid_prefix}_{doc_id}.pkl` holding a list of concept dictionaries.

use super::data::Concept;
use crate::error::{io_error, AnalysisError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Lookup of the concepts extracted from one document.
pub trait ConceptSource {
    /// `Ok(None)` when nothing was extracted for the document.
    fn lookup(&self, uid_prefix: &str, doc_id: &str) -> Result<Option<Vec<Concept>>>;
}

/// Concept pickles in a directory, listed once when opened.
#[derive(Debug)]
pub struct ConceptDir {
    dir: PathBuf,
    files: HashSet<String>,
}

impl ConceptDir {
    /// List `dir`. A missing directory behaves like an empty one.
    pub fn open(dir: &Path) -> Result<Self> {
        let mut files = HashSet::new();
        if dir.is_dir() {
            for entry in std::fs::read_dir(dir).map_err(io_error(dir))? {
                let entry = entry.map_err(io_error(dir))?;
                if let Some(name) = entry.file_name().to_str() {
                    files.insert(name.to_string());
                }
            }
        } else {
            log::warn!(
                "Concept directory {} does not exist; users will have no concepts",
                dir.display()
            );
        }
        log::debug!("{} concept files in {}", files.len(), dir.display());
        Ok(ConceptDir {
            dir: dir.to_path_buf(),
            files,
        })
    }

    pub fn file_name(uid_prefix: &str, doc_id: &str) -> String {
        format!("{uid_prefix}_{doc_id}.pkl")
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl ConceptSource for ConceptDir {
    fn lookup(&self, uid_prefix: &str, doc_id: &str) -> Result<Option<Vec<Concept>>> {
        let name = Self::file_name(uid_prefix, doc_id);
        if !self.files.contains(&name) {
            return Ok(None);
        }
        read_concept_file(&self.dir.join(name)).map(Some)
    }
}

/// Decode one concept pickle.
pub fn read_concept_file(path: &Path) -> Result<Vec<Concept>> {
    let bytes = std::fs::read(path).map_err(io_error(path))?;
    serde_pickle::from_slice(&bytes, serde_pickle::DeOptions::new()).map_err(|source| {
        AnalysisError::Pickle {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Write concepts in the same pickle layout the extractor produces.
pub fn write_concept_file(path: &Path, concepts: &[Concept]) -> Result<()> {
    let bytes = serde_pickle::to_vec(&concepts, serde_pickle::SerOptions::new()).map_err(
        |source| AnalysisError::Pickle {
            path: path.to_path_buf(),
            source,
        },
    )?;
    std::fs::write(path, bytes).map_err(io_error(path))
}

/// Corpus-wide concept counts.
#[derive(Debug, Serialize, Default, PartialEq)]
pub struct ConceptStats {
    pub num_concept: usize,
    pub num_unique_concept: usize,
    pub num_unique_concept_type: usize,
    /// Semantic types, most common first
    pub concept_type_stats: Vec<(String, usize)>,
    /// Lower-cased preferred names, most common first
    pub concept_token_stats: Vec<(String, usize)>,
}

/// Concepts kept for one user.
#[derive(Debug, Serialize, Default, PartialEq)]
pub struct UserConcepts {
    pub semtypes: Vec<Vec<String>>,
    pub entities: Vec<String>,
}

/// Scan every pickle in `dir` (sorted by name) and tally the concepts.
///
/// The uid of a file is the part of its name before the first `_`. With
/// `filter` on, concepts scoring below `threshold` are ignored.
pub fn collect_concept_stats(
    dir: &Path,
    threshold: f64,
    filter: bool,
) -> Result<(ConceptStats, BTreeMap<String, UserConcepts>)> {
    let mut names: Vec<String> = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error(dir))? {
        let entry = entry.map_err(io_error(dir))?;
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".pkl") {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    let mut user_concepts: BTreeMap<String, UserConcepts> = BTreeMap::new();
    let mut type_counts: HashMap<String, usize> = HashMap::new();
    let mut token_counts: HashMap<String, usize> = HashMap::new();
    let mut num_concept = 0;

    for name in &names {
        let uid = name.split('_').next().unwrap_or(name).to_string();
        let user = user_concepts.entry(uid).or_default();
        for concept in read_concept_file(&dir.join(name))? {
            if filter && concept.score < threshold {
                continue;
            }
            let entity = concept.preferred_name.to_lowercase();
            for semtype in &concept.semtypes {
                *type_counts.entry(semtype.clone()).or_insert(0) += 1;
            }
            *token_counts.entry(entity.clone()).or_insert(0) += 1;
            user.semtypes.push(concept.semtypes);
            user.entities.push(entity);
            num_concept += 1;
        }
    }

    let stats = ConceptStats {
        num_concept,
        num_unique_concept: token_counts.len(),
        num_unique_concept_type: type_counts.len(),
        concept_type_stats: most_common(type_counts),
        concept_token_stats: most_common(token_counts),
    };
    log::info!(
        "{} concepts ({} unique, {} semantic types) across {} users",
        stats.num_concept,
        stats.num_unique_concept,
        stats.num_unique_concept_type,
        user_concepts.len()
    );
    Ok((stats, user_concepts))
}

/// Write `concept_{task}_stats.json` and the per-user dump into `out_dir`.
pub fn write_concept_stats(
    out_dir: &Path,
    task_name: &str,
    filtered: bool,
    stats: &ConceptStats,
    users: &BTreeMap<String, UserConcepts>,
) -> Result<()> {
    let stats_path = out_dir.join(format!("concept_{task_name}_stats.json"));
    let users_path = if filtered {
        out_dir.join(format!("concept_{task_name}_user_filtered.json"))
    } else {
        out_dir.join(format!("concept_{task_name}_user.json"))
    };

    let json = serde_json::to_string_pretty(stats).map_err(|source| AnalysisError::Json {
        path: stats_path.clone(),
        source,
    })?;
    std::fs::write(&stats_path, json).map_err(io_error(&stats_path))?;

    let json = serde_json::to_string(users).map_err(|source| AnalysisError::Json {
        path: users_path.clone(),
        source,
    })?;
    std::fs::write(&users_path, json).map_err(io_error(&users_path))?;
    Ok(())
}

fn most_common(counts: HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut items: Vec<(String, usize)> = counts.into_iter().collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concept(name: &str, score: f64, semtypes: &[&str]) -> Concept {
        Concept {
            score,
            semtypes: semtypes.iter().map(|s| s.to_string()).collect(),
            preferred_name: name.to_string(),
        }
    }

    #[test]
    fn test_pickle_roundtrip_through_dir() {
        let dir = tempfile::tempdir().unwrap();
        let concepts = vec![concept("Fever", 4.0, &["sosy"])];
        write_concept_file(&dir.path().join("123_d1.pkl"), &concepts).unwrap();

        let source = ConceptDir::open(dir.path()).unwrap();
        assert_eq!(source.len(), 1);
        assert_eq!(source.lookup("123", "d1").unwrap(), Some(concepts));
        assert_eq!(source.lookup("123", "d2").unwrap(), None);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = ConceptDir::open(&dir.path().join("absent")).unwrap();
        assert!(source.is_empty());
        assert_eq!(source.lookup("u1", "d1").unwrap(), None);
    }

    #[test]
    fn test_concept_stats_with_score_filter() {
        let dir = tempfile::tempdir().unwrap();
        write_concept_file(
            &dir.path().join("7_a.pkl"),
            &[
                concept("Fever", 4.0, &["sosy"]),
                concept("fever", 3.9, &["sosy"]),
                concept("Noise", 1.0, &["qlco"]),
            ],
        )
        .unwrap();
        write_concept_file(
            &dir.path().join("8_b.pkl"),
            &[concept("Aspirin", 5.0, &["phsu", "orch"])],
        )
        .unwrap();

        let (stats, users) = collect_concept_stats(dir.path(), 3.6, true).unwrap();
        assert_eq!(stats.num_concept, 3);
        assert_eq!(stats.num_unique_concept, 2);
        assert_eq!(stats.num_unique_concept_type, 3);
        assert_eq!(stats.concept_token_stats[0], ("fever".to_string(), 2));
        assert_eq!(stats.concept_type_stats[0], ("sosy".to_string(), 2));
        assert_eq!(users["7"].entities, vec!["fever", "fever"]);
        assert_eq!(users["8"].semtypes, vec![vec!["phsu", "orch"]]);

        let (unfiltered, _) = collect_concept_stats(dir.path(), 3.6, false).unwrap();
        assert_eq!(unfiltered.num_concept, 4);

        write_concept_stats(dir.path(), "demo", true, &stats, &users).unwrap();
        assert!(dir.path().join("concept_demo_stats.json").exists());
        assert!(dir.path().join("concept_demo_user_filtered.json").exists());
    }
}

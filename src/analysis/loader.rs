//! Corpus loading: per-user tokens, concepts and label vectors.

use super::cache::ArtifactCache;
use super::concepts::ConceptSource;
use super::data::{CorpusEntry, TagRanking, UserRecord, UserRecords};
use crate::error::{io_error, AnalysisError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Cache key of the loaded user records.
pub const USER_DOCS_KEY: &str = "user_docs";

/// The part of a uid before its first `-`; concept files are named after it.
pub fn primary_id(uid: &str) -> &str {
    uid.split('-').next().unwrap_or(uid)
}

/// Build one [`UserRecord`] per informative user of the corpus.
///
/// Lines sharing a uid accumulate into the same record. A user whose label
/// vector becomes all-zero or all-one is removed together with anything
/// accumulated so far. Documents without a concept file contribute tokens
/// only.
pub fn load_user_records<S: ConceptSource>(
    corpus: &Path,
    concepts: &S,
    ranking: &TagRanking,
) -> Result<UserRecords> {
    let file = File::open(corpus).map_err(io_error(corpus))?;
    let reader = BufReader::new(file);

    let mut records = UserRecords::new();
    let mut dropped = 0usize;
    let mut with_concepts = 0usize;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(io_error(corpus))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: CorpusEntry =
            serde_json::from_str(&line).map_err(|source| AnalysisError::CorpusLine {
                path: corpus.to_path_buf(),
                line: idx + 1,
                source,
            })?;

        let record = records
            .entry(entry.uid.clone())
            .or_insert_with(|| UserRecord::new(&entry.uid, ranking.len()));
        record.mark_tags(ranking, &entry.tags);
        if !record.is_informative() {
            records.remove(&entry.uid);
            dropped += 1;
            continue;
        }

        let prefix = primary_id(&entry.uid);
        for doc in &entry.docs {
            if let Some(found) = concepts.lookup(prefix, &doc.doc_id)? {
                with_concepts += 1;
                record
                    .concepts
                    .extend(found.into_iter().map(|c| c.preferred_name.to_lowercase()));
            }
            record
                .tokens
                .extend(doc.text.split_whitespace().map(str::to_string));
        }
    }

    log::info!(
        "Loaded {} users from {} ({} entries dropped for uninformative labels, {} documents with concepts)",
        records.len(),
        corpus.display(),
        dropped,
        with_concepts
    );
    Ok(records)
}

/// [`load_user_records`] memoised under [`USER_DOCS_KEY`].
pub fn load_or_build<C: ArtifactCache, S: ConceptSource>(
    cache: &C,
    corpus: &Path,
    concepts: &S,
    ranking: &TagRanking,
) -> Result<UserRecords> {
    cache.get_or_compute(USER_DOCS_KEY, || {
        load_user_records(corpus, concepts, ranking)
    })
}

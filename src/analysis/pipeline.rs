//! End-to-end runs of the three analyses for one dataset.
//!
//! Each run resolves its paths from the configuration, loads (or reuses) the
//! cached user records and encoders, and writes its results next to them:
//!
//! - [`run_quantitative`] cross-validates the classifier on document, concept
//!   and combined features (`{output}/{dataset}/quant/`)
//! - [`run_qualitative`] compares a sample of users pairwise
//!   (`{output}/{dataset}/qual/`)
//! - [`run_concept_stats`] tallies the extracted concepts (`{output}/{dataset}/`)

use super::cache::{ArtifactCache, JsonFileCache};
use super::concepts::{collect_concept_stats, write_concept_stats, ConceptDir, ConceptStats};
use super::config::{Config, DatasetPaths};
use super::data::{TagRanking, UserRecords};
use super::evaluate::{AblationEvaluator, AblationReport};
use super::loader::load_or_build;
use super::report::{
    print_ablation, write_ablation_json, write_score_table, write_similarity_summary,
};
use super::similarity::{pairwise_similarities, sample_users, write_table, SimilaritySummary};
use super::tfidf::{Norm, TfidfVectorizer};
use crate::classifier::ClassifierKind;
use crate::error::Result;
use rayon::ThreadPool;
use std::time::Instant;

pub const DOC_ENCODER_KEY: &str = "vectorizer_doc";
pub const CONCEPT_ENCODER_KEY: &str = "vectorizer_concept";

/// Document and concept encoders fitted over the same users.
pub struct Encoders {
    pub doc: TfidfVectorizer,
    pub concept: TfidfVectorizer,
}

/// Fit (or reload) both encoders over every user in `records`.
pub fn fit_encoders<C: ArtifactCache>(
    cache: &C,
    records: &UserRecords,
    max_features: usize,
    norm: Norm,
) -> Result<Encoders> {
    let tokens: Vec<&[String]> = records.values().map(|u| u.tokens.as_slice()).collect();
    let concepts: Vec<&[String]> = records.values().map(|u| u.concepts.as_slice()).collect();
    Ok(Encoders {
        doc: TfidfVectorizer::fit_cached(cache, DOC_ENCODER_KEY, max_features, norm, &tokens)?,
        concept: TfidfVectorizer::fit_cached(
            cache,
            CONCEPT_ENCODER_KEY,
            max_features,
            norm,
            &concepts,
        )?,
    })
}

/// Cross-validated ablation over the top-ranked tags.
///
/// # Arguments
///
/// * `config` - Analysis configuration
/// * `dataset` - Dataset name, also the cache task name
/// * `kind` - Classifier family
/// * `pool` - Worker pool for model fitting
pub fn run_quantitative(
    config: &Config,
    dataset: &str,
    kind: ClassifierKind,
    pool: &ThreadPool,
) -> Result<AblationReport> {
    let start = Instant::now();
    let paths = DatasetPaths::new(&config.data, dataset);
    paths.create_output_dirs()?;

    println!("Quantitative analysis: {dataset} ({kind})\n");
    let ranking = TagRanking::load(&paths.tag_stats)?.top(config.features.num_labels);
    let concepts = ConceptDir::open(&paths.concept_dir)?;
    let cache = JsonFileCache::new(&paths.quant_dir, dataset);

    let records = load_or_build(&cache, &paths.corpus, &concepts, &ranking)?;
    println!("  Users: {}", records.len());
    println!("  Labels: {}", ranking.len());

    let encoders = fit_encoders(&cache, &records, config.features.max_features, config.features.norm)?;
    println!(
        "  Features: {} doc + {} concept\n",
        encoders.doc.n_features(),
        encoders.concept.n_features()
    );

    let report = pool.install(|| {
        AblationEvaluator::new(dataset, &records, &encoders.doc, &encoders.concept, kind, config)?
            .run()
    })?;

    print_ablation(&report);
    let json = write_ablation_json(&paths.quant_dir, &report)?;
    let table = write_score_table(&paths.quant_dir, &report)?;
    log::info!("Wrote {} and {}", json.display(), table.display());
    println!("  Time: {:.2}s\n", start.elapsed().as_secs_f64());
    Ok(report)
}

/// Pairwise similarity, correlation and regression over a user sample.
///
/// Labels cover every ranked tag, not just the top ones.
pub fn run_qualitative(config: &Config, dataset: &str) -> Result<SimilaritySummary> {
    let paths = DatasetPaths::new(&config.data, dataset);
    paths.create_output_dirs()?;

    println!("Qualitative analysis: {dataset}\n");
    let ranking = TagRanking::load(&paths.tag_stats)?;
    let concepts = ConceptDir::open(&paths.concept_dir)?;
    let cache = JsonFileCache::new(&paths.qual_dir, dataset);

    let records = load_or_build(&cache, &paths.corpus, &concepts, &ranking)?;
    let encoders = fit_encoders(
        &cache,
        &records,
        config.features.max_features,
        config.similarity.norm,
    )?;

    let users = sample_users(&records, config.similarity.sample_size, config.similarity.seed)?;
    let pairs = pairwise_similarities(&users, &encoders.doc, &encoders.concept)?;
    let table = paths.qual_dir.join("user_sims.tsv");
    write_table(&table, &pairs)?;
    log::info!("Wrote {} user pairs to {}", pairs.len(), table.display());

    let summary = SimilaritySummary::from_pairs(&pairs)?;
    write_similarity_summary(&paths.qual_dir.join("user_sims.txt"), &summary)?;
    Ok(summary)
}

/// Concept counts and frequency tables over the concept directory.
pub fn run_concept_stats(config: &Config, dataset: &str) -> Result<ConceptStats> {
    let paths = DatasetPaths::new(&config.data, dataset);
    paths.create_output_dirs()?;

    let filter = config.concepts.filter_by_score;
    let (stats, users) =
        collect_concept_stats(&paths.concept_dir, config.concepts.score_threshold, filter)?;
    write_concept_stats(&paths.dataset_dir, dataset, filter, &stats, &users)?;

    println!("Concept statistics: {dataset}\n");
    println!("  Concepts: {}", stats.num_concept);
    println!("  Unique concepts: {}", stats.num_unique_concept);
    println!("  Unique semantic types: {}", stats.num_unique_concept_type);
    println!("  Users: {}\n", users.len());
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::concepts::write_concept_file;
    use crate::analysis::data::Concept;
    use std::path::Path;

    const DATASET: &str = "mimic-iii";

    /// Twelve users alternating between tags `a` and `b`.
    fn write_dataset(processed: &Path, output: &Path) {
        let input = processed.join(DATASET);
        let concept_dir = input.join("concepts");
        std::fs::create_dir_all(&concept_dir).unwrap();
        std::fs::create_dir_all(output).unwrap();

        let mut corpus = String::new();
        for i in 0..12 {
            let tag = if i % 2 == 0 { "a" } else { "b" };
            let line = serde_json::json!({
                "uid": format!("p{i}-1"),
                "tags": [tag],
                "docs": [{
                    "doc_id": "d0",
                    "text": format!("common word{} term{} note{}", i % 3, i % 4, i),
                }],
            });
            corpus.push_str(&line.to_string());
            corpus.push('\n');

            if i % 4 != 0 {
                let concepts = vec![
                    Concept {
                        score: 5.0,
                        semtypes: vec![format!("T0{}", i % 3)],
                        preferred_name: format!("Finding {}", i % 3),
                    },
                    Concept {
                        score: 1.0,
                        semtypes: vec!["T99".to_string()],
                        preferred_name: "Noise".to_string(),
                    },
                ];
                write_concept_file(&concept_dir.join(format!("p{i}_d0.pkl")), &concepts)
                    .unwrap();
            }
        }
        std::fs::write(input.join(format!("{DATASET}.json")), corpus).unwrap();

        let stats = serde_json::json!({ "tag_stats": [["a", 6], ["b", 6], ["c", 1]] });
        std::fs::write(output.join(format!("{DATASET}_stats.json")), stats.to_string()).unwrap();
    }

    fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.data.processed_dir = root.join("processed");
        config.data.output_dir = root.join("out");
        config.features.num_labels = 2;
        config.evaluation.n_folds = 3;
        config.similarity.sample_size = 12;
        config.runtime.threads = 2;
        config
    }

    #[test]
    fn test_quantitative_run_writes_reports_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_dataset(&config.data.processed_dir, &config.data.output_dir);
        let pool = config.thread_pool().unwrap();

        let report = run_quantitative(&config, DATASET, ClassifierKind::Dt, &pool).unwrap();
        assert_eq!(report.n_users, 12);
        assert_eq!(report.n_folds(), 3);
        assert!(report.doc.iter().all(Option::is_some));
        assert!((0.0..=1.0).contains(&report.vocabulary_jaccard));

        let quant = config.data.output_dir.join(DATASET).join("quant");
        for name in [
            "ablation_mimic-iii_dt.json",
            "quant_mimic-iii_dt.csv",
            "user_docs_mimic-iii.json",
            "vectorizer_doc_mimic-iii.json",
            "vectorizer_concept_mimic-iii.json",
        ] {
            assert!(quant.join(name).exists(), "{name} missing");
        }

        // a second run is served from the cache and scores identically
        let again = run_quantitative(&config, DATASET, ClassifierKind::Dt, &pool).unwrap();
        assert_eq!(report, again);
    }

    #[test]
    fn test_qualitative_run_writes_table_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_dataset(&config.data.processed_dir, &config.data.output_dir);

        let summary = run_qualitative(&config, DATASET).unwrap();
        assert_eq!(summary.label_on_doc.n_obs, 66);

        let qual = config.data.output_dir.join(DATASET).join("qual");
        let table = std::fs::read_to_string(qual.join("user_sims.tsv")).unwrap();
        assert_eq!(table.lines().count(), 67);
        let text = std::fs::read_to_string(qual.join("user_sims.txt")).unwrap();
        assert!(text.contains("concept_label_corr"));
    }

    #[test]
    fn test_qualitative_run_without_concepts_still_writes_summary() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_dataset(&config.data.processed_dir, &config.data.output_dir);
        std::fs::remove_dir_all(config.data.processed_dir.join(DATASET).join("concepts"))
            .unwrap();

        let summary = run_qualitative(&config, DATASET).unwrap();
        assert!(summary.doc_concept.r.is_nan());
        assert!(summary.concept_label.p_value.is_nan());
        assert!(summary.doc_label.r.is_finite());
        assert_eq!(summary.label_on_concept.df_model, 0);
        assert!(summary.label_on_concept.t_values[1].is_nan());
        assert_eq!(summary.label_on_both.n_obs, 66);

        let qual = config.data.output_dir.join(DATASET).join("qual");
        let text = std::fs::read_to_string(qual.join("user_sims.txt")).unwrap();
        assert!(text.contains("concept_label_corr: r = NaN"));
    }

    #[test]
    fn test_concept_stats_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        write_dataset(&config.data.processed_dir, &config.data.output_dir);

        let stats = run_concept_stats(&config, DATASET).unwrap();
        // nine users with concept files, the low-scoring one filtered out
        assert_eq!(stats.num_concept, 9);
        assert_eq!(stats.num_unique_concept, 3);
        let dataset_dir = config.data.output_dir.join(DATASET);
        assert!(dataset_dir.join("concept_mimic-iii_stats.json").exists());
        assert!(dataset_dir.join("concept_mimic-iii_user_filtered.json").exists());
    }

    #[test]
    fn test_qualitative_needs_enough_users() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.similarity.sample_size = 50;
        write_dataset(&config.data.processed_dir, &config.data.output_dir);
        assert!(run_qualitative(&config, DATASET).is_err());
    }
}

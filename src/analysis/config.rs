//! Configuration structures for the concept analysis pipeline.
//!
//! This module provides strongly-typed configuration management using TOML files.
//! The configuration covers input/output locations, feature extraction, the
//! cross-validation protocol, classifier hyperparameters, the similarity
//! companion analysis and the worker pool size.

use super::evaluate::FeatureSet;
use super::tfidf::Norm;
use crate::error::{io_error, AnalysisError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure loaded from `config.toml`.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Input and output locations
    pub data: DataConfig,
    /// Feature extraction configuration
    pub features: FeaturesConfig,
    /// Cross-validation protocol
    pub evaluation: EvaluationConfig,
    /// Classifier hyperparameters
    pub classifier: ClassifierConfig,
    /// Pairwise similarity analysis
    pub similarity: SimilarityConfig,
    /// Concept statistics
    pub concepts: ConceptsConfig,
    /// Worker pool settings
    pub runtime: RuntimeConfig,
}

/// Input and output locations.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Root of the processed corpora (`{processed_dir}/{dataset}/{dataset}.json`)
    pub processed_dir: PathBuf,
    /// Root of all analysis outputs and of the tag stats files
    pub output_dir: PathBuf,
    /// Datasets accepted on the command line
    pub datasets: Vec<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            processed_dir: PathBuf::from("./processed_data"),
            output_dir: PathBuf::from("../resources/analyze"),
            datasets: vec!["mimic-iii".to_string()],
        }
    }
}

/// Feature extraction configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Maximum vocabulary size of each TF-IDF encoder
    pub max_features: usize,
    /// Number of top-ranked tags used as classification labels
    pub num_labels: usize,
    /// Row normalisation of the encoders used for classification
    pub norm: Norm,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        FeaturesConfig {
            max_features: 10_000,
            num_labels: 10,
            norm: Norm::L1,
        }
    }
}

/// Cross-validation protocol.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Number of folds
    pub n_folds: usize,
    /// Seed for the user shuffle and for classifier initialisation
    pub seed: u64,
    /// Feature sets whose fits are skipped when a label column is under-populated
    pub guarded: Vec<FeatureSet>,
    /// Minimum number of positive training examples per label column
    pub min_class_support: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        EvaluationConfig {
            n_folds: 5,
            seed: 42,
            guarded: vec![FeatureSet::Document],
            min_class_support: 2,
        }
    }
}

/// Classifier hyperparameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Neighbourhood size for `knn`
    pub knn_neighbors: usize,
    /// Depth limit for `dt` (unlimited when absent)
    pub tree_max_depth: Option<usize>,
    /// Minimum node size that may still be split
    pub tree_min_samples_split: usize,
    /// Feed-forward network settings for `mlp`
    pub mlp: MlpConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            knn_neighbors: 5,
            tree_max_depth: None,
            tree_min_samples_split: 2,
            mlp: MlpConfig::default(),
        }
    }
}

/// Feed-forward network settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MlpConfig {
    /// Hidden layer sizes (e.g., [100])
    pub hidden_layers: Vec<usize>,
    /// Learning rate for Adam optimizer
    pub learning_rate: f64,
    /// L2 penalty
    pub alpha: f64,
    /// Mini-batch size (capped at the number of training samples)
    pub batch_size: usize,
    /// Maximum number of epochs
    pub max_iter: usize,
    /// Share of the training data held out for early stopping
    pub validation_fraction: f64,
    /// Epochs without improvement before stopping
    pub n_iter_no_change: usize,
    /// Minimum improvement that resets the patience counter
    pub tol: f64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        MlpConfig {
            hidden_layers: vec![100],
            learning_rate: 0.001,
            alpha: 0.0001,
            batch_size: 200,
            max_iter: 1000,
            validation_fraction: 0.1,
            n_iter_no_change: 10,
            tol: 1e-4,
        }
    }
}

/// Pairwise similarity analysis.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Number of users sampled without replacement
    pub sample_size: usize,
    /// Sampling seed
    pub seed: u64,
    /// Row normalisation of the similarity encoders
    pub norm: Norm,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        SimilarityConfig {
            sample_size: 50,
            seed: 7,
            norm: Norm::L2,
        }
    }
}

/// Concept statistics.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConceptsConfig {
    /// Concepts scoring below this are ignored when filtering is on
    pub score_threshold: f64,
    pub filter_by_score: bool,
}

impl Default for ConceptsConfig {
    fn default() -> Self {
        ConceptsConfig {
            score_threshold: 3.6,
            filter_by_score: true,
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads for model fitting; 0 uses every available core
    pub threads: usize,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(io_error(path))?;
        toml::from_str(&content).map_err(|source| AnalysisError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists, otherwise fall back to the defaults.
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        log::warn!(
            "Could not find {}; using default configuration",
            path.display()
        );
        Ok(Config::default())
    }

    /// Reject datasets that are not on the configured allow-list.
    pub fn check_dataset(&self, dataset: &str) -> Result<()> {
        if self.data.datasets.iter().any(|d| d == dataset) {
            Ok(())
        } else {
            Err(AnalysisError::UnsupportedDataset(dataset.to_string()))
        }
    }

    /// Build the rayon pool used for model fitting.
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.runtime.threads)
            .build()?)
    }
}

/// File locations for one dataset, derived from [`DataConfig`].
#[derive(Debug, Clone)]
pub struct DatasetPaths {
    pub corpus: PathBuf,
    pub concept_dir: PathBuf,
    pub tag_stats: PathBuf,
    /// Concept statistics land here
    pub dataset_dir: PathBuf,
    pub quant_dir: PathBuf,
    pub qual_dir: PathBuf,
}

impl DatasetPaths {
    pub fn new(data: &DataConfig, dataset: &str) -> Self {
        let input = data.processed_dir.join(dataset);
        let dataset_dir = data.output_dir.join(dataset);
        DatasetPaths {
            corpus: input.join(format!("{dataset}.json")),
            concept_dir: input.join("concepts"),
            tag_stats: data.output_dir.join(format!("{dataset}_stats.json")),
            quant_dir: dataset_dir.join("quant"),
            qual_dir: dataset_dir.join("qual"),
            dataset_dir,
        }
    }

    /// Create every output directory.
    pub fn create_output_dirs(&self) -> Result<()> {
        for dir in [&self.dataset_dir, &self.quant_dir, &self.qual_dir] {
            std::fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.features.max_features, 10_000);
        assert_eq!(config.features.num_labels, 10);
        assert_eq!(config.evaluation.n_folds, 5);
        assert_eq!(config.similarity.sample_size, 50);
        assert_eq!(config.evaluation.guarded, vec![FeatureSet::Document]);
        assert_eq!(config.features.norm, Norm::L1);
        assert_eq!(config.similarity.norm, Norm::L2);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [evaluation]
            n_folds = 3
            guarded = ["doc", "concept"]

            [classifier.mlp]
            hidden_layers = [16]
            "#,
        )
        .unwrap();
        assert_eq!(config.evaluation.n_folds, 3);
        assert_eq!(config.evaluation.seed, 42);
        assert_eq!(
            config.evaluation.guarded,
            vec![FeatureSet::Document, FeatureSet::Concept]
        );
        assert_eq!(config.classifier.mlp.hidden_layers, vec![16]);
        assert_eq!(config.classifier.mlp.max_iter, 1000);
        assert_eq!(config.classifier.knn_neighbors, 5);
    }

    #[test]
    fn test_check_dataset() {
        let config = Config::default();
        assert!(config.check_dataset("mimic-iii").is_ok());
        assert!(matches!(
            config.check_dataset("diabetes"),
            Err(AnalysisError::UnsupportedDataset(name)) if name == "diabetes"
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.features.max_features, 10_000);
    }

    #[test]
    fn test_dataset_paths_layout() {
        let data = DataConfig {
            processed_dir: PathBuf::from("in"),
            output_dir: PathBuf::from("out"),
            datasets: vec![],
        };
        let paths = DatasetPaths::new(&data, "mimic-iii");
        assert_eq!(paths.corpus, PathBuf::from("in/mimic-iii/mimic-iii.json"));
        assert_eq!(paths.concept_dir, PathBuf::from("in/mimic-iii/concepts"));
        assert_eq!(paths.tag_stats, PathBuf::from("out/mimic-iii_stats.json"));
        assert_eq!(paths.quant_dir, PathBuf::from("out/mimic-iii/quant"));
        assert_eq!(paths.qual_dir, PathBuf::from("out/mimic-iii/qual"));
    }
}

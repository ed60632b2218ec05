//! Concept vs. Document Feature Analysis
//!
//! This module asks whether medical concepts extracted from clinical notes
//! carry the diagnostic signal of the notes themselves. Every patient ("user")
//! is described three ways:
//!
//! - **Document features**: TF-IDF over the whitespace tokens of their notes
//! - **Concept features**: TF-IDF over the lower-cased preferred names of the
//!   concepts extracted from those notes
//! - **Labels**: a multi-hot vector over the most frequent diagnosis tags
//!
//! ## Architecture
//!
//! ### Quantitative analysis
//!
//! - Users are shuffled with a fixed seed and split into contiguous folds
//! - Each fold fits the chosen classifier on doc, concept and combined
//!   features and scores it with weighted F1
//! - Folds whose training labels are too sparse are skipped, not scored
//! - The report adds the Jaccard overlap of the two vocabularies
//!
//! ### Qualitative analysis
//!
//! - A seeded sample of users is compared pairwise with cosine similarity in
//!   document, concept and label space
//! - The similarity table feeds Pearson correlations and three OLS fits of
//!   label similarity on the other two columns
//!
//! ## Caching
//!
//! Loaded user records and fitted encoders are stored as JSON artifacts
//! (`{key}_{dataset}.json`) in the output directory of each analysis.
//! Delete an artifact to force it to be rebuilt.
//!
//! ## Usage
//!
//! ```bash
//! # Ablation with the default MLP, then the similarity analysis
//! ./target/release/conceptsim mimic-iii
//!
//! # Decision tree, concept statistics, no similarity analysis
//! ./target/release/conceptsim mimic-iii dt --concept-stats --skip-qual
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use conceptsim::analysis::config::Config;
//! use conceptsim::analysis::pipeline::run_quantitative;
//! use conceptsim::classifier::ClassifierKind;
//!
//! let config = Config::default();
//! let pool = config.thread_pool().expect("thread pool");
//! let report = run_quantitative(&config, "mimic-iii", ClassifierKind::Knn, &pool)
//!     .expect("analysis failed");
//! println!("{:?}", report.mean(conceptsim::analysis::evaluate::FeatureSet::Combined));
//! ```
//!
//! ## Configuration
//!
//! Settings are read from `config.toml`; every key is optional:
//!
//! ```toml
//! [data]
//! processed_dir = "./processed_data"
//! output_dir = "../resources/analyze"
//! datasets = ["mimic-iii"]
//!
//! [features]
//! max_features = 10000
//! num_labels = 10
//!
//! [evaluation]
//! n_folds = 5
//! guarded = ["doc"]
//!
//! [runtime]
//! threads = 0
//! ```
//!
//! ## Module Structure
//!
//! - [`config`] - Configuration structures and loading
//! - [`data`] - Corpus, concept and user record structures
//! - [`concepts`] - Concept file access and concept statistics
//! - [`loader`] - Corpus loading and concept join
//! - [`cache`] - JSON artifact cache
//! - [`tfidf`] - TF-IDF vectorizer implementation
//! - [`folds`] - K-fold splitting
//! - [`metrics`] - Weighted F1, cosine and Jaccard
//! - [`evaluate`] - Cross-validated feature ablation
//! - [`stats`] - Pearson correlation and least squares
//! - [`similarity`] - Pairwise user similarity
//! - [`report`] - Printed and written results
//! - [`pipeline`] - End-to-end runs
//! - [`cli`] - Command-line interface

pub mod cache;
pub mod cli;
pub mod concepts;
pub mod config;
pub mod data;
pub mod evaluate;
pub mod folds;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod similarity;
pub mod stats;
pub mod tfidf;

pub use cli::{run, Cli};

//! # conceptsim - Concept vs. Document Features for Diagnosis Classification
//!
//! Measures how much of the diagnostic signal in clinical notes survives
//! when the notes are reduced to their extracted medical concepts.
//!
//! ## Features
//!
//! - **Feature Ablation**: k-fold weighted F1 on document, concept and combined
//!   TF-IDF features
//! - **Three Classifiers**: feed-forward network, CART decision tree and kNN,
//!   fitted per label column in parallel
//! - **Similarity Analysis**: pairwise user similarity with correlation and
//!   least-squares summaries
//! - **Artifact Cache**: loaded corpora and fitted encoders are reused between
//!   runs
//!
//! ## Quick Start
//!
//! ```bash
//! conceptsim mimic-iii knn --config config.toml
//! ```
//!
//! Results are written under `{output_dir}/{dataset}/quant/` and
//! `{output_dir}/{dataset}/qual/`.
//!
//! ## Error Handling
//!
//! Every fallible library call returns [`error::Result`]. Folds that cannot be
//! scored are not errors; they appear as `None` in the
//! [`analysis::evaluate::AblationReport`].
//!
//! ## License
//!
//! GNU General Public License v3.0 (GPLv3)

pub mod analysis;
pub mod classifier;
pub mod decision_tree;
pub mod error;
pub mod knn;
pub mod neural_net;

pub use analysis::config::Config;
pub use classifier::ClassifierKind;
pub use error::{AnalysisError, Result};

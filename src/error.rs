//! Error type shared by every stage of the analysis pipeline.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed corpus entry at {}:{line}: {source}", path.display())]
    CorpusLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed JSON in '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode concept file '{}': {source}", path.display())]
    Pickle {
        path: PathBuf,
        #[source]
        source: serde_pickle::Error,
    },

    #[error("failed to parse config file '{}': {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("cache artifact '{key}' could not be (de)serialized: {source}")]
    Cache {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} is not supported")]
    UnsupportedDataset(String),

    #[error("vectorizer must be fitted before transform")]
    NotFitted,

    #[error("feature matrices have incompatible shapes: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("cannot split {n_samples} samples into {n_splits} folds")]
    InvalidFolds { n_samples: usize, n_splits: usize },

    #[error("need at least {needed} users, only {available} available")]
    InsufficientUsers { needed: usize, available: usize },

    #[error("design matrix could not be decomposed: {0}")]
    SingularMatrix(#[from] ndarray_linalg::error::LinalgError),

    #[error("regression is degenerate: {0}")]
    DegenerateRegression(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Attach a path to an `io::Error`.
pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AnalysisError + '_ {
    move |source| AnalysisError::Io {
        path: path.to_path_buf(),
        source,
    }
}

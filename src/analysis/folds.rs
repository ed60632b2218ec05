//! K-fold partitioning of the user population.

use crate::error::{AnalysisError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// One train/test partition, as positions into the shuffled id list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Contiguous, unshuffled k-fold splitter.
///
/// The first `n % k` folds hold one extra test sample.
#[derive(Debug, Clone, Copy)]
pub struct KFold {
    n_splits: usize,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        KFold { n_splits }
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 || n_samples < self.n_splits {
            return Err(AnalysisError::InvalidFolds {
                n_samples,
                n_splits: self.n_splits,
            });
        }

        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for index in 0..self.n_splits {
            let size = base + usize::from(index < extra);
            let end = start + size;
            folds.push(Fold {
                index,
                train: (0..start).chain(end..n_samples).collect(),
                test: (start..end).collect(),
            });
            start = end;
        }
        Ok(folds)
    }
}

/// Shuffle ids with a seeded RNG so fold membership is reproducible.
pub fn shuffled_ids<I: IntoIterator<Item = String>>(ids: I, seed: u64) -> Vec<String> {
    let mut ids: Vec<String> = ids.into_iter().collect();
    let mut rng = StdRng::seed_from_u64(seed);
    ids.shuffle(&mut rng);
    ids
}

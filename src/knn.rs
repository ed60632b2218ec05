/// k-nearest-neighbour multi-label classifier
/// Euclidean distance, uniform majority vote per label column

use crate::classifier::Classifier;
use crate::error::Result;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

pub struct KnnClassifier {
    k: usize,
    train_x: Array2<f64>,
    train_y: Array2<u8>,
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        KnnClassifier {
            k: k.max(1),
            train_x: Array2::zeros((0, 0)),
            train_y: Array2::zeros((0, 0)),
        }
    }

    /// Training rows ordered by distance to `query`; ties keep training order.
    fn neighbours(&self, query: ArrayView1<f64>) -> Vec<usize> {
        let mut distances: Vec<(usize, f64)> = self
            .train_x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                let d: f64 = row
                    .iter()
                    .zip(query.iter())
                    .map(|(&a, &b)| (a - b) * (a - b))
                    .sum();
                (idx, d)
            })
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));
        distances
            .into_iter()
            .take(self.k)
            .map(|(idx, _)| idx)
            .collect()
    }
}

impl Classifier for KnnClassifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView2<u8>) -> Result<()> {
        self.train_x = x.to_owned();
        self.train_y = y.to_owned();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Array2<u8> {
        let n_labels = self.train_y.ncols();
        let rows: Vec<Vec<u8>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbours = self.neighbours(x.row(i));
                let k = neighbours.len();
                (0..n_labels)
                    .map(|label| {
                        let votes = neighbours
                            .iter()
                            .filter(|&&n| self.train_y[[n, label]] == 1)
                            .count();
                        // a tied vote goes to class 0
                        u8::from(2 * votes > k)
                    })
                    .collect()
            })
            .collect();

        let mut out = Array2::<u8>::zeros((x.nrows(), n_labels));
        for (mut target, row) in out.rows_mut().into_iter().zip(rows) {
            for (cell, value) in target.iter_mut().zip(row) {
                *cell = value;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_majority_vote_per_label() {
        let x = array![[0.0], [1.0], [2.0], [10.0]];
        let y = array![[1, 0], [1, 1], [0, 1], [0, 0]];
        let mut knn = KnnClassifier::new(3);
        knn.fit(x.view(), y.view()).unwrap();

        let pred = knn.predict(array![[0.5], [9.0]].view());
        // query 0.5: neighbours 0, 1, 2
        assert_eq!(pred.row(0).to_vec(), vec![1, 1]);
        // query 9.0: neighbours 3, 2, 1
        assert_eq!(pred.row(1).to_vec(), vec![0, 1]);
    }

    #[test]
    fn test_k_larger_than_training_set() {
        let x = array![[0.0], [1.0]];
        let y = array![[1], [0]];
        let mut knn = KnnClassifier::new(5);
        knn.fit(x.view(), y.view()).unwrap();
        // one vote of two is a tie
        assert_eq!(knn.predict(array![[0.0]].view())[[0, 0]], 0);
    }

    #[test]
    fn test_tied_vote_goes_to_class_zero_even_when_it_is_rarer() {
        let x = array![[0.0], [1.0], [5.0], [6.0], [7.0]];
        let y = array![[1], [0], [1], [1], [1]];
        let mut knn = KnnClassifier::new(2);
        knn.fit(x.view(), y.view()).unwrap();
        // neighbours 0 and 1 split the vote; class 0 has one training example
        assert_eq!(knn.predict(array![[0.4]].view())[[0, 0]], 0);
    }
}

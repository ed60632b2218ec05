/// Binary CART decision tree
/// Gini impurity, midpoint thresholds, majority leaves

use crate::classifier::BinaryModel;
use ndarray::{Array1, ArrayView1, ArrayView2};

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(u8),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTree {
    root: Node,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

/// Majority class; ties go to 0.
fn majority(positives: usize, total: usize) -> u8 {
    u8::from(2 * positives > total)
}

impl DecisionTree {
    /// Grow a tree on one label column.
    ///
    /// # Arguments
    ///
    /// * `x` - Training features, one row per sample
    /// * `y` - 0/1 targets
    /// * `max_depth` - Depth limit, unlimited when `None`
    /// * `min_samples_split` - Smallest node that may still be split
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<u8>,
        max_depth: Option<usize>,
        min_samples_split: usize,
    ) -> Self {
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let root = Self::grow(x, y, rows, 0, max_depth, min_samples_split.max(2));
        DecisionTree { root }
    }

    fn grow(
        x: ArrayView2<f64>,
        y: ArrayView1<u8>,
        rows: Vec<usize>,
        depth: usize,
        max_depth: Option<usize>,
        min_samples_split: usize,
    ) -> Node {
        let positives = rows.iter().filter(|&&r| y[r] == 1).count();
        let leaf = Node::Leaf(majority(positives, rows.len()));

        let pure = positives == 0 || positives == rows.len();
        let too_deep = max_depth.is_some_and(|limit| depth >= limit);
        if pure || too_deep || rows.len() < min_samples_split {
            return leaf;
        }

        // constant features leave nothing to split on
        let Some(split) = Self::best_split(x, y, &rows, positives) else {
            return leaf;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| x[[r, split.feature]] <= split.threshold);

        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(Self::grow(x, y, left, depth + 1, max_depth, min_samples_split)),
            right: Box::new(Self::grow(x, y, right, depth + 1, max_depth, min_samples_split)),
        }
    }

    /// Lowest weighted child impurity over all features and midpoints.
    fn best_split(
        x: ArrayView2<f64>,
        y: ArrayView1<u8>,
        rows: &[usize],
        positives: usize,
    ) -> Option<BestSplit> {
        let n = rows.len();
        let mut best: Option<BestSplit> = None;

        for feature in 0..x.ncols() {
            let mut ordered: Vec<(f64, u8)> =
                rows.iter().map(|&r| (x[[r, feature]], y[r])).collect();
            ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_pos = 0usize;
            for i in 1..n {
                left_pos += usize::from(ordered[i - 1].1);
                if ordered[i - 1].0 == ordered[i].0 {
                    continue;
                }
                let right_pos = positives - left_pos;
                let impurity = (i as f64 * gini(left_pos, i)
                    + (n - i) as f64 * gini(right_pos, n - i))
                    / n as f64;
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (ordered[i - 1].0 + ordered[i].0) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> u8 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(class) => return *class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

impl BinaryModel for DecisionTree {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<u8> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }
}

//! Multi-label classifier families used by the ablation evaluator.
//!
//! A [`Classifier`] maps a feature matrix to one binary prediction per label
//! column. `knn` is natively multi-label; `dt` and `mlp` fit one binary model
//! per label column in parallel on the current rayon pool.

use crate::analysis::config::ClassifierConfig;
use crate::decision_tree::DecisionTree;
use crate::error::Result;
use crate::knn::KnnClassifier;
use crate::neural_net::MLPClassifier;
use clap::ValueEnum;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classifier family selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// Feed-forward network with logistic units
    Mlp,
    /// CART decision tree
    Dt,
    /// k nearest neighbours
    Knn,
}

impl ClassifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::Mlp => "mlp",
            ClassifierKind::Dt => "dt",
            ClassifierKind::Knn => "knn",
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multi-label classifier over dense features.
pub trait Classifier: Send + Sync {
    /// `y` holds one column of 0/1 labels per class.
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView2<u8>) -> Result<()>;

    fn predict(&self, x: ArrayView2<f64>) -> Array2<u8>;
}

/// Single-column binary model.
pub trait BinaryModel: Send + Sync {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<u8>;
}

/// Predicts the only class seen during training.
pub struct ConstantModel(pub u8);

impl BinaryModel for ConstantModel {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<u8> {
        Array1::from_elem(x.nrows(), self.0)
    }
}

/// Binary model family fitted once per label column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnModel {
    Tree,
    Network,
}

/// One independent binary model per label column.
pub struct PerLabelClassifier {
    family: ColumnModel,
    config: ClassifierConfig,
    seed: u64,
    models: Vec<Box<dyn BinaryModel>>,
}

impl PerLabelClassifier {
    pub fn new(family: ColumnModel, config: &ClassifierConfig, seed: u64) -> Self {
        PerLabelClassifier {
            family,
            config: config.clone(),
            seed,
            models: Vec::new(),
        }
    }

    fn fit_column(
        &self,
        column: usize,
        x: ArrayView2<f64>,
        y: ArrayView1<u8>,
    ) -> Result<Box<dyn BinaryModel>> {
        let positives = y.iter().filter(|&&v| v == 1).count();
        if positives == 0 || positives == y.len() {
            return Ok(Box::new(ConstantModel(u8::from(positives > 0))));
        }

        Ok(match self.family {
            ColumnModel::Tree => Box::new(DecisionTree::fit(
                x,
                y,
                self.config.tree_max_depth,
                self.config.tree_min_samples_split,
            )),
            ColumnModel::Network => Box::new(MLPClassifier::fit(
                x,
                y,
                &self.config.mlp,
                self.seed.wrapping_add(column as u64),
            )),
        })
    }
}

impl Classifier for PerLabelClassifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView2<u8>) -> Result<()> {
        let this = &*self;
        let models = (0..y.ncols())
            .into_par_iter()
            .map(|column| this.fit_column(column, x, y.column(column)))
            .collect::<Result<Vec<_>>>()?;
        self.models = models;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Array2<u8> {
        let mut out = Array2::<u8>::zeros((x.nrows(), self.models.len()));
        for (model, mut column) in self.models.iter().zip(out.columns_mut()) {
            column.assign(&model.predict(x));
        }
        out
    }
}

/// Fresh, unfitted classifier of the requested family.
pub fn build_classifier(
    kind: ClassifierKind,
    config: &ClassifierConfig,
    seed: u64,
) -> Box<dyn Classifier> {
    match kind {
        ClassifierKind::Knn => Box::new(KnnClassifier::new(config.knn_neighbors)),
        ClassifierKind::Dt => Box::new(PerLabelClassifier::new(ColumnModel::Tree, config, seed)),
        ClassifierKind::Mlp => {
            Box::new(PerLabelClassifier::new(ColumnModel::Network, config, seed))
        }
    }
}

/// Outcome of a fit that may legitimately be refused.
#[derive(Debug)]
pub enum FitOutcome<T> {
    Fitted(T),
    Skipped { reason: String },
}

impl<T> FitOutcome<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, FitOutcome::Skipped { .. })
    }
}

/// Refuse label matrices with a column of fewer than `min_positive` positives.
pub fn check_label_support(
    y: ArrayView2<u8>,
    min_positive: usize,
) -> std::result::Result<(), String> {
    for (idx, column) in y.columns().into_iter().enumerate() {
        let positives = column.iter().filter(|&&v| v == 1).count();
        if positives < min_positive {
            return Err(format!(
                "label column {idx} has {positives} positive training example(s), need {min_positive}"
            ));
        }
    }
    Ok(())
}

/// Fit a fresh classifier, or skip when `guarded` and the labels are too sparse.
pub fn fit_classifier(
    kind: ClassifierKind,
    config: &ClassifierConfig,
    seed: u64,
    x: ArrayView2<f64>,
    y: ArrayView2<u8>,
    guard: Option<usize>,
) -> Result<FitOutcome<Box<dyn Classifier>>> {
    if let Some(min_positive) = guard {
        if let Err(reason) = check_label_support(y, min_positive) {
            return Ok(FitOutcome::Skipped { reason });
        }
    }
    let mut model = build_classifier(kind, config, seed);
    model.fit(x, y)?;
    Ok(FitOutcome::Fitted(model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array2<u8>) {
        let x = array![
            [0.0, 0.1],
            [0.1, 0.0],
            [0.2, 0.1],
            [0.1, 0.2],
            [1.0, 0.9],
            [0.9, 1.0],
            [1.0, 1.1],
            [1.1, 1.0],
        ];
        let y = array![
            [1, 0, 1],
            [1, 0, 1],
            [1, 0, 1],
            [1, 0, 1],
            [0, 1, 1],
            [0, 1, 1],
            [0, 1, 1],
            [0, 1, 1],
        ];
        (x, y)
    }

    #[test]
    fn test_every_family_learns_separable_labels() {
        let (x, y) = separable();
        let mut config = ClassifierConfig::default();
        config.knn_neighbors = 3;
        config.mlp.hidden_layers = vec![8];
        config.mlp.learning_rate = 0.05;
        config.mlp.validation_fraction = 0.0;
        config.mlp.max_iter = 2000;

        for kind in [ClassifierKind::Knn, ClassifierKind::Dt, ClassifierKind::Mlp] {
            let mut model = build_classifier(kind, &config, 1);
            model.fit(x.view(), y.view()).unwrap();
            let pred = model.predict(array![[0.05, 0.05], [1.05, 1.05]].view());
            assert_eq!(pred, array![[1, 0, 1], [0, 1, 1]], "{kind} failed");
        }
    }

    #[test]
    fn test_support_guard() {
        let y = array![[1, 1], [1, 0], [0, 0]];
        assert!(check_label_support(y.view(), 1).is_ok());
        let reason = check_label_support(y.view(), 2).unwrap_err();
        assert!(reason.contains("label column 1"));
    }

    #[test]
    fn test_guarded_fit_is_skipped() {
        let (x, mut y) = separable();
        y.column_mut(0).fill(0);
        y[[0, 0]] = 1;
        let config = ClassifierConfig::default();

        let guarded =
            fit_classifier(ClassifierKind::Dt, &config, 0, x.view(), y.view(), Some(2)).unwrap();
        assert!(guarded.is_skipped());

        let unguarded =
            fit_classifier(ClassifierKind::Dt, &config, 0, x.view(), y.view(), None).unwrap();
        assert!(!unguarded.is_skipped());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(ClassifierKind::Dt.to_string(), "dt");
        assert_eq!(
            ClassifierKind::from_str("knn", true).unwrap(),
            ClassifierKind::Knn
        );
    }
}

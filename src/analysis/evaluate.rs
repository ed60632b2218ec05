//! Cross-validated feature ablation.
//!
//! Every fold trains three fresh classifiers of the same family: one on the
//! document features, one on the concept features and one on both side by
//! side. Each is scored with weighted F1 on the held-out users. The evaluator
//! is a small state machine so callers can drive it fold by fold or run it to
//! completion.

use super::config::{ClassifierConfig, Config, EvaluationConfig};
use super::data::{UserRecord, UserRecords};
use super::folds::{shuffled_ids, Fold, KFold};
use super::metrics::{vocabulary_jaccard, weighted_f1};
use super::tfidf::TfidfVectorizer;
use crate::classifier::{fit_classifier, ClassifierKind, FitOutcome};
use crate::error::Result;
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Feature space a classifier is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeatureSet {
    #[serde(rename = "doc")]
    Document,
    #[serde(rename = "concept")]
    Concept,
    /// Document columns followed by concept columns
    #[serde(rename = "both")]
    Combined,
}

impl FeatureSet {
    pub const ALL: [FeatureSet; 3] = [FeatureSet::Document, FeatureSet::Concept, FeatureSet::Combined];

    pub fn label(&self) -> &'static str {
        match self {
            FeatureSet::Document => "doc",
            FeatureSet::Concept => "concept",
            FeatureSet::Combined => "both",
        }
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Position of the evaluator in its fold sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalState {
    /// The next fold to evaluate
    Fold(usize),
    Done,
}

/// Per-fold scores of one ablation run.
///
/// A `None` score marks a fold whose fit was skipped for lack of label support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AblationReport {
    pub task: String,
    pub classifier: ClassifierKind,
    pub n_users: usize,
    pub doc: Vec<Option<f64>>,
    pub concept: Vec<Option<f64>>,
    pub combined: Vec<Option<f64>>,
    /// Overlap of the document and concept vocabularies
    pub vocabulary_jaccard: f64,
}

impl AblationReport {
    pub fn scores(&self, set: FeatureSet) -> &[Option<f64>] {
        match set {
            FeatureSet::Document => &self.doc,
            FeatureSet::Concept => &self.concept,
            FeatureSet::Combined => &self.combined,
        }
    }

    /// Mean over the folds that produced a score.
    pub fn mean(&self, set: FeatureSet) -> Option<f64> {
        let present: Vec<f64> = self.scores(set).iter().flatten().copied().collect();
        if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        }
    }

    pub fn n_folds(&self) -> usize {
        self.doc.len()
    }
}

/// K-fold ablation over a fixed, shuffled user order.
pub struct AblationEvaluator<'a> {
    task: String,
    kind: ClassifierKind,
    users: Vec<&'a UserRecord>,
    folds: Vec<Fold>,
    doc_encoder: &'a TfidfVectorizer,
    concept_encoder: &'a TfidfVectorizer,
    classifier: &'a ClassifierConfig,
    evaluation: &'a EvaluationConfig,
    state: EvalState,
    scores: BTreeMap<FeatureSet, Vec<Option<f64>>>,
}

impl<'a> AblationEvaluator<'a> {
    /// Shuffle the users and fix the fold partition.
    ///
    /// # Arguments
    ///
    /// * `task` - Name used in reports
    /// * `records` - Users to cross-validate
    /// * `doc_encoder` - Fitted document encoder
    /// * `concept_encoder` - Fitted concept encoder
    /// * `kind` - Classifier family
    /// * `config` - Evaluation and classifier settings
    pub fn new(
        task: &str,
        records: &'a UserRecords,
        doc_encoder: &'a TfidfVectorizer,
        concept_encoder: &'a TfidfVectorizer,
        kind: ClassifierKind,
        config: &'a Config,
    ) -> Result<Self> {
        let ids = shuffled_ids(records.keys().cloned(), config.evaluation.seed);
        let users: Vec<&UserRecord> = ids.iter().filter_map(|id| records.get(id)).collect();
        let folds = KFold::new(config.evaluation.n_folds).split(users.len())?;

        Ok(AblationEvaluator {
            task: task.to_string(),
            kind,
            users,
            folds,
            doc_encoder,
            concept_encoder,
            classifier: &config.classifier,
            evaluation: &config.evaluation,
            state: EvalState::Fold(0),
            scores: FeatureSet::ALL.iter().map(|&set| (set, Vec::new())).collect(),
        })
    }

    pub fn state(&self) -> EvalState {
        self.state
    }

    /// Uids held out in `fold`.
    pub fn test_ids(&self, fold: usize) -> Vec<&str> {
        self.folds
            .get(fold)
            .map(|f| f.test.iter().map(|&i| self.users[i].uid.as_str()).collect())
            .unwrap_or_default()
    }

    /// Evaluate the current fold and advance.
    pub fn step(&mut self) -> Result<EvalState> {
        let EvalState::Fold(index) = self.state else {
            return Ok(EvalState::Done);
        };

        let fold_scores = self.evaluate_fold(index)?;
        log::info!(
            "Fold {}/{}: doc={} concept={} both={}",
            index + 1,
            self.folds.len(),
            format_score(fold_scores[0]),
            format_score(fold_scores[1]),
            format_score(fold_scores[2]),
        );
        for (set, score) in FeatureSet::ALL.iter().zip(fold_scores) {
            if let Some(scores) = self.scores.get_mut(set) {
                scores.push(score);
            }
        }

        self.state = if index + 1 < self.folds.len() {
            EvalState::Fold(index + 1)
        } else {
            EvalState::Done
        };
        Ok(self.state)
    }

    /// Step through every remaining fold.
    pub fn run(mut self) -> Result<AblationReport> {
        while self.step()? != EvalState::Done {}
        Ok(self.into_report())
    }

    fn evaluate_fold(&self, index: usize) -> Result<[Option<f64>; 3]> {
        let fold = &self.folds[index];
        let train: Vec<&UserRecord> = fold.train.iter().map(|&i| self.users[i]).collect();
        let test: Vec<&UserRecord> = fold.test.iter().map(|&i| self.users[i]).collect();

        let doc_train = self.doc_encoder.transform(&tokens(&train))?;
        let doc_test = self.doc_encoder.transform(&tokens(&test))?;
        let concept_train = self.concept_encoder.transform(&concepts(&train))?;
        let concept_test = self.concept_encoder.transform(&concepts(&test))?;
        let both_train = concatenate(Axis(1), &[doc_train.view(), concept_train.view()])?;
        let both_test = concatenate(Axis(1), &[doc_test.view(), concept_test.view()])?;

        let y_train = label_matrix(&train)?;
        let y_test = label_matrix(&test)?;

        let mut out = [None; 3];
        for (slot, set) in out.iter_mut().zip(FeatureSet::ALL) {
            let (x_train, x_test) = match set {
                FeatureSet::Document => (doc_train.view(), doc_test.view()),
                FeatureSet::Concept => (concept_train.view(), concept_test.view()),
                FeatureSet::Combined => (both_train.view(), both_test.view()),
            };
            *slot = self.score(index, set, x_train, x_test, y_train.view(), y_test.view())?;
        }
        Ok(out)
    }

    fn score(
        &self,
        fold: usize,
        set: FeatureSet,
        x_train: ArrayView2<f64>,
        x_test: ArrayView2<f64>,
        y_train: ArrayView2<u8>,
        y_test: ArrayView2<u8>,
    ) -> Result<Option<f64>> {
        let guard = self
            .evaluation
            .guarded
            .contains(&set)
            .then_some(self.evaluation.min_class_support);
        let seed = self.evaluation.seed.wrapping_add(fold as u64);

        match fit_classifier(self.kind, self.classifier, seed, x_train, y_train, guard)? {
            FitOutcome::Fitted(model) => {
                let predicted = model.predict(x_test);
                let truth: Vec<u8> = y_test.iter().copied().collect();
                let predicted: Vec<u8> = predicted.iter().copied().collect();
                Ok(Some(weighted_f1(&truth, &predicted)))
            }
            FitOutcome::Skipped { reason } => {
                log::warn!("Fold {}: skipping {} features, {}", fold + 1, set, reason);
                Ok(None)
            }
        }
    }

    fn into_report(mut self) -> AblationReport {
        let mut take = |set| self.scores.remove(&set).unwrap_or_default();
        let doc = take(FeatureSet::Document);
        let concept = take(FeatureSet::Concept);
        let combined = take(FeatureSet::Combined);
        AblationReport {
            task: self.task,
            classifier: self.kind,
            n_users: self.users.len(),
            doc,
            concept,
            combined,
            vocabulary_jaccard: vocabulary_jaccard(self.doc_encoder, self.concept_encoder),
        }
    }
}

fn tokens<'u>(users: &[&'u UserRecord]) -> Vec<&'u [String]> {
    users.iter().map(|u| u.tokens.as_slice()).collect()
}

fn concepts<'u>(users: &[&'u UserRecord]) -> Vec<&'u [String]> {
    users.iter().map(|u| u.concepts.as_slice()).collect()
}

/// One row of 0/1 labels per user.
pub fn label_matrix(users: &[&UserRecord]) -> Result<Array2<u8>> {
    let n_labels = users.first().map_or(0, |u| u.labels.len());
    let flat: Vec<u8> = users.iter().flat_map(|u| u.labels.iter().copied()).collect();
    Ok(Array2::from_shape_vec((users.len(), n_labels), flat)?)
}

pub fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "skipped".to_string(), |s| format!("{s:.4}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tfidf::Norm;

    fn record(uid: &str, words: &str, concepts: &[&str], labels: [u8; 2]) -> UserRecord {
        UserRecord {
            uid: uid.to_string(),
            tokens: words.split_whitespace().map(String::from).collect(),
            concepts: concepts.iter().map(|c| c.to_string()).collect(),
            labels: labels.to_vec(),
        }
    }

    /// Ten users; label column 1 is positive only for u0 and u2.
    fn population() -> UserRecords {
        (0..10)
            .map(|i| {
                let uid = format!("u{i}");
                let rec = if i == 0 || i == 2 {
                    record(&uid, "chest pain dyspnea", &["heart failure"], [0, 1])
                } else {
                    record(&uid, "cough fever sputum", &["pneumonia"], [1, 0])
                };
                (uid, rec)
            })
            .collect()
    }

    fn encoders(records: &UserRecords) -> (TfidfVectorizer, TfidfVectorizer) {
        let mut doc = TfidfVectorizer::new(100, Norm::L1);
        let mut concept = TfidfVectorizer::new(100, Norm::L1);
        let users: Vec<&UserRecord> = records.values().collect();
        doc.fit(&tokens(&users));
        concept.fit(&concepts(&users));
        (doc, concept)
    }

    #[test]
    fn test_sparse_label_skips_only_guarded_features() {
        let records = population();
        let (doc, concept) = encoders(&records);
        let config = Config::default();

        let mut evaluator =
            AblationEvaluator::new("demo", &records, &doc, &concept, ClassifierKind::Dt, &config)
                .unwrap();
        let expected_skips: Vec<bool> = (0..5)
            .map(|fold| {
                evaluator
                    .test_ids(fold)
                    .iter()
                    .any(|uid| *uid == "u0" || *uid == "u2")
            })
            .collect();

        assert_eq!(evaluator.state(), EvalState::Fold(0));
        assert_eq!(evaluator.step().unwrap(), EvalState::Fold(1));
        let report = evaluator.run().unwrap();

        assert_eq!(report.n_folds(), 5);
        for fold in 0..5 {
            assert_eq!(report.doc[fold].is_none(), expected_skips[fold], "fold {fold}");
            assert!(report.concept[fold].is_some());
            assert!(report.combined[fold].is_some());
        }
        // two positives can share at most one test fold
        assert!(expected_skips.iter().any(|&skip| skip));
    }

    #[test]
    fn test_unguarded_run_scores_every_fold() {
        let records = population();
        let (doc, concept) = encoders(&records);
        let mut config = Config::default();
        config.evaluation.guarded.clear();

        let report =
            AblationEvaluator::new("demo", &records, &doc, &concept, ClassifierKind::Knn, &config)
                .unwrap()
                .run()
                .unwrap();
        for set in FeatureSet::ALL {
            assert!(report.scores(set).iter().all(Option::is_some));
            let mean = report.mean(set).unwrap();
            assert!((0.0..=1.0).contains(&mean));
        }
        assert_eq!(report.n_users, 10);
    }

    #[test]
    fn test_done_is_terminal() {
        let records = population();
        let (doc, concept) = encoders(&records);
        let mut config = Config::default();
        config.evaluation.n_folds = 2;

        let mut evaluator =
            AblationEvaluator::new("demo", &records, &doc, &concept, ClassifierKind::Dt, &config)
                .unwrap();
        assert_eq!(evaluator.step().unwrap(), EvalState::Fold(1));
        assert_eq!(evaluator.step().unwrap(), EvalState::Done);
        assert_eq!(evaluator.step().unwrap(), EvalState::Done);
    }

    #[test]
    fn test_too_few_users_for_folds() {
        let records: UserRecords = population().into_iter().take(3).collect();
        let (doc, concept) = encoders(&records);
        let config = Config::default();
        assert!(
            AblationEvaluator::new("demo", &records, &doc, &concept, ClassifierKind::Dt, &config)
                .is_err()
        );
    }

    #[test]
    fn test_report_mean_ignores_absent_folds() {
        let report = AblationReport {
            task: "demo".to_string(),
            classifier: ClassifierKind::Dt,
            n_users: 4,
            doc: vec![None, Some(0.5), Some(1.0)],
            concept: vec![None, None, None],
            combined: vec![Some(0.2); 3],
            vocabulary_jaccard: 0.0,
        };
        assert_eq!(report.mean(FeatureSet::Document), Some(0.75));
        assert_eq!(report.mean(FeatureSet::Concept), None);
        assert_eq!(format_score(None), "skipped");
    }

    #[test]
    fn test_combined_columns_are_doc_then_concept() {
        let records = population();
        let (doc, concept) = encoders(&records);
        let users: Vec<&UserRecord> = records.values().collect();
        let d = doc.transform(&tokens(&users)).unwrap();
        let c = concept.transform(&concepts(&users)).unwrap();
        let both = concatenate(Axis(1), &[d.view(), c.view()]).unwrap();
        assert_eq!(both.ncols(), doc.n_features() + concept.n_features());
        assert_eq!(both.row(0).to_vec()[..d.ncols()], d.row(0).to_vec()[..]);
    }
}

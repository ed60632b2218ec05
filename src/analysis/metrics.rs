//! Scores and similarity measures.

use super::tfidf::TfidfVectorizer;
use ndarray::ArrayView1;
use std::collections::{BTreeSet, HashSet};

/// Support-weighted F1 over the classes present in either input.
///
/// Inputs are the flattened (user × label) bits, so the classes are 0 and 1.
/// A class with no predicted or no true members scores 0.
pub fn weighted_f1(y_true: &[u8], y_pred: &[u8]) -> f64 {
    assert_eq!(y_true.len(), y_pred.len(), "prediction length mismatch");

    let classes: BTreeSet<u8> = y_true.iter().chain(y_pred).copied().collect();
    let mut weighted = 0.0;
    let mut total_support = 0usize;

    for class in classes {
        let mut tp = 0usize;
        let mut fp = 0usize;
        let mut fn_ = 0usize;
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == class, p == class) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        let support = tp + fn_;
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        weighted += f1 * support as f64;
        total_support += support;
    }

    if total_support == 0 {
        0.0
    } else {
        weighted / total_support as f64
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Cosine similarity; 0 when either vector is all zeros.
pub fn cosine_similarity(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let dot = a.dot(&b);
    let norm = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norm > 0.0 {
        dot / norm
    } else {
        0.0
    }
}

/// Jaccard overlap of two term sets, compared case-insensitively.
pub fn jaccard<'a, A, B>(left: A, right: B) -> f64
where
    A: IntoIterator<Item = &'a str>,
    B: IntoIterator<Item = &'a str>,
{
    let left: HashSet<String> = left.into_iter().map(str::to_lowercase).collect();
    let right: HashSet<String> = right.into_iter().map(str::to_lowercase).collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// Overlap between the vocabularies of two fitted encoders.
pub fn vocabulary_jaccard(a: &TfidfVectorizer, b: &TfidfVectorizer) -> f64 {
    jaccard(a.terms(), b.terms())
}

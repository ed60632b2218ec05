//! Results reporting for the ablation and similarity analyses.

use super::evaluate::{format_score, AblationReport, FeatureSet};
use super::similarity::SimilaritySummary;
use crate::error::{io_error, AnalysisError, Result};
use csv::Writer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const RULE: &str = "===================================================================";

/// One row of the per-fold score table.
#[derive(Debug, Serialize)]
struct ScoreRow<'a> {
    data: &'a str,
    feature: &'static str,
    fold: usize,
    #[serde(rename = "f1-score")]
    f1_score: f64,
}

#[derive(Debug, Serialize)]
struct AblationDocument<'a> {
    report: &'a AblationReport,
    means: BTreeMap<&'static str, Option<f64>>,
}

/// Print per-fold scores, means and the vocabulary overlap.
pub fn print_ablation(report: &AblationReport) {
    println!("{RULE}\n");
    println!(
        "Ablation Results ({}, {}, {} users, {} folds)\n",
        report.task,
        report.classifier,
        report.n_users,
        report.n_folds()
    );

    let header: String = (1..=report.n_folds()).map(|i| format!(" Fold {i:<4}|")).collect();
    let divider = format!(
        "+----------+{}----------+",
        "----------+".repeat(report.n_folds())
    );
    println!("{divider}");
    println!("| Features |{header}   Mean   |");
    println!("{divider}");
    for set in FeatureSet::ALL {
        let cells: String = report
            .scores(set)
            .iter()
            .map(|s| format!(" {:>8} |", format_score(*s)))
            .collect();
        println!(
            "| {:<8} |{} {:>8} |",
            set.label(),
            cells,
            format_score(report.mean(set))
        );
    }
    println!("{divider}\n");

    println!(
        "Feature similarity between doc and concept vocabularies (Jaccard): {:.4}",
        report.vocabulary_jaccard
    );
    println!("\n{RULE}\n");
}

/// Write `ablation_{task}_{classifier}.json`, scores and means included.
pub fn write_ablation_json(dir: &Path, report: &AblationReport) -> Result<PathBuf> {
    let path = dir.join(format!("ablation_{}_{}.json", report.task, report.classifier));
    let document = AblationDocument {
        report,
        means: FeatureSet::ALL
            .iter()
            .map(|&set| (set.label(), report.mean(set)))
            .collect(),
    };

    let json = serde_json::to_string_pretty(&document).map_err(|source| AnalysisError::Json {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&path, json).map_err(io_error(&path))?;
    Ok(path)
}

/// Write `quant_{task}_{classifier}.csv` with one row per scored fold.
///
/// Skipped folds have no row.
pub fn write_score_table(dir: &Path, report: &AblationReport) -> Result<PathBuf> {
    let path = dir.join(format!("quant_{}_{}.csv", report.task, report.classifier));
    let mut writer = Writer::from_path(&path)?;
    for set in FeatureSet::ALL {
        for (fold, score) in report.scores(set).iter().enumerate() {
            if let Some(f1_score) = score {
                writer.serialize(ScoreRow {
                    data: &report.task,
                    feature: set.label(),
                    fold,
                    f1_score: *f1_score,
                })?;
            }
        }
    }
    writer.flush().map_err(io_error(&path))?;
    Ok(path)
}

/// Print the similarity summary and write it to `path`.
pub fn write_similarity_summary(path: &Path, summary: &SimilaritySummary) -> Result<()> {
    let text = summary.to_string();
    println!("{RULE}\n");
    println!("{text}");
    println!("\n{RULE}\n");
    std::fs::write(path, format!("{text}\n")).map_err(io_error(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierKind;

    fn report() -> AblationReport {
        AblationReport {
            task: "mimic-iii".to_string(),
            classifier: ClassifierKind::Dt,
            n_users: 10,
            doc: vec![None, Some(0.5)],
            concept: vec![Some(0.25), Some(0.75)],
            combined: vec![Some(1.0), Some(0.5)],
            vocabulary_jaccard: 0.125,
        }
    }

    #[test]
    fn test_json_report_includes_means_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ablation_json(dir.path(), &report()).unwrap();
        assert!(path.ends_with("ablation_mimic-iii_dt.json"));

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["means"]["doc"], 0.5);
        assert_eq!(value["means"]["concept"], 0.5);
        assert!(value["report"]["doc"][0].is_null());
        assert_eq!(value["report"]["classifier"], "dt");

        let parsed: AblationReport = serde_json::from_value(value["report"].clone()).unwrap();
        assert_eq!(parsed, report());
    }

    #[test]
    fn test_score_table_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_score_table(dir.path(), &report()).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "data,feature,fold,f1-score");
        assert_eq!(lines[1], "mimic-iii,doc,1,0.5");
        assert_eq!(lines[2], "mimic-iii,concept,0,0.25");
        // five scored folds plus the header
        assert_eq!(lines.len(), 6);
    }
}

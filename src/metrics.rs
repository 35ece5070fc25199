//! Held-out evaluation: ROC-AUC from rank statistics, per-class
//! precision/recall/F1, and the ranked coefficient summary printed after
//! training.

use itertools::Itertools;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Aggregate quality numbers persisted inside the trained artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub roc_auc: f64,
    pub f1_macro: f64,
    pub n_train: usize,
    pub n_test: usize,
}

/// Precision/recall/F1 for one class of the binary problem.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Full per-class breakdown on the held-out split. Printed at training time,
/// not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationReport {
    pub negative: ClassMetrics,
    pub positive: ClassMetrics,
    pub accuracy: f64,
    pub macro_f1: f64,
    pub n: usize,
}

/// A feature name paired with its fitted coefficient.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedFeature {
    pub name: String,
    pub weight: f64,
}

/// Area under the ROC curve via the Mann-Whitney rank statistic, with tied
/// scores assigned their average rank. Returns NaN when the labels hold a
/// single class, since the curve is undefined there.
pub fn roc_auc(labels: &Array1<f64>, scores: &Array1<f64>) -> f64 {
    let n = labels.len();
    let positives = labels.iter().filter(|&&y| y == 1.0).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return f64::NAN;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Ranks are 1-based; runs of equal scores share their average rank.
    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let average_rank = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = average_rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = (0..n)
        .filter(|&idx| labels[idx] == 1.0)
        .map(|idx| ranks[idx])
        .sum();
    let n_pos = positives as f64;
    let n_neg = negatives as f64;
    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Builds the per-class breakdown from hard 0/1 predictions. Degenerate
/// denominators (a class never predicted or never present) score 0.0 rather
/// than NaN.
pub fn classification_report(labels: &Array1<f64>, predictions: &[u8]) -> ClassificationReport {
    debug_assert_eq!(labels.len(), predictions.len());
    let n = labels.len();

    let mut true_positive = 0usize;
    let mut false_positive = 0usize;
    let mut false_negative = 0usize;
    let mut true_negative = 0usize;
    for (label, &predicted) in labels.iter().zip(predictions) {
        match (*label == 1.0, predicted == 1) {
            (true, true) => true_positive += 1,
            (false, true) => false_positive += 1,
            (true, false) => false_negative += 1,
            (false, false) => true_negative += 1,
        }
    }

    let positive = class_metrics(true_positive, false_positive, false_negative);
    // The negative class sees the same counts with the roles flipped.
    let negative = class_metrics(true_negative, false_negative, false_positive);

    let accuracy = if n > 0 {
        (true_positive + true_negative) as f64 / n as f64
    } else {
        0.0
    };
    ClassificationReport {
        macro_f1: (negative.f1 + positive.f1) / 2.0,
        negative,
        positive,
        accuracy,
        n,
    }
}

fn class_metrics(true_count: usize, false_predicted: usize, missed: usize) -> ClassMetrics {
    let precision = ratio(true_count, true_count + false_predicted);
    let recall = ratio(true_count, true_count + missed);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    ClassMetrics {
        precision,
        recall,
        f1,
        support: true_count + missed,
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// The `k` most positive and `k` most negative coefficients by signed value.
/// The positive list is strongest-first; the negative list is
/// most-negative-first.
pub fn top_signed_coefficients(
    names: &[String],
    weights: &Array1<f64>,
    k: usize,
) -> (Vec<RankedFeature>, Vec<RankedFeature>) {
    let ranked: Vec<RankedFeature> = names
        .iter()
        .zip(weights.iter())
        .map(|(name, &weight)| RankedFeature {
            name: name.clone(),
            weight,
        })
        .sorted_by(|a, b| b.weight.total_cmp(&a.weight))
        .collect();

    let k = k.min(ranked.len());
    let top_positive = ranked[..k].to_vec();
    let mut top_negative = ranked[ranked.len() - k..].to_vec();
    top_negative.reverse();
    (top_positive, top_negative)
}

/// Formats the report in the familiar four-column layout.
pub fn render_classification_report(report: &ClassificationReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:>12}  {:>9}  {:>9}  {:>9}  {:>9}\n\n",
        "", "precision", "recall", "f1-score", "support"
    ));
    for (label, metrics) in [("no", &report.negative), ("yes", &report.positive)] {
        out.push_str(&format!(
            "{:>12}  {:>9.3}  {:>9.3}  {:>9.3}  {:>9}\n",
            label, metrics.precision, metrics.recall, metrics.f1, metrics.support
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "{:>12}  {:>9}  {:>9}  {:>9.3}  {:>9}\n",
        "accuracy", "", "", report.accuracy, report.n
    ));
    let macro_precision = (report.negative.precision + report.positive.precision) / 2.0;
    let macro_recall = (report.negative.recall + report.positive.recall) / 2.0;
    out.push_str(&format!(
        "{:>12}  {:>9.3}  {:>9.3}  {:>9.3}  {:>9}\n",
        "macro avg", macro_precision, macro_recall, report.macro_f1, report.n
    ));
    out
}

/// Formats the ranked coefficients as two aligned columns of name/weight
/// pairs.
pub fn render_feature_influence(
    top_positive: &[RankedFeature],
    top_negative: &[RankedFeature],
) -> String {
    let mut out = String::new();
    out.push_str("Strongest push toward \"yes\":\n");
    for feature in top_positive {
        out.push_str(&format!("  {:<24} {:>+9.4}\n", feature.name, feature.weight));
    }
    out.push_str("Strongest push toward \"no\":\n");
    for feature in top_negative {
        out.push_str(&format!("  {:<24} {:>+9.4}\n", feature.name, feature.weight));
    }
    out
}

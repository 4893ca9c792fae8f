use std::fmt;

use ndarray::ArrayView2;
use serde::Serialize;

use crate::classifier::ClassifierError;

/// Per-label confusion counts over a set of predictions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LabelStats {
    true_positive: usize,
    false_positive: usize,
    false_negative: usize,
}

impl LabelStats {
    fn precision(&self) -> Option<f64> {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    fn recall(&self) -> Option<f64> {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    fn support(&self) -> usize {
        self.true_positive + self.false_negative
    }
}

fn ratio(numerator: usize, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

fn f1(precision: Option<f64>, recall: Option<f64>) -> Option<f64> {
    match (precision, recall) {
        (Some(p), Some(r)) if p + r > 0.0 => Some(2.0 * p * r / (p + r)),
        (Some(_), Some(_)) => Some(0.0),
        _ => None,
    }
}

/// Scores for one category. `None` marks a value that is undefined on the
/// evaluated rows: precision with no predicted positives, recall with no
/// true positives in the ground truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelMetrics {
    pub name: String,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    pub support: usize,
}

impl LabelMetrics {
    pub fn insufficient_data(&self) -> bool {
        self.precision.is_none() || self.recall.is_none()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Exact-match accuracy plus per-label and averaged precision/recall/F1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub n_samples: usize,
    pub accuracy: f64,
    /// In label column order.
    pub labels: Vec<LabelMetrics>,
    pub micro: AverageMetrics,
    pub macro_avg: AverageMetrics,
    pub weighted: AverageMetrics,
}

impl EvaluationReport {
    pub fn label(&self, name: &str) -> Option<&LabelMetrics> {
        self.labels.iter().find(|m| m.name == name)
    }

    /// Number of labels with at least one undefined metric.
    pub fn undefined_labels(&self) -> usize {
        self.labels.iter().filter(|m| m.insufficient_data()).count()
    }
}

/// Scores `y_pred` against `y_true`, both `rows x N`, with columns named by
/// `category_names`.
///
/// Undefined per-label values stay `None` in [`LabelMetrics`] and count as
/// 0 in the macro and weighted averages.
pub fn evaluate(
    y_true: ArrayView2<'_, u8>,
    y_pred: ArrayView2<'_, u8>,
    category_names: &[String],
) -> Result<EvaluationReport, ClassifierError> {
    if y_true.dim() != y_pred.dim() {
        return Err(ClassifierError::ValidationError(format!(
            "Ground truth is {:?} but predictions are {:?}",
            y_true.dim(),
            y_pred.dim()
        )));
    }
    if y_true.ncols() != category_names.len() {
        return Err(ClassifierError::ValidationError(format!(
            "{} label columns but {} category names",
            y_true.ncols(),
            category_names.len()
        )));
    }
    if y_true.nrows() == 0 {
        return Err(ClassifierError::ValidationError(
            "Cannot evaluate on zero rows".into(),
        ));
    }

    let exact = y_true
        .rows()
        .into_iter()
        .zip(y_pred.rows())
        .filter(|(t, p)| t == p)
        .count();
    let accuracy = exact as f64 / y_true.nrows() as f64;

    let stats: Vec<LabelStats> = y_true
        .columns()
        .into_iter()
        .zip(y_pred.columns())
        .map(|(t, p)| {
            let mut s = LabelStats::default();
            for (&t, &p) in t.iter().zip(p.iter()) {
                match (t != 0, p != 0) {
                    (true, true) => s.true_positive += 1,
                    (false, true) => s.false_positive += 1,
                    (true, false) => s.false_negative += 1,
                    (false, false) => {}
                }
            }
            s
        })
        .collect();

    let labels: Vec<LabelMetrics> = category_names
        .iter()
        .zip(&stats)
        .map(|(name, s)| {
            let precision = s.precision();
            let recall = s.recall();
            LabelMetrics {
                name: name.clone(),
                precision,
                recall,
                f1: f1(precision, recall),
                support: s.support(),
            }
        })
        .collect();

    let total = stats.iter().fold(LabelStats::default(), |acc, s| LabelStats {
        true_positive: acc.true_positive + s.true_positive,
        false_positive: acc.false_positive + s.false_positive,
        false_negative: acc.false_negative + s.false_negative,
    });
    let micro_precision = total.precision().unwrap_or(0.0);
    let micro_recall = total.recall().unwrap_or(0.0);
    let micro = AverageMetrics {
        precision: micro_precision,
        recall: micro_recall,
        f1: f1(Some(micro_precision), Some(micro_recall)).unwrap_or(0.0),
    };

    let n_labels = labels.len().max(1) as f64;
    let macro_avg = AverageMetrics {
        precision: labels.iter().map(|m| m.precision.unwrap_or(0.0)).sum::<f64>() / n_labels,
        recall: labels.iter().map(|m| m.recall.unwrap_or(0.0)).sum::<f64>() / n_labels,
        f1: labels.iter().map(|m| m.f1.unwrap_or(0.0)).sum::<f64>() / n_labels,
    };

    let total_support: usize = labels.iter().map(|m| m.support).sum();
    let weighted = if total_support > 0 {
        let weigh = |value: fn(&LabelMetrics) -> Option<f64>| {
            labels
                .iter()
                .map(|m| value(m).unwrap_or(0.0) * m.support as f64)
                .sum::<f64>()
                / total_support as f64
        };
        AverageMetrics {
            precision: weigh(|m| m.precision),
            recall: weigh(|m| m.recall),
            f1: weigh(|m| m.f1),
        }
    } else {
        AverageMetrics::default()
    };

    Ok(EvaluationReport {
        n_samples: y_true.nrows(),
        accuracy,
        labels,
        micro,
        macro_avg,
        weighted,
    })
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .labels
            .iter()
            .map(|m| m.name.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        writeln!(
            f,
            "Exact-match accuracy: {:.4} ({} samples)",
            self.accuracy, self.n_samples
        )?;
        writeln!(f)?;
        writeln!(
            f,
            "{:<width$}  {:>9}  {:>9}  {:>9}  {:>9}",
            "category", "precision", "recall", "f1-score", "support"
        )?;
        for m in &self.labels {
            write!(
                f,
                "{:<width$}  {:>9}  {:>9}  {:>9}  {:>9}",
                m.name,
                cell(m.precision),
                cell(m.recall),
                cell(m.f1),
                m.support
            )?;
            if m.insufficient_data() {
                write!(f, "  insufficient data")?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;

        let total_support: usize = self.labels.iter().map(|m| m.support).sum();
        for (name, avg) in [
            ("micro avg", &self.micro),
            ("macro avg", &self.macro_avg),
            ("weighted avg", &self.weighted),
        ] {
            writeln!(
                f,
                "{:<width$}  {:>9.4}  {:>9.4}  {:>9.4}  {:>9}",
                name, avg.precision, avg.recall, avg.f1, total_support
            )?;
        }

        let undefined = self.undefined_labels();
        if undefined > 0 {
            writeln!(f)?;
            writeln!(
                f,
                "{undefined} label(s) had insufficient data; undefined values count as 0 in the averages"
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("label_{i}")).collect()
    }

    #[test]
    fn test_perfect_predictions() {
        let y = array![[1u8, 0], [0, 1], [1, 1]];
        let report = evaluate(y.view(), y.view(), &names(2)).unwrap();
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.labels[0].precision, Some(1.0));
        assert_eq!(report.labels[0].support, 2);
        assert_eq!(report.macro_avg.f1, 1.0);
        assert_eq!(report.undefined_labels(), 0);
    }

    #[test]
    fn test_exact_match_accuracy() {
        let y_true = array![[1u8, 0], [0, 1], [1, 1], [0, 0]];
        let y_pred = array![[1u8, 0], [0, 0], [1, 1], [1, 0]];
        let report = evaluate(y_true.view(), y_pred.view(), &names(2)).unwrap();
        assert_eq!(report.accuracy, 0.5);

        // label_0: tp 2, fp 1, fn 0
        let m = &report.labels[0];
        assert!((m.precision.unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.recall, Some(1.0));
        assert!((m.f1.unwrap() - 0.8).abs() < 1e-12);

        // label_1: tp 1, fp 0, fn 1
        let m = &report.labels[1];
        assert_eq!(m.precision, Some(1.0));
        assert_eq!(m.recall, Some(0.5));

        // micro: tp 3, fp 1, fn 1
        assert!((report.micro.precision - 0.75).abs() < 1e-12);
        assert!((report.micro.recall - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_undefined_metrics_are_flagged() {
        let y_true = array![[0u8, 1], [0, 0]];
        let y_pred = array![[0u8, 1], [0, 0]];
        let report = evaluate(y_true.view(), y_pred.view(), &names(2)).unwrap();

        let m = &report.labels[0];
        assert_eq!(m.precision, None);
        assert_eq!(m.recall, None);
        assert_eq!(m.f1, None);
        assert!(m.insufficient_data());
        assert_eq!(report.undefined_labels(), 1);
        assert_eq!(report.macro_avg.precision, 0.5);
        assert_eq!(report.weighted.precision, 1.0);

        let rendered = report.to_string();
        assert!(rendered.contains("n/a"));
        assert!(rendered.contains("insufficient data"));
        assert!(rendered.contains("1 label(s) had insufficient data"));
    }

    #[test]
    fn test_report_keeps_label_order() {
        let y = array![[1u8, 0, 1]];
        let categories = vec!["related".to_string(), "aid".to_string(), "water".to_string()];
        let report = evaluate(y.view(), y.view(), &categories).unwrap();
        let order: Vec<&str> = report.labels.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(order, vec!["related", "aid", "water"]);
        assert!(report.label("water").is_some());
    }

    #[test]
    fn test_shape_mismatch() {
        let y_true = array![[1u8, 0]];
        let y_pred = array![[1u8, 0], [0, 0]];
        assert!(evaluate(y_true.view(), y_pred.view(), &names(2)).is_err());
        assert!(evaluate(y_true.view(), y_true.view(), &names(3)).is_err());
    }
}

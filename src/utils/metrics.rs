//! Classification metrics

use serde::{Deserialize, Serialize};

/// Metrics calculator for predicted condition classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// True labels
    pub y_true: Vec<usize>,
    /// Predicted labels
    pub y_pred: Vec<usize>,
    /// Number of classes
    pub num_classes: usize,
}

impl Metrics {
    /// Create new metrics from predictions
    pub fn new(y_true: Vec<usize>, y_pred: Vec<usize>, num_classes: usize) -> Self {
        Self {
            y_true,
            y_pred,
            num_classes,
        }
    }

    /// Fraction of matching labels
    pub fn accuracy(&self) -> f32 {
        if self.y_true.is_empty() {
            return 0.0;
        }

        let correct = self
            .y_true
            .iter()
            .zip(&self.y_pred)
            .filter(|(t, p)| t == p)
            .count();

        correct as f32 / self.y_true.len() as f32
    }

    /// Returns matrix[true_label][pred_label]
    pub fn confusion_matrix(&self) -> Vec<Vec<usize>> {
        let mut matrix = vec![vec![0usize; self.num_classes]; self.num_classes];

        for (&t, &p) in self.y_true.iter().zip(&self.y_pred) {
            if t < self.num_classes && p < self.num_classes {
                matrix[t][p] += 1;
            }
        }

        matrix
    }

    /// Per-class precision
    pub fn precision(&self) -> Vec<f32> {
        let cm = self.confusion_matrix();

        (0..self.num_classes)
            .map(|c| {
                let tp = cm[c][c] as f32;
                let predicted: f32 = (0..self.num_classes).map(|i| cm[i][c] as f32).sum();
                if predicted > 0.0 {
                    tp / predicted
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Per-class recall
    pub fn recall(&self) -> Vec<f32> {
        let cm = self.confusion_matrix();

        (0..self.num_classes)
            .map(|c| {
                let tp = cm[c][c] as f32;
                let actual: f32 = cm[c].iter().map(|&v| v as f32).sum();
                if actual > 0.0 {
                    tp / actual
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Per-class F1 score
    pub fn f1_score(&self) -> Vec<f32> {
        let precision = self.precision();
        let recall = self.recall();

        precision
            .iter()
            .zip(&recall)
            .map(|(&p, &r)| {
                if p + r > 0.0 {
                    2.0 * p * r / (p + r)
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Macro-averaged F1 score
    pub fn macro_f1(&self) -> f32 {
        if self.num_classes == 0 {
            return 0.0;
        }
        self.f1_score().iter().sum::<f32>() / self.num_classes as f32
    }

    fn support(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.num_classes];
        for &t in &self.y_true {
            if t < self.num_classes {
                counts[t] += 1;
            }
        }
        counts
    }

    /// Text report with one line per class
    pub fn classification_report(&self) -> String {
        let precision = self.precision();
        let recall = self.recall();
        let f1 = self.f1_score();
        let support = self.support();
        let n = self.num_classes.max(1) as f32;

        let mut report = String::new();
        report.push_str(&format!(
            "{:>10} {:>10} {:>10} {:>10} {:>10}\n",
            "", "precision", "recall", "f1-score", "support"
        ));
        report.push_str(&format!("{}\n", "-".repeat(54)));

        for c in 0..self.num_classes {
            report.push_str(&format!(
                "{:>10} {:>10.4} {:>10.4} {:>10.4} {:>10}\n",
                format!("class {}", c),
                precision[c],
                recall[c],
                f1[c],
                support[c]
            ));
        }

        report.push_str(&format!("{}\n", "-".repeat(54)));
        report.push_str(&format!(
            "{:>10} {:>10} {:>10} {:>10.4} {:>10}\n",
            "accuracy",
            "",
            "",
            self.accuracy(),
            self.y_true.len()
        ));
        report.push_str(&format!(
            "{:>10} {:>10.4} {:>10.4} {:>10.4} {:>10}\n",
            "macro avg",
            precision.iter().sum::<f32>() / n,
            recall.iter().sum::<f32>() / n,
            self.macro_f1(),
            self.y_true.len()
        ));

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy() {
        let metrics = Metrics::new(
            vec![0, 1, 2, 0, 1, 2],
            vec![0, 1, 2, 0, 2, 2], // 5 correct, 1 wrong
            3,
        );

        let acc = metrics.accuracy();
        assert!((acc - 5.0 / 6.0).abs() < 0.001);
    }

    #[test]
    fn test_confusion_matrix() {
        let metrics = Metrics::new(vec![0, 0, 1, 1, 2, 2], vec![0, 1, 1, 0, 2, 2], 3);

        let cm = metrics.confusion_matrix();
        assert_eq!(cm[0][0], 1);
        assert_eq!(cm[0][1], 1);
        assert_eq!(cm[1][0], 1);
        assert_eq!(cm[1][1], 1);
        assert_eq!(cm[2][2], 2);
    }

    #[test]
    fn test_precision_recall_f1() {
        let metrics = Metrics::new(vec![0, 0, 1, 1], vec![0, 1, 1, 1], 2);

        let p = metrics.precision();
        let r = metrics.recall();
        assert!((p[0] - 1.0).abs() < 1e-6);
        assert!((p[1] - 2.0 / 3.0).abs() < 1e-6);
        assert!((r[0] - 0.5).abs() < 1e-6);
        assert!((r[1] - 1.0).abs() < 1e-6);

        let f1 = metrics.f1_score();
        assert!((f1[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_report_lists_every_class() {
        let metrics = Metrics::new(vec![0, 1, 2, 3], vec![0, 1, 2, 0], 4);
        let report = metrics.classification_report();
        assert!(report.contains("class 3"));
        assert!(report.contains("accuracy"));
    }

    #[test]
    fn test_empty() {
        let metrics = Metrics::new(vec![], vec![], 2);
        assert_eq!(metrics.accuracy(), 0.0);
    }
}

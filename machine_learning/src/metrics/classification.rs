use std::collections::BTreeSet;

/// Classification metrics computed over a whole epoch of predictions.
///
/// These aren't batch decomposable, so the loop collects every label and
/// prediction before computing them once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricFn {
    Accuracy,
    MacroF1,
}

impl MetricFn {
    pub fn name(&self) -> &'static str {
        match self {
            MetricFn::Accuracy => "accuracy",
            MetricFn::MacroF1 => "macro_f1",
        }
    }

    /// Scores `predicts` against `labels`, both the same length. Empty inputs score `0.0`.
    pub fn compute(&self, predicts: &[usize], labels: &[usize]) -> f64 {
        match self {
            MetricFn::Accuracy => accuracy(predicts, labels),
            MetricFn::MacroF1 => macro_f1(predicts, labels),
        }
    }
}

fn accuracy(predicts: &[usize], labels: &[usize]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }

    let hits = predicts.iter().zip(labels).filter(|(p, l)| p == l).count();
    hits as f64 / labels.len() as f64
}

/// Unweighted mean of the per class F1 over every class seen in either the labels or the predictions.
fn macro_f1(predicts: &[usize], labels: &[usize]) -> f64 {
    let classes: BTreeSet<usize> = predicts.iter().chain(labels).copied().collect();
    if classes.is_empty() {
        return 0.0;
    }

    let total: f64 = classes
        .iter()
        .map(|&class| {
            let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
            for (&p, &l) in predicts.iter().zip(labels) {
                match (p == class, l == class) {
                    (true, true) => tp += 1,
                    (true, false) => fp += 1,
                    (false, true) => fn_ += 1,
                    (false, false) => {}
                }
            }

            let denom = 2 * tp + fp + fn_;
            if denom == 0 {
                0.0
            } else {
                2.0 * tp as f64 / denom as f64
            }
        })
        .sum();

    total / classes.len() as f64
}

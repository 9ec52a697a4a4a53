use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::LossFn;
use crate::{MlErr, Result};

/// Cross entropy over the softmax of unnormalized class scores.
#[derive(Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    fn check(y_pred: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<()> {
        if y_pred.nrows() != labels.len() {
            return Err(MlErr::SizeMismatch {
                a: "predictions",
                b: "labels",
                got: y_pred.nrows(),
                expected: labels.len(),
            });
        }

        let classes = y_pred.ncols();
        if let Some(&label) = labels.iter().find(|&&label| label >= classes) {
            return Err(MlErr::LabelOutOfRange { label, classes });
        }

        Ok(())
    }
}

/// Row-wise softmax, shifted by the row maximum so the exponentials never overflow.
pub(crate) fn softmax(y_pred: ArrayView2<f32>) -> Array2<f32> {
    let mut probs = y_pred.to_owned();

    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
        row.mapv_inplace(|x| (x - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|x| x / sum);
    }

    probs
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<f32> {
        Self::check(y_pred, labels)?;
        if labels.is_empty() {
            return Ok(0.0);
        }

        let total: f32 = y_pred
            .axis_iter(Axis(0))
            .zip(labels)
            .map(|(row, &label)| {
                let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
                let log_sum_exp = row.mapv(|x| (x - max).exp()).sum().ln() + max;
                log_sum_exp - row[label]
            })
            .sum();

        Ok(total / labels.len() as f32)
    }

    fn loss_prime(
        &self,
        y_pred: ArrayView2<f32>,
        labels: ArrayView1<usize>,
    ) -> Result<Array2<f32>> {
        Self::check(y_pred, labels)?;

        let mut d = softmax(y_pred);
        for (mut row, &label) in d.axis_iter_mut(Axis(0)).zip(labels) {
            row[label] -= 1.0;
        }

        let n = labels.len().max(1) as f32;
        d.mapv_inplace(|x| x / n);
        Ok(d)
    }
}

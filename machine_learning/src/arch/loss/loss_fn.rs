use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::Result;

/// The criterion that measures how far a prediction is from the labels.
pub trait LossFn {
    fn loss(&self, y_pred: ArrayView2<f32>, labels: ArrayView1<usize>) -> Result<f32>;
    fn loss_prime(&self, y_pred: ArrayView2<f32>, labels: ArrayView1<usize>)
    -> Result<Array2<f32>>;
}

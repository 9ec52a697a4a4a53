use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD};

use crate::{batch::Batch, error::Result};

/// A named view over one of the model's parameter tensors.
pub type NamedParam<'a> = (String, ArrayViewD<'a, f32>);

/// What a forward pass produces.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// The class scores, `[batch, classes]`.
    pub predicted: Array2<f32>,
    /// The attention weights over the inputs, for diagnostics.
    pub attention: Option<ArrayD<f32>>,
    /// The summed entropy of the attention weights over the batch.
    pub entropy: Option<f32>,
}

/// The capabilities the training loop needs from a model.
///
/// The architecture itself is opaque: the loop only runs forward passes, hands
/// back the derivative of the loss and lets the optimizer walk the flat
/// parameter and gradient buffers.
pub trait Model {
    /// Makes a forward pass over a batch.
    ///
    /// # Arguments
    /// * `batch` - The batch of data, already placed on the model's device.
    ///
    /// # Returns
    /// The prediction for the batch or an error if a required field is missing.
    fn forward(&mut self, batch: &Batch) -> Result<ModelOutput>;

    /// Accumulates the gradient of the loss w.r.t. the parameters of the last forward pass.
    ///
    /// # Arguments
    /// * `d_predicted` - The derivative of the loss w.r.t. the predictions.
    /// * `d_entropy` - The derivative of the loss w.r.t. the entropy, zero when
    ///   the entropy isn't part of the loss.
    fn backward(&mut self, d_predicted: ArrayView2<f32>, d_entropy: f32) -> Result<()>;

    /// Sets every gradient to zero.
    fn zero_grad(&mut self);

    /// Returns the flat parameters along with their gradient, both of the same length.
    fn params_and_grad(&mut self) -> (&mut [f32], &mut [f32]);

    /// Returns every parameter tensor with its name.
    fn named_parameters(&self) -> Vec<NamedParam<'_>>;

    /// Switches between training and inference behaviour.
    fn set_training(&mut self, _training: bool) {}
}

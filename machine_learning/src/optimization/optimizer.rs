use crate::Result;

/// Dictates how the parameters move given their gradient.
pub trait Optimizer {
    /// Makes one optimization step.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient used for taking the step.
    ///
    /// # Returns
    /// An error if `params` and `grad` differ in length.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, learning_rate: f32);
}

pub(super) fn check_sizes(params: &[f32], grad: &[f32]) -> Result<()> {
    if params.len() != grad.len() {
        return Err(crate::MlErr::SizeMismatch {
            a: "params",
            b: "grad",
            got: grad.len(),
            expected: params.len(),
        });
    }

    Ok(())
}

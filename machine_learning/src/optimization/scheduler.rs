use std::num::NonZeroUsize;

use super::Optimizer;

/// Adjusts the learning rate of an optimizer, stepped once per epoch.
pub trait LrScheduler {
    fn step(&mut self, optimizer: &mut dyn Optimizer);
}

/// Decays the learning rate by `gamma` every `step_size` epochs.
#[derive(Debug, Clone)]
pub struct StepLr {
    step_size: NonZeroUsize,
    gamma: f32,
    epoch: usize,
}

impl StepLr {
    /// Creates a new `StepLr`.
    ///
    /// # Arguments
    /// * `step_size` - The amount of epochs between decays.
    /// * `gamma` - The multiplicative decay factor.
    pub fn new(step_size: NonZeroUsize, gamma: f32) -> Self {
        Self {
            step_size,
            gamma,
            epoch: 0,
        }
    }
}

impl LrScheduler for StepLr {
    fn step(&mut self, optimizer: &mut dyn Optimizer) {
        self.epoch += 1;

        if self.epoch % self.step_size.get() == 0 {
            let lr = optimizer.learning_rate() * self.gamma;
            optimizer.set_learning_rate(lr);
        }
    }
}

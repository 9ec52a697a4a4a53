use collective::DistContext;
use ndarray::{Array1, Array2, ArrayD, Axis};

use crate::{
    MlErr, Result,
    arch::{Model, loss::LossFn},
    batch::{Batch, Cpu, Device},
};

/// How the loss is assembled from the model's output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerConfig {
    /// Adds `alpha * entropy` to the training loss.
    pub entropy_constraint: bool,
    /// Reports the attention weights and entropy along with every output.
    pub calculate_entropy: bool,
    /// The weight of the entropy penalty.
    pub alpha: f32,
}

impl RunnerConfig {
    /// Creates a new `RunnerConfig`, entropy is reported whenever it's constrained.
    pub fn new(entropy_constraint: bool, alpha: f32) -> Self {
        Self {
            entropy_constraint,
            calculate_entropy: entropy_constraint,
            alpha,
        }
    }

    pub fn with_calculate_entropy(mut self, calculate_entropy: bool) -> Self {
        self.calculate_entropy = calculate_entropy;
        self
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new(false, 0.001)
    }
}

/// The outcome of running a single batch.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub label: Array1<usize>,
    pub ids: Option<Vec<u64>>,
    /// The training loss, that is, the task loss plus the entropy penalty when it's constrained.
    pub loss: f32,
    /// The criterion alone, never penalized.
    pub task_loss: f32,
    pub predict: Array2<f32>,
    pub attention_weight: Option<ArrayD<f32>>,
    pub entropy: Option<f32>,
}

impl RunOutput {
    /// The amount of examples in the batch.
    pub fn len(&self) -> usize {
        self.label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_empty()
    }

    /// The predicted class of every example, ties go to the lowest class.
    pub fn argmax(&self) -> Vec<usize> {
        self.predict
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |best, (i, &x)| {
                        if x > best.1 { (i, x) } else { best }
                    })
                    .0
            })
            .collect()
    }
}

/// Runs the forward pass and the criterion for one batch.
pub struct BatchRunner<L, D = Cpu>
where
    L: LossFn,
    D: Device,
{
    criterion: L,
    device: D,
    cfg: RunnerConfig,
    ctx: DistContext,
}

impl<L: LossFn> BatchRunner<L, Cpu> {
    /// Creates a new `BatchRunner` computing on the host.
    ///
    /// # Arguments
    /// * `criterion` - The task loss.
    /// * `cfg` - How the entropy takes part in the loss.
    /// * `ctx` - The distributed context of this process.
    pub fn new(criterion: L, cfg: RunnerConfig, ctx: DistContext) -> Self {
        Self::with_device(criterion, Cpu, cfg, ctx)
    }
}

impl<L: LossFn, D: Device> BatchRunner<L, D> {
    pub fn with_device(criterion: L, device: D, cfg: RunnerConfig, ctx: DistContext) -> Self {
        Self {
            criterion,
            device,
            cfg,
            ctx,
        }
    }

    pub fn criterion(&self) -> &L {
        &self.criterion
    }

    pub fn config(&self) -> RunnerConfig {
        self.cfg
    }

    pub fn context(&self) -> DistContext {
        self.ctx
    }

    /// The derivative of the training loss w.r.t. the entropy.
    pub fn entropy_grad(&self) -> f32 {
        if self.cfg.entropy_constraint {
            self.cfg.alpha
        } else {
            0.0
        }
    }

    /// Runs `model` over `batch`.
    ///
    /// # Arguments
    /// * `batch` - The batch of data.
    /// * `model` - The model making the prediction.
    /// * `use_distributed_batch` - Whether the distributed runtime already placed
    ///   the batch, the device transfer is skipped if so and the job is distributed.
    ///
    /// # Returns
    /// The prediction along with its loss, or an error if the model or criterion fail.
    pub fn run<M>(&self, batch: Batch, model: &mut M, use_distributed_batch: bool) -> Result<RunOutput>
    where
        M: Model + ?Sized,
    {
        let batch = if use_distributed_batch && self.ctx.is_distributed() {
            batch
        } else {
            self.device.place(batch)
        };

        let output = model.forward(&batch)?;
        let task_loss = self.criterion.loss(output.predicted.view(), batch.label())?;

        let needs_entropy = self.cfg.entropy_constraint || self.cfg.calculate_entropy;
        let entropy = match (needs_entropy, output.entropy) {
            (true, None) => return Err(MlErr::MissingEntropy),
            (true, Some(entropy)) => Some(entropy),
            (false, _) => None,
        };

        let mut loss = task_loss;
        if self.cfg.entropy_constraint {
            loss += self.cfg.alpha * entropy.unwrap_or_default();
        }

        let (attention_weight, entropy) = if self.cfg.calculate_entropy {
            (output.attention, entropy)
        } else {
            (None, None)
        };

        let (label, ids) = batch.into_targets();

        Ok(RunOutput {
            label,
            ids,
            loss,
            task_loss,
            predict: output.predicted,
            attention_weight,
            entropy,
        })
    }
}

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use collective::{ProcessGroup, gather_map, gather_sum};
use log::{debug, info, warn};

use super::{BatchRunner, RunOutput};
use crate::{
    MlErr, Result,
    arch::{Model, loss::LossFn},
    batch::Device,
    dataset::BatchLoader,
    metrics::{MetricFn, MetricTracker},
    optimization::{LrScheduler, Optimizer},
    writer::{NullWriter, Phase, SummaryWriter},
};

/// The metrics of an epoch, keyed by name.
pub type EpochLog = BTreeMap<String, f64>;

const LOSS: &str = "loss";
const DOC_ENTROPY: &str = "doc_entropy";

/// Combines the gradient of every replica before the optimizer step, e.g. by averaging it.
pub trait GradientReducer {
    fn reduce(&mut self, grad: &mut [f32]) -> Result<()>;
}

/// Drives training and evaluation of a model, one epoch at a time.
///
/// Every process owns its own `EpochLoop`, trackers included, nothing in here is shared.
pub struct EpochLoop<M, O, L, D>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
    D: Device,
{
    model: M,
    optimizer: O,
    runner: BatchRunner<L, D>,
    metric_fns: Vec<MetricFn>,
    train_metrics: MetricTracker,
    valid_metrics: MetricTracker,
    scheduler: Option<Box<dyn LrScheduler>>,
    reducer: Option<Box<dyn GradientReducer>>,
    writer: Arc<dyn SummaryWriter>,
    steps: usize,
}

impl<M, O, L, D> EpochLoop<M, O, L, D>
where
    M: Model,
    O: Optimizer,
    L: LossFn,
    D: Device,
{
    /// Creates a new `EpochLoop`.
    ///
    /// # Arguments
    /// * `model` - The model that will be trained.
    /// * `optimizer` - The optimizer stepping the model's parameters.
    /// * `runner` - Runs every batch through the model and the criterion.
    /// * `metric_fns` - The classification metrics computed at the end of every epoch.
    pub fn new(model: M, optimizer: O, runner: BatchRunner<L, D>, metric_fns: Vec<MetricFn>) -> Self {
        let writer: Arc<dyn SummaryWriter> = Arc::new(NullWriter);
        let names = tracked_names(&runner, &metric_fns);

        Self {
            train_metrics: MetricTracker::new(names.clone()),
            valid_metrics: MetricTracker::new(names),
            model,
            optimizer,
            runner,
            metric_fns,
            scheduler: None,
            reducer: None,
            writer,
            steps: 0,
        }
    }

    /// Sends every metric update, step and parameter histogram to `writer`.
    pub fn with_writer(mut self, writer: Arc<dyn SummaryWriter>) -> Self {
        let names = tracked_names(&self.runner, &self.metric_fns);
        self.train_metrics = MetricTracker::new(names.clone()).with_writer(Arc::clone(&writer));
        self.valid_metrics = MetricTracker::new(names).with_writer(Arc::clone(&writer));
        self.writer = writer;
        self
    }

    /// Steps `scheduler` once at the end of every training epoch.
    pub fn with_scheduler(mut self, scheduler: Box<dyn LrScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Runs `reducer` over the gradient before every optimizer step.
    pub fn with_reducer(mut self, reducer: Box<dyn GradientReducer>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    /// The amount of optimizer steps taken so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Trains for up to `epochs` epochs.
    ///
    /// # Arguments
    /// * `epochs` - The maximum amount of epochs.
    /// * `train` - The training batches.
    /// * `valid` - The validation batches, if any.
    /// * `should_stop` - Called with every epoch's log, returning true ends the training.
    ///
    /// # Returns
    /// The log of every epoch that ran.
    pub fn fit<T, V, F>(
        &mut self,
        epochs: usize,
        train: &mut T,
        mut valid: Option<&mut V>,
        mut should_stop: F,
    ) -> Result<Vec<EpochLog>>
    where
        T: BatchLoader + ?Sized,
        V: BatchLoader + ?Sized,
        F: FnMut(usize, &EpochLog) -> bool,
    {
        let mut logs = Vec::with_capacity(epochs);

        for epoch in 1..=epochs {
            let log = self.train_epoch(epoch, train, valid.as_deref_mut())?;
            info!(epoch = epoch; "{}", format_log(&log));

            let stop = should_stop(epoch, &log);
            logs.push(log);

            if stop {
                info!("stopping after epoch {epoch}");
                break;
            }
        }

        Ok(logs)
    }

    /// Training logic for an epoch.
    ///
    /// Exactly `train.len()` batches are used even if the loader yields more.
    ///
    /// # Arguments
    /// * `epoch` - The current training epoch, starting at 1.
    /// * `train` - The training batches.
    /// * `valid` - The validation batches, evaluated after training when present.
    ///
    /// # Returns
    /// The average loss and metrics of the epoch, plus the validation ones prefixed with `val_`.
    pub fn train_epoch<T, V>(&mut self, epoch: usize, train: &mut T, valid: Option<&mut V>) -> Result<EpochLog>
    where
        T: BatchLoader + ?Sized,
        V: BatchLoader + ?Sized,
    {
        self.model.set_training(true);
        self.train_metrics.reset();

        let len_epoch = train.len();
        let log_step = ((train.batch_size() as f64).sqrt() as usize).max(1);
        let (mut labels, mut predicts) = (Vec::new(), Vec::new());

        for (batch_idx, batch) in train.batches().take(len_epoch).enumerate() {
            self.model.zero_grad();
            let out = self.runner.run(batch, &mut self.model, true)?;

            let d_predicted = self
                .runner
                .criterion()
                .loss_prime(out.predict.view(), out.label.view())?;
            self.model.backward(d_predicted.view(), self.runner.entropy_grad())?;

            let (params, grad) = self.model.params_and_grad();
            if let Some(reducer) = &mut self.reducer {
                reducer.reduce(grad)?;
            }
            self.optimizer.update_params(params, grad)?;
            self.steps += 1;

            let step = epoch.saturating_sub(1) * len_epoch + batch_idx;
            self.writer.set_step(step, Phase::Train);
            self.update_batch_metrics(Phase::Train, &out)?;
            labels.extend(out.label.iter().copied());
            predicts.extend(out.argmax());

            if batch_idx % log_step == 0 {
                debug!(epoch = epoch, batch = batch_idx; "train loss {}", out.loss);
            }
        }

        update_epoch_metrics(&mut self.train_metrics, &self.metric_fns, &predicts, &labels)?;
        let mut log = self.train_metrics.result();

        if let Some(valid) = valid {
            log.extend(self.evaluate(valid, epoch, "val")?);
        }

        if let Some(scheduler) = &mut self.scheduler {
            scheduler.step(&mut self.optimizer);
        }

        Ok(log)
    }

    /// Evaluates the model over `loader` without touching its parameters.
    ///
    /// # Arguments
    /// * `loader` - The batches to evaluate.
    /// * `epoch` - The epoch the evaluation belongs to.
    /// * `prefix` - Prepended, joined by `_`, to every metric name.
    pub fn evaluate<V>(&mut self, loader: &mut V, epoch: usize, prefix: &str) -> Result<EpochLog>
    where
        V: BatchLoader + ?Sized,
    {
        self.model.set_training(false);
        self.valid_metrics.reset();

        let len = loader.len();
        let (mut labels, mut predicts) = (Vec::new(), Vec::new());

        for (batch_idx, batch) in loader.batches().enumerate() {
            let out = self.runner.run(batch, &mut self.model, false)?;
            self.writer.set_step(epoch.saturating_sub(1) * len + batch_idx, Phase::Evaluate);
            self.update_batch_metrics(Phase::Evaluate, &out)?;
            labels.extend(out.label.iter().copied());
            predicts.extend(out.argmax());
        }

        update_epoch_metrics(&mut self.valid_metrics, &self.metric_fns, &predicts, &labels)?;
        self.add_histograms();

        Ok(prefixed(self.valid_metrics.result(), prefix))
    }

    /// Evaluates this rank's shard and merges the outcome of every rank, so the
    /// metrics don't depend on how the data was split.
    ///
    /// Every rank of `group` must call this, batches must carry their item ids
    /// and the shards must not overlap.
    ///
    /// # Arguments
    /// * `loader` - This rank's shard of the evaluation data.
    /// * `group` - The participating processes.
    /// * `prefix` - Prepended, joined by `_`, to every metric name.
    pub fn evaluate_distributed<V, G>(&mut self, loader: &mut V, group: &G, prefix: &str) -> Result<EpochLog>
    where
        V: BatchLoader + ?Sized,
        G: ProcessGroup + ?Sized,
    {
        self.model.set_training(false);
        self.valid_metrics.reset();

        let mut items: HashMap<u64, (usize, usize)> = HashMap::new();
        let (mut loss_sum, mut entropy_sum, mut count) = (0.0f64, 0.0f64, 0u64);

        for batch in loader.batches() {
            let out = self.runner.run(batch, &mut self.model, false)?;
            let ids = out.ids.as_deref().ok_or(MlErr::MissingItemIds)?;

            loss_sum += out.loss as f64 * out.len() as f64;
            entropy_sum += out.entropy.unwrap_or_default() as f64;
            count += out.len() as u64;

            if ids.len() != out.len() {
                return Err(MlErr::SizeMismatch {
                    a: "labels",
                    b: "item ids",
                    got: ids.len(),
                    expected: out.len(),
                });
            }

            for ((&id, &label), predict) in ids.iter().zip(&out.label).zip(out.argmax()) {
                items.insert(id, (label, predict));
            }
        }

        let sums = gather_sum(group, &[loss_sum, entropy_sum, count as f64])?;
        let items = gather_map(group, items)?;

        // `gather_sum` keeps the length of its input.
        let (loss_sum, entropy_sum, count) = (sums[0], sums[1], sums[2] as u64);

        if !loss_sum.is_finite() {
            warn!(phase = Phase::Evaluate.as_str(); "non-finite gathered loss {loss_sum}");
        }

        if count > 0 {
            let n = count as usize;
            self.valid_metrics.update(LOSS, loss_sum / count as f64, n)?;
            if self.runner.config().calculate_entropy {
                self.valid_metrics.update(DOC_ENTROPY, entropy_sum / count as f64, n)?;
            }
        }

        let mut ordered: Vec<_> = items.into_iter().collect();
        ordered.sort_unstable_by_key(|(id, _)| *id);
        let (labels, predicts): (Vec<usize>, Vec<usize>) = ordered.into_iter().map(|(_, lp)| lp).unzip();

        update_epoch_metrics(&mut self.valid_metrics, &self.metric_fns, &predicts, &labels)?;
        self.add_histograms();

        Ok(prefixed(self.valid_metrics.result(), prefix))
    }

    fn update_batch_metrics(&mut self, phase: Phase, out: &RunOutput) -> Result<()> {
        let metrics = match phase {
            Phase::Train => &mut self.train_metrics,
            Phase::Evaluate => &mut self.valid_metrics,
        };

        if !out.loss.is_finite() {
            warn!(phase = phase.as_str(); "non-finite loss {}", out.loss);
        }

        let n = out.len();
        metrics.update(LOSS, out.loss as f64, n)?;

        if let Some(entropy) = out.entropy {
            metrics.update(DOC_ENTROPY, entropy as f64 / n.max(1) as f64, n)?;
        }

        Ok(())
    }

    fn add_histograms(&self) {
        for (name, values) in self.model.named_parameters() {
            self.writer.add_histogram(&name, values);
        }
    }
}

fn tracked_names<L: LossFn, D: Device>(runner: &BatchRunner<L, D>, metric_fns: &[MetricFn]) -> Vec<String> {
    let mut names = vec![LOSS.to_string()];
    if runner.config().calculate_entropy {
        names.push(DOC_ENTROPY.to_string());
    }
    names.extend(metric_fns.iter().map(|m| m.name().to_string()));
    names
}

fn update_epoch_metrics(
    metrics: &mut MetricTracker,
    metric_fns: &[MetricFn],
    predicts: &[usize],
    labels: &[usize],
) -> Result<()> {
    for met in metric_fns {
        metrics.update(met.name(), met.compute(predicts, labels), labels.len())?;
    }

    Ok(())
}

fn prefixed(log: EpochLog, prefix: &str) -> EpochLog {
    log.into_iter()
        .map(|(name, value)| (format!("{prefix}_{name}"), value))
        .collect()
}

fn format_log(log: &EpochLog) -> String {
    log.iter()
        .map(|(name, value)| format!("{name}: {value:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}

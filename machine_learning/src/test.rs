#![cfg(test)]

use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use collective::{DistContext, ProcessGroup, ShardSpec, SoloGroup, ThreadGroup};
use ndarray::{Array1, Array2, ArrayD, ArrayView2, ArrayViewD, Axis, Ix2, array, s};
use parking_lot::Mutex;

use crate::{
    MlErr, Result,
    arch::{
        Model, ModelOutput, NamedParam,
        loss::{CrossEntropy, LossFn, softmax},
    },
    batch::{Batch, Device},
    dataset::{BatchLoader, DataLoader, InMemoryDataset},
    metrics::MetricFn,
    optimization::{GradientDescent, Optimizer, StepLr},
    training::{BatchRunner, EpochLog, EpochLoop, GradientReducer, RunnerConfig},
    writer::{LogWriter, Phase, SummaryWriter},
};

/// Softmax regression over the "news" field, the attention is the class distribution.
struct LinearSoftmax {
    features: usize,
    classes: usize,
    params: Vec<f32>,
    grad: Vec<f32>,
    emit_entropy: bool,
    cache: Option<(Array2<f32>, Array2<f32>)>,
}

impl LinearSoftmax {
    fn new(features: usize, classes: usize) -> Self {
        let size = classes * features + classes;
        Self {
            features,
            classes,
            params: vec![0.0; size],
            grad: vec![0.0; size],
            emit_entropy: true,
            cache: None,
        }
    }

    fn with_params(mut self, params: Vec<f32>) -> Self {
        assert_eq!(params.len(), self.params.len());
        self.params = params;
        self
    }

    fn weights(&self) -> ArrayView2<'_, f32> {
        let n = self.classes * self.features;
        ArrayView2::from_shape((self.classes, self.features), &self.params[..n]).unwrap()
    }
}

fn row_entropy(probs: ArrayView2<f32>) -> Array1<f32> {
    probs.map_axis(Axis(1), |row| {
        -row.iter().filter(|&&p| p > 0.0).map(|&p| p * p.ln()).sum::<f32>()
    })
}

impl Model for LinearSoftmax {
    fn forward(&mut self, batch: &Batch) -> Result<ModelOutput> {
        let x = batch
            .field("news")?
            .into_dimensionality::<Ix2>()
            .map_err(|_| MlErr::MissingField {
                name: "news".to_string(),
            })?
            .to_owned();

        let n = self.classes * self.features;
        let bias = ArrayView2::from_shape((1, self.classes), &self.params[n..]).unwrap();
        let logits = x.dot(&self.weights().t()) + &bias;
        let probs = softmax(logits.view());
        let entropy = row_entropy(probs.view()).sum();

        self.cache = Some((x, probs.clone()));

        Ok(ModelOutput {
            predicted: logits,
            attention: Some(probs.into_dyn()),
            entropy: self.emit_entropy.then_some(entropy),
        })
    }

    fn backward(&mut self, d_predicted: ArrayView2<f32>, d_entropy: f32) -> Result<()> {
        let (x, probs) = self.cache.take().ok_or(MlErr::MissingField {
            name: "forward cache".to_string(),
        })?;

        let mut d_logits = d_predicted.to_owned();
        if d_entropy != 0.0 {
            let h = row_entropy(probs.view());
            for ((mut d_row, p_row), h) in d_logits.rows_mut().into_iter().zip(probs.rows()).zip(h) {
                for (d, &p) in d_row.iter_mut().zip(p_row) {
                    let log_p = if p > 0.0 { p.ln() } else { 0.0 };
                    *d += d_entropy * -p * (log_p + h);
                }
            }
        }

        let n = self.classes * self.features;
        let d_w = d_logits.t().dot(&x);
        let d_b = d_logits.sum_axis(Axis(0));

        for (g, d) in self.grad[..n].iter_mut().zip(d_w.iter()) {
            *g += d;
        }
        for (g, d) in self.grad[n..].iter_mut().zip(d_b.iter()) {
            *g += d;
        }

        Ok(())
    }

    fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    fn params_and_grad(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.params, &mut self.grad)
    }

    fn named_parameters(&self) -> Vec<NamedParam<'_>> {
        let n = self.classes * self.features;
        vec![
            ("weight".to_string(), self.weights().into_dyn()),
            (
                "bias".to_string(),
                ArrayViewD::from_shape(vec![self.classes], &self.params[n..]).unwrap(),
            ),
        ]
    }
}

/// Two perfectly separable classes: feature 0 means class 0, feature 1 means class 1.
fn separable(n: usize) -> Arc<InMemoryDataset> {
    let news = Array2::from_shape_fn((n, 2), |(i, j)| if i % 2 == j { 1.0 } else { 0.0 });
    let labels = Array1::from_shape_fn(n, |i| i % 2);
    Arc::new(InMemoryDataset::new(news, labels).unwrap())
}

fn loader(dataset: Arc<InMemoryDataset>, ctx: DistContext, batch_size: usize) -> DataLoader {
    DataLoader::new(dataset, ShardSpec::new(ctx), NonZeroUsize::new(batch_size).unwrap())
}

fn epoch_loop(
    model: LinearSoftmax,
    cfg: RunnerConfig,
    ctx: DistContext,
) -> EpochLoop<LinearSoftmax, GradientDescent, CrossEntropy, crate::batch::Cpu> {
    let runner = BatchRunner::new(CrossEntropy, cfg, ctx);
    EpochLoop::new(
        model,
        GradientDescent::new(1.0),
        runner,
        vec![MetricFn::Accuracy, MetricFn::MacroF1],
    )
}

/// Reports fewer batches than it yields.
struct OverflowingLoader {
    reported: usize,
    yielded: usize,
}

impl BatchLoader for OverflowingLoader {
    fn len(&self) -> usize {
        self.reported
    }

    fn batch_size(&self) -> usize {
        2
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_> {
        let dataset = separable(2);
        Box::new((0..self.yielded).map(move |_| dataset.batch(&[0, 1])))
    }
}

#[derive(Default)]
struct CountingDevice {
    placed: AtomicUsize,
}

impl Device for &CountingDevice {
    fn name(&self) -> &str {
        "counting"
    }

    fn place(&self, batch: Batch) -> Batch {
        self.placed.fetch_add(1, Ordering::SeqCst);
        batch
    }
}

#[derive(Default)]
struct Recorder {
    steps: Mutex<Vec<(usize, Phase)>>,
    histograms: Mutex<Vec<String>>,
}

impl SummaryWriter for Recorder {
    fn set_step(&self, step: usize, phase: Phase) {
        self.steps.lock().push((step, phase));
    }

    fn add_scalar(&self, _name: &str, _value: f64) {}

    fn add_histogram(&self, name: &str, _values: ArrayViewD<f32>) {
        self.histograms.lock().push(name.to_string());
    }
}

struct CountingReducer(Arc<AtomicUsize>);

impl GradientReducer for CountingReducer {
    fn reduce(&mut self, _grad: &mut [f32]) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn fixed_params() -> Vec<f32> {
    vec![0.3, -0.2, -0.1, 0.4, 0.05, -0.05]
}

#[test]
fn unconstrained_loss_is_the_task_loss() {
    let runner = BatchRunner::new(CrossEntropy, RunnerConfig::default(), DistContext::single());
    let mut model = LinearSoftmax::new(2, 2).with_params(fixed_params());
    let out = runner.run(separable(4).batch(&[0, 1, 2, 3]), &mut model, false).unwrap();

    assert_eq!(out.loss, out.task_loss);
    assert!(out.entropy.is_none());
    assert!(out.attention_weight.is_none());
    assert_eq!(out.len(), 4);
}

#[test]
fn constrained_loss_adds_the_entropy_penalty() {
    let cfg = RunnerConfig::new(true, 0.5);
    let runner = BatchRunner::new(CrossEntropy, cfg, DistContext::single());
    let mut model = LinearSoftmax::new(2, 2).with_params(fixed_params());
    let out = runner.run(separable(4).batch(&[0, 1, 2, 3]), &mut model, false).unwrap();

    let entropy = out.entropy.unwrap();
    assert!(entropy > 0.0);
    assert!((out.loss - (out.task_loss + 0.5 * entropy)).abs() < 1e-6);
    assert!(out.attention_weight.is_some());
    assert_eq!(runner.entropy_grad(), 0.5);
}

#[test]
fn entropy_can_be_reported_without_penalizing() {
    let cfg = RunnerConfig::new(false, 0.5).with_calculate_entropy(true);
    let runner = BatchRunner::new(CrossEntropy, cfg, DistContext::single());
    let mut model = LinearSoftmax::new(2, 2).with_params(fixed_params());
    let out = runner.run(separable(4).batch(&[0, 1]), &mut model, false).unwrap();

    assert_eq!(out.loss, out.task_loss);
    assert!(out.entropy.is_some());
    assert_eq!(runner.entropy_grad(), 0.0);
}

#[test]
fn missing_entropy_is_an_error_when_requested() {
    let runner = BatchRunner::new(CrossEntropy, RunnerConfig::new(true, 0.1), DistContext::single());
    let mut model = LinearSoftmax::new(2, 2);
    model.emit_entropy = false;

    let err = runner.run(separable(2).batch(&[0, 1]), &mut model, false);
    assert!(matches!(err, Err(MlErr::MissingEntropy)));
}

#[test]
fn distributed_batches_skip_device_placement() {
    let device = CountingDevice::default();
    let ctx = DistContext::new(0, NonZeroUsize::new(2).unwrap()).unwrap();
    let mut model = LinearSoftmax::new(2, 2);

    let distributed = BatchRunner::with_device(CrossEntropy, &device, RunnerConfig::default(), ctx);
    distributed.run(separable(2).batch(&[0, 1]), &mut model, true).unwrap();
    assert_eq!(device.placed.load(Ordering::SeqCst), 0);

    distributed.run(separable(2).batch(&[0, 1]), &mut model, false).unwrap();
    assert_eq!(device.placed.load(Ordering::SeqCst), 1);

    let single = BatchRunner::with_device(CrossEntropy, &device, RunnerConfig::default(), DistContext::single());
    single.run(separable(2).batch(&[0, 1]), &mut model, true).unwrap();
    assert_eq!(device.placed.load(Ordering::SeqCst), 2);
}

#[test]
fn entropy_gradient_matches_finite_differences() {
    let cfg = RunnerConfig::new(true, 0.7);
    let runner = BatchRunner::new(CrossEntropy, cfg, DistContext::single());
    let batch = separable(4).batch(&[0, 1, 2, 3]);
    let mut model = LinearSoftmax::new(2, 2).with_params(fixed_params());

    let out = runner.run(batch.clone(), &mut model, false).unwrap();
    let d = runner.criterion().loss_prime(out.predict.view(), out.label.view()).unwrap();
    model.zero_grad();
    model.backward(d.view(), runner.entropy_grad()).unwrap();
    let analytic = model.grad.clone();

    let eps = 1e-3;
    for i in 0..model.params.len() {
        let mut plus = LinearSoftmax::new(2, 2).with_params(fixed_params());
        plus.params[i] += eps;
        let mut minus = LinearSoftmax::new(2, 2).with_params(fixed_params());
        minus.params[i] -= eps;

        let l_plus = runner.run(batch.clone(), &mut plus, false).unwrap().loss;
        let l_minus = runner.run(batch.clone(), &mut minus, false).unwrap().loss;
        let numeric = (l_plus - l_minus) / (2.0 * eps);

        assert!((numeric - analytic[i]).abs() < 1e-2, "param {i}: {numeric} vs {}", analytic[i]);
    }
}

#[test]
fn training_learns_separable_classes() {
    let ctx = DistContext::single();
    let mut el = epoch_loop(LinearSoftmax::new(2, 2), RunnerConfig::default(), ctx);
    let mut train = loader(separable(16), ctx, 4).with_shuffle(3);

    let logs = el
        .fit(20, &mut train, None::<&mut DataLoader>, |_, _| false)
        .unwrap();

    assert_eq!(logs.len(), 20);
    let (first, last) = (&logs[0], &logs[19]);
    assert!(last["loss"] < first["loss"]);
    assert_eq!(last["accuracy"], 1.0);
    assert_eq!(last["macro_f1"], 1.0);
    assert_eq!(el.steps(), 20 * 4);
}

#[test]
fn epoch_never_exceeds_the_loader_length() {
    let ctx = DistContext::single();
    let reduced = Arc::new(AtomicUsize::new(0));
    let mut el = epoch_loop(LinearSoftmax::new(2, 2), RunnerConfig::default(), ctx)
        .with_reducer(Box::new(CountingReducer(Arc::clone(&reduced))));
    let mut train = OverflowingLoader {
        reported: 3,
        yielded: 10,
    };

    el.train_epoch(1, &mut train, None::<&mut DataLoader>).unwrap();
    assert_eq!(el.steps(), 3);

    el.train_epoch(2, &mut train, None::<&mut DataLoader>).unwrap();
    assert_eq!(el.steps(), 6);
    assert_eq!(reduced.load(Ordering::SeqCst), 6);
}

#[test]
fn validation_metrics_are_prefixed_and_scheduler_steps() {
    let ctx = DistContext::single();
    let recorder = Arc::new(Recorder::default());
    let mut el = epoch_loop(LinearSoftmax::new(2, 2), RunnerConfig::new(true, 0.01), ctx)
        .with_writer(recorder.clone())
        .with_scheduler(Box::new(StepLr::new(NonZeroUsize::MIN, 0.5)));
    let mut train = loader(separable(8), ctx, 4);
    let mut valid = loader(separable(6), ctx, 3);

    let log = el.train_epoch(1, &mut train, Some(&mut valid)).unwrap();

    for key in [
        "loss",
        "doc_entropy",
        "accuracy",
        "macro_f1",
        "val_loss",
        "val_doc_entropy",
        "val_accuracy",
        "val_macro_f1",
    ] {
        assert!(log.contains_key(key), "missing {key}");
    }
    assert_eq!(el.optimizer().learning_rate(), 0.5);

    let steps = recorder.steps.lock();
    assert_eq!(steps[..2], [(0, Phase::Train), (1, Phase::Train)]);
    assert_eq!(steps[2..], [(0, Phase::Evaluate), (1, Phase::Evaluate)]);
    assert_eq!(*recorder.histograms.lock(), vec!["weight", "bias"]);
}

#[test]
fn early_stop_ends_training() {
    let ctx = DistContext::single();
    let mut el = epoch_loop(LinearSoftmax::new(2, 2), RunnerConfig::default(), ctx);
    let mut train = loader(separable(8), ctx, 4);

    let logs = el
        .fit(10, &mut train, None::<&mut DataLoader>, |epoch, _| epoch == 2)
        .unwrap();
    assert_eq!(logs.len(), 2);
}

#[test]
fn non_finite_loss_is_surfaced_not_hidden() {
    let ctx = DistContext::single();
    let model = LinearSoftmax::new(2, 2).with_params(vec![f32::NAN; 6]);
    let mut el = epoch_loop(model, RunnerConfig::default(), ctx);
    let mut valid = loader(separable(4), ctx, 2);

    let log = el.evaluate(&mut valid, 1, "val").unwrap();
    assert!(log["val_loss"].is_nan());
}

#[test]
fn distributed_evaluation_matches_single_process() {
    const ITEMS: usize = 11;

    let dataset = {
        let news = Array2::from_shape_fn((ITEMS, 2), |(i, j)| ((i * 7 + j * 3) % 5) as f32 - 2.0);
        let labels = Array1::from_shape_fn(ITEMS, |i| (i * 5) % 2);
        Arc::new(InMemoryDataset::new(news, labels).unwrap())
    };
    let cfg = RunnerConfig::new(true, 0.1);

    let single = {
        let ctx = DistContext::single();
        let model = LinearSoftmax::new(2, 2).with_params(fixed_params());
        let mut el = epoch_loop(model, cfg, ctx);
        let mut valid = loader(Arc::clone(&dataset), ctx, 3);
        el.evaluate_distributed(&mut valid, &SoloGroup::new(), "val").unwrap()
    };

    let groups = ThreadGroup::new(NonZeroUsize::new(3).unwrap());
    let distributed: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = groups
            .iter()
            .map(|group| {
                let dataset = Arc::clone(&dataset);
                s.spawn(move || {
                    let ctx = group.context();
                    let model = LinearSoftmax::new(2, 2).with_params(fixed_params());
                    let mut el = epoch_loop(model, cfg, ctx);
                    let mut valid = loader(dataset, ctx, 3);
                    el.evaluate_distributed(&mut valid, group, "val").unwrap()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for log in distributed {
        assert_eq!(log.keys().collect::<Vec<_>>(), single.keys().collect::<Vec<_>>());
        for (key, value) in &log {
            assert!((value - single[key]).abs() < 1e-5, "{key}: {value} vs {}", single[key]);
        }
    }
}

#[test]
fn plain_and_distributed_evaluation_agree_on_one_process() {
    let ctx = DistContext::single();
    let model = LinearSoftmax::new(2, 2).with_params(fixed_params());
    let mut el = epoch_loop(model, RunnerConfig::default(), ctx);

    let plain = el.evaluate(&mut loader(separable(7), ctx, 2), 1, "val").unwrap();
    let gathered = el
        .evaluate_distributed(&mut loader(separable(7), ctx, 2), &SoloGroup::new(), "val")
        .unwrap();

    for (key, value) in &plain {
        assert!((value - gathered[key]).abs() < 1e-6, "{key}");
    }
}

#[test]
fn distributed_evaluation_requires_item_ids() {
    struct NoIds;

    impl BatchLoader for NoIds {
        fn len(&self) -> usize {
            1
        }

        fn batch_size(&self) -> usize {
            1
        }

        fn batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_> {
            let batch = Batch::new(array![0]).with_field("news", ArrayD::zeros(vec![1, 2]));
            Box::new(std::iter::once(batch))
        }
    }

    let ctx = DistContext::single();
    let mut el = epoch_loop(LinearSoftmax::new(2, 2), RunnerConfig::default(), ctx);
    let err = el.evaluate_distributed(&mut NoIds, &SoloGroup::new(), "val");
    assert!(matches!(err, Err(MlErr::MissingItemIds)));
}

#[test]
fn named_parameters_cover_the_flat_buffer() {
    let model = LinearSoftmax::new(2, 2).with_params(fixed_params());
    let total: usize = model.named_parameters().iter().map(|(_, p)| p.len()).sum();
    assert_eq!(total, fixed_params().len());
    assert_eq!(model.weights().slice(s![0, ..]), array![0.3, -0.2]);
}

fn evaluate_on_ranks(world_size: usize, params: Vec<f32>, dataset: Arc<InMemoryDataset>) -> Vec<Result<EpochLog>> {
    let groups = ThreadGroup::new(NonZeroUsize::new(world_size).unwrap());
    thread::scope(|s| {
        let handles: Vec<_> = groups
            .iter()
            .map(|group| {
                let (params, dataset) = (params.clone(), Arc::clone(&dataset));
                s.spawn(move || {
                    let ctx = group.context();
                    let model = LinearSoftmax::new(2, 2).with_params(params);
                    let mut el = epoch_loop(model, RunnerConfig::default(), ctx);
                    el.evaluate_distributed(&mut loader(dataset, ctx, 2), group, "val")
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

#[test]
fn nan_loss_survives_distributed_evaluation() {
    let params = vec![f32::NAN; fixed_params().len()];

    let single = {
        let ctx = DistContext::single();
        let model = LinearSoftmax::new(2, 2).with_params(params.clone());
        let mut el = epoch_loop(model, RunnerConfig::default(), ctx);
        el.evaluate_distributed(&mut loader(separable(6), ctx, 2), &SoloGroup::new(), "val")
            .unwrap()
    };
    assert!(single["val_loss"].is_nan());

    for log in evaluate_on_ranks(3, params, separable(6)) {
        let log = log.unwrap();
        assert!(log["val_loss"].is_nan());
        assert_eq!(log["val_accuracy"], single["val_accuracy"]);
        assert_eq!(log["val_macro_f1"], single["val_macro_f1"]);
    }
}

#[test]
fn distributed_evaluation_rejects_short_id_lists() {
    struct ShortIds;

    impl BatchLoader for ShortIds {
        fn len(&self) -> usize {
            1
        }

        fn batch_size(&self) -> usize {
            2
        }

        fn batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_> {
            let batch = Batch::new(array![0, 1])
                .with_field("news", ArrayD::zeros(vec![2, 2]))
                .with_ids(vec![0]);
            Box::new(std::iter::once(batch))
        }
    }

    let ctx = DistContext::single();
    let mut el = epoch_loop(LinearSoftmax::new(2, 2), RunnerConfig::default(), ctx);
    let err = el.evaluate_distributed(&mut ShortIds, &SoloGroup::new(), "val");
    assert!(matches!(
        err,
        Err(MlErr::SizeMismatch {
            got: 1,
            expected: 2,
            ..
        })
    ));
}

#[test]
fn log_writer_follows_the_epoch_steps() {
    let ctx = DistContext::single();
    let writer = Arc::new(LogWriter::new());
    let mut el = epoch_loop(LinearSoftmax::new(2, 2), RunnerConfig::new(true, 0.01), ctx).with_writer(writer.clone());
    let mut train = loader(separable(8), ctx, 4);
    let mut valid = loader(separable(6), ctx, 3);

    el.train_epoch(2, &mut train, None::<&mut DataLoader>).unwrap();
    assert_eq!(writer.step(), (3, Phase::Train));

    let log = el.evaluate(&mut valid, 2, "val").unwrap();
    assert_eq!(writer.step(), (3, Phase::Evaluate));
    assert!(log["val_loss"].is_finite());
}

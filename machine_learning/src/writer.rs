use std::fmt;

use log::debug;
use ndarray::ArrayViewD;
use parking_lot::Mutex;

/// The phase a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Train,
    Evaluate,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Train => "train",
            Phase::Evaluate => "evaluate",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sink for diagnostics. Nothing written here is ever read back by the training loop.
pub trait SummaryWriter: Send + Sync {
    /// Sets the step every following record is attached to.
    fn set_step(&self, step: usize, phase: Phase);

    fn add_scalar(&self, name: &str, value: f64);

    fn add_histogram(&self, name: &str, values: ArrayViewD<f32>);
}

/// Drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullWriter;

impl SummaryWriter for NullWriter {
    fn set_step(&self, _step: usize, _phase: Phase) {}
    fn add_scalar(&self, _name: &str, _value: f64) {}
    fn add_histogram(&self, _name: &str, _values: ArrayViewD<f32>) {}
}

/// Emits every record through `log` at debug level, tagged with the current step.
#[derive(Debug)]
pub struct LogWriter {
    step: Mutex<(usize, Phase)>,
}

impl LogWriter {
    pub fn new() -> Self {
        Self {
            step: Mutex::new((0, Phase::Train)),
        }
    }

    /// The step and phase the next record is tagged with.
    pub fn step(&self) -> (usize, Phase) {
        *self.step.lock()
    }
}

impl Default for LogWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SummaryWriter for LogWriter {
    fn set_step(&self, step: usize, phase: Phase) {
        *self.step.lock() = (step, phase);
    }

    fn add_scalar(&self, name: &str, value: f64) {
        let (step, phase) = *self.step.lock();
        debug!(step = step, phase = phase.as_str(), value = value; "scalar {name}");
    }

    fn add_histogram(&self, name: &str, values: ArrayViewD<f32>) {
        let (step, phase) = *self.step.lock();
        let Some(hist) = Histogram::auto(values) else {
            debug!(step = step, phase = phase.as_str(); "histogram {name} is empty");
            return;
        };

        debug!(
            step = step,
            phase = phase.as_str(),
            min = hist.min,
            max = hist.max,
            mean = hist.mean;
            "histogram {name} {:?}",
            hist.counts
        );
    }
}

/// A fixed-width histogram over the finite values of a tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Builds a histogram with the amount of bins given by Sturges' rule.
    ///
    /// # Returns
    /// `None` if there are no finite values.
    pub fn auto(values: ArrayViewD<f32>) -> Option<Self> {
        let finite = values.iter().filter(|x| x.is_finite()).count();
        let bins = (finite as f64).log2().ceil() as usize + 1;
        Self::with_bins(values, bins)
    }

    /// Builds a histogram with `bins` equally wide bins spanning `[min, max]`.
    pub fn with_bins(values: ArrayViewD<f32>, bins: usize) -> Option<Self> {
        let finite: Vec<f32> = values.iter().copied().filter(|x| x.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }

        let bins = bins.max(1);
        let min = finite.iter().copied().fold(f32::INFINITY, f32::min);
        let max = finite.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = finite.iter().sum::<f32>() / finite.len() as f32;
        let width = (max - min) / bins as f32;

        let mut counts = vec![0; bins];
        for x in finite {
            let idx = if width > 0.0 {
                (((x - min) / width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[idx] += 1;
        }

        Some(Self {
            min,
            max,
            mean,
            counts,
        })
    }
}

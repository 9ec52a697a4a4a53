use std::{collections::BTreeMap, sync::Arc};

use crate::{MlErr, Result, writer::SummaryWriter};

#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    total: f64,
    count: u64,
}

/// Accumulates a weighted running mean per metric.
///
/// Raw sums and counts are kept so metrics updated at different granularities
/// (a loss per batch weighted by its size, a classification score once per epoch
/// weighted by the amount of examples) average correctly.
pub struct MetricTracker {
    metrics: BTreeMap<String, Accumulator>,
    writer: Option<Arc<dyn SummaryWriter>>,
}

impl MetricTracker {
    /// Creates a new `MetricTracker`.
    ///
    /// # Arguments
    /// * `names` - The metrics that may be updated, fixed for the tracker's lifetime.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metrics: names
                .into_iter()
                .map(|name| (name.into(), Accumulator::default()))
                .collect(),
            writer: None,
        }
    }

    /// Mirrors every update into `writer` as a scalar.
    pub fn with_writer(mut self, writer: Arc<dyn SummaryWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Records `value` observed over `n` samples.
    ///
    /// # Returns
    /// `UnknownMetric` if `name` wasn't registered on construction.
    pub fn update(&mut self, name: &str, value: f64, n: usize) -> Result<()> {
        let acc = self
            .metrics
            .get_mut(name)
            .ok_or_else(|| MlErr::UnknownMetric {
                name: name.to_string(),
            })?;

        if let Some(writer) = &self.writer {
            writer.add_scalar(name, value);
        }

        acc.total += value * n as f64;
        acc.count += n as u64;
        Ok(())
    }

    /// Zeroes every metric.
    pub fn reset(&mut self) {
        self.metrics
            .values_mut()
            .for_each(|acc| *acc = Accumulator::default());
    }

    /// The running mean of a single metric, `0.0` if it was never updated.
    pub fn avg(&self, name: &str) -> Result<f64> {
        self.metrics
            .get(name)
            .map(|acc| mean(*acc))
            .ok_or_else(|| MlErr::UnknownMetric {
                name: name.to_string(),
            })
    }

    /// The running mean of every metric, `0.0` for those never updated.
    pub fn result(&self) -> BTreeMap<String, f64> {
        self.metrics
            .iter()
            .map(|(name, acc)| (name.clone(), mean(*acc)))
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }
}

fn mean(acc: Accumulator) -> f64 {
    if acc.count == 0 {
        return 0.0;
    }

    acc.total / acc.count as f64
}

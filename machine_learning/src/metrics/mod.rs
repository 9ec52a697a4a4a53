mod classification;
mod tracker;

pub use classification::MetricFn;
pub use tracker::MetricTracker;

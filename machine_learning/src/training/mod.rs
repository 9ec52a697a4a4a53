mod epoch_loop;
mod runner;

pub use epoch_loop::{EpochLog, EpochLoop, GradientReducer};
pub use runner::{BatchRunner, RunOutput, RunnerConfig};

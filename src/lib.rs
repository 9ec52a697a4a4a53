pub mod config;
mod error;
pub mod evaluation;

pub use error::{OrchestraErr, Result};

pub mod coherence;
pub mod corpus;
mod error;
pub mod extractor;
pub mod npmi;
pub mod report;
pub mod similarity;
pub mod source;
pub mod strategy;
pub mod vocab;

pub use error::{EvalErr, Result};

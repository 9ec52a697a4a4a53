pub mod loss;
mod model;

pub use model::{Model, ModelOutput, NamedParam};

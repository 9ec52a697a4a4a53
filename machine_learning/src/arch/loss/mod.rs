mod cross_entropy;
mod loss_fn;

pub use cross_entropy::CrossEntropy;
pub(crate) use cross_entropy::softmax;
pub use loss_fn::LossFn;

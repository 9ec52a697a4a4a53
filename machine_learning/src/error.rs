use std::{
    error::Error,
    fmt::{self, Display},
};

use collective::CollectiveErr;

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug)]
pub enum MlErr {
    SizeMismatch {
        a: &'static str,
        b: &'static str,
        got: usize,
        expected: usize,
    },
    MissingField {
        name: String,
    },
    MissingItemIds,
    MissingEntropy,
    LabelOutOfRange {
        label: usize,
        classes: usize,
    },
    UnknownMetric {
        name: String,
    },
    Collective(CollectiveErr),
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MlErr::SizeMismatch {
                a,
                b,
                got,
                expected,
            } => {
                format!(
                    "There's a size mismatch between {a} and {b}, got {got} and expected {expected}"
                )
            }
            MlErr::MissingField { name } => {
                format!("The batch has no field named '{name}'")
            }
            MlErr::MissingItemIds => {
                "Distributed evaluation requires every batch to carry its item ids".to_string()
            }
            MlErr::MissingEntropy => {
                "Entropy was requested but the model didn't produce one".to_string()
            }
            MlErr::LabelOutOfRange { label, classes } => {
                format!("Label {label} is out of range for a model with {classes} classes")
            }
            MlErr::UnknownMetric { name } => {
                format!("Tried to update the metric '{name}', which was never registered")
            }
            MlErr::Collective(e) => format!("Collective operation failed: {e}"),
        };

        write!(f, "{s}")
    }
}

impl Error for MlErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MlErr::Collective(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CollectiveErr> for MlErr {
    fn from(value: CollectiveErr) -> Self {
        Self::Collective(value)
    }
}

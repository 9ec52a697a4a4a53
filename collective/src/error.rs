use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire collective module.
pub type Result<T> = std::result::Result<T, CollectiveErr>;

/// The collective module's error type.
#[derive(Debug)]
pub enum CollectiveErr {
    RankOutOfRange { rank: usize, world_size: usize },
    MissingPayload { rank: usize },
    PayloadSize { rank: usize, got: usize, expected: usize },
    Serialization(serde_json::Error),
}

impl Display for CollectiveErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RankOutOfRange { rank, world_size } => {
                write!(f, "rank {rank} is out of range for a world of size {world_size}")
            }
            Self::MissingPayload { rank } => {
                write!(f, "rank {rank} reached the barrier without publishing a payload")
            }
            Self::PayloadSize { rank, got, expected } => {
                write!(f, "rank {rank} sent {got} bytes, expected {expected}")
            }
            Self::Serialization(e) => write!(f, "failed to (de)serialize gathered payload: {e}"),
        }
    }
}

impl Error for CollectiveErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CollectiveErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

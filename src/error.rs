use std::{fmt, io, path::PathBuf};

use topic_eval::EvalErr;

/// The result type used across the orchestra.
pub type Result<T> = std::result::Result<T, OrchestraErr>;

/// All errors that can occur while configuring or running an evaluation.
#[derive(Debug)]
pub enum OrchestraErr {
    /// Invalid configuration, caught before any data is read.
    Config(String),
    /// The configuration file couldn't be read.
    Io { path: PathBuf, source: io::Error },
    /// The configuration file isn't valid JSON or has unknown values.
    Parse { path: PathBuf, source: serde_json::Error },
    Eval(EvalErr),
}

impl fmt::Display for OrchestraErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid config: {msg}"),
            Self::Io { path, source } => write!(f, "cannot read '{}': {source}", path.display()),
            Self::Parse { path, source } => write!(f, "invalid config '{}': {source}", path.display()),
            Self::Eval(e) => write!(f, "topic evaluation error: {e}"),
        }
    }
}

impl std::error::Error for OrchestraErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Eval(e) => Some(e),
            Self::Config(_) => None,
        }
    }
}

impl From<EvalErr> for OrchestraErr {
    fn from(e: EvalErr) -> Self {
        Self::Eval(e)
    }
}

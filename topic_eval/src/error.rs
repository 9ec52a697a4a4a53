use std::{
    error::Error,
    fmt::{self, Display},
    io,
    path::PathBuf,
};

/// The result type used in the entire topic evaluation module.
pub type Result<T> = std::result::Result<T, EvalErr>;

/// The topic evaluation module's error type.
#[derive(Debug)]
pub enum EvalErr {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Json {
        path: PathBuf,
        line: Option<usize>,
        source: serde_json::Error,
    },
    WordOutOfRange {
        index: usize,
        vocab_size: usize,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    UnknownMethod {
        name: String,
    },
    NoEvaluationMethod,
    MissingCorpus {
        strategy: &'static str,
    },
    MissingEmbeddings,
}

impl EvalErr {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, line: Option<usize>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            line,
            source,
        }
    }
}

impl Display for EvalErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "i/o error on {}: {source}", path.display()),
            Self::Json {
                path,
                line: Some(line),
                source,
            } => write!(f, "invalid json in {} at line {line}: {source}", path.display()),
            Self::Json { path, source, .. } => write!(f, "invalid json in {}: {source}", path.display()),
            Self::WordOutOfRange { index, vocab_size } => {
                write!(f, "word index {index} is outside a vocabulary of {vocab_size} entries")
            }
            Self::SizeMismatch { what, got, expected } => {
                write!(f, "{what}: got {got} but expected {expected}")
            }
            Self::UnknownMethod { name } => write!(f, "unknown coherence method '{name}'"),
            Self::NoEvaluationMethod => write!(f, "no topic evaluation method produced a score"),
            Self::MissingCorpus { strategy } => {
                write!(f, "{strategy} needs a reference corpus but none was loaded")
            }
            Self::MissingEmbeddings => write!(f, "w2v_sim needs word embeddings but the source has none"),
        }
    }
}

impl Error for EvalErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

use std::path::Path;

use ndarray::{Array2, ArrayView2};

use crate::{EvalErr, Result, vocab::read_json};

/// Whatever learned the topics, usually a trained model.
pub trait TopicSource {
    /// The `[num_topics, vocab_size]` topic-word weights.
    fn topic_distribution(&self) -> ArrayView2<'_, f32>;

    /// The `[vocab_size, dim]` word embeddings, if the source has any.
    fn word_embeddings(&self) -> Option<ArrayView2<'_, f32>> {
        None
    }
}

/// Topics and embeddings held in memory, e.g. exported by a training run.
#[derive(Debug, Clone)]
pub struct StaticTopics {
    distribution: Array2<f32>,
    embeddings: Option<Array2<f32>>,
}

impl StaticTopics {
    pub fn new(distribution: Array2<f32>) -> Self {
        Self {
            distribution,
            embeddings: None,
        }
    }

    pub fn with_embeddings(mut self, embeddings: Array2<f32>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Reads the topic distribution and optionally the embeddings, both JSON arrays of rows.
    pub fn load(distribution: impl AsRef<Path>, embeddings: Option<&Path>) -> Result<Self> {
        let mut topics = Self::new(read_matrix(distribution.as_ref())?);
        if let Some(path) = embeddings {
            topics = topics.with_embeddings(read_matrix(path)?);
        }

        Ok(topics)
    }
}

impl TopicSource for StaticTopics {
    fn topic_distribution(&self) -> ArrayView2<'_, f32> {
        self.distribution.view()
    }

    fn word_embeddings(&self) -> Option<ArrayView2<'_, f32>> {
        self.embeddings.as_ref().map(|e| e.view())
    }
}

fn read_matrix(path: &Path) -> Result<Array2<f32>> {
    let rows: Vec<Vec<f32>> = read_json(path)?;
    let ncols = rows.first().map_or(0, Vec::len);

    if let Some(row) = rows.iter().find(|row| row.len() != ncols) {
        return Err(EvalErr::SizeMismatch {
            what: "matrix row length",
            got: row.len(),
            expected: ncols,
        });
    }

    let nrows = rows.len();
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    let len = flat.len();
    Array2::from_shape_vec((nrows, ncols), flat).map_err(|_| EvalErr::SizeMismatch {
        what: "matrix elements",
        got: len,
        expected: nrows * ncols,
    })
}

use log::warn;
use ndarray::{ArrayView1, ArrayView2};

use crate::{EvalErr, Result};

/// The mean pairwise cosine similarity between the embeddings of every topic's words.
///
/// Every topic contributes the sum of its upper triangular similarities, the
/// total is divided by `topics.len() * top_n * (top_n - 1) / 2` so topics
/// shorter than `top_n` pull the score towards zero.
///
/// # Arguments
/// * `embeddings` - One row per vocabulary index.
/// * `topics` - The vocabulary indices of every topic.
/// * `top_n` - The amount of words a full topic has.
///
/// # Returns
/// The similarity or a `WordOutOfRange` error if an index has no embedding.
pub fn embedding_similarity(embeddings: ArrayView2<f32>, topics: &[Vec<usize>], top_n: usize) -> Result<f64> {
    let count = topics.len() * top_n * top_n.saturating_sub(1) / 2;
    if count == 0 {
        warn!(topics = topics.len(), top_n = top_n; "no word pairs to compare");
        return Ok(f64::NAN);
    }

    let mut total = 0.0;
    for topic in topics {
        let rows = topic
            .iter()
            .map(|&i| {
                (i < embeddings.nrows())
                    .then(|| embeddings.row(i))
                    .ok_or(EvalErr::WordOutOfRange {
                        index: i,
                        vocab_size: embeddings.nrows(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        for (i, a) in rows.iter().enumerate() {
            for b in &rows[i + 1..] {
                total += cosine(*a, *b);
            }
        }
    }

    Ok(total / count as f64)
}

/// Cosine similarity, zero when either vector is zero.
fn cosine(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f64 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

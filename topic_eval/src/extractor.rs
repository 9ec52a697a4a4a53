use std::num::NonZeroUsize;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

use crate::{
    EvalErr, Result,
    vocab::{Vocabulary, VocabularyFilter},
};

/// The name of the unfiltered variant.
pub const ORIGINAL: &str = "original";

/// The top words of every topic of one variant, both as vocabulary indices and as words.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSet {
    name: String,
    indices: Vec<Vec<usize>>,
    words: Vec<Vec<String>>,
}

impl TopicSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn indices(&self) -> &[Vec<usize>] {
        &self.indices
    }

    pub fn words(&self) -> &[Vec<String>] {
        &self.words
    }

    /// The amount of topics.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Picks the heaviest words of every topic.
#[derive(Debug, Clone, Copy)]
pub struct TopicExtractor {
    top_n: NonZeroUsize,
}

impl TopicExtractor {
    pub fn new(top_n: NonZeroUsize) -> Self {
        Self { top_n }
    }

    pub fn top_n(&self) -> usize {
        self.top_n.get()
    }

    /// The indices of the `top_n` heaviest words of every row of `distribution`.
    ///
    /// Words are sorted by descending weight with ties going to the lower index.
    /// Words without a positive weight are never picked, so a row with fewer
    /// than `top_n` of them gets a shorter list.
    pub fn extract_indices(&self, distribution: ArrayView2<f32>) -> Vec<Vec<usize>> {
        distribution
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|row| top_indices(row, self.top_n.get()))
            .collect()
    }

    /// Like `extract_indices` but maps every index to its word.
    ///
    /// # Returns
    /// The words of every topic or a `WordOutOfRange` error if a picked index has no word.
    pub fn extract(&self, distribution: ArrayView2<f32>, vocab: &Vocabulary) -> Result<Vec<Vec<String>>> {
        self.extract_indices(distribution)
            .iter()
            .map(|topic| to_words(topic, vocab))
            .collect()
    }

    /// Extracts one named `TopicSet`.
    pub fn topic_set(&self, name: impl Into<String>, distribution: ArrayView2<f32>, vocab: &Vocabulary) -> Result<TopicSet> {
        let indices = self.extract_indices(distribution);
        let words = indices
            .iter()
            .map(|topic| to_words(topic, vocab))
            .collect::<Result<_>>()?;

        Ok(TopicSet {
            name: name.into(),
            indices,
            words,
        })
    }

    /// Extracts the original variant followed by one variant per filter, in the given order.
    ///
    /// Every filter works on its own copy of `distribution`.
    ///
    /// # Returns
    /// The variants or a `SizeMismatch` error if `distribution` has more columns than `vocab` has indices.
    pub fn variants(
        &self,
        distribution: ArrayView2<f32>,
        filters: &[VocabularyFilter],
        vocab: &Vocabulary,
    ) -> Result<Vec<TopicSet>> {
        if distribution.ncols() > vocab.len() {
            return Err(EvalErr::SizeMismatch {
                what: "topic distribution columns",
                got: distribution.ncols(),
                expected: vocab.len(),
            });
        }

        let mut sets = Vec::with_capacity(filters.len() + 1);
        sets.push(self.topic_set(ORIGINAL, distribution, vocab)?);

        for filter in filters {
            let filtered: Array2<f32> = filter.apply(distribution, vocab);
            sets.push(self.topic_set(filter.name(), filtered.view(), vocab)?);
        }

        Ok(sets)
    }
}

fn top_indices(row: ArrayView1<f32>, top_n: usize) -> Vec<usize> {
    let mut weighted: Vec<(usize, f32)> = row
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, w)| w > 0.0)
        .collect();

    weighted.sort_by(|a, b| b.1.total_cmp(&a.1));
    weighted.truncate(top_n);
    weighted.into_iter().map(|(i, _)| i).collect()
}

fn to_words(topic: &[usize], vocab: &Vocabulary) -> Result<Vec<String>> {
    topic
        .iter()
        .map(|&i| {
            vocab
                .word(i)
                .map(str::to_string)
                .ok_or(EvalErr::WordOutOfRange {
                    index: i,
                    vocab_size: vocab.len(),
                })
        })
        .collect()
}

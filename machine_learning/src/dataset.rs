use std::{num::NonZeroUsize, ops::Range, sync::Arc};

use collective::ShardSpec;
use ndarray::{Array1, Array2, Axis};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{MlErr, Result, batch::Batch};

/// An iterable of batches with a known length.
pub trait BatchLoader {
    /// The amount of batches in an epoch.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The maximum amount of examples per batch.
    fn batch_size(&self) -> usize;

    /// Starts a new pass over the data.
    fn batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_>;
}

/// Bag of words news vectors with their labels, held in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    news: Array2<f32>,
    labels: Array1<usize>,
}

impl InMemoryDataset {
    /// Creates a new `InMemoryDataset`.
    ///
    /// # Arguments
    /// * `news` - One row per example.
    /// * `labels` - The class of every example.
    ///
    /// # Returns
    /// A new dataset or a `SizeMismatch` error if the rows and labels differ in amount.
    pub fn new(news: Array2<f32>, labels: Array1<usize>) -> Result<Self> {
        if news.nrows() != labels.len() {
            return Err(MlErr::SizeMismatch {
                a: "news",
                b: "labels",
                got: news.nrows(),
                expected: labels.len(),
            });
        }

        Ok(Self { news, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Gathers the examples at `indices` into a batch, the index is the example's id.
    pub fn batch(&self, indices: &[usize]) -> Batch {
        let news = self.news.select(Axis(0), indices).into_dyn();
        let labels = self.labels.select(Axis(0), indices);
        let ids = indices.iter().map(|&i| i as u64).collect();

        Batch::new(labels).with_field("news", news).with_ids(ids)
    }
}

/// Shard-aware loader, each rank only walks its own contiguous slice of the dataset.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: Arc<InMemoryDataset>,
    shard_range: Range<usize>,
    batch_size: NonZeroUsize,
    rng: Option<StdRng>,
}

impl DataLoader {
    pub fn new(dataset: Arc<InMemoryDataset>, shard: ShardSpec, batch_size: NonZeroUsize) -> Self {
        let shard_range = shard.range(dataset.len());

        Self {
            dataset,
            shard_range,
            batch_size,
            rng: None,
        }
    }

    /// Shuffles the shard at the start of every pass.
    pub fn with_shuffle(mut self, seed: u64) -> Self {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    #[inline]
    pub fn shard_range(&self) -> Range<usize> {
        self.shard_range.clone()
    }
}

impl BatchLoader for DataLoader {
    fn len(&self) -> usize {
        self.shard_range.len().div_ceil(self.batch_size.get())
    }

    fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = Batch> + '_> {
        let mut indices: Vec<usize> = self.shard_range.clone().collect();
        if let Some(rng) = &mut self.rng {
            indices.shuffle(rng);
        }

        let chunks: Vec<Vec<usize>> = indices
            .chunks(self.batch_size.get())
            .map(<[usize]>::to_vec)
            .collect();

        let dataset = &self.dataset;
        Box::new(chunks.into_iter().map(move |idx| dataset.batch(&idx)))
    }
}

use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use log::debug;
use ndarray::{Array2, ArrayView2};
use serde::de::DeserializeOwned;

use crate::{EvalErr, Result};

/// Slots of the index space allowed to have no word, e.g. padding or reserved ids.
pub const MAX_UNASSIGNED_IDS: usize = 1024;

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| EvalErr::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| EvalErr::json(path, None, e))
}

/// Maps words to their index in the model's vocabulary and back.
///
/// Indices need not be contiguous, the index space spans `0..len()` and
/// unassigned slots (e.g. a padding index) simply have no word.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    ids: HashMap<String, usize>,
    words: Vec<Option<String>>,
}

impl Vocabulary {
    /// Builds a vocabulary from `word -> index` pairs.
    ///
    /// # Errors
    /// `WordOutOfRange` if an index leaves more than `MAX_UNASSIGNED_IDS` unassigned
    /// slots below it, which would make the index space unreasonably large.
    pub fn from_map(ids: HashMap<String, usize>) -> Result<Self> {
        let limit = ids.len().saturating_add(MAX_UNASSIGNED_IDS);
        if let Some(&index) = ids.values().find(|&&id| id >= limit) {
            return Err(EvalErr::WordOutOfRange {
                index,
                vocab_size: limit,
            });
        }

        let size = ids.values().max().map_or(0, |&max| max + 1);
        let mut words = vec![None; size];
        for (word, &id) in &ids {
            words[id] = Some(word.clone());
        }

        Ok(Self { ids, words })
    }

    /// Builds a vocabulary where every word's index is its position.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<Option<String>> = words.into_iter().map(|w| Some(w.into())).collect();
        let ids = words
            .iter()
            .enumerate()
            .filter_map(|(id, word)| word.clone().map(|w| (w, id)))
            .collect();

        Self { ids, words }
    }

    /// Reads a JSON object of `word -> index`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let vocab = Self::from_map(read_json(path)?)?;
        debug!(words = vocab.ids.len(); "loaded vocabulary from {}", path.display());
        Ok(vocab)
    }

    /// The size of the index space.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn id(&self, word: &str) -> Option<usize> {
        self.ids.get(word).copied()
    }

    pub fn word(&self, id: usize) -> Option<&str> {
        self.words.get(id).and_then(|w| w.as_deref())
    }

    pub fn contains(&self, word: &str) -> bool {
        self.ids.contains_key(word)
    }

    /// Iterates over every `(word, index)` pair, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.ids.iter().map(|(word, &id)| (word.as_str(), id))
    }
}

/// A whitelist of words, topics are re-extracted after zeroing every word outside of it.
#[derive(Debug, Clone)]
pub struct VocabularyFilter {
    name: String,
    words: HashSet<String>,
}

impl VocabularyFilter {
    pub fn new<I, S>(name: impl Into<String>, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads a whitelist from a JSON object whose keys are the allowed words, it's named after the file stem.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let words: HashMap<String, serde_json::Value> = read_json(path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self::new(name, words.into_keys()))
    }

    /// Reads every `*.json` file directly inside `dir`, sorted by file name.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<Self>> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|e| EvalErr::io(dir, e))?;

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| EvalErr::io(dir, e))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        paths.iter().map(Self::load).collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allows(&self, word: &str) -> bool {
        self.words.contains(word)
    }

    /// The indices of every vocabulary word outside the whitelist, ascending.
    pub fn removed_indices(&self, vocab: &Vocabulary) -> Vec<usize> {
        let mut removed: Vec<usize> = vocab
            .iter()
            .filter(|(word, _)| !self.allows(word))
            .map(|(_, id)| id)
            .collect();
        removed.sort_unstable();
        removed
    }

    /// Returns a copy of `distribution` with the weight of every removed word set to zero.
    ///
    /// Columns past the end of the distribution are ignored.
    pub fn apply(&self, distribution: ArrayView2<f32>, vocab: &Vocabulary) -> Array2<f32> {
        let mut filtered = distribution.to_owned();
        for id in self.removed_indices(vocab) {
            if id < filtered.ncols() {
                filtered.column_mut(id).fill(0.0);
            }
        }

        filtered
    }
}

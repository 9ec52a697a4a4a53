use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use log::{debug, info};
use ndarray::ArrayView2;
use serde::Deserialize;

use crate::{EvalErr, Result, vocab::Vocabulary};

/// A binary document-term matrix stored column-wise: for every term, the
/// ascending ids of the documents it occurs in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryDtm {
    num_docs: usize,
    postings: Vec<Vec<u32>>,
}

impl BinaryDtm {
    /// Builds the matrix from documents given as term indices, repeated terms count once.
    ///
    /// # Arguments
    /// * `num_terms` - The amount of columns, terms at or past it are dropped.
    /// * `docs` - Every document's term indices.
    pub fn from_documents<I, D>(num_terms: usize, docs: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: IntoIterator<Item = usize>,
    {
        let mut postings = vec![Vec::new(); num_terms];
        let mut num_docs = 0;

        for (doc, terms) in docs.into_iter().enumerate() {
            let doc = doc as u32;
            for term in terms {
                let Some(list) = postings.get_mut(term) else {
                    continue;
                };
                if list.last() != Some(&doc) {
                    list.push(doc);
                }
            }
            num_docs += 1;
        }

        Self { num_docs, postings }
    }

    /// Builds the matrix from a dense `[docs, terms]` matrix, any positive entry is an occurrence.
    pub fn from_dense(matrix: ArrayView2<f32>) -> Self {
        let docs = matrix.rows().into_iter().map(|row| {
            row.iter()
                .enumerate()
                .filter(|&(_, &x)| x > 0.0)
                .map(|(term, _)| term)
                .collect::<Vec<_>>()
        });

        Self::from_documents(matrix.ncols(), docs)
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    pub fn num_terms(&self) -> usize {
        self.postings.len()
    }

    /// The ids of the documents containing `term`, empty for an unknown term.
    pub fn postings(&self, term: usize) -> &[u32] {
        self.postings.get(term).map_or(&[][..], Vec::as_slice)
    }

    /// The amount of documents containing `term`.
    pub fn df(&self, term: usize) -> usize {
        self.postings(term).len()
    }

    /// The amount of documents containing both `a` and `b`.
    pub fn co_df(&self, a: usize, b: usize) -> usize {
        let (mut xs, mut ys) = (self.postings(a), self.postings(b));
        let mut count = 0;

        while let (Some(&x), Some(&y)) = (xs.first(), ys.first()) {
            if x == y {
                count += 1;
                xs = &xs[1..];
                ys = &ys[1..];
            } else if x < y {
                xs = &xs[1..];
            } else {
                ys = &ys[1..];
            }
        }

        count
    }
}

#[derive(Deserialize)]
struct JsonDoc {
    text: String,
}

/// Whitespace tokenized reference documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenizedCorpus {
    docs: Vec<Vec<String>>,
}

impl TokenizedCorpus {
    pub fn new(docs: Vec<Vec<String>>) -> Self {
        Self { docs }
    }

    /// Splits every text on whitespace.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let docs = texts
            .into_iter()
            .map(|text| text.as_ref().split_whitespace().map(str::to_string).collect())
            .collect();

        Self { docs }
    }

    /// Reads a JSON lines file with one `{"id": .., "text": ..}` object per line, blank lines are skipped.
    pub fn load_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| EvalErr::io(path, e))?;

        let mut texts = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| EvalErr::io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }

            let doc: JsonDoc = serde_json::from_str(&line).map_err(|e| EvalErr::json(path, Some(i + 1), e))?;
            texts.push(doc.text);
        }

        debug!(docs = texts.len(); "read reference corpus from {}", path.display());
        Ok(Self::from_texts(texts))
    }

    pub fn documents(&self) -> &[Vec<String>] {
        &self.docs
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Builds the binary matrix over `vocab`'s index space, words outside of it are dropped.
    pub fn to_dtm(&self, vocab: &Vocabulary) -> BinaryDtm {
        let docs = self
            .docs
            .iter()
            .map(move |doc| doc.iter().filter_map(move |word| vocab.id(word)));

        BinaryDtm::from_documents(vocab.len(), docs)
    }

    /// Builds the binary matrix restricted to `words`, column `i` being `words[i]`.
    pub fn dtm_for(&self, words: &[&str]) -> BinaryDtm {
        let columns: HashMap<&str, usize> = words.iter().enumerate().map(|(i, &w)| (w, i)).collect();
        let columns = &columns;
        let docs = self
            .docs
            .iter()
            .map(move |doc| doc.iter().filter_map(move |word| columns.get(word.as_str()).copied()));

        BinaryDtm::from_documents(words.len(), docs)
    }
}

/// The reference documents in both shapes the scorers need, loaded once and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCorpus {
    docs: TokenizedCorpus,
    dtm: BinaryDtm,
}

impl ReferenceCorpus {
    /// Creates a new `ReferenceCorpus`, the matrix columns follow `vocab`'s indices.
    pub fn new(docs: TokenizedCorpus, vocab: &Vocabulary) -> Self {
        let dtm = docs.to_dtm(vocab);
        Self { docs, dtm }
    }

    /// Reads a JSON lines corpus, see `TokenizedCorpus::load_jsonl`.
    pub fn load(path: impl AsRef<Path>, vocab: &Vocabulary) -> Result<Self> {
        let path = path.as_ref();
        let corpus = Self::new(TokenizedCorpus::load_jsonl(path)?, vocab);
        info!(docs = corpus.dtm.num_docs(), terms = corpus.dtm.num_terms(); "loaded reference corpus {}", path.display());
        Ok(corpus)
    }

    pub fn tokenized(&self) -> &TokenizedCorpus {
        &self.docs
    }

    pub fn dtm(&self) -> &BinaryDtm {
        &self.dtm
    }
}

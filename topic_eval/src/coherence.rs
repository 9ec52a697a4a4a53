use std::{fmt, str::FromStr};

use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    EvalErr,
    corpus::{BinaryDtm, TokenizedCorpus},
    npmi::npmi,
};

const UCI_EPSILON: f64 = 1e-12;

/// Coherence measures computed from document co-occurrence in a tokenized corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoherenceMeasure {
    CNpmi,
    CUci,
    UMass,
}

impl CoherenceMeasure {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CNpmi => "c_npmi",
            Self::CUci => "c_uci",
            Self::UMass => "u_mass",
        }
    }

    /// Scores every topic given as words, in the given order.
    ///
    /// A topic with fewer than two words scores NaN.
    pub fn score(&self, topics: &[Vec<String>], corpus: &TokenizedCorpus) -> Vec<f64> {
        let mut words: Vec<&str> = topics.iter().flatten().map(String::as_str).collect();
        words.sort_unstable();
        words.dedup();

        let dtm = corpus.dtm_for(&words);
        let column = |word: &str| words.binary_search(&word).ok();

        topics
            .par_iter()
            .map(|topic| {
                if topic.len() < 2 {
                    warn!(measure = self.name(), words = topic.len(); "topic has no word pairs to score");
                    return f64::NAN;
                }

                // words missing from the corpus fall past the last column and have no documents
                let terms: Vec<usize> = topic
                    .iter()
                    .map(|word| column(word).unwrap_or(words.len()))
                    .collect();

                match self {
                    Self::CNpmi => c_npmi(&dtm, &terms),
                    Self::CUci => c_uci(&dtm, &terms),
                    Self::UMass => u_mass(&dtm, &terms),
                }
            })
            .collect()
    }
}

impl fmt::Display for CoherenceMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CoherenceMeasure {
    type Err = EvalErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c_npmi" => Ok(Self::CNpmi),
            "c_uci" => Ok(Self::CUci),
            "u_mass" => Ok(Self::UMass),
            _ => Err(EvalErr::UnknownMethod { name: s.to_string() }),
        }
    }
}

struct Probabilities {
    p_i: f64,
    p_j: f64,
    p_ij: f64,
}

fn probabilities(dtm: &BinaryDtm, a: usize, b: usize) -> Probabilities {
    let n = dtm.num_docs().max(1) as f64;
    Probabilities {
        p_i: dtm.df(a) as f64 / n,
        p_j: dtm.df(b) as f64 / n,
        p_ij: dtm.co_df(a, b) as f64 / n,
    }
}

fn mean_over_pairs<F>(terms: &[usize], mut score: F) -> f64
where
    F: FnMut(usize, usize) -> f64,
{
    let mut total = 0.0;
    let mut pairs = 0;
    for (i, &a) in terms.iter().enumerate() {
        for &b in &terms[i + 1..] {
            total += score(a, b);
            pairs += 1;
        }
    }

    total / pairs as f64
}

fn c_npmi(dtm: &BinaryDtm, terms: &[usize]) -> f64 {
    mean_over_pairs(terms, |a, b| {
        let p = probabilities(dtm, a, b);
        npmi(p.p_i, p.p_j, p.p_ij)
    })
}

fn c_uci(dtm: &BinaryDtm, terms: &[usize]) -> f64 {
    mean_over_pairs(terms, |a, b| {
        let p = probabilities(dtm, a, b);
        if p.p_i == 0.0 || p.p_j == 0.0 {
            return 0.0;
        }
        ((p.p_ij + UCI_EPSILON) / (p.p_i * p.p_j)).ln()
    })
}

/// Every word is paired with the words ranked above it and conditioned on them.
fn u_mass(dtm: &BinaryDtm, terms: &[usize]) -> f64 {
    let mut total = 0.0;
    let mut pairs = 0;

    for (i, &w_i) in terms.iter().enumerate().skip(1) {
        for &w_j in &terms[..i] {
            let d_j = dtm.df(w_j);
            if d_j == 0 {
                continue;
            }

            total += ((dtm.co_df(w_i, w_j) + 1) as f64 / d_j as f64).ln();
            pairs += 1;
        }
    }

    if pairs == 0 {
        return f64::NAN;
    }
    total / pairs as f64
}

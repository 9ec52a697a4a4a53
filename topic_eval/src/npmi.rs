use log::warn;
use rayon::prelude::*;

use crate::corpus::BinaryDtm;

/// The score of a pair of words that never occur together.
pub const NPMI_FLOOR: f64 = -1.0;

/// Normalized pointwise mutual information of two words from their document probabilities.
///
/// A pair that never co-occurs scores `NPMI_FLOOR` and a pair present in
/// every document scores `1.0`, neither ever reaches the logarithm of zero.
pub fn npmi(p_i: f64, p_j: f64, p_ij: f64) -> f64 {
    if p_ij <= 0.0 {
        return NPMI_FLOOR;
    }
    if p_ij >= 1.0 {
        return 1.0;
    }

    (p_ij / (p_i * p_j)).ln() / -p_ij.ln()
}

/// NPMI coherence of topics against a binary document-term matrix.
#[derive(Debug, Clone, Copy)]
pub struct Npmi<'a> {
    dtm: &'a BinaryDtm,
}

impl<'a> Npmi<'a> {
    pub fn new(dtm: &'a BinaryDtm) -> Self {
        Self { dtm }
    }

    /// Scores the pair of terms `a` and `b`.
    pub fn pair(&self, a: usize, b: usize) -> f64 {
        let co = self.dtm.co_df(a, b);
        if co == 0 {
            return NPMI_FLOOR;
        }

        let n = self.dtm.num_docs() as f64;
        let p_a = self.dtm.df(a) as f64 / n;
        let p_b = self.dtm.df(b) as f64 / n;
        npmi(p_a, p_b, co as f64 / n)
    }

    /// The mean score over every unordered pair of the topic's terms.
    ///
    /// A topic with fewer than two terms has no pairs and scores NaN.
    pub fn topic(&self, terms: &[usize]) -> f64 {
        if terms.len() < 2 {
            warn!(terms = terms.len(); "topic has no word pairs to score");
            return f64::NAN;
        }

        let mut total = 0.0;
        let mut pairs = 0;
        for (i, &a) in terms.iter().enumerate() {
            for &b in &terms[i + 1..] {
                total += self.pair(a, b);
                pairs += 1;
            }
        }

        total / pairs as f64
    }

    /// Scores every topic, in the given order.
    pub fn compute(&self, topics: &[Vec<usize>]) -> Vec<f64> {
        topics.par_iter().map(|terms| self.topic(terms)).collect()
    }
}

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::{
    EvalErr, Result,
    coherence::CoherenceMeasure,
    corpus::ReferenceCorpus,
    extractor::TopicSet,
    npmi::Npmi,
    report::CoherenceReport,
    similarity::embedding_similarity,
};

/// The evaluation methods a configuration may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMethod {
    FastEval,
    SlowEval,
    W2vSim,
}

/// What the strategies score against.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub corpus: Option<&'a ReferenceCorpus>,
    pub embeddings: Option<ArrayView2<'a, f32>>,
    pub top_n: usize,
}

/// One way of scoring a set of topics.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalStrategy {
    /// NPMI over the binary document-term matrix, reported as `<variant>_c_npmi`.
    FastEval,
    /// Every measure over the tokenized corpus, reported as `<variant>_<measure>`.
    SlowEval(Vec<CoherenceMeasure>),
    /// Embedding similarity between every topic's words, reported as `<variant>_w2v_sim`.
    W2vSim,
}

impl EvalStrategy {
    /// Builds the strategy of `method`, slow evaluation computes every one of `measures`.
    pub fn new(method: EvaluationMethod, measures: &[CoherenceMeasure]) -> Self {
        match method {
            EvaluationMethod::FastEval => Self::FastEval,
            EvaluationMethod::SlowEval => Self::SlowEval(measures.to_vec()),
            EvaluationMethod::W2vSim => Self::W2vSim,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FastEval => "fast_eval",
            Self::SlowEval(_) => "slow_eval",
            Self::W2vSim => "w2v_sim",
        }
    }

    pub fn needs_corpus(&self) -> bool {
        !matches!(self, Self::W2vSim)
    }

    /// Scores `topics`.
    ///
    /// # Returns
    /// The scores keyed by variant and metric, or an error if `ctx` lacks
    /// what the strategy needs or a topic word has no embedding.
    pub fn score(&self, topics: &TopicSet, ctx: &ScoringContext<'_>) -> Result<CoherenceReport> {
        let mut report = CoherenceReport::new();
        let variant = topics.name();

        match self {
            Self::FastEval => {
                let corpus = ctx.corpus.ok_or(EvalErr::MissingCorpus { strategy: self.name() })?;
                let scores = Npmi::new(corpus.dtm()).compute(topics.indices());
                report.insert_topic_scores(format!("{variant}_c_npmi"), scores);
            }
            Self::SlowEval(measures) => {
                let corpus = ctx.corpus.ok_or(EvalErr::MissingCorpus { strategy: self.name() })?;
                for measure in measures {
                    let scores = measure.score(topics.words(), corpus.tokenized());
                    report.insert_topic_scores(format!("{variant}_{measure}"), scores);
                }
            }
            Self::W2vSim => {
                let embeddings = ctx.embeddings.ok_or(EvalErr::MissingEmbeddings)?;
                let sim = embedding_similarity(embeddings, topics.indices(), ctx.top_n)?;
                report.insert_value(format!("{variant}_w2v_sim"), sim);
            }
        }

        Ok(report)
    }
}

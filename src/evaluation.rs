use collective::ProcessGroup;
use log::{info, warn};
use topic_eval::{
    EvalErr,
    corpus::ReferenceCorpus,
    extractor::{TopicExtractor, TopicSet},
    report::{CoherenceReport, TopicInfoWriter},
    source::TopicSource,
    strategy::ScoringContext,
    vocab::{Vocabulary, VocabularyFilter},
};

use crate::{Result, config::EvalPlan};

/// Scores the topics of a trained model, once per vocabulary variant and strategy.
#[derive(Debug)]
pub struct TopicEvaluator {
    plan: EvalPlan,
    extractor: TopicExtractor,
    filters: Vec<VocabularyFilter>,
}

impl TopicEvaluator {
    /// Creates a new `TopicEvaluator`, reading the vocabulary filters of the plan if any.
    pub fn new(plan: EvalPlan) -> Result<Self> {
        let filters = match &plan.post_word_dict_dir {
            Some(dir) => VocabularyFilter::load_dir(dir)?,
            None => Vec::new(),
        };

        Ok(Self::with_filters(plan, filters))
    }

    pub fn with_filters(plan: EvalPlan, filters: Vec<VocabularyFilter>) -> Self {
        Self {
            extractor: TopicExtractor::new(plan.top_n),
            plan,
            filters,
        }
    }

    pub fn plan(&self) -> &EvalPlan {
        &self.plan
    }

    /// Reads the reference corpus if any strategy of the plan scores against it.
    pub fn load_corpus(&self, vocab: &Vocabulary) -> Result<Option<ReferenceCorpus>> {
        match &self.plan.ref_data_path {
            Some(path) if self.plan.needs_corpus() => Ok(Some(ReferenceCorpus::load(path, vocab)?)),
            _ => Ok(None),
        }
    }

    /// Evaluates the topics of `source`.
    ///
    /// Every rank of `group` must call this. Every rank computes the same report
    /// but only the main one writes the topic files, the others wait for it.
    ///
    /// # Arguments
    /// * `source` - Provides the topic distribution and word embeddings.
    /// * `vocab` - Maps the distribution's columns to words.
    /// * `corpus` - The reference corpus, needed by the corpus based strategies.
    /// * `group` - The participating processes.
    ///
    /// # Returns
    /// Every variant's scores or the first scoring or writing error.
    pub fn evaluate<S, G>(
        &self,
        source: &S,
        vocab: &Vocabulary,
        corpus: Option<&ReferenceCorpus>,
        group: &G,
    ) -> Result<CoherenceReport>
    where
        S: TopicSource + ?Sized,
        G: ProcessGroup + ?Sized,
    {
        let distribution = source.topic_distribution();
        let variants = self.extractor.variants(distribution, &self.filters, vocab)?;
        info!(variants = variants.len(), topics = distribution.nrows(); "evaluating topics");

        let ctx = ScoringContext {
            corpus,
            embeddings: source.word_embeddings(),
            top_n: self.plan.top_n.get(),
        };

        let mut scored = Vec::with_capacity(variants.len());
        for topics in &variants {
            let mut report = CoherenceReport::new();
            for strategy in &self.plan.strategies {
                report.merge(strategy.score(topics, &ctx)?);
            }
            scored.push(report);
        }

        let written = if self.plan.save_topic_info && group.context().is_main() {
            let writer = TopicInfoWriter::new(self.plan.output.dir(distribution.nrows()), self.plan.sort_score);
            save_topic_info(&writer, &variants, &scored)
        } else {
            Ok(())
        };
        group.barrier();
        written?;

        let mut merged = CoherenceReport::new();
        for report in scored {
            merged.merge(report);
        }

        if merged.is_empty() {
            return Err(EvalErr::NoEvaluationMethod.into());
        }

        for (key, value) in merged.values() {
            if !value.is_finite() {
                warn!("{key} is not finite");
            }
        }
        info!("topic evaluation: {}", format_report(&merged));

        Ok(merged)
    }
}

fn save_topic_info(writer: &TopicInfoWriter, variants: &[TopicSet], scored: &[CoherenceReport]) -> Result<()> {
    for (topics, report) in variants.iter().zip(scored) {
        writer.write_topic_list(topics)?;
        if !report.topic_scores().is_empty() {
            writer.write_scores(topics, report)?;
        }
    }

    info!("saved topic info to {}", writer.dir().display());
    Ok(())
}

fn format_report(report: &CoherenceReport) -> String {
    report
        .values()
        .iter()
        .map(|(key, value)| format!("{key}: {value:.4}"))
        .collect::<Vec<_>>()
        .join(" ")
}

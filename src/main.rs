use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use collective::SoloGroup;
use log::info;
use news_topic_orchestra::{config::EvalConfig, evaluation::TopicEvaluator};
use topic_eval::{source::StaticTopics, vocab::Vocabulary};

fn main() -> Result<()> {
    env_logger::init();

    let config_path: PathBuf = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: news-topic-orchestra <config.json>")?;

    let config = EvalConfig::load(&config_path)?;
    let plan = config.plan()?;
    let inputs = config
        .inputs
        .as_ref()
        .context("the config has no `inputs` section")?;

    let vocab = Vocabulary::load(&inputs.word_dict)?;
    let source = StaticTopics::load(&inputs.topic_distribution, inputs.embeddings.as_deref())?;
    info!("loaded {} words from {}", vocab.len(), inputs.word_dict.display());

    let evaluator = TopicEvaluator::new(plan)?;
    let corpus = evaluator.load_corpus(&vocab)?;
    let report = evaluator.evaluate(&source, &vocab, corpus.as_ref(), &SoloGroup::new())?;

    for (key, value) in report.values() {
        println!("{key}: {value}");
    }

    Ok(())
}

use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use log::debug;
use machine_learning::training::RunnerConfig;
use serde::Deserialize;
use topic_eval::{
    coherence::CoherenceMeasure,
    strategy::{EvalStrategy, EvaluationMethod},
};

use crate::{OrchestraErr, Result};

const DEFAULT_ALPHA: f32 = 0.001;
const DEFAULT_TOP_N: usize = 10;
const DEFAULT_SEED: u64 = 42;

/// Where the binary reads the learned topics from.
#[derive(Debug, Clone, Deserialize)]
pub struct InputPaths {
    /// JSON object of `word -> index`.
    pub word_dict: PathBuf,
    /// JSON array of rows, `[num_topics, vocab_size]`.
    pub topic_distribution: PathBuf,
    /// JSON array of rows, `[vocab_size, dim]`.
    pub embeddings: Option<PathBuf>,
}

/// The raw configuration, as written by the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub entropy_constraint: bool,
    /// Defaults to `entropy_constraint`.
    pub calculate_entropy: Option<bool>,
    pub alpha: f32,
    pub top_n: usize,
    pub coherence_method: Vec<CoherenceMeasure>,
    pub topic_evaluation_method: Vec<EvaluationMethod>,
    pub save_topic_info: bool,
    pub sort_score: bool,
    pub post_word_dict_dir: Option<PathBuf>,
    pub ref_data_path: Option<PathBuf>,
    pub model_dir: PathBuf,
    pub seed: u64,
    /// Appended to the name of the topic output directory.
    pub extra: Option<String>,
    pub inputs: Option<InputPaths>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            entropy_constraint: false,
            calculate_entropy: None,
            alpha: DEFAULT_ALPHA,
            top_n: DEFAULT_TOP_N,
            coherence_method: vec![CoherenceMeasure::CNpmi],
            topic_evaluation_method: Vec::new(),
            save_topic_info: false,
            sort_score: true,
            post_word_dict_dir: None,
            ref_data_path: None,
            model_dir: PathBuf::from("."),
            seed: DEFAULT_SEED,
            extra: None,
            inputs: None,
        }
    }
}

impl EvalConfig {
    /// Reads a configuration from a JSON file.
    ///
    /// # Errors
    /// If the file can't be read, isn't valid JSON or names an unknown method.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| OrchestraErr::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| OrchestraErr::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// How the batch runner assembles the loss.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig::new(self.entropy_constraint, self.alpha)
            .with_calculate_entropy(self.calculate_entropy.unwrap_or(self.entropy_constraint))
    }

    /// Validates the configuration and builds the evaluation plan.
    pub fn plan(&self) -> Result<EvalPlan> {
        Adapter::new().adapt(self)
    }
}

/// Names the topic output directory of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub model_dir: PathBuf,
    pub seed: u64,
    pub extra: Option<String>,
}

impl OutputSpec {
    /// `<model_dir>/topics_<seed>_<num_topics>[_<extra>]`.
    pub fn dir(&self, num_topics: usize) -> PathBuf {
        let mut name = format!("topics_{}_{num_topics}", self.seed);
        if let Some(extra) = &self.extra {
            name.push('_');
            name.push_str(extra);
        }

        self.model_dir.join(name)
    }
}

/// A validated topic evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalPlan {
    /// Never empty, every strategy appears once.
    pub strategies: Vec<EvalStrategy>,
    pub top_n: NonZeroUsize,
    pub save_topic_info: bool,
    pub sort_score: bool,
    pub post_word_dict_dir: Option<PathBuf>,
    pub ref_data_path: Option<PathBuf>,
    pub output: OutputSpec,
}

impl EvalPlan {
    pub fn needs_corpus(&self) -> bool {
        self.strategies.iter().any(EvalStrategy::needs_corpus)
    }
}

/// Turns an `EvalConfig` into an `EvalPlan`.
pub struct Adapter;

impl Adapter {
    pub fn new() -> Self {
        Self
    }

    pub fn adapt(&self, config: &EvalConfig) -> Result<EvalPlan> {
        self.validate(config)?;

        let mut methods: Vec<EvaluationMethod> = Vec::with_capacity(config.topic_evaluation_method.len());
        for &method in &config.topic_evaluation_method {
            if !methods.contains(&method) {
                methods.push(method);
            }
        }

        let mut measures: Vec<CoherenceMeasure> = Vec::with_capacity(config.coherence_method.len());
        for &measure in &config.coherence_method {
            if !measures.contains(&measure) {
                measures.push(measure);
            }
        }

        let strategies: Vec<EvalStrategy> = methods
            .into_iter()
            .map(|method| EvalStrategy::new(method, &measures))
            .collect();

        let top_n = NonZeroUsize::new(config.top_n)
            .ok_or_else(|| OrchestraErr::Config("top_n must be greater than 0".into()))?;

        let plan = EvalPlan {
            strategies,
            top_n,
            save_topic_info: config.save_topic_info,
            sort_score: config.sort_score,
            post_word_dict_dir: config.post_word_dict_dir.clone(),
            ref_data_path: config.ref_data_path.clone(),
            output: OutputSpec {
                model_dir: config.model_dir.clone(),
                seed: config.seed,
                extra: config.extra.clone(),
            },
        };

        if plan.needs_corpus() && plan.ref_data_path.is_none() {
            return Err(OrchestraErr::Config(
                "ref_data_path is required by fast_eval and slow_eval".into(),
            ));
        }

        debug!("adapted {} evaluation strategies", plan.strategies.len());
        Ok(plan)
    }

    fn validate(&self, config: &EvalConfig) -> Result<()> {
        if config.topic_evaluation_method.is_empty() {
            return Err(OrchestraErr::Config(
                "no topic evaluation method, expected any of fast_eval, slow_eval, w2v_sim".into(),
            ));
        }

        if config.topic_evaluation_method.contains(&EvaluationMethod::SlowEval)
            && config.coherence_method.is_empty()
        {
            return Err(OrchestraErr::Config(
                "slow_eval needs at least one coherence_method".into(),
            ));
        }

        if !config.alpha.is_finite() || config.alpha < 0.0 {
            return Err(OrchestraErr::Config(format!(
                "alpha must be a non-negative number, got {}",
                config.alpha
            )));
        }

        Ok(())
    }
}

impl Default for Adapter {
    fn default() -> Self {
        Self::new()
    }
}

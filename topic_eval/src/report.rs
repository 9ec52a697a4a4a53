use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;
use serde::Serialize;

use crate::{EvalErr, Result, extractor::TopicSet};

/// Rounds to 4 decimal places, NaN stays NaN.
pub fn round4(x: f64) -> f64 {
    (x * 1e4).round() / 1e4
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// The scores of one or more evaluations, keyed by `<variant>_<metric>`.
///
/// Every key has a scalar rounded to 4 decimals, keys scored per topic also
/// keep the unrounded per topic scores.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoherenceReport {
    values: BTreeMap<String, f64>,
    topic_scores: BTreeMap<String, Vec<f64>>,
}

impl CoherenceReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds per topic scores, the scalar is their rounded mean.
    pub fn insert_topic_scores(&mut self, key: impl Into<String>, scores: Vec<f64>) {
        let key = key.into();
        self.values.insert(key.clone(), round4(mean(&scores)));
        self.topic_scores.insert(key, scores);
    }

    /// Adds a single scalar, rounded.
    pub fn insert_value(&mut self, key: impl Into<String>, value: f64) {
        let key = key.into();
        self.topic_scores.remove(&key);
        self.values.insert(key, round4(value));
    }

    /// Moves every entry of `other` into this report, replacing existing keys.
    pub fn merge(&mut self, other: CoherenceReport) {
        for key in other.values.keys() {
            self.topic_scores.remove(key);
        }
        self.values.extend(other.values);
        self.topic_scores.extend(other.topic_scores);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    pub fn topic_scores(&self) -> &BTreeMap<String, Vec<f64>> {
        &self.topic_scores
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Serialize)]
struct TopicScore<'a> {
    topic: usize,
    score: f64,
    words: &'a [String],
}

/// Persists the topics and their scores under a directory.
#[derive(Debug, Clone)]
pub struct TopicInfoWriter {
    dir: PathBuf,
    sort_score: bool,
}

impl TopicInfoWriter {
    /// Creates a new `TopicInfoWriter`.
    ///
    /// # Arguments
    /// * `dir` - The output directory, created on the first write.
    /// * `sort_score` - Whether the topics of every metric are listed from the best score down.
    pub fn new(dir: impl Into<PathBuf>, sort_score: bool) -> Self {
        Self {
            dir: dir.into(),
            sort_score,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `topic_list_<variant>.txt`, one line of space separated words per topic.
    pub fn write_topic_list(&self, topics: &TopicSet) -> Result<PathBuf> {
        let path = self.dir.join(format!("topic_list_{}.txt", topics.name()));
        let lines: Vec<String> = topics.words().iter().map(|words| words.join(" ")).collect();

        self.create_dir()?;
        fs::write(&path, lines.join("\n")).map_err(|e| EvalErr::io(&path, e))?;

        Ok(path)
    }

    /// Writes `topic_scores_<variant>.json`, for every per topic metric of `report`
    /// the list of `{topic, score, words}`.
    ///
    /// Non finite scores are written as `null` and listed last when sorting.
    pub fn write_scores(&self, topics: &TopicSet, report: &CoherenceReport) -> Result<PathBuf> {
        let path = self.dir.join(format!("topic_scores_{}.json", topics.name()));

        let mut content: BTreeMap<&str, Vec<TopicScore<'_>>> = BTreeMap::new();
        for (metric, scores) in report.topic_scores() {
            let mut entries: Vec<TopicScore<'_>> = scores
                .iter()
                .zip(topics.words())
                .enumerate()
                .map(|(topic, (&score, words))| TopicScore { topic, score, words })
                .collect();

            if self.sort_score {
                entries.sort_by(|a, b| descending_nan_last(a.score, b.score));
            }
            content.insert(metric, entries);
        }

        self.create_dir()?;
        let file = File::create(&path).map_err(|e| EvalErr::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &content).map_err(|e| EvalErr::json(&path, None, e))?;
        writer.flush().map_err(|e| EvalErr::io(&path, e))?;

        info!(metrics = content.len(); "saved topic scores to {}", path.display());
        Ok(path)
    }

    fn create_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| EvalErr::io(&self.dir, e))
    }
}

fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => b.total_cmp(&a),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_four_decimals() {
        assert_eq!(round4(-0.173_296), -0.1733);
        assert_eq!(round4(0.123_46), 0.1235);
        assert!(round4(f64::NAN).is_nan());
    }

    #[test]
    fn topic_scores_keep_the_unrounded_values() {
        let mut report = CoherenceReport::new();
        report.insert_topic_scores("original_c_npmi", vec![0.1, 0.2, 0.300_04]);

        assert_eq!(report.get("original_c_npmi"), Some(0.2));
        assert_eq!(report.topic_scores()["original_c_npmi"], vec![0.1, 0.2, 0.300_04]);
    }

    #[test]
    fn merge_replaces_existing_keys() {
        let mut a = CoherenceReport::new();
        a.insert_topic_scores("x", vec![1.0]);
        a.insert_value("y", 2.0);

        let mut b = CoherenceReport::new();
        b.insert_value("x", 5.0);

        a.merge(b);
        assert_eq!(a.get("x"), Some(5.0));
        assert_eq!(a.get("y"), Some(2.0));
        assert!(a.topic_scores().is_empty());
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn nan_sorts_last() {
        let mut scores = vec![0.1, f64::NAN, 0.5, -0.2];
        scores.sort_by(|a, b| descending_nan_last(*a, *b));

        assert_eq!(scores[..3], [0.5, 0.1, -0.2]);
        assert!(scores[3].is_nan());
    }
}

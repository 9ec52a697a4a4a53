use std::{fs, num::NonZeroUsize, path::PathBuf};

use ndarray::array;
use topic_eval::{
    corpus::ReferenceCorpus,
    extractor::{ORIGINAL, TopicExtractor},
    report::TopicInfoWriter,
    strategy::{EvalStrategy, ScoringContext},
    vocab::{Vocabulary, VocabularyFilter},
};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("topic_eval_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn vocab() -> Vocabulary {
    Vocabulary::from_words(["pad", "stock", "market", "game", "team", "rain"])
}

#[test]
fn reference_corpus_from_jsonl_reproduces_known_npmi() {
    let dir = scratch_dir("jsonl");
    let path = dir.join("ref.jsonl");
    fs::write(
        &path,
        concat!(
            r#"{"id": "N1", "text": "stock market"}"#,
            "\n",
            r#"{"id": "N2", "text": "market stock stock"}"#,
            "\n\n",
            r#"{"id": "N3", "text": "stock rain"}"#,
            "\n",
            r#"{"id": "N4", "text": "market game"}"#,
        ),
    )
    .unwrap();

    let vocab = vocab();
    let corpus = ReferenceCorpus::load(&path, &vocab).unwrap();
    assert_eq!(corpus.dtm().num_docs(), 4);

    let topics = TopicExtractor::new(NonZeroUsize::new(2).unwrap())
        .topic_set(ORIGINAL, array![[0.0, 0.6, 0.4, 0.0, 0.0, 0.0]].view(), &vocab)
        .unwrap();
    let ctx = ScoringContext {
        corpus: Some(&corpus),
        embeddings: None,
        top_n: 2,
    };
    let report = EvalStrategy::FastEval.score(&topics, &ctx).unwrap();

    assert_eq!(report.get("original_c_npmi"), Some(-0.1699));
    let per_topic = &report.topic_scores()["original_c_npmi"];
    assert!((per_topic[0] - (0.5f64 / 0.5625).ln() / -(0.5f64.ln())).abs() < 1e-12);
}

#[test]
fn malformed_corpus_line_is_reported_with_its_number() {
    let dir = scratch_dir("malformed");
    let path = dir.join("ref.jsonl");
    fs::write(&path, "{\"id\": 1, \"text\": \"a\"}\n{\"id\": 2}\n").unwrap();

    let err = ReferenceCorpus::load(&path, &vocab()).unwrap_err();
    assert!(err.to_string().contains("line 2"), "{err}");
}

#[test]
fn filtered_variants_stay_inside_their_whitelist() {
    let dir = scratch_dir("filters");
    fs::write(dir.join("sports.json"), r#"{"game": 3, "team": 4}"#).unwrap();
    fs::write(dir.join("finance.json"), r#"{"stock": 1, "market": 2, "rain": 5}"#).unwrap();
    fs::write(dir.join("notes.txt"), "ignored").unwrap();

    let vocab = vocab();
    let filters = VocabularyFilter::load_dir(&dir).unwrap();
    let names: Vec<&str> = filters.iter().map(VocabularyFilter::name).collect();
    assert_eq!(names, vec!["finance", "sports"]);

    let dist = array![
        [0.0, 0.30, 0.25, 0.20, 0.15, 0.10],
        [0.0, 0.05, 0.10, 0.40, 0.35, 0.10],
    ];
    let extractor = TopicExtractor::new(NonZeroUsize::new(3).unwrap());
    let original_alone = extractor.topic_set(ORIGINAL, dist.view(), &vocab).unwrap();
    let variants = extractor.variants(dist.view(), &filters, &vocab).unwrap();

    assert_eq!(variants.len(), 3);
    assert_eq!(variants[0], original_alone);

    for (variant, filter) in variants[1..].iter().zip(&filters) {
        assert_eq!(variant.name(), filter.name());
        for word in variant.words().iter().flatten() {
            assert!(filter.allows(word), "{word} leaked into {}", variant.name());
        }
    }

    assert_eq!(variants[2].words()[0], vec!["game", "team"]);
    assert_eq!(variants[1].words()[1], vec!["market", "rain", "stock"]);
}

#[test]
fn topic_info_is_written_per_variant() {
    let dir = scratch_dir("writer");
    let vocab = vocab();
    let corpus = ReferenceCorpus::new(
        topic_eval::corpus::TokenizedCorpus::from_texts(["stock market", "stock market", "game team", "rain"]),
        &vocab,
    );

    let topics = TopicExtractor::new(NonZeroUsize::new(2).unwrap())
        .topic_set(ORIGINAL, array![[0.0, 0.5, 0.5, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0, 0.3, 0.7]].view(), &vocab)
        .unwrap();
    let ctx = ScoringContext {
        corpus: Some(&corpus),
        embeddings: None,
        top_n: 2,
    };
    let report = EvalStrategy::FastEval.score(&topics, &ctx).unwrap();

    let writer = TopicInfoWriter::new(dir.join("topics_1_2"), true);
    let list = writer.write_topic_list(&topics).unwrap();
    let scores = writer.write_scores(&topics, &report).unwrap();

    assert_eq!(list.file_name().unwrap(), "topic_list_original.txt");
    assert_eq!(fs::read_to_string(list).unwrap(), "stock market\nrain team");

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(scores).unwrap()).unwrap();
    let entries = json["original_c_npmi"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    // stock and market always appear together, rain and team never do
    assert_eq!(entries[0]["topic"], 0);
    assert!((entries[0]["score"].as_f64().unwrap() - 1.0).abs() < 1e-12);
    assert_eq!(entries[1]["topic"], 1);
    assert_eq!(entries[1]["score"], -1.0);
    assert_eq!(entries[1]["words"], serde_json::json!(["rain", "team"]));
}

use std::collections::BTreeSet;
use std::path::Path;

use bitext_align::{
    aggregate_chapters, pair_chapter_files, read_paragraphs, write_jsonl_file, AlignmentError,
    AlignmentType, BitextAligner, BitextAlignerBuilder, ChapterReport, EmbeddingBackend,
    EncoderConfig, SimilarityOracle,
};

const LEXICON: &[(&str, &str)] = &[
    ("cat", "猫"),
    ("dog", "狗"),
    ("rain", "雨"),
    ("sun", "太阳"),
    ("tea", "茶"),
    ("book", "书"),
];

fn concepts(text: &str) -> BTreeSet<usize> {
    let lowered = text.to_lowercase();
    LEXICON
        .iter()
        .enumerate()
        .filter(|(_, (en, zh))| lowered.contains(en) || text.contains(zh))
        .map(|(id, _)| id)
        .collect()
}

/// Dice overlap of lexicon concepts.
struct LexiconOracle;

impl SimilarityOracle for LexiconOracle {
    fn score(&self, a: &str, b: &str) -> Result<f32, AlignmentError> {
        let (a, b) = (concepts(a), concepts(b));
        if a.is_empty() || b.is_empty() {
            return Ok(0.0);
        }
        let shared = a.intersection(&b).count();
        Ok(2.0 * shared as f32 / (a.len() + b.len()) as f32)
    }
}

/// Concept-count vectors, so the cosine oracle sees the same geometry.
struct LexiconBackend;

impl EmbeddingBackend for LexiconBackend {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AlignmentError> {
        Ok(texts
            .iter()
            .map(|text| {
                let ids = concepts(text);
                (0..LEXICON.len())
                    .map(|id| if ids.contains(&id) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }

    fn device_label(&self) -> String {
        "lexicon".to_string()
    }
}

struct BrokenOracle;

impl SimilarityOracle for BrokenOracle {
    fn score(&self, _a: &str, _b: &str) -> Result<f32, AlignmentError> {
        Err(AlignmentError::oracle("encoder unavailable"))
    }
}

fn lexicon_aligner() -> BitextAligner {
    BitextAlignerBuilder::new(EncoderConfig::default())
        .with_oracle(Box::new(LexiconOracle))
        .build()
        .expect("build aligner")
}

fn write_chapter(dir: &Path, name: &str, paragraphs: &[&str]) {
    std::fs::write(dir.join(name), paragraphs.join("\n\n")).expect("write chapter");
}

const INTRO_EN: &[&str] = &[
    "The cat sleeps. The dog barks.",
    "It will rain today.",
    "The sun is out. We drink tea.",
];
const INTRO_ZH: &[&str] = &["猫在睡觉。狗在叫。", "今天会下雨。", "太阳出来了。我们喝茶。"];

#[test]
fn chapter_pair_aligns_sentences_inside_paragraph_pairs() {
    let aligner = lexicon_aligner();
    let chapter = aligner.align_chapter_pair(INTRO_EN, INTRO_ZH).unwrap();

    assert_eq!(chapter.paragraph_pairs.len(), 3);
    let sentences: Vec<(&str, &str)> = chapter
        .sentence_pairs
        .iter()
        .map(|p| (p.source_text.as_str(), p.target_text.as_str()))
        .collect();
    assert_eq!(
        sentences,
        [
            ("The cat sleeps.", "猫在睡觉。"),
            ("The dog barks.", "狗在叫。"),
            ("It will rain today.", "今天会下雨。"),
            ("The sun is out.", "太阳出来了。"),
            ("We drink tea.", "我们喝茶。"),
        ]
    );
    for pair in &chapter.sentence_pairs {
        assert_eq!(pair.kind, AlignmentType::one_to(1));
        assert_eq!(pair.source_para_score, Some(1.0));
    }
    assert_eq!(chapter.skipped_paragraph_pairs, 0);
}

#[test]
fn reordered_sentences_become_a_swap() {
    let aligner = lexicon_aligner();
    let chapter = aligner
        .align_chapter_pair(&["The cat sleeps. The dog barks."], &["狗在叫。猫在睡觉。"])
        .unwrap();

    assert_eq!(chapter.sentence_pairs.len(), 2);
    assert_eq!(chapter.sentence_pairs[0].kind, AlignmentType::Swap1);
    assert_eq!(chapter.sentence_pairs[0].source_text, "The cat sleeps.");
    assert_eq!(chapter.sentence_pairs[0].target_text, "猫在睡觉。");
    assert_eq!(chapter.sentence_pairs[1].kind, AlignmentType::Swap2);
    assert_eq!(chapter.sentence_pairs[1].source_text, "The dog barks.");
    assert_eq!(chapter.sentence_pairs[1].target_text, "狗在叫。");
}

#[test]
fn cosine_oracle_over_embedding_backend_matches_direct_oracle() {
    let direct = lexicon_aligner()
        .align_chapter_pair(INTRO_EN, INTRO_ZH)
        .unwrap();
    let embedded = BitextAlignerBuilder::new(EncoderConfig::default())
        .with_embedding_backend(Box::new(LexiconBackend))
        .build()
        .unwrap()
        .align_chapter_pair(INTRO_EN, INTRO_ZH)
        .unwrap();

    let texts = |c: &bitext_align::ChapterAlignment| {
        c.sentence_pairs
            .iter()
            .map(|p| (p.source_text.clone(), p.target_text.clone(), p.kind))
            .collect::<Vec<_>>()
    };
    assert_eq!(texts(&direct), texts(&embedded));
}

#[test]
fn oracle_failure_aborts_the_chapter() {
    let aligner = BitextAlignerBuilder::new(EncoderConfig::default())
        .with_oracle(Box::new(BrokenOracle))
        .build()
        .unwrap();
    let err = aligner.align_chapter_pair(INTRO_EN, INTRO_ZH).unwrap_err();
    assert!(matches!(err, AlignmentError::Oracle { .. }));
}

#[test]
fn one_aligner_is_shared_across_threads() {
    let aligner = lexicon_aligner();
    let results: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    aligner
                        .align_chapter_pair(INTRO_EN, INTRO_ZH)
                        .map(|c| c.sentence_pairs.len())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked").expect("alignment"))
            .collect()
    });
    assert_eq!(results, [5, 5, 5, 5]);
}

#[test]
fn corpus_directories_round_trip_to_jsonl_and_report() {
    let en = tempfile::tempdir().unwrap();
    let zh = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_chapter(en.path(), "001_intro.txt", INTRO_EN);
    write_chapter(zh.path(), "001_序.txt", INTRO_ZH);
    write_chapter(en.path(), "002_pets.txt", &["The cat sleeps. The dog barks."]);
    write_chapter(zh.path(), "002_宠物.txt", &["狗在叫。猫在睡觉。"]);
    write_chapter(en.path(), "003_only_en.txt", &["The book is old."]);

    let pairing = pair_chapter_files(en.path(), zh.path()).unwrap();
    assert_eq!(pairing.pairs.len(), 2);
    assert_eq!(pairing.unmatched_source, ["003"]);
    assert!(pairing.unmatched_target.is_empty());

    let aligner = lexicon_aligner();
    let mut reports = Vec::new();
    for (index, pair) in pairing.pairs.iter().enumerate() {
        let source = read_paragraphs(&pair.source).unwrap();
        let target = read_paragraphs(&pair.target).unwrap();
        let chapter = aligner
            .align_chapter_pair(source.as_slice(), target.as_slice())
            .unwrap();
        write_jsonl_file(
            &out.path().join(format!("aligned_ch{index}.jsonl")),
            &chapter.sentence_pairs,
        )
        .unwrap();
        reports.push(ChapterReport::from_alignment(
            &pair.prefix,
            source.len(),
            target.len(),
            &chapter,
        ));
    }

    let first = std::fs::read_to_string(out.path().join("aligned_ch0.jsonl")).unwrap();
    let records: Vec<serde_json::Value> = first
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 5);
    assert_eq!(records[0]["en"], "The cat sleeps.");
    assert_eq!(records[0]["zh"], "猫在睡觉。");
    assert_eq!(records[0]["type"], "1:1");
    assert_eq!(records[0]["score"], 1.0);
    assert_eq!(records[0]["source_para_score"], 1.0);
    assert!(first.contains("猫在睡觉"));

    let second = std::fs::read_to_string(out.path().join("aligned_ch1.jsonl")).unwrap();
    let types: Vec<String> = second
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["type"].to_string())
        .collect();
    assert_eq!(types, ["\"swap_1\"", "\"swap_2\""]);

    let aggregate = aggregate_chapters(&reports);
    assert_eq!(aggregate.chapters, 2);
    assert_eq!(aggregate.sentence_pairs, 7);
    assert_eq!(aggregate.paragraph_pairs, 4);
    assert_eq!(aggregate.pair_counts["1:1"], 5);
    assert_eq!(aggregate.pair_counts["swap_1"], 1);
    assert_eq!(aggregate.pair_counts["swap_2"], 1);
    let score = aggregate.sentence_score.expect("scores present");
    assert!((score.mean - 1.0).abs() < 1e-6);
    assert!(score.std.abs() < 1e-6);
}

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::align_units;
use super::candidate_generator::SWAP_MARGIN;
use crate::config::StageParams;
use crate::error::AlignmentError;
use crate::pipeline::traits::SimilarityOracle;
use crate::types::{AlignmentRun, AlignmentType, Language, StepAction, TextUnit};

/// Looks scores up in a table; unknown pairs score `fallback`.
struct TableOracle {
    table: HashMap<(String, String), f32>,
    fallback: f32,
    calls: AtomicUsize,
    prepared: Mutex<Vec<String>>,
}

impl TableOracle {
    fn new(entries: &[(&str, &str, f32)]) -> Self {
        Self::with_fallback(entries, 0.0)
    }

    fn with_fallback(entries: &[(&str, &str, f32)], fallback: f32) -> Self {
        Self {
            table: entries
                .iter()
                .map(|&(a, b, s)| ((a.to_string(), b.to_string()), s))
                .collect(),
            fallback,
            calls: AtomicUsize::new(0),
            prepared: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SimilarityOracle for TableOracle {
    fn score(&self, a: &str, b: &str) -> Result<f32, AlignmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .table
            .get(&(a.to_string(), b.to_string()))
            .copied()
            .unwrap_or(self.fallback))
    }

    fn prepare(&self, texts: &[&str]) -> Result<(), AlignmentError> {
        let mut prepared = self.prepared.lock().unwrap();
        prepared.extend(texts.iter().map(|t| t.to_string()));
        Ok(())
    }
}

/// Deterministic pseudo-random scores in [-0.2, 1.0) keyed by the text pair.
struct HashOracle {
    salt: u64,
}

impl SimilarityOracle for HashOracle {
    fn score(&self, a: &str, b: &str) -> Result<f32, AlignmentError> {
        let mut hasher = DefaultHasher::new();
        self.salt.hash(&mut hasher);
        a.hash(&mut hasher);
        b.hash(&mut hasher);
        let unit = (hasher.finish() % 10_000) as f32 / 10_000.0;
        Ok(unit * 1.2 - 0.2)
    }
}

struct FailingOracle;

impl SimilarityOracle for FailingOracle {
    fn score(&self, _a: &str, _b: &str) -> Result<f32, AlignmentError> {
        Err(AlignmentError::oracle("model unavailable"))
    }
}

struct NanOracle;

impl SimilarityOracle for NanOracle {
    fn score(&self, _a: &str, _b: &str) -> Result<f32, AlignmentError> {
        Ok(f32::NAN)
    }
}

fn en(texts: &[&str]) -> Vec<TextUnit> {
    TextUnit::sequence(texts.iter().copied(), Language::En)
}

fn zh(texts: &[&str]) -> Vec<TextUnit> {
    TextUnit::sequence(texts.iter().copied(), Language::Zh)
}

fn assert_prefix_partition(run: &AlignmentRun, source_len: usize, target_len: usize) {
    let (mut i, mut j) = (0usize, 0usize);
    for step in &run.steps {
        assert_eq!(step.source_start, i, "steps must be contiguous on the source side");
        assert_eq!(step.target_start, j, "steps must be contiguous on the target side");
        assert!(step.source_consumed + step.target_consumed >= 1);
        i += step.source_consumed;
        j += step.target_consumed;
    }
    assert!(i <= source_len && j <= target_len);
    assert!(i == source_len || j == target_len || run.steps.is_empty());
    assert_eq!(i + run.unconsumed_source, source_len);
    assert_eq!(j + run.unconsumed_target, target_len);
    assert!(run.steps.len() <= source_len + target_len);
}

#[test]
fn empty_source_yields_nothing_without_oracle_calls() {
    let oracle = TableOracle::new(&[]);
    let run = align_units(&[], &zh(&["一。", "二。"]), &oracle, &StageParams::new(0.6, 4)).unwrap();
    assert!(run.pairs.is_empty());
    assert!(run.steps.is_empty());
    assert_eq!(run.unconsumed_target, 2);
    assert_eq!(oracle.calls(), 0);
    assert!(oracle.prepared.lock().unwrap().is_empty());
}

#[test]
fn empty_target_yields_nothing_without_oracle_calls() {
    let oracle = TableOracle::new(&[]);
    let run = align_units(&en(&["One."]), &[], &oracle, &StageParams::new(0.6, 4)).unwrap();
    assert!(run.pairs.is_empty());
    assert_eq!(run.unconsumed_source, 1);
    assert_eq!(oracle.calls(), 0);
}

#[test]
fn zero_window_is_rejected_before_scoring() {
    let oracle = TableOracle::new(&[]);
    let err = align_units(&en(&["One."]), &zh(&["一。"]), &oracle, &StageParams::new(0.6, 0))
        .unwrap_err();
    assert!(matches!(err, AlignmentError::InvalidInput { .. }));
    assert_eq!(oracle.calls(), 0);
}

#[test]
fn swap_emits_both_cross_pairs_in_order() {
    let source = en(&["Hello world.", "Good morning."]);
    let target = zh(&["早安。", "世界你好。"]);
    let oracle = TableOracle::new(&[
        ("Hello world.", "世界你好。", 0.9),
        ("Good morning.", "早安。", 0.9),
        ("Hello world.", "早安。", 0.1),
        ("Good morning.", "世界你好。", 0.1),
    ]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(0.6, 4)).unwrap();

    assert_eq!(run.pairs.len(), 2);
    assert_eq!(run.pairs[0].source_text, "Hello world.");
    assert_eq!(run.pairs[0].target_text, "世界你好。");
    assert_eq!(run.pairs[0].kind, AlignmentType::Swap1);
    assert!((run.pairs[0].score - 0.9).abs() < 1e-6);
    assert_eq!(run.pairs[1].source_text, "Good morning.");
    assert_eq!(run.pairs[1].target_text, "早安。");
    assert_eq!(run.pairs[1].kind, AlignmentType::Swap2);
    assert!((run.pairs[1].score - 0.9).abs() < 1e-6);

    assert_eq!(run.steps.len(), 1);
    assert_eq!(run.steps[0].action, StepAction::Swap);
    assert_eq!((run.steps[0].source_consumed, run.steps[0].target_consumed), (2, 2));
    assert_eq!((run.unconsumed_source, run.unconsumed_target), (0, 0));
}

#[test]
fn swap_requires_both_cross_scores_above_gate() {
    // Average 0.7 would beat everything, but the weak side sits below 0.6 - 0.1.
    let source = en(&["A.", "B."]);
    let target = zh(&["乙。", "甲。"]);
    let oracle = TableOracle::new(&[("A.", "甲。", 0.95), ("B.", "乙。", 0.45), ("A.", "乙。", 0.65)]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(0.6, 1)).unwrap();
    assert_eq!(run.pairs[0].kind, AlignmentType::one_to(1));
    assert_eq!(run.pairs[0].target_text, "乙。");
}

#[test]
fn many_to_one_merge_joins_source_with_spaces() {
    let source = en(&["One.", "Two.", "Three."]);
    let target = zh(&["一和二。", "三。"]);
    let oracle = TableOracle::new(&[
        ("One. Two.", "一和二。", 0.8),
        ("One.", "一和二。", 0.4),
        ("Three.", "三。", 0.9),
    ]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(0.6, 2)).unwrap();

    let first = &run.pairs[0];
    assert_eq!(first.kind.to_string(), "2:1");
    assert_eq!(first.source_text, "One. Two.");
    assert_eq!(first.target_text, "一和二。");
    assert_eq!((run.steps[0].source_consumed, run.steps[0].target_consumed), (2, 1));

    assert_eq!(run.pairs.len(), 2);
    assert_eq!(run.pairs[1].kind.to_string(), "1:1");
    assert_eq!(run.pairs[1].source_text, "Three.");
}

#[test]
fn one_to_many_merge_joins_chinese_without_separator() {
    let source = en(&["Hi there, friend."]);
    let target = zh(&["你好，", "朋友。"]);
    let oracle = TableOracle::new(&[
        ("Hi there, friend.", "你好，朋友。", 0.85),
        ("Hi there, friend.", "你好，", 0.5),
    ]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(0.65, 4)).unwrap();
    assert_eq!(run.pairs.len(), 1);
    assert_eq!(run.pairs[0].kind.to_string(), "1:2");
    assert_eq!(run.pairs[0].target_text, "你好，朋友。");
    assert_eq!((run.unconsumed_source, run.unconsumed_target), (0, 0));
}

#[test]
fn window_bounds_merge_width() {
    let source = en(&["Long sentence."]);
    let target = zh(&["甲，", "乙，", "丙。"]);
    let oracle = TableOracle::new(&[("Long sentence.", "甲，乙，丙。", 0.95)]);

    let narrow = align_units(&source, &target, &oracle, &StageParams::new(0.6, 2)).unwrap();
    assert!(narrow.pairs.is_empty());

    let wide = align_units(&source, &target, &oracle, &StageParams::new(0.6, 3)).unwrap();
    assert_eq!(wide.pairs[0].kind.to_string(), "1:3");
}

#[test]
fn extra_target_unit_is_dropped_by_lookahead() {
    let source = en(&["Alpha.", "Beta."]);
    let target = zh(&["註。", "阿爾法。", "貝塔。"]);
    let oracle = TableOracle::new(&[("Alpha.", "阿爾法。", 0.9), ("Beta.", "貝塔。", 0.9)]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(0.6, 2)).unwrap();

    let first = run.steps[0];
    assert_eq!(first.action, StepAction::DropTarget);
    assert_eq!((first.source_start, first.target_start), (0, 0));
    assert_eq!((first.source_consumed, first.target_consumed), (0, 1));
    // Next iteration retries A[0] against the new B[j].
    assert_eq!((run.steps[1].source_start, run.steps[1].target_start), (0, 1));

    let texts: Vec<(&str, &str)> = run
        .pairs
        .iter()
        .map(|p| (p.source_text.as_str(), p.target_text.as_str()))
        .collect();
    assert_eq!(texts, [("Alpha.", "阿爾法。"), ("Beta.", "貝塔。")]);
    assert_eq!(run.dropped_target(), 1);
}

#[test]
fn extra_source_unit_is_dropped_by_lookahead() {
    let source = en(&["Chapter notes.", "Alpha.", "Beta."]);
    let target = zh(&["阿爾法。", "貝塔。"]);
    let oracle = TableOracle::new(&[("Alpha.", "阿爾法。", 0.9), ("Beta.", "貝塔。", 0.9)]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(0.6, 2)).unwrap();

    assert_eq!(run.steps[0].action, StepAction::DropSource);
    assert_eq!((run.steps[0].source_consumed, run.steps[0].target_consumed), (1, 0));
    assert_eq!(run.pairs.len(), 2);
    assert_eq!(run.pairs[0].source_text, "Alpha.");
    assert_eq!(run.dropped_source(), 1);
}

#[test]
fn lookahead_without_swap_check_queries_oracle() {
    // A single source unit leaves no room for a swap, so the lookahead scores fresh.
    let source = en(&["Alpha."]);
    let target = zh(&["註。", "阿爾法。"]);
    let oracle = TableOracle::new(&[("Alpha.", "阿爾法。", 0.9)]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(0.6, 1)).unwrap();

    assert_eq!(run.steps[0].action, StepAction::DropTarget);
    assert_eq!(run.pairs.len(), 1);
    assert_eq!(run.pairs[0].target_text, "阿爾法。");
    // 1:1 and lookahead at the first cursor, 1:1 at the second.
    assert_eq!(oracle.calls(), 3);
}

#[test]
fn unresolved_ambiguity_drops_both_units() {
    let source = en(&["Noise.", "Alpha."]);
    let target = zh(&["雜訊。", "阿爾法。"]);
    let oracle = TableOracle::new(&[("Alpha.", "阿爾法。", 0.9)]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(0.6, 2)).unwrap();

    assert_eq!(run.steps[0].action, StepAction::DropBoth);
    assert_eq!(run.pairs.len(), 1);
    assert_eq!(run.pairs[0].source_text, "Alpha.");
}

#[test]
fn unreachable_threshold_drops_everything() {
    let source = en(&["A.", "B.", "C.", "D."]);
    let target = zh(&["甲。", "乙。", "丙。", "丁。"]);
    let oracle = TableOracle::with_fallback(&[], 0.95);
    let run = align_units(&source, &target, &oracle, &StageParams::new(1.1, 3)).unwrap();

    assert!(run.pairs.is_empty());
    assert_eq!(run.steps.len(), 4);
    assert!(run.steps.iter().all(|s| s.action == StepAction::DropBoth));
    assert_eq!((run.unconsumed_source, run.unconsumed_target), (0, 0));
    assert_prefix_partition(&run, 4, 4);
}

#[test]
fn trailing_suffix_is_reported_not_emitted() {
    let source = en(&["Only."]);
    let target = zh(&["唯一。", "附錄。", "版權。"]);
    let oracle = TableOracle::new(&[("Only.", "唯一。", 0.9)]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(0.6, 1)).unwrap();

    assert_eq!(run.pairs.len(), 1);
    assert_eq!(run.unconsumed_source, 0);
    assert_eq!(run.unconsumed_target, 2);
}

#[test]
fn exact_ties_keep_first_generated_candidate() {
    let source = en(&["A.", "B."]);
    let target = zh(&["甲。", "乙。"]);
    let oracle = TableOracle::with_fallback(&[], 0.7);
    let run = align_units(&source, &target, &oracle, &StageParams::new(0.6, 2)).unwrap();

    assert_eq!(run.pairs.len(), 2);
    assert!(run
        .pairs
        .iter()
        .all(|p| p.kind == AlignmentType::one_to(1)));
}

#[test]
fn best_score_equal_to_threshold_commits() {
    let oracle = TableOracle::new(&[("A.", "甲。", 0.75)]);
    let run = align_units(&en(&["A."]), &zh(&["甲。"]), &oracle, &StageParams::new(0.75, 1)).unwrap();

    assert_eq!(run.steps[0].action, StepAction::Commit(AlignmentType::one_to(1)));
    assert_eq!(run.pairs.len(), 1);
    assert_eq!(run.pairs[0].score, 0.75);
}

#[test]
fn lookahead_equal_to_threshold_does_not_drop_a_single_side() {
    let source = en(&["A.", "B."]);
    let target = zh(&["甲。", "乙。"]);
    // One cross score sits exactly on the threshold, the other below the swap gate.
    for (next_target, next_source) in [(0.75, 0.5), (0.5, 0.75)] {
        let oracle = TableOracle::new(&[
            ("A.", "甲。", 0.2),
            ("A.", "乙。", next_target),
            ("B.", "甲。", next_source),
        ]);
        let run = align_units(&source, &target, &oracle, &StageParams::new(0.75, 1)).unwrap();
        assert_eq!(run.steps[0].action, StepAction::DropBoth);
        assert!(run.pairs.is_empty());
    }
}

#[test]
fn swap_gate_excludes_cross_score_on_the_margin() {
    let threshold = 0.75f32;
    let on_margin = threshold - SWAP_MARGIN;
    let source = en(&["A.", "B."]);
    let target = zh(&["甲。", "乙。"]);

    // Averaging with 1.0 would clear the threshold if the gate let it through.
    let oracle = TableOracle::new(&[("A.", "甲。", 0.1), ("A.", "乙。", on_margin), ("B.", "甲。", 1.0)]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(threshold, 1)).unwrap();
    assert_eq!(run.steps[0].action, StepAction::DropSource);
    assert!(run.pairs.iter().all(|p| !p.kind.is_swap()));
    assert_eq!(run.pairs[0].source_text, "B.");
    assert_eq!(run.pairs[0].target_text, "甲。");

    let oracle = TableOracle::new(&[("A.", "甲。", 0.1), ("A.", "乙。", 0.7), ("B.", "甲。", 1.0)]);
    let run = align_units(&source, &target, &oracle, &StageParams::new(threshold, 1)).unwrap();
    assert_eq!(run.steps[0].action, StepAction::Swap);
    assert_eq!(run.pairs[0].kind, AlignmentType::Swap1);
}

#[test]
fn oracle_failure_aborts_run() {
    let err = align_units(
        &en(&["A."]),
        &zh(&["甲。"]),
        &FailingOracle,
        &StageParams::new(0.6, 2),
    )
    .unwrap_err();
    assert!(matches!(err, AlignmentError::Oracle { .. }));
}

#[test]
fn non_finite_score_is_an_oracle_error() {
    let err = align_units(&en(&["A."]), &zh(&["甲。"]), &NanOracle, &StageParams::new(0.6, 2))
        .unwrap_err();
    assert!(matches!(err, AlignmentError::Oracle { .. }));
}

#[test]
fn all_single_units_are_prepared_once() {
    let source = en(&["A.", "B."]);
    let target = zh(&["甲。", "乙。", "丙。"]);
    let oracle = TableOracle::new(&[]);
    align_units(&source, &target, &oracle, &StageParams::new(0.6, 2)).unwrap();
    let prepared = oracle.prepared.lock().unwrap().clone();
    assert_eq!(prepared, ["A.", "B.", "甲。", "乙。", "丙。"]);
}

#[test]
fn oracle_calls_per_step_stay_within_window_budget() {
    let source = en(&["A.", "B.", "C."]);
    let target = zh(&["甲。", "乙。", "丙。"]);
    let oracle = TableOracle::new(&[]);
    let params = StageParams::new(0.6, 3);
    let run = align_units(&source, &target, &oracle, &params).unwrap();
    let per_step_budget = 2 * params.max_window - 1 + 2;
    assert!(oracle.calls() <= run.steps.len() * per_step_budget);
}

#[test]
fn randomized_runs_partition_prefixes_and_are_deterministic() {
    let mut rng = StdRng::seed_from_u64(42);
    for case in 0..200 {
        let source_len = rng.gen_range(0..12);
        let target_len = rng.gen_range(0..12);
        let source: Vec<TextUnit> = TextUnit::sequence(
            (0..source_len).map(|n| format!("s{case}-{n}.")),
            Language::En,
        );
        let target: Vec<TextUnit> = TextUnit::sequence(
            (0..target_len).map(|n| format!("t{case}-{n}。")),
            Language::Zh,
        );
        let params = StageParams::new(rng.gen_range(0.3..0.9), rng.gen_range(1..5));
        let oracle = HashOracle { salt: case };

        let first = align_units(&source, &target, &oracle, &params).unwrap();
        let second = align_units(&source, &target, &oracle, &params).unwrap();
        assert_eq!(first, second, "case {case} is not deterministic");
        assert_prefix_partition(&first, source_len, target_len);

        let committed: usize = first
            .steps
            .iter()
            .map(|s| match s.action {
                StepAction::Commit(_) => 1,
                StepAction::Swap => 2,
                _ => 0,
            })
            .sum();
        assert_eq!(committed, first.pairs.len());
        for pair in &first.pairs {
            assert!(pair.score >= params.threshold - SWAP_MARGIN);
            assert!(pair.source_para_score.is_none());
        }
    }
}

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::StageParams;
use crate::pipeline::runtime::ChapterAlignment;
use crate::types::AlignedPair;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub schema_version: u32,
    pub meta: Meta,
    pub chapters: Vec<ChapterReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ChapterFailure>,
    pub aggregates: AggregateReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub generated_at: String,
    pub model_dir: String,
    pub runtime: String,
    pub device: String,
    pub source_language: String,
    pub target_language: String,
    pub paragraph_stage: StageParams,
    pub sentence_stage: StageParams,
    pub unmatched_source_chapters: Vec<String>,
    pub unmatched_target_chapters: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterFailure {
    pub prefix: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreDistribution {
    pub mean: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
    pub p10: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterReport {
    pub prefix: String,
    pub source_paragraphs: u32,
    pub target_paragraphs: u32,
    pub paragraph_pairs: u32,
    pub sentence_pairs: u32,
    /// Sentence pairs per type label (`"1:1"`, `"2:1"`, `"swap_1"`, ...).
    pub pair_counts: BTreeMap<String, u32>,
    /// Sentence pairs emitted by crosswise swaps (`swap_1` plus `swap_2`).
    pub swap_pairs: u32,
    pub skipped_paragraph_pairs: u32,
    pub dropped_source_paragraphs: u32,
    pub dropped_target_paragraphs: u32,
    pub unconsumed_source_paragraphs: u32,
    pub unconsumed_target_paragraphs: u32,
    pub unconsumed_source_sentences: u32,
    pub unconsumed_target_sentences: u32,
    pub paragraph_score: Option<ScoreDistribution>,
    pub sentence_score: Option<ScoreDistribution>,
    #[serde(skip)]
    sentence_scores: Vec<f32>,
}

impl ChapterReport {
    pub fn from_alignment(
        prefix: &str,
        source_paragraphs: usize,
        target_paragraphs: usize,
        alignment: &ChapterAlignment,
    ) -> Self {
        let sentence_scores = scores(&alignment.sentence_pairs);
        Self {
            prefix: prefix.to_string(),
            source_paragraphs: to_u32(source_paragraphs),
            target_paragraphs: to_u32(target_paragraphs),
            paragraph_pairs: to_u32(alignment.paragraph_pairs.len()),
            sentence_pairs: to_u32(alignment.sentence_pairs.len()),
            pair_counts: count_types(&alignment.sentence_pairs),
            swap_pairs: to_u32(
                alignment
                    .sentence_pairs
                    .iter()
                    .filter(|p| p.kind.is_swap())
                    .count(),
            ),
            skipped_paragraph_pairs: to_u32(alignment.skipped_paragraph_pairs),
            dropped_source_paragraphs: to_u32(alignment.dropped_source_paragraphs),
            dropped_target_paragraphs: to_u32(alignment.dropped_target_paragraphs),
            unconsumed_source_paragraphs: to_u32(alignment.unconsumed_source_paragraphs),
            unconsumed_target_paragraphs: to_u32(alignment.unconsumed_target_paragraphs),
            unconsumed_source_sentences: to_u32(alignment.unconsumed_source_sentences),
            unconsumed_target_sentences: to_u32(alignment.unconsumed_target_sentences),
            paragraph_score: distribution_or_none(&scores(&alignment.paragraph_pairs)),
            sentence_score: distribution_or_none(&sentence_scores),
            sentence_scores,
        }
    }
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct AggregateReport {
    pub chapters: u32,
    pub paragraph_pairs: u32,
    pub sentence_pairs: u32,
    pub pair_counts: BTreeMap<String, u32>,
    pub swap_pairs: u32,
    pub skipped_paragraph_pairs: u32,
    pub dropped_source_paragraphs: u32,
    pub dropped_target_paragraphs: u32,
    pub unconsumed_source_paragraphs: u32,
    pub unconsumed_target_paragraphs: u32,
    pub unconsumed_source_sentences: u32,
    pub unconsumed_target_sentences: u32,
    /// Over every sentence pair of every chapter.
    pub sentence_score: Option<ScoreDistribution>,
}

pub fn aggregate_chapters(chapters: &[ChapterReport]) -> AggregateReport {
    let mut agg = AggregateReport {
        chapters: to_u32(chapters.len()),
        ..AggregateReport::default()
    };
    let mut all_scores = Vec::new();
    for chapter in chapters {
        agg.paragraph_pairs += chapter.paragraph_pairs;
        agg.sentence_pairs += chapter.sentence_pairs;
        for (kind, count) in &chapter.pair_counts {
            *agg.pair_counts.entry(kind.clone()).or_insert(0) += count;
        }
        agg.swap_pairs += chapter.swap_pairs;
        agg.skipped_paragraph_pairs += chapter.skipped_paragraph_pairs;
        agg.dropped_source_paragraphs += chapter.dropped_source_paragraphs;
        agg.dropped_target_paragraphs += chapter.dropped_target_paragraphs;
        agg.unconsumed_source_paragraphs += chapter.unconsumed_source_paragraphs;
        agg.unconsumed_target_paragraphs += chapter.unconsumed_target_paragraphs;
        agg.unconsumed_source_sentences += chapter.unconsumed_source_sentences;
        agg.unconsumed_target_sentences += chapter.unconsumed_target_sentences;
        all_scores.extend_from_slice(&chapter.sentence_scores);
    }
    agg.sentence_score = distribution_or_none(&all_scores);
    agg
}

fn scores(pairs: &[AlignedPair]) -> Vec<f32> {
    pairs.iter().map(|p| p.score).collect()
}

fn count_types(pairs: &[AlignedPair]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for pair in pairs {
        *counts.entry(pair.kind.to_string()).or_insert(0) += 1;
    }
    counts
}

fn distribution_or_none(values: &[f32]) -> Option<ScoreDistribution> {
    if values.is_empty() {
        return None;
    }

    let mut sorted: Vec<f64> = values.iter().map(|&v| f64::from(v)).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mean_value = mean(&sorted);
    let variance =
        sorted.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / sorted.len() as f64;

    Some(ScoreDistribution {
        mean: mean_value as f32,
        std: variance.sqrt() as f32,
        min: sorted[0] as f32,
        max: sorted[sorted.len() - 1] as f32,
        p10: percentile_sorted(&sorted, 0.1) as f32,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn percentile_sorted(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    if sorted_values.len() == 1 {
        return sorted_values[0];
    }

    let clamped = percentile.clamp(0.0, 1.0);
    let max_index = (sorted_values.len() - 1) as f64;
    let rank = clamped * max_index;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = rank - lower as f64;
        sorted_values[lower] * (1.0 - weight) + sorted_values[upper] * weight
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

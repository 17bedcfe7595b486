use crate::config::{StageParams, TwoStageConfig};
use crate::error::AlignmentError;
use crate::pipeline::traits::{Segmenter, SimilarityOracle, UnitAligner};
use crate::types::{AlignedPair, AlignmentRun, Language, TextUnit};

/// Two-stage paragraph → sentence aligner for one chapter pair at a time.
///
/// Holds the model-backed oracle, so build it once and share it by reference;
/// chapter pairs are independent and may be aligned from several threads.
pub struct BitextAligner {
    oracle: Box<dyn SimilarityOracle>,
    device_label: Option<String>,
    segmenter: Box<dyn Segmenter>,
    unit_aligner: Box<dyn UnitAligner>,
    stages: TwoStageConfig,
    source_language: Language,
    target_language: Language,
}

pub(crate) struct BitextAlignerParts {
    pub oracle: Box<dyn SimilarityOracle>,
    pub device_label: Option<String>,
    pub segmenter: Box<dyn Segmenter>,
    pub unit_aligner: Box<dyn UnitAligner>,
    pub stages: TwoStageConfig,
    pub source_language: Language,
    pub target_language: Language,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChapterAlignment {
    /// Sentence pairs in document order, each carrying its paragraph score.
    pub sentence_pairs: Vec<AlignedPair>,
    pub paragraph_pairs: Vec<AlignedPair>,
    /// Paragraph pairs where either side segmented to nothing.
    pub skipped_paragraph_pairs: usize,
    pub dropped_source_paragraphs: usize,
    pub dropped_target_paragraphs: usize,
    pub unconsumed_source_paragraphs: usize,
    pub unconsumed_target_paragraphs: usize,
    /// Summed over all paragraph pairs.
    pub unconsumed_source_sentences: usize,
    pub unconsumed_target_sentences: usize,
}

impl BitextAligner {
    pub(crate) fn from_parts(parts: BitextAlignerParts) -> Self {
        Self {
            oracle: parts.oracle,
            device_label: parts.device_label,
            segmenter: parts.segmenter,
            unit_aligner: parts.unit_aligner,
            stages: parts.stages,
            source_language: parts.source_language,
            target_language: parts.target_language,
        }
    }

    pub fn stages(&self) -> &TwoStageConfig {
        &self.stages
    }

    pub fn source_language(&self) -> Language {
        self.source_language
    }

    pub fn target_language(&self) -> Language {
        self.target_language
    }

    /// Device the embedding backend resolved to; `None` for an injected oracle.
    pub fn device_label(&self) -> Option<&str> {
        self.device_label.as_deref()
    }

    pub fn oracle(&self) -> &dyn SimilarityOracle {
        self.oracle.as_ref()
    }

    /// Single-stage alignment of two unit lists with explicit parameters.
    pub fn align_units<S: AsRef<str>>(
        &self,
        source: &[S],
        target: &[S],
        params: &StageParams,
    ) -> Result<AlignmentRun, AlignmentError> {
        let source_units = to_units(source, self.source_language);
        let target_units = to_units(target, self.target_language);
        self.unit_aligner
            .align(&source_units, &target_units, self.oracle.as_ref(), params)
    }

    /// Aligns paragraphs first, then the sentences inside every paragraph pair.
    ///
    /// Sentence alignment never crosses a paragraph-pair boundary, and a pair
    /// that fails to segment on either side contributes nothing.
    pub fn align_chapter_pair<S: AsRef<str>>(
        &self,
        source_paragraphs: &[S],
        target_paragraphs: &[S],
    ) -> Result<ChapterAlignment, AlignmentError> {
        let paragraph_run =
            self.align_units(source_paragraphs, target_paragraphs, &self.stages.paragraph)?;

        tracing::info!(
            source_paragraphs = source_paragraphs.len(),
            target_paragraphs = target_paragraphs.len(),
            paragraph_pairs = paragraph_run.pairs.len(),
            "paragraph stage done"
        );

        let mut result = ChapterAlignment {
            dropped_source_paragraphs: paragraph_run.dropped_source(),
            dropped_target_paragraphs: paragraph_run.dropped_target(),
            unconsumed_source_paragraphs: paragraph_run.unconsumed_source,
            unconsumed_target_paragraphs: paragraph_run.unconsumed_target,
            ..ChapterAlignment::default()
        };

        for paragraph_pair in &paragraph_run.pairs {
            let source_sentences = self
                .segmenter
                .segment(&paragraph_pair.source_text, self.source_language);
            let target_sentences = self
                .segmenter
                .segment(&paragraph_pair.target_text, self.target_language);
            if source_sentences.is_empty() || target_sentences.is_empty() {
                tracing::debug!(
                    source_sentences = source_sentences.len(),
                    target_sentences = target_sentences.len(),
                    "skipping paragraph pair without sentences on both sides"
                );
                result.skipped_paragraph_pairs += 1;
                continue;
            }

            let sentence_run =
                self.align_units(&source_sentences, &target_sentences, &self.stages.sentence)?;
            result.unconsumed_source_sentences += sentence_run.unconsumed_source;
            result.unconsumed_target_sentences += sentence_run.unconsumed_target;
            result.sentence_pairs.extend(
                sentence_run
                    .pairs
                    .into_iter()
                    .map(|pair| pair.with_provenance(paragraph_pair.score)),
            );
        }

        tracing::info!(
            sentence_pairs = result.sentence_pairs.len(),
            skipped_paragraph_pairs = result.skipped_paragraph_pairs,
            "sentence stage done"
        );

        result.paragraph_pairs = paragraph_run.pairs;
        Ok(result)
    }
}

fn to_units<S: AsRef<str>>(texts: &[S], language: Language) -> Vec<TextUnit> {
    TextUnit::sequence(texts.iter().map(|t| t.as_ref().to_string()), language)
}

use unicode_segmentation::UnicodeSegmentation;

use crate::alignment::greedy::align_units;
use crate::config::StageParams;
use crate::error::AlignmentError;
use crate::pipeline::traits::{Segmenter, SimilarityOracle, UnitAligner};
use crate::types::{AlignmentRun, Language, TextUnit};

pub struct GreedyWindowAligner;

impl UnitAligner for GreedyWindowAligner {
    fn align(
        &self,
        source: &[TextUnit],
        target: &[TextUnit],
        oracle: &dyn SimilarityOracle,
        params: &StageParams,
    ) -> Result<AlignmentRun, AlignmentError> {
        align_units(source, target, oracle, params)
    }
}

/// UAX #29 sentence boundaries. Sentences shorter than `min_chars` characters
/// (after trimming) are discarded as stray punctuation.
///
/// There is no abbreviation list: "Mr. Smith" splits after "Mr.", where a
/// statistical English splitter would keep it whole. The greedy aligner can
/// re-merge such fragments through its `2:1` candidates.
pub struct UnicodeSentenceSegmenter {
    pub min_chars: usize,
}

impl Default for UnicodeSentenceSegmenter {
    fn default() -> Self {
        Self { min_chars: 2 }
    }
}

impl Segmenter for UnicodeSentenceSegmenter {
    fn segment(&self, text: &str, _language: Language) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        text.unicode_sentences()
            .map(str::trim)
            .filter(|s| s.chars().count() >= self.min_chars)
            .map(str::to_string)
            .collect()
    }
}

use crate::config::StageParams;
use crate::error::AlignmentError;
use crate::types::{AlignmentRun, Language, TextUnit};

/// Semantic similarity between two text spans, typically in `[-1, 1]`.
///
/// Implementations must be deterministic for a fixed model. Scoring is
/// expected to be expensive, so callers keep the number of calls low.
pub trait SimilarityOracle: Send + Sync {
    fn score(&self, a: &str, b: &str) -> Result<f32, AlignmentError>;

    /// Batch hint: `texts` are about to be scored many times each. Batch-capable
    /// oracles pre-encode them here; the default does nothing.
    fn prepare(&self, texts: &[&str]) -> Result<(), AlignmentError> {
        let _ = texts;
        Ok(())
    }
}

/// Splits a paragraph into ordered sentences. An empty result means the
/// paragraph has nothing to align.
pub trait Segmenter: Send + Sync {
    fn segment(&self, text: &str, language: Language) -> Vec<String>;
}

/// Aligns two ordered unit sequences against each other.
pub trait UnitAligner: Send + Sync {
    fn align(
        &self,
        source: &[TextUnit],
        target: &[TextUnit],
        oracle: &dyn SimilarityOracle,
        params: &StageParams,
    ) -> Result<AlignmentRun, AlignmentError>;
}

/// Produces L2-normalized sentence vectors, one per input text, in input order.
pub trait EmbeddingBackend: Send + Sync {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AlignmentError>;

    fn device_label(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    Candle,
    Onnx,
}

impl RuntimeKind {
    pub fn model_filename(self) -> &'static str {
        match self {
            Self::Candle => "model.safetensors",
            Self::Onnx => "model.onnx",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Candle => "candle",
            Self::Onnx => "onnx",
        }
    }
}

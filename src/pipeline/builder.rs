use crate::config::{EncoderConfig, StageParams, TwoStageConfig};
use crate::error::AlignmentError;
use crate::pipeline::defaults::{GreedyWindowAligner, UnicodeSentenceSegmenter};
use crate::pipeline::model_runtime::build_embedding_backend;
use crate::pipeline::oracle::CosineOracle;
use crate::pipeline::runtime::{BitextAligner, BitextAlignerParts};
use crate::pipeline::traits::{
    EmbeddingBackend, RuntimeKind, Segmenter, SimilarityOracle, UnitAligner,
};
use crate::types::Language;

pub struct BitextAlignerBuilder {
    config: EncoderConfig,
    runtime_kind: RuntimeKind,
    embedding_backend: Option<Box<dyn EmbeddingBackend>>,
    oracle: Option<Box<dyn SimilarityOracle>>,
    segmenter: Option<Box<dyn Segmenter>>,
    unit_aligner: Option<Box<dyn UnitAligner>>,
    stages: TwoStageConfig,
    source_language: Language,
    target_language: Language,
}

impl BitextAlignerBuilder {
    pub fn new(config: EncoderConfig) -> Self {
        Self {
            config,
            runtime_kind: RuntimeKind::Candle,
            embedding_backend: None,
            oracle: None,
            segmenter: None,
            unit_aligner: None,
            stages: TwoStageConfig::default(),
            source_language: Language::En,
            target_language: Language::Zh,
        }
    }

    pub fn with_runtime_kind(mut self, runtime_kind: RuntimeKind) -> Self {
        self.runtime_kind = runtime_kind;
        self
    }

    /// Uses `backend` behind the default cosine oracle instead of loading a model.
    pub fn with_embedding_backend(mut self, backend: Box<dyn EmbeddingBackend>) -> Self {
        self.embedding_backend = Some(backend);
        self
    }

    /// Replaces the oracle entirely; no encoder files are read.
    pub fn with_oracle(mut self, oracle: Box<dyn SimilarityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_segmenter(mut self, segmenter: Box<dyn Segmenter>) -> Self {
        self.segmenter = Some(segmenter);
        self
    }

    pub fn with_unit_aligner(mut self, unit_aligner: Box<dyn UnitAligner>) -> Self {
        self.unit_aligner = Some(unit_aligner);
        self
    }

    pub fn with_stages(mut self, stages: TwoStageConfig) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_paragraph_stage(mut self, params: StageParams) -> Self {
        self.stages.paragraph = params;
        self
    }

    pub fn with_sentence_stage(mut self, params: StageParams) -> Self {
        self.stages.sentence = params;
        self
    }

    pub fn with_languages(mut self, source: Language, target: Language) -> Self {
        self.source_language = source;
        self.target_language = target;
        self
    }

    pub fn build(self) -> Result<BitextAligner, AlignmentError> {
        self.stages.validate()?;

        let (oracle, device_label): (Box<dyn SimilarityOracle>, Option<String>) =
            match (self.oracle, self.embedding_backend) {
                (Some(oracle), _) => (oracle, None),
                (None, Some(backend)) => {
                    cosine_oracle(CosineOracle::with_capacity(backend, self.config.cache_capacity))
                }
                (None, None) => {
                    let backend = build_embedding_backend(self.runtime_kind, &self.config)?;
                    cosine_oracle(CosineOracle::with_capacity(backend, self.config.cache_capacity))
                }
            };

        tracing::debug!(
            runtime = self.runtime_kind.as_str(),
            source = %self.source_language,
            target = %self.target_language,
            paragraph_threshold = self.stages.paragraph.threshold,
            paragraph_window = self.stages.paragraph.max_window,
            sentence_threshold = self.stages.sentence.threshold,
            sentence_window = self.stages.sentence.max_window,
            device = device_label.as_deref().unwrap_or("custom oracle"),
            "bitext aligner configured"
        );

        Ok(BitextAligner::from_parts(BitextAlignerParts {
            oracle,
            device_label,
            segmenter: self
                .segmenter
                .unwrap_or_else(|| Box::new(UnicodeSentenceSegmenter::default())),
            unit_aligner: self
                .unit_aligner
                .unwrap_or_else(|| Box::new(GreedyWindowAligner)),
            stages: self.stages,
            source_language: self.source_language,
            target_language: self.target_language,
        }))
    }
}

fn cosine_oracle(oracle: CosineOracle) -> (Box<dyn SimilarityOracle>, Option<String>) {
    let label = oracle.device_label();
    (Box::new(oracle), Some(label))
}

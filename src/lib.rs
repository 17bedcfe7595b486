pub mod alignment;
pub mod config;
pub mod corpus;
pub mod error;
mod model;
pub mod pipeline;
pub mod types;

pub use alignment::greedy::align_units;
pub use alignment::join::join_units;
pub use alignment::report::{
    aggregate_chapters, AggregateReport, ChapterFailure, ChapterReport, Meta, Report,
    ScoreDistribution, REPORT_SCHEMA_VERSION,
};
pub use config::{EncoderConfig, PoolingStrategy, StageParams, TwoStageConfig};
pub use corpus::chapters::{
    chapter_prefix, pair_chapter_files, read_paragraphs, ChapterPair, ChapterPairing,
};
pub use corpus::jsonl::{write_jsonl_file, write_pairs};
pub use error::AlignmentError;
pub use pipeline::builder::BitextAlignerBuilder;
pub use pipeline::defaults::{GreedyWindowAligner, UnicodeSentenceSegmenter};
pub use pipeline::oracle::{cosine_similarity, CosineOracle};
pub use pipeline::runtime::{BitextAligner, ChapterAlignment};
pub use pipeline::traits::{EmbeddingBackend, RuntimeKind, Segmenter, SimilarityOracle, UnitAligner};
pub use types::{
    AlignedPair, AlignmentRun, AlignmentStep, AlignmentType, Language, Script, StepAction,
    TextUnit,
};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AlignmentError;

/// How token states are reduced to one sentence vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolingStrategy {
    /// CLS state through the pooler dense layer and tanh (LaBSE).
    #[default]
    ClsPooler,
    Cls,
    Mean,
}

impl PoolingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClsPooler => "cls_pooler",
            Self::Cls => "cls",
            Self::Mean => "mean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub model_path: String,
    pub config_path: String,
    pub vocab_path: String,
    pub device: String,
    pub max_seq_len: usize,
    pub batch_size: usize,
    pub pooling: PoolingStrategy,
    /// Lowercase input before WordPiece; only for uncased vocabularies.
    pub lowercase: bool,
    /// Upper bound on single-unit vectors kept by the cosine oracle.
    pub cache_capacity: usize,
}

impl EncoderConfig {
    pub const DEFAULT_MAX_SEQ_LEN: usize = 256;
    pub const DEFAULT_BATCH_SIZE: usize = 32;
    pub const DEFAULT_CACHE_CAPACITY: usize = 16_384;

    /// Standard layout of an exported sentence encoder: `config.json`, `vocab.txt` and the
    /// weights file named by `model_filename`.
    pub fn from_model_dir(model_dir: &Path, model_filename: &str) -> Self {
        Self {
            model_path: model_dir.join(model_filename).to_string_lossy().into_owned(),
            config_path: model_dir.join("config.json").to_string_lossy().into_owned(),
            vocab_path: model_dir.join("vocab.txt").to_string_lossy().into_owned(),
            ..Self::default()
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            config_path: String::new(),
            vocab_path: String::new(),
            device: "cpu".to_string(),
            max_seq_len: Self::DEFAULT_MAX_SEQ_LEN,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            pooling: PoolingStrategy::default(),
            lowercase: false,
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Per-invocation knobs of the greedy aligner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageParams {
    pub threshold: f32,
    pub max_window: usize,
}

impl StageParams {
    /// Paragraph units are noisier and rarely merge more than three wide.
    pub const PARAGRAPH: Self = Self {
        threshold: 0.50,
        max_window: 3,
    };
    pub const SENTENCE: Self = Self {
        threshold: 0.65,
        max_window: 4,
    };

    pub fn new(threshold: f32, max_window: usize) -> Self {
        Self {
            threshold,
            max_window,
        }
    }

    pub fn validate(&self) -> Result<(), AlignmentError> {
        if self.max_window == 0 {
            return Err(AlignmentError::invalid_input(
                "max_window must be >= 1".to_string(),
            ));
        }
        if !self.threshold.is_finite() {
            return Err(AlignmentError::invalid_input(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TwoStageConfig {
    pub paragraph: StageParams,
    pub sentence: StageParams,
}

impl TwoStageConfig {
    pub fn validate(&self) -> Result<(), AlignmentError> {
        self.paragraph.validate()?;
        self.sentence.validate()
    }
}

impl Default for TwoStageConfig {
    fn default() -> Self {
        Self {
            paragraph: StageParams::PARAGRAPH,
            sentence: StageParams::SENTENCE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BertModelConfig {
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    pub vocab_size: usize,
    #[serde(default = "default_max_position_embeddings")]
    pub max_position_embeddings: usize,
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    #[serde(default = "default_eps")]
    pub layer_norm_eps: f64,
    #[serde(default)]
    pub pad_token_id: usize,
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,
}

fn default_max_position_embeddings() -> usize {
    512
}
fn default_type_vocab_size() -> usize {
    2
}
fn default_eps() -> f64 {
    1e-12
}
fn default_hidden_act() -> String {
    "gelu".to_string()
}

impl BertModelConfig {
    pub(crate) fn load(path: &Path) -> Result<Self, AlignmentError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| AlignmentError::io("read config.json", e))?;
        let cfg: Self =
            serde_json::from_str(&data).map_err(|e| AlignmentError::json("parse config.json", e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub(crate) fn validate(&self) -> Result<(), AlignmentError> {
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(AlignmentError::invalid_input(format!(
                "hidden_size {} is not divisible by num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        // Room for at least [CLS] and [SEP].
        if self.max_position_embeddings < 2 {
            return Err(AlignmentError::invalid_input(format!(
                "max_position_embeddings must be >= 2, got {}",
                self.max_position_embeddings
            )));
        }
        if !matches!(self.hidden_act.as_str(), "gelu" | "gelu_new" | "relu") {
            return Err(AlignmentError::invalid_input(format!(
                "unsupported hidden_act '{}'",
                self.hidden_act
            )));
        }
        Ok(())
    }

    pub(crate) fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

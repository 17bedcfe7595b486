use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;

use crate::config::{BertModelConfig, EncoderConfig, PoolingStrategy};
use crate::error::AlignmentError;
use crate::model::bert::{batch_tensors, BertSentenceEncoder};
use crate::model::wordpiece::WordPieceTokenizer;
use crate::pipeline::oracle::l2_normalize;
use crate::pipeline::traits::{EmbeddingBackend, RuntimeKind};

pub(crate) fn build_embedding_backend(
    runtime_kind: RuntimeKind,
    config: &EncoderConfig,
) -> Result<Box<dyn EmbeddingBackend>, AlignmentError> {
    if config.batch_size == 0 {
        return Err(AlignmentError::invalid_input("batch_size must be at least 1"));
    }
    let tokenizer = WordPieceTokenizer::load(Path::new(&config.vocab_path), config.lowercase)?;
    match runtime_kind {
        RuntimeKind::Candle => {
            let model_cfg = BertModelConfig::load(Path::new(&config.config_path))?;
            Ok(Box::new(CandleEmbeddingBackend::load(config, &model_cfg, tokenizer)?))
        }
        RuntimeKind::Onnx => build_onnx_embedding_backend(config, tokenizer),
    }
}

fn build_onnx_embedding_backend(
    config: &EncoderConfig,
    tokenizer: WordPieceTokenizer,
) -> Result<Box<dyn EmbeddingBackend>, AlignmentError> {
    #[cfg(feature = "onnx")]
    {
        Ok(Box::new(OnnxEmbeddingBackend::load(config, tokenizer)?))
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = (config, tokenizer);
        Err(AlignmentError::runtime(
            "build embedding backend",
            "ONNX runtime support is disabled; enable the `onnx` cargo feature",
        ))
    }
}

fn parse_candle_device(device: &str) -> Result<Device, AlignmentError> {
    let lower = device.to_ascii_lowercase();
    match lower.as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Device::new_cuda(0).map_err(|e| AlignmentError::runtime("CUDA init", e)),
        other => match other.strip_prefix("cuda:").map(str::parse::<usize>) {
            Some(Ok(ordinal)) => {
                Device::new_cuda(ordinal).map_err(|e| AlignmentError::runtime("CUDA init", e))
            }
            _ => Err(AlignmentError::invalid_input(format!(
                "unsupported device '{device}', expected 'cpu', 'cuda' or 'cuda:N'"
            ))),
        },
    }
}

pub(crate) struct CandleEmbeddingBackend {
    model: BertSentenceEncoder,
    tokenizer: WordPieceTokenizer,
    device: Device,
    batch_size: usize,
    max_seq_len: usize,
}

impl CandleEmbeddingBackend {
    fn load(
        config: &EncoderConfig,
        model_cfg: &BertModelConfig,
        tokenizer: WordPieceTokenizer,
    ) -> Result<Self, AlignmentError> {
        let device = parse_candle_device(&config.device)?;
        let model_data = std::fs::read(&config.model_path)
            .map_err(|e| AlignmentError::io("read safetensors", e))?;
        let vb = VarBuilder::from_buffered_safetensors(model_data, DType::F32, &device)
            .map_err(|e| AlignmentError::runtime("load safetensors", e))?;
        let backend = Self::from_var_builder(config, model_cfg, tokenizer, vb, device)?;

        tracing::info!(
            hidden_size = model_cfg.hidden_size,
            layers = model_cfg.num_hidden_layers,
            vocab = backend.tokenizer.vocab_len(),
            pooling = config.pooling.as_str(),
            max_seq_len = backend.max_seq_len,
            device = %backend.device_label(),
            "sentence encoder Candle runtime loaded"
        );
        Ok(backend)
    }

    pub(crate) fn from_var_builder(
        config: &EncoderConfig,
        model_cfg: &BertModelConfig,
        tokenizer: WordPieceTokenizer,
        vb: VarBuilder,
        device: Device,
    ) -> Result<Self, AlignmentError> {
        model_cfg.validate()?;
        let model = BertSentenceEncoder::load(model_cfg, config.pooling, vb)
            .map_err(|e| AlignmentError::runtime("build model", e))?;
        Ok(Self {
            model,
            tokenizer,
            device,
            batch_size: config.batch_size.max(1),
            max_seq_len: config
                .max_seq_len
                .min(model_cfg.max_position_embeddings)
                .max(2),
        })
    }
}

impl EmbeddingBackend for CandleEmbeddingBackend {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AlignmentError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let batch = self.tokenizer.encode_batch(chunk, self.max_seq_len);
            let (ids, mask) = batch_tensors(
                &batch.ids,
                &batch.attention_mask,
                batch.batch,
                batch.seq_len,
                &self.device,
            )
            .map_err(|e| AlignmentError::runtime("tensor creation", e))?;
            let pooled = self
                .model
                .forward(&ids, &mask)
                .map_err(|e| AlignmentError::runtime("forward pass", e))?;
            let rows = pooled
                .to_vec2::<f32>()
                .map_err(|e| AlignmentError::runtime("to_vec2", e))?;
            for mut row in rows {
                l2_normalize(&mut row);
                vectors.push(row);
            }
        }
        tracing::trace!(texts = texts.len(), "encoded batch");
        Ok(vectors)
    }

    fn device_label(&self) -> String {
        match self.device {
            Device::Cpu => "cpu".to_string(),
            Device::Cuda(_) => "cuda".to_string(),
            Device::Metal(_) => "metal".to_string(),
        }
    }
}

/// Reduces a flat ONNX output to one L2-normalized vector per row.
///
/// A `(batch, hidden)` output is taken as already pooled. A `(batch, seq, hidden)` output is
/// pooled here: `Mean` over unmasked positions, otherwise the first (CLS) position.
#[cfg_attr(not(feature = "onnx"), allow(dead_code))]
fn pool_onnx_output(
    dims: &[i64],
    data: &[f32],
    attention_mask: &[u32],
    pooling: PoolingStrategy,
) -> Result<Vec<Vec<f32>>, AlignmentError> {
    let dims: Vec<usize> = dims
        .iter()
        .map(|&d| usize::try_from(d))
        .collect::<Result<_, _>>()
        .map_err(|_| AlignmentError::runtime("onnx output", "negative dimension"))?;
    if dims.last() == Some(&0) || dims.iter().product::<usize>() != data.len() {
        return Err(AlignmentError::runtime(
            "onnx output",
            format!("shape {dims:?} does not match {} values", data.len()),
        ));
    }
    let mut rows = match dims.as_slice() {
        [_, hidden] => data.chunks(*hidden).map(<[f32]>::to_vec).collect::<Vec<_>>(),
        [batch, seq, hidden] => {
            if attention_mask.len() != batch * seq {
                return Err(AlignmentError::runtime(
                    "onnx output",
                    "token states do not match the input batch",
                ));
            }
            (0..*batch)
                .map(|b| {
                    let states = &data[b * seq * hidden..(b + 1) * seq * hidden];
                    let mask = &attention_mask[b * seq..(b + 1) * seq];
                    match pooling {
                        PoolingStrategy::Mean => {
                            let mut acc = vec![0.0f32; *hidden];
                            let mut count = 0usize;
                            for (t, &m) in mask.iter().enumerate() {
                                if m == 0 {
                                    continue;
                                }
                                count += 1;
                                for (a, v) in acc.iter_mut().zip(&states[t * hidden..(t + 1) * hidden]) {
                                    *a += v;
                                }
                            }
                            let denom = count.max(1) as f32;
                            acc.iter_mut().for_each(|a| *a /= denom);
                            acc
                        }
                        PoolingStrategy::Cls | PoolingStrategy::ClsPooler => states[..*hidden].to_vec(),
                    }
                })
                .collect()
        }
        _ => {
            return Err(AlignmentError::runtime(
                "onnx output",
                format!("expected rank 2 or 3 output, got shape {dims:?}"),
            ))
        }
    };
    rows.iter_mut().for_each(|row| l2_normalize(row));
    Ok(rows)
}

#[cfg(feature = "onnx")]
struct OnnxEmbeddingBackend {
    session: std::sync::Mutex<ort::session::Session>,
    tokenizer: WordPieceTokenizer,
    device_label: String,
    batch_size: usize,
    max_seq_len: usize,
    pooling: PoolingStrategy,
}

#[cfg(feature = "onnx")]
impl OnnxEmbeddingBackend {
    fn load(config: &EncoderConfig, tokenizer: WordPieceTokenizer) -> Result<Self, AlignmentError> {
        let execution_providers = onnx_execution_providers(config.device.as_str())?;
        let session = ort::session::Session::builder()
            .map_err(|e| AlignmentError::runtime("onnx session builder", e))?
            .with_execution_providers(execution_providers)
            .map_err(|e| AlignmentError::runtime("onnx execution providers", e))?
            .commit_from_file(Path::new(&config.model_path))
            .map_err(|e| AlignmentError::runtime("onnx model load", e))?;

        if config.pooling == PoolingStrategy::ClsPooler {
            tracing::warn!(
                "ONNX token-state outputs are pooled from CLS without the pooler layer; export the pooled output to keep cls_pooler semantics"
            );
        }
        tracing::info!(
            inputs = session.inputs().len(),
            outputs = session.outputs().len(),
            model_path = %config.model_path,
            device = %config.device,
            "sentence encoder ONNX runtime loaded"
        );

        let device_label = parse_onnx_device(config.device.as_str())?;
        Ok(Self {
            session: std::sync::Mutex::new(session),
            tokenizer,
            device_label: device_label.to_string(),
            batch_size: config.batch_size.max(1),
            max_seq_len: config.max_seq_len.max(2),
            pooling: config.pooling,
        })
    }

    fn run_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AlignmentError> {
        let batch = self.tokenizer.encode_batch(texts, self.max_seq_len);
        let shape = [batch.batch, batch.seq_len];
        let ids: Vec<i64> = batch.ids.iter().map(|&id| i64::from(id)).collect();
        let mask: Vec<i64> = batch.attention_mask.iter().map(|&m| i64::from(m)).collect();
        let token_types = vec![0i64; ids.len()];

        let ids_input = ort::value::TensorRef::from_array_view((shape, ids.as_slice()))
            .map_err(|e| AlignmentError::runtime("onnx input tensor", e))?;
        let mask_input = ort::value::TensorRef::from_array_view((shape, mask.as_slice()))
            .map_err(|e| AlignmentError::runtime("onnx input tensor", e))?;
        let type_input = ort::value::TensorRef::from_array_view((shape, token_types.as_slice()))
            .map_err(|e| AlignmentError::runtime("onnx input tensor", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AlignmentError::runtime("onnx session lock", "session mutex poisoned"))?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_input,
                "attention_mask" => mask_input,
                "token_type_ids" => type_input,
            ])
            .map_err(|e| AlignmentError::runtime("onnx forward pass", e))?;
        if outputs.len() == 0 {
            return Err(AlignmentError::runtime(
                "onnx forward pass",
                "model produced no outputs",
            ));
        }
        let (dims, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AlignmentError::runtime("onnx extract embeddings", e))?;
        let dims: Vec<i64> = dims.iter().copied().collect();
        pool_onnx_output(&dims, data, &batch.attention_mask, self.pooling)
    }
}

#[cfg(feature = "onnx")]
impl EmbeddingBackend for OnnxEmbeddingBackend {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AlignmentError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            vectors.extend(self.run_batch(chunk)?);
        }
        Ok(vectors)
    }

    fn device_label(&self) -> String {
        self.device_label.clone()
    }
}

#[cfg(feature = "onnx")]
fn onnx_execution_providers(
    device: &str,
) -> Result<Vec<ort::ep::ExecutionProviderDispatch>, AlignmentError> {
    match parse_onnx_device(device)? {
        "cpu" => Ok(vec![ort::ep::CPU::default().build()]),
        "cuda" => Ok(vec![
            ort::ep::CUDA::default()
                .with_device_id(0)
                .build()
                .error_on_failure(),
            ort::ep::CPU::default().build(),
        ]),
        _ => Err(AlignmentError::invalid_input(format!(
            "unsupported ONNX device '{device}', expected 'cpu' or 'cuda'"
        ))),
    }
}

#[cfg(feature = "onnx")]
fn parse_onnx_device(device: &str) -> Result<&'static str, AlignmentError> {
    if device.eq_ignore_ascii_case("cpu") {
        Ok("cpu")
    } else if device.eq_ignore_ascii_case("cuda") {
        Ok("cuda")
    } else {
        Err(AlignmentError::invalid_input(format!(
            "unsupported ONNX device '{device}', expected 'cpu' or 'cuda'"
        )))
    }
}

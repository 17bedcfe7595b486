use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Linear, VarBuilder};

use crate::config::{BertModelConfig, PoolingStrategy};
use crate::model::embeddings::BertEmbeddings;
use crate::model::encoder::Encoder;

/// BERT encoder reduced to one vector per input sequence.
pub(crate) struct BertSentenceEncoder {
    embeddings: BertEmbeddings,
    encoder: Encoder,
    pooler: Option<Linear>,
    pooling: PoolingStrategy,
}

impl BertSentenceEncoder {
    pub(crate) fn load(
        cfg: &BertModelConfig,
        pooling: PoolingStrategy,
        vb: VarBuilder,
    ) -> candle_core::Result<Self> {
        // Checkpoints exported from a task head nest the backbone under `bert.`.
        let vb = if vb.contains_tensor("bert.embeddings.word_embeddings.weight") {
            vb.pp("bert")
        } else {
            vb
        };
        let pooler = match pooling {
            PoolingStrategy::ClsPooler => Some(candle_nn::linear(
                cfg.hidden_size,
                cfg.hidden_size,
                vb.pp("pooler").pp("dense"),
            )?),
            PoolingStrategy::Cls | PoolingStrategy::Mean => None,
        };
        Ok(Self {
            embeddings: BertEmbeddings::load(cfg, vb.pp("embeddings"))?,
            encoder: Encoder::load(cfg, vb.pp("encoder"))?,
            pooler,
            pooling,
        })
    }

    /// `input_ids` is `(batch, seq)` u32, `attention_mask` the matching f32 mask.
    /// Returns `(batch, hidden)`, not normalized.
    pub(crate) fn forward(
        &self,
        input_ids: &Tensor,
        attention_mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let h = self.embeddings.forward(input_ids)?;
        let h = self.encoder.forward(&h, attention_mask)?;
        match (self.pooling, &self.pooler) {
            (PoolingStrategy::ClsPooler, Some(pooler)) => {
                pooler.forward(&h.narrow(1, 0, 1)?.squeeze(1)?)?.tanh()
            }
            (PoolingStrategy::Mean, _) => mean_pool(&h, attention_mask),
            _ => h.narrow(1, 0, 1)?.squeeze(1),
        }
    }
}

fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    summed.broadcast_div(&counts)
}

/// Builds `(input_ids, attention_mask)` tensors from a padded row-major batch.
pub(crate) fn batch_tensors(
    ids: &[u32],
    mask: &[u32],
    batch: usize,
    seq_len: usize,
    device: &Device,
) -> candle_core::Result<(Tensor, Tensor)> {
    let input_ids = Tensor::from_slice(ids, (batch, seq_len), device)?;
    let attention_mask =
        Tensor::from_slice(mask, (batch, seq_len), device)?.to_dtype(DType::F32)?;
    Ok((input_ids, attention_mask))
}

use candle_core::{Module, Tensor, D};
use candle_nn::{Linear, VarBuilder};

use crate::config::BertModelConfig;
use crate::model::layers::{layer_norm, Activation, LayerNorm};

struct SelfAttention {
    q: Linear,
    k: Linear,
    v: Linear,
    out: Linear,
    out_norm: LayerNorm,
    num_heads: usize,
    head_dim: usize,
    scale: f64,
}

impl SelfAttention {
    fn load(cfg: &BertModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let hd = cfg.head_dim();
        let attn = vb.pp("self");
        let output = vb.pp("output");
        Ok(Self {
            q: candle_nn::linear(cfg.hidden_size, cfg.hidden_size, attn.pp("query"))?,
            k: candle_nn::linear(cfg.hidden_size, cfg.hidden_size, attn.pp("key"))?,
            v: candle_nn::linear(cfg.hidden_size, cfg.hidden_size, attn.pp("value"))?,
            out: candle_nn::linear(cfg.hidden_size, cfg.hidden_size, output.pp("dense"))?,
            out_norm: layer_norm(cfg.hidden_size, cfg.layer_norm_eps, output.pp("LayerNorm"))?,
            num_heads: cfg.num_attention_heads,
            head_dim: hd,
            scale: (hd as f64).powf(-0.5),
        })
    }

    /// `mask_bias` is `(batch, 1, 1, seq)`: 0 for real tokens, a large negative for padding.
    fn forward(&self, xs: &Tensor, mask_bias: &Tensor) -> candle_core::Result<Tensor> {
        let (b, t, _) = xs.dims3()?;
        let reshape = |x: Tensor| {
            x.reshape((b, t, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };

        let q = reshape((self.q.forward(xs)? * self.scale)?)?;
        let k = reshape(self.k.forward(xs)?)?;
        let v = reshape(self.v.forward(xs)?)?;

        let scores = q
            .matmul(&k.transpose(2, 3)?.contiguous()?)?
            .broadcast_add(mask_bias)?;
        let attn = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let ctx = attn.matmul(&v)?.transpose(1, 2)?.contiguous()?.reshape((
            b,
            t,
            self.num_heads * self.head_dim,
        ))?;
        self.out_norm.forward(&(xs + self.out.forward(&ctx)?)?)
    }
}

struct FeedForward {
    up: Linear,
    down: Linear,
    norm: LayerNorm,
    activation: Activation,
}

impl FeedForward {
    fn load(cfg: &BertModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let output = vb.pp("output");
        Ok(Self {
            up: candle_nn::linear(
                cfg.hidden_size,
                cfg.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            down: candle_nn::linear(cfg.intermediate_size, cfg.hidden_size, output.pp("dense"))?,
            norm: layer_norm(cfg.hidden_size, cfg.layer_norm_eps, output.pp("LayerNorm"))?,
            activation: Activation::from_config(&cfg.hidden_act),
        })
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let h = self.activation.forward(&self.up.forward(xs)?)?;
        self.norm.forward(&(xs + self.down.forward(&h)?)?)
    }
}

// Post-norm block:
//   h = ln1(x + attn(x))
//   y = ln2(h + ff(h))
struct EncoderLayer {
    attn: SelfAttention,
    ff: FeedForward,
}

impl EncoderLayer {
    fn load(cfg: &BertModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        Ok(Self {
            attn: SelfAttention::load(cfg, vb.pp("attention"))?,
            ff: FeedForward::load(cfg, vb.clone())?,
        })
    }

    fn forward(&self, xs: &Tensor, mask_bias: &Tensor) -> candle_core::Result<Tensor> {
        let h = self.attn.forward(xs, mask_bias)?;
        self.ff.forward(&h)
    }
}

pub(crate) struct Encoder {
    layers: Vec<EncoderLayer>,
}

impl Encoder {
    pub(crate) fn load(cfg: &BertModelConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let mut layers = Vec::with_capacity(cfg.num_hidden_layers);
        for i in 0..cfg.num_hidden_layers {
            layers.push(EncoderLayer::load(cfg, vb.pp(format!("layer.{i}")))?);
        }
        Ok(Self { layers })
    }

    /// `attention_mask` is `(batch, seq)` f32 with 1 for real tokens and 0 for padding.
    pub(crate) fn forward(
        &self,
        xs: &Tensor,
        attention_mask: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let (b, t) = attention_mask.dims2()?;
        let mask_bias = attention_mask
            .affine(10_000.0, -10_000.0)?
            .reshape((b, 1, 1, t))?
            .to_dtype(xs.dtype())?;
        let mut h = xs.clone();
        for layer in &self.layers {
            h = layer.forward(&h, &mask_bias)?;
        }
        Ok(h)
    }
}

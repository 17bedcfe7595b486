use candle_core::{Tensor, D};
use candle_nn::VarBuilder;

pub(crate) struct LayerNorm {
    weight: Tensor,
    bias: Tensor,
    eps: f64,
}

impl LayerNorm {
    /// Accepts both `weight`/`bias` and the older TF-converted `gamma`/`beta` names.
    pub(crate) fn load(size: usize, eps: f64, vb: VarBuilder) -> candle_core::Result<Self> {
        let (weight, bias) = if vb.contains_tensor("gamma") {
            (vb.get(size, "gamma")?, vb.get(size, "beta")?)
        } else {
            (vb.get(size, "weight")?, vb.get(size, "bias")?)
        };
        Ok(Self { weight, bias, eps })
    }

    pub(crate) fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let hidden = self.weight.dim(0)? as f64;
        let mean = (x.sum_keepdim(D::Minus1)? / hidden)?;
        let centered = x.broadcast_sub(&mean)?;
        let var = (centered.sqr()?.sum_keepdim(D::Minus1)? / hidden)?;
        let normed = centered.broadcast_div(&(var + self.eps)?.sqrt()?)?;
        normed.broadcast_mul(&self.weight)?.broadcast_add(&self.bias)
    }
}

pub(crate) fn layer_norm(size: usize, eps: f64, vb: VarBuilder) -> candle_core::Result<LayerNorm> {
    LayerNorm::load(size, eps, vb)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activation {
    /// Exact erf GELU, BERT's `gelu`.
    GeluErf,
    /// Tanh approximation, `gelu_new`.
    GeluTanh,
    Relu,
}

impl Activation {
    pub(crate) fn from_config(name: &str) -> Self {
        match name {
            "gelu_new" => Self::GeluTanh,
            "relu" => Self::Relu,
            _ => Self::GeluErf,
        }
    }

    pub(crate) fn forward(self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::GeluErf => xs.gelu_erf(),
            Self::GeluTanh => xs.gelu(),
            Self::Relu => xs.relu(),
        }
    }
}

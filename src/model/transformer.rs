//! Quantized decoder forward pass exposing hidden states.
//!
//! Loads llama-family GGUF checkpoints (`llama`, `qwen2`) and returns the token
//! embedding output together with the final normalised hidden states, instead of
//! logits.

use std::sync::Arc;

use candle_core::quantized::{QMatMul, gguf_file};
use candle_core::{Device, Module, Result, Tensor};
use candle_nn::RmsNorm;
use candle_nn::rotary_emb::{rope, rope_i};

/// How rotary embeddings pair up the channels of a head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RopeStyle {
    /// Adjacent channel pairs (GGUF llama layout).
    Interleaved,
    /// First half paired with second half (qwen2).
    Halves,
}

/// Decoder configuration read from GGUF metadata.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub architecture: String,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub num_attention_heads: usize,
    pub num_kv_heads: usize,
    pub head_dim: usize,
    pub rms_norm_eps: f64,
    pub rope_theta: f64,
    pub rope_style: RopeStyle,
    pub max_seq_len: usize,
}

impl DecoderConfig {
    /// Reads configuration keys under the file's `general.architecture` prefix.
    pub fn from_gguf(content: &gguf_file::Content) -> Result<Self> {
        let architecture = content
            .metadata
            .get("general.architecture")
            .and_then(|v| v.to_string().ok())
            .cloned()
            .unwrap_or_else(|| "llama".to_string());

        let get_u64 = |name: &str, default: u64| -> u64 {
            content
                .metadata
                .get(&format!("{architecture}.{name}"))
                .and_then(|v| v.to_u64().ok())
                .unwrap_or(default)
        };
        let get_f64 = |name: &str, default: f64| -> f64 {
            content
                .metadata
                .get(&format!("{architecture}.{name}"))
                .and_then(|v| v.to_f64().ok())
                .unwrap_or(default)
        };

        let hidden_size = get_u64("embedding_length", 2048) as usize;
        let num_layers = get_u64("block_count", 16) as usize;
        let num_attention_heads = get_u64("attention.head_count", 32) as usize;
        let num_kv_heads = get_u64("attention.head_count_kv", num_attention_heads as u64) as usize;
        let rms_norm_eps = get_f64("attention.layer_norm_rms_epsilon", 1e-5);
        let rope_theta = get_f64("rope.freq_base", 10_000.0);
        let max_seq_len = get_u64("context_length", 4096) as usize;

        if num_attention_heads == 0 || num_kv_heads == 0 || num_attention_heads % num_kv_heads != 0
        {
            candle_core::bail!(
                "unsupported head layout: {num_attention_heads} heads, {num_kv_heads} kv heads"
            );
        }

        let head_dim = get_u64(
            "attention.key_length",
            (hidden_size / num_attention_heads) as u64,
        ) as usize;

        let rope_style = match architecture.as_str() {
            "qwen2" => RopeStyle::Halves,
            _ => RopeStyle::Interleaved,
        };

        Ok(Self {
            architecture,
            hidden_size,
            num_layers,
            num_attention_heads,
            num_kv_heads,
            head_dim,
            rms_norm_eps,
            rope_theta,
            rope_style,
            max_seq_len,
        })
    }
}

/// Precomputed rotary tables, `[positions, head_dim / 2]`.
pub(crate) struct RotaryEmbedding {
    cos: Tensor,
    sin: Tensor,
    style: RopeStyle,
}

impl RotaryEmbedding {
    pub(crate) fn new(config: &DecoderConfig, positions: usize, device: &Device) -> Result<Self> {
        let half_dim = config.head_dim / 2;
        let inv_freq: Vec<f32> = (0..half_dim)
            .map(|i| 1.0 / (config.rope_theta as f32).powf((2 * i) as f32 / config.head_dim as f32))
            .collect();
        let inv_freq = Tensor::new(inv_freq, device)?;

        let positions: Vec<f32> = (0..positions).map(|p| p as f32).collect();
        let positions = Tensor::new(positions, device)?;

        let freqs = positions.unsqueeze(1)?.matmul(&inv_freq.unsqueeze(0)?)?;

        Ok(Self {
            cos: freqs.cos()?,
            sin: freqs.sin()?,
            style: config.rope_style,
        })
    }

    pub(crate) fn positions(&self) -> usize {
        self.cos.dims()[0]
    }

    /// Rotates `x` of shape `[batch, heads, seq, head_dim]`.
    pub(crate) fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let (_batch, _heads, seq_len, _head_dim) = x.dims4()?;
        let cos = self.cos.narrow(0, 0, seq_len)?;
        let sin = self.sin.narrow(0, 0, seq_len)?;
        let x = x.contiguous()?;

        match self.style {
            RopeStyle::Interleaved => rope_i(&x, &cos, &sin),
            RopeStyle::Halves => rope(&x, &cos, &sin),
        }
    }
}

struct DecoderLayer {
    attn_q: QMatMul,
    attn_k: QMatMul,
    attn_v: QMatMul,
    attn_o: QMatMul,
    attn_q_bias: Option<Tensor>,
    attn_k_bias: Option<Tensor>,
    attn_v_bias: Option<Tensor>,
    attn_norm: RmsNorm,
    ffn_norm: RmsNorm,
    ffn_gate: QMatMul,
    ffn_up: QMatMul,
    ffn_down: QMatMul,
    num_heads: usize,
    num_kv_heads: usize,
    head_dim: usize,
}

struct TensorSource<'a> {
    content: &'a gguf_file::Content,
    file: &'a mut std::fs::File,
    device: &'a Device,
}

impl TensorSource<'_> {
    fn qmatmul(&mut self, name: &str) -> Result<QMatMul> {
        let qtensor = self.content.tensor(&mut *self.file, name, self.device)?;
        QMatMul::from_arc(Arc::new(qtensor))
    }

    fn dense(&mut self, name: &str) -> Result<Tensor> {
        self.content
            .tensor(&mut *self.file, name, self.device)?
            .dequantize(self.device)
    }

    /// Biases are optional (qwen2 carries them, llama does not). A bias that is
    /// listed but fails to load is an error.
    fn optional_dense(&mut self, name: &str) -> Result<Option<Tensor>> {
        if !self.content.tensor_infos.contains_key(name) {
            return Ok(None);
        }
        self.dense(name).map(Some)
    }

    fn rms_norm(&mut self, name: &str, eps: f64) -> Result<RmsNorm> {
        Ok(RmsNorm::new(self.dense(name)?, eps))
    }
}

impl DecoderLayer {
    fn load(source: &mut TensorSource<'_>, config: &DecoderConfig, layer_idx: usize) -> Result<Self> {
        let prefix = format!("blk.{layer_idx}");
        let eps = config.rms_norm_eps;

        Ok(Self {
            attn_q: source.qmatmul(&format!("{prefix}.attn_q.weight"))?,
            attn_k: source.qmatmul(&format!("{prefix}.attn_k.weight"))?,
            attn_v: source.qmatmul(&format!("{prefix}.attn_v.weight"))?,
            attn_o: source.qmatmul(&format!("{prefix}.attn_output.weight"))?,
            attn_q_bias: source.optional_dense(&format!("{prefix}.attn_q.bias"))?,
            attn_k_bias: source.optional_dense(&format!("{prefix}.attn_k.bias"))?,
            attn_v_bias: source.optional_dense(&format!("{prefix}.attn_v.bias"))?,
            attn_norm: source.rms_norm(&format!("{prefix}.attn_norm.weight"), eps)?,
            ffn_norm: source.rms_norm(&format!("{prefix}.ffn_norm.weight"), eps)?,
            ffn_gate: source.qmatmul(&format!("{prefix}.ffn_gate.weight"))?,
            ffn_up: source.qmatmul(&format!("{prefix}.ffn_up.weight"))?,
            ffn_down: source.qmatmul(&format!("{prefix}.ffn_down.weight"))?,
            num_heads: config.num_attention_heads,
            num_kv_heads: config.num_kv_heads,
            head_dim: config.head_dim,
        })
    }

    fn forward(&self, x: &Tensor, mask: &Tensor, rope: &RotaryEmbedding) -> Result<Tensor> {
        let residual = x;
        let h = self.attn_norm.forward(x)?;
        let h = self.self_attention(&h, mask, rope)?;
        let x = (residual + h)?;

        let residual = &x;
        let h = self.ffn_norm.forward(&x)?;
        let gate = self.ffn_gate.forward(&h)?;
        let up = self.ffn_up.forward(&h)?;
        let h = (candle_nn::ops::silu(&gate)? * up)?;
        let h = self.ffn_down.forward(&h)?;

        residual + h
    }

    fn self_attention(&self, x: &Tensor, mask: &Tensor, rope: &RotaryEmbedding) -> Result<Tensor> {
        let (batch, seq_len, _hidden) = x.dims3()?;

        let q = with_bias(self.attn_q.forward(x)?, self.attn_q_bias.as_ref())?;
        let k = with_bias(self.attn_k.forward(x)?, self.attn_k_bias.as_ref())?;
        let v = with_bias(self.attn_v.forward(x)?, self.attn_v_bias.as_ref())?;

        let q = q
            .reshape((batch, seq_len, self.num_heads, self.head_dim))?
            .transpose(1, 2)?;
        let k = k
            .reshape((batch, seq_len, self.num_kv_heads, self.head_dim))?
            .transpose(1, 2)?;
        let v = v
            .reshape((batch, seq_len, self.num_kv_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;

        let q = rope.apply(&q)?;
        let k = rope.apply(&k)?;

        let k = self.repeat_kv(k)?;
        let v = self.repeat_kv(v)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let attn = (q.matmul(&k.t()?)? * scale)?;
        let attn = attn.broadcast_add(mask)?;
        let attn = candle_nn::ops::softmax_last_dim(&attn)?;
        let out = attn.matmul(&v)?;

        let out = out
            .transpose(1, 2)?
            .reshape((batch, seq_len, self.num_heads * self.head_dim))?;

        self.attn_o.forward(&out)
    }

    fn repeat_kv(&self, x: Tensor) -> Result<Tensor> {
        let n_rep = self.num_heads / self.num_kv_heads;
        if n_rep == 1 {
            return Ok(x);
        }
        let (batch, num_kv_heads, seq_len, head_dim) = x.dims4()?;
        x.unsqueeze(2)?
            .expand((batch, num_kv_heads, n_rep, seq_len, head_dim))?
            .reshape((batch, num_kv_heads * n_rep, seq_len, head_dim))
    }
}

fn with_bias(x: Tensor, bias: Option<&Tensor>) -> Result<Tensor> {
    match bias {
        Some(bias) => x.broadcast_add(bias),
        None => Ok(x),
    }
}

/// Quantized decoder returning hidden states rather than logits.
pub struct DecoderForHiddenStates {
    tok_embeddings: Tensor,
    layers: Vec<DecoderLayer>,
    final_norm: RmsNorm,
    rope: RotaryEmbedding,
    config: DecoderConfig,
    device: Device,
}

impl DecoderForHiddenStates {
    /// Loads the decoder from GGUF, sizing rotary tables for `max_seq_len` tokens.
    pub fn from_gguf(
        content: gguf_file::Content,
        file: &mut std::fs::File,
        device: &Device,
        max_seq_len: usize,
    ) -> Result<Self> {
        let config = DecoderConfig::from_gguf(&content)?;
        let mut source = TensorSource {
            content: &content,
            file,
            device,
        };

        let tok_embeddings = source.dense("token_embd.weight")?;

        let mut layers = Vec::with_capacity(config.num_layers);
        for layer_idx in 0..config.num_layers {
            layers.push(DecoderLayer::load(&mut source, &config, layer_idx)?);
        }

        // The output projection is never loaded: only hidden states are needed.
        let final_norm = source.rms_norm("output_norm.weight", config.rms_norm_eps)?;

        let rope = RotaryEmbedding::new(&config, max_seq_len.min(config.max_seq_len), device)?;

        Ok(Self {
            tok_embeddings,
            layers,
            final_norm,
            rope,
            config,
            device: device.clone(),
        })
    }

    /// Runs the decoder over `input_ids` (`[batch, seq]`).
    ///
    /// Returns `(embedding_output, final_hidden)`, both `[batch, seq, hidden]`.
    /// `final_hidden` has the final norm applied, matching the last entry of a
    /// conventional hidden-states list.
    pub fn forward_hidden_pair(&self, input_ids: &Tensor) -> Result<(Tensor, Tensor)> {
        let (batch, seq_len) = input_ids.dims2()?;
        if seq_len > self.rope.positions() {
            candle_core::bail!(
                "sequence of {seq_len} tokens exceeds the {} supported positions",
                self.rope.positions()
            );
        }

        let flat_ids = input_ids.flatten_all()?;
        let embeddings = self
            .tok_embeddings
            .index_select(&flat_ids, 0)?
            .reshape((batch, seq_len, self.config.hidden_size))?;

        let mask = causal_mask(seq_len, &self.device)?;

        let mut hidden = embeddings.clone();
        for layer in &self.layers {
            hidden = layer.forward(&hidden, &mask, &self.rope)?;
        }

        let last = self.final_norm.forward(&hidden)?;
        Ok((embeddings, last))
    }

    /// Largest sequence length [`forward_hidden_pair`](Self::forward_hidden_pair) accepts.
    pub fn max_positions(&self) -> usize {
        self.rope.positions()
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

/// `[1, 1, seq, seq]` mask: 0 where attention is allowed, -inf above the diagonal.
pub(crate) fn causal_mask(seq_len: usize, device: &Device) -> Result<Tensor> {
    let mask: Vec<f32> = (0..seq_len)
        .flat_map(|i| (0..seq_len).map(move |j| if j <= i { 0.0 } else { f32::NEG_INFINITY }))
        .collect();

    Tensor::from_vec(mask, (1, 1, seq_len, seq_len), device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(style: RopeStyle) -> DecoderConfig {
        DecoderConfig {
            architecture: "llama".to_string(),
            hidden_size: 8,
            num_layers: 1,
            num_attention_heads: 2,
            num_kv_heads: 1,
            head_dim: 4,
            rms_norm_eps: 1e-5,
            rope_theta: 10_000.0,
            rope_style: style,
            max_seq_len: 16,
        }
    }

    #[test]
    fn test_causal_mask_shape_and_values() {
        let mask = causal_mask(3, &Device::Cpu).unwrap();
        assert_eq!(mask.dims(), &[1, 1, 3, 3]);

        let values: Vec<Vec<f32>> = mask.squeeze(0).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
        assert_eq!(values[0][0], 0.0);
        assert!(values[0][1].is_infinite());
        assert!(values[0][2].is_infinite());
        assert_eq!(values[2], vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rotary_tables_are_half_head_dim() {
        let rope = RotaryEmbedding::new(&config(RopeStyle::Interleaved), 10, &Device::Cpu).unwrap();
        assert_eq!(rope.cos.dims(), &[10, 2]);
        assert_eq!(rope.sin.dims(), &[10, 2]);
        assert_eq!(rope.positions(), 10);
    }

    #[test]
    fn test_rope_leaves_position_zero_unchanged() {
        for style in [RopeStyle::Interleaved, RopeStyle::Halves] {
            let rope = RotaryEmbedding::new(&config(style), 4, &Device::Cpu).unwrap();
            let x = Tensor::arange(0f32, 8f32, &Device::Cpu)
                .unwrap()
                .reshape((1, 2, 1, 4))
                .unwrap();

            let rotated = rope.apply(&x).unwrap();

            let before: Vec<f32> = x.flatten_all().unwrap().to_vec1().unwrap();
            let after: Vec<f32> = rotated.flatten_all().unwrap().to_vec1().unwrap();
            for (a, b) in before.iter().zip(after.iter()) {
                assert!((a - b).abs() < 1e-6, "{style:?}: {a} != {b}");
            }
        }
    }

    #[test]
    fn test_rope_preserves_norm() {
        let rope = RotaryEmbedding::new(&config(RopeStyle::Halves), 4, &Device::Cpu).unwrap();
        let x = Tensor::ones((1, 1, 3, 4), candle_core::DType::F32, &Device::Cpu).unwrap();

        let rotated = rope.apply(&x).unwrap();
        let norms: Vec<f32> = rotated
            .sqr()
            .unwrap()
            .sum(3)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();

        for norm in norms {
            assert!((norm - 4.0).abs() < 1e-4);
        }
    }

    fn write_bias_gguf(path: &std::path::Path) -> gguf_file::Content {
        use candle_core::quantized::{GgmlDType, QTensor};

        let bias = Tensor::new(&[0.5f32, -0.5, 1.0, 2.0], &Device::Cpu).unwrap();
        let qbias = QTensor::quantize(&bias, GgmlDType::F32).unwrap();
        let mut file = std::fs::File::create(path).unwrap();
        gguf_file::write(&mut file, &[], &[("blk.0.attn_q.bias", &qbias)]).unwrap();
        drop(file);

        let mut file = std::fs::File::open(path).unwrap();
        gguf_file::Content::read(&mut file).unwrap()
    }

    #[test]
    fn test_optional_dense_absent_and_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bias.gguf");
        let content = write_bias_gguf(&path);
        let mut file = std::fs::File::open(&path).unwrap();
        let mut source = TensorSource {
            content: &content,
            file: &mut file,
            device: &Device::Cpu,
        };

        assert!(source.optional_dense("blk.0.attn_k.bias").unwrap().is_none());

        let bias = source.optional_dense("blk.0.attn_q.bias").unwrap().unwrap();
        assert_eq!(bias.to_vec1::<f32>().unwrap(), vec![0.5, -0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_optional_dense_propagates_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bias.gguf");
        let content = write_bias_gguf(&path);

        // Listed in the header, but the tensor data is gone.
        let truncated = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        truncated.set_len(content.tensor_data_offset).unwrap();
        drop(truncated);

        let mut file = std::fs::File::open(&path).unwrap();
        let mut source = TensorSource {
            content: &content,
            file: &mut file,
            device: &Device::Cpu,
        };

        assert!(source.optional_dense("blk.0.attn_q.bias").is_err());
    }
}

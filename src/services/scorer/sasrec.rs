//! Self-attentive sequence model (SASRec-style) inference.
//!
//! The encoder sees the whole padded window at once (no causal mask) and the query
//! is the encoder output at the most recent position. Candidates are scored by
//! dot product against the item embedding table, which doubles as the output layer.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tensor::{dot, gelu, softmax, LayerNorm, Linear, Matrix};
use super::ScorerError;
use crate::models::catalog::PADDING_INDEX;

/// Shape of a freshly initialized model
#[derive(Debug, Clone, Copy)]
pub struct SasRecShape {
    pub num_items: usize,
    pub embedding_dim: usize,
    pub num_heads: usize,
    pub num_layers: usize,
    pub max_seq_len: usize,
}

/// One post-norm transformer encoder layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderLayer {
    pub query: Linear,
    pub key: Linear,
    pub value: Linear,
    pub output: Linear,
    pub attention_norm: LayerNorm,
    pub feed_forward_in: Linear,
    pub feed_forward_out: Linear,
    pub feed_forward_norm: LayerNorm,
}

impl EncoderLayer {
    fn random<R: Rng>(dim: usize, rng: &mut R) -> Self {
        Self {
            query: Linear::xavier(dim, dim, rng),
            key: Linear::xavier(dim, dim, rng),
            value: Linear::xavier(dim, dim, rng),
            output: Linear::xavier(dim, dim, rng),
            attention_norm: LayerNorm::identity(dim),
            feed_forward_in: Linear::xavier(dim, dim * 4, rng),
            feed_forward_out: Linear::xavier(dim * 4, dim, rng),
            feed_forward_norm: LayerNorm::identity(dim),
        }
    }

    fn check(&self, dim: usize) -> Result<(), String> {
        let square = [&self.query, &self.key, &self.value, &self.output];
        if square
            .iter()
            .any(|l| !l.is_consistent() || l.input_dim() != dim || l.output_dim() != dim)
        {
            return Err("attention projection has wrong shape".to_string());
        }
        if !self.feed_forward_in.is_consistent()
            || !self.feed_forward_out.is_consistent()
            || self.feed_forward_in.input_dim() != dim
            || self.feed_forward_out.output_dim() != dim
            || self.feed_forward_in.output_dim() != self.feed_forward_out.input_dim()
        {
            return Err("feed-forward block has wrong shape".to_string());
        }
        for norm in [&self.attention_norm, &self.feed_forward_norm] {
            if norm.gamma.len() != dim || norm.beta.len() != dim {
                return Err("layer norm has wrong width".to_string());
            }
        }
        Ok(())
    }

    /// Multi-head self-attention over all positions; masked positions are never attended to
    fn forward(&self, xs: &mut [Vec<f32>], key_mask: &[bool], num_heads: usize) {
        let dim = xs[0].len();
        let head_dim = dim / num_heads;
        let scale = 1.0 / (head_dim as f32).sqrt();

        let queries: Vec<Vec<f32>> = xs.iter().map(|x| self.query.forward(x)).collect();
        let keys: Vec<Vec<f32>> = xs.iter().map(|x| self.key.forward(x)).collect();
        let values: Vec<Vec<f32>> = xs.iter().map(|x| self.value.forward(x)).collect();

        for (i, x) in xs.iter_mut().enumerate() {
            let mut context = vec![0.0f32; dim];

            for head in 0..num_heads {
                let span = head * head_dim..(head + 1) * head_dim;
                let mut weights: Vec<f32> = keys
                    .iter()
                    .zip(key_mask)
                    .map(|(k, &masked)| {
                        if masked {
                            f32::NEG_INFINITY
                        } else {
                            dot(&queries[i][span.clone()], &k[span.clone()]) * scale
                        }
                    })
                    .collect();
                softmax(&mut weights);

                for (w, v) in weights.iter().zip(&values) {
                    if *w == 0.0 {
                        continue;
                    }
                    for d in span.clone() {
                        context[d] += w * v[d];
                    }
                }
            }

            let attended = self.output.forward(&context);
            for (xi, a) in x.iter_mut().zip(&attended) {
                *xi += a;
            }
            self.attention_norm.forward(x);

            let hidden: Vec<f32> = self
                .feed_forward_in
                .forward(x)
                .into_iter()
                .map(gelu)
                .collect();
            let projected = self.feed_forward_out.forward(&hidden);
            for (xi, p) in x.iter_mut().zip(&projected) {
                *xi += p;
            }
            self.feed_forward_norm.forward(x);
        }
    }
}

/// Trained (or seeded) parameters
///
/// Row 0 of `item_embeddings` is the padding token; row `i` belongs to the catalog
/// item with index `i`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SasRecWeights {
    pub num_heads: usize,
    pub item_embeddings: Matrix,
    pub positional_embeddings: Matrix,
    pub input_norm: LayerNorm,
    pub layers: Vec<EncoderLayer>,
}

impl SasRecWeights {
    /// Deterministic Xavier initialization from `seed`
    pub fn random(shape: SasRecShape, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let dim = shape.embedding_dim;

        let mut item_embeddings = Matrix::xavier(shape.num_items + 1, dim, &mut rng);
        item_embeddings
            .row_mut(PADDING_INDEX)
            .iter_mut()
            .for_each(|v| *v = 0.0);

        Self {
            num_heads: shape.num_heads,
            item_embeddings,
            positional_embeddings: Matrix::xavier(shape.max_seq_len, dim, &mut rng),
            input_norm: LayerNorm::identity(dim),
            layers: (0..shape.num_layers)
                .map(|_| EncoderLayer::random(dim, &mut rng))
                .collect(),
        }
    }

    /// Reads weights exported by the training job as JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScorerError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ScorerError::InvalidWeights(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| ScorerError::InvalidWeights(e.to_string()))
    }

    pub fn embedding_dim(&self) -> usize {
        self.item_embeddings.cols
    }

    pub fn num_items(&self) -> usize {
        self.item_embeddings.rows.saturating_sub(1)
    }

    pub fn max_seq_len(&self) -> usize {
        self.positional_embeddings.rows
    }

    fn validate(&self) -> Result<(), ScorerError> {
        let dim = self.embedding_dim();
        let invalid =
            |msg: String| -> Result<(), ScorerError> { Err(ScorerError::InvalidWeights(msg)) };

        if dim == 0 || self.num_heads == 0 || dim % self.num_heads != 0 {
            return invalid(format!(
                "embedding dim {} is not divisible into {} heads",
                dim, self.num_heads
            ));
        }
        if !self.item_embeddings.is_consistent() || self.item_embeddings.rows == 0 {
            return invalid("item embedding table is malformed".to_string());
        }
        if !self.positional_embeddings.is_consistent()
            || self.positional_embeddings.cols != dim
            || self.positional_embeddings.rows == 0
        {
            return invalid("positional embedding table is malformed".to_string());
        }
        if self.input_norm.gamma.len() != dim || self.input_norm.beta.len() != dim {
            return invalid("input layer norm has wrong width".to_string());
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if let Err(msg) = layer.check(dim) {
                return invalid(format!("layer {}: {}", i, msg));
            }
        }
        Ok(())
    }
}

/// Validated, read-only model. Safe to share across threads without locking.
#[derive(Debug, Clone)]
pub struct SasRecModel {
    weights: SasRecWeights,
}

impl SasRecModel {
    pub fn new(weights: SasRecWeights) -> Result<Self, ScorerError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &SasRecWeights {
        &self.weights
    }

    pub fn max_seq_len(&self) -> usize {
        self.weights.max_seq_len()
    }

    pub fn num_items(&self) -> usize {
        self.weights.num_items()
    }

    /// Embedding row for a model index
    pub fn item_embedding(&self, index: usize) -> Option<&[f32]> {
        (index < self.weights.item_embeddings.rows).then(|| self.weights.item_embeddings.row(index))
    }

    /// Query representation for a left-padded window of exactly `max_seq_len` indices
    pub fn encode(&self, window: &[usize]) -> Result<Vec<f32>, ScorerError> {
        if window.len() != self.max_seq_len() {
            return Err(ScorerError::InvalidWeights(format!(
                "window of {} positions does not match model length {}",
                window.len(),
                self.max_seq_len()
            )));
        }
        let key_mask: Vec<bool> = window
            .iter()
            .map(|&idx| idx == PADDING_INDEX || idx > self.num_items())
            .collect();
        if key_mask.iter().all(|&masked| masked) {
            return Err(ScorerError::EmptySequence);
        }

        let mut xs: Vec<Vec<f32>> = window
            .iter()
            .zip(&key_mask)
            .enumerate()
            .map(|(pos, (&idx, &masked))| {
                let item = if masked {
                    self.weights.item_embeddings.row(PADDING_INDEX)
                } else {
                    self.weights.item_embeddings.row(idx)
                };
                let mut x: Vec<f32> = item
                    .iter()
                    .zip(self.weights.positional_embeddings.row(pos))
                    .map(|(e, p)| e + p)
                    .collect();
                self.weights.input_norm.forward(&mut x);
                x
            })
            .collect();

        for layer in &self.weights.layers {
            layer.forward(&mut xs, &key_mask, self.weights.num_heads);
        }

        Ok(xs.pop().unwrap_or_default())
    }

    /// Dot-product score of every real item (index 1..=num_items) against `query`
    pub fn score_items(&self, query: &[f32]) -> Vec<f32> {
        (1..=self.num_items())
            .map(|idx| dot(query, self.weights.item_embeddings.row(idx)))
            .collect()
    }
}

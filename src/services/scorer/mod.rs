//! Next-item scoring from a session's recent history
//!
//! The recommender only depends on the [`SequenceScorer`] contract, so any sequence
//! model (attention, recurrent, a frequency baseline) can sit behind it.
use std::sync::Arc;

use serde::Serialize;

use crate::models::catalog::{ItemCatalog, PADDING_INDEX};

pub mod sasrec;
pub mod tensor;

pub use sasrec::{SasRecModel, SasRecShape, SasRecWeights};

#[derive(thiserror::Error, Debug)]
pub enum ScorerError {
    #[error("Model unavailable")]
    ModelUnavailable,

    #[error("Session history contains no items known to the model")]
    EmptySequence,

    #[error("Invalid model weights: {0}")]
    InvalidWeights(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredItem {
    pub item_id: String,
    pub score: f32,
}

/// Scorer output: the query representation and the full ranked catalog
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSequence {
    pub query: Vec<f32>,
    /// Descending by score, ties in catalog order
    pub candidates: Vec<ScoredItem>,
}

/// Trait for next-item scorers
///
/// Implementations are read-only after construction and must be cheap to share
/// across threads. `score` is CPU-bound; callers run it off the async executor.
#[cfg_attr(test, mockall::automock)]
pub trait SequenceScorer: Send + Sync {
    /// Ranks catalog items as the next interaction after `history` (oldest first)
    fn score(&self, history: &[String]) -> Result<ScoredSequence, ScorerError>;

    /// Whether a model is loaded
    fn is_ready(&self) -> bool;

    /// Catalog item embeddings, used to seed the vector index
    fn item_embeddings(&self) -> Vec<(String, Vec<f32>)>;

    /// Scorer name for logging
    fn name(&self) -> &'static str;
}

/// Self-attention scorer over the item catalog
pub struct AttentionScorer {
    catalog: Arc<ItemCatalog>,
    model: Option<SasRecModel>,
}

impl AttentionScorer {
    pub fn new(catalog: Arc<ItemCatalog>, model: SasRecModel) -> Result<Self, ScorerError> {
        if model.num_items() != catalog.len() {
            return Err(ScorerError::InvalidWeights(format!(
                "model knows {} items but the catalog has {}",
                model.num_items(),
                catalog.len()
            )));
        }
        Ok(Self {
            catalog,
            model: Some(model),
        })
    }

    /// A scorer without a model; every `score` call reports `ModelUnavailable`
    pub fn unavailable(catalog: Arc<ItemCatalog>) -> Self {
        Self {
            catalog,
            model: None,
        }
    }

    /// Left-pads (or keeps the tail of) the history to the model's window
    fn window(&self, history: &[String], length: usize) -> Vec<usize> {
        let tail = &history[history.len().saturating_sub(length)..];
        let mut window = vec![PADDING_INDEX; length - tail.len()];
        window.extend(tail.iter().map(|id| self.catalog.index_of(id)));
        window
    }
}

impl SequenceScorer for AttentionScorer {
    fn score(&self, history: &[String]) -> Result<ScoredSequence, ScorerError> {
        let model = self.model.as_ref().ok_or(ScorerError::ModelUnavailable)?;

        let window = self.window(history, model.max_seq_len());
        let query = model.encode(&window)?;

        let mut candidates: Vec<ScoredItem> = model
            .score_items(&query)
            .into_iter()
            .zip(self.catalog.ids())
            .map(|(score, item_id)| ScoredItem {
                item_id: item_id.to_string(),
                score,
            })
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(ScoredSequence { query, candidates })
    }

    fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    fn item_embeddings(&self) -> Vec<(String, Vec<f32>)> {
        let Some(model) = &self.model else {
            return Vec::new();
        };
        self.catalog
            .ids()
            .filter_map(|item_id| {
                model
                    .item_embedding(self.catalog.index_of(item_id))
                    .map(|embedding| (item_id.to_string(), embedding.to_vec()))
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "sasrec"
    }
}

use parking_lot::RwLock;

use super::{cosine_similarity, VectorIndex};
use crate::storage::{StoreError, StoreResult};

/// Exact cosine-similarity index held in process
///
/// Entries keep their insertion position (an upsert of an existing item replaces
/// it in place), which is what breaks score ties.
pub struct MemoryVectorIndex {
    entries: RwLock<Vec<(String, Vec<f32>)>>,
    dimension: usize,
}

impl MemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check_dimension(&self, vector: &[f32]) -> StoreResult<()> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, item_id: &str, embedding: Vec<f32>) -> StoreResult<()> {
        self.check_dimension(&embedding)?;

        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(id, _)| id == item_id) {
            Some((_, existing)) => *existing = embedding,
            None => entries.push((item_id.to_string(), embedding)),
        }
        Ok(())
    }

    async fn remove(&self, item_id: &str) -> StoreResult<()> {
        self.entries.write().retain(|(id, _)| id != item_id);
        Ok(())
    }

    async fn top_k(&self, query: &[f32], k: usize) -> StoreResult<Vec<String>> {
        self.check_dimension(query)?;

        let entries = self.entries.read();
        let mut scored: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(pos, (_, embedding))| (pos, cosine_similarity(query, embedding)))
            .collect();

        // Stable sort: equal scores stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(pos, _)| entries[pos].0.clone())
            .collect())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

use super::StoreResult;

pub mod memory;
pub mod qdrant;

pub use memory::MemoryVectorIndex;
pub use qdrant::QdrantIndex;

/// Top-K similarity retrieval over item embeddings
///
/// `upsert` and `remove` are catalog maintenance and run at startup or on catalog
/// change; only `top_k` sits on the request path.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces the embedding for an item
    async fn upsert(&self, item_id: &str, embedding: Vec<f32>) -> StoreResult<()>;

    /// Removes an item. Removing an unknown item is not an error.
    async fn remove(&self, item_id: &str) -> StoreResult<()>;

    /// Item ids ranked by descending similarity to `query`. Empty for an empty index.
    async fn top_k(&self, query: &[f32], k: usize) -> StoreResult<Vec<String>>;

    /// Live connectivity probe
    async fn health_check(&self) -> bool;

    /// Index name for logging
    fn name(&self) -> &'static str;
}

/// Cosine similarity; zero vectors are similar to nothing
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, SessionBackend, VectorBackend};
use crate::models::ItemCatalog;
use crate::services::scorer::{SasRecModel, SasRecShape, SasRecWeights, ScorerError};
use crate::services::{AttentionScorer, MetricsTracker, Recommender, SequenceScorer, ThompsonBandit};
use crate::storage::session::redis::create_redis_client;
use crate::storage::{
    MemorySessionStore, MemoryVectorIndex, QdrantIndex, RedisSessionStore, SessionStore,
    VectorIndex,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub recommender: Recommender,
    pub catalog: Arc<ItemCatalog>,
    /// Set when sessions live in process memory and need periodic sweeping
    pub memory_sessions: Option<Arc<MemorySessionStore>>,
}

impl AppState {
    /// Wires every collaborator from configuration
    ///
    /// Only a bad catalog aborts startup. An unreachable Redis or Qdrant, or model
    /// weights that fail to load, leave the service running in a degraded mode that
    /// the health endpoint reports.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let catalog = Arc::new(load_catalog(config)?);
        tracing::info!(items = catalog.len(), "Catalog ready");

        let scorer = Arc::new(build_scorer(config, Arc::clone(&catalog)));
        let embeddings = scorer.item_embeddings();
        let dimension = embeddings
            .first()
            .map(|(_, embedding)| embedding.len())
            .unwrap_or(config.embedding_dim);

        let mut memory_sessions = None;
        let sessions: Arc<dyn SessionStore> = match config.session_backend {
            SessionBackend::Redis => {
                let client = create_redis_client(&config.redis_url)?;
                Arc::new(RedisSessionStore::new(
                    client,
                    config.sequence_length,
                    config.session_ttl_seconds,
                ))
            }
            SessionBackend::Memory => {
                let store = Arc::new(MemorySessionStore::new(
                    config.sequence_length,
                    config.session_ttl(),
                ));
                memory_sessions = Some(Arc::clone(&store));
                store
            }
        };
        tracing::info!(backend = sessions.name(), "Session store configured");

        let index: Arc<dyn VectorIndex> = match config.vector_backend {
            VectorBackend::Memory => Arc::new(MemoryVectorIndex::new(dimension)),
            VectorBackend::Qdrant => {
                let qdrant = QdrantIndex::new(
                    config.qdrant_url.clone(),
                    config.qdrant_collection.clone(),
                    dimension,
                );
                if let Err(e) = qdrant.ensure_collection().await {
                    tracing::warn!(error = %e, "Could not prepare Qdrant collection");
                }
                Arc::new(qdrant)
            }
        };
        seed_index(index.as_ref(), embeddings).await;

        let bandit = Arc::new(ThompsonBandit::new(catalog.ids()));
        if let Some(path) = &config.bandit_state_path {
            restore_bandit(&bandit, path);
        }

        let recommender = Recommender::new(
            sessions,
            scorer,
            index,
            bandit,
            Arc::new(MetricsTracker::new(config.metrics_window)),
            Arc::clone(&catalog),
            config.recommender_settings(),
        );

        Ok(Self {
            recommender,
            catalog,
            memory_sessions,
        })
    }
}

fn load_catalog(config: &Config) -> anyhow::Result<ItemCatalog> {
    let catalog = match &config.catalog_path {
        Some(path) => ItemCatalog::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load catalog from {}: {}", path, e))?,
        None => ItemCatalog::sample(config.catalog_size),
    };
    if catalog.is_empty() {
        anyhow::bail!("Item catalog is empty");
    }
    Ok(catalog)
}

fn build_scorer(config: &Config, catalog: Arc<ItemCatalog>) -> AttentionScorer {
    let model = match &config.model_weights_path {
        Some(path) => SasRecWeights::load(path).and_then(SasRecModel::new),
        None => SasRecModel::new(SasRecWeights::random(
            SasRecShape {
                num_items: catalog.len(),
                embedding_dim: config.embedding_dim,
                num_heads: config.num_heads,
                num_layers: config.num_layers,
                max_seq_len: config.sequence_length,
            },
            config.model_seed,
        )),
    };

    // The session store keeps `sequence_length` clicks; the model must read exactly that window
    let model = model.and_then(|model| {
        if model.max_seq_len() == config.sequence_length {
            Ok(model)
        } else {
            Err(ScorerError::InvalidWeights(format!(
                "model window is {} but SEQUENCE_LENGTH is {}",
                model.max_seq_len(),
                config.sequence_length
            )))
        }
    });

    match model.and_then(|model| AttentionScorer::new(Arc::clone(&catalog), model)) {
        Ok(scorer) => {
            tracing::info!(
                scorer = scorer.name(),
                weights = config.model_weights_path.as_deref().unwrap_or("seeded"),
                "Sequence model loaded"
            );
            scorer
        }
        Err(e) => {
            tracing::warn!(error = %e, "Sequence model unavailable, serving cold-start only");
            AttentionScorer::unavailable(catalog)
        }
    }
}

/// Loads catalog embeddings into the index; stops at the first failure
async fn seed_index(index: &dyn VectorIndex, embeddings: Vec<(String, Vec<f32>)>) {
    let total = embeddings.len();
    for (item_id, embedding) in embeddings {
        if let Err(e) = index.upsert(&item_id, embedding).await {
            tracing::warn!(error = %e, index = index.name(), "Vector index seeding stopped");
            return;
        }
    }
    tracing::info!(items = total, index = index.name(), "Vector index seeded");
}

fn restore_bandit(bandit: &ThompsonBandit, path: &str) {
    if !Path::new(path).exists() {
        tracing::info!(path = %path, "No saved bandit state, starting from uniform priors");
        return;
    }
    match bandit.load_state(path) {
        Ok(restored) => tracing::info!(path = %path, arms = restored, "Bandit state restored"),
        Err(e) => tracing::warn!(path = %path, error = %e, "Ignoring unreadable bandit state"),
    }
}

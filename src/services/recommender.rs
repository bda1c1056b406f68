//! Per-request recommendation pipeline.
//!
//! Each request runs DECIDE -> RETRIEVE -> RESPOND:
//! the session history decides between the bandit and the sequence model, the
//! chosen strategy produces `top_k` items, and the elapsed time is recorded.
//! Scorer and vector index failures (including timeouts) fall back to the bandit;
//! only session store failures reach the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};

use crate::error::AppResult;
use crate::models::{ComponentHealth, ItemCatalog};
use crate::services::bandit::{ArmStats, ThompsonBandit};
use crate::services::metrics::{MetricsSummary, MetricsTracker};
use crate::services::scorer::{ScoredSequence, ScorerError, SequenceScorer};
use crate::storage::{SessionStore, StoreError, VectorIndex};

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Request-path tuning knobs
#[derive(Debug, Clone)]
pub struct RecommenderSettings {
    pub cold_start_threshold: usize,
    pub top_k: usize,
    /// Bound on each scorer / vector index call
    pub retrieval_timeout: Duration,
    /// Rank through the vector index using the scorer's query embedding
    pub use_vector_retrieval: bool,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            cold_start_threshold: 2,
            top_k: 5,
            retrieval_timeout: Duration::from_millis(250),
            use_vector_retrieval: false,
        }
    }
}

/// Outcome of one recommend request
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub items: Vec<String>,
    pub used_coldstart: bool,
}

/// Why the model path was abandoned for this request
#[derive(thiserror::Error, Debug)]
enum Fallback {
    #[error(transparent)]
    Scorer(#[from] ScorerError),

    #[error("retrieval timed out after {0:?}")]
    Timeout(Duration),

    #[error("vector index failed: {0}")]
    Index(#[from] StoreError),

    #[error("scoring task failed: {0}")]
    Task(String),
}

/// Whether a session is too short for the sequence model
pub fn needs_cold_start(history_len: usize, threshold: usize) -> bool {
    history_len < threshold
}

/// Composes the session store, scorer, vector index, bandit and metrics
///
/// Holds no per-request state; every collaborator is shared and injected.
#[derive(Clone)]
pub struct Recommender {
    sessions: Arc<dyn SessionStore>,
    scorer: Arc<dyn SequenceScorer>,
    index: Arc<dyn VectorIndex>,
    bandit: Arc<ThompsonBandit>,
    metrics: Arc<MetricsTracker>,
    catalog: Arc<ItemCatalog>,
    settings: RecommenderSettings,
}

impl Recommender {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        scorer: Arc<dyn SequenceScorer>,
        index: Arc<dyn VectorIndex>,
        bandit: Arc<ThompsonBandit>,
        metrics: Arc<MetricsTracker>,
        catalog: Arc<ItemCatalog>,
        settings: RecommenderSettings,
    ) -> Self {
        Self {
            sessions,
            scorer,
            index,
            bandit,
            metrics,
            catalog,
            settings,
        }
    }

    pub fn settings(&self) -> &RecommenderSettings {
        &self.settings
    }

    pub fn bandit(&self) -> &Arc<ThompsonBandit> {
        &self.bandit
    }

    pub async fn record_click(&self, session_id: &str, item_id: &str) -> AppResult<()> {
        self.sessions
            .record_click(session_id, item_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, store = self.sessions.name(), "Failed to record click");
                e
            })?;
        Ok(())
    }

    pub async fn recommend(&self, session_id: &str) -> AppResult<Recommendation> {
        let started = Instant::now();

        // DECIDE
        let history = self.sessions.get_history(session_id).await.map_err(|e| {
            tracing::error!(error = %e, store = self.sessions.name(), "Failed to read session");
            e
        })?;

        // RETRIEVE
        let (items, used_coldstart) =
            if needs_cold_start(history.len(), self.settings.cold_start_threshold) {
                (self.bandit.select(self.settings.top_k), true)
            } else {
                match self.model_recommendations(&history).await {
                    Ok(items) => (items, false),
                    Err(reason) => {
                        tracing::warn!(
                            session_id = %session_id,
                            reason = %reason,
                            "Model path unavailable, falling back to cold-start"
                        );
                        (self.bandit.select(self.settings.top_k), true)
                    }
                }
            };

        // RESPOND
        let latency = started.elapsed();
        self.metrics.record_request(latency, used_coldstart);

        tracing::debug!(
            session_id = %session_id,
            history_len = history.len(),
            used_coldstart,
            latency_ms = latency.as_secs_f64() * 1000.0,
            "Served recommendations"
        );

        Ok(Recommendation {
            items,
            used_coldstart,
        })
    }

    async fn model_recommendations(&self, history: &[String]) -> Result<Vec<String>, Fallback> {
        let top_k = self.settings.top_k;
        let scored = self.run_scorer(history).await?;

        let mut items: Vec<String> = if self.settings.use_vector_retrieval {
            let hits = timeout(
                self.settings.retrieval_timeout,
                self.index.top_k(&scored.query, top_k),
            )
            .await
            .map_err(|_| Fallback::Timeout(self.settings.retrieval_timeout))??;

            let mut items = Vec::with_capacity(top_k);
            for item_id in hits {
                if self.catalog.contains(&item_id) && !items.contains(&item_id) {
                    items.push(item_id);
                }
            }
            items
        } else {
            scored
                .candidates
                .into_iter()
                .take(top_k)
                .map(|candidate| candidate.item_id)
                .collect()
        };

        // Top up a short list so every response carries min(top_k, catalog) items
        if items.len() < top_k {
            for item_id in self.bandit.select(top_k) {
                if items.len() >= top_k {
                    break;
                }
                if !items.contains(&item_id) {
                    items.push(item_id);
                }
            }
        }

        Ok(items)
    }

    /// Scores on the blocking pool so the executor is never held by model math
    async fn run_scorer(&self, history: &[String]) -> Result<ScoredSequence, Fallback> {
        let scorer = Arc::clone(&self.scorer);
        let history = history.to_vec();
        let task = tokio::task::spawn_blocking(move || scorer.score(&history));

        match timeout(self.settings.retrieval_timeout, task).await {
            Err(_) => Err(Fallback::Timeout(self.settings.retrieval_timeout)),
            Ok(Err(join_error)) => Err(Fallback::Task(join_error.to_string())),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    /// Applies feedback to the bandit and hit-rate counters. Returns whether it was a hit.
    pub fn record_feedback(&self, recommended: &[String], clicked: Option<&str>) -> bool {
        let hit = clicked.is_some_and(|c| recommended.iter().any(|r| r == c));
        self.bandit.update(recommended, clicked);
        self.metrics.record_feedback(hit);
        hit
    }

    pub async fn delete_session(&self, session_id: &str) -> AppResult<()> {
        self.sessions.delete_session(session_id).await?;
        Ok(())
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    pub fn bandit_stats(&self) -> Vec<ArmStats> {
        self.bandit.stats()
    }

    /// Probes every collaborator concurrently; a probe that hangs counts as down
    pub async fn health(&self) -> ComponentHealth {
        let (session_store, vector_store) = tokio::join!(
            timeout(HEALTH_PROBE_TIMEOUT, self.sessions.health_check()),
            timeout(HEALTH_PROBE_TIMEOUT, self.index.health_check()),
        );

        ComponentHealth {
            session_store: session_store.unwrap_or(false),
            vector_store: vector_store.unwrap_or(false),
            model: self.scorer.is_ready(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::services::scorer::{
        AttentionScorer, MockSequenceScorer, SasRecModel, SasRecShape, SasRecWeights,
    };
    use crate::storage::session::MockSessionStore;
    use crate::storage::vector::MockVectorIndex;
    use crate::storage::{MemorySessionStore, MemoryVectorIndex};

    const CATALOG_SIZE: usize = 40;
    const DIM: usize = 16;

    fn catalog() -> Arc<ItemCatalog> {
        Arc::new(ItemCatalog::sample(CATALOG_SIZE))
    }

    fn attention_scorer(catalog: Arc<ItemCatalog>) -> Arc<AttentionScorer> {
        let weights = SasRecWeights::random(
            SasRecShape {
                num_items: catalog.len(),
                embedding_dim: DIM,
                num_heads: 4,
                num_layers: 2,
                max_seq_len: 5,
            },
            42,
        );
        Arc::new(AttentionScorer::new(catalog, SasRecModel::new(weights).unwrap()).unwrap())
    }

    struct Parts {
        sessions: Arc<dyn SessionStore>,
        scorer: Arc<dyn SequenceScorer>,
        index: Arc<dyn VectorIndex>,
        settings: RecommenderSettings,
    }

    impl Parts {
        fn new() -> Self {
            let catalog = catalog();
            Self {
                sessions: Arc::new(MemorySessionStore::new(5, Duration::from_secs(1800))),
                scorer: attention_scorer(catalog),
                index: Arc::new(MemoryVectorIndex::new(DIM)),
                settings: RecommenderSettings::default(),
            }
        }

        fn build(self) -> Recommender {
            let catalog = catalog();
            Recommender::new(
                self.sessions,
                self.scorer,
                self.index,
                Arc::new(ThompsonBandit::with_seed(catalog.ids(), 9)),
                Arc::new(MetricsTracker::new(100)),
                catalog,
                self.settings,
            )
        }
    }

    async fn seed_index(recommender: &Recommender, scorer: &AttentionScorer) {
        for (item_id, embedding) in scorer.item_embeddings() {
            recommender.index.upsert(&item_id, embedding).await.unwrap();
        }
    }

    fn assert_valid_list(items: &[String], expected_len: usize) {
        assert_eq!(items.len(), expected_len);
        let catalog = catalog();
        assert!(items.iter().all(|id| catalog.contains(id)));
        let unique: std::collections::HashSet<_> = items.iter().collect();
        assert_eq!(unique.len(), items.len());
    }

    #[test]
    fn test_needs_cold_start_threshold() {
        assert!(needs_cold_start(0, 2));
        assert!(needs_cold_start(1, 2));
        assert!(!needs_cold_start(2, 2));
        assert!(!needs_cold_start(5, 2));
    }

    #[tokio::test]
    async fn test_unknown_session_uses_cold_start() {
        let recommender = Parts::new().build();
        let result = recommender.recommend("fresh").await.unwrap();

        assert!(result.used_coldstart);
        assert_valid_list(&result.items, 5);
    }

    #[tokio::test]
    async fn test_short_then_long_session() {
        let recommender = Parts::new().build();

        recommender.record_click("s1", "item_0010").await.unwrap();
        let first = recommender.recommend("s1").await.unwrap();
        assert!(first.used_coldstart);

        recommender.record_click("s1", "item_0003").await.unwrap();
        let second = recommender.recommend("s1").await.unwrap();
        assert!(!second.used_coldstart);
        assert_valid_list(&second.items, 5);

        let metrics = recommender.metrics();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.coldstart_requests, 1);
        assert_eq!(metrics.model_requests, 1);
    }

    #[tokio::test]
    async fn test_model_path_is_deterministic_for_same_history() {
        let recommender = Parts::new().build();
        for item in ["item_0001", "item_0002", "item_0003"] {
            recommender.record_click("a", item).await.unwrap();
            recommender.record_click("b", item).await.unwrap();
        }

        let a = recommender.recommend("a").await.unwrap();
        let b = recommender.recommend("b").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_model_unavailable_falls_back_to_cold_start() {
        let mut scorer = MockSequenceScorer::new();
        scorer
            .expect_score()
            .returning(|_| Err(ScorerError::ModelUnavailable));

        let mut parts = Parts::new();
        parts.scorer = Arc::new(scorer);
        let recommender = parts.build();

        recommender.record_click("s1", "item_0001").await.unwrap();
        recommender.record_click("s1", "item_0002").await.unwrap();
        let result = recommender.recommend("s1").await.unwrap();

        assert!(result.used_coldstart);
        assert_valid_list(&result.items, 5);
        assert_eq!(recommender.metrics().coldstart_requests, 1);
    }

    #[tokio::test]
    async fn test_slow_scorer_times_out_to_cold_start() {
        let mut scorer = MockSequenceScorer::new();
        scorer.expect_score().returning(|_| {
            std::thread::sleep(Duration::from_millis(300));
            Err(ScorerError::ModelUnavailable)
        });

        let mut parts = Parts::new();
        parts.scorer = Arc::new(scorer);
        parts.settings.retrieval_timeout = Duration::from_millis(20);
        let recommender = parts.build();

        recommender.record_click("s1", "item_0001").await.unwrap();
        recommender.record_click("s1", "item_0002").await.unwrap();

        let started = std::time::Instant::now();
        let result = recommender.recommend("s1").await.unwrap();
        assert!(result.used_coldstart);
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_session_store_failure_surfaces() {
        let mut sessions = MockSessionStore::new();
        sessions
            .expect_get_history()
            .returning(|_| Err(StoreError::Unavailable("connection refused".to_string())));
        sessions.expect_name().return_const("mock");

        let mut parts = Parts::new();
        parts.sessions = Arc::new(sessions);
        let recommender = parts.build();

        let err = recommender.recommend("s1").await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        // A failed request records nothing
        assert_eq!(recommender.metrics().total_requests, 0);
    }

    #[tokio::test]
    async fn test_click_store_failure_surfaces() {
        let mut sessions = MockSessionStore::new();
        sessions
            .expect_record_click()
            .returning(|_, _| Err(StoreError::Unavailable("connection refused".to_string())));
        sessions.expect_name().return_const("mock");

        let mut parts = Parts::new();
        parts.sessions = Arc::new(sessions);
        let recommender = parts.build();

        let err = recommender.record_click("s1", "item_0001").await.unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_vector_retrieval_path() {
        let catalog = catalog();
        let scorer = attention_scorer(Arc::clone(&catalog));

        let mut parts = Parts::new();
        parts.scorer = scorer.clone();
        parts.settings.use_vector_retrieval = true;
        let recommender = parts.build();
        seed_index(&recommender, &scorer).await;

        recommender.record_click("s1", "item_0004").await.unwrap();
        recommender.record_click("s1", "item_0005").await.unwrap();
        let result = recommender.recommend("s1").await.unwrap();

        assert!(!result.used_coldstart);
        assert_valid_list(&result.items, 5);
    }

    #[tokio::test]
    async fn test_vector_index_failure_falls_back() {
        let mut index = MockVectorIndex::new();
        index
            .expect_top_k()
            .returning(|_, _| Err(StoreError::Unavailable("qdrant down".to_string())));

        let mut parts = Parts::new();
        parts.index = Arc::new(index);
        parts.settings.use_vector_retrieval = true;
        let recommender = parts.build();

        recommender.record_click("s1", "item_0004").await.unwrap();
        recommender.record_click("s1", "item_0005").await.unwrap();
        let result = recommender.recommend("s1").await.unwrap();

        assert!(result.used_coldstart);
        assert_valid_list(&result.items, 5);
    }

    #[tokio::test]
    async fn test_short_index_result_is_topped_up() {
        let mut index = MockVectorIndex::new();
        index.expect_top_k().returning(|_, _| {
            Ok(vec![
                "item_0007".to_string(),
                "not_in_catalog".to_string(),
                "item_0007".to_string(),
            ])
        });

        let mut parts = Parts::new();
        parts.index = Arc::new(index);
        parts.settings.use_vector_retrieval = true;
        let recommender = parts.build();

        recommender.record_click("s1", "item_0001").await.unwrap();
        recommender.record_click("s1", "item_0002").await.unwrap();
        let result = recommender.recommend("s1").await.unwrap();

        assert!(!result.used_coldstart);
        assert_eq!(result.items[0], "item_0007");
        assert_valid_list(&result.items, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_behaves_like_unknown() {
        let mut parts = Parts::new();
        parts.sessions = Arc::new(MemorySessionStore::new(5, Duration::from_secs(60)));
        let recommender = parts.build();

        recommender.record_click("s1", "item_0001").await.unwrap();
        recommender.record_click("s1", "item_0002").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let result = recommender.recommend("s1").await.unwrap();
        assert!(result.used_coldstart);
        assert!(recommender.sessions.get_history("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_updates_bandit_and_hit_rate() {
        let recommender = Parts::new().build();
        let recommended = vec![
            "item_0000".to_string(),
            "item_0001".to_string(),
            "item_0002".to_string(),
        ];

        assert!(recommender.record_feedback(&recommended, Some("item_0001")));
        assert!(!recommender.record_feedback(&recommended, Some("item_0030")));
        assert!(!recommender.record_feedback(&recommended, None));

        let arm = recommender.bandit().arm("item_0001").unwrap();
        assert_eq!(arm.alpha, 2.0);
        assert_eq!(arm.beta, 3.0);
        assert_eq!(recommender.bandit().arm("item_0030").unwrap().beta, 1.0);
        assert_eq!(recommender.metrics().hit_rate_at_k, 33.33);
    }

    #[tokio::test]
    async fn test_health_reports_each_component() {
        let mut index = MockVectorIndex::new();
        index.expect_health_check().returning(|| false);

        let mut parts = Parts::new();
        parts.index = Arc::new(index);
        parts.scorer = Arc::new(AttentionScorer::unavailable(catalog()));
        let recommender = parts.build();

        let health = recommender.health().await;
        assert!(health.session_store);
        assert!(!health.vector_store);
        assert!(!health.model);
    }
}

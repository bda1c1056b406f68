use std::sync::Arc;
use std::time::Duration;

use tokio_test::assert_ok;

use session_recommender::models::ItemCatalog;
use session_recommender::services::scorer::{SasRecModel, SasRecShape, SasRecWeights};
use session_recommender::services::{
    AttentionScorer, MetricsTracker, Recommender, RecommenderSettings, ThompsonBandit,
};
use session_recommender::storage::{MemorySessionStore, MemoryVectorIndex};

fn recommender(catalog_size: usize) -> Recommender {
    let catalog = Arc::new(ItemCatalog::sample(catalog_size));
    let weights = SasRecWeights::random(
        SasRecShape {
            num_items: catalog_size,
            embedding_dim: 8,
            num_heads: 2,
            num_layers: 1,
            max_seq_len: 5,
        },
        7,
    );
    let scorer =
        AttentionScorer::new(Arc::clone(&catalog), SasRecModel::new(weights).unwrap()).unwrap();

    Recommender::new(
        Arc::new(MemorySessionStore::new(5, Duration::from_secs(1800))),
        Arc::new(scorer),
        Arc::new(MemoryVectorIndex::new(8)),
        Arc::new(ThompsonBandit::new(catalog.ids())),
        Arc::new(MetricsTracker::new(1000)),
        catalog,
        RecommenderSettings::default(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_feedback_on_disjoint_arms_loses_nothing() {
    let recommender = recommender(1000);

    let handles: Vec<_> = (0..1000)
        .map(|i| {
            let recommender = recommender.clone();
            tokio::spawn(async move {
                let item_id = format!("item_{:04}", i);
                let clicked = (i % 2 == 0).then(|| item_id.clone());
                recommender.record_feedback(&[item_id], clicked.as_deref());
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = recommender.bandit_stats();
    let increments: f64 = stats.iter().map(|arm| arm.impressions).sum();
    assert_eq!(increments, 1000.0);

    for (i, arm) in stats.iter().enumerate() {
        if i % 2 == 0 {
            assert_eq!((arm.alpha, arm.beta), (2.0, 1.0), "{}", arm.item_id);
        } else {
            assert_eq!((arm.alpha, arm.beta), (1.0, 2.0), "{}", arm.item_id);
        }
    }
    assert_eq!(recommender.metrics().hit_rate_at_k, 50.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_each_get_full_lists() {
    let recommender = recommender(50);

    let handles: Vec<_> = (0..64)
        .map(|i| {
            let recommender = recommender.clone();
            tokio::spawn(async move {
                let session_id = format!("session-{}", i);
                for step in 0..3 {
                    recommender
                        .record_click(&session_id, &format!("item_{:04}", (i + step) % 50))
                        .await
                        .unwrap();
                }
                recommender.recommend(&session_id).await.unwrap()
            })
        })
        .collect();

    for handle in handles {
        let recommendation = handle.await.unwrap();
        assert_eq!(recommendation.items.len(), 5);
    }

    let metrics = recommender.metrics();
    assert_eq!(metrics.total_requests, 64);
    assert_eq!(metrics.coldstart_requests + metrics.model_requests, 64);
}

#[tokio::test]
async fn test_catalog_smaller_than_top_k() {
    let recommender = recommender(3);

    let cold = recommender.recommend("s1").await.unwrap();
    assert_eq!(cold.items.len(), 3);

    assert_ok!(recommender.record_click("s1", "item_0000").await);
    assert_ok!(recommender.record_click("s1", "item_0001").await);
    let warm = assert_ok!(recommender.recommend("s1").await);
    assert!(!warm.used_coldstart);
    assert_eq!(warm.items.len(), 3);
}

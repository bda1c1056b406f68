pub mod bandit;
pub mod metrics;
pub mod recommender;
pub mod scorer;

pub use bandit::ThompsonBandit;
pub use metrics::MetricsTracker;
pub use recommender::{Recommendation, Recommender, RecommenderSettings};
pub use scorer::{AttentionScorer, SequenceScorer};

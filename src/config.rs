use std::time::Duration;

use serde::Deserialize;

use crate::services::recommender::RecommenderSettings;

/// Which session store implementation to run against
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Redis,
    Memory,
}

/// Which vector index implementation to run against
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Qdrant,
    Memory,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_session_backend")]
    pub session_backend: SessionBackend,

    /// Idle time after which a session is forgotten
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,

    /// Number of most recent clicks kept per session and fed to the model
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,

    /// Sessions shorter than this are served by the bandit
    #[serde(default = "default_cold_start_threshold")]
    pub cold_start_threshold: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    #[serde(default = "default_num_heads")]
    pub num_heads: usize,

    #[serde(default = "default_num_layers")]
    pub num_layers: usize,

    /// Size of the generated sample catalog when `catalog_path` is unset
    #[serde(default = "default_catalog_size")]
    pub catalog_size: usize,

    /// JSON catalog file
    #[serde(default)]
    pub catalog_path: Option<String>,

    /// JSON weights produced by the offline training job
    #[serde(default)]
    pub model_weights_path: Option<String>,

    /// Seed for deterministic weight initialization when no weights file is given
    #[serde(default = "default_model_seed")]
    pub model_seed: u64,

    #[serde(default = "default_vector_backend")]
    pub vector_backend: VectorBackend,

    /// Qdrant REST endpoint
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,

    /// Upper bound for scorer and vector index calls on the request path
    #[serde(default = "default_retrieval_timeout_ms")]
    pub retrieval_timeout_ms: u64,

    /// Rank model candidates through the vector index instead of scoring the catalog directly
    #[serde(default)]
    pub use_vector_retrieval: bool,

    /// Number of latency samples kept for percentile estimation
    #[serde(default = "default_metrics_window")]
    pub metrics_window: usize,

    /// Bandit posteriors are restored from and saved to this file when set
    #[serde(default)]
    pub bandit_state_path: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_session_backend() -> SessionBackend {
    SessionBackend::Redis
}

fn default_session_ttl_seconds() -> u64 {
    1800 // 30 minutes
}

fn default_sequence_length() -> usize {
    5
}

fn default_cold_start_threshold() -> usize {
    2
}

fn default_top_k() -> usize {
    5
}

fn default_embedding_dim() -> usize {
    128
}

fn default_num_heads() -> usize {
    4
}

fn default_num_layers() -> usize {
    2
}

fn default_catalog_size() -> usize {
    100
}

fn default_model_seed() -> u64 {
    42
}

fn default_vector_backend() -> VectorBackend {
    VectorBackend::Qdrant
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_qdrant_collection() -> String {
    "items".to_string()
}

fn default_retrieval_timeout_ms() -> u64 {
    250
}

fn default_metrics_window() -> usize {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            redis_url: default_redis_url(),
            session_backend: default_session_backend(),
            session_ttl_seconds: default_session_ttl_seconds(),
            sequence_length: default_sequence_length(),
            cold_start_threshold: default_cold_start_threshold(),
            top_k: default_top_k(),
            embedding_dim: default_embedding_dim(),
            num_heads: default_num_heads(),
            num_layers: default_num_layers(),
            catalog_size: default_catalog_size(),
            catalog_path: None,
            model_weights_path: None,
            model_seed: default_model_seed(),
            vector_backend: default_vector_backend(),
            qdrant_url: default_qdrant_url(),
            qdrant_collection: default_qdrant_collection(),
            retrieval_timeout_ms: default_retrieval_timeout_ms(),
            use_vector_retrieval: false,
            metrics_window: default_metrics_window(),
            bandit_state_path: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sequence_length == 0 {
            anyhow::bail!("SEQUENCE_LENGTH must be at least 1");
        }
        if self.top_k == 0 {
            anyhow::bail!("TOP_K must be at least 1");
        }
        if self.cold_start_threshold == 0 {
            anyhow::bail!("COLD_START_THRESHOLD must be at least 1");
        }
        if self.num_heads == 0 || self.embedding_dim % self.num_heads != 0 {
            anyhow::bail!(
                "EMBEDDING_DIM ({}) must be a multiple of NUM_HEADS ({})",
                self.embedding_dim,
                self.num_heads
            );
        }
        if self.metrics_window == 0 {
            anyhow::bail!("METRICS_WINDOW must be at least 1");
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    /// Request-path settings handed to the recommender
    pub fn recommender_settings(&self) -> RecommenderSettings {
        RecommenderSettings {
            cold_start_threshold: self.cold_start_threshold,
            top_k: self.top_k,
            retrieval_timeout: Duration::from_millis(self.retrieval_timeout_ms),
            use_vector_retrieval: self.use_vector_retrieval,
        }
    }
}

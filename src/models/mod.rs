use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::services::bandit::ArmStats;
use crate::services::metrics::MetricsSummary;

pub mod catalog;

pub use catalog::{CatalogItem, ItemCatalog};

const MAX_ID_LEN: usize = 256;

/// Rejects empty, oversized or control-character identifiers
pub fn validate_id(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{} must not be empty", field)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(AppError::InvalidInput(format!(
            "{} must be at most {} bytes",
            field, MAX_ID_LEN
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(AppError::InvalidInput(format!(
            "{} must not contain control characters",
            field
        )));
    }
    Ok(())
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    pub session_id: String,
    pub item_id: String,
}

impl ClickRequest {
    pub fn validate(&self) -> AppResult<()> {
        validate_id("session_id", &self.session_id)?;
        validate_id("item_id", &self.item_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub session_id: String,
}

impl RecommendRequest {
    pub fn validate(&self) -> AppResult<()> {
        validate_id("session_id", &self.session_id)
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub session_id: String,
    pub recommended_items: Vec<String>,
    #[serde(default)]
    pub clicked_item: Option<String>,
}

impl FeedbackRequest {
    pub fn validate(&self) -> AppResult<()> {
        validate_id("session_id", &self.session_id)?;
        if self.recommended_items.is_empty() {
            return Err(AppError::InvalidInput(
                "recommended_items must not be empty".to_string(),
            ));
        }
        for item_id in &self.recommended_items {
            validate_id("recommended_items", item_id)?;
        }
        if let Some(clicked) = &self.clicked_item {
            validate_id("clicked_item", clicked)?;
        }
        Ok(())
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Acknowledgement for write endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub session_id: String,
    pub recommendations: Vec<String>,
    pub used_coldstart: bool,
    pub message: String,
}

/// Metrics as exposed over HTTP
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MetricsResponse {
    pub hit_rate_at_10: f64,
    pub p99_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub total_requests: u64,
    pub coldstart_requests: u64,
    pub model_requests: u64,
    pub coldstart_percentage: f64,
}

impl From<MetricsSummary> for MetricsResponse {
    fn from(summary: MetricsSummary) -> Self {
        Self {
            hit_rate_at_10: summary.hit_rate_at_k,
            p99_latency_ms: summary.p99_latency_ms,
            p50_latency_ms: summary.p50_latency_ms,
            avg_latency_ms: summary.avg_latency_ms,
            total_requests: summary.total_requests,
            coldstart_requests: summary.coldstart_requests,
            model_requests: summary.model_requests,
            coldstart_percentage: summary.coldstart_percentage,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ComponentHealth {
    pub session_store: bool,
    pub vector_store: bool,
    pub model: bool,
}

impl ComponentHealth {
    pub fn all_healthy(&self) -> bool {
        self.session_store && self.vector_store && self.model
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: ComponentHealth,
}

impl From<ComponentHealth> for HealthResponse {
    fn from(components: ComponentHealth) -> Self {
        let status = if components.all_healthy() {
            "healthy"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            components,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BanditArmsResponse {
    pub arms: Vec<ArmStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id_rejects_blank() {
        assert!(validate_id("session_id", "   ").is_err());
        assert!(validate_id("session_id", "").is_err());
    }

    #[test]
    fn test_validate_id_rejects_control_chars_and_long_values() {
        assert!(validate_id("item_id", "item\n1").is_err());
        assert!(validate_id("item_id", &"x".repeat(257)).is_err());
        assert!(validate_id("item_id", &"x".repeat(256)).is_ok());
    }

    #[test]
    fn test_feedback_requires_recommended_items() {
        let request = FeedbackRequest {
            session_id: "s1".to_string(),
            recommended_items: vec![],
            clicked_item: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_feedback_clicked_item_defaults_to_none() {
        let request: FeedbackRequest = serde_json::from_str(
            r#"{"session_id": "s1", "recommended_items": ["item_0001"]}"#,
        )
        .unwrap();
        assert!(request.clicked_item.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_health_status_is_degraded_when_any_component_down() {
        let health = HealthResponse::from(ComponentHealth {
            session_store: true,
            vector_store: false,
            model: true,
        });
        assert_eq!(health.status, "degraded");

        let health = HealthResponse::from(ComponentHealth {
            session_store: true,
            vector_store: true,
            model: true,
        });
        assert_eq!(health.status, "healthy");
    }
}

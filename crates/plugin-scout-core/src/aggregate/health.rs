//! Run health artifact

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Aggregate;
use crate::types::{CollectionResult, MarketplaceRecord};

/// Most messages of each kind copied into `health.json`
pub const MAX_HEALTH_MESSAGES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No errors
    Healthy,
    /// Errors, but data was collected
    Degraded,
    /// Nothing collected
    Failing,
}

impl HealthStatus {
    pub fn classify(records: usize, errors: usize) -> Self {
        match (records, errors) {
            (0, _) => Self::Failing,
            (_, 0) => Self::Healthy,
            _ => Self::Degraded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Failing => "failing",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    pub marketplaces: usize,
    pub plugins: usize,
    pub valid_plugins: usize,
    pub verified_marketplaces: usize,
    pub failed_repositories: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub collection_time_ms: u64,
    pub sources: Vec<String>,
    pub from_cache: bool,
}

/// Content of `health.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    pub status: HealthStatus,
    pub metrics: HealthMetrics,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl HealthReport {
    pub fn new(
        run_id: impl Into<String>,
        aggregate: &Aggregate,
        collection: &CollectionResult<MarketplaceRecord>,
        from_cache: bool,
    ) -> Self {
        let metadata = &collection.metadata;
        Self {
            generated_at: aggregate.generated_at,
            run_id: run_id.into(),
            status: HealthStatus::classify(aggregate.marketplaces.len(), collection.errors.len()),
            metrics: HealthMetrics {
                marketplaces: aggregate.stats.total_marketplaces,
                plugins: aggregate.stats.total_plugins,
                valid_plugins: aggregate.stats.valid_plugins,
                verified_marketplaces: aggregate.stats.verified_marketplaces,
                failed_repositories: metadata.failed_items,
                error_count: collection.errors.len(),
                warning_count: collection.warnings.len(),
                collection_time_ms: metadata.collection_time_ms,
                sources: metadata.sources.clone(),
                from_cache,
            },
            errors: collection
                .errors
                .iter()
                .take(MAX_HEALTH_MESSAGES)
                .cloned()
                .collect(),
            warnings: collection
                .warnings
                .iter()
                .take(MAX_HEALTH_MESSAGES)
                .cloned()
                .collect(),
        }
    }
}

pub mod aggregate;
pub mod backup;
pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod integrity;
pub mod pipeline;
pub mod processor;
pub mod scoring;
pub mod search;
pub mod types;
pub mod validation;

pub use config::{default_base_dir, Config};
pub use error::{Result, ScoutError};
pub use pipeline::{Pipeline, PlannedStrategy, RunOptions, RunPlan, RunSummary};
pub use types::{
    CollectionMetadata, CollectionResult, Marketplace, MarketplaceRecord, Plugin, RepoId,
    Repository, RepositoryStats,
};

// Components
pub use aggregate::{Aggregate, ArtifactWriter, DataAggregator, HealthReport, HealthStatus};
pub use backup::{BackupManager, BackupSnapshot, BackupTrigger, RetentionPolicy, Tier};
pub use cache::{CacheLayer, Clock, ManualClock, SystemClock};
pub use github::{FetchError, GitHubClient, HostClient};
pub use integrity::{DataIntegrityValidator, IntegrityReport};
pub use processor::RepositoryProcessor;
pub use scoring::QualityScorer;
pub use search::{SearchMode, SearchStrategy, SearchStrategyRunner};
pub use validation::{ManifestSchema, ManifestValidator, ValidationReport};

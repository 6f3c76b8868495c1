//! One collection run, end to end
//!
//! cache-wrapped collection, aggregate, write artifacts, integrity check,
//! then a backup snapshot when the check passed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{ArtifactWriter, CategoryStore, DataAggregator, HealthReport, HealthStatus};
use crate::backup::{BackupManager, BackupSnapshot, BackupTrigger, LocalStorage, RetentionPolicy};
use crate::cache::CacheLayer;
use crate::config::Config;
use crate::error::{Result, ScoutError};
use crate::github::{GitHubClient, HostClient};
use crate::integrity::{DataIntegrityValidator, IntegrityReport};
use crate::processor::{ProcessorOptions, RepositoryProcessor};
use crate::scoring::QualityScorer;
use crate::search::{CancelFlag, RunnerOptions, SearchMode, SearchStrategyRunner};
use crate::types::{CollectionResult, MarketplaceRecord, RepoId};

/// Cache key for the marketplace collection
pub const MARKETPLACES_KEY: &str = "marketplaces";

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Ignore any cached collection
    pub force_refresh: bool,
    /// Promote validation warnings to errors (on top of the config value)
    pub strict: bool,
    /// Skip the post-run snapshot
    pub no_backup: bool,
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub output_dir: PathBuf,
    pub status: HealthStatus,
    pub marketplaces: usize,
    pub plugins: usize,
    pub valid_plugins: usize,
    pub verified_marketplaces: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub from_cache: bool,
    pub files: Vec<PathBuf>,
    pub integrity: IntegrityReport,
    pub backup: Option<BackupSnapshot>,
    /// Set when the snapshot could not be taken; the run itself still succeeded
    pub backup_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStrategy {
    pub name: String,
    pub mode: SearchMode,
    pub query: String,
    pub pages: u32,
    pub per_page: u32,
}

/// What a run would do, computed without any network access
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPlan {
    pub strategies: Vec<PlannedStrategy>,
    pub seeds: usize,
    pub invalid_seeds: Vec<String>,
    pub max_results: usize,
    pub batch_size: usize,
    /// Upper bound on search API calls
    pub max_search_requests: u64,
    /// Upper bound on repositories resolved (seeds + result cap)
    pub max_repositories: usize,
    pub output_dir: PathBuf,
    pub backup_dir: PathBuf,
}

/// Orchestrates collection runs for one base directory
pub struct Pipeline {
    config: Config,
    base_dir: PathBuf,
    client: Option<Arc<dyn HostClient>>,
    cache: CacheLayer<MarketplaceRecord>,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(config: Config, base_dir: impl Into<PathBuf>) -> Self {
        let cache = CacheLayer::new(config.cache.ttl());
        Self {
            config,
            base_dir: base_dir.into(),
            client: None,
            cache,
            cancel: CancelFlag::new(),
        }
    }

    /// Use a specific host client instead of building one from the token
    pub fn with_client(mut self, client: Arc<dyn HostClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_cache(mut self, cache: CacheLayer<MarketplaceRecord>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.output_dir(&self.base_dir)
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cache(&self) -> &CacheLayer<MarketplaceRecord> {
        &self.cache
    }

    /// Backup manager over the configured snapshot directory
    pub fn backup_manager(&self) -> BackupManager {
        BackupManager::new(
            Box::new(LocalStorage::new(self.config.backup_dir(&self.base_dir))),
            RetentionPolicy::from_config(&self.config.backup),
            self.config.backup.compress,
        )
    }

    fn client(&self) -> Result<Arc<dyn HostClient>> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let token = self.config.github.token()?;
        Ok(Arc::new(GitHubClient::new(&self.config.github, &token)?))
    }

    /// Describe the run without touching the network
    pub fn plan(&self) -> RunPlan {
        let search = &self.config.search;
        let strategies: Vec<PlannedStrategy> = search
            .strategies
            .iter()
            .map(|s| PlannedStrategy {
                name: s.name.clone(),
                mode: s.mode,
                query: s.query.clone(),
                pages: search.pages_per_strategy,
                per_page: search.per_page.clamp(1, s.mode.max_per_page()),
            })
            .collect();

        let mut seeds = std::collections::HashSet::new();
        let mut invalid_seeds = Vec::new();
        for seed in &search.seeds {
            match seed.parse::<RepoId>() {
                Ok(id) => {
                    seeds.insert(id.key());
                }
                Err(_) => invalid_seeds.push(seed.clone()),
            }
        }

        RunPlan {
            max_search_requests: strategies.iter().map(|s| s.pages as u64).sum(),
            strategies,
            seeds: seeds.len(),
            invalid_seeds,
            max_results: search.max_results,
            batch_size: search.batch_size.max(1),
            max_repositories: search.max_results.max(seeds.len()),
            output_dir: self.output_dir(),
            backup_dir: self.config.backup_dir(&self.base_dir),
        }
    }

    async fn collect(
        &self,
        client: Arc<dyn HostClient>,
        strict: bool,
        now: DateTime<Utc>,
    ) -> CollectionResult<MarketplaceRecord> {
        let processor = RepositoryProcessor::new(
            client.clone(),
            QualityScorer::new(now),
            ProcessorOptions {
                strict,
                max_manifest_bytes: self.config.validation.max_manifest_bytes,
                request_delay: self.config.github.request_delay(),
            },
        );
        let options = RunnerOptions::from_config(&self.config.search, self.config.github.request_delay());

        SearchStrategyRunner::new(client, Arc::new(processor), options)
            .with_seeds(self.config.search.seeds.clone())
            .with_strategies(self.config.search.strategies.clone())
            .with_cancel(self.cancel.clone())
            .run()
            .await
    }

    /// Execute a full run
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let client = self.client()?;
        let categories = CategoryStore::builtin().with_config(&self.config.categories)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let strict = options.strict || self.config.validation.strict;

        tracing::info!("Starting run {}", run_id);
        let mut from_cache = true;
        let collection = self
            .cache
            .get_or_collect(MARKETPLACES_KEY, options.force_refresh, || {
                from_cache = false;
                self.collect(client, strict, now)
            })
            .await;

        if collection.is_empty() && !collection.errors.is_empty() {
            self.cache.invalidate(MARKETPLACES_KEY);
            for e in &collection.errors {
                tracing::error!("{}", e);
            }
            return Err(ScoutError::CollectionFailed {
                errors: collection.errors.len(),
            });
        }
        tracing::info!(
            "Collected {} marketplaces ({} errors, {} warnings{})",
            collection.data.len(),
            collection.errors.len(),
            collection.warnings.len(),
            if from_cache { ", cached" } else { "" }
        );

        let aggregate = DataAggregator::new(categories).aggregate(&collection.data, now);
        let health = HealthReport::new(run_id.clone(), &aggregate, &collection, from_cache);

        let output_dir = self.output_dir();
        let files = ArtifactWriter::new(&output_dir).write(&aggregate, &health)?;

        let report = DataIntegrityValidator::new(&output_dir).validate()?;
        for issue in &report.issues {
            tracing::error!("Integrity: {}", issue);
        }
        let integrity = report.into_result()?;

        let (backup, backup_error) = if options.no_backup {
            (None, None)
        } else {
            match self.backup_manager().create(&output_dir, BackupTrigger::Run) {
                Ok(snapshot) => (Some(snapshot), None),
                Err(e) => {
                    tracing::warn!("Backup failed: {}", e);
                    (None, Some(e.to_string()))
                }
            }
        };

        Ok(RunSummary {
            run_id,
            generated_at: now,
            output_dir,
            status: health.status,
            marketplaces: aggregate.stats.total_marketplaces,
            plugins: aggregate.stats.total_plugins,
            valid_plugins: aggregate.stats.valid_plugins,
            verified_marketplaces: aggregate.stats.verified_marketplaces,
            errors: collection.errors,
            warnings: collection.warnings,
            from_cache,
            files,
            integrity,
            backup,
            backup_error,
        })
    }
}

//! Strategy execution
//!
//! Seeds first, then each strategy in order. Identifiers are deduplicated
//! against everything already seen in the run, then resolved in fixed-size
//! concurrent batches. Batches and strategies run sequentially.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use super::strategy::SearchStrategy;
use crate::config::SearchConfig;
use crate::github::{FetchError, HostClient};
use crate::processor::{RepositoryProcessor, Resolution};
use crate::types::{CollectionResult, MarketplaceRecord, RepoId};

/// Source name recorded for seed resolution
pub const SEED_SOURCE: &str = "seeds";

/// Cooperative stop signal; checked before every strategy and batch
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub max_results: usize,
    pub pages_per_strategy: u32,
    pub per_page: u32,
    pub strategy_delay: Duration,
    pub batch_size: usize,
    /// Space pages by the search mode's rate budget
    pub pace_pages: bool,
    /// Pause between batches
    pub batch_delay: Duration,
}

impl RunnerOptions {
    pub fn from_config(search: &SearchConfig, batch_delay: Duration) -> Self {
        Self {
            max_results: search.max_results,
            pages_per_strategy: search.pages_per_strategy,
            per_page: search.per_page,
            strategy_delay: search.strategy_delay(),
            batch_size: search.batch_size,
            pace_pages: search.pace_pages,
            batch_delay,
        }
    }
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default(), Duration::ZERO)
    }
}

/// Executes discovery for one run
pub struct SearchStrategyRunner {
    client: Arc<dyn HostClient>,
    processor: Arc<RepositoryProcessor>,
    seeds: Vec<String>,
    strategies: Vec<SearchStrategy>,
    options: RunnerOptions,
    cancel: CancelFlag,
}

impl SearchStrategyRunner {
    pub fn new(
        client: Arc<dyn HostClient>,
        processor: Arc<RepositoryProcessor>,
        options: RunnerOptions,
    ) -> Self {
        Self {
            client,
            processor,
            seeds: Vec::new(),
            strategies: Vec::new(),
            options,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_seeds(mut self, seeds: Vec<String>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<SearchStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run seeds and every strategy, returning the deduplicated records
    pub async fn run(&self) -> CollectionResult<MarketplaceRecord> {
        let started = Instant::now();
        let mut result = CollectionResult::new();
        let mut seen = HashSet::new();

        let mut seed_ids = Vec::new();
        for seed in &self.seeds {
            match seed.parse::<RepoId>() {
                Ok(id) => {
                    if seen.insert(id.key()) {
                        seed_ids.push(id);
                    }
                }
                Err(e) => result.warn(format!("seed '{}': {}", seed, e)),
            }
        }
        if !seed_ids.is_empty() {
            tracing::info!("Resolving {} seed repositories", seed_ids.len());
            result.add_source(SEED_SOURCE);
            self.resolve(seed_ids, &mut result).await;
        }

        for (index, strategy) in self.strategies.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::info!("Run cancelled, skipping remaining strategies");
                break;
            }
            if result.data.len() >= self.options.max_results {
                tracing::info!("Result cap {} reached", self.options.max_results);
                break;
            }
            if index > 0 {
                sleep(self.options.strategy_delay).await;
            }

            let remaining = self.options.max_results - result.data.len();
            let (ids, failure) = self.discover(strategy, &mut seen, remaining).await;
            if let Some(e) = failure {
                tracing::warn!("Strategy {} failed: {}", strategy.name, e);
                result.error(format!("strategy {}: {}", strategy.name, e));
            }
            tracing::info!(
                "Strategy {} found {} new repositories",
                strategy.name,
                ids.len()
            );
            if !ids.is_empty() {
                result.add_source(strategy.name.clone());
                self.resolve(ids, &mut result).await;
            }
        }

        if result.data.len() > self.options.max_results {
            result.data.truncate(self.options.max_results);
            result.metadata.successful_items = result.data.len();
            result.metadata.total_items =
                result.metadata.successful_items + result.metadata.failed_items;
        }
        result.metadata.collection_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// Page through one strategy, returning identifiers not seen before.
    ///
    /// A failing page ends the strategy; identifiers from earlier pages are
    /// still returned.
    async fn discover(
        &self,
        strategy: &SearchStrategy,
        seen: &mut HashSet<String>,
        limit: usize,
    ) -> (Vec<RepoId>, Option<FetchError>) {
        let per_page = self.options.per_page.clamp(1, strategy.mode.max_per_page());
        let mut found = Vec::new();

        for page in 1..=self.options.pages_per_strategy {
            if page > 1 && self.options.pace_pages {
                sleep(strategy.mode.min_page_interval()).await;
            }

            let results = match self
                .client
                .search(strategy.mode, &strategy.query, page, per_page)
                .await
            {
                Ok(results) => results,
                Err(e) => return (found, Some(e)),
            };

            for id in &results.repositories {
                if seen.insert(id.key()) {
                    found.push(id.clone());
                }
            }

            if found.len() >= limit || !results.has_more(page, per_page) {
                break;
            }
        }

        (found, None)
    }

    async fn resolve(&self, ids: Vec<RepoId>, result: &mut CollectionResult<MarketplaceRecord>) {
        for (index, batch) in ids.chunks(self.options.batch_size.max(1)).enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            if index > 0 {
                sleep(self.options.batch_delay).await;
            }

            let resolutions = join_all(batch.iter().map(|id| self.processor.process(id))).await;
            for resolution in resolutions {
                match resolution {
                    Resolution::Resolved { record, warnings } => {
                        for w in warnings {
                            result.warn(w);
                        }
                        result.push(record);
                    }
                    Resolution::NotFound => {}
                    Resolution::Failed(message) => result.fail(message),
                }
            }
        }
    }
}

async fn sleep(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::fake::FakeHost;
    use crate::processor::ProcessorOptions;
    use crate::scoring::QualityScorer;
    use crate::search::SearchMode;
    use chrono::{TimeZone, Utc};

    fn options() -> RunnerOptions {
        RunnerOptions {
            max_results: 100,
            pages_per_strategy: 3,
            per_page: 2,
            strategy_delay: Duration::ZERO,
            batch_size: 2,
            pace_pages: false,
            batch_delay: Duration::ZERO,
        }
    }

    fn runner(host: Arc<FakeHost>, options: RunnerOptions) -> SearchStrategyRunner {
        let scorer = QualityScorer::new(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        let processor = Arc::new(RepositoryProcessor::new(
            host.clone(),
            scorer,
            ProcessorOptions::default(),
        ));
        SearchStrategyRunner::new(host, processor, options)
    }

    fn ids(result: &CollectionResult<MarketplaceRecord>) -> Vec<String> {
        result
            .data
            .iter()
            .map(|r| r.marketplace.id.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_seeds_and_strategies_deduplicate() {
        let host = Arc::new(
            FakeHost::new()
                .with_repos(&["a/one", "a/two", "a/three", "b/four"])
                .with_search("topic:x", &[&["A/Two", "b/four"]]),
        );
        let result = runner(host, options())
            .with_seeds(vec!["a/one".into(), "a/two".into(), "a/three".into()])
            .with_strategies(vec![SearchStrategy::new("topic", "topic:x", SearchMode::RepoSearch)])
            .run()
            .await;

        assert_eq!(result.data.len(), 4);
        assert_eq!(ids(&result), vec!["a/one", "a/two", "a/three", "b/four"]);
        assert_eq!(result.metadata.sources, vec!["seeds", "topic"]);
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_missing_seed_is_skipped() {
        let host = Arc::new(FakeHost::new().with_repos(&["a/one"]));
        let result = runner(host, options())
            .with_seeds(vec!["a/one".into(), "gone/repo".into(), "not a repo".into()])
            .run()
            .await;

        assert_eq!(ids(&result), vec!["a/one"]);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_strategy_does_not_abort_run() {
        let host = Arc::new(
            FakeHost::new()
                .with_repos(&["c/kit"])
                .with_search_error("broken", FetchError::Unauthorized("bad token".into()))
                .with_search("fine", &[&["c/kit"]]),
        );
        let result = runner(host, options())
            .with_strategies(vec![
                SearchStrategy::new("broken", "broken", SearchMode::CodeSearch),
                SearchStrategy::new("fine", "fine", SearchMode::RepoSearch),
            ])
            .run()
            .await;

        assert_eq!(ids(&result), vec!["c/kit"]);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("strategy broken"));
    }

    #[tokio::test]
    async fn test_pagination_stops_at_page_budget() {
        let host = Arc::new(
            FakeHost::new()
                .with_repos(&["p/1", "p/2", "p/3", "p/4", "p/5", "p/6", "p/7", "p/8"])
                .with_search(
                    "many",
                    &[&["p/1", "p/2"], &["p/3", "p/4"], &["p/5", "p/6"], &["p/7", "p/8"]],
                ),
        );
        let result = runner(host.clone(), options())
            .with_strategies(vec![SearchStrategy::new("many", "many", SearchMode::RepoSearch)])
            .run()
            .await;

        assert_eq!(result.data.len(), 6);
        let searches = host.log().iter().filter(|l| l.starts_with("search")).count();
        assert_eq!(searches, 3);
    }

    #[tokio::test]
    async fn test_result_cap() {
        let host = Arc::new(
            FakeHost::new()
                .with_repos(&["a/1", "a/2", "a/3", "b/1", "b/2"])
                .with_search("q", &[&["b/1", "b/2"]]),
        );
        let result = runner(host.clone(), RunnerOptions {
            max_results: 3,
            ..options()
        })
        .with_seeds(vec!["a/1".into(), "a/2".into(), "a/3".into()])
        .with_strategies(vec![SearchStrategy::new("q", "q", SearchMode::RepoSearch)])
        .run()
        .await;

        assert_eq!(result.data.len(), 3);
        assert!(!host.log().iter().any(|l| l.starts_with("search")));
    }

    #[tokio::test]
    async fn test_failed_repository_recorded() {
        let host = Arc::new(
            FakeHost::new()
                .with_repos(&["a/ok"])
                .with_repo_error("a/bad", FetchError::Timeout("30s".into())),
        );
        let result = runner(host, options())
            .with_seeds(vec!["a/ok".into(), "a/bad".into()])
            .run()
            .await;

        assert_eq!(result.data.len(), 1);
        assert_eq!(result.metadata.failed_items, 1);
        assert_eq!(result.metadata.successful_items, 1);
        assert!(result.errors[0].contains("a/bad"));
    }

    #[tokio::test]
    async fn test_cancelled_run_issues_nothing() {
        let host = Arc::new(FakeHost::new().with_repos(&["a/one"]));
        let runner = runner(host.clone(), options())
            .with_seeds(vec!["a/one".into()])
            .with_strategies(vec![SearchStrategy::new("q", "q", SearchMode::RepoSearch)]);
        runner.cancel_flag().cancel();

        let result = runner.run().await;
        assert!(result.is_empty());
        assert_eq!(host.requests(), 0);
    }
}

//! Aggregation
//!
//! - `stats`: totals, ranked lists, language histogram, tag table
//! - `category`: keyword buckets
//! - `health`: run health artifact
//! - `writer`: artifact files

pub mod category;
pub mod health;
pub mod stats;
pub mod writer;

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::types::{Marketplace, MarketplaceRecord, Plugin};

pub use category::{CategoryBucket, CategoryDef, CategoryIndex, CategoryStore, BUILTIN_CATEGORIES};
pub use health::{HealthMetrics, HealthReport, HealthStatus};
pub use stats::{tag_table, RankedMarketplace, Statistics, TagCount, MAX_TAGS, TOP_N};
pub use writer::{
    ArtifactWriter, ARTIFACT_FILES, CATEGORIES_FILE, COMBINED_FILE, HEALTH_FILE,
    MARKETPLACES_FILE, PLUGINS_FILE, STATS_FILE, TAGS_FILE,
};

/// Everything derived from one run's records
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub generated_at: DateTime<Utc>,
    pub marketplaces: Vec<Marketplace>,
    pub plugins: Vec<Plugin>,
    pub stats: Statistics,
    pub categories: CategoryIndex,
    pub tags: Vec<TagCount>,
}

/// Combines marketplace records into output collections
#[derive(Debug, Clone, Default)]
pub struct DataAggregator {
    categories: CategoryStore,
}

impl DataAggregator {
    pub fn new(categories: CategoryStore) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &CategoryStore {
        &self.categories
    }

    /// Flatten, deduplicate and summarize records.
    ///
    /// Marketplaces are ordered by quality score (then id), plugins by id.
    /// A repeated marketplace or plugin id keeps its first occurrence.
    pub fn aggregate(&self, records: &[MarketplaceRecord], generated_at: DateTime<Utc>) -> Aggregate {
        let mut marketplace_ids = HashSet::new();
        let mut plugin_ids = HashSet::new();
        let mut marketplaces = Vec::with_capacity(records.len());
        let mut plugins = Vec::new();

        for record in records {
            if !marketplace_ids.insert(record.marketplace.id.to_lowercase()) {
                tracing::debug!("Duplicate marketplace {} dropped", record.marketplace.id);
                continue;
            }
            let mut marketplace = record.marketplace.clone();
            marketplace.plugins.clear();
            for plugin in &record.plugins {
                if plugin.marketplace_id != marketplace.id {
                    continue;
                }
                if plugin_ids.insert(plugin.id.to_lowercase()) {
                    marketplace.plugins.push(plugin.id.clone());
                    plugins.push(plugin.clone());
                }
            }
            marketplaces.push(marketplace);
        }

        marketplaces.sort_by(|a, b| {
            b.quality_score
                .cmp(&a.quality_score)
                .then_with(|| a.id.cmp(&b.id))
        });
        plugins.sort_by(|a, b| a.id.cmp(&b.id));

        let stats = Statistics::compute(&marketplaces, &plugins, generated_at);
        let categories = self
            .categories
            .bucket(&marketplaces, &plugins, generated_at);
        let tags = tag_table(&marketplaces, &plugins);

        tracing::info!(
            "Aggregated {} marketplaces and {} plugins",
            marketplaces.len(),
            plugins.len()
        );

        Aggregate {
            generated_at,
            marketplaces,
            plugins,
            stats,
            categories,
            tags,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{OwnerInfo, PluginOrigin, PluginSource, RepositoryStats, SourceType};

    pub(crate) fn record(id: &str, score: u8, plugin_names: &[&str]) -> MarketplaceRecord {
        let plugins: Vec<Plugin> = plugin_names
            .iter()
            .map(|name| Plugin {
                id: format!("{}/{}", id, name),
                name: name.to_string(),
                version: Some("1.0.0".into()),
                author: None,
                description: None,
                category: None,
                tags: vec![],
                source: PluginSource {
                    source_type: SourceType::Github,
                    url: format!("https://github.com/{}", id),
                    path: None,
                },
                capabilities: Default::default(),
                marketplace_id: id.to_string(),
                origin: PluginOrigin::Manifest,
                validated: true,
                quality_score: score,
            })
            .collect();

        MarketplaceRecord {
            marketplace: Marketplace {
                id: id.into(),
                name: id.into(),
                description: None,
                owner: OwnerInfo {
                    name: "o".into(),
                    url: "https://github.com/o".into(),
                    owner_type: "User".into(),
                },
                repository: RepositoryStats {
                    stars: score as u64,
                    ..RepositoryStats::default()
                },
                manifest_url: None,
                plugins: plugins.iter().map(|p| p.id.clone()).collect(),
                tags: vec![],
                verified: true,
                quality_score: score,
                last_scanned: Utc::now(),
                added_at: Utc::now(),
            },
            plugins,
        }
    }

    #[test]
    fn test_aggregate_orders_and_counts() {
        let records = vec![record("o/low", 10, &["a"]), record("o/high", 90, &["b", "c"])];
        let aggregate = DataAggregator::default().aggregate(&records, Utc::now());

        assert_eq!(aggregate.marketplaces[0].id, "o/high");
        assert_eq!(aggregate.plugins.len(), 3);
        assert_eq!(aggregate.plugins[0].id, "o/high/b");
        assert_eq!(aggregate.stats.total_plugins, 3);
        assert_eq!(aggregate.stats.total_marketplaces, 2);
    }

    #[test]
    fn test_aggregate_drops_duplicates() {
        let records = vec![
            record("o/m", 10, &["a", "a"]),
            record("O/M", 50, &["z"]),
        ];
        let aggregate = DataAggregator::default().aggregate(&records, Utc::now());

        assert_eq!(aggregate.marketplaces.len(), 1);
        assert_eq!(aggregate.plugins.len(), 1);
        assert_eq!(aggregate.marketplaces[0].plugins, vec!["o/m/a"]);
    }

    #[test]
    fn test_every_plugin_references_a_marketplace() {
        let mut stray = record("o/m", 10, &["a"]);
        stray.plugins[0].marketplace_id = "x/y".into();
        let aggregate = DataAggregator::default().aggregate(&[stray], Utc::now());

        let ids: HashSet<_> = aggregate.marketplaces.iter().map(|m| &m.id).collect();
        assert!(aggregate.plugins.iter().all(|p| ids.contains(&p.marketplace_id)));
        assert!(aggregate.plugins.is_empty());
    }
}

//! Artifact files
//!
//! Every artifact is a pretty-printed JSON document written as an independent
//! full-file overwrite (temp file + rename).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Aggregate, CategoryIndex, HealthReport, Statistics, TagCount};
use crate::error::Result;
use crate::types::{Marketplace, Plugin};

pub const MARKETPLACES_FILE: &str = "marketplaces.json";
pub const PLUGINS_FILE: &str = "plugins.json";
pub const STATS_FILE: &str = "stats.json";
pub const CATEGORIES_FILE: &str = "categories.json";
pub const TAGS_FILE: &str = "tags.json";
pub const COMBINED_FILE: &str = "combined.json";
pub const HEALTH_FILE: &str = "health.json";

/// Every artifact of one generation, in write order
pub const ARTIFACT_FILES: &[&str] = &[
    MARKETPLACES_FILE,
    PLUGINS_FILE,
    STATS_FILE,
    CATEGORIES_FILE,
    TAGS_FILE,
    COMBINED_FILE,
    HEALTH_FILE,
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarketplacesDoc<'a> {
    generated_at: DateTime<Utc>,
    total: usize,
    marketplaces: &'a [Marketplace],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PluginsDoc<'a> {
    generated_at: DateTime<Utc>,
    total: usize,
    plugins: &'a [Plugin],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TagsDoc<'a> {
    generated_at: DateTime<Utc>,
    tags: &'a [TagCount],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CombinedDoc<'a> {
    generated_at: DateTime<Utc>,
    marketplaces: &'a [Marketplace],
    plugins: &'a [Plugin],
    stats: &'a Statistics,
}

/// Writes artifacts into one output directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write all artifacts, returning their paths in write order
    pub fn write(&self, aggregate: &Aggregate, health: &HealthReport) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)?;
        let generated_at = aggregate.generated_at;

        let written = vec![
            self.write_json(
                MARKETPLACES_FILE,
                &MarketplacesDoc {
                    generated_at,
                    total: aggregate.marketplaces.len(),
                    marketplaces: &aggregate.marketplaces,
                },
            )?,
            self.write_json(
                PLUGINS_FILE,
                &PluginsDoc {
                    generated_at,
                    total: aggregate.plugins.len(),
                    plugins: &aggregate.plugins,
                },
            )?,
            self.write_json(STATS_FILE, &aggregate.stats)?,
            self.write_json::<CategoryIndex>(CATEGORIES_FILE, &aggregate.categories)?,
            self.write_json(
                TAGS_FILE,
                &TagsDoc {
                    generated_at,
                    tags: &aggregate.tags,
                },
            )?,
            self.write_json(
                COMBINED_FILE,
                &CombinedDoc {
                    generated_at,
                    marketplaces: &aggregate.marketplaces,
                    plugins: &aggregate.plugins,
                    stats: &aggregate.stats,
                },
            )?,
            self.write_json(HEALTH_FILE, health)?,
        ];

        tracing::info!("Wrote {} artifacts to {}", written.len(), self.dir.display());
        Ok(written)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{}.tmp", name));
        let content = serde_json::to_string_pretty(value)?;
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        tracing::debug!("Wrote {}", path.display());
        Ok(path)
    }
}

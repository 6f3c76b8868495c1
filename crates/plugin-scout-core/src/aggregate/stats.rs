//! Global statistics and the tag-frequency table

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Marketplace, Plugin};

/// Entries in each ranked list
pub const TOP_N: usize = 10;

/// Largest tag table written
pub const MAX_TAGS: usize = 50;

/// A marketplace in a ranked list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedMarketplace {
    pub id: String,
    pub name: String,
    pub stars: u64,
    pub quality_score: u8,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Marketplace> for RankedMarketplace {
    fn from(m: &Marketplace) -> Self {
        Self {
            id: m.id.clone(),
            name: m.name.clone(),
            stars: m.repository.stars,
            quality_score: m.quality_score,
            updated_at: m.repository.updated_at,
        }
    }
}

/// Content of `stats.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub generated_at: DateTime<Utc>,
    pub total_marketplaces: usize,
    pub total_plugins: usize,
    pub valid_plugins: usize,
    pub verified_marketplaces: usize,
    pub average_quality_score: f64,
    pub total_stars: u64,
    pub top_by_stars: Vec<RankedMarketplace>,
    pub recently_updated: Vec<RankedMarketplace>,
    /// Primary language -> marketplace count
    pub languages: BTreeMap<String, usize>,
}

impl Statistics {
    pub fn compute(
        marketplaces: &[Marketplace],
        plugins: &[Plugin],
        generated_at: DateTime<Utc>,
    ) -> Self {
        let total_quality: u64 = marketplaces.iter().map(|m| m.quality_score as u64).sum();
        let average_quality_score = if marketplaces.is_empty() {
            0.0
        } else {
            let avg = total_quality as f64 / marketplaces.len() as f64;
            (avg * 10.0).round() / 10.0
        };

        let mut by_stars: Vec<&Marketplace> = marketplaces.iter().collect();
        by_stars.sort_by(|a, b| {
            b.repository
                .stars
                .cmp(&a.repository.stars)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut by_update: Vec<&Marketplace> = marketplaces
            .iter()
            .filter(|m| m.repository.updated_at.is_some())
            .collect();
        by_update.sort_by(|a, b| {
            b.repository
                .updated_at
                .cmp(&a.repository.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut languages = BTreeMap::new();
        for language in marketplaces
            .iter()
            .filter_map(|m| m.repository.language.as_deref())
        {
            *languages.entry(language.to_string()).or_insert(0) += 1;
        }

        Self {
            generated_at,
            total_marketplaces: marketplaces.len(),
            total_plugins: plugins.len(),
            valid_plugins: plugins.iter().filter(|p| p.validated).count(),
            verified_marketplaces: marketplaces.iter().filter(|m| m.verified).count(),
            average_quality_score,
            total_stars: marketplaces.iter().map(|m| m.repository.stars).sum(),
            top_by_stars: by_stars.into_iter().take(TOP_N).map(Into::into).collect(),
            recently_updated: by_update.into_iter().take(TOP_N).map(Into::into).collect(),
            languages,
        }
    }
}

/// One row of `tags.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Tag frequencies over marketplace and plugin tags, most frequent first
pub fn tag_table(marketplaces: &[Marketplace], plugins: &[Plugin]) -> Vec<TagCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let tags = marketplaces
        .iter()
        .flat_map(|m| m.tags.iter())
        .chain(plugins.iter().flat_map(|p| p.tags.iter()));
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() {
            *counts.entry(tag).or_insert(0) += 1;
        }
    }

    let mut table: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount { tag, count })
        .collect();
    table.sort_by(|a, b| (Reverse(a.count), &a.tag).cmp(&(Reverse(b.count), &b.tag)));
    table.truncate(MAX_TAGS);
    table
}

//! Search strategy definitions
//!
//! A strategy is a named query plus the host search endpoint it runs against.
//! Code search and repository search differ in endpoint, result shape and
//! rate budget; `SearchMode` carries those differences so the runner can
//! treat every strategy the same way.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::RepoId;

/// Host search endpoint used by a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    /// File content search; results point at the containing repository
    CodeSearch,
    /// Repository metadata search
    RepoSearch,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeSearch => "code-search",
            Self::RepoSearch => "repo-search",
        }
    }

    /// REST path relative to the API base
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::CodeSearch => "search/code",
            Self::RepoSearch => "search/repositories",
        }
    }

    /// Largest page size the endpoint accepts
    pub fn max_per_page(&self) -> u32 {
        100
    }

    /// Minimum spacing between two pages of the same strategy.
    ///
    /// Code search allows 10 authenticated requests per minute, repository
    /// search 30.
    pub fn min_page_interval(&self) -> Duration {
        match self {
            Self::CodeSearch => Duration::from_secs(6),
            Self::RepoSearch => Duration::from_secs(2),
        }
    }

    /// Extract repository identifiers from one page of search results
    pub fn parse_page(&self, body: &serde_json::Value) -> SearchPage {
        let total_count = body["total_count"].as_u64().unwrap_or(0);
        let items = body["items"].as_array().cloned().unwrap_or_default();

        let mut repositories = Vec::with_capacity(items.len());
        for item in &items {
            let full_name = match self {
                Self::CodeSearch => item["repository"]["full_name"].as_str(),
                Self::RepoSearch => item["full_name"].as_str(),
            };
            if let Some(id) = full_name.and_then(|n| n.parse::<RepoId>().ok()) {
                // code search returns one hit per file, several per repo
                if !repositories.contains(&id) {
                    repositories.push(id);
                }
            }
        }

        SearchPage {
            total_count,
            item_count: items.len(),
            repositories,
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One page of search results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Total hits reported by the host
    pub total_count: u64,
    /// Raw items on this page (before per-repository collapsing)
    pub item_count: usize,
    pub repositories: Vec<RepoId>,
}

impl SearchPage {
    /// Whether another page could exist after this one
    pub fn has_more(&self, page: u32, per_page: u32) -> bool {
        self.item_count as u64 >= per_page as u64
            && (page as u64) * (per_page as u64) < self.total_count
    }
}

/// A named discovery query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStrategy {
    pub name: String,
    pub query: String,
    pub mode: SearchMode,
}

impl SearchStrategy {
    pub fn new(name: impl Into<String>, query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            mode,
        }
    }
}

/// Strategies run when the config does not list its own
pub fn default_strategies() -> Vec<SearchStrategy> {
    vec![
        SearchStrategy::new(
            "marketplace-manifest",
            "filename:marketplace.json path:.claude-plugin",
            SearchMode::CodeSearch,
        ),
        SearchStrategy::new(
            "plugin-manifest",
            "filename:plugin.json path:.claude-plugin",
            SearchMode::CodeSearch,
        ),
        SearchStrategy::new(
            "marketplace-topic",
            "topic:claude-code-marketplace",
            SearchMode::RepoSearch,
        ),
        SearchStrategy::new(
            "plugins-topic",
            "topic:claude-code-plugins",
            SearchMode::RepoSearch,
        ),
        SearchStrategy::new(
            "keyword",
            "claude code plugin marketplace in:name,description,readme",
            SearchMode::RepoSearch,
        ),
    ]
}

//! Marketplace and plugin type definitions
//!
//! Records produced by one pipeline run. `Repository` is ephemeral host
//! metadata; `Marketplace` and `Plugin` are what gets written to the output
//! artifacts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};

/// `owner/name` identifier of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Case-insensitive identity used for deduplication
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.name).to_lowercase()
    }

    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }

    fn valid_segment(segment: &str) -> bool {
        !segment.is_empty()
            && segment != "."
            && segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    }
}

impl FromStr for RepoId {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s
            .trim()
            .trim_start_matches("https://github.com/")
            .trim_end_matches('/')
            .trim_end_matches(".git");
        let mut parts = trimmed.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None)
                if Self::valid_segment(owner) && Self::valid_segment(name) =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(ScoutError::InvalidRepoId { id: s.to_string() }),
        }
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Raw repository metadata as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepoId,
    pub description: Option<String>,
    pub owner_type: String,
    pub stars: u64,
    pub forks: u64,
    pub license: Option<String>,
    pub topics: Vec<String>,
    pub language: Option<String>,
    pub default_branch: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub pushed_at: Option<DateTime<Utc>>,
}

impl Repository {
    /// Most recent activity timestamp (push wins over metadata update)
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match (self.pushed_at, self.updated_at) {
            (Some(p), Some(u)) => Some(p.max(u)),
            (p, u) => p.or(u),
        }
    }

    pub fn stats(&self) -> RepositoryStats {
        RepositoryStats {
            url: self.id.html_url(),
            stars: self.stars,
            forks: self.forks,
            language: self.language.clone(),
            license: self.license.clone(),
            topics: self.topics.clone(),
            default_branch: self.default_branch.clone(),
            created_at: self.created_at,
            updated_at: self.last_activity(),
        }
    }
}

/// Repository statistics persisted with each marketplace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStats {
    pub url: String,
    pub stars: u64,
    pub forks: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub default_branch: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Marketplace owner information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerInfo {
    pub name: String,
    pub url: String,
    /// "User" or "Organization"
    #[serde(rename = "type")]
    pub owner_type: String,
}

/// A repository that declares (or conventionally contains) plugins
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marketplace {
    /// `owner/repo`
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner: OwnerInfo,
    pub repository: RepositoryStats,
    #[serde(default)]
    pub manifest_url: Option<String>,
    /// Plugin ids belonging to this marketplace
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub verified: bool,
    pub quality_score: u8,
    pub last_scanned: DateTime<Utc>,
    pub added_at: DateTime<Utc>,
}

/// Where a plugin's files live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Github,
    Url,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Declared plugin capabilities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub hooks: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
}

impl Capabilities {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
            && self.agents.is_empty()
            && self.hooks.is_empty()
            && self.mcp_servers.is_empty()
    }
}

/// How a plugin was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginOrigin {
    /// Declared in the marketplace manifest
    Manifest,
    /// Found by scanning a conventional plugin directory
    Directory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plugin {
    /// `owner/repo/name`
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: PluginSource,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub marketplace_id: String,
    pub origin: PluginOrigin,
    pub validated: bool,
    pub quality_score: u8,
}

impl Plugin {
    pub fn make_id(repo: &RepoId, name: &str) -> String {
        format!("{}/{}", repo, name)
    }
}

/// One resolved repository: its marketplace record plus its plugins
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketplaceRecord {
    pub marketplace: Marketplace,
    pub plugins: Vec<Plugin>,
}

/// Metadata describing one collection call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    pub total_items: usize,
    pub successful_items: usize,
    pub failed_items: usize,
    pub collection_time_ms: u64,
    pub sources: Vec<String>,
}

/// Result of a collection call: data plus accumulated diagnostics
///
/// Partial failure never turns into an `Err`; failures land in `errors`
/// (item dropped) or `warnings` (item kept, something was off).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResult<T> {
    pub data: Vec<T>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: CollectionMetadata,
}

impl<T> Default for CollectionResult<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            metadata: CollectionMetadata::default(),
        }
    }
}

impl<T> CollectionResult<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.data.push(item);
        self.metadata.total_items += 1;
        self.metadata.successful_items += 1;
    }

    /// Record a failed item
    pub fn fail(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.metadata.total_items += 1;
        self.metadata.failed_items += 1;
    }

    /// Record an error that is not tied to a single item (e.g. a strategy)
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn add_source(&mut self, source: impl Into<String>) {
        let source = source.into();
        if !self.metadata.sources.contains(&source) {
            self.metadata.sources.push(source);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

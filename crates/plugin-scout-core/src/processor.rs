//! Repository resolution
//!
//! Turns one repository identifier into a marketplace record: metadata,
//! the first manifest found among the candidate paths, and any
//! directory-per-plugin definitions the manifest does not declare.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::github::{FetchError, HostClient};
use crate::scoring::{plugin_score, QualityScorer};
use crate::types::{
    Capabilities, Marketplace, MarketplaceRecord, OwnerInfo, Plugin, PluginOrigin, PluginSource,
    RepoId, Repository, SourceType,
};
use crate::validation::{security, ManifestSchema, ManifestValidator, ValidationReport};

/// What a manifest candidate describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestKind {
    /// Lists several plugins
    Marketplace,
    /// The repository itself is one plugin
    Plugin,
}

#[derive(Debug, Clone, Copy)]
pub struct ManifestCandidate {
    pub path: &'static str,
    pub kind: ManifestKind,
}

/// Manifest locations, probed in order; first hit wins
pub const MANIFEST_CANDIDATES: &[ManifestCandidate] = &[
    ManifestCandidate {
        path: ".claude-plugin/marketplace.json",
        kind: ManifestKind::Marketplace,
    },
    ManifestCandidate {
        path: "marketplace.json",
        kind: ManifestKind::Marketplace,
    },
    ManifestCandidate {
        path: ".claude/marketplace.json",
        kind: ManifestKind::Marketplace,
    },
    ManifestCandidate {
        path: "plugins.json",
        kind: ManifestKind::Marketplace,
    },
    ManifestCandidate {
        path: ".claude-plugin/plugin.json",
        kind: ManifestKind::Plugin,
    },
];

/// Conventional directories holding one sub-directory per plugin
pub const PLUGIN_DIRS: &[&str] = &["plugins", "agents", "commands", ".claude/plugins"];

/// Plugin definition files inside a plugin directory, probed in order
pub const PLUGIN_FILES: &[&str] = &[".claude-plugin/plugin.json", "plugin.json"];

#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    pub strict: bool,
    pub max_manifest_bytes: usize,
    /// Pause between sub-fetches
    pub request_delay: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            strict: false,
            max_manifest_bytes: crate::validation::DEFAULT_MAX_MANIFEST_BYTES,
            request_delay: Duration::ZERO,
        }
    }
}

/// Outcome of resolving one repository
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved {
        record: MarketplaceRecord,
        warnings: Vec<String>,
    },
    /// The repository does not exist (or is not visible)
    NotFound,
    /// Metadata could not be fetched
    Failed(String),
}

struct FoundManifest {
    candidate: ManifestCandidate,
    text: String,
}

/// Resolves repository identifiers into marketplace records
pub struct RepositoryProcessor {
    client: Arc<dyn HostClient>,
    scorer: QualityScorer,
    options: ProcessorOptions,
}

impl RepositoryProcessor {
    pub fn new(client: Arc<dyn HostClient>, scorer: QualityScorer, options: ProcessorOptions) -> Self {
        Self {
            client,
            scorer,
            options,
        }
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    fn now(&self) -> DateTime<Utc> {
        self.scorer.as_of()
    }

    async fn pause(&self) {
        if !self.options.request_delay.is_zero() {
            tokio::time::sleep(self.options.request_delay).await;
        }
    }

    fn validator(&self, schema: ManifestSchema) -> ManifestValidator {
        ManifestValidator::new(schema)
            .strict(self.options.strict)
            .max_bytes(self.options.max_manifest_bytes)
    }

    pub async fn process(&self, id: &RepoId) -> Resolution {
        let repo = match self.client.repository(id).await {
            Ok(repo) => repo,
            Err(e) if e.is_absence() => {
                tracing::debug!("Repository {} not found, skipping", id);
                return Resolution::NotFound;
            }
            Err(e) => {
                tracing::warn!("Failed to fetch metadata for {}: {}", id, e);
                return Resolution::Failed(format!("{}: {}", id, e));
            }
        };

        let mut warnings = Vec::new();

        self.pause().await;
        let manifest = self.find_manifest(&repo.id, &mut warnings).await;

        let mut verified = false;
        let mut manifest_doc = None;
        let mut plugins: Vec<(Plugin, ValidationReport)> = Vec::new();

        if let Some(found) = &manifest {
            match found.candidate.kind {
                _ if self.oversized(&repo.id, found.candidate.path, &found.text, &mut warnings) => {}
                ManifestKind::Marketplace => {
                    let report = self.validator(ManifestSchema::Marketplace).validate(&found.text);
                    verified = report.is_valid;
                    for e in &report.errors {
                        warnings.push(format!("{}: {}: {}", repo.id, found.candidate.path, e));
                    }
                    if let Ok(doc) = serde_json::from_str::<Value>(&found.text) {
                        plugins = self.declared_plugins(&repo.id, &doc, &mut warnings);
                        // a rejected document never names the marketplace
                        if verified {
                            manifest_doc = Some(doc);
                        }
                    }
                }
                ManifestKind::Plugin => match serde_json::from_str::<Value>(&found.text) {
                    Ok(doc) => {
                        let report = self.validator(ManifestSchema::Plugin).validate(&found.text);
                        let source = PluginSource {
                            source_type: SourceType::Github,
                            url: repo.id.html_url(),
                            path: None,
                        };
                        if let Some(plugin) =
                            build_plugin(&repo.id, &doc, source, PluginOrigin::Manifest)
                        {
                            if self.admit(&repo.id, &plugin, &doc, &mut warnings) {
                                plugins.push((plugin, report.clone()));
                            }
                        }
                        if report.is_valid {
                            manifest_doc = Some(doc);
                        }
                    }
                    Err(e) => warnings.push(format!(
                        "{}: {}: Invalid JSON: {}",
                        repo.id, found.candidate.path, e
                    )),
                },
            }
        }

        self.pause().await;
        let declared: HashSet<String> = plugins
            .iter()
            .map(|(p, _)| p.name.to_lowercase())
            .collect();
        plugins.extend(self.scan_plugin_dirs(&repo.id, &declared, &mut warnings).await);

        let record = self.assemble(
            &repo,
            manifest.as_ref(),
            manifest_doc.as_ref(),
            verified,
            plugins,
            &mut warnings,
        );
        Resolution::Resolved { record, warnings }
    }

    async fn find_manifest(&self, id: &RepoId, warnings: &mut Vec<String>) -> Option<FoundManifest> {
        for candidate in MANIFEST_CANDIDATES {
            match self.client.file(id, candidate.path).await {
                Ok(Some(text)) => {
                    tracing::debug!("Found manifest {} in {}", candidate.path, id);
                    return Some(FoundManifest {
                        candidate: *candidate,
                        text,
                    });
                }
                Ok(None) => {}
                Err(e) => note_failure(id, candidate.path, &e, warnings),
            }
        }
        None
    }

    fn declared_plugins(
        &self,
        id: &RepoId,
        doc: &Value,
        warnings: &mut Vec<String>,
    ) -> Vec<(Plugin, ValidationReport)> {
        let entries = match doc {
            Value::Array(items) => items.as_slice(),
            other => match other.get("plugins").and_then(Value::as_array) {
                Some(items) => items.as_slice(),
                None => return Vec::new(),
            },
        };

        let validator = self.validator(ManifestSchema::Plugin);
        let mut seen = HashSet::new();
        let mut plugins = Vec::new();

        for (index, entry) in entries.iter().enumerate() {
            let source = entry_source(id, entry);
            let Some(plugin) = build_plugin(id, entry, source, PluginOrigin::Manifest) else {
                warnings.push(format!("{}: plugins[{}] has no name, skipped", id, index));
                continue;
            };
            if !seen.insert(plugin.name.to_lowercase()) {
                warnings.push(format!(
                    "{}: duplicate plugin '{}' ignored",
                    id, plugin.name
                ));
                continue;
            }
            if !self.admit(id, &plugin, entry, warnings) {
                continue;
            }
            plugins.push((plugin, validator.validate_value(entry)));
        }

        plugins
    }

    async fn scan_plugin_dirs(
        &self,
        id: &RepoId,
        declared: &HashSet<String>,
        warnings: &mut Vec<String>,
    ) -> Vec<(Plugin, ValidationReport)> {
        let mut found = Vec::new();
        let mut seen = declared.clone();

        for dir in PLUGIN_DIRS {
            let entries = match self.client.list_dir(id, dir).await {
                Ok(Some(entries)) => entries,
                Ok(None) => continue,
                Err(e) => {
                    note_failure(id, dir, &e, warnings);
                    continue;
                }
            };

            for entry in entries.iter().filter(|e| e.is_dir()) {
                if seen.contains(&entry.name.to_lowercase()) {
                    continue;
                }
                if let Some(plugin) = self.probe_plugin_dir(id, &entry.path, warnings).await {
                    seen.insert(plugin.0.name.to_lowercase());
                    found.push(plugin);
                }
            }
        }

        found
    }

    async fn probe_plugin_dir(
        &self,
        id: &RepoId,
        dir: &str,
        warnings: &mut Vec<String>,
    ) -> Option<(Plugin, ValidationReport)> {
        for file in PLUGIN_FILES {
            let path = format!("{}/{}", dir, file);
            let text = match self.client.file(id, &path).await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => {
                    note_failure(id, &path, &e, warnings);
                    continue;
                }
            };

            if self.oversized(id, &path, &text, warnings) {
                return None;
            }
            let report = self.validator(ManifestSchema::Plugin).validate(&text);
            let mut doc: Value = match serde_json::from_str(&text) {
                Ok(doc) => doc,
                Err(e) => {
                    warnings.push(format!("{}: {}: Invalid JSON: {}", id, path, e));
                    return None;
                }
            };
            // unnamed definitions take the directory name
            if str_field(&doc, "name").is_none() {
                if let Some(object) = doc.as_object_mut() {
                    let dir_name = dir.rsplit('/').next().unwrap_or(dir);
                    object.insert("name".to_string(), Value::String(dir_name.to_string()));
                }
            }
            let source = PluginSource {
                source_type: SourceType::Github,
                url: id.html_url(),
                path: Some(dir.to_string()),
            };
            return build_plugin(id, &doc, source, PluginOrigin::Directory)
                .filter(|plugin| self.admit(id, plugin, &doc, warnings))
                .map(|plugin| (plugin, report));
        }
        None
    }

    /// Documents over the size ceiling are never parsed
    fn oversized(&self, id: &RepoId, path: &str, text: &str, warnings: &mut Vec<String>) -> bool {
        if text.len() <= self.options.max_manifest_bytes {
            return false;
        }
        warnings.push(format!(
            "{}: {}: Manifest exceeds size limit ({} > {} bytes), not parsed",
            id,
            path,
            text.len(),
            self.options.max_manifest_bytes
        ));
        true
    }

    /// In strict mode a plugin whose definition trips a security rule is dropped
    fn admit(&self, id: &RepoId, plugin: &Plugin, doc: &Value, warnings: &mut Vec<String>) -> bool {
        if !self.options.strict {
            return true;
        }
        match security::scan(doc).first() {
            Some(finding) => {
                warnings.push(format!(
                    "{}: plugin '{}' dropped: Security: {}",
                    id, plugin.name, finding
                ));
                false
            }
            None => true,
        }
    }

    fn assemble(
        &self,
        repo: &Repository,
        manifest: Option<&FoundManifest>,
        doc: Option<&Value>,
        verified: bool,
        plugins: Vec<(Plugin, ValidationReport)>,
        warnings: &mut Vec<String>,
    ) -> MarketplaceRecord {
        let now = self.now();
        let stats = repo.stats();
        let score = self.scorer.score(&stats, plugins.len());

        let invalid = plugins.iter().filter(|(_, r)| !r.is_valid).count();
        if invalid > 0 {
            warnings.push(format!(
                "{}: {} of {} plugins failed validation",
                repo.id,
                invalid,
                plugins.len()
            ));
        }

        let plugins: Vec<Plugin> = plugins
            .into_iter()
            .map(|(mut plugin, report)| {
                plugin.validated = report.is_valid;
                plugin.quality_score =
                    plugin_score(score, report.errors.len(), report.warnings.len());
                plugin
            })
            .collect();

        let (name, description) = match (manifest.map(|m| m.candidate.kind), doc) {
            (Some(ManifestKind::Marketplace), Some(doc)) => (
                str_field(doc, "name"),
                str_field(doc, "description").or_else(|| {
                    doc.get("metadata")
                        .and_then(|m| str_field(m, "description"))
                }),
            ),
            _ => (None, None),
        };

        let mut tags: Vec<String> = Vec::new();
        let manifest_tags = doc
            .map(|d| string_list(d.get("tags").or_else(|| d.get("keywords"))))
            .unwrap_or_default();
        for tag in repo.topics.iter().chain(manifest_tags.iter()) {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let marketplace = Marketplace {
            id: repo.id.to_string(),
            name: name.unwrap_or_else(|| repo.id.name.clone()),
            description: description.or_else(|| repo.description.clone()),
            owner: OwnerInfo {
                name: repo.id.owner.clone(),
                url: format!("https://github.com/{}", repo.id.owner),
                owner_type: repo.owner_type.clone(),
            },
            repository: stats,
            manifest_url: manifest.map(|m| {
                format!(
                    "{}/blob/{}/{}",
                    repo.id.html_url(),
                    repo.default_branch,
                    m.candidate.path
                )
            }),
            plugins: plugins.iter().map(|p| p.id.clone()).collect(),
            tags,
            verified,
            quality_score: score,
            last_scanned: now,
            added_at: now,
        };

        MarketplaceRecord {
            marketplace,
            plugins,
        }
    }
}

fn note_failure(id: &RepoId, path: &str, err: &FetchError, warnings: &mut Vec<String>) {
    if err.is_absence() {
        tracing::debug!("{}: {} absent", id, path);
    } else {
        tracing::warn!("{}: {}: {}", id, path, err);
        warnings.push(format!("{}: {}: {}", id, path, err));
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Strings from an array, a single string, or an object's keys / `name` fields
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Object(_) => str_field(item, "name"),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    }
}

fn author_of(entry: &Value) -> Option<String> {
    match entry.get("author") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(obj @ Value::Object(_)) => str_field(obj, "name"),
        _ => None,
    }
}

fn url_source(url: &str) -> PluginSource {
    let source_type = if url.starts_with("https://github.com/") {
        SourceType::Github
    } else {
        SourceType::Url
    };
    PluginSource {
        source_type,
        url: url.to_string(),
        path: None,
    }
}

/// Where a declared plugin entry's files live
fn entry_source(id: &RepoId, entry: &Value) -> PluginSource {
    let local = |path: Option<String>| PluginSource {
        source_type: SourceType::Github,
        url: id.html_url(),
        path,
    };

    match entry.get("source") {
        Some(Value::String(s)) if s.starts_with("http://") || s.starts_with("https://") => {
            url_source(s)
        }
        Some(Value::String(s)) => {
            let path = s.trim().trim_start_matches("./").trim_end_matches('/');
            local((!path.is_empty()).then(|| path.to_string()))
        }
        Some(obj @ Value::Object(_)) => {
            let path = str_field(obj, "path");
            match (str_field(obj, "source").as_deref(), str_field(obj, "repo"), str_field(obj, "url")) {
                (Some("github"), Some(repo), _) => PluginSource {
                    source_type: SourceType::Github,
                    url: format!("https://github.com/{}", repo),
                    path,
                },
                (_, _, Some(url)) => PluginSource {
                    path,
                    ..url_source(&url)
                },
                _ => local(path),
            }
        }
        _ => match str_field(entry, "repository").or_else(|| str_field(entry, "homepage")) {
            Some(url) if url.starts_with("http") => url_source(&url),
            _ => local(None),
        },
    }
}

fn build_plugin(
    id: &RepoId,
    entry: &Value,
    source: PluginSource,
    origin: PluginOrigin,
) -> Option<Plugin> {
    let name = str_field(entry, "name")?;
    let capabilities = Capabilities {
        commands: string_list(entry.get("commands")),
        agents: string_list(entry.get("agents")),
        hooks: string_list(entry.get("hooks")),
        mcp_servers: string_list(entry.get("mcpServers")),
    };
    let tags = string_list(entry.get("tags").or_else(|| entry.get("keywords")));

    Some(Plugin {
        id: Plugin::make_id(id, &name),
        name,
        version: str_field(entry, "version"),
        author: author_of(entry),
        description: str_field(entry, "description"),
        category: str_field(entry, "category"),
        tags,
        source,
        capabilities,
        marketplace_id: id.to_string(),
        origin,
        validated: false,
        quality_score: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::fake::{repository, FakeHost};
    use crate::github::DirEntry;
    use chrono::TimeZone;

    const MARKETPLACE: &str = r#"{
        "name": "alice-tools",
        "owner": { "name": "Alice" },
        "metadata": { "description": "Alice's plugins" },
        "plugins": [
            {
                "name": "reviewer",
                "version": "1.0.0",
                "type": "agent",
                "author": { "name": "Alice" },
                "category": "review",
                "description": "Reviews code",
                "source": "./plugins/reviewer",
                "commands": ["review"],
                "keywords": ["review", "quality"]
            },
            { "name": "deployer", "source": { "source": "github", "repo": "alice/deployer" } },
            { "name": "reviewer", "source": "./plugins/other" },
            { "description": "nameless" }
        ]
    }"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn processor(host: FakeHost) -> RepositoryProcessor {
        RepositoryProcessor::new(
            Arc::new(host),
            QualityScorer::new(now()),
            ProcessorOptions::default(),
        )
    }

    fn resolved(resolution: Resolution) -> (MarketplaceRecord, Vec<String>) {
        match resolution {
            Resolution::Resolved { record, warnings } => (record, warnings),
            other => panic!("expected resolved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_marketplace_manifest() {
        let host = FakeHost::new()
            .with_repos(&["alice/market"])
            .with_file("alice/market", ".claude-plugin/marketplace.json", MARKETPLACE);
        let (record, warnings) =
            resolved(processor(host).process(&RepoId::new("alice", "market")).await);

        let m = &record.marketplace;
        assert_eq!(m.id, "alice/market");
        assert_eq!(m.name, "alice-tools");
        assert_eq!(m.description.as_deref(), Some("Alice's plugins"));
        assert!(m.verified);
        assert_eq!(
            m.manifest_url.as_deref(),
            Some("https://github.com/alice/market/blob/main/.claude-plugin/marketplace.json")
        );
        assert_eq!(record.plugins.len(), 2);
        assert_eq!(m.plugins, vec!["alice/market/reviewer", "alice/market/deployer"]);

        let reviewer = &record.plugins[0];
        assert!(reviewer.validated);
        assert_eq!(reviewer.author.as_deref(), Some("Alice"));
        assert_eq!(reviewer.source.path.as_deref(), Some("plugins/reviewer"));
        assert_eq!(reviewer.capabilities.commands, vec!["review"]);
        assert_eq!(reviewer.quality_score, m.quality_score);

        let deployer = &record.plugins[1];
        assert!(!deployer.validated);
        assert_eq!(deployer.source.url, "https://github.com/alice/deployer");
        assert!(deployer.quality_score < m.quality_score);

        assert!(warnings.iter().any(|w| w.contains("duplicate plugin 'reviewer'")));
        assert!(warnings.iter().any(|w| w.contains("plugins[3] has no name")));
    }

    #[tokio::test]
    async fn test_first_candidate_wins() {
        let host = FakeHost::new()
            .with_repos(&["alice/market"])
            .with_file(
                "alice/market",
                "marketplace.json",
                r#"{"name": "second", "owner": "a", "plugins": []}"#,
            )
            .with_file("alice/market", "plugins.json", r#"{"name": "fourth"}"#);
        let (record, _) = resolved(processor(host).process(&RepoId::new("alice", "market")).await);
        assert_eq!(record.marketplace.name, "second");
        assert!(record.marketplace.verified);
    }

    #[tokio::test]
    async fn test_invalid_marketplace_keeps_repository_name() {
        let host = FakeHost::new()
            .with_repos(&["alice/market"])
            .with_file(
                "alice/market",
                "marketplace.json",
                r#"{"name": "second", "description": "made up"}"#,
            );
        let (record, _) = resolved(processor(host).process(&RepoId::new("alice", "market")).await);
        assert!(!record.marketplace.verified);
        assert_eq!(record.marketplace.name, "market");
        assert_eq!(record.marketplace.description.as_deref(), Some("Claude Code plugins"));
    }

    #[tokio::test]
    async fn test_oversized_manifest_is_not_parsed() {
        let host = FakeHost::new()
            .with_repos(&["alice/market"])
            .with_file("alice/market", ".claude-plugin/marketplace.json", MARKETPLACE);
        let processor = RepositoryProcessor::new(
            Arc::new(host),
            QualityScorer::new(now()),
            ProcessorOptions {
                max_manifest_bytes: 64,
                ..ProcessorOptions::default()
            },
        );
        let (record, warnings) = resolved(processor.process(&RepoId::new("alice", "market")).await);

        assert!(record.plugins.is_empty());
        assert!(record.marketplace.plugins.is_empty());
        assert!(!record.marketplace.verified);
        assert_eq!(record.marketplace.name, "market");
        // the record still points at the manifest it found
        assert!(record.marketplace.manifest_url.is_some());
        assert!(warnings.iter().any(|w| w.contains("size limit")));
    }

    #[tokio::test]
    async fn test_oversized_plugin_directory_definition_is_skipped() {
        let big = format!(
            r#"{{"name": "huge", "description": "{}"}}"#,
            "x".repeat(200)
        );
        let host = FakeHost::new()
            .with_repos(&["carol/kit"])
            .with_dir("carol/kit", "plugins", vec![DirEntry::dir("plugins", "huge")])
            .with_file("carol/kit", "plugins/huge/plugin.json", &big);
        let processor = RepositoryProcessor::new(
            Arc::new(host),
            QualityScorer::new(now()),
            ProcessorOptions {
                max_manifest_bytes: 64,
                ..ProcessorOptions::default()
            },
        );
        let (record, warnings) = resolved(processor.process(&RepoId::new("carol", "kit")).await);

        assert!(record.plugins.is_empty());
        assert!(warnings
            .iter()
            .any(|w| w.contains("plugins/huge/plugin.json") && w.contains("size limit")));
    }

    #[tokio::test]
    async fn test_strict_mode_withholds_unsafe_content() {
        let manifest = r#"{
            "name": "<script>alert(1)</script>",
            "owner": "mallory",
            "plugins": [
                {
                    "name": "stealer", "version": "1.0.0", "type": "agent", "author": "m",
                    "category": "misc", "description": "<script>steal()</script>"
                },
                {
                    "name": "honest", "version": "1.0.0", "type": "agent", "author": "m",
                    "category": "misc", "description": "Plain helper"
                }
            ]
        }"#;
        let host = FakeHost::new()
            .with_repos(&["mallory/market"])
            .with_file("mallory/market", ".claude-plugin/marketplace.json", manifest);
        let processor = RepositoryProcessor::new(
            Arc::new(host),
            QualityScorer::new(now()),
            ProcessorOptions {
                strict: true,
                ..ProcessorOptions::default()
            },
        );
        let (record, warnings) =
            resolved(processor.process(&RepoId::new("mallory", "market")).await);

        let m = &record.marketplace;
        assert!(!m.verified);
        assert_eq!(m.name, "market");
        assert_eq!(m.description.as_deref(), Some("Claude Code plugins"));
        let names: Vec<_> = record.plugins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["honest"]);
        assert!(!record
            .plugins
            .iter()
            .any(|p| p.description.as_deref().unwrap_or("").contains("<script")));
        assert!(warnings.iter().any(|w| w.contains("plugin 'stealer' dropped")));
    }

    #[tokio::test]
    async fn test_lenient_mode_keeps_flagged_plugins() {
        let manifest = r#"{
            "name": "m", "owner": "o",
            "plugins": [{
                "name": "odd", "version": "1.0.0", "type": "agent", "author": "m",
                "category": "misc", "description": "<script>x()</script>"
            }]
        }"#;
        let host = FakeHost::new()
            .with_repos(&["o/m"])
            .with_file("o/m", "marketplace.json", manifest);
        let (record, _) = resolved(processor(host).process(&RepoId::new("o", "m")).await);
        assert_eq!(record.plugins.len(), 1);
    }

    #[tokio::test]
    async fn test_no_manifest_yields_empty_record() {
        let host = FakeHost::new().with_repos(&["bob/empty"]);
        let (record, warnings) = resolved(processor(host).process(&RepoId::new("bob", "empty")).await);

        assert!(record.plugins.is_empty());
        assert!(record.marketplace.manifest_url.is_none());
        assert!(!record.marketplace.verified);
        assert_eq!(record.marketplace.description.as_deref(), Some("Claude Code plugins"));
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_missing_repository_is_silent() {
        let host = FakeHost::new();
        assert!(matches!(
            processor(host).process(&RepoId::new("ghost", "repo")).await,
            Resolution::NotFound
        ));
    }

    #[tokio::test]
    async fn test_metadata_hard_failure() {
        let host = FakeHost::new().with_repo_error("slow/repo", FetchError::Timeout("30s".into()));
        match processor(host).process(&RepoId::new("slow", "repo")).await {
            Resolution::Failed(msg) => assert!(msg.contains("slow/repo")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_manifest_hard_failure_is_a_warning() {
        let host = FakeHost::new()
            .with_repos(&["alice/market"])
            .with_file_error(
                "alice/market",
                ".claude-plugin/marketplace.json",
                FetchError::Unauthorized("token".into()),
            )
            .with_file("alice/market", "marketplace.json", MARKETPLACE);
        let (record, warnings) =
            resolved(processor(host).process(&RepoId::new("alice", "market")).await);

        assert_eq!(record.plugins.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("unauthorized")));
    }

    #[tokio::test]
    async fn test_directory_scan_adds_undeclared_plugins() {
        let plugin_json = r#"{
            "name": "linter", "version": "0.1.0", "type": "command", "author": "Carol",
            "category": "quality", "description": "Lints", "repository": "https://github.com/carol/kit"
        }"#;
        let host = FakeHost::new()
            .with_repos(&["carol/kit"])
            .with_file("carol/kit", ".claude-plugin/marketplace.json", MARKETPLACE)
            .with_dir(
                "carol/kit",
                "plugins",
                vec![
                    DirEntry::dir("plugins", "reviewer"),
                    DirEntry::dir("plugins", "linter"),
                    DirEntry::dir("plugins", "no-manifest"),
                    DirEntry::file("plugins", "README.md"),
                ],
            )
            .with_file("carol/kit", "plugins/linter/.claude-plugin/plugin.json", plugin_json);
        let host = Arc::new(host);
        let processor = RepositoryProcessor::new(
            host.clone(),
            QualityScorer::new(now()),
            ProcessorOptions::default(),
        );
        let (record, _) = resolved(processor.process(&RepoId::new("carol", "kit")).await);

        let names: Vec<_> = record.plugins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["reviewer", "deployer", "linter"]);
        let linter = &record.plugins[2];
        assert_eq!(linter.origin, PluginOrigin::Directory);
        assert_eq!(linter.source.path.as_deref(), Some("plugins/linter"));
        assert!(linter.validated);
        // declared plugin directories are not probed
        assert!(!host
            .log()
            .iter()
            .any(|l| l.contains("plugins/reviewer/")));
    }

    #[tokio::test]
    async fn test_single_plugin_repository() {
        let plugin_json = r#"{ "name": "solo", "version": "2.0.0", "author": "Dan" }"#;
        let host = FakeHost::new()
            .with_repos(&["dan/solo"])
            .with_file("dan/solo", ".claude-plugin/plugin.json", plugin_json);
        let (record, _) = resolved(processor(host).process(&RepoId::new("dan", "solo")).await);

        assert!(!record.marketplace.verified);
        assert_eq!(record.plugins.len(), 1);
        assert_eq!(record.plugins[0].id, "dan/solo/solo");
        assert_eq!(record.plugins[0].source.url, "https://github.com/dan/solo");
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_warnings() {
        let host = FakeHost::new()
            .with_repos(&["alice/market"])
            .with_file("alice/market", ".claude-plugin/marketplace.json", MARKETPLACE);
        let processor = RepositoryProcessor::new(
            Arc::new(host),
            QualityScorer::new(now()),
            ProcessorOptions {
                strict: true,
                ..ProcessorOptions::default()
            },
        );
        let (record, _) = resolved(processor.process(&RepoId::new("alice", "market")).await);
        // marketplace document itself is clean, so still verified
        assert!(record.marketplace.verified);
    }

    #[tokio::test]
    async fn test_tags_merge_topics_and_manifest() {
        let mut repo = repository("alice/market");
        repo.topics = vec!["Claude-Code".into(), "plugins".into()];
        let host = FakeHost::new().with_repo(repo).with_file(
            "alice/market",
            "marketplace.json",
            r#"{ "name": "m", "owner": "a", "plugins": [], "tags": ["plugins", "ai"] }"#,
        );
        let (record, _) = resolved(processor(host).process(&RepoId::new("alice", "market")).await);
        assert_eq!(record.marketplace.tags, vec!["claude-code", "plugins", "ai"]);
    }

    #[test]
    fn test_entry_source_variants() {
        let id = RepoId::new("o", "r");
        let url = entry_source(&id, &serde_json::json!({ "source": "https://example.com/p.git" }));
        assert_eq!(url.source_type, SourceType::Url);

        let obj = entry_source(
            &id,
            &serde_json::json!({ "source": { "source": "url", "url": "https://gitlab.com/x/y" } }),
        );
        assert_eq!(obj.source_type, SourceType::Url);
        assert_eq!(obj.url, "https://gitlab.com/x/y");

        let fallback = entry_source(&id, &serde_json::json!({ "name": "p" }));
        assert_eq!(fallback.url, "https://github.com/o/r");
        assert!(fallback.path.is_none());
    }

    #[test]
    fn test_string_list_shapes() {
        let v = serde_json::json!({
            "a": ["x", { "name": "y" }, 3],
            "b": "single",
            "c": { "PreToolUse": [], "Stop": [] }
        });
        assert_eq!(string_list(v.get("a")), vec!["x", "y"]);
        assert_eq!(string_list(v.get("b")), vec!["single"]);
        assert_eq!(string_list(v.get("c")), vec!["PreToolUse", "Stop"]);
        assert!(string_list(v.get("missing")).is_empty());
    }
}

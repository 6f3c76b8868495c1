//! Category buckets
//!
//! Keyword table of glob patterns matched against a marketplace's name,
//! description, topics, tags and the categories its plugins declare. Each of
//! those strings is matched whole and word by word, so a bare pattern such
//! as `docs` only hits the word itself. A marketplace can land in zero, one
//! or several buckets.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Marketplace, Plugin};

/// Builtin category definitions
pub const BUILTIN_CATEGORIES: &[BuiltinCategory] = &[
    BuiltinCategory {
        name: "development",
        description: "Coding, refactoring, code generation and language tooling",
        patterns: &[
            "*develop*",
            "*coding*",
            "*refactor*",
            "*codegen*",
            "programming",
            "*language*",
            "*framework*",
        ],
    },
    BuiltinCategory {
        name: "testing",
        description: "Testing, review and quality assurance",
        patterns: &[
            "test",
            "tests",
            "testing",
            "test-*",
            "*-test",
            "*-tests",
            "*-testing",
            "*review*",
            "*quality*",
            "*lint*",
            "qa",
            "qa-*",
            "*-qa",
        ],
    },
    BuiltinCategory {
        name: "security",
        description: "Security auditing, secrets and compliance",
        patterns: &["*secur*", "*audit*", "*vulnerab*", "*secret*", "*compliance*"],
    },
    BuiltinCategory {
        name: "devops",
        description: "Deployment, CI/CD, infrastructure and monitoring",
        patterns: &[
            "devops",
            "devops-*",
            "*-devops",
            "*deploy*",
            "ci",
            "cicd",
            "ci-cd",
            "*ci/cd*",
            "docker*",
            "*-docker",
            "*kubernetes*",
            "k8s",
            "infra",
            "infra-*",
            "*-infra",
            "infrastructure",
            "*monitor*",
        ],
    },
    BuiltinCategory {
        name: "documentation",
        description: "Docs, writing and knowledge management",
        patterns: &[
            "doc",
            "docs",
            "doc-*",
            "docs-*",
            "*-doc",
            "*-docs",
            "document*",
            "*writing*",
            "*readme*",
            "*knowledge*",
        ],
    },
    BuiltinCategory {
        name: "productivity",
        description: "Workflow automation and everyday helpers",
        patterns: &[
            "*productiv*",
            "*workflow*",
            "*automat*",
            "task",
            "tasks",
            "task-*",
            "*-task",
            "*-tasks",
            "git",
            "git-*",
            "*-git",
            "github",
            "gitlab",
        ],
    },
    BuiltinCategory {
        name: "data",
        description: "Databases, analytics and data pipelines",
        patterns: &[
            "data",
            "data-*",
            "*-data",
            "database*",
            "dataset*",
            "*sql*",
            "*analytic*",
            "etl",
            "etl-*",
            "*-etl",
        ],
    },
    BuiltinCategory {
        name: "ai",
        description: "Agents, prompts, MCP servers and model tooling",
        patterns: &["*agent*", "*prompt*", "*mcp*", "*llm*", "ai", "ai-*", "*-ai"],
    },
    BuiltinCategory {
        name: "design",
        description: "UI, frontend and design systems",
        patterns: &[
            "*design*",
            "*frontend*",
            "ui",
            "ui-*",
            "*-ui",
            "ux",
            "*css*",
            "*figma*",
        ],
    },
];

/// Static definition of a builtin category
#[derive(Debug, Clone)]
pub struct BuiltinCategory {
    pub name: &'static str,
    pub description: &'static str,
    pub patterns: &'static [&'static str],
}

/// Runtime category definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDef {
    pub name: String,
    pub description: String,
    pub patterns: Vec<String>,
}

impl From<&BuiltinCategory> for CategoryDef {
    fn from(builtin: &BuiltinCategory) -> Self {
        Self {
            name: builtin.name.to_string(),
            description: builtin.description.to_string(),
            patterns: builtin.patterns.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Category table with compiled patterns
#[derive(Debug, Clone)]
pub struct CategoryStore {
    categories: BTreeMap<String, CategoryDef>,
    compiled: BTreeMap<String, Vec<Pattern>>,
}

impl CategoryStore {
    /// Builtin categories only
    pub fn builtin() -> Self {
        let categories = BUILTIN_CATEGORIES
            .iter()
            .map(|b| (b.name.to_string(), CategoryDef::from(b)))
            .collect();
        // builtin patterns are known to compile
        Self::compile(categories).unwrap_or_else(|_| Self {
            categories: BTreeMap::new(),
            compiled: BTreeMap::new(),
        })
    }

    /// Override builtin patterns with the `[categories]` config section
    ///
    /// - same name: patterns replaced, description kept
    /// - new name: added
    /// - empty pattern list: category removed
    pub fn with_config(self, overrides: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut categories = self.categories;
        for (name, patterns) in overrides {
            if patterns.is_empty() {
                categories.remove(name);
                continue;
            }
            let description = categories
                .get(name)
                .map(|c| c.description.clone())
                .unwrap_or_else(|| format!("Custom category '{}'", name));
            categories.insert(
                name.clone(),
                CategoryDef {
                    name: name.clone(),
                    description,
                    patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
                },
            );
        }
        Self::compile(categories)
    }

    fn compile(categories: BTreeMap<String, CategoryDef>) -> Result<Self> {
        let mut compiled = BTreeMap::new();
        for cat in categories.values() {
            let patterns = cat
                .patterns
                .iter()
                .map(|p| Pattern::new(p))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            compiled.insert(cat.name.clone(), patterns);
        }
        Ok(Self {
            categories,
            compiled,
        })
    }

    pub fn get(&self, name: &str) -> Option<&CategoryDef> {
        self.categories.get(name)
    }

    /// All categories, sorted by name
    pub fn all(&self) -> Vec<&CategoryDef> {
        self.categories.values().collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.categories.keys().map(|s| s.as_str()).collect()
    }

    /// Categories matching a marketplace, sorted by name
    pub fn classify(&self, marketplace: &Marketplace, plugins: &[&Plugin]) -> Vec<String> {
        let terms = match_terms(marketplace, plugins);
        self.compiled
            .iter()
            .filter(|(_, patterns)| {
                terms
                    .iter()
                    .any(|term| patterns.iter().any(|p| p.matches(term)))
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Bucket every marketplace
    pub fn bucket(
        &self,
        marketplaces: &[Marketplace],
        plugins: &[Plugin],
        generated_at: DateTime<Utc>,
    ) -> CategoryIndex {
        let mut categories: BTreeMap<String, CategoryBucket> = self
            .categories
            .values()
            .map(|c| {
                (
                    c.name.clone(),
                    CategoryBucket {
                        description: c.description.clone(),
                        marketplaces: Vec::new(),
                    },
                )
            })
            .collect();
        let mut uncategorized = Vec::new();

        for marketplace in marketplaces {
            let own: Vec<&Plugin> = plugins
                .iter()
                .filter(|p| p.marketplace_id == marketplace.id)
                .collect();
            let matched = self.classify(marketplace, &own);
            if matched.is_empty() {
                uncategorized.push(marketplace.id.clone());
            }
            for name in matched {
                if let Some(bucket) = categories.get_mut(&name) {
                    bucket.marketplaces.push(marketplace.id.clone());
                }
            }
        }

        CategoryIndex {
            generated_at,
            categories,
            uncategorized,
        }
    }
}

impl Default for CategoryStore {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercased strings a marketplace is matched on, followed by their words
fn match_terms(marketplace: &Marketplace, plugins: &[&Plugin]) -> Vec<String> {
    let mut terms = vec![marketplace.name.to_lowercase()];
    if let Some(description) = &marketplace.description {
        terms.push(description.to_lowercase());
    }
    terms.extend(marketplace.repository.topics.iter().map(|t| t.to_lowercase()));
    terms.extend(marketplace.tags.iter().map(|t| t.to_lowercase()));
    terms.extend(
        plugins
            .iter()
            .filter_map(|p| p.category.as_ref())
            .map(|c| c.to_lowercase()),
    );

    let words: Vec<String> = terms
        .iter()
        .flat_map(|term| term.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_')))
        .map(|word| word.trim_matches(|c: char| c == '-' || c == '_'))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .filter(|word| !terms.contains(word))
        .collect();
    terms.extend(words);
    terms
}

/// One category bucket of `categories.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBucket {
    pub description: String,
    pub marketplaces: Vec<String>,
}

/// Content of `categories.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryIndex {
    pub generated_at: DateTime<Utc>,
    pub categories: BTreeMap<String, CategoryBucket>,
    pub uncategorized: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OwnerInfo, PluginOrigin, PluginSource, RepositoryStats, SourceType};

    fn marketplace(id: &str, name: &str, description: &str, topics: &[&str]) -> Marketplace {
        Marketplace {
            id: id.into(),
            name: name.into(),
            description: Some(description.into()),
            owner: OwnerInfo {
                name: "o".into(),
                url: "https://github.com/o".into(),
                owner_type: "User".into(),
            },
            repository: RepositoryStats {
                topics: topics.iter().map(|t| t.to_string()).collect(),
                ..RepositoryStats::default()
            },
            manifest_url: None,
            plugins: vec![],
            tags: vec![],
            verified: false,
            quality_score: 0,
            last_scanned: Utc::now(),
            added_at: Utc::now(),
        }
    }

    fn plugin(marketplace_id: &str, category: &str) -> Plugin {
        Plugin {
            id: format!("{}/p", marketplace_id),
            name: "p".into(),
            version: None,
            author: None,
            description: None,
            category: Some(category.into()),
            tags: vec![],
            source: PluginSource {
                source_type: SourceType::Github,
                url: "https://github.com/o/r".into(),
                path: None,
            },
            capabilities: Default::default(),
            marketplace_id: marketplace_id.into(),
            origin: PluginOrigin::Manifest,
            validated: true,
            quality_score: 0,
        }
    }

    #[test]
    fn test_builtin_categories_compile() {
        let store = CategoryStore::builtin();
        assert_eq!(store.names().len(), BUILTIN_CATEGORIES.len());
        assert!(store.get("security").is_some());
    }

    #[test]
    fn test_classify_multiple_categories() {
        let store = CategoryStore::builtin();
        let m = marketplace("o/r", "sec-tools", "Security audits and test runners", &[]);
        assert_eq!(store.classify(&m, &[]), vec!["security", "testing"]);
    }

    #[test]
    fn test_classify_by_topic_and_plugin_category() {
        let store = CategoryStore::builtin();
        let m = marketplace("o/r", "misc", "Assorted", &["Kubernetes"]);
        let p = plugin("o/r", "documentation");
        assert_eq!(store.classify(&m, &[&p]), vec!["devops", "documentation"]);
    }

    #[test]
    fn test_config_overrides_and_additions() {
        let overrides: BTreeMap<String, Vec<String>> = [
            ("testing".to_string(), vec!["*spec*".to_string()]),
            ("games".to_string(), vec!["*game*".to_string()]),
            ("design".to_string(), vec![]),
        ]
        .into_iter()
        .collect();
        let store = CategoryStore::builtin().with_config(&overrides).unwrap();

        assert_eq!(
            store.get("testing").unwrap().description,
            "Testing, review and quality assurance"
        );
        assert!(store.get("games").is_some());
        assert!(store.get("design").is_none());

        let m = marketplace("o/r", "arcade", "Game plugins with specs", &[]);
        assert_eq!(store.classify(&m, &[]), vec!["games", "testing"]);
    }

    #[test]
    fn test_patterns_match_whole_words() {
        let store = CategoryStore::builtin();
        for (name, description) in [
            ("docker-helpers", "Run the latest build in a container"),
            ("digital-garden", "A guide to the build"),
            ("metadata-viewer", "Shows the latest aquarium stats"),
        ] {
            let m = marketplace("o/r", name, description, &[]);
            let matched = store.classify(&m, &[]);
            for wrong in ["documentation", "testing", "design", "productivity", "data"] {
                assert!(
                    !matched.iter().any(|c| c == wrong),
                    "{} misfiled under {}: {:?}",
                    name,
                    wrong,
                    matched
                );
            }
        }
    }

    #[test]
    fn test_word_patterns_still_hit() {
        let store = CategoryStore::builtin();
        let m = marketplace(
            "o/r",
            "kit",
            "Generate docs, run tests and tweak the UI.",
            &["git-hooks"],
        );
        assert_eq!(
            store.classify(&m, &[]),
            vec!["design", "documentation", "productivity", "testing"]
        );
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let overrides: BTreeMap<String, Vec<String>> =
            [("bad".to_string(), vec!["[".to_string()])].into_iter().collect();
        assert!(CategoryStore::builtin().with_config(&overrides).is_err());
    }

    #[test]
    fn test_bucket_collects_uncategorized() {
        let store = CategoryStore::builtin();
        let marketplaces = vec![
            marketplace("a/sec", "scanner", "Vulnerability scanning", &[]),
            marketplace("b/misc", "misc", "Assorted", &[]),
        ];
        let index = store.bucket(&marketplaces, &[], Utc::now());

        assert_eq!(index.categories["security"].marketplaces, vec!["a/sec"]);
        assert_eq!(index.uncategorized, vec!["b/misc"]);
        assert!(index.categories["data"].marketplaces.is_empty());
    }
}

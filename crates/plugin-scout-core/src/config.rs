use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};
use crate::search::{default_strategies, SearchStrategy};

const CONFIG_FILE: &str = "config.toml";

/// Directory name under the home directory used when no base is given
pub const DEFAULT_BASE_DIR_NAME: &str = ".plugin-scout";

/// `~/.plugin-scout`
pub fn default_base_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(ScoutError::HomeNotFound)?;
    Ok(home.join(DEFAULT_BASE_DIR_NAME))
}

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# plugin-scout configuration file
# Location: ~/.plugin-scout/config.toml

[github]
# REST API base URL
api_base = "https://api.github.com"
# Environment variable holding the bearer token
token_env = "GITHUB_TOKEN"
# Per-request timeout in seconds
timeout_secs = 30
# Pause between sub-fetches of one repository (milliseconds)
request_delay_ms = 250
# Longest sleep while waiting for a rate-limit reset (seconds)
max_rate_limit_wait_secs = 120

[search]
# Stop resolving repositories once this many were collected
max_results = 500
# Pages fetched per strategy
pages_per_strategy = 3
per_page = 50
# Pause between strategies (milliseconds)
strategy_delay_ms = 2000
# Repositories resolved concurrently per batch
batch_size = 5
# Space search pages by the endpoint's rate budget
pace_pages = true
# Repositories always resolved before any search runs
seeds = [
    "anthropics/claude-code",
    "anthropics/claude-plugins-official",
]

[validation]
# Promote every warning to an error
strict = false
# Largest manifest accepted (bytes)
max_manifest_bytes = 1048576

[cache]
# Lifetime of a cached collection (seconds)
ttl_secs = 3600

[output]
# Where artifacts are written (default: <base>/data)
# dir = "/srv/marketplace/data"

[backup]
# Where snapshots are kept (default: <base>/backups)
# dir = "/srv/marketplace/backups"
compress = true
daily_retention = 7
weekly_retention = 4
monthly_retention = 12

# Extra or overriding category keywords (glob patterns)
# [categories]
# testing = ["testing", "*-test", "qa"]
"#;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    /// Category name -> keyword patterns, merged over the builtin table
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_request_delay_ms() -> u64 {
    250
}

fn default_max_rate_limit_wait_secs() -> u64 {
    120
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait_secs(),
        }
    }
}

impl GitHubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_secs(self.max_rate_limit_wait_secs)
    }

    /// Read the bearer token from the configured environment variable
    pub fn token(&self) -> Result<String> {
        match std::env::var(&self.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
            _ => Err(ScoutError::MissingCredentials {
                var: self.token_env.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_pages_per_strategy")]
    pub pages_per_strategy: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_strategy_delay_ms")]
    pub strategy_delay_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub pace_pages: bool,
    #[serde(default = "default_seeds")]
    pub seeds: Vec<String>,
    #[serde(default = "default_strategies")]
    pub strategies: Vec<SearchStrategy>,
}

fn default_max_results() -> usize {
    500
}

fn default_pages_per_strategy() -> u32 {
    3
}

fn default_per_page() -> u32 {
    50
}

fn default_strategy_delay_ms() -> u64 {
    2000
}

fn default_batch_size() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_seeds() -> Vec<String> {
    vec![
        "anthropics/claude-code".to_string(),
        "anthropics/claude-plugins-official".to_string(),
    ]
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            pages_per_strategy: default_pages_per_strategy(),
            per_page: default_per_page(),
            strategy_delay_ms: default_strategy_delay_ms(),
            batch_size: default_batch_size(),
            pace_pages: true,
            seeds: default_seeds(),
            strategies: default_strategies(),
        }
    }
}

impl SearchConfig {
    pub fn strategy_delay(&self) -> Duration {
        Duration::from_millis(self.strategy_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: usize,
}

fn default_max_manifest_bytes() -> usize {
    1024 * 1024
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            max_manifest_bytes: default_max_manifest_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub compress: bool,
    #[serde(default = "default_daily_retention")]
    pub daily_retention: usize,
    #[serde(default = "default_weekly_retention")]
    pub weekly_retention: usize,
    #[serde(default = "default_monthly_retention")]
    pub monthly_retention: usize,
}

fn default_daily_retention() -> usize {
    7
}

fn default_weekly_retention() -> usize {
    4
}

fn default_monthly_retention() -> usize {
    12
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: None,
            compress: true,
            daily_retention: default_daily_retention(),
            weekly_retention: default_weekly_retention(),
            monthly_retention: default_monthly_retention(),
        }
    }
}

impl Config {
    /// Load config from base directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        Self::parse(&content).map_err(|e| match e {
            ScoutError::TomlDe(e) => ScoutError::ConfigParse {
                path: path.clone(),
                message: e.to_string(),
            },
            other => other,
        })
    }

    /// Parse config from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Save config to base directory
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Get config file path
    pub fn path(base_dir: &Path) -> PathBuf {
        base_dir.join(CONFIG_FILE)
    }

    /// Initialize config with default template (rich comments)
    pub fn init(base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    /// Artifact directory, relative paths resolved against the base directory
    pub fn output_dir(&self, base_dir: &Path) -> PathBuf {
        resolve_dir(base_dir, self.output.dir.as_deref(), "data")
    }

    /// Snapshot directory, relative paths resolved against the base directory
    pub fn backup_dir(&self, base_dir: &Path) -> PathBuf {
        resolve_dir(base_dir, self.backup.dir.as_deref(), "backups")
    }

    /// Get a config value by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        self.list()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// List all scalar config keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        let mut entries = vec![
            ("github.api_base".to_string(), self.github.api_base.clone()),
            ("github.token_env".to_string(), self.github.token_env.clone()),
            (
                "github.timeout_secs".to_string(),
                self.github.timeout_secs.to_string(),
            ),
            (
                "github.request_delay_ms".to_string(),
                self.github.request_delay_ms.to_string(),
            ),
            (
                "github.max_rate_limit_wait_secs".to_string(),
                self.github.max_rate_limit_wait_secs.to_string(),
            ),
            (
                "search.max_results".to_string(),
                self.search.max_results.to_string(),
            ),
            (
                "search.pages_per_strategy".to_string(),
                self.search.pages_per_strategy.to_string(),
            ),
            (
                "search.per_page".to_string(),
                self.search.per_page.to_string(),
            ),
            (
                "search.strategy_delay_ms".to_string(),
                self.search.strategy_delay_ms.to_string(),
            ),
            (
                "search.batch_size".to_string(),
                self.search.batch_size.to_string(),
            ),
            (
                "search.pace_pages".to_string(),
                self.search.pace_pages.to_string(),
            ),
            ("search.seeds".to_string(), format!("{:?}", self.search.seeds)),
            (
                "search.strategies".to_string(),
                format!(
                    "{:?}",
                    self.search
                        .strategies
                        .iter()
                        .map(|s| s.name.as_str())
                        .collect::<Vec<_>>()
                ),
            ),
            (
                "validation.strict".to_string(),
                self.validation.strict.to_string(),
            ),
            (
                "validation.max_manifest_bytes".to_string(),
                self.validation.max_manifest_bytes.to_string(),
            ),
            ("cache.ttl_secs".to_string(), self.cache.ttl_secs.to_string()),
            (
                "output.dir".to_string(),
                display_opt_path(self.output.dir.as_deref()),
            ),
            (
                "backup.dir".to_string(),
                display_opt_path(self.backup.dir.as_deref()),
            ),
            ("backup.compress".to_string(), self.backup.compress.to_string()),
            (
                "backup.daily_retention".to_string(),
                self.backup.daily_retention.to_string(),
            ),
            (
                "backup.weekly_retention".to_string(),
                self.backup.weekly_retention.to_string(),
            ),
            (
                "backup.monthly_retention".to_string(),
                self.backup.monthly_retention.to_string(),
            ),
        ];

        for (name, keywords) in &self.categories {
            entries.push((format!("categories.{}", name), format!("{:?}", keywords)));
        }

        entries
    }
}

fn resolve_dir(base_dir: &Path, configured: Option<&Path>, fallback: &str) -> PathBuf {
    match configured {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => base_dir.join(dir),
        None => base_dir.join(fallback),
    }
}

fn display_opt_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(default)".to_string())
}

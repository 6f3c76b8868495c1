//! Post-generation integrity pass
//!
//! Re-reads every written artifact and checks it can be trusted as the new
//! generation. The validator only reports; the caller decides what a failed
//! report means.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::aggregate::{
    CATEGORIES_FILE, COMBINED_FILE, HEALTH_FILE, MARKETPLACES_FILE, PLUGINS_FILE, STATS_FILE,
    TAGS_FILE,
};
use crate::error::{Result, ScoutError};
use crate::scoring::MAX_SCORE;

/// Tolerated clock skew for every timestamp
pub const DEFAULT_SKEW_TOLERANCE_SECS: i64 = 300;

/// Per-marketplace timestamps, as paths below one `marketplaces[]` entry
const RECORD_TIMESTAMPS: &[&[&str]] = &[
    &["lastScanned"],
    &["addedAt"],
    &["repository", "updatedAt"],
    &["repository", "createdAt"],
];

/// Required top-level fields per artifact
pub const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    (MARKETPLACES_FILE, &["generatedAt", "total", "marketplaces"]),
    (PLUGINS_FILE, &["generatedAt", "total", "plugins"]),
    (
        STATS_FILE,
        &[
            "generatedAt",
            "totalMarketplaces",
            "totalPlugins",
            "validPlugins",
            "verifiedMarketplaces",
            "averageQualityScore",
            "totalStars",
            "topByStars",
            "recentlyUpdated",
            "languages",
        ],
    ),
    (CATEGORIES_FILE, &["generatedAt", "categories", "uncategorized"]),
    (TAGS_FILE, &["generatedAt", "tags"]),
    (COMBINED_FILE, &["generatedAt", "marketplaces", "plugins", "stats"]),
    (
        HEALTH_FILE,
        &["generatedAt", "runId", "status", "metrics", "errors", "warnings"],
    ),
];

const COUNT_FIELDS: &[&str] = &[
    "total",
    "totalMarketplaces",
    "totalPlugins",
    "validPlugins",
    "verifiedMarketplaces",
    "totalStars",
];

/// One problem found in one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityIssue {
    pub file: String,
    pub message: String,
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file, self.message)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub dir: PathBuf,
    pub passed: bool,
    pub files_checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    /// `Err(IntegrityFailed)` when the report did not pass
    pub fn into_result(self) -> Result<Self> {
        if self.passed {
            Ok(self)
        } else {
            Err(ScoutError::IntegrityFailed {
                dir: self.dir,
                failures: self.issues.len(),
            })
        }
    }
}

/// Checks a directory of written artifacts
#[derive(Debug, Clone)]
pub struct DataIntegrityValidator {
    dir: PathBuf,
    skew: Duration,
}

impl DataIntegrityValidator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            skew: Duration::seconds(DEFAULT_SKEW_TOLERANCE_SECS),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn validate(&self) -> Result<IntegrityReport> {
        self.validate_at(Utc::now())
    }

    /// Validate against a fixed "now"
    pub fn validate_at(&self, now: DateTime<Utc>) -> Result<IntegrityReport> {
        if !self.dir.is_dir() {
            return Err(ScoutError::OutputNotFound {
                path: self.dir.clone(),
            });
        }

        let mut issues = Vec::new();
        let mut files_checked = 0;
        let mut marketplaces_doc = None;
        let mut plugins_doc = None;

        for (file, required) in REQUIRED_FIELDS {
            let mut issue = |message: String| {
                issues.push(IntegrityIssue {
                    file: file.to_string(),
                    message,
                })
            };

            let path = self.dir.join(file);
            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    issue(format!("unreadable: {}", e));
                    continue;
                }
            };
            files_checked += 1;

            let doc: Value = match serde_json::from_str(&text) {
                Ok(doc) => doc,
                Err(e) => {
                    issue(format!("not valid JSON: {}", e));
                    continue;
                }
            };
            let Some(object) = doc.as_object() else {
                issue("top level is not an object".to_string());
                continue;
            };

            for field in *required {
                if !object.contains_key(*field) {
                    issue(format!("missing field '{}'", field));
                }
            }

            for message in check_counts(&doc) {
                issue(message);
            }
            let generated_at = doc.get("generatedAt");
            if let Some(message) = check_timestamp("generatedAt", generated_at, now, self.skew) {
                issue(message);
            }
            for message in check_record_timestamps(&doc, now, self.skew) {
                issue(message);
            }

            match *file {
                MARKETPLACES_FILE => marketplaces_doc = Some(doc),
                PLUGINS_FILE => plugins_doc = Some(doc),
                COMBINED_FILE => {
                    issues.extend(check_references(&doc, &doc, COMBINED_FILE));
                }
                _ => {}
            }
        }

        if let (Some(marketplaces), Some(plugins)) = (&marketplaces_doc, &plugins_doc) {
            issues.extend(check_references(marketplaces, plugins, PLUGINS_FILE));
        }

        let report = IntegrityReport {
            dir: self.dir.clone(),
            passed: issues.is_empty(),
            files_checked,
            issues,
        };
        if report.passed {
            tracing::info!("Integrity check passed ({} files)", report.files_checked);
        } else {
            for issue in &report.issues {
                tracing::warn!("Integrity: {}", issue);
            }
        }
        Ok(report)
    }
}

/// Counts, stats consistency, score ranges and list totals
fn check_counts(doc: &Value) -> Vec<String> {
    let mut problems = Vec::new();

    let mut objects = vec![doc];
    for nested in ["stats", "metrics"] {
        if let Some(inner) = doc.get(nested).filter(|v| v.is_object()) {
            objects.push(inner);
        }
    }

    for object in objects {
        for field in COUNT_FIELDS {
            if let Some(value) = object.get(*field) {
                if value.as_u64().is_none() {
                    problems.push(format!("'{}' is not a non-negative integer", field));
                }
            }
        }
        let total = object.get("totalPlugins").or_else(|| object.get("plugins"));
        if let (Some(valid), Some(total)) = (
            object.get("validPlugins").and_then(Value::as_u64),
            total.and_then(Value::as_u64),
        ) {
            if valid > total {
                problems.push(format!(
                    "validPlugins ({}) exceeds totalPlugins ({})",
                    valid, total
                ));
            }
        }
    }

    for list in ["marketplaces", "plugins"] {
        let Some(items) = doc.get(list).and_then(Value::as_array) else {
            continue;
        };
        if let Some(total) = doc.get("total").and_then(Value::as_u64) {
            if total as usize != items.len() {
                problems.push(format!(
                    "'total' is {} but '{}' has {} entries",
                    total,
                    list,
                    items.len()
                ));
            }
        }
        for (i, item) in items.iter().enumerate() {
            if let Some(score) = item.get("qualityScore") {
                match score.as_u64() {
                    Some(s) if s <= MAX_SCORE as u64 => {}
                    _ => problems.push(format!("{}[{}].qualityScore out of range", list, i)),
                }
            }
        }
    }

    problems
}

/// Absent and null timestamps are fine; anything else must parse and not lie ahead
fn check_timestamp(
    label: &str,
    raw: Option<&Value>,
    now: DateTime<Utc>,
    skew: Duration,
) -> Option<String> {
    let raw = raw.filter(|v| !v.is_null())?;
    let Some(text) = raw.as_str() else {
        return Some(format!("'{}' is not a string", label));
    };
    match DateTime::parse_from_rfc3339(text) {
        Ok(ts) if ts.with_timezone(&Utc) > now + skew => {
            Some(format!("'{}' {} is in the future", label, text))
        }
        Ok(_) => None,
        Err(e) => Some(format!("'{}' unparseable: {}", label, e)),
    }
}

fn check_record_timestamps(doc: &Value, now: DateTime<Utc>, skew: Duration) -> Vec<String> {
    let Some(records) = doc.get("marketplaces").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut problems = Vec::new();
    for (i, record) in records.iter().enumerate() {
        for path in RECORD_TIMESTAMPS {
            let raw = path
                .iter()
                .try_fold(record, |value, key| value.get(*key));
            let label = format!("marketplaces[{}].{}", i, path.join("."));
            problems.extend(check_timestamp(&label, raw, now, skew));
        }
    }
    problems
}

/// Every plugin must point at a marketplace listed in `marketplaces`
fn check_references(marketplaces: &Value, plugins: &Value, file: &str) -> Vec<IntegrityIssue> {
    let ids: HashSet<&str> = marketplaces["marketplaces"]
        .as_array()
        .map(|items| items.iter().filter_map(|m| m["id"].as_str()).collect())
        .unwrap_or_default();

    plugins["plugins"]
        .as_array()
        .map(|items| items.as_slice())
        .unwrap_or_default()
        .iter()
        .filter_map(|p| {
            let plugin_id = p["id"].as_str().unwrap_or("<unnamed>");
            match p["marketplaceId"].as_str() {
                Some(id) if ids.contains(id) => None,
                Some(id) => Some(format!(
                    "plugin {} references unknown marketplace {}",
                    plugin_id, id
                )),
                None => Some(format!("plugin {} has no marketplaceId", plugin_id)),
            }
        })
        .map(|message| IntegrityIssue {
            file: file.to_string(),
            message,
        })
        .collect()
}

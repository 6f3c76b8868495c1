//! Content scanning for string fields of fetched manifests
//!
//! Manifests end up rendered by a web front end, so any string that looks like
//! markup, a script URI, a shell fragment or a path escape is flagged.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// One content rule
pub struct SecurityRule {
    pub name: &'static str,
    pub description: &'static str,
    pattern: Regex,
}

impl SecurityRule {
    fn new(name: &'static str, description: &'static str, pattern: &str) -> Self {
        Self {
            name,
            description,
            pattern: Regex::new(pattern).expect("invalid builtin security pattern"),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

static RULES: Lazy<Vec<SecurityRule>> = Lazy::new(|| {
    vec![
        SecurityRule::new(
            "script-tag",
            "markup or script tag",
            r"(?i)<\s*/?\s*(script|iframe|object|embed|style|link|meta|svg|img|form)\b",
        ),
        SecurityRule::new(
            "event-handler",
            "inline event handler attribute",
            r"(?i)\bon(load|error|click|mouseover|focus)\s*=",
        ),
        SecurityRule::new(
            "javascript-uri",
            "javascript: URI",
            r"(?i)javascript\s*:",
        ),
        SecurityRule::new(
            "data-uri",
            "data:text/html URI",
            r"(?i)data\s*:\s*text/html",
        ),
        SecurityRule::new(
            "shell-metachar",
            "shell metacharacters",
            r"`|\$\(|\$\{|&&|\|\||;\s*(rm|curl|wget|sh|bash|chmod|sudo|nc)\b|\|\s*(sh|bash|zsh)\b",
        ),
        SecurityRule::new(
            "path-traversal",
            "path traversal sequence",
            r"(^|[/\\])\.\.([/\\]|$)|%2e%2e(%2f|%5c|/)",
        ),
    ]
});

/// Builtin rules, in evaluation order
pub fn rules() -> &'static [SecurityRule] {
    &RULES
}

/// A rule hit on one string field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityFinding {
    /// JSON path of the offending field, e.g. `plugins[0].description`
    pub path: String,
    pub rule: &'static str,
    pub description: &'static str,
}

impl std::fmt::Display for SecurityFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in '{}'", self.description, self.path)
    }
}

/// Scan every string (values and object keys) in a JSON document
pub fn scan(value: &Value) -> Vec<SecurityFinding> {
    let mut findings = Vec::new();
    scan_into(value, "$", &mut findings);
    findings
}

/// Scan a single string
pub fn scan_str(text: &str) -> Vec<&'static SecurityRule> {
    rules().iter().filter(|r| r.is_match(text)).collect()
}

fn scan_into(value: &Value, path: &str, findings: &mut Vec<SecurityFinding>) {
    match value {
        Value::String(s) => {
            for rule in scan_str(s) {
                findings.push(SecurityFinding {
                    path: display_path(path),
                    rule: rule.name,
                    description: rule.description,
                });
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                scan_into(item, &format!("{}[{}]", path, i), findings);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let child = format!("{}.{}", path, key);
                for rule in scan_str(key) {
                    findings.push(SecurityFinding {
                        path: display_path(&child),
                        rule: rule.name,
                        description: rule.description,
                    });
                }
                scan_into(item, &child, findings);
            }
        }
        _ => {}
    }
}

fn display_path(path: &str) -> String {
    let trimmed = path.trim_start_matches('$').trim_start_matches('.');
    if trimmed.is_empty() {
        "<root>".to_string()
    } else {
        trimmed.to_string()
    }
}

//! Manifest validation
//!
//! Schema and content checks for one fetched JSON document. Pure: no I/O, no
//! clock, callable on any string.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::security;

/// Default document size ceiling (1 MiB)
pub const DEFAULT_MAX_MANIFEST_BYTES: usize = 1024 * 1024;

static SEMVER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v?\d+\.\d+\.\d+([-+][0-9A-Za-z.-]+)?$").expect("invalid semver pattern")
});

/// A required top-level field, satisfied by any of its accepted keys
#[derive(Debug, Clone, Copy)]
pub struct RequiredField {
    pub name: &'static str,
    pub alternatives: &'static [&'static str],
}

impl RequiredField {
    const fn single(name: &'static str) -> Self {
        Self {
            name,
            alternatives: &[],
        }
    }

    fn is_present(&self, object: &serde_json::Map<String, Value>) -> bool {
        std::iter::once(self.name)
            .chain(self.alternatives.iter().copied())
            .any(|key| match object.get(key) {
                None | Some(Value::Null) => false,
                Some(Value::String(s)) => !s.trim().is_empty(),
                Some(_) => true,
            })
    }

    fn describe(&self) -> String {
        if self.alternatives.is_empty() {
            self.name.to_string()
        } else {
            format!("{} (or {})", self.name, self.alternatives.join(", "))
        }
    }
}

/// Fields every plugin manifest must carry
pub const PLUGIN_FIELDS: &[RequiredField] = &[
    RequiredField::single("name"),
    RequiredField::single("version"),
    RequiredField::single("type"),
    RequiredField::single("author"),
    RequiredField::single("category"),
    RequiredField {
        name: "repository",
        alternatives: &["source", "homepage"],
    },
];

/// Fields every marketplace document must carry
pub const MARKETPLACE_FIELDS: &[RequiredField] = &[
    RequiredField::single("name"),
    RequiredField::single("owner"),
    RequiredField::single("plugins"),
];

/// Which document shape is being validated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestSchema {
    /// A single plugin entry or plugin.json
    #[default]
    Plugin,
    /// A marketplace.json listing plugins
    Marketplace,
}

impl ManifestSchema {
    pub fn required_fields(&self) -> &'static [RequiredField] {
        match self {
            Self::Plugin => PLUGIN_FIELDS,
            Self::Marketplace => MARKETPLACE_FIELDS,
        }
    }
}

/// Outcome of validating one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    fn finish(mut self, strict: bool) -> Self {
        if strict && !self.warnings.is_empty() {
            self.errors
                .extend(self.warnings.drain(..).map(|w| format!("(strict) {}", w)));
        }
        self.is_valid = self.errors.is_empty();
        self
    }
}

/// Validates manifest documents against a schema
#[derive(Debug, Clone)]
pub struct ManifestValidator {
    schema: ManifestSchema,
    strict: bool,
    max_bytes: usize,
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new(ManifestSchema::Plugin)
    }
}

impl ManifestValidator {
    pub fn new(schema: ManifestSchema) -> Self {
        Self {
            schema,
            strict: false,
            max_bytes: DEFAULT_MAX_MANIFEST_BYTES,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn schema(&self) -> ManifestSchema {
        self.schema
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Validate raw JSON text
    pub fn validate(&self, text: &str) -> ValidationReport {
        let mut report = ValidationReport::default();

        if text.len() > self.max_bytes {
            report.errors.push(format!(
                "Manifest exceeds size limit ({} > {} bytes)",
                text.len(),
                self.max_bytes
            ));
            return report.finish(self.strict);
        }

        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                report.errors.push(format!("Invalid JSON: {}", e));
                return report.finish(self.strict);
            }
        };

        self.check_value(&value, &mut report);
        report.finish(self.strict)
    }

    /// Validate an already-parsed document (e.g. one entry of a marketplace)
    pub fn validate_value(&self, value: &Value) -> ValidationReport {
        let mut report = ValidationReport::default();
        self.check_value(value, &mut report);
        report.finish(self.strict)
    }

    fn check_value(&self, value: &Value, report: &mut ValidationReport) {
        let Some(object) = value.as_object() else {
            report
                .errors
                .push("Manifest must be a JSON object".to_string());
            return;
        };

        for field in self.schema.required_fields() {
            if !field.is_present(object) {
                report
                    .errors
                    .push(format!("Missing required field: {}", field.describe()));
            }
        }

        if let Some(name) = object.get("name") {
            if !name.is_string() && !name.is_null() {
                report.errors.push("Field 'name' must be a string".to_string());
            }
        }

        match object.get("version") {
            Some(Value::String(v)) if !SEMVER.is_match(v.trim()) => {
                report
                    .warnings
                    .push(format!("Version '{}' is not semantic (x.y.z)", v));
            }
            Some(Value::String(_)) | Some(Value::Null) | None => {}
            Some(_) => report
                .errors
                .push("Field 'version' must be a string".to_string()),
        }

        if self.schema == ManifestSchema::Marketplace {
            if let Some(plugins) = object.get("plugins") {
                if !plugins.is_array() {
                    report
                        .errors
                        .push("Field 'plugins' must be an array".to_string());
                }
            }
        }

        let has_description = object
            .get("description")
            .or_else(|| object.get("metadata").and_then(|m| m.get("description")))
            .and_then(Value::as_str)
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false);
        if !has_description {
            report.warnings.push("Missing description".to_string());
        }

        for finding in security::scan(value) {
            report.warnings.push(format!("Security: {}", finding));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_plugin() -> &'static str {
        r#"{
            "name": "code-reviewer",
            "version": "1.2.0",
            "type": "agent",
            "author": { "name": "Alice" },
            "category": "review",
            "description": "Reviews pull requests",
            "repository": "https://github.com/alice/code-reviewer"
        }"#
    }

    #[test]
    fn test_complete_plugin_is_valid() {
        let report = ManifestValidator::default().validate(complete_plugin());
        assert!(report.is_valid, "{:?}", report);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_missing_version_names_the_field() {
        let json = r#"{
            "name": "x", "type": "agent", "author": "a",
            "category": "c", "source": "./x", "description": "d"
        }"#;
        let report = ManifestValidator::default().validate(json);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("version")));
    }

    #[test]
    fn test_repository_pointer_accepts_alternatives() {
        let json = r#"{
            "name": "x", "version": "1.0.0", "type": "agent", "author": "a",
            "category": "c", "homepage": "https://example.com", "description": "d"
        }"#;
        let report = ManifestValidator::default().validate(json);
        assert!(report.is_valid, "{:?}", report);
    }

    #[test]
    fn test_empty_string_counts_as_missing() {
        let json = r#"{
            "name": "  ", "version": "1.0.0", "type": "agent", "author": "a",
            "category": "c", "source": "./x", "description": "d"
        }"#;
        let report = ManifestValidator::default().validate(json);
        assert!(report
            .errors
            .iter()
            .any(|e| e == "Missing required field: name"));
    }

    #[test]
    fn test_script_tag_warns_in_lenient_mode() {
        let json = r#"{
            "name": "x", "version": "1.0.0", "type": "agent", "author": "a",
            "category": "c", "source": "./x",
            "description": "<script>alert('hi')</script>"
        }"#;
        let report = ManifestValidator::default().validate(json);
        assert!(report.is_valid);
        assert!(report.warnings.iter().any(|w| w.contains("script")));
    }

    #[test]
    fn test_script_tag_rejected_in_strict_mode() {
        let json = r#"{
            "name": "x", "version": "1.0.0", "type": "agent", "author": "a",
            "category": "c", "source": "./x",
            "description": "<script>alert('hi')</script>"
        }"#;
        let report = ManifestValidator::default().strict(true).validate(json);
        assert!(!report.is_valid);
        assert!(report.warnings.is_empty());
        assert!(report.errors.iter().any(|e| e.contains("script")));
    }

    #[test]
    fn test_size_ceiling() {
        let big = format!(r#"{{"name": "{}"}}"#, "a".repeat(2048));
        let report = ManifestValidator::default().max_bytes(1024).validate(&big);
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("size limit"));
    }

    #[test]
    fn test_invalid_json() {
        let report = ManifestValidator::default().validate("{ not json");
        assert!(!report.is_valid);
        assert!(report.errors[0].starts_with("Invalid JSON"));
    }

    #[test]
    fn test_non_object_document() {
        let report = ManifestValidator::default().validate("[1, 2, 3]");
        assert!(!report.is_valid);
    }

    #[test]
    fn test_non_semver_version_warns() {
        let json = r#"{
            "name": "x", "version": "latest", "type": "agent", "author": "a",
            "category": "c", "source": "./x", "description": "d"
        }"#;
        let report = ManifestValidator::default().validate(json);
        assert!(report.is_valid);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_marketplace_schema() {
        let json = r#"{
            "name": "tools",
            "owner": { "name": "Team" },
            "metadata": { "description": "Team tools" },
            "plugins": [ { "name": "a", "source": "./plugins/a" } ]
        }"#;
        let report = ManifestValidator::new(ManifestSchema::Marketplace).validate(json);
        assert!(report.is_valid, "{:?}", report);

        let broken = r#"{ "name": "tools", "owner": "Team", "plugins": {} }"#;
        let report = ManifestValidator::new(ManifestSchema::Marketplace).validate(broken);
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("array")));
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = ManifestValidator::default().validate(complete_plugin());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["isValid"], true);
    }
}

//! Validation Module
//!
//! - `manifest`: schema checks for fetched JSON documents
//! - `security`: content rules applied to every string field

pub mod manifest;
pub mod security;

pub use manifest::{
    ManifestSchema, ManifestValidator, RequiredField, ValidationReport,
    DEFAULT_MAX_MANIFEST_BYTES, MARKETPLACE_FIELDS, PLUGIN_FIELDS,
};
pub use security::{scan, SecurityFinding, SecurityRule};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Missing credentials: environment variable {var} is not set")]
    MissingCredentials { var: String },

    #[error("Invalid repository identifier: '{id}' - expected owner/name")]
    InvalidRepoId { id: String },

    #[error("Collection failed: no marketplaces collected ({errors} errors)")]
    CollectionFailed { errors: usize },

    #[error("Integrity check failed: {failures} problem(s) in {dir}")]
    IntegrityFailed { dir: PathBuf, failures: usize },

    #[error("Snapshot not found: {id}")]
    SnapshotNotFound { id: String },

    #[error("Checksum mismatch for snapshot {id}: {detail}")]
    ChecksumMismatch { id: String, detail: String },

    #[error("Invalid manifest {path}: {errors} error(s)")]
    InvalidManifest { path: PathBuf, errors: usize },

    #[error("Output directory does not exist: {path}")]
    OutputNotFound { path: PathBuf },

    #[error("Failed to parse config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Config key not found: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Invalid category pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Home directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, ScoutError>;

impl ScoutError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingCredentials { .. } => 2,
            Self::IntegrityFailed { .. } => 3,
            Self::CollectionFailed { .. } => 4,
            Self::ChecksumMismatch { .. } => 5,
            _ => 1,
        }
    }
}

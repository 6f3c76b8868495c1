//! Code-host access
//!
//! `HostClient` is the only network seam of the pipeline. Everything above it
//! (search runner, repository processor) is written against the trait, so a
//! run can be replayed against an in-memory host.

pub mod client;
#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::search::{SearchMode, SearchPage};
use crate::types::{RepoId, Repository};

pub use client::GitHubClient;

/// Failure of a single host request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited (reset in {reset_in_secs:?}s)")]
    RateLimited { reset_in_secs: Option<u64> },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("undecodable response: {0}")]
    Decode(String),
}

impl FetchError {
    /// The thing asked for does not exist; callers treat it as "nothing there"
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Auth, rate limit, timeout, transport or server trouble
    pub fn is_hard(&self) -> bool {
        !self.is_absence()
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Kind of a directory listing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    #[serde(other)]
    Other,
}

/// One entry of a repository directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn dir(parent: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: format!("{}/{}", parent.trim_end_matches('/'), name),
            kind: EntryKind::Dir,
        }
    }

    pub fn file(parent: &str, name: &str) -> Self {
        Self {
            kind: EntryKind::File,
            ..Self::dir(parent, name)
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Read-only access to a code host
#[async_trait]
pub trait HostClient: Send + Sync {
    /// One page (1-based) of a search query
    async fn search(
        &self,
        mode: SearchMode,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> FetchResult<SearchPage>;

    /// Full repository metadata
    async fn repository(&self, id: &RepoId) -> FetchResult<Repository>;

    /// Text content of a file on the default branch; `None` when absent
    async fn file(&self, id: &RepoId, path: &str) -> FetchResult<Option<String>>;

    /// Entries of a directory on the default branch; `None` when absent
    async fn list_dir(&self, id: &RepoId, path: &str) -> FetchResult<Option<Vec<DirEntry>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_the_only_absence() {
        assert!(FetchError::NotFound("x".into()).is_absence());
        for err in [
            FetchError::Unauthorized("bad token".into()),
            FetchError::RateLimited {
                reset_in_secs: Some(10),
            },
            FetchError::Timeout("30s".into()),
            FetchError::Http {
                status: 502,
                message: "bad gateway".into(),
            },
            FetchError::Transport("dns".into()),
            FetchError::Decode("eof".into()),
        ] {
            assert!(err.is_hard(), "{:?}", err);
        }
    }

    #[test]
    fn test_dir_entry_deserializes_listing() {
        let json = r#"[
            {"name": "reviewer", "path": "plugins/reviewer", "type": "dir", "sha": "abc"},
            {"name": "README.md", "path": "plugins/README.md", "type": "file"},
            {"name": "link", "path": "plugins/link", "type": "symlink"}
        ]"#;
        let entries: Vec<DirEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0], DirEntry::dir("plugins", "reviewer"));
        assert_eq!(entries[1], DirEntry::file("plugins/", "README.md"));
        assert_eq!(entries[2].kind, EntryKind::Other);
    }
}

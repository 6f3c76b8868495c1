//! In-memory host used by tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};

use super::{DirEntry, FetchError, FetchResult, HostClient};
use crate::search::{SearchMode, SearchPage};
use crate::types::{RepoId, Repository};

#[derive(Default)]
pub(crate) struct FakeHost {
    repos: HashMap<String, Repository>,
    repo_errors: HashMap<String, FetchError>,
    files: HashMap<(String, String), String>,
    file_errors: HashMap<(String, String), FetchError>,
    dirs: HashMap<(String, String), Vec<DirEntry>>,
    searches: HashMap<String, Vec<Vec<RepoId>>>,
    search_errors: HashMap<String, FetchError>,
    requests: AtomicUsize,
    log: Mutex<Vec<String>>,
}

/// Repository fixture updated a week before 2025-06-01
pub(crate) fn repository(id: &str) -> Repository {
    let id: RepoId = id.parse().unwrap();
    let updated = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap() - Duration::days(7);
    Repository {
        id,
        description: Some("Claude Code plugins".into()),
        owner_type: "User".into(),
        stars: 100,
        forks: 10,
        license: Some("MIT".into()),
        topics: vec!["claude-code".into()],
        language: Some("TypeScript".into()),
        default_branch: "main".into(),
        created_at: Some(updated - Duration::days(100)),
        updated_at: Some(updated),
        pushed_at: Some(updated),
    }
}

fn key(id: &RepoId, path: &str) -> (String, String) {
    (id.key(), path.trim_matches('/').to_string())
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(mut self, repo: Repository) -> Self {
        self.repos.insert(repo.id.key(), repo);
        self
    }

    pub fn with_repos(self, ids: &[&str]) -> Self {
        ids.iter().fold(self, |host, id| host.with_repo(repository(id)))
    }

    pub fn with_repo_error(mut self, id: &str, err: FetchError) -> Self {
        let id: RepoId = id.parse().unwrap();
        self.repo_errors.insert(id.key(), err);
        self
    }

    pub fn with_file(mut self, id: &str, path: &str, content: &str) -> Self {
        let id: RepoId = id.parse().unwrap();
        self.files.insert(key(&id, path), content.to_string());
        self
    }

    pub fn with_file_error(mut self, id: &str, path: &str, err: FetchError) -> Self {
        let id: RepoId = id.parse().unwrap();
        self.file_errors.insert(key(&id, path), err);
        self
    }

    pub fn with_dir(mut self, id: &str, path: &str, entries: Vec<DirEntry>) -> Self {
        let id: RepoId = id.parse().unwrap();
        self.dirs.insert(key(&id, path), entries);
        self
    }

    /// Pages returned for `query`, in order
    pub fn with_search(mut self, query: &str, pages: &[&[&str]]) -> Self {
        let pages = pages
            .iter()
            .map(|page| page.iter().map(|id| id.parse().unwrap()).collect())
            .collect();
        self.searches.insert(query.to_string(), pages);
        self
    }

    pub fn with_search_error(mut self, query: &str, err: FetchError) -> Self {
        self.search_errors.insert(query.to_string(), err);
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl HostClient for FakeHost {
    async fn search(
        &self,
        mode: SearchMode,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> FetchResult<SearchPage> {
        self.record(format!("search {} {} p{}", mode, query, page));
        if let Some(err) = self.search_errors.get(query) {
            return Err(err.clone());
        }

        let pages = self.searches.get(query).cloned().unwrap_or_default();
        let total: usize = pages.iter().map(Vec::len).sum();
        let repositories = pages
            .get(page.saturating_sub(1) as usize)
            .cloned()
            .unwrap_or_default();
        // full pages signal that more may follow
        let item_count = if (page as usize) < pages.len() {
            per_page as usize
        } else {
            repositories.len()
        };

        Ok(SearchPage {
            total_count: if (page as usize) < pages.len() {
                u64::MAX
            } else {
                total as u64
            },
            item_count,
            repositories,
        })
    }

    async fn repository(&self, id: &RepoId) -> FetchResult<Repository> {
        self.record(format!("repo {}", id));
        if let Some(err) = self.repo_errors.get(&id.key()) {
            return Err(err.clone());
        }
        self.repos
            .get(&id.key())
            .cloned()
            .ok_or_else(|| FetchError::NotFound(id.to_string()))
    }

    async fn file(&self, id: &RepoId, path: &str) -> FetchResult<Option<String>> {
        self.record(format!("file {} {}", id, path));
        let k = key(id, path);
        if let Some(err) = self.file_errors.get(&k) {
            return Err(err.clone());
        }
        Ok(self.files.get(&k).cloned())
    }

    async fn list_dir(&self, id: &RepoId, path: &str) -> FetchResult<Option<Vec<DirEntry>>> {
        self.record(format!("dir {} {}", id, path));
        Ok(self.dirs.get(&key(id, path)).cloned())
    }
}

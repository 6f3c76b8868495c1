//! GitHub REST client

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use super::{DirEntry, FetchError, FetchResult, HostClient};
use crate::config::GitHubConfig;
use crate::error::{Result, ScoutError};
use crate::search::{SearchMode, SearchPage};
use crate::types::{RepoId, Repository};

const API_VERSION: &str = "2022-11-28";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";

/// Authenticated client for the GitHub REST API
pub struct GitHubClient {
    http: Client,
    api_base: String,
    max_rate_limit_wait: Duration,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ScoutError::HttpClient("token contains invalid characters".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_MEDIA_TYPE));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("plugin-scout/", env!("CARGO_PKG_VERSION"))),
        );

        let http = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .map_err(|e| ScoutError::HttpClient(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            max_rate_limit_wait: config.max_rate_limit_wait(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn contents_url(&self, id: &RepoId, path: &str) -> String {
        self.url(&format!(
            "repos/{}/{}/contents/{}",
            id.owner,
            id.name,
            path.trim_matches('/')
        ))
    }

    /// GET with one bounded sleep-and-retry on rate limiting
    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        accept: Option<&'static str>,
    ) -> FetchResult<Response> {
        let mut retried = false;
        loop {
            let mut request = self.http.get(url).query(query);
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            let response = request.send().await.map_err(|e| transport_error(url, e))?;

            match check_status(url, response).await {
                Err(FetchError::RateLimited { reset_in_secs }) if !retried => {
                    let wait = Duration::from_secs(reset_in_secs.unwrap_or(0).max(1));
                    if wait > self.max_rate_limit_wait {
                        tracing::warn!(
                            "Rate limit reset in {:?} exceeds max wait {:?}",
                            wait,
                            self.max_rate_limit_wait
                        );
                        return Err(FetchError::RateLimited { reset_in_secs });
                    }
                    tracing::info!("Rate limited, sleeping {:?} before retrying {}", wait, url);
                    tokio::time::sleep(wait).await;
                    retried = true;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl HostClient for GitHubClient {
    async fn search(
        &self,
        mode: SearchMode,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> FetchResult<SearchPage> {
        let url = self.url(mode.endpoint());
        let params = [
            ("q", query.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.min(mode.max_per_page()).to_string()),
        ];
        let body: serde_json::Value = self
            .get(&url, &params, None)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(mode.parse_page(&body))
    }

    async fn repository(&self, id: &RepoId) -> FetchResult<Repository> {
        let url = self.url(&format!("repos/{}/{}", id.owner, id.name));
        let payload: RepoPayload = self
            .get(&url, &[], None)
            .await?
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        Ok(payload.into_repository(id))
    }

    async fn file(&self, id: &RepoId, path: &str) -> FetchResult<Option<String>> {
        let url = self.contents_url(id, path);
        match self.get(&url, &[], Some(RAW_MEDIA_TYPE)).await {
            Ok(response) => response
                .text()
                .await
                .map(Some)
                .map_err(|e| FetchError::Decode(e.to_string())),
            Err(e) if e.is_absence() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_dir(&self, id: &RepoId, path: &str) -> FetchResult<Option<Vec<DirEntry>>> {
        let url = self.contents_url(id, path);
        let response = match self.get(&url, &[], None).await {
            Ok(response) => response,
            Err(e) if e.is_absence() => return Ok(None),
            Err(e) => return Err(e),
        };
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        // a path naming a file returns an object, not a listing
        if !body.is_array() {
            return Ok(None);
        }
        serde_json::from_value(body)
            .map(Some)
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(url.to_string())
    } else if e.is_decode() {
        FetchError::Decode(e.to_string())
    } else {
        FetchError::Transport(e.to_string())
    }
}

async fn check_status(url: &str, response: Response) -> FetchResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_limit = rate_limit_delay(response.headers(), Utc::now().timestamp());
    let message = response.text().await.unwrap_or_default();
    Err(classify(url, status, rate_limit, message))
}

/// Map a failed status to a fetch error
fn classify(url: &str, status: StatusCode, rate_limit: Option<u64>, message: String) -> FetchError {
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound(url.to_string()),
        StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited {
            reset_in_secs: rate_limit,
        },
        StatusCode::FORBIDDEN if rate_limit.is_some() => FetchError::RateLimited {
            reset_in_secs: rate_limit,
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthorized(url.to_string()),
        _ => FetchError::Http {
            status: status.as_u16(),
            message: truncate(&message, 200),
        },
    }
}

/// Seconds until the host allows requests again, if it says so.
///
/// `retry-after` wins; otherwise an exhausted `x-ratelimit-remaining` plus
/// `x-ratelimit-reset` (epoch seconds) is used.
fn rate_limit_delay(headers: &HeaderMap, now_epoch: i64) -> Option<u64> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
    };

    if let Some(secs) = header("retry-after") {
        return Some(secs.max(0) as u64);
    }
    match (header("x-ratelimit-remaining"), header("x-ratelimit-reset")) {
        (Some(0), Some(reset)) => Some((reset - now_epoch).max(0) as u64),
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct OwnerPayload {
    #[serde(rename = "type", default)]
    owner_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LicensePayload {
    spdx_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepoPayload {
    full_name: Option<String>,
    description: Option<String>,
    owner: Option<OwnerPayload>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    license: Option<LicensePayload>,
    #[serde(default)]
    topics: Vec<String>,
    language: Option<String>,
    default_branch: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    pushed_at: Option<DateTime<Utc>>,
}

impl RepoPayload {
    fn into_repository(self, requested: &RepoId) -> Repository {
        // the host reports the canonical casing after renames
        let id = self
            .full_name
            .as_deref()
            .and_then(|n| n.parse::<RepoId>().ok())
            .unwrap_or_else(|| requested.clone());

        let license = self.license.and_then(|l| match l.spdx_id.as_deref() {
            Some("NOASSERTION") | None => l.name,
            Some(spdx) => Some(spdx.to_string()),
        });

        Repository {
            id,
            description: self.description.filter(|d| !d.trim().is_empty()),
            owner_type: self
                .owner
                .and_then(|o| o.owner_type)
                .unwrap_or_else(|| "User".to_string()),
            stars: self.stargazers_count,
            forks: self.forks_count,
            license,
            topics: self.topics,
            language: self.language,
            default_branch: self.default_branch.unwrap_or_else(|| "main".to_string()),
            created_at: self.created_at,
            updated_at: self.updated_at,
            pushed_at: self.pushed_at,
        }
    }
}

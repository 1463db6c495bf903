pub mod rate_limit;
pub mod types;

pub use rate_limit::RateLimitGate;
pub use types::RepoRef;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cache::CacheStore;
use types::PullResponse;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = "changelog-checker";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("PR #{number} not found on GitHub")]
    NotFound { number: u64 },

    #[error("rate limited by GitHub API{}", until(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("GitHub API returned status {0}")]
    UnexpectedStatus(u16),

    #[error("Invalid repository: {0}")]
    InvalidRepo(String),
}

fn until(reset_at: &Option<DateTime<Utc>>) -> String {
    reset_at
        .map(|t| format!(" until {}", t.to_rfc3339()))
        .unwrap_or_default()
}

/// Parse a repository given as `owner/name` or as a GitHub URL
/// (`https://github.com/owner/name`).
pub fn parse_repo(input: &str) -> Result<RepoRef, GitHubError> {
    let invalid = || GitHubError::InvalidRepo(input.to_string());

    let segments: Vec<String> = if input.contains("://") {
        let parsed = reqwest::Url::parse(input).map_err(|_| invalid())?;
        if parsed.host_str() != Some("github.com") {
            return Err(invalid());
        }
        parsed
            .path_segments()
            .ok_or_else(invalid)?
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        input.split('/').map(str::to_string).collect()
    };

    if segments.len() != 2 {
        return Err(invalid());
    }

    let owner = segments[0].as_str();
    let name = segments[1].strip_suffix(".git").unwrap_or(segments[1].as_str());
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if !valid(owner) || !valid(name) {
        return Err(invalid());
    }

    Ok(RepoRef::new(owner, name))
}

/// Reads the `X-RateLimit-Reset` header (unix seconds).
pub fn rate_limit_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let seconds = headers
        .get("x-ratelimit-reset")?
        .to_str()
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()?;
    DateTime::from_timestamp(seconds, 0)
}

/// Source of PR titles. Implemented by [`GitHubClient`]; tests substitute fakes.
#[async_trait]
pub trait PrTitleSource: Send + Sync {
    async fn pr_title(&self, repo: &RepoRef, number: u64) -> Result<String, GitHubError>;
}

/// GitHub REST client for PR metadata, with a read-through title cache and
/// rate-limit cooldown tracking.
pub struct GitHubClient {
    http: reqwest::Client,
    token: Option<String>,
    api_url: String,
    cache: Arc<CacheStore>,
    rate_limit: RateLimitGate,
}

impl GitHubClient {
    pub fn new(
        token: Option<String>,
        api_url: Option<String>,
        cache: Arc<CacheStore>,
    ) -> Result<Self, GitHubError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        let api_url = api_url
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            token,
            api_url,
            cache,
            rate_limit: RateLimitGate::new(),
        })
    }

    pub fn rate_limit(&self) -> &RateLimitGate {
        &self.rate_limit
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Check that the configured token can read `repo`.
    #[instrument(skip(self, repo), fields(repo = %repo))]
    pub async fn verify_token(&self, repo: &RepoRef) -> Result<bool, GitHubError> {
        let url = format!("{}/repos/{}/{}", self.api_url, repo.owner, repo.name);
        let response = self.get(&url).send().await?;
        debug!(status = %response.status(), "token check response");
        Ok(response.status() == StatusCode::OK)
    }

    /// Fetch the PR title straight from the API, bypassing the cache.
    #[instrument(skip(self, repo), fields(repo = %repo))]
    async fn fetch_title(&self, repo: &RepoRef, number: u64) -> Result<String, GitHubError> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_url, repo.owner, repo.name, number
        );

        debug!("fetching PR metadata from GitHub API");
        let response = self.get(&url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(GitHubError::NotFound { number });
        }

        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            let reset_at = rate_limit_reset(response.headers());
            if let Some(reset) = reset_at {
                warn!(reset_at = %reset.to_rfc3339(), "GitHub rate limit hit");
                self.rate_limit.trip(reset);
            }
            return Err(GitHubError::RateLimited { reset_at });
        }

        if !status.is_success() {
            return Err(GitHubError::UnexpectedStatus(status.as_u16()));
        }

        let pull = response.json::<PullResponse>().await?;
        debug!(title = %pull.title, "received PR metadata");
        Ok(pull.title)
    }
}

#[async_trait]
impl PrTitleSource for GitHubClient {
    async fn pr_title(&self, repo: &RepoRef, number: u64) -> Result<String, GitHubError> {
        self.rate_limit.check(Utc::now())?;

        let key = repo.pr_key(number);
        self.cache
            .read_through(&key, || self.fetch_title(repo, number))
            .await
    }
}

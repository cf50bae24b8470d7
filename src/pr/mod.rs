pub mod diff;
pub mod types;

pub use types::{PullRequest, PullSummary, RepoScope, RequestKey};

use reqwest::{Response, StatusCode};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::automation::MergeMethod;
use crate::config::Config;

const USER_AGENT: &str = "pr-autopilot";

#[derive(Debug, Error)]
pub enum PrError {
    #[error("GitHub API request failed: {0}")]
    ApiRequest(#[from] reqwest::Error),

    #[error("GitHub rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Invalid repository: {0}")]
    InvalidScope(String),

    #[error("Failed to parse diff: {0}")]
    DiffParse(String),

    #[error("GitHub token not found in config or environment")]
    MissingToken,
}

/// Parse a repository reference into a [`RepoScope`].
///
/// Accepts `owner/repo`, `https://github.com/owner/repo` and PR URLs
/// (`https://github.com/owner/repo/pull/42`, the PR part is ignored).
pub fn parse_repo_scope(input: &str) -> Result<RepoScope, PrError> {
    let invalid = || PrError::InvalidScope(input.to_string());

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
        input
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    };

    match segments.as_slice() {
        [owner, repo] => Ok(RepoScope::new(owner.as_str(), repo.trim_end_matches(".git"))),
        [owner, repo, kind, number] if kind == "pull" && number.parse::<u64>().is_ok() => {
            Ok(RepoScope::new(owner.as_str(), repo.as_str()))
        }
        _ => Err(invalid()),
    }
}

/// Thin client over the GitHub REST endpoints the automation needs.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(config: &Config) -> Result<Self, PrError> {
        let token = config.github_token().ok_or(PrError::MissingToken)?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_url: config.github.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn pulls_url(&self, scope: &RepoScope) -> String {
        format!("{}/repos/{}/{}/pulls", self.api_url, scope.owner, scope.repo)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .bearer_auth(&self.token)
    }

    /// List open pull requests (first page of 100).
    #[instrument(skip(self, scope), fields(owner = %scope.owner, repo = %scope.repo))]
    pub async fn list_open_pulls(&self, scope: &RepoScope) -> Result<Vec<PullSummary>, PrError> {
        let url = format!("{}?state=open&per_page=100", self.pulls_url(scope));
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let pulls = check(response).await?.json::<Vec<PullSummary>>().await?;
        debug!(count = pulls.len(), "listed open pull requests");
        Ok(pulls)
    }

    /// Fetch PR metadata and its parsed diff.
    #[instrument(skip(self, key), fields(pr = %key))]
    pub async fn fetch_pull_request(&self, key: &RequestKey) -> Result<PullRequest, PrError> {
        let url = format!("{}/{}", self.pulls_url(&key.scope), key.pr_number);

        #[derive(serde::Deserialize)]
        struct User {
            login: String,
        }

        #[derive(serde::Deserialize)]
        struct PullResponse {
            number: u64,
            title: String,
            user: User,
        }

        debug!("fetching PR metadata from GitHub API");
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let metadata = check(response).await?.json::<PullResponse>().await?;

        debug!("fetching PR diff from GitHub API");
        let response = self
            .request(reqwest::Method::GET, &url)
            .header("Accept", "application/vnd.github.diff")
            .send()
            .await?;
        let diff_text = check(response).await?.text().await?;
        debug!(diff_bytes = diff_text.len(), "received PR diff");

        let files = diff::parse_diff(&diff_text)?;
        Ok(PullRequest {
            number: metadata.number,
            title: metadata.title,
            author: metadata.user.login,
            files,
        })
    }

    /// Submit an approving review.
    #[instrument(skip(self, key), fields(pr = %key))]
    pub async fn approve(&self, key: &RequestKey) -> Result<(), PrError> {
        let url = format!("{}/{}/reviews", self.pulls_url(&key.scope), key.pr_number);
        let body = serde_json::json!({
            "event": "APPROVE",
            "body": "Approved automatically: risk within the configured auto-approve threshold.",
        });
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Merge the pull request with the given method.
    #[instrument(skip(self, key, method), fields(pr = %key, method = %method))]
    pub async fn merge(&self, key: &RequestKey, method: MergeMethod) -> Result<(), PrError> {
        let url = format!("{}/{}/merge", self.pulls_url(&key.scope), key.pr_number);
        let body = serde_json::json!({ "merge_method": method.as_str() });
        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

/// Turn a non-success status into [`PrError::Rejected`], keeping GitHub's
/// `message` field when the body carries one.
async fn check(response: Response) -> Result<Response, PrError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    Err(PrError::Rejected { status, message })
}

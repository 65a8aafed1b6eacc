//! GitHub REST API client.
//!
//! Implements [`DiffProvider`] over the pull request files endpoint and
//! [`CommentHost`] over the issue comments endpoints.

use crate::comment::{Comment, CommentHost};
use crate::config::GitHubConfig;
use crate::diff::{DiffProvider, SpecFilter};
use crate::models::{ChangedSpec, PullRequestRef};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Files requested per page from the pull request files endpoint
const FILES_PER_PAGE: u32 = 100;

/// GitHub lists at most 3000 files for a pull request
const MAX_FILE_PAGES: u32 = 30;

const API_VERSION: &str = "2022-11-28";

/// Errors returned by the GitHub client
#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("GitHub API returned {status} for {endpoint}: {message}")]
    Api {
        status: u16,
        endpoint: String,
        message: String,
    },

    #[error("Invalid GitHub client configuration: {0}")]
    Configuration(String),
}

/// Entry of `GET /repos/{owner}/{repo}/pulls/{number}/files`
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedComment {
    id: u64,
}

/// Authenticated GitHub REST client
pub struct GitHubClient {
    http: Client,
    api_url: String,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| GitHubError::Configuration(format!("token is not a valid header: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()
            .map_err(|e| GitHubError::Configuration(e.to_string()))?;

        info!(api_url = %config.api_url, "GitHub client initialized");

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Send a request and decode a JSON response, mapping non-2xx statuses
    /// to [`GitHubError::Api`]
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<T, GitHubError> {
        let response = self.send(request, endpoint).await?;
        response.json::<T>().await.map_err(|source| GitHubError::Transport {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    async fn send(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<reqwest::Response, GitHubError> {
        let response = request
            .send()
            .await
            .map_err(|source| GitHubError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(GitHubError::Api {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
            message: api_error_message(&text),
        })
    }

    /// Every file changed by the pull request, in API order
    #[instrument(skip_all, fields(pr = %pr))]
    pub async fn list_pull_request_files(
        &self,
        pr: &PullRequestRef,
    ) -> Result<Vec<PullRequestFile>, GitHubError> {
        let endpoint = self.endpoint(&format!(
            "/repos/{}/{}/pulls/{}/files",
            pr.owner, pr.repo, pr.number
        ));

        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let request = self
                .http
                .get(&endpoint)
                .query(&[("per_page", FILES_PER_PAGE), ("page", page)]);
            let batch: Vec<PullRequestFile> = self.send_json(request, &endpoint).await?;
            let done = batch.len() < FILES_PER_PAGE as usize;

            debug!(page, files = batch.len(), "Fetched pull request files page");
            files.extend(batch);

            if done {
                break;
            }
        }

        Ok(files)
    }
}

/// Keep files that still exist and match the spec filter
pub fn select_changed_specs(files: Vec<PullRequestFile>, filter: &SpecFilter) -> Vec<ChangedSpec> {
    files
        .into_iter()
        .filter(|f| f.status != "removed")
        .filter(|f| filter.is_spec(&f.filename))
        .map(|f| ChangedSpec::new(f.filename))
        .collect()
}

fn api_error_message(text: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(text)
        .map(|body| body.message)
        .unwrap_or_else(|_| text.trim().to_string())
}

#[async_trait]
impl DiffProvider for GitHubClient {
    async fn list_changed_specs(
        &self,
        pr: &PullRequestRef,
        pattern: &str,
    ) -> anyhow::Result<Vec<ChangedSpec>> {
        let filter = SpecFilter::new(pattern)?;
        let files = self.list_pull_request_files(pr).await?;
        let total = files.len();
        let specs = select_changed_specs(files, &filter);

        info!(
            changed_files = total,
            changed_specs = specs.len(),
            pattern = %pattern,
            "Resolved changed specs"
        );

        Ok(specs)
    }
}

#[async_trait]
impl CommentHost for GitHubClient {
    async fn list_comments(
        &self,
        pr: &PullRequestRef,
        page: u32,
        per_page: u32,
    ) -> anyhow::Result<Vec<Comment>> {
        let endpoint = self.endpoint(&format!(
            "/repos/{}/{}/issues/{}/comments",
            pr.owner, pr.repo, pr.number
        ));
        let request = self
            .http
            .get(&endpoint)
            .query(&[("per_page", per_page), ("page", page)]);

        Ok(self.send_json(request, &endpoint).await?)
    }

    async fn create_comment(&self, pr: &PullRequestRef, body: &str) -> anyhow::Result<u64> {
        let endpoint = self.endpoint(&format!(
            "/repos/{}/{}/issues/{}/comments",
            pr.owner, pr.repo, pr.number
        ));
        let request = self.http.post(&endpoint).json(&CommentBody { body });
        let created: CreatedComment = self.send_json(request, &endpoint).await?;

        Ok(created.id)
    }

    async fn update_comment(
        &self,
        pr: &PullRequestRef,
        comment_id: u64,
        body: &str,
    ) -> anyhow::Result<()> {
        let endpoint = self.endpoint(&format!(
            "/repos/{}/{}/issues/comments/{}",
            pr.owner, pr.repo, comment_id
        ));
        let request = self.http.patch(&endpoint).json(&CommentBody { body });
        self.send(request, &endpoint).await?;

        Ok(())
    }
}

//! REST client for the tracker API.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use issuedesk_core::{Config, ReqwestErrorExt};
use issuedesk_sync::{
    AssigneeFilter, Board, Comment, IssueDetail, IssueDraft, IssuePatch, IssueQuery,
    IssueRepository, IssueSummary, SortDirection, SyncError, SyncResult,
};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;

use crate::retry::{with_retry, RetryConfig};

#[derive(Debug, Deserialize)]
struct IssueListResponse {
    issues: Vec<IssueSummary>,
}

#[derive(Debug, Deserialize)]
struct BoardListResponse {
    boards: Vec<Board>,
}

#[derive(Debug, Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

/// Query string for an issue list request.
pub fn query_params(query: &IssueQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();
    if let Some(search) = query.search() {
        params.push(("q", search.to_string()));
    }
    for project in &query.filters.project_ids {
        params.push(("project", project.clone()));
    }
    for status in &query.filters.statuses {
        params.push(("status", status.as_str().to_string()));
    }
    for priority in &query.filters.priorities {
        params.push(("priority", priority.as_str().to_string()));
    }
    match &query.filters.assignee {
        Some(AssigneeFilter::Unassigned) => params.push(("assignee", "none".to_string())),
        Some(AssigneeFilter::Person(id)) => params.push(("assignee", id.clone())),
        None => {}
    }
    for label in &query.filters.labels {
        params.push(("label", label.clone()));
    }
    params.push(("sort", query.sort.field.as_str().to_string()));
    let order = match query.sort.direction {
        SortDirection::Ascending => "asc",
        SortDirection::Descending => "desc",
    };
    params.push(("order", order.to_string()));
    params.push(("limit", query.page.size.to_string()));
    params.push(("offset", query.page.offset.to_string()));
    params
}

/// `IssueRepository` over HTTP.
///
/// Reads are retried with backoff. Writes get a single attempt so a lost
/// response never turns into a duplicate issue or a false conflict.
#[derive(Debug, Clone)]
pub struct RestIssueRepository {
    client: Client,
    base_url: Url,
    token: Option<String>,
    retry: RetryConfig,
}

impl RestIssueRepository {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Self::with_client(client, base_url, token)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let allow_invalid_certs = cfg!(debug_assertions) && config.server.allow_invalid_certs;
        if allow_invalid_certs {
            tracing::warn!("TLS certificate validation disabled");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.server.timeout_secs))
            .danger_accept_invalid_certs(allow_invalid_certs)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(
            Self::with_client(client, &config.server.base_url, config.server.api_token.clone())?
                .with_retry_config(RetryConfig::from_settings(&config.retry)),
        )
    }

    fn with_client(client: Client, base_url: &str, token: Option<String>) -> Result<Self> {
        let mut base_url = Url::parse(base_url).context("Invalid tracker URL")?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::transport("Tracker URL cannot be a base"))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map transport failures and non-2xx statuses to `SyncError`.
    async fn check(result: Result<Response, reqwest::Error>) -> SyncResult<Response> {
        let response = result.map_err(|e| SyncError::from(e.into_network_error()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("Unknown status").to_string()
        } else {
            body
        };
        tracing::debug!("Tracker answered {}: {}", status, message);
        Err(SyncError::remote(status.as_u16(), message))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> SyncResult<T> {
        response
            .json()
            .await
            .map_err(|e| SyncError::from(e.into_network_error()))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> SyncResult<T> {
        self.get_json_with(url, &[]).await
    }

    async fn get_json_with<T: DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&'static str, String)],
    ) -> SyncResult<T> {
        let result = with_retry(&self.retry, || {
            self.authorize(self.client.get(url.clone()).query(params)).send()
        })
        .await;
        Self::decode(Self::check(result).await?).await
    }
}

/// HTTP-date form used by conditional request headers.
fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[async_trait]
impl IssueRepository for RestIssueRepository {
    #[instrument(skip(self), level = "info")]
    async fn fetch_issues(&self, query: &IssueQuery) -> SyncResult<Vec<IssueSummary>> {
        let url = self.endpoint(&["issues"])?;
        let list: IssueListResponse = self.get_json_with(url, &query_params(query)).await?;
        tracing::debug!("Fetched {} issues", list.issues.len());
        Ok(list.issues)
    }

    #[instrument(skip(self, issue), fields(issue_id = %issue.id), level = "info")]
    async fn fetch_issue_detail(&self, issue: &IssueSummary) -> SyncResult<IssueDetail> {
        let url = self.endpoint(&["issues", &issue.id])?;
        self.get_json(url).await
    }

    #[instrument(skip(self, draft), fields(project = %draft.project_id), level = "info")]
    async fn create_issue(&self, draft: &IssueDraft) -> SyncResult<IssueSummary> {
        let url = self.endpoint(&["issues"])?;
        let result = self.authorize(self.client.post(url).json(draft)).send().await;
        let created: IssueSummary = Self::decode(Self::check(result).await?).await?;
        tracing::info!("Created issue {}", created.key);
        Ok(created)
    }

    #[instrument(skip(self, patch), level = "info")]
    async fn update_issue(
        &self,
        id: &str,
        patch: &IssuePatch,
        last_seen: Option<DateTime<Utc>>,
    ) -> SyncResult<IssueSummary> {
        let url = self.endpoint(&["issues", id])?;
        let mut request = self.authorize(self.client.patch(url).json(patch));
        if let Some(at) = last_seen {
            request = request.header(header::IF_UNMODIFIED_SINCE, http_date(at));
        }
        let result = request.send().await;
        Self::decode(Self::check(result).await?).await
    }

    #[instrument(skip(self, text), level = "info")]
    async fn add_comment(&self, issue_id: &str, text: &str) -> SyncResult<Comment> {
        let url = self.endpoint(&["issues", issue_id, "comments"])?;
        let result = self
            .authorize(self.client.post(url).json(&CommentRequest { body: text }))
            .send()
            .await;
        Self::decode(Self::check(result).await?).await
    }

    #[instrument(skip(self), level = "info")]
    async fn fetch_boards(&self, project_id: &str) -> SyncResult<Vec<Board>> {
        let url = self.endpoint(&["projects", project_id, "boards"])?;
        let list: BoardListResponse = self.get_json(url).await?;
        Ok(list.boards)
    }
}

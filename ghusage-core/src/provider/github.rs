//! GitHub REST API provider

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::SourceProvider;
use crate::error::{Result, UsageError};
use crate::usage::{RepoVisibility, Repository, UsageRecord, Workflow, WorkflowRun};

/// Default GitHub API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// REST API version sent with every request
const API_VERSION: &str = "2022-11-28";

/// GitHub caps `per_page` at 100
const MAX_PER_PAGE: usize = 100;

/// Connection settings for [`GitHubProvider`]
#[derive(Debug, Clone)]
pub struct GitHubProviderConfig {
    /// API base URL (GitHub Enterprise Server uses `https://<host>/api/v3`)
    pub base_url: String,
    /// Access token; requests are unauthenticated without one
    pub token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// User-Agent header, required by GitHub
    pub user_agent: String,
}

impl Default for GitHubProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("ghusage/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Provider backed by the GitHub REST API.
pub struct GitHubProvider {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl std::fmt::Debug for GitHubProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubProvider")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl GitHubProvider {
    /// Create a provider for api.github.com.
    ///
    /// # Arguments
    ///
    /// * `token` - Access token, or `None` for unauthenticated access
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::with_config(GitHubProviderConfig {
            token,
            ..Default::default()
        })
    }

    /// Create with explicit connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_config(config: GitHubProviderConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()?;

        let token = config.token.filter(|t| !t.trim().is_empty());
        if token.is_none() {
            tracing::debug!(
                "no token provided, running unauthenticated - analysis is limited by the GitHub rate limit"
            );
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether requests carry a token
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// GET a JSON document. A 404 answer yields `Ok(None)`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, ?query, "GitHub request");

        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<GitHubError>(&text)
                .map(|e| e.message)
                .unwrap_or(text);

            return Err(UsageError::Api {
                status: status.as_u16(),
                url,
                message,
            });
        }

        let body = response.text().await?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    /// Collect every page of a list endpoint that wraps its items in an envelope
    /// with a `total_count`.
    ///
    /// Returns `Ok(None)` when the first page is missing. A later page that is
    /// missing, or a listing that ends before `total_count` items, is an error.
    async fn collect_pages<P, I>(
        &self,
        path: &str,
        mut query: Vec<(&'static str, String)>,
        split: fn(P) -> (u64, Vec<I>),
    ) -> Result<Option<Vec<I>>>
    where
        P: DeserializeOwned,
    {
        query.push(("per_page", MAX_PER_PAGE.to_string()));
        let mut items = Vec::new();
        let mut page = 1usize;

        loop {
            query.retain(|(key, _)| *key != "page");
            query.push(("page", page.to_string()));

            let envelope: P = match self.get_json(path, &query).await? {
                Some(envelope) => envelope,
                None if page == 1 => return Ok(None),
                None => {
                    return Err(UsageError::Api {
                        status: StatusCode::NOT_FOUND.as_u16(),
                        url: format!("{}{}", self.base_url, path),
                        message: format!("page {} disappeared during pagination", page),
                    });
                }
            };

            let (total_count, batch) = split(envelope);
            let batch_len = batch.len();
            items.extend(batch);

            if items.len() as u64 >= total_count {
                break;
            }
            if batch_len < MAX_PER_PAGE {
                return Err(UsageError::Provider(format!(
                    "incomplete listing of {}: got {} of {} items",
                    path,
                    items.len(),
                    total_count
                )));
            }
            page += 1;
        }

        Ok(Some(items))
    }
}

#[derive(Deserialize)]
struct GitHubError {
    message: String,
}

#[derive(Deserialize)]
struct GitHubRepository {
    name: String,
    #[serde(default)]
    private: bool,
}

#[derive(Deserialize)]
struct GitHubWorkflowList {
    total_count: u64,
    workflows: Vec<GitHubWorkflow>,
}

#[derive(Deserialize)]
struct GitHubWorkflow {
    id: u64,
    name: String,
}

#[derive(Deserialize)]
struct GitHubRunList {
    total_count: u64,
    workflow_runs: Vec<GitHubRun>,
}

#[derive(Deserialize)]
struct GitHubRun {
    id: u64,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct GitHubRunTiming {
    #[serde(default)]
    billable: Option<GitHubBillable>,
    #[serde(default)]
    run_duration_ms: Option<u64>,
}

#[derive(Deserialize)]
struct GitHubBillable {
    #[serde(rename = "MACOS", default)]
    macos: Option<GitHubBill>,
    #[serde(rename = "UBUNTU", default)]
    ubuntu: Option<GitHubBill>,
    #[serde(rename = "WINDOWS", default)]
    windows: Option<GitHubBill>,
}

#[derive(Deserialize)]
struct GitHubBill {
    #[serde(default)]
    total_ms: Option<u64>,
}

impl From<GitHubRunTiming> for UsageRecord {
    fn from(timing: GitHubRunTiming) -> Self {
        let total = |bill: Option<GitHubBill>| bill.and_then(|b| b.total_ms);
        let (macos_ms, ubuntu_ms, windows_ms) = match timing.billable {
            Some(b) => (total(b.macos), total(b.ubuntu), total(b.windows)),
            None => (None, None, None),
        };

        UsageRecord {
            macos_ms,
            ubuntu_ms,
            windows_ms,
            run_duration_ms: timing.run_duration_ms,
        }
    }
}

/// Value of the `created` filter for runs created at or after `since`
fn created_filter(since: DateTime<Utc>) -> String {
    format!(">={}", since.format("%Y-%m-%dT%H:%M:%SZ"))
}

#[async_trait]
impl SourceProvider for GitHubProvider {
    async fn list_repositories(
        &self,
        org: &str,
        visibility: RepoVisibility,
        limit: usize,
    ) -> Result<Vec<Repository>> {
        let path = format!("/orgs/{}/repos", org);
        let per_page = limit.clamp(1, MAX_PER_PAGE);
        let mut repositories = Vec::new();
        let mut page = 1usize;

        while repositories.len() < limit {
            let query = [
                ("type", visibility.as_str().to_string()),
                ("sort", "pushed".to_string()),
                ("direction", "desc".to_string()),
                ("per_page", per_page.to_string()),
                ("page", page.to_string()),
            ];

            let batch: Vec<GitHubRepository> =
                self.get_json(&path, &query).await?.ok_or_else(|| UsageError::Api {
                    status: StatusCode::NOT_FOUND.as_u16(),
                    url: format!("{}{}", self.base_url, path),
                    message: format!("organization {} not found", org),
                })?;

            let batch_len = batch.len();
            repositories.extend(batch.into_iter().map(|r| Repository {
                name: r.name,
                visibility: if r.private {
                    RepoVisibility::Private
                } else {
                    RepoVisibility::Public
                },
            }));

            if batch_len < per_page {
                break;
            }
            page += 1;
        }

        repositories.truncate(limit);
        Ok(repositories)
    }

    async fn list_workflows(
        &self,
        org: &str,
        repository: &Repository,
    ) -> Result<Option<Vec<Workflow>>> {
        let path = format!("/repos/{}/{}/actions/workflows", org, repository.name);
        let workflows = self
            .collect_pages(&path, Vec::new(), |list: GitHubWorkflowList| {
                (list.total_count, list.workflows)
            })
            .await?;

        Ok(workflows.map(|list| {
            list.into_iter()
                .map(|w| Workflow { id: w.id, name: w.name })
                .collect()
        }))
    }

    async fn list_workflow_runs(
        &self,
        org: &str,
        repository: &Repository,
        workflow: &Workflow,
        since: DateTime<Utc>,
    ) -> Result<Option<Vec<WorkflowRun>>> {
        let path = format!(
            "/repos/{}/{}/actions/workflows/{}/runs",
            org, repository.name, workflow.id
        );
        let query = vec![("created", created_filter(since))];
        let runs = self
            .collect_pages(&path, query, |list: GitHubRunList| {
                (list.total_count, list.workflow_runs)
            })
            .await?;

        Ok(runs.map(|list| {
            list.into_iter()
                .map(|r| WorkflowRun {
                    id: r.id,
                    created_at: r.created_at,
                })
                .collect()
        }))
    }

    async fn get_run_usage(
        &self,
        org: &str,
        repository: &Repository,
        run: &WorkflowRun,
    ) -> Result<Option<UsageRecord>> {
        let path = format!(
            "/repos/{}/{}/actions/runs/{}/timing",
            org, repository.name, run.id
        );
        let timing: Option<GitHubRunTiming> = self.get_json(&path, &[]).await?;
        Ok(timing.map(UsageRecord::from))
    }

    fn name(&self) -> &str {
        "github"
    }
}

//! Source providers
//!
//! A [`SourceProvider`] is the capability the traversal engine pulls data from.
//! Two implementations ship with the crate:
//!
//! - [`GitHubProvider`] talks to the GitHub REST API
//! - [`InMemoryProvider`] serves fixed data, for tests and offline runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::usage::{RepoVisibility, Repository, UsageRecord, Workflow, WorkflowRun};

pub mod github;
pub mod memory;

pub use github::{GitHubProvider, GitHubProviderConfig};
pub use memory::{FailurePoint, InMemoryProvider};

/// Trait for usage data sources.
///
/// Methods that may legitimately find nothing return `Ok(None)` for "not found"
/// (Actions disabled, run too old, not billable). Every `Err` is treated as fatal
/// by the traversal engine.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// List repositories of `org` with the given visibility, most recently pushed
    /// first, at most `limit` of them.
    async fn list_repositories(
        &self,
        org: &str,
        visibility: RepoVisibility,
        limit: usize,
    ) -> Result<Vec<Repository>>;

    /// List the workflows of a repository
    async fn list_workflows(&self, org: &str, repository: &Repository)
    -> Result<Option<Vec<Workflow>>>;

    /// List runs of a workflow created at or after `since`
    async fn list_workflow_runs(
        &self,
        org: &str,
        repository: &Repository,
        workflow: &Workflow,
        since: DateTime<Utc>,
    ) -> Result<Option<Vec<WorkflowRun>>>;

    /// Fetch the billable usage of a run
    async fn get_run_usage(
        &self,
        org: &str,
        repository: &Repository,
        run: &WorkflowRun,
    ) -> Result<Option<UsageRecord>>;

    /// Provider name, for logging
    fn name(&self) -> &str {
        "unknown"
    }
}

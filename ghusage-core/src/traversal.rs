//! Traversal engine
//!
//! Walks organization → repositories → workflows → runs → usage through a
//! [`SourceProvider`] and assembles the [`UsageTree`].
//!
//! "Not found" answers below the repository listing become empty branches (or an
//! absent usage record) and the walk continues. Any other provider error aborts
//! the whole traversal and no tree is returned.
//!
//! Repositories are independent subtrees, so they can be walked concurrently up to
//! a configured limit. Each branch is built and owned by exactly one task, and the
//! branches are reassembled in listing order whatever order they complete in.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;

use crate::error::Result;
use crate::provider::SourceProvider;
use crate::usage::{
    RepoVisibility, Repository, RepositoryUsage, RunUsage, UsageTree, Workflow, WorkflowUsage,
};

/// Parameters of a single traversal
#[derive(Debug, Clone)]
pub struct TraversalRequest {
    /// Organization to inspect
    pub organization: String,
    /// Repository visibility filter
    pub visibility: RepoVisibility,
    /// Maximum number of repositories to inspect
    pub limit: usize,
    /// Inclusive lower bound on run creation time
    pub since: DateTime<Utc>,
}

/// Builds usage trees from a source provider
pub struct UsageTraversal {
    provider: Arc<dyn SourceProvider>,
    concurrency: usize,
}

impl std::fmt::Debug for UsageTraversal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTraversal")
            .field("provider", &self.provider.name())
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl UsageTraversal {
    /// Create a sequential traversal over `provider`
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self {
            provider,
            concurrency: 1,
        }
    }

    /// Walk up to `concurrency` repositories at a time (minimum 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Configured repository concurrency
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Build the usage tree for a request
    pub async fn run(&self, request: &TraversalRequest) -> Result<UsageTree> {
        self.traverse(
            &request.organization,
            request.visibility,
            request.limit,
            request.since,
        )
        .await
    }

    /// Build the usage tree of `org`.
    ///
    /// # Errors
    ///
    /// Returns the first provider error other than "not found", at any level.
    pub async fn traverse(
        &self,
        org: &str,
        visibility: RepoVisibility,
        limit: usize,
        since: DateTime<Utc>,
    ) -> Result<UsageTree> {
        let repositories = self
            .provider
            .list_repositories(org, visibility, limit)
            .await?;

        let total = repositories.len();
        tracing::info!(
            organization = org,
            visibility = %visibility,
            provider = self.provider.name(),
            "identified {} repositories to inspect",
            total
        );
        tracing::info!(since = %since, "pulling workflow runs");

        let branches: Vec<RepositoryUsage> = stream::iter(repositories.into_iter().enumerate())
            .map(|(index, repository)| self.walk_repository(org, index + 1, total, repository, since))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let tree = UsageTree {
            organization: org.to_string(),
            since,
            repositories: branches,
        };

        let stats = tree.stats();
        tracing::info!(
            repositories = stats.repositories,
            workflows = stats.workflows,
            runs = stats.runs,
            runs_without_usage = stats.runs_without_usage,
            total_billable_ms = stats.total_billable_ms,
            "data retrieval completed"
        );

        Ok(tree)
    }

    async fn walk_repository(
        &self,
        org: &str,
        position: usize,
        total: usize,
        repository: Repository,
        since: DateTime<Utc>,
    ) -> Result<RepositoryUsage> {
        tracing::info!("[{}/{}] checking {:?}", position, total, repository.name);

        let workflows = match self.provider.list_workflows(org, &repository).await? {
            Some(workflows) => workflows,
            None => {
                tracing::debug!(
                    repository = %repository.name,
                    "no workflows found, Actions disabled or not configured"
                );
                Vec::new()
            }
        };

        let mut branch = RepositoryUsage {
            repository,
            workflows: Vec::with_capacity(workflows.len()),
        };

        for workflow in workflows {
            let workflow_usage = self
                .walk_workflow(org, &branch.repository, workflow, since)
                .await?;
            branch.workflows.push(workflow_usage);
        }

        Ok(branch)
    }

    async fn walk_workflow(
        &self,
        org: &str,
        repository: &Repository,
        workflow: Workflow,
        since: DateTime<Utc>,
    ) -> Result<WorkflowUsage> {
        let runs = self
            .provider
            .list_workflow_runs(org, repository, &workflow, since)
            .await?
            .unwrap_or_default();

        tracing::debug!(
            repository = %repository.name,
            workflow_id = workflow.id,
            workflow = %workflow.name,
            runs = runs.len(),
            "listed workflow runs"
        );

        let mut branch = WorkflowUsage {
            workflow,
            runs: Vec::with_capacity(runs.len()),
        };

        for run in runs {
            let usage = self.provider.get_run_usage(org, repository, &run).await?;
            if usage.is_none() {
                tracing::debug!(run_id = run.id, "no billable usage reported for run");
            }
            branch.runs.push(RunUsage { run, usage });
        }

        Ok(branch)
    }
}

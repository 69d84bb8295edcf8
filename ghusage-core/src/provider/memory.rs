//! In-memory source provider
//!
//! Serves predetermined repositories, workflows, runs and usage records, enabling
//! offline, deterministic runs of the traversal engine. Anything that was not
//! registered is reported as "not found", and failures can be injected at any
//! level of the walk.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::SourceProvider;
use crate::error::{Result, UsageError};
use crate::usage::{RepoVisibility, Repository, UsageRecord, Workflow, WorkflowRun};

/// Where an injected failure fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePoint {
    /// Repository listing
    ListRepositories,
    /// Workflow listing of the named repository
    ListWorkflows(String),
    /// Run listing of a workflow in the named repository
    ListRuns(String, u64),
    /// Usage lookup of a run
    RunUsage(u64),
}

/// Provider backed by fixed data
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    repositories: Vec<Repository>,
    workflows: HashMap<String, Vec<Workflow>>,
    runs: HashMap<(String, u64), Vec<WorkflowRun>>,
    usage: HashMap<u64, UsageRecord>,
    failures: Vec<FailurePoint>,
    delays: HashMap<String, Duration>,
    call_count: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a repository. Repositories are listed in insertion order, which stands
    /// in for "most recently pushed first". Until workflows are registered for it,
    /// the repository behaves as if Actions were disabled.
    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Register the workflows of a repository
    pub fn with_workflows(mut self, repository: impl Into<String>, workflows: Vec<Workflow>) -> Self {
        self.workflows.insert(repository.into(), workflows);
        self
    }

    /// Register the runs of a workflow
    pub fn with_runs(
        mut self,
        repository: impl Into<String>,
        workflow_id: u64,
        runs: Vec<WorkflowRun>,
    ) -> Self {
        self.runs.insert((repository.into(), workflow_id), runs);
        self
    }

    /// Register the usage of a run
    pub fn with_usage(mut self, run_id: u64, usage: UsageRecord) -> Self {
        self.usage.insert(run_id, usage);
        self
    }

    /// Inject a failure
    pub fn fail_at(mut self, point: FailurePoint) -> Self {
        self.failures.push(point);
        self
    }

    /// Delay every call made for the named repository
    pub fn with_delay(mut self, repository: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(repository.into(), delay);
        self
    }

    /// Total number of provider calls made so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        InFlight {
            counter: &self.in_flight,
        }
    }

    async fn pause(&self, repository: &str) {
        if let Some(delay) = self.delays.get(repository) {
            tokio::time::sleep(*delay).await;
        }
    }

    fn check(&self, point: FailurePoint) -> Result<()> {
        if self.failures.contains(&point) {
            return Err(UsageError::Provider(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceProvider for InMemoryProvider {
    async fn list_repositories(
        &self,
        _org: &str,
        visibility: RepoVisibility,
        limit: usize,
    ) -> Result<Vec<Repository>> {
        let _guard = self.enter();
        self.check(FailurePoint::ListRepositories)?;

        Ok(self
            .repositories
            .iter()
            .filter(|r| r.visibility == visibility)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_workflows(
        &self,
        _org: &str,
        repository: &Repository,
    ) -> Result<Option<Vec<Workflow>>> {
        let _guard = self.enter();
        self.pause(&repository.name).await;
        self.check(FailurePoint::ListWorkflows(repository.name.clone()))?;

        Ok(self.workflows.get(&repository.name).cloned())
    }

    async fn list_workflow_runs(
        &self,
        _org: &str,
        repository: &Repository,
        workflow: &Workflow,
        since: DateTime<Utc>,
    ) -> Result<Option<Vec<WorkflowRun>>> {
        let _guard = self.enter();
        self.pause(&repository.name).await;
        self.check(FailurePoint::ListRuns(repository.name.clone(), workflow.id))?;

        Ok(self
            .runs
            .get(&(repository.name.clone(), workflow.id))
            .map(|runs| {
                runs.iter()
                    .filter(|run| run.created_at >= since)
                    .cloned()
                    .collect()
            }))
    }

    async fn get_run_usage(
        &self,
        _org: &str,
        repository: &Repository,
        run: &WorkflowRun,
    ) -> Result<Option<UsageRecord>> {
        let _guard = self.enter();
        self.pause(&repository.name).await;
        self.check(FailurePoint::RunUsage(run.id))?;

        Ok(self.usage.get(&run.id).cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

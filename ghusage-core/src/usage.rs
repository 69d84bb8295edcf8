//! Usage tree: the nested organization → repository → workflow → run → usage model
//!
//! The tree is built once by [`crate::traversal::UsageTraversal`] and is read-only
//! afterwards. Every level owns its children as an ordered `Vec` in discovery order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UsageError;

/// Repository visibility filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoVisibility {
    #[default]
    Private,
    Public,
}

impl RepoVisibility {
    /// Value used for the `type` query parameter of the repository listing
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoVisibility::Private => "private",
            RepoVisibility::Public => "public",
        }
    }
}

impl fmt::Display for RepoVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoVisibility {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" => Ok(RepoVisibility::Private),
            "public" => Ok(RepoVisibility::Public),
            other => Err(UsageError::InvalidValue(format!(
                "unknown repository visibility: {}",
                other
            ))),
        }
    }
}

/// Runner platform billed by GitHub Actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    MacOs,
    Ubuntu,
    Windows,
}

impl Platform {
    /// All platforms in export column order
    pub const ALL: [Platform; 3] = [Platform::MacOs, Platform::Ubuntu, Platform::Windows];
}

/// A repository of the organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub visibility: RepoVisibility,
}

impl Repository {
    pub fn new(name: impl Into<String>, visibility: RepoVisibility) -> Self {
        Self {
            name: name.into(),
            visibility,
        }
    }
}

/// A workflow definition, identified by an ID unique within its repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
}

impl Workflow {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A single run of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new(id: u64, created_at: DateTime<Utc>) -> Self {
        Self { id, created_at }
    }
}

/// Billable milliseconds of one run, broken out per platform.
///
/// A missing platform entry means no billable time on that platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub macos_ms: Option<u64>,
    pub ubuntu_ms: Option<u64>,
    pub windows_ms: Option<u64>,
    /// Wall-clock duration of the whole run, when reported
    pub run_duration_ms: Option<u64>,
}

impl UsageRecord {
    /// Set billable time for a platform
    pub fn with_platform(mut self, platform: Platform, ms: u64) -> Self {
        match platform {
            Platform::MacOs => self.macos_ms = Some(ms),
            Platform::Ubuntu => self.ubuntu_ms = Some(ms),
            Platform::Windows => self.windows_ms = Some(ms),
        }
        self
    }

    /// Set the run duration
    pub fn with_run_duration(mut self, ms: u64) -> Self {
        self.run_duration_ms = Some(ms);
        self
    }

    /// Billable milliseconds on a platform (absent counts as zero)
    pub fn platform_ms(&self, platform: Platform) -> u64 {
        match platform {
            Platform::MacOs => self.macos_ms,
            Platform::Ubuntu => self.ubuntu_ms,
            Platform::Windows => self.windows_ms,
        }
        .unwrap_or(0)
    }

    /// Sum of billable milliseconds across all platforms
    pub fn billable_ms(&self) -> u64 {
        Platform::ALL.iter().map(|p| self.platform_ms(*p)).sum()
    }
}

/// Usage data for a whole organization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageTree {
    pub organization: String,
    /// Inclusive lower bound on run creation time
    pub since: DateTime<Utc>,
    pub repositories: Vec<RepositoryUsage>,
}

/// A repository branch of the tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryUsage {
    pub repository: Repository,
    /// Empty when Actions is disabled or no workflows exist
    pub workflows: Vec<WorkflowUsage>,
}

/// A workflow branch of the tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowUsage {
    pub workflow: Workflow,
    /// Empty when the workflow has no runs in the window
    pub runs: Vec<RunUsage>,
}

/// A run leaf with its optional usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunUsage {
    pub run: WorkflowRun,
    /// `None` when the provider had no usage for this run
    pub usage: Option<UsageRecord>,
}

impl RunUsage {
    /// Billable milliseconds on a platform, zero without usage
    pub fn platform_ms(&self, platform: Platform) -> u64 {
        self.usage.as_ref().map_or(0, |u| u.platform_ms(platform))
    }

    /// Total billable milliseconds, zero without usage
    pub fn billable_ms(&self) -> u64 {
        self.usage.as_ref().map_or(0, UsageRecord::billable_ms)
    }
}

/// Counts describing a usage tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub repositories: usize,
    pub workflows: usize,
    pub runs: usize,
    pub runs_without_usage: usize,
    pub total_billable_ms: u64,
}

impl UsageTree {
    /// Create an empty tree
    pub fn new(organization: impl Into<String>, since: DateTime<Utc>) -> Self {
        Self {
            organization: organization.into(),
            since,
            repositories: Vec::new(),
        }
    }

    /// Find a repository branch by name
    pub fn repository(&self, name: &str) -> Option<&RepositoryUsage> {
        self.repositories.iter().find(|r| r.repository.name == name)
    }

    /// Compute tree statistics
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            repositories: self.repositories.len(),
            ..Default::default()
        };

        for repo in &self.repositories {
            stats.workflows += repo.workflows.len();
            for workflow in &repo.workflows {
                stats.runs += workflow.runs.len();
                for run in &workflow.runs {
                    if run.usage.is_none() {
                        stats.runs_without_usage += 1;
                    }
                    stats.total_billable_ms += run.billable_ms();
                }
            }
        }

        stats
    }
}

impl RepositoryUsage {
    /// Find a workflow branch by ID
    pub fn workflow(&self, id: u64) -> Option<&WorkflowUsage> {
        self.workflows.iter().find(|w| w.workflow.id == id)
    }
}

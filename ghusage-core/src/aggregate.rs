//! Usage aggregation
//!
//! Reduces a [`UsageTree`] to one [`AggregateRecord`] per (repository, workflow).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UsageError;
use crate::usage::{UsageTree, WorkflowUsage};

/// How runs without a usage record are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingUsagePolicy {
    /// Count the run as a zero-cost run
    #[default]
    CountAsZero,
    /// Leave the run out of the count, as do runs whose usage lacks a duration
    Exclude,
}

impl fmt::Display for MissingUsagePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingUsagePolicy::CountAsZero => write!(f, "count_as_zero"),
            MissingUsagePolicy::Exclude => write!(f, "exclude"),
        }
    }
}

impl FromStr for MissingUsagePolicy {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "count_as_zero" => Ok(MissingUsagePolicy::CountAsZero),
            "exclude" => Ok(MissingUsagePolicy::Exclude),
            other => Err(UsageError::InvalidValue(format!(
                "unknown missing-usage policy: {}",
                other
            ))),
        }
    }
}

/// Per-workflow usage summary.
///
/// Field order is the column order of aggregate exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub repository: String,
    pub workflow_id: u64,
    pub workflow_name: String,
    /// Always at least 1
    pub run_count: u64,
    pub total_billable_ms: u64,
    /// `total_billable_ms / run_count`, truncated
    pub average_billable_ms: u64,
}

/// Aggregates usage trees
#[derive(Debug, Clone, Default)]
pub struct UsageAggregator {
    policy: MissingUsagePolicy,
}

impl UsageAggregator {
    /// Create an aggregator with the default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an aggregator with a specific missing-usage policy
    pub fn with_policy(policy: MissingUsagePolicy) -> Self {
        Self { policy }
    }

    /// Active missing-usage policy
    pub fn policy(&self) -> MissingUsagePolicy {
        self.policy
    }

    /// Aggregate every workflow of the tree, in discovery order.
    ///
    /// Workflows without counted runs produce no record.
    pub fn aggregate(&self, tree: &UsageTree) -> Vec<AggregateRecord> {
        tree.repositories
            .iter()
            .flat_map(|repo| {
                repo.workflows
                    .iter()
                    .filter_map(|workflow| self.aggregate_workflow(&repo.repository.name, workflow))
            })
            .collect()
    }

    /// Aggregate a single workflow branch
    pub fn aggregate_workflow(
        &self,
        repository: &str,
        workflow: &WorkflowUsage,
    ) -> Option<AggregateRecord> {
        let mut run_count = 0u64;
        let mut total_billable_ms = 0u64;

        for run in &workflow.runs {
            let counted = match self.policy {
                MissingUsagePolicy::CountAsZero => true,
                MissingUsagePolicy::Exclude => run
                    .usage
                    .as_ref()
                    .is_some_and(|u| u.run_duration_ms.is_some()),
            };
            if !counted {
                continue;
            }

            run_count += 1;
            total_billable_ms += run.billable_ms();
        }

        if run_count == 0 {
            return None;
        }

        Some(AggregateRecord {
            repository: repository.to_string(),
            workflow_id: workflow.workflow.id,
            workflow_name: workflow.workflow.name.clone(),
            run_count,
            total_billable_ms,
            average_billable_ms: total_billable_ms / run_count,
        })
    }
}

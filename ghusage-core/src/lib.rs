//! # ghusage - GitHub Actions billable usage reports
//!
//! Walks an organization's repositories, their workflows, the workflow runs in a
//! lookback window and each run's billable usage, then flattens the result into
//! CSV rows:
//!
//! - **Raw mode**: one row per run with macOS, Ubuntu and Windows billable ms
//! - **Aggregate mode**: one row per workflow with run count, total and average
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ghusage_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let provider = Arc::new(GitHubProvider::new(std::env::var("GITHUB_TOKEN").ok())?);
//!     let traversal = UsageTraversal::new(provider).with_concurrency(4);
//!
//!     let config = UsageConfig {
//!         organization: "acme".to_string(),
//!         ..Default::default()
//!     };
//!     let tree = traversal
//!         .traverse("acme", RepoVisibility::Private, 25, config.since())
//!         .await?;
//!
//!     let (csv, _) = UsageExporter::new().to_csv_string(&tree, OutputMode::Aggregate)?;
//!     print!("{}", csv);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Providers** ([`provider`]): the data source capability, with a GitHub REST
//!   implementation and an in-memory one
//! - **Traversal** ([`traversal`]): builds the [`usage::UsageTree`], tolerating
//!   "not found" and aborting on anything else
//! - **Aggregation** ([`aggregate`]): per-workflow totals and averages
//! - **Export** ([`export`]): header-less CSV

pub mod aggregate;
pub mod config;
pub mod error;
pub mod export;
pub mod provider;
pub mod report;
pub mod traversal;
pub mod usage;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::aggregate::{AggregateRecord, MissingUsagePolicy, UsageAggregator};
    pub use crate::config::UsageConfig;
    pub use crate::error::{Result, UsageError};
    pub use crate::export::{OutputMode, UsageExporter};
    pub use crate::provider::{
        FailurePoint, GitHubProvider, GitHubProviderConfig, InMemoryProvider, SourceProvider,
    };
    pub use crate::report::{UsageReport, generate_report};
    pub use crate::traversal::{TraversalRequest, UsageTraversal};
    pub use crate::usage::{
        Platform, RepoVisibility, Repository, RepositoryUsage, RunUsage, TreeStats, UsageRecord,
        UsageTree, Workflow, WorkflowRun, WorkflowUsage,
    };
}

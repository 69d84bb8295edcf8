//! End-to-end report generation: traverse, then export

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::aggregate::UsageAggregator;
use crate::config::UsageConfig;
use crate::error::Result;
use crate::export::{OutputMode, UsageExporter};
use crate::provider::SourceProvider;
use crate::traversal::UsageTraversal;
use crate::usage::UsageTree;

/// A rendered usage report
#[derive(Debug, Clone)]
pub struct UsageReport {
    /// The tree the report was rendered from
    pub tree: UsageTree,
    /// Export granularity
    pub mode: OutputMode,
    /// Rendered CSV rows
    pub csv: String,
    /// Number of CSV rows
    pub rows: usize,
}

/// Build the usage tree and render it in the configured output mode.
///
/// Rendering happens entirely in memory after the traversal has succeeded, so a
/// failed traversal never yields a partial report.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the traversal fails.
pub async fn generate_report(
    provider: Arc<dyn SourceProvider>,
    config: &UsageConfig,
    since: DateTime<Utc>,
) -> Result<UsageReport> {
    config.validate()?;

    let traversal = UsageTraversal::new(provider).with_concurrency(config.concurrency);
    let tree = traversal.run(&config.traversal_request(since)).await?;

    let exporter =
        UsageExporter::with_aggregator(UsageAggregator::with_policy(config.missing_usage));
    let (csv, rows) = exporter.to_csv_string(&tree, config.output_mode)?;

    tracing::debug!(mode = %config.output_mode, rows, "rendered usage report");

    Ok(UsageReport {
        tree,
        mode: config.output_mode,
        csv,
        rows,
    })
}

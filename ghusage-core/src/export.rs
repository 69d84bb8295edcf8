//! CSV export
//!
//! Two granularities are supported: raw rows (one per run) and aggregate rows (one
//! per workflow). Neither writes a header row.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::aggregate::{AggregateRecord, UsageAggregator};
use crate::error::{Result, UsageError};
use crate::usage::{Platform, UsageTree};

/// Export granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// repository, workflow id, workflow name, run id, macOS ms, Ubuntu ms, Windows ms
    Raw,
    /// repository, workflow id, workflow name, run count, total ms, average ms
    #[default]
    Aggregate,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Raw => write!(f, "raw"),
            OutputMode::Aggregate => write!(f, "aggregate"),
        }
    }
}

impl FromStr for OutputMode {
    type Err = UsageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "raw" => Ok(OutputMode::Raw),
            "aggregate" => Ok(OutputMode::Aggregate),
            other => Err(UsageError::InvalidValue(format!("unknown output mode: {}", other))),
        }
    }
}

/// One raw export row
#[derive(Debug, Serialize)]
struct RawRow<'a> {
    repository: &'a str,
    workflow_id: u64,
    workflow_name: &'a str,
    run_id: u64,
    macos_ms: u64,
    ubuntu_ms: u64,
    windows_ms: u64,
}

/// Usage exporter
#[derive(Debug, Clone, Default)]
pub struct UsageExporter {
    aggregator: UsageAggregator,
}

impl UsageExporter {
    /// Create an exporter with the default aggregation policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an exporter that aggregates with `aggregator`
    pub fn with_aggregator(aggregator: UsageAggregator) -> Self {
        Self { aggregator }
    }

    fn csv_writer<W: Write>(sink: W) -> csv::Writer<W> {
        csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(sink)
    }

    /// Write one row per run. Runs without usage get zero platform columns.
    ///
    /// Returns the number of rows written.
    pub fn write_raw<W: Write>(tree: &UsageTree, sink: W) -> Result<usize> {
        let mut writer = Self::csv_writer(sink);
        let mut rows = 0;

        for repo in &tree.repositories {
            for workflow in &repo.workflows {
                for run in &workflow.runs {
                    let [macos_ms, ubuntu_ms, windows_ms] = Platform::ALL.map(|p| run.platform_ms(p));
                    writer.serialize(RawRow {
                        repository: &repo.repository.name,
                        workflow_id: workflow.workflow.id,
                        workflow_name: &workflow.workflow.name,
                        run_id: run.run.id,
                        macos_ms,
                        ubuntu_ms,
                        windows_ms,
                    })?;
                    rows += 1;
                }
            }
        }

        writer.flush()?;
        Ok(rows)
    }

    /// Write one row per aggregate record.
    ///
    /// Returns the number of rows written.
    pub fn write_aggregate<W: Write>(records: &[AggregateRecord], sink: W) -> Result<usize> {
        let mut writer = Self::csv_writer(sink);

        for record in records {
            writer.serialize(record)?;
        }

        writer.flush()?;
        Ok(records.len())
    }

    /// Export a tree in the given mode
    pub fn export<W: Write>(&self, tree: &UsageTree, mode: OutputMode, sink: W) -> Result<usize> {
        match mode {
            OutputMode::Raw => Self::write_raw(tree, sink),
            OutputMode::Aggregate => {
                let records = self.aggregator.aggregate(tree);
                Self::write_aggregate(&records, sink)
            }
        }
    }

    /// Render a tree to an in-memory CSV document.
    ///
    /// Returns the document and its row count.
    pub fn to_csv_string(&self, tree: &UsageTree, mode: OutputMode) -> Result<(String, usize)> {
        let mut buffer = Vec::new();
        let rows = self.export(tree, mode, &mut buffer)?;
        let csv = String::from_utf8(buffer)
            .map_err(|e| UsageError::Other(format!("CSV is not UTF-8: {}", e)))?;
        Ok((csv, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::MissingUsagePolicy;
    use crate::usage::{
        RepoVisibility, Repository, RepositoryUsage, RunUsage, UsageRecord, Workflow,
        WorkflowRun, WorkflowUsage,
    };
    use chrono::Utc;

    fn tree(workflow_name: &str, runs: Vec<RunUsage>) -> UsageTree {
        let mut tree = UsageTree::new("acme", Utc::now());
        tree.repositories.push(RepositoryUsage {
            repository: Repository::new("widget", RepoVisibility::Private),
            workflows: vec![WorkflowUsage {
                workflow: Workflow::new(7, workflow_name),
                runs,
            }],
        });
        tree
    }

    fn run(id: u64, usage: Option<UsageRecord>) -> RunUsage {
        RunUsage {
            run: WorkflowRun::new(id, Utc::now()),
            usage,
        }
    }

    #[test]
    fn test_raw_rows() {
        let usage = UsageRecord::default()
            .with_platform(Platform::MacOs, 1000)
            .with_platform(Platform::Ubuntu, 2000);
        let tree = tree("ci", vec![run(11, Some(usage)), run(12, None)]);

        let (csv, rows) = UsageExporter::new().to_csv_string(&tree, OutputMode::Raw).unwrap();
        assert_eq!(csv, "widget,7,ci,11,1000,2000,0\nwidget,7,ci,12,0,0,0\n");
        assert_eq!(rows, 2);
    }

    #[test]
    fn test_aggregate_rows() {
        let usage = UsageRecord::default().with_platform(Platform::Windows, 100);
        let tree = tree("ci", vec![run(1, Some(usage)), run(2, None), run(3, None)]);

        let (csv, rows) = UsageExporter::new()
            .to_csv_string(&tree, OutputMode::Aggregate)
            .unwrap();
        assert_eq!(csv, "widget,7,ci,3,100,33\n");
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_aggregate_rows_with_exclude_policy() {
        let usage = UsageRecord::default()
            .with_platform(Platform::Windows, 100)
            .with_run_duration(120);
        let tree = tree("ci", vec![run(1, Some(usage)), run(2, None)]);

        let exporter = UsageExporter::with_aggregator(UsageAggregator::with_policy(
            MissingUsagePolicy::Exclude,
        ));
        let (csv, _) = exporter.to_csv_string(&tree, OutputMode::Aggregate).unwrap();
        assert_eq!(csv, "widget,7,ci,1,100,100\n");
    }

    #[test]
    fn test_quoting() {
        let tree = tree("build, test \"all\"", vec![run(1, None)]);

        let (csv, _) = UsageExporter::new().to_csv_string(&tree, OutputMode::Raw).unwrap();
        assert_eq!(csv, "widget,7,\"build, test \"\"all\"\"\",1,0,0,0\n");
    }

    #[test]
    fn test_empty_workflow_emits_nothing() {
        let tree = tree("ci", Vec::new());
        let exporter = UsageExporter::new();

        let mut sink = Vec::new();
        assert_eq!(exporter.export(&tree, OutputMode::Raw, &mut sink).unwrap(), 0);
        assert_eq!(exporter.export(&tree, OutputMode::Aggregate, &mut sink).unwrap(), 0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_output_mode_parsing() {
        assert_eq!("raw".parse::<OutputMode>().unwrap(), OutputMode::Raw);
        assert_eq!("Aggregate".parse::<OutputMode>().unwrap(), OutputMode::Aggregate);
        assert!("json".parse::<OutputMode>().is_err());
        assert_eq!(OutputMode::default(), OutputMode::Aggregate);
    }
}

//! End-to-end tests: in-memory provider → traversal → CSV

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use ghusage_core::prelude::*;

const RUN_A: u64 = 9001;
const RUN_B: u64 = 9002;

fn since() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn acme_provider() -> InMemoryProvider {
    InMemoryProvider::new()
        .with_repository(Repository::new("widget", RepoVisibility::Private))
        .with_workflows("widget", vec![Workflow::new(7, "ci")])
        .with_runs(
            "widget",
            7,
            vec![
                WorkflowRun::new(RUN_A, Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()),
                WorkflowRun::new(RUN_B, Utc.with_ymd_and_hms(2024, 6, 4, 10, 0, 0).unwrap()),
            ],
        )
        .with_usage(
            RUN_A,
            UsageRecord::default()
                .with_platform(Platform::MacOs, 1000)
                .with_platform(Platform::Ubuntu, 2000)
                .with_platform(Platform::Windows, 0),
        )
}

fn config(mode: OutputMode) -> UsageConfig {
    UsageConfig {
        organization: "acme".to_string(),
        output_mode: mode,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_acme_aggregate_report() {
    let report = generate_report(Arc::new(acme_provider()), &config(OutputMode::Aggregate), since())
        .await
        .unwrap();

    assert_eq!(report.csv, "widget,7,ci,2,3000,1500\n");
    assert_eq!(report.rows, 1);
    assert_eq!(report.mode, OutputMode::Aggregate);
}

#[tokio::test]
async fn test_acme_raw_report() {
    let report = generate_report(Arc::new(acme_provider()), &config(OutputMode::Raw), since())
        .await
        .unwrap();

    assert_eq!(
        report.csv,
        format!(
            "widget,7,ci,{},1000,2000,0\nwidget,7,ci,{},0,0,0\n",
            RUN_A, RUN_B
        )
    );
    assert_eq!(report.rows, 2);
}

#[tokio::test]
async fn test_actions_disabled_repository_adds_no_rows() {
    let provider = acme_provider().with_repository(Repository::new("docs", RepoVisibility::Private));

    let report = generate_report(Arc::new(provider), &config(OutputMode::Aggregate), since())
        .await
        .unwrap();

    let docs = report.tree.repository("docs").expect("docs branch is present");
    assert!(docs.workflows.is_empty());
    assert_eq!(report.csv, "widget,7,ci,2,3000,1500\n");
}

#[tokio::test]
async fn test_fatal_error_yields_no_report() {
    for point in [
        FailurePoint::ListRepositories,
        FailurePoint::ListWorkflows("widget".to_string()),
        FailurePoint::ListRuns("widget".to_string(), 7),
        FailurePoint::RunUsage(RUN_B),
    ] {
        let provider = acme_provider().fail_at(point);
        let result = generate_report(Arc::new(provider), &config(OutputMode::Raw), since()).await;
        assert!(matches!(result, Err(UsageError::Provider(_))));
    }
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_traversal() {
    let provider = Arc::new(acme_provider());
    let mut config = config(OutputMode::Raw);
    config.organization.clear();

    let result = generate_report(provider.clone(), &config, since()).await;
    assert!(matches!(result, Err(UsageError::Configuration(_))));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_visibility_and_limit() {
    let provider = InMemoryProvider::new()
        .with_repository(Repository::new("site", RepoVisibility::Public))
        .with_repository(Repository::new("api", RepoVisibility::Private))
        .with_repository(Repository::new("web", RepoVisibility::Public))
        .with_repository(Repository::new("cli", RepoVisibility::Public));

    let config = UsageConfig {
        organization: "acme".to_string(),
        visibility: RepoVisibility::Public,
        repo_limit: 2,
        ..Default::default()
    };
    let report = generate_report(Arc::new(provider), &config, since()).await.unwrap();

    let names: Vec<_> = report
        .tree
        .repositories
        .iter()
        .map(|r| r.repository.name.as_str())
        .collect();
    assert_eq!(names, vec!["site", "web"]);
    assert!(report.csv.is_empty());
}

fn fleet(delays: &[(&str, u64)]) -> InMemoryProvider {
    let mut provider = InMemoryProvider::new();
    for (index, (name, delay_ms)) in delays.iter().enumerate() {
        let run_id = index as u64 + 1;
        provider = provider
            .with_repository(Repository::new(*name, RepoVisibility::Private))
            .with_workflows(*name, vec![Workflow::new(1, "ci")])
            .with_runs(*name, 1, vec![WorkflowRun::new(run_id, since())])
            .with_usage(
                run_id,
                UsageRecord::default().with_platform(Platform::Ubuntu, run_id * 100),
            )
            .with_delay(*name, Duration::from_millis(*delay_ms));
    }
    provider
}

#[tokio::test]
async fn test_concurrent_traversal_preserves_order() {
    let provider = Arc::new(fleet(&[("slow", 60), ("fast", 1), ("medium", 20), ("quick", 5)]));
    let traversal = UsageTraversal::new(provider.clone()).with_concurrency(4);

    let tree = traversal
        .traverse("acme", RepoVisibility::Private, 10, since())
        .await
        .unwrap();

    let names: Vec<_> = tree
        .repositories
        .iter()
        .map(|r| r.repository.name.as_str())
        .collect();
    assert_eq!(names, vec!["slow", "fast", "medium", "quick"]);
    assert!(provider.max_in_flight() > 1);

    let (csv, _) = UsageExporter::new().to_csv_string(&tree, OutputMode::Aggregate).unwrap();
    assert_eq!(
        csv,
        "slow,1,ci,1,100,100\nfast,1,ci,1,200,200\nmedium,1,ci,1,300,300\nquick,1,ci,1,400,400\n"
    );
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let provider = Arc::new(fleet(&[("a", 10), ("b", 10), ("c", 10), ("d", 10), ("e", 10)]));
    let traversal = UsageTraversal::new(provider.clone()).with_concurrency(2);

    traversal
        .traverse("acme", RepoVisibility::Private, 10, since())
        .await
        .unwrap();

    assert!(provider.max_in_flight() <= 2);
}

#[tokio::test]
async fn test_sequential_traversal_has_one_call_in_flight() {
    let provider = Arc::new(fleet(&[("a", 1), ("b", 1), ("c", 1)]));
    let traversal = UsageTraversal::new(provider.clone());

    traversal
        .traverse("acme", RepoVisibility::Private, 10, since())
        .await
        .unwrap();

    assert_eq!(provider.max_in_flight(), 1);
    // 1 repository listing + 3 x (workflows + runs + usage)
    assert_eq!(provider.call_count(), 10);
}

#[tokio::test]
async fn test_concurrent_failure_aborts_traversal() {
    let provider = fleet(&[("a", 30), ("b", 1), ("c", 1)])
        .fail_at(FailurePoint::ListWorkflows("c".to_string()));
    let traversal = UsageTraversal::new(Arc::new(provider)).with_concurrency(3);

    let result = traversal
        .traverse("acme", RepoVisibility::Private, 10, since())
        .await;
    assert!(result.is_err());
}

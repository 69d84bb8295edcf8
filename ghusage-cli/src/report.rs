//! `ghusage report` command

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use figment::providers::Serialized;
use ghusage_core::aggregate::MissingUsagePolicy;
use ghusage_core::config::UsageConfig;
use ghusage_core::error::UsageError;
use ghusage_core::export::OutputMode;
use ghusage_core::provider::GitHubProvider;
use ghusage_core::report::generate_report;
use ghusage_core::usage::RepoVisibility;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct ReportArgs {
    /// GitHub organization name
    #[arg(long)]
    pub org: Option<String>,

    /// GitHub API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Number of repositories to inspect
    #[arg(long)]
    pub num_repos: Option<usize>,

    /// Repository visibility to inspect [possible values: private, public]
    #[arg(long)]
    pub visibility: Option<RepoVisibility>,

    /// Lookback window in days
    #[arg(long)]
    pub days: Option<u32>,

    /// Output granularity [possible values: raw, aggregate]
    #[arg(long)]
    pub mode: Option<OutputMode>,

    /// Repositories inspected concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// How runs without usage are counted in aggregate mode [possible values: count-as-zero, exclude]
    #[arg(long)]
    pub missing_usage: Option<MissingUsagePolicy>,

    /// GitHub API base URL
    #[arg(long)]
    pub api_url: Option<String>,

    /// Output file, or "-" for stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Command-line values layered over file and environment configuration
#[derive(Debug, Default, Serialize)]
struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<RepoVisibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo_limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lookback_days: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_mode: Option<OutputMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing_usage: Option<MissingUsagePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl From<&ReportArgs> for ConfigOverrides {
    fn from(args: &ReportArgs) -> Self {
        Self {
            organization: args.org.clone(),
            visibility: args.visibility,
            repo_limit: args.num_repos,
            lookback_days: args.days,
            output_mode: args.mode,
            concurrency: args.concurrency,
            missing_usage: args.missing_usage,
            api_base_url: args.api_url.clone(),
            token: args.token.clone(),
        }
    }
}

/// Resolve the effective configuration: defaults, files, environment, then flags
pub fn resolve_config(args: &ReportArgs) -> Result<UsageConfig> {
    let config: UsageConfig = UsageConfig::figment(args.config.as_deref())
        .merge(Serialized::defaults(ConfigOverrides::from(args)))
        .extract()
        .context("failed to load configuration")?;

    config.validate()?;
    Ok(config)
}

/// Default report file name for an organization and window start
pub fn default_output_path(org: &str, since: DateTime<Utc>) -> PathBuf {
    PathBuf::from(format!(
        "gh-action-usage-{}-{}.csv",
        org,
        since.format("%Y-%m-%d")
    ))
}

/// Write rendered CSV to a file, or to stdout for "-"
pub fn write_output(path: &Path, csv: &str) -> Result<()> {
    if path.as_os_str() == "-" {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(csv.as_bytes())?;
        stdout.flush()?;
        return Ok(());
    }

    std::fs::write(path, csv)
        .with_context(|| format!("failed to write file {}", path.display()))?;
    tracing::info!("data written to {:?}", path.display().to_string());
    Ok(())
}

/// Hint for API failures that usually come from the token or the organization name
pub fn failure_hint(err: &UsageError, authenticated: bool) -> Option<&'static str> {
    if err.is_status(401) {
        Some("GitHub rejected the token, check that it is valid and not expired")
    } else if err.is_status(403) {
        Some("access denied or rate limited, the token may lack the repo and actions scopes")
    } else if err.is_status(404) && !authenticated {
        Some("organization not found, private organizations are only visible with a token")
    } else if err.is_status(404) {
        Some("organization not found, or the token cannot see it")
    } else {
        None
    }
}

pub async fn run(args: ReportArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    tracing::info!("booting up client for analysis");

    let provider_config = config.provider_config();
    if provider_config.token.is_none() {
        tracing::info!(
            "no token provided, running unauthenticated - analysis is limited by GitHub rate limit"
        );
        if config.visibility == RepoVisibility::Private {
            tracing::warn!("private repositories are not visible without a token");
        }
    }
    if config.visibility == RepoVisibility::Public {
        tracing::info!("only looking at public repositories");
    }

    let provider = GitHubProvider::with_config(provider_config)
        .context("failed to construct GitHub client")?;
    let authenticated = provider.is_authenticated();

    let since = config.since();
    let report = generate_report(Arc::new(provider), &config, since)
        .await
        .inspect_err(|err| {
            if let Some(hint) = failure_hint(err, authenticated) {
                tracing::warn!("{}", hint);
            }
        })
        .with_context(|| format!("failed to collect usage for {}", config.organization))?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&config.organization, since));
    write_output(&output, &report.csv)?;

    tracing::info!(mode = %report.mode, rows = report.rows, "report complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn args() -> ReportArgs {
        ReportArgs {
            org: None,
            token: None,
            num_repos: None,
            visibility: None,
            days: None,
            mode: None,
            concurrency: None,
            missing_usage: None,
            api_url: None,
            output: None,
            config: None,
        }
    }

    #[test]
    fn test_default_output_path() {
        let since = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        assert_eq!(
            default_output_path("acme", since),
            PathBuf::from("gh-action-usage-acme-2024-05-02.csv")
        );
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("usage.toml");
        std::fs::write(
            &path,
            "organization = \"acme\"\nrepo_limit = 10\noutput_mode = \"raw\"\n",
        )
        .unwrap();

        let mut args = args();
        args.config = Some(path);
        args.num_repos = Some(3);
        args.visibility = Some(RepoVisibility::Public);
        args.missing_usage = Some(MissingUsagePolicy::Exclude);

        let config = resolve_config(&args).unwrap();
        assert_eq!(config.organization, "acme");
        assert_eq!(config.repo_limit, 3);
        assert_eq!(config.visibility, RepoVisibility::Public);
        assert_eq!(config.output_mode, OutputMode::Raw);
        assert_eq!(config.missing_usage, MissingUsagePolicy::Exclude);
    }

    #[test]
    fn test_zero_repos_is_rejected() {
        let mut args = args();
        args.org = Some("acme".to_string());
        args.num_repos = Some(0);
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn test_write_output_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.csv");

        write_output(&path, "widget,7,ci,2,3000,1500\n").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "widget,7,ci,2,3000,1500\n"
        );
    }

    #[test]
    fn test_failure_hint() {
        let api = |status| UsageError::Api {
            status,
            url: "https://api.github.com/orgs/acme/repos".to_string(),
            message: "Not Found".to_string(),
        };

        assert!(failure_hint(&api(401), true).unwrap().contains("token"));
        assert!(failure_hint(&api(404), false).unwrap().contains("only visible with a token"));
        assert!(failure_hint(&api(404), true).is_some());
        assert!(failure_hint(&api(500), true).is_none());
        assert!(failure_hint(&UsageError::Provider("boom".to_string()), false).is_none());
    }
}

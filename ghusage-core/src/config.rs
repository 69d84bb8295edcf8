//! Configuration for usage reports

use chrono::{DateTime, Days, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::aggregate::MissingUsagePolicy;
use crate::error::{Result, UsageError};
use crate::export::OutputMode;
use crate::provider::GitHubProviderConfig;
use crate::provider::github::DEFAULT_BASE_URL;
use crate::traversal::TraversalRequest;
use crate::usage::RepoVisibility;

/// Default configuration file name
pub const CONFIG_FILE: &str = "ghusage.toml";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "GHUSAGE_";

/// Main configuration for a usage report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    /// Organization to inspect
    pub organization: String,

    /// Repository visibility filter
    pub visibility: RepoVisibility,

    /// Maximum number of repositories to inspect
    pub repo_limit: usize,

    /// Lookback window in days
    pub lookback_days: u32,

    /// Export granularity
    pub output_mode: OutputMode,

    /// Repositories walked concurrently (1 = sequential)
    pub concurrency: usize,

    /// How runs without usage are counted in aggregates
    pub missing_usage: MissingUsagePolicy,

    /// GitHub API base URL
    pub api_base_url: String,

    /// GitHub access token (prefer the GITHUB_TOKEN env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            organization: String::new(),
            visibility: RepoVisibility::Private,
            repo_limit: 25,
            lookback_days: 30,
            output_mode: OutputMode::Aggregate,
            concurrency: 1,
            missing_usage: MissingUsagePolicy::CountAsZero,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl UsageConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (ghusage.toml, then the path from GHUSAGE_CONFIG_PATH)
    /// 3. Environment variable overrides (GHUSAGE_*)
    ///
    /// The result is not validated, so callers can layer further overrides first.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source is invalid.
    pub fn load() -> Result<Self> {
        Self::figment(None).extract().map_err(|e| {
            UsageError::Configuration(format!("Failed to load configuration: {}", e))
        })
    }

    /// Layered configuration sources, with an optional explicit config file.
    pub fn figment(path: Option<&std::path::Path>) -> figment::Figment {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(UsageConfig::default()))
            .merge(Toml::file(CONFIG_FILE));

        if let Ok(path) = std::env::var("GHUSAGE_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).ignore(&["config_path"]))
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the result is invalid.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let config: UsageConfig = Figment::from(Serialized::defaults(UsageConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                UsageError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.organization.trim().is_empty() {
            return Err(UsageError::Configuration(
                "organization name is required".to_string(),
            ));
        }
        if self.repo_limit == 0 {
            return Err(UsageError::Configuration(
                "repo_limit must be at least 1".to_string(),
            ));
        }
        if self.lookback_days == 0 {
            return Err(UsageError::Configuration(
                "lookback_days must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(UsageError::Configuration(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Start of the lookback window: midnight UTC, `lookback_days` before `now`
    pub fn since_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let day = now
            .date_naive()
            .checked_sub_days(Days::new(u64::from(self.lookback_days)))
            .unwrap_or(chrono::NaiveDate::MIN);
        day.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Start of the lookback window relative to the current time
    pub fn since(&self) -> DateTime<Utc> {
        self.since_from(Utc::now())
    }

    /// Traversal parameters for a window starting at `since`
    pub fn traversal_request(&self, since: DateTime<Utc>) -> TraversalRequest {
        TraversalRequest {
            organization: self.organization.clone(),
            visibility: self.visibility,
            limit: self.repo_limit,
            since,
        }
    }

    /// Connection settings for the GitHub provider.
    ///
    /// Falls back to the GITHUB_TOKEN environment variable when no token is set.
    pub fn provider_config(&self) -> GitHubProviderConfig {
        GitHubProviderConfig {
            base_url: self.api_base_url.clone(),
            token: self
                .token
                .clone()
                .or_else(|| std::env::var("GITHUB_TOKEN").ok()),
            timeout: self.request_timeout,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = UsageConfig::default();
        assert_eq!(config.visibility, RepoVisibility::Private);
        assert_eq!(config.repo_limit, 25);
        assert_eq!(config.lookback_days, 30);
        assert_eq!(config.output_mode, OutputMode::Aggregate);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.missing_usage, MissingUsagePolicy::CountAsZero);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_since_is_midnight_of_window_start() {
        let config = UsageConfig {
            lookback_days: 30,
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 4, 15, 17, 42, 5).unwrap();
        assert_eq!(
            config.since_from(now),
            Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_validate() {
        let valid = UsageConfig {
            organization: "acme".to_string(),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        for invalid in [
            UsageConfig { repo_limit: 0, ..valid.clone() },
            UsageConfig { lookback_days: 0, ..valid.clone() },
            UsageConfig { concurrency: 0, ..valid.clone() },
            UsageConfig { organization: "  ".to_string(), ..valid.clone() },
        ] {
            assert!(matches!(invalid.validate(), Err(UsageError::Configuration(_))));
        }
    }

    #[test]
    fn test_load_layers_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                    organization = "acme"
                    visibility = "public"
                    repo_limit = 10
                    output_mode = "raw"
                    request_timeout = "5s"
                "#,
            )?;
            jail.set_env("GHUSAGE_REPO_LIMIT", "3");
            jail.set_env("GHUSAGE_MISSING_USAGE", "exclude");

            let config = UsageConfig::load().expect("config loads");
            assert_eq!(config.organization, "acme");
            assert_eq!(config.visibility, RepoVisibility::Public);
            assert_eq!(config.repo_limit, 3);
            assert_eq!(config.output_mode, OutputMode::Raw);
            assert_eq!(config.missing_usage, MissingUsagePolicy::Exclude);
            assert_eq!(config.request_timeout, Duration::from_secs(5));
            assert_eq!(config.lookback_days, 30);
            Ok(())
        });
    }

    #[test]
    fn test_from_file_validates() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", r#"repo_limit = 5"#)?;
            assert!(UsageConfig::from_file("custom.toml").is_err());

            jail.create_file("valid.toml", r#"organization = "acme""#)?;
            let config = UsageConfig::from_file("valid.toml").expect("valid file");
            assert_eq!(config.organization, "acme");
            Ok(())
        });
    }

    #[test]
    fn test_traversal_request() {
        let config = UsageConfig {
            organization: "acme".to_string(),
            repo_limit: 4,
            ..Default::default()
        };
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = config.traversal_request(since);
        assert_eq!(request.organization, "acme");
        assert_eq!(request.limit, 4);
        assert_eq!(request.since, since);
    }
}

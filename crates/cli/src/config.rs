use std::path::PathBuf;
use std::time::Duration;

use offsetting_bigquery::api::DEFAULT_API_URL;
use offsetting_bigquery::poll::PollConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime configuration loaded from environment variables.
///
/// | Env Var                  | Default                                      |
/// |--------------------------|----------------------------------------------|
/// | `COMMIT_SHA`             | empty                                        |
/// | `COMMIT_BRANCH`          | empty                                        |
/// | `COMMIT_REPO`            | empty                                        |
/// | `BIGQUERY_API_URL`       | `https://bigquery.googleapis.com/bigquery/v2`|
/// | `POLL_INTERVAL_MS`       | `1000`                                       |
/// | `JOB_TIMEOUT_SECS`       | unset (wait indefinitely)                    |
/// | `MAX_WORKERS`            | `8`                                          |
/// | `OFFSETTING_ASSETS_DIR`  | unset (`./` then `./assets/`)                |
///
/// The access token (`GOOGLE_OAUTH_ACCESS_TOKEN`) is read by the token
/// source directly and never stored here.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub commit_sha: String,
    pub commit_branch: String,
    pub commit_repo: String,
    pub api_url: String,
    pub poll_interval: Duration,
    pub job_timeout: Option<Duration>,
    pub max_workers: usize,
    pub assets_dir: Option<PathBuf>,
}

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_WORKERS: usize = 8;

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let poll_interval_ms: u64 = parse_var(&var, "POLL_INTERVAL_MS", "positive integer")?
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "POLL_INTERVAL_MS",
                expected: "positive integer",
                value: "0".into(),
            });
        }
        let job_timeout_secs: Option<u64> = parse_var(&var, "JOB_TIMEOUT_SECS", "u64")?;
        let max_workers: usize =
            parse_var(&var, "MAX_WORKERS", "positive integer")?.unwrap_or(DEFAULT_MAX_WORKERS);
        if max_workers == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_WORKERS",
                expected: "positive integer",
                value: "0".into(),
            });
        }

        Ok(Self {
            commit_sha: var("COMMIT_SHA").unwrap_or_default(),
            commit_branch: var("COMMIT_BRANCH").unwrap_or_default(),
            commit_repo: var("COMMIT_REPO").unwrap_or_default(),
            api_url: var("BIGQUERY_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            poll_interval: Duration::from_millis(poll_interval_ms),
            job_timeout: job_timeout_secs.map(Duration::from_secs),
            max_workers,
            assets_dir: var("OFFSETTING_ASSETS_DIR").map(PathBuf::from),
        })
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            poll_interval: self.poll_interval,
            timeout: self.job_timeout,
            ..PollConfig::default()
        }
    }
}

fn parse_var<T, F>(var: &F, name: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|value| {
            value.parse().map_err(|_| ConfigError::Invalid {
                name,
                expected,
                value,
            })
        })
        .transpose()
}

//! Bearer token sources for the REST client.
//!
//! Either a token handed over through the environment, or one minted by
//! the `gcloud` CLI and cached for a while.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;

use offsetting_core::subprocess::{display_command, run_command, CommandError};

/// Environment variable holding a pre-minted OAuth access token.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Access tokens live for an hour; refresh well before that.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(45 * 60);

/// Upper bound for a single `gcloud` invocation.
const GCLOUD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token command failed: {0}")]
    Command(#[from] CommandError),

    #[error("token command produced no token")]
    Empty,
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, AuthError>;
}

// ---------------------------------------------------------------------------
// StaticToken
// ---------------------------------------------------------------------------

/// A fixed token, never refreshed.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// GcloudToken
// ---------------------------------------------------------------------------

struct CachedToken {
    value: String,
    fetched_at: Instant,
}

/// Token printed by an external command, `gcloud auth print-access-token`
/// by default.
///
/// The command's output is never logged.
pub struct GcloudToken {
    args: Vec<String>,
    ttl: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl Default for GcloudToken {
    fn default() -> Self {
        Self::new(
            ["gcloud", "auth", "print-access-token"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            DEFAULT_TOKEN_TTL,
        )
    }
}

impl GcloudToken {
    pub fn new(args: Vec<String>, ttl: Duration) -> Self {
        Self {
            args,
            ttl,
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<String, AuthError> {
        let args: Vec<&str> = self.args.iter().map(String::as_str).collect();
        let (program, rest) = args.split_first().ok_or(CommandError::Empty)?;
        let command = display_command(&args);

        let mut cmd = Command::new(program);
        cmd.args(rest);
        let output = run_command(&mut cmd, &command, Some(GCLOUD_TIMEOUT)).await?;
        if output.exit_code != 0 {
            return Err(CommandError::Failed {
                command,
                exit_code: output.exit_code,
            }
            .into());
        }

        let token = output.stdout.trim().to_string();
        if token.is_empty() {
            return Err(AuthError::Empty);
        }
        Ok(token)
    }
}

#[async_trait]
impl TokenSource for GcloudToken {
    async fn token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }

        tracing::debug!("Fetching access token");
        let value = self.fetch().await?;
        *cached = Some(CachedToken {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }
}

/// Pick a token source: the env token when set, otherwise `gcloud`.
pub fn token_source_from_env() -> Arc<dyn TokenSource> {
    match std::env::var(ACCESS_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Arc::new(StaticToken::new(token.trim())),
        _ => Arc::new(GcloudToken::default()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

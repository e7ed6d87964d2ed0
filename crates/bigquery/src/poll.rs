//! Drive a submitted job until BigQuery reports it `DONE`.
//!
//! Status polls that fail transiently are retried with exponential backoff.
//! A run-wide [`CancellationToken`] and an optional per-job timeout both
//! stop the wait and ask BigQuery to cancel the job.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::api::BigQueryApi;
use crate::error::BigQueryError;
use crate::job::{progress_line, TimelineStats};
use crate::model::Job;

/// Log a progress line every this many polls.
const PROGRESS_EVERY: u64 = 10;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`RetryConfig::max_delay`].
pub fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub poll_interval: Duration,
    /// Give up on a job after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub retry: RetryConfig,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Poll `job` until it is done, returning its final state.
///
/// The returned job may still carry an `errorResult`; interpreting it is
/// up to the caller.
pub async fn wait_for_job(
    api: &BigQueryApi,
    mut job: Job,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<Job, BigQueryError> {
    let project = job.job_reference.project_id.clone();
    let job_id = job.job_id().to_string();
    let location = job.location().map(str::to_string);
    let start = Instant::now();
    let mut polls: u64 = 0;

    while !job.is_done() {
        if let Some(limit) = config.timeout {
            if start.elapsed() >= limit {
                request_cancel(api, &project, &job_id, location.as_deref()).await;
                return Err(BigQueryError::Timeout {
                    job_id,
                    elapsed_secs: start.elapsed().as_secs(),
                });
            }
        }

        if polls % PROGRESS_EVERY == 0 {
            let stats = TimelineStats::from_job(&job);
            let run_time = start.elapsed().as_secs() + 1;
            tracing::debug!(job_id = %job_id, "{}", progress_line(&stats, run_time).trim_end());
        }
        polls += 1;

        tokio::select! {
            _ = cancel.cancelled() => {
                request_cancel(api, &project, &job_id, location.as_deref()).await;
                return Err(BigQueryError::Cancelled { job_id });
            }
            _ = tokio::time::sleep(config.poll_interval) => {}
        }

        job = get_job_with_retry(
            api,
            &project,
            &job_id,
            location.as_deref(),
            &config.retry,
            cancel,
        )
        .await?;
    }

    Ok(job)
}

async fn get_job_with_retry(
    api: &BigQueryApi,
    project: &str,
    job_id: &str,
    location: Option<&str>,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<Job, BigQueryError> {
    let mut delay = retry.initial_delay;
    let mut attempt = 1u32;

    loop {
        match api.get_job(project, job_id, location).await {
            Ok(job) => return Ok(job),
            Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                tracing::warn!(
                    job_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Polling job failed, retrying",
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        request_cancel(api, project, job_id, location).await;
                        return Err(BigQueryError::Cancelled {
                            job_id: job_id.to_string(),
                        });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = next_delay(delay, retry);
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Best-effort cancel; failures are only logged.
async fn request_cancel(api: &BigQueryApi, project: &str, job_id: &str, location: Option<&str>) {
    tracing::warn!(job_id, "Cancelling job");
    if let Err(e) = api.cancel_job(project, job_id, location).await {
        tracing::warn!(job_id, error = %e, "Failed to cancel job");
    }
}

use offsetting_core::error::CoreError;

use crate::api::BigQueryApiError;

/// Errors surfaced by [`Warehouse`](crate::warehouse::Warehouse) operations.
#[derive(Debug, thiserror::Error)]
pub enum BigQueryError {
    #[error(transparent)]
    Api(#[from] BigQueryApiError),

    /// The job finished with an `errorResult`.
    #[error("{reason}: {message}")]
    Job {
        job_id: String,
        reason: String,
        message: String,
    },

    #[error("Job {job_id} did not finish within {elapsed_secs}s")]
    Timeout { job_id: String, elapsed_secs: u64 },

    #[error("Job {job_id} was cancelled")]
    Cancelled { job_id: String },

    #[error("Invalid schema file {path}: {message}")]
    Schema { path: String, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

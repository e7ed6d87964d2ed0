use offsetting_bigquery::BigQueryError;
use offsetting_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Warehouse(#[from] BigQueryError),

    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
}

//! Offsetting pipeline orchestration.
//!
//! An [`Operation`](params::Operation) is turned into templated SQL and run
//! against a [`Warehouse`](offsetting_bigquery::Warehouse): per-day
//! operations clear and rewrite one partition per day with a bounded
//! number of days in flight, range operations run once.

pub mod error;
pub mod params;
pub mod pipeline;
pub mod plan;
pub mod validate;

pub use error::PipelineError;
pub use params::{Operation, PipelineInfo, PipelineParams};
pub use pipeline::{Pipeline, RunOutcome, RunSummary};

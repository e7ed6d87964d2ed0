//! BigQuery access for the offsetting pipeline.
//!
//! [`api::BigQueryApi`] wraps the REST endpoints, [`poll`] drives a job to
//! completion, and [`helper::BigQueryHelper`] puts both behind the
//! [`warehouse::Warehouse`] trait the pipeline is written against.

pub mod api;
pub mod auth;
pub mod error;
pub mod helper;
pub mod job;
pub mod model;
pub mod poll;
pub mod warehouse;

pub use error::BigQueryError;
pub use helper::BigQueryHelper;
pub use warehouse::{QueryOutcome, TableSpec, Warehouse};

//! The `offsetting` command: argument parsing, environment configuration
//! and logging setup around [`offsetting_pipeline::Pipeline`].

pub mod app;
pub mod cli;
pub mod config;
pub mod logging;

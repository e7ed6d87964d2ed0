//! Wiring: arguments and environment into a running [`Pipeline`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use offsetting_bigquery::api::BigQueryApi;
use offsetting_bigquery::auth::token_source_from_env;
use offsetting_bigquery::BigQueryHelper;
use offsetting_core::dates::as_date_str;
use offsetting_core::template::QueryTemplates;
use offsetting_pipeline::{Pipeline, PipelineInfo, PipelineParams, RunOutcome};

use crate::cli::Cli;
use crate::config::EnvConfig;

pub const PIPELINE_NAME: &str = "offsetting_automation";
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PIPELINE_DESCRIPTION: &str =
    "This pipeline generates a list of offsetting ssvid at the segment level.";

pub fn pipeline_info(config: &EnvConfig) -> PipelineInfo {
    PipelineInfo {
        name: PIPELINE_NAME.to_string(),
        version: PIPELINE_VERSION.to_string(),
        description: PIPELINE_DESCRIPTION.to_string(),
        commit_sha: config.commit_sha.clone(),
        commit_branch: config.commit_branch.clone(),
        commit_repo: config.commit_repo.clone(),
    }
}

/// `Executing with parameters:` followed by one `  key=value` line per
/// parameter.
pub fn format_parameters(cli: &Cli, params: &PipelineParams, config: &EnvConfig) -> String {
    let mut lines = vec![
        ("operation".to_string(), params.operation.name().to_string()),
        ("test".to_string(), params.test.to_string()),
        ("verbosity".to_string(), cli.common.verbosity().to_string()),
        ("dry_run".to_string(), params.dry_run.to_string()),
        ("project".to_string(), params.project.clone()),
        ("start_date".to_string(), as_date_str(params.dates.start())),
        ("end_date".to_string(), as_date_str(params.dates.end())),
        ("max_workers".to_string(), params.max_workers.to_string()),
    ];
    lines.extend(params.operation.describe());
    lines.push(("COMMIT_SHA".to_string(), config.commit_sha.clone()));
    lines.push(("COMMIT_BRANCH".to_string(), config.commit_branch.clone()));
    lines.push(("COMMIT_REPO".to_string(), config.commit_repo.clone()));

    let body: Vec<String> = lines
        .into_iter()
        .map(|(key, value)| format!("  {key}={value}"))
        .collect();
    format!("Executing with parameters:\n{}", body.join("\n"))
}

/// Build the pipeline for `cli` and run it. `cancel` aborts in-flight job
/// polling.
pub async fn run(
    cli: &Cli,
    config: &EnvConfig,
    cancel: CancellationToken,
) -> anyhow::Result<RunOutcome> {
    let params = cli.pipeline_params(config.max_workers)?;

    tracing::info!("{} v{}", PIPELINE_NAME, PIPELINE_VERSION);
    tracing::info!("{}", PIPELINE_DESCRIPTION);
    tracing::info!("{}", format_parameters(cli, &params, config));

    let api = BigQueryApi::new(config.api_url.clone(), token_source_from_env());
    let helper = BigQueryHelper::new(api, params.project.clone())
        .with_dry_run(params.dry_run)
        .with_poll_config(config.poll_config())
        .with_cancellation(cancel);

    let templates = match &config.assets_dir {
        Some(dir) => QueryTemplates::with_assets_dir(dir),
        None => QueryTemplates::default(),
    };

    let pipeline = Pipeline::new(Arc::new(helper), templates, params, pipeline_info(config));
    Ok(pipeline.run().await?)
}

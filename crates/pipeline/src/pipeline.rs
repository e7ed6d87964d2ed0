//! Pipeline operational logic. All the real work gets done here.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt, TryStreamExt};

use offsetting_bigquery::{QueryOutcome, Warehouse};
use offsetting_core::dates::as_date_str;
use offsetting_core::template::QueryTemplates;

use crate::error::PipelineError;
use crate::params::{PipelineInfo, PipelineParams};
use crate::plan::{plan_queries, step_for, Output, PlannedQuery, Step, PARTITION_FIELD};
use crate::validate::{failed_checks, parse_checks};

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub operation: &'static str,
    /// Queries that ran successfully (one per day for per-day operations).
    pub queries: usize,
    pub bytes_processed: i64,
    /// Whether the destination table had to be created.
    pub created_table: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Test mode: the queries that would have run.
    Rendered(Vec<PlannedQuery>),
    Completed(RunSummary),
}

pub struct Pipeline {
    warehouse: Arc<dyn Warehouse>,
    templates: QueryTemplates,
    params: PipelineParams,
    info: PipelineInfo,
}

impl Pipeline {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        templates: QueryTemplates,
        params: PipelineParams,
        info: PipelineInfo,
    ) -> Self {
        Self {
            warehouse,
            templates,
            params,
            info,
        }
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        let operation = &self.params.operation;
        let queries = plan_queries(operation, &self.params.dates, &self.templates)?;

        if self.params.test {
            tracing::info!(queries = queries.len(), "Test mode, not running queries");
            return Ok(RunOutcome::Rendered(queries));
        }

        let step = step_for(operation);
        tracing::info!(
            operation = operation.name(),
            start_date = %as_date_str(self.params.dates.start()),
            end_date = %as_date_str(self.params.dates.end()),
            queries = queries.len(),
            "Running operation",
        );

        let summary = match &step.output {
            Some(output) => self.run_write(&step, output, queries).await?,
            None => self.run_validate(queries).await?,
        };

        tracing::info!(
            operation = summary.operation,
            queries = summary.queries,
            bytes_processed = summary.bytes_processed,
            "Operation complete",
        );
        Ok(RunOutcome::Completed(summary))
    }

    /// Create-if-absent, write every query, then refresh the description.
    async fn run_write(
        &self,
        step: &Step,
        output: &Output,
        queries: Vec<PlannedQuery>,
    ) -> Result<RunSummary, PipelineError> {
        let description = self.table_description();
        let spec = output.table_spec(&self.templates, &description)?;
        let created_table = self.warehouse.check_create_table(&spec).await?;

        // A dry-run create leaves no table behind, and a DELETE against a
        // missing table fails even as a dry run.
        let clear_partitions = !(self.params.dry_run && created_table);

        let count = queries.len();
        let workers = if step.per_day {
            self.params.max_workers.max(1)
        } else {
            1
        };

        // The first failure drops the remaining days; jobs already submitted
        // keep running on the BigQuery side.
        let bytes: Vec<i64> = stream::iter(queries)
            .map(|query| self.write_query(output, query, clear_partitions))
            .buffer_unordered(workers)
            .try_collect()
            .await?;

        if !created_table {
            self.warehouse
                .update_table_description(&output.table, &description)
                .await?;
        }

        Ok(RunSummary {
            operation: self.params.operation.name(),
            queries: count,
            bytes_processed: bytes.iter().sum(),
            created_table,
        })
    }

    async fn write_query(
        &self,
        output: &Output,
        query: PlannedQuery,
        clear_partition: bool,
    ) -> Result<i64, PipelineError> {
        if let Some(date) = query.date {
            if clear_partition {
                self.clear_day(output, date).await?;
            } else {
                tracing::info!(
                    table = %output.table,
                    date = %date,
                    "DRY_RUN: table does not exist, skipping partition clear",
                );
            }
        }
        tracing::info!(table = %output.table, "{}", query.label);
        let outcome: QueryOutcome = self
            .warehouse
            .run_query(&query.sql, output.query_options())
            .await?;
        Ok(outcome.total_bytes_processed)
    }

    async fn clear_day(&self, output: &Output, date: NaiveDate) -> Result<(), PipelineError> {
        tracing::debug!(table = %output.table, date = %date, "Clearing partition");
        self.warehouse
            .clear_table_partition(&output.table, PARTITION_FIELD, date)
            .await?;
        Ok(())
    }

    async fn run_validate(&self, queries: Vec<PlannedQuery>) -> Result<RunSummary, PipelineError> {
        let mut failures = Vec::new();
        for query in &queries {
            let rows = self.warehouse.query_rows(&query.sql).await?;
            if rows.is_empty() {
                if self.params.dry_run {
                    tracing::info!("Dry run, no validation results to check");
                    continue;
                }
                failures.push(format!("{} (no results)", query.label));
                continue;
            }

            let checks = parse_checks(&rows);
            for check in &checks {
                if check.passed() {
                    tracing::info!(check = %check.name, "Check passed");
                } else {
                    tracing::error!(check = %check.name, failures = check.failures, "Check failed");
                }
            }
            failures.extend(failed_checks(&checks));
        }

        if !failures.is_empty() {
            return Err(PipelineError::Validation(failures));
        }
        Ok(RunSummary {
            operation: self.params.operation.name(),
            queries: queries.len(),
            bytes_processed: 0,
            created_table: false,
        })
    }

    /// Description stamped on output tables: who wrote them, from which
    /// commit, with which parameters.
    pub fn table_description(&self) -> String {
        let info = &self.info;
        let mut lines = vec![
            format!("{} v{}", info.name, info.version),
            info.description.clone(),
            String::new(),
        ];
        if !info.commit_sha.is_empty() {
            lines.push(format!(
                "commit: {} {} {}",
                info.commit_sha, info.commit_branch, info.commit_repo
            ));
            lines.push(String::new());
        }
        lines.push("parameters:".to_string());
        lines.push(format!("  operation={}", self.params.operation.name()));
        lines.push(format!("  start_date={}", as_date_str(self.params.dates.start())));
        lines.push(format!("  end_date={}", as_date_str(self.params.dates.end())));
        for (key, value) in self.params.operation.describe() {
            lines.push(format!("  {key}={value}"));
        }
        lines.join("\n").trim_end().to_string()
    }
}

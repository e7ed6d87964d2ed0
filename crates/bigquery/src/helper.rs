//! [`Warehouse`] implementation over the BigQuery REST API.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use tokio_util::sync::CancellationToken;

use offsetting_core::dates::as_date_str;
use offsetting_core::table_ref::TableRef;

use crate::api::{BigQueryApi, BigQueryApiError};
use crate::error::BigQueryError;
use crate::job::{build_job_request, new_job_id, Priority, QueryOptions};
use crate::model::{
    Clustering, Job, Row, Table, TableFieldSchema, TableReference, TableSchema, TimePartitioning,
};
use crate::poll::{wait_for_job, PollConfig};
use crate::warehouse::{clear_partition_sql, QueryOutcome, TableSpec, Warehouse};

/// Runs queries and table operations for one billing project.
///
/// With `dry_run` set, queries are submitted as BigQuery dry runs (validated
/// and costed, never executed) and table mutations are only logged.
pub struct BigQueryHelper {
    api: BigQueryApi,
    project: String,
    dry_run: bool,
    poll: PollConfig,
    cancel: CancellationToken,
}

impl BigQueryHelper {
    pub fn new(api: BigQueryApi, project: impl Into<String>) -> Self {
        Self {
            api,
            project: project.into(),
            dry_run: false,
            poll: PollConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Token that aborts every in-flight wait when cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn submit_and_wait(&self, sql: &str, options: &QueryOptions) -> Result<Job, BigQueryError> {
        let job_id = new_job_id();
        let request = build_job_request(&self.project, &job_id, sql, options, self.dry_run);
        let job = self.api.insert_job(&self.project, &request).await?;

        if self.dry_run {
            tracing::info!("*** DRY RUN ***");
        }
        tracing::info!("Bigquery job created: {}", format_created(&job));
        tracing::debug!(
            job_id = %job_id,
            priority = options.effective_priority().as_str(),
            "Running...",
        );

        // Dry runs come back complete and have no job to poll.
        let job = if self.dry_run || job.is_done() {
            job
        } else {
            wait_for_job(&self.api, job, &self.poll, &self.cancel).await?
        };
        tracing::info!("Bigquery job done.");

        if self.dry_run {
            dump_query(sql);
        } else if let Some(err) = &job.status.error_result {
            return Err(BigQueryError::Job {
                job_id: job.job_id().to_string(),
                reason: err.reason.clone(),
                message: err.message.clone(),
            });
        } else {
            log_job_stats(&job);
        }
        Ok(job)
    }
}

#[async_trait]
impl Warehouse for BigQueryHelper {
    async fn run_query(
        &self,
        sql: &str,
        options: QueryOptions,
    ) -> Result<QueryOutcome, BigQueryError> {
        let job = self.submit_and_wait(sql, &options).await?;
        Ok(QueryOutcome {
            job_id: job.job_id().to_string(),
            location: job.location().map(str::to_string),
            dry_run: self.dry_run,
            total_bytes_processed: job.total_bytes_processed(),
            total_bytes_billed: job.total_bytes_billed(),
            slot_millis: job.total_slot_ms(),
            dml_affected_rows: job.dml_affected_rows(),
        })
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>, BigQueryError> {
        let job = self.submit_and_wait(sql, &QueryOptions::default()).await?;
        if self.dry_run {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .api
                .get_query_results(&self.project, job.job_id(), job.location(), page_token.as_deref())
                .await?;
            rows.extend(page.named_rows());
            match page.page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(rows)
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, BigQueryError> {
        let reference = TableReference::from(table);
        Ok(self.api.get_table(&reference).await?.is_some())
    }

    async fn create_table(&self, spec: &TableSpec) -> Result<(), BigQueryError> {
        let table = build_table(spec)?;
        if self.dry_run {
            tracing::info!(table = %spec.table, "DRY_RUN: create table");
            return Ok(());
        }

        match self.api.insert_table(&table).await {
            Ok(_) => Ok(()),
            Err(BigQueryApiError::AlreadyExists(name)) if spec.exists_ok => {
                tracing::debug!(table = %name, "Table already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_table_partition(
        &self,
        table: &TableRef,
        partition_field: &str,
        partition_date: NaiveDate,
    ) -> Result<(), BigQueryError> {
        let sql = clear_partition_sql(table, partition_field, &as_date_str(partition_date));
        let options = QueryOptions::default().with_priority(Priority::Batch);
        let job = self.submit_and_wait(&sql, &options).await?;
        if let Some(rows) = job.dml_affected_rows() {
            tracing::debug!(table = %table, date = %partition_date, rows, "Cleared partition");
        }
        Ok(())
    }

    async fn update_table_description(
        &self,
        table: &TableRef,
        description: &str,
    ) -> Result<(), BigQueryError> {
        if self.dry_run {
            tracing::info!(table = %table, "DRY_RUN: update table description");
            return Ok(());
        }
        let patch = serde_json::json!({ "description": description });
        self.api
            .patch_table(&TableReference::from(table), &patch)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read a `bq`-style JSON schema file (an array of field definitions).
pub fn load_schema(path: &Path) -> Result<Vec<TableFieldSchema>, BigQueryError> {
    let schema_err = |message: String| BigQueryError::Schema {
        path: path.display().to_string(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| schema_err(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| schema_err(e.to_string()))
}

/// Assemble the `tables.insert` body for `spec`.
pub fn build_table(spec: &TableSpec) -> Result<Table, BigQueryError> {
    let schema = match &spec.schema_file {
        Some(path) => Some(TableSchema {
            fields: load_schema(path)?,
        }),
        None => None,
    };

    let time_partitioning = if spec.time_partitioning_day {
        Some(TimePartitioning::day(None))
    } else {
        spec.partition_field
            .as_ref()
            .map(|field| TimePartitioning::day(Some(field.clone())))
    };

    Ok(Table {
        table_reference: TableReference::from(&spec.table),
        description: spec.description.clone(),
        schema,
        time_partitioning,
        clustering: (!spec.clustering_fields.is_empty()).then(|| Clustering {
            fields: spec.clustering_fields.clone(),
        }),
        num_rows: None,
    })
}

fn format_created(job: &Job) -> String {
    DateTime::from_timestamp_millis(job.creation_time_ms())
        .filter(|_| job.creation_time_ms() > 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn dump_query(sql: &str) {
    tracing::warn!("\n*** BEGIN SQL ***\n");
    tracing::warn!("{sql}");
    tracing::warn!("\n*** END SQL ***\n");
}

fn log_job_stats(job: &Job) {
    tracing::debug!("  execution_seconds:     {}", job.execution_ms() as f64 / 1000.0);
    tracing::debug!("  slot_seconds:          {}", job.total_slot_ms() as f64 / 1000.0);
    tracing::debug!("  num_child_jobs:        {}", job.num_child_jobs());
    tracing::debug!("  total_bytes_processed: {}", job.total_bytes_processed());
    tracing::debug!("  total_bytes_billed:    {}", job.total_bytes_billed());
    tracing::debug!("  referenced_tables:");
    for table in job.referenced_tables() {
        tracing::debug!("    {table}");
    }
    if let Some(destination) = job.destination() {
        tracing::debug!("  output_table:");
        tracing::debug!("    {destination}");
    }
}

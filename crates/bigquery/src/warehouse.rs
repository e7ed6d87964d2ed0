//! The warehouse operations the pipeline is written against.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;

use offsetting_core::table_ref::TableRef;

use crate::error::BigQueryError;
use crate::job::QueryOptions;
use crate::model::Row;

/// What a finished (or dry-run) query job reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    pub job_id: String,
    pub location: Option<String>,
    pub dry_run: bool,
    /// Estimated for dry runs.
    pub total_bytes_processed: i64,
    pub total_bytes_billed: i64,
    pub slot_millis: i64,
    pub dml_affected_rows: Option<i64>,
}

/// Everything needed to create a table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub table: TableRef,
    /// JSON array of field definitions, as used by the `bq` tool.
    pub schema_file: Option<PathBuf>,
    pub description: Option<String>,
    /// Partition by day on this column.
    pub partition_field: Option<String>,
    /// Partition by day on ingestion time. Overrides `partition_field`.
    pub time_partitioning_day: bool,
    pub clustering_fields: Vec<String>,
    /// Treat "already exists" as success.
    pub exists_ok: bool,
}

impl TableSpec {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            schema_file: None,
            description: None,
            partition_field: None,
            time_partitioning_day: false,
            clustering_fields: Vec::new(),
            exists_ok: true,
        }
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Submit `sql`, wait for completion and fail on a job error.
    async fn run_query(&self, sql: &str, options: QueryOptions)
        -> Result<QueryOutcome, BigQueryError>;

    /// Run an interactive query and return every result row.
    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>, BigQueryError>;

    async fn table_exists(&self, table: &TableRef) -> Result<bool, BigQueryError>;

    async fn create_table(&self, spec: &TableSpec) -> Result<(), BigQueryError>;

    /// Delete the rows of one day partition ahead of rewriting it.
    async fn clear_table_partition(
        &self,
        table: &TableRef,
        partition_field: &str,
        partition_date: NaiveDate,
    ) -> Result<(), BigQueryError>;

    async fn update_table_description(
        &self,
        table: &TableRef,
        description: &str,
    ) -> Result<(), BigQueryError>;

    /// Create the table only if it is missing. Returns whether it was created.
    async fn check_create_table(&self, spec: &TableSpec) -> Result<bool, BigQueryError> {
        if self.table_exists(&spec.table).await? {
            return Ok(false);
        }
        tracing::info!(table = %spec.table, "Creating table {}", spec.table);
        self.create_table(spec).await?;
        Ok(true)
    }
}

/// `DELETE` statement clearing one day of a partitioned table.
pub fn clear_partition_sql(table: &TableRef, partition_field: &str, date: &str) -> String {
    format!("DELETE FROM `{table}` WHERE DATE({partition_field}) = '{date}'")
}

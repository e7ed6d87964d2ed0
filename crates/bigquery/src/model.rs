//! Wire types for the BigQuery v2 REST API.
//!
//! Only the fields the pipeline reads or writes are modelled. BigQuery
//! encodes int64 values as JSON strings, so those stay `Option<String>` on
//! the wire and are parsed by accessor methods.

use std::fmt;

use serde::{Deserialize, Serialize};

use offsetting_core::table_ref::TableRef;

/// Job state reported once BigQuery has finished with a job.
pub const STATE_DONE: &str = "DONE";

fn parse_i64(value: &Option<String>) -> i64 {
    value.as_deref().and_then(|v| v.parse().ok()).unwrap_or(0)
}

// ---------------------------------------------------------------------------
// References
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl From<&TableRef> for TableReference {
    fn from(t: &TableRef) -> Self {
        Self {
            project_id: t.project.clone(),
            dataset_id: t.dataset.clone(),
            table_id: t.table.clone(),
        }
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Error detail attached to a failed job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProto {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub error_result: Option<ErrorProto>,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTimelineSample {
    pub elapsed_ms: Option<String>,
    pub total_slot_ms: Option<String>,
    pub pending_units: Option<String>,
    pub completed_units: Option<String>,
    pub active_units: Option<String>,
}

impl QueryTimelineSample {
    pub fn elapsed_ms(&self) -> i64 {
        parse_i64(&self.elapsed_ms)
    }

    pub fn total_slot_ms(&self) -> i64 {
        parse_i64(&self.total_slot_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatistics {
    #[serde(default)]
    pub timeline: Vec<QueryTimelineSample>,
    pub total_bytes_processed: Option<String>,
    pub total_bytes_billed: Option<String>,
    pub total_slot_ms: Option<String>,
    #[serde(default)]
    pub referenced_tables: Vec<TableReference>,
    pub statement_type: Option<String>,
    pub num_dml_affected_rows: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatistics {
    pub creation_time: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub total_bytes_processed: Option<String>,
    pub total_slot_ms: Option<String>,
    pub num_child_jobs: Option<String>,
    pub query: Option<QueryStatistics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clustering {
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationQuery {
    pub query: String,
    pub use_legacy_sql: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<TableReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clustering: Option<Clustering>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<JobConfigurationQuery>,
}

/// A job resource as returned by `jobs.insert` / `jobs.get`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(default)]
    pub job_reference: JobReference,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub statistics: JobStatistics,
    #[serde(default)]
    pub configuration: JobConfiguration,
}

impl Job {
    pub fn is_done(&self) -> bool {
        self.status.state == STATE_DONE
    }

    pub fn job_id(&self) -> &str {
        &self.job_reference.job_id
    }

    pub fn location(&self) -> Option<&str> {
        self.job_reference.location.as_deref()
    }

    pub fn timeline(&self) -> &[QueryTimelineSample] {
        self.statistics
            .query
            .as_ref()
            .map(|q| q.timeline.as_slice())
            .unwrap_or_default()
    }

    pub fn creation_time_ms(&self) -> i64 {
        parse_i64(&self.statistics.creation_time)
    }

    /// Wall-clock execution time, zero until the job has both timestamps.
    pub fn execution_ms(&self) -> i64 {
        match (&self.statistics.start_time, &self.statistics.end_time) {
            (Some(_), Some(_)) => {
                parse_i64(&self.statistics.end_time) - parse_i64(&self.statistics.start_time)
            }
            _ => 0,
        }
    }

    pub fn total_slot_ms(&self) -> i64 {
        parse_i64(&self.statistics.total_slot_ms)
    }

    pub fn num_child_jobs(&self) -> i64 {
        parse_i64(&self.statistics.num_child_jobs)
    }

    pub fn total_bytes_processed(&self) -> i64 {
        match &self.statistics.query {
            Some(q) if q.total_bytes_processed.is_some() => parse_i64(&q.total_bytes_processed),
            _ => parse_i64(&self.statistics.total_bytes_processed),
        }
    }

    pub fn total_bytes_billed(&self) -> i64 {
        self.statistics
            .query
            .as_ref()
            .map(|q| parse_i64(&q.total_bytes_billed))
            .unwrap_or(0)
    }

    pub fn dml_affected_rows(&self) -> Option<i64> {
        self.statistics
            .query
            .as_ref()
            .and_then(|q| q.num_dml_affected_rows.as_deref())
            .and_then(|v| v.parse().ok())
    }

    pub fn referenced_tables(&self) -> &[TableReference] {
        self.statistics
            .query
            .as_ref()
            .map(|q| q.referenced_tables.as_slice())
            .unwrap_or_default()
    }

    pub fn destination(&self) -> Option<&TableReference> {
        self.configuration
            .query
            .as_ref()
            .and_then(|q| q.destination_table.as_ref())
    }
}

/// Body of a `jobs.insert` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub job_reference: JobReference,
    pub configuration: JobConfiguration,
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePartitioning {
    #[serde(rename = "type")]
    pub partition_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl TimePartitioning {
    /// Daily partitions, on `field` or on ingestion time when `None`.
    pub fn day(field: Option<String>) -> Self {
        Self {
            partition_type: "DAY".to_string(),
            field,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    pub table_reference: TableReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_partitioning: Option<TimePartitioning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clustering: Option<Clustering>,
    #[serde(default, skip_serializing)]
    pub num_rows: Option<String>,
}

// ---------------------------------------------------------------------------
// Query results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub v: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub f: Vec<TableCell>,
}

/// One page of `jobs.getQueryResults`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    #[serde(default)]
    pub job_complete: bool,
    pub schema: Option<TableSchema>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
    pub total_rows: Option<String>,
    pub page_token: Option<String>,
}

/// A result row keyed by column name. Values keep BigQuery's JSON
/// encoding (scalars arrive as strings, NULL as `null`).
pub type Row = serde_json::Map<String, serde_json::Value>;

impl QueryResults {
    /// Zip each row's cells with the top-level schema field names.
    pub fn named_rows(&self) -> Vec<Row> {
        let names: Vec<&str> = self
            .schema
            .as_ref()
            .map(|s| s.fields.iter().map(|f| f.name.as_str()).collect())
            .unwrap_or_default();

        self.rows
            .iter()
            .map(|row| {
                names
                    .iter()
                    .zip(&row.f)
                    .map(|(name, cell)| (name.to_string(), cell.v.clone()))
                    .collect()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

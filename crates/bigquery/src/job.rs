//! Query job configuration and progress reporting.

use offsetting_core::table_ref::TableRef;

use crate::model::{
    Clustering, Job, JobConfiguration, JobConfigurationQuery, JobReference, NewJob,
    QueryTimelineSample, TableReference,
};

/// Width of the progress line logged while a job runs.
pub const PROGRESS_LINE_WIDTH: usize = 80;

/// Prefix for client-generated job ids.
const JOB_ID_PREFIX: &str = "offsetting";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Interactive,
    Batch,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "INTERACTIVE",
            Self::Batch => "BATCH",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteDisposition {
    #[default]
    Append,
    Truncate,
    Empty,
}

impl WriteDisposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "WRITE_APPEND",
            Self::Truncate => "WRITE_TRUNCATE",
            Self::Empty => "WRITE_EMPTY",
        }
    }
}

/// How a query job should be run.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Table the results are written to.
    pub destination: Option<TableRef>,
    pub write_disposition: WriteDisposition,
    pub clustering_fields: Vec<String>,
    /// Overrides the default priority (`BATCH` with a destination,
    /// `INTERACTIVE` without).
    pub priority: Option<Priority>,
}

impl QueryOptions {
    /// Results land in `table` using `disposition`.
    pub fn into_table(table: TableRef, disposition: WriteDisposition) -> Self {
        Self {
            destination: Some(table),
            write_disposition: disposition,
            ..Self::default()
        }
    }

    pub fn clustered_by(mut self, fields: &[&str]) -> Self {
        self.clustering_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn effective_priority(&self) -> Priority {
        self.priority.unwrap_or(if self.destination.is_some() {
            Priority::Batch
        } else {
            Priority::Interactive
        })
    }
}

/// Fresh client-side job id.
pub fn new_job_id() -> String {
    format!("{JOB_ID_PREFIX}_{}", uuid::Uuid::new_v4().simple())
}

/// Build the `jobs.insert` body for a standard SQL query.
pub fn build_job_request(
    project: &str,
    job_id: &str,
    sql: &str,
    options: &QueryOptions,
    dry_run: bool,
) -> NewJob {
    let destination = options.destination.as_ref();
    let query = JobConfigurationQuery {
        query: sql.to_string(),
        use_legacy_sql: false,
        priority: Some(options.effective_priority().as_str().to_string()),
        destination_table: destination.map(TableReference::from),
        write_disposition: destination.map(|_| options.write_disposition.as_str().to_string()),
        clustering: (destination.is_some() && !options.clustering_fields.is_empty()).then(|| {
            Clustering {
                fields: options.clustering_fields.clone(),
            }
        }),
    };

    NewJob {
        job_reference: JobReference {
            project_id: project.to_string(),
            job_id: job_id.to_string(),
            location: None,
        },
        configuration: JobConfiguration {
            dry_run,
            query: Some(query),
        },
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Snapshot of the latest timeline sample of a running job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineStats {
    pub elapsed_ms: i64,
    pub slot_millis: i64,
    pub pending_units: String,
    pub completed_units: String,
    pub active_units: String,
}

impl TimelineStats {
    /// Stats from the last sample; zeros when the timeline is empty.
    pub fn from_timeline(timeline: &[QueryTimelineSample]) -> Self {
        match timeline.last() {
            Some(entry) => Self {
                elapsed_ms: entry.elapsed_ms(),
                slot_millis: entry.total_slot_ms(),
                pending_units: entry.pending_units.clone().unwrap_or_default(),
                completed_units: entry.completed_units.clone().unwrap_or_default(),
                active_units: entry.active_units.clone().unwrap_or_default(),
            },
            None => Self::default(),
        }
    }

    pub fn from_job(job: &Job) -> Self {
        Self::from_timeline(job.timeline())
    }
}

/// One fixed-width status line for a running job.
pub fn progress_line(stats: &TimelineStats, run_time_secs: u64) -> String {
    let line = format!(
        "  elapsed: {run_time_secs}s  exec: {}s  slot: {}s pend: {} compl: {} active: {}",
        (stats.elapsed_ms as f64 / 1000.0).round() as i64,
        (stats.slot_millis as f64 / 1000.0).round() as i64,
        stats.pending_units,
        stats.completed_units,
        stats.active_units,
    );
    let truncated: String = line.chars().take(PROGRESS_LINE_WIDTH).collect();
    format!("{truncated:<width$}", width = PROGRESS_LINE_WIDTH)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableRef {
        "p.d.out".parse().unwrap()
    }

    #[test]
    fn destination_query_runs_batch_with_disposition_and_clustering() {
        let options =
            QueryOptions::into_table(table(), WriteDisposition::Append).clustered_by(&["ssvid"]);
        let request = build_job_request("p", "job-1", "SELECT 1", &options, false);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "jobReference": {"projectId": "p", "jobId": "job-1"},
                "configuration": {
                    "dryRun": false,
                    "query": {
                        "query": "SELECT 1",
                        "useLegacySql": false,
                        "priority": "BATCH",
                        "destinationTable": {"projectId": "p", "datasetId": "d", "tableId": "out"},
                        "writeDisposition": "WRITE_APPEND",
                        "clustering": {"fields": ["ssvid"]}
                    }
                }
            })
        );
    }

    #[test]
    fn plain_query_runs_interactive_without_destination_fields() {
        let request = build_job_request("p", "job-2", "SELECT 1", &QueryOptions::default(), true);
        let query = request.configuration.query.unwrap();
        assert!(request.configuration.dry_run);
        assert_eq!(query.priority.as_deref(), Some("INTERACTIVE"));
        assert!(query.destination_table.is_none());
        assert!(query.write_disposition.is_none());
        assert!(query.clustering.is_none());
    }

    #[test]
    fn explicit_priority_wins() {
        let options = QueryOptions::default().with_priority(Priority::Batch);
        assert_eq!(options.effective_priority(), Priority::Batch);
    }

    #[test]
    fn job_ids_are_unique_and_prefixed() {
        let a = new_job_id();
        let b = new_job_id();
        assert_ne!(a, b);
        assert!(a.starts_with("offsetting_"));
    }

    #[test]
    fn empty_timeline_yields_zero_stats() {
        assert_eq!(TimelineStats::from_timeline(&[]), TimelineStats::default());
    }

    #[test]
    fn stats_come_from_last_sample() {
        let samples = vec![
            QueryTimelineSample {
                elapsed_ms: Some("100".into()),
                ..Default::default()
            },
            QueryTimelineSample {
                elapsed_ms: Some("2600".into()),
                total_slot_ms: Some("7400".into()),
                pending_units: Some("5".into()),
                completed_units: Some("10".into()),
                active_units: Some("2".into()),
            },
        ];
        let stats = TimelineStats::from_timeline(&samples);
        assert_eq!(stats.elapsed_ms, 2600);
        assert_eq!(stats.slot_millis, 7400);
        assert_eq!(stats.pending_units, "5");

        let line = progress_line(&stats, 4);
        assert_eq!(line.len(), PROGRESS_LINE_WIDTH);
        assert!(line.starts_with("  elapsed: 4s  exec: 3s  slot: 7s pend: 5 compl: 10 active: 2"));
    }

    #[test]
    fn long_progress_lines_are_truncated() {
        let stats = TimelineStats {
            pending_units: "9".repeat(100),
            ..Default::default()
        };
        assert_eq!(progress_line(&stats, 1).chars().count(), PROGRESS_LINE_WIDTH);
    }
}

//! Run parameters: which operation, over which dates, on which tables.

use offsetting_core::dates::DateRange;
use offsetting_core::table_ref::TableRef;
use offsetting_core::template::TemplateParams;

/// Identity of the running pipeline, stamped into table descriptions.
#[derive(Debug, Clone, Default)]
pub struct PipelineInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub commit_sha: String,
    pub commit_branch: String,
    pub commit_repo: String,
}

#[derive(Debug, Clone)]
pub struct SatelliteTimingTables {
    pub dest: TableRef,
    pub messages_scored: TableRef,
    pub research_messages: TableRef,
    pub norad_receiver_lookup: TableRef,
    pub satellite_positions: TableRef,
}

#[derive(Debug, Clone)]
pub struct DailySegsTables {
    pub dest: TableRef,
    pub satellite_timing: TableRef,
    /// Positions further than this from the receiving satellite count as
    /// too far to have been heard.
    pub max_distance_km: f64,
}

#[derive(Debug, Clone)]
pub struct AggregateSegsTables {
    pub dest: TableRef,
    pub segs_daily: TableRef,
    /// Fraction of too-far positions above which an ssvid is flagged.
    pub offsetting_threshold: f64,
    /// Minimum satellite positions before an ssvid can be flagged.
    pub min_positions: u32,
}

#[derive(Debug, Clone)]
pub struct ValidateTables {
    pub table: TableRef,
}

#[derive(Debug, Clone)]
pub enum Operation {
    SatelliteTiming(SatelliteTimingTables),
    DailySegs(DailySegsTables),
    AggregateSegs(AggregateSegsTables),
    Validate(ValidateTables),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SatelliteTiming(_) => "satellite_timing",
            Self::DailySegs(_) => "daily_segs",
            Self::AggregateSegs(_) => "aggregate_segs",
            Self::Validate(_) => "validate",
        }
    }

    /// Table names and knobs exposed to the operation's template.
    pub fn template_params(&self) -> TemplateParams {
        match self {
            Self::SatelliteTiming(t) => TemplateParams::new()
                .with("dest_table", &t.dest)
                .with("messages_scored_table", &t.messages_scored)
                .with("research_messages_table", &t.research_messages)
                .with("norad_receiver_lookup", &t.norad_receiver_lookup)
                .with("satellite_positions_table", &t.satellite_positions),
            Self::DailySegs(t) => TemplateParams::new()
                .with("dest_table", &t.dest)
                .with("satellite_timing_table", &t.satellite_timing)
                .with("max_distance_km", t.max_distance_km),
            Self::AggregateSegs(t) => TemplateParams::new()
                .with("dest_table", &t.dest)
                .with("segs_daily_table", &t.segs_daily)
                .with("offsetting_threshold", t.offsetting_threshold)
                .with("min_positions", t.min_positions),
            Self::Validate(t) => TemplateParams::new().with("table", &t.table),
        }
    }

    /// `key=value` lines describing the operation's inputs and outputs.
    pub fn describe(&self) -> Vec<(String, String)> {
        self.template_params()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineParams {
    pub project: String,
    pub dates: DateRange,
    /// Render queries and stop.
    pub test: bool,
    /// Queries are BigQuery dry runs; nothing is written.
    pub dry_run: bool,
    /// Upper bound on days processed concurrently.
    pub max_workers: usize,
    pub operation: Operation,
}

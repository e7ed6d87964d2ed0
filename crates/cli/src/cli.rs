//! Command-line arguments.
//!
//! Common options are global so they can be given before or after the
//! operation, e.g. `offsetting --test satellite_timing` and
//! `offsetting satellite_timing --test` are equivalent.

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};

use offsetting_core::dates::{parse_date, DateRange};
use offsetting_core::error::CoreError;
use offsetting_core::table_ref::TableRef;
use offsetting_pipeline::params::{
    AggregateSegsTables, DailySegsTables, SatelliteTimingTables, ValidateTables,
};
use offsetting_pipeline::{Operation, PipelineParams};

pub const DEFAULT_PROJECT: &str = "world-fishing-827";

const DEFAULT_DEST_SATELLITE_TIMING: &str =
    "world-fishing-827.scratch_public_ttl120.offsetting_satellite_timing";
const DEFAULT_DEST_SEGS_DAILY: &str =
    "world-fishing-827.scratch_public_ttl120.offsetting_segs_daily";
const DEFAULT_DEST_AGG_SEGS: &str =
    "world-fishing-827.scratch_public_ttl120.offsetting_agg_segs_daily";

#[derive(Parser, Debug)]
#[command(
    name = "offsetting",
    version,
    about = "offsetting_automation - This pipeline generates a list of offsetting ssvid at the segment level."
)]
pub struct Cli {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub operation: OperationCommand,
}

#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Test mode - print query and exit
    #[arg(long, global = true)]
    pub test: bool,

    /// Verbose output (repeat for increased verbosity)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet output (show errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Submit every query as a BigQuery dry run; nothing is written
    #[arg(long = "dry_run", alias = "dry-run", global = true)]
    pub dry_run: bool,

    /// GCP project id
    #[arg(long, default_value = DEFAULT_PROJECT, global = true)]
    pub project: String,

    /// Start date. Format: YYYY-MM-DD
    #[arg(
        long = "start_date",
        alias = "start-date",
        default_value = "2021-01-01",
        value_parser = date_arg,
        global = true
    )]
    pub start_date: NaiveDate,

    /// End date. Format: YYYY-MM-DD
    #[arg(
        long = "end_date",
        alias = "end-date",
        default_value = "2021-12-31",
        value_parser = date_arg,
        global = true
    )]
    pub end_date: NaiveDate,

    /// Maximum number of days processed concurrently (default: MAX_WORKERS or 8)
    #[arg(long = "max_workers", alias = "max-workers", global = true)]
    pub max_workers: Option<usize>,
}

impl CommonArgs {
    /// -1 for `--quiet`, otherwise the number of `-v` flags.
    pub fn verbosity(&self) -> i8 {
        if self.quiet {
            -1
        } else {
            self.verbose.min(i8::MAX as u8) as i8
        }
    }
}

fn date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).map_err(|_| format!("Not a valid date: '{s}'."))
}

#[derive(Subcommand, Debug, Clone)]
pub enum OperationCommand {
    /// Create the satellite timing table
    #[command(name = "satellite_timing")]
    SatelliteTiming(SatelliteTimingArgs),

    /// Create the daily segs table
    #[command(name = "daily_segs")]
    DailySegs(DailySegsArgs),

    /// Create the daily segs aggregate table
    #[command(name = "aggregate_segs")]
    AggregateSegs(AggregateSegsArgs),

    /// Validate the output table
    #[command(name = "validate")]
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SatelliteTimingArgs {
    /// Destination table for satellite timing
    #[arg(long = "dest_satellite_timing_table", default_value = DEFAULT_DEST_SATELLITE_TIMING)]
    pub dest_satellite_timing_table: String,

    /// Input table - messages scored
    #[arg(
        long = "messages_scored_table",
        default_value = "world-fishing-827.pipe_production_v20201001.messages_scored_*"
    )]
    pub messages_scored_table: String,

    /// Input table - research messages
    #[arg(
        long = "research_messages_table",
        default_value = "world-fishing-827.pipe_production_v20201001.research_messages"
    )]
    pub research_messages_table: String,

    /// Input table - norad to receiver lookup
    #[arg(
        long = "norad_receiver_lookup",
        default_value = "world-fishing-827.gfw_research_precursors.norad_to_receiver_v20200127"
    )]
    pub norad_receiver_lookup: String,

    /// Input table - satellite positions
    #[arg(
        long = "satellite_positions_table",
        default_value = "world-fishing-827.satellite_positions_v20190208.satellite_positions_one_second_resolution_*"
    )]
    pub satellite_positions_table: String,
}

#[derive(Args, Debug, Clone)]
pub struct DailySegsArgs {
    /// Destination table for segments daily
    #[arg(long = "dest_segs_daily_table", default_value = DEFAULT_DEST_SEGS_DAILY)]
    pub dest_segs_daily_table: String,

    /// Input table - satellite timing
    #[arg(long = "satellite_timing_table", default_value = DEFAULT_DEST_SATELLITE_TIMING)]
    pub satellite_timing_table: String,

    /// Distance from the receiving satellite beyond which a position is too far
    #[arg(long = "max_distance_km", default_value_t = 3000.0)]
    pub max_distance_km: f64,
}

#[derive(Args, Debug, Clone)]
pub struct AggregateSegsArgs {
    /// Destination table for the aggregate of segs daily table
    #[arg(long = "dest_agg_segs_table", default_value = DEFAULT_DEST_AGG_SEGS)]
    pub dest_agg_segs_table: String,

    /// Input table - segments daily
    #[arg(long = "segs_daily_table", default_value = DEFAULT_DEST_SEGS_DAILY)]
    pub segs_daily_table: String,

    /// Fraction of too-far positions above which an ssvid is offsetting
    #[arg(long = "offsetting_threshold", default_value_t = 0.5)]
    pub offsetting_threshold: f64,

    /// Minimum positions before an ssvid can be flagged
    #[arg(long = "min_positions", default_value_t = 10)]
    pub min_positions: u32,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Table to validate
    #[arg(long = "table", default_value = DEFAULT_DEST_AGG_SEGS)]
    pub table: String,
}

impl OperationCommand {
    /// Resolve table names; `dataset.table` names use `project`.
    pub fn to_operation(&self, project: &str) -> Result<Operation, CoreError> {
        let table = |name: &str| TableRef::parse(name, Some(project));
        let dest = |name: &str| -> Result<TableRef, CoreError> {
            let table = table(name)?;
            if table.is_wildcard() {
                return Err(CoreError::Validation(format!(
                    "destination table '{table}' cannot be a wildcard"
                )));
            }
            Ok(table)
        };
        Ok(match self {
            Self::SatelliteTiming(a) => Operation::SatelliteTiming(SatelliteTimingTables {
                dest: dest(&a.dest_satellite_timing_table)?,
                messages_scored: table(&a.messages_scored_table)?,
                research_messages: table(&a.research_messages_table)?,
                norad_receiver_lookup: table(&a.norad_receiver_lookup)?,
                satellite_positions: table(&a.satellite_positions_table)?,
            }),
            Self::DailySegs(a) => Operation::DailySegs(DailySegsTables {
                dest: dest(&a.dest_segs_daily_table)?,
                satellite_timing: table(&a.satellite_timing_table)?,
                max_distance_km: a.max_distance_km,
            }),
            Self::AggregateSegs(a) => Operation::AggregateSegs(AggregateSegsTables {
                dest: dest(&a.dest_agg_segs_table)?,
                segs_daily: table(&a.segs_daily_table)?,
                offsetting_threshold: a.offsetting_threshold,
                min_positions: a.min_positions,
            }),
            Self::Validate(a) => Operation::Validate(ValidateTables {
                table: table(&a.table)?,
            }),
        })
    }
}

impl Cli {
    /// Pipeline parameters, with `default_max_workers` used when
    /// `--max_workers` was not given.
    pub fn pipeline_params(&self, default_max_workers: usize) -> Result<PipelineParams, CoreError> {
        let common = &self.common;
        let max_workers = common.max_workers.unwrap_or(default_max_workers);
        if max_workers == 0 {
            return Err(CoreError::Validation(
                "max_workers must be at least 1".to_string(),
            ));
        }
        Ok(PipelineParams {
            project: common.project.clone(),
            dates: DateRange::new(common.start_date, common.end_date)?,
            test: common.test,
            dry_run: common.dry_run,
            max_workers,
            operation: self.operation.to_operation(&common.project)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_counts_flags() {
        let cli = Cli::try_parse_from(["offsetting", "-vv", "validate"]).unwrap();
        assert_eq!(cli.common.verbosity(), 2);
        let cli = Cli::try_parse_from(["offsetting", "validate", "-q"]).unwrap();
        assert_eq!(cli.common.verbosity(), -1);
    }
}

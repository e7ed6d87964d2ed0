//! What each operation writes, and the SQL it runs.
//!
//! Everything here is pure: templates are rendered up front so a bad
//! parameter fails the run before any job is submitted.

use chrono::NaiveDate;

use offsetting_bigquery::job::{QueryOptions, WriteDisposition};
use offsetting_bigquery::TableSpec;
use offsetting_core::dates::{as_date_str, table_suffix, DateRange};
use offsetting_core::error::CoreError;
use offsetting_core::table_ref::TableRef;
use offsetting_core::template::{QueryTemplates, TemplateParams};

use crate::params::Operation;

/// Column every output table is partitioned on.
pub const PARTITION_FIELD: &str = "date";

/// Output clustering shared by all operations.
pub const CLUSTERING_FIELDS: [&str; 1] = ["ssvid"];

/// How an operation maps onto its destination table.
#[derive(Debug, Clone)]
pub struct Step {
    pub template: &'static str,
    /// `None` for read-only operations.
    pub output: Option<Output>,
    /// One query per day when true, one query for the range otherwise.
    pub per_day: bool,
}

#[derive(Debug, Clone)]
pub struct Output {
    pub table: TableRef,
    pub schema: &'static str,
    pub partitioned: bool,
    pub disposition: WriteDisposition,
}

impl Output {
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions::into_table(self.table.clone(), self.disposition)
            .clustered_by(&CLUSTERING_FIELDS)
    }

    /// Table definition with the schema file resolved along the template
    /// search paths.
    pub fn table_spec(
        &self,
        templates: &QueryTemplates,
        description: &str,
    ) -> Result<TableSpec, CoreError> {
        let mut spec = TableSpec::new(self.table.clone());
        spec.schema_file = Some(templates.resolve(self.schema)?);
        spec.description = Some(description.to_string());
        spec.partition_field = self.partitioned.then(|| PARTITION_FIELD.to_string());
        spec.clustering_fields = CLUSTERING_FIELDS.iter().map(|f| f.to_string()).collect();
        Ok(spec)
    }
}

pub fn step_for(operation: &Operation) -> Step {
    match operation {
        Operation::SatelliteTiming(t) => Step {
            template: "satellite_timing.sql.j2",
            output: Some(Output {
                table: t.dest.clone(),
                schema: "schemas/satellite_timing.json",
                partitioned: true,
                disposition: WriteDisposition::Append,
            }),
            per_day: true,
        },
        Operation::DailySegs(t) => Step {
            template: "segs_daily.sql.j2",
            output: Some(Output {
                table: t.dest.clone(),
                schema: "schemas/segs_daily.json",
                partitioned: true,
                disposition: WriteDisposition::Append,
            }),
            per_day: true,
        },
        Operation::AggregateSegs(t) => Step {
            template: "aggregate_segs.sql.j2",
            output: Some(Output {
                table: t.dest.clone(),
                schema: "schemas/aggregate_segs.json",
                partitioned: false,
                disposition: WriteDisposition::Truncate,
            }),
            per_day: false,
        },
        Operation::Validate(_) => Step {
            template: "validate.sql.j2",
            output: None,
            per_day: false,
        },
    }
}

/// A rendered query and what it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedQuery {
    /// The day this query writes, for per-day steps.
    pub date: Option<NaiveDate>,
    pub label: String,
    pub sql: String,
}

/// Parameters shared by every query of a run.
pub fn base_params(operation: &Operation, dates: &DateRange) -> TemplateParams {
    let mut params = operation.template_params();
    params.insert("start_date", as_date_str(dates.start()));
    params.insert("end_date", as_date_str(dates.end()));
    params
}

/// Render every query the operation would run, in date order.
pub fn plan_queries(
    operation: &Operation,
    dates: &DateRange,
    templates: &QueryTemplates,
) -> Result<Vec<PlannedQuery>, CoreError> {
    let step = step_for(operation);
    let params = base_params(operation, dates);

    if !step.per_day {
        let sql = templates.render(step.template, &params)?;
        return Ok(vec![PlannedQuery {
            date: None,
            label: format!(
                "{} {}..{}",
                operation.name(),
                as_date_str(dates.start()),
                as_date_str(dates.end())
            ),
            sql,
        }]);
    }

    dates
        .days()
        .map(|day| -> Result<PlannedQuery, CoreError> {
            let day_params = params
                .clone()
                .with("date", as_date_str(day))
                .with("date_suffix", table_suffix(day));
            Ok(PlannedQuery {
                date: Some(day),
                label: format!("{} {}", operation.name(), as_date_str(day)),
                sql: templates.render(step.template, &day_params)?,
            })
        })
        .collect()
}

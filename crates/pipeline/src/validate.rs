//! Interpretation of validation query results.
//!
//! The validation query returns one row per check with a `check_name` and
//! a `failures` count. Any non-zero count fails the check.

use offsetting_bigquery::model::Row;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub failures: i64,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.failures == 0
    }
}

/// BigQuery returns INTEGER columns as strings; accept numbers as well.
fn as_count(value: Option<&serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Parse result rows into check results. A row without a readable
/// `failures` count is reported as a failure of that check.
pub fn parse_checks(rows: &[Row]) -> Vec<CheckResult> {
    rows.iter()
        .map(|row| {
            let name = row
                .get("check_name")
                .and_then(|v| v.as_str())
                .unwrap_or("unnamed_check")
                .to_string();
            let failures = as_count(row.get("failures")).unwrap_or(1);
            CheckResult { name, failures }
        })
        .collect()
}

/// `name (count)` for every failed check.
pub fn failed_checks(checks: &[CheckResult]) -> Vec<String> {
    checks
        .iter()
        .filter(|c| !c.passed())
        .map(|c| format!("{} ({})", c.name, c.failures))
        .collect()
}

//! Fully qualified warehouse table references.

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A `project.dataset.table` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    /// Parse `project.dataset.table`, or `dataset.table` with `default_project`.
    ///
    /// Domain-scoped projects (`example.com:proj`) may contain dots, so the
    /// name is split from the right.
    pub fn parse(s: &str, default_project: Option<&str>) -> Result<Self, CoreError> {
        let mut parts: Vec<&str> = s.trim().rsplitn(3, '.').collect();
        parts.reverse();
        let (project, dataset, table) = match parts.as_slice() {
            [project, dataset, table] => (*project, *dataset, *table),
            [dataset, table] => match default_project {
                Some(project) => (project, *dataset, *table),
                None => {
                    return Err(CoreError::Validation(format!(
                        "table '{s}' has no project and no default project is set"
                    )))
                }
            },
            _ => {
                return Err(CoreError::Validation(format!(
                    "table '{s}' must be of the form project.dataset.table"
                )))
            }
        };

        if project.contains('.') && !project.contains(':') {
            return Err(CoreError::Validation(format!(
                "table '{s}' must be of the form project.dataset.table"
            )));
        }

        if project.is_empty() || dataset.is_empty() || table.is_empty() {
            return Err(CoreError::Validation(format!(
                "table '{s}' has an empty component"
            )));
        }

        Ok(Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }

    /// Whether this names a wildcard table set (`messages_scored_*`).
    /// Wildcards are only valid as query inputs.
    pub fn is_wildcard(&self) -> bool {
        self.table.ends_with('*')
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

impl FromStr for TableRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fully_qualified_name() {
        let t: TableRef = "world-fishing-827.scratch.offsetting_segs_daily"
            .parse()
            .unwrap();
        assert_eq!(t.project, "world-fishing-827");
        assert_eq!(t.dataset, "scratch");
        assert_eq!(t.table, "offsetting_segs_daily");
        assert_eq!(
            t.to_string(),
            "world-fishing-827.scratch.offsetting_segs_daily"
        );
        assert!(!t.is_wildcard());
    }

    #[test]
    fn applies_default_project() {
        let t = TableRef::parse("scratch.t", Some("my-proj")).unwrap();
        assert_eq!(t.to_string(), "my-proj.scratch.t");
    }

    #[test]
    fn two_part_name_without_default_is_rejected() {
        assert!(TableRef::parse("scratch.t", None).is_err());
    }

    #[test]
    fn rejects_malformed_names() {
        assert!("a.b.c.d".parse::<TableRef>().is_err());
        assert!("a..c".parse::<TableRef>().is_err());
        assert!("table".parse::<TableRef>().is_err());
    }

    #[test]
    fn accepts_domain_scoped_project() {
        let t: TableRef = "example.com:proj.dataset.table".parse().unwrap();
        assert_eq!(t.project, "example.com:proj");
        assert_eq!(t.dataset, "dataset");
        assert_eq!(t.table, "table");
        assert_eq!(t.to_string(), "example.com:proj.dataset.table");
    }

    #[test]
    fn detects_wildcard_tables() {
        let t: TableRef = "p.pipe_production.messages_scored_*".parse().unwrap();
        assert!(t.is_wildcard());
    }
}

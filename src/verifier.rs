use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{info, warn};

use crate::{
    backend::{Backend, QueryResult},
    fixture::Fixture,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountOutcome {
    pub table: String,
    pub expected: Option<u64>,
    pub actual: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub title: String,
    /// Number of offending rows, `None` when the check itself failed.
    pub offending: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoOutcome {
    pub title: String,
    pub result: Option<QueryResult>,
}

/// What the verifier found. Problems are listed as warnings, never as errors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VerificationReport {
    pub counts: Vec<CountOutcome>,
    pub checks: Vec<CheckOutcome>,
    pub demos: Vec<DemoOutcome>,
    pub warnings: Vec<String>,
}

impl VerificationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    #[must_use]
    pub fn count(&self, table: &str) -> Option<u64> {
        self.counts
            .iter()
            .find(|outcome| outcome.table == table)
            .and_then(|outcome| outcome.actual)
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Row counts:")?;
        for outcome in &self.counts {
            let actual = outcome
                .actual
                .map_or_else(|| "?".to_string(), |count| count.to_string());
            match outcome.expected {
                Some(expected) if Some(expected) != outcome.actual => {
                    writeln!(f, "  {:<16} {actual} (expected {expected})", outcome.table)?;
                }
                _ => writeln!(f, "  {:<16} {actual}", outcome.table)?,
            }
        }

        writeln!(f, "\nIntegrity checks:")?;
        for check in &self.checks {
            let verdict = match check.offending {
                Some(0) => "ok".to_string(),
                Some(n) => format!("FAILED ({n} row(s))"),
                None => "not run".to_string(),
            };
            writeln!(f, "  {:<48} {verdict}", check.title)?;
        }

        for demo in &self.demos {
            writeln!(f, "\n{}:", demo.title)?;
            match &demo.result {
                Some(result) => write!(f, "{result}")?,
                None => writeln!(f, "  (query failed)")?,
            }
        }

        if self.warnings.is_empty() {
            writeln!(f, "\nNo warnings.")
        } else {
            writeln!(f, "\n{} warning(s):", self.warnings.len())?;
            for warning in &self.warnings {
                writeln!(f, "  - {warning}")?;
            }
            Ok(())
        }
    }
}

/// Read-only checks and demonstration queries against a loaded database.
pub struct Verifier<'a> {
    fixture: &'a Fixture,
    expected: IndexMap<String, u64>,
    anchor: Option<DateTime<Utc>>,
}

impl<'a> Verifier<'a> {
    #[must_use]
    pub fn new(fixture: &'a Fixture) -> Self {
        Self {
            fixture,
            expected: IndexMap::new(),
            anchor: None,
        }
    }

    /// Row counts each table should hold, usually what the loader reported.
    #[must_use]
    pub fn expect_counts(mut self, expected: IndexMap<String, u64>) -> Self {
        self.expected = expected;
        self
    }

    /// Enables the time window checks.
    #[must_use]
    pub fn with_anchor(mut self, anchor: DateTime<Utc>) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn verify(&self, backend: &mut dyn Backend) -> VerificationReport {
        let mut report = VerificationReport::default();

        for table in self.fixture.schema().tables.keys() {
            let expected = self.expected.get(table).copied();
            let actual = match backend.count_rows(table) {
                Ok(count) => Some(count),
                Err(err) => {
                    report.warn(format!("cannot count rows of {table}: {err}"));
                    None
                }
            };
            if let (Some(expected), Some(actual)) = (expected, actual) {
                if expected != actual {
                    report.warn(format!(
                        "{table} holds {actual} row(s), expected {expected}"
                    ));
                }
            }
            report.counts.push(CountOutcome {
                table: table.clone(),
                expected,
                actual,
            });
        }

        for check in self.fixture.integrity_checks(self.anchor) {
            let offending = match backend.query(&check.sql) {
                Ok(result) => result.scalar_integer(),
                Err(err) => {
                    report.warn(format!("check `{}` could not run: {err}", check.title));
                    None
                }
            };
            if let Some(n) = offending.filter(|n| *n != 0) {
                report.warn(format!("{}: {n} row(s)", check.title));
            }
            report.checks.push(CheckOutcome {
                title: check.title,
                offending,
            });
        }

        for demo in self.fixture.demo_queries() {
            let result = match backend.query(demo.sql) {
                Ok(result) => Some(result),
                Err(err) => {
                    report.warn(format!("demo query `{}` failed: {err}", demo.title));
                    None
                }
            };
            report.demos.push(DemoOutcome {
                title: demo.title.to_string(),
                result,
            });
        }

        info!(
            "Verification finished with {} warning(s)",
            report.warnings.len()
        );
        report
    }
}

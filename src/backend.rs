use std::{fmt, path::Path};

use crate::{
    common::{FixtureError, Result},
    native_backend::NativeBackend,
    schema::TableSchema,
    shell_backend::ShellBackend,
    value::{Row, Value},
};

/// Tabular result of a read query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// First column of the first row as an integer.
    #[must_use]
    pub fn scalar_integer(&self) -> Option<i64> {
        match self.rows.first()?.first()? {
            Value::Integer(v) => Some(*v),
            Value::Real(v) => Some(*v as i64),
            Value::Text(v) => v.trim().parse().ok(),
            Value::Null => None,
        }
    }
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(ToString::to_string).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.chars().count());
                }
            }
        }

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(name, width)| format!("{name:<width$}"))
            .collect();
        writeln!(f, "  {}", header.join(" | ").trim_end())?;

        let rule: Vec<String> = widths.iter().map(|width| "-".repeat(*width)).collect();
        writeln!(f, "  {}", rule.join("-+-"))?;

        if cells.is_empty() {
            return writeln!(f, "  (no rows)");
        }
        for row in cells {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect();
            writeln!(f, "  {}", line.join(" | ").trim_end())?;
        }
        Ok(())
    }
}

/// The embedded engine, reached either through the native binding or the
/// `sqlite3` program. Both honor the same durability contract per operation.
pub trait Backend {
    /// Runs one or more statements separated by `;`.
    ///
    /// # Errors
    ///
    /// On engine errors, with the engine text verbatim.
    fn execute(&mut self, sql: &str) -> Result<()>;

    /// Inserts rows one statement at a time under autocommit. Rows before a
    /// failing row stay durable.
    ///
    /// # Errors
    ///
    /// On engine errors, with the engine text verbatim.
    fn insert_each(&mut self, table: &TableSchema, rows: &[Row]) -> Result<()>;

    /// Inserts rows inside one explicit transaction. Either every row is
    /// committed or none is.
    ///
    /// # Errors
    ///
    /// On engine errors, with the engine text verbatim.
    fn insert_batch(&mut self, table: &TableSchema, rows: &[Row]) -> Result<()>;

    /// Imports a header-less CSV file into the table inside one transaction.
    ///
    /// # Errors
    ///
    /// On engine errors and malformed rows; nothing of the file is kept.
    fn import_csv(&mut self, table: &TableSchema, path: &Path) -> Result<()>;

    /// # Errors
    ///
    /// On engine errors, with the engine text verbatim.
    fn query(&mut self, sql: &str) -> Result<QueryResult>;

    /// Copies the whole database into a new file at `path`.
    ///
    /// # Errors
    ///
    /// On engine errors, with the engine text verbatim.
    fn persist_to(&mut self, path: &Path) -> Result<()>;

    /// # Errors
    ///
    /// On engine errors, with the engine text verbatim.
    fn count_rows(&mut self, table: &str) -> Result<u64> {
        let result = self.query(&format!("SELECT COUNT(*) FROM {table}"))?;
        result
            .scalar_integer()
            .and_then(|count| u64::try_from(count).ok())
            .ok_or_else(|| FixtureError::Engine(format!("no row count returned for `{table}`")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Native,
    Shell { program: String },
}

impl BackendKind {
    pub const DEFAULT_SHELL_PROGRAM: &'static str = "sqlite3";

    /// # Errors
    ///
    /// On engine errors while opening the database.
    pub fn open(&self, path: &Path) -> Result<Box<dyn Backend>> {
        Ok(match self {
            Self::Native => Box::new(NativeBackend::open(path)?),
            Self::Shell { program } => Box::new(ShellBackend::open(program, path)),
        })
    }

    /// Opens a non-durable in-memory workspace.
    ///
    /// # Errors
    ///
    /// On engine errors while opening the database.
    pub fn open_in_memory(&self) -> Result<Box<dyn Backend>> {
        Ok(match self {
            Self::Native => Box::new(NativeBackend::open_in_memory()?),
            Self::Shell { program } => Box::new(ShellBackend::open_in_memory(program)),
        })
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Shell { program } => write!(f, "shell ({program})"),
        }
    }
}

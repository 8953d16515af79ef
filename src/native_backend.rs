use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use log::debug;
use sqlite::{Connection, State, Statement};

use crate::{
    backend::{Backend, QueryResult},
    common::{sql_quote, FixtureError, Result},
    csv_text::split_csv_line,
    schema::TableSchema,
    value::{Row, Value},
};

/// Most placeholders one statement binds. Batches larger than this are split
/// into several statements inside the same transaction.
const MAX_BOUND_PARAMETERS: usize = 999;

/// Backend driving the engine through the native binding.
pub struct NativeBackend {
    connection: Connection,
}

impl NativeBackend {
    /// # Errors
    ///
    /// On engine errors while opening the file.
    pub fn open(path: &Path) -> Result<Self> {
        let connection = sqlite::open(path)?;
        connection.execute("PRAGMA foreign_keys = ON;")?;
        debug!("Opened {} through the native binding", path.display());
        Ok(Self { connection })
    }

    /// # Errors
    ///
    /// On engine errors.
    pub fn open_in_memory() -> Result<Self> {
        let connection = sqlite::open(":memory:")?;
        connection.execute("PRAGMA foreign_keys = ON;")?;
        Ok(Self { connection })
    }

    // Runs the body inside BEGIN..COMMIT, rolling back on any error.
    fn in_transaction<F>(&mut self, body: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        self.connection.execute("BEGIN")?;
        match body(&self.connection) {
            Ok(()) => {
                self.connection.execute("COMMIT")?;
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = self.connection.execute("ROLLBACK") {
                    debug!("Rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}

fn bind_value(statement: &mut Statement<'_>, index: usize, value: &Value) -> Result<()> {
    match value {
        Value::Null => statement.bind((index, Option::<i64>::None))?,
        Value::Integer(v) => statement.bind((index, *v))?,
        Value::Real(v) => statement.bind((index, *v))?,
        Value::Text(v) => statement.bind((index, v.as_str()))?,
    }
    Ok(())
}

fn step_to_done(statement: &mut Statement<'_>) -> Result<()> {
    while let State::Row = statement.next()? {}
    Ok(())
}

fn insert_chunks(connection: &Connection, table: &TableSchema, rows: &[Row]) -> Result<()> {
    let rows_per_statement = (MAX_BOUND_PARAMETERS / table.column_count().max(1)).max(1);

    for chunk in rows.chunks(rows_per_statement) {
        let mut statement = connection.prepare(table.insert_sql(chunk.len()))?;
        let mut index = 1usize;
        for row in chunk {
            for value in &row.values {
                bind_value(&mut statement, index, value)?;
                index += 1;
            }
        }
        step_to_done(&mut statement)?;
    }
    Ok(())
}

impl Backend for NativeBackend {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.connection.execute(sql)?;
        Ok(())
    }

    fn insert_each(&mut self, table: &TableSchema, rows: &[Row]) -> Result<()> {
        let mut statement = self.connection.prepare(table.insert_sql(1))?;
        for row in rows {
            statement.reset()?;
            for (i, value) in row.values.iter().enumerate() {
                bind_value(&mut statement, i + 1, value)?;
            }
            step_to_done(&mut statement)?;
        }
        Ok(())
    }

    fn insert_batch(&mut self, table: &TableSchema, rows: &[Row]) -> Result<()> {
        self.in_transaction(|connection| insert_chunks(connection, table, rows))
    }

    fn import_csv(&mut self, table: &TableSchema, path: &Path) -> Result<()> {
        let reader = BufReader::new(File::open(path)?);
        let columns = table.column_count();

        self.in_transaction(|connection| {
            let mut statement = connection.prepare(table.insert_sql(1))?;
            for (line_idx, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }

                let malformed = |reason: String| FixtureError::MalformedImport {
                    path: path.to_path_buf(),
                    line: line_idx + 1,
                    reason,
                };
                let fields = split_csv_line(&line).map_err(malformed)?;
                if fields.len() != columns {
                    return Err(malformed(format!(
                        "expected {columns} fields, found {}",
                        fields.len()
                    )));
                }

                // Fields are bound as text; column affinity converts numbers.
                statement.reset()?;
                for (i, field) in fields.iter().enumerate() {
                    statement.bind((i + 1, field.as_str()))?;
                }
                step_to_done(&mut statement)?;
            }
            Ok(())
        })
    }

    fn query(&mut self, sql: &str) -> Result<QueryResult> {
        let mut statement = self.connection.prepare(sql)?;
        let columns = statement.column_names().to_vec();

        let mut rows = vec![];
        while let State::Row = statement.next()? {
            let mut row = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                row.push(Value::from(statement.read::<sqlite::Value, _>(i)?));
            }
            rows.push(row);
        }

        Ok(QueryResult { columns, rows })
    }

    fn persist_to(&mut self, path: &Path) -> Result<()> {
        let target = sql_quote(&path.to_string_lossy());
        self.connection.execute(format!("VACUUM INTO {target}"))?;
        debug!("Copied in-memory database into {}", path.display());
        Ok(())
    }
}

//! Backend feeding SQL text to the `sqlite3` program.
//!
//! Every call spawns `sqlite3 -bail -batch <database>` and writes a script to
//! its stdin. Statements run under autocommit unless the script opens a
//! transaction itself; with `-bail` the first failing statement stops the
//! script, and an open transaction is rolled back when the process exits.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
};

use log::debug;

use crate::{
    backend::{Backend, QueryResult},
    common::{sql_quote, FixtureError, Result},
    csv_text::{split_csv_line, validate_csv_file},
    schema::TableSchema,
    value::{Row, Value},
};

pub struct ShellBackend {
    program: String,
    /// `None` for an in-memory database, which only lives for one invocation.
    database: Option<PathBuf>,
    /// Script held back until `persist_to` when in memory.
    deferred: String,
}

impl ShellBackend {
    #[must_use]
    pub fn open(program: &str, path: &Path) -> Self {
        Self {
            program: program.to_string(),
            database: Some(path.to_path_buf()),
            deferred: String::new(),
        }
    }

    #[must_use]
    pub fn open_in_memory(program: &str) -> Self {
        Self {
            program: program.to_string(),
            database: None,
            deferred: String::new(),
        }
    }

    /// Whether the program can be started at all.
    #[must_use]
    pub fn is_available(program: &str) -> bool {
        Command::new(program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }

    fn database_arg(&self) -> String {
        self.database
            .as_ref()
            .map_or_else(|| ":memory:".to_string(), |path| path.to_string_lossy().into_owned())
    }

    /// Runs a script and returns its stdout. Any stderr output is an engine error.
    fn run_script(&self, script: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .arg("-bail")
            .arg("-batch")
            .arg(self.database_arg())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                FixtureError::Engine(format!("cannot start `{}`: {err}", self.program))
            })?;

        // Fed from its own thread: with `-bail` the program may exit before
        // reading everything, and its output is drained meanwhile.
        let stdin = child.stdin.take();
        let payload = format!("PRAGMA foreign_keys = ON;\n{script}\n");
        let writer = thread::spawn(move || -> io::Result<()> {
            if let Some(mut stdin) = stdin {
                // Enforcement is per connection, and every invocation is a new one.
                stdin.write_all(payload.as_bytes())?;
            }
            Ok(())
        });

        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            return Err(FixtureError::Engine(stderr));
        }
        if !output.status.success() {
            return Err(FixtureError::Engine(format!(
                "`{}` exited with {}",
                self.program, output.status
            )));
        }
        match written {
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                return Err(FixtureError::Engine(format!(
                    "`{}` stopped reading the script before its end",
                    self.program
                )));
            }
            other => other?,
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    // In-memory scripts accumulate; file-backed ones run right away.
    fn submit(&mut self, script: &str) -> Result<()> {
        if self.database.is_none() {
            self.deferred.push_str(script);
            self.deferred.push('\n');
            return Ok(());
        }
        self.run_script(script).map(|_| ())
    }
}

fn insert_statement(table: &TableSchema, rows: &[Row]) -> String {
    let tuples: Vec<String> = rows.iter().map(Row::to_sql_tuple).collect();
    format!(
        "INSERT INTO {} ({}) VALUES\n{};",
        table.name,
        table.column_list(),
        tuples.join(",\n")
    )
}

// `.import` skips rows the engine rejects and carries on, so rows land in an
// unconstrained temporary table first. The final `INSERT .. SELECT` is a plain
// statement: under `-bail` its failure ends the process and the open
// transaction is rolled back.
fn import_script(table: &TableSchema, path: &Path) -> String {
    let quoted_path = path
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    let staging = format!("import_{}", table.name);
    format!(
        "BEGIN;\n\
         CREATE TEMP TABLE {staging} AS SELECT * FROM {table} WHERE 0;\n\
         .mode csv\n\
         .import \"{quoted_path}\" {staging}\n\
         INSERT INTO {table} SELECT * FROM temp.{staging};\n\
         DROP TABLE temp.{staging};\n\
         COMMIT;",
        table = table.name
    )
}

fn parse_csv_output(output: &str) -> Result<QueryResult> {
    let mut lines = output.lines().filter(|line| !line.is_empty());
    let Some(header) = lines.next() else {
        return Ok(QueryResult::default());
    };

    let columns = split_csv_line(header).map_err(FixtureError::Engine)?;
    let mut rows = vec![];
    for line in lines {
        let fields = split_csv_line(line).map_err(FixtureError::Engine)?;
        rows.push(fields.into_iter().map(parse_cell).collect());
    }

    Ok(QueryResult { columns, rows })
}

// The text protocol loses types; numbers are recovered from their spelling.
fn parse_cell(cell: String) -> Value {
    if cell.is_empty() {
        Value::Null
    } else if let Ok(v) = cell.parse::<i64>() {
        Value::Integer(v)
    } else if let Some(v) = parse_number(&cell) {
        Value::Real(v)
    } else {
        Value::Text(cell)
    }
}

// Only spellings that start like a number, so "inf" or "NaN" stay text.
fn parse_number(cell: &str) -> Option<f64> {
    let first = cell.chars().next()?;
    if !(first.is_ascii_digit() || first == '-' || first == '.') {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

impl Backend for ShellBackend {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.submit(sql)
    }

    fn insert_each(&mut self, table: &TableSchema, rows: &[Row]) -> Result<()> {
        let script: Vec<String> = rows
            .iter()
            .map(|row| insert_statement(table, std::slice::from_ref(row)))
            .collect();
        self.submit(&script.join("\n"))
    }

    fn insert_batch(&mut self, table: &TableSchema, rows: &[Row]) -> Result<()> {
        let script = format!("BEGIN;\n{}\nCOMMIT;", insert_statement(table, rows));
        self.submit(&script)
    }

    fn import_csv(&mut self, table: &TableSchema, path: &Path) -> Result<()> {
        // `.import` only warns about short or long records, so they are caught here.
        validate_csv_file(path, table.column_count())?;
        self.submit(&import_script(table, path))
    }

    fn query(&mut self, sql: &str) -> Result<QueryResult> {
        if self.database.is_none() {
            return Err(FixtureError::Engine(
                "in-memory shell database cannot be queried before it is persisted".into(),
            ));
        }
        let sql = sql.trim().trim_end_matches(';');
        let output = self.run_script(&format!(".headers on\n.mode csv\n{sql};"))?;
        parse_csv_output(&output)
    }

    fn persist_to(&mut self, path: &Path) -> Result<()> {
        let target = sql_quote(&path.to_string_lossy());
        if self.database.is_some() {
            return self.run_script(&format!("VACUUM INTO {target};")).map(|_| ());
        }

        let script = format!("{}VACUUM INTO {target};", std::mem::take(&mut self.deferred));
        debug!("Running deferred in-memory script ({} bytes)", script.len());
        self.run_script(&script).map(|_| ())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::{FieldKind, FieldSchema};

    fn table() -> TableSchema {
        TableSchema::new("items")
            .field("id", FieldSchema::primary_key())
            .field("code", FieldSchema::new(FieldKind::Text))
    }

    #[test]
    fn test_insert_statement() {
        let rows = vec![
            Row::new("items", vec![Value::Integer(1), Value::from("a")]),
            Row::new("items", vec![Value::Integer(2), Value::from("O'b")]),
        ];
        assert_eq!(
            "INSERT INTO items (id, code) VALUES\n(1, 'a'),\n(2, 'O''b');",
            insert_statement(&table(), &rows)
        );
    }

    #[test]
    fn test_import_script_stages_into_temp_table() {
        let script = import_script(&table(), Path::new("/tmp/out.db.items.csv"));
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(
            vec![
                "BEGIN;",
                "CREATE TEMP TABLE import_items AS SELECT * FROM items WHERE 0;",
                ".mode csv",
                ".import \"/tmp/out.db.items.csv\" import_items",
                "INSERT INTO items SELECT * FROM temp.import_items;",
                "DROP TABLE temp.import_items;",
                "COMMIT;",
            ],
            lines
        );
    }

    #[test]
    fn test_parse_csv_output() {
        let result = parse_csv_output("room,avg,n\nA1-0001,42.5,3\n\"x,y\",,7\n").unwrap();
        assert_eq!(vec!["room", "avg", "n"], result.columns);
        assert_eq!(
            vec![
                vec![Value::from("A1-0001"), Value::Real(42.5), Value::Integer(3)],
                vec![Value::from("x,y"), Value::Null, Value::Integer(7)],
            ],
            result.rows
        );
        assert_eq!(QueryResult::default(), parse_csv_output("").unwrap());
    }

    #[test]
    fn test_non_numeric_spellings_stay_text() {
        for cell in ["inf", "NaN", "-inf", "infinity", "-NaN"] {
            assert_eq!(Value::from(cell), parse_cell(cell.to_string()), "{cell}");
        }
        assert_eq!(Value::Real(-0.5), parse_cell("-0.5".to_string()));
        assert_eq!(Value::Real(0.25), parse_cell(".25".to_string()));
        assert_eq!(Value::Real(1e3), parse_cell("1e3".to_string()));
    }

    #[test]
    fn test_in_memory_defers_until_persist() {
        let mut backend = ShellBackend::open_in_memory("sqlite3-missing-program");
        backend.execute(&table().create_table_sql()).unwrap();
        backend
            .insert_batch(&table(), &[Row::new("items", vec![Value::Integer(1), Value::from("a")])])
            .unwrap();

        assert!(backend.deferred.contains("CREATE TABLE IF NOT EXISTS items"));
        assert!(backend.deferred.contains("BEGIN;"));
        assert!(backend.query("SELECT 1").is_err());
    }

    #[test]
    fn test_missing_program_is_engine_error() {
        let backend = ShellBackend::open("sqlite3-missing-program", Path::new("unused.db"));
        assert!(matches!(
            backend.run_script("SELECT 1;"),
            Err(FixtureError::Engine(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_early_exit_reports_status_not_broken_pipe() {
        // `false` exits without reading stdin, so the writer hits a closed pipe.
        let backend = ShellBackend::open("false", Path::new("unused.db"));
        let script = "SELECT 1;\n".repeat(200_000);

        match backend.run_script(&script) {
            Err(FixtureError::Engine(message)) => assert!(message.contains("exited with"), "{message}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::{
    common::{FixtureError, Result},
    value::Row,
};

/// Splits one CSV record into fields. Quoted fields may contain commas and
/// doubled quotes; records spanning several lines are not supported.
///
/// # Errors
///
/// On an unterminated quoted field or characters after a closing quote.
pub fn split_csv_line(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut fields = vec![];
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;
    let mut was_quoted = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                other => field.push(other),
            }
            continue;
        }

        match c {
            ',' => {
                fields.push(std::mem::take(&mut field));
                was_quoted = false;
            }
            '"' if field.is_empty() && !was_quoted => {
                in_quotes = true;
                was_quoted = true;
            }
            _ if was_quoted => {
                return Err(format!("unexpected `{c}` after closing quote"));
            }
            other => field.push(other),
        }
    }

    if in_quotes {
        return Err("unterminated quoted field".to_string());
    }
    fields.push(field);

    Ok(fields)
}

/// Checks that every non-empty record of the file has exactly `columns` fields.
/// Returns the number of records.
///
/// # Errors
///
/// On file operations and on the first malformed record.
pub fn validate_csv_file(path: &Path, columns: usize) -> Result<u64> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = 0u64;

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
        records += 1;
    }

    Ok(records)
}

/// Appends rows to a CSV file without header. Returns the number of rows written.
pub struct CsvStagingWriter {
    writer: BufWriter<File>,
    rows: u64,
}

impl CsvStagingWriter {
    /// # Errors
    ///
    /// On file operations.
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            rows: 0,
        })
    }

    /// # Errors
    ///
    /// On file operations.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        self.writer.write_all(row.to_csv_line().as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    /// # Errors
    ///
    /// On file operations.
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

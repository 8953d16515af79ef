use std::{
    fmt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::{
    backend::Backend,
    common::{FixtureError, Result},
    csv_text::CsvStagingWriter,
    schema::DatabaseSchema,
    value::Row,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    /// One statement per row under autocommit.
    RowAtATime,
    /// Multi-row inserts, one explicit transaction per batch.
    Batched,
    /// Every table staged as CSV first, then imported in one go.
    BulkImport,
    /// Built in an in-memory database and copied to the target at the end.
    Volatile,
}

impl LoadStrategy {
    /// What the target holds after a failed load.
    #[must_use]
    pub const fn failure_postcondition(&self) -> &'static str {
        match self {
            Self::RowAtATime => "Every row before the failing row is durable.",
            Self::Batched => {
                "Earlier batches are committed; the failing batch was rolled back completely."
            }
            Self::BulkImport => {
                "Tables imported before the failing one are durable; the failing table was rolled back."
            }
            Self::Volatile => "Nothing was written to the target.",
        }
    }

    /// # Errors
    ///
    /// On an unknown strategy name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "row" => Ok(Self::RowAtATime),
            "batch" => Ok(Self::Batched),
            "import" => Ok(Self::BulkImport),
            "memory" => Ok(Self::Volatile),
            other => Err(FixtureError::Config(format!(
                "unknown strategy `{other}` (expected row, batch, import or memory)"
            ))),
        }
    }
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RowAtATime => "row-at-a-time",
            Self::Batched => "batched",
            Self::BulkImport => "bulk-import",
            Self::Volatile => "in-memory",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    /// Rows written per table, in schema order.
    pub counts: IndexMap<String, u64>,
    pub elapsed: Duration,
}

impl LoadReport {
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// `<target>.<table>.csv`
#[must_use]
pub fn staging_path(target: &Path, table: &str) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(format!(".{table}.csv"));
    PathBuf::from(name)
}

/// Consumes generated rows and writes them through a backend.
///
/// Rows are buffered per table. Before a table's buffer is written, every
/// table earlier in schema order is written first, so referenced rows always
/// reach the engine before the rows referencing them.
pub struct Loader<'a> {
    strategy: LoadStrategy,
    schema: &'a DatabaseSchema,
    batch_size: usize,
    staging_target: PathBuf,
}

impl<'a> Loader<'a> {
    #[must_use]
    pub fn new(
        strategy: LoadStrategy,
        schema: &'a DatabaseSchema,
        batch_size: usize,
        staging_target: &Path,
    ) -> Self {
        Self {
            strategy,
            schema,
            batch_size: batch_size.max(1),
            staging_target: staging_target.to_path_buf(),
        }
    }

    /// # Errors
    ///
    /// `FixtureError::Load` carrying the engine's error text and the strategy's
    /// failure postcondition.
    pub fn load<I>(&self, backend: &mut dyn Backend, rows: I) -> Result<LoadReport>
    where
        I: IntoIterator<Item = Row>,
    {
        let start = Instant::now();
        let counts = match self.strategy {
            LoadStrategy::BulkImport => self.load_via_staging(backend, rows)?,
            _ => self.load_buffered(backend, rows)?,
        };

        let report = LoadReport {
            counts,
            elapsed: start.elapsed(),
        };
        for (table, count) in &report.counts {
            info!("Loaded {count} row(s) into {table} ({})", self.strategy);
        }
        Ok(report)
    }

    fn empty_counts(&self) -> IndexMap<String, u64> {
        self.schema
            .tables
            .keys()
            .map(|table| (table.clone(), 0))
            .collect()
    }

    fn table_position(&self, table: &str) -> Result<usize> {
        self.schema
            .tables
            .get_index_of(table)
            .ok_or_else(|| FixtureError::Config(format!("row for unknown table `{table}`")))
    }

    fn load_buffered<I>(&self, backend: &mut dyn Backend, rows: I) -> Result<IndexMap<String, u64>>
    where
        I: IntoIterator<Item = Row>,
    {
        let mut counts = self.empty_counts();
        let mut buffers: Vec<Vec<Row>> = vec![vec![]; self.schema.tables.len()];

        for row in rows {
            let position = self.table_position(row.table)?;
            buffers[position].push(row);

            if buffers[position].len() >= self.batch_size {
                for earlier in 0..=position {
                    self.write_buffer(backend, earlier, &mut buffers[earlier], &mut counts)?;
                }
            }
        }

        for (position, buffer) in buffers.iter_mut().enumerate() {
            self.write_buffer(backend, position, buffer, &mut counts)?;
        }

        Ok(counts)
    }

    fn write_buffer(
        &self,
        backend: &mut dyn Backend,
        position: usize,
        buffer: &mut Vec<Row>,
        counts: &mut IndexMap<String, u64>,
    ) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }
        let Some((name, table)) = self.schema.tables.get_index(position) else {
            return Ok(());
        };

        let written = match self.strategy {
            LoadStrategy::RowAtATime => backend.insert_each(table, buffer),
            _ => backend.insert_batch(table, buffer),
        };
        if let Err(err) = written {
            return Err(self.load_error(backend, name, &err));
        }

        counts[name.as_str()] += buffer.len() as u64;
        debug!("Wrote {} row(s) into {name}", buffer.len());
        buffer.clear();
        Ok(())
    }

    fn load_via_staging<I>(&self, backend: &mut dyn Backend, rows: I) -> Result<IndexMap<String, u64>>
    where
        I: IntoIterator<Item = Row>,
    {
        let mut writers: Vec<Option<CsvStagingWriter>> =
            self.schema.tables.keys().map(|_| None).collect();

        for row in rows {
            let position = self.table_position(row.table)?;
            if writers[position].is_none() {
                let path = staging_path(&self.staging_target, row.table);
                writers[position] = Some(CsvStagingWriter::create(&path)?);
            }
            if let Some(writer) = writers[position].as_mut() {
                writer.write_row(&row)?;
            }
        }

        let mut staged = vec![];
        for (position, writer) in writers.into_iter().enumerate() {
            if let Some(writer) = writer {
                staged.push((position, writer.finish()?));
            }
        }

        let mut counts = self.empty_counts();
        for (i, &(position, rows)) in staged.iter().enumerate() {
            let Some((name, table)) = self.schema.tables.get_index(position) else {
                continue;
            };
            let path = staging_path(&self.staging_target, name);
            debug!("Importing {rows} staged row(s) from {}", path.display());

            if let Err(err) = backend.import_csv(table, &path) {
                warn!("Staging file kept for inspection: {}", path.display());
                self.discard_staging(&staged[i + 1..]);
                return Err(self.load_error(backend, name, &err));
            }
            std::fs::remove_file(&path)?;
            counts[name.as_str()] = rows;
        }

        Ok(counts)
    }

    // Staging files of tables that were never imported.
    fn discard_staging(&self, staged: &[(usize, u64)]) {
        for &(position, _) in staged {
            let Some((name, _)) = self.schema.tables.get_index(position) else {
                continue;
            };
            let path = staging_path(&self.staging_target, name);
            if let Err(err) = std::fs::remove_file(&path) {
                warn!("Cannot remove {}: {err}", path.display());
            }
        }
    }

    fn load_error(&self, backend: &mut dyn Backend, table: &str, err: &FixtureError) -> FixtureError {
        let committed = match self.strategy {
            LoadStrategy::Volatile => Some(0),
            _ => backend.count_rows(table).ok(),
        };
        let message = match err {
            FixtureError::MalformedImport { .. } => err.to_string(),
            other => other.engine_message(),
        };

        FixtureError::Load {
            strategy: self.strategy,
            table: table.to_string(),
            committed,
            message,
        }
    }
}

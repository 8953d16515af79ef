use std::time::Instant;

use log::{debug, info};

use crate::{backend::Backend, common::Result, schema::DatabaseSchema};

/// Creates the secondary indexes a schema declares and refreshes planner
/// statistics. Only called once loading is finished.
pub struct IndexBuilder<'a> {
    schema: &'a DatabaseSchema,
}

impl<'a> IndexBuilder<'a> {
    #[must_use]
    pub const fn new(schema: &'a DatabaseSchema) -> Self {
        Self { schema }
    }

    /// Every `CREATE INDEX` statement followed by `ANALYZE`.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .schema
            .tables
            .values()
            .flat_map(|table| table.create_index_sqls())
            .collect();
        out.push("ANALYZE;".to_string());
        out
    }

    /// Returns the number of indexes created.
    ///
    /// # Errors
    ///
    /// On engine errors, with the engine text verbatim.
    pub fn build(&self, backend: &mut dyn Backend) -> Result<usize> {
        let start = Instant::now();
        let statements = self.statements();
        for statement in &statements {
            debug!("{statement}");
        }
        backend.execute(&statements.join("\n"))?;

        let created = statements.len() - 1;
        info!(
            "Built {created} index(es) and refreshed statistics in {:.2?}",
            start.elapsed()
        );
        Ok(created)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        native_backend::NativeBackend,
        sensor::{rooms_table, sensor_logs_table},
    };

    #[test]
    fn test_statements_end_with_analyze() {
        let schema = DatabaseSchema::new(vec![rooms_table(), sensor_logs_table()]);
        let statements = IndexBuilder::new(&schema).statements();

        assert_eq!(Some(&"ANALYZE;".to_string()), statements.last());
        assert!(statements
            .iter()
            .any(|s| s.contains("idx_sensor_logs_room_timestamp ON sensor_logs(room_id, timestamp)")));
    }

    #[test]
    fn test_build_creates_indexes() {
        let schema = DatabaseSchema::new(vec![rooms_table(), sensor_logs_table()]);
        let mut backend = NativeBackend::open_in_memory().unwrap();
        backend.execute(&schema.create_sql()).unwrap();

        let created = IndexBuilder::new(&schema).build(&mut backend).unwrap();
        let result = backend
            .query("SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'")
            .unwrap();

        assert_eq!(8, created);
        assert_eq!(Some(8), result.scalar_integer());
    }
}

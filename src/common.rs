use std::path::{Path, PathBuf};

use log::debug;

use crate::loader::LoadStrategy;

pub type Result<T> = std::result::Result<T, FixtureError>;

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Error text reported by the database engine, kept verbatim.
    #[error("{0}")]
    Engine(String),

    #[error(
        "{strategy} load into `{table}` failed ({}): {message}. {}",
        committed_description(.committed),
        .strategy.failure_postcondition()
    )]
    Load {
        strategy: LoadStrategy,
        table: String,
        committed: Option<u64>,
        message: String,
    },

    #[error("Malformed import row {line} in {}: {reason}", .path.display())]
    MalformedImport {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Glob(#[from] glob::PatternError),
}

impl From<sqlite::Error> for FixtureError {
    fn from(err: sqlite::Error) -> Self {
        Self::Engine(err.to_string())
    }
}

impl FixtureError {
    /// Engine text of the error, for embedding into a load failure.
    #[must_use]
    pub fn engine_message(&self) -> String {
        match self {
            Self::Engine(message) => message.clone(),
            Self::Load { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

fn committed_description(committed: &Option<u64>) -> String {
    committed.map_or_else(
        || "committed row count unknown".to_string(),
        |count| format!("{count} row(s) durable in table"),
    )
}

/// Quotes a string as a SQL text literal.
#[must_use]
pub fn sql_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

/// Removes every file matching the pattern. Missing files are not an error.
///
/// # Errors
///
/// On invalid glob pattern.
pub fn delete_all_files_by_glob(pattern: &str) -> Result<usize> {
    let mut deleted = 0usize;
    for path in glob::glob(pattern)?.flatten() {
        if path.is_file() && std::fs::remove_file(&path).is_ok() {
            debug!("Deleted {}", path.display());
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// Removes a database file together with its journal sidecars and staging files.
///
/// # Errors
///
/// On file operations.
pub fn delete_database_files(target: &Path) -> Result<usize> {
    let mut deleted = 0usize;
    if target.is_file() {
        std::fs::remove_file(target)?;
        deleted += 1;
    }

    let escaped = glob::Pattern::escape(&target.to_string_lossy());
    deleted += delete_all_files_by_glob(&format!("{escaped}-*"))?;
    deleted += delete_all_files_by_glob(&format!("{escaped}.*.csv"))?;

    Ok(deleted)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sql_quote() {
        assert_eq!("'abc'", sql_quote("abc"));
        assert_eq!("'O''Brien'", sql_quote("O'Brien"));
        assert_eq!("''", sql_quote(""));
    }

    #[test]
    fn test_delete_database_files() {
        let dir = std::env::temp_dir().join(format!("sensorbase_common_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let target = dir.join("fixture.db");
        let keep = dir.join("fixture.dbx");
        for path in [
            target.clone(),
            dir.join("fixture.db-journal"),
            dir.join("fixture.db.rooms.csv"),
            keep.clone(),
        ] {
            std::fs::write(&path, b"x").unwrap();
        }

        assert_eq!(3, delete_database_files(&target).unwrap());
        assert!(!target.exists());
        assert!(keep.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_error_mentions_postcondition() {
        let err = FixtureError::Load {
            strategy: LoadStrategy::Batched,
            table: "rooms".into(),
            committed: Some(20),
            message: "UNIQUE constraint failed: rooms.room_number".into(),
        };
        let text = err.to_string();

        assert!(text.contains("UNIQUE constraint failed: rooms.room_number"));
        assert!(text.contains("20 row(s) durable"));
        assert!(text.contains("failing batch"));
    }
}

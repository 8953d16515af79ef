use std::{
    fmt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::{DateTime, SubsecRound, Utc};
use indexmap::IndexMap;
use log::{info, warn};
use rand::Rng;

use crate::{
    backend::{Backend, BackendKind},
    common::{delete_database_files, FixtureError, Result},
    config::{FixtureConfig, ReportConfig},
    fixture::Fixture,
    indexer::IndexBuilder,
    loader::{LoadStrategy, Loader},
    verifier::{VerificationReport, Verifier},
};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub fixture: &'static str,
    pub target: PathBuf,
    pub strategy: LoadStrategy,
    pub backend: BackendKind,
    pub seed: u64,
    pub anchor: DateTime<Utc>,
    pub counts: IndexMap<String, u64>,
    pub load_elapsed: Duration,
    /// `None` when index building was skipped.
    pub indexes: Option<usize>,
    pub verification: Option<VerificationReport>,
    pub elapsed: Duration,
}

impl RunReport {
    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.counts.values().sum()
    }

    #[must_use]
    pub fn count(&self, table: &str) -> u64 {
        self.counts.get(table).copied().unwrap_or(0)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Wrote {} row(s) of the {} fixture to {} in {:.2?}",
            self.total_rows(),
            self.fixture,
            self.target.display(),
            self.elapsed
        )?;
        for (table, count) in &self.counts {
            writeln!(f, "  {table:<16} {count}")?;
        }
        writeln!(
            f,
            "strategy: {}, backend: {}, seed: {}, anchor: {}",
            self.strategy,
            self.backend,
            self.seed,
            self.anchor.to_rfc3339()
        )?;
        match self.indexes {
            Some(count) => writeln!(f, "indexes: {count}")?,
            None => writeln!(f, "indexes: skipped")?,
        }
        if let Some(verification) = &self.verification {
            write!(f, "\n{verification}")?;
        }
        Ok(())
    }
}

/// Validate, clean, create, load, index, verify. Strictly sequential.
pub struct Pipeline {
    config: FixtureConfig,
}

impl Pipeline {
    #[must_use]
    pub const fn new(config: FixtureConfig) -> Self {
        Self { config }
    }

    /// # Errors
    ///
    /// `FixtureError::Config` before anything is written, `FixtureError::Load`
    /// when the strategy fails, engine and file errors otherwise. Verification
    /// problems never fail the run.
    pub fn run(&self) -> Result<RunReport> {
        let start = Instant::now();
        let config = &self.config;
        config.validate()?;

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let anchor = config.anchor.unwrap_or_else(Utc::now).trunc_subsecs(0);
        info!(
            "Generating the {} fixture into {} (seed {seed}, {} strategy, {} backend)",
            config.fixture.name(),
            config.target.display(),
            config.strategy,
            config.backend
        );

        if config.clean {
            let removed = delete_database_files(&config.target)?;
            if removed > 0 {
                info!("Removed {removed} existing file(s) of the previous run");
            }
        }

        let schema = config.fixture.schema();
        let volatile = config.strategy == LoadStrategy::Volatile;
        let mut backend = if volatile {
            config.backend.open_in_memory()?
        } else {
            config.backend.open(&config.target)?
        };
        backend.execute(&schema.create_sql())?;
        info!("Created {} table(s)", schema.tables.len());

        let load = Loader::new(config.strategy, &schema, config.batch_size, &config.target)
            .load(backend.as_mut(), config.fixture.rows(seed, anchor))?;
        info!(
            "Loaded {} row(s) in {:.2?}",
            load.total_rows(),
            load.elapsed
        );

        let indexes = if config.build_indexes {
            Some(IndexBuilder::new(&schema).build(backend.as_mut())?)
        } else {
            None
        };

        if volatile {
            if let Err(err) = backend.persist_to(&config.target) {
                delete_database_files(&config.target)?;
                return Err(FixtureError::Load {
                    strategy: config.strategy,
                    table: schema.tables.keys().cloned().collect::<Vec<_>>().join(", "),
                    committed: Some(0),
                    message: err.engine_message(),
                });
            }
            info!("Copied the in-memory database to {}", config.target.display());
            backend = config.backend.open(&config.target)?;
        }

        let verification = config.verify.then(|| {
            Verifier::new(&config.fixture)
                .expect_counts(load.counts.clone())
                .with_anchor(anchor)
                .verify(backend.as_mut())
        });

        Ok(RunReport {
            fixture: config.fixture.name(),
            target: config.target.clone(),
            strategy: config.strategy,
            backend: config.backend.clone(),
            seed,
            anchor,
            counts: load.counts,
            load_elapsed: load.elapsed,
            indexes,
            verification,
            elapsed: start.elapsed(),
        })
    }
}

/// Runs the verifier read-only against an existing database.
///
/// # Errors
///
/// When the database cannot be opened. Problems found inside are warnings.
pub fn inspect(config: &ReportConfig) -> Result<VerificationReport> {
    if !config.target.is_file() {
        return Err(FixtureError::Config(format!(
            "database {} does not exist",
            config.target.display()
        )));
    }
    let mut backend = config.backend.open(&config.target)?;
    let report = Verifier::new(&config.fixture).verify(backend.as_mut());
    if !report.is_clean() {
        warn!("{} has {} problem(s)", config.target.display(), report.warnings.len());
    }
    Ok(report)
}

/// Convenience for library callers: a batched sensor run with defaults.
///
/// # Errors
///
/// See [`Pipeline::run`].
pub fn generate_sensors(rooms: u64, logs_per_room: u64, target: &Path) -> Result<RunReport> {
    Pipeline::new(FixtureConfig::new(Fixture::sensors(rooms, logs_per_room), target)).run()
}

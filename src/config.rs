//! Run configuration. Everything a run depends on is carried explicitly here;
//! nothing is read from the environment or the working directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    backend::BackendKind,
    common::{FixtureError, Result},
    fixture::Fixture,
    loader::LoadStrategy,
    preset::{Presets, MAX_WINDOW_DAYS},
};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

pub const USAGE: &str = "\
usage: fixture_load <rooms> <logs_per_room> <target> [options]

  --fixture sensors|shop        dataset to generate (shop: <users> <orders_per_user>)
  --strategy row|batch|import|memory
                                load strategy (default: batch)
  --backend native|shell        engine access (default: native)
  --sqlite3 <program>           program used by the shell backend (default: sqlite3)
  --batch-size <n>              rows per transaction (default: 1000)
  --seed <n>                    random seed (default: drawn and reported)
  --preset <file.json>          value ranges and pools
  --no-clean                    refuse to overwrite an existing target
  --skip-indexes                do not build secondary indexes
  --skip-verify                 do not run the verification queries";

#[derive(Debug, Clone, PartialEq)]
pub struct FixtureConfig {
    pub fixture: Fixture,
    pub target: PathBuf,
    pub strategy: LoadStrategy,
    pub backend: BackendKind,
    pub batch_size: usize,
    /// Drawn at run time when absent.
    pub seed: Option<u64>,
    /// The instant timestamp windows end at. Defaults to the run start.
    pub anchor: Option<DateTime<Utc>>,
    /// Remove an existing target and its sidecar files before loading.
    pub clean: bool,
    pub build_indexes: bool,
    pub verify: bool,
}

impl FixtureConfig {
    #[must_use]
    pub fn new(fixture: Fixture, target: &Path) -> Self {
        Self {
            fixture,
            target: target.to_path_buf(),
            strategy: LoadStrategy::Batched,
            backend: BackendKind::Native,
            batch_size: DEFAULT_BATCH_SIZE,
            seed: None,
            anchor: None,
            clean: true,
            build_indexes: true,
            verify: true,
        }
    }

    /// Parses command line arguments, without the program name.
    ///
    /// # Errors
    ///
    /// On unknown flags, missing values, malformed numbers and unreadable
    /// preset files.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut positional = vec![];
        let mut fixture_name = "sensors".to_string();
        let mut preset_path: Option<PathBuf> = None;
        let mut strategy = LoadStrategy::Batched;
        let mut backend_name = "native".to_string();
        let mut program = BackendKind::DEFAULT_SHELL_PROGRAM.to_string();
        let mut batch_size = DEFAULT_BATCH_SIZE;
        let mut seed = None;
        let mut clean = true;
        let mut build_indexes = true;
        let mut verify = true;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| FixtureError::Config(format!("{flag} requires a value")))
            };

            match arg.as_str() {
                "--fixture" => fixture_name = value("--fixture")?,
                "--strategy" => strategy = LoadStrategy::parse(&value("--strategy")?)?,
                "--backend" => backend_name = value("--backend")?,
                "--sqlite3" => program = value("--sqlite3")?,
                "--batch-size" => {
                    let raw = value("--batch-size")?;
                    batch_size = usize::try_from(parse_count(&raw, "batch size")?)
                        .map_err(|_| FixtureError::Config(format!("batch size {raw} is too large")))?;
                }
                "--seed" => seed = Some(parse_count(&value("--seed")?, "seed")?),
                "--preset" => preset_path = Some(PathBuf::from(value("--preset")?)),
                "--no-clean" => clean = false,
                "--skip-indexes" => build_indexes = false,
                "--skip-verify" => verify = false,
                flag if flag.starts_with("--") => {
                    return Err(FixtureError::Config(format!("unknown option `{flag}`")));
                }
                _ => positional.push(arg),
            }
        }

        let [first, second, target] = positional.as_slice() else {
            return Err(FixtureError::Config(format!(
                "expected 3 positional arguments, got {}",
                positional.len()
            )));
        };
        let first = parse_count(first, "first count")?;
        let second = parse_count(second, "second count")?;

        let fixture = match Fixture::parse_name(&fixture_name)? {
            Fixture::Sensors(mut f) => {
                f.rooms = first;
                f.logs_per_room = second;
                Fixture::Sensors(f)
            }
            Fixture::Shop(mut f) => {
                f.users = first;
                f.orders_per_user = second;
                Fixture::Shop(f)
            }
        };
        let fixture = with_presets(fixture, preset_path.as_deref())?;

        let backend = parse_backend(&backend_name, program)?;

        Ok(Self {
            fixture,
            target: PathBuf::from(target),
            strategy,
            backend,
            batch_size,
            seed,
            anchor: None,
            clean,
            build_indexes,
            verify,
        })
    }

    /// Checks everything that can be checked before a single row is generated.
    ///
    /// # Errors
    ///
    /// `FixtureError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FixtureError::Config("batch size must be positive".into()));
        }
        self.fixture.validate()?;
        if let Some(anchor) = self.anchor {
            if anchor.checked_sub_signed(TimeDelta::days(MAX_WINDOW_DAYS)).is_none() {
                return Err(FixtureError::Config(format!(
                    "anchor {anchor} leaves no room for the timestamp windows"
                )));
            }
        }

        if self.target.as_os_str().is_empty() {
            return Err(FixtureError::Config("target path is empty".into()));
        }
        if self.target.is_dir() {
            return Err(FixtureError::Config(format!(
                "target {} is a directory",
                self.target.display()
            )));
        }

        let parent = match self.target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let Ok(metadata) = std::fs::metadata(&parent) else {
            return Err(FixtureError::Config(format!(
                "target directory {} does not exist",
                parent.display()
            )));
        };
        if !metadata.is_dir() {
            return Err(FixtureError::Config(format!(
                "{} is not a directory",
                parent.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(FixtureError::Config(format!(
                "target directory {} is not writable",
                parent.display()
            )));
        }

        if !self.clean && self.target.exists() {
            return Err(FixtureError::Config(format!(
                "target {} already exists and cleaning is disabled",
                self.target.display()
            )));
        }
        Ok(())
    }
}

pub const REPORT_USAGE: &str = "\
usage: fixture_report <target> [options]

  --fixture sensors|shop        dataset the target holds (default: sensors)
  --backend native|shell        engine access (default: native)
  --sqlite3 <program>           program used by the shell backend (default: sqlite3)
  --preset <file.json>          value ranges and pools the target was generated with";

/// Configuration of a read-only report on an existing database.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub fixture: Fixture,
    pub target: PathBuf,
    pub backend: BackendKind,
}

impl ReportConfig {
    /// Parses command line arguments, without the program name.
    ///
    /// # Errors
    ///
    /// On unknown flags, missing values and a missing target argument.
    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut target = None;
        let mut fixture = Fixture::sensors(0, 0);
        let mut preset_path: Option<PathBuf> = None;
        let mut backend_name = "native".to_string();
        let mut program = BackendKind::DEFAULT_SHELL_PROGRAM.to_string();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .ok_or_else(|| FixtureError::Config(format!("{flag} requires a value")))
            };

            match arg.as_str() {
                "--fixture" => fixture = Fixture::parse_name(&value("--fixture")?)?,
                "--backend" => backend_name = value("--backend")?,
                "--sqlite3" => program = value("--sqlite3")?,
                "--preset" => preset_path = Some(PathBuf::from(value("--preset")?)),
                flag if flag.starts_with("--") => {
                    return Err(FixtureError::Config(format!("unknown option `{flag}`")));
                }
                _ if target.is_some() => {
                    return Err(FixtureError::Config(format!("unexpected argument `{arg}`")));
                }
                _ => target = Some(PathBuf::from(arg)),
            }
        }

        let Some(target) = target else {
            return Err(FixtureError::Config("missing target argument".into()));
        };
        if !target.is_file() {
            return Err(FixtureError::Config(format!(
                "database {} does not exist",
                target.display()
            )));
        }

        // The integrity checks derive their bounds from the presets.
        let fixture = with_presets(fixture, preset_path.as_deref())?;
        fixture.validate()?;

        Ok(Self {
            fixture,
            target,
            backend: parse_backend(&backend_name, program)?,
        })
    }
}

fn with_presets(fixture: Fixture, path: Option<&Path>) -> Result<Fixture> {
    let presets = match path {
        Some(path) => Presets::from_file(path)?,
        None => Presets::default(),
    };
    Ok(match fixture {
        Fixture::Sensors(mut f) => {
            f.preset = presets.sensors;
            Fixture::Sensors(f)
        }
        Fixture::Shop(mut f) => {
            f.preset = presets.shop;
            Fixture::Shop(f)
        }
    })
}

fn parse_backend(name: &str, program: String) -> Result<BackendKind> {
    match name {
        "native" => Ok(BackendKind::Native),
        "shell" => Ok(BackendKind::Shell { program }),
        other => Err(FixtureError::Config(format!(
            "unknown backend `{other}` (expected native or shell)"
        ))),
    }
}

fn parse_count(raw: &str, name: &str) -> Result<u64> {
    raw.trim().parse::<u64>().map_err(|_| {
        FixtureError::Config(format!("{name} must be a non-negative integer, got `{raw}`"))
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::preset::{FloatRange, IntRange};

    fn args(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(ToString::to_string).collect()
    }

    #[test]
    fn test_defaults() {
        let config = FixtureConfig::from_args(args("2 1000 /tmp/sensors.db")).unwrap();

        assert_eq!(Fixture::sensors(2, 1000), config.fixture);
        assert_eq!(PathBuf::from("/tmp/sensors.db"), config.target);
        assert_eq!(LoadStrategy::Batched, config.strategy);
        assert_eq!(BackendKind::Native, config.backend);
        assert_eq!(DEFAULT_BATCH_SIZE, config.batch_size);
        assert_eq!(None, config.seed);
        assert!(config.clean && config.build_indexes && config.verify);
    }

    #[test]
    fn test_all_options() {
        let config = FixtureConfig::from_args(args(
            "--fixture shop 10 3 out.db --strategy import --backend shell --sqlite3 /opt/sqlite3 \
             --batch-size 50 --seed 42 --no-clean --skip-indexes --skip-verify",
        ))
        .unwrap();

        assert_eq!(Fixture::shop(10, 3), config.fixture);
        assert_eq!(LoadStrategy::BulkImport, config.strategy);
        assert_eq!(
            BackendKind::Shell {
                program: "/opt/sqlite3".into()
            },
            config.backend
        );
        assert_eq!(50, config.batch_size);
        assert_eq!(Some(42), config.seed);
        assert!(!config.clean && !config.build_indexes && !config.verify);
    }

    #[test]
    fn test_rejects_bad_counts() {
        assert!(FixtureConfig::from_args(args("-5 10 out.db")).is_err());
        assert!(FixtureConfig::from_args(args("two 10 out.db")).is_err());
        assert!(FixtureConfig::from_args(args("2 10")).is_err());
        assert!(FixtureConfig::from_args(args("2 10 out.db --seed")).is_err());
        assert!(FixtureConfig::from_args(args("2 10 out.db --turbo")).is_err());
        assert!(FixtureConfig::from_args(args("2 10 out.db --backend odbc")).is_err());
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let mut config = FixtureConfig::new(Fixture::sensors(1, 1), &std::env::temp_dir().join("x.db"));
        config.batch_size = 0;
        assert!(matches!(config.validate(), Err(FixtureError::Config(_))));
    }

    #[test]
    fn test_validate_missing_directory() {
        let config = FixtureConfig::new(
            Fixture::sensors(1, 1),
            Path::new("/nonexistent-sensorbase-dir/out.db"),
        );
        assert!(matches!(config.validate(), Err(FixtureError::Config(_))));
    }

    #[test]
    fn test_validate_existing_target_without_clean() {
        let target = std::env::temp_dir().join(format!("sensorbase_config_{}.db", std::process::id()));
        std::fs::write(&target, b"").unwrap();

        let mut config = FixtureConfig::new(Fixture::sensors(1, 1), &target);
        assert!(config.validate().is_ok());
        config.clean = false;
        assert!(config.validate().is_err());

        std::fs::remove_file(&target).unwrap();
    }

    #[test]
    fn test_preset_file_overrides_ranges() {
        let path = std::env::temp_dir().join(format!("sensorbase_preset_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"sensors": {"capacity": {"min": 1, "max": 2}}}"#).unwrap();

        let config = FixtureConfig::from_args(vec![
            "1".to_string(),
            "1".to_string(),
            "out.db".to_string(),
            "--preset".to_string(),
            path.display().to_string(),
        ])
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        let Fixture::Sensors(sensors) = config.fixture else {
            panic!("expected the sensor fixture");
        };
        assert_eq!(2, sensors.preset.capacity.max);
        assert_eq!(10, sensors.preset.floor_number.max);
    }

    #[test]
    fn test_report_args() {
        let target = std::env::temp_dir().join(format!("sensorbase_report_{}.db", std::process::id()));
        std::fs::write(&target, b"").unwrap();

        let config = ReportConfig::from_args(vec![
            target.display().to_string(),
            "--fixture".to_string(),
            "shop".to_string(),
        ])
        .unwrap();
        assert_eq!("shop", config.fixture.name());
        assert_eq!(BackendKind::Native, config.backend);

        std::fs::remove_file(&target).unwrap();
        assert!(ReportConfig::from_args(vec![target.display().to_string()]).is_err());
        assert!(ReportConfig::from_args(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_report_uses_preset_file() {
        let id = std::process::id();
        let target = std::env::temp_dir().join(format!("sensorbase_report_preset_{id}.db"));
        let preset = std::env::temp_dir().join(format!("sensorbase_report_preset_{id}.json"));
        std::fs::write(&target, b"").unwrap();
        std::fs::write(&preset, r#"{"shop": {"price": {"min": 2.5, "max": 9.0}}}"#).unwrap();

        let config = ReportConfig::from_args(vec![
            target.display().to_string(),
            "--fixture".to_string(),
            "shop".to_string(),
            "--preset".to_string(),
            preset.display().to_string(),
        ])
        .unwrap();

        std::fs::write(&preset, r#"{"shop": {"order_window_days": 0}}"#).unwrap();
        let invalid = ReportConfig::from_args(vec![
            target.display().to_string(),
            "--fixture".to_string(),
            "shop".to_string(),
            "--preset".to_string(),
            preset.display().to_string(),
        ]);
        std::fs::remove_file(&target).unwrap();
        std::fs::remove_file(&preset).unwrap();

        let Fixture::Shop(shop) = config.fixture else {
            panic!("expected the shop fixture");
        };
        assert_eq!(FloatRange::new(2.5, 9.0), shop.preset.price);
        assert_eq!(IntRange::new(1, 5), shop.preset.quantity);
        assert!(matches!(invalid, Err(FixtureError::Config(_))));
    }

    #[test]
    fn test_anchor_must_leave_room_for_windows() {
        let mut config = FixtureConfig::new(Fixture::sensors(1, 1), &std::env::temp_dir().join("anchored.db"));
        config.anchor = Some(DateTime::<Utc>::MIN_UTC + TimeDelta::days(10));
        assert!(matches!(config.validate(), Err(FixtureError::Config(_))));

        config.anchor = Some(Utc::now());
        assert!(config.validate().is_ok());
    }
}

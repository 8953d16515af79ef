use anyhow::Context;
use log::error;
use sensorbase::{
    config::{ReportConfig, REPORT_USAGE},
    pipeline::inspect,
};

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{REPORT_USAGE}");
        return Ok(());
    }

    let config = ReportConfig::from_args(args).context("Invalid arguments")?;
    let report = inspect(&config)
        .with_context(|| format!("Failed to inspect {}", config.target.display()))?;

    print!("{report}");
    Ok(())
}

fn main() {
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Err(err) = run() {
        error!("fatal: {err:#}");
        std::process::exit(1);
    }
}

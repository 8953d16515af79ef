use anyhow::Context;
use log::error;
use sensorbase::{
    config::{FixtureConfig, USAGE},
    pipeline::Pipeline,
};

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let config = FixtureConfig::from_args(args).context("Invalid arguments")?;
    let target = config.target.display().to_string();
    let report = Pipeline::new(config)
        .run()
        .with_context(|| format!("Failed to generate {target}"))?;

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
        eprintln!("\n{USAGE}");
        std::process::exit(1);
    }
}

mod commands;
mod logging;
mod progress;

use std::path::Path;
use std::process;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use db_operator_core::config::load_configuration;
use db_operator_core::{diff_databases, load_database, BuildEngine, BuildVars, HttpFetcher};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info};

fn main() {
    dotenv().ok();

    let args = Cli::parse();
    let guard = logging::init_logger(args.writes_log_file());

    let vars = match load_configuration() {
        Ok(vars) => vars,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let start = Instant::now();

    let status = match args.command {
        Some(Commands::Build {
            source_dir,
            output_dir,
        }) => run_build(vars, &source_dir, output_dir.as_deref()).map(|()| 0),
        Some(Commands::Compare { left, right }) => run_compare(vars, &left, &right),
        Some(Commands::PrintConfig) => {
            info!("BuildVars: {:#?}", vars.redacted());
            Ok(0)
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(0)
        }
    };

    let status = match status {
        Ok(status) => status,
        Err(err) => {
            error!("Error: {:#}", err);
            1
        }
    };

    info!("Time: {:.2}s", start.elapsed().as_secs_f64());
    drop(guard);
    process::exit(status);
}

fn run_build(vars: BuildVars, source_dir: &Path, output_dir: Option<&Path>) -> Result<()> {
    info!("Building database from {}...", source_dir.display());
    info!("BuildVars: {:?}", vars.redacted());
    vars.validate()?;

    let fetcher = HttpFetcher::new(vars.github_token()).context("Could not create HTTP client")?;
    let mut engine = BuildEngine::new(source_dir, vars, Box::new(fetcher));
    if let Some(output_dir) = output_dir {
        engine = engine.with_output_dir(output_dir);
    }

    let reporter = CliReporter::new();
    let outcome = engine
        .run(&reporter)
        .with_context(|| format!("Building database from {}", source_dir.display()))?;

    info!(
        "Scan: {}, Hash: {}, Tags: {}",
        format!("{:.2}s", outcome.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", outcome.hash_duration.as_secs_f64()).green(),
        format!("{:.2}s", outcome.tag_duration.as_secs_f64()).green(),
    );
    info!(
        "{} files, {} folders, {} zips",
        format!("{}", outcome.files).cyan(),
        format!("{}", outcome.folders).cyan(),
        format!("{}", outcome.zips).cyan(),
    );
    match &outcome.database_path {
        Some(path) => info!("{} {}", "Saved".green(), path.display()),
        None => info!("{}", "No changes detected.".yellow()),
    }
    Ok(())
}

/// Exit status 0 when both databases match, 1 otherwise.
fn run_compare(vars: BuildVars, left: &str, right: &str) -> Result<i32> {
    let fetcher = HttpFetcher::new(vars.github_token()).context("Could not create HTTP client")?;
    let left_db = load_database(left, &fetcher).with_context(|| format!("Loading {}", left))?;
    let right_db = load_database(right, &fetcher).with_context(|| format!("Loading {}", right))?;

    let report = diff_databases(left_db, right_db)?;
    if report.equal {
        info!("{}", "No changes.".green());
        Ok(0)
    } else {
        info!("{}", "Databases are different.".red());
        Ok(1)
    }
}

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

mod config;
mod stages;

use config::PipelineConfig;

#[derive(Parser)]
#[command(name = "price-drivers")]
#[command(about = "Build daily ERCOT price-driver panels and fit ln(price) by OLS")]
struct Args {
    /// JSON config; unset fields keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the artifact directory from the config
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Daily hub price from the settlement-point workbook
    Price,
    /// Daily system load from the load CSV directory
    Load,
    /// Daily CDD/HDD from the weather CSV directory
    DegreeDays,
    /// Daily wind+solar share from the fuel-mix workbook
    Renewables,
    /// Join the four daily panels on date
    Merge,
    /// Filter the merged table and add log columns
    Preprocess,
    /// Fit the OLS model and save it as JSON
    Fit,
    /// Coefficient CSV and Markdown report from the saved model
    Report,
    /// Diagnostic PNGs from the saved model
    Plot,
    /// Check artifacts for duplicate or unsorted dates
    Verify,
    /// Every stage from raw inputs to plots
    All,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    info!("running {:?} with artifacts in {}", args.command, config.output_dir.display());

    match args.command {
        Command::Price => stages::run_price(&config)?,
        Command::Load => stages::run_load(&config)?,
        Command::DegreeDays => stages::run_degree_days(&config)?,
        Command::Renewables => stages::run_renewables(&config)?,
        Command::Merge => stages::run_merge(&config)?,
        Command::Preprocess => stages::run_preprocess(&config)?,
        Command::Fit => stages::run_fit(&config)?,
        Command::Report => stages::run_report(&config)?,
        Command::Plot => stages::run_plot(&config)?,
        Command::Verify => {
            let issues = stages::run_verify(&config)?;
            if issues > 0 {
                bail!("{} data quality issues found", issues);
            }
        }
        Command::All => stages::run_all(&config)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_options_after_subcommand() {
        let args = Args::try_parse_from(["price-drivers", "degree-days", "--output-dir", "/tmp/out"]).unwrap();
        assert_eq!(args.command, Command::DegreeDays);
        assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(args.config, None);
    }

    #[test]
    fn rejects_unknown_stage() {
        assert!(Args::try_parse_from(["price-drivers", "download"]).is_err());
    }
}

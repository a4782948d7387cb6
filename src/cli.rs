//! Command-line interface for the regime allocator.

use regime_allocator::config::AllocationFileConfig;
use regime_allocator::data::{
    load_economic_csv, load_returns_csv, DataQualityReport, EconomicColumns, ReturnMatrix,
};
use regime_allocator::engine::AllocationEngine;
use regime_allocator::error::{AllocationError, ErrorHelp, Result};
use regime_allocator::export::{ExportConfig, ReportExporter, ReportFormatter};
use regime_allocator::regime::{RegimeClassifier, RegimeStats, TrendRule};
use regime_allocator::types::{EconomicObservation, RegimeLabel};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Regime Allocator - per-regime Sharpe/Sortino portfolio optimization.
#[derive(Parser)]
#[command(name = "regime-allocator")]
#[command(version)]
#[command(about = "Classify macroeconomic regimes and optimize portfolio weights per regime")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full allocation from a configuration file
    Run {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Economic CSV (overrides the config)
        #[arg(long)]
        economic: Option<PathBuf>,

        /// Returns CSV (overrides the config)
        #[arg(long)]
        returns: Option<PathBuf>,

        /// Directory for CSV/JSON exports (overrides the config)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Per-asset weight cap (overrides the config)
        #[arg(long)]
        max_weight: Option<f64>,

        /// Seed for optimizer restarts (overrides the config)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Classify each month of an economic series
    Classify {
        /// Economic CSV
        #[arg(short, long)]
        economic: PathBuf,

        /// Months between compared smoothed values
        #[arg(long, default_value = "3")]
        lookback: usize,

        /// Trailing mean window
        #[arg(long, default_value = "3")]
        smoothing: usize,
    },

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short = 'f', long = "file", default_value = "allocator.toml")]
        file: PathBuf,
    },

    /// Load the inputs of a configuration and check them for gaps
    Validate {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Failed to set tracing subscriber: {}", e);
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "error:".red().bold(), e);
        if let Some(help) = e.help() {
            eprintln!("  {} {}", "help:".yellow(), help);
        }
        std::process::exit(1);
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Run {
            config,
            economic,
            returns,
            output_dir,
            max_weight,
            seed,
        } => {
            let overrides = RunOverrides {
                economic: economic.clone(),
                returns: returns.clone(),
                output_dir: output_dir.clone(),
                max_weight: *max_weight,
                seed: *seed,
            };
            run_allocation(config, overrides, cli.output)
        }

        Commands::Classify {
            economic,
            lookback,
            smoothing,
        } => classify(economic, *smoothing, *lookback, cli.output),

        Commands::Init { file } => init_config(file),

        Commands::Validate { config } => validate_inputs(config),
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
struct RunOverrides {
    economic: Option<PathBuf>,
    returns: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    max_weight: Option<f64>,
    seed: Option<u64>,
}

impl RunOverrides {
    fn apply(self, config: &mut AllocationFileConfig) {
        if let Some(path) = self.economic {
            config.data.economic_path = Some(path.display().to_string());
        }
        if let Some(path) = self.returns {
            config.data.returns_path = Some(path.display().to_string());
        }
        if let Some(dir) = self.output_dir {
            config.output.directory = Some(dir.display().to_string());
        }
        if let Some(max_weight) = self.max_weight {
            config.optimizer.max_weight = max_weight;
        }
        if let Some(seed) = self.seed {
            config.optimizer.rng_seed = Some(seed);
        }
    }
}

fn required_path<'a>(path: &'a Option<String>, key: &str) -> Result<&'a str> {
    path.as_deref().ok_or_else(|| {
        AllocationError::ConfigError(format!("No {} specified in config", key))
    })
}

fn load_inputs(config: &AllocationFileConfig) -> Result<(Vec<EconomicObservation>, ReturnMatrix)> {
    let economic_path = required_path(&config.data.economic_path, "data.economic_path")?;
    let returns_path = required_path(&config.data.returns_path, "data.returns_path")?;

    info!("Loading economic series from: {}", economic_path);
    let economic = load_economic_csv(economic_path, &config.economic_columns())?;
    info!("Loading returns from: {}", returns_path);
    let returns = load_returns_csv(returns_path, &config.returns_csv_config())?;
    Ok((economic, returns))
}

fn run_allocation(config_path: &Path, overrides: RunOverrides, output: OutputFormat) -> Result<()> {
    let mut file_config = AllocationFileConfig::load(config_path)?;
    overrides.apply(&mut file_config);
    file_config.validate()?;

    let engine_config = file_config.to_engine_config()?;
    let (economic, returns) = load_inputs(&file_config)?;

    let engine = AllocationEngine::new(engine_config)?;
    let report = engine.run(&economic, &returns)?;
    report.validate(file_config.optimizer.max_weight)?;

    if let Some(dir) = &file_config.output.directory {
        let exporter = ReportExporter::with_config(
            &report,
            ExportConfig {
                min_reported_weight: file_config.output.min_reported_weight,
                ..Default::default()
            },
        );
        let written = exporter.export_all(dir, file_config.output.write_json)?;
        if output == OutputFormat::Text {
            for path in written {
                println!("Saved: {}", path.display());
            }
        }
    }

    match output {
        OutputFormat::Text => {
            ReportFormatter::print_report(&report, file_config.output.min_reported_weight)
        }
        OutputFormat::Json => println!("{}", ReportFormatter::to_json(&report)?),
    }

    Ok(())
}

fn classify(economic_path: &Path, smoothing: usize, lookback: usize, output: OutputFormat) -> Result<()> {
    let rule = TrendRule::new(smoothing, lookback)?;
    let economic = load_economic_csv(economic_path, &EconomicColumns::default())?;
    let months = RegimeClassifier::new(rule).classify(&economic)?;
    let stats = RegimeStats::from_months(&months);

    if output == OutputFormat::Json {
        let value = serde_json::json!({
            "rule": rule,
            "months": months,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let mut builder = Builder::new();
    builder.push_record(["Month", "Growth trend", "Inflation trend", "Regime"]);
    for month in &months {
        builder.push_record([
            month.date.to_string(),
            format!("{:+.3}", month.growth_trend),
            format!("{:+.3}", month.inflation_trend),
            month.label.to_string(),
        ]);
    }
    println!("{}", builder.build().with(Style::rounded()).to_string());

    println!();
    println!("{}", "Regime distribution".bold().underline());
    for label in RegimeLabel::ALL {
        println!(
            "  {:<36} {:>5} months ({:>5.1}%)",
            label.to_string(),
            stats.counts.get(&label).copied().unwrap_or(0),
            stats.share(label) * 100.0
        );
    }
    println!("  Regime changes: {}", stats.changes);
    if let Some(current) = stats.current {
        println!("  Current regime: {}", current.to_string().green());
    }
    Ok(())
}

fn init_config(output: &Path) -> Result<()> {
    std::fs::write(output, AllocationFileConfig::example())?;
    println!("Created example configuration file: {}", output.display());
    println!("\nEdit this file to point at your data, then run:");
    println!("  regime-allocator run -c {}", output.display());
    Ok(())
}

fn validate_inputs(config_path: &Path) -> Result<()> {
    let file_config = AllocationFileConfig::load(config_path)?;
    let engine_config = file_config.to_engine_config()?;
    let (economic, returns) = load_inputs(&file_config)?;

    let quality = DataQualityReport::new(&returns, &economic);
    println!("Validating inputs of: {}", config_path.display());
    println!("\nData Summary:");
    println!("  Economic observations: {}", economic.len());
    println!("  Assets:                {}", returns.n_assets());
    println!("  {}", quality.summary());
    for (asset, coverage) in &quality.coverage {
        println!("    {:<20} coverage {:>5.1}%", asset, coverage * 100.0);
    }

    let classifier = RegimeClassifier::new(engine_config.trend_rule);
    for period in engine_config.effective_periods() {
        let window = period.window();
        returns.check_continuity(&window)?;
        let months = classifier.classify_within(&economic, &window)?;
        println!("  Period '{}': {} classified months", period.name, months.len());
    }

    println!("\nValidation: {}", "PASSED".green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::try_parse_from([
            "regime-allocator",
            "run",
            "-c",
            "allocator.toml",
            "--max-weight",
            "0.4",
            "--seed",
            "7",
        ]);
        assert!(cli.is_ok());
        if let Ok(Cli {
            command: Commands::Run {
                max_weight, seed, ..
            },
            ..
        }) = cli
        {
            assert_eq!(max_weight, Some(0.4));
            assert_eq!(seed, Some(7));
        }
    }

    #[test]
    fn test_cli_parse_classify() {
        let cli = Cli::try_parse_from([
            "regime-allocator",
            "-vv",
            "-o",
            "json",
            "classify",
            "-e",
            "economic.csv",
            "--lookback",
            "1",
        ]);
        let cli = cli.unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.output == OutputFormat::Json);
    }

    #[test]
    fn test_cli_rejects_missing_config() {
        assert!(Cli::try_parse_from(["regime-allocator", "run"]).is_err());
        assert!(Cli::try_parse_from(["regime-allocator", "init"]).is_ok());
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = AllocationFileConfig::default();
        RunOverrides {
            returns: Some(PathBuf::from("r.csv")),
            max_weight: Some(0.5),
            seed: Some(9),
            ..Default::default()
        }
        .apply(&mut config);
        assert_eq!(config.data.returns_path.as_deref(), Some("r.csv"));
        assert_eq!(config.optimizer.max_weight, 0.5);
        assert_eq!(config.optimizer.rng_seed, Some(9));
        assert!(config.data.economic_path.is_none());
    }
}

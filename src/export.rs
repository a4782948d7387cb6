//! Export and terminal rendering of allocation reports.
//!
//! | Output | Content |
//! |--------|---------|
//! | `weights.csv` | one row per candidate asset of every optimized entry |
//! | `summary.csv` | one row per (period, regime, method) |
//! | `diagnostics.csv` | universe filter record per (period, regime) |
//! | `report.json` | the full report |
//!
//! CSV and JSON always carry every weight; `min_reported_weight` only hides
//! small weights from the terminal table.

use crate::error::Result;
use crate::report::{AllocationOutcome, AllocationReport, ReportEntry};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style};
use tracing::info;

pub const WEIGHTS_FILE: &str = "weights.csv";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.csv";
pub const REPORT_FILE: &str = "report.json";

/// Configuration for exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Decimal precision for numeric values.
    pub precision: usize,
    /// Weights below this are left out of the terminal table.
    pub min_reported_weight: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            precision: 6,
            min_reported_weight: 0.0,
        }
    }
}

/// Exporter for allocation reports.
pub struct ReportExporter<'a> {
    report: &'a AllocationReport,
    config: ExportConfig,
}

impl<'a> ReportExporter<'a> {
    pub fn new(report: &'a AllocationReport) -> Self {
        Self {
            report,
            config: ExportConfig::default(),
        }
    }

    pub fn with_config(report: &'a AllocationReport, config: ExportConfig) -> Self {
        Self { report, config }
    }

    fn number(&self, value: f64) -> String {
        format!("{:.prec$}", value, prec = self.config.precision)
    }

    fn optional(&self, value: Option<f64>) -> String {
        value.map(|v| self.number(v)).unwrap_or_default()
    }

    pub fn write_weights<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(["period", "regime", "method", "asset", "weight"])?;
        for row in self.report.weight_rows() {
            csv.write_record([
                row.period,
                row.regime.to_string(),
                row.method.to_string(),
                row.asset,
                self.number(row.weight),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_summary<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            "period",
            "regime",
            "method",
            "status",
            "expected_return",
            "risk",
            "risk_ratio",
            "observation_count",
            "assets_used",
            "reason",
        ])?;
        for row in self.report.summary_rows() {
            csv.write_record([
                row.period,
                row.regime.to_string(),
                row.method.to_string(),
                row.status,
                self.optional(row.expected_return),
                self.optional(row.risk),
                self.optional(row.risk_ratio),
                row.observation_count.map(|n| n.to_string()).unwrap_or_default(),
                row.assets_used.map(|n| n.to_string()).unwrap_or_default(),
                row.reason.unwrap_or_default(),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_diagnostics<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record([
            "period",
            "regime",
            "regime_dates",
            "assets_considered",
            "excluded_for_coverage",
            "excluded_for_observations",
            "dates_dropped",
        ])?;
        for d in &self.report.diagnostics {
            csv.write_record([
                d.period.clone(),
                d.regime.to_string(),
                d.universe.regime_dates.to_string(),
                d.universe.assets_considered.to_string(),
                d.universe.excluded_for_coverage.join(";"),
                d.universe.excluded_for_observations.join(";"),
                d.universe.dates_dropped_for_insufficient_assets.to_string(),
            ])?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Export weights to CSV.
    pub fn export_weights_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_weights(BufWriter::new(File::create(path)?))
    }

    /// Export the per-entry summary to CSV.
    pub fn export_summary_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_summary(BufWriter::new(File::create(path)?))
    }

    /// Export universe diagnostics to CSV.
    pub fn export_diagnostics_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_diagnostics(BufWriter::new(File::create(path)?))
    }

    /// Export the full report to JSON.
    pub fn export_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self.report)?;
        Ok(())
    }

    /// Write every output file into `dir`, creating it if needed.
    pub fn export_all(&self, dir: impl AsRef<Path>, include_json: bool) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let mut written = vec![
            dir.join(WEIGHTS_FILE),
            dir.join(SUMMARY_FILE),
            dir.join(DIAGNOSTICS_FILE),
        ];
        self.export_weights_csv(&written[0])?;
        self.export_summary_csv(&written[1])?;
        self.export_diagnostics_csv(&written[2])?;
        if include_json {
            let path = dir.join(REPORT_FILE);
            self.export_json(&path)?;
            written.push(path);
        }

        info!("Exported {} files to {}", written.len(), dir.display());
        Ok(written)
    }
}

/// Terminal rendering of reports.
pub struct ReportFormatter;

impl ReportFormatter {
    /// Summary table of one period.
    pub fn summary_table(report: &AllocationReport, period: &str) -> String {
        let mut builder = Builder::new();
        builder.push_record([
            "Regime", "Method", "Status", "Mean %", "Risk %", "Ratio", "Months", "Assets",
        ]);

        for entry in report.entries.iter().filter(|e| e.period == period) {
            match &entry.outcome {
                AllocationOutcome::Optimized(a) => builder.push_record([
                    entry.regime.to_string(),
                    entry.method.to_string(),
                    a.status.to_string(),
                    format!("{:.3}", a.expected_return * 100.0),
                    format!("{:.3}", a.risk * 100.0),
                    format!("{:.3}", a.risk_ratio),
                    a.observation_count.to_string(),
                    a.assets_used.len().to_string(),
                ]),
                AllocationOutcome::Unoptimizable { .. } => builder.push_record([
                    entry.regime.to_string(),
                    entry.method.to_string(),
                    "skipped".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                    "-".to_string(),
                ]),
            }
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Weights of one entry, largest first, hiding weights below `min_weight`.
    pub fn weights_table(entry: &ReportEntry, min_weight: f64) -> Option<String> {
        let allocation = entry.outcome.allocation()?;
        let mut weights: Vec<(&String, f64)> = allocation
            .weights
            .iter()
            .map(|(a, w)| (a, *w))
            .filter(|(_, w)| *w > 0.0 && *w >= min_weight)
            .collect();
        weights.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut builder = Builder::new();
        builder.push_record(["Asset", "Weight %"]);
        for (asset, weight) in weights {
            builder.push_record([asset.clone(), format!("{:.2}", weight * 100.0)]);
        }
        Some(builder.build().with(Style::rounded()).to_string())
    }

    pub fn print_report(report: &AllocationReport, min_weight: f64) {
        for period in &report.periods {
            println!();
            println!("{}", "═".repeat(60).blue());
            println!("{}", format!(" PERIOD: {} ", period.name).bold().blue());
            println!("{}", "═".repeat(60).blue());
            println!(
                "  Window:          {} to {}",
                period.start.map(|d| d.to_string()).unwrap_or_else(|| "start".to_string()),
                period.end.map(|d| d.to_string()).unwrap_or_else(|| "end".to_string())
            );
            println!("  Classified:      {:>6} months", period.classified_months);
            println!("  With returns:    {:>6} months", period.aligned_months);
            if !period.excluded_assets.is_empty() {
                println!("  Excluded:        {}", period.excluded_assets.join(", "));
            }
            println!();

            println!("{}", "Allocations".bold().underline());
            println!("{}", Self::summary_table(report, &period.name));

            for entry in report.entries.iter().filter(|e| e.period == period.name) {
                match &entry.outcome {
                    AllocationOutcome::Optimized(a) => {
                        println!();
                        let heading = format!("{} / {}", entry.regime, entry.method);
                        if a.is_converged() {
                            println!("{}", heading.bold());
                        } else {
                            println!("{} {}", heading.bold(), "(approximate)".yellow());
                        }
                        if let Some(table) = Self::weights_table(entry, min_weight) {
                            println!("{}", table);
                        }
                    }
                    AllocationOutcome::Unoptimizable { reason } => {
                        println!();
                        println!(
                            "{} {}",
                            format!("{} / {}:", entry.regime, entry.method).bold(),
                            reason.red()
                        );
                    }
                }
            }
        }
        println!();
    }

    pub fn to_json(report: &AllocationReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

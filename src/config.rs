//! Configuration file support for allocation runs.
//!
//! A run is described by a TOML file so results can be reproduced.

use crate::data::{EconomicColumns, ReturnsCsvConfig, ValueScale};
use crate::engine::{AnalysisPeriod, EngineConfig};
use crate::error::{AllocationError, Result};
use crate::optimizer::OptimizerConfig;
use crate::regime::TrendRule;
use crate::types::RatioMethod;
use crate::universe::UniverseFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete allocation configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationFileConfig {
    /// Input files and their layout.
    #[serde(default)]
    pub data: DataSettings,
    /// Regime trend rule.
    #[serde(default)]
    pub classifier: ClassifierSettings,
    /// Candidate asset thresholds.
    #[serde(default)]
    pub universe: UniverseSettings,
    /// Optimizer settings.
    #[serde(default)]
    pub optimizer: OptimizerSettings,
    /// Output settings.
    #[serde(default)]
    pub output: OutputSettings,
    /// Analysis periods; empty means the whole history.
    #[serde(default)]
    pub periods: Vec<AnalysisPeriod>,
}

/// Input files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// Economic series CSV.
    pub economic_path: Option<String>,
    /// Wide monthly returns CSV.
    pub returns_path: Option<String>,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_gdp_column")]
    pub gdp_column: String,
    #[serde(default = "default_inflation_column")]
    pub inflation_column: String,
    /// Date column of the returns file (auto-detected when absent).
    #[serde(default)]
    pub returns_date_column: Option<String>,
    /// Whether returns are fractions or percentages.
    #[serde(default)]
    pub returns_scale: ValueScale,
}

fn default_date_column() -> String { "Date".to_string() }
fn default_gdp_column() -> String { "US_GDP_QoQ_Ann".to_string() }
fn default_inflation_column() -> String { "PCE_Prices".to_string() }

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            economic_path: None,
            returns_path: None,
            date_column: default_date_column(),
            gdp_column: default_gdp_column(),
            inflation_column: default_inflation_column(),
            returns_date_column: None,
            returns_scale: ValueScale::Fraction,
        }
    }
}

/// Trend rule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
    #[serde(default = "default_lookback")]
    pub lookback: usize,
}

fn default_smoothing_window() -> usize { 3 }
fn default_lookback() -> usize { 3 }

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            smoothing_window: 3,
            lookback: 3,
        }
    }
}

/// Candidate asset thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseSettings {
    /// Minimum returns inside a regime.
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    /// Minimum non-missing share over the period.
    #[serde(default = "default_min_coverage")]
    pub min_coverage: f64,
}

fn default_min_observations() -> usize { 5 }
fn default_min_coverage() -> f64 { 0.6 }

impl Default for UniverseSettings {
    fn default() -> Self {
        Self {
            min_observations: 5,
            min_coverage: 0.6,
        }
    }
}

/// Optimizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Per-asset weight cap.
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
    /// Ratios to maximize.
    #[serde(default = "default_methods")]
    pub methods: Vec<RatioMethod>,
    /// Objective evaluations per local solve.
    #[serde(default = "default_max_evaluations")]
    pub max_evaluations: usize,
    /// Random starts after the uniform start.
    #[serde(default = "default_restarts")]
    pub restarts: usize,
    /// Seed for random starts.
    #[serde(default)]
    pub rng_seed: Option<u64>,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_max_weight() -> f64 { 0.25 }
fn default_methods() -> Vec<RatioMethod> { RatioMethod::ALL.to_vec() }
fn default_max_evaluations() -> usize { 20_000 }
fn default_restarts() -> usize { 8 }
fn default_tolerance() -> f64 { 1e-9 }

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_weight: default_max_weight(),
            methods: default_methods(),
            max_evaluations: default_max_evaluations(),
            restarts: default_restarts(),
            rng_seed: None,
            tolerance: default_tolerance(),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Directory for CSV and JSON exports.
    #[serde(default)]
    pub directory: Option<String>,
    /// Weights below this are hidden from the terminal table.
    #[serde(default)]
    pub min_reported_weight: f64,
    /// Also write the full report as JSON.
    #[serde(default = "default_true")]
    pub write_json: bool,
    /// Show a progress bar while optimizing.
    #[serde(default)]
    pub show_progress: bool,
}

fn default_true() -> bool { true }

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: None,
            min_reported_weight: 0.0,
            write_json: true,
            show_progress: false,
        }
    }
}

impl AllocationFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: AllocationFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.output.min_reported_weight) {
            return Err(AllocationError::ConfigError(format!(
                "min_reported_weight must be in [0, 1], got {}",
                self.output.min_reported_weight
            )));
        }
        self.to_engine_config().map(|_| ())
    }

    pub fn trend_rule(&self) -> Result<TrendRule> {
        TrendRule::new(self.classifier.smoothing_window, self.classifier.lookback)
    }

    pub fn universe_filter(&self) -> Result<UniverseFilter> {
        UniverseFilter::new(self.universe.min_observations, self.universe.min_coverage)
    }

    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            max_weight: self.optimizer.max_weight,
            max_evaluations: self.optimizer.max_evaluations,
            restarts: self.optimizer.restarts,
            rng_seed: self.optimizer.rng_seed,
            tolerance: self.optimizer.tolerance,
        }
    }

    pub fn economic_columns(&self) -> EconomicColumns {
        EconomicColumns {
            date: self.data.date_column.clone(),
            gdp: self.data.gdp_column.clone(),
            inflation: self.data.inflation_column.clone(),
        }
    }

    pub fn returns_csv_config(&self) -> ReturnsCsvConfig {
        ReturnsCsvConfig {
            date_column: self.data.returns_date_column.clone(),
            scale: self.data.returns_scale,
        }
    }

    /// Convert to the engine's runtime configuration.
    pub fn to_engine_config(&self) -> Result<EngineConfig> {
        let config = EngineConfig {
            trend_rule: self.trend_rule()?,
            universe: self.universe_filter()?,
            optimizer: self.optimizer_config(),
            methods: self.optimizer.methods.clone(),
            periods: self.periods.clone(),
            show_progress: self.output.show_progress,
        };
        config.validate()?;
        Ok(config)
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# Regime allocator configuration

[data]
economic_path = "data/economic.csv"
returns_path = "data/returns.csv"
date_column = "Date"
gdp_column = "US_GDP_QoQ_Ann"
inflation_column = "PCE_Prices"
# returns_date_column = "Date"
returns_scale = "fraction"   # or "percent"

[classifier]
smoothing_window = 3   # trailing mean length
lookback = 3           # months between compared smoothed values

[universe]
min_observations = 5
min_coverage = 0.6

[optimizer]
max_weight = 0.25
methods = ["sharpe", "sortino"]
max_evaluations = 20000
restarts = 8
rng_seed = 42
tolerance = 1e-9

[output]
directory = "output"
min_reported_weight = 0.001
write_json = true
show_progress = true

# Without [[periods]] the whole history is one period named "full".
# [[periods]]
# name = "pre"
# end = "2019-12"
# exclude_assets = ["NEWFUND"]
#
# [[periods]]
# name = "post"
# start = "2020-01"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::YearMonth;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AllocationFileConfig::default();
        assert_eq!(config.optimizer.max_weight, 0.25);
        assert_eq!(config.optimizer.methods, vec![RatioMethod::Sharpe, RatioMethod::Sortino]);
        assert_eq!(config.data.gdp_column, "US_GDP_QoQ_Ann");
        assert!(config.periods.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config() {
        let toml_content = r#"
[data]
economic_path = "econ.csv"
returns_path = "returns.csv"
returns_scale = "percent"

[classifier]
lookback = 1
smoothing_window = 1

[optimizer]
max_weight = 0.5
methods = ["sortino"]
rng_seed = 7

[[periods]]
name = "pre"
end = "2019-12"
exclude_assets = ["NEWFUND"]

[[periods]]
name = "post"
start = "2020-01"
"#;
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", toml_content).unwrap();

        let config = AllocationFileConfig::load(file.path()).unwrap();
        assert_eq!(config.data.returns_scale, ValueScale::Percent);
        assert_eq!(config.trend_rule().unwrap(), TrendRule::previous_observation());
        assert_eq!(config.optimizer.methods, vec![RatioMethod::Sortino]);
        assert_eq!(config.optimizer.rng_seed, Some(7));
        assert_eq!(config.universe.min_observations, 5);
        assert_eq!(config.periods.len(), 2);
        assert_eq!(config.periods[0].end, Some(YearMonth::new(2019, 12).unwrap()));
        assert_eq!(config.periods[0].exclude_assets, vec!["NEWFUND"]);
        assert_eq!(config.periods[1].start, Some(YearMonth::new(2020, 1).unwrap()));
    }

    #[test]
    fn test_to_engine_config() {
        let file_config = AllocationFileConfig {
            optimizer: OptimizerSettings {
                max_weight: 0.4,
                restarts: 2,
                rng_seed: Some(3),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = file_config.to_engine_config().unwrap();
        assert_eq!(config.optimizer.max_weight, 0.4);
        assert_eq!(config.optimizer.restarts, 2);
        assert_eq!(config.optimizer.rng_seed, Some(3));
        assert_eq!(config.methods.len(), 2);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AllocationFileConfig::default();
        config.optimizer.max_weight = 0.0;
        assert!(config.validate().is_err());

        let mut config = AllocationFileConfig::default();
        config.universe.min_coverage = 2.0;
        assert!(config.validate().is_err());

        let mut config = AllocationFileConfig::default();
        config.classifier.lookback = 0;
        assert!(config.validate().is_err());

        let mut config = AllocationFileConfig::default();
        config.output.min_reported_weight = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_method_rejected() {
        let result: std::result::Result<AllocationFileConfig, _> =
            toml::from_str("[optimizer]\nmethods = [\"calmar\"]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_config() {
        let mut config = AllocationFileConfig::default();
        config.periods.push(AnalysisPeriod::full());
        let file = NamedTempFile::new().unwrap();
        config.save(file.path()).unwrap();

        let loaded = AllocationFileConfig::load(file.path()).unwrap();
        assert_eq!(loaded.optimizer.max_weight, config.optimizer.max_weight);
        assert_eq!(loaded.periods.len(), 1);
    }

    #[test]
    fn test_example_config() {
        let example = AllocationFileConfig::example();
        let config: AllocationFileConfig = toml::from_str(&example).unwrap();
        assert_eq!(config.optimizer.rng_seed, Some(42));
        assert!((config.output.min_reported_weight - 0.001).abs() < 1e-12);
        assert!(config.validate().is_ok());
    }
}

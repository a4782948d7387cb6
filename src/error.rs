//! Error types for regime classification and allocation.

use crate::types::YearMonth;
use thiserror::Error;

/// Main error type for the allocator.
#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("Data gap: no observation between {start} and {end}")]
    DataGap { start: YearMonth, end: YearMonth },

    #[error("Infeasible constraints: {candidates} candidates x max weight {max_weight} < 1.0")]
    InfeasibleConstraint { candidates: usize, max_weight: f64 },

    #[error("Optimization did not converge within {evaluations} objective evaluations")]
    OptimizationDidNotConverge { evaluations: usize },

    #[error("Insufficient observations: {observed} available, {required} required")]
    InsufficientObservations { observed: usize, required: usize },

    #[error("Too few candidate assets: {candidates} (need at least 2)")]
    TooFewCandidates { candidates: usize },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Optimization error: {0}")]
    OptimizationError(String),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),
}

impl AllocationError {
    /// Whether the error only affects a single (regime, method) job.
    ///
    /// Regime-local errors are recorded as unoptimizable entries in the
    /// report; everything else aborts the run.
    pub fn is_regime_local(&self) -> bool {
        matches!(
            self,
            AllocationError::InfeasibleConstraint { .. }
                | AllocationError::InsufficientObservations { .. }
                | AllocationError::TooFewCandidates { .. }
                | AllocationError::OptimizationDidNotConverge { .. }
                | AllocationError::OptimizationError(_)
        )
    }
}

/// Short remediation hints for command-line output.
pub trait ErrorHelp {
    /// One-line hint on how to fix the error, if there is one.
    fn help(&self) -> Option<&'static str>;
}

impl ErrorHelp for AllocationError {
    fn help(&self) -> Option<&'static str> {
        match self {
            AllocationError::DataGap { .. } => {
                Some("fill the missing months upstream or narrow the analysis period")
            }
            AllocationError::InfeasibleConstraint { .. } => {
                Some("raise max_weight or lower the universe thresholds")
            }
            AllocationError::OptimizationDidNotConverge { .. } => {
                Some("raise optimizer.max_evaluations")
            }
            AllocationError::InsufficientObservations { .. } => {
                Some("lower universe.min_observations or extend the history")
            }
            AllocationError::TooFewCandidates { .. } => {
                Some("lower universe.min_coverage or universe.min_observations")
            }
            AllocationError::ConfigError(_) => Some("run `regime-allocator init` for a template"),
            AllocationError::CsvError(_) | AllocationError::DataError(_) => {
                Some("check column names and date formats of the input files")
            }
            _ => None,
        }
    }
}

/// Result type alias for allocator operations.
pub type Result<T> = std::result::Result<T, AllocationError>;

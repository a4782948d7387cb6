//! Regime Allocator - macroeconomic regime classification and per-regime
//! portfolio optimization.
//!
//! # Overview
//!
//! Every month of history is labelled with one of four regimes from the
//! direction of GDP growth and inflation. For each regime the monthly asset
//! returns observed in that regime are collected, assets with too little
//! history are filtered out, and long-only weights maximizing the Sharpe or
//! Sortino ratio are computed under a per-asset cap.
//!
//! - **Regime classification**: smoothed trend of GDP and inflation, ties count as rising
//! - **Universe filtering**: observation and coverage thresholds per regime
//! - **Constrained optimization**: SQP with Clarabel QP steps and seeded restarts
//! - **Analysis periods**: independent runs over named windows with per-period exclusions
//! - **Exports**: CSV, JSON and terminal tables
//!
//! # Quick Start
//!
//! ```no_run
//! use regime_allocator::{
//!     data::{load_economic_csv, load_returns_csv, EconomicColumns, ReturnsCsvConfig},
//!     engine::{AllocationEngine, EngineConfig},
//! };
//!
//! let economic = load_economic_csv("data/economic.csv", &EconomicColumns::default()).unwrap();
//! let returns = load_returns_csv("data/returns.csv", &ReturnsCsvConfig::default()).unwrap();
//!
//! let engine = AllocationEngine::new(EngineConfig::default()).unwrap();
//! let report = engine.run(&economic, &returns).unwrap();
//!
//! for entry in report.sorted_by_ratio() {
//!     if let Some(allocation) = entry.outcome.allocation() {
//!         println!("{} / {}: {:.3}", entry.regime, entry.method, allocation.risk_ratio);
//!     }
//! }
//! ```
//!
//! # Optimizing a single regime
//!
//! ```
//! use regime_allocator::optimizer::{OptimizerConfig, RiskRatioOptimizer};
//! use regime_allocator::types::{RatioMethod, RegimeLabel};
//! use regime_allocator::universe::SubMatrix;
//!
//! let sub = SubMatrix::from_columns(
//!     vec!["BONDS".to_string(), "STOCKS".to_string()],
//!     vec![
//!         vec![0.004, 0.006, -0.002, 0.005, 0.003, 0.001],
//!         vec![0.020, -0.015, 0.030, 0.010, -0.005, 0.025],
//!     ],
//! )
//! .unwrap();
//!
//! let optimizer = RiskRatioOptimizer::new(OptimizerConfig {
//!     max_weight: 0.8,
//!     rng_seed: Some(42),
//!     ..Default::default()
//! })
//! .unwrap();
//! let allocation = optimizer
//!     .optimize(RegimeLabel::RisingGrowthFallingInflation, &sub, RatioMethod::Sharpe)
//!     .unwrap();
//! assert!((allocation.weight_sum() - 1.0).abs() < 1e-6);
//! ```

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod export;
pub mod optimizer;
pub mod regime;
pub mod regime_index;
pub mod report;
pub mod types;
pub mod universe;

// Re-exports for convenience
pub use config::AllocationFileConfig;
pub use engine::{AllocationEngine, AnalysisPeriod, EngineConfig};
pub use error::{AllocationError, ErrorHelp, Result};
pub use optimizer::{
    portfolio_metrics, project_to_capped_simplex, OptimizerConfig, PortfolioMetrics,
    RegimeAllocation, RiskRatioOptimizer, SolveStatus,
};
pub use regime::{ClassifiedMonth, RegimeClassifier, RegimeStats, TrendRule};
pub use regime_index::RegimeIndex;
pub use report::{AllocationOutcome, AllocationReport, ReportEntry};
pub use types::{DateWindow, EconomicObservation, RatioMethod, RegimeLabel, YearMonth};
pub use universe::{SubMatrix, UniverseFilter, UniverseSelection};

// Data handling re-exports
pub use data::{
    load_economic_csv, load_returns_csv, DataQualityReport, EconomicColumns, ReturnMatrix,
    ReturnSeries, ReturnsCsvConfig, ValueScale,
};

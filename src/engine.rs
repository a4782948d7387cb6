//! Allocation engine: classification, universe selection and optimization
//! for every analysis period.

use crate::data::ReturnMatrix;
use crate::error::{AllocationError, Result};
use crate::optimizer::{OptimizerConfig, RiskRatioOptimizer};
use crate::regime::{RegimeClassifier, RegimeStats, TrendRule};
use crate::regime_index::RegimeIndex;
use crate::report::{
    AllocationOutcome, AllocationReport, PeriodSummary, RegimeDiagnostics, ReportEntry,
};
use crate::types::{DateWindow, EconomicObservation, RatioMethod, RegimeLabel, YearMonth};
use crate::universe::{UniverseFilter, UniverseSelection};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Name of the implicit period used when none is configured.
pub const FULL_PERIOD: &str = "full";

/// A named slice of history analysed on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisPeriod {
    pub name: String,
    /// First month (inclusive); `None` starts at the first available month.
    #[serde(default)]
    pub start: Option<YearMonth>,
    /// Last month (inclusive); `None` runs to the last available month.
    #[serde(default)]
    pub end: Option<YearMonth>,
    /// Assets left out of this period.
    #[serde(default)]
    pub exclude_assets: Vec<String>,
}

impl AnalysisPeriod {
    pub fn full() -> Self {
        Self {
            name: FULL_PERIOD.to_string(),
            start: None,
            end: None,
            exclude_assets: Vec::new(),
        }
    }

    pub fn window(&self) -> DateWindow {
        DateWindow::new(self.start, self.end)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AllocationError::ConfigError(
                "Analysis period name must not be empty".to_string(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                return Err(AllocationError::ConfigError(format!(
                    "Period '{}' ends ({}) before it starts ({})",
                    self.name, end, start
                )));
            }
        }
        Ok(())
    }
}

/// Runtime configuration of an allocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub trend_rule: TrendRule,
    pub universe: UniverseFilter,
    pub optimizer: OptimizerConfig,
    pub methods: Vec<RatioMethod>,
    /// Empty means a single period over all data.
    pub periods: Vec<AnalysisPeriod>,
    /// Show a progress bar over optimization jobs.
    pub show_progress: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trend_rule: TrendRule::default(),
            universe: UniverseFilter::default(),
            optimizer: OptimizerConfig::default(),
            methods: RatioMethod::ALL.to_vec(),
            periods: Vec::new(),
            show_progress: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        self.trend_rule.validate()?;
        self.universe.validate()?;
        self.optimizer.validate()?;
        if self.methods.is_empty() {
            return Err(AllocationError::ConfigError(
                "At least one ratio method is required".to_string(),
            ));
        }
        for (i, period) in self.periods.iter().enumerate() {
            period.validate()?;
            if self.periods[..i].iter().any(|p| p.name == period.name) {
                return Err(AllocationError::ConfigError(format!(
                    "Duplicate analysis period '{}'",
                    period.name
                )));
            }
        }
        Ok(())
    }

    /// Configured periods, or the implicit full period.
    pub fn effective_periods(&self) -> Vec<AnalysisPeriod> {
        if self.periods.is_empty() {
            vec![AnalysisPeriod::full()]
        } else {
            self.periods.clone()
        }
    }
}

/// One (regime, method) optimization job.
struct Job<'a> {
    regime: RegimeLabel,
    method: RatioMethod,
    selection: std::result::Result<&'a UniverseSelection, String>,
}

/// Runs the whole pipeline over in-memory inputs.
pub struct AllocationEngine {
    config: EngineConfig,
    classifier: RegimeClassifier,
    optimizer: RiskRatioOptimizer,
}

impl AllocationEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let classifier = RegimeClassifier::new(config.trend_rule);
        let optimizer = RiskRatioOptimizer::new(config.optimizer)?;
        Ok(Self {
            config,
            classifier,
            optimizer,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Classify, filter and optimize every period.
    ///
    /// A data gap in any period window aborts the run. Errors that only
    /// concern one (regime, method) pair become unoptimizable entries.
    pub fn run(
        &self,
        economic: &[EconomicObservation],
        returns: &ReturnMatrix,
    ) -> Result<AllocationReport> {
        let mut report = AllocationReport::new(self.config.optimizer.max_weight);
        for period in self.config.effective_periods() {
            self.run_period(&period, economic, returns, &mut report)?;
        }

        info!(
            "Allocation run complete: {} optimized, {} skipped, {} approximate",
            report.optimized_count(),
            report.skipped().len(),
            report.approximate().len()
        );
        Ok(report)
    }

    fn run_period(
        &self,
        period: &AnalysisPeriod,
        economic: &[EconomicObservation],
        returns: &ReturnMatrix,
        report: &mut AllocationReport,
    ) -> Result<()> {
        let window = period.window();
        returns.check_continuity(&window)?;
        let classified = self.classifier.classify_within(economic, &window)?;
        let matrix = returns
            .restrict(&window)
            .without_assets(&period.exclude_assets)?;
        let index = RegimeIndex::build(&classified, matrix.dates());
        let stats = RegimeStats::from_months(&classified);

        info!(
            "Period '{}': {} classified months, {} aligned with returns, {} assets",
            period.name,
            classified.len(),
            index.len(),
            matrix.n_assets()
        );
        if index.unaligned() > 0 {
            debug!(
                "Period '{}': {} classified months have no return row",
                period.name,
                index.unaligned()
            );
        }

        let mut selections = Vec::with_capacity(RegimeLabel::ALL.len());
        for (regime, dates) in index.partition() {
            let (diagnostics, selection) = self.config.universe.filter_with_diagnostics(&matrix, &dates);
            report.diagnostics.push(RegimeDiagnostics {
                period: period.name.clone(),
                regime,
                universe: diagnostics,
            });
            let selection = match selection {
                Ok(s) => Ok(s),
                Err(e) if e.is_regime_local() => {
                    warn!("Period '{}', {}: {}", period.name, regime, e);
                    Err(e.to_string())
                }
                Err(e) => return Err(e),
            };
            selections.push((regime, selection));
        }

        let jobs: Vec<Job> = selections
            .iter()
            .flat_map(|(regime, selection)| {
                self.config.methods.iter().map(move |method| Job {
                    regime: *regime,
                    method: *method,
                    selection: selection.as_ref().map_err(|e| e.clone()),
                })
            })
            .collect();

        let progress = if self.config.show_progress {
            let pb = ProgressBar::new(jobs.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message(period.name.clone());
            Some(pb)
        } else {
            None
        };

        let outcomes: Vec<AllocationOutcome> = jobs
            .par_iter()
            .map(|job| {
                let outcome = self.run_job(job);
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                outcome
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(pb) = progress {
            pb.finish_and_clear();
        }

        for (job, outcome) in jobs.iter().zip(outcomes) {
            report.entries.push(ReportEntry {
                period: period.name.clone(),
                regime: job.regime,
                method: job.method,
                outcome,
            });
        }

        report.periods.push(PeriodSummary {
            name: period.name.clone(),
            start: period.start,
            end: period.end,
            classified_months: classified.len(),
            aligned_months: index.len(),
            regime_counts: stats.counts,
            excluded_assets: period.exclude_assets.clone(),
        });
        Ok(())
    }

    fn run_job(&self, job: &Job) -> Result<AllocationOutcome> {
        let selection = match &job.selection {
            Ok(selection) => *selection,
            Err(reason) => {
                return Ok(AllocationOutcome::Unoptimizable {
                    reason: reason.clone(),
                })
            }
        };

        match self
            .optimizer
            .optimize(job.regime, &selection.sub_matrix, job.method)
        {
            Ok(allocation) => {
                debug!(
                    "{} / {}: ratio {:.4} over {} months with {} assets",
                    job.regime,
                    job.method,
                    allocation.risk_ratio,
                    allocation.observation_count,
                    allocation.assets_used.len()
                );
                Ok(AllocationOutcome::Optimized(allocation))
            }
            Err(e) if e.is_regime_local() => {
                warn!("{} / {}: {}", job.regime, job.method, e);
                Ok(AllocationOutcome::Unoptimizable {
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

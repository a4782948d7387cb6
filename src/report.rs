//! Allocation results per (period, regime, method).

use crate::error::{AllocationError, Result};
use crate::optimizer::{RegimeAllocation, SolveStatus, SUM_TOLERANCE};
use crate::types::{RatioMethod, RegimeLabel, YearMonth};
use crate::universe::UniverseDiagnostics;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Result of one (regime, method) job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AllocationOutcome {
    Optimized(RegimeAllocation),
    /// The regime could not be optimized; `reason` is the error message.
    Unoptimizable { reason: String },
}

impl AllocationOutcome {
    pub fn allocation(&self) -> Option<&RegimeAllocation> {
        match self {
            AllocationOutcome::Optimized(a) => Some(a),
            AllocationOutcome::Unoptimizable { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            AllocationOutcome::Optimized(_) => None,
            AllocationOutcome::Unoptimizable { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub period: String,
    pub regime: RegimeLabel,
    pub method: RatioMethod,
    pub outcome: AllocationOutcome,
}

impl ReportEntry {
    pub fn risk_ratio(&self) -> Option<f64> {
        self.outcome.allocation().map(|a| a.risk_ratio)
    }
}

/// Universe filter diagnostics for one (period, regime) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeDiagnostics {
    pub period: String,
    pub regime: RegimeLabel,
    #[serde(flatten)]
    pub universe: UniverseDiagnostics,
}

/// What an analysis period covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub name: String,
    pub start: Option<YearMonth>,
    pub end: Option<YearMonth>,
    /// Months with a regime label.
    pub classified_months: usize,
    /// Classified months that also have a return row.
    pub aligned_months: usize,
    pub regime_counts: BTreeMap<RegimeLabel, usize>,
    pub excluded_assets: Vec<String>,
}

/// One exported weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightRow {
    pub period: String,
    pub regime: RegimeLabel,
    pub method: RatioMethod,
    pub asset: String,
    pub weight: f64,
}

/// One exported summary line; metric fields are empty for skipped entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub period: String,
    pub regime: RegimeLabel,
    pub method: RatioMethod,
    pub status: String,
    pub expected_return: Option<f64>,
    pub risk: Option<f64>,
    pub risk_ratio: Option<f64>,
    pub observation_count: Option<usize>,
    pub assets_used: Option<usize>,
    pub reason: Option<String>,
}

/// Full output of an allocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub max_weight: f64,
    pub periods: Vec<PeriodSummary>,
    /// Ordered by period, regime, method.
    pub entries: Vec<ReportEntry>,
    pub diagnostics: Vec<RegimeDiagnostics>,
}

impl AllocationReport {
    pub fn new(max_weight: f64) -> Self {
        Self {
            max_weight,
            periods: Vec::new(),
            entries: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn entry(&self, period: &str, regime: RegimeLabel, method: RatioMethod) -> Option<&ReportEntry> {
        self.entries
            .iter()
            .find(|e| e.period == period && e.regime == regime && e.method == method)
    }

    pub fn allocation(
        &self,
        period: &str,
        regime: RegimeLabel,
        method: RatioMethod,
    ) -> Option<&RegimeAllocation> {
        self.entry(period, regime, method)
            .and_then(|e| e.outcome.allocation())
    }

    pub fn diagnostics_for(&self, period: &str, regime: RegimeLabel) -> Option<&UniverseDiagnostics> {
        self.diagnostics
            .iter()
            .find(|d| d.period == period && d.regime == regime)
            .map(|d| &d.universe)
    }

    /// Entries by descending risk ratio, unoptimizable entries last.
    pub fn sorted_by_ratio(&self) -> Vec<&ReportEntry> {
        let mut sorted: Vec<&ReportEntry> = self.entries.iter().collect();
        sorted.sort_by(|a, b| match (a.risk_ratio(), b.risk_ratio()) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        sorted
    }

    pub fn skipped(&self) -> Vec<&ReportEntry> {
        self.entries
            .iter()
            .filter(|e| e.outcome.allocation().is_none())
            .collect()
    }

    /// Entries that stopped on the evaluation budget.
    pub fn approximate(&self) -> Vec<&ReportEntry> {
        self.entries
            .iter()
            .filter(|e| {
                e.outcome
                    .allocation()
                    .is_some_and(|a| a.status == SolveStatus::Approximate)
            })
            .collect()
    }

    pub fn optimized_count(&self) -> usize {
        self.entries.len() - self.skipped().len()
    }

    /// One row per candidate asset of every optimized entry.
    pub fn weight_rows(&self) -> Vec<WeightRow> {
        self.entries
            .iter()
            .filter_map(|e| e.outcome.allocation().map(|a| (e, a)))
            .flat_map(|(e, a)| {
                a.weights.iter().map(move |(asset, weight)| WeightRow {
                    period: e.period.clone(),
                    regime: e.regime,
                    method: e.method,
                    asset: asset.clone(),
                    weight: *weight,
                })
            })
            .collect()
    }

    pub fn summary_rows(&self) -> Vec<SummaryRow> {
        self.entries
            .iter()
            .map(|e| match &e.outcome {
                AllocationOutcome::Optimized(a) => SummaryRow {
                    period: e.period.clone(),
                    regime: e.regime,
                    method: e.method,
                    status: a.status.to_string(),
                    expected_return: Some(a.expected_return),
                    risk: Some(a.risk),
                    risk_ratio: Some(a.risk_ratio),
                    observation_count: Some(a.observation_count),
                    assets_used: Some(a.assets_used.len()),
                    reason: None,
                },
                AllocationOutcome::Unoptimizable { reason } => SummaryRow {
                    period: e.period.clone(),
                    regime: e.regime,
                    method: e.method,
                    status: "unoptimizable".to_string(),
                    expected_return: None,
                    risk: None,
                    risk_ratio: None,
                    observation_count: None,
                    assets_used: None,
                    reason: Some(reason.clone()),
                },
            })
            .collect()
    }

    /// Check every optimized allocation against the weight constraints.
    pub fn validate(&self, max_weight: f64) -> Result<()> {
        for entry in &self.entries {
            let Some(allocation) = entry.outcome.allocation() else {
                continue;
            };
            let sum = allocation.weight_sum();
            if (sum - 1.0).abs() > SUM_TOLERANCE {
                return Err(AllocationError::InvalidInput(format!(
                    "{} / {} / {}: weights sum to {:.8}",
                    entry.period, entry.regime, entry.method, sum
                )));
            }
            if let Some((asset, w)) = allocation
                .weights
                .iter()
                .find(|(_, w)| **w < 0.0 || **w > max_weight + SUM_TOLERANCE)
            {
                return Err(AllocationError::InvalidInput(format!(
                    "{} / {} / {}: weight {:.8} for {} outside [0, {}]",
                    entry.period, entry.regime, entry.method, w, asset, max_weight
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn allocation(regime: RegimeLabel, weights: &[(&str, f64)], ratio: f64) -> RegimeAllocation {
        RegimeAllocation {
            regime,
            method: RatioMethod::Sharpe,
            weights: weights.iter().map(|(a, w)| (a.to_string(), *w)).collect(),
            expected_return: 0.01,
            risk: 0.02,
            risk_ratio: ratio,
            observation_count: 12,
            assets_used: weights
                .iter()
                .filter(|(_, w)| *w > 0.0)
                .map(|(a, _)| a.to_string())
                .collect::<BTreeSet<_>>(),
            status: SolveStatus::Converged,
            evaluations: 100,
        }
    }

    fn sample_report() -> AllocationReport {
        let mut report = AllocationReport::new(0.6);
        report.entries.push(ReportEntry {
            period: "full".to_string(),
            regime: RegimeLabel::RisingGrowthFallingInflation,
            method: RatioMethod::Sharpe,
            outcome: AllocationOutcome::Optimized(allocation(
                RegimeLabel::RisingGrowthFallingInflation,
                &[("A", 0.4), ("B", 0.6)],
                0.5,
            )),
        });
        report.entries.push(ReportEntry {
            period: "full".to_string(),
            regime: RegimeLabel::RisingGrowthRisingInflation,
            method: RatioMethod::Sharpe,
            outcome: AllocationOutcome::Unoptimizable {
                reason: "Too few candidate assets: 1 (need at least 2)".to_string(),
            },
        });
        let mut approx = allocation(
            RegimeLabel::SlowingGrowthFallingInflation,
            &[("A", 0.5), ("B", 0.5), ("C", 0.0)],
            0.9,
        );
        approx.status = SolveStatus::Approximate;
        report.entries.push(ReportEntry {
            period: "full".to_string(),
            regime: RegimeLabel::SlowingGrowthFallingInflation,
            method: RatioMethod::Sharpe,
            outcome: AllocationOutcome::Optimized(approx),
        });
        report
    }

    #[test]
    fn test_sorted_by_ratio() {
        let report = sample_report();
        let sorted = report.sorted_by_ratio();
        assert_eq!(sorted[0].regime, RegimeLabel::SlowingGrowthFallingInflation);
        assert_eq!(sorted[1].regime, RegimeLabel::RisingGrowthFallingInflation);
        assert!(sorted[2].risk_ratio().is_none());
    }

    #[test]
    fn test_skipped_and_approximate() {
        let report = sample_report();
        assert_eq!(report.skipped().len(), 1);
        assert_eq!(report.approximate().len(), 1);
        assert_eq!(report.optimized_count(), 2);
    }

    #[test]
    fn test_weight_rows_include_zero_weights() {
        let rows = sample_report().weight_rows();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().any(|r| r.asset == "C" && r.weight == 0.0));
    }

    #[test]
    fn test_summary_rows_carry_reason() {
        let rows = sample_report().summary_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].status, "unoptimizable");
        assert!(rows[1].reason.as_deref().unwrap().contains("Too few"));
        assert_eq!(rows[2].status, "approximate");
        assert_eq!(rows[0].assets_used, Some(2));
    }

    #[test]
    fn test_validate_detects_violations() {
        let report = sample_report();
        assert!(report.validate(0.6).is_ok());
        assert!(report.validate(0.5).is_err());

        let mut broken = AllocationReport::new(0.6);
        broken.entries.push(ReportEntry {
            period: "full".to_string(),
            regime: RegimeLabel::RisingGrowthFallingInflation,
            method: RatioMethod::Sortino,
            outcome: AllocationOutcome::Optimized(allocation(
                RegimeLabel::RisingGrowthFallingInflation,
                &[("A", 0.4), ("B", 0.4)],
                1.0,
            )),
        });
        assert!(broken.validate(0.6).is_err());
    }

    #[test]
    fn test_lookup() {
        let report = sample_report();
        assert!(report
            .allocation("full", RegimeLabel::RisingGrowthFallingInflation, RatioMethod::Sharpe)
            .is_some());
        assert!(report
            .allocation("full", RegimeLabel::RisingGrowthRisingInflation, RatioMethod::Sharpe)
            .is_none());
        assert!(report
            .entry("other", RegimeLabel::RisingGrowthFallingInflation, RatioMethod::Sharpe)
            .is_none());
    }
}

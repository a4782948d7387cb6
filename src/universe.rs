//! Candidate asset selection per regime.
//!
//! An asset is a candidate for a regime when it has at least
//! `min_observations` returns inside the regime's months and at least
//! `min_coverage` non-missing share over the whole matrix window. Rows of
//! the resulting sub-matrix need two usable candidates to be kept.

use crate::data::ReturnMatrix;
use crate::error::{AllocationError, Result};
use crate::types::YearMonth;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Minimum number of candidates for a meaningful optimization.
pub const MIN_CANDIDATES: usize = 2;

/// Asset x date returns fed to the optimizer, stored row-major.
///
/// A `None` cell is excluded from that date's portfolio return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubMatrix {
    assets: Vec<String>,
    dates: Vec<YearMonth>,
    rows: Vec<Vec<Option<f64>>>,
}

impl SubMatrix {
    pub fn new(
        assets: Vec<String>,
        dates: Vec<YearMonth>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if rows.len() != dates.len() {
            return Err(AllocationError::InvalidInput(format!(
                "{} rows for {} dates",
                rows.len(),
                dates.len()
            )));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != assets.len()) {
            return Err(AllocationError::InvalidInput(format!(
                "Row has {} values for {} assets",
                row.len(),
                assets.len()
            )));
        }
        if rows.iter().flatten().flatten().any(|v| !v.is_finite()) {
            return Err(AllocationError::DataError(
                "Sub-matrix contains non-finite returns".to_string(),
            ));
        }
        Ok(Self {
            assets,
            dates,
            rows,
        })
    }

    /// Build a complete sub-matrix from per-asset columns of equal length.
    ///
    /// Months are numbered from January 2000.
    pub fn from_columns(assets: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self> {
        if assets.len() != columns.len() {
            return Err(AllocationError::InvalidInput(format!(
                "{} assets but {} columns",
                assets.len(),
                columns.len()
            )));
        }
        let n_dates = columns.first().map_or(0, |c| c.len());
        if columns.iter().any(|c| c.len() != n_dates) {
            return Err(AllocationError::InvalidInput(
                "Columns must have equal length".to_string(),
            ));
        }

        let mut dates = Vec::with_capacity(n_dates);
        let mut date = YearMonth::new(2000, 1)?;
        for _ in 0..n_dates {
            dates.push(date);
            date = date.succ();
        }
        let rows = (0..n_dates)
            .map(|d| columns.iter().map(|c| Some(c[d])).collect())
            .collect();
        Self::new(assets, dates, rows)
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn dates(&self) -> &[YearMonth] {
        &self.dates
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn n_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn row(&self, date_idx: usize) -> &[Option<f64>] {
        &self.rows[date_idx]
    }

    /// Portfolio return per date for the given weights.
    pub fn portfolio_returns(&self, weights: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(weights)
                    .filter_map(|(r, w)| r.map(|r| r * w))
                    .sum()
            })
            .collect()
    }
}

/// Per-regime record of what the filter removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniverseDiagnostics {
    /// Regime months present in the return matrix.
    pub regime_dates: usize,
    /// Assets examined.
    pub assets_considered: usize,
    /// Assets below the coverage threshold over the full window.
    pub excluded_for_coverage: Vec<String>,
    /// Assets below the observation threshold inside the regime.
    pub excluded_for_observations: Vec<String>,
    /// Regime months dropped because fewer than two candidates had returns.
    pub dates_dropped_for_insufficient_assets: usize,
}

/// Candidates and retained rows for one regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseSelection {
    pub candidate_assets: Vec<String>,
    pub date_subset: Vec<YearMonth>,
    pub sub_matrix: SubMatrix,
    pub diagnostics: UniverseDiagnostics,
}

/// Observation and coverage thresholds for candidate assets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniverseFilter {
    pub min_observations: usize,
    pub min_coverage: f64,
}

impl Default for UniverseFilter {
    fn default() -> Self {
        Self {
            min_observations: 5,
            min_coverage: 0.6,
        }
    }
}

impl UniverseFilter {
    pub fn new(min_observations: usize, min_coverage: f64) -> Result<Self> {
        let filter = Self {
            min_observations,
            min_coverage,
        };
        filter.validate()?;
        Ok(filter)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_observations == 0 {
            return Err(AllocationError::ConfigError(
                "min_observations must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(AllocationError::ConfigError(format!(
                "min_coverage must be in [0, 1], got {}",
                self.min_coverage
            )));
        }
        Ok(())
    }

    /// Select candidates and rows for a regime's months.
    pub fn filter(&self, returns: &ReturnMatrix, dates: &[YearMonth]) -> Result<UniverseSelection> {
        self.filter_with_diagnostics(returns, dates).1
    }

    /// Like [`filter`](Self::filter), also returning diagnostics when the
    /// regime is rejected.
    pub fn filter_with_diagnostics(
        &self,
        returns: &ReturnMatrix,
        dates: &[YearMonth],
    ) -> (UniverseDiagnostics, Result<UniverseSelection>) {
        let mut diagnostics = UniverseDiagnostics {
            assets_considered: returns.n_assets(),
            ..Default::default()
        };
        if let Err(e) = self.validate() {
            return (diagnostics, Err(e));
        }

        let regime_rows: Vec<usize> = dates.iter().filter_map(|d| returns.date_index(d)).collect();
        diagnostics.regime_dates = regime_rows.len();
        if regime_rows.len() < self.min_observations {
            return (
                diagnostics,
                Err(AllocationError::InsufficientObservations {
                    observed: regime_rows.len(),
                    required: self.min_observations,
                }),
            );
        }

        let mut candidates = Vec::new();
        for (asset_idx, asset) in returns.assets().iter().enumerate() {
            if returns.coverage(asset_idx) < self.min_coverage {
                diagnostics.excluded_for_coverage.push(asset.clone());
                continue;
            }
            let observed = regime_rows
                .iter()
                .filter(|&&d| returns.value(asset_idx, d).is_some())
                .count();
            if observed < self.min_observations {
                diagnostics.excluded_for_observations.push(asset.clone());
                continue;
            }
            candidates.push(asset_idx);
        }

        if candidates.len() < MIN_CANDIDATES {
            return (
                diagnostics,
                Err(AllocationError::TooFewCandidates {
                    candidates: candidates.len(),
                }),
            );
        }

        let mut date_subset = Vec::new();
        let mut rows = Vec::new();
        for &d in &regime_rows {
            let row: Vec<Option<f64>> = candidates.iter().map(|&a| returns.value(a, d)).collect();
            if row.iter().filter(|v| v.is_some()).count() < MIN_CANDIDATES {
                diagnostics.dates_dropped_for_insufficient_assets += 1;
                continue;
            }
            date_subset.push(returns.dates()[d]);
            rows.push(row);
        }

        if date_subset.len() < self.min_observations {
            return (
                diagnostics,
                Err(AllocationError::InsufficientObservations {
                    observed: date_subset.len(),
                    required: self.min_observations,
                }),
            );
        }

        let candidate_assets: Vec<String> = candidates
            .iter()
            .map(|&a| returns.assets()[a].clone())
            .collect();
        debug!(
            "Universe: {} of {} assets, {} of {} months retained",
            candidate_assets.len(),
            returns.n_assets(),
            date_subset.len(),
            regime_rows.len()
        );

        let sub_matrix = match SubMatrix::new(candidate_assets.clone(), date_subset.clone(), rows) {
            Ok(m) => m,
            Err(e) => return (diagnostics, Err(e)),
        };
        let selection = UniverseSelection {
            candidate_assets,
            date_subset,
            sub_matrix,
            diagnostics: diagnostics.clone(),
        };
        (diagnostics, Ok(selection))
    }
}

//! Macroeconomic regime classification.
//!
//! Each month is assigned one of four regimes from the direction of two
//! indicators: GDP growth and inflation. The direction of an indicator is
//! the sign of the change of its trailing mean over a fixed lookback:
//!
//! ```text
//! smoothed(t) = mean(x[t - w + 1 ..= t])      (fewer points at series start)
//! trend(t)    = smoothed(t) - smoothed(t - lookback)
//! rising      = trend(t) >= 0
//! ```
//!
//! A zero trend counts as rising. The first `lookback` months of the
//! series have no prior value and are left out of the output.
//!
//! # Example
//!
//! ```ignore
//! use regime_allocator::regime::{RegimeClassifier, TrendRule};
//!
//! let classifier = RegimeClassifier::new(TrendRule::default());
//! let months = classifier.classify(&observations)?;
//! for month in &months {
//!     println!("{}: {}", month.date, month.label);
//! }
//! ```

use crate::data::{ensure_monthly, validate_economic_series};
use crate::error::{AllocationError, Result};
use crate::types::{
    DateWindow, EconomicObservation, GrowthDirection, InflationDirection, RegimeLabel, YearMonth,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Trend rule shared by both indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendRule {
    /// Trailing mean window used to smooth the raw indicator.
    pub smoothing_window: usize,
    /// Distance in months between the compared smoothed values.
    pub lookback: usize,
}

impl Default for TrendRule {
    fn default() -> Self {
        Self {
            smoothing_window: 3,
            lookback: 3,
        }
    }
}

impl TrendRule {
    pub fn new(smoothing_window: usize, lookback: usize) -> Result<Self> {
        let rule = Self {
            smoothing_window,
            lookback,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Compare each month to the previous one, without smoothing.
    pub fn previous_observation() -> Self {
        Self {
            smoothing_window: 1,
            lookback: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.smoothing_window == 0 {
            return Err(AllocationError::InvalidInput(
                "Smoothing window must be at least 1".to_string(),
            ));
        }
        if self.lookback == 0 {
            return Err(AllocationError::InvalidInput(
                "Trend lookback must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Months before a date that feed its trend.
    pub fn history_months(&self) -> usize {
        self.lookback + self.smoothing_window - 1
    }

    /// Trend values for a series; `None` for the first `lookback` points.
    fn trends(&self, values: &[f64]) -> Vec<Option<f64>> {
        let smoothed = trailing_mean(values, self.smoothing_window);
        (0..values.len())
            .map(|i| {
                i.checked_sub(self.lookback)
                    .map(|prior| smoothed[i] - smoothed[prior])
            })
            .collect()
    }
}

/// Trailing mean with a partial window at the start of the series.
fn trailing_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= window {
            sum -= values[i - window];
        }
        let count = (i + 1).min(window);
        out.push(sum / count as f64);
    }
    out
}

fn growth_direction(trend: f64) -> GrowthDirection {
    if trend >= 0.0 {
        GrowthDirection::Rising
    } else {
        GrowthDirection::Slowing
    }
}

fn inflation_direction(trend: f64) -> InflationDirection {
    if trend >= 0.0 {
        InflationDirection::Rising
    } else {
        InflationDirection::Falling
    }
}

/// A classified month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedMonth {
    pub date: YearMonth,
    pub label: RegimeLabel,
    /// Change of the smoothed GDP measure over the lookback.
    pub growth_trend: f64,
    /// Change of the smoothed inflation measure over the lookback.
    pub inflation_trend: f64,
}

/// Regime classifier over an economic series.
#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    rule: TrendRule,
}

impl RegimeClassifier {
    pub fn new(rule: TrendRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &TrendRule {
        &self.rule
    }

    /// Classify every month of the series.
    pub fn classify(&self, series: &[EconomicObservation]) -> Result<Vec<ClassifiedMonth>> {
        self.classify_within(series, &DateWindow::unbounded())
    }

    /// Classify the months inside `window`.
    ///
    /// Trends draw on the months before the window as far back as the rule
    /// needs ([`TrendRule::history_months`]), so a window that starts after
    /// enough history is classified from its first month. A skipped month
    /// inside the window or its history fails with `DataGap`.
    pub fn classify_within(
        &self,
        series: &[EconomicObservation],
        window: &DateWindow,
    ) -> Result<Vec<ClassifiedMonth>> {
        self.rule.validate()?;
        validate_economic_series(series)?;

        let history = self.rule.history_months();
        let span = DateWindow::new(
            window.start.map(|start| (0..history).fold(start, |d, _| d.pred())),
            window.end,
        );
        let observations: Vec<&EconomicObservation> =
            series.iter().filter(|o| span.contains(&o.date)).collect();
        let dates: Vec<YearMonth> = observations.iter().map(|o| o.date).collect();
        ensure_monthly(&dates)?;

        let gdp: Vec<f64> = observations.iter().map(|o| o.gdp_qoq_annualized).collect();
        let inflation: Vec<f64> = observations.iter().map(|o| o.inflation_measure).collect();
        let gdp_trends = self.rule.trends(&gdp);
        let inflation_trends = self.rule.trends(&inflation);

        let months: Vec<ClassifiedMonth> = dates
            .iter()
            .zip(gdp_trends.into_iter().zip(inflation_trends))
            .filter(|(date, _)| window.contains(date))
            .filter_map(|(date, trends)| match trends {
                (Some(growth_trend), Some(inflation_trend)) => Some(ClassifiedMonth {
                    date: *date,
                    label: RegimeLabel::from_directions(
                        growth_direction(growth_trend),
                        inflation_direction(inflation_trend),
                    ),
                    growth_trend,
                    inflation_trend,
                }),
                _ => None,
            })
            .collect();

        let in_window = dates.iter().filter(|d| window.contains(d)).count();
        debug!(
            "Classified {} of {} months ({} leading months without history)",
            months.len(),
            in_window,
            in_window - months.len()
        );
        Ok(months)
    }
}

/// A change of regime between consecutive classified months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeChange {
    pub date: YearMonth,
    pub from: RegimeLabel,
    pub to: RegimeLabel,
}

/// List the months where the regime differs from the previous month.
pub fn detect_regime_changes(months: &[ClassifiedMonth]) -> Vec<RegimeChange> {
    months
        .windows(2)
        .filter(|w| w[0].label != w[1].label)
        .map(|w| RegimeChange {
            date: w[1].date,
            from: w[0].label,
            to: w[1].label,
        })
        .collect()
}

/// Distribution of regimes over a classified history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeStats {
    /// Months per regime (all four regimes present).
    pub counts: BTreeMap<RegimeLabel, usize>,
    /// Total classified months.
    pub total: usize,
    /// Number of regime changes.
    pub changes: usize,
    /// Regime of the most recent month.
    pub current: Option<RegimeLabel>,
}

impl RegimeStats {
    pub fn from_months(months: &[ClassifiedMonth]) -> Self {
        let mut counts: BTreeMap<RegimeLabel, usize> =
            RegimeLabel::ALL.iter().map(|l| (*l, 0)).collect();
        for month in months {
            *counts.entry(month.label).or_insert(0) += 1;
        }
        Self {
            counts,
            total: months.len(),
            changes: detect_regime_changes(months).len(),
            current: months.last().map(|m| m.label),
        }
    }

    /// Share of months in a regime (0.0 to 1.0).
    pub fn share(&self, label: RegimeLabel) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.counts.get(&label).copied().unwrap_or(0) as f64 / self.total as f64
    }
}

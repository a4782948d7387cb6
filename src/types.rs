//! Core data types: calendar months, economic observations and regime labels.

use crate::error::{AllocationError, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Date formats accepted for full dates, tried in order.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d"];

/// A calendar month, the key of every series in this crate.
///
/// Ordering is chronological. Serialized as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Create a month, validating `month` in 1..=12.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(AllocationError::InvalidInput(format!(
                "Month must be in 1..=12, got {}",
                month
            )));
        }
        Ok(Self { year, month })
    }

    /// Month containing the given date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse `YYYY-MM` or any full date format in [`DATE_FORMATS`].
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(s, format) {
                return Ok(Self::from_date(date));
            }
        }

        if let Some((year, month)) = s.split_once('-') {
            if let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<u32>()) {
                return Self::new(year, month);
            }
        }

        Err(AllocationError::DataError(format!(
            "Unrecognized date '{}'",
            s
        )))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Months since year 0, used for distance arithmetic.
    fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(12) as i32,
            month: ordinal.rem_euclid(12) as u32 + 1,
        }
    }

    /// The following calendar month.
    pub fn succ(&self) -> Self {
        Self::from_ordinal(self.ordinal() + 1)
    }

    /// The preceding calendar month.
    pub fn pred(&self) -> Self {
        Self::from_ordinal(self.ordinal() - 1)
    }

    /// Signed number of months from `self` to `other`.
    pub fn months_until(&self, other: &YearMonth) -> i64 {
        other.ordinal() - self.ordinal()
    }

    /// First day of the month.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = AllocationError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// Inclusive month window requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: Option<YearMonth>,
    pub end: Option<YearMonth>,
}

impl DateWindow {
    /// Window covering every month.
    pub fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn new(start: Option<YearMonth>, end: Option<YearMonth>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: &YearMonth) -> bool {
        self.start.map_or(true, |s| *date >= s) && self.end.map_or(true, |e| *date <= e)
    }
}

impl Default for DateWindow {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// One month of economic indicator data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EconomicObservation {
    pub date: YearMonth,
    /// GDP growth, quarter over quarter annualized (percent).
    pub gdp_qoq_annualized: f64,
    /// Inflation measure (e.g. PCE prices, percent).
    pub inflation_measure: f64,
}

impl EconomicObservation {
    pub fn new(date: YearMonth, gdp_qoq_annualized: f64, inflation_measure: f64) -> Self {
        Self {
            date,
            gdp_qoq_annualized,
            inflation_measure,
        }
    }
}

/// Direction of the growth indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrowthDirection {
    Rising,
    Slowing,
}

/// Direction of the inflation indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InflationDirection {
    Rising,
    Falling,
}

/// Macroeconomic regime: growth direction x inflation direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RegimeLabel {
    RisingGrowthFallingInflation,
    RisingGrowthRisingInflation,
    SlowingGrowthFallingInflation,
    SlowingGrowthRisingInflation,
}

impl RegimeLabel {
    /// All four regimes in presentation order.
    pub const ALL: [RegimeLabel; 4] = [
        RegimeLabel::RisingGrowthFallingInflation,
        RegimeLabel::RisingGrowthRisingInflation,
        RegimeLabel::SlowingGrowthFallingInflation,
        RegimeLabel::SlowingGrowthRisingInflation,
    ];

    /// Combine the two indicator directions.
    pub fn from_directions(growth: GrowthDirection, inflation: InflationDirection) -> Self {
        match (growth, inflation) {
            (GrowthDirection::Rising, InflationDirection::Falling) => {
                RegimeLabel::RisingGrowthFallingInflation
            }
            (GrowthDirection::Rising, InflationDirection::Rising) => {
                RegimeLabel::RisingGrowthRisingInflation
            }
            (GrowthDirection::Slowing, InflationDirection::Falling) => {
                RegimeLabel::SlowingGrowthFallingInflation
            }
            (GrowthDirection::Slowing, InflationDirection::Rising) => {
                RegimeLabel::SlowingGrowthRisingInflation
            }
        }
    }

    pub fn growth(&self) -> GrowthDirection {
        match self {
            RegimeLabel::RisingGrowthFallingInflation | RegimeLabel::RisingGrowthRisingInflation => {
                GrowthDirection::Rising
            }
            _ => GrowthDirection::Slowing,
        }
    }

    pub fn inflation(&self) -> InflationDirection {
        match self {
            RegimeLabel::RisingGrowthRisingInflation
            | RegimeLabel::SlowingGrowthRisingInflation => InflationDirection::Rising,
            _ => InflationDirection::Falling,
        }
    }

    /// Short machine-friendly code.
    pub fn code(&self) -> &'static str {
        match self {
            RegimeLabel::RisingGrowthFallingInflation => "rise_fall",
            RegimeLabel::RisingGrowthRisingInflation => "rise_rise",
            RegimeLabel::SlowingGrowthFallingInflation => "slow_fall",
            RegimeLabel::SlowingGrowthRisingInflation => "slow_rise",
        }
    }

    /// Parse either the code or the display name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|label| label.code().eq_ignore_ascii_case(s) || label.to_string() == s)
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegimeLabel::RisingGrowthFallingInflation => {
                write!(f, "Rising Growth, Falling Inflation")
            }
            RegimeLabel::RisingGrowthRisingInflation => write!(f, "Rising Growth, Rising Inflation"),
            RegimeLabel::SlowingGrowthFallingInflation => {
                write!(f, "Slowing Growth, Falling Inflation")
            }
            RegimeLabel::SlowingGrowthRisingInflation => {
                write!(f, "Slowing Growth, Rising Inflation")
            }
        }
    }
}

/// Risk measure used in the denominator of the optimized ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatioMethod {
    /// Total volatility.
    Sharpe,
    /// Downside volatility.
    Sortino,
}

impl RatioMethod {
    pub const ALL: [RatioMethod; 2] = [RatioMethod::Sharpe, RatioMethod::Sortino];
}

impl fmt::Display for RatioMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RatioMethod::Sharpe => write!(f, "Sharpe"),
            RatioMethod::Sortino => write!(f, "Sortino"),
        }
    }
}

impl FromStr for RatioMethod {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sharpe" => Ok(RatioMethod::Sharpe),
            "sortino" => Ok(RatioMethod::Sortino),
            other => Err(AllocationError::ConfigError(format!(
                "Unknown ratio method '{}'",
                other
            ))),
        }
    }
}

//! Return matrix, economic series validation and CSV loading.
//!
//! Inputs are materialized once and treated as immutable afterwards. All
//! series are keyed by [`YearMonth`]; a skipped month inside an analysis
//! window is reported as [`AllocationError::DataGap`], never filled.

use crate::error::{AllocationError, Result};
use crate::types::{DateWindow, EconomicObservation, YearMonth};
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Cell values treated as missing in return files.
const MISSING_MARKERS: [&str; 6] = ["", "nan", "na", "n/a", "#n/a", "-"];

/// One asset's monthly returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    pub asset: String,
    points: Vec<(YearMonth, Option<f64>)>,
}

impl ReturnSeries {
    /// Create a series, validating strictly increasing months and finite values.
    pub fn new(asset: impl Into<String>, points: Vec<(YearMonth, Option<f64>)>) -> Result<Self> {
        let asset = asset.into();
        for pair in points.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(AllocationError::DataError(format!(
                    "Series '{}' is not strictly increasing at {}",
                    asset, pair[1].0
                )));
            }
        }
        if let Some((date, _)) = points
            .iter()
            .find(|(_, v)| v.map_or(false, |x| !x.is_finite()))
        {
            return Err(AllocationError::DataError(format!(
                "Series '{}' has a non-finite return at {}",
                asset, date
            )));
        }
        Ok(Self { asset, points })
    }

    pub fn points(&self) -> &[(YearMonth, Option<f64>)] {
        &self.points
    }
}

/// Per-asset monthly returns aligned to a common month index.
///
/// `values[a][d]` is the return of asset `a` in month `dates[d]`. Assets are
/// kept sorted by key so every iteration order is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnMatrix {
    dates: Vec<YearMonth>,
    assets: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
}

impl ReturnMatrix {
    /// Build a matrix from an index, asset keys and per-asset columns.
    pub fn new(
        dates: Vec<YearMonth>,
        assets: Vec<String>,
        values: Vec<Vec<Option<f64>>>,
    ) -> Result<Self> {
        if assets.is_empty() {
            return Err(AllocationError::DataError(
                "Return matrix needs at least one asset".to_string(),
            ));
        }
        if values.len() != assets.len() {
            return Err(AllocationError::InvalidInput(format!(
                "{} assets but {} value columns",
                assets.len(),
                values.len()
            )));
        }
        for pair in dates.windows(2) {
            if pair[1] <= pair[0] {
                return Err(AllocationError::DataError(format!(
                    "Return dates must be strictly increasing, found {} after {}",
                    pair[1], pair[0]
                )));
            }
        }

        let mut seen = HashSet::new();
        for (asset, column) in assets.iter().zip(&values) {
            if !seen.insert(asset.as_str()) {
                return Err(AllocationError::DataError(format!(
                    "Duplicate asset '{}'",
                    asset
                )));
            }
            if column.len() != dates.len() {
                return Err(AllocationError::InvalidInput(format!(
                    "Asset '{}' has {} values for {} dates",
                    asset,
                    column.len(),
                    dates.len()
                )));
            }
            if column.iter().flatten().any(|v| !v.is_finite()) {
                return Err(AllocationError::DataError(format!(
                    "Asset '{}' has non-finite returns",
                    asset
                )));
            }
        }

        let mut order: Vec<usize> = (0..assets.len()).collect();
        order.sort_by(|&a, &b| assets[a].cmp(&assets[b]));
        let mut assets = assets;
        let mut values = values;
        let sorted_assets = order.iter().map(|&i| std::mem::take(&mut assets[i])).collect();
        let sorted_values = order.iter().map(|&i| std::mem::take(&mut values[i])).collect();

        Ok(Self {
            dates,
            assets: sorted_assets,
            values: sorted_values,
        })
    }

    /// Align several series on the union of their months.
    pub fn from_series(series: Vec<ReturnSeries>) -> Result<Self> {
        let dates: Vec<YearMonth> = series
            .iter()
            .flat_map(|s| s.points.iter().map(|(d, _)| *d))
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut assets = Vec::with_capacity(series.len());
        let mut values = Vec::with_capacity(series.len());
        for s in series {
            let lookup: BTreeMap<YearMonth, Option<f64>> = s.points.into_iter().collect();
            values.push(
                dates
                    .iter()
                    .map(|d| lookup.get(d).copied().flatten())
                    .collect(),
            );
            assets.push(s.asset);
        }

        Self::new(dates, assets, values)
    }

    pub fn dates(&self) -> &[YearMonth] {
        &self.dates
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn n_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    pub fn date_index(&self, date: &YearMonth) -> Option<usize> {
        self.dates.binary_search(date).ok()
    }

    /// Column of an asset by position.
    pub fn column(&self, asset_idx: usize) -> &[Option<f64>] {
        &self.values[asset_idx]
    }

    pub fn value(&self, asset_idx: usize, date_idx: usize) -> Option<f64> {
        self.values[asset_idx][date_idx]
    }

    /// Share of non-missing values of an asset over the whole index.
    pub fn coverage(&self, asset_idx: usize) -> f64 {
        if self.dates.is_empty() {
            return 0.0;
        }
        self.observation_count(asset_idx) as f64 / self.dates.len() as f64
    }

    /// Number of non-missing values of an asset.
    pub fn observation_count(&self, asset_idx: usize) -> usize {
        self.values[asset_idx].iter().filter(|v| v.is_some()).count()
    }

    /// Sub-matrix of the months inside `window`.
    pub fn restrict(&self, window: &DateWindow) -> Self {
        let keep: Vec<usize> = (0..self.dates.len())
            .filter(|&i| window.contains(&self.dates[i]))
            .collect();
        Self {
            dates: keep.iter().map(|&i| self.dates[i]).collect(),
            assets: self.assets.clone(),
            values: self
                .values
                .iter()
                .map(|col| keep.iter().map(|&i| col[i]).collect())
                .collect(),
        }
    }

    /// Copy of the matrix without the named assets. Unknown names are ignored.
    pub fn without_assets(&self, excluded: &[String]) -> Result<Self> {
        let mut assets = Vec::new();
        let mut values = Vec::new();
        for (asset, column) in self.assets.iter().zip(&self.values) {
            if !excluded.contains(asset) {
                assets.push(asset.clone());
                values.push(column.clone());
            }
        }
        Self::new(self.dates.clone(), assets, values)
    }

    /// Fail with `DataGap` if the month index skips a month inside `window`.
    pub fn check_continuity(&self, window: &DateWindow) -> Result<()> {
        let in_window: Vec<YearMonth> = self
            .dates
            .iter()
            .copied()
            .filter(|d| window.contains(d))
            .collect();
        ensure_monthly(&in_window)
    }
}

/// A run of missing months between two present ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthGap {
    /// Last month present before the gap.
    pub start: YearMonth,
    /// First month present after the gap.
    pub end: YearMonth,
}

impl MonthGap {
    /// Number of missing months.
    pub fn missing_months(&self) -> usize {
        (self.start.months_until(&self.end) - 1).max(0) as usize
    }
}

/// Detect skipped months in an increasing month sequence.
pub fn detect_month_gaps(dates: &[YearMonth]) -> Vec<MonthGap> {
    dates
        .windows(2)
        .filter(|w| w[0].months_until(&w[1]) > 1)
        .map(|w| MonthGap {
            start: w[0],
            end: w[1],
        })
        .collect()
}

/// Fail with the first detected gap.
pub fn ensure_monthly(dates: &[YearMonth]) -> Result<()> {
    match detect_month_gaps(dates).first() {
        Some(gap) => Err(AllocationError::DataGap {
            start: gap.start,
            end: gap.end,
        }),
        None => Ok(()),
    }
}

/// Validate an economic series: strictly increasing months, finite values.
///
/// Gaps are checked separately against the caller's window.
pub fn validate_economic_series(series: &[EconomicObservation]) -> Result<()> {
    for pair in series.windows(2) {
        if pair[1].date <= pair[0].date {
            return Err(AllocationError::DataError(format!(
                "Economic series must be strictly increasing, found {} after {}",
                pair[1].date, pair[0].date
            )));
        }
    }
    if let Some(obs) = series
        .iter()
        .find(|o| !o.gdp_qoq_annualized.is_finite() || !o.inflation_measure.is_finite())
    {
        return Err(AllocationError::DataError(format!(
            "Economic observation at {} has a non-finite value",
            obs.date
        )));
    }
    Ok(())
}

/// Summary of data quality for the loaded inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataQualityReport {
    /// Months in the return index.
    pub months: usize,
    /// Gaps in the return index.
    pub return_gaps: Vec<MonthGap>,
    /// Gaps in the economic series.
    pub economic_gaps: Vec<MonthGap>,
    /// Missing cells per asset.
    pub missing_cells: BTreeMap<String, usize>,
    /// Coverage per asset (share of non-missing months).
    pub coverage: BTreeMap<String, f64>,
}

impl DataQualityReport {
    pub fn new(returns: &ReturnMatrix, economic: &[EconomicObservation]) -> Self {
        let economic_dates: Vec<YearMonth> = economic.iter().map(|o| o.date).collect();
        let mut missing_cells = BTreeMap::new();
        let mut coverage = BTreeMap::new();
        for (i, asset) in returns.assets().iter().enumerate() {
            missing_cells.insert(asset.clone(), returns.n_dates() - returns.observation_count(i));
            coverage.insert(asset.clone(), returns.coverage(i));
        }

        Self {
            months: returns.n_dates(),
            return_gaps: detect_month_gaps(returns.dates()),
            economic_gaps: detect_month_gaps(&economic_dates),
            missing_cells,
            coverage,
        }
    }

    /// No gaps in either input.
    pub fn is_acceptable(&self) -> bool {
        self.return_gaps.is_empty() && self.economic_gaps.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Months: {}, Return gaps: {}, Economic gaps: {}, Missing cells: {}",
            self.months,
            self.return_gaps.len(),
            self.economic_gaps.len(),
            self.missing_cells.values().sum::<usize>()
        )
    }
}

// ============================================================================
// CSV loading
// ============================================================================

/// Scale of the numbers in an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueScale {
    /// Values are fractions (0.012 = 1.2%).
    #[default]
    Fraction,
    /// Values are percentages (1.2 = 1.2%); divided by 100 on load.
    Percent,
}

impl ValueScale {
    fn apply(&self, value: f64) -> f64 {
        match self {
            ValueScale::Fraction => value,
            ValueScale::Percent => value / 100.0,
        }
    }
}

/// Named columns of the economic CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicColumns {
    pub date: String,
    pub gdp: String,
    pub inflation: String,
}

impl Default for EconomicColumns {
    fn default() -> Self {
        Self {
            date: "Date".to_string(),
            gdp: "US_GDP_QoQ_Ann".to_string(),
            inflation: "PCE_Prices".to_string(),
        }
    }
}

/// Options for the wide returns CSV.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReturnsCsvConfig {
    /// Date column name. Falls back to a `date`/`dates` header, then the first column.
    pub date_column: Option<String>,
    /// Scale of the return values.
    pub scale: ValueScale,
}

/// Parse a numeric cell. Missing markers yield `None`; a trailing `%` is stripped.
pub fn parse_cell(raw: &str, scale: ValueScale) -> Result<Option<f64>> {
    let trimmed = raw.trim();
    if MISSING_MARKERS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return Ok(None);
    }
    let number = trimmed.trim_end_matches('%').trim();
    let value: f64 = number
        .parse()
        .map_err(|_| AllocationError::DataError(format!("Cannot parse number '{}'", raw)))?;
    if !value.is_finite() {
        return Err(AllocationError::DataError(format!(
            "Non-finite value '{}'",
            raw
        )));
    }
    Ok(Some(scale.apply(value)))
}

fn find_column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .ok_or_else(|| AllocationError::DataError(format!("Missing required column '{}'", name)))
}

/// Read the economic series from CSV data with named columns.
pub fn read_economic_csv<R: Read>(
    reader: R,
    columns: &EconomicColumns,
) -> Result<Vec<EconomicObservation>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let date_idx = find_column(&headers, &columns.date)?;
    let gdp_idx = find_column(&headers, &columns.gdp)?;
    let inflation_idx = find_column(&headers, &columns.inflation)?;

    let mut observations = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        let field = |idx: usize| record.get(idx).unwrap_or("");
        let date = YearMonth::parse(field(date_idx))?;
        let gdp = parse_cell(field(gdp_idx), ValueScale::Fraction)?;
        let inflation = parse_cell(field(inflation_idx), ValueScale::Fraction)?;

        match (gdp, inflation) {
            (Some(gdp), Some(inflation)) => {
                observations.push(EconomicObservation::new(date, gdp, inflation))
            }
            _ => {
                return Err(AllocationError::DataError(format!(
                    "Row {} ({}) is missing a required economic value",
                    row + 2,
                    date
                )))
            }
        }
    }

    observations.sort_by_key(|o| o.date);
    if let Some(pair) = observations.windows(2).find(|w| w[0].date == w[1].date) {
        return Err(AllocationError::DataError(format!(
            "Multiple economic observations in {}",
            pair[0].date
        )));
    }

    debug!("Read {} economic observations", observations.len());
    Ok(observations)
}

/// Load the economic series from a CSV file.
pub fn load_economic_csv(
    path: impl AsRef<Path>,
    columns: &EconomicColumns,
) -> Result<Vec<EconomicObservation>> {
    let path = path.as_ref();
    let observations = read_economic_csv(File::open(path)?, columns)?;
    info!(
        "Loaded {} economic observations from {}",
        observations.len(),
        path.display()
    );
    Ok(observations)
}

/// Read a wide returns CSV: one date column plus one column per asset.
pub fn read_returns_csv<R: Read>(reader: R, config: &ReturnsCsvConfig) -> Result<ReturnMatrix> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(AllocationError::DataError(
            "Returns file needs a date column and at least one asset column".to_string(),
        ));
    }

    let date_idx = match &config.date_column {
        Some(name) => find_column(&headers, name)?,
        None => headers
            .iter()
            .position(|h| matches!(h.trim().to_ascii_lowercase().as_str(), "date" | "dates"))
            .unwrap_or(0),
    };

    let asset_columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != date_idx)
        .map(|(i, h)| (i, h.trim().to_string()))
        .collect();

    let mut rows: Vec<(YearMonth, Vec<Option<f64>>)> = Vec::new();
    for record in reader.records() {
        let record = record?;
        let raw_date = record.get(date_idx).unwrap_or("").trim();
        if raw_date.is_empty() {
            continue;
        }
        let date = YearMonth::parse(raw_date)?;
        let values = asset_columns
            .iter()
            .map(|(i, _)| parse_cell(record.get(*i).unwrap_or(""), config.scale))
            .collect::<Result<Vec<_>>>()?;
        rows.push((date, values));
    }

    rows.sort_by_key(|(d, _)| *d);
    if let Some(pair) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(AllocationError::DataError(format!(
            "Multiple return rows in {}",
            pair[0].0
        )));
    }

    let dates: Vec<YearMonth> = rows.iter().map(|(d, _)| *d).collect();
    let mut values = vec![Vec::with_capacity(rows.len()); asset_columns.len()];
    for (_, row) in &rows {
        for (column, value) in values.iter_mut().zip(row) {
            column.push(*value);
        }
    }
    let assets = asset_columns.into_iter().map(|(_, name)| name).collect();

    let matrix = ReturnMatrix::new(dates, assets, values)?;
    for (i, asset) in matrix.assets().iter().enumerate() {
        if matrix.observation_count(i) == 0 {
            warn!("Asset {} has no return observations", asset);
        }
    }
    Ok(matrix)
}

/// Load a wide returns CSV file.
pub fn load_returns_csv(path: impl AsRef<Path>, config: &ReturnsCsvConfig) -> Result<ReturnMatrix> {
    let path = path.as_ref();
    let matrix = read_returns_csv(File::open(path)?, config)?;
    info!(
        "Loaded {} assets x {} months from {}",
        matrix.n_assets(),
        matrix.n_dates(),
        path.display()
    );
    Ok(matrix)
}

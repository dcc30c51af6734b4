//! # Return Processing
//!
//! $$
//! R = \operatorname{clip}_{\pm\tau}\big(\operatorname{interp}(\Delta \log P)\big)
//! $$
//!
//! Aligned periodic returns and the cleaning pipeline that produces them.

use std::str::FromStr;

use chrono::Datelike;
use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use tracing::debug;

use super::prices::PriceTable;
use super::validate_index;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::frequency::Frequency;

/// Gap filling method for missing returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
  /// Linear in calendar time.
  #[default]
  Time,
  /// Linear in row index.
  Linear,
  /// Carry the last observation forward.
  Pad,
}

impl FromStr for Interpolation {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "time" => Ok(Self::Time),
      "linear" => Ok(Self::Linear),
      "pad" | "ffill" => Ok(Self::Pad),
      _ => Err(PortfolioError::UnknownInterpolation(s.to_string())),
    }
  }
}

/// Periodic returns, rows = periods in chronological order, columns = assets.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnMatrix {
  dates: Vec<NaiveDate>,
  assets: Vec<String>,
  values: Array2<f64>,
}

impl ReturnMatrix {
  pub fn new(dates: Vec<NaiveDate>, assets: Vec<String>, values: Array2<f64>) -> Result<Self> {
    validate_index(&dates, &assets, values.dim())?;
    if values.iter().any(|v| !v.is_finite()) {
      return Err(PortfolioError::invalid(
        "returns",
        "return matrix must not contain missing or infinite values",
      ));
    }
    Ok(Self {
      dates,
      assets,
      values,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn n_periods(&self) -> usize {
    self.values.nrows()
  }

  pub fn n_assets(&self) -> usize {
    self.values.ncols()
  }

  pub fn column(&self, j: usize) -> ArrayView1<'_, f64> {
    self.values.column(j)
  }

  /// Sample mean per asset.
  pub fn means(&self) -> Array1<f64> {
    self
      .values
      .mean_axis(Axis(0))
      .unwrap_or_else(|| Array1::zeros(self.n_assets()))
  }

  /// Sample standard deviation per asset (`ddof = 1`).
  pub fn std_devs(&self) -> Array1<f64> {
    if self.n_periods() < 2 {
      return Array1::zeros(self.n_assets());
    }
    self.values.std_axis(Axis(0), 1.0)
  }

  /// Portfolio return series `R w`.
  pub fn portfolio(&self, weights: &[f64]) -> Array1<f64> {
    self.values.dot(&ArrayView1::from(weights))
  }

  /// Sub-universe with the given column indices.
  pub fn select(&self, columns: &[usize]) -> Self {
    Self {
      dates: self.dates.clone(),
      assets: columns.iter().map(|&j| self.assets[j].clone()).collect(),
      values: self.values.select(Axis(1), columns),
    }
  }
}

fn bucket_key(date: NaiveDate, freq: Frequency) -> (i32, u32, u32) {
  match freq {
    Frequency::Daily => (date.year(), date.ordinal(), 0),
    Frequency::Weekly => {
      let week = date.iso_week();
      (week.year(), week.week(), 0)
    }
    Frequency::Monthly => (date.year(), date.month(), 0),
  }
}

/// Last available quote per asset inside each calendar bucket.
fn resample(prices: &PriceTable, freq: Frequency) -> (Vec<NaiveDate>, Array2<f64>) {
  if freq == Frequency::Daily {
    return (prices.dates().to_vec(), prices.prices().clone());
  }

  let mut dates = Vec::new();
  let mut rows: Vec<Vec<f64>> = Vec::new();
  let mut current = None;

  for (t, date) in prices.dates().iter().enumerate() {
    let key = bucket_key(*date, freq);
    if current != Some(key) {
      current = Some(key);
      dates.push(*date);
      rows.push(vec![f64::NAN; prices.assets().len()]);
    }

    if let (Some(last_date), Some(row)) = (dates.last_mut(), rows.last_mut()) {
      *last_date = *date;
      for (j, slot) in row.iter_mut().enumerate() {
        let p = prices.prices()[[t, j]];
        if p.is_finite() {
          *slot = p;
        }
      }
    }
  }

  let n_assets = prices.assets().len();
  let mut out = Array2::from_elem((rows.len(), n_assets), f64::NAN);
  for (t, row) in rows.iter().enumerate() {
    for (j, &p) in row.iter().enumerate() {
      out[[t, j]] = p;
    }
  }
  (dates, out)
}

fn period_returns(prices: &Array2<f64>, log_returns: bool) -> Array2<f64> {
  let (n, m) = prices.dim();
  let mut out = Array2::from_elem((n.saturating_sub(1), m), f64::NAN);

  for t in 1..n {
    for j in 0..m {
      let prev = prices[[t - 1, j]];
      let curr = prices[[t, j]];
      if prev > 0.0 && curr > 0.0 && prev.is_finite() && curr.is_finite() {
        out[[t - 1, j]] = if log_returns {
          (curr / prev).ln()
        } else {
          curr / prev - 1.0
        };
      }
    }
  }

  out
}

fn interpolate(column: &mut [f64], dates: &[NaiveDate], method: Interpolation) {
  let mut last_valid: Option<usize> = None;
  let mut i = 0;

  while i < column.len() {
    if column[i].is_finite() {
      last_valid = Some(i);
      i += 1;
      continue;
    }

    let Some(left) = last_valid else {
      i += 1;
      continue;
    };

    let right = (i..column.len()).find(|&k| column[k].is_finite());
    let end = right.unwrap_or(column.len());

    for k in i..end {
      column[k] = match (method, right) {
        (Interpolation::Pad, _) | (_, None) => column[left],
        (Interpolation::Linear, Some(r)) => {
          let frac = (k - left) as f64 / (r - left) as f64;
          column[left] + frac * (column[r] - column[left])
        }
        (Interpolation::Time, Some(r)) => {
          let span = (dates[r] - dates[left]).num_days() as f64;
          let frac = if span > 0.0 {
            (dates[k] - dates[left]).num_days() as f64 / span
          } else {
            0.0
          };
          column[left] + frac * (column[r] - column[left])
        }
      };
    }

    i = end;
  }
}

/// Turn a price table into a cleaned return matrix.
///
/// Prices are resampled to `freq`, converted to log or arithmetic returns, assets with more
/// than `maxnan` missing returns are dropped, the remaining gaps are interpolated, leading
/// rows that cannot be filled are removed and, when `threshold > 0`, returns are capped at
/// `±threshold`.
pub fn process_returns(
  prices: &PriceTable,
  log_returns: bool,
  freq: Frequency,
  maxnan: f64,
  threshold: f64,
  method: Interpolation,
) -> Result<ReturnMatrix> {
  let (dates, resampled) = resample(prices, freq);
  let raw = period_returns(&resampled, log_returns);
  let dates: Vec<NaiveDate> = dates.into_iter().skip(1).collect();
  let n_rows = raw.nrows();

  if n_rows == 0 {
    return Err(PortfolioError::InsufficientData(
      "at least two price observations are required".to_string(),
    ));
  }

  let keep: Vec<usize> = (0..raw.ncols())
    .filter(|&j| {
      let missing = raw.column(j).iter().filter(|v| !v.is_finite()).count();
      missing as f64 / n_rows as f64 <= maxnan
    })
    .collect();

  let dropped: Vec<&String> = (0..raw.ncols())
    .filter(|j| !keep.contains(j))
    .map(|j| &prices.assets()[j])
    .collect();
  if !dropped.is_empty() {
    debug!(?dropped, maxnan, "assets dropped for missing data");
  }

  let mut values = raw.select(Axis(1), &keep);
  for mut column in values.columns_mut() {
    let mut buf = column.to_vec();
    interpolate(&mut buf, &dates, method);
    for (slot, v) in column.iter_mut().zip(buf) {
      *slot = v;
    }
  }

  let rows: Vec<usize> = (0..n_rows)
    .filter(|&t| values.row(t).iter().all(|v| v.is_finite()))
    .collect();
  let mut values = values.select(Axis(0), &rows);

  if threshold > 0.0 {
    values.mapv_inplace(|v| v.clamp(-threshold, threshold));
  }

  if values.nrows() == 0 || values.ncols() == 0 {
    return Err(PortfolioError::InsufficientData(
      "no asset or period left after cleaning".to_string(),
    ));
  }

  ReturnMatrix::new(
    rows.iter().map(|&t| dates[t]).collect(),
    keep.iter().map(|&j| prices.assets()[j].clone()).collect(),
    values,
  )
}

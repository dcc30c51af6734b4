//! # Price Tables
//!
//! $$
//! P_{t,i} = P_{0,i}\prod_{s\le t}(1+r_{s,i})
//! $$
//!
//! Date-indexed close prices and lookback windows.

use std::str::FromStr;

use chrono::Datelike;
use chrono::Duration;
use chrono::Months;
use chrono::NaiveDate;
use ndarray::Array2;
use ndarray::Axis;

use super::validate_index;
use crate::error::PortfolioError;
use crate::error::Result;

/// Lookback window ending at the request end date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Period {
  Days(u32),
  Weeks(u32),
  Months(u32),
  Years(u32),
  /// Since January 1st of the end date's year.
  Ytd,
  /// Full history.
  Max,
}

impl Default for Period {
  fn default() -> Self {
    Self::Years(3)
  }
}

impl Period {
  /// First date included in the window.
  pub fn start_from(&self, end: NaiveDate) -> Option<NaiveDate> {
    match *self {
      Self::Days(n) => end.checked_sub_signed(Duration::days(i64::from(n))),
      Self::Weeks(n) => end.checked_sub_signed(Duration::days(7 * i64::from(n))),
      Self::Months(n) => end.checked_sub_months(Months::new(n)),
      Self::Years(n) => end.checked_sub_months(Months::new(12 * n)),
      Self::Ytd => NaiveDate::from_ymd_opt(end.year(), 1, 1),
      Self::Max => None,
    }
  }
}

impl FromStr for Period {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    let lower = s.trim().to_lowercase();
    match lower.as_str() {
      "ytd" => return Ok(Self::Ytd),
      "max" => return Ok(Self::Max),
      _ => {}
    }

    let split = lower
      .find(|c: char| !c.is_ascii_digit())
      .ok_or_else(|| PortfolioError::InvalidPeriod(s.to_string()))?;
    let (count, unit) = lower.split_at(split);
    let n: u32 = count
      .parse()
      .map_err(|_| PortfolioError::InvalidPeriod(s.to_string()))?;

    match unit {
      "d" => Ok(Self::Days(n)),
      "wk" => Ok(Self::Weeks(n)),
      "mo" => Ok(Self::Months(n)),
      "y" => Ok(Self::Years(n)),
      _ => Err(PortfolioError::InvalidPeriod(s.to_string())),
    }
  }
}

/// Close prices, rows = dates, columns = assets, `NaN` marks a missing quote.
#[derive(Clone, Debug)]
pub struct PriceTable {
  dates: Vec<NaiveDate>,
  assets: Vec<String>,
  prices: Array2<f64>,
}

impl PriceTable {
  pub fn new(dates: Vec<NaiveDate>, assets: Vec<String>, prices: Array2<f64>) -> Result<Self> {
    validate_index(&dates, &assets, prices.dim())?;
    Ok(Self {
      dates,
      assets,
      prices,
    })
  }

  /// Compound arithmetic returns into prices starting at 100. The first date carries the
  /// starting price, so `dates` needs one more entry than `returns` has rows.
  pub fn from_returns(
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    returns: &Array2<f64>,
  ) -> Result<Self> {
    if dates.len() != returns.nrows() + 1 {
      return Err(PortfolioError::DimensionMismatch {
        expected: returns.nrows() + 1,
        actual: dates.len(),
      });
    }

    let mut prices = Array2::from_elem((dates.len(), returns.ncols()), 100.0);
    for t in 0..returns.nrows() {
      for j in 0..returns.ncols() {
        prices[[t + 1, j]] = prices[[t, j]] * (1.0 + returns[[t, j]]);
      }
    }

    Self::new(dates, assets, prices)
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn prices(&self) -> &Array2<f64> {
    &self.prices
  }

  /// Restrict to `stocks`, in the requested order.
  pub fn select_assets(&self, stocks: &[String]) -> Result<Self> {
    let idx = stocks
      .iter()
      .map(|s| {
        self
          .assets
          .iter()
          .position(|a| a == s)
          .ok_or_else(|| PortfolioError::MissingAsset(s.clone()))
      })
      .collect::<Result<Vec<_>>>()?;

    Self::new(
      self.dates.clone(),
      stocks.to_vec(),
      self.prices.select(Axis(1), &idx),
    )
  }

  /// Keep rows with `start <= date <= end`.
  pub fn window(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
    let rows: Vec<usize> = self
      .dates
      .iter()
      .enumerate()
      .filter(|(_, d)| start.map_or(true, |s| **d >= s) && end.map_or(true, |e| **d <= e))
      .map(|(i, _)| i)
      .collect();

    Self::new(
      rows.iter().map(|&i| self.dates[i]).collect(),
      self.assets.clone(),
      self.prices.select(Axis(0), &rows),
    )
  }
}

//! # Providers
//!
//! $$
//! \text{request} \mapsto P \mapsto R
//! $$
//!
//! Contracts for fetching prices, returns and per-ticker attributes, plus in-memory
//! implementations.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::debug;

use super::prices::Period;
use super::prices::PriceTable;
use super::returns::Interpolation;
use super::returns::ReturnMatrix;
use super::returns::process_returns;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::frequency::Frequency;

/// Parameters of a returns fetch.
#[derive(Clone, Debug)]
pub struct ReturnsRequest {
  /// Requested tickers, in output order.
  pub stocks: Vec<String>,
  /// Lookback window, ignored when `start` is set.
  pub period: Period,
  pub start: Option<NaiveDate>,
  pub end: Option<NaiveDate>,
  /// Log returns instead of arithmetic returns.
  pub log_returns: bool,
  pub freq: Frequency,
  /// Maximum fraction of missing returns per asset.
  pub maxnan: f64,
  /// Cap on absolute returns, disabled when `0`.
  pub threshold: f64,
  pub method: Interpolation,
}

impl Default for ReturnsRequest {
  fn default() -> Self {
    Self {
      stocks: Vec::new(),
      period: Period::default(),
      start: None,
      end: None,
      log_returns: false,
      freq: Frequency::Daily,
      maxnan: 0.05,
      threshold: 0.0,
      method: Interpolation::Time,
    }
  }
}

impl ReturnsRequest {
  pub fn new<S: Into<String>>(stocks: impl IntoIterator<Item = S>) -> Self {
    Self {
      stocks: stocks.into_iter().map(Into::into).collect(),
      ..Self::default()
    }
  }
}

/// Source of aligned asset returns.
pub trait ReturnProvider {
  /// Close prices for the requested tickers and window.
  fn prices(&self, request: &ReturnsRequest) -> Result<PriceTable>;

  /// Cleaned returns for the request.
  fn returns(&self, request: &ReturnsRequest) -> Result<ReturnMatrix> {
    let prices = self.prices(request)?;
    process_returns(
      &prices,
      request.log_returns,
      request.freq,
      request.maxnan,
      request.threshold,
      request.method,
    )
  }
}

impl<P: ReturnProvider + ?Sized> ReturnProvider for &P {
  fn prices(&self, request: &ReturnsRequest) -> Result<PriceTable> {
    (**self).prices(request)
  }

  fn returns(&self, request: &ReturnsRequest) -> Result<ReturnMatrix> {
    (**self).returns(request)
  }
}

/// Numeric per-ticker attribute lookup (market cap, volume, ...).
pub trait AttributeProvider {
  fn attribute(&self, ticker: &str, property: &str) -> Option<f64>;
}

/// Provider serving a stored price table.
#[derive(Clone, Debug)]
pub struct InMemoryProvider {
  prices: PriceTable,
}

impl InMemoryProvider {
  pub fn new(prices: PriceTable) -> Self {
    Self { prices }
  }
}

impl ReturnProvider for InMemoryProvider {
  fn prices(&self, request: &ReturnsRequest) -> Result<PriceTable> {
    if request.stocks.is_empty() {
      return Err(PortfolioError::invalid("stocks", "at least one ticker is required"));
    }

    let selected = self.prices.select_assets(&request.stocks)?;
    let end = request
      .end
      .or_else(|| selected.dates().last().copied())
      .ok_or_else(|| PortfolioError::Provider("price table is empty".to_string()))?;
    let start = request.start.or_else(|| request.period.start_from(end));

    debug!(
      stocks = request.stocks.len(),
      ?start,
      %end,
      "serving prices from memory"
    );
    selected.window(start, Some(end))
  }
}

/// Attribute table keyed by `(ticker, property)`.
#[derive(Clone, Debug, Default)]
pub struct StaticAttributes {
  values: HashMap<(String, String), f64>,
}

impl StaticAttributes {
  pub fn insert(&mut self, ticker: impl Into<String>, property: impl Into<String>, value: f64) {
    self.values.insert((ticker.into(), property.into()), value);
  }
}

impl AttributeProvider for StaticAttributes {
  fn attribute(&self, ticker: &str, property: &str) -> Option<f64> {
    self
      .values
      .get(&(ticker.to_string(), property.to_string()))
      .copied()
  }
}

#[cfg(test)]
mod tests {
  use ndarray::Array2;

  use super::*;

  fn table() -> PriceTable {
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let dates: Vec<NaiveDate> = (0..2000)
      .map(|i| start + chrono::Duration::days(i))
      .collect();
    let prices = Array2::from_shape_fn((dates.len(), 2), |(t, j)| 100.0 + t as f64 + j as f64);
    PriceTable::new(dates, vec!["A".into(), "B".into()], prices).unwrap()
  }

  #[test]
  fn request_defaults() {
    let request = ReturnsRequest::new(["A", "B"]);
    assert_eq!(request.stocks, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(request.period, Period::Years(3));
    assert_eq!(request.freq, Frequency::Daily);
    assert_eq!(request.maxnan, 0.05);
    assert_eq!(request.threshold, 0.0);
    assert!(!request.log_returns);
  }

  #[test]
  fn period_window_ends_at_last_date() {
    let provider = InMemoryProvider::new(table());
    let request = ReturnsRequest {
      period: Period::Days(10),
      ..ReturnsRequest::new(["B"])
    };

    let prices = provider.prices(&request).unwrap();
    assert_eq!(prices.dates().len(), 11);
    assert_eq!(prices.assets(), &["B".to_string()]);

    let returns = provider.returns(&request).unwrap();
    assert_eq!(returns.n_periods(), 10);
  }

  #[test]
  fn explicit_start_overrides_period() {
    let provider = InMemoryProvider::new(table());
    let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let request = ReturnsRequest {
      period: Period::Days(1),
      start: Some(start),
      end: Some(start + chrono::Duration::days(4)),
      ..ReturnsRequest::new(["A"])
    };

    assert_eq!((&provider).prices(&request).unwrap().dates().len(), 5);
  }

  #[test]
  fn unknown_ticker_is_reported() {
    let provider = InMemoryProvider::new(table());
    let err = provider.returns(&ReturnsRequest::new(["ZZZ"])).unwrap_err();
    assert_eq!(err, PortfolioError::MissingAsset("ZZZ".to_string()));
  }

  #[test]
  fn static_attributes_lookup() {
    let mut attributes = StaticAttributes::default();
    attributes.insert("A", "marketCap", 3.0);

    assert_eq!(attributes.attribute("A", "marketCap"), Some(3.0));
    assert_eq!(attributes.attribute("A", "volume"), None);
    assert_eq!(attributes.attribute("B", "marketCap"), None);
  }
}

//! # Weight Post-Processing
//!
//! $$
//! \tilde w_i = \operatorname{round}_5(v\,w_i)
//! $$
//!
//! Raw engine output to ticker-keyed allocations, plus the normalization of user risk
//! budgets shared by the dispatcher and the engine.

use std::fmt::Display;

use crate::error::PortfolioError;
use crate::error::Result;

/// Decimal places kept on published weights.
pub const WEIGHT_DECIMALS: i32 = 5;

/// Round to [`WEIGHT_DECIMALS`] places.
pub fn round_weight(w: f64) -> f64 {
  let scale = 10f64.powi(WEIGHT_DECIMALS);
  (w * scale).round() / scale
}

/// Ordered `(ticker, weight)` pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeightVector {
  entries: Vec<(String, f64)>,
}

impl WeightVector {
  pub fn new(entries: Vec<(String, f64)>) -> Self {
    Self { entries }
  }

  pub fn get(&self, ticker: &str) -> Option<f64> {
    self
      .entries
      .iter()
      .find(|(t, _)| t == ticker)
      .map(|(_, w)| *w)
  }

  pub fn sum(&self) -> f64 {
    self.entries.iter().map(|(_, w)| w).sum()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn tickers(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(t, _)| t.as_str())
  }

  pub fn values(&self) -> Vec<f64> {
    self.entries.iter().map(|(_, w)| *w).collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self.entries.iter().map(|(t, w)| (t.as_str(), *w))
  }
}

impl Display for WeightVector {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let parts: Vec<String> = self
      .entries
      .iter()
      .map(|(t, w)| format!("{t}: {w:.5}"))
      .collect();
    write!(f, "{{{}}}", parts.join(", "))
  }
}

/// Scale, round and key raw weights by ticker. `None` propagates untouched; `scale` only
/// applies when it is strictly positive.
pub fn finalize(
  raw: Option<Vec<f64>>,
  assets: &[String],
  scale: Option<f64>,
) -> Result<Option<WeightVector>> {
  let Some(raw) = raw else {
    return Ok(None);
  };

  if raw.len() != assets.len() {
    return Err(PortfolioError::DimensionMismatch {
      expected: assets.len(),
      actual: raw.len(),
    });
  }

  let factor = scale.filter(|v| *v > 0.0).unwrap_or(1.0);
  let entries = assets
    .iter()
    .zip(raw)
    .map(|(ticker, w)| (ticker.clone(), round_weight(w * factor)))
    .collect();

  Ok(Some(WeightVector::new(entries)))
}

/// L1-normalized risk contributions. The vector must match the universe, be non-negative
/// and have a positive sum.
pub fn normalize_contributions(risk_cont: &[f64], n_assets: usize) -> Result<Vec<f64>> {
  if risk_cont.len() != n_assets {
    return Err(PortfolioError::invalid(
      "risk_cont",
      format!("expected {n_assets} contributions, got {}", risk_cont.len()),
    ));
  }
  if risk_cont.iter().any(|v| !v.is_finite() || *v < 0.0) {
    return Err(PortfolioError::invalid(
      "risk_cont",
      "contributions must be finite and non-negative",
    ));
  }
  let total: f64 = risk_cont.iter().sum();
  if total <= 0.0 {
    return Err(PortfolioError::invalid("risk_cont", "contributions sum to zero"));
  }
  Ok(risk_cont.iter().map(|v| v / total).collect())
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn assets() -> Vec<String> {
    vec!["A".into(), "B".into(), "C".into()]
  }

  #[test]
  fn rounds_to_five_decimals() {
    let w = finalize(Some(vec![0.333333, 0.333333, 0.333334]), &assets(), None)
      .unwrap()
      .unwrap();
    assert_eq!(w.values(), vec![0.33333, 0.33333, 0.33333]);
    assert_eq!(w.get("B"), Some(0.33333));
  }

  #[test]
  fn positive_scale_multiplies() {
    let w = finalize(Some(vec![0.5, 0.25, 0.25]), &assets(), Some(2.0))
      .unwrap()
      .unwrap();
    assert_abs_diff_eq!(w.sum(), 2.0, epsilon = 1e-12);
    assert_eq!(w.get("A"), Some(1.0));
  }

  #[test]
  fn non_positive_scale_is_ignored() {
    let w = finalize(Some(vec![0.5, 0.25, 0.25]), &assets(), Some(0.0))
      .unwrap()
      .unwrap();
    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-12);
  }

  #[test]
  fn none_propagates_and_length_is_checked() {
    assert_eq!(finalize(None, &assets(), Some(1.0)).unwrap(), None);
    assert_eq!(
      finalize(Some(vec![1.0]), &assets(), None),
      Err(PortfolioError::DimensionMismatch {
        expected: 3,
        actual: 1
      })
    );
  }

  #[test]
  fn display_keeps_universe_order() {
    let w = WeightVector::new(vec![("B".into(), 0.25), ("A".into(), 0.75)]);
    assert_eq!(w.to_string(), "{B: 0.25000, A: 0.75000}");
    assert_eq!(w.tickers().collect::<Vec<_>>(), vec!["B", "A"]);
  }

  #[test]
  fn contributions_are_l1_normalized() {
    let b = normalize_contributions(&[2.0, 1.0, 1.0], 3).unwrap();
    assert_eq!(b, vec![0.5, 0.25, 0.25]);
    assert!(matches!(
      normalize_contributions(&[1.0, 1.0], 3),
      Err(PortfolioError::InvalidParameter { .. })
    ));
    assert!(normalize_contributions(&[1.0, -1.0], 2).is_err());
    assert!(normalize_contributions(&[0.0, 0.0], 2).is_err());
  }
}

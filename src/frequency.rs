//! # Frequency Normalizer
//!
//! $$
//! x_{\text{period}} = \frac{x_{\text{annual}}}{f^{\,e}},\qquad f\in\{252, 52, 12\}
//! $$
//!
//! Converts annualized rates and risk targets into the per-period units of a return series.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::PortfolioError;
use crate::error::Result;

/// Sampling frequency of a return series.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Frequency {
  #[default]
  Daily,
  Weekly,
  Monthly,
}

/// How an annual quantity shrinks to one period.
///
/// `Linear` divides by the annualization factor (exponent 0 in the scaling tables, used
/// for returns and rates), `SqrtTime` divides by its square root (exponent 0.5, dispersion
/// measures) and `Invariant` leaves the value untouched (drawdown measures).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scaling {
  Linear,
  SqrtTime,
  Invariant,
}

impl Frequency {
  /// Number of periods per year.
  pub fn factor(&self) -> f64 {
    match self {
      Self::Daily => 252.0,
      Self::Weekly => 52.0,
      Self::Monthly => 12.0,
    }
  }

  /// Single-letter code (`D`, `W`, `M`).
  pub fn code(&self) -> &'static str {
    match self {
      Self::Daily => "D",
      Self::Weekly => "W",
      Self::Monthly => "M",
    }
  }

  /// Convert an annual value to per-period units.
  pub fn to_period(&self, annual: f64, scaling: Scaling) -> f64 {
    match scaling {
      Scaling::Linear => annual / self.factor(),
      Scaling::SqrtTime => annual / self.factor().sqrt(),
      Scaling::Invariant => annual,
    }
  }
}

impl Display for Frequency {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.code())
  }
}

impl FromStr for Frequency {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_uppercase().as_str() {
      "D" => Ok(Self::Daily),
      "W" => Ok(Self::Weekly),
      "M" => Ok(Self::Monthly),
      _ => Err(PortfolioError::UnsupportedFrequency(s.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  #[test]
  fn factors_match_trading_calendar() {
    assert_eq!("D".parse::<Frequency>().unwrap().factor(), 252.0);
    assert_eq!("w".parse::<Frequency>().unwrap().factor(), 52.0);
    assert_eq!("M".parse::<Frequency>().unwrap().factor(), 12.0);
  }

  #[test]
  fn unknown_codes_are_rejected() {
    assert_eq!(
      "Q".parse::<Frequency>(),
      Err(PortfolioError::UnsupportedFrequency("Q".to_string()))
    );
  }

  #[test]
  fn sqrt_time_scaling_round_trips() {
    for freq in [Frequency::Daily, Frequency::Weekly, Frequency::Monthly] {
      for x in [0.05, 0.2, 1.3] {
        let period = freq.to_period(x, Scaling::SqrtTime);
        assert_relative_eq!(period * freq.factor().sqrt(), x, epsilon = 1e-12);
      }
    }
  }

  #[test]
  fn invariant_scaling_is_identity() {
    for freq in [Frequency::Daily, Frequency::Weekly, Frequency::Monthly] {
      assert_eq!(freq.to_period(0.1, Scaling::Invariant), 0.1);
    }
  }

  #[test]
  fn linear_scaling_divides_by_factor() {
    assert_relative_eq!(Frequency::Monthly.to_period(0.12, Scaling::Linear), 0.01, epsilon = 1e-12);
  }
}

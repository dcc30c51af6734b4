//! # Data
//!
//! $$
//! r_{t,i} = \frac{P_{t,i}}{P_{t-1,i}} - 1 \quad\text{or}\quad \ln\frac{P_{t,i}}{P_{t-1,i}}
//! $$
//!
//! Price tables, return matrices, return processing and the provider contracts consumed by
//! the optimizer.

pub mod prices;
pub mod provider;
pub mod returns;

pub use prices::Period;
pub use prices::PriceTable;
pub use provider::AttributeProvider;
pub use provider::InMemoryProvider;
pub use provider::ReturnProvider;
pub use provider::ReturnsRequest;
pub use provider::StaticAttributes;
pub use returns::Interpolation;
pub use returns::ReturnMatrix;
pub use returns::process_returns;

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::error::PortfolioError;
use crate::error::Result;

/// Shared shape checks for date-indexed tables.
pub(crate) fn validate_index(
  dates: &[NaiveDate],
  assets: &[String],
  shape: (usize, usize),
) -> Result<()> {
  if shape.0 != dates.len() {
    return Err(PortfolioError::DimensionMismatch {
      expected: dates.len(),
      actual: shape.0,
    });
  }
  if shape.1 != assets.len() {
    return Err(PortfolioError::DimensionMismatch {
      expected: assets.len(),
      actual: shape.1,
    });
  }
  if dates.windows(2).any(|w| w[0] >= w[1]) {
    return Err(PortfolioError::invalid(
      "dates",
      "dates must be strictly increasing",
    ));
  }

  let mut seen = HashSet::with_capacity(assets.len());
  for asset in assets {
    if !seen.insert(asset.as_str()) {
      return Err(PortfolioError::invalid(
        "assets",
        format!("duplicate asset `{asset}`"),
      ));
    }
  }

  Ok(())
}

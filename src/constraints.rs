//! # Constraint Builder
//!
//! $$
//! b = \bar w_{\text{long}} - \bar w_{\text{short}},\qquad
//! r_{\min} = \frac{r^\*}{f},\qquad \bar\rho = \frac{\rho^\*}{f^{\,e(\rho)}}
//! $$
//!
//! Translates user-facing budget and target parameters into [`PortfolioSpec`] fields.

use tracing::debug;

use crate::catalog::RiskMeasure;
use crate::catalog::scale_exponent;
use crate::catalog::upper_bound_field;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::frequency::Frequency;
use crate::frequency::Scaling;
use crate::problem::PortfolioSpec;

/// Budget and target inputs, all in user (annual) units.
#[derive(Clone, Debug)]
pub struct ConstraintBuilder {
  /// Long budget.
  pub value: f64,
  /// Short budget, zero disables shorting.
  pub value_short: f64,
  /// Annual minimum return.
  pub target_return: Option<f64>,
  /// Annual maximum risk of `risk_measure`.
  pub target_risk: Option<f64>,
  pub risk_measure: RiskMeasure,
  pub freq: Frequency,
}

impl ConstraintBuilder {
  /// Budget-only builder.
  pub fn budget(value: f64, value_short: f64) -> Self {
    Self {
      value,
      value_short,
      target_return: None,
      target_risk: None,
      risk_measure: RiskMeasure::MV,
      freq: Frequency::Daily,
    }
  }

  /// Apply budget and targets.
  pub fn apply(&self, spec: &mut PortfolioSpec) -> Result<()> {
    self.apply_budget(spec)?;
    self.apply_targets(spec)
  }

  /// Long cap, short cap and net budget.
  pub fn apply_budget(&self, spec: &mut PortfolioSpec) -> Result<()> {
    if !self.value.is_finite() || self.value <= 0.0 {
      return Err(PortfolioError::invalid(
        "value",
        format!("long budget must be positive, got {}", self.value),
      ));
    }
    if !self.value_short.is_finite() || self.value_short < 0.0 {
      return Err(PortfolioError::invalid(
        "value_short",
        format!("short budget must be non-negative, got {}", self.value_short),
      ));
    }

    spec.upperlng = self.value;
    if self.value_short > 0.0 {
      spec.short = true;
      spec.uppersht = self.value_short;
      spec.budget = self.value - self.value_short;
    } else {
      spec.short = false;
      spec.uppersht = 0.0;
      spec.budget = self.value;
    }

    debug!(
      upperlng = spec.upperlng,
      uppersht = spec.uppersht,
      budget = spec.budget,
      short = spec.short,
      "budget constraints applied"
    );
    Ok(())
  }

  /// Minimum return and the measure-specific risk cap, converted to per-period units.
  pub fn apply_targets(&self, spec: &mut PortfolioSpec) -> Result<()> {
    if let Some(target_return) = self.target_return {
      spec.lowerret = Some(self.freq.to_period(target_return, Scaling::Linear));
    }

    if let Some(target_risk) = self.target_risk {
      let slot = upper_bound_field(self.risk_measure)?;
      let bound = self
        .freq
        .to_period(target_risk, scale_exponent(self.risk_measure));
      spec.bounds.set(slot, bound);
      debug!(field = slot.field_name(), bound, "risk bound applied");
    }

    Ok(())
  }
}

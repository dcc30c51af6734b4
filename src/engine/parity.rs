//! # Risk Parity
//!
//! $$
//! \min_{\mathbf{w}>0}\ \rho(\mathbf{w}) - c\sum_i b_i \ln w_i
//! $$
//!
//! Risk budgeting through the logarithmic barrier formulation: at the optimum every asset
//! contributes `b_i` of the total risk of any positively homogeneous measure. The relaxed
//! variant matches variance contributions in least squares with optional regularization
//! and a penalty towards the budget vector.

use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;

use super::NelderMeadEngine;
use super::classic::check_dimensions;
use super::risk::RiskContext;
use super::risk::portfolio_risk;
use super::solver::lower_violation;
use super::solver::minimize;
use super::solver::softmax;
use super::solver::tighten_lower;
use super::solver::within_lower;
use crate::catalog::RiskMeasure;
use crate::catalog::supports_risk_parity;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::problem::Moments;
use crate::problem::PortfolioSpec;
use crate::problem::RelaxationVersion;
use crate::weights::normalize_contributions;

/// Weight of the variance regularization of relaxed versions B and C.
pub const RRP_REGULARIZATION: f64 = 0.01;

/// Risk budget normalized to unit sum, equal when not given.
pub(crate) fn risk_budget(n: usize, contributions: Option<&[f64]>) -> Result<Array1<f64>> {
  match contributions {
    Some(b) => normalize_contributions(b, n).map(Array1::from),
    None => Ok(Array1::from_elem(n, 1.0 / n as f64)),
  }
}

fn normalized(w: &[f64]) -> Vec<f64> {
  let total: f64 = w.iter().sum();
  w.iter().map(|v| v / total).collect()
}

/// Risk budgeting portfolio, summing to one.
pub fn risk_parity(
  engine: &NelderMeadEngine,
  returns: &Array2<f64>,
  spec: &PortfolioSpec,
  moments: &Moments,
  contributions: Option<&[f64]>,
) -> Result<Option<Vec<f64>>> {
  let n = check_dimensions(returns, moments)?;
  if !supports_risk_parity(spec.risk_measure) {
    return Err(PortfolioError::RiskMeasureNotSupported {
      measure: spec.risk_measure.name(),
      context: "risk parity",
    });
  }
  let b = risk_budget(n, contributions)?;
  Ok(budgeted(engine, returns, spec, moments, &b))
}

/// Log-barrier risk budgeting for any measure of the catalog.
pub(crate) fn budgeted(
  engine: &NelderMeadEngine,
  returns: &Array2<f64>,
  spec: &PortfolioSpec,
  moments: &Moments,
  b: &Array1<f64>,
) -> Option<Vec<f64>> {
  let n = b.len();
  let ctx = RiskContext {
    alpha: spec.alpha,
    threshold: spec.risk_free,
    ..RiskContext::default()
  };
  let risk = |w: &[f64]| portfolio_risk(spec.risk_measure, w, returns, &moments.cov, &ctx);
  let expected = |w: &[f64]| moments.mu.iter().zip(w).map(|(m, v)| m * v).sum::<f64>();

  let equal = vec![1.0 / n as f64; n];
  let scale = risk(&equal).abs().max(1e-12);
  let target = spec.lowerret.map(|r| tighten_lower(r, engine.constraint_margin));

  let cost = |x: &[f64]| {
    let w: Vec<f64> = x.iter().map(|v| v.clamp(-30.0, 30.0).exp()).collect();
    let barrier: f64 = b.iter().zip(x).map(|(bi, xi)| bi * xi.clamp(-30.0, 30.0)).sum();
    let mut c = risk(&w) - scale * barrier;
    if let Some(r) = target {
      c += engine.penalty * scale * lower_violation(expected(&normalized(&w)), r);
    }
    c
  };

  debug!(measure = %spec.risk_measure, n, "risk parity solve");
  let x0: Vec<f64> = equal.iter().map(|v| v.ln()).collect();
  let x = minimize(cost, x0, engine.settings());
  let w = normalized(&x.iter().map(|v| v.clamp(-30.0, 30.0).exp()).collect::<Vec<_>>());

  if let Some(r) = spec.lowerret {
    if !within_lower(expected(&w), r, engine.feasibility_tol) {
      debug!(ret = expected(&w), lowerret = r, "risk parity misses the return target");
      return None;
    }
  }
  Some(w)
}

/// Relaxed risk parity on variance contributions, summing to one.
pub fn relaxed_risk_parity(
  engine: &NelderMeadEngine,
  returns: &Array2<f64>,
  spec: &PortfolioSpec,
  moments: &Moments,
  version: RelaxationVersion,
  penal_factor: f64,
  contributions: Option<&[f64]>,
) -> Result<Option<Vec<f64>>> {
  let n = check_dimensions(returns, moments)?;
  if spec.risk_measure != RiskMeasure::MV {
    return Err(PortfolioError::RiskMeasureNotSupported {
      measure: spec.risk_measure.name(),
      context: "relaxed risk parity",
    });
  }
  let b = risk_budget(n, contributions)?;
  let cov = &moments.cov;
  let theta = cov.diag().to_owned();
  let target = spec.lowerret.map(|r| tighten_lower(r, engine.constraint_margin));

  let cost = |x: &[f64]| {
    let w = Array1::from(softmax(x));
    let marginal = cov.dot(&w);
    let variance = w.dot(&marginal).max(1e-18);

    let mut c: f64 = w
      .iter()
      .zip(&marginal)
      .zip(&b)
      .map(|((wi, mi), bi)| (wi * mi / variance - bi).powi(2))
      .sum();
    if version != RelaxationVersion::A {
      let diagonal: f64 = w.iter().zip(&theta).map(|(wi, ti)| wi * wi * ti).sum();
      c += RRP_REGULARIZATION * diagonal / variance;
    }
    if version == RelaxationVersion::C {
      c += penal_factor * w.iter().zip(&b).map(|(wi, bi)| (wi - bi).powi(2)).sum::<f64>();
    }
    if let Some(r) = target {
      c += engine.penalty * lower_violation(moments.mu.dot(&w), r);
    }
    c
  };

  debug!(?version, penal_factor, n, "relaxed risk parity solve");
  let x = minimize(cost, vec![0.0; n], engine.settings());
  let w = softmax(&x);

  if let Some(r) = spec.lowerret {
    let ret: f64 = moments.mu.iter().zip(&w).map(|(m, v)| m * v).sum();
    if !within_lower(ret, r, engine.feasibility_tol) {
      debug!(ret, lowerret = r, "relaxed risk parity misses the return target");
      return Ok(None);
    }
  }
  Ok(Some(w))
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::engine::tests::sample_returns;

  fn diagonal_moments() -> Moments {
    Moments {
      mu: array![0.001, 0.0005],
      cov: array![[0.04, 0.0], [0.0, 0.01]],
    }
  }

  #[test]
  fn budgets_are_l1_normalized() {
    let b = risk_budget(3, Some(&[2.0, 1.0, 1.0])).unwrap();
    assert_abs_diff_eq!(b.sum(), 1.0, epsilon = 1e-15);
    assert_abs_diff_eq!(b[0], 0.5, epsilon = 1e-15);
    assert!(b[0] > b[1]);
    assert!(risk_budget(3, Some(&[1.0, -1.0, 1.0])).is_err());
    assert!(risk_budget(2, Some(&[0.0, 0.0])).is_err());
    assert!(risk_budget(2, Some(&[1.0])).is_err());
  }

  #[test]
  fn equal_risk_contribution_is_inverse_volatility_for_uncorrelated_assets() {
    let returns = sample_returns(20, 2, 1);
    let w = risk_parity(
      &NelderMeadEngine::default(),
      &returns,
      &PortfolioSpec::default(),
      &diagonal_moments(),
      None,
    )
    .unwrap()
    .unwrap();
    assert_abs_diff_eq!(w[0], 1.0 / 3.0, epsilon = 1e-3);
    assert_abs_diff_eq!(w[1], 2.0 / 3.0, epsilon = 1e-3);
  }

  #[test]
  fn custom_budget_shifts_the_weights() {
    let returns = sample_returns(20, 2, 1);
    let m = Moments {
      mu: array![0.001, 0.001],
      cov: array![[0.01, 0.0], [0.0, 0.01]],
    };
    let w = risk_parity(
      &NelderMeadEngine::default(),
      &returns,
      &PortfolioSpec::default(),
      &m,
      Some(&[4.0, 1.0]),
    )
    .unwrap()
    .unwrap();
    assert_abs_diff_eq!(w[0], 2.0 / 3.0, epsilon = 1e-3);
  }

  #[test]
  fn risk_parity_rejects_hierarchical_measures() {
    let returns = sample_returns(20, 2, 1);
    let spec = PortfolioSpec {
      risk_measure: RiskMeasure::TG,
      ..PortfolioSpec::default()
    };
    assert!(matches!(
      risk_parity(&NelderMeadEngine::default(), &returns, &spec, &diagonal_moments(), None),
      Err(PortfolioError::RiskMeasureNotSupported { .. })
    ));
  }

  #[test]
  fn risk_parity_rejects_worst_realization_and_plain_drawdowns() {
    let returns = sample_returns(20, 2, 1);
    for measure in [RiskMeasure::WR, RiskMeasure::MDD, RiskMeasure::ADD] {
      let spec = PortfolioSpec {
        risk_measure: measure,
        ..PortfolioSpec::default()
      };
      assert!(matches!(
        risk_parity(&NelderMeadEngine::default(), &returns, &spec, &diagonal_moments(), None),
        Err(PortfolioError::RiskMeasureNotSupported {
          context: "risk parity",
          ..
        })
      ));
    }
  }

  #[test]
  fn return_target_above_every_asset_is_infeasible() {
    let returns = sample_returns(20, 2, 1);
    let spec = PortfolioSpec {
      lowerret: Some(0.001 * 1.001),
      ..PortfolioSpec::default()
    };
    let engine = NelderMeadEngine::default();
    let m = diagonal_moments();
    assert!(risk_parity(&engine, &returns, &spec, &m, None).unwrap().is_none());
    let relaxed =
      relaxed_risk_parity(&engine, &returns, &spec, &m, RelaxationVersion::A, 1.0, None).unwrap();
    assert!(relaxed.is_none());
  }

  #[test]
  fn unreachable_return_is_infeasible() {
    let returns = sample_returns(20, 2, 1);
    let spec = PortfolioSpec {
      lowerret: Some(0.5),
      ..PortfolioSpec::default()
    };
    let w = risk_parity(&NelderMeadEngine::default(), &returns, &spec, &diagonal_moments(), None)
      .unwrap();
    assert!(w.is_none());
  }

  #[test]
  fn relaxed_version_a_matches_risk_parity() {
    let returns = sample_returns(20, 2, 1);
    let w = relaxed_risk_parity(
      &NelderMeadEngine::default(),
      &returns,
      &PortfolioSpec::default(),
      &diagonal_moments(),
      RelaxationVersion::A,
      1.0,
      None,
    )
    .unwrap()
    .unwrap();
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(w[0], 1.0 / 3.0, epsilon = 1e-3);
  }

  #[test]
  fn penalization_pulls_towards_the_budget() {
    let returns = sample_returns(20, 2, 1);
    let solve = |version| {
      relaxed_risk_parity(
        &NelderMeadEngine::default(),
        &returns,
        &PortfolioSpec::default(),
        &diagonal_moments(),
        version,
        10.0,
        None,
      )
      .unwrap()
      .unwrap()
    };
    let b = solve(RelaxationVersion::B);
    let c = solve(RelaxationVersion::C);
    assert!((c[0] - 0.5).abs() < (b[0] - 0.5).abs());
  }
}

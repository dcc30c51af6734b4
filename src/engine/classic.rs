//! # Classic Mean-Risk
//!
//! $$
//! \max_{\mathbf{w}}\ \frac{\mu^\top\mathbf{w} - r_f}{\rho(\mathbf{w})}
//! \quad\text{s.t.}\quad \mathbf{1}^\top\mathbf{w} = b,\ \mu^\top\mathbf{w} \ge r_{\min},
//! \ \rho_k(\mathbf{w}) \le \bar\rho_k
//! $$
//!
//! Sharpe, minimum risk, utility and maximum return portfolios. Constraints enter the
//! Nelder-Mead objective as relative quadratic penalties and are re-checked on the final
//! point; a point outside the tolerance is reported as infeasible.

use ndarray::Array2;
use tracing::debug;

use super::NelderMeadEngine;
use super::risk::RiskContext;
use super::risk::portfolio_risk;
use super::solver::WeightMap;
use super::solver::lower_violation;
use super::solver::minimize;
use super::solver::tighten_lower;
use super::solver::tighten_upper;
use super::solver::upper_violation;
use super::solver::within_lower;
use super::solver::within_upper;
use crate::catalog::UpperBound;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::problem::Moments;
use crate::problem::Objective;
use crate::problem::PortfolioSpec;

pub(crate) fn check_dimensions(returns: &Array2<f64>, moments: &Moments) -> Result<usize> {
  let n = returns.ncols();
  if n == 0 {
    return Err(PortfolioError::InsufficientData(
      "the return matrix has no assets".to_string(),
    ));
  }
  if moments.mu.len() != n {
    return Err(PortfolioError::DimensionMismatch {
      expected: n,
      actual: moments.mu.len(),
    });
  }
  if moments.cov.nrows() != n || moments.cov.ncols() != n {
    return Err(PortfolioError::DimensionMismatch {
      expected: n,
      actual: moments.cov.nrows().max(moments.cov.ncols()),
    });
  }
  Ok(n)
}

struct Evaluation {
  weights: Vec<f64>,
  ret: f64,
  risk: f64,
}

/// Solve one mean-risk problem. `Ok(None)` when the constraints cannot be met.
pub fn optimize(
  engine: &NelderMeadEngine,
  returns: &Array2<f64>,
  spec: &PortfolioSpec,
  moments: &Moments,
) -> Result<Option<Vec<f64>>> {
  let n = check_dimensions(returns, moments)?;
  if spec.objective == Objective::Erc {
    return Err(PortfolioError::invalid(
      "objective",
      "ERC is a risk parity objective",
    ));
  }

  let ctx = RiskContext {
    alpha: spec.alpha,
    threshold: spec.risk_free,
    ..RiskContext::default()
  };
  let map = WeightMap {
    n,
    budget: spec.budget,
    upperlng: spec.upperlng,
    uppersht: spec.uppersht,
    short: spec.short,
  };
  let bounds = spec.bounds.active();
  let margin = engine.constraint_margin;

  let evaluate = |x: &[f64]| {
    let weights = map.decode(x);
    let ret = moments.mu.iter().zip(&weights).map(|(m, w)| m * w).sum::<f64>();
    let risk = portfolio_risk(spec.risk_measure, &weights, returns, &moments.cov, &ctx);
    Evaluation { weights, ret, risk }
  };
  let bound_risk = |slot: UpperBound, weights: &[f64]| {
    portfolio_risk(slot.measure(), weights, returns, &moments.cov, &ctx)
  };

  let violation = |e: &Evaluation| {
    let mut v = 0.0;
    if let Some(r) = spec.lowerret {
      v += lower_violation(e.ret, tighten_lower(r, margin));
    }
    for (slot, bound) in &bounds {
      v += upper_violation(bound_risk(*slot, &e.weights), tighten_upper(*bound, margin));
    }
    v
  };

  let cost = |x: &[f64]| {
    let e = evaluate(x);
    let objective = match spec.objective {
      Objective::MinRisk | Objective::Erc => e.risk,
      Objective::Utility => -(e.ret - spec.risk_aversion * e.risk),
      Objective::Sharpe => -(e.ret - spec.risk_free) / e.risk.max(1e-12),
      Objective::MaxRet => -e.ret,
    };
    objective + engine.penalty * violation(&e)
  };

  debug!(
    objective = %spec.objective,
    measure = %spec.risk_measure,
    n,
    bounds = bounds.len(),
    "classic solve"
  );
  let x = minimize(cost, map.x0(), engine.settings());
  let e = evaluate(&x);

  let tol = engine.feasibility_tol;
  let mut feasible = e.weights.iter().all(|w| w.is_finite());
  if let Some(r) = spec.lowerret {
    feasible &= within_lower(e.ret, r, tol);
  }
  for (slot, bound) in &bounds {
    feasible &= within_upper(bound_risk(*slot, &e.weights), *bound, tol);
  }

  if !feasible {
    debug!(ret = e.ret, risk = e.risk, "classic solution violates the constraints");
    return Ok(None);
  }
  Ok(Some(e.weights))
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array1;

  use super::*;
  use crate::catalog::RiskMeasure;
  use crate::engine::estimators::sample_covariance;
  use crate::engine::tests::sample_returns;

  fn moments(returns: &Array2<f64>) -> Moments {
    Moments {
      mu: returns.mean_axis(ndarray::Axis(0)).unwrap(),
      cov: sample_covariance(returns, 1),
    }
  }

  #[test]
  fn min_risk_beats_equal_weights() {
    let returns = sample_returns(250, 3, 7);
    let m = moments(&returns);
    let spec = PortfolioSpec {
      objective: Objective::MinRisk,
      ..PortfolioSpec::default()
    };

    let w = optimize(&NelderMeadEngine::default(), &returns, &spec, &m)
      .unwrap()
      .unwrap();
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(w.iter().all(|v| *v >= 0.0));

    let ctx = RiskContext::default();
    let equal = [1.0 / 3.0; 3];
    let risk = portfolio_risk(RiskMeasure::MV, &w, &returns, &m.cov, &ctx);
    let equal_risk = portfolio_risk(RiskMeasure::MV, &equal, &returns, &m.cov, &ctx);
    assert!(risk <= equal_risk + 1e-12);
  }

  #[test]
  fn max_return_concentrates_on_the_best_asset() {
    let returns = sample_returns(250, 3, 11);
    let mut m = moments(&returns);
    m.mu = Array1::from(vec![0.001, 0.003, 0.002]);
    let spec = PortfolioSpec {
      objective: Objective::MaxRet,
      ..PortfolioSpec::default()
    };

    let w = optimize(&NelderMeadEngine::default(), &returns, &spec, &m)
      .unwrap()
      .unwrap();
    assert!(w[1] > 0.9, "{w:?}");
  }

  #[test]
  fn unreachable_return_target_is_infeasible() {
    let returns = sample_returns(250, 3, 3);
    let spec = PortfolioSpec {
      objective: Objective::Sharpe,
      lowerret: Some(1.0),
      ..PortfolioSpec::default()
    };
    let w = optimize(&NelderMeadEngine::default(), &returns, &spec, &moments(&returns)).unwrap();
    assert!(w.is_none());
  }

  #[test]
  fn unreachable_risk_bound_is_infeasible() {
    let returns = sample_returns(250, 3, 5);
    let mut spec = PortfolioSpec {
      objective: Objective::MaxRet,
      ..PortfolioSpec::default()
    };
    spec.bounds.set(UpperBound::Dev, 1e-6);
    let w = optimize(&NelderMeadEngine::default(), &returns, &spec, &moments(&returns)).unwrap();
    assert!(w.is_none());
  }

  #[test]
  fn shorting_nets_to_the_budget() {
    let spec = PortfolioSpec {
      objective: Objective::MinRisk,
      short: true,
      upperlng: 1.0,
      uppersht: 0.3,
      budget: 0.7,
      ..PortfolioSpec::default()
    };
    for seed in [13, 1, 2, 3, 4] {
      let returns = sample_returns(250, 3, seed);
      let w = optimize(&NelderMeadEngine::default(), &returns, &spec, &moments(&returns))
        .unwrap()
        .unwrap();
      assert_abs_diff_eq!(w.iter().sum::<f64>(), 0.7, epsilon = 1e-5);
      let short: f64 = w.iter().filter(|v| **v < 0.0).map(|v| -v).sum();
      assert!(short <= 0.3 + 1e-9, "seed {seed}: short leg {short}");
    }
  }

  #[test]
  fn return_target_just_above_the_best_asset_is_infeasible() {
    let returns = sample_returns(250, 3, 21);
    let mut m = moments(&returns);
    m.mu = Array1::from(vec![0.001, 0.002, 0.0015]);
    let spec = PortfolioSpec {
      objective: Objective::MinRisk,
      lowerret: Some(0.002 * 1.001),
      ..PortfolioSpec::default()
    };
    let w = optimize(&NelderMeadEngine::default(), &returns, &spec, &m).unwrap();
    assert!(w.is_none(), "{w:?}");
  }

  #[test]
  fn reachable_return_target_is_met_without_slack() {
    let returns = sample_returns(250, 3, 21);
    let mut m = moments(&returns);
    m.mu = Array1::from(vec![0.001, 0.002, 0.0015]);
    let spec = PortfolioSpec {
      objective: Objective::MinRisk,
      lowerret: Some(0.0018),
      ..PortfolioSpec::default()
    };
    let w = optimize(&NelderMeadEngine::default(), &returns, &spec, &m)
      .unwrap()
      .unwrap();
    let ret: f64 = m.mu.iter().zip(&w).map(|(a, b)| a * b).sum();
    assert!(ret >= 0.0018, "{ret}");
  }

  #[test]
  fn mismatched_moments_are_rejected() {
    let returns = sample_returns(50, 3, 1);
    let m = Moments {
      mu: Array1::zeros(2),
      cov: Array2::eye(3),
    };
    assert!(matches!(
      optimize(&NelderMeadEngine::default(), &returns, &PortfolioSpec::default(), &m),
      Err(PortfolioError::DimensionMismatch { expected: 3, actual: 2 })
    ));
  }

  #[test]
  fn erc_objective_is_rejected() {
    let returns = sample_returns(50, 2, 1);
    let spec = PortfolioSpec {
      objective: Objective::Erc,
      ..PortfolioSpec::default()
    };
    assert!(matches!(
      optimize(&NelderMeadEngine::default(), &returns, &spec, &moments(&returns)),
      Err(PortfolioError::InvalidParameter { .. })
    ));
  }
}

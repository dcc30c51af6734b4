//! # Optimization Engine
//!
//! $$
//! (\mathbf{R}, \text{problem}) \mapsto \mathbf{w}^\* \in \mathbb{R}^N \cup \{\varnothing\}
//! $$
//!
//! Contract between the dispatcher and the numerical back end, plus the derivative-free
//! reference implementation. `Ok(None)` means the problem has no feasible solution, `Err`
//! means the request itself is malformed or outside what the engine supports.

pub mod classic;
pub mod codependence;
pub mod estimators;
pub mod hierarchical;
pub mod linkage;
pub mod parity;
pub mod risk;
pub(crate) mod solver;

use impl_new_derive::ImplNew;
use ndarray::Array2;

use crate::data::ReturnMatrix;
use crate::error::Result;
use crate::problem::CovarianceEstimator;
use crate::problem::HierarchicalProblem;
use crate::problem::MeanEstimator;
use crate::problem::Moments;
use crate::problem::PortfolioSpec;
use crate::problem::RelaxationVersion;
use solver::SolverSettings;

/// Numerical back end used by [`crate::optimizer::PortfolioOptimizer`].
pub trait OptimizationEngine {
  /// Expected returns and covariance of the asset returns.
  fn asset_moments(
    &self,
    returns: &ReturnMatrix,
    mean: MeanEstimator,
    covariance: CovarianceEstimator,
    d_ewma: f64,
  ) -> Result<Moments>;

  /// Correlation matrix with an exact unit diagonal.
  fn correlation_from_covariance(&self, cov: &Array2<f64>) -> Array2<f64>;

  /// Classic mean-risk portfolio.
  fn optimize(
    &self,
    returns: &ReturnMatrix,
    spec: &PortfolioSpec,
    moments: &Moments,
  ) -> Result<Option<Vec<f64>>>;

  /// Risk budgeting portfolio; `None` contributions mean equal risk.
  fn risk_parity(
    &self,
    returns: &ReturnMatrix,
    spec: &PortfolioSpec,
    moments: &Moments,
    contributions: Option<&[f64]>,
  ) -> Result<Option<Vec<f64>>>;

  fn relaxed_risk_parity(
    &self,
    returns: &ReturnMatrix,
    spec: &PortfolioSpec,
    moments: &Moments,
    version: RelaxationVersion,
    penal_factor: f64,
    contributions: Option<&[f64]>,
  ) -> Result<Option<Vec<f64>>>;

  /// HRP, HERC or NCO portfolio.
  fn hierarchical(
    &self,
    returns: &ReturnMatrix,
    problem: &HierarchicalProblem,
  ) -> Result<Option<Vec<f64>>>;
}

/// Reference engine: sample estimators plus penalized Nelder-Mead.
#[derive(ImplNew, Clone, Debug)]
pub struct NelderMeadEngine {
  /// Iterations per Nelder-Mead run.
  pub max_iters: u64,
  /// Simplex standard deviation at which a run stops.
  pub sd_tolerance: f64,
  /// Weight of the constraint penalty.
  pub penalty: f64,
  /// Relative margin by which return and risk bounds are tightened inside the penalty.
  pub constraint_margin: f64,
  /// Relative slack accepted when re-checking the original bounds on the solution.
  pub feasibility_tol: f64,
}

impl Default for NelderMeadEngine {
  fn default() -> Self {
    Self {
      max_iters: 5000,
      sd_tolerance: 1e-12,
      penalty: 1e4,
      constraint_margin: 1e-3,
      feasibility_tol: 1e-8,
    }
  }
}

impl NelderMeadEngine {
  pub(crate) fn settings(&self) -> SolverSettings {
    SolverSettings {
      max_iters: self.max_iters,
      sd_tolerance: self.sd_tolerance,
      restarts: 3,
    }
  }
}

impl OptimizationEngine for NelderMeadEngine {
  fn asset_moments(
    &self,
    returns: &ReturnMatrix,
    mean: MeanEstimator,
    covariance: CovarianceEstimator,
    d_ewma: f64,
  ) -> Result<Moments> {
    Ok(Moments {
      mu: estimators::mean_vector(returns.values(), mean, d_ewma)?,
      cov: estimators::covariance_matrix(returns.values(), covariance, d_ewma)?,
    })
  }

  fn correlation_from_covariance(&self, cov: &Array2<f64>) -> Array2<f64> {
    estimators::correlation_from_covariance(cov)
  }

  fn optimize(
    &self,
    returns: &ReturnMatrix,
    spec: &PortfolioSpec,
    moments: &Moments,
  ) -> Result<Option<Vec<f64>>> {
    classic::optimize(self, returns.values(), spec, moments)
  }

  fn risk_parity(
    &self,
    returns: &ReturnMatrix,
    spec: &PortfolioSpec,
    moments: &Moments,
    contributions: Option<&[f64]>,
  ) -> Result<Option<Vec<f64>>> {
    parity::risk_parity(self, returns.values(), spec, moments, contributions)
  }

  fn relaxed_risk_parity(
    &self,
    returns: &ReturnMatrix,
    spec: &PortfolioSpec,
    moments: &Moments,
    version: RelaxationVersion,
    penal_factor: f64,
    contributions: Option<&[f64]>,
  ) -> Result<Option<Vec<f64>>> {
    parity::relaxed_risk_parity(
      self,
      returns.values(),
      spec,
      moments,
      version,
      penal_factor,
      contributions,
    )
  }

  fn hierarchical(
    &self,
    returns: &ReturnMatrix,
    problem: &HierarchicalProblem,
  ) -> Result<Option<Vec<f64>>> {
    hierarchical::hierarchical(self, returns.values(), problem)
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;
  use rand::SeedableRng;
  use rand::rngs::StdRng;
  use rand_distr::Distribution;
  use rand_distr::Normal;

  use super::*;

  /// Two-factor return panel: even columns load on the first factor, odd on the second.
  pub(crate) fn sample_returns(periods: usize, assets: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut out = Array2::zeros((periods, assets));
    for t in 0..periods {
      let factors = [normal.sample(&mut rng), normal.sample(&mut rng)];
      for j in 0..assets {
        let drift = 0.0002 * (j + 1) as f64;
        let loading = 0.006 + 0.002 * (j / 2) as f64;
        let idio = 0.004 * (1.0 + 0.5 * j as f64);
        out[[t, j]] = drift + loading * factors[j % 2] + idio * normal.sample(&mut rng);
      }
    }
    out
  }

  #[test]
  fn constructor_sets_every_field() {
    let engine = NelderMeadEngine::new(100, 1e-8, 10.0, 1e-2, 1e-6);
    assert_eq!(engine.max_iters, 100);
    assert_eq!(engine.settings().max_iters, 100);
    assert_eq!(engine.constraint_margin, 1e-2);
    assert_eq!(engine.feasibility_tol, 1e-6);
  }

  #[test]
  fn moments_follow_the_estimators() {
    let values = sample_returns(120, 3, 9);
    let dates = (0..120)
      .map(|d| chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(d))
      .collect();
    let assets = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    let returns = ReturnMatrix::new(dates, assets, values.clone()).unwrap();

    let engine = NelderMeadEngine::default();
    let m = engine
      .asset_moments(&returns, MeanEstimator::Hist, CovarianceEstimator::Hist, 0.94)
      .unwrap();
    assert_eq!(m.mu.len(), 3);
    let hist = estimators::sample_covariance(&values, 1);
    for (a, b) in m.cov.iter().zip(hist.iter()) {
      assert_abs_diff_eq!(*a, *b, epsilon = 1e-15);
    }

    let corr = engine.correlation_from_covariance(&m.cov);
    for i in 0..3 {
      assert_eq!(corr[[i, i]], 1.0);
    }
  }
}

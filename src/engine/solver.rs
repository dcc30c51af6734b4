//! # Penalized Nelder-Mead
//!
//! $$
//! \min_{\mathbf{x}}\ f(\mathbf{w}(\mathbf{x})) + \lambda\sum_k \max(g_k(\mathbf{w}),0)^2
//! $$
//!
//! Derivative-free minimization over an unconstrained parameterization of the weights.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::solver::neldermead::NelderMead;
use tracing::debug;

/// Numerically stable softmax.
pub(crate) fn softmax(x: &[f64]) -> Vec<f64> {
  if x.is_empty() {
    return Vec::new();
  }

  let max_x = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let exps: Vec<f64> = x.iter().map(|&v| (v - max_x).exp()).collect();
  let sum: f64 = exps.iter().sum();

  if sum < 1e-15 || !sum.is_finite() {
    vec![1.0 / x.len() as f64; x.len()]
  } else {
    exps.iter().map(|&e| e / sum).collect()
  }
}

fn sigmoid(v: f64) -> f64 {
  1.0 / (1.0 + (-v).exp())
}

/// Map from solver coordinates to portfolio weights.
///
/// Long-only weights are `budget * softmax(x)`. With shorting the long leg total moves
/// between `max(budget, 0)` and `min(upperlng, budget + uppersht)` through a slack
/// coordinate, and the short leg holds exactly what the long leg exceeds the net budget by.
/// Every decoded point nets to `budget` and keeps the short leg within `uppersht`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WeightMap {
  pub n: usize,
  pub budget: f64,
  pub upperlng: f64,
  pub uppersht: f64,
  pub short: bool,
}

impl WeightMap {
  pub fn long_only(n: usize, budget: f64) -> Self {
    Self {
      n,
      budget,
      upperlng: budget,
      uppersht: 0.0,
      short: false,
    }
  }

  pub fn dim(&self) -> usize {
    if self.short {
      2 * self.n + 1
    } else {
      self.n
    }
  }

  pub fn x0(&self) -> Vec<f64> {
    let mut x = vec![0.0; self.dim()];
    if self.short {
      // Start close to the smallest admissible short leg.
      x[self.n] = -2.0;
    }
    x
  }

  pub fn decode(&self, x: &[f64]) -> Vec<f64> {
    if !self.short {
      return softmax(x).into_iter().map(|w| w * self.budget).collect();
    }

    let lo = self.budget.max(0.0);
    let hi = self.upperlng.min(self.budget + self.uppersht).max(lo);
    let long_total = lo + sigmoid(x[self.n]) * (hi - lo);
    let short_total = long_total - self.budget;

    softmax(&x[..self.n])
      .into_iter()
      .zip(softmax(&x[self.n + 1..]))
      .map(|(l, s)| l * long_total - s * short_total)
      .collect()
  }
}

struct PenalizedCost<F> {
  f: F,
}

impl<F> CostFunction for PenalizedCost<F>
where
  F: Fn(&[f64]) -> f64,
{
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let c = (self.f)(x.as_slice());
    Ok(if c.is_finite() { c } else { 1e10 })
  }
}

/// Solver budget.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SolverSettings {
  pub max_iters: u64,
  pub sd_tolerance: f64,
  pub restarts: usize,
}

fn axis_simplex(x0: &[f64], step: f64) -> Vec<Vec<f64>> {
  let mut simplex = Vec::with_capacity(x0.len() + 1);
  simplex.push(x0.to_vec());
  for i in 0..x0.len() {
    let mut point = x0.to_vec();
    point[i] += step;
    simplex.push(point);
  }
  simplex
}

/// Minimize `f` starting at `x0`, restarting from the incumbent to escape collapsed simplices.
pub(crate) fn minimize<F>(f: F, x0: Vec<f64>, settings: SolverSettings) -> Vec<f64>
where
  F: Fn(&[f64]) -> f64,
{
  if x0.is_empty() {
    return x0;
  }

  let mut best = x0;
  let mut best_cost = f(best.as_slice());
  let mut step = 1.0;

  for round in 0..settings.restarts.max(1) {
    let simplex = axis_simplex(&best, step);
    let solver = match NelderMead::new(simplex).with_sd_tolerance(settings.sd_tolerance) {
      Ok(solver) => solver,
      Err(err) => {
        debug!(%err, "nelder-mead setup failed");
        break;
      }
    };

    let cost = PenalizedCost { f: &f };
    match Executor::new(cost, solver)
      .configure(|state| state.max_iters(settings.max_iters))
      .run()
    {
      Ok(res) => {
        if let Some(x) = res.state.best_param {
          let c = f(x.as_slice());
          if c < best_cost {
            best_cost = c;
            best = x;
          }
        }
      }
      Err(err) => {
        debug!(%err, round, "nelder-mead run failed");
        break;
      }
    }

    step *= 0.5;
  }

  best
}

/// Squared relative violation of `value <= bound`.
pub(crate) fn upper_violation(value: f64, bound: f64) -> f64 {
  let scale = bound.abs().max(1e-8);
  ((value - bound).max(0.0) / scale).powi(2)
}

/// Squared relative violation of `value >= bound`.
pub(crate) fn lower_violation(value: f64, bound: f64) -> f64 {
  let scale = bound.abs().max(1e-8);
  ((bound - value).max(0.0) / scale).powi(2)
}

/// `bound` moved inward by a relative `margin`, so that the penalized optimum lands on the
/// feasible side of an upper bound.
pub(crate) fn tighten_upper(bound: f64, margin: f64) -> f64 {
  bound - margin * bound.abs().max(MARGIN_FLOOR)
}

/// Lower-bound counterpart of [`tighten_upper`].
pub(crate) fn tighten_lower(bound: f64, margin: f64) -> f64 {
  bound + margin * bound.abs().max(MARGIN_FLOOR)
}

const MARGIN_FLOOR: f64 = 1e-6;

/// `value <= bound` up to a relative tolerance.
pub(crate) fn within_upper(value: f64, bound: f64, tol: f64) -> bool {
  value <= bound + tol * bound.abs() + 1e-14
}

/// `value >= bound` up to a relative tolerance.
pub(crate) fn within_lower(value: f64, bound: f64, tol: f64) -> bool {
  value >= bound - tol * bound.abs() - 1e-14
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn settings() -> SolverSettings {
    SolverSettings {
      max_iters: 2000,
      sd_tolerance: 1e-12,
      restarts: 2,
    }
  }

  #[test]
  fn softmax_is_a_probability_vector() {
    let w = softmax(&[1000.0, 0.0, -1000.0]);
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-12);
  }

  #[test]
  fn minimizes_a_shifted_quadratic() {
    let x = minimize(
      |x: &[f64]| (x[0] - 1.5).powi(2) + (x[1] + 0.5).powi(2),
      vec![0.0, 0.0],
      settings(),
    );
    assert_abs_diff_eq!(x[0], 1.5, epsilon = 1e-4);
    assert_abs_diff_eq!(x[1], -0.5, epsilon = 1e-4);
  }

  #[test]
  fn long_only_map_respects_budget() {
    let map = WeightMap::long_only(3, 0.7);
    let w = map.decode(&[0.3, -1.0, 2.0]);
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 0.7, epsilon = 1e-12);
    assert!(w.iter().all(|v| *v > 0.0));
  }

  #[test]
  fn short_map_nets_to_budget_exactly() {
    let map = WeightMap {
      n: 3,
      budget: 0.7,
      upperlng: 1.0,
      uppersht: 0.3,
      short: true,
    };
    for slack in [-40.0, -2.0, 0.0, 3.0, 40.0] {
      let mut x = map.x0();
      x[0] = 1.5;
      x[3] = slack;
      x[5] = -0.7;
      let w = map.decode(&x);
      assert_abs_diff_eq!(w.iter().sum::<f64>(), 0.7, epsilon = 1e-12);
      let short: f64 = w.iter().filter(|v| **v < 0.0).map(|v| -v).sum();
      assert!(short <= 0.3 + 1e-12, "short leg {short} at slack {slack}");
      let long: f64 = w.iter().filter(|v| **v > 0.0).sum();
      assert!(long <= 1.0 + 1e-12);
    }
  }

  #[test]
  fn violations_are_relative() {
    assert_eq!(upper_violation(0.5, 1.0), 0.0);
    assert_abs_diff_eq!(upper_violation(1.1, 1.0), 0.01, epsilon = 1e-12);
    assert_abs_diff_eq!(lower_violation(0.9, 1.0), 0.01, epsilon = 1e-12);
    assert!(within_upper(1.0 + 1e-9, 1.0, 1e-8));
    assert!(!within_upper(1.001, 1.0, 1e-8));
    assert!(!within_lower(0.999, 1.0, 1e-8));
  }

  #[test]
  fn tightened_bounds_move_inward() {
    assert_abs_diff_eq!(tighten_lower(0.002, 1e-3), 0.002002, epsilon = 1e-15);
    assert_abs_diff_eq!(tighten_lower(-0.002, 1e-3), -0.001998, epsilon = 1e-15);
    assert_abs_diff_eq!(tighten_upper(0.2, 1e-3), 0.1998, epsilon = 1e-15);
    assert!(tighten_lower(0.0, 1e-3) > 0.0);
  }
}

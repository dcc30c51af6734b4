//! # Risk Functionals
//!
//! $$
//! \operatorname{CVaR}_\alpha(X) = \operatorname{VaR}_\alpha(X)
//!   + \frac{1}{\alpha T}\sum_{t}\max(-X_t-\operatorname{VaR}_\alpha(X),0)
//! $$
//!
//! Empirical risk of a single return series, for every measure of the catalog. Drawdown
//! measures work on the cumulative path `[0, cumsum(X)]`; the `_Rel` variants compound.

use ndarray::Array2;
use ndarray::ArrayView1;

use crate::catalog::RiskMeasure;

/// Tail and threshold parameters shared by the functionals.
#[derive(Clone, Copy, Debug)]
pub struct RiskContext {
  /// Significance level of loss tails.
  pub alpha: f64,
  /// Number of CVaRs averaged by tail Gini of losses.
  pub a_sim: usize,
  /// Significance level of gain tails (range measures).
  pub beta: f64,
  /// Number of CVaRs averaged by tail Gini of gains.
  pub b_sim: usize,
  /// Minimum acceptable return of the lower partial moments.
  pub threshold: f64,
}

impl Default for RiskContext {
  fn default() -> Self {
    Self {
      alpha: 0.05,
      a_sim: 100,
      beta: 0.05,
      b_sim: 100,
      threshold: 0.0,
    }
  }
}

fn mean(x: &[f64]) -> f64 {
  if x.is_empty() {
    0.0
  } else {
    x.iter().sum::<f64>() / x.len() as f64
  }
}

fn denom(x: &[f64]) -> f64 {
  (x.len().max(2) - 1) as f64
}

pub fn std_dev(x: &[f64]) -> f64 {
  let m = mean(x);
  (x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / denom(x)).sqrt()
}

pub fn mad(x: &[f64]) -> f64 {
  let m = mean(x);
  mean(&x.iter().map(|v| (v - m).abs()).collect::<Vec<_>>())
}

pub fn semi_dev(x: &[f64]) -> f64 {
  let m = mean(x);
  (x.iter().map(|v| (v - m).min(0.0).powi(2)).sum::<f64>() / denom(x)).sqrt()
}

pub fn flpm(x: &[f64], threshold: f64) -> f64 {
  mean(&x.iter().map(|v| (threshold - v).max(0.0)).collect::<Vec<_>>())
}

pub fn slpm(x: &[f64], threshold: f64) -> f64 {
  (x.iter().map(|v| (threshold - v).max(0.0).powi(2)).sum::<f64>() / denom(x)).sqrt()
}

fn sorted(x: &[f64]) -> Vec<f64> {
  let mut s = x.to_vec();
  s.sort_by(f64::total_cmp);
  s
}

fn tail_index(len: usize, alpha: f64) -> usize {
  let k = ((len as f64) * alpha.clamp(0.0, 1.0)).ceil() as usize;
  k.clamp(1, len.max(1)) - 1
}

pub fn value_at_risk(x: &[f64], alpha: f64) -> f64 {
  if x.is_empty() {
    return 0.0;
  }
  -sorted(x)[tail_index(x.len(), alpha)]
}

pub fn cvar(x: &[f64], alpha: f64) -> f64 {
  if x.is_empty() {
    return 0.0;
  }
  let var = value_at_risk(x, alpha);
  let excess: f64 = x.iter().map(|v| (-v - var).max(0.0)).sum();
  var + excess / (alpha.max(1e-12) * x.len() as f64)
}

pub fn worst_realization(x: &[f64]) -> f64 {
  -x.iter().cloned().fold(f64::INFINITY, f64::min)
}

fn log_mean_exp(x: &[f64], scale: f64) -> f64 {
  let m = x
    .iter()
    .map(|v| v * scale)
    .fold(f64::NEG_INFINITY, f64::max);
  let s: f64 = x.iter().map(|v| (v * scale - m).exp()).sum();
  m + (s / x.len() as f64).ln()
}

/// Entropic value at risk, `min_{z>0} z ln(E[exp(-X/z)] / alpha)`, bounded above by the
/// worst realization it converges to as `z -> 0`.
pub fn evar(x: &[f64], alpha: f64) -> f64 {
  if x.is_empty() {
    return 0.0;
  }

  let objective = |log_z: f64| {
    let z = log_z.exp();
    z * (log_mean_exp(x, -1.0 / z) - alpha.max(1e-12).ln())
  };

  // Golden section over ln z.
  let ratio = (5f64.sqrt() - 1.0) / 2.0;
  let (mut a, mut b) = (-25.0_f64, 10.0_f64);
  let mut c = b - ratio * (b - a);
  let mut d = a + ratio * (b - a);
  let (mut fc, mut fd) = (objective(c), objective(d));
  for _ in 0..200 {
    if fc < fd {
      b = d;
      d = c;
      fd = fc;
      c = b - ratio * (b - a);
      fc = objective(c);
    } else {
      a = c;
      c = d;
      fc = fd;
      d = a + ratio * (b - a);
      fd = objective(d);
    }
    if (b - a).abs() < 1e-10 {
      break;
    }
  }

  fc.min(fd).min(worst_realization(x))
}

/// Tail Gini as a weighted average of CVaRs at `alpha * i / a_sim`, `i = 1..=a_sim`.
pub fn tail_gini(x: &[f64], alpha: f64, a_sim: usize) -> f64 {
  let steps = a_sim.max(1);
  let mut total = 0.0;
  let mut prev = 0.0_f64;
  for i in 1..=steps {
    let a_i = alpha * i as f64 / steps as f64;
    let w_i = (a_i.powi(2) - prev.powi(2)) / alpha.powi(2);
    total += w_i * cvar(x, a_i);
    prev = a_i;
  }
  total
}

pub fn range(x: &[f64]) -> f64 {
  let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  let min = x.iter().cloned().fold(f64::INFINITY, f64::min);
  if x.is_empty() {
    0.0
  } else {
    max - min
  }
}

fn negated(x: &[f64]) -> Vec<f64> {
  x.iter().map(|v| -v).collect()
}

/// Drawdown path, one value per period. Uncompounded drawdowns are differences of the
/// cumulated returns, compounded ones are fractions of the running peak.
pub fn drawdowns(x: &[f64], compounded: bool) -> Vec<f64> {
  let mut out = Vec::with_capacity(x.len());
  if compounded {
    let (mut level, mut peak) = (1.0_f64, 1.0_f64);
    for r in x {
      level *= 1.0 + r;
      peak = peak.max(level);
      out.push(if peak > 0.0 { 1.0 - level / peak } else { 0.0 });
    }
  } else {
    let (mut level, mut peak) = (0.0_f64, 0.0_f64);
    for r in x {
      level += r;
      peak = peak.max(level);
      out.push(peak - level);
    }
  }
  out
}

pub fn max_drawdown(dd: &[f64]) -> f64 {
  dd.iter().cloned().fold(0.0, f64::max)
}

pub fn ulcer_index(dd: &[f64]) -> f64 {
  mean(&dd.iter().map(|d| d * d).collect::<Vec<_>>()).sqrt()
}

/// Empirical risk of `x` under `measure`. Mean variance is reported as a standard deviation.
pub fn series_risk(measure: RiskMeasure, x: &[f64], ctx: &RiskContext) -> f64 {
  use RiskMeasure::*;

  match measure {
    MV => std_dev(x),
    MAD => mad(x),
    MSV => semi_dev(x),
    FLPM => flpm(x, ctx.threshold),
    SLPM => slpm(x, ctx.threshold),
    VaR => value_at_risk(x, ctx.alpha),
    CVaR => cvar(x, ctx.alpha),
    EVaR => evar(x, ctx.alpha),
    WR => worst_realization(x),
    TG => tail_gini(x, ctx.alpha, ctx.a_sim),
    RG => range(x),
    CVRG => cvar(x, ctx.alpha) + cvar(&negated(x), ctx.beta),
    TGRG => tail_gini(x, ctx.alpha, ctx.a_sim) + tail_gini(&negated(x), ctx.beta, ctx.b_sim),
    MDD | ADD | DaR | CDaR | EDaR | UCI | MDDRel | ADDRel | DaRRel | CDaRRel | EDaRRel
    | UCIRel => {
      let dd = drawdowns(x, measure.info().compounded);
      let losses = negated(&dd);
      match measure {
        MDD | MDDRel => max_drawdown(&dd),
        ADD | ADDRel => mean(&dd),
        DaR | DaRRel => value_at_risk(&losses, ctx.alpha),
        CDaR | CDaRRel => cvar(&losses, ctx.alpha),
        EDaR | EDaRRel => evar(&losses, ctx.alpha),
        _ => ulcer_index(&dd),
      }
    }
  }
}

/// Risk of the portfolio `w` over the return matrix. Mean variance uses the supplied
/// covariance, every other measure the realized portfolio series.
pub fn portfolio_risk(
  measure: RiskMeasure,
  w: &[f64],
  returns: &Array2<f64>,
  cov: &Array2<f64>,
  ctx: &RiskContext,
) -> f64 {
  let w = ArrayView1::from(w);
  match measure {
    RiskMeasure::MV => w.dot(&cov.dot(&w)).max(0.0).sqrt(),
    _ => series_risk(measure, &returns.dot(&w).to_vec(), ctx),
  }
}

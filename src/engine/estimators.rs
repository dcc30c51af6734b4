//! # Moment Estimators
//!
//! $$
//! \hat\Sigma_{\text{shrunk}} = (1-\delta)\,S + \delta\,\frac{\operatorname{tr} S}{n} I
//! $$
//!
//! Expected return vectors and covariance matrices from a return matrix (rows = periods).

use nalgebra::DMatrix;
use nalgebra::SymmetricEigen;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use tracing::debug;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::problem::CovarianceEstimator;
use crate::problem::MeanEstimator;

/// Shrinkage intensity of [`CovarianceEstimator::Shrunk`].
pub const FIXED_SHRINKAGE: f64 = 0.1;
/// L1 penalty of the graphical lasso, applied on the correlation scale.
pub const GLASSO_ALPHA: f64 = 0.01;

/// Weights of an exponentially weighted average with smoothing `d`, oldest first.
///
/// `adjust` mirrors the two classic conventions: normalized geometric weights, or the
/// recursive filter `y_t = d y_{t-1} + (1 - d) x_t` started at the first observation.
fn ewma_weights(len: usize, d: f64, adjust: bool) -> Vec<f64> {
  let mut w: Vec<f64> = (0..len)
    .map(|t| {
      let age = (len - 1 - t) as i32;
      if adjust || t > 0 {
        d.powi(age)
      } else {
        d.powi(age) / (1.0 - d).max(1e-12)
      }
    })
    .collect();
  if !adjust {
    for v in w.iter_mut() {
      *v *= 1.0 - d;
    }
  }
  let total: f64 = w.iter().sum();
  if total > 0.0 {
    for v in w.iter_mut() {
      *v /= total;
    }
  }
  w
}

fn require_periods(returns: &Array2<f64>, min: usize) -> Result<()> {
  if returns.nrows() < min {
    return Err(PortfolioError::InsufficientData(format!(
      "{} periods available, {min} required",
      returns.nrows()
    )));
  }
  Ok(())
}

/// Expected returns per asset.
pub fn mean_vector(returns: &Array2<f64>, method: MeanEstimator, d: f64) -> Result<Array1<f64>> {
  require_periods(returns, 1)?;
  let weights = match method {
    MeanEstimator::Hist => return Ok(returns.mean_axis(Axis(0)).unwrap_or_default()),
    MeanEstimator::Ewma1 => ewma_weights(returns.nrows(), d, true),
    MeanEstimator::Ewma2 => ewma_weights(returns.nrows(), d, false),
  };
  Ok(Array1::from(weights).dot(returns))
}

/// Sample covariance with `ddof` degrees of freedom removed.
pub fn sample_covariance(returns: &Array2<f64>, ddof: usize) -> Array2<f64> {
  let t = returns.nrows();
  let means = returns.mean_axis(Axis(0)).unwrap_or_default();
  let centered = returns - &means;
  centered.t().dot(&centered) / (t.saturating_sub(ddof).max(1)) as f64
}

/// Weighted covariance with the unbiasing factor `1 / (1 - sum w^2)` of normalized weights.
fn weighted_covariance(returns: &Array2<f64>, weights: &[f64]) -> Array2<f64> {
  let w = Array1::from(weights.to_vec());
  let means = w.dot(returns);
  let centered = returns - &means;
  let scaled = &centered * &w.view().insert_axis(Axis(1));
  let biased = centered.t().dot(&scaled);
  let sq: f64 = weights.iter().map(|v| v * v).sum();
  if sq < 1.0 - 1e-12 {
    biased / (1.0 - sq)
  } else {
    biased
  }
}

/// Ledoit-Wolf shrinkage toward the scaled identity; returns the estimate and the intensity.
pub fn ledoit_wolf(returns: &Array2<f64>) -> (Array2<f64>, f64) {
  let (n, p) = returns.dim();
  let means = returns.mean_axis(Axis(0)).unwrap_or_default();
  let x = returns - &means;
  let emp = x.t().dot(&x) / n as f64;
  let mu = emp.diag().sum() / p as f64;

  let x2 = x.mapv(|v| v * v);
  let beta_raw = x2.t().dot(&x2).sum();
  let delta_raw = x.t().dot(&x).mapv(|v| v * v).sum() / (n * n) as f64;
  let beta = (beta_raw / n as f64 - delta_raw) / (p * n) as f64;
  let delta = (delta_raw - 2.0 * mu * emp.diag().sum() + p as f64 * mu * mu) / p as f64;
  let beta = beta.min(delta);
  let shrinkage = if beta <= 0.0 || delta <= 0.0 { 0.0 } else { beta / delta };

  (shrink_toward_identity(&emp, shrinkage), shrinkage)
}

/// Oracle approximating shrinkage; returns the estimate and the intensity.
pub fn oracle_approximating(returns: &Array2<f64>) -> (Array2<f64>, f64) {
  let (n, p) = returns.dim();
  let emp = sample_covariance(returns, 0);
  let mu = emp.diag().sum() / p as f64;
  let alpha = emp.mapv(|v| v * v).mean().unwrap_or(0.0);
  let num = alpha + mu * mu;
  let den = (n as f64 + 1.0) * (alpha - mu * mu / p as f64);
  let shrinkage = if den == 0.0 { 1.0 } else { (num / den).min(1.0) };

  (shrink_toward_identity(&emp, shrinkage), shrinkage)
}

fn shrink_toward_identity(emp: &Array2<f64>, shrinkage: f64) -> Array2<f64> {
  let p = emp.nrows();
  let mu = emp.diag().sum() / p as f64;
  let mut out = emp * (1.0 - shrinkage);
  for i in 0..p {
    out[[i, i]] += shrinkage * mu;
  }
  out
}

/// Correlation matrix from a covariance matrix, unit diagonal and entries clamped to `[-1, 1]`.
pub fn correlation_from_covariance(cov: &Array2<f64>) -> Array2<f64> {
  let n = cov.nrows();
  let sd: Vec<f64> = (0..n).map(|i| cov[[i, i]].max(0.0).sqrt()).collect();
  Array2::from_shape_fn((n, n), |(i, j)| {
    let denom = sd[i] * sd[j];
    if i == j {
      1.0
    } else if denom > 1e-15 {
      (cov[[i, j]] / denom).clamp(-1.0, 1.0)
    } else {
      0.0
    }
  })
}

fn rescale(corr: &Array2<f64>, sd: &[f64]) -> Array2<f64> {
  Array2::from_shape_fn(corr.dim(), |(i, j)| corr[[i, j]] * sd[i] * sd[j])
}

fn std_devs(cov: &Array2<f64>) -> Vec<f64> {
  cov.diag().iter().map(|v| v.max(0.0).sqrt()).collect()
}

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
  DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
  Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

fn soft_threshold(x: f64, t: f64) -> f64 {
  x.signum() * (x.abs() - t).max(0.0)
}

/// Graphical lasso by block coordinate descent on the correlation matrix.
pub fn graphical_lasso(cov: &Array2<f64>, alpha: f64) -> Array2<f64> {
  let p = cov.nrows();
  let sd = std_devs(cov);
  let s = correlation_from_covariance(cov);
  let mut w = s.clone();
  for i in 0..p {
    w[[i, i]] += alpha;
  }
  let mut betas = Array2::<f64>::zeros((p, p));

  for _sweep in 0..100 {
    let previous = w.clone();

    for j in 0..p {
      let others: Vec<usize> = (0..p).filter(|&k| k != j).collect();
      let mut beta: Vec<f64> = others.iter().map(|&k| betas[[k, j]]).collect();

      for _ in 0..200 {
        let mut change = 0.0_f64;
        for (a, &ka) in others.iter().enumerate() {
          let mut r = s[[ka, j]];
          for (b, &kb) in others.iter().enumerate() {
            if a != b {
              r -= w[[ka, kb]] * beta[b];
            }
          }
          let updated = soft_threshold(r, alpha) / w[[ka, ka]];
          change = change.max((updated - beta[a]).abs());
          beta[a] = updated;
        }
        if change < 1e-8 {
          break;
        }
      }

      for (a, &ka) in others.iter().enumerate() {
        betas[[ka, j]] = beta[a];
        let w12: f64 = others
          .iter()
          .enumerate()
          .map(|(b, &kb)| w[[ka, kb]] * beta[b])
          .sum();
        w[[ka, j]] = w12;
        w[[j, ka]] = w12;
      }
    }

    let change = (&w - &previous).mapv(f64::abs).mean().unwrap_or(0.0);
    if change < 1e-8 {
      break;
    }
  }

  rescale(&w, &sd)
}

/// Triangulated maximally filtered graph: the 4-cliques and their 3-vertex separators.
pub(crate) fn tmfg(weights: &Array2<f64>) -> (Vec<[usize; 4]>, Vec<[usize; 3]>) {
  let n = weights.nrows();
  let strength: Vec<f64> = (0..n)
    .map(|i| (0..n).filter(|&j| j != i).map(|j| weights[[i, j]]).sum())
    .collect();
  let mut ranked: Vec<usize> = (0..n).collect();
  ranked.sort_by(|&a, &b| strength[b].total_cmp(&strength[a]));

  let seed = [ranked[0], ranked[1], ranked[2], ranked[3]];
  let mut cliques = vec![seed];
  let mut separators = Vec::new();
  let mut faces: Vec<[usize; 3]> = vec![
    [seed[0], seed[1], seed[2]],
    [seed[0], seed[1], seed[3]],
    [seed[0], seed[2], seed[3]],
    [seed[1], seed[2], seed[3]],
  ];
  let mut remaining: Vec<usize> = ranked[4..].to_vec();

  while !remaining.is_empty() {
    let mut best = (f64::NEG_INFINITY, 0, 0);
    for (r, &v) in remaining.iter().enumerate() {
      for (f, face) in faces.iter().enumerate() {
        let gain: f64 = face.iter().map(|&u| weights[[v, u]]).sum();
        if gain > best.0 {
          best = (gain, r, f);
        }
      }
    }

    let (_, r, f) = best;
    let v = remaining.swap_remove(r);
    let [a, b, c] = faces[f];
    cliques.push([v, a, b, c]);
    separators.push([a, b, c]);
    faces[f] = [v, a, b];
    faces.push([v, b, c]);
    faces.push([v, a, c]);
  }

  (cliques, separators)
}

fn accumulate_inverse(j: &mut DMatrix<f64>, cov: &DMatrix<f64>, idx: &[usize], sign: f64) -> bool {
  let sub = DMatrix::from_fn(idx.len(), idx.len(), |a, b| cov[(idx[a], idx[b])]);
  let Some(inv) = sub.try_inverse() else {
    return false;
  };
  for (a, &ia) in idx.iter().enumerate() {
    for (b, &ib) in idx.iter().enumerate() {
      j[(ia, ib)] += sign * inv[(a, b)];
    }
  }
  true
}

/// j-LoGo: sparse precision from clique and separator inverses over a TMFG of squared
/// correlations. `None` when a local inverse or the final inversion is singular.
pub fn jlogo(cov: &Array2<f64>) -> Option<Array2<f64>> {
  let n = cov.nrows();
  if n < 4 {
    return None;
  }

  let corr = correlation_from_covariance(cov);
  let (cliques, separators) = tmfg(&corr.mapv(|v| v * v));
  let sigma = to_dmatrix(cov);
  let mut precision = DMatrix::<f64>::zeros(n, n);

  for clique in &cliques {
    if !accumulate_inverse(&mut precision, &sigma, clique, 1.0) {
      return None;
    }
  }
  for sep in &separators {
    if !accumulate_inverse(&mut precision, &sigma, sep, -1.0) {
      return None;
    }
  }

  precision.try_inverse().map(|m| from_dmatrix(&m))
}

/// Random-matrix denoising flavor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Denoise {
  Fixed,
  Spectral,
  Shrink,
}

/// Denoise the correlation of `cov` using the Marchenko-Pastur edge
/// `(1 + sqrt(n / T))^2` for `T` observations.
pub fn denoise(cov: &Array2<f64>, periods: usize, method: Denoise) -> Array2<f64> {
  let n = cov.nrows();
  let sd = std_devs(cov);
  let corr = correlation_from_covariance(cov);
  let eigen = SymmetricEigen::new(to_dmatrix(&corr));

  let q = periods.max(1) as f64 / n as f64;
  let edge = (1.0 + (1.0 / q).sqrt()).powi(2);
  let noise: Vec<usize> = (0..n).filter(|&i| eigen.eigenvalues[i] <= edge).collect();
  let noise_mean = if noise.is_empty() {
    0.0
  } else {
    noise.iter().map(|&i| eigen.eigenvalues[i]).sum::<f64>() / noise.len() as f64
  };
  debug!(signal = n - noise.len(), edge, ?method, "denoising correlation");

  let v = &eigen.eigenvectors;
  let rebuild = |lambda: &[f64]| {
    Array2::from_shape_fn((n, n), |(i, j)| {
      (0..n)
        .map(|k| v[(i, k)] * lambda[k] * v[(j, k)])
        .sum::<f64>()
    })
  };

  let values: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
  let keep = |noise_value: f64| -> Vec<f64> {
    (0..n)
      .map(|k| if noise.contains(&k) { noise_value } else { values[k] })
      .collect()
  };

  let denoised = match method {
    Denoise::Fixed => rebuild(&keep(noise_mean)),
    Denoise::Spectral => rebuild(&keep(0.0)),
    Denoise::Shrink => {
      let noise_only: Vec<f64> = (0..n)
        .map(|k| if noise.contains(&k) { values[k] } else { 0.0 })
        .collect();
      let noisy = rebuild(&noise_only);
      let mut c = rebuild(&keep(0.0));
      for i in 0..n {
        c[[i, i]] += noisy[[i, i]];
      }
      c
    }
  };

  let diag: Vec<f64> = (0..n).map(|i| denoised[[i, i]]).collect();
  let unit = Array2::from_shape_fn((n, n), |(i, j)| {
    if i == j {
      1.0
    } else if diag[i] > 1e-15 && diag[j] > 1e-15 {
      denoised[[i, j]] / (diag[i] * diag[j]).sqrt()
    } else {
      0.0
    }
  });

  rescale(&unit, &sd)
}

/// Covariance matrix for the chosen estimator.
pub fn covariance_matrix(
  returns: &Array2<f64>,
  method: CovarianceEstimator,
  d: f64,
) -> Result<Array2<f64>> {
  require_periods(returns, 2)?;
  let t = returns.nrows();
  let hist = || sample_covariance(returns, 1);

  let cov = match method {
    CovarianceEstimator::Hist => hist(),
    CovarianceEstimator::Ewma1 => weighted_covariance(returns, &ewma_weights(t, d, true)),
    CovarianceEstimator::Ewma2 => weighted_covariance(returns, &ewma_weights(t, d, false)),
    CovarianceEstimator::Ledoit => ledoit_wolf(returns).0,
    CovarianceEstimator::Oas => oracle_approximating(returns).0,
    CovarianceEstimator::Shrunk => {
      shrink_toward_identity(&sample_covariance(returns, 0), FIXED_SHRINKAGE)
    }
    CovarianceEstimator::Gl => graphical_lasso(&hist(), GLASSO_ALPHA),
    CovarianceEstimator::JLogo => match jlogo(&hist()) {
      Some(cov) => cov,
      None => {
        debug!(assets = returns.ncols(), "j-LoGo unavailable, using sample covariance");
        hist()
      }
    },
    CovarianceEstimator::Fixed => denoise(&hist(), t, Denoise::Fixed),
    CovarianceEstimator::Spectral => denoise(&hist(), t, Denoise::Spectral),
    CovarianceEstimator::Shrink => denoise(&hist(), t, Denoise::Shrink),
  };

  Ok(cov)
}

//! # Codependence
//!
//! $$
//! D_{ij} = \sqrt{\tfrac12(1-\rho_{ij})},\qquad
//! D^{\mathrm{VI}}_{ij} = \frac{H(X_i,X_j) - I(X_i;X_j)}{H(X_i,X_j)}
//! $$
//!
//! Pairwise similarity matrices and the distance matrices fed to the linkage.

use ndarray::Array2;
use ndarray::ArrayView1;
use rayon::prelude::*;
use statrs::function::gamma::ln_gamma;

use super::estimators::correlation_from_covariance;
use super::estimators::sample_covariance;
use crate::problem::BinsMethod;
use crate::problem::Codependence;

/// Codependence matrix and the matching distance matrix.
#[derive(Clone, Debug)]
pub struct CodependenceMatrices {
  pub codep: Array2<f64>,
  pub dist: Array2<f64>,
}

fn mean(x: &[f64]) -> f64 {
  x.iter().sum::<f64>() / x.len().max(1) as f64
}

fn std_dev(x: &[f64]) -> f64 {
  let m = mean(x);
  (x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (x.len().max(2) - 1) as f64).sqrt()
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
  if sorted.is_empty() {
    return 0.0;
  }
  let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
}

fn sorted(x: &[f64]) -> Vec<f64> {
  let mut s = x.to_vec();
  s.sort_by(f64::total_cmp);
  s
}

/// Average ranks, ties share the mean of their positions.
pub(crate) fn ranks(x: &[f64]) -> Vec<f64> {
  let mut idx: Vec<usize> = (0..x.len()).collect();
  idx.sort_by(|&a, &b| x[a].total_cmp(&x[b]));

  let mut out = vec![0.0; x.len()];
  let mut start = 0;
  while start < idx.len() {
    let mut end = start;
    while end + 1 < idx.len() && x[idx[end + 1]] == x[idx[start]] {
      end += 1;
    }
    let rank = (start + end) as f64 / 2.0 + 1.0;
    for &i in &idx[start..=end] {
      out[i] = rank;
    }
    start = end + 1;
  }
  out
}

fn pearson_matrix(returns: &Array2<f64>) -> Array2<f64> {
  correlation_from_covariance(&sample_covariance(returns, 1))
}

/// Distance correlation of two samples.
pub(crate) fn distance_correlation(x: &[f64], y: &[f64]) -> f64 {
  let n = x.len();
  if n < 2 {
    return 0.0;
  }

  let centered = |v: &[f64]| {
    let mut d = Array2::from_shape_fn((n, n), |(i, j)| (v[i] - v[j]).abs());
    let row_means: Vec<f64> = (0..n).map(|i| d.row(i).sum() / n as f64).collect();
    let grand = row_means.iter().sum::<f64>() / n as f64;
    for i in 0..n {
      for j in 0..n {
        d[[i, j]] += grand - row_means[i] - row_means[j];
      }
    }
    d
  };

  let a = centered(x);
  let b = centered(y);
  let dcov_xy = (&a * &b).mean().unwrap_or(0.0);
  let dcov_xx = (&a * &a).mean().unwrap_or(0.0);
  let dcov_yy = (&b * &b).mean().unwrap_or(0.0);

  let denom = (dcov_xx * dcov_yy).sqrt();
  if denom <= 1e-300 {
    0.0
  } else {
    (dcov_xy.max(0.0) / denom).sqrt().clamp(0.0, 1.0)
  }
}

fn knuth_bins(x: &[f64]) -> usize {
  let n = x.len();
  let s = sorted(x);
  let (lo, hi) = (s[0], s[n - 1]);
  if hi <= lo {
    return 1;
  }

  let max_bins = n.clamp(1, 100);
  let mut best = (f64::NEG_INFINITY, 1);
  for m in 1..=max_bins {
    let counts = histogram(x, lo, hi, m);
    let mf = m as f64;
    let log_post = n as f64 * mf.ln() + ln_gamma(mf / 2.0)
      - mf * ln_gamma(0.5)
      - ln_gamma(n as f64 + mf / 2.0)
      + counts.iter().map(|&c| ln_gamma(c as f64 + 0.5)).sum::<f64>();
    if log_post > best.0 {
      best = (log_post, m);
    }
  }
  best.1
}

/// Bins of a fixed width over the sample range, at most one per observation.
fn width_bins(x: &[f64], width: f64) -> usize {
  let s = sorted(x);
  let span = s[s.len() - 1] - s[0];
  if width <= 0.0 || span <= 0.0 {
    1
  } else {
    ((span / width).ceil().min(x.len() as f64) as usize).max(1)
  }
}

fn hgr_univariate(n: usize) -> usize {
  let n = n as f64;
  let z = (8.0 + 324.0 * n + 12.0 * (36.0 * n + 729.0 * n * n).sqrt()).cbrt();
  ((z / 6.0 + 2.0 / (3.0 * z) + 1.0 / 3.0).round() as usize).max(1)
}

fn hgr_bivariate(n: usize, rho: f64) -> usize {
  let r2 = rho * rho;
  if r2 >= 1.0 - 1e-12 {
    return hgr_univariate(n);
  }
  let b = (0.5f64).sqrt() * (1.0 + (1.0 + 24.0 * n as f64 / (1.0 - r2)).sqrt()).sqrt();
  (b.round() as usize).max(1)
}

/// Bin count of one sample under `method`.
pub(crate) fn univariate_bins(x: &[f64], method: BinsMethod) -> usize {
  let n = x.len();
  if n < 2 {
    return 1;
  }
  let cube_root = (n as f64).cbrt();
  match method {
    BinsMethod::KN => knuth_bins(x),
    BinsMethod::FD => {
      let s = sorted(x);
      let iqr = quantile(&s, 0.75) - quantile(&s, 0.25);
      width_bins(x, 2.0 * iqr / cube_root)
    }
    BinsMethod::SC => width_bins(x, 3.5 * std_dev(x) / cube_root),
    BinsMethod::HGR => hgr_univariate(n),
  }
}

fn histogram(x: &[f64], lo: f64, hi: f64, bins: usize) -> Vec<usize> {
  let mut counts = vec![0; bins];
  let width = (hi - lo) / bins as f64;
  for &v in x {
    let b = if width > 0.0 {
      (((v - lo) / width) as usize).min(bins - 1)
    } else {
      0
    };
    counts[b] += 1;
  }
  counts
}

fn entropy(counts: &[usize], total: usize) -> f64 {
  counts
    .iter()
    .filter(|&&c| c > 0)
    .map(|&c| {
      let p = c as f64 / total as f64;
      -p * p.ln()
    })
    .sum()
}

/// Normalized mutual information and normalized variation of information of a pair.
pub(crate) fn information(x: &[f64], y: &[f64], bins: usize) -> (f64, f64) {
  let n = x.len();
  let bins = bins.clamp(1, n.max(1));
  let bounds = |v: &[f64]| {
    let s = sorted(v);
    (s[0], s[s.len() - 1])
  };
  let (xlo, xhi) = bounds(x);
  let (ylo, yhi) = bounds(y);

  let hx = entropy(&histogram(x, xlo, xhi, bins), n);
  let hy = entropy(&histogram(y, ylo, yhi, bins), n);

  let bin_of = |v: f64, lo: f64, hi: f64| {
    let width = (hi - lo) / bins as f64;
    if width > 0.0 {
      (((v - lo) / width) as usize).min(bins - 1)
    } else {
      0
    }
  };
  let mut joint = vec![0usize; bins * bins];
  for (a, b) in x.iter().zip(y) {
    joint[bin_of(*a, xlo, xhi) * bins + bin_of(*b, ylo, yhi)] += 1;
  }
  let hxy = entropy(&joint, n);

  let mi = (hx + hy - hxy).max(0.0);
  let min_h = hx.min(hy);
  let nmi = if min_h > 0.0 { (mi / min_h).min(1.0) } else { 0.0 };
  let vi = if hxy > 0.0 {
    ((hxy - mi) / hxy).clamp(0.0, 1.0)
  } else {
    0.0
  };
  (nmi, vi)
}

/// Empirical lower tail dependence at quantile `alpha`.
pub(crate) fn lower_tail_dependence(x: &[f64], y: &[f64], alpha: f64) -> f64 {
  let n = x.len();
  let k = ((n as f64 * alpha).ceil() as usize).clamp(1, n.max(1));
  let rx = ranks(x);
  let ry = ranks(y);
  let joint = rx
    .iter()
    .zip(&ry)
    .filter(|(a, b)| **a <= k as f64 && **b <= k as f64)
    .count();
  (joint as f64 / k as f64).min(1.0)
}

fn pairwise<F>(returns: &Array2<f64>, f: F) -> Array2<f64>
where
  F: Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64 + Sync,
{
  let n = returns.ncols();
  let pairs: Vec<(usize, usize)> = (0..n)
    .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
    .collect();
  let values: Vec<f64> = pairs
    .par_iter()
    .map(|&(i, j)| f(returns.column(i), returns.column(j)))
    .collect();

  let mut out = Array2::from_elem((n, n), 1.0);
  for (&(i, j), v) in pairs.iter().zip(values) {
    out[[i, j]] = v;
    out[[j, i]] = v;
  }
  out
}

fn columns(returns: &Array2<f64>) -> Vec<Vec<f64>> {
  returns.columns().into_iter().map(|c| c.to_vec()).collect()
}

/// Codependence and distance matrices of the return columns.
pub fn codependence(
  returns: &Array2<f64>,
  method: Codependence,
  bins_info: BinsMethod,
  alpha_tail: f64,
) -> CodependenceMatrices {
  let n = returns.ncols();
  let t = returns.nrows();

  let (codep, dist) = match method {
    Codependence::Pearson | Codependence::Spearman => {
      let codep = if method == Codependence::Pearson {
        pearson_matrix(returns)
      } else {
        pearson_matrix(&ranked(returns))
      };
      let dist = codep.mapv(|c| (0.5 * (1.0 - c)).max(0.0).sqrt());
      (codep, dist)
    }
    Codependence::AbsPearson | Codependence::AbsSpearman => {
      let base = if method == Codependence::AbsPearson {
        pearson_matrix(returns)
      } else {
        pearson_matrix(&ranked(returns))
      };
      let codep = base.mapv(f64::abs);
      let dist = codep.mapv(|c| (1.0 - c).max(0.0).sqrt());
      (codep, dist)
    }
    Codependence::Distance => {
      let codep = pairwise(returns, |x, y| {
        distance_correlation(&x.to_vec(), &y.to_vec())
      });
      let dist = codep.mapv(|c| (1.0 - c).max(0.0).sqrt());
      (codep, dist)
    }
    Codependence::MutualInfo => {
      let cols = columns(returns);
      let bins: Vec<usize> = cols.iter().map(|c| univariate_bins(c, bins_info)).collect();
      let corr = pearson_matrix(returns);
      let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect();
      let values: Vec<(f64, f64)> = pairs
        .par_iter()
        .map(|&(i, j)| {
          let b = match bins_info {
            BinsMethod::HGR => hgr_bivariate(t, corr[[i, j]]),
            _ => bins[i].max(bins[j]),
          };
          information(&cols[i], &cols[j], b)
        })
        .collect();

      let mut codep = Array2::from_elem((n, n), 1.0);
      let mut dist = Array2::zeros((n, n));
      for (&(i, j), (nmi, vi)) in pairs.iter().zip(values) {
        codep[[i, j]] = nmi;
        codep[[j, i]] = nmi;
        dist[[i, j]] = vi;
        dist[[j, i]] = vi;
      }
      (codep, dist)
    }
    Codependence::Tail => {
      let codep = pairwise(returns, |x, y| {
        lower_tail_dependence(&x.to_vec(), &y.to_vec(), alpha_tail)
      });
      let dist = codep.mapv(|c| -c.max(1e-10).ln());
      (codep, dist)
    }
  };

  let mut dist = dist;
  for i in 0..n {
    dist[[i, i]] = 0.0;
  }
  CodependenceMatrices { codep, dist }
}

fn ranked(returns: &Array2<f64>) -> Array2<f64> {
  let mut out = returns.clone();
  for (j, col) in columns(returns).iter().enumerate() {
    for (i, r) in ranks(col).into_iter().enumerate() {
      out[[i, j]] = r;
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn sample() -> Array2<f64> {
    Array2::from_shape_fn((60, 3), |(t, j)| {
      let base = ((t * 7919) % 61) as f64 / 61.0 - 0.5;
      match j {
        0 => base,
        1 => 2.0 * base + 0.01 * ((t % 5) as f64),
        _ => (((t * 104_729) % 67) as f64 / 67.0 - 0.5) * 0.3,
      }
    })
  }

  #[test]
  fn ranks_average_ties() {
    assert_eq!(ranks(&[3.0, 1.0, 3.0, 2.0]), vec![3.5, 1.0, 3.5, 2.0]);
  }

  #[test]
  fn pearson_distance_is_zero_on_the_diagonal_and_symmetric() {
    let m = codependence(&sample(), Codependence::Pearson, BinsMethod::KN, 0.05);
    for i in 0..3 {
      assert_eq!(m.dist[[i, i]], 0.0);
      assert_abs_diff_eq!(m.codep[[i, i]], 1.0, epsilon = 1e-12);
    }
    assert_abs_diff_eq!(m.dist[[0, 1]], m.dist[[1, 0]], epsilon = 1e-15);
    assert!(m.dist[[0, 1]] < m.dist[[0, 2]]);
  }

  #[test]
  fn spearman_is_invariant_to_monotone_maps() {
    let r = sample();
    let cubed = r.mapv(|v| v.powi(3));
    let a = codependence(&r, Codependence::Spearman, BinsMethod::KN, 0.05);
    let b = codependence(&cubed, Codependence::Spearman, BinsMethod::KN, 0.05);
    assert_abs_diff_eq!(a.codep[[0, 2]], b.codep[[0, 2]], epsilon = 1e-12);
  }

  #[test]
  fn distance_correlation_detects_dependence() {
    let x: Vec<f64> = (0..40).map(|i| i as f64 / 40.0 - 0.5).collect();
    let y: Vec<f64> = x.iter().map(|v| v * v).collect();
    assert_abs_diff_eq!(distance_correlation(&x, &x), 1.0, epsilon = 1e-9);
    assert!(distance_correlation(&x, &y) > 0.2);
  }

  #[test]
  fn mutual_information_of_identical_series_is_one() {
    let x: Vec<f64> = (0..100).map(|i| ((i * 37) % 100) as f64).collect();
    let (nmi, vi) = information(&x, &x, 10);
    assert_abs_diff_eq!(nmi, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(vi, 0.0, epsilon = 1e-12);
  }

  #[test]
  fn bin_rules_give_positive_counts() {
    let x: Vec<f64> = (0..200).map(|i| ((i * 53) % 199) as f64 / 199.0).collect();
    for method in [BinsMethod::KN, BinsMethod::FD, BinsMethod::SC, BinsMethod::HGR] {
      let b = univariate_bins(&x, method);
      assert!(b >= 1 && b <= 200, "{method:?} gave {b}");
    }
    assert_eq!(univariate_bins(&[1.0; 10], BinsMethod::FD), 1);
  }

  #[test]
  fn width_rules_are_capped_by_the_sample_size() {
    let mut x: Vec<f64> = (0..99).map(|i| i as f64 * 1e-12).collect();
    x.push(1e6);
    assert_eq!(univariate_bins(&x, BinsMethod::FD), 100);
    assert!(univariate_bins(&x, BinsMethod::SC) <= 100);
    let (nmi, vi) = information(&x, &x, usize::MAX);
    assert!((0.0..=1.0).contains(&nmi));
    assert!((0.0..=1.0).contains(&vi));
  }

  #[test]
  fn tail_dependence_of_comonotone_series_is_one() {
    let x: Vec<f64> = (0..100).map(|i| i as f64).collect();
    let reversed: Vec<f64> = x.iter().rev().cloned().collect();
    assert_eq!(lower_tail_dependence(&x, &x, 0.05), 1.0);
    assert_eq!(lower_tail_dependence(&x, &reversed, 0.05), 0.0);

    let r = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0], [4.0, 4.0]];
    let m = codependence(&r, Codependence::Tail, BinsMethod::KN, 0.25);
    assert_abs_diff_eq!(m.dist[[0, 1]], 0.0, epsilon = 1e-12);
  }
}

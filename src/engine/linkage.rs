//! # Agglomerative Linkage
//!
//! $$
//! d(k, i\cup j) = \alpha_i d(k,i) + \alpha_j d(k,j) + \beta d(i,j) + \gamma\,|d(k,i)-d(k,j)|
//! $$
//!
//! Lance-Williams agglomeration over a distance matrix, dendrogram leaf ordering, tree
//! cutting and the two-difference gap statistic.

use ndarray::Array2;
use ordered_float::OrderedFloat;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::problem::Linkage;

/// One agglomeration step. Leaves are `0..n`, the node created at step `s` is `n + s`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Merge {
  pub left: usize,
  pub right: usize,
  pub height: f64,
  pub size: usize,
}

/// Binary dendrogram over `n` leaves.
#[derive(Clone, Debug)]
pub struct Dendrogram {
  pub n: usize,
  pub merges: Vec<Merge>,
}

impl Dendrogram {
  pub fn root(&self) -> usize {
    if self.n <= 1 {
      0
    } else {
      self.n + self.merges.len() - 1
    }
  }

  pub fn children(&self, node: usize) -> Option<(usize, usize)> {
    (node >= self.n)
      .then(|| self.merges.get(node - self.n))
      .flatten()
      .map(|m| (m.left, m.right))
  }

  /// Leaves under `node`, left to right.
  pub fn leaves(&self, node: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
      match self.children(current) {
        Some((l, r)) => {
          stack.push(r);
          stack.push(l);
        }
        None => out.push(current),
      }
    }
    out
  }

  /// Leaf order of the whole tree.
  pub fn order(&self) -> Vec<usize> {
    self.leaves(self.root())
  }

  /// Subtree roots after undoing the last `k - 1` merges.
  pub fn cut_nodes(&self, k: usize) -> Vec<usize> {
    let mut nodes = vec![self.root()];
    while nodes.len() < k.max(1) {
      let Some((pos, _)) = nodes
        .iter()
        .enumerate()
        .filter(|(_, &node)| node >= self.n)
        .max_by_key(|(_, &node)| node)
      else {
        break;
      };
      let node = nodes.swap_remove(pos);
      if let Some((l, r)) = self.children(node) {
        nodes.push(l);
        nodes.push(r);
      }
    }
    nodes
  }

  /// Cluster label per leaf for a cut into `k` clusters; labels follow the leaf order.
  pub fn cut(&self, k: usize) -> Vec<usize> {
    let nodes = self.cut_nodes(k);
    let mut labels = vec![0; self.n];
    let order = self.order();
    let mut position = vec![0; self.n];
    for (p, &leaf) in order.iter().enumerate() {
      position[leaf] = p;
    }

    let mut ranked: Vec<(usize, Vec<usize>)> = nodes
      .into_iter()
      .map(|node| {
        let leaves = self.leaves(node);
        let first = leaves.iter().map(|&l| position[l]).min().unwrap_or(0);
        (first, leaves)
      })
      .collect();
    ranked.sort_by_key(|(first, _)| *first);

    for (label, (_, leaves)) in ranked.into_iter().enumerate() {
      for leaf in leaves {
        labels[leaf] = label;
      }
    }
    labels
  }
}

fn lance_williams(
  method: Linkage,
  d_ki: f64,
  d_kj: f64,
  d_ij: f64,
  n_i: f64,
  n_j: f64,
  n_k: f64,
) -> f64 {
  match method {
    Linkage::Single => d_ki.min(d_kj),
    Linkage::Complete => d_ki.max(d_kj),
    Linkage::Average => (n_i * d_ki + n_j * d_kj) / (n_i + n_j),
    Linkage::Weighted => 0.5 * (d_ki + d_kj),
    Linkage::Centroid => {
      let n = n_i + n_j;
      ((n_i * d_ki * d_ki + n_j * d_kj * d_kj) / n - n_i * n_j * d_ij * d_ij / (n * n))
        .max(0.0)
        .sqrt()
    }
    Linkage::Median => (0.5 * d_ki * d_ki + 0.5 * d_kj * d_kj - 0.25 * d_ij * d_ij)
      .max(0.0)
      .sqrt(),
    Linkage::Ward | Linkage::Dbht => {
      let t = n_i + n_j + n_k;
      (((n_i + n_k) * d_ki * d_ki + (n_j + n_k) * d_kj * d_kj - n_k * d_ij * d_ij) / t)
        .max(0.0)
        .sqrt()
    }
  }
}

/// Agglomerate a symmetric distance matrix.
pub fn linkage(dist: &Array2<f64>, method: Linkage) -> Result<Dendrogram> {
  if method == Linkage::Dbht {
    return Err(PortfolioError::UnsupportedByEngine(
      "DBHT linkage".to_string(),
    ));
  }

  let n = dist.nrows();
  if dist.ncols() != n {
    return Err(PortfolioError::DimensionMismatch {
      expected: n,
      actual: dist.ncols(),
    });
  }

  let mut d = dist.clone();
  let mut active = vec![true; n];
  let mut node_id: Vec<usize> = (0..n).collect();
  let mut size = vec![1usize; n];
  let mut merges = Vec::with_capacity(n.saturating_sub(1));

  for step in 0..n.saturating_sub(1) {
    let mut best = (f64::INFINITY, 0, 0);
    for i in 0..n {
      if !active[i] {
        continue;
      }
      for j in (i + 1)..n {
        if active[j] && d[[i, j]] < best.0 {
          best = (d[[i, j]], i, j);
        }
      }
    }

    let (height, i, j) = best;
    let (n_i, n_j) = (size[i] as f64, size[j] as f64);
    for k in 0..n {
      if !active[k] || k == i || k == j {
        continue;
      }
      let updated = lance_williams(method, d[[k, i]], d[[k, j]], height, n_i, n_j, size[k] as f64);
      d[[i, k]] = updated;
      d[[k, i]] = updated;
    }

    let (a, b) = (node_id[i].min(node_id[j]), node_id[i].max(node_id[j]));
    merges.push(Merge {
      left: a,
      right: b,
      height,
      size: size[i] + size[j],
    });
    node_id[i] = n + step;
    size[i] += size[j];
    active[j] = false;
  }

  Ok(Dendrogram { n, merges })
}

/// Flip children so that adjacent leaves across every merge are as close as possible.
pub fn order_leaves(tree: &mut Dendrogram, dist: &Array2<f64>) {
  let n = tree.n;
  let mut orders: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

  for step in 0..tree.merges.len() {
    let Merge { left, right, .. } = tree.merges[step];
    let a = orders[left].clone();
    let b = orders[right].clone();

    let candidates = [(false, false), (false, true), (true, false), (true, true)];
    let mut best = (f64::INFINITY, (false, false));
    for (flip_a, flip_b) in candidates {
      let end_a = if flip_a { a[0] } else { a[a.len() - 1] };
      let start_b = if flip_b { b[b.len() - 1] } else { b[0] };
      let gap = dist[[end_a, start_b]];
      if gap < best.0 {
        best = (gap, (flip_a, flip_b));
      }
    }

    let (flip_a, flip_b) = best.1;
    let mut merged: Vec<usize> = if flip_a {
      a.iter().rev().copied().collect()
    } else {
      a
    };
    if flip_b {
      merged.extend(b.iter().rev());
    } else {
      merged.extend(b);
    }
    orders.push(merged);

    if flip_a {
      flip_subtree(tree, left);
    }
    if flip_b {
      flip_subtree(tree, right);
    }
  }
}

fn flip_subtree(tree: &mut Dendrogram, node: usize) {
  let mut stack = vec![node];
  while let Some(current) = stack.pop() {
    if current < tree.n {
      continue;
    }
    let merge = &mut tree.merges[current - tree.n];
    std::mem::swap(&mut merge.left, &mut merge.right);
    stack.push(merge.left);
    stack.push(merge.right);
  }
}

/// Sum over clusters of the mean pairwise distance inside each cluster.
fn within_dispersion(dist: &Array2<f64>, labels: &[usize], k: usize) -> f64 {
  (0..k)
    .map(|c| {
      let members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == c).collect();
      let m = members.len();
      if m < 2 {
        return 0.0;
      }
      let mut total = 0.0;
      for (a, &i) in members.iter().enumerate() {
        for &j in &members[a + 1..] {
          total += dist[[i, j]];
        }
      }
      total / (m * (m - 1) / 2) as f64
    })
    .sum()
}

/// Number of clusters at the largest second difference of the within-cluster dispersion,
/// searched up to `min(max_k, sqrt(n))`. Fewer than three candidates return the limit.
pub fn two_diff_gap_stat(dist: &Array2<f64>, tree: &Dendrogram, max_k: usize) -> usize {
  let n = tree.n;
  let limit = max_k.min((n as f64).sqrt().floor() as usize).max(1);
  if limit < 3 {
    return limit.min(n).max(1);
  }

  let w: Vec<f64> = (1..=limit)
    .map(|k| within_dispersion(dist, &tree.cut(k), k))
    .collect();

  (2..limit)
    .max_by_key(|&j| OrderedFloat(w[j] + w[j - 2] - 2.0 * w[j - 1]))
    .unwrap_or(2)
    .clamp(1, n)
}

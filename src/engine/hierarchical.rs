//! # Hierarchical Clustering Portfolios
//!
//! $$
//! \alpha_L = 1 - \frac{\rho(L)}{\rho(L) + \rho(R)},\qquad
//! \mathbf{w}_L \leftarrow \alpha_L\,\mathbf{w}_L,\quad
//! \mathbf{w}_R \leftarrow (1-\alpha_L)\,\mathbf{w}_R
//! $$
//!
//! Hierarchical risk parity (bisection of the seriated leaf order), hierarchical equal risk
//! contribution (top-down split of the dendrogram down to `k` clusters) and nested
//! clustered optimization (an intra-cluster solve per cluster followed by an inter-cluster
//! solve over the cluster portfolios).

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use tracing::debug;

use super::NelderMeadEngine;
use super::classic;
use super::codependence::codependence;
use super::estimators::covariance_matrix;
use super::linkage::Dendrogram;
use super::linkage::linkage;
use super::linkage::order_leaves;
use super::linkage::two_diff_gap_stat;
use super::parity;
use super::risk::RiskContext;
use super::risk::series_risk;
use crate::catalog::RiskMeasure;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::problem::HcModel;
use crate::problem::HierarchicalProblem;
use crate::problem::Moments;
use crate::problem::Objective;
use crate::problem::PortfolioSpec;

/// Data shared by the three allocation schemes.
struct Clustering<'a> {
  returns: &'a Array2<f64>,
  mu: Array1<f64>,
  cov: Array2<f64>,
  measure: RiskMeasure,
  ctx: RiskContext,
}

impl Clustering<'_> {
  fn asset_risk(&self, i: usize) -> f64 {
    match self.measure {
      RiskMeasure::MV => self.cov[[i, i]],
      m => series_risk(m, &self.returns.column(i).to_vec(), &self.ctx),
    }
  }

  /// Inverse-risk weights inside a cluster, summing to one.
  fn naive(&self, members: &[usize]) -> Vec<f64> {
    let inv: Vec<f64> = members
      .iter()
      .map(|&i| {
        let r = self.asset_risk(i);
        if r > 1e-15 { 1.0 / r } else { 0.0 }
      })
      .collect();
    let total: f64 = inv.iter().sum();
    if total > 1e-15 {
      inv.iter().map(|v| v / total).collect()
    } else {
      vec![1.0 / members.len() as f64; members.len()]
    }
  }

  /// Risk of the naive portfolio of a cluster. Variance for MV.
  fn cluster_risk(&self, members: &[usize]) -> f64 {
    let w = self.naive(members);
    match self.measure {
      RiskMeasure::MV => {
        let mut var = 0.0;
        for (a, &i) in members.iter().enumerate() {
          for (b, &j) in members.iter().enumerate() {
            var += w[a] * w[b] * self.cov[[i, j]];
          }
        }
        var
      }
      m => {
        let series: Vec<f64> = self
          .returns
          .rows()
          .into_iter()
          .map(|row| members.iter().zip(&w).map(|(&i, wi)| row[i] * wi).sum())
          .collect();
        series_risk(m, &series, &self.ctx)
      }
    }
  }

  fn split(&self, left: &[usize], right: &[usize]) -> f64 {
    let rl = self.cluster_risk(left);
    let rr = self.cluster_risk(right);
    let denom = rl + rr;
    if denom > 1e-30 { 1.0 - rl / denom } else { 0.5 }
  }
}

fn hrp_recursive_bisect(order: &[usize], clustering: &Clustering, weights: &mut [f64]) {
  if order.len() <= 1 {
    return;
  }

  let mid = order.len() / 2;
  let (left, right) = order.split_at(mid);
  let alpha = clustering.split(left, right);

  for &i in left {
    weights[i] *= alpha;
  }
  for &i in right {
    weights[i] *= 1.0 - alpha;
  }

  hrp_recursive_bisect(left, clustering, weights);
  hrp_recursive_bisect(right, clustering, weights);
}

fn herc_descend(
  node: usize,
  tree: &Dendrogram,
  clusters: &[usize],
  clustering: &Clustering,
  weights: &mut [f64],
) {
  let members = tree.leaves(node);
  if clusters.contains(&node) {
    let naive = clustering.naive(&members);
    for (&i, w) in members.iter().zip(naive) {
      weights[i] *= w;
    }
    return;
  }
  let Some((l, r)) = tree.children(node) else {
    return;
  };

  let (left, right) = (tree.leaves(l), tree.leaves(r));
  let alpha = clustering.split(&left, &right);
  for &i in &left {
    weights[i] *= alpha;
  }
  for &i in &right {
    weights[i] *= 1.0 - alpha;
  }

  herc_descend(l, tree, clusters, clustering, weights);
  herc_descend(r, tree, clusters, clustering, weights);
}

fn sub_spec(
  problem: &HierarchicalProblem,
  objective: Objective,
  measure: RiskMeasure,
) -> PortfolioSpec {
  PortfolioSpec {
    objective,
    risk_measure: measure,
    risk_free: problem.risk_free,
    risk_aversion: problem.risk_aversion,
    alpha: problem.alpha,
    ..PortfolioSpec::default()
  }
}

/// One long-only solve summing to one; ERC goes through risk budgeting.
fn solve_block(
  engine: &NelderMeadEngine,
  returns: &Array2<f64>,
  spec: &PortfolioSpec,
  moments: &Moments,
) -> Result<Option<Vec<f64>>> {
  let n = returns.ncols();
  if n == 1 {
    return Ok(Some(vec![1.0]));
  }
  if spec.objective == Objective::Erc {
    let b = Array1::from_elem(n, 1.0 / n as f64);
    return Ok(parity::budgeted(engine, returns, spec, moments, &b));
  }
  classic::optimize(engine, returns, spec, moments)
}

fn nco(
  engine: &NelderMeadEngine,
  problem: &HierarchicalProblem,
  clustering: &Clustering,
  labels: &[usize],
  k: usize,
) -> Result<Option<Vec<f64>>> {
  let returns = clustering.returns;
  let n = returns.ncols();
  let groups: Vec<Vec<usize>> = (0..k)
    .map(|c| (0..n).filter(|&i| labels[i] == c).collect())
    .filter(|g: &Vec<usize>| !g.is_empty())
    .collect();

  let inner = sub_spec(problem, problem.objective, problem.risk_measure);
  let mut intra = Array2::<f64>::zeros((n, groups.len()));
  for (c, members) in groups.iter().enumerate() {
    let sub_returns = returns.select(Axis(1), members);
    let moments = Moments {
      mu: clustering.mu.select(Axis(0), members),
      cov: clustering.cov.select(Axis(0), members).select(Axis(1), members),
    };
    let w = match solve_block(engine, &sub_returns, &inner, &moments)? {
      Some(w) => w,
      None => {
        debug!(cluster = c, "intra-cluster solve infeasible, using inverse-risk weights");
        clustering.naive(members)
      }
    };
    for (&i, wi) in members.iter().zip(w) {
      intra[[i, c]] = wi;
    }
  }

  let outer = sub_spec(problem, problem.outer_objective, problem.outer_risk_measure);
  let moments = Moments {
    mu: intra.t().dot(&clustering.mu),
    cov: intra.t().dot(&clustering.cov).dot(&intra),
  };
  let cluster_returns = returns.dot(&intra);
  let Some(inter) = solve_block(engine, &cluster_returns, &outer, &moments)? else {
    debug!("inter-cluster solve infeasible");
    return Ok(None);
  };

  Ok(Some(intra.dot(&Array1::from(inter)).to_vec()))
}

/// Hierarchical clustering portfolio, non-negative and summing to one.
pub fn hierarchical(
  engine: &NelderMeadEngine,
  returns: &Array2<f64>,
  problem: &HierarchicalProblem,
) -> Result<Option<Vec<f64>>> {
  let n = returns.ncols();
  if n == 0 {
    return Err(PortfolioError::InsufficientData(
      "the return matrix has no assets".to_string(),
    ));
  }
  if n == 1 {
    return Ok(Some(vec![1.0]));
  }

  let cov = covariance_matrix(returns, problem.covariance, problem.d_ewma)?;
  let mu = returns.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n));
  let codep = codependence(
    returns,
    problem.codependence,
    problem.bins_info,
    problem.alpha_tail,
  );

  let mut tree = linkage(&codep.dist, problem.linkage)?;
  if problem.leaf_order {
    order_leaves(&mut tree, &codep.dist);
  }
  let k = match problem.k {
    Some(k) if k > 0 => k.min(n),
    _ => two_diff_gap_stat(&codep.dist, &tree, problem.max_k),
  };
  debug!(
    model = ?problem.model,
    linkage = %problem.linkage,
    k,
    "hierarchical clustering"
  );

  let clustering = Clustering {
    returns,
    mu,
    cov,
    measure: problem.risk_measure,
    ctx: RiskContext {
      alpha: problem.alpha,
      a_sim: problem.a_sim,
      beta: problem.beta,
      b_sim: problem.b_sim,
      threshold: problem.risk_free,
    },
  };

  let raw = match problem.model {
    HcModel::Hrp => {
      let mut weights = vec![1.0; n];
      hrp_recursive_bisect(&tree.order(), &clustering, &mut weights);
      weights
    }
    HcModel::Herc => {
      let clusters = tree.cut_nodes(k);
      let mut weights = vec![1.0; n];
      herc_descend(tree.root(), &tree, &clusters, &clustering, &mut weights);
      weights
    }
    HcModel::Nco => match nco(engine, problem, &clustering, &tree.cut(k), k)? {
      Some(w) => w,
      None => return Ok(None),
    },
  };

  let clipped: Vec<f64> = raw.iter().map(|w| w.max(0.0)).collect();
  let total: f64 = clipped.iter().sum();
  if !total.is_finite() || total <= 1e-15 {
    debug!("hierarchical weights degenerate");
    return Ok(None);
  }
  Ok(Some(clipped.iter().map(|w| w / total).collect()))
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::engine::tests::sample_returns;
  use crate::problem::Codependence;
  use crate::problem::Linkage;

  fn problem(model: HcModel) -> HierarchicalProblem {
    HierarchicalProblem {
      model,
      k: Some(2),
      ..HierarchicalProblem::default()
    }
  }

  fn assert_simplex(w: &[f64]) {
    assert!(w.iter().all(|v| *v >= 0.0), "{w:?}");
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
  }

  #[test]
  fn hrp_of_two_assets_is_inverse_variance() {
    let returns = sample_returns(250, 2, 21);
    let w = hierarchical(&NelderMeadEngine::default(), &returns, &problem(HcModel::Hrp))
      .unwrap()
      .unwrap();

    let cov = crate::engine::estimators::sample_covariance(&returns, 1);
    let expected = cov[[1, 1]] / (cov[[0, 0]] + cov[[1, 1]]);
    assert_abs_diff_eq!(w[0], expected, epsilon = 1e-12);
  }

  #[test]
  fn every_model_returns_a_simplex() {
    let returns = sample_returns(250, 6, 4);
    for model in [HcModel::Hrp, HcModel::Herc, HcModel::Nco] {
      let w = hierarchical(&NelderMeadEngine::default(), &returns, &problem(model))
        .unwrap()
        .unwrap();
      assert_eq!(w.len(), 6);
      assert_simplex(&w);
    }
  }

  #[test]
  fn tail_and_drawdown_measures_are_supported() {
    let returns = sample_returns(250, 5, 8);
    for measure in [
      RiskMeasure::CVaR,
      RiskMeasure::EVaR,
      RiskMeasure::TG,
      RiskMeasure::CVRG,
      RiskMeasure::MDD,
      RiskMeasure::CDaRRel,
      RiskMeasure::UCIRel,
    ] {
      let p = HierarchicalProblem {
        risk_measure: measure,
        ..problem(HcModel::Herc)
      };
      let w = hierarchical(&NelderMeadEngine::default(), &returns, &p)
        .unwrap()
        .unwrap();
      assert_simplex(&w);
    }
  }

  #[test]
  fn codependence_and_linkage_choices_are_honored() {
    let returns = sample_returns(250, 5, 17);
    for (codependence, linkage) in [
      (Codependence::Spearman, Linkage::Single),
      (Codependence::AbsPearson, Linkage::Average),
      (Codependence::Distance, Linkage::Complete),
      (Codependence::MutualInfo, Linkage::Ward),
      (Codependence::Tail, Linkage::Weighted),
    ] {
      let p = HierarchicalProblem {
        codependence,
        linkage,
        leaf_order: true,
        k: None,
        ..problem(HcModel::Hrp)
      };
      let w = hierarchical(&NelderMeadEngine::default(), &returns, &p)
        .unwrap()
        .unwrap();
      assert_simplex(&w);
    }
  }

  #[test]
  fn nco_with_erc_intra_objective() {
    let returns = sample_returns(250, 4, 2);
    let p = HierarchicalProblem {
      objective: Objective::Erc,
      outer_objective: Objective::MinRisk,
      ..problem(HcModel::Nco)
    };
    let w = hierarchical(&NelderMeadEngine::default(), &returns, &p)
      .unwrap()
      .unwrap();
    assert_simplex(&w);
  }

  #[test]
  fn dbht_is_unsupported() {
    let returns = sample_returns(100, 3, 1);
    let p = HierarchicalProblem {
      linkage: Linkage::Dbht,
      ..problem(HcModel::Hrp)
    };
    assert!(matches!(
      hierarchical(&NelderMeadEngine::default(), &returns, &p),
      Err(PortfolioError::UnsupportedByEngine(_))
    ));
  }
}

//! Parameter sets of the dispatcher entry points. Every `Default` reproduces the defaults
//! of the corresponding entry point; override with struct-update syntax.

use crate::catalog::RiskMeasure;
use crate::problem::BinsMethod;
use crate::problem::Codependence;
use crate::problem::CovarianceEstimator;
use crate::problem::HcModel;
use crate::problem::Linkage;
use crate::problem::MeanEstimator;
use crate::problem::Objective;
use crate::problem::RelaxationVersion;

/// Classic mean-risk optimization.
#[derive(Clone, Debug)]
pub struct MeanRiskParams {
  pub risk_measure: RiskMeasure,
  pub objective: Objective,
  /// Annual risk-free rate.
  pub risk_free_rate: f64,
  pub risk_aversion: f64,
  pub alpha: f64,
  /// Annual minimum return.
  pub target_return: Option<f64>,
  /// Annual maximum risk of `risk_measure`.
  pub target_risk: Option<f64>,
  pub mean: MeanEstimator,
  pub covariance: CovarianceEstimator,
  pub d_ewma: f64,
  pub value: f64,
  pub value_short: f64,
}

impl Default for MeanRiskParams {
  fn default() -> Self {
    Self {
      risk_measure: RiskMeasure::MV,
      objective: Objective::Sharpe,
      risk_free_rate: 0.0,
      risk_aversion: 2.0,
      alpha: 0.05,
      target_return: None,
      target_risk: None,
      mean: MeanEstimator::Hist,
      covariance: CovarianceEstimator::Hist,
      d_ewma: 0.94,
      value: 1.0,
      value_short: 0.0,
    }
  }
}

/// Maximum diversification and maximum decorrelation portfolios.
#[derive(Clone, Debug)]
pub struct DiversificationParams {
  pub covariance: CovarianceEstimator,
  pub d_ewma: f64,
  pub value: f64,
  pub value_short: f64,
}

impl Default for DiversificationParams {
  fn default() -> Self {
    Self {
      covariance: CovarianceEstimator::Hist,
      d_ewma: 0.94,
      value: 1.0,
      value_short: 0.0,
    }
  }
}

#[derive(Clone, Debug)]
pub struct RiskParityParams {
  pub risk_measure: RiskMeasure,
  /// Relative risk contribution per asset, equal when `None`.
  pub risk_cont: Option<Vec<f64>>,
  pub risk_free_rate: f64,
  pub alpha: f64,
  pub target_return: Option<f64>,
  pub mean: MeanEstimator,
  pub covariance: CovarianceEstimator,
  pub d_ewma: f64,
  pub value: f64,
}

impl Default for RiskParityParams {
  fn default() -> Self {
    Self {
      risk_measure: RiskMeasure::MV,
      risk_cont: None,
      risk_free_rate: 0.0,
      alpha: 0.05,
      target_return: None,
      mean: MeanEstimator::Hist,
      covariance: CovarianceEstimator::Hist,
      d_ewma: 0.94,
      value: 1.0,
    }
  }
}

#[derive(Clone, Debug)]
pub struct RelaxedRiskParityParams {
  pub version: RelaxationVersion,
  pub risk_cont: Option<Vec<f64>>,
  /// Penalization weight, only used by version C.
  pub penal_factor: f64,
  pub target_return: Option<f64>,
  pub mean: MeanEstimator,
  pub covariance: CovarianceEstimator,
  pub d_ewma: f64,
  pub value: f64,
}

impl Default for RelaxedRiskParityParams {
  fn default() -> Self {
    Self {
      version: RelaxationVersion::A,
      risk_cont: None,
      penal_factor: 1.0,
      target_return: None,
      mean: MeanEstimator::Hist,
      covariance: CovarianceEstimator::Hist,
      d_ewma: 0.94,
      value: 1.0,
    }
  }
}

/// Hierarchical clustering portfolios.
#[derive(Clone, Debug)]
pub struct HierarchicalParams {
  pub model: HcModel,
  pub codependence: Codependence,
  pub covariance: CovarianceEstimator,
  /// Intra-cluster objective of NCO.
  pub objective: Objective,
  pub risk_measure: RiskMeasure,
  /// Inter-cluster objective of NCO, defaults to `objective`.
  pub outer_objective: Option<Objective>,
  /// Inter-cluster risk measure of NCO, defaults to `risk_measure`.
  pub outer_risk_measure: Option<RiskMeasure>,
  pub risk_free_rate: f64,
  pub risk_aversion: f64,
  pub alpha: f64,
  pub a_sim: usize,
  /// Gain tail level of range measures, defaults to `alpha`.
  pub beta: Option<f64>,
  /// Gain tail CVaR count of TGRG, defaults to `a_sim`.
  pub b_sim: Option<usize>,
  pub linkage: Linkage,
  /// Number of clusters; `None` or `Some(0)` selects it with the gap statistic.
  pub k: Option<usize>,
  pub max_k: usize,
  pub bins_info: BinsMethod,
  pub alpha_tail: f64,
  pub leaf_order: bool,
  pub d_ewma: f64,
  pub value: f64,
}

impl Default for HierarchicalParams {
  fn default() -> Self {
    Self {
      model: HcModel::Hrp,
      codependence: Codependence::Pearson,
      covariance: CovarianceEstimator::Hist,
      objective: Objective::MinRisk,
      risk_measure: RiskMeasure::MV,
      outer_objective: None,
      outer_risk_measure: None,
      risk_free_rate: 0.0,
      risk_aversion: 1.0,
      alpha: 0.05,
      a_sim: 100,
      beta: None,
      b_sim: None,
      linkage: Linkage::Single,
      k: None,
      max_k: 10,
      bins_info: BinsMethod::KN,
      alpha_tail: 0.05,
      leaf_order: true,
      d_ewma: 0.94,
      value: 1.0,
    }
  }
}

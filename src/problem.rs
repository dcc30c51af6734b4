//! # Problem Descriptors
//!
//! $$
//! \max_{\mathbf{w}}\ \mathcal{O}(\mathbf{w};\mu,\Sigma)\quad\text{s.t.}\quad
//! \mathbf{1}^\top\mathbf{w}=b,\ \mu^\top\mathbf{w}\ge r_{\min},\ \rho(\mathbf{w})\le \bar\rho
//! $$
//!
//! Typed identifiers and the per-call problem instance handed to an
//! [`crate::engine::OptimizationEngine`].

use std::fmt::Display;
use std::str::FromStr;

use ndarray::Array1;
use ndarray::Array2;

use crate::catalog::RiskMeasure;
use crate::catalog::UpperBound;
use crate::error::PortfolioError;
use crate::error::Result;

/// Optimization family selected by the dispatcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModelFamily {
  #[default]
  ClassicMeanRisk,
  RiskParity,
  RelaxedRiskParity,
  HierarchicalClustering,
}

/// Objective function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Objective {
  /// Maximize the risk adjusted return ratio.
  #[default]
  Sharpe,
  /// Minimize the selected risk measure.
  MinRisk,
  /// Maximize `mu'w - l * risk(w)`.
  Utility,
  /// Maximize expected return.
  MaxRet,
  /// Equal risk contribution (nested clustered optimization only).
  Erc,
}

impl FromStr for Objective {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "sharpe" => Ok(Self::Sharpe),
      "minrisk" | "min-risk" => Ok(Self::MinRisk),
      "utility" => Ok(Self::Utility),
      "maxret" | "max-ret" => Ok(Self::MaxRet),
      "erc" => Ok(Self::Erc),
      _ => Err(PortfolioError::UnknownObjective(s.to_string())),
    }
  }
}

impl Display for Objective {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Sharpe => "Sharpe",
      Self::MinRisk => "MinRisk",
      Self::Utility => "Utility",
      Self::MaxRet => "MaxRet",
      Self::Erc => "ERC",
    };
    write!(f, "{s}")
  }
}

/// Expected return estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MeanEstimator {
  #[default]
  Hist,
  /// EWMA with `adjust=True` weighting.
  Ewma1,
  /// EWMA with recursive (`adjust=False`) weighting.
  Ewma2,
}

impl FromStr for MeanEstimator {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "hist" => Ok(Self::Hist),
      "ewma1" => Ok(Self::Ewma1),
      "ewma2" => Ok(Self::Ewma2),
      _ => Err(PortfolioError::UnknownEstimator(s.to_string())),
    }
  }
}

/// Covariance estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CovarianceEstimator {
  #[default]
  Hist,
  Ewma1,
  Ewma2,
  /// Ledoit-Wolf shrinkage.
  Ledoit,
  /// Oracle approximating shrinkage.
  Oas,
  /// Fixed 0.1 shrinkage toward the scaled identity.
  Shrunk,
  /// Graphical lasso.
  Gl,
  /// j-LoGo sparse inverse from a triangulated maximally filtered graph.
  JLogo,
  /// Denoising with noise eigenvalues replaced by their average.
  Fixed,
  /// Denoising with noise eigenvalues set to zero.
  Spectral,
  /// Denoising with targeted shrinkage of the noise block.
  Shrink,
}

impl FromStr for CovarianceEstimator {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "hist" => Ok(Self::Hist),
      "ewma1" => Ok(Self::Ewma1),
      "ewma2" => Ok(Self::Ewma2),
      "ledoit" => Ok(Self::Ledoit),
      "oas" => Ok(Self::Oas),
      "shrunk" => Ok(Self::Shrunk),
      "gl" => Ok(Self::Gl),
      "jlogo" => Ok(Self::JLogo),
      "fixed" => Ok(Self::Fixed),
      "spectral" => Ok(Self::Spectral),
      "shrink" => Ok(Self::Shrink),
      _ => Err(PortfolioError::UnknownEstimator(s.to_string())),
    }
  }
}

/// Relaxed risk parity regime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RelaxationVersion {
  /// Plain least squares on risk contributions.
  #[default]
  A,
  /// Least squares plus regularization.
  B,
  /// Least squares plus regularization and penalization.
  C,
}

impl FromStr for RelaxationVersion {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim() {
      "A" => Ok(Self::A),
      "B" => Ok(Self::B),
      "C" => Ok(Self::C),
      _ => Err(PortfolioError::UnknownRelaxationVersion(s.to_string())),
    }
  }
}

/// Hierarchical clustering portfolio model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HcModel {
  /// Hierarchical risk parity.
  #[default]
  Hrp,
  /// Hierarchical equal risk contribution.
  Herc,
  /// Nested clustered optimization.
  Nco,
}

impl FromStr for HcModel {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_uppercase().as_str() {
      "HRP" => Ok(Self::Hrp),
      "HERC" => Ok(Self::Herc),
      "NCO" => Ok(Self::Nco),
      _ => Err(PortfolioError::UnknownModel(s.to_string())),
    }
  }
}

/// Codependence (similarity) measure used to build the clustering distance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Codependence {
  #[default]
  Pearson,
  Spearman,
  AbsPearson,
  AbsSpearman,
  /// Distance correlation.
  Distance,
  /// Mutual information, distance is the variation of information.
  MutualInfo,
  /// Lower tail dependence index.
  Tail,
}

impl FromStr for Codependence {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_lowercase().as_str() {
      "pearson" => Ok(Self::Pearson),
      "spearman" => Ok(Self::Spearman),
      "abs_pearson" => Ok(Self::AbsPearson),
      "abs_spearman" => Ok(Self::AbsSpearman),
      "distance" => Ok(Self::Distance),
      "mutual_info" => Ok(Self::MutualInfo),
      "tail" => Ok(Self::Tail),
      _ => Err(PortfolioError::UnknownCodependence(s.to_string())),
    }
  }
}

/// Agglomerative linkage method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Linkage {
  #[default]
  Single,
  Complete,
  Average,
  Weighted,
  Centroid,
  Median,
  Ward,
  /// Direct bubble hierarchical tree.
  Dbht,
}

impl FromStr for Linkage {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    // `dbht` is accepted in any case and normalized to `DBHT`.
    if s.eq_ignore_ascii_case("dbht") {
      return Ok(Self::Dbht);
    }
    match s {
      "single" => Ok(Self::Single),
      "complete" => Ok(Self::Complete),
      "average" => Ok(Self::Average),
      "weighted" => Ok(Self::Weighted),
      "centroid" => Ok(Self::Centroid),
      "median" => Ok(Self::Median),
      "ward" => Ok(Self::Ward),
      _ => Err(PortfolioError::UnknownLinkage(s.to_string())),
    }
  }
}

impl Display for Linkage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Single => "single",
      Self::Complete => "complete",
      Self::Average => "average",
      Self::Weighted => "weighted",
      Self::Centroid => "centroid",
      Self::Median => "median",
      Self::Ward => "ward",
      Self::Dbht => "DBHT",
    };
    write!(f, "{s}")
  }
}

/// Histogram bin-count rule for mutual information.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BinsMethod {
  /// Knuth's Bayesian choice.
  #[default]
  KN,
  /// Freedman-Diaconis.
  FD,
  /// Scott.
  SC,
  /// Hacine-Gharbi and Ravier.
  HGR,
}

impl FromStr for BinsMethod {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_uppercase().as_str() {
      "KN" => Ok(Self::KN),
      "FD" => Ok(Self::FD),
      "SC" => Ok(Self::SC),
      "HGR" => Ok(Self::HGR),
      _ => Err(PortfolioError::UnknownBinsMethod(s.to_string())),
    }
  }
}

/// Upper bounds on risk, one optional slot per [`UpperBound`]. Fields are the snake_case form
/// of [`UpperBound::field_name`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RiskBounds {
  pub upper_dev: Option<f64>,
  pub upper_mad: Option<f64>,
  pub upper_sdev: Option<f64>,
  pub upper_flpm: Option<f64>,
  pub upper_slpm: Option<f64>,
  pub upper_cvar: Option<f64>,
  pub upper_evar: Option<f64>,
  pub upper_wr: Option<f64>,
  pub upper_mdd: Option<f64>,
  pub upper_add: Option<f64>,
  pub upper_cdar: Option<f64>,
  pub upper_edar: Option<f64>,
  pub upper_uci: Option<f64>,
}

impl RiskBounds {
  fn slot_mut(&mut self, slot: UpperBound) -> &mut Option<f64> {
    match slot {
      UpperBound::Dev => &mut self.upper_dev,
      UpperBound::Mad => &mut self.upper_mad,
      UpperBound::Sdev => &mut self.upper_sdev,
      UpperBound::Flpm => &mut self.upper_flpm,
      UpperBound::Slpm => &mut self.upper_slpm,
      UpperBound::CVaR => &mut self.upper_cvar,
      UpperBound::EVaR => &mut self.upper_evar,
      UpperBound::Wr => &mut self.upper_wr,
      UpperBound::Mdd => &mut self.upper_mdd,
      UpperBound::Add => &mut self.upper_add,
      UpperBound::CDaR => &mut self.upper_cdar,
      UpperBound::EDaR => &mut self.upper_edar,
      UpperBound::Uci => &mut self.upper_uci,
    }
  }

  pub fn set(&mut self, slot: UpperBound, value: f64) {
    *self.slot_mut(slot) = Some(value);
  }

  pub fn get(&self, slot: UpperBound) -> Option<f64> {
    match slot {
      UpperBound::Dev => self.upper_dev,
      UpperBound::Mad => self.upper_mad,
      UpperBound::Sdev => self.upper_sdev,
      UpperBound::Flpm => self.upper_flpm,
      UpperBound::Slpm => self.upper_slpm,
      UpperBound::CVaR => self.upper_cvar,
      UpperBound::EVaR => self.upper_evar,
      UpperBound::Wr => self.upper_wr,
      UpperBound::Mdd => self.upper_mdd,
      UpperBound::Add => self.upper_add,
      UpperBound::CDaR => self.upper_cdar,
      UpperBound::EDaR => self.upper_edar,
      UpperBound::Uci => self.upper_uci,
    }
  }

  /// All bounds that are set, as `(slot, value)` pairs.
  pub fn active(&self) -> Vec<(UpperBound, f64)> {
    [
      UpperBound::Dev,
      UpperBound::Mad,
      UpperBound::Sdev,
      UpperBound::Flpm,
      UpperBound::Slpm,
      UpperBound::CVaR,
      UpperBound::EVaR,
      UpperBound::Wr,
      UpperBound::Mdd,
      UpperBound::Add,
      UpperBound::CDaR,
      UpperBound::EDaR,
      UpperBound::Uci,
    ]
    .into_iter()
    .filter_map(|slot| self.get(slot).map(|v| (slot, v)))
    .collect()
  }
}

/// Per-call problem descriptor. Built fresh by the dispatcher and consumed once.
#[derive(Clone, Debug)]
pub struct PortfolioSpec {
  pub model: ModelFamily,
  pub mean: MeanEstimator,
  pub covariance: CovarianceEstimator,
  /// EWMA smoothing factor.
  pub d_ewma: f64,
  /// Significance level of tail measures.
  pub alpha: f64,
  /// Cap on the sum of long weights.
  pub upperlng: f64,
  /// Cap on the sum of absolute short weights.
  pub uppersht: f64,
  /// Shorting enabled.
  pub short: bool,
  /// Net budget, `upperlng - uppersht` when shorting.
  pub budget: f64,
  pub bounds: RiskBounds,
  /// Minimum expected return per period.
  pub lowerret: Option<f64>,
  pub objective: Objective,
  pub risk_measure: RiskMeasure,
  /// Risk-free rate per period.
  pub risk_free: f64,
  pub risk_aversion: f64,
}

impl Default for PortfolioSpec {
  fn default() -> Self {
    Self {
      model: ModelFamily::ClassicMeanRisk,
      mean: MeanEstimator::Hist,
      covariance: CovarianceEstimator::Hist,
      d_ewma: 0.94,
      alpha: 0.05,
      upperlng: 1.0,
      uppersht: 0.0,
      short: false,
      budget: 1.0,
      bounds: RiskBounds::default(),
      lowerret: None,
      objective: Objective::Sharpe,
      risk_measure: RiskMeasure::MV,
      risk_free: 0.0,
      risk_aversion: 2.0,
    }
  }
}

/// Estimated first and second moments of asset returns.
#[derive(Clone, Debug)]
pub struct Moments {
  pub mu: Array1<f64>,
  pub cov: Array2<f64>,
}

/// Hierarchical clustering problem instance.
#[derive(Clone, Debug)]
pub struct HierarchicalProblem {
  pub model: HcModel,
  pub codependence: Codependence,
  pub covariance: CovarianceEstimator,
  /// Intra-cluster objective (NCO only).
  pub objective: Objective,
  pub risk_measure: RiskMeasure,
  /// Inter-cluster objective (NCO only).
  pub outer_objective: Objective,
  pub outer_risk_measure: RiskMeasure,
  /// Risk-free rate per period.
  pub risk_free: f64,
  pub risk_aversion: f64,
  pub alpha: f64,
  pub a_sim: usize,
  pub beta: f64,
  pub b_sim: usize,
  pub linkage: Linkage,
  /// Fixed number of clusters, `None` selects it with the gap statistic.
  pub k: Option<usize>,
  pub max_k: usize,
  pub bins_info: BinsMethod,
  pub alpha_tail: f64,
  pub leaf_order: bool,
  pub d_ewma: f64,
}

impl Default for HierarchicalProblem {
  fn default() -> Self {
    Self {
      model: HcModel::Hrp,
      codependence: Codependence::Pearson,
      covariance: CovarianceEstimator::Hist,
      objective: Objective::MinRisk,
      risk_measure: RiskMeasure::MV,
      outer_objective: Objective::MinRisk,
      outer_risk_measure: RiskMeasure::MV,
      risk_free: 0.0,
      risk_aversion: 1.0,
      alpha: 0.05,
      a_sim: 100,
      beta: 0.05,
      b_sim: 100,
      linkage: Linkage::Single,
      k: None,
      max_k: 10,
      bins_info: BinsMethod::KN,
      alpha_tail: 0.05,
      leaf_order: true,
      d_ewma: 0.94,
    }
  }
}

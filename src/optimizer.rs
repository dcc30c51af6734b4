//! # Portfolio Optimizer
//!
//! $$
//! \text{returns} \xrightarrow{\ \text{constraints}\ } \text{problem}
//! \xrightarrow{\ \text{engine}\ } \mathbf{w}
//! \xrightarrow{\ \text{round, scale}\ } \text{allocation}
//! $$
//!
//! One pipeline shared by every optimization family: fetch returns, build a fresh problem
//! instance, make exactly one engine call and post-process the raw weights. A missing
//! allocation is never an error; it is reported through [`Allocation::failure`] together
//! with a single warning event.

pub mod params;

use std::fmt::Display;

use tracing::debug;
use tracing::info;
use tracing::warn;

pub use params::DiversificationParams;
pub use params::HierarchicalParams;
pub use params::MeanRiskParams;
pub use params::RelaxedRiskParityParams;
pub use params::RiskParityParams;

pub use crate::weights::normalize_contributions;

use crate::catalog::RiskMeasure;
use crate::constraints::ConstraintBuilder;
use crate::data::AttributeProvider;
use crate::data::ReturnMatrix;
use crate::data::ReturnProvider;
use crate::data::ReturnsRequest;
use crate::engine::NelderMeadEngine;
use crate::engine::OptimizationEngine;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::frequency::Frequency;
use crate::frequency::Scaling;
use crate::problem::HierarchicalProblem;
use crate::problem::ModelFamily;
use crate::problem::Objective;
use crate::problem::PortfolioSpec;
use crate::weights::WeightVector;
use crate::weights::finalize;
use crate::weights::round_weight;

/// Why an entry point produced no weights.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Infeasible {
  /// The engine found no point satisfying the constraints.
  NoFeasibleSolution,
  /// Every ticker had a zero or missing attribute.
  EmptyAttributeSum { property: String },
}

impl Display for Infeasible {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::NoFeasibleSolution => write!(f, "no feasible solution"),
      Self::EmptyAttributeSum { property } => {
        write!(f, "no {property} was found on the list of tickers")
      }
    }
  }
}

/// Result of every entry point: the weights, if any, and the returns they were built on.
#[derive(Clone, Debug)]
pub struct Allocation {
  pub weights: Option<WeightVector>,
  pub returns: ReturnMatrix,
  pub failure: Option<Infeasible>,
}

impl Allocation {
  pub fn is_feasible(&self) -> bool {
    self.weights.is_some()
  }

  pub fn into_parts(self) -> (Option<WeightVector>, ReturnMatrix) {
    (self.weights, self.returns)
  }
}

/// Optional rewrite of the estimated moments before a mean-risk solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MomentAdjustment {
  #[default]
  None,
  /// Expected returns replaced by per-asset volatilities (maximum diversification).
  VolatilityAsMean,
  /// Covariance replaced by the correlation matrix (maximum decorrelation).
  CorrelationAsCovariance,
}

/// Optimization family plus its parameters.
#[derive(Clone, Debug)]
pub enum Strategy {
  ClassicMeanRisk {
    params: MeanRiskParams,
    adjustment: MomentAdjustment,
  },
  RiskParity(RiskParityParams),
  RelaxedRiskParity(RelaxedRiskParityParams),
  HierarchicalClustering(HierarchicalParams),
}

impl Strategy {
  pub fn name(&self) -> &'static str {
    match self {
      Self::ClassicMeanRisk {
        adjustment: MomentAdjustment::VolatilityAsMean,
        ..
      } => "max_diversification",
      Self::ClassicMeanRisk {
        adjustment: MomentAdjustment::CorrelationAsCovariance,
        ..
      } => "max_decorrelation",
      Self::ClassicMeanRisk { .. } => "mean_risk",
      Self::RiskParity(_) => "risk_parity",
      Self::RelaxedRiskParity(_) => "rel_risk_parity",
      Self::HierarchicalClustering(_) => "hierarchical",
    }
  }

  /// Scale applied to the raw weights. Mean-risk weights already carry the budget.
  fn scale(&self) -> Option<f64> {
    match self {
      Self::ClassicMeanRisk { .. } => None,
      Self::RiskParity(p) => Some(p.value),
      Self::RelaxedRiskParity(p) => Some(p.value),
      Self::HierarchicalClustering(p) => Some(p.value),
    }
  }
}

fn period_rate(freq: Frequency, annual: f64) -> f64 {
  freq.to_period(annual, Scaling::Linear)
}

/// Dispatcher over a return provider and an optimization engine.
#[derive(Clone, Debug)]
pub struct PortfolioOptimizer<P, E = NelderMeadEngine> {
  provider: P,
  engine: E,
}

impl<P: ReturnProvider> PortfolioOptimizer<P> {
  /// Optimizer backed by the reference engine with default tuning.
  pub fn with_default_engine(provider: P) -> Self {
    Self::new(provider, NelderMeadEngine::default())
  }
}

impl<P, E> PortfolioOptimizer<P, E>
where
  P: ReturnProvider,
  E: OptimizationEngine,
{
  pub fn new(provider: P, engine: E) -> Self {
    Self { provider, engine }
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  pub fn engine(&self) -> &E {
    &self.engine
  }

  /// Fetch returns, solve `strategy` and post-process the weights.
  pub fn run(&self, request: &ReturnsRequest, strategy: &Strategy) -> Result<Allocation> {
    let returns = self.provider.returns(request)?;
    let freq = request.freq;
    debug!(
      strategy = strategy.name(),
      assets = returns.n_assets(),
      periods = returns.n_periods(),
      %freq,
      "returns ready"
    );

    let raw = match strategy {
      Strategy::ClassicMeanRisk { params, adjustment } => {
        self.classic(&returns, freq, params, *adjustment)?
      }
      Strategy::RiskParity(params) => self.parity(&returns, freq, params)?,
      Strategy::RelaxedRiskParity(params) => self.relaxed(&returns, freq, params)?,
      Strategy::HierarchicalClustering(params) => self.clustering(&returns, freq, params)?,
    };

    let weights = finalize(raw, returns.assets(), strategy.scale())?;
    Ok(conclude(strategy.name(), weights, returns))
  }

  /// `value * round(1/N, 5)` for every requested ticker.
  pub fn equal_weights(&self, request: &ReturnsRequest, value: f64) -> Result<Allocation> {
    let returns = self.provider.returns(request)?;
    let n = request.stocks.len();
    let share = value * round_weight(1.0 / n.max(1) as f64);
    let weights = WeightVector::new(request.stocks.iter().map(|s| (s.clone(), share)).collect());
    Ok(conclude("equal_weights", Some(weights), returns))
  }

  /// Weights proportional to a per-ticker attribute; missing attributes count as zero.
  pub fn property_weights<A: AttributeProvider>(
    &self,
    request: &ReturnsRequest,
    attributes: &A,
    property: &str,
    value: f64,
  ) -> Result<Allocation> {
    let returns = self.provider.returns(request)?;
    let values: Vec<(String, f64)> = request
      .stocks
      .iter()
      .map(|s| (s.clone(), attributes.attribute(s, property).unwrap_or(0.0)))
      .collect();
    let total: f64 = values.iter().map(|(_, v)| v).sum();

    if total == 0.0 {
      warn!(property, "no attribute was found on the list of tickers");
      return Ok(Allocation {
        weights: None,
        returns,
        failure: Some(Infeasible::EmptyAttributeSum {
          property: property.to_string(),
        }),
      });
    }

    let weights = WeightVector::new(
      values
        .into_iter()
        .map(|(s, v)| (s, value * v / total))
        .collect(),
    );
    Ok(conclude("property_weights", Some(weights), returns))
  }

  pub fn mean_risk(&self, request: &ReturnsRequest, params: &MeanRiskParams) -> Result<Allocation> {
    self.run(
      request,
      &Strategy::ClassicMeanRisk {
        params: params.clone(),
        adjustment: MomentAdjustment::None,
      },
    )
  }

  /// Sharpe portfolio on MV with volatilities as expected returns and a zero risk-free rate.
  pub fn max_diversification(
    &self,
    request: &ReturnsRequest,
    params: &DiversificationParams,
  ) -> Result<Allocation> {
    let mean_risk = MeanRiskParams {
      objective: Objective::Sharpe,
      covariance: params.covariance,
      d_ewma: params.d_ewma,
      value: params.value,
      value_short: params.value_short,
      ..MeanRiskParams::default()
    };
    self.run(
      request,
      &Strategy::ClassicMeanRisk {
        params: mean_risk,
        adjustment: MomentAdjustment::VolatilityAsMean,
      },
    )
  }

  /// Minimum MV risk portfolio with the correlation matrix in place of the covariance.
  pub fn max_decorrelation(
    &self,
    request: &ReturnsRequest,
    params: &DiversificationParams,
  ) -> Result<Allocation> {
    let mean_risk = MeanRiskParams {
      objective: Objective::MinRisk,
      covariance: params.covariance,
      d_ewma: params.d_ewma,
      value: params.value,
      value_short: params.value_short,
      ..MeanRiskParams::default()
    };
    self.run(
      request,
      &Strategy::ClassicMeanRisk {
        params: mean_risk,
        adjustment: MomentAdjustment::CorrelationAsCovariance,
      },
    )
  }

  pub fn risk_parity(
    &self,
    request: &ReturnsRequest,
    params: &RiskParityParams,
  ) -> Result<Allocation> {
    self.run(request, &Strategy::RiskParity(params.clone()))
  }

  pub fn rel_risk_parity(
    &self,
    request: &ReturnsRequest,
    params: &RelaxedRiskParityParams,
  ) -> Result<Allocation> {
    self.run(request, &Strategy::RelaxedRiskParity(params.clone()))
  }

  pub fn hierarchical(
    &self,
    request: &ReturnsRequest,
    params: &HierarchicalParams,
  ) -> Result<Allocation> {
    self.run(request, &Strategy::HierarchicalClustering(params.clone()))
  }

  fn classic(
    &self,
    returns: &ReturnMatrix,
    freq: Frequency,
    params: &MeanRiskParams,
    adjustment: MomentAdjustment,
  ) -> Result<Option<Vec<f64>>> {
    if !params.risk_measure.is_classic() {
      return Err(PortfolioError::RiskMeasureNotSupported {
        measure: params.risk_measure.name(),
        context: "mean-risk optimization",
      });
    }
    if params.objective == Objective::Erc {
      return Err(PortfolioError::invalid(
        "objective",
        "ERC is only available for risk parity and NCO",
      ));
    }

    let mut moments = self
      .engine
      .asset_moments(returns, params.mean, params.covariance, params.d_ewma)?;
    match adjustment {
      MomentAdjustment::None => {}
      MomentAdjustment::VolatilityAsMean => moments.mu = returns.std_devs(),
      MomentAdjustment::CorrelationAsCovariance => {
        moments.cov = self.engine.correlation_from_covariance(&moments.cov)
      }
    }

    let mut spec = PortfolioSpec {
      model: ModelFamily::ClassicMeanRisk,
      mean: params.mean,
      covariance: params.covariance,
      d_ewma: params.d_ewma,
      alpha: params.alpha,
      objective: params.objective,
      risk_measure: params.risk_measure,
      risk_free: period_rate(freq, params.risk_free_rate),
      risk_aversion: params.risk_aversion,
      ..PortfolioSpec::default()
    };
    ConstraintBuilder {
      value: params.value,
      value_short: params.value_short,
      target_return: params.target_return,
      target_risk: params.target_risk,
      risk_measure: params.risk_measure,
      freq,
    }
    .apply(&mut spec)?;

    debug!(
      objective = %spec.objective,
      measure = %spec.risk_measure,
      risk_free = spec.risk_free,
      ?adjustment,
      "mean-risk problem built"
    );
    self.engine.optimize(returns, &spec, &moments)
  }

  fn contributions(
    &self,
    returns: &ReturnMatrix,
    risk_cont: Option<&[f64]>,
  ) -> Result<Option<Vec<f64>>> {
    risk_cont
      .map(|b| normalize_contributions(b, returns.n_assets()))
      .transpose()
  }

  fn parity(
    &self,
    returns: &ReturnMatrix,
    freq: Frequency,
    params: &RiskParityParams,
  ) -> Result<Option<Vec<f64>>> {
    let contributions = self.contributions(returns, params.risk_cont.as_deref())?;
    let moments = self
      .engine
      .asset_moments(returns, params.mean, params.covariance, params.d_ewma)?;

    let mut spec = PortfolioSpec {
      model: ModelFamily::RiskParity,
      mean: params.mean,
      covariance: params.covariance,
      d_ewma: params.d_ewma,
      alpha: params.alpha,
      objective: Objective::Erc,
      risk_measure: params.risk_measure,
      risk_free: period_rate(freq, params.risk_free_rate),
      ..PortfolioSpec::default()
    };
    ConstraintBuilder {
      target_return: params.target_return,
      freq,
      ..ConstraintBuilder::budget(1.0, 0.0)
    }
    .apply_targets(&mut spec)?;

    debug!(
      measure = %spec.risk_measure,
      custom_budget = contributions.is_some(),
      lowerret = ?spec.lowerret,
      "risk parity problem built"
    );
    self
      .engine
      .risk_parity(returns, &spec, &moments, contributions.as_deref())
  }

  fn relaxed(
    &self,
    returns: &ReturnMatrix,
    freq: Frequency,
    params: &RelaxedRiskParityParams,
  ) -> Result<Option<Vec<f64>>> {
    let contributions = self.contributions(returns, params.risk_cont.as_deref())?;
    let moments = self
      .engine
      .asset_moments(returns, params.mean, params.covariance, params.d_ewma)?;

    let mut spec = PortfolioSpec {
      model: ModelFamily::RelaxedRiskParity,
      mean: params.mean,
      covariance: params.covariance,
      d_ewma: params.d_ewma,
      objective: Objective::Erc,
      risk_measure: RiskMeasure::MV,
      ..PortfolioSpec::default()
    };
    ConstraintBuilder {
      target_return: params.target_return,
      freq,
      ..ConstraintBuilder::budget(1.0, 0.0)
    }
    .apply_targets(&mut spec)?;

    debug!(
      version = ?params.version,
      penal_factor = params.penal_factor,
      lowerret = ?spec.lowerret,
      "relaxed risk parity problem built"
    );
    self.engine.relaxed_risk_parity(
      returns,
      &spec,
      &moments,
      params.version,
      params.penal_factor,
      contributions.as_deref(),
    )
  }

  fn clustering(
    &self,
    returns: &ReturnMatrix,
    freq: Frequency,
    params: &HierarchicalParams,
  ) -> Result<Option<Vec<f64>>> {
    let problem = HierarchicalProblem {
      model: params.model,
      codependence: params.codependence,
      covariance: params.covariance,
      objective: params.objective,
      risk_measure: params.risk_measure,
      outer_objective: params.outer_objective.unwrap_or(params.objective),
      outer_risk_measure: params.outer_risk_measure.unwrap_or(params.risk_measure),
      risk_free: period_rate(freq, params.risk_free_rate),
      risk_aversion: params.risk_aversion,
      alpha: params.alpha,
      a_sim: params.a_sim,
      beta: params.beta.unwrap_or(params.alpha),
      b_sim: params.b_sim.unwrap_or(params.a_sim),
      linkage: params.linkage,
      k: params.k.filter(|k| *k > 0),
      max_k: params.max_k,
      bins_info: params.bins_info,
      alpha_tail: params.alpha_tail,
      leaf_order: params.leaf_order,
      d_ewma: params.d_ewma,
    };

    debug!(
      model = ?problem.model,
      codependence = ?problem.codependence,
      linkage = %problem.linkage,
      k = ?problem.k,
      "hierarchical problem built"
    );
    self.engine.hierarchical(returns, &problem)
  }
}

fn conclude(
  strategy: &'static str,
  weights: Option<WeightVector>,
  returns: ReturnMatrix,
) -> Allocation {
  match weights {
    Some(weights) => {
      info!(strategy, total = weights.sum(), %weights, "allocation ready");
      Allocation {
        weights: Some(weights),
        returns,
        failure: None,
      }
    }
    None => {
      warn!(strategy, "no feasible allocation");
      Allocation {
        weights: None,
        returns,
        failure: Some(Infeasible::NoFeasibleSolution),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use chrono::Duration;
  use chrono::NaiveDate;
  use tracing_test::traced_test;

  use super::*;
  use crate::data::InMemoryProvider;
  use crate::data::Period;
  use crate::data::PriceTable;
  use crate::data::StaticAttributes;
  use crate::engine::tests::sample_returns;
  use crate::problem::HcModel;
  use crate::problem::RelaxationVersion;

  fn tickers(n: usize) -> Vec<String> {
    (0..n).map(|j| format!("T{j}")).collect()
  }

  fn optimizer(n: usize) -> PortfolioOptimizer<InMemoryProvider> {
    let returns = sample_returns(300, n, 42);
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let dates = (0..=300).map(|d| start + Duration::days(d)).collect();
    let prices = PriceTable::from_returns(dates, tickers(n), &returns).unwrap();
    PortfolioOptimizer::with_default_engine(InMemoryProvider::new(prices))
  }

  fn request(n: usize) -> ReturnsRequest {
    ReturnsRequest {
      period: Period::Max,
      ..ReturnsRequest::new(tickers(n))
    }
  }

  #[test]
  fn equal_weights_split_the_value() {
    let optimizer = optimizer(2);
    let allocation = optimizer.equal_weights(&request(2), 1.0).unwrap();
    let weights = allocation.weights.unwrap();
    assert_eq!(weights.get("T0"), Some(0.5));
    assert_eq!(weights.get("T1"), Some(0.5));
    assert_eq!(allocation.returns.n_assets(), 2);
  }

  #[test]
  fn equal_weights_ignore_volatility() {
    let periods = 60;
    let returns = ndarray::Array2::from_shape_fn((periods, 2), |(t, j)| {
      let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
      let vol = if j == 0 { 0.02 } else { 0.01 };
      sign * vol
    });
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let dates = (0..=periods as i64).map(|d| start + Duration::days(d)).collect();
    let prices =
      PriceTable::from_returns(dates, vec!["A".to_string(), "B".to_string()], &returns).unwrap();
    let optimizer = PortfolioOptimizer::with_default_engine(InMemoryProvider::new(prices));
    let request = ReturnsRequest {
      period: Period::Max,
      ..ReturnsRequest::new(["A", "B"])
    };

    let allocation = optimizer.equal_weights(&request, 1.0).unwrap();
    let stds = allocation.returns.std_devs();
    assert_abs_diff_eq!(stds[0], 2.0 * stds[1], epsilon = 1e-9);

    let weights = allocation.weights.unwrap();
    assert_eq!(weights.tickers().collect::<Vec<_>>(), vec!["A", "B"]);
    assert_eq!(weights.values(), vec![0.5, 0.5]);
  }

  #[test]
  fn property_weights_are_proportional() {
    let optimizer = optimizer(3);
    let mut attributes = StaticAttributes::default();
    attributes.insert("T0", "marketCap", 3.0);
    attributes.insert("T1", "marketCap", 1.0);

    let allocation = optimizer
      .property_weights(&request(3), &attributes, "marketCap", 2.0)
      .unwrap();
    let weights = allocation.weights.unwrap();
    assert_abs_diff_eq!(weights.get("T0").unwrap(), 1.5, epsilon = 1e-12);
    assert_abs_diff_eq!(weights.get("T1").unwrap(), 0.5, epsilon = 1e-12);
    assert_eq!(weights.get("T2"), Some(0.0));
  }

  #[traced_test]
  #[test]
  fn empty_property_sum_is_reported_not_raised() {
    let optimizer = optimizer(2);
    let allocation = optimizer
      .property_weights(&request(2), &StaticAttributes::default(), "marketCap", 1.0)
      .unwrap();

    assert!(allocation.weights.is_none());
    assert_eq!(
      allocation.failure,
      Some(Infeasible::EmptyAttributeSum {
        property: "marketCap".to_string()
      })
    );
    assert_eq!(allocation.returns.n_assets(), 2);
    assert!(logs_contain("no attribute was found"));
  }

  #[test]
  fn feasible_mean_risk_weights_sum_to_value() {
    let optimizer = optimizer(3);
    let params = MeanRiskParams {
      objective: Objective::MinRisk,
      value: 2.0,
      ..MeanRiskParams::default()
    };
    let weights = optimizer.mean_risk(&request(3), &params).unwrap().weights.unwrap();
    assert_abs_diff_eq!(weights.sum(), 2.0, epsilon = 1e-4);
    assert!(weights.iter().all(|(_, w)| w >= 0.0));
  }

  #[traced_test]
  #[test]
  fn infeasible_target_yields_no_weights() {
    let optimizer = optimizer(3);
    let params = MeanRiskParams {
      target_return: Some(1000.0),
      ..MeanRiskParams::default()
    };
    let allocation = optimizer.mean_risk(&request(3), &params).unwrap();
    assert!(!allocation.is_feasible());
    assert_eq!(allocation.failure, Some(Infeasible::NoFeasibleSolution));
    assert!(logs_contain("no feasible allocation"));

    let (weights, returns) = allocation.into_parts();
    assert!(weights.is_none());
    assert_eq!(returns.n_assets(), 3);
  }

  #[test]
  fn hierarchical_measures_are_rejected_by_mean_risk() {
    let optimizer = optimizer(3);
    let params = MeanRiskParams {
      risk_measure: RiskMeasure::TG,
      ..MeanRiskParams::default()
    };
    assert!(matches!(
      optimizer.mean_risk(&request(3), &params),
      Err(PortfolioError::RiskMeasureNotSupported { .. })
    ));
  }

  #[test]
  fn diversification_portfolios_are_fully_invested() {
    let optimizer = optimizer(4);
    let params = DiversificationParams::default();
    for allocation in [
      optimizer.max_diversification(&request(4), &params).unwrap(),
      optimizer.max_decorrelation(&request(4), &params).unwrap(),
    ] {
      let weights = allocation.weights.unwrap();
      assert_abs_diff_eq!(weights.sum(), 1.0, epsilon = 1e-4);
    }
  }

  #[test]
  fn risk_parity_scales_by_value() {
    let optimizer = optimizer(3);
    let params = RiskParityParams {
      risk_cont: Some(vec![2.0, 1.0, 1.0]),
      value: 2.0,
      ..RiskParityParams::default()
    };
    let weights = optimizer.risk_parity(&request(3), &params).unwrap().weights.unwrap();
    assert_abs_diff_eq!(weights.sum(), 2.0, epsilon = 1e-4);
  }

  #[test]
  fn relaxed_risk_parity_runs_every_version() {
    let optimizer = optimizer(3);
    for version in [RelaxationVersion::A, RelaxationVersion::B, RelaxationVersion::C] {
      let params = RelaxedRiskParityParams {
        version,
        ..RelaxedRiskParityParams::default()
      };
      let weights = optimizer
        .rel_risk_parity(&request(3), &params)
        .unwrap()
        .weights
        .unwrap();
      assert_abs_diff_eq!(weights.sum(), 1.0, epsilon = 1e-4);
    }
  }

  #[test]
  fn hierarchical_allocation_is_scaled() {
    let optimizer = optimizer(6);
    let params = HierarchicalParams {
      model: HcModel::Herc,
      k: Some(2),
      value: 3.0,
      ..HierarchicalParams::default()
    };
    let weights = optimizer.hierarchical(&request(6), &params).unwrap().weights.unwrap();
    assert_eq!(weights.len(), 6);
    assert_abs_diff_eq!(weights.sum(), 3.0, epsilon = 1e-4);
  }

  #[test]
  fn strategies_name_their_entry_points() {
    let diversification = Strategy::ClassicMeanRisk {
      params: MeanRiskParams::default(),
      adjustment: MomentAdjustment::VolatilityAsMean,
    };
    assert_eq!(diversification.name(), "max_diversification");
    assert_eq!(
      Strategy::HierarchicalClustering(HierarchicalParams::default()).name(),
      "hierarchical"
    );
  }
}

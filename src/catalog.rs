//! # Risk Measure Catalog
//!
//! $$
//! \rho \mapsto (\text{bound slot},\ \text{drawdown?},\ \text{compounded?},\ \text{scaling})
//! $$
//!
//! Closed registry of the supported risk measures. The table is static read-only data,
//! so lookups never need synchronization.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::frequency::Scaling;

/// Supported risk measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RiskMeasure {
  /// Standard deviation.
  #[default]
  MV,
  /// Mean absolute deviation.
  MAD,
  /// Semi standard deviation.
  MSV,
  /// First lower partial moment (Omega ratio).
  FLPM,
  /// Second lower partial moment (Sortino ratio).
  SLPM,
  /// Conditional value at risk.
  CVaR,
  /// Entropic value at risk.
  EVaR,
  /// Worst realization.
  WR,
  /// Maximum drawdown of uncompounded cumulative returns.
  MDD,
  /// Average drawdown of uncompounded cumulative returns.
  ADD,
  /// Conditional drawdown at risk of uncompounded cumulative returns.
  CDaR,
  /// Entropic drawdown at risk of uncompounded cumulative returns.
  EDaR,
  /// Ulcer index of uncompounded cumulative returns.
  UCI,
  /// Value at risk.
  VaR,
  /// Tail Gini of losses.
  TG,
  /// Range of returns.
  RG,
  /// CVaR range of returns.
  CVRG,
  /// Tail Gini range of returns.
  TGRG,
  /// Drawdown at risk of uncompounded cumulative returns.
  DaR,
  MDDRel,
  ADDRel,
  DaRRel,
  CDaRRel,
  EDaRRel,
  UCIRel,
}

/// Named upper-bound slot on [`crate::problem::RiskBounds`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpperBound {
  Dev,
  Mad,
  Sdev,
  Flpm,
  Slpm,
  CVaR,
  EVaR,
  Wr,
  Mdd,
  Add,
  CDaR,
  EDaR,
  Uci,
}

impl UpperBound {
  /// Constraint attribute name used by the optimization engine.
  pub fn field_name(&self) -> &'static str {
    match self {
      Self::Dev => "upperdev",
      Self::Mad => "uppermad",
      Self::Sdev => "uppersdev",
      Self::Flpm => "upperflpm",
      Self::Slpm => "upperslpm",
      Self::CVaR => "upperCVaR",
      Self::EVaR => "upperEVaR",
      Self::Wr => "upperwr",
      Self::Mdd => "uppermdd",
      Self::Add => "upperadd",
      Self::CDaR => "upperCDaR",
      Self::EDaR => "upperEDaR",
      Self::Uci => "upperuci",
    }
  }

  /// Risk measure constrained by this slot.
  pub fn measure(&self) -> RiskMeasure {
    match self {
      Self::Dev => RiskMeasure::MV,
      Self::Mad => RiskMeasure::MAD,
      Self::Sdev => RiskMeasure::MSV,
      Self::Flpm => RiskMeasure::FLPM,
      Self::Slpm => RiskMeasure::SLPM,
      Self::CVaR => RiskMeasure::CVaR,
      Self::EVaR => RiskMeasure::EVaR,
      Self::Wr => RiskMeasure::WR,
      Self::Mdd => RiskMeasure::MDD,
      Self::Add => RiskMeasure::ADD,
      Self::CDaR => RiskMeasure::CDaR,
      Self::EDaR => RiskMeasure::EDaR,
      Self::Uci => RiskMeasure::UCI,
    }
  }
}

/// Catalog entry for one risk measure.
#[derive(Clone, Copy, Debug)]
pub struct RiskMeasureInfo {
  pub measure: RiskMeasure,
  pub name: &'static str,
  pub upper_bound: Option<UpperBound>,
  pub drawdown: bool,
  pub compounded: bool,
}

const fn entry(
  measure: RiskMeasure,
  name: &'static str,
  upper_bound: Option<UpperBound>,
  drawdown: bool,
  compounded: bool,
) -> RiskMeasureInfo {
  RiskMeasureInfo {
    measure,
    name,
    upper_bound,
    drawdown,
    compounded,
  }
}

/// Registry ordered as [`RiskMeasure`] variants.
pub static RISK_MEASURES: [RiskMeasureInfo; 25] = [
  entry(RiskMeasure::MV, "MV", Some(UpperBound::Dev), false, false),
  entry(RiskMeasure::MAD, "MAD", Some(UpperBound::Mad), false, false),
  entry(RiskMeasure::MSV, "MSV", Some(UpperBound::Sdev), false, false),
  entry(RiskMeasure::FLPM, "FLPM", Some(UpperBound::Flpm), false, false),
  entry(RiskMeasure::SLPM, "SLPM", Some(UpperBound::Slpm), false, false),
  entry(RiskMeasure::CVaR, "CVaR", Some(UpperBound::CVaR), false, false),
  entry(RiskMeasure::EVaR, "EVaR", Some(UpperBound::EVaR), false, false),
  entry(RiskMeasure::WR, "WR", Some(UpperBound::Wr), false, false),
  entry(RiskMeasure::MDD, "MDD", Some(UpperBound::Mdd), true, false),
  entry(RiskMeasure::ADD, "ADD", Some(UpperBound::Add), true, false),
  entry(RiskMeasure::CDaR, "CDaR", Some(UpperBound::CDaR), true, false),
  entry(RiskMeasure::EDaR, "EDaR", Some(UpperBound::EDaR), true, false),
  entry(RiskMeasure::UCI, "UCI", Some(UpperBound::Uci), true, false),
  entry(RiskMeasure::VaR, "VaR", None, false, false),
  entry(RiskMeasure::TG, "TG", None, false, false),
  entry(RiskMeasure::RG, "RG", None, false, false),
  entry(RiskMeasure::CVRG, "CVRG", None, false, false),
  entry(RiskMeasure::TGRG, "TGRG", None, false, false),
  entry(RiskMeasure::DaR, "DaR", None, true, false),
  entry(RiskMeasure::MDDRel, "MDD_Rel", None, true, true),
  entry(RiskMeasure::ADDRel, "ADD_Rel", None, true, true),
  entry(RiskMeasure::DaRRel, "DaR_Rel", None, true, true),
  entry(RiskMeasure::CDaRRel, "CDaR_Rel", None, true, true),
  entry(RiskMeasure::EDaRRel, "EDaR_Rel", None, true, true),
  entry(RiskMeasure::UCIRel, "UCI_Rel", None, true, true),
];

impl RiskMeasure {
  /// Catalog entry for this measure.
  pub fn info(&self) -> &'static RiskMeasureInfo {
    &RISK_MEASURES[*self as usize]
  }

  /// Identifier as used in configuration (`"CVaR"`, `"MDD_Rel"`, ...).
  pub fn name(&self) -> &'static str {
    self.info().name
  }

  /// Whether the measure can be used (and bounded) by the classic mean-risk model.
  pub fn is_classic(&self) -> bool {
    self.info().upper_bound.is_some()
  }
}

impl Display for RiskMeasure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.name())
  }
}

impl FromStr for RiskMeasure {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    let s = s.trim();
    RISK_MEASURES
      .iter()
      .find(|info| info.name == s)
      .or_else(|| {
        RISK_MEASURES
          .iter()
          .find(|info| info.name.eq_ignore_ascii_case(s))
      })
      .map(|info| info.measure)
      .ok_or_else(|| PortfolioError::UnknownRiskMeasure(s.to_string()))
  }
}

/// Upper-bound slot constrained when a target risk is supplied for `measure`.
pub fn upper_bound_field(measure: RiskMeasure) -> Result<UpperBound> {
  measure
    .info()
    .upper_bound
    .ok_or(PortfolioError::RiskMeasureNotSupported {
      measure: measure.name(),
      context: "target risk constraints",
    })
}

/// Drawdown measures operate on cumulative return paths.
pub fn is_drawdown_type(measure: RiskMeasure) -> bool {
  measure.info().drawdown
}

/// `_Rel` drawdowns use compounded cumulative returns.
pub fn is_compounded(measure: RiskMeasure) -> bool {
  measure.info().compounded
}

/// Measures accepted by risk parity. WR, MDD, ADD and the hierarchical-only measures are not.
pub fn supports_risk_parity(measure: RiskMeasure) -> bool {
  matches!(
    measure,
    RiskMeasure::MV
      | RiskMeasure::MAD
      | RiskMeasure::MSV
      | RiskMeasure::FLPM
      | RiskMeasure::SLPM
      | RiskMeasure::CVaR
      | RiskMeasure::EVaR
      | RiskMeasure::UCI
      | RiskMeasure::CDaR
      | RiskMeasure::EDaR
  )
}

/// Time scaling applied to a target risk expressed in annual units.
pub fn scale_exponent(measure: RiskMeasure) -> Scaling {
  if is_drawdown_type(measure) {
    Scaling::Invariant
  } else {
    Scaling::SqrtTime
  }
}

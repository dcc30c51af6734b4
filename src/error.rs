//! # Errors
//!
//! $$
//! \text{identifier} \mapsto \text{variant} \;\vee\; \text{PortfolioError}
//! $$
//!
//! Configuration and contract errors. Solver infeasibility is not an error: it is
//! reported as a missing weight vector on [`crate::optimizer::Allocation`].

use thiserror::Error;

/// Errors raised by the orchestration layer, the providers and the reference engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PortfolioError {
  #[error("unknown risk measure `{0}`")]
  UnknownRiskMeasure(String),

  #[error("unknown relaxed risk parity version `{0}`, expected A, B or C")]
  UnknownRelaxationVersion(String),

  #[error("unsupported frequency `{0}`, expected D, W or M")]
  UnsupportedFrequency(String),

  #[error("unknown objective `{0}`")]
  UnknownObjective(String),

  #[error("unknown estimation method `{0}`")]
  UnknownEstimator(String),

  #[error("unknown codependence measure `{0}`")]
  UnknownCodependence(String),

  #[error("unknown linkage method `{0}`")]
  UnknownLinkage(String),

  #[error("unknown bins method `{0}`, expected KN, FD, SC or HGR")]
  UnknownBinsMethod(String),

  #[error("unknown hierarchical model `{0}`, expected HRP, HERC or NCO")]
  UnknownModel(String),

  #[error("unknown interpolation method `{0}`")]
  UnknownInterpolation(String),

  #[error("invalid period `{0}`")]
  InvalidPeriod(String),

  #[error("risk measure {measure} is not supported by {context}")]
  RiskMeasureNotSupported {
    measure: &'static str,
    context: &'static str,
  },

  #[error("invalid parameter `{name}`: {reason}")]
  InvalidParameter { name: &'static str, reason: String },

  #[error("dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("insufficient data: {0}")]
  InsufficientData(String),

  #[error("asset `{0}` is not available from the provider")]
  MissingAsset(String),

  #[error("{0} is not supported by this engine")]
  UnsupportedByEngine(String),

  #[error("provider error: {0}")]
  Provider(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PortfolioError>;

impl PortfolioError {
  pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
    Self::InvalidParameter {
      name,
      reason: reason.into(),
    }
  }
}

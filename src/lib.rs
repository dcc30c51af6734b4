//! # optifolio
//!
//! $$
//! \mathbf{w}^\* = \arg\min_{\mathbf{w}\in\mathcal{W}}\ \mathcal{L}(\mathbf{w};\ \mu, \Sigma, \rho)
//! $$
//!
//! Portfolio construction over a universe of asset returns: mean-risk, risk parity, relaxed
//! risk parity, maximum diversification and decorrelation, and hierarchical clustering
//! allocations. User-facing parameters are normalized into a problem instance, solved by an
//! [`engine::OptimizationEngine`] and post-processed into a ticker-keyed allocation.

pub mod catalog;
pub mod constraints;
pub mod data;
pub mod engine;
pub mod error;
pub mod frequency;
pub mod optimizer;
pub mod problem;
pub mod sampler;
pub mod weights;

pub use catalog::RiskMeasure;
pub use catalog::UpperBound;
pub use data::InMemoryProvider;
pub use data::ReturnMatrix;
pub use data::ReturnProvider;
pub use data::ReturnsRequest;
pub use engine::NelderMeadEngine;
pub use engine::OptimizationEngine;
pub use error::PortfolioError;
pub use error::Result;
pub use frequency::Frequency;
pub use optimizer::Allocation;
pub use optimizer::Infeasible;
pub use optimizer::PortfolioOptimizer;
pub use optimizer::Strategy;
pub use sampler::generate_random_portfolios;
pub use weights::WeightVector;

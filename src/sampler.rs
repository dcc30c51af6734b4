//! # Random Portfolios
//!
//! $$
//! \mathbf{w} \sim \operatorname{Dir}(\alpha\mathbf{1}),\qquad \alpha\in\{1,\,0.65,\,2\}
//! $$
//!
//! Seeded long-only portfolios for efficient-frontier scatter plots: three Dirichlet
//! batches with flat, sparse and concentrated draws, followed by the single-asset corners.

use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Dirichlet;
use rand_distr::Distribution;
use tracing::debug;

use crate::error::PortfolioError;
use crate::error::Result;

/// Per-asset Dirichlet concentrations of the three batches.
pub const CONCENTRATIONS: [f64; 3] = [1.0, 0.65, 2.0];

/// Sampled portfolios, rows = assets, columns = portfolios.
#[derive(Clone, Debug)]
pub struct RandomPortfolios {
  pub assets: Vec<String>,
  pub weights: Array2<f64>,
}

impl RandomPortfolios {
  pub fn n_portfolios(&self) -> usize {
    self.weights.ncols()
  }
}

/// Draw `3 * floor(n_portfolios / 3)` Dirichlet portfolios plus one unit vector per asset.
pub fn generate_random_portfolios(
  stocks: &[String],
  n_portfolios: usize,
  seed: u64,
  value: f64,
) -> Result<RandomPortfolios> {
  let n = stocks.len();
  if n == 0 {
    return Err(PortfolioError::invalid("stocks", "at least one ticker is required"));
  }

  let per_batch = n_portfolios / 3;
  let total = 3 * per_batch + n;
  let mut weights = Array2::<f64>::zeros((n, total));
  let mut rng = StdRng::seed_from_u64(seed);

  let mut col = 0;
  for alpha in CONCENTRATIONS {
    if n == 1 {
      for _ in 0..per_batch {
        weights[[0, col]] = 1.0;
        col += 1;
      }
      continue;
    }

    let dirichlet = Dirichlet::new_with_size(alpha, n)
      .map_err(|e| PortfolioError::invalid("alpha", e.to_string()))?;
    for _ in 0..per_batch {
      let sample: Vec<f64> = dirichlet.sample(&mut rng);
      for (i, w) in sample.into_iter().enumerate() {
        weights[[i, col]] = w;
      }
      col += 1;
    }
  }

  for i in 0..n {
    weights[[i, col + i]] = 1.0;
  }

  if value > 0.0 {
    weights.mapv_inplace(|w| w * value);
  }

  debug!(assets = n, portfolios = total, seed, "random portfolios generated");
  Ok(RandomPortfolios {
    assets: stocks.to_vec(),
    weights,
  })
}

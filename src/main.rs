use anyhow::Result;
use chrono::Duration;
use chrono::NaiveDate;
use ndarray::Array2;
use optifolio::InMemoryProvider;
use optifolio::PortfolioOptimizer;
use optifolio::ReturnsRequest;
use optifolio::RiskMeasure;
use optifolio::data::Period;
use optifolio::data::PriceTable;
use optifolio::data::StaticAttributes;
use optifolio::generate_random_portfolios;
use optifolio::optimizer::Allocation;
use optifolio::optimizer::DiversificationParams;
use optifolio::optimizer::HierarchicalParams;
use optifolio::optimizer::MeanRiskParams;
use optifolio::optimizer::RelaxedRiskParityParams;
use optifolio::optimizer::RiskParityParams;
use optifolio::problem::HcModel;
use optifolio::problem::Objective;
use optifolio::problem::RelaxationVersion;
use prettytable::Cell;
use prettytable::Row;
use prettytable::Table;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;
use tracing_subscriber::EnvFilter;

const TICKERS: [&str; 6] = ["AAPL", "MSFT", "XOM", "CVX", "JNJ", "PFE"];

/// Three sectors of two names each, two years of daily closes.
fn synthetic_prices(days: usize) -> Result<PriceTable> {
  let mut rng = StdRng::seed_from_u64(2024);
  let normal = Normal::new(0.0, 1.0)?;
  let mut returns = Array2::zeros((days, TICKERS.len()));
  for t in 0..days {
    let market = normal.sample(&mut rng);
    let sectors = [
      normal.sample(&mut rng),
      normal.sample(&mut rng),
      normal.sample(&mut rng),
    ];
    for j in 0..TICKERS.len() {
      let drift = 0.0003 + 0.0001 * j as f64;
      returns[[t, j]] = drift
        + 0.008 * market
        + 0.006 * sectors[j / 2]
        + 0.005 * normal.sample(&mut rng);
    }
  }

  let start = NaiveDate::from_ymd_opt(2023, 1, 2).ok_or_else(|| anyhow::anyhow!("bad date"))?;
  let dates = (0..=days as i64).map(|d| start + Duration::days(d)).collect();
  let assets = TICKERS.iter().map(|s| s.to_string()).collect();
  Ok(PriceTable::from_returns(dates, assets, &returns)?)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let optimizer = PortfolioOptimizer::with_default_engine(InMemoryProvider::new(
    synthetic_prices(504)?,
  ));
  let request = ReturnsRequest {
    period: Period::Max,
    ..ReturnsRequest::new(TICKERS)
  };

  let mut attributes = StaticAttributes::default();
  for (ticker, cap) in TICKERS.iter().zip([3.4e12, 3.1e12, 4.5e11, 2.9e11, 3.8e11, 1.6e11]) {
    attributes.insert(*ticker, "marketCap", cap);
  }

  let allocations: Vec<(&str, Allocation)> = vec![
    ("equal", optimizer.equal_weights(&request, 1.0)?),
    (
      "market cap",
      optimizer.property_weights(&request, &attributes, "marketCap", 1.0)?,
    ),
    ("max sharpe", optimizer.mean_risk(&request, &MeanRiskParams::default())?),
    (
      "min CVaR",
      optimizer.mean_risk(
        &request,
        &MeanRiskParams {
          objective: Objective::MinRisk,
          risk_measure: RiskMeasure::CVaR,
          ..MeanRiskParams::default()
        },
      )?,
    ),
    (
      "max div",
      optimizer.max_diversification(&request, &DiversificationParams::default())?,
    ),
    (
      "max decorr",
      optimizer.max_decorrelation(&request, &DiversificationParams::default())?,
    ),
    ("ERC", optimizer.risk_parity(&request, &RiskParityParams::default())?),
    (
      "RRP (B)",
      optimizer.rel_risk_parity(
        &request,
        &RelaxedRiskParityParams {
          version: RelaxationVersion::B,
          ..RelaxedRiskParityParams::default()
        },
      )?,
    ),
    ("HRP", optimizer.hierarchical(&request, &HierarchicalParams::default())?),
    (
      "HERC",
      optimizer.hierarchical(
        &request,
        &HierarchicalParams {
          model: HcModel::Herc,
          k: Some(3),
          ..HierarchicalParams::default()
        },
      )?,
    ),
    (
      "NCO",
      optimizer.hierarchical(
        &request,
        &HierarchicalParams {
          model: HcModel::Nco,
          k: Some(3),
          ..HierarchicalParams::default()
        },
      )?,
    ),
  ];

  let mut table = Table::new();
  let mut header = vec![Cell::new("ticker")];
  header.extend(allocations.iter().map(|(name, _)| Cell::new(name)));
  table.add_row(Row::new(header));

  for ticker in TICKERS {
    let mut cells = vec![Cell::new(ticker)];
    for (_, allocation) in &allocations {
      let text = allocation
        .weights
        .as_ref()
        .and_then(|w| w.get(ticker))
        .map_or_else(|| "-".to_string(), |w| format!("{w:.4}"));
      cells.push(Cell::new(&text));
    }
    table.add_row(Row::new(cells));
  }
  table.printstd();

  let stocks: Vec<String> = TICKERS.iter().map(|s| s.to_string()).collect();
  let sampled = generate_random_portfolios(&stocks, 300, 123, 1.0)?;
  println!(
    "sampled {} random portfolios over {} assets",
    sampled.n_portfolios(),
    sampled.assets.len()
  );

  Ok(())
}

use chrono::Duration;
use chrono::NaiveDate;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use ndarray::Array2;
use optifolio::data::PriceTable;
use optifolio::engine::classic;
use optifolio::engine::hierarchical;
use optifolio::engine::estimators::covariance_matrix;
use optifolio::engine::estimators::mean_vector;
use optifolio::problem::CovarianceEstimator;
use optifolio::problem::HcModel;
use optifolio::problem::HierarchicalProblem;
use optifolio::problem::MeanEstimator;
use optifolio::problem::Moments;
use optifolio::problem::Objective;
use optifolio::problem::PortfolioSpec;
use optifolio::NelderMeadEngine;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;

fn panel(periods: usize, assets: usize) -> Array2<f64> {
  let mut rng = StdRng::seed_from_u64(7);
  let normal = Normal::new(0.0, 1.0).unwrap();
  Array2::from_shape_fn((periods, assets), |(_, j)| {
    0.0003 + 0.01 * (1.0 + 0.1 * j as f64) * normal.sample(&mut rng)
  })
}

fn bench_classic(c: &mut Criterion) {
  let mut group = c.benchmark_group("classic_by_assets");
  let engine = NelderMeadEngine::default();

  for &n in &[4usize, 8, 16] {
    let returns = panel(500, n);
    let moments = Moments {
      mu: mean_vector(&returns, MeanEstimator::Hist, 0.94).unwrap(),
      cov: covariance_matrix(&returns, CovarianceEstimator::Hist, 0.94).unwrap(),
    };

    for objective in [Objective::MinRisk, Objective::Sharpe] {
      let spec = PortfolioSpec {
        objective,
        ..PortfolioSpec::default()
      };
      group.bench_with_input(BenchmarkId::new(objective.to_string(), n), &n, |b, _| {
        b.iter(|| black_box(classic::optimize(&engine, &returns, &spec, &moments).unwrap()));
      });
    }
  }

  group.finish();
}

fn bench_hierarchical(c: &mut Criterion) {
  let mut group = c.benchmark_group("hierarchical_by_model");
  let engine = NelderMeadEngine::default();
  let returns = panel(500, 12);

  for model in [HcModel::Hrp, HcModel::Herc, HcModel::Nco] {
    let problem = HierarchicalProblem {
      model,
      k: Some(3),
      ..HierarchicalProblem::default()
    };
    group.bench_function(format!("{model:?}"), |b| {
      b.iter(|| black_box(hierarchical::hierarchical(&engine, &returns, &problem).unwrap()));
    });
  }

  group.finish();
}

fn bench_price_pipeline(c: &mut Criterion) {
  let returns = panel(750, 10);
  let start = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
  let dates: Vec<NaiveDate> = (0..=750).map(|d| start + Duration::days(d)).collect();
  let assets: Vec<String> = (0..10).map(|j| format!("A{j}")).collect();
  let prices = PriceTable::from_returns(dates, assets, &returns).unwrap();

  c.bench_function("process_returns_daily", |b| {
    b.iter(|| {
      black_box(
        optifolio::data::process_returns(
          &prices,
          false,
          optifolio::Frequency::Daily,
          0.05,
          0.0,
          optifolio::data::Interpolation::Time,
        )
        .unwrap(),
      )
    });
  });
}

criterion_group!(benches, bench_classic, bench_hierarchical, bench_price_pipeline);
criterion_main!(benches);

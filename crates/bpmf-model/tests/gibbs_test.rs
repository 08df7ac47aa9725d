//! Integration tests for the Gibbs sampler and posterior reductions

use approx::assert_relative_eq;
use bpmf_core::{error::Result, types::DMatrix};
use bpmf_model::{
    BayesianFactorizationModel, CellSelector, FactorizationModel, ModelConfig,
    PosteriorAggregator, PosteriorSample, Rating,
};
use rand::{rngs::StdRng, SeedableRng};

fn fitted_model(seed: u64) -> Result<BayesianFactorizationModel> {
    let mut rng = StdRng::seed_from_u64(seed);
    let ratings = vec![
        Rating::new(0, 0, 5.0),
        Rating::new(0, 1, 3.0),
        Rating::new(1, 0, 4.0),
    ];
    let config = ModelConfig::new()
        .with_learning_rate(1e-2)
        .with_min_learning_rate(1e-20)
        .with_stop_threshold(1e-10);
    let mut model = FactorizationModel::new(ratings, 1, config, &mut rng)?;
    model.fit();
    Ok(BayesianFactorizationModel::from_map(model))
}

#[test]
fn test_fifty_steps_give_finite_estimates() -> Result<()> {
    let mut model = fitted_model(1)?;
    let mut rng = StdRng::seed_from_u64(10);

    let samples: Vec<PosteriorSample> = model.samples(&mut rng).take(50).collect::<Result<_>>()?;
    assert_eq!(samples.len(), 50);

    let estimate = PosteriorAggregator::new(CellSelector::All).point_estimate(&samples)?;
    assert_eq!(estimate.len(), 4);
    assert!(estimate.values().iter().all(|x| x.is_finite()));
    Ok(())
}

#[test]
fn test_streaming_and_collected_agree() -> Result<()> {
    let aggregator = PosteriorAggregator::new(CellSelector::Cells(vec![(1, 1), (0, 0)]));

    let mut streamed = fitted_model(2)?;
    let mut rng = StdRng::seed_from_u64(20);
    let samples = streamed.samples(&mut rng).take(25).map_while(|s| s.ok());
    let from_stream = aggregator.point_estimate(samples)?;

    let mut collected = fitted_model(2)?;
    let mut rng = StdRng::seed_from_u64(20);
    let kept: Vec<_> = collected.samples(&mut rng).take(25).collect::<Result<_>>()?;
    let from_vec = aggregator.point_estimate(&kept)?;

    assert_relative_eq!(from_stream.values(), from_vec.values(), epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_variance_matches_two_pass() -> Result<()> {
    let mut model = fitted_model(3)?;
    let mut rng = StdRng::seed_from_u64(30);
    model.burn_in(10, &mut rng)?;
    let samples: Vec<_> = model.samples(&mut rng).take(40).collect::<Result<_>>()?;

    let variance = PosteriorAggregator::new(CellSelector::All)
        .predictive_variance(&samples)?
        .to_matrix()
        .unwrap();

    let n = samples.len() as f64;
    let predictions: Vec<DMatrix<f64>> = samples.iter().map(|s| s.predicted_matrix()).collect();
    let mean = predictions.iter().fold(DMatrix::<f64>::zeros(2, 2), |acc, p| acc + p) / n;
    let two_pass = predictions
        .iter()
        .fold(DMatrix::<f64>::zeros(2, 2), |acc, p| acc + (p - &mean).map(|x| x * x))
        / n;

    assert_relative_eq!(variance, two_pass, max_relative = 1e-6, epsilon = 1e-12);
    Ok(())
}

#[test]
fn test_probabilities_and_rmse() -> Result<()> {
    let mut model = fitted_model(4)?;
    let mut rng = StdRng::seed_from_u64(40);
    let samples: Vec<_> = model.samples(&mut rng).take(30).collect::<Result<_>>()?;
    let aggregator = PosteriorAggregator::new(CellSelector::All);

    let everything = aggregator.prob_ge_cutoff(&samples, f64::NEG_INFINITY)?;
    assert!(everything.values().iter().all(|&p| p == 1.0));
    let nothing = aggregator.prob_ge_cutoff(&samples, f64::INFINITY)?;
    assert!(nothing.values().iter().all(|&p| p == 0.0));

    let partial = aggregator.prob_ge_cutoff(&samples, 4.0)?;
    assert!(partial.values().iter().all(|&p| (0.0..=1.0).contains(&p)));

    let estimate = aggregator.point_estimate(&samples)?.to_matrix().unwrap();
    assert_relative_eq!(aggregator.bayes_rmse(&samples, &estimate)?, 0.0, epsilon = 1e-12);
    Ok(())
}

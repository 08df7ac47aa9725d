//! Integration tests for the MAP model and its fitting loop

use approx::assert_relative_eq;
use bpmf_core::{error::Result, types::DMatrix};
use bpmf_model::{FactorizationModel, ModelConfig, ModelStatus, Rating, TerminationReason};
use rand::{rngs::StdRng, SeedableRng};

fn small_ratings() -> Vec<Rating> {
    vec![
        Rating::new(0, 0, 5.0),
        Rating::new(0, 1, 3.0),
        Rating::new(1, 0, 4.0),
    ]
}

fn tight_config() -> ModelConfig {
    ModelConfig::new()
        .with_learning_rate(1e-2)
        .with_min_learning_rate(1e-20)
        .with_stop_threshold(1e-10)
}

/// Observed values where rated, the model's own prediction elsewhere.
fn self_completed(model: &FactorizationModel) -> DMatrix<f64> {
    let mut truth = model.predicted_matrix();
    for rating in model.ratings() {
        truth[(rating.row, rating.col)] = rating.value;
    }
    truth
}

#[test]
fn test_fit_recovers_observed_ratings() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut model = FactorizationModel::new(small_ratings(), 1, tight_config(), &mut rng)?;

    let summary = model.fit();
    assert!(summary.steps > 0);
    assert_eq!(model.status(), ModelStatus::Converged);

    let rmse = model.rmse(&self_completed(&model))?;
    assert!(rmse < 0.5, "rmse {} too large", rmse);
    for rating in model.ratings() {
        assert!((model.predict(rating.row, rating.col) - rating.value).abs() < 1.0);
    }
    Ok(())
}

#[test]
fn test_fit_from_array_with_mean_subtraction() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(7);
    let array = DMatrix::from_row_slice(3, 3, &[0.0, 0.0, 5.0, 0.0, 1.0, 3.0, 1.0, 0.0, 4.0]);
    let config = tight_config().with_subtract_mean(true);
    let mut model = FactorizationModel::from_array(&array, 1, config, &mut rng)?;
    assert_relative_eq!(model.offset(), 4.0);

    model.fit();
    let rmse = model.rmse(&self_completed(&model))?;
    assert!(rmse < 0.5, "rmse {} too large", rmse);

    model.add_rating(1, 1, 2.0)?;
    assert_relative_eq!(model.offset(), 3.5);
    Ok(())
}

#[test]
fn test_accepted_steps_strictly_increase() -> Result<()> {
    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut model = FactorizationModel::new(small_ratings(), 2, ModelConfig::default(), &mut rng)?;
        let mut previous = model.log_likelihood();
        let mut steps = model.fit_steps();
        for value in steps.by_ref() {
            assert!(value > previous, "seed {}: {} !> {}", seed, value, previous);
            previous = value;
        }
        assert!(steps.termination_reason().is_some());
    }
    Ok(())
}

#[test]
fn test_refit_after_adding_ratings() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(99);
    let mut model = FactorizationModel::new(small_ratings(), 1, tight_config(), &mut rng)?;
    model.fit();

    model.add_ratings(&[Rating::new(1, 1, 2.4)])?;
    assert_eq!(model.status(), ModelStatus::Constructed);
    assert!(model.unrated().is_empty());

    let summary = model.fit();
    assert!(matches!(
        summary.termination_reason,
        TerminationReason::Converged | TerminationReason::MinLearningRate
    ));
    assert_relative_eq!(summary.log_likelihood, model.log_likelihood(), epsilon = 1e-12);
    assert!(model.rmse(&self_completed(&model))? < 0.5);
    Ok(())
}

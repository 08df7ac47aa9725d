//! Example: fit a MAP factorization, then sample the posterior.
//!
//! A rank-2 matrix is generated, about a third of its entries are observed,
//! and the held-out entries are predicted from the posterior mean.
//!
//! Run with: RUST_LOG=debug cargo run --example fit_and_sample

use bpmf::nalgebra::DMatrix;
use bpmf::prelude::*;
use bpmf::rand::{rngs::StdRng, Rng, SeedableRng};
use log::info;

const ROWS: usize = 12;
const COLS: usize = 10;
const RANK: usize = 2;

fn main() -> Result<()> {
    env_logger::init();
    println!("=== Bayesian matrix factorization ===\n");

    let mut rng = StdRng::seed_from_u64(2024);

    // Ground truth with a rank-2 structure
    let u = DMatrix::from_fn(ROWS, RANK, |_, _| rng.gen_range(0.5..1.5));
    let v = DMatrix::from_fn(COLS, RANK, |_, _| rng.gen_range(0.5..1.5));
    let truth = &u * v.transpose();

    // Observe roughly a third of the cells; the last cell pins the grid size
    let mut ratings = vec![Rating::new(ROWS - 1, COLS - 1, truth[(ROWS - 1, COLS - 1)])];
    for row in 0..ROWS {
        for col in 0..COLS {
            if (row, col) != (ROWS - 1, COLS - 1) && rng.gen::<f64>() < 0.35 {
                ratings.push(Rating::new(row, col, truth[(row, col)]));
            }
        }
    }
    println!("Observed {} of {} cells", ratings.len(), ROWS * COLS);

    let config = ModelConfig::new()
        .with_learning_rate(1e-2)
        .with_min_learning_rate(1e-20)
        .with_stop_threshold(1e-8);
    let mut model = BayesianFactorizationModel::new(ratings, RANK, config, &mut rng)?;

    // MAP fit
    let summary = model.fit();
    println!(
        "MAP fit: {} steps, log-likelihood {:.4} ({:?})",
        summary.steps, summary.log_likelihood, summary.termination_reason
    );
    println!("MAP RMSE vs truth: {:.4}", model.model().rmse(&truth)?);

    // Posterior sampling
    model.burn_in(100, &mut rng)?;
    let samples: Vec<_> = model.samples(&mut rng).take(200).collect::<Result<_>>()?;
    info!("collected {} posterior samples", samples.len());

    let all = PosteriorAggregator::new(CellSelector::All);
    println!("Posterior-mean RMSE vs truth: {:.4}", all.bayes_rmse(&samples, &truth)?);

    // Held-out cells only
    let held_out: Vec<_> = model.model().unrated().iter().copied().collect();
    let held_out_count = held_out.len();
    let unseen = PosteriorAggregator::new(CellSelector::Cells(held_out));
    println!(
        "Held-out RMSE: {:.4} over {} cells",
        unseen.bayes_rmse(&samples, &truth)?,
        held_out_count
    );

    let mean = unseen.point_estimate(&samples)?;
    let variance = unseen.predictive_variance(&samples)?;
    let above = unseen.prob_ge_cutoff(&samples, 2.0)?;

    println!("\n  cell      truth    mean     std    P(>=2)");
    for (((cell, m), (_, var)), (_, p)) in mean.iter().zip(variance.iter()).zip(above.iter()).take(8) {
        println!(
            "  {:>2},{:<2}   {:7.3}  {:7.3}  {:6.3}  {:5.2}",
            cell.0,
            cell.1,
            truth[cell],
            m,
            var.sqrt(),
            p
        );
    }

    Ok(())
}

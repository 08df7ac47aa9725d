//! # bpmf
//!
//! Bayesian probabilistic matrix factorization in Rust.
//!
//! A sparse matrix of observed ratings is modelled as `R ≈ c + U Vᵀ` with
//! low-rank factors `U` (one row per matrix row) and `V` (one row per
//! matrix column). The library fits a MAP estimate by adaptive gradient
//! ascent and then explores the posterior with a Gibbs sampler under
//! Normal-Wishart hyperpriors.
//!
//! ## Quick Start
//!
//! ```rust
//! use bpmf::prelude::*;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let ratings = vec![
//!     Rating::new(0, 0, 5.0),
//!     Rating::new(0, 1, 3.0),
//!     Rating::new(1, 0, 4.0),
//! ];
//!
//! // Fit the point estimate first, then sample around it
//! let mut model = BayesianFactorizationModel::new(ratings, 1, ModelConfig::default(), &mut rng)?;
//! model.fit();
//! model.burn_in(20, &mut rng)?;
//!
//! let samples: Vec<_> = model.samples(&mut rng).take(100).collect::<Result<_>>()?;
//! let unseen = PosteriorAggregator::new(CellSelector::Cells(vec![(1, 1)]));
//! let mean = unseen.point_estimate(&samples)?;
//! let variance = unseen.predictive_variance(&samples)?;
//! assert!(mean.get(1, 1).is_some() && variance.get(1, 1).is_some());
//! # Ok::<(), BpmfError>(())
//! ```
//!
//! ## Crate Organization
//!
//! - [`bpmf_core`]: Errors, linear algebra helpers and streaming statistics
//! - [`bpmf_model`]: Ratings, MAP and Bayesian models, posterior reductions
//!
//! ## Logging
//!
//! The library logs through the [`log`](https://docs.rs/log) facade; install
//! any logger (e.g. `env_logger`) to see fit progress and Gibbs snapshots.

pub use bpmf_core;
pub use bpmf_model;

// Re-export key dependencies
pub use nalgebra;
pub use rand;

pub use bpmf_core::{BpmfError, Result};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use bpmf_model::prelude::*;
}

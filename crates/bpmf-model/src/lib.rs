//! Probabilistic matrix factorization: MAP fitting and Gibbs sampling.
//!
//! This crate fits a low-rank model `R ≈ c + U Vᵀ` to a sparse matrix of
//! observed ratings, first as a point (MAP) estimate by adaptive gradient
//! ascent, then as a full posterior by Gibbs sampling under Normal-Wishart
//! hyperpriors.
//!
//! # Available Components
//!
//! - **[`FactorizationModel`]**: ratings, factors, log-likelihood and the
//!   [`FitSteps`] gradient-ascent iterator
//! - **[`BayesianFactorizationModel`]**: hyperparameter and factor
//!   conditionals, [`gibbs_step`](BayesianFactorizationModel::gibbs_step)
//!   and the [`SampleStream`] of posterior samples
//! - **[`PosteriorAggregator`]**: point estimates, predictive variance,
//!   exceedance probabilities and RMSE over samples
//! - **[`ModelState`] / [`BayesianModelState`]**: serializable snapshots
//!
//! # Examples
//!
//! ```rust
//! use bpmf_model::prelude::*;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let ratings = vec![
//!     Rating::new(0, 0, 5.0),
//!     Rating::new(0, 1, 3.0),
//!     Rating::new(1, 0, 4.0),
//! ];
//!
//! let config = ModelConfig::new()
//!     .with_learning_rate(1e-2)
//!     .with_min_learning_rate(1e-20)
//!     .with_stop_threshold(1e-10);
//! let mut model = FactorizationModel::new(ratings, 1, config, &mut rng)?;
//!
//! let summary = model.fit();
//! assert!(summary.steps > 0);
//! assert!(model.unrated().contains(&(1, 1)));
//! # Ok::<(), BpmfError>(())
//! ```

pub mod bayes;
pub mod config;
pub mod pmf;
pub mod posterior;
pub mod ratings;
pub mod state;

// Re-export main types for convenience
pub use bayes::{BayesianFactorizationModel, HyperParams, PosteriorSample, SampleStream};
pub use config::{BayesConfig, ModelConfig, NormalWishartPrior};
pub use pmf::{FactorizationModel, FitSteps, FitSummary, ModelStatus, TerminationReason};
pub use posterior::{CellEstimates, CellLayout, CellSelector, PosteriorAggregator};
pub use ratings::{AxisRatings, Rating, RatingIndex, RatingSet};
pub use state::{BayesianModelState, ModelState};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bayes::{BayesianFactorizationModel, HyperParams, PosteriorSample};
    pub use crate::config::{BayesConfig, ModelConfig, NormalWishartPrior};
    pub use crate::pmf::{FactorizationModel, FitSummary, ModelStatus, TerminationReason};
    pub use crate::posterior::{CellEstimates, CellSelector, PosteriorAggregator};
    pub use crate::ratings::Rating;
    pub use bpmf_core::prelude::*;
}

//! Plain-data snapshots of model state.
//!
//! These are what gets serialized. Conversion back into a model goes through
//! [`FactorizationModel::from_state`](crate::pmf::FactorizationModel::from_state)
//! and
//! [`BayesianFactorizationModel::from_state`](crate::bayes::BayesianFactorizationModel::from_state),
//! which check every field against the others.

use crate::{
    bayes::HyperParams,
    config::{BayesConfig, ModelConfig, NormalWishartPrior},
    pmf::ModelStatus,
    ratings::Rating,
};
use bpmf_core::types::{Cell, DMatrix};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Everything needed to rebuild a [`FactorizationModel`](crate::pmf::FactorizationModel).
///
/// ```rust
/// use bpmf_model::{FactorizationModel, ModelConfig, Rating};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(1);
/// let ratings = vec![Rating::new(0, 0, 5.0), Rating::new(1, 1, 2.0)];
/// let model = FactorizationModel::new(ratings, 3, ModelConfig::default(), &mut rng)?;
///
/// let state = model.to_state();
/// assert_eq!((state.num_rows, state.num_cols, state.latent_dim), (2, 2, 3));
/// assert_eq!(state.unrated, vec![(0, 1), (1, 0)]);
/// assert_eq!(state.row_factors.shape(), (2, 3));
/// # Ok::<(), bpmf_core::BpmfError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelState {
    /// Fit configuration, including the adapted learning rate
    pub config: ModelConfig,
    /// Number of latent dimensions `d`
    pub latent_dim: usize,
    /// Grid height
    pub num_rows: usize,
    /// Grid width
    pub num_cols: usize,
    /// Observed ratings in insertion order
    pub ratings: Vec<Rating>,
    /// Rated cells in ascending order
    pub rated: Vec<Cell>,
    /// Unrated cells in ascending order
    pub unrated: Vec<Cell>,
    /// Row factors `U` (`num_rows × d`)
    pub row_factors: DMatrix<f64>,
    /// Column factors `V` (`num_cols × d`)
    pub col_factors: DMatrix<f64>,
    /// Fit lifecycle at capture time
    pub status: ModelStatus,
}

/// Everything needed to rebuild a
/// [`BayesianFactorizationModel`](crate::bayes::BayesianFactorizationModel).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BayesianModelState {
    /// The underlying factorization
    pub base: ModelState,
    /// Sampler settings
    pub bayes: BayesConfig,
    /// Normal-Wishart prior over the row hyperparameters
    pub row_prior: NormalWishartPrior,
    /// Normal-Wishart prior over the column hyperparameters
    pub col_prior: NormalWishartPrior,
    /// Most recent row hyperparameter draw
    pub row_hyper: HyperParams,
    /// Most recent column hyperparameter draw
    pub col_hyper: HyperParams,
}

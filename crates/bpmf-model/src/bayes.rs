//! Bayesian probabilistic matrix factorization via Gibbs sampling.
//!
//! # Mathematical Foundation
//!
//! Each axis (rows `U`, columns `V`) carries hyperparameters `(μ, Λ)` with a
//! fixed Normal-Wishart prior:
//!
//! ```text
//! Λ ~ W(W₀, ν₀)          μ | Λ ~ N(μ₀, (β₀ Λ)⁻¹)
//! u_i | μ, Λ ~ N(μ, Λ⁻¹)
//! r_ij | u_i, v_j ~ N(c + u_i·v_j, β⁻¹)
//! ```
//!
//! ## Hyperparameter conditional
//!
//! With `N` factor vectors, mean `x̄` and scatter `S = Σ (x_k - x̄)(x_k - x̄)ᵀ`:
//!
//! ```text
//! W* = (W₀⁻¹ + S + β₀N/(β₀+N) (μ₀ - x̄)(μ₀ - x̄)ᵀ)⁻¹
//! Λ  ~ W(W*, ν₀ + N)
//! μ  ~ N((β₀μ₀ + N x̄)/(β₀+N), ((β₀+N) Λ)⁻¹)
//! ```
//!
//! ## Factor conditional
//!
//! For a row `i` rated against columns `K`:
//!
//! ```text
//! Σ* = (Λ + β Σ_{k∈K} v_k v_kᵀ)⁻¹
//! μ* = Σ* (Λμ + β Σ_{k∈K} v_k (r_ik - c))
//! u_i ~ N(μ*, Σ*)
//! ```
//!
//! Columns are symmetric. A vector with no ratings is drawn from its
//! hyperparameter distribution `N(μ, Λ⁻¹)`.
//!
//! # Gibbs step
//!
//! One step draws the row hyperparameters, then the column hyperparameters,
//! then every row factor against the current column factors, then every
//! column factor against the freshly drawn row factors. All draws are
//! staged and committed together, so a failed step leaves the model as it
//! was.

use crate::{
    config::{BayesConfig, ModelConfig, NormalWishartPrior},
    pmf::{FactorizationModel, FitSummary},
    ratings::{AxisRatings, Rating, RatingIndex},
    state::BayesianModelState,
};
use bpmf_core::{
    error::{BpmfError, Result},
    linalg,
    types::{constants, Axis, DMatrix, DVector},
};
use log::debug;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;

/// Hyperparameters `(μ, Λ)` of one axis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HyperParams {
    /// Mean of the factor vectors
    pub mean: DVector<f64>,
    /// Precision of the factor vectors
    pub precision: DMatrix<f64>,
}

impl HyperParams {
    /// Starting point for sampling: the prior mean and the Wishart scale.
    pub fn from_prior(prior: &NormalWishartPrior) -> Self {
        Self {
            mean: prior.mean.clone(),
            precision: prior.scale.clone(),
        }
    }

    fn validate(&self, latent_dim: usize) -> Result<()> {
        if self.mean.len() != latent_dim
            || self.precision.shape() != (latent_dim, latent_dim)
        {
            return Err(BpmfError::shape_mismatch(
                format!("hyperparameters of dimension {}", latent_dim),
                format!(
                    "mean of length {} and precision {}",
                    self.mean.len(),
                    constants::shape(self.precision.nrows(), self.precision.ncols())
                ),
            ));
        }
        linalg::cholesky_lower(&self.precision, "hyperparameter precision")?;
        Ok(())
    }
}

/// Immutable snapshot of the factors after one Gibbs step.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PosteriorSample {
    row_factors: DMatrix<f64>,
    col_factors: DMatrix<f64>,
    offset: f64,
}

impl PosteriorSample {
    /// Snapshot of a model's current factors.
    pub fn from_model(model: &FactorizationModel) -> Self {
        Self {
            row_factors: model.row_factors().clone(),
            col_factors: model.col_factors().clone(),
            offset: model.offset(),
        }
    }

    /// Row factors `U`.
    pub fn row_factors(&self) -> &DMatrix<f64> {
        &self.row_factors
    }

    /// Column factors `V`.
    pub fn col_factors(&self) -> &DMatrix<f64> {
        &self.col_factors
    }

    /// Constant added to every prediction.
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Grid shape `(num_rows, num_cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.row_factors.nrows(), self.col_factors.nrows())
    }

    /// Prediction for one cell. Panics if the cell lies outside the grid.
    pub fn predict(&self, row: usize, col: usize) -> f64 {
        self.offset + self.row_factors.row(row).dot(&self.col_factors.row(col))
    }

    /// Full prediction matrix `c + U Vᵀ`.
    pub fn predicted_matrix(&self) -> DMatrix<f64> {
        (&self.row_factors * self.col_factors.transpose()).add_scalar(self.offset)
    }
}

/// Probabilistic matrix factorization with Normal-Wishart hyperpriors.
///
/// Wraps a [`FactorizationModel`] (ratings and factors) and adds per-axis
/// priors and hyperparameter state. The usual workflow is to fit the MAP
/// model first and sample from there:
///
/// ```
/// use bpmf_model::prelude::*;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(7);
/// let ratings = vec![Rating::new(0, 0, 5.0), Rating::new(0, 1, 3.0), Rating::new(1, 0, 4.0)];
/// let mut model = BayesianFactorizationModel::new(ratings, 1, ModelConfig::default(), &mut rng)?;
/// model.fit();
/// model.burn_in(10, &mut rng)?;
///
/// let samples: Vec<_> = model.samples(&mut rng).take(20).collect::<Result<_>>()?;
/// let estimate = PosteriorAggregator::new(CellSelector::All).point_estimate(&samples)?;
/// assert_eq!(estimate.len(), 4);
/// # Ok::<(), BpmfError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BayesianFactorizationModel {
    model: FactorizationModel,
    bayes: BayesConfig,
    row_prior: NormalWishartPrior,
    col_prior: NormalWishartPrior,
    row_hyper: HyperParams,
    col_hyper: HyperParams,
}

impl BayesianFactorizationModel {
    /// Builds the underlying MAP model and attaches default priors.
    pub fn new<R: Rng + ?Sized>(
        ratings: Vec<Rating>,
        latent_dim: usize,
        config: ModelConfig,
        rng: &mut R,
    ) -> Result<Self> {
        let model = FactorizationModel::new(ratings, latent_dim, config, rng)?;
        Ok(Self::from_map(model))
    }

    /// Wraps an existing (typically already fitted) MAP model.
    pub fn from_map(model: FactorizationModel) -> Self {
        let prior = NormalWishartPrior::default_for(model.latent_dim());
        let hyper = HyperParams::from_prior(&prior);
        Self {
            model,
            bayes: BayesConfig::default(),
            row_prior: prior.clone(),
            col_prior: prior,
            row_hyper: hyper.clone(),
            col_hyper: hyper,
        }
    }

    /// Replaces both priors and resets the current hyperparameters to them.
    pub fn with_priors(
        mut self,
        row_prior: NormalWishartPrior,
        col_prior: NormalWishartPrior,
    ) -> Result<Self> {
        let d = self.model.latent_dim();
        row_prior.validate(d)?;
        col_prior.validate(d)?;
        self.row_hyper = HyperParams::from_prior(&row_prior);
        self.col_hyper = HyperParams::from_prior(&col_prior);
        self.row_prior = row_prior;
        self.col_prior = col_prior;
        Ok(self)
    }

    /// Replaces the sampler settings.
    pub fn with_bayes_config(mut self, bayes: BayesConfig) -> Result<Self> {
        bayes.validate()?;
        self.bayes = bayes;
        Ok(self)
    }

    // --- delegation --------------------------------------------------------

    /// The wrapped MAP model.
    pub fn model(&self) -> &FactorizationModel {
        &self.model
    }

    /// Mutable access to the wrapped MAP model.
    pub fn model_mut(&mut self) -> &mut FactorizationModel {
        &mut self.model
    }

    /// Consumes the wrapper, returning the MAP model.
    pub fn into_model(self) -> FactorizationModel {
        self.model
    }

    /// See [`FactorizationModel::add_ratings`].
    pub fn add_ratings(&mut self, batch: &[Rating]) -> Result<()> {
        self.model.add_ratings(batch)
    }

    /// See [`FactorizationModel::fit`].
    pub fn fit(&mut self) -> FitSummary {
        self.model.fit()
    }

    /// See [`FactorizationModel::predicted_matrix`].
    pub fn predicted_matrix(&self) -> DMatrix<f64> {
        self.model.predicted_matrix()
    }

    /// Current hyperparameters of `axis`.
    pub fn hyperparams(&self, axis: Axis) -> &HyperParams {
        match axis {
            Axis::Rows => &self.row_hyper,
            Axis::Cols => &self.col_hyper,
        }
    }

    /// Prior of `axis`.
    pub fn prior(&self, axis: Axis) -> &NormalWishartPrior {
        match axis {
            Axis::Rows => &self.row_prior,
            Axis::Cols => &self.col_prior,
        }
    }

    /// Sampler settings.
    pub fn bayes_config(&self) -> &BayesConfig {
        &self.bayes
    }

    /// Observation precision `β` used by the factor conditionals.
    pub fn observation_precision(&self) -> f64 {
        self.bayes
            .observation_precision
            .unwrap_or_else(|| 1.0 / self.model.config().sigma_sq)
    }

    // --- conditionals ------------------------------------------------------

    /// Draws `(μ, Λ)` for `axis` conditioned on its current factors.
    ///
    /// Does not store the draw.
    ///
    /// # Errors
    ///
    /// [`BpmfError::NotPositiveDefinite`] if a posterior scale or covariance
    /// loses positive definiteness.
    pub fn sample_hyperparams<R: Rng + ?Sized>(&self, axis: Axis, rng: &mut R) -> Result<HyperParams> {
        let prior = self.prior(axis);
        let factors = self.model.factors(axis);
        let d = self.model.latent_dim();
        let count = factors.nrows();
        let n = count as f64;
        let b0 = prior.pseudo_count;

        let x_bar = DVector::from_fn(d, |k, _| factors.column(k).mean());
        let centered = DMatrix::from_fn(count, d, |i, k| factors[(i, k)] - x_bar[k]);
        let scatter = centered.transpose() * &centered;

        let diff = &prior.mean - &x_bar;
        let shrinkage = (&diff * diff.transpose()) * (b0 * n / (b0 + n));

        let w0_inv = linalg::spd_inverse(&prior.scale, "prior Wishart scale")?;
        let w_post = linalg::symmetrize(&linalg::spd_inverse(
            &(w0_inv + scatter + shrinkage),
            "posterior Wishart scale",
        )?);
        let precision = linalg::sample_wishart(&w_post, prior.dof + count, rng)?;

        let mu_post = (&prior.mean * b0 + &x_bar * n) / (b0 + n);
        let mean_cov = linalg::spd_inverse(&(&precision * (b0 + n)), "hyperparameter mean precision")?;
        let mean = linalg::sample_multivariate_normal(&mu_post, &mean_cov, rng)?;

        Ok(HyperParams { mean, precision })
    }

    /// Draws one factor vector of `axis` from its full conditional.
    ///
    /// `other_factors` are the factors of the opposite axis; `ratings` lists
    /// the opposite-axis indices rated by entry `index` and their values.
    ///
    /// # Errors
    ///
    /// * [`BpmfError::ShapeMismatch`] if `other_factors` has the wrong width,
    ///   an index is out of range, or `ratings` is ragged
    /// * [`BpmfError::NotPositiveDefinite`] if the conditional precision is
    ///   not positive definite
    pub fn sample_factor_row<R: Rng + ?Sized>(
        &self,
        axis: Axis,
        index: usize,
        hyper: &HyperParams,
        other_factors: &DMatrix<f64>,
        ratings: &AxisRatings,
        rng: &mut R,
    ) -> Result<DVector<f64>> {
        let d = self.model.latent_dim();
        if other_factors.ncols() != d {
            return Err(BpmfError::shape_mismatch(
                format!("{} factors with {} columns", axis.other().name(), d),
                constants::shape(other_factors.nrows(), other_factors.ncols()),
            ));
        }
        if ratings.indices.len() != ratings.values.len() {
            return Err(BpmfError::shape_mismatch(
                format!("{} rating values", ratings.indices.len()),
                ratings.values.len(),
            ));
        }
        if let Some(&bad) = ratings.indices.iter().find(|&&k| k >= other_factors.nrows()) {
            return Err(BpmfError::shape_mismatch(
                format!("{} index below {}", axis.other().name(), other_factors.nrows()),
                bad,
            ));
        }

        let beta = self.observation_precision();
        let offset = self.model.offset();

        let mut precision = hyper.precision.clone();
        let mut rhs = &hyper.precision * &hyper.mean;
        for (&k, &value) in ratings.indices.iter().zip(&ratings.values) {
            let v = other_factors.row(k).transpose();
            precision.ger(beta, &v, &v, 1.0);
            rhs.axpy(beta * (value - offset), &v, 1.0);
        }

        let context = format!("{} {} conditional precision", axis.name(), index);
        let cov = linalg::spd_inverse(&precision, &context)?;
        let mean = &cov * rhs;
        linalg::sample_multivariate_normal(&mean, &cov, rng)
    }

    fn resample_axis<R: Rng + ?Sized>(
        &self,
        axis: Axis,
        hyper: &HyperParams,
        other_factors: &DMatrix<f64>,
        index: &RatingIndex,
        rng: &mut R,
    ) -> Result<DMatrix<f64>> {
        let count = index.len_along(axis);
        let mut factors = DMatrix::zeros(count, self.model.latent_dim());
        for i in 0..count {
            let x = self.sample_factor_row(axis, i, hyper, other_factors, index.entries(axis, i), rng)?;
            factors.set_row(i, &x.transpose());
        }
        Ok(factors)
    }

    // --- sampling ------------------------------------------------------------

    /// Runs one Gibbs step and returns a snapshot of the new factors.
    ///
    /// On error nothing is committed.
    pub fn gibbs_step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<PosteriorSample> {
        let index = self.model.rating_set().index();
        self.gibbs_step_indexed(&index, rng)
    }

    fn gibbs_step_indexed<R: Rng + ?Sized>(
        &mut self,
        index: &RatingIndex,
        rng: &mut R,
    ) -> Result<PosteriorSample> {
        let row_hyper = self.sample_hyperparams(Axis::Rows, rng)?;
        let col_hyper = self.sample_hyperparams(Axis::Cols, rng)?;

        let mut row_factors = self.model.row_factors().clone();
        let mut col_factors = self.model.col_factors().clone();
        for _ in 0..self.bayes.sweeps_per_sample {
            row_factors = self.resample_axis(Axis::Rows, &row_hyper, &col_factors, index, rng)?;
            col_factors = self.resample_axis(Axis::Cols, &col_hyper, &row_factors, index, rng)?;
        }

        self.model.replace_factors(row_factors, col_factors);
        self.row_hyper = row_hyper;
        self.col_hyper = col_hyper;

        let sample = PosteriorSample::from_model(&self.model);
        debug!(
            "gibbs snapshot: |U| = {:.4}, |V| = {:.4}",
            sample.row_factors().norm(),
            sample.col_factors().norm()
        );
        Ok(sample)
    }

    /// Runs and discards `steps` Gibbs steps.
    pub fn burn_in<R: Rng + ?Sized>(&mut self, steps: usize, rng: &mut R) -> Result<()> {
        let index = self.model.rating_set().index();
        for _ in 0..steps {
            self.gibbs_step_indexed(&index, rng)?;
        }
        debug!("burn-in of {} steps done", steps);
        Ok(())
    }

    /// Endless stream of posterior samples, one per Gibbs step.
    ///
    /// The rating lookup is built once here. The stream ends after yielding
    /// its first error.
    pub fn samples<'a, R: Rng + ?Sized>(&'a mut self, rng: &'a mut R) -> SampleStream<'a, R> {
        let index = self.model.rating_set().index();
        SampleStream {
            model: self,
            rng,
            index,
            failed: false,
        }
    }

    // --- serialization -------------------------------------------------------

    /// Captures the full model state.
    pub fn to_state(&self) -> BayesianModelState {
        BayesianModelState {
            base: self.model.to_state(),
            bayes: self.bayes.clone(),
            row_prior: self.row_prior.clone(),
            col_prior: self.col_prior.clone(),
            row_hyper: self.row_hyper.clone(),
            col_hyper: self.col_hyper.clone(),
        }
    }

    /// Rebuilds a model from a captured state.
    ///
    /// # Errors
    ///
    /// Everything [`FactorizationModel::from_state`] reports, plus
    /// [`BpmfError::InvalidState`] for priors, hyperparameters or sampler
    /// settings that do not fit the base model.
    pub fn from_state(state: BayesianModelState) -> Result<Self> {
        let model = FactorizationModel::from_state(state.base)?;
        let d = model.latent_dim();

        let invalid = |what: &str, err: BpmfError| BpmfError::invalid_state(format!("{}: {}", what, err));
        state.bayes.validate().map_err(|e| invalid("sampler settings", e))?;
        state.row_prior.validate(d).map_err(|e| invalid("row prior", e))?;
        state.col_prior.validate(d).map_err(|e| invalid("column prior", e))?;
        state.row_hyper.validate(d).map_err(|e| invalid("row hyperparameters", e))?;
        state.col_hyper.validate(d).map_err(|e| invalid("column hyperparameters", e))?;

        Ok(Self {
            model,
            bayes: state.bayes,
            row_prior: state.row_prior,
            col_prior: state.col_prior,
            row_hyper: state.row_hyper,
            col_hyper: state.col_hyper,
        })
    }
}

/// Lazy stream of posterior samples; see
/// [`BayesianFactorizationModel::samples`].
pub struct SampleStream<'a, R: ?Sized> {
    model: &'a mut BayesianFactorizationModel,
    rng: &'a mut R,
    index: RatingIndex,
    failed: bool,
}

impl<R: Rng + ?Sized> Iterator for SampleStream<'_, R> {
    type Item = Result<PosteriorSample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let step = self.model.gibbs_step_indexed(&self.index, self.rng);
        self.failed = step.is_err();
        Some(step)
    }
}

impl<R: Rng + ?Sized> FusedIterator for SampleStream<'_, R> {}

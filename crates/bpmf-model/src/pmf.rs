//! Maximum a posteriori probabilistic matrix factorization.
//!
//! # Model
//!
//! Each observed rating `r_ij` is modelled as
//!
//! ```text
//! r_ij ~ N(c + u_i · v_j, σ²)
//! u_i ~ N(0, σ_u² I)        v_j ~ N(0, σ_v² I)
//! ```
//!
//! where `c` is the mean observed value when mean subtraction is enabled and
//! zero otherwise. The MAP estimate maximizes
//!
//! ```text
//! L(U, V) = -Σ (r_ij - c - u_i·v_j)² / 2σ²  -  ‖U‖²_F / 2σ_u²  -  ‖V‖²_F / 2σ_v²
//! ```
//!
//! # Fitting
//!
//! [`FactorizationModel::fit_steps`] runs gradient ascent with an adaptive
//! step size. A proposed step `F + η ∇L` is accepted only if it strictly
//! increases `L`; the step size then grows by 25%. A rejected step halves the
//! step size and is retried from the same point. Fitting stops when an
//! accepted step gains less than `stop_threshold`, or when the step size drops
//! below `min_learning_rate`.

use crate::{
    config::ModelConfig,
    ratings::{Rating, RatingSet},
    state::ModelState,
};
use bpmf_core::{
    error::{BpmfError, Result},
    types::{constants, Axis, Cell, DMatrix},
};
use log::{debug, trace, warn};
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::iter::FusedIterator;

/// Lifecycle of a model with respect to fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ModelStatus {
    /// Constructed, or ratings were added since the last fit
    Constructed,
    /// A fit iterator is live and has not finished
    Fitting,
    /// The last fit ran to completion
    Converged,
}

/// Why a fit stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// An accepted step improved the log-likelihood by less than the threshold
    Converged,
    /// The step size fell below `min_learning_rate` without finding an
    /// improving step
    MinLearningRate,
}

/// Outcome of [`FactorizationModel::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct FitSummary {
    /// Number of accepted gradient steps
    pub steps: usize,
    /// Log-likelihood at the final factors
    pub log_likelihood: f64,
    /// Learning rate after the last adaptation
    pub learning_rate: f64,
    /// Why fitting stopped
    pub termination_reason: TerminationReason,
}

/// Low-rank factorization of a sparse rating matrix.
///
/// Owns the observed ratings and the two dense factor matrices
/// (`num_rows × d` and `num_cols × d`).
#[derive(Debug, Clone, PartialEq)]
pub struct FactorizationModel {
    config: ModelConfig,
    latent_dim: usize,
    ratings: RatingSet,
    row_factors: DMatrix<f64>,
    col_factors: DMatrix<f64>,
    offset: f64,
    status: ModelStatus,
}

impl FactorizationModel {
    /// Builds a model from observed ratings.
    ///
    /// The grid is sized from the largest index on each axis and both factor
    /// matrices are filled with independent `Uniform[0, 1)` draws.
    ///
    /// # Errors
    ///
    /// * [`BpmfError::InvalidConfiguration`] for `latent_dim == 0` or an
    ///   invalid `config`
    /// * [`BpmfError::InvalidShape`] for an empty or malformed rating list
    /// * [`BpmfError::DuplicateRating`] if a cell is rated twice
    pub fn new<R: Rng + ?Sized>(
        ratings: Vec<Rating>,
        latent_dim: usize,
        config: ModelConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if latent_dim == 0 {
            return Err(BpmfError::invalid_configuration(
                "latent_dim",
                latent_dim,
                "must be at least 1",
            ));
        }
        config.validate()?;
        let ratings = RatingSet::new(ratings)?;

        let row_factors = DMatrix::from_fn(ratings.num_rows(), latent_dim, |_, _| rng.gen::<f64>());
        let col_factors = DMatrix::from_fn(ratings.num_cols(), latent_dim, |_, _| rng.gen::<f64>());

        let mut model = Self {
            config,
            latent_dim,
            ratings,
            row_factors,
            col_factors,
            offset: 0.0,
            status: ModelStatus::Constructed,
        };
        model.refresh_offset();
        debug!(
            "built {}x{} factorization with d = {} from {} ratings",
            model.num_rows(),
            model.num_cols(),
            latent_dim,
            model.ratings.len()
        );
        Ok(model)
    }

    /// Builds a model from an `n × 3` array of `(row, col, value)` records.
    pub fn from_array<R: Rng + ?Sized>(
        array: &DMatrix<f64>,
        latent_dim: usize,
        config: ModelConfig,
        rng: &mut R,
    ) -> Result<Self> {
        Self::new(Rating::from_array(array)?, latent_dim, config, rng)
    }

    // --- ratings ---------------------------------------------------------

    /// Adds a batch of ratings.
    ///
    /// The batch is validated as a whole first; on error the model is
    /// unchanged. On success the model drops back to
    /// [`ModelStatus::Constructed`]; refitting is up to the caller.
    ///
    /// # Errors
    ///
    /// * [`BpmfError::InvalidShape`] if a rating lies outside the grid
    /// * [`BpmfError::DuplicateRating`] if a cell is already rated
    pub fn add_ratings(&mut self, batch: &[Rating]) -> Result<()> {
        if let Err(err) = self.ratings.insert_batch(batch) {
            warn!("rejected batch of {} ratings: {}", batch.len(), err);
            return Err(err);
        }
        self.refresh_offset();
        self.status = ModelStatus::Constructed;
        Ok(())
    }

    /// Adds ratings given as an `n × 3` array.
    pub fn add_ratings_array(&mut self, array: &DMatrix<f64>) -> Result<()> {
        let batch = Rating::from_array(array)?;
        self.add_ratings(&batch)
    }

    /// Adds a single rating.
    pub fn add_rating(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        self.add_ratings(&[Rating::new(row, col, value)])
    }

    fn refresh_offset(&mut self) {
        self.offset = if self.config.subtract_mean {
            self.ratings.mean_value()
        } else {
            0.0
        };
    }

    // --- objective ---------------------------------------------------------

    /// Log-likelihood (up to a constant) at the current factors.
    pub fn log_likelihood(&self) -> f64 {
        self.objective(&self.row_factors, &self.col_factors)
    }

    /// Log-likelihood at the given factors.
    ///
    /// # Errors
    ///
    /// [`BpmfError::ShapeMismatch`] if the factors do not match the model.
    pub fn log_likelihood_at(
        &self,
        row_factors: &DMatrix<f64>,
        col_factors: &DMatrix<f64>,
    ) -> Result<f64> {
        self.check_factor_shapes(row_factors, col_factors)?;
        Ok(self.objective(row_factors, col_factors))
    }

    fn objective(&self, row_factors: &DMatrix<f64>, col_factors: &DMatrix<f64>) -> f64 {
        let sq_err: f64 = self
            .ratings
            .ratings()
            .iter()
            .map(|r| {
                let residual = r.value
                    - self.offset
                    - row_factors.row(r.row).dot(&col_factors.row(r.col));
                residual * residual
            })
            .sum();

        let row_norm = row_factors.norm_squared();
        // The legacy objective penalized V with U's norm.
        let col_norm = if self.config.use_legacy_norm_bug {
            row_norm
        } else {
            col_factors.norm_squared()
        };

        -sq_err / (2.0 * self.config.sigma_sq)
            - row_norm / (2.0 * self.config.sigma_u_sq)
            - col_norm / (2.0 * self.config.sigma_v_sq)
    }

    /// Gradient of the log-likelihood with respect to `(U, V)`.
    pub fn gradient(&self) -> (DMatrix<f64>, DMatrix<f64>) {
        self.gradient_at(&self.row_factors, &self.col_factors)
    }

    fn gradient_at(
        &self,
        row_factors: &DMatrix<f64>,
        col_factors: &DMatrix<f64>,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        let mut grad_rows = row_factors / -self.config.sigma_u_sq;
        let mut grad_cols = col_factors / -self.config.sigma_v_sq;

        for r in self.ratings.ratings() {
            let predicted = row_factors.row(r.row).dot(&col_factors.row(r.col));
            let weight = (r.value - self.offset - predicted) / self.config.sigma_sq;
            for k in 0..self.latent_dim {
                grad_rows[(r.row, k)] += weight * col_factors[(r.col, k)];
                grad_cols[(r.col, k)] += weight * row_factors[(r.row, k)];
            }
        }

        (grad_rows, grad_cols)
    }

    // --- fitting -------------------------------------------------------------

    /// Starts a gradient-ascent fit.
    ///
    /// The returned iterator yields the log-likelihood after every accepted
    /// step and updates the model as it goes. Dropping it before it
    /// terminates leaves the factors at the last accepted step and the
    /// status back at [`ModelStatus::Constructed`].
    pub fn fit_steps(&mut self) -> FitSteps<'_> {
        let last = self.log_likelihood();
        self.status = ModelStatus::Fitting;
        FitSteps {
            model: self,
            last_log_likelihood: last,
            steps: 0,
            termination: None,
        }
    }

    /// Runs [`fit_steps`](Self::fit_steps) to completion.
    pub fn fit(&mut self) -> FitSummary {
        let mut steps = self.fit_steps();
        for _ in steps.by_ref() {}
        let summary = FitSummary {
            steps: steps.steps(),
            log_likelihood: steps.last_log_likelihood,
            learning_rate: steps.model.config.learning_rate,
            termination_reason: steps
                .termination_reason()
                .unwrap_or(TerminationReason::Converged),
        };
        debug!(
            "fit finished after {} steps: log-likelihood {:.6}, learning rate {:.3e} ({:?})",
            summary.steps, summary.log_likelihood, summary.learning_rate, summary.termination_reason
        );
        summary
    }

    // --- prediction ----------------------------------------------------------

    /// Reconstructed matrix `c + U Vᵀ`.
    pub fn predicted_matrix(&self) -> DMatrix<f64> {
        (&self.row_factors * self.col_factors.transpose()).add_scalar(self.offset)
    }

    /// Prediction for a single cell.
    pub fn predict(&self, row: usize, col: usize) -> f64 {
        self.offset + self.row_factors.row(row).dot(&self.col_factors.row(col))
    }

    /// Root-mean-squared error of [`predicted_matrix`](Self::predicted_matrix)
    /// against `truth`, over every entry.
    ///
    /// # Errors
    ///
    /// [`BpmfError::ShapeMismatch`] if `truth` is not `num_rows × num_cols`.
    pub fn rmse(&self, truth: &DMatrix<f64>) -> Result<f64> {
        if truth.shape() != (self.num_rows(), self.num_cols()) {
            return Err(BpmfError::shape_mismatch(
                constants::shape(self.num_rows(), self.num_cols()),
                constants::shape(truth.nrows(), truth.ncols()),
            ));
        }
        let diff = truth - self.predicted_matrix();
        Ok((diff.norm_squared() / truth.len() as f64).sqrt())
    }

    // --- accessors -------------------------------------------------------------

    /// Number of rows in the grid.
    pub fn num_rows(&self) -> usize {
        self.ratings.num_rows()
    }

    /// Number of columns in the grid.
    pub fn num_cols(&self) -> usize {
        self.ratings.num_cols()
    }

    /// Latent dimension `d`.
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// The model configuration, including the adapted learning rate.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Fitting status.
    pub fn status(&self) -> ModelStatus {
        self.status
    }

    /// Constant added to every prediction (mean rating or zero).
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// The observed ratings and the rated / unrated partition.
    pub fn rating_set(&self) -> &RatingSet {
        &self.ratings
    }

    /// Observed ratings in insertion order.
    pub fn ratings(&self) -> &[Rating] {
        self.ratings.ratings()
    }

    /// Rated cells.
    pub fn rated(&self) -> &BTreeSet<Cell> {
        self.ratings.rated()
    }

    /// Unrated cells.
    pub fn unrated(&self) -> &BTreeSet<Cell> {
        self.ratings.unrated()
    }

    /// True if `(row, col)` carries a rating.
    pub fn is_rated(&self, row: usize, col: usize) -> bool {
        self.ratings.is_rated(row, col)
    }

    /// Row factor matrix `U` (`num_rows × d`).
    pub fn row_factors(&self) -> &DMatrix<f64> {
        &self.row_factors
    }

    /// Column factor matrix `V` (`num_cols × d`).
    pub fn col_factors(&self) -> &DMatrix<f64> {
        &self.col_factors
    }

    /// Factor matrix of `axis`.
    pub fn factors(&self, axis: Axis) -> &DMatrix<f64> {
        match axis {
            Axis::Rows => &self.row_factors,
            Axis::Cols => &self.col_factors,
        }
    }

    /// Replaces both factor matrices.
    ///
    /// # Errors
    ///
    /// [`BpmfError::ShapeMismatch`] if the shapes do not match the model.
    pub fn set_factors(&mut self, row_factors: DMatrix<f64>, col_factors: DMatrix<f64>) -> Result<()> {
        self.check_factor_shapes(&row_factors, &col_factors)?;
        self.replace_factors(row_factors, col_factors);
        Ok(())
    }

    pub(crate) fn replace_factors(&mut self, row_factors: DMatrix<f64>, col_factors: DMatrix<f64>) {
        self.row_factors = row_factors;
        self.col_factors = col_factors;
    }

    fn check_factor_shapes(&self, row_factors: &DMatrix<f64>, col_factors: &DMatrix<f64>) -> Result<()> {
        for (axis, factors) in [(Axis::Rows, row_factors), (Axis::Cols, col_factors)] {
            let expected = (self.ratings.len_along(axis), self.latent_dim);
            if factors.shape() != expected {
                return Err(BpmfError::shape_mismatch(
                    format!("{} factors {}", axis.name(), constants::shape(expected.0, expected.1)),
                    constants::shape(factors.nrows(), factors.ncols()),
                ));
            }
        }
        Ok(())
    }

    // --- serialization -------------------------------------------------------

    /// Captures the full model state.
    pub fn to_state(&self) -> ModelState {
        ModelState {
            config: self.config.clone(),
            latent_dim: self.latent_dim,
            num_rows: self.num_rows(),
            num_cols: self.num_cols(),
            ratings: self.ratings.ratings().to_vec(),
            rated: self.ratings.rated().iter().copied().collect(),
            unrated: self.ratings.unrated().iter().copied().collect(),
            row_factors: self.row_factors.clone(),
            col_factors: self.col_factors.clone(),
            status: self.status,
        }
    }

    /// Rebuilds a model from a captured state.
    ///
    /// # Errors
    ///
    /// * [`BpmfError::InvalidConfiguration`] for an invalid configuration
    /// * [`BpmfError::InvalidShape`] / [`BpmfError::DuplicateRating`] for an
    ///   invalid rating list
    /// * [`BpmfError::InvalidState`] if the stored partition disagrees with the
    ///   ratings or a factor matrix has the wrong shape
    pub fn from_state(state: ModelState) -> Result<Self> {
        if state.latent_dim == 0 {
            return Err(BpmfError::invalid_state("latent_dim must be at least 1"));
        }
        state.config.validate()?;
        let ratings = RatingSet::with_shape(state.num_rows, state.num_cols, state.ratings)?;

        let rated: BTreeSet<Cell> = state.rated.into_iter().collect();
        let unrated: BTreeSet<Cell> = state.unrated.into_iter().collect();
        if &rated != ratings.rated() || &unrated != ratings.unrated() {
            return Err(BpmfError::invalid_state(
                "rated/unrated cells do not match the stored ratings",
            ));
        }

        let mut model = Self {
            config: state.config,
            latent_dim: state.latent_dim,
            ratings,
            row_factors: DMatrix::zeros(0, 0),
            col_factors: DMatrix::zeros(0, 0),
            offset: 0.0,
            status: state.status,
        };
        model
            .check_factor_shapes(&state.row_factors, &state.col_factors)
            .map_err(|e| BpmfError::invalid_state(e.to_string()))?;
        model.replace_factors(state.row_factors, state.col_factors);
        model.refresh_offset();
        Ok(model)
    }
}

/// Lazy gradient-ascent fit; see [`FactorizationModel::fit_steps`].
///
/// Yields the log-likelihood after each accepted step. Exhausted once the
/// fit has converged.
#[derive(Debug)]
pub struct FitSteps<'a> {
    model: &'a mut FactorizationModel,
    last_log_likelihood: f64,
    steps: usize,
    termination: Option<TerminationReason>,
}

impl FitSteps<'_> {
    /// Number of accepted steps so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Log-likelihood at the model's current factors.
    pub fn log_likelihood(&self) -> f64 {
        self.last_log_likelihood
    }

    /// Why the fit stopped, once it has.
    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.termination
    }

    fn finish(&mut self, reason: TerminationReason) {
        self.termination = Some(reason);
        self.model.status = ModelStatus::Converged;
    }
}

impl Iterator for FitSteps<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.termination.is_some() {
            return None;
        }

        let config = &self.model.config;
        let (stop_threshold, min_learning_rate) = (config.stop_threshold, config.min_learning_rate);
        let mut learning_rate = config.learning_rate;

        let (grad_rows, grad_cols) = self.model.gradient();

        loop {
            let new_rows = &self.model.row_factors + &grad_rows * learning_rate;
            let new_cols = &self.model.col_factors + &grad_cols * learning_rate;
            let new_ll = self.model.objective(&new_rows, &new_cols);

            if new_ll > self.last_log_likelihood {
                let gain = new_ll - self.last_log_likelihood;
                self.model.replace_factors(new_rows, new_cols);
                self.model.config.learning_rate = learning_rate * constants::LEARNING_RATE_GROWTH;
                self.last_log_likelihood = new_ll;
                self.steps += 1;
                trace!(
                    "step {}: log-likelihood {:.6} (+{:.3e}), lr {:.3e}",
                    self.steps,
                    new_ll,
                    gain,
                    learning_rate
                );

                if gain < stop_threshold {
                    debug!("converged after {} steps (gain {:.3e})", self.steps, gain);
                    self.finish(TerminationReason::Converged);
                }
                return Some(new_ll);
            }

            let backed_off = learning_rate * constants::LEARNING_RATE_BACKOFF;
            // The stored rate never drops below the minimum, so the config
            // stays valid for `from_state`.
            if backed_off < min_learning_rate {
                debug!(
                    "stopping after {} steps: learning rate {:.3e} below minimum {:.3e}",
                    self.steps, backed_off, min_learning_rate
                );
                self.finish(TerminationReason::MinLearningRate);
                return None;
            }
            learning_rate = backed_off;
            self.model.config.learning_rate = learning_rate;
            trace!("rejected step, lr backed off to {:.3e}", learning_rate);
        }
    }
}

impl FusedIterator for FitSteps<'_> {}

impl Drop for FitSteps<'_> {
    fn drop(&mut self) {
        // Abandoned before termination: the model is no longer being fitted.
        if self.termination.is_none() {
            self.model.status = ModelStatus::Constructed;
        }
    }
}

//! Model, prior and sampler configuration.
//!
//! Configuration is plain data with builder-style setters; nothing here reads
//! files or the environment. Each struct has a `validate` method that the
//! models call before accepting it.

use bpmf_core::{
    error::{BpmfError, Result},
    linalg,
    types::{constants, DMatrix, DVector},
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scalar hyperparameters of the MAP model.
///
/// Everything is fixed at construction except `learning_rate`, which the
/// fitting loop adapts and writes back.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelConfig {
    /// Observation noise variance σ²
    pub sigma_sq: f64,

    /// Prior variance of the row factors σ_u²
    pub sigma_u_sq: f64,

    /// Prior variance of the column factors σ_v²
    pub sigma_v_sq: f64,

    /// Current gradient-ascent step size
    pub learning_rate: f64,

    /// Fitting stops once the step size falls below this value
    pub min_learning_rate: f64,

    /// Fitting stops once an accepted step improves the log-likelihood by
    /// less than this amount
    pub stop_threshold: f64,

    /// Model `value - mean(values)` instead of the raw value
    pub subtract_mean: bool,

    /// Penalize the column factors with the row-factor norm in the
    /// log-likelihood, reproducing numbers from older fits
    pub use_legacy_norm_bug: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sigma_sq: 1.0,
            sigma_u_sq: 10.0,
            sigma_v_sq: 10.0,
            learning_rate: 1e-4,
            min_learning_rate: 1e-10,
            stop_threshold: 1e-2,
            subtract_mean: false,
            use_legacy_norm_bug: false,
        }
    }
}

impl ModelConfig {
    /// Creates a configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the observation noise variance.
    pub fn with_sigma_sq(mut self, sigma_sq: f64) -> Self {
        self.sigma_sq = sigma_sq;
        self
    }

    /// Sets the prior variance of both factor matrices.
    pub fn with_prior_variance(mut self, sigma_u_sq: f64, sigma_v_sq: f64) -> Self {
        self.sigma_u_sq = sigma_u_sq;
        self.sigma_v_sq = sigma_v_sq;
        self
    }

    /// Sets the initial learning rate.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Sets the learning rate below which fitting stops.
    pub fn with_min_learning_rate(mut self, min_learning_rate: f64) -> Self {
        self.min_learning_rate = min_learning_rate;
        self
    }

    /// Sets the log-likelihood gain below which fitting stops.
    pub fn with_stop_threshold(mut self, stop_threshold: f64) -> Self {
        self.stop_threshold = stop_threshold;
        self
    }

    /// Enables or disables mean subtraction.
    pub fn with_subtract_mean(mut self, subtract_mean: bool) -> Self {
        self.subtract_mean = subtract_mean;
        self
    }

    /// Enables or disables the legacy norm term in the log-likelihood.
    pub fn with_legacy_norm_bug(mut self, enabled: bool) -> Self {
        self.use_legacy_norm_bug = enabled;
        self
    }

    /// Checks every parameter.
    pub fn validate(&self) -> Result<()> {
        check_positive("sigma_sq", self.sigma_sq)?;
        check_positive("sigma_u_sq", self.sigma_u_sq)?;
        check_positive("sigma_v_sq", self.sigma_v_sq)?;
        check_positive("learning_rate", self.learning_rate)?;
        check_positive("min_learning_rate", self.min_learning_rate)?;
        if self.min_learning_rate > self.learning_rate {
            return Err(BpmfError::invalid_configuration(
                "min_learning_rate",
                self.min_learning_rate,
                format!("must not exceed learning_rate ({})", self.learning_rate),
            ));
        }
        if !(self.stop_threshold >= 0.0 && self.stop_threshold.is_finite()) {
            return Err(BpmfError::invalid_configuration(
                "stop_threshold",
                self.stop_threshold,
                "must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Fixed Normal-Wishart prior over one axis' hyperparameters.
///
/// ```text
/// Λ ~ W(W₀, ν₀)
/// μ | Λ ~ N(μ₀, (β₀ Λ)⁻¹)
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NormalWishartPrior {
    /// Prior mean μ₀
    pub mean: DVector<f64>,

    /// Wishart scale matrix W₀
    pub scale: DMatrix<f64>,

    /// Wishart degrees of freedom ν₀
    pub dof: usize,

    /// Pseudo-count β₀ scaling the precision of the mean
    pub pseudo_count: f64,
}

impl NormalWishartPrior {
    /// Conventional prior for `latent_dim` dimensions: `μ₀ = 0`, `W₀ = I`,
    /// `ν₀ = latent_dim`, `β₀ = 2`.
    pub fn default_for(latent_dim: usize) -> Self {
        Self {
            mean: DVector::zeros(latent_dim),
            scale: DMatrix::identity(latent_dim, latent_dim),
            dof: latent_dim,
            pseudo_count: 2.0,
        }
    }

    /// Sets the prior mean.
    pub fn with_mean(mut self, mean: DVector<f64>) -> Self {
        self.mean = mean;
        self
    }

    /// Sets the Wishart scale matrix.
    pub fn with_scale(mut self, scale: DMatrix<f64>) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the Wishart degrees of freedom.
    pub fn with_dof(mut self, dof: usize) -> Self {
        self.dof = dof;
        self
    }

    /// Sets the pseudo-count.
    pub fn with_pseudo_count(mut self, pseudo_count: f64) -> Self {
        self.pseudo_count = pseudo_count;
        self
    }

    /// Latent dimension this prior is defined over.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Checks shapes against `latent_dim` and that the scale is SPD.
    pub fn validate(&self, latent_dim: usize) -> Result<()> {
        if self.mean.len() != latent_dim {
            return Err(BpmfError::shape_mismatch(
                format!("prior mean of length {}", latent_dim),
                self.mean.len(),
            ));
        }
        if self.scale.shape() != (latent_dim, latent_dim) {
            return Err(BpmfError::shape_mismatch(
                constants::shape(latent_dim, latent_dim),
                constants::shape(self.scale.nrows(), self.scale.ncols()),
            ));
        }
        if self.dof < latent_dim {
            return Err(BpmfError::invalid_configuration(
                "dof",
                self.dof,
                format!("must be at least the latent dimension ({})", latent_dim),
            ));
        }
        check_positive("pseudo_count", self.pseudo_count)?;
        linalg::cholesky_lower(&self.scale, "prior Wishart scale")?;
        Ok(())
    }
}

/// Settings of the Gibbs sampler.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BayesConfig {
    /// Observation precision used by the factor conditionals; `None` means
    /// `1 / sigma_sq` of the model configuration
    pub observation_precision: Option<f64>,

    /// Number of factor sweeps after each hyperparameter draw
    pub sweeps_per_sample: usize,
}

impl Default for BayesConfig {
    fn default() -> Self {
        Self {
            observation_precision: None,
            sweeps_per_sample: 1,
        }
    }
}

impl BayesConfig {
    /// Creates a sampler configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the observation precision.
    pub fn with_observation_precision(mut self, precision: f64) -> Self {
        self.observation_precision = Some(precision);
        self
    }

    /// Sets the number of factor sweeps per emitted sample.
    pub fn with_sweeps_per_sample(mut self, sweeps: usize) -> Self {
        self.sweeps_per_sample = sweeps;
        self
    }

    /// Checks every parameter.
    pub fn validate(&self) -> Result<()> {
        if let Some(precision) = self.observation_precision {
            check_positive("observation_precision", precision)?;
        }
        if self.sweeps_per_sample == 0 {
            return Err(BpmfError::invalid_configuration(
                "sweeps_per_sample",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

fn check_positive(parameter: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(BpmfError::invalid_configuration(
            parameter,
            value,
            "must be finite and positive",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ModelConfig::default().validate().is_ok());
        assert!(BayesConfig::default().validate().is_ok());
        assert!(NormalWishartPrior::default_for(4).validate(4).is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ModelConfig::new()
            .with_sigma_sq(0.5)
            .with_prior_variance(100.0, 50.0)
            .with_learning_rate(1e-2)
            .with_min_learning_rate(1e-20)
            .with_stop_threshold(1e-10)
            .with_subtract_mean(true)
            .with_legacy_norm_bug(true);

        assert_eq!(config.sigma_sq, 0.5);
        assert_eq!(config.sigma_u_sq, 100.0);
        assert_eq!(config.sigma_v_sq, 50.0);
        assert!(config.subtract_mean);
        assert!(config.use_legacy_norm_bug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_model_config() {
        let bad = [
            ModelConfig::new().with_sigma_sq(0.0),
            ModelConfig::new().with_prior_variance(-1.0, 1.0),
            ModelConfig::new().with_learning_rate(f64::NAN),
            ModelConfig::new().with_min_learning_rate(1.0),
            ModelConfig::new().with_stop_threshold(-1.0),
        ];
        for config in bad {
            assert!(
                matches!(config.validate(), Err(BpmfError::InvalidConfiguration { .. })),
                "{:?} should be rejected",
                config
            );
        }
    }

    #[test]
    fn test_invalid_prior() {
        let prior = NormalWishartPrior::default_for(3);
        assert!(matches!(
            prior.validate(2),
            Err(BpmfError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            prior.clone().with_dof(2).validate(3),
            Err(BpmfError::InvalidConfiguration { .. })
        ));
        assert!(matches!(
            prior
                .clone()
                .with_scale(DMatrix::from_diagonal_element(3, 3, -1.0))
                .validate(3),
            Err(BpmfError::NotPositiveDefinite { .. })
        ));
    }

    #[test]
    fn test_invalid_bayes_config() {
        assert!(BayesConfig::new().with_sweeps_per_sample(0).validate().is_err());
        assert!(BayesConfig::new()
            .with_observation_precision(-2.0)
            .validate()
            .is_err());
        assert!(BayesConfig::new()
            .with_observation_precision(2.0)
            .with_sweeps_per_sample(2)
            .validate()
            .is_ok());
    }
}

//! Core types and numerical building blocks for Bayesian matrix factorization.
//!
//! This crate provides the pieces shared by the MAP and Bayesian models in
//! `bpmf-model`: the error taxonomy, type aliases, the linear algebra needed by
//! the Gibbs sampler and streaming statistics over posterior samples.
//!
//! # Modules
//!
//! - [`error`]: Error type and result alias
//! - [`linalg`]: Cholesky helpers, multivariate normal and Wishart draws
//! - [`stats`]: Streaming mean and running moments
//! - [`types`]: Type aliases, [`Axis`](types::Axis) and numerical constants

pub mod error;
pub mod linalg;
pub mod stats;
pub mod types;

// Re-export commonly used items at the crate root
pub use error::{BpmfError, Result};

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use bpmf_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{BpmfError, Result};
    pub use crate::linalg::{
        sample_multivariate_normal, sample_wishart, spd_inverse, symmetrize,
    };
    pub use crate::stats::{mean_of, streaming_mean, RunningMoments, StreamingMean};
    pub use crate::types::{constants, Axis, Cell, DMatrix, DVector};
}

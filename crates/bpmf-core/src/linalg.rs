//! Dense linear algebra and random draws for the Gibbs sampler.
//!
//! # Wishart sampling
//!
//! A draw `W ~ W(V, ν)` with `V` symmetric positive definite (d × d) and
//! integer degrees of freedom `ν ≥ d` is produced with the Bartlett
//! decomposition:
//!
//! ```text
//! V = L Lᵀ                              (Cholesky)
//! A lower triangular, A_ii = sqrt(χ²(ν - i)),  A_ij ~ N(0, 1) for i > j
//! W = L A Aᵀ Lᵀ
//! ```
//!
//! so that `E[W] = ν V`.
//!
//! # Multivariate normal sampling
//!
//! `x ~ N(μ, Σ)` is drawn as `x = μ + L z` with `Σ = L Lᵀ` and
//! `z ~ N(0, I)`.
//!
//! All routines take the random source explicitly so that every draw is
//! reproducible from a seeded generator.

use crate::{
    error::{BpmfError, Result},
    types::{constants, DMatrix, DVector},
};
use nalgebra::{Cholesky, Dyn};
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};

/// Returns the lower Cholesky factor `L` of `m` (`m = L Lᵀ`).
///
/// `context` names the matrix in the error raised when the factorization
/// fails.
pub fn cholesky_lower(m: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    factorize(m, context).map(|chol| chol.l())
}

/// Inverts a symmetric positive definite matrix through its Cholesky factor.
pub fn spd_inverse(m: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    factorize(m, context).map(|chol| chol.inverse())
}

fn factorize(m: &DMatrix<f64>, context: &str) -> Result<Cholesky<f64, Dyn>> {
    check_square(m)?;
    if !m.iter().all(|x| x.is_finite()) {
        return Err(BpmfError::not_positive_definite(format!("{} (non-finite entries)", context)));
    }
    Cholesky::new(m.clone()).ok_or_else(|| BpmfError::not_positive_definite(context))
}

/// Returns `(m + mᵀ) / 2`.
///
/// Round-off in products such as `L A Aᵀ Lᵀ` leaves matrices that are only
/// symmetric up to a few ulps; the Cholesky routines read one triangle, so
/// results are symmetrized before being handed back to callers.
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

/// Checks that `m` is symmetric within [`constants::SYMMETRY_TOLERANCE`]
/// (relative to its largest entry).
pub fn is_symmetric(m: &DMatrix<f64>) -> bool {
    if !m.is_square() {
        return false;
    }
    let scale = m.amax().max(1.0);
    (m - m.transpose()).amax() <= constants::SYMMETRY_TOLERANCE * scale
}

/// Draws a vector of `dim` independent standard normal variates.
pub fn sample_standard_normal_vector<R: Rng + ?Sized>(dim: usize, rng: &mut R) -> DVector<f64> {
    DVector::from_fn(dim, |_, _| rng.sample(StandardNormal))
}

/// Draws `x ~ N(mean, cov)`.
///
/// # Errors
///
/// * [`BpmfError::ShapeMismatch`] if `cov` is not `len(mean) × len(mean)`
/// * [`BpmfError::NotPositiveDefinite`] if `cov` has no Cholesky factor
pub fn sample_multivariate_normal<R: Rng + ?Sized>(
    mean: &DVector<f64>,
    cov: &DMatrix<f64>,
    rng: &mut R,
) -> Result<DVector<f64>> {
    if cov.shape() != (mean.len(), mean.len()) {
        return Err(BpmfError::shape_mismatch(
            constants::shape(mean.len(), mean.len()),
            constants::shape(cov.nrows(), cov.ncols()),
        ));
    }
    let l = cholesky_lower(cov, "multivariate normal covariance")?;
    let z = sample_standard_normal_vector(mean.len(), rng);
    Ok(mean + l * z)
}

/// Draws a d × d positive definite matrix from the Wishart distribution
/// with scale matrix `scale` and `dof` degrees of freedom.
///
/// # Errors
///
/// * [`BpmfError::ShapeMismatch`] if `scale` is not square
/// * [`BpmfError::InvalidParameter`] if `dof < d` or `d == 0`
/// * [`BpmfError::NotPositiveDefinite`] if `scale` has no Cholesky factor
pub fn sample_wishart<R: Rng + ?Sized>(
    scale: &DMatrix<f64>,
    dof: usize,
    rng: &mut R,
) -> Result<DMatrix<f64>> {
    check_square(scale)?;
    let n = scale.nrows();
    if n == 0 {
        return Err(BpmfError::invalid_parameter(
            "Wishart scale matrix must be at least 1x1",
        ));
    }
    if dof < n {
        return Err(BpmfError::invalid_parameter(format!(
            "Wishart degrees of freedom ({}) must be at least the dimension ({})",
            dof, n
        )));
    }

    let chol = cholesky_lower(scale, "Wishart scale matrix")?;

    let mut bartlett = DMatrix::<f64>::zeros(n, n);
    for i in 0..n {
        // dof - i >= 1 because dof >= n > i
        let chi_sq = ChiSquared::new((dof - i) as f64).map_err(|e| {
            BpmfError::invalid_parameter(format!("chi-squared degrees of freedom: {}", e))
        })?;
        bartlett[(i, i)] = chi_sq.sample(rng).sqrt();
        for j in 0..i {
            bartlett[(i, j)] = rng.sample(StandardNormal);
        }
    }

    let x = chol * bartlett;
    Ok(symmetrize(&(&x * x.transpose())))
}

fn check_square(m: &DMatrix<f64>) -> Result<()> {
    if m.is_square() {
        Ok(())
    } else {
        Err(BpmfError::shape_mismatch(
            "square matrix",
            constants::shape(m.nrows(), m.ncols()),
        ))
    }
}

//! Type aliases and numerical constants for latent factor models.
//!
//! All models work in `f64`. The aliases below keep signatures short and
//! give the dense factor matrices and latent vectors a single spelling across
//! the workspace.

use nalgebra::{Dyn, OMatrix, OVector};

/// Dense dynamically-sized matrix (factor matrices, precisions, predictions).
pub type DMatrix<T> = OMatrix<T, Dyn, Dyn>;

/// Dense dynamically-sized vector (latent vectors, hyperparameter means).
pub type DVector<T> = OVector<T, Dyn>;

/// A `(row, col)` position in the rating grid.
pub type Cell = (usize, usize);

/// Axis of the rating grid.
///
/// Rows and columns each carry their own factor matrix and, for the
/// Bayesian model, their own hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// The row axis (users in a recommender setting).
    Rows,
    /// The column axis (items in a recommender setting).
    Cols,
}

impl Axis {
    /// The opposite axis.
    pub fn other(self) -> Self {
        match self {
            Axis::Rows => Axis::Cols,
            Axis::Cols => Axis::Rows,
        }
    }

    /// Lower-case name used in log and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Axis::Rows => "rows",
            Axis::Cols => "cols",
        }
    }
}

/// Numerical constants shared by the fitting and sampling code.
pub mod constants {
    /// Factor applied to the learning rate after an accepted step.
    pub const LEARNING_RATE_GROWTH: f64 = 1.25;

    /// Factor applied to the learning rate after a rejected step.
    pub const LEARNING_RATE_BACKOFF: f64 = 0.5;

    /// Tolerance used when checking matrix symmetry.
    pub const SYMMETRY_TOLERANCE: f64 = 1e-9;

    /// Formats a matrix shape as `RxC` for error messages.
    pub fn shape(rows: usize, cols: usize) -> String {
        format!("{}x{}", rows, cols)
    }
}

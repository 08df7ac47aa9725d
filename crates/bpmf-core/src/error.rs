//! Error types for matrix factorization and posterior sampling.
//!
//! Every fallible operation in the workspace returns [`Result`], whose error
//! side is the single [`BpmfError`] enum defined here. Errors are raised at
//! the call that detects them and are never retried internally.

use thiserror::Error;

/// Errors that can occur while building, fitting or sampling a model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BpmfError {
    /// Malformed rating tuple or rating array.
    ///
    /// Raised when an input row does not have exactly the three
    /// `(row, col, value)` fields, carries a negative or fractional index,
    /// a non-finite value, or points outside the model's grid.
    #[error("Invalid rating shape: {reason}")]
    InvalidShape {
        /// Description of what is wrong with the input
        reason: String,
    },

    /// A cell that already has an observed rating was rated again.
    #[error("Cell ({row}, {col}) is already rated")]
    DuplicateRating {
        /// Row index of the offending cell
        row: usize,
        /// Column index of the offending cell
        col: usize,
    },

    /// A matrix that must be symmetric positive definite is not.
    ///
    /// Raised when a Cholesky factorization fails, e.g. for a Wishart scale
    /// matrix or a posterior covariance.
    #[error("Matrix is not positive definite: {context}")]
    NotPositiveDefinite {
        /// Which computation produced the matrix
        context: String,
    },

    /// Two matrices (or a matrix and a cell selection) have incompatible shapes.
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape
        expected: String,
        /// Actual shape
        actual: String,
    },

    /// Invalid model or sampler configuration.
    #[error("Invalid configuration for `{parameter}` = {value}: {reason}")]
    InvalidConfiguration {
        /// Name of the invalid parameter
        parameter: String,
        /// Value that was rejected
        value: String,
        /// Description of the constraint
        reason: String,
    },

    /// Invalid argument passed to a numerical routine.
    #[error("Invalid parameter: {reason}")]
    InvalidParameter {
        /// Description of the invalid argument
        reason: String,
    },

    /// An aggregation was asked to summarize an empty sample sequence.
    #[error("No posterior samples were provided")]
    NoSamples,

    /// A serialized model state is internally inconsistent.
    #[error("Invalid model state: {reason}")]
    InvalidState {
        /// Description of the inconsistency
        reason: String,
    },
}

impl BpmfError {
    /// Create an InvalidShape error with a custom reason.
    pub fn invalid_shape<S: Into<String>>(reason: S) -> Self {
        Self::InvalidShape {
            reason: reason.into(),
        }
    }

    /// Create a DuplicateRating error for the given cell.
    pub fn duplicate_rating(row: usize, col: usize) -> Self {
        Self::DuplicateRating { row, col }
    }

    /// Create a NotPositiveDefinite error.
    pub fn not_positive_definite<S: Into<String>>(context: S) -> Self {
        Self::NotPositiveDefinite {
            context: context.into(),
        }
    }

    /// Create a ShapeMismatch error.
    pub fn shape_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: std::fmt::Display,
        S2: std::fmt::Display,
    {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration<S1, S2, S3>(parameter: S1, value: S2, reason: S3) -> Self
    where
        S1: Into<String>,
        S2: std::fmt::Display,
        S3: Into<String>,
    {
        Self::InvalidConfiguration {
            parameter: parameter.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter<S: Into<String>>(reason: S) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    /// Create an InvalidState error.
    pub fn invalid_state<S: Into<String>>(reason: S) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }
}

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BpmfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = BpmfError::invalid_shape("expected 3 columns, got 2");
        assert!(matches!(err, BpmfError::InvalidShape { .. }));
        assert_eq!(
            err.to_string(),
            "Invalid rating shape: expected 3 columns, got 2"
        );

        let err = BpmfError::shape_mismatch("2x2", "3x2");
        assert!(matches!(err, BpmfError::ShapeMismatch { .. }));
        assert_eq!(err.to_string(), "Shape mismatch: expected 2x2, got 3x2");

        let err = BpmfError::duplicate_rating(1, 4);
        assert_eq!(err.to_string(), "Cell (1, 4) is already rated");
    }

    #[test]
    fn test_error_display() {
        let errors = vec![
            BpmfError::invalid_shape("negative index"),
            BpmfError::duplicate_rating(0, 0),
            BpmfError::not_positive_definite("wishart scale"),
            BpmfError::shape_mismatch("(3, 3)", "(4, 4)"),
            BpmfError::invalid_configuration("sigma_sq", -1.0, "must be positive"),
            BpmfError::invalid_parameter("dof below dimension"),
            BpmfError::NoSamples,
            BpmfError::invalid_state("factor shape"),
        ];

        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_configuration_error_context() {
        let err = BpmfError::invalid_configuration("learning_rate", 0.0, "must be positive");

        if let BpmfError::InvalidConfiguration {
            parameter,
            value,
            reason,
        } = err
        {
            assert_eq!(parameter, "learning_rate");
            assert_eq!(value, "0");
            assert_eq!(reason, "must be positive");
        } else {
            panic!("Expected InvalidConfiguration variant");
        }
    }
}

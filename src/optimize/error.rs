//! Error types for optimization operations.

use thiserror::Error;

/// Result type for optimization operations.
pub type OptimizeResult<T> = Result<T, OptimizeError>;

/// Raised by [`OptimizerState::evaluate`](crate::optimize::OptimizerState::evaluate)
/// once the function-evaluation budget is spent.
///
/// Algorithms propagate it with `?`. The minimize/maximize driver turns it into
/// [`OptimizationStatus::MaximumFunctionEvaluationsReached`](crate::optimize::OptimizationStatus)
/// so callers never see it as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("function evaluation budget exhausted")]
pub struct Cancelled;

/// Errors that can occur during optimization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    /// An input array does not have one entry per parameter.
    #[error("{context}: expected {expected} values, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },

    /// Invalid interval provided (inverted or degenerate bounds).
    #[error("Invalid interval [{a}, {b}] in {context}: bounds must satisfy a < b")]
    InvalidInterval { a: f64, b: f64, context: String },

    /// Invalid hyperparameter value.
    #[error("Invalid parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Invalid input (empty problem, starting point outside the box, ...).
    #[error("Invalid input in {context}")]
    InvalidInput { context: String },

    /// Numerical computation failed (e.g., roundoff in a line search).
    #[error("Numerical error: {message}")]
    NumericalError { message: String },

    /// The evaluation budget ran out mid-run.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl OptimizeError {
    pub(crate) fn invalid_parameter(parameter: &str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn numerical(message: impl Into<String>) -> Self {
        Self::NumericalError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = OptimizeError::InvalidInterval {
            a: 2.0,
            b: 1.0,
            context: "nelder_mead: parameter 0".to_string(),
        };
        assert!(err.to_string().contains("a < b"));

        let err = OptimizeError::invalid_parameter("gamma", "must lie in (0, 1)");
        assert_eq!(err.to_string(), "Invalid parameter 'gamma': must lie in (0, 1)");
    }

    #[test]
    fn test_cancelled_converts() {
        fn spend() -> OptimizeResult<f64> {
            let fitness: f64 = Err(Cancelled)?;
            Ok(fitness)
        }
        assert_eq!(spend(), Err(OptimizeError::Cancelled(Cancelled)));
    }
}

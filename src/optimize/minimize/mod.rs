//! Multivariate box-constrained local minimization.
//!
//! Every method here starts from caller-supplied initial values and keeps all
//! evaluated points inside `[lower, upper]` by clamping.
//!
//! - [`NelderMead`] - derivative-free simplex search
//! - [`Powell`] - derivative-free conjugate direction search with Brent line searches
//! - [`Bfgs`] - quasi-Newton with analytic or finite-difference gradients
//! - [`Adam`] - first-order adaptive moment estimation

mod adam;
mod bfgs;
mod local_method;
mod nelder_mead;
mod powell;

pub use adam::{Adam, AdamOptions};
pub use bfgs::{Bfgs, BfgsOptions};
pub use local_method::LocalMethod;
pub use nelder_mead::{NelderMead, NelderMeadOptions};
pub use powell::{Powell, PowellOptions};

use std::rc::Rc;

use crate::optimize::bounds::{Bounds, check_length};
use crate::optimize::error::OptimizeResult;
use crate::optimize::state::{Gradient, OptimizerState};
use crate::optimize::utils::bounded_gradient;

/// Validates a local problem and builds its state and bounds.
pub(crate) fn local_problem<F>(
    objective: F,
    number_of_parameters: usize,
    initial_values: &[f64],
    lower: &[f64],
    upper: &[f64],
    context: &str,
) -> OptimizeResult<(OptimizerState, Bounds)>
where
    F: Fn(&[f64]) -> f64 + 'static,
{
    let state = OptimizerState::new(Rc::new(objective), number_of_parameters, context)?;
    let bounds = Bounds::new(number_of_parameters, lower, upper, context)?;
    bounds.check_initial_values(initial_values, context)?;
    Ok((state, bounds))
}

/// Gradient in the internal minimization convention.
///
/// A caller-supplied gradient is scaled by the optimization sign and does not
/// count as an evaluation. Otherwise a bound-respecting central difference
/// is taken through the evaluation budget.
pub(crate) fn gradient_at(
    state: &mut OptimizerState,
    bounds: &Bounds,
    gradient: Option<&Gradient>,
    x: &[f64],
) -> OptimizeResult<Vec<f64>> {
    match gradient {
        Some(gradient) => {
            let sign = state.sign();
            let g = gradient(x);
            check_length(x.len(), g.len(), "gradient", "gradient values")?;
            Ok(g.into_iter().map(|gi| sign * gi).collect())
        }
        None => {
            let mut f = |p: &[f64]| -> OptimizeResult<f64> { Ok(state.evaluate(p)?) };
            bounded_gradient(&mut f, x, bounds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimize::error::OptimizeError;

    #[test]
    fn test_local_problem_validation() {
        let f = |x: &[f64]| x[0];
        assert!(matches!(
            local_problem(f, 2, &[0.0], &[0.0, 0.0], &[1.0, 1.0], "test"),
            Err(OptimizeError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            local_problem(f, 1, &[0.5], &[1.0], &[1.0], "test"),
            Err(OptimizeError::InvalidInterval { .. })
        ));
        assert!(local_problem(f, 1, &[0.5], &[0.0], &[1.0], "test").is_ok());
    }

    #[test]
    fn test_gradient_length_checked() {
        let (mut state, bounds) =
            local_problem(|x: &[f64]| x[0], 2, &[0.0, 0.0], &[-1.0; 2], &[1.0; 2], "test").unwrap();
        let gradient: Gradient = Rc::new(|_: &[f64]| vec![1.0]);
        assert!(matches!(
            gradient_at(&mut state, &bounds, Some(&gradient), &[0.0, 0.0]),
            Err(OptimizeError::DimensionMismatch { .. })
        ));
    }
}

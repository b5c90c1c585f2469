//! Constrained optimization.
//!
//! [`AugmentedLagrange`] turns any box-constrained optimizer into a solver
//! for problems with nonlinear equality and inequality [`Constraint`]s.

mod augmented_lagrange;
mod constraint;

pub use augmented_lagrange::{AugmentedLagrange, AugmentedLagrangeOptions};
pub use constraint::{Constraint, ConstraintType};

//! numerics - Numerical optimization for fitting statistical models
//!
//! numerics provides derivative-free and gradient-based local search and
//! population-based global search for arbitrary scalar objective functions,
//! the engine behind maximum-likelihood fitting of probability distributions
//! and MAP initialization of samplers.
//!
//! # Current Modules
//!
//! - [`optimize`] - Local, global and constrained optimizers sharing one
//!   [`Optimizable`] contract
//!
//! # Conventions
//!
//! - Every optimizer minimizes internally; `maximize()` negates the objective
//!   and reports results in the caller's sign convention.
//! - Candidate points are clamped into `[lower, upper]` before evaluation.
//! - Stochastic optimizers are seeded (`prng_seed`, default 12345), so
//!   repeated runs are bit-identical.
//! - Running out of the evaluation budget is a status, not an error.
//!
//! # Example
//!
//! ```ignore
//! use numerics::{NelderMead, Optimizable, OptimizationStatus};
//!
//! let booth = |x: &[f64]| (x[0] + 2.0 * x[1] - 7.0).powi(2) + (2.0 * x[0] + x[1] - 5.0).powi(2);
//! let mut solver = NelderMead::new(booth, 2, &[0.0, 0.0], &[-10.0, -10.0], &[10.0, 10.0])?;
//! let status = solver.minimize()?;
//!
//! assert_eq!(status, OptimizationStatus::Success);
//! let best = solver.best_parameter_set().unwrap(); // ≈ (1, 3)
//! ```

pub mod optimize;

// Re-export main types for convenience
pub use optimize::{
    OptimizationStatus, OptimizeError, OptimizeResult, Optimizable, OptimizerSettings,
    ParameterSet, scalar::*,
};
pub use optimize::{
    AugmentedLagrange, Bfgs, Constraint, ConstraintType, DifferentialEvolution, Mlsl, MultiStart,
    NelderMead, ParticleSwarm, Powell, ShuffledComplexEvolution, SimulatedAnnealing,
};

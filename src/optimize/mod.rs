//! Optimization algorithms for numerics.
//!
//! This module provides local and global minimization of scalar objective
//! functions `f: R^n -> R` inside a box, plus a constrained wrapper. Every
//! optimizer implements [`Optimizable`]: construct it with the objective,
//! the dimensionality and the bounds, tune [`OptimizerSettings`] through
//! `settings_mut()`, then call `minimize()` or `maximize()` and read
//! `best_parameter_set()`.
//!
//! # Modules
//!
//! - [`scalar`] - Univariate (1D) minimization: Brent, golden section, bracketing
//! - [`minimize`] - Multivariate local minimization: Nelder-Mead, Powell, BFGS, ADAM
//! - [`global`] - Global optimization: PSO, DE, SA, SCE-UA, MLSL, multi-start
//! - [`constrained`] - Augmented Lagrangian for nonlinear constraints
//!
//! # Quick Start
//!
//! ## Scalar Minimization
//!
//! ```ignore
//! use numerics::optimize::{BrentSearch, Optimizable};
//!
//! // Minimize f(x) = (x + 3)(x - 1)^2 on [-3, 3]
//! let mut brent = BrentSearch::new(|x| (x + 3.0) * (x - 1.0).powi(2), -3.0, 3.0)?;
//! brent.minimize()?;
//! assert!((brent.best_parameter_set().unwrap().values[0] - 1.0).abs() < 1e-3);
//! ```
//!
//! ## Multivariate Minimization
//!
//! ```ignore
//! use numerics::optimize::{Bfgs, Optimizable};
//!
//! // Minimize Rosenbrock function
//! let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0].powi(2)).powi(2);
//! let mut bfgs = Bfgs::new(f, 2, &[0.0, 0.0], &[-5.0, -5.0], &[5.0, 5.0])?;
//! bfgs.minimize()?;
//! // Minimum at (1, 1)
//! ```
//!
//! ## Global Optimization
//!
//! ```ignore
//! use numerics::optimize::{DifferentialEvolution, Optimizable};
//!
//! // Find global minimum of Rastrigin function (many local minima)
//! let mut de = DifferentialEvolution::new(rastrigin, 2, &[-5.12, -5.12], &[5.12, 5.12])?;
//! de.minimize()?;
//! ```
//!
//! ## Constrained Optimization
//!
//! ```ignore
//! use numerics::optimize::{AugmentedLagrange, Constraint, ConstraintType, NelderMead, Optimizable};
//!
//! // Minimize x^2 + y^2 subject to x + y >= 2
//! let inner = NelderMead::new(|x| x[0] * x[0] + x[1] * x[1], 2, &[3.0, 3.0], &[-5.0; 2], &[5.0; 2])?;
//! let sum = Constraint::new(|x| x[0] + x[1], 2, 2.0, ConstraintType::GreaterThanOrEqualTo);
//! let mut al = AugmentedLagrange::new(Box::new(inner), vec![sum])?;
//! al.minimize()?;
//! ```

pub mod bounds;
pub mod constrained;
pub mod error;
pub mod global;
pub mod minimize;
pub mod parameter_set;
pub mod sampling;
pub mod scalar;
pub mod state;
pub mod traits;
pub(crate) mod utils;

pub use bounds::{Bounds, repair_parameter};
pub use constrained::{AugmentedLagrange, AugmentedLagrangeOptions, Constraint, ConstraintType};
pub use error::{Cancelled, OptimizeError, OptimizeResult};
pub use global::{
    DifferentialEvolution, DifferentialEvolutionOptions, Mlsl, MlslOptions, MultiStart,
    MultiStartOptions, ParticleSwarm, ParticleSwarmOptions, ShuffledComplexEvolution,
    ShuffledComplexEvolutionOptions, SimulatedAnnealing, SimulatedAnnealingOptions,
};
pub use minimize::{
    Adam, AdamOptions, Bfgs, BfgsOptions, LocalMethod, NelderMead, NelderMeadOptions, Powell,
    PowellOptions,
};
pub use parameter_set::ParameterSet;
pub use scalar::{Bracket, BrentSearch, GoldenSection, bracket};
pub use state::{
    Gradient, Objective, OptimizationStatus, OptimizerSettings, OptimizerState,
    check_convergence,
};
pub use traits::Optimizable;

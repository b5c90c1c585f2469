//! Global optimization algorithms.
//!
//! This module provides methods for finding global minima of functions inside
//! a box, avoiding local minima traps that affect local optimization methods.
//! Every stochastic method owns a generator seeded from its `prng_seed`
//! option and re-seeds it at the start of each run, so repeated runs are
//! bit-identical.
//!
//! - [`ParticleSwarm`] - particle swarm with decaying inertia
//! - [`DifferentialEvolution`] - rand/1/bin with dithered mutation
//! - [`SimulatedAnnealing`] - Corana adaptive-step annealing
//! - [`ShuffledComplexEvolution`] - SCE-UA
//! - [`Mlsl`] - multi-level single linkage clustering of local searches
//! - [`MultiStart`] - repeated local searches from random starts

mod differential_evolution;
mod mlsl;
mod multi_start;
mod particle_swarm;
mod shuffled_complex;
mod simulated_annealing;

pub use differential_evolution::{DifferentialEvolution, DifferentialEvolutionOptions};
pub use mlsl::{Mlsl, MlslOptions};
pub use multi_start::{MultiStart, MultiStartOptions};
pub use particle_swarm::{ParticleSwarm, ParticleSwarmOptions};
pub use shuffled_complex::{ShuffledComplexEvolution, ShuffledComplexEvolutionOptions};
pub use simulated_annealing::{SimulatedAnnealing, SimulatedAnnealingOptions};

use std::rc::Rc;

use crate::optimize::bounds::Bounds;
use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::parameter_set::ParameterSet;
use crate::optimize::state::OptimizerState;
use crate::optimize::utils::mean_std;

/// Validates a box-constrained problem and builds its state and bounds.
pub(crate) fn global_problem<F>(
    objective: F,
    number_of_parameters: usize,
    lower: &[f64],
    upper: &[f64],
    context: &str,
) -> OptimizeResult<(OptimizerState, Bounds)>
where
    F: Fn(&[f64]) -> f64 + 'static,
{
    let state = OptimizerState::new(Rc::new(objective), number_of_parameters, context)?;
    let bounds = Bounds::new(number_of_parameters, lower, upper, context)?;
    Ok((state, bounds))
}

/// Evaluates every point, in order.
pub(crate) fn evaluate_all(
    state: &mut OptimizerState,
    points: Vec<Vec<f64>>,
) -> OptimizeResult<Vec<ParameterSet>> {
    let mut population = Vec::with_capacity(points.len());
    for point in points {
        let fitness = state.evaluate(&point)?;
        population.push(ParameterSet {
            values: point,
            fitness,
            weight: 1.0,
        });
    }
    Ok(population)
}

/// Whether the spread of `fitness` has collapsed:
/// `std <= absolute + relative * |mean|`.
pub(crate) fn spread_converged(state: &OptimizerState, fitness: &[f64]) -> bool {
    let (mean, std) = mean_std(fitness);
    let settings = state.settings();
    std <= settings.absolute_tolerance + settings.relative_tolerance * mean.abs()
}

/// Rejects population sizes below `minimum`.
pub(crate) fn check_size(parameter: &str, value: usize, minimum: usize) -> OptimizeResult<()> {
    if value < minimum {
        return Err(OptimizeError::invalid_parameter(
            parameter,
            format!("must be at least {minimum}, got {value}"),
        ));
    }
    Ok(())
}

/// Rejects probabilities outside `[0, 1]`.
pub(crate) fn check_probability(parameter: &str, value: f64) -> OptimizeResult<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(OptimizeError::invalid_parameter(
            parameter,
            format!("must lie in [0, 1], got {value}"),
        ));
    }
    Ok(())
}

//! Nelder-Mead simplex algorithm for derivative-free minimization.

#![allow(clippy::needless_range_loop)]

use serde::{Deserialize, Serialize};

use super::local_problem;
use crate::optimize::bounds::Bounds;
use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::parameter_set::{ParameterSet, sort_by_fitness};
use crate::optimize::state::{OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;
use crate::optimize::utils::ZERO_THRESHOLD;

/// Simplex coefficients for [`NelderMead`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NelderMeadOptions {
    /// Reflection coefficient (alpha)
    pub reflection: f64,
    /// Expansion coefficient (gamma)
    pub expansion: f64,
    /// Contraction coefficient (beta)
    pub contraction: f64,
    /// Shrink coefficient toward the best vertex
    pub shrink: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            shrink: 0.5,
        }
    }
}

impl NelderMeadOptions {
    /// Checks the coefficient ranges.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending coefficient.
    pub fn validate(&self) -> OptimizeResult<()> {
        if !(self.reflection > 0.0) {
            return Err(OptimizeError::invalid_parameter(
                "reflection",
                "must be positive",
            ));
        }
        if !(self.expansion > 1.0 && self.expansion > self.reflection) {
            return Err(OptimizeError::invalid_parameter(
                "expansion",
                "must exceed 1 and the reflection coefficient",
            ));
        }
        if !(self.contraction > 0.0 && self.contraction < 1.0) {
            return Err(OptimizeError::invalid_parameter(
                "contraction",
                "must lie in (0, 1)",
            ));
        }
        if !(self.shrink > 0.0 && self.shrink < 1.0) {
            return Err(OptimizeError::invalid_parameter(
                "shrink",
                "must lie in (0, 1)",
            ));
        }
        Ok(())
    }
}

/// Nelder-Mead simplex algorithm for derivative-free minimization.
///
/// Every trial vertex is clamped into the bounds before it is evaluated.
/// Converges when the best and worst vertex fitness agree within tolerance.
///
/// # Note
/// Nelder-Mead is robust and doesn't require derivatives, but convergence
/// can be slow for high-dimensional problems (n > 10).
pub struct NelderMead {
    state: OptimizerState,
    bounds: Bounds,
    initial_values: Vec<f64>,
    options: NelderMeadOptions,
}

impl NelderMead {
    /// Creates a Nelder-Mead search starting from `initial_values`.
    ///
    /// # Errors
    /// * `DimensionMismatch` if a slice does not have `number_of_parameters` entries
    /// * `InvalidInterval` if any `upper[i] <= lower[i]`
    /// * `InvalidInput` if the start lies outside the bounds
    pub fn new<F>(
        objective: F,
        number_of_parameters: usize,
        initial_values: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> OptimizeResult<Self>
    where
        F: Fn(&[f64]) -> f64 + 'static,
    {
        let (state, bounds) = local_problem(
            objective,
            number_of_parameters,
            initial_values,
            lower,
            upper,
            "NelderMead",
        )?;
        Ok(Self::from_state(state, bounds, initial_values.to_vec()))
    }

    pub(crate) fn from_state(
        state: OptimizerState,
        bounds: Bounds,
        initial_values: Vec<f64>,
    ) -> Self {
        Self {
            state,
            bounds,
            initial_values,
            options: NelderMeadOptions::default(),
        }
    }

    /// Replaces the simplex coefficients.
    #[must_use]
    pub fn with_options(mut self, options: NelderMeadOptions) -> Self {
        self.options = options;
        self
    }

    /// Starting point.
    #[must_use]
    pub fn initial_values(&self) -> &[f64] {
        &self.initial_values
    }

    /// Initial simplex: the start plus one vertex per axis.
    ///
    /// A vertex that would leave the box steps the other way.
    fn initial_simplex(&self) -> Vec<Vec<f64>> {
        let x0 = &self.initial_values;
        let n = x0.len();
        let mut simplex = Vec::with_capacity(n + 1);
        simplex.push(x0.clone());

        for i in 0..n {
            let mut vertex = x0.clone();
            let delta = if x0[i].abs() < ZERO_THRESHOLD {
                0.00025
            } else {
                0.05 * x0[i].abs()
            };
            vertex[i] = if x0[i] + delta <= self.bounds.upper()[i] {
                x0[i] + delta
            } else {
                self.bounds.repair_at(i, x0[i] - delta)
            };
            simplex.push(vertex);
        }
        simplex
    }
}

impl Optimizable for NelderMead {
    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn warm_start(&mut self, values: &[f64]) {
        let mut start = values.to_vec();
        self.bounds.repair(&mut start);
        self.initial_values = start;
    }

    fn optimize(&mut self) -> OptimizeResult<OptimizationStatus> {
        self.options.validate()?;
        let NelderMeadOptions {
            reflection: alpha,
            expansion: gamma,
            contraction: rho,
            shrink: sigma,
        } = self.options;
        let n = self.initial_values.len();

        let mut simplex = Vec::with_capacity(n + 1);
        for vertex in self.initial_simplex() {
            let fitness = self.state.evaluate(&vertex)?;
            simplex.push(ParameterSet::new(&vertex, fitness));
        }

        let bounds = &self.bounds;
        let state = &mut self.state;
        // Point along the line from the centroid through `from`, clamped to the box
        let along = |centroid: &[f64], from: &[f64], coefficient: f64| -> Vec<f64> {
            let mut x: Vec<f64> = centroid
                .iter()
                .zip(from.iter())
                .map(|(c, p)| c + coefficient * (p - c))
                .collect();
            bounds.repair(&mut x);
            x
        };

        while state.next_iteration() {
            sort_by_fitness(&mut simplex);

            if state.check_convergence(simplex[0].fitness, simplex[n].fitness) {
                tracing::debug!(
                    iterations = state.iterations(),
                    fitness = simplex[0].fitness,
                    "nelder-mead simplex collapsed"
                );
                return Ok(OptimizationStatus::Success);
            }

            // Compute centroid of all vertices except worst
            let mut centroid = vec![0.0; n];
            for vertex in &simplex[..n] {
                for j in 0..n {
                    centroid[j] += vertex.values[j];
                }
            }
            for j in 0..n {
                centroid[j] /= n as f64;
            }
            if centroid.iter().any(|c| !c.is_finite()) {
                return Err(OptimizeError::numerical(
                    "nelder-mead: degenerate simplex centroid",
                ));
            }

            // Reflection
            let x_r = along(&centroid, &simplex[n].values, -alpha);
            let f_r = state.evaluate(&x_r)?;

            if f_r < simplex[0].fitness {
                // Try expansion
                let x_e = along(&centroid, &x_r, gamma);
                let f_e = state.evaluate(&x_e)?;
                simplex[n] = if f_e < f_r {
                    ParameterSet::new(&x_e, f_e)
                } else {
                    ParameterSet::new(&x_r, f_r)
                };
            } else if f_r < simplex[n - 1].fitness {
                // Accept reflection
                simplex[n] = ParameterSet::new(&x_r, f_r);
            } else {
                // Outside contraction if the reflection beat the worst vertex
                let x_c = if f_r < simplex[n].fitness {
                    along(&centroid, &x_r, rho)
                } else {
                    along(&centroid, &simplex[n].values, rho)
                };
                let f_c = state.evaluate(&x_c)?;

                if f_c < simplex[n].fitness.min(f_r) {
                    simplex[n] = ParameterSet::new(&x_c, f_c);
                } else {
                    // Shrink toward the best vertex
                    let best = simplex[0].values.clone();
                    for vertex in simplex.iter_mut().skip(1) {
                        let x = along(&best, &vertex.values, sigma);
                        let fitness = state.evaluate(&x)?;
                        *vertex = ParameterSet::new(&x, fitness);
                    }
                }
            }
        }

        Ok(OptimizationStatus::MaximumIterationsReached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|xi| xi * xi).sum()
    }

    fn quadratic_2d(x: &[f64]) -> f64 {
        (x[0] - 1.0).powi(2) + (x[1] - 2.0).powi(2)
    }

    fn rosenbrock(x: &[f64]) -> f64 {
        let a = 1.0;
        let b = 100.0;
        (a - x[0]).powi(2) + b * (x[1] - x[0].powi(2)).powi(2)
    }

    #[test]
    fn test_nelder_mead_sphere() {
        let mut nm = NelderMead::new(sphere, 3, &[1.0, 1.0, 1.0], &[-5.0; 3], &[5.0; 3]).unwrap();
        nm.settings_mut().absolute_tolerance = 1e-12;
        let status = nm.minimize().expect("nelder_mead failed");

        assert_eq!(status, OptimizationStatus::Success);
        let best = nm.best_parameter_set().unwrap();
        assert!(best.fitness < 1e-8);
        for xi in &best.values {
            assert!(xi.abs() < 1e-4);
        }
    }

    #[test]
    fn test_nelder_mead_quadratic() {
        let mut nm =
            NelderMead::new(quadratic_2d, 2, &[0.0, 0.0], &[-10.0, -10.0], &[10.0, 10.0]).unwrap();
        nm.settings_mut().absolute_tolerance = 1e-12;
        nm.minimize().expect("nelder_mead failed");

        let best = nm.best_parameter_set().unwrap();
        assert!((best.values[0] - 1.0).abs() < 1e-4);
        assert!((best.values[1] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_nelder_mead_rosenbrock() {
        let mut nm =
            NelderMead::new(rosenbrock, 2, &[0.0, 0.0], &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        nm.settings_mut().max_iterations = 2000;
        nm.settings_mut().absolute_tolerance = 1e-14;
        nm.minimize().expect("nelder_mead failed");

        // Rosenbrock is challenging, just check it gets close
        let best = nm.best_parameter_set().unwrap();
        assert!((best.values[0] - 1.0).abs() < 0.1);
        assert!((best.values[1] - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_nelder_mead_minimum_on_bound() {
        // Unconstrained minimum at (-3, 0) lies outside the box.
        let f = |x: &[f64]| (x[0] + 3.0).powi(2) + x[1] * x[1];
        let mut nm = NelderMead::new(f, 2, &[1.0, 1.0], &[-1.0, -1.0], &[2.0, 2.0]).unwrap();
        nm.settings_mut().absolute_tolerance = 1e-12;
        nm.minimize().expect("nelder_mead failed");

        let best = nm.best_parameter_set().unwrap();
        assert!((best.values[0] + 1.0).abs() < 1e-4);
        assert!(best.values[1].abs() < 1e-2);
    }

    #[test]
    fn test_nelder_mead_rejects_bad_options() {
        let mut nm = NelderMead::new(sphere, 1, &[1.0], &[-1.0], &[2.0])
            .unwrap()
            .with_options(NelderMeadOptions {
                contraction: 1.5,
                ..Default::default()
            });
        assert!(matches!(
            nm.minimize(),
            Err(OptimizeError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_nelder_mead_start_outside_bounds() {
        let result = NelderMead::new(sphere, 2, &[3.0, 0.0], &[-1.0, -1.0], &[1.0, 1.0]);
        assert!(matches!(result, Err(OptimizeError::InvalidInput { .. })));
    }
}

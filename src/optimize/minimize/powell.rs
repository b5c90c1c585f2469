//! Powell's direction set method for derivative-free minimization.

#![allow(clippy::needless_range_loop)]

use serde::{Deserialize, Serialize};

use super::local_problem;
use crate::optimize::bounds::Bounds;
use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::scalar::{GOLDEN_RATIO, brent_minimize, bracket_from};
use crate::optimize::state::{OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;
use crate::optimize::utils::{ZERO_THRESHOLD, identity, norm, vec_sub};

/// Iteration cap of each Brent line minimization.
const LINE_SEARCH_MAX_ITER: usize = 100;

/// Line-search settings for [`Powell`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowellOptions {
    /// First step of the bracketing walk along each direction
    pub bracket_step: f64,
    /// Growth factor of the bracketing walk
    pub bracket_expansion: f64,
}

impl Default for PowellOptions {
    fn default() -> Self {
        Self {
            bracket_step: 0.1,
            bracket_expansion: GOLDEN_RATIO,
        }
    }
}

impl PowellOptions {
    /// Checks the line-search settings.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending setting.
    pub fn validate(&self) -> OptimizeResult<()> {
        if !(self.bracket_step > 0.0 && self.bracket_step.is_finite()) {
            return Err(OptimizeError::invalid_parameter(
                "bracket_step",
                "must be positive and finite",
            ));
        }
        if !(self.bracket_expansion > 1.0 && self.bracket_expansion.is_finite()) {
            return Err(OptimizeError::invalid_parameter(
                "bracket_expansion",
                "must exceed 1",
            ));
        }
        Ok(())
    }
}

/// Powell's direction set method for derivative-free minimization.
///
/// # Note
/// Powell's method performs successive Brent line searches along a set of
/// directions, starting from the coordinate axes. After each sweep the net
/// displacement may replace the direction of largest decrease, but only when
/// an extrapolation test shows the swap will not make the set degenerate.
/// It doesn't require derivatives but can be faster than Nelder-Mead.
pub struct Powell {
    state: OptimizerState,
    bounds: Bounds,
    initial_values: Vec<f64>,
    options: PowellOptions,
}

impl Powell {
    /// Creates a Powell search starting from `initial_values`.
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
            "Powell",
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
            options: PowellOptions::default(),
        }
    }

    /// Replaces the line-search settings.
    #[must_use]
    pub fn with_options(mut self, options: PowellOptions) -> Self {
        self.options = options;
        self
    }

    /// Starting point.
    #[must_use]
    pub fn initial_values(&self) -> &[f64] {
        &self.initial_values
    }
}

/// Minimizes along `direction` from `p` (where the value is `fp`).
///
/// The walk along the line is clamped to the box, so directions pointing out
/// of the box flatten into a constant and the bracket closes at the bound.
fn line_minimize(
    state: &mut OptimizerState,
    bounds: &Bounds,
    options: &PowellOptions,
    p: &[f64],
    fp: f64,
    direction: &[f64],
) -> OptimizeResult<(Vec<f64>, f64)> {
    let point_at = |t: f64| -> Vec<f64> {
        let mut x: Vec<f64> = p
            .iter()
            .zip(direction.iter())
            .map(|(pi, di)| pi + t * di)
            .collect();
        bounds.repair(&mut x);
        x
    };
    let relative = state.settings().relative_tolerance.sqrt();
    let absolute = state.settings().absolute_tolerance;

    let mut g = |t: f64| -> OptimizeResult<f64> { Ok(state.evaluate(&point_at(t))?) };
    let bracket = bracket_from(
        &mut g,
        0.0,
        fp,
        options.bracket_step,
        options.bracket_expansion,
    )?;
    let (lo, hi) = bracket.interval();
    let line = brent_minimize(
        &mut g,
        lo,
        hi,
        bracket.b,
        bracket.fb,
        relative,
        absolute,
        LINE_SEARCH_MAX_ITER,
    )?;

    if line.fx < fp {
        Ok((point_at(line.x), line.fx))
    } else {
        Ok((p.to_vec(), fp))
    }
}

impl Optimizable for Powell {
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
        let n = self.initial_values.len();
        let bounds = &self.bounds;
        let options = &self.options;
        let state = &mut self.state;

        let mut p = self.initial_values.clone();
        let mut fret = state.evaluate(&p)?;
        let mut pt = p.clone();

        // Initialize direction set to coordinate directions
        let mut directions = identity(n);

        while state.next_iteration() {
            let fp = fret;
            let mut biggest = 0;
            let mut max_decrease = 0.0;

            for i in 0..n {
                let f_before = fret;
                (p, fret) = line_minimize(state, bounds, options, &p, fret, &directions[i])?;
                if f_before - fret > max_decrease {
                    max_decrease = f_before - fret;
                    biggest = i;
                }
            }

            if state.check_convergence(fp, fret) {
                tracing::debug!(
                    iterations = state.iterations(),
                    fitness = fret,
                    "powell converged"
                );
                return Ok(OptimizationStatus::Success);
            }

            // Extrapolated point and net displacement of this sweep
            let mut extrapolated: Vec<f64> = p
                .iter()
                .zip(pt.iter())
                .map(|(pj, ptj)| 2.0 * pj - ptj)
                .collect();
            bounds.repair(&mut extrapolated);
            let mut displacement = vec_sub(&p, &pt);
            pt.clone_from(&p);

            let f_extrapolated = state.evaluate(&extrapolated)?;
            if f_extrapolated < fp {
                let t = 2.0 * (fp - 2.0 * fret + f_extrapolated) * (fp - fret - max_decrease).powi(2)
                    - max_decrease * (fp - f_extrapolated).powi(2);
                let length = norm(&displacement);
                if t < 0.0 && length > ZERO_THRESHOLD {
                    for d in &mut displacement {
                        *d /= length;
                    }
                    (p, fret) = line_minimize(state, bounds, options, &p, fret, &displacement)?;
                    directions[biggest] = directions[n - 1].clone();
                    directions[n - 1] = displacement;
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

    fn rosenbrock(x: &[f64]) -> f64 {
        let a = 1.0;
        let b = 100.0;
        (a - x[0]).powi(2) + b * (x[1] - x[0].powi(2)).powi(2)
    }

    #[test]
    fn test_powell_sphere() {
        let mut powell = Powell::new(sphere, 3, &[1.0, 1.0, 1.0], &[-5.0; 3], &[5.0; 3]).unwrap();
        let status = powell.minimize().expect("powell failed");

        assert_eq!(status, OptimizationStatus::Success);
        let best = powell.best_parameter_set().unwrap();
        assert!(best.fitness < 1e-8);
        for xi in &best.values {
            assert!(xi.abs() < 1e-4);
        }
    }

    #[test]
    fn test_powell_rotated_quadratic() {
        // Coupled variables need the direction update to converge quickly
        let f = |x: &[f64]| (x[0] + x[1] - 3.0).powi(2) + 4.0 * (x[0] - x[1] + 1.0).powi(2);
        let mut powell = Powell::new(f, 2, &[0.0, 0.0], &[-10.0, -10.0], &[10.0, 10.0]).unwrap();
        powell.minimize().expect("powell failed");

        let best = powell.best_parameter_set().unwrap();
        assert!((best.values[0] - 1.0).abs() < 1e-4);
        assert!((best.values[1] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_powell_rosenbrock() {
        let mut powell =
            Powell::new(rosenbrock, 2, &[-1.2, 1.0], &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        powell.settings_mut().relative_tolerance = 1e-12;
        powell.settings_mut().absolute_tolerance = 1e-14;
        powell.minimize().expect("powell failed");

        let best = powell.best_parameter_set().unwrap();
        assert!((best.values[0] - 1.0).abs() < 0.05);
        assert!((best.values[1] - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_powell_respects_bounds() {
        let f = |x: &[f64]| (x[0] - 5.0).powi(2) + (x[1] + 5.0).powi(2);
        let mut powell = Powell::new(f, 2, &[0.0, 0.0], &[-1.0, -1.0], &[1.0, 1.0]).unwrap();
        powell.settings_mut().record_traces = true;
        powell.minimize().expect("powell failed");

        let best = powell.best_parameter_set().unwrap();
        assert!((best.values[0] - 1.0).abs() < 1e-8);
        assert!((best.values[1] + 1.0).abs() < 1e-8);
        for set in powell.parameter_set_trace() {
            assert!(set.values.iter().all(|v| (-1.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_powell_warm_start() {
        let mut powell = Powell::new(sphere, 2, &[1.0, 1.0], &[-2.0; 2], &[2.0; 2]).unwrap();
        powell.warm_start(&[3.0, -0.5]);
        assert_eq!(powell.initial_values(), &[2.0, -0.5]);
    }
}

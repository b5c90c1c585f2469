//! Multi-Level Single Linkage global optimizer.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use statrs::function::gamma::gamma;

use super::check_size;
use crate::optimize::bounds::Bounds;
use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::minimize::{LocalMethod, local_problem};
use crate::optimize::parameter_set::{ParameterSet, sort_by_fitness};
use crate::optimize::sampling::{DEFAULT_PRNG_SEED, seeded_rng, uniform_point};
use crate::optimize::state::{OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;
use crate::optimize::utils::distance;

/// Minima closer than this fraction of the box diagonal are the same minimum.
const DISTINCT_MINIMUM_FRACTION: f64 = 1e-3;

/// Covered fraction of the search space at which the Bayesian rule may stop.
const COVERED_FRACTION: f64 = 0.995;

/// Options for [`Mlsl`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlslOptions {
    /// Uniform points added to the sample per iteration
    pub sample_size: usize,
    /// Fraction of the sample, best first, eligible as start points; in `(0, 1)`
    pub gamma: f64,
    /// Scale of the critical distance; must be positive
    pub sigma: f64,
    /// Non-improving iterations required before the Bayesian rule may stop
    pub min_no_improvement: usize,
    /// Non-improving iterations after which the search stops regardless
    pub max_no_improvement: usize,
    /// Refine the best minimum once more with the run's own tolerances
    pub polish: bool,
    /// Local method run from each start point
    pub local_method: LocalMethod,
    /// Relative and absolute tolerance of the local searches
    pub local_tolerance: f64,
    /// Seed of the random generator
    pub prng_seed: u64,
}

impl Default for MlslOptions {
    fn default() -> Self {
        Self {
            sample_size: 50,
            gamma: 0.1,
            sigma: 2.0,
            min_no_improvement: 3,
            max_no_improvement: 10,
            polish: true,
            local_method: LocalMethod::default(),
            local_tolerance: 1e-4,
            prng_seed: DEFAULT_PRNG_SEED,
        }
    }
}

impl MlslOptions {
    /// Checks the options.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending option.
    pub fn validate(&self) -> OptimizeResult<()> {
        check_size("sample_size", self.sample_size, 1)?;
        if !(self.gamma > 0.0 && self.gamma < 1.0) {
            return Err(OptimizeError::invalid_parameter(
                "gamma",
                format!("must lie in (0, 1), got {}", self.gamma),
            ));
        }
        if !(self.sigma > 0.0 && self.sigma.is_finite()) {
            return Err(OptimizeError::invalid_parameter(
                "sigma",
                format!("must be positive, got {}", self.sigma),
            ));
        }
        check_size("max_no_improvement", self.max_no_improvement, 1)?;
        if self.min_no_improvement > self.max_no_improvement {
            return Err(OptimizeError::invalid_parameter(
                "min_no_improvement",
                "must not exceed max_no_improvement",
            ));
        }
        if !(self.local_tolerance >= 0.0 && self.local_tolerance.is_finite()) {
            return Err(OptimizeError::invalid_parameter(
                "local_tolerance",
                "must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Critical distance of the single-linkage rule after `sample_count` draws:
///
/// `r_k = π^{-1/2} (Γ(1 + n/2) · volume · σ · ln N / N)^{1/n}`
///
/// Shrinks as the sample grows, so ever closer points may start searches.
#[must_use]
pub fn critical_distance(dimensions: usize, volume: f64, sigma: f64, sample_count: usize) -> f64 {
    let n = dimensions as f64;
    let count = sample_count as f64;
    let scaled = gamma(1.0 + n / 2.0) * volume * sigma * count.ln() / count;
    scaled.powf(1.0 / n) / PI.sqrt()
}

/// Bayesian estimates after finding `minima` distinct minima with
/// `searches` local searches: the expected total number of minima and the
/// expected covered fraction of the space (Boender & Rinnooy Kan).
///
/// Returns `None` while `searches <= minima + 2`.
fn bayesian_estimates(minima: usize, searches: usize) -> Option<(f64, f64)> {
    if searches <= minima + 2 {
        return None;
    }
    let w = minima as f64;
    let n = searches as f64;
    let expected_minima = w * (n - 1.0) / (n - w - 2.0);
    let covered = 1.0 - w * (w + 1.0) / (n * (n - 1.0));
    Some((expected_minima, covered))
}

/// Whether the Bayesian estimates say every minimum has been seen: fewer
/// than half a minimum expected beyond those found, and enough coverage.
fn all_minima_found(minima: usize, searches: usize) -> bool {
    bayesian_estimates(minima, searches).is_some_and(|(expected_minima, covered)| {
        expected_minima < minima as f64 + 0.5 && covered >= COVERED_FRACTION
    })
}

#[derive(Debug, Clone)]
struct SamplePoint {
    set: ParameterSet,
    started: bool,
}

/// Multi-Level Single Linkage (Rinnooy Kan & Timmer).
///
/// # Note
/// Each iteration draws `sample_size` uniform points and adds them to the
/// accumulated sample, which also holds the initial point. The best
/// `ceil(gamma · N)` points form the reduced sample. A reduced point starts
/// a local search unless it already did, or a better point of the reduced
/// sample or a better known minimum lies within the critical distance
/// [`critical_distance`]. This clustering keeps the number of local
/// searches close to the number of distinct minima.
///
/// The search stops with `Success` after `max_no_improvement` iterations
/// without improving the best minimum, or earlier once at least
/// `min_no_improvement` such iterations have passed and the Bayesian
/// estimates over the local searches run so far say every minimum has been
/// seen. With `polish` on, the best minimum is then refined with the run's
/// own tolerances.
pub struct Mlsl {
    state: OptimizerState,
    bounds: Bounds,
    initial_values: Vec<f64>,
    options: MlslOptions,
}

impl Mlsl {
    /// Creates an MLSL search over `[lower, upper]` seeded with `initial_values`.
    ///
    /// # Errors
    /// * `DimensionMismatch` if a slice does not have `number_of_parameters` entries
    /// * `InvalidInterval` if any `upper[i] <= lower[i]`
    /// * `InvalidInput` if `initial_values` lie outside the bounds
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
            "Mlsl",
        )?;
        Ok(Self {
            state,
            bounds,
            initial_values: initial_values.to_vec(),
            options: MlslOptions::default(),
        })
    }

    /// Replaces the MLSL options.
    #[must_use]
    pub fn with_options(mut self, options: MlslOptions) -> Self {
        self.options = options;
        self
    }
}

/// Records a local minimum unless a known one lies within `threshold`; a
/// better duplicate replaces the known one. Returns whether it was new.
fn record_minimum(minima: &mut Vec<ParameterSet>, found: ParameterSet, threshold: f64) -> bool {
    match minima
        .iter_mut()
        .find(|known| distance(&known.values, &found.values) <= threshold)
    {
        Some(known) => {
            if found.fitness < known.fitness {
                *known = found;
            }
            false
        }
        None => {
            minima.push(found);
            true
        }
    }
}

impl Optimizable for Mlsl {
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
        let options = &self.options;
        let bounds = &self.bounds;
        let state = &mut self.state;
        let n = bounds.len();
        let local_tolerance = options.local_tolerance;

        let diameter = (0..n)
            .map(|i| bounds.range(i) * bounds.range(i))
            .sum::<f64>()
            .sqrt();
        let threshold = DISTINCT_MINIMUM_FRACTION * diameter;

        let mut rng = seeded_rng(options.prng_seed);
        let initial_fitness = state.evaluate(&self.initial_values)?;
        let mut sample = vec![SamplePoint {
            set: ParameterSet::new(&self.initial_values, initial_fitness),
            started: false,
        }];
        let mut minima: Vec<ParameterSet> = Vec::new();
        let mut searches = 0usize;
        let mut best: Option<f64> = None;
        let mut no_improvement = 0;
        let mut status = OptimizationStatus::MaximumIterationsReached;

        while state.next_iteration() {
            for _ in 0..options.sample_size {
                let point = uniform_point(&mut rng, bounds);
                let fitness = state.evaluate(&point)?;
                sample.push(SamplePoint {
                    set: ParameterSet::new(&point, fitness),
                    started: false,
                });
            }
            sample.sort_by(|a, b| a.set.fitness.total_cmp(&b.set.fitness));

            let total = sample.len();
            let reduced = ((options.gamma * total as f64).ceil() as usize).clamp(1, total);
            let rk = critical_distance(n, bounds.volume(), options.sigma, total);
            let mut improved = false;

            for i in 0..reduced {
                if sample[i].started {
                    continue;
                }
                let candidate = &sample[i].set;
                let shadowed_by_sample = sample[..reduced].iter().enumerate().any(|(j, other)| {
                    j != i
                        && other.set.fitness < candidate.fitness
                        && distance(&other.set.values, &candidate.values) < rk
                });
                let shadowed_by_minimum = minima.iter().any(|minimum| {
                    minimum.fitness < candidate.fitness
                        && distance(&minimum.values, &candidate.values) < rk
                });
                if shadowed_by_sample || shadowed_by_minimum {
                    continue;
                }

                sample[i].started = true;
                let start = sample[i].set.values.clone();
                tracing::debug!(start = ?start, rk, "starting local search");
                let found = options.local_method.search(
                    state,
                    bounds,
                    &start,
                    local_tolerance,
                    local_tolerance,
                )?;
                searches += 1;

                let fitness = found.fitness;
                if record_minimum(&mut minima, found, threshold) {
                    tracing::debug!(fitness, minima = minima.len(), "new local minimum");
                }
                let improves = best.is_none_or(|b: f64| {
                    fitness < b && !state.check_convergence(b, fitness)
                });
                if improves {
                    improved = true;
                }
                if best.is_none_or(|b| fitness < b) {
                    best = Some(fitness);
                }
            }

            if improved {
                no_improvement = 0;
            } else {
                no_improvement += 1;
            }

            let bayesian_done = all_minima_found(minima.len(), searches);
            tracing::debug!(
                iteration = state.iterations(),
                sample = total,
                searches,
                minima = minima.len(),
                best = ?best,
                "MLSL iteration finished"
            );

            let stop_early = no_improvement >= options.min_no_improvement && bayesian_done;
            if !minima.is_empty() && (stop_early || no_improvement >= options.max_no_improvement)
            {
                status = OptimizationStatus::Success;
                break;
            }
        }

        if options.polish {
            sort_by_fitness(&mut minima);
            if let Some(best_minimum) = minima.first() {
                let relative = state.settings().relative_tolerance;
                let absolute = state.settings().absolute_tolerance;
                let start = best_minimum.values.clone();
                options
                    .local_method
                    .search(state, bounds, &start, relative, absolute)?;
            }
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|&xi| xi * xi).sum()
    }

    /// Double well with the deeper minimum near x = -1.
    fn tilted_double_well(x: &[f64]) -> f64 {
        (x[0] * x[0] - 1.0).powi(2) + 0.3 * x[0] + x[1] * x[1]
    }

    #[test]
    fn test_critical_distance() {
        // n = 2: Γ(2) = 1, so r = sqrt(volume · σ · ln N / N / π)
        let expected = (100.0 * 2.0 * 100f64.ln() / 100.0 / PI).sqrt();
        assert_relative_eq!(critical_distance(2, 100.0, 2.0, 100), expected, epsilon = 1e-12);
        assert!(critical_distance(2, 100.0, 2.0, 1000) < critical_distance(2, 100.0, 2.0, 100));
    }

    #[test]
    fn test_bayesian_estimates() {
        assert!(bayesian_estimates(3, 5).is_none());
        let (expected_minima, covered) = bayesian_estimates(1, 51).unwrap();
        assert_relative_eq!(expected_minima, 50.0 / 48.0, epsilon = 1e-12);
        assert_relative_eq!(covered, 1.0 - 2.0 / 2550.0, epsilon = 1e-12);
    }

    #[test]
    fn test_all_minima_found_needs_repeated_searches() {
        assert!(!all_minima_found(3, 3));
        assert!(!all_minima_found(5, 5));
        // one minimum seen by every search: coverage decides
        assert!(!all_minima_found(1, 10));
        assert!(all_minima_found(1, 21));
        assert!(!all_minima_found(3, 21));
    }

    #[test]
    fn test_record_minimum() {
        let mut minima = Vec::new();
        assert!(record_minimum(&mut minima, ParameterSet::new(&[0.0], 1.0), 0.01));
        assert!(!record_minimum(&mut minima, ParameterSet::new(&[0.005], 0.5), 0.01));
        assert!(record_minimum(&mut minima, ParameterSet::new(&[1.0], 2.0), 0.01));
        assert_eq!(minima.len(), 2);
        assert_eq!(minima[0].fitness, 0.5);
    }

    #[test]
    fn test_mlsl_sphere() {
        let mut mlsl = Mlsl::new(sphere, 2, &[3.0, 3.0], &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        let status = mlsl.minimize().expect("MLSL failed");

        assert_eq!(status, OptimizationStatus::Success);
        assert!(mlsl.best_parameter_set().unwrap().fitness < 1e-8);
    }

    #[test]
    fn test_mlsl_escapes_local_basin() {
        let mut mlsl =
            Mlsl::new(tilted_double_well, 2, &[1.0, 0.0], &[-2.0, -2.0], &[2.0, 2.0]).unwrap();
        mlsl.minimize().expect("MLSL failed");

        let best = mlsl.best_parameter_set().unwrap();
        assert!(best.values[0] < -0.9);
        assert!(best.values[1].abs() < 1e-3);
    }

    #[test]
    fn test_mlsl_nelder_mead() {
        let mut mlsl = Mlsl::new(sphere, 2, &[3.0, 3.0], &[-5.0, -5.0], &[5.0, 5.0])
            .unwrap()
            .with_options(MlslOptions {
                local_method: LocalMethod::NelderMead,
                ..Default::default()
            });
        mlsl.minimize().expect("MLSL failed");
        assert!(mlsl.best_parameter_set().unwrap().fitness < 1e-6);
    }

    #[test]
    fn test_mlsl_deterministic() {
        let run = || {
            let mut mlsl =
                Mlsl::new(tilted_double_well, 2, &[1.0, 0.0], &[-2.0, -2.0], &[2.0, 2.0])
                    .unwrap();
            mlsl.minimize().unwrap();
            mlsl.best_parameter_set().unwrap().clone()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_mlsl_rejects_gamma() {
        let mut mlsl = Mlsl::new(sphere, 1, &[0.5], &[-1.0], &[1.0])
            .unwrap()
            .with_options(MlslOptions {
                gamma: 1.0,
                ..Default::default()
            });
        assert!(matches!(mlsl.minimize(), Err(OptimizeError::InvalidParameter { .. })));
    }

    #[test]
    fn test_mlsl_traces_every_evaluation() {
        let mut mlsl = Mlsl::new(sphere, 2, &[3.0, 3.0], &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        mlsl.settings_mut().record_traces = true;
        mlsl.minimize().expect("MLSL failed");

        assert_eq!(mlsl.parameter_set_trace().len(), mlsl.function_evaluations());
    }

    #[test]
    fn test_mlsl_budget() {
        let mut mlsl = Mlsl::new(sphere, 2, &[3.0, 3.0], &[-5.0, -5.0], &[5.0, 5.0]).unwrap();
        mlsl.settings_mut().max_function_evaluations = 30;
        let status = mlsl.minimize().expect("MLSL failed");

        assert_eq!(status, OptimizationStatus::MaximumFunctionEvaluationsReached);
        assert_eq!(mlsl.function_evaluations(), 30);
    }
}

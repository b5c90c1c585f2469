//! Shared optimizer state: budgets, counters, the evaluation choke point and
//! the convergence predicate.
//!
//! Every algorithm owns one [`OptimizerState`]. Objective calls go through
//! [`OptimizerState::evaluate`], which counts evaluations, enforces the
//! evaluation budget, applies the minimize/maximize sign convention and keeps
//! the best parameter set seen so far.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::optimize::error::{Cancelled, OptimizeError, OptimizeResult};
use crate::optimize::parameter_set::ParameterSet;
use crate::optimize::utils::finite_difference_hessian;

/// Objective function `f: R^n -> R`.
pub type Objective = Rc<dyn Fn(&[f64]) -> f64>;

/// Gradient function `∇f: R^n -> R^n`.
pub type Gradient = Rc<dyn Fn(&[f64]) -> Vec<f64>>;

/// Terminal state of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizationStatus {
    /// Not yet run.
    #[default]
    None,
    /// A convergence criterion fired.
    Success,
    /// The iteration budget ran out.
    MaximumIterationsReached,
    /// The function-evaluation budget ran out.
    MaximumFunctionEvaluationsReached,
    /// The run stopped on a numerical error.
    Failure,
}

impl OptimizationStatus {
    /// Whether the status ends a run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self != Self::None
    }
}

/// Budgets and tolerances shared by every algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Maximum number of objective evaluations
    pub max_function_evaluations: usize,
    /// Relative tolerance of the convergence predicate
    pub relative_tolerance: f64,
    /// Absolute tolerance of the convergence predicate
    pub absolute_tolerance: f64,
    /// Record every evaluated parameter set
    pub record_traces: bool,
    /// Compute a finite-difference Hessian at the optimum after the run
    pub compute_hessian: bool,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            max_function_evaluations: 100_000,
            relative_tolerance: 1e-8,
            absolute_tolerance: 1e-8,
            record_traces: false,
            compute_hessian: false,
        }
    }
}

impl OptimizerSettings {
    /// Checks that tolerances are finite and non-negative.
    ///
    /// # Errors
    /// `InvalidParameter` naming the offending setting.
    pub fn validate(&self) -> OptimizeResult<()> {
        if !self.relative_tolerance.is_finite() || self.relative_tolerance < 0.0 {
            return Err(OptimizeError::invalid_parameter(
                "relative_tolerance",
                "must be finite and non-negative",
            ));
        }
        if !self.absolute_tolerance.is_finite() || self.absolute_tolerance < 0.0 {
            return Err(OptimizeError::invalid_parameter(
                "absolute_tolerance",
                "must be finite and non-negative",
            ));
        }
        if self.max_iterations == 0 {
            return Err(OptimizeError::invalid_parameter(
                "max_iterations",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Optimization sense. Internally every algorithm minimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Sense {
    #[default]
    Minimize,
    Maximize,
}

impl Sense {
    fn sign(self) -> f64 {
        match self {
            Self::Minimize => 1.0,
            Self::Maximize => -1.0,
        }
    }
}

/// Convergence predicate shared by every algorithm:
/// `|old - new| <= absolute + relative * |old|`.
#[inline]
#[must_use]
pub fn check_convergence(old: f64, new: f64, relative: f64, absolute: f64) -> bool {
    (old - new).abs() <= absolute + relative * old.abs()
}

/// Counters, settings and results owned by one optimizer instance.
pub struct OptimizerState {
    objective: Objective,
    number_of_parameters: usize,
    settings: OptimizerSettings,
    sense: Sense,
    iterations: usize,
    function_evaluations: usize,
    status: OptimizationStatus,
    best: Option<ParameterSet>,
    trace: Vec<ParameterSet>,
    hessian: Option<Vec<Vec<f64>>>,
}

impl fmt::Debug for OptimizerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizerState")
            .field("number_of_parameters", &self.number_of_parameters)
            .field("settings", &self.settings)
            .field("iterations", &self.iterations)
            .field("function_evaluations", &self.function_evaluations)
            .field("status", &self.status)
            .field("best", &self.best)
            .finish_non_exhaustive()
    }
}

impl OptimizerState {
    /// Creates a state for an objective over `number_of_parameters` dimensions.
    ///
    /// # Errors
    /// `InvalidInput` if `number_of_parameters` is zero.
    pub fn new(
        objective: Objective,
        number_of_parameters: usize,
        context: &str,
    ) -> OptimizeResult<Self> {
        if number_of_parameters == 0 {
            return Err(OptimizeError::InvalidInput {
                context: format!("{context}: number of parameters must be at least 1"),
            });
        }
        Ok(Self {
            objective,
            number_of_parameters,
            settings: OptimizerSettings::default(),
            sense: Sense::Minimize,
            iterations: 0,
            function_evaluations: 0,
            status: OptimizationStatus::None,
            best: None,
            trace: Vec::new(),
            hessian: None,
        })
    }

    /// Child state for a nested local search.
    ///
    /// Shares the objective and sense, inherits tolerances, and receives the
    /// parent's remaining evaluation budget. Records a trace when the parent
    /// does; never computes a Hessian.
    pub(crate) fn fork(&self, max_iterations: usize) -> Self {
        let settings = OptimizerSettings {
            max_iterations,
            max_function_evaluations: self.remaining_evaluations(),
            compute_hessian: false,
            ..self.settings.clone()
        };
        Self {
            objective: Rc::clone(&self.objective),
            number_of_parameters: self.number_of_parameters,
            settings,
            sense: self.sense,
            iterations: 0,
            function_evaluations: 0,
            status: OptimizationStatus::None,
            best: None,
            trace: Vec::new(),
            hessian: None,
        }
    }

    /// Folds a finished child run into this state.
    ///
    /// # Errors
    /// `Cancelled` when the child spent the remaining evaluation budget.
    pub(crate) fn absorb(&mut self, child: &OptimizerState) -> Result<(), Cancelled> {
        self.function_evaluations += child.function_evaluations;
        if self.settings.record_traces {
            self.trace.extend_from_slice(&child.trace);
        }
        if let Some(candidate) = &child.best {
            self.promote(candidate);
        }
        if child.status == OptimizationStatus::MaximumFunctionEvaluationsReached {
            self.status = OptimizationStatus::MaximumFunctionEvaluationsReached;
            return Err(Cancelled);
        }
        Ok(())
    }

    /// The objective in the caller's sign convention.
    #[must_use]
    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Replaces the objective (used by constrained wrappers).
    pub fn set_objective(&mut self, objective: Objective) {
        self.objective = objective;
    }

    /// Problem dimensionality.
    #[must_use]
    pub fn number_of_parameters(&self) -> usize {
        self.number_of_parameters
    }

    /// Budgets and tolerances.
    #[must_use]
    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Mutable budgets and tolerances.
    pub fn settings_mut(&mut self) -> &mut OptimizerSettings {
        &mut self.settings
    }

    /// Factor mapping caller values into the internal convention.
    pub(crate) fn sign(&self) -> f64 {
        self.sense.sign()
    }

    /// Iterations completed in the current run.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Objective evaluations performed in the current run.
    #[must_use]
    pub fn function_evaluations(&self) -> usize {
        self.function_evaluations
    }

    /// Evaluations left before the budget is exhausted.
    #[must_use]
    pub fn remaining_evaluations(&self) -> usize {
        self.settings
            .max_function_evaluations
            .saturating_sub(self.function_evaluations)
    }

    /// Run status.
    #[must_use]
    pub fn status(&self) -> OptimizationStatus {
        self.status
    }

    /// Best parameter set found. During a run its fitness is in the internal
    /// (minimization) convention; after the run, in the caller's convention.
    #[must_use]
    pub fn best_parameter_set(&self) -> Option<&ParameterSet> {
        self.best.as_ref()
    }

    /// Every evaluated parameter set, when `record_traces` is on.
    #[must_use]
    pub fn parameter_set_trace(&self) -> &[ParameterSet] {
        &self.trace
    }

    /// Finite-difference Hessian at the optimum, when `compute_hessian` is on.
    #[must_use]
    pub fn hessian(&self) -> Option<&[Vec<f64>]> {
        self.hessian.as_deref()
    }

    /// Evaluates the objective at `values`.
    ///
    /// Returns the fitness in the internal minimization convention. NaN
    /// fitness is reported as `+inf`.
    ///
    /// # Errors
    /// `Cancelled` once the evaluation budget is spent; the objective is not
    /// called and the status becomes `MaximumFunctionEvaluationsReached`.
    pub fn evaluate(&mut self, values: &[f64]) -> Result<f64, Cancelled> {
        if self.function_evaluations >= self.settings.max_function_evaluations {
            self.status = OptimizationStatus::MaximumFunctionEvaluationsReached;
            return Err(Cancelled);
        }
        self.function_evaluations += 1;

        let raw = self.sense.sign() * (self.objective)(values);
        let fitness = if raw.is_nan() { f64::INFINITY } else { raw };
        self.offer(ParameterSet::new(values, fitness));
        Ok(fitness)
    }

    fn offer(&mut self, candidate: ParameterSet) {
        if self.settings.record_traces {
            self.trace.push(candidate.clone());
        }
        self.promote(&candidate);
    }

    /// Makes `candidate` the best set if it is strictly better.
    fn promote(&mut self, candidate: &ParameterSet) {
        let improves = self
            .best
            .as_ref()
            .is_none_or(|best| candidate.fitness < best.fitness);
        if improves {
            self.best = Some(candidate.clone());
        }
    }

    /// Counts evaluations spent by an inner optimizer that owns its own state.
    pub(crate) fn add_evaluations(&mut self, count: usize) {
        self.function_evaluations += count;
    }

    /// Overrides the best parameter set (internal convention).
    pub(crate) fn replace_best(&mut self, best: ParameterSet) {
        self.best = Some(best);
    }

    /// The shared convergence predicate with this state's tolerances.
    #[must_use]
    pub fn check_convergence(&self, old: f64, new: f64) -> bool {
        check_convergence(
            old,
            new,
            self.settings.relative_tolerance,
            self.settings.absolute_tolerance,
        )
    }

    /// Starts the next iteration, or returns `false` when the iteration
    /// budget is spent.
    pub fn next_iteration(&mut self) -> bool {
        if self.iterations >= self.settings.max_iterations {
            return false;
        }
        self.iterations += 1;
        true
    }

    /// Records iterations counted by an inner loop that cannot borrow the
    /// state (the Brent core).
    pub(crate) fn set_iterations(&mut self, iterations: usize) {
        self.iterations = iterations.min(self.settings.max_iterations);
    }

    /// Sets the terminal status.
    pub fn update_status(&mut self, status: OptimizationStatus) {
        self.status = status;
    }

    pub(crate) fn reset(&mut self, sense: Sense) {
        self.sense = sense;
        self.iterations = 0;
        self.function_evaluations = 0;
        self.status = OptimizationStatus::None;
        self.best = None;
        self.trace.clear();
        self.hessian = None;
    }

    /// Converts results back to the caller's sign convention and computes
    /// the Hessian when requested.
    pub(crate) fn finish(&mut self) {
        let sign = self.sense.sign();
        if let Some(best) = self.best.as_mut() {
            best.fitness *= sign;
        }
        for set in &mut self.trace {
            set.fitness *= sign;
        }

        if !self.settings.compute_hessian {
            return;
        }
        if let Some(best) = &self.best {
            let (hessian, nfev) = finite_difference_hessian(&*self.objective, &best.values);
            self.function_evaluations += nfev;
            self.hessian = Some(hessian);
        }
    }
}

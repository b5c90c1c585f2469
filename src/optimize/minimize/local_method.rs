//! Selection of the local method used inside global searches.

use serde::{Deserialize, Serialize};

use super::{Bfgs, NelderMead, Powell};
use crate::optimize::bounds::Bounds;
use crate::optimize::error::{OptimizeError, OptimizeResult};
use crate::optimize::parameter_set::ParameterSet;
use crate::optimize::state::OptimizerState;
use crate::optimize::traits::{Optimizable, run};

/// Local method run from each start point of MLSL and MultiStart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LocalMethod {
    /// Quasi-Newton with finite-difference gradients
    #[default]
    Bfgs,
    /// Derivative-free simplex
    NelderMead,
    /// Derivative-free direction set
    Powell,
}

impl LocalMethod {
    /// Builds the local solver on a forked state.
    fn build(self, state: OptimizerState, bounds: Bounds, start: &[f64]) -> Box<dyn Optimizable> {
        let start = start.to_vec();
        match self {
            Self::Bfgs => Box::new(Bfgs::from_state(state, bounds, start)),
            Self::NelderMead => Box::new(NelderMead::from_state(state, bounds, start)),
            Self::Powell => Box::new(Powell::from_state(state, bounds, start)),
        }
    }

    /// Runs one local search from `start` on behalf of `parent`.
    ///
    /// The child shares the parent's objective and sense, spends from the
    /// parent's remaining evaluation budget, and uses the given tolerances.
    /// Its evaluations and best point are folded back into `parent`.
    ///
    /// Returns the local minimum in the internal convention.
    ///
    /// # Errors
    /// * `Cancelled` when the parent's evaluation budget runs out
    /// * `NumericalError` when the local method breaks down; the evaluations
    ///   it spent are still folded into `parent`
    pub(crate) fn search(
        self,
        parent: &mut OptimizerState,
        bounds: &Bounds,
        start: &[f64],
        relative_tolerance: f64,
        absolute_tolerance: f64,
    ) -> OptimizeResult<ParameterSet> {
        let mut child = parent.fork(parent.settings().max_iterations);
        child.settings_mut().relative_tolerance = relative_tolerance;
        child.settings_mut().absolute_tolerance = absolute_tolerance;

        let mut solver = self.build(child, bounds.clone(), start);
        let outcome = run(solver.as_mut());
        parent.absorb(solver.state())?;

        let status = outcome?;
        tracing::debug!(method = ?self, status = ?status, "local search finished");
        solver.best_parameter_set().cloned().ok_or_else(|| {
            OptimizeError::numerical(format!("{self:?}: local search evaluated no points"))
        })
    }
}

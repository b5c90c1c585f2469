//! Scalar constraints for constrained optimization.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::optimize::state::Objective;

/// Relation a constraint imposes between `function(x)` and its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    /// `function(x) == target`
    EqualTo,
    /// `function(x) <= target`
    LesserThanOrEqualTo,
    /// `function(x) >= target`
    GreaterThanOrEqualTo,
}

/// A nonlinear constraint `function(x) {=, <=, >=} target`.
///
/// Immutable after construction. Cloning shares the function.
#[derive(Clone)]
pub struct Constraint {
    function: Objective,
    number_of_parameters: usize,
    target: f64,
    kind: ConstraintType,
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constraint")
            .field("number_of_parameters", &self.number_of_parameters)
            .field("target", &self.target)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Constraint {
    /// Creates a constraint on a function of `number_of_parameters` values.
    pub fn new<F>(
        function: F,
        number_of_parameters: usize,
        target: f64,
        kind: ConstraintType,
    ) -> Self
    where
        F: Fn(&[f64]) -> f64 + 'static,
    {
        Self {
            function: Rc::new(function),
            number_of_parameters,
            target,
            kind,
        }
    }

    /// Dimensionality the function expects.
    #[must_use]
    pub fn number_of_parameters(&self) -> usize {
        self.number_of_parameters
    }

    /// Right-hand side of the relation.
    #[must_use]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Kind of relation.
    #[must_use]
    pub fn kind(&self) -> ConstraintType {
        self.kind
    }

    /// Whether this is an equality constraint.
    #[must_use]
    pub fn is_equality(&self) -> bool {
        self.kind == ConstraintType::EqualTo
    }

    /// Residual `g(x)` in standard form: zero at an equality, and
    /// non-positive exactly when an inequality holds.
    pub fn residual(&self, x: &[f64]) -> f64 {
        let value = (self.function)(x);
        match self.kind {
            ConstraintType::EqualTo | ConstraintType::LesserThanOrEqualTo => value - self.target,
            ConstraintType::GreaterThanOrEqualTo => self.target - value,
        }
    }

    /// Amount by which `x` violates the constraint; zero when it holds.
    pub fn violation(&self, x: &[f64]) -> f64 {
        let g = self.residual(x);
        if self.is_equality() { g.abs() } else { g.max(0.0) }
    }

    /// Whether the violation at `x` is within `tolerance`.
    pub fn is_satisfied(&self, x: &[f64], tolerance: f64) -> bool {
        self.violation(x) <= tolerance
    }
}

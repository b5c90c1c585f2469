//! Parameter vectors paired with their fitness.

use serde::{Deserialize, Serialize};

/// A candidate solution: parameter values, the objective value at those
/// values, and an optional weight.
///
/// Values are always an owned copy, so storing a set in a population never
/// aliases another member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Parameter values (one per dimension)
    pub values: Vec<f64>,
    /// Objective value at `values`
    pub fitness: f64,
    /// Optional weight (1.0 unless set)
    pub weight: f64,
}

impl ParameterSet {
    /// Creates a parameter set from a copy of `values`.
    #[must_use]
    pub fn new(values: &[f64], fitness: f64) -> Self {
        Self {
            values: values.to_vec(),
            fitness,
            weight: 1.0,
        }
    }

    /// Sets the weight.
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the set holds no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Sorts parameter sets by ascending fitness, NaN last.
pub(crate) fn sort_by_fitness(sets: &mut [ParameterSet]) {
    sets.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));
}

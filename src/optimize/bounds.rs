//! Box constraints and parameter repair.

use serde::{Deserialize, Serialize};

use crate::optimize::error::{OptimizeError, OptimizeResult};

/// Clamps `value` into `[lower, upper]`.
///
/// Repair is a plain clamp, never a reflection or wrap-around. A NaN value
/// repairs to `lower`. Repairing an in-bounds value returns it unchanged, so
/// the operation is idempotent.
#[inline]
#[must_use]
pub fn repair_parameter(value: f64, lower: f64, upper: f64) -> f64 {
    value.max(lower).min(upper)
}

/// Validated per-parameter box `[lower[i], upper[i]]`.
///
/// Every dimension satisfies `lower[i] < upper[i]` with finite endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    /// Validates bounds for a problem with `number_of_parameters` dimensions.
    ///
    /// # Errors
    /// * `DimensionMismatch` if either slice does not have one entry per parameter
    /// * `InvalidInterval` if any `upper[i] <= lower[i]` or an endpoint is not finite
    pub fn new(
        number_of_parameters: usize,
        lower: &[f64],
        upper: &[f64],
        context: &str,
    ) -> OptimizeResult<Self> {
        check_length(number_of_parameters, lower.len(), context, "lower bounds")?;
        check_length(number_of_parameters, upper.len(), context, "upper bounds")?;

        for (i, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || hi <= lo {
                return Err(OptimizeError::InvalidInterval {
                    a: lo,
                    b: hi,
                    context: format!("{context}: invalid bounds for parameter {i}"),
                });
            }
        }

        Ok(Self {
            lower: lower.to_vec(),
            upper: upper.to_vec(),
        })
    }

    /// Number of bounded parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// Whether the box has zero dimensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    /// Lower bounds.
    #[must_use]
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// Upper bounds.
    #[must_use]
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Width of dimension `i`.
    #[inline]
    #[must_use]
    pub fn range(&self, i: usize) -> f64 {
        self.upper[i] - self.lower[i]
    }

    /// Product of all widths.
    #[must_use]
    pub fn volume(&self) -> f64 {
        (0..self.len()).map(|i| self.range(i)).product()
    }

    /// Clamps a single coordinate into dimension `i`.
    #[inline]
    #[must_use]
    pub fn repair_at(&self, i: usize, value: f64) -> f64 {
        repair_parameter(value, self.lower[i], self.upper[i])
    }

    /// Clamps every coordinate in place.
    pub fn repair(&self, values: &mut [f64]) {
        for (i, v) in values.iter_mut().enumerate() {
            *v = self.repair_at(i, *v);
        }
    }

    /// Whether every coordinate lies inside the box.
    #[must_use]
    pub fn contains(&self, values: &[f64]) -> bool {
        values.len() == self.len()
            && values
                .iter()
                .enumerate()
                .all(|(i, &v)| v >= self.lower[i] && v <= self.upper[i])
    }

    /// Validates a starting point: correct length and inside the box.
    ///
    /// # Errors
    /// * `DimensionMismatch` on a length mismatch
    /// * `InvalidInput` if a coordinate lies outside its bounds
    pub fn check_initial_values(&self, initial_values: &[f64], context: &str) -> OptimizeResult<()> {
        check_length(self.len(), initial_values.len(), context, "initial values")?;
        if !self.contains(initial_values) {
            return Err(OptimizeError::InvalidInput {
                context: format!("{context}: initial values must lie within the bounds"),
            });
        }
        Ok(())
    }
}

pub(crate) fn check_length(
    expected: usize,
    actual: usize,
    context: &str,
    what: &str,
) -> OptimizeResult<()> {
    if expected != actual {
        return Err(OptimizeError::DimensionMismatch {
            expected,
            actual,
            context: format!("{context}: {what}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_length_mismatch() {
        let result = Bounds::new(2, &[0.0], &[1.0, 1.0], "test");
        assert!(matches!(
            result,
            Err(OptimizeError::DimensionMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_degenerate_bounds() {
        let result = Bounds::new(2, &[0.0, 1.0], &[1.0, 1.0], "test");
        assert!(matches!(result, Err(OptimizeError::InvalidInterval { .. })));

        let result = Bounds::new(1, &[2.0], &[1.0], "test");
        assert!(matches!(result, Err(OptimizeError::InvalidInterval { .. })));

        let result = Bounds::new(1, &[f64::NEG_INFINITY], &[1.0], "test");
        assert!(matches!(result, Err(OptimizeError::InvalidInterval { .. })));
    }

    #[test]
    fn test_repair_and_volume() {
        let bounds = Bounds::new(2, &[-1.0, 0.0], &[1.0, 4.0], "test").unwrap();
        let mut x = [5.0, -3.0];
        bounds.repair(&mut x);

        assert_eq!(x, [1.0, 0.0]);
        assert!(bounds.contains(&x));
        assert_eq!(bounds.volume(), 8.0);
        assert_eq!(repair_parameter(f64::NAN, -1.0, 1.0), -1.0);
    }

    #[test]
    fn test_initial_values_outside_box() {
        let bounds = Bounds::new(1, &[0.0], &[1.0], "test").unwrap();
        assert!(bounds.check_initial_values(&[0.5], "test").is_ok());
        assert!(matches!(
            bounds.check_initial_values(&[1.5], "test"),
            Err(OptimizeError::InvalidInput { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_repair_is_idempotent(value in -1e6f64..1e6, lower in -100.0f64..0.0, width in 1e-6f64..100.0) {
            let upper = lower + width;
            let once = repair_parameter(value, lower, upper);
            prop_assert!(once >= lower && once <= upper);
            prop_assert_eq!(repair_parameter(once, lower, upper), once);
            if value >= lower && value <= upper {
                prop_assert_eq!(once, value);
            }
        }
    }
}

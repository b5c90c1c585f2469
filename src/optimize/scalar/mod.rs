//! Scalar (1D) minimization.
//!
//! [`BrentSearch`] and [`GoldenSection`] minimize a univariate function on a
//! closed interval. [`bracket`] locates a downhill triple for callers that
//! do not know an interval in advance; Powell's line search uses it.

mod brent;
mod golden_section;

pub(crate) use brent::brent_minimize;
pub use brent::BrentSearch;
pub use golden_section::GoldenSection;

use serde::{Deserialize, Serialize};

use crate::optimize::error::OptimizeResult;

/// Golden-section fraction `(3 - sqrt(5)) / 2 ≈ 0.381966`.
pub(crate) const GOLDEN_SECTION: f64 = 0.381_966_011_250_105_1;

/// Default expansion ratio of [`bracket`] (the golden ratio).
pub const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

/// Maximum number of expansion steps in [`bracket`].
const MAX_BRACKET_STEPS: usize = 50;

/// Three abscissae with `f(b) <= f(a)` and `f(b) <= f(c)`.
///
/// `a` and `c` are the outer points in walking order; `a < c` is not implied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub fa: f64,
    pub fb: f64,
    pub fc: f64,
}

impl Bracket {
    /// Outer points as an ordered interval.
    #[must_use]
    pub fn interval(&self) -> (f64, f64) {
        (self.a.min(self.c), self.a.max(self.c))
    }
}

/// Walks outward from `start` in geometrically growing steps until `f` stops
/// decreasing.
///
/// The first step has length `step`; if it goes uphill the walk turns around.
/// Each further step is `expansion` times the previous one. Gives up after
/// a fixed number of expansions on functions that keep decreasing, returning
/// the last triple.
///
/// # Arguments
/// * `f` - Fallible objective, usually routed through the evaluation budget
/// * `start` - Starting abscissa
/// * `step` - Initial step length (non-zero)
/// * `expansion` - Growth factor of successive steps (> 1)
pub fn bracket<F>(f: &mut F, start: f64, step: f64, expansion: f64) -> OptimizeResult<Bracket>
where
    F: FnMut(f64) -> OptimizeResult<f64>,
{
    let fstart = f(start)?;
    bracket_from(f, start, fstart, step, expansion)
}

/// [`bracket`] with the value at `start` already known.
pub(crate) fn bracket_from<F>(
    f: &mut F,
    start: f64,
    fstart: f64,
    step: f64,
    expansion: f64,
) -> OptimizeResult<Bracket>
where
    F: FnMut(f64) -> OptimizeResult<f64>,
{
    let (mut a, mut fa) = (start, fstart);
    let (mut b, mut fb) = (start + step, f(start + step)?);
    if fb > fa {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }

    let mut c = b + expansion * (b - a);
    let mut fc = f(c)?;
    for _ in 0..MAX_BRACKET_STEPS {
        if fc >= fb {
            break;
        }
        (a, fa) = (b, fb);
        (b, fb) = (c, fc);
        c = b + expansion * (b - a);
        fc = f(c)?;
    }

    Ok(Bracket { a, b, c, fa, fb, fc })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bracket_turns_around() {
        let mut f = |x: f64| -> OptimizeResult<f64> { Ok((x + 2.0) * (x + 2.0)) };
        let bracket = bracket(&mut f, 0.0, 0.1, GOLDEN_RATIO).unwrap();

        let (lo, hi) = bracket.interval();
        assert!(lo < -2.0 && -2.0 < hi);
        assert!(bracket.fb <= bracket.fa && bracket.fb <= bracket.fc);
    }

    #[test]
    fn test_bracket_gives_up_on_unbounded_descent() {
        let mut calls = 0;
        let mut f = |x: f64| -> OptimizeResult<f64> {
            calls += 1;
            Ok(-x)
        };
        let bracket = bracket(&mut f, 0.0, 1.0, 2.0).unwrap();

        assert!(bracket.c > bracket.b);
        assert_eq!(calls, 3 + MAX_BRACKET_STEPS);
    }

    #[test]
    fn test_bracket_propagates_cancellation() {
        use crate::optimize::error::{Cancelled, OptimizeError};

        let mut remaining = 2;
        let mut f = |x: f64| -> OptimizeResult<f64> {
            if remaining == 0 {
                return Err(Cancelled.into());
            }
            remaining -= 1;
            Ok(x * x)
        };
        assert_eq!(
            bracket(&mut f, 5.0, 1.0, 2.0),
            Err(OptimizeError::Cancelled(Cancelled))
        );
    }
}

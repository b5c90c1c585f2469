//! Brent's method for bounded scalar minimization.

use std::rc::Rc;

use super::{Bracket, GOLDEN_SECTION};
use crate::optimize::bounds::Bounds;
use crate::optimize::error::OptimizeResult;
use crate::optimize::state::{OptimizationStatus, OptimizerState};
use crate::optimize::traits::Optimizable;

/// Outcome of the Brent core on one interval.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineMinimum {
    pub x: f64,
    pub fx: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Brent's method on `[lo, hi]` starting from an interior point `x` with
/// known value `fx`.
///
/// Takes inverse-parabolic steps through the three best points and falls back
/// to a golden-section step whenever the parabola is not trustworthy: the step
/// must shrink to less than half of the step before last and land strictly
/// inside the interval. Stops once the interval around `x` is narrower than
/// `4 * (relative * |x| + absolute)`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn brent_minimize<F>(
    f: &mut F,
    lo: f64,
    hi: f64,
    x: f64,
    fx: f64,
    relative: f64,
    absolute: f64,
    max_iter: usize,
) -> OptimizeResult<LineMinimum>
where
    F: FnMut(f64) -> OptimizeResult<f64>,
{
    let (mut a, mut b) = if lo < hi { (lo, hi) } else { (hi, lo) };
    let (mut x, mut fx) = (x, fx);
    let (mut w, mut fw) = (x, fx);
    let (mut v, mut fv) = (x, fx);
    // d is the current step, e the step before last
    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for iter in 0..max_iter {
        let xm = 0.5 * (a + b);
        // absolute floor keeps the tolerance positive at x = 0
        let tol1 = relative * x.abs() + absolute.max(f64::EPSILON);
        let tol2 = 2.0 * tol1;

        if (x - xm).abs() <= tol2 - 0.5 * (b - a) {
            return Ok(LineMinimum {
                x,
                fx,
                iterations: iter,
                converged: true,
            });
        }

        let mut golden = true;
        if e.abs() > tol1 {
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            let e_prev = e;
            e = d;

            if p.abs() < (0.5 * q * e_prev).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = tol1.copysign(xm - x);
                }
                golden = false;
            }
        }
        if golden {
            e = if x >= xm { a - x } else { b - x };
            d = GOLDEN_SECTION * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else {
            x + tol1.copysign(d)
        };
        let fu = f(u)?;

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                b = x;
            }
            (v, fv) = (w, fw);
            (w, fw) = (x, fx);
            (x, fx) = (u, fu);
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                (v, fv) = (w, fw);
                (w, fw) = (u, fu);
            } else if fu <= fv || v == x || v == w {
                (v, fv) = (u, fu);
            }
        }
    }

    Ok(LineMinimum {
        x,
        fx,
        iterations: max_iter,
        converged: false,
    })
}

/// Brent's method for a one-dimensional objective on `[lower, upper]`.
///
/// The search starts from the bracket `[lower, (lower + upper) / 2, upper]`
/// and combines golden-section steps with inverse-parabolic interpolation.
///
/// # Example
///
/// ```ignore
/// use numerics::optimize::{BrentSearch, Optimizable};
///
/// let mut brent = BrentSearch::new(|x| (x + 3.0) * (x - 1.0).powi(2), -3.0, 3.0)?;
/// brent.minimize()?;
/// // x ≈ 1
/// ```
pub struct BrentSearch {
    state: OptimizerState,
    bounds: Bounds,
}

impl BrentSearch {
    /// Creates a Brent search of `objective` over `[lower, upper]`.
    ///
    /// # Errors
    /// `InvalidInterval` if `lower >= upper` or an endpoint is not finite.
    pub fn new<F>(objective: F, lower: f64, upper: f64) -> OptimizeResult<Self>
    where
        F: Fn(f64) -> f64 + 'static,
    {
        let bounds = Bounds::new(1, &[lower], &[upper], "BrentSearch")?;
        let state = OptimizerState::new(
            Rc::new(move |x: &[f64]| objective(x[0])),
            1,
            "BrentSearch",
        )?;
        Ok(Self { state, bounds })
    }

    /// Lower end of the search interval.
    #[must_use]
    pub fn lower(&self) -> f64 {
        self.bounds.lower()[0]
    }

    /// Upper end of the search interval.
    #[must_use]
    pub fn upper(&self) -> f64 {
        self.bounds.upper()[0]
    }

    /// Walks outward from `start` until the objective stops decreasing.
    ///
    /// Evaluations go through the optimizer's counters. Points are clamped to
    /// the search interval, and the returned abscissae are the clamped points
    /// the objective was evaluated at; near an end of the interval two of
    /// them may coincide.
    pub fn bracket(&mut self, start: f64, step: f64, expansion: f64) -> OptimizeResult<Bracket> {
        let bounds = &self.bounds;
        let state = &mut self.state;
        let mut f =
            |x: f64| -> OptimizeResult<f64> { Ok(state.evaluate(&[bounds.repair_at(0, x)])?) };
        let walk = super::bracket(&mut f, start, step, expansion)?;
        Ok(Bracket {
            a: bounds.repair_at(0, walk.a),
            b: bounds.repair_at(0, walk.b),
            c: bounds.repair_at(0, walk.c),
            ..walk
        })
    }
}

impl Optimizable for BrentSearch {
    fn state(&self) -> &OptimizerState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut OptimizerState {
        &mut self.state
    }

    fn optimize(&mut self) -> OptimizeResult<OptimizationStatus> {
        let (lower, upper) = (self.lower(), self.upper());
        let settings = self.state.settings().clone();
        let state = &mut self.state;

        let x0 = 0.5 * (lower + upper);
        let fx0 = state.evaluate(&[x0])?;

        let mut f = |x: f64| -> OptimizeResult<f64> { Ok(state.evaluate(&[x])?) };
        let line = brent_minimize(
            &mut f,
            lower,
            upper,
            x0,
            fx0,
            settings.relative_tolerance,
            settings.absolute_tolerance,
            settings.max_iterations,
        )?;
        self.state.set_iterations(line.iterations);

        tracing::debug!(
            x = line.x,
            fx = line.fx,
            iterations = line.iterations,
            "brent search finished"
        );

        Ok(if line.converged {
            OptimizationStatus::Success
        } else {
            OptimizationStatus::MaximumIterationsReached
        })
    }
}

//! Shared utility functions for optimization algorithms.
//!
//! This module provides common numerical operations used across multiple
//! optimization algorithms to avoid code duplication.

use crate::optimize::bounds::Bounds;
use crate::optimize::error::OptimizeResult;

/// Threshold for treating values as effectively zero.
pub const ZERO_THRESHOLD: f64 = 1e-10;

/// Compute the L2 (Euclidean) norm of a vector.
#[inline]
pub fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Euclidean distance between two points.
#[inline]
pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Dot product of two vectors.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Vector subtraction: a - b
#[inline]
pub fn vec_sub(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

/// Matrix-vector product for a dense row-major matrix.
pub fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter().map(|row| dot(row, v)).collect()
}

/// Identity matrix of size n.
pub fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            row
        })
        .collect()
}

/// Population mean and standard deviation (divides by n).
pub fn mean_std(v: &[f64]) -> (f64, f64) {
    let n = v.len() as f64;
    if v.is_empty() {
        return (0.0, 0.0);
    }
    let mean = v.iter().sum::<f64>() / n;
    let var = v.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Central-difference step for x: cbrt(eps) * max(|x|, 1).
#[inline]
fn gradient_step(x: f64) -> f64 {
    f64::EPSILON.cbrt() * x.abs().max(1.0)
}

/// Finite-difference gradient that never leaves the box.
///
/// Uses central differences in the interior. When a perturbed coordinate
/// would cross a bound it is clamped, and the divisor is the step actually
/// taken, which degrades to a one-sided difference at the boundary.
///
/// # Arguments
/// * `f` - Fallible objective, typically routed through the evaluation budget
/// * `x` - Point at which to evaluate gradient
/// * `bounds` - Box the perturbed points must stay within
pub fn bounded_gradient<F>(f: &mut F, x: &[f64], bounds: &Bounds) -> OptimizeResult<Vec<f64>>
where
    F: FnMut(&[f64]) -> OptimizeResult<f64>,
{
    let n = x.len();
    let mut grad = vec![0.0; n];
    let mut x_pert = x.to_vec();

    for i in 0..n {
        let x_orig = x[i];
        let h = gradient_step(x_orig);
        let hi = bounds.repair_at(i, x_orig + h);
        let lo = bounds.repair_at(i, x_orig - h);

        x_pert[i] = hi;
        let f_plus = f(&x_pert)?;
        x_pert[i] = lo;
        let f_minus = f(&x_pert)?;
        x_pert[i] = x_orig;

        let width = hi - lo;
        grad[i] = if width > 0.0 {
            (f_plus - f_minus) / width
        } else {
            0.0
        };
    }

    Ok(grad)
}

/// Central-difference Hessian of `f` at `x`.
///
/// Returns the symmetric n x n matrix and the number of evaluations spent.
pub fn finite_difference_hessian<F>(f: &F, x: &[f64]) -> (Vec<Vec<f64>>, usize)
where
    F: Fn(&[f64]) -> f64 + ?Sized,
{
    let n = x.len();
    let steps: Vec<f64> = x
        .iter()
        .map(|xi| f64::EPSILON.powf(0.25) * xi.abs().max(1.0))
        .collect();
    let mut hessian = vec![vec![0.0; n]; n];
    let mut pert = x.to_vec();
    let f0 = f(x);
    let mut nfev = 1;

    for i in 0..n {
        let hi = steps[i];
        pert[i] = x[i] + hi;
        let f_plus = f(&pert);
        pert[i] = x[i] - hi;
        let f_minus = f(&pert);
        pert[i] = x[i];
        nfev += 2;
        hessian[i][i] = (f_plus - 2.0 * f0 + f_minus) / (hi * hi);

        for j in 0..i {
            let hj = steps[j];
            let mut corner = |si: f64, sj: f64| {
                pert[i] = x[i] + si * hi;
                pert[j] = x[j] + sj * hj;
                let value = f(&pert);
                pert[i] = x[i];
                pert[j] = x[j];
                value
            };
            let fpp = corner(1.0, 1.0);
            let fpm = corner(1.0, -1.0);
            let fmp = corner(-1.0, 1.0);
            let fmm = corner(-1.0, -1.0);
            nfev += 4;

            let value = (fpp - fpm - fmp + fmm) / (4.0 * hi * hj);
            hessian[i][j] = value;
            hessian[j][i] = value;
        }
    }

    (hessian, nfev)
}

//! Bounded iterative solvers used by the distortion inversion.
//!
//! Both solvers run under a fixed iteration cap, so the cost of a solve is
//! bounded and data-independent. Failure is reported through the return
//! value, never by panicking.

use nalgebra::{convert, RealField};

use crate::math::eval_poly_horner;

/// Number of octaves swept when searching for a sign change in
/// [`poly_smallest_positive_root`].
const SWEEP_OCTAVES: usize = 64;

/// Newton-Raphson on a scalar equation with a fixed iteration budget.
///
/// `residual_and_slope` returns the residual and its derivative at a trial
/// value. The solve converges once the absolute residual drops below `eps`
/// within `max_iters` evaluations. A zero derivative stops the iteration
/// immediately with `converged = false`; callbacks exploit this by returning
/// a zero residual/derivative pair for trial values outside their domain.
///
/// Returns the last iterate and the convergence flag. The iterate must not
/// be trusted when the flag is false.
pub fn newton_raphson<R, F>(
    mut residual_and_slope: F,
    guess: R,
    eps: R,
    max_iters: usize,
) -> (R, bool)
where
    R: RealField + Copy,
    F: FnMut(R) -> (R, R),
{
    let mut x = guess;
    for _ in 0..max_iters {
        let (residual, slope) = residual_and_slope(x);
        if slope == R::zero() {
            return (x, false);
        }
        if residual.abs() < eps {
            return (x, true);
        }
        x -= residual / slope;
    }
    (x, false)
}

/// Smallest root of the polynomial on `[0, ∞)`, or `None` when no sign
/// change is found.
///
/// Coefficients are ordered from the constant term to the highest degree.
/// The search sweeps octaves outward from a small fraction of `guess` until
/// the polynomial changes sign, then narrows the bracket by bisection with a
/// fixed iteration budget. `guess` must be positive; it sets the scale of
/// the sweep, not the answer. Narrow sign excursions between consecutive
/// octaves can be missed, which is acceptable for the smooth low-degree
/// polynomials this crate solves.
pub fn poly_smallest_positive_root<R, const N: usize>(
    coeffs: [R; N],
    guess: R,
    max_iters: usize,
) -> Option<R>
where
    R: RealField + Copy,
{
    if guess <= R::zero() {
        return None;
    }
    let two: R = convert(2.0);
    let half: R = convert(0.5);

    let mut lo = R::zero();
    let mut p_lo = eval_poly_horner(coeffs, lo);
    if p_lo == R::zero() {
        return Some(lo);
    }

    let mut hi = guess * convert(1.0 / 256.0);
    for _ in 0..SWEEP_OCTAVES {
        let p_hi = eval_poly_horner(coeffs, hi);
        if p_hi == R::zero() {
            return Some(hi);
        }
        if (p_hi > R::zero()) != (p_lo > R::zero()) {
            // Sign change: narrow [lo, hi] down to the crossing.
            for _ in 0..max_iters {
                let mid = (lo + hi) * half;
                let p_mid = eval_poly_horner(coeffs, mid);
                if p_mid == R::zero() {
                    return Some(mid);
                }
                if (p_mid > R::zero()) == (p_lo > R::zero()) {
                    lo = mid;
                    p_lo = p_mid;
                } else {
                    hi = mid;
                }
            }
            return Some((lo + hi) * half);
        }
        lo = hi;
        p_lo = p_hi;
        hi *= two;
    }
    None
}

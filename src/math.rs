//! Scalar numeric helpers shared by the projection code.

use nalgebra::RealField;

/// Numerically stable Euclidean norm of a 2D vector given by its components.
///
/// Scales by the larger magnitude before squaring, so the intermediate
/// square neither overflows nor underflows for extreme inputs.
pub fn stable_norm2<R: RealField + Copy>(a: R, b: R) -> R {
    let a = a.abs();
    let b = b.abs();
    let (big, small) = if a >= b { (a, b) } else { (b, a) };
    if big == R::zero() {
        return R::zero();
    }
    let ratio = small / big;
    big * (R::one() + ratio * ratio).sqrt()
}

/// Evaluate a polynomial at `x` using Horner's scheme.
///
/// Coefficients are ordered from the constant term to the highest degree.
pub fn eval_poly_horner<R: RealField + Copy, const N: usize>(coeffs: [R; N], x: R) -> R {
    let mut acc = R::zero();
    for &c in coeffs.iter().rev() {
        acc = acc * x + c;
    }
    acc
}

/// Largest representable value of `R`, used as the "unbounded" sentinel for
/// angular limits.
pub fn max_bound<R: RealField + Copy>() -> R {
    // All scalar types this crate targets (f32, f64) have a finite maximum.
    R::max_value().expect("scalar type without a maximum value")
}

//! Radial distortion of the equidistant fisheye model.

use nalgebra::{convert, RealField, Vector4};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

use crate::math::{eval_poly_horner, max_bound};
use crate::solve::{newton_raphson, poly_smallest_positive_root};

/// Default scale guess, in radians, for the monotonic-bound root search.
const DEFAULT_MAX_ANGLE_GUESS: f64 = 1.57;

/// Iteration budget for the monotonic-bound root search.
const ROOT_ITERS: usize = 20;

/// Termination settings for the fixed-budget Newton inversion of the
/// distortion polynomial.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct UndistortConfig {
    /// Iteration budget for the Newton solve.
    pub max_iters: usize,
    /// Absolute residual tolerance below which the solve counts as
    /// converged.
    pub eps: f64,
}

impl Default for UndistortConfig {
    fn default() -> Self {
        Self {
            max_iters: 20,
            eps: 1e-6,
        }
    }
}

/// Radial distortion terms `(k1, k2, k3, k4)` of the equidistant fisheye
/// model.
///
/// The distorted angular radius is
/// `theta_d = theta * (1 + k1*theta² + k2*theta⁴ + k3*theta⁶ + k4*theta⁸)`,
/// the four-term odd polynomial used by OpenCV's `cv::fisheye` module and by
/// the ROS `equidistant` distortion model.
///
/// This is a newtype wrapping an `nalgebra::Vector4`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FisheyeDistortion<R: RealField>(Vector4<R>);

impl<R: RealField + Copy> FisheyeDistortion<R> {
    /// build from vector ordered [k1, k2, k3, k4]
    #[inline]
    pub fn from_opencv_vec(v: Vector4<R>) -> Self {
        FisheyeDistortion(v)
    }

    /// OpenCV ordered vector of distortion terms.
    ///
    /// The order is [k1, k2, k3, k4].
    #[inline]
    pub fn opencv_vec(&self) -> &Vector4<R> {
        &self.0
    }

    /// Construct a zero distortion model.
    #[inline]
    pub fn zero() -> Self {
        FisheyeDistortion(Vector4::new(R::zero(), R::zero(), R::zero(), R::zero()))
    }

    /// The first radial distortion term, tied to `theta³`.
    #[inline]
    pub fn k1(&self) -> R {
        self.0[0]
    }

    /// The first radial distortion term (mutable reference).
    #[inline]
    pub fn k1_mut(&mut self) -> &mut R {
        &mut self.0[0]
    }

    /// The second radial distortion term, tied to `theta⁵`.
    #[inline]
    pub fn k2(&self) -> R {
        self.0[1]
    }

    /// The second radial distortion term (mutable reference).
    #[inline]
    pub fn k2_mut(&mut self) -> &mut R {
        &mut self.0[1]
    }

    /// The third radial distortion term, tied to `theta⁷`.
    #[inline]
    pub fn k3(&self) -> R {
        self.0[2]
    }

    /// The third radial distortion term (mutable reference).
    #[inline]
    pub fn k3_mut(&mut self) -> &mut R {
        &mut self.0[2]
    }

    /// The fourth radial distortion term, tied to `theta⁹`.
    #[inline]
    pub fn k4(&self) -> R {
        self.0[3]
    }

    /// The fourth radial distortion term (mutable reference).
    #[inline]
    pub fn k4_mut(&mut self) -> &mut R {
        &mut self.0[3]
    }

    /// Return `true` if there is approximately zero distortion, else `false`.
    pub fn is_linear(&self) -> bool {
        let v = &self.0;
        let sum_squared = v.dot(v);
        sum_squared < convert(1e-16)
    }

    /// Distorted angular radius `theta_d` for the incidence angle `theta`.
    pub fn distort_angle(&self, theta: R) -> R {
        let theta2 = theta * theta;
        theta
            * eval_poly_horner(
                [R::one(), self.k1(), self.k2(), self.k3(), self.k4()],
                theta2,
            )
    }

    /// Derivative `d(theta_d)/d(theta)` of the distortion polynomial.
    pub fn distort_angle_derivative(&self, theta: R) -> R {
        let theta2 = theta * theta;
        eval_poly_horner(self.derivative_coeffs(), theta2)
    }

    /// Invert the distortion: recover `theta` from `theta_d`.
    ///
    /// Calls [`undistort_angle_ext`](Self::undistort_angle_ext) with default
    /// termination settings.
    pub fn undistort_angle(&self, theta_d: R, max_theta: R) -> (R, bool) {
        self.undistort_angle_ext(theta_d, max_theta, None)
    }

    /// Invert the distortion with explicit termination settings.
    ///
    /// Newton-Raphson seeded at `theta_d`. Trial angles beyond `max_theta`
    /// yield a degenerate zero residual/derivative pair, which halts the
    /// iteration and surfaces as `converged = false` (see
    /// [`monotonic_max_angle`](Self::monotonic_max_angle) for the bound).
    /// The returned angle is the last iterate; callers must check the flag
    /// before using it.
    pub fn undistort_angle_ext(
        &self,
        theta_d: R,
        max_theta: R,
        criteria: impl Into<Option<UndistortConfig>>,
    ) -> (R, bool) {
        let criteria = criteria.into().unwrap_or_default();
        let residual_and_slope = |theta: R| {
            if theta > max_theta {
                return (R::zero(), R::zero());
            }
            (
                self.distort_angle(theta) - theta_d,
                self.distort_angle_derivative(theta),
            )
        };
        newton_raphson(
            residual_and_slope,
            theta_d,
            convert(criteria.eps),
            criteria.max_iters,
        )
    }

    /// Largest angle up to which the distortion is strictly increasing and
    /// therefore invertible.
    ///
    /// Returns the largest representable value of `R` when the distortion is
    /// monotonic everywhere. Real-lens coefficients can make the polynomial
    /// fold back beyond some angle; inversion and the validity checks of the
    /// distorted projection must not be trusted past this bound.
    pub fn monotonic_max_angle(&self) -> R {
        self.monotonic_max_angle_ext(convert(DEFAULT_MAX_ANGLE_GUESS))
    }

    /// Same as [`monotonic_max_angle`](Self::monotonic_max_angle) with an
    /// explicit scale guess (in radians) for the root search.
    pub fn monotonic_max_angle_ext(&self, guess: R) -> R {
        // The bound is the minimal positive root of
        //   f'(theta) = 1 + 3*k1*theta^2 + 5*k2*theta^4 + 7*k3*theta^6 + 9*k4*theta^8.
        // Substituting x = theta^2 reduces this to a quartic in x.
        match poly_smallest_positive_root(self.derivative_coeffs(), guess * guess, ROOT_ITERS) {
            Some(x) => x.sqrt(),
            None => max_bound(),
        }
    }

    fn derivative_coeffs(&self) -> [R; 5] {
        [
            R::one(),
            convert::<f64, R>(3.0) * self.k1(),
            convert::<f64, R>(5.0) * self.k2(),
            convert::<f64, R>(7.0) * self.k3(),
            convert::<f64, R>(9.0) * self.k4(),
        ]
    }
}

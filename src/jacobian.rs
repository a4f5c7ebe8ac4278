//! Analytic derivatives of the undistorted projection.
//!
//! Only the ideal equidistant mapping is differentiated here; a Jacobian of
//! the distorted projection is deliberately not provided. Callers needing
//! one can compose
//! [`FisheyeDistortion::distort_angle_derivative`](crate::FisheyeDistortion::distort_angle_derivative)
//! externally.
//!
//! The projection factors into three stages: depth normalization
//! `p -> (x/z, y/z)`, the radial remap `uv = s(r) * xy` with
//! `s(r) = atan(r)/r`, and the affine pixel mapping. The derivatives chain
//! through these stages in closed form; no automatic differentiation is
//! involved, so the same code is usable where autodiff machinery is not.

use nalgebra::{convert, Matrix2, Matrix2x3, Matrix3, RealField, Vector2, Vector3};

use crate::math::stable_norm2;
use crate::{RosFisheyeIntrinsics, DEFAULT_MIN_2D_NORM};

impl<R: RealField + Copy> RosFisheyeIntrinsics<R> {
    /// Jacobian `d(pixel)/d(camera_point)` of
    /// [`project_point`](Self::project_point).
    ///
    /// At the image center the radial remap reduces to the identity and the
    /// Jacobian is the pinhole one.
    pub fn project_jacobian(&self, camera_point: &Vector3<R>) -> Matrix2x3<R> {
        let invz = R::one() / camera_point.z;
        let xy = camera_point.xy() * invz;
        let r = stable_norm2(xy.x, xy.y);

        let j_uv_xy = if r < convert(DEFAULT_MIN_2D_NORM) {
            // Distortion-free limit at the image center.
            Matrix2::identity()
        } else {
            let invr = R::one() / r;
            let theta = r.atan();
            let s = theta * invr;
            let j_theta_r = R::one() / (R::one() + r * r);
            let j_s_xy = xy * ((j_theta_r - s) * invr * invr);
            Matrix2::identity() * s + j_s_xy * xy.transpose()
        };

        let j_im_xy = Matrix2::new(
            self.fx() * j_uv_xy[(0, 0)],
            self.fx() * j_uv_xy[(0, 1)],
            self.fy() * j_uv_xy[(1, 0)],
            self.fy() * j_uv_xy[(1, 1)],
        );
        let j_xy_cam = Matrix2x3::new(
            invz,
            R::zero(),
            -xy.x * invz,
            R::zero(),
            invz,
            -xy.y * invz,
        );
        j_im_xy * j_xy_cam
    }

    /// Hessians `d²(pixel)/d(camera_point)²` of
    /// [`project_point`](Self::project_point), one symmetric 3×3 matrix per
    /// pixel dimension.
    ///
    /// Assembles the result from the scalar radial derivatives `s`, `ds/dr`
    /// and `d²s/dr²` in closed form. This is the production path;
    /// [`project_hessian_direct`](Self::project_hessian_direct) computes the
    /// same matrices by an independent derivation and serves as its
    /// cross-check.
    pub fn project_hessian(&self, camera_point: &Vector3<R>) -> [Matrix3<R>; 2] {
        let two: R = convert(2.0);
        let invz = R::one() / camera_point.z;
        let x = camera_point.x * invz;
        let y = camera_point.y * invz;
        let r2 = x * x + y * y;
        let r = stable_norm2(x, y);
        let invr = if r > R::zero() { R::one() / r } else { R::zero() };
        let central = r < convert(DEFAULT_MIN_2D_NORM);

        // s(r) = atan(r)/r and its first two radial derivatives. All three
        // vanish into the identity limit at the center, where uv is locally
        // linear in xy.
        let (s, s1, s2) = if central {
            (R::one(), R::zero(), R::zero())
        } else {
            let theta = r.atan();
            let j_theta_r = R::one() / (R::one() + r2);
            let s = theta * invr;
            let s1 = (j_theta_r - s) * invr;
            let d_j_theta_r = -two * r * j_theta_r * j_theta_r;
            let s2 = (d_j_theta_r - s1 - (j_theta_r - s) * invr) * invr;
            (s, s1, s2)
        };

        // Gradient and Hessian of s as a function of the normalized point.
        let (j_s, h_s) = if central {
            (Vector2::zeros(), Matrix2::zeros())
        } else {
            let invr2 = invr * invr;
            let c1 = s2 * invr2;
            let c2 = s1 * invr;
            let j_s = Vector2::new(x, y) * (s1 * invr);
            let off_diag = c1 * x * y - c2 * x * y * invr2;
            let h_s = Matrix2::new(
                c1 * x * x + c2 * (R::one() - x * x * invr2),
                off_diag,
                off_diag,
                c1 * y * y + c2 * (R::one() - y * y * invr2),
            );
            (j_s, h_s)
        };

        // First and second derivatives of the depth normalization
        // p -> (x/z, y/z). The curvature is nonzero only where an axis
        // mixes with depth.
        let invz2 = invz * invz;
        let j_xy = Matrix2x3::new(
            invz,
            R::zero(),
            -x * invz,
            R::zero(),
            invz,
            -y * invz,
        );
        let mut h_xy = [Matrix3::zeros(), Matrix3::zeros()];
        h_xy[0][(0, 2)] = -invz2;
        h_xy[0][(2, 0)] = -invz2;
        h_xy[0][(2, 2)] = two * x * invz2;
        h_xy[1][(1, 2)] = -invz2;
        h_xy[1][(2, 1)] = -invz2;
        h_xy[1][(2, 2)] = two * y * invz2;

        // Jacobian and Hessians of the radial remap uv = s(xy) * xy.
        let j_uv = Matrix2::new(s + x * j_s.x, x * j_s.y, y * j_s.x, s + y * j_s.y);
        let xy = [x, y];
        let mut h_uv = [Matrix2::zeros(), Matrix2::zeros()];
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    let mut v = xy[i] * h_s[(j, k)];
                    if i == j {
                        v += j_s[k];
                    }
                    if i == k {
                        v += j_s[j];
                    }
                    h_uv[i][(j, k)] = v;
                }
            }
        }

        let focal = [self.fx(), self.fy()];
        let mut hess = [Matrix3::zeros(), Matrix3::zeros()];
        for i in 0..2 {
            let mut h = Matrix3::zeros();
            // Second-order chain term through the normalization Jacobian.
            for j in 0..2 {
                for k in 0..2 {
                    h += j_xy.row(j).transpose() * j_xy.row(k) * h_uv[i][(j, k)];
                }
            }
            // First-order remap term against the normalization curvature.
            for j in 0..2 {
                h += h_xy[j] * j_uv[(i, j)];
            }
            hess[i] = h * focal[i];
        }
        hess
    }

    /// Reference Hessian computation differentiating the Jacobian expression
    /// of [`project_jacobian`](Self::project_jacobian) a second time through
    /// each stage.
    ///
    /// Slower than [`project_hessian`](Self::project_hessian) but derived
    /// independently; the test suite checks both against each other.
    pub fn project_hessian_direct(&self, camera_point: &Vector3<R>) -> [Matrix3<R>; 2] {
        let two: R = convert(2.0);
        let three: R = convert(3.0);
        let invz = R::one() / camera_point.z;
        let xy = camera_point.xy() * invz;
        let r = stable_norm2(xy.x, xy.y);

        // The remap Jacobian and its derivatives with respect to the
        // normalized coordinates.
        let (j_uv_xy, d_j_uv_dx, d_j_uv_dy) = if r < convert(DEFAULT_MIN_2D_NORM) {
            (Matrix2::identity(), Matrix2::zeros(), Matrix2::zeros())
        } else {
            let invr = R::one() / r;
            let invr2 = invr * invr;
            let theta = r.atan();
            let s = theta * invr;
            let j_theta_r = R::one() / (R::one() + r * r);
            let tmp = (j_theta_r - s) * invr2;
            let xy_outer = xy * xy.transpose();
            let j_uv_xy = Matrix2::identity() * s + xy_outer * tmp;

            let d_r_d_xy = xy * invr;
            let d_s_d_r = (j_theta_r - s) * invr;
            let d_tmp_d_r = invr2 * (-two * j_theta_r * j_theta_r * r - three * d_s_d_r);
            let d_s_d_xy = d_r_d_xy * d_s_d_r;
            let d_tmp_d_xy = d_r_d_xy * d_tmp_d_r;
            let d_outer_dx = Matrix2::new(two * xy.x, xy.y, xy.y, R::zero());
            let d_outer_dy = Matrix2::new(R::zero(), xy.x, xy.x, two * xy.y);

            (
                j_uv_xy,
                Matrix2::identity() * d_s_d_xy.x + xy_outer * d_tmp_d_xy.x + d_outer_dx * tmp,
                Matrix2::identity() * d_s_d_xy.y + xy_outer * d_tmp_d_xy.y + d_outer_dy * tmp,
            )
        };

        let focal = Matrix2::new(self.fx(), R::zero(), R::zero(), self.fy());
        let j_im_xy = focal * j_uv_xy;
        let j_xy_cam = Matrix2x3::new(
            invz,
            R::zero(),
            -xy.x * invz,
            R::zero(),
            invz,
            -xy.y * invz,
        );
        let invz2 = invz * invz;
        // Derivatives of the normalization Jacobian itself, per camera axis.
        let d_jxy = [
            Matrix2x3::new(
                R::zero(),
                R::zero(),
                -invz2,
                R::zero(),
                R::zero(),
                R::zero(),
            ),
            Matrix2x3::new(
                R::zero(),
                R::zero(),
                R::zero(),
                R::zero(),
                R::zero(),
                -invz2,
            ),
            Matrix2x3::new(
                -invz2,
                R::zero(),
                two * xy.x * invz2,
                R::zero(),
                -invz2,
                two * xy.y * invz2,
            ),
        ];

        let mut hess = [Matrix3::zeros(), Matrix3::zeros()];
        for a in 0..3 {
            // d(J)/d(p_a) by the product rule; the remap derivative chains
            // through the normalized coordinates.
            let d_j_uv = d_j_uv_dx * j_xy_cam[(0, a)] + d_j_uv_dy * j_xy_cam[(1, a)];
            let d_j = focal * d_j_uv * j_xy_cam + j_im_xy * d_jxy[a];
            for b in 0..3 {
                hess[0][(a, b)] = d_j[(0, b)];
                hess[1][(a, b)] = d_j[(1, b)];
            }
        }
        hess
    }
}

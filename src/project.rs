//! Per-point projection and unprojection.
//!
//! Every function here operates on a single point and is a pure function of
//! its arguments; looping over many points is the caller's responsibility
//! (see the batch methods in the crate root).

use nalgebra::{convert, RealField, Vector2, Vector3};

use crate::distortion::UndistortConfig;
use crate::math::stable_norm2;
use crate::{RosFisheyeIntrinsics, DEFAULT_MIN_2D_NORM};

impl<R: RealField + Copy> RosFisheyeIntrinsics<R> {
    /// Project a 3D point in camera coordinates to undistorted pixel
    /// coordinates with the ideal equidistant mapping.
    ///
    /// The point must have nonzero depth (a division by `z` occurs); points
    /// on the optical axis map exactly to the principal point. Behavior for
    /// points behind the camera is undefined.
    pub fn project_point(&self, camera_point: &Vector3<R>) -> Vector2<R> {
        let xy = camera_point.xy() / camera_point.z;
        let r = stable_norm2(xy.x, xy.y);
        let uv = if r < convert(DEFAULT_MIN_2D_NORM) {
            // At the image center the equidistant model degenerates to the
            // pinhole model.
            xy
        } else {
            xy * (r.atan() / r)
        };
        self.uv_to_pixel(&uv)
    }

    /// Project a 3D point in camera coordinates to distorted pixel
    /// coordinates.
    ///
    /// `max_theta` bounds the incidence angle; pass the value of
    /// [`FisheyeDistortion::monotonic_max_angle`](crate::FisheyeDistortion::monotonic_max_angle).
    /// Angles beyond the bound produce a zeroed point with a false validity
    /// flag, since such projections cannot be inverted later.
    pub fn project_point_distorted(
        &self,
        camera_point: &Vector3<R>,
        max_theta: R,
    ) -> (Vector2<R>, bool) {
        let xy = camera_point.xy() / camera_point.z;
        let r = stable_norm2(xy.x, xy.y);
        let uv = if r < convert(DEFAULT_MIN_2D_NORM) {
            xy
        } else {
            let theta = r.atan();
            if theta > max_theta {
                return (Vector2::zeros(), false);
            }
            xy * (self.distortion.distort_angle(theta) / r)
        };
        (self.uv_to_pixel(&uv), true)
    }

    /// Unproject an undistorted pixel to a ray direction in camera
    /// coordinates.
    ///
    /// The direction is unit-norm by construction (it is not renormalized).
    /// The principal point unprojects exactly to the forward direction
    /// `(0, 0, 1)`.
    pub fn unproject_pixel(&self, image_point: &Vector2<R>) -> Vector3<R> {
        let uv = self.pixel_to_uv(image_point);
        // For ideal equidistant pixels the normalized magnitude is the
        // incidence angle itself.
        let theta = uv.norm();
        if theta < convert(DEFAULT_MIN_2D_NORM) {
            return Vector3::new(R::zero(), R::zero(), R::one());
        }
        let scale = theta.sin() / theta;
        Vector3::new(scale * uv.x, scale * uv.y, theta.cos())
    }

    /// Unproject a distorted pixel to a ray direction in camera coordinates.
    ///
    /// Calls
    /// [`unproject_pixel_distorted_ext`](Self::unproject_pixel_distorted_ext)
    /// with default termination settings.
    pub fn unproject_pixel_distorted(
        &self,
        image_point: &Vector2<R>,
        max_theta: R,
    ) -> (Vector3<R>, bool) {
        self.unproject_pixel_distorted_ext(image_point, max_theta, None)
    }

    /// Unproject a distorted pixel with explicit termination settings.
    ///
    /// The normalized pixel magnitude is the distorted angle `theta_d`; the
    /// Newton inversion recovers `theta`, and its convergence flag becomes
    /// the validity flag (false yields a zeroed direction). The in-plane
    /// scale divides by `theta_d`, since that is the magnitude the
    /// normalized coordinates actually carry, while the trigonometric terms
    /// use the recovered `theta`.
    pub fn unproject_pixel_distorted_ext(
        &self,
        image_point: &Vector2<R>,
        max_theta: R,
        criteria: impl Into<Option<UndistortConfig>>,
    ) -> (Vector3<R>, bool) {
        let uv = self.pixel_to_uv(image_point);
        let theta_d = uv.norm();
        if theta_d < convert(DEFAULT_MIN_2D_NORM) {
            return (Vector3::new(R::zero(), R::zero(), R::one()), true);
        }
        let (theta, converged) = self
            .distortion
            .undistort_angle_ext(theta_d, max_theta, criteria);
        if !converged {
            return (Vector3::zeros(), false);
        }
        let scale = theta.sin() / theta_d;
        (Vector3::new(scale * uv.x, scale * uv.y, theta.cos()), true)
    }

    /// Apply the focal length and principal point to normalized coordinates.
    #[inline]
    pub(crate) fn uv_to_pixel(&self, uv: &Vector2<R>) -> Vector2<R> {
        Vector2::new(self.fx() * uv.x + self.cx(), self.fy() * uv.y + self.cy())
    }

    /// Strip the focal length and principal point from pixel coordinates.
    #[inline]
    pub(crate) fn pixel_to_uv(&self, pixel: &Vector2<R>) -> Vector2<R> {
        Vector2::new(
            (pixel.x - self.cx()) / self.fx(),
            (pixel.y - self.cy()) / self.fy(),
        )
    }
}

//! Geometric models of OpenCV/ROS fisheye cameras for photogrammetry
//!
//! # About
//!
//! This crate provides a geometric model of a fisheye (equidistant) camera
//! compatible with OpenCV's `fisheye` module and with calibrations using the
//! ROS `equidistant` distortion model. The crate is in pure Rust, can be
//! compiled in `no_std` mode, implements the
//! [`IntrinsicParameters`](https://docs.rs/cam-geom/latest/cam_geom/trait.IntrinsicParameters.html)
//! trait from the [`cam-geom`](https://crates.io/crates/cam-geom) crate and
//! provides support to read and write camera models in the ROS YAML format.
//!
//! In greater detail:
//!
//! - Implements the equidistant projection (image radius proportional to the
//!   incidence angle rather than its tangent) with the four-term
//!   odd-polynomial radial distortion `(k1, k2, k3, k4)` used by
//!   `cv::fisheye` and written by the ROS
//!   [`camera_calibration`](http://wiki.ros.org/camera_calibration) package
//!   for fisheye lenses. Despite this compatibility, does not depend on ROS
//!   or OpenCV.
//! - Provides the analytic first and second derivatives of the projection
//!   with respect to the 3D point
//!   ([`project_jacobian`](RosFisheyeIntrinsics::project_jacobian),
//!   [`project_hessian`](RosFisheyeIntrinsics::project_hessian)) for
//!   gradient-based optimization such as bundle adjustment. The derivatives
//!   are closed forms; no automatic differentiation is involved.
//! - The per-point operations are pure, allocation-free functions over plain
//!   value types with fixed iteration budgets, so the same code is usable
//!   from batch callers or ported to massively parallel ones.
//! - Distortion inversion and the distorted mappings report failure through
//!   convergence/validity flags rather than errors; invalid results carry a
//!   zeroed payload.
//! - When compiled with the `serde-serialize` feature, read camera
//!   calibrations saved by ROS in `~/.ros/camera_info/camera_name.yaml` with
//!   [`from_ros_yaml`](fn.from_ros_yaml.html), and read and write the model
//!   types using serde.
//!
//! # Example
//!
//! ```
//! use nalgebra::{Vector3, Vector4};
//! use ros_fisheye_camera::{FisheyeDistortion, RosFisheyeIntrinsics};
//!
//! let distortion =
//!     FisheyeDistortion::from_opencv_vec(Vector4::<f64>::new(-0.01, 0.003, -0.002, 0.0005));
//! let cam = RosFisheyeIntrinsics::from_params_with_distortion(
//!     400.0, 400.0, 320.0, 240.0, distortion,
//! );
//!
//! // The distortion is invertible up to this incidence angle.
//! let max_theta = cam.distortion.monotonic_max_angle();
//!
//! let point = Vector3::new(0.2, -0.1, 1.0);
//! let (pixel, valid) = cam.project_point_distorted(&point, max_theta);
//! assert!(valid);
//!
//! let (ray, valid) = cam.unproject_pixel_distorted(&pixel, max_theta);
//! assert!(valid);
//! let expected = point / point.norm();
//! assert!((ray - expected).norm() < 1e-4);
//! ```
//!
//! # testing
//!
//! Test `no_std` compilation with:
//!
//! ```text
//! # install target with: "rustup target add thumbv7em-none-eabihf"
//! cargo check --no-default-features --target thumbv7em-none-eabihf
//! ```
//!
//! Run unit tests with:
//!
//! ```text
//! cargo test
//! cargo test --features serde-serialize
//! ```
//!
//! serde support requires std.

#![deny(rust_2018_idioms, unsafe_code, missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate core as std;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

use nalgebra::{
    allocator::Allocator,
    base::storage::{Owned, Storage},
    convert, one, zero, DefaultAllocator, Dim, OMatrix, RealField, SMatrix, Vector2, Vector3, U1,
    U2, U3,
};

use cam_geom::{
    coordinate_system::CameraFrame, ray_bundle_types::SharedOriginRayBundle, Bundle,
    IntrinsicParameters, Pixels, Points, RayBundle,
};

mod distortion;
mod jacobian;
pub mod math;
mod project;
pub mod solve;

pub use distortion::{FisheyeDistortion, UndistortConfig};

#[cfg(feature = "std")]
mod ros_file_support;
#[cfg(feature = "std")]
pub use ros_file_support::{NamedIntrinsicParameters, RosCameraInfo, RosMatrix};

#[cfg(feature = "serde-serialize")]
pub use ros_file_support::from_ros_yaml;

/// Default threshold below which a normalized 2D radius is treated as being
/// exactly at the image center.
///
/// Below this radius the radial remap would divide zero by zero; the model
/// degenerates to the pinhole model there instead.
pub const DEFAULT_MIN_2D_NORM: f64 = 1e-6;

/// Possible errors.
#[derive(Debug)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[non_exhaustive]
pub enum Error {
    #[cfg_attr(feature = "std", error("invalid input"))]
    /// invalid input
    InvalidInput,
    #[cfg_attr(feature = "std", error("error parsing YAML"))]
    /// error parsing YAML
    YamlParseError,
    #[cfg_attr(feature = "std", error("unknown distortion model"))]
    /// unknown distortion model
    UnknownDistortionModel,
    #[cfg_attr(feature = "std", error("bad matrix size"))]
    /// bad matrix size
    BadMatrixSize,
}

#[cfg(feature = "serde-serialize")]
impl std::convert::From<serde_yaml::Error> for Error {
    #[inline]
    fn from(_orig: serde_yaml::Error) -> Self {
        Error::YamlParseError
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// A fisheye (equidistant) camera model with radial distortion compatible
/// with OpenCV and ROS.
///
/// The projection maps the image radius proportionally to the incidence
/// angle `theta` (`pixel_radius ≈ f·theta`) rather than to its tangent, then
/// warps `theta` by the odd-polynomial radial distortion of
/// [`FisheyeDistortion`]. This matches the `cv::fisheye` camera model and
/// ROS calibrations whose `distortion_model` is `equidistant`. To load from
/// a ROS YAML file, see the [`from_ros_yaml`](fn.from_ros_yaml.html)
/// function.
///
/// To convert from a
/// [`NamedIntrinsicParameters`](struct.NamedIntrinsicParameters.html) struct,
/// use its
/// [`intrinsics`](struct.NamedIntrinsicParameters.html#structfield.intrinsics)
/// field.
///
/// See the [module-level documentation for more information](index.html).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct RosFisheyeIntrinsics<R: RealField> {
    /// The intrinsic parameter matrix `K` (zero skew).
    pub k: SMatrix<R, 3, 3>,
    /// The radial distortion terms warping the incidence angle.
    pub distortion: FisheyeDistortion<R>,
}

/// Undistorted 2D pixel locations
///
/// This type represents pixel coordinates of the ideal equidistant mapping,
/// before the angular distortion of [`FisheyeDistortion`] is applied (or
/// after it has been removed).
///
/// This is a newtype wrapping an `nalgebra::Matrix`.
pub struct UndistortedPixels<R: RealField, NPTS: Dim, STORAGE> {
    /// The undistorted pixel coordinates.
    pub data: nalgebra::Matrix<R, NPTS, U2, STORAGE>,
}

impl<R: RealField + Copy> RosFisheyeIntrinsics<R> {
    /// Construct intrinsics from a camera matrix and distortion terms.
    ///
    /// Returns `Err(Error::InvalidInput)` if `k` carries nonzero skew; the
    /// equidistant model here has no skew term.
    pub fn from_components(k: SMatrix<R, 3, 3>, distortion: FisheyeDistortion<R>) -> Result<Self> {
        if k[(0, 1)] != zero() {
            return Err(Error::InvalidInput);
        }
        Ok(Self { k, distortion })
    }

    /// Construct intrinsics from individual parameters with no distortion.
    ///
    /// `fx` and `fy` are the horizontal and vertical focal lengths. `cx` and
    /// `cy` is the center of the optical axis in pixel coordinates.
    #[inline]
    pub fn from_params(fx: R, fy: R, cx: R, cy: R) -> Self {
        Self::from_params_with_distortion(fx, fy, cx, cy, FisheyeDistortion::zero())
    }

    /// Construct intrinsics from individual parameters.
    ///
    /// `fx` and `fy` are the horizontal and vertical focal lengths; they are
    /// expected to be nonzero (not validated here). `cx` and `cy` is the
    /// center of the optical axis in pixel coordinates. `distortion` holds
    /// the radial terms.
    pub fn from_params_with_distortion(
        fx: R,
        fy: R,
        cx: R,
        cy: R,
        distortion: FisheyeDistortion<R>,
    ) -> Self {
        let zero: R = zero();
        let one: R = one();
        let k = SMatrix::<R, 3, 3>::new(fx, zero, cx, zero, fy, cy, zero, zero, one);
        Self { k, distortion }
    }

    /// Horizontal focal length in pixels.
    #[inline]
    pub fn fx(&self) -> R {
        self.k[(0, 0)]
    }

    /// Vertical focal length in pixels.
    #[inline]
    pub fn fy(&self) -> R {
        self.k[(1, 1)]
    }

    /// Horizontal principal point coordinate in pixels.
    #[inline]
    pub fn cx(&self) -> R {
        self.k[(0, 2)]
    }

    /// Vertical principal point coordinate in pixels.
    #[inline]
    pub fn cy(&self) -> R {
        self.k[(1, 2)]
    }

    /// Focal length as an `(fx, fy)` pair.
    #[inline]
    pub fn focal_length(&self) -> Vector2<R> {
        Vector2::new(self.fx(), self.fy())
    }

    /// Principal point as a `(cx, cy)` pair.
    #[inline]
    pub fn principal_point(&self) -> Vector2<R> {
        Vector2::new(self.cx(), self.cy())
    }

    /// Convert undistorted pixel coordinates to distorted pixel coordinates.
    ///
    /// This will take coordinates of the ideal equidistant mapping and warp
    /// them into their distorted counterparts. This distortion thus models
    /// the action of a real lens.
    pub fn distort<NPTS, IN>(
        &self,
        undistorted: &UndistortedPixels<R, NPTS, IN>,
    ) -> Pixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U2>,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        let mut result = Pixels::new(OMatrix::zeros_generic(
            NPTS::from_usize(undistorted.data.nrows()),
            U2::from_usize(2),
        ));

        let min_2d_norm: R = convert(DEFAULT_MIN_2D_NORM);
        for i in 0..undistorted.data.nrows() {
            let pixel = Vector2::new(undistorted.data[(i, 0)], undistorted.data[(i, 1)]);
            let uv = self.pixel_to_uv(&pixel);
            // For ideal equidistant pixels the normalized magnitude is the
            // incidence angle itself.
            let theta = uv.norm();
            let warped = if theta < min_2d_norm {
                uv
            } else {
                uv * (self.distortion.distort_angle(theta) / theta)
            };
            let out = self.uv_to_pixel(&warped);
            result.data[(i, 0)] = out.x;
            result.data[(i, 1)] = out.y;
        }
        result
    }

    /// Convert distorted pixel coordinates to undistorted pixel coordinates.
    ///
    /// This will take distorted coordinates from, e.g. detections from a
    /// real camera image, and undo the effect of the distortion model.
    ///
    /// This method calls [undistort_ext](Self::undistort_ext) using the
    /// default termination criteria.
    pub fn undistort<NPTS, IN>(
        &self,
        distorted: &Pixels<R, NPTS, IN>,
    ) -> UndistortedPixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U2>,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        self.undistort_ext(distorted, None)
    }

    /// Convert distorted pixel coordinates to undistorted pixel coordinates.
    ///
    /// Inverts the angular distortion per pixel with a fixed-budget Newton
    /// solve bounded by the monotonic domain of the distortion polynomial.
    /// Each output row is the solver's best estimate; use
    /// [`unproject_pixel_distorted`](Self::unproject_pixel_distorted) when a
    /// per-point validity flag is required.
    pub fn undistort_ext<NPTS, IN>(
        &self,
        distorted: &Pixels<R, NPTS, IN>,
        criteria: impl Into<Option<UndistortConfig>>,
    ) -> UndistortedPixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U2>,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        let criteria = criteria.into().unwrap_or_default();
        let max_theta = self.distortion.monotonic_max_angle();
        let min_2d_norm: R = convert(DEFAULT_MIN_2D_NORM);

        let mut result = UndistortedPixels {
            data: OMatrix::zeros_generic(
                NPTS::from_usize(distorted.data.nrows()),
                U2::from_usize(2),
            ),
        };

        for i in 0..distorted.data.nrows() {
            let pixel = Vector2::new(distorted.data[(i, 0)], distorted.data[(i, 1)]);
            let uv = self.pixel_to_uv(&pixel);
            let theta_d = uv.norm();
            let out = if theta_d < min_2d_norm {
                pixel
            } else {
                let (theta, _converged) =
                    self.distortion
                        .undistort_angle_ext(theta_d, max_theta, criteria);
                self.uv_to_pixel(&(uv * (theta / theta_d)))
            };
            result.data[(i, 0)] = out.x;
            result.data[(i, 1)] = out.y;
        }
        result
    }

    /// Convert 3D coordinates in `CameraFrame` to undistorted pixel coords.
    pub fn camera_to_undistorted_pixel<IN, NPTS>(
        &self,
        camera: &Points<CameraFrame, R, NPTS, IN>,
    ) -> UndistortedPixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        IN: Storage<R, NPTS, U3>,
        NPTS: Dim,
        DefaultAllocator: Allocator<NPTS, U2>,
        DefaultAllocator: Allocator<U1, U2>,
    {
        let mut result = UndistortedPixels {
            data: OMatrix::zeros_generic(NPTS::from_usize(camera.data.nrows()), U2::from_usize(2)),
        };

        for i in 0..camera.data.nrows() {
            let point = Vector3::new(
                camera.data[(i, 0)],
                camera.data[(i, 1)],
                camera.data[(i, 2)],
            );
            let pixel = self.project_point(&point);
            result.data[(i, 0)] = pixel.x;
            result.data[(i, 1)] = pixel.y;
        }
        result
    }

    /// Convert undistorted pixel coordinates to 3D rays in the `CameraFrame`.
    pub fn undistorted_pixel_to_camera<IN, NPTS>(
        &self,
        undistorteds: &UndistortedPixels<R, NPTS, IN>,
    ) -> RayBundle<CameraFrame, SharedOriginRayBundle<R>, R, NPTS, Owned<R, NPTS, U3>>
    where
        IN: Storage<R, NPTS, U2>,
        NPTS: Dim,
        DefaultAllocator: Allocator<NPTS, U3>,
        DefaultAllocator: Allocator<U1, U2>,
    {
        let mut result = RayBundle::new_shared_zero_origin(OMatrix::zeros_generic(
            NPTS::from_usize(undistorteds.data.nrows()),
            U3::from_usize(3),
        ));

        for i in 0..undistorteds.data.nrows() {
            let pixel = Vector2::new(undistorteds.data[(i, 0)], undistorteds.data[(i, 1)]);
            let dir = self.unproject_pixel(&pixel);
            result.data[(i, 0)] = dir.x;
            result.data[(i, 1)] = dir.y;
            result.data[(i, 2)] = dir.z;
        }
        result
    }
}

impl<R: RealField + Copy> IntrinsicParameters<R> for RosFisheyeIntrinsics<R> {
    type BundleType = SharedOriginRayBundle<R>;

    fn pixel_to_camera<IN, NPTS>(
        &self,
        pixels: &Pixels<R, NPTS, IN>,
    ) -> RayBundle<CameraFrame, Self::BundleType, R, NPTS, Owned<R, NPTS, U3>>
    where
        Self::BundleType: Bundle<R>,
        IN: Storage<R, NPTS, U2>,
        NPTS: Dim,
        DefaultAllocator: Allocator<NPTS, U2>,
        DefaultAllocator: Allocator<NPTS, U3>,
        DefaultAllocator: Allocator<U1, U2>,
    {
        let max_theta = self.distortion.monotonic_max_angle();
        let mut result = RayBundle::new_shared_zero_origin(OMatrix::zeros_generic(
            NPTS::from_usize(pixels.data.nrows()),
            U3::from_usize(3),
        ));

        for i in 0..pixels.data.nrows() {
            let pixel = Vector2::new(pixels.data[(i, 0)], pixels.data[(i, 1)]);
            let (dir, valid) = self.unproject_pixel_distorted(&pixel, max_theta);
            // Invalid pixels keep their zeroed rows.
            if valid {
                result.data[(i, 0)] = dir.x;
                result.data[(i, 1)] = dir.y;
                result.data[(i, 2)] = dir.z;
            }
        }
        result
    }

    fn camera_to_pixel<IN, NPTS>(
        &self,
        camera: &Points<CameraFrame, R, NPTS, IN>,
    ) -> Pixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        IN: Storage<R, NPTS, U3>,
        NPTS: Dim,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        let max_theta = self.distortion.monotonic_max_angle();
        let mut result = Pixels::new(OMatrix::zeros_generic(
            NPTS::from_usize(camera.data.nrows()),
            U2::from_usize(2),
        ));

        for i in 0..camera.data.nrows() {
            let point = Vector3::new(
                camera.data[(i, 0)],
                camera.data[(i, 1)],
                camera.data[(i, 2)],
            );
            let (pixel, valid) = self.project_point_distorted(&point, max_theta);
            // Points beyond the monotonic bound keep their zeroed rows.
            if valid {
                result.data[(i, 0)] = pixel.x;
                result.data[(i, 1)] = pixel.y;
            }
        }
        result
    }
}

/// Extension trait to add `world_to_undistorted_pixel()` method.
pub trait CameraExt<R: RealField> {
    /// Convert 3D coordinates in the `WorldFrame` to undistorted pixel coordinates.
    fn world_to_undistorted_pixel<NPTS, InStorage>(
        &self,
        world: &Points<cam_geom::WorldFrame, R, NPTS, InStorage>,
    ) -> UndistortedPixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        NPTS: Dim,
        InStorage: Storage<R, NPTS, U3>,
        DefaultAllocator: Allocator<NPTS, U3>,
        DefaultAllocator: Allocator<NPTS, U2>;
}

impl<R: RealField + Copy> CameraExt<R> for cam_geom::Camera<R, RosFisheyeIntrinsics<R>> {
    fn world_to_undistorted_pixel<NPTS, InStorage>(
        &self,
        world: &Points<cam_geom::WorldFrame, R, NPTS, InStorage>,
    ) -> UndistortedPixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        NPTS: Dim,
        InStorage: Storage<R, NPTS, U3>,
        DefaultAllocator: Allocator<NPTS, U3>,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        let camera_frame = self.extrinsics().world_to_camera(world);
        self.intrinsics().camera_to_undistorted_pixel(&camera_frame)
    }
}

#[cfg(feature = "serde-serialize")]
fn _test_intrinsics_is_serialize() {
    // Compile-time test to ensure RosFisheyeIntrinsics implements Serialize trait.
    fn implements<T: serde::Serialize>() {}
    implements::<RosFisheyeIntrinsics<f64>>();
}

#[cfg(feature = "serde-serialize")]
fn _test_intrinsics_is_deserialize() {
    // Compile-time test to ensure RosFisheyeIntrinsics implements Deserialize trait.
    fn implements<'de, T: serde::Deserialize<'de>>() {}
    implements::<RosFisheyeIntrinsics<f64>>();
}

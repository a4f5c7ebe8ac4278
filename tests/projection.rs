use approx::assert_relative_eq;
use nalgebra::{SMatrix, Vector2, Vector3, Vector4};

use cam_geom::{IntrinsicParameters, Pixels, Points};
use ros_fisheye_camera::{FisheyeDistortion, RosFisheyeIntrinsics, UndistortedPixels};

/// A camera whose distortion polynomial is monotonic everywhere.
fn sample_camera() -> RosFisheyeIntrinsics<f64> {
    RosFisheyeIntrinsics::from_params_with_distortion(
        460.0,
        460.0,
        320.0,
        240.0,
        FisheyeDistortion::from_opencv_vec(Vector4::new(-0.01, 0.05, -0.08, 0.04)),
    )
}

/// A camera whose distortion folds back beyond a finite angle.
fn bounded_camera() -> RosFisheyeIntrinsics<f64> {
    RosFisheyeIntrinsics::from_params_with_distortion(
        460.0,
        460.0,
        320.0,
        240.0,
        FisheyeDistortion::from_opencv_vec(Vector4::new(-0.2, 0.0, 0.0, 0.0)),
    )
}

fn sample_points() -> Vec<Vector3<f64>> {
    vec![
        Vector3::new(0.3, -0.2, 1.2),
        Vector3::new(1.0, 0.8, 0.9),
        Vector3::new(-1.5, 0.4, 1.0),
        Vector3::new(0.05, 0.02, 2.0),
        Vector3::new(-0.01, -0.7, 0.6),
    ]
}

#[test]
fn undistorted_roundtrip_recovers_ray() {
    let cam = RosFisheyeIntrinsics::from_params(460.0, 455.0, 320.0, 240.0);
    for point in sample_points() {
        let pixel = cam.project_point(&point);
        let ray = cam.unproject_pixel(&pixel);
        let expected = point / point.norm();
        assert_relative_eq!(ray, expected, epsilon = 1e-9);
        // Unit norm by construction.
        assert_relative_eq!(ray.norm(), 1.0, epsilon = 1e-12);
    }
}

#[test]
fn distorted_roundtrip_recovers_ray() {
    let cam = sample_camera();
    let max_theta = cam.distortion.monotonic_max_angle();
    for point in sample_points() {
        let (pixel, valid) = cam.project_point_distorted(&point, max_theta);
        assert!(valid, "projection of {point:?} should be valid");
        let (ray, valid) = cam.unproject_pixel_distorted(&pixel, max_theta);
        assert!(valid, "unprojection of {point:?} should converge");
        let expected = point / point.norm();
        assert_relative_eq!(ray, expected, epsilon = 1e-5);
    }
}

#[test]
fn roundtrip_at_f32() {
    let cam = RosFisheyeIntrinsics::<f32>::from_params_with_distortion(
        460.0,
        460.0,
        320.0,
        240.0,
        FisheyeDistortion::from_opencv_vec(Vector4::new(-0.01, 0.05, -0.08, 0.04)),
    );
    let max_theta = cam.distortion.monotonic_max_angle();
    let point = Vector3::new(0.3f32, -0.2, 1.2);
    let (pixel, valid) = cam.project_point_distorted(&point, max_theta);
    assert!(valid);
    let (ray, valid) = cam.unproject_pixel_distorted(&pixel, max_theta);
    assert!(valid);
    let expected = point / point.norm();
    assert_relative_eq!(ray, expected, epsilon = 1e-3);
}

#[test]
fn center_degeneracy_is_exact() {
    let cam = sample_camera();
    let max_theta = cam.distortion.monotonic_max_angle();
    let on_axis = Vector3::new(0.0, 0.0, 2.0);

    let pixel = cam.project_point(&on_axis);
    assert_eq!(pixel, Vector2::new(320.0, 240.0));

    let (pixel, valid) = cam.project_point_distorted(&on_axis, max_theta);
    assert!(valid);
    assert_eq!(pixel, Vector2::new(320.0, 240.0));

    let ray = cam.unproject_pixel(&Vector2::new(320.0, 240.0));
    assert_eq!(ray, Vector3::new(0.0, 0.0, 1.0));

    let (ray, valid) = cam.unproject_pixel_distorted(&Vector2::new(320.0, 240.0), max_theta);
    assert!(valid);
    assert_eq!(ray, Vector3::new(0.0, 0.0, 1.0));
}

#[test]
fn monotonic_bound_sentinel_for_zero_coefficients() {
    assert_eq!(
        FisheyeDistortion::<f64>::zero().monotonic_max_angle(),
        f64::MAX
    );
    assert_eq!(
        FisheyeDistortion::<f32>::zero().monotonic_max_angle(),
        f32::MAX
    );
}

#[test]
fn monotonic_bound_matches_derivative_root() {
    let dist = bounded_camera().distortion;
    // f'(theta) = 1 - 0.6 theta^2, so the bound is sqrt(1/0.6).
    let expected = (1.0f64 / 0.6).sqrt();
    let bound = dist.monotonic_max_angle();
    assert_relative_eq!(bound, expected, max_relative = 1e-4);
    assert_relative_eq!(dist.distort_angle_derivative(bound), 0.0, epsilon = 1e-3);
}

#[test]
fn project_beyond_bound_is_invalid() {
    let cam = bounded_camera();
    let max_theta = cam.distortion.monotonic_max_angle();
    // theta = atan(4.455) ~ 1.35 exceeds the bound of ~1.29.
    let point = Vector3::new(4.455, 0.0, 1.0);
    let (pixel, valid) = cam.project_point_distorted(&point, max_theta);
    assert!(!valid);
    assert_eq!(pixel, Vector2::zeros());
}

#[test]
fn unproject_beyond_bound_is_invalid() {
    let cam = bounded_camera();
    let max_theta = cam.distortion.monotonic_max_angle();
    // theta_d = 1.0 exceeds the largest distorted angle the monotonic
    // domain can produce (~0.86), so no valid theta exists.
    let pixel = Vector2::new(320.0 + 460.0, 240.0);
    let (ray, valid) = cam.unproject_pixel_distorted(&pixel, max_theta);
    assert!(!valid);
    assert_eq!(ray, Vector3::zeros());
}

#[test]
fn undistort_angle_converges_inside_bound() {
    let dist = bounded_camera().distortion;
    let max_theta = dist.monotonic_max_angle();
    let theta = 0.8;
    let theta_d = dist.distort_angle(theta);
    let (recovered, converged) = dist.undistort_angle(theta_d, max_theta);
    assert!(converged);
    assert_relative_eq!(recovered, theta, epsilon = 1e-5);
}

#[test]
fn zero_distortion_is_identity() {
    let dist = FisheyeDistortion::<f64>::zero();
    assert!(dist.is_linear());
    assert_eq!(dist.distort_angle(0.5), 0.5);
    assert_eq!(dist.distort_angle_derivative(0.5), 1.0);

    let (theta, converged) = dist.undistort_angle(0.5, f64::MAX);
    assert!(converged);
    assert_relative_eq!(theta, 0.5, epsilon = 1e-12);
}

#[test]
fn distort_batch_roundtrip() {
    let cam = sample_camera();
    let undistorted = UndistortedPixels {
        data: SMatrix::<f64, 3, 2>::new(400.0, 300.0, 250.0, 180.0, 320.0, 240.0),
    };
    let distorted = cam.distort(&undistorted);
    let recovered = cam.undistort(&distorted);
    for i in 0..3 {
        assert_relative_eq!(
            recovered.data[(i, 0)],
            undistorted.data[(i, 0)],
            epsilon = 1e-3
        );
        assert_relative_eq!(
            recovered.data[(i, 1)],
            undistorted.data[(i, 1)],
            epsilon = 1e-3
        );
    }
    // The principal-point row is passed through untouched.
    assert_eq!(distorted.data[(2, 0)], 320.0);
    assert_eq!(distorted.data[(2, 1)], 240.0);
}

#[test]
fn batch_matches_per_point() {
    let cam = sample_camera();
    let points = Points::new(SMatrix::<f64, 2, 3>::new(0.3, -0.2, 1.2, 0.1, 0.25, 0.9));
    let pixels = cam.camera_to_undistorted_pixel(&points);
    for i in 0..2 {
        let point = Vector3::new(
            points.data[(i, 0)],
            points.data[(i, 1)],
            points.data[(i, 2)],
        );
        let expected = cam.project_point(&point);
        assert_relative_eq!(pixels.data[(i, 0)], expected.x, epsilon = 1e-12);
        assert_relative_eq!(pixels.data[(i, 1)], expected.y, epsilon = 1e-12);
    }

    let rays = cam.undistorted_pixel_to_camera(&pixels);
    for i in 0..2 {
        let pixel = Vector2::new(pixels.data[(i, 0)], pixels.data[(i, 1)]);
        let expected = cam.unproject_pixel(&pixel);
        assert_relative_eq!(rays.data[(i, 0)], expected.x, epsilon = 1e-12);
        assert_relative_eq!(rays.data[(i, 1)], expected.y, epsilon = 1e-12);
        assert_relative_eq!(rays.data[(i, 2)], expected.z, epsilon = 1e-12);
    }
}

#[test]
fn intrinsic_parameters_trait_zeroes_invalid_rows() {
    let cam = bounded_camera();

    let points = Points::new(SMatrix::<f64, 2, 3>::new(0.1, 0.1, 1.0, 4.455, 0.0, 1.0));
    let pixels = cam.camera_to_pixel(&points);
    assert!(pixels.data[(0, 0)] > 0.0);
    assert_eq!(pixels.data[(1, 0)], 0.0);
    assert_eq!(pixels.data[(1, 1)], 0.0);

    let pixels = Pixels::new(SMatrix::<f64, 2, 2>::new(350.0, 260.0, 780.0, 240.0));
    let rays = cam.pixel_to_camera(&pixels);
    assert!(rays.data[(0, 2)] > 0.0);
    assert_eq!(rays.data[(1, 0)], 0.0);
    assert_eq!(rays.data[(1, 1)], 0.0);
    assert_eq!(rays.data[(1, 2)], 0.0);
}

#[test]
fn skewed_camera_matrix_is_rejected() {
    let mut k = SMatrix::<f64, 3, 3>::identity();
    k[(0, 0)] = 460.0;
    k[(1, 1)] = 460.0;
    k[(0, 1)] = 0.5;
    assert!(RosFisheyeIntrinsics::from_components(k, FisheyeDistortion::zero()).is_err());
}

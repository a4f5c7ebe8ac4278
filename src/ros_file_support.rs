// This module requires std.

#[cfg(feature = "serde-serialize")]
use std::io::Read;

use na::{
    allocator::Allocator, DefaultAllocator, DimName, Matrix3, OMatrix, RealField, RowVector4, U1,
    U3, U4,
};
use nalgebra as na;

use crate::{Error, FisheyeDistortion, Result, RosFisheyeIntrinsics};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Camera calibration info as saved by ROS.
///
/// This is a low-level structure only intended for interoperation with ROS.
/// To convert to a more Rust-friendly type, use
/// [`NamedIntrinsicParameters::try_from()`](struct.NamedIntrinsicParameters.html#method.try_from).
/// To create an instance of this structure from a
/// [`NamedIntrinsicParameters`](struct.NamedIntrinsicParameters.html) struct,
/// use [`RosCameraInfo::from()`](struct.RosCameraInfo.html#method.from).
///
/// This structure implements the format written by `writeCalibrationYml` in
/// ROS code `camera_calibration_parsers/src/parse_yml.cpp` for fisheye
/// calibrations, whose `distortion_model` is `equidistant` and whose
/// distortion row holds the four radial terms `(k1, k2, k3, k4)`. It can be
/// serialized or deserialized with serde.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct RosCameraInfo<R: RealField> {
    /// The width of the image sensor (in pixels).
    pub image_width: usize,
    /// The height of the image sensor (in pixels).
    pub image_height: usize,
    /// The name of the camera
    pub camera_name: String,
    /// The camera matrix `k`.
    pub camera_matrix: RosMatrix<R>,
    /// The name of the distortion model. Only "equidistant" is supported.
    pub distortion_model: String,
    /// The coefficients of the distortion parameters.
    pub distortion_coefficients: RosMatrix<R>,
    /// The stereo rectification matrix.
    pub rectification_matrix: RosMatrix<R>,
    /// The projection matrix `p`.
    pub projection_matrix: RosMatrix<R>,
}

impl<R: RealField + Copy> From<NamedIntrinsicParameters<R>> for RosCameraInfo<R> {
    fn from(orig: NamedIntrinsicParameters<R>) -> Self {
        let d = &orig.intrinsics.distortion;

        let distortion = vec![d.k1(), d.k2(), d.k3(), d.k4()];
        Self {
            image_width: orig.width,
            image_height: orig.height,
            camera_name: orig.name,
            camera_matrix: to_ros(orig.intrinsics.k),
            distortion_model: "equidistant".to_string(),
            distortion_coefficients: to_ros_matrix(1, 4, distortion.as_slice()),
            // This model is monocular; write the identity rectification and
            // P = [K|0] the way ROS does for unrectified cameras.
            rectification_matrix: to_ros(Matrix3::<R>::identity()),
            projection_matrix: to_ros(projection_from_k(&orig.intrinsics.k)),
        }
    }
}

fn projection_from_k<R: RealField + Copy>(k: &Matrix3<R>) -> OMatrix<R, U3, U4> {
    let mut p = OMatrix::<R, U3, U4>::zeros();
    p.fixed_view_mut::<3, 3>(0, 0).copy_from(k);
    p
}

/// Matrix saved by ROS.
///
/// This is a low-level structure only intended for interoperation with ROS,
/// specifically as the type of fields within the
/// [`RosCameraInfo`](struct.RosCameraInfo.html) struct.
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct RosMatrix<R: RealField> {
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
    /// The data in the matrix stored as a row-major `Vec`.
    pub data: Vec<R>,
}

fn to_ros<R: RealField, SS: DimName, OS: DimName>(arr: na::OMatrix<R, SS, OS>) -> RosMatrix<R>
where
    DefaultAllocator: Allocator<SS, OS>,
    DefaultAllocator: Allocator<OS, SS>,
{
    // need to transpose the data since na is column major and ros is row major.
    let a2 = arr.transpose();
    RosMatrix {
        rows: arr.nrows(),
        cols: arr.ncols(),
        data: a2.as_slice().to_vec(),
    }
}

#[inline]
pub(crate) fn to_ros_matrix<R: RealField>(rows: usize, cols: usize, data: &[R]) -> RosMatrix<R> {
    RosMatrix {
        rows,
        cols,
        data: Vec::from(data),
    }
}

pub(crate) fn get_nalgebra_matrix<R, D1, D2>(
    ros_matrix: &RosMatrix<R>,
) -> Result<OMatrix<R, D1, D2>>
where
    R: RealField,
    D1: DimName,
    D2: DimName,
    DefaultAllocator: Allocator<D1, D2>,
{
    if ros_matrix.rows != D1::dim() {
        return Err(Error::BadMatrixSize);
    }
    if ros_matrix.cols != D2::dim() {
        return Err(Error::BadMatrixSize);
    }
    if ros_matrix.data.len() != ros_matrix.rows * ros_matrix.cols {
        return Err(Error::BadMatrixSize);
    }
    let data_converted: Vec<R> = ros_matrix
        .data
        .clone()
        .into_iter()
        .map(na::convert)
        .collect();
    Ok(OMatrix::from_row_slice_generic(
        D1::name(),
        D2::name(),
        &data_converted,
    ))
}

/// A struct with `RosFisheyeIntrinsics`, camera name and image sensor dimensions.
///
/// This is primarily used to read YAML files saved by ROS. Create this struct
/// with the [`from_ros_yaml`](fn.from_ros_yaml.html) function.
///
/// To extract a [`RosFisheyeIntrinsics`](struct.RosFisheyeIntrinsics.html)
/// structure from this struct, use the
/// [`intrinsics`](struct.NamedIntrinsicParameters.html#structfield.intrinsics)
/// field.
///
/// See the [module-level documentation for more information](index.html).
pub struct NamedIntrinsicParameters<R: RealField> {
    /// Name of the camera.
    pub name: String,
    /// The width of the image sensor (in pixels).
    pub width: usize,
    /// The height of the image sensor (in pixels).
    pub height: usize,
    /// The intrinsic parameters.
    pub intrinsics: RosFisheyeIntrinsics<R>,
}

impl<R: RealField + Copy> std::convert::TryFrom<RosCameraInfo<R>>
    for NamedIntrinsicParameters<R>
{
    type Error = Error;
    fn try_from(ros_camera: RosCameraInfo<R>) -> Result<NamedIntrinsicParameters<R>> {
        let intrinsics = {
            let k: OMatrix<R, U3, U3> = get_nalgebra_matrix(&ros_camera.camera_matrix)?;
            if ros_camera.distortion_model != "equidistant" {
                return Err(Error::UnknownDistortionModel);
            }
            let d: RowVector4<R> = get_nalgebra_matrix::<R, U1, U4>(
                &ros_camera.distortion_coefficients,
            )?;
            let distortion = FisheyeDistortion::from_opencv_vec(d.transpose());
            // The rectification and projection matrices of the ROS file are
            // not used by the equidistant model.
            RosFisheyeIntrinsics::from_components(k, distortion)?
        };
        Ok(NamedIntrinsicParameters {
            name: ros_camera.camera_name,
            width: ros_camera.image_width,
            height: ros_camera.image_height,
            intrinsics,
        })
    }
}

#[cfg(feature = "serde-serialize")]
/// Construct NamedIntrinsicParameters from ROS format YAML data.
///
/// This is a small wrapper around `serde_yaml::from_reader()` and
/// [`NamedIntrinsicParameters::try_from()`](struct.NamedIntrinsicParameters.html#method.try_from).
///
/// See the [module-level documentation for more information](index.html).
pub fn from_ros_yaml<R, Rd>(reader: Rd) -> Result<NamedIntrinsicParameters<R>>
where
    R: RealField + Copy + serde::de::DeserializeOwned,
    Rd: Read,
{
    let ros_camera: RosCameraInfo<R> = serde_yaml::from_reader(reader)?;
    Ok(std::convert::TryInto::try_into(ros_camera)?)
}

#[cfg(feature = "serde-serialize")]
mod serde_tests {
    use nalgebra::RealField;

    use cam_geom::intrinsic_test_utils::roundtrip_intrinsics;
    use ros_fisheye_camera::*;

    fn check_roundtrip<R: RealField + Copy + serde::de::DeserializeOwned>(eps: R) {
        use std::convert::TryInto;

        let buf = include_str!("ros/camera.yaml");
        let ros_camera: RosCameraInfo<R> = serde_yaml::from_str(buf).unwrap();

        let width = ros_camera.image_width;
        let height = ros_camera.image_height;

        let named: NamedIntrinsicParameters<R> = ros_camera.try_into().unwrap();

        let cam = named.intrinsics;
        roundtrip_intrinsics(&cam, width, height, 5, 65, nalgebra::convert(eps));
    }

    #[test]
    fn roundtrip_f32() {
        check_roundtrip::<f32>(0.05f32);
    }

    #[test]
    fn roundtrip_f64() {
        check_roundtrip::<f64>(0.02);
    }

    #[test]
    fn from_ros_yaml_reads_equidistant() {
        let buf = include_str!("ros/camera.yaml");
        let named = from_ros_yaml::<f64, _>(buf.as_bytes()).unwrap();
        assert_eq!(named.name, "fisheye_cam0");
        assert_eq!(named.width, 640);
        assert_eq!(named.height, 480);
        let cam = named.intrinsics;
        assert_eq!(cam.fx(), 400.0);
        assert_eq!(cam.cy(), 240.5);
        assert_eq!(cam.distortion.k1(), -0.011);
        assert_eq!(cam.distortion.k4(), 0.00055);
    }

    #[test]
    fn rejects_unknown_distortion_model() {
        let buf = include_str!("ros/camera.yaml").replace("equidistant", "plumb_bob");
        match from_ros_yaml::<f64, _>(buf.as_bytes()) {
            Err(Error::UnknownDistortionModel) => {}
            other => panic!("expected UnknownDistortionModel, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn writes_equidistant_model() {
        let buf = include_str!("ros/camera.yaml");
        let named = from_ros_yaml::<f64, _>(buf.as_bytes()).unwrap();
        let intrinsics = named.intrinsics.clone();

        let info = RosCameraInfo::from(named);
        assert_eq!(info.distortion_model, "equidistant");
        assert_eq!(info.distortion_coefficients.rows, 1);
        assert_eq!(info.distortion_coefficients.cols, 4);

        // Re-read what was written and check the model survives.
        let yaml = serde_yaml::to_string(&info).unwrap();
        let named2 = from_ros_yaml::<f64, _>(yaml.as_bytes()).unwrap();
        assert_eq!(named2.intrinsics, intrinsics);
    }

    #[test]
    fn intrinsics_serde_roundtrip() {
        let buf = include_str!("ros/camera.yaml");
        let named = from_ros_yaml::<f64, _>(buf.as_bytes()).unwrap();
        let cam = named.intrinsics;

        let yaml = serde_yaml::to_string(&cam).unwrap();
        let cam2: RosFisheyeIntrinsics<f64> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(cam, cam2);
    }
}

//! Lens-distortion removal for matched keypoints.

use opencv::calib3d;
use opencv::core::{no_array, Mat, Point2f};
use opencv::prelude::*;

use crate::camera::CameraModel;
use crate::error::InitializationError;

/// Undistort one side of a correspondence set.
///
/// Delegates the per-point distortion inversion to OpenCV and re-projects
/// through K (passed as `P`), so the output stays in pixel coordinates of
/// the ideal pinhole camera. No points are dropped or reordered; the
/// output list has exactly the input length. Callers apply this
/// symmetrically to both correspondence lists.
pub fn undistort_correspondences(
    points: &[Point2f],
    camera: &CameraModel,
) -> Result<Vec<Point2f>, InitializationError> {
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let src = Mat::from_slice(points)?.try_clone()?;
    let k = Mat::from_slice_2d(&[
        [camera.fx, 0.0, camera.cx],
        [0.0, camera.fy, camera.cy],
        [0.0, 0.0, 1.0],
    ])?;
    let dist = Mat::from_slice(&camera.dist_coeffs)?.try_clone()?;

    let mut dst = Mat::default();
    calib3d::undistort_points(&src, &mut dst, &k, &dist, &no_array(), &k)?;

    let mut undistorted = Vec::with_capacity(points.len());
    for i in 0..points.len() {
        undistorted.push(*dst.at::<Point2f>(i as i32)?);
    }
    Ok(undistorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distortion_is_identity() {
        let camera = CameraModel::new(400.0, 400.0, 320.0, 240.0, [0.0; 5], 640.0, 480.0);
        let points = vec![
            Point2f::new(100.0, 50.0),
            Point2f::new(320.0, 240.0),
            Point2f::new(600.0, 430.0),
        ];

        let out = undistort_correspondences(&points, &camera).unwrap();
        assert_eq!(out.len(), points.len());
        for (a, b) in points.iter().zip(&out) {
            assert!((a.x - b.x).abs() < 1e-3);
            assert!((a.y - b.y).abs() < 1e-3);
        }
    }

    #[test]
    fn test_empty_input() {
        let camera = CameraModel::new(400.0, 400.0, 320.0, 240.0, [0.0; 5], 640.0, 480.0);
        let out = undistort_correspondences(&[], &camera).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_radial_distortion_moves_off_center_points() {
        let camera = CameraModel::new(
            400.0,
            400.0,
            320.0,
            240.0,
            [-0.3, 0.1, 0.0, 0.0, 0.0],
            640.0,
            480.0,
        );
        // The principal point is a fixed point of radial distortion.
        let points = vec![Point2f::new(320.0, 240.0), Point2f::new(100.0, 60.0)];
        let out = undistort_correspondences(&points, &camera).unwrap();

        assert!((out[0].x - 320.0).abs() < 1e-3);
        assert!((out[0].y - 240.0).abs() < 1e-3);
        let moved = (out[1].x - 100.0).abs() + (out[1].y - 60.0).abs();
        assert!(moved > 1.0);
    }
}

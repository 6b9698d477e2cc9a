//! Robust motion-model fitting on top of OpenCV's RANSAC estimators.
//!
//! Both models are always fitted; deciding between them is the scorer's
//! job, not the estimator's. The estimator owns only the fit parameters
//! (pixel threshold, confidence) and the Mat <-> nalgebra conversions.

use nalgebra::Matrix3;
use opencv::calib3d;
use opencv::core::{Mat, Point2f};
use opencv::prelude::*;

use super::InitializerConfig;
use crate::error::InitializationError;

/// Fit a homography (reference -> target) with RANSAC.
pub fn fit_homography(
    ref_points: &[Point2f],
    tar_points: &[Point2f],
    config: &InitializerConfig,
) -> Result<Matrix3<f64>, InitializationError> {
    let src = points_mat(ref_points)?;
    let dst = points_mat(tar_points)?;

    let mut mask = Mat::default();
    let h = calib3d::find_homography(
        &src,
        &dst,
        &mut mask,
        calib3d::RANSAC,
        config.ransac_threshold,
    )?;

    if h.empty() {
        return Err(InitializationError::FitFailure("homography"));
    }
    mat3_to_matrix3(&h)
}

/// Fit a fundamental matrix with RANSAC.
pub fn fit_fundamental(
    ref_points: &[Point2f],
    tar_points: &[Point2f],
    config: &InitializerConfig,
) -> Result<Matrix3<f64>, InitializationError> {
    let src = points_mat(ref_points)?;
    let dst = points_mat(tar_points)?;

    let mut mask = Mat::default();
    let f = calib3d::find_fundamental_mat(
        &src,
        &dst,
        calib3d::FM_RANSAC,
        config.ransac_threshold,
        config.ransac_confidence,
        config.ransac_max_iters,
        &mut mask,
    )?;

    if f.empty() || f.rows() != 3 || f.cols() != 3 {
        return Err(InitializationError::FitFailure("fundamental"));
    }
    mat3_to_matrix3(&f)
}

fn points_mat(points: &[Point2f]) -> Result<Mat, InitializationError> {
    Ok(Mat::from_slice(points)?.try_clone()?)
}

/// Convert an OpenCV 3x3 CV_64F Mat to a nalgebra Matrix3.
fn mat3_to_matrix3(mat: &Mat) -> Result<Matrix3<f64>, InitializationError> {
    let mut arr = [0.0f64; 9];
    for (i, value) in arr.iter_mut().enumerate() {
        *value = *mat.at::<f64>(i as i32)?;
    }
    Ok(Matrix3::from_row_slice(&arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn default_config() -> InitializerConfig {
        InitializerConfig::default()
    }

    /// Points on a plane mapped by a known homography.
    fn homography_pair(h: &Matrix3<f64>, n: usize) -> (Vec<Point2f>, Vec<Point2f>) {
        let mut refs = Vec::with_capacity(n);
        let mut tars = Vec::with_capacity(n);
        for i in 0..n {
            let x = 100.0 + 40.0 * (i % 8) as f64;
            let y = 80.0 + 35.0 * (i / 8) as f64;
            let mapped = h * Vector3::new(x, y, 1.0);
            refs.push(Point2f::new(x as f32, y as f32));
            tars.push(Point2f::new(
                (mapped.x / mapped.z) as f32,
                (mapped.y / mapped.z) as f32,
            ));
        }
        (refs, tars)
    }

    #[test]
    fn test_fit_homography_recovers_known_transform() {
        let h_true = Matrix3::new(
            0.98, -0.05, 12.0, //
            0.04, 1.01, -7.0, //
            1e-5, -2e-5, 1.0,
        );
        let (refs, tars) = homography_pair(&h_true, 24);

        let h = fit_homography(&refs, &tars, &default_config()).unwrap();
        let h_scaled = h / h[(2, 2)];
        assert!((h_scaled - h_true).norm() < 1e-3);
    }

    #[test]
    fn test_fit_homography_collinear_fails() {
        // All points on one image line: no unique homography exists.
        let refs: Vec<Point2f> = (0..12)
            .map(|i| Point2f::new(10.0 + 20.0 * i as f32, 50.0))
            .collect();
        let tars: Vec<Point2f> = (0..12)
            .map(|i| Point2f::new(15.0 + 20.0 * i as f32, 55.0))
            .collect();

        assert!(fit_homography(&refs, &tars, &default_config()).is_err());
    }

    #[test]
    fn test_fit_fundamental_satisfies_epipolar_constraint() {
        // Non-planar points under a sideways translation.
        let mut refs = Vec::new();
        let mut tars = Vec::new();
        let (fx, fy, cx, cy) = (400.0, 400.0, 320.0, 240.0);
        let t = Vector3::new(0.4, 0.0, 0.0);
        for i in 0..30 {
            let x = -1.2 + 0.08 * i as f64;
            let y = 0.9 - 0.06 * i as f64;
            let z = 3.0 + 1.7 * ((i * 7) % 5) as f64;
            let p = Vector3::new(x, y, z);
            let q = p - t;
            refs.push(Point2f::new(
                (fx * p.x / p.z + cx) as f32,
                (fy * p.y / p.z + cy) as f32,
            ));
            tars.push(Point2f::new(
                (fx * q.x / q.z + cx) as f32,
                (fy * q.y / q.z + cy) as f32,
            ));
        }

        let f = fit_fundamental(&refs, &tars, &default_config()).unwrap();

        let mut worst: f64 = 0.0;
        for (a, b) in refs.iter().zip(&tars) {
            let x1 = Vector3::new(a.x as f64, a.y as f64, 1.0);
            let x2 = Vector3::new(b.x as f64, b.y as f64, 1.0);
            let line = f * x1;
            let residual =
                (x2.dot(&line)).abs() / (line.x * line.x + line.y * line.y).sqrt();
            worst = worst.max(residual);
        }
        assert!(worst < 0.5, "worst epipolar residual {worst}");
    }
}

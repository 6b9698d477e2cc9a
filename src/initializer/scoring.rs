//! Symmetric-transfer-error scoring and model selection.
//!
//! Each correspondence is tested in both directions (reference -> target
//! and back). A direction that passes its chi-square bound contributes
//! `bound - chi2` to the model score; a correspondence is an inlier only
//! if both directions pass. Partial score from a passing direction is
//! kept even when the other direction fails.

use nalgebra::{Matrix3, Vector3};
use opencv::core::Point2f;

use crate::error::InitializationError;

/// 95% chi-square bound for 2 DOF (squared pixel reprojection error).
pub const CHI2_2DOF: f64 = 5.991;
/// 95% chi-square bound for 1 DOF (point-to-epipolar-line error).
pub const CHI2_1DOF: f64 = 3.841;
/// Per-direction score ceiling, shared by both models so their totals
/// are comparable in the selection ratio.
pub const SCORE_BOUND: f64 = 5.991;

/// Score and per-correspondence inlier mask for one motion model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScore {
    pub score: f64,
    pub inliers: Vec<bool>,
}

impl ModelScore {
    pub fn num_inliers(&self) -> usize {
        self.inliers.iter().filter(|&&b| b).count()
    }
}

/// The motion model chosen by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    Homography,
    Fundamental,
}

/// Squared transfer error of mapping `src` through `h` against `dst`.
///
/// Infinite when the reprojection lands on the plane at infinity.
fn transfer_error(h: &Matrix3<f64>, src: (f64, f64), dst: (f64, f64)) -> f64 {
    let mapped = h * Vector3::new(src.0, src.1, 1.0);
    if mapped.z.abs() < 1e-12 {
        return f64::INFINITY;
    }
    let u = mapped.x / mapped.z;
    let v = mapped.y / mapped.z;
    (dst.0 - u) * (dst.0 - u) + (dst.1 - v) * (dst.1 - v)
}

/// Score a homography by symmetric transfer error.
///
/// Forward reprojects reference points through `h`, backward reprojects
/// target points through `h^-1`. Errors with 2 DOF per direction.
pub fn check_homography(
    ref_points: &[Point2f],
    tar_points: &[Point2f],
    h: &Matrix3<f64>,
    sigma: f64,
) -> Result<ModelScore, InitializationError> {
    debug_assert_eq!(ref_points.len(), tar_points.len());

    let h_inv = h.try_inverse().ok_or_else(|| {
        InitializationError::NumericalDegeneracy("homography is not invertible".into())
    })?;
    let inv_sigma2 = 1.0 / (sigma * sigma);

    let mut score = 0.0;
    let mut inliers = vec![false; ref_points.len()];

    for (i, (rp, tp)) in ref_points.iter().zip(tar_points).enumerate() {
        let p1 = (rp.x as f64, rp.y as f64);
        let p2 = (tp.x as f64, tp.y as f64);
        let mut is_inlier = true;

        let chi2_forward = transfer_error(h, p1, p2) * inv_sigma2;
        if chi2_forward > CHI2_2DOF {
            is_inlier = false;
        } else {
            score += CHI2_2DOF - chi2_forward;
        }

        let chi2_backward = transfer_error(&h_inv, p2, p1) * inv_sigma2;
        if chi2_backward > CHI2_2DOF {
            is_inlier = false;
        } else {
            score += CHI2_2DOF - chi2_backward;
        }

        inliers[i] = is_inlier;
    }

    Ok(ModelScore { score, inliers })
}

/// Squared point-to-epipolar-line distance of `x2` against the line `f * x1`.
fn epipolar_error(f: &Matrix3<f64>, x1: &Vector3<f64>, x2: &Vector3<f64>) -> f64 {
    let line = f * x1;
    let denom = line.x * line.x + line.y * line.y;
    if denom < 1e-20 {
        return f64::INFINITY;
    }
    let num = x2.dot(&line);
    num * num / denom
}

/// Score a fundamental matrix by symmetric epipolar error.
///
/// Forward uses the line `F x1` in the target image; backward uses
/// `F^T x2` in the reference image. Errors with 1 DOF per direction.
pub fn check_fundamental(
    ref_points: &[Point2f],
    tar_points: &[Point2f],
    f: &Matrix3<f64>,
    sigma: f64,
) -> ModelScore {
    debug_assert_eq!(ref_points.len(), tar_points.len());

    let f_t = f.transpose();
    let inv_sigma2 = 1.0 / (sigma * sigma);

    let mut score = 0.0;
    let mut inliers = vec![false; ref_points.len()];

    for (i, (rp, tp)) in ref_points.iter().zip(tar_points).enumerate() {
        let x1 = Vector3::new(rp.x as f64, rp.y as f64, 1.0);
        let x2 = Vector3::new(tp.x as f64, tp.y as f64, 1.0);
        let mut is_inlier = true;

        let chi2_forward = epipolar_error(f, &x1, &x2) * inv_sigma2;
        if chi2_forward > CHI2_1DOF {
            is_inlier = false;
        } else {
            score += SCORE_BOUND - chi2_forward;
        }

        let chi2_backward = epipolar_error(&f_t, &x2, &x1) * inv_sigma2;
        if chi2_backward > CHI2_1DOF {
            is_inlier = false;
        } else {
            score += SCORE_BOUND - chi2_backward;
        }

        inliers[i] = is_inlier;
    }

    ModelScore { score, inliers }
}

/// Pick between the two models by relative homography score.
///
/// `R_H = S_H / (S_H + S_F)`; the threshold is biased toward the
/// homography because near-planar scenes make the fundamental
/// decomposition numerically unstable.
pub fn select_model(
    s_h: f64,
    s_f: f64,
    threshold: f64,
) -> Result<ModelChoice, InitializationError> {
    let total = s_h + s_f;
    if total <= 0.0 {
        return Err(InitializationError::SelectionFailure);
    }
    if s_h / total > threshold {
        Ok(ModelChoice::Homography)
    } else {
        Ok(ModelChoice::Fundamental)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn homography_correspondences(h: &Matrix3<f64>, n: usize) -> (Vec<Point2f>, Vec<Point2f>) {
        let mut refs = Vec::new();
        let mut tars = Vec::new();
        for i in 0..n {
            let x = 50.0 + 30.0 * (i % 10) as f64;
            let y = 40.0 + 25.0 * (i / 10) as f64;
            let m = h * Vector3::new(x, y, 1.0);
            refs.push(Point2f::new(x as f32, y as f32));
            tars.push(Point2f::new((m.x / m.z) as f32, (m.y / m.z) as f32));
        }
        (refs, tars)
    }

    #[test]
    fn test_check_homography_perfect_fit() {
        let h = Matrix3::new(1.0, 0.02, 5.0, -0.01, 0.98, 3.0, 1e-5, 0.0, 1.0);
        let (refs, tars) = homography_correspondences(&h, 30);

        let result = check_homography(&refs, &tars, &h, 1.0).unwrap();
        assert_eq!(result.num_inliers(), 30);
        // f32 storage of the points leaves sub-pixel residuals; the score
        // stays close to the noise-free ceiling.
        assert!(result.score > 30.0 * 2.0 * CHI2_2DOF * 0.95);
    }

    #[test]
    fn test_check_homography_flags_outlier() {
        let h = Matrix3::identity();
        let (mut refs, tars) = homography_correspondences(&h, 10);
        // 10 px displacement: chi2 = 100 in both directions.
        refs[3].x += 10.0;

        let result = check_homography(&refs, &tars, &h, 1.0).unwrap();
        assert!(!result.inliers[3]);
        assert_eq!(result.num_inliers(), 9);
        assert!(result.score > 9.0 * 2.0 * (CHI2_2DOF - 1.0));
    }

    #[test]
    fn test_check_homography_singular_matrix() {
        let h = Matrix3::zeros();
        let refs = vec![Point2f::new(0.0, 0.0)];
        let tars = vec![Point2f::new(0.0, 0.0)];
        assert!(matches!(
            check_homography(&refs, &tars, &h, 1.0),
            Err(InitializationError::NumericalDegeneracy(_))
        ));
    }

    fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
        Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
    }

    #[test]
    fn test_check_fundamental_perfect_fit() {
        let k = Matrix3::new(400.0, 0.0, 320.0, 0.0, 400.0, 240.0, 0.0, 0.0, 1.0);
        let k_inv = k.try_inverse().unwrap();
        let rot = Rotation3::from_euler_angles(0.02, -0.03, 0.01);
        let t = Vector3::new(0.3, 0.05, -0.02);
        let f = k_inv.transpose() * skew(&t) * rot.matrix() * k_inv;

        let mut refs = Vec::new();
        let mut tars = Vec::new();
        for i in 0..25 {
            let p = Vector3::new(
                -1.0 + 0.09 * i as f64,
                0.8 - 0.07 * i as f64,
                3.0 + 0.9 * ((i * 3) % 7) as f64,
            );
            let q = rot.matrix() * p + t;
            let u1 = k * (p / p.z);
            let u2 = k * (q / q.z);
            refs.push(Point2f::new(u1.x as f32, u1.y as f32));
            tars.push(Point2f::new(u2.x as f32, u2.y as f32));
        }

        let result = check_fundamental(&refs, &tars, &f, 1.0);
        assert_eq!(result.num_inliers(), 25);
        assert!(result.score > 25.0 * 2.0 * (SCORE_BOUND - 0.5));
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let h = Matrix3::new(1.0, 0.0, 2.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0);
        let (refs, tars) = homography_correspondences(&h, 12);

        let a = check_homography(&refs, &tars, &h, 1.0).unwrap();
        let b = check_homography(&refs, &tars, &h, 1.0).unwrap();
        assert_relative_eq!(a.score, b.score);
        assert_eq!(a.inliers, b.inliers);

        let f = Matrix3::new(0.0, -1.0, 240.0, 1.0, 0.0, -320.0, -240.0, 320.0, 0.0);
        let c = check_fundamental(&refs, &tars, &f, 1.0);
        let d = check_fundamental(&refs, &tars, &f, 1.0);
        assert_relative_eq!(c.score, d.score);
        assert_eq!(c.inliers, d.inliers);
    }

    #[test]
    fn test_select_model() {
        assert_eq!(
            select_model(600.0, 400.0, 0.45).unwrap(),
            ModelChoice::Homography
        );
        assert_eq!(
            select_model(300.0, 700.0, 0.45).unwrap(),
            ModelChoice::Fundamental
        );
        assert!(matches!(
            select_model(0.0, 0.0, 0.45),
            Err(InitializationError::SelectionFailure)
        ));
    }
}

//! Pinhole camera model with radial/tangential distortion coefficients.

use nalgebra::Matrix3;

/// Calibrated pinhole camera.
///
/// Intrinsics follow the usual OpenCV convention: focal lengths in
/// pixels, principal point in pixels, distortion coefficients ordered
/// `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, Copy)]
pub struct CameraModel {
    /// Focal length x (pixels).
    pub fx: f64,
    /// Focal length y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
    /// Distortion coefficients `[k1, k2, p1, p2, k3]`.
    pub dist_coeffs: [f64; 5],
    /// Image width (pixels).
    pub width: f64,
    /// Image height (pixels).
    pub height: f64,
}

impl CameraModel {
    /// Create a camera model from explicit intrinsics.
    pub fn new(
        fx: f64,
        fy: f64,
        cx: f64,
        cy: f64,
        dist_coeffs: [f64; 5],
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            dist_coeffs,
            width,
            height,
        }
    }

    /// The 3x3 intrinsic matrix K.
    pub fn k(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Closed-form inverse of K.
    pub fn k_inv(&self) -> Matrix3<f64> {
        Matrix3::new(
            1.0 / self.fx,
            0.0,
            -self.cx / self.fx,
            0.0,
            1.0 / self.fy,
            -self.cy / self.fy,
            0.0,
            0.0,
            1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k_inv_is_inverse() {
        let cam = CameraModel::new(458.0, 457.2, 367.2, 248.4, [0.0; 5], 752.0, 480.0);
        let product = cam.k() * cam.k_inv();
        assert!((product - Matrix3::identity()).norm() < 1e-12);
    }
}

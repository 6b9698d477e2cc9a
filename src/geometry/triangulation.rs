//! Linear two-view triangulation via Direct Linear Transform (DLT).

use nalgebra::{Matrix3, Matrix4, SMatrix, Vector3, Vector4};

/// Assemble a 3x4 projection matrix `K * [R | t]`.
pub fn projection_matrix(
    k: &Matrix3<f64>,
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
) -> SMatrix<f64, 3, 4> {
    let mut rt = SMatrix::<f64, 3, 4>::zeros();
    rt.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    rt.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    k * rt
}

/// Triangulate one correspondence under two projection matrices.
///
/// Each image point contributes two rows to the homogeneous system
/// `A * X = 0`; the solution is the right singular vector of the
/// smallest singular value. Returns the *homogeneous* 3D point; the
/// caller owns the Euclidean division and the point-at-infinity check.
///
/// Returns `None` if the SVD does not converge.
pub fn triangulate_dlt(
    p1: &SMatrix<f64, 3, 4>,
    p2: &SMatrix<f64, 3, 4>,
    x1: (f64, f64),
    x2: (f64, f64),
) -> Option<Vector4<f64>> {
    let mut a = Matrix4::<f64>::zeros();

    for j in 0..4 {
        a[(0, j)] = x1.0 * p1[(2, j)] - p1[(0, j)];
        a[(1, j)] = x1.1 * p1[(2, j)] - p1[(1, j)];
        a[(2, j)] = x2.0 * p2[(2, j)] - p2[(0, j)];
        a[(3, j)] = x2.1 * p2[(2, j)] - p2[(1, j)];
    }

    let svd = a.svd(true, true);
    let v = svd.v_t?.transpose();
    Some(v.column(3).into_owned())
}

//! Pose recovery: decomposing the selected motion model into one
//! physically valid relative rotation and translation.
//!
//! Both decomposition branches produce a flat list of `PoseCandidate`s
//! (four from the essential matrix, up to eight from the Faugeras
//! homography decomposition) which go through one shared cheirality
//! probe: triangulate a deterministic subset of the inliers under every
//! candidate and keep the single candidate that places the most points
//! in front of both cameras with sufficient parallax.

use nalgebra::{Matrix3, Vector3};
use opencv::core::Point2f;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use super::InitializerConfig;
use crate::camera::CameraModel;
use crate::error::InitializationError;
use crate::geometry::{projection_matrix, triangulate_dlt};

/// Reprojection gate for probe points, as a multiple of sigma^2.
const REPROJ_CHI2_GATE: f64 = 4.0;

/// One algebraically valid relative pose, `x_tar = R * x_ref + t`.
#[derive(Debug, Clone)]
pub struct PoseCandidate {
    pub rotation: Matrix3<f64>,
    /// Unit-norm translation (scale is unobservable from two views).
    pub translation: Vector3<f64>,
    /// Scene-plane normal, present only for homography candidates.
    pub normal: Option<Vector3<f64>>,
}

/// Outcome of decomposing a homography.
#[derive(Debug, Clone)]
pub enum HomographyPose {
    /// Near-identity singular values: pure rotation, zero baseline.
    /// Translation is unrecoverable and reported as zero; triangulation
    /// is skipped downstream.
    PureRotation(Matrix3<f64>),
    /// General planar motion: up to eight Faugeras candidates.
    Candidates(Vec<PoseCandidate>),
}

fn svd_failed() -> InitializationError {
    InitializationError::NumericalDegeneracy("SVD did not converge".into())
}

/// Four pose candidates from a fundamental matrix.
///
/// Forms the essential matrix `E = K^T F K`, splits it by SVD and
/// enumerates the rotation/translation sign ambiguities around
/// `W = [[0,-1,0],[1,0,0],[0,0,1]]`.
pub fn candidates_from_fundamental(
    f: &Matrix3<f64>,
    k: &Matrix3<f64>,
) -> Result<Vec<PoseCandidate>, InitializationError> {
    let e = k.transpose() * f * k;

    let svd = e.svd(true, true);
    let mut u = svd.u.ok_or_else(svd_failed)?;
    let mut v_t = svd.v_t.ok_or_else(svd_failed)?;

    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }

    let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);

    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t = u.column(2).normalize();

    let mut candidates = vec![
        (r1, t),
        (r1, -t),
        (r2, t),
        (r2, -t),
    ];

    for (r, t) in candidates.iter_mut() {
        if r.determinant() < 0.0 {
            *r = -*r;
            *t = -*t;
        }
    }

    Ok(candidates
        .into_iter()
        .map(|(rotation, translation)| PoseCandidate {
            rotation,
            translation,
            normal: None,
        })
        .collect())
}

/// Up to eight pose candidates from a homography (Faugeras decomposition).
///
/// Works on `A = K^-1 H K`. When all three singular values coincide the
/// homography is a conjugated rotation and the pure-rotation path is
/// taken instead of building candidates.
pub fn candidates_from_homography(
    h: &Matrix3<f64>,
    k: &Matrix3<f64>,
    pure_rotation_tol: f64,
) -> Result<HomographyPose, InitializationError> {
    let k_inv = k.try_inverse().ok_or_else(|| {
        InitializationError::NumericalDegeneracy("camera matrix is not invertible".into())
    })?;
    let a = k_inv * h * k;

    let svd = a.svd(true, true);
    let u = svd.u.ok_or_else(svd_failed)?;
    let v_t = svd.v_t.ok_or_else(svd_failed)?;
    let v = v_t.transpose();

    let d1 = svd.singular_values[0];
    let d2 = svd.singular_values[1];
    let d3 = svd.singular_values[2];

    if d3 <= f64::EPSILON * d1 {
        return Err(InitializationError::NumericalDegeneracy(
            "homography is rank deficient".into(),
        ));
    }

    let s = u.determinant() * v_t.determinant();

    if d1 / d2 < 1.0 + pure_rotation_tol && d2 / d3 < 1.0 + pure_rotation_tol {
        let rotation = s * u * v_t;
        return Ok(HomographyPose::PureRotation(rotation));
    }

    // x2 = 0 in the Faugeras parameterization; x1 and x3 carry four
    // sign combinations, the rotation angle two more.
    let denom = d1 * d1 - d3 * d3;
    let x1_mag = ((d1 * d1 - d2 * d2) / denom).max(0.0).sqrt();
    let x3_mag = ((d2 * d2 - d3 * d3) / denom).max(0.0).sqrt();
    let x1 = [x1_mag, x1_mag, -x1_mag, -x1_mag];
    let x3 = [x3_mag, -x3_mag, x3_mag, -x3_mag];

    let mut candidates = Vec::with_capacity(8);

    // d' > 0 branch.
    let sin_mag = ((d1 * d1 - d2 * d2) * (d2 * d2 - d3 * d3)).max(0.0).sqrt() / ((d1 + d3) * d2);
    let cos_theta = (d2 * d2 + d1 * d3) / ((d1 + d3) * d2);
    let sin_theta = [sin_mag, -sin_mag, -sin_mag, sin_mag];

    for i in 0..4 {
        let rp = Matrix3::new(
            cos_theta, 0.0, -sin_theta[i], //
            0.0, 1.0, 0.0, //
            sin_theta[i], 0.0, cos_theta,
        );
        let rotation = s * u * rp * v_t;

        let tp = Vector3::new(x1[i], 0.0, -x3[i]) * (d1 - d3);
        push_candidate(&mut candidates, rotation, u * tp, &v, x1[i], x3[i]);
    }

    // d' < 0 branch.
    let sin_mag_phi = ((d1 * d1 - d2 * d2) * (d2 * d2 - d3 * d3)).max(0.0).sqrt()
        / ((d1 - d3) * d2);
    let cos_phi = (d1 * d3 - d2 * d2) / ((d1 - d3) * d2);
    let sin_phi = [sin_mag_phi, -sin_mag_phi, -sin_mag_phi, sin_mag_phi];

    for i in 0..4 {
        let rp = Matrix3::new(
            cos_phi, 0.0, sin_phi[i], //
            0.0, -1.0, 0.0, //
            sin_phi[i], 0.0, -cos_phi,
        );
        let rotation = s * u * rp * v_t;

        let tp = Vector3::new(x1[i], 0.0, x3[i]) * (d1 + d3);
        push_candidate(&mut candidates, rotation, u * tp, &v, x1[i], x3[i]);
    }

    Ok(HomographyPose::Candidates(candidates))
}

fn push_candidate(
    candidates: &mut Vec<PoseCandidate>,
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
    v: &Matrix3<f64>,
    x1: f64,
    x3: f64,
) {
    let norm = translation.norm();
    if norm < 1e-12 {
        return;
    }

    let mut normal = v * Vector3::new(x1, 0.0, x3);
    if normal.z < 0.0 {
        normal = -normal;
    }

    candidates.push(PoseCandidate {
        rotation,
        translation: translation / norm,
        normal: Some(normal),
    });
}

struct CandidateScore {
    good: usize,
    median_parallax_cos: f64,
}

/// Triangulate the probe subset under one candidate and count the points
/// that survive the cheirality, parallax, and reprojection gates.
fn evaluate_candidate(
    candidate: &PoseCandidate,
    ref_points: &[Point2f],
    tar_points: &[Point2f],
    probe: &[usize],
    camera: &CameraModel,
    config: &InitializerConfig,
) -> CandidateScore {
    let k = camera.k();
    let p1 = projection_matrix(&k, &Matrix3::identity(), &Vector3::zeros());
    let p2 = projection_matrix(&k, &candidate.rotation, &candidate.translation);
    let center2 = -(candidate.rotation.transpose() * candidate.translation);
    let gate = REPROJ_CHI2_GATE * config.sigma * config.sigma;

    let mut good = 0;
    let mut parallax_cos = Vec::with_capacity(probe.len());

    for &i in probe {
        let x1 = (ref_points[i].x as f64, ref_points[i].y as f64);
        let x2 = (tar_points[i].x as f64, tar_points[i].y as f64);

        let Some(xh) = triangulate_dlt(&p1, &p2, x1, x2) else {
            continue;
        };
        if xh.w.abs() < config.infinity_eps {
            continue;
        }
        let p = Vector3::new(xh.x / xh.w, xh.y / xh.w, xh.z / xh.w);
        if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
            continue;
        }

        // Positive depth in both cameras.
        if p.z <= 0.0 {
            continue;
        }
        let q = candidate.rotation * p + candidate.translation;
        if q.z <= 0.0 {
            continue;
        }

        // Parallax between the two viewing rays.
        let ray1 = p;
        let ray2 = p - center2;
        let norms = ray1.norm() * ray2.norm();
        if norms < 1e-12 {
            continue;
        }
        let cos = ray1.dot(&ray2) / norms;
        if cos >= config.max_parallax_cos {
            continue;
        }

        // Reprojection gate in both images.
        let e1 = {
            let u = camera.fx * p.x / p.z + camera.cx;
            let v = camera.fy * p.y / p.z + camera.cy;
            (u - x1.0) * (u - x1.0) + (v - x1.1) * (v - x1.1)
        };
        let e2 = {
            let u = camera.fx * q.x / q.z + camera.cx;
            let v = camera.fy * q.y / q.z + camera.cy;
            (u - x2.0) * (u - x2.0) + (v - x2.1) * (v - x2.1)
        };
        if e1 > gate || e2 > gate {
            continue;
        }

        good += 1;
        parallax_cos.push(cos);
    }

    parallax_cos.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median_parallax_cos = if parallax_cos.is_empty() {
        1.0
    } else {
        parallax_cos[parallax_cos.len() / 2]
    };

    CandidateScore {
        good,
        median_parallax_cos,
    }
}

/// Select the single physically consistent candidate by triangulation probe.
///
/// The probe subset is sampled with a seeded RNG so repeated runs on the
/// same inputs are deterministic. Fails with `DisambiguationFailure` when
/// no candidate passes enough probe points, or when a second candidate is
/// too close to the winner to call.
pub fn select_candidate(
    candidates: &[PoseCandidate],
    ref_points: &[Point2f],
    tar_points: &[Point2f],
    camera: &CameraModel,
    config: &InitializerConfig,
) -> Result<PoseCandidate, InitializationError> {
    debug_assert_eq!(ref_points.len(), tar_points.len());

    if candidates.is_empty() || ref_points.is_empty() {
        return Err(InitializationError::DisambiguationFailure);
    }

    // Sign-symmetric parameterizations can collapse onto each other
    // (e.g. x1 = 0); duplicates would otherwise trip the ambiguity test.
    let candidates = dedup_candidates(candidates);

    let n = ref_points.len();
    let probe: Vec<usize> = if n <= config.probe_size {
        (0..n).collect()
    } else {
        let mut rng = StdRng::seed_from_u64(config.probe_seed);
        let mut indices = rand::seq::index::sample(&mut rng, n, config.probe_size).into_vec();
        indices.sort_unstable();
        indices
    };

    let scores: Vec<CandidateScore> = candidates
        .iter()
        .map(|c| evaluate_candidate(c, ref_points, tar_points, &probe, camera, config))
        .collect();

    let (best_idx, best) = scores
        .iter()
        .enumerate()
        .max_by_key(|(_, s)| s.good)
        .ok_or(InitializationError::DisambiguationFailure)?;

    let min_good = ((config.min_good_ratio * probe.len() as f64).ceil() as usize).max(1);
    if best.good < min_good {
        debug!(
            "[PoseRecovery] best candidate passes {}/{} probes, need {}",
            best.good,
            probe.len(),
            min_good
        );
        return Err(InitializationError::DisambiguationFailure);
    }

    let tied: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|(_, s)| s.good as f64 > config.ambiguity_ratio * best.good as f64)
        .map(|(i, _)| i)
        .collect();
    if tied.len() > 1 {
        // An exactly planar scene admits two rigid interpretations of
        // the same homography, both with full positive depth. Break the
        // tie with the fronto-parallel prior on the plane normal; for
        // essential candidates (no normal) a tie is a genuine failure.
        if tied.iter().all(|&i| candidates[i].normal.is_some()) {
            let mut winner = tied[0];
            for &i in &tied[1..] {
                let zi = candidates[i].normal.map_or(f64::MIN, |n| n.z);
                let zw = candidates[winner].normal.map_or(f64::MIN, |n| n.z);
                if zi > zw {
                    winner = i;
                }
            }
            debug!(
                "[PoseRecovery] {} tied candidates; tie broken by plane-normal prior",
                tied.len()
            );
            return Ok(candidates[winner].clone());
        }
        debug!(
            "[PoseRecovery] {} candidates within ambiguity ratio of the winner",
            tied.len()
        );
        return Err(InitializationError::DisambiguationFailure);
    }

    debug!(
        "[PoseRecovery] candidate {} wins with {}/{} probes (median parallax cos {:.6})",
        best_idx,
        best.good,
        probe.len(),
        best.median_parallax_cos
    );
    Ok(candidates[best_idx].clone())
}

fn dedup_candidates(candidates: &[PoseCandidate]) -> Vec<PoseCandidate> {
    let mut unique: Vec<PoseCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let duplicate = unique.iter().any(|kept| {
            (kept.rotation - candidate.rotation).norm() < 1e-9
                && (kept.translation - candidate.translation).norm() < 1e-9
        });
        if !duplicate {
            unique.push(candidate.clone());
        }
    }
    unique
}

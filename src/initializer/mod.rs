//! Two-view map initialization.
//!
//! One call processes one image pair to completion: undistort the
//! correspondences, fit and score a homography and a fundamental matrix
//! (independently, on two scoped threads), select the better model,
//! decompose it into the single physically valid relative pose, and
//! triangulate the surviving inliers into landmarks. The caller's map is
//! touched only after the whole pipeline has committed.

pub mod estimation;
pub mod pose;
pub mod scoring;
pub mod undistort;

use std::thread;

use nalgebra::{Matrix3, Vector3};
use opencv::core::Point2f;
use tracing::{debug, info};

use crate::camera::CameraModel;
use crate::error::InitializationError;
use crate::geometry::{projection_matrix, triangulate_dlt, SE3};
use crate::map::{Map, MapPoint};
use self::pose::HomographyPose;
use self::scoring::ModelChoice;

/// Tunables for one initialization attempt.
///
/// The chi-square bounds themselves are fixed constants in
/// [`scoring`]; everything an integrator might reasonably change
/// lives here, so each stage stays independently testable with no
/// ambient state.
#[derive(Debug, Clone)]
pub struct InitializerConfig {
    /// Minimum number of correspondences accepted as input.
    pub min_correspondences: usize,
    /// Measurement noise standard deviation (pixels).
    pub sigma: f64,
    /// RANSAC reprojection threshold for both robust fits (pixels).
    pub ransac_threshold: f64,
    /// Target confidence of the fundamental fit.
    pub ransac_confidence: f64,
    /// Iteration cap of the fundamental fit.
    pub ransac_max_iters: i32,
    /// Select the homography iff `S_H / (S_H + S_F)` exceeds this.
    pub homography_selection_threshold: f64,
    /// Size of the cheirality probe subset.
    pub probe_size: usize,
    /// Seed for the probe subset sampler.
    pub probe_seed: u64,
    /// Fraction of the probe a winning candidate must reconstruct.
    pub min_good_ratio: f64,
    /// A runner-up within this ratio of the winner voids the decision.
    pub ambiguity_ratio: f64,
    /// Cosine above which a triangulated ray pair counts as degenerate.
    pub max_parallax_cos: f64,
    /// Singular-value ratio tolerance for the pure-rotation homography path.
    pub pure_rotation_tol: f64,
    /// Homogeneous-w cutoff: smaller means the point is at infinity.
    pub infinity_eps: f64,
    /// Divide landmark x/y by image width/height (normalized units).
    pub scale_by_image_size: bool,
}

impl Default for InitializerConfig {
    fn default() -> Self {
        Self {
            min_correspondences: 8,
            sigma: 1.0,
            ransac_threshold: 3.0,
            ransac_confidence: 0.99,
            ransac_max_iters: 1000,
            homography_selection_threshold: 0.45,
            probe_size: 50,
            probe_seed: 42,
            min_good_ratio: 0.6,
            ambiguity_ratio: 0.7,
            max_parallax_cos: 0.99998,
            pure_rotation_tol: 1e-4,
            infinity_eps: 1e-8,
            scale_by_image_size: false,
        }
    }
}

/// The motion model the selector committed to.
#[derive(Debug, Clone)]
pub enum SelectedModel {
    Homography(Matrix3<f64>),
    Fundamental(Matrix3<f64>),
}

/// Outcome of a successful initialization attempt.
///
/// The triangulated landmarks themselves are appended to the map passed
/// into [`Initializer::initialize_map`].
#[derive(Debug, Clone)]
pub struct Initialization {
    pub model: SelectedModel,
    /// Relative pose of the target camera: `x_tar = R * x_ref + t`.
    /// The reference camera sits at the identity.
    pub pose: SE3,
    /// Inlier mask of the selected model over the input correspondences.
    pub inliers: Vec<bool>,
    /// `S_H / (S_H + S_F)`.
    pub score_ratio: f64,
    /// Number of landmarks appended to the map.
    pub num_landmarks: usize,
    /// Scene-plane normal when the homography path was taken.
    pub plane_normal: Option<Vector3<f64>>,
}

/// Two-view initializer for a calibrated monocular camera.
pub struct Initializer {
    camera: CameraModel,
    config: InitializerConfig,
}

impl Initializer {
    pub fn new(camera: CameraModel, config: InitializerConfig) -> Self {
        Self { camera, config }
    }

    /// Run the full pipeline on one set of correspondences.
    ///
    /// On success the triangulated landmarks are appended to `map` in
    /// inlier order and a summary is returned. On any error the map is
    /// left untouched.
    pub fn initialize_map(
        &self,
        ref_points: &[Point2f],
        tar_points: &[Point2f],
        map: &mut Map,
    ) -> Result<Initialization, InitializationError> {
        if ref_points.len() != tar_points.len() {
            return Err(InitializationError::LengthMismatch {
                reference: ref_points.len(),
                target: tar_points.len(),
            });
        }
        if ref_points.len() < self.config.min_correspondences {
            return Err(InitializationError::InsufficientCorrespondences {
                found: ref_points.len(),
                required: self.config.min_correspondences,
            });
        }

        let undist_ref = undistort::undistort_correspondences(ref_points, &self.camera)?;
        let undist_tar = undistort::undistort_correspondences(tar_points, &self.camera)?;

        // The two fits read the same inputs and produce disjoint outputs;
        // estimate and score them concurrently, join before selecting.
        let (h_branch, f_branch) = thread::scope(|s| {
            let h_handle = s.spawn(|| {
                let h = estimation::fit_homography(&undist_ref, &undist_tar, &self.config)?;
                let score =
                    scoring::check_homography(&undist_ref, &undist_tar, &h, self.config.sigma)?;
                Ok::<_, InitializationError>((h, score))
            });
            let f_handle = s.spawn(|| {
                let f = estimation::fit_fundamental(&undist_ref, &undist_tar, &self.config)?;
                let score =
                    scoring::check_fundamental(&undist_ref, &undist_tar, &f, self.config.sigma);
                Ok::<_, InitializationError>((f, score))
            });
            (h_handle.join(), f_handle.join())
        });
        let (h, h_score) = h_branch.expect("homography branch panicked")?;
        let (f, f_score) = f_branch.expect("fundamental branch panicked")?;

        debug!(
            "[Initializer] S_H={:.1} ({} inliers), S_F={:.1} ({} inliers)",
            h_score.score,
            h_score.num_inliers(),
            f_score.score,
            f_score.num_inliers()
        );

        let choice = scoring::select_model(
            h_score.score,
            f_score.score,
            self.config.homography_selection_threshold,
        )?;
        let score_ratio = h_score.score / (h_score.score + f_score.score);

        let k = self.camera.k();
        let (model, selected_score, candidates) = match choice {
            ModelChoice::Homography => {
                match pose::candidates_from_homography(&h, &k, self.config.pure_rotation_tol)? {
                    HomographyPose::PureRotation(rotation) => {
                        info!(
                            "[Initializer] pure-rotation homography ({} inliers); \
                             zero baseline, no landmarks triangulated",
                            h_score.num_inliers()
                        );
                        return Ok(Initialization {
                            model: SelectedModel::Homography(h),
                            pose: SE3::from_rt(rotation, Vector3::zeros()),
                            inliers: h_score.inliers,
                            score_ratio,
                            num_landmarks: 0,
                            plane_normal: None,
                        });
                    }
                    HomographyPose::Candidates(c) => (SelectedModel::Homography(h), h_score, c),
                }
            }
            ModelChoice::Fundamental => (
                SelectedModel::Fundamental(f),
                f_score,
                pose::candidates_from_fundamental(&f, &k)?,
            ),
        };

        let mask = selected_score.inliers;
        let (ref_inliers, tar_inliers) = filter_inliers(&undist_ref, &undist_tar, &mask);

        let chosen =
            pose::select_candidate(&candidates, &ref_inliers, &tar_inliers, &self.camera, &self.config)?;

        // Triangulate every inlier under the committed pose; landmarks are
        // staged locally so a degenerate point leaves the map untouched.
        let p1 = projection_matrix(&k, &Matrix3::identity(), &Vector3::zeros());
        let p2 = projection_matrix(&k, &chosen.rotation, &chosen.translation);

        let inlier_indices: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, &keep)| keep)
            .map(|(i, _)| i)
            .collect();

        let mut staged = Vec::with_capacity(ref_inliers.len());
        for ((rp, tp), &source_index) in
            ref_inliers.iter().zip(&tar_inliers).zip(&inlier_indices)
        {
            let xh = triangulate_dlt(
                &p1,
                &p2,
                (rp.x as f64, rp.y as f64),
                (tp.x as f64, tp.y as f64),
            )
            .ok_or_else(|| {
                InitializationError::NumericalDegeneracy(
                    "SVD did not converge during triangulation".into(),
                )
            })?;

            if xh.w.abs() <= self.config.infinity_eps {
                return Err(InitializationError::NumericalDegeneracy(
                    "triangulated point at infinity".into(),
                ));
            }

            let mut position = Vector3::new(xh.x / xh.w, xh.y / xh.w, xh.z / xh.w);
            if self.config.scale_by_image_size {
                position.x /= self.camera.width;
                position.y /= self.camera.height;
            }
            staged.push(MapPoint::new(position, source_index));
        }

        let num_landmarks = staged.len();
        for point in staged {
            map.push(point);
        }

        info!(
            "[Initializer] initialized: {:?} model, {} inliers, {} landmarks",
            choice,
            inlier_indices.len(),
            num_landmarks
        );

        Ok(Initialization {
            model,
            pose: SE3::from_rt(chosen.rotation, chosen.translation),
            inliers: mask,
            score_ratio,
            num_landmarks,
            plane_normal: chosen.normal,
        })
    }
}

/// Reduce the correspondence lists to the inliers of the selected model.
///
/// Output lists are freshly allocated and preserve relative order.
pub fn filter_inliers(
    ref_points: &[Point2f],
    tar_points: &[Point2f],
    inliers: &[bool],
) -> (Vec<Point2f>, Vec<Point2f>) {
    debug_assert_eq!(ref_points.len(), inliers.len());
    debug_assert_eq!(tar_points.len(), inliers.len());

    let mut ref_filtered = Vec::new();
    let mut tar_filtered = Vec::new();
    for (i, &keep) in inliers.iter().enumerate() {
        if keep {
            ref_filtered.push(ref_points[i]);
            tar_filtered.push(tar_points[i]);
        }
    }
    (ref_filtered, tar_filtered)
}

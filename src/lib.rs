//! Two-view map initialization for monocular visual SLAM.
//!
//! Given matched keypoints between two frames of a calibrated camera,
//! the [`Initializer`] recovers the relative camera pose and a first set
//! of triangulated landmarks. It follows the classic dual-model scheme:
//! a homography and a fundamental matrix are fitted and scored in
//! parallel, the better-supported model is decomposed into pose
//! candidates, and a cheirality/parallax probe picks the single
//! physically valid one.
//!
//! ```no_run
//! use opencv::core::Point2f;
//! use vslam_init::{CameraModel, Initializer, InitializerConfig, Map};
//!
//! # fn main() -> Result<(), vslam_init::InitializationError> {
//! let camera = CameraModel::new(458.6, 457.3, 367.2, 248.4, [0.0; 5], 752.0, 480.0);
//! let initializer = Initializer::new(camera, InitializerConfig::default());
//!
//! let ref_points: Vec<Point2f> = vec![/* matched keypoints, frame 1 */];
//! let tar_points: Vec<Point2f> = vec![/* matched keypoints, frame 2 */];
//!
//! let mut map = Map::new();
//! let init = initializer.initialize_map(&ref_points, &tar_points, &mut map)?;
//! println!("pose: {:?}, {} landmarks", init.pose, init.num_landmarks);
//! # Ok(())
//! # }
//! ```

pub mod camera;
pub mod error;
pub mod geometry;
pub mod initializer;
pub mod map;

pub use camera::CameraModel;
pub use error::InitializationError;
pub use geometry::SE3;
pub use initializer::{Initialization, Initializer, InitializerConfig, SelectedModel};
pub use map::{Map, MapPoint};

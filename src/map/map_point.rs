//! MapPoint - a triangulated 3D landmark.

use nalgebra::Vector3;

/// A 3D landmark created by triangulating one inlier correspondence.
///
/// Immutable within this pipeline; later pipeline stages may refine
/// positions, but that happens on the caller's side of the map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapPoint {
    /// 3D position in the reference-camera frame.
    pub position: Vector3<f64>,
    /// Index of the originating correspondence in the input lists.
    pub source_index: usize,
}

impl MapPoint {
    pub fn new(position: Vector3<f64>, source_index: usize) -> Self {
        Self {
            position,
            source_index,
        }
    }
}

//! The output map: an append-only, ordered collection of landmarks.

pub mod map_point;

pub use map_point::MapPoint;

/// Ordered landmark collection owned by the caller.
///
/// Within one initialization call the map is append-only, and it is
/// touched only after the pipeline has fully committed to a model and
/// pose; a failed attempt never leaves partial landmarks behind.
#[derive(Debug, Clone, Default)]
pub struct Map {
    points: Vec<MapPoint>,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one landmark.
    pub fn push(&mut self, point: MapPoint) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The landmarks, in insertion order.
    pub fn points(&self) -> &[MapPoint] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapPoint> {
        self.points.iter()
    }
}

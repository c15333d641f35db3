use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Per-image corner detection outcome.
///
/// `Detected` carries the full ordered corner set (row-major, matching
/// [`crate::PatternGeometry::object_points`]); a failed detection is
/// `NotFound`, never a partial or padded point list. The tagged variant makes
/// the "excluded from solving" rule enforceable at the type level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CornerObservation {
    Detected { points: Vec<Point2<f64>> },
    NotFound,
}

impl CornerObservation {
    #[inline]
    pub fn is_detected(&self) -> bool {
        matches!(self, Self::Detected { .. })
    }

    /// The ordered corner set, or `None` for a failed detection.
    pub fn points(&self) -> Option<&[Point2<f64>]> {
        match self {
            Self::Detected { points } => Some(points),
            Self::NotFound => None,
        }
    }
}

/// Detection result for one input image, keyed by its original index in the
/// batch. The pipeline emits exactly one record per input image, so
/// downstream consumers never reconcile two independently filtered lists.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageObservation {
    pub index: usize,
    pub observation: CornerObservation,
}

impl ImageObservation {
    pub fn new(index: usize, observation: CornerObservation) -> Self {
        Self { index, observation }
    }
}

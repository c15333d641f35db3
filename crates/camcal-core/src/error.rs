use thiserror::Error;

/// Errors surfaced by the calibration pipeline.
///
/// Per-image detection failures are not errors; they are the
/// [`crate::CornerObservation::NotFound`] variant and only become fatal when
/// they drop the usable view count below the solver's minimum.
#[derive(Debug, Error)]
pub enum CalibError {
    #[error("insufficient calibration views: {found} usable, {required} required")]
    InsufficientViews { found: usize, required: usize },

    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("image {index} has resolution {got:?}, expected {expected:?}")]
    ResolutionMismatch {
        index: usize,
        got: (usize, usize),
        expected: (usize, usize),
    },

    #[error("observation for image {index} has {got} corners, expected {expected}")]
    CornerCountMismatch {
        index: usize,
        got: usize,
        expected: usize,
    },
}

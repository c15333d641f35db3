//! Multi-view planar calibration solver.
//!
//! Pipeline: per-view DLT homographies, Zhang's closed-form intrinsics,
//! planar pose decomposition, then joint Levenberg-Marquardt refinement of
//! intrinsics, distortion, and all per-view poses against total reprojection
//! error.

mod calibrate;
mod intrinsics;
mod lm;
mod pose;

pub use calibrate::{calibrate, CalibrationResult, SolveOptions};
pub use intrinsics::intrinsics_from_homographies;
pub use lm::{minimize, LmOptions, LmReport};
pub use pose::pose_from_homography;

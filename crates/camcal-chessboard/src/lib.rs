//! Checkerboard detector and subpixel corner refiner built on `camcal-core`.
//!
//! Detection pipeline (graph-based, perspective-aware):
//! 1. Dense ring-difference corner response over the grayscale image.
//! 2. Threshold + non-maximum suppression, center-of-mass peak refinement.
//! 3. Estimate the global lattice axes from nearest-neighbor displacements.
//! 4. For each candidate, find up to 4 neighbors (right/left/up/down) gated
//!    by spacing and axis alignment; keep only mutual relations.
//! 5. BFS each connected component, assign integer coordinates (i, j).
//! 6. Keep the component that forms a complete `cols x rows` rectangle
//!    (up to swap), validated against a fitted plane-to-image homography.
//! 7. Emit the corners in canonical row-major order, or `NotFound`.
//!
//! The subpixel refiner sharpens accepted corners by iterating the local
//! gradient-orthogonality condition until the update drops below an epsilon
//! or the iteration cap is reached.

mod candidates;
mod detector;
mod gridgraph;
mod params;
mod refine;
mod response;

pub use candidates::{find_candidates, CornerCandidate};
pub use detector::ChessboardDetector;
pub use gridgraph::{GridGraph, NeighborDirection, NodeNeighbor};
pub use params::{ChessboardParams, GridGraphParams, RefineParams};
pub use refine::{refine_corner, refine_observation};
pub use response::{corner_response_map, ResponseMap};

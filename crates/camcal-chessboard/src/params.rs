use serde::{Deserialize, Serialize};

/// Parameters for the grid-graph assembly stage.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct GridGraphParams {
    /// Minimal accepted corner spacing along a lattice axis, in pixels.
    pub min_spacing_pix: f64,
    /// Maximal accepted corner spacing along a lattice axis, in pixels.
    pub max_spacing_pix: f64,
    /// Nearest-neighbor candidates inspected per corner.
    pub k_neighbors: usize,
    /// Maximal off-axis ratio (cross-axis over along-axis component) for a
    /// displacement to count as a lattice edge. 0.35 is roughly 19 degrees.
    pub axis_tolerance: f64,
    /// Accepted deviation of an edge length from the estimated base
    /// spacing, as a fraction. 0.45 admits the perspective shrink of a
    /// tilted board while excluding corner-skipping double edges.
    pub spacing_tolerance: f64,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            min_spacing_pix: 5.0,
            max_spacing_pix: 100.0,
            k_neighbors: 8,
            axis_tolerance: 0.35,
            spacing_tolerance: 0.45,
        }
    }
}

/// Parameters for the checkerboard detector.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ChessboardParams {
    /// Response threshold as a fraction of the maximal response.
    pub threshold_rel: f32,
    /// Absolute floor on the maximal response; below it the image is
    /// considered to contain no usable corners at all.
    pub min_response: f32,
    /// Non-maximum suppression radius, in pixels.
    pub nms_radius: usize,
    /// Maximal reprojection residual (pixels) of the fitted plane-to-image
    /// homography for a grid to be accepted.
    pub max_homography_error: f64,
    pub grid: GridGraphParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.1,
            min_response: 50.0,
            nms_radius: 3,
            max_homography_error: 3.0,
            grid: GridGraphParams::default(),
        }
    }
}

/// Stopping criteria and window size for subpixel refinement.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct RefineParams {
    /// Half size of the search window; the full window is
    /// `2 * half_window + 1` pixels on a side.
    pub half_window: usize,
    /// Convergence threshold on the iteration displacement, in pixels.
    pub eps: f64,
    /// Iteration cap; whichever of `eps` and this triggers first stops.
    pub max_iters: usize,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            half_window: 5,
            eps: 1e-3,
            max_iters: 30,
        }
    }
}

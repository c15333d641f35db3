use log::{debug, info};
use nalgebra::Point2;

use camcal_core::{estimate_homography, CornerObservation, GrayImageView, PatternGeometry};

use crate::candidates::{find_candidates, CornerCandidate};
use crate::gridgraph::{assign_grid_coordinates, connected_components, GridGraph};
use crate::params::ChessboardParams;

/// Checkerboard detector: candidate corners to an ordered, validated grid.
pub struct ChessboardDetector {
    pub params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Self {
        Self { params }
    }

    /// Find the full inner-corner grid of `geometry` in a grayscale image.
    ///
    /// Emits either the complete ordered corner set or `NotFound`, never a
    /// partial or misordered grid, since downstream geometry assumes corner
    /// `i` is the same physical corner in every view.
    pub fn detect(
        &self,
        img: &GrayImageView<'_>,
        geometry: &PatternGeometry,
    ) -> CornerObservation {
        let expected = geometry.corner_count();

        let candidates = find_candidates(img, &self.params);
        debug!("{} corner candidates after NMS", candidates.len());
        if candidates.len() < expected {
            info!(
                "not enough candidates for a {}x{} grid ({} found)",
                geometry.cols,
                geometry.rows,
                candidates.len()
            );
            return CornerObservation::NotFound;
        }

        let Some(graph) = GridGraph::new(&candidates, &self.params.grid) else {
            info!("no dominant lattice orientation among candidates");
            return CornerObservation::NotFound;
        };

        let mut components = connected_components(&graph);
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));

        for component in &components {
            if component.len() != expected {
                continue;
            }
            let Some(coords) = assign_grid_coordinates(&graph, component) else {
                continue;
            };
            if let Some(points) = self.order_component(&candidates, coords, geometry) {
                if self.validate_grid(&points, geometry) {
                    return CornerObservation::Detected { points };
                }
                debug!("component failed homography validation");
            }
        }

        info!("no component assembles into a complete grid");
        CornerObservation::NotFound
    }

    /// Normalize BFS coordinates into canonical row-major order.
    ///
    /// The grid axes already run left/down in image space, so after shifting
    /// the coordinates to start at zero the scan direction is fixed across
    /// views. A `rows x cols` bounding box (non-square pattern seen
    /// transposed) is flipped back by swapping the axes.
    fn order_component(
        &self,
        candidates: &[CornerCandidate],
        mut coords: Vec<(usize, i32, i32)>,
        geometry: &PatternGeometry,
    ) -> Option<Vec<Point2<f64>>> {
        let (cols, rows) = (geometry.cols as i32, geometry.rows as i32);

        let min_i = coords.iter().map(|&(_, i, _)| i).min()?;
        let max_i = coords.iter().map(|&(_, i, _)| i).max()?;
        let min_j = coords.iter().map(|&(_, _, j)| j).min()?;
        let max_j = coords.iter().map(|&(_, _, j)| j).max()?;
        let (w, h) = (max_i - min_i + 1, max_j - min_j + 1);

        if (w, h) == (rows, cols) && cols != rows {
            for c in &mut coords {
                *c = (c.0, c.2, c.1);
            }
            return self.order_component(candidates, coords, geometry);
        }
        if (w, h) != (cols, rows) {
            return None;
        }

        let mut slots: Vec<Option<usize>> = vec![None; (cols * rows) as usize];
        for &(node, i, j) in &coords {
            let slot = ((j - min_j) * cols + (i - min_i)) as usize;
            if slots[slot].replace(node).is_some() {
                return None; // duplicate cell
            }
        }

        slots
            .into_iter()
            .map(|s| s.map(|n| candidates[n].position))
            .collect()
    }

    /// A complete grid must be consistent with a single plane-to-image
    /// homography; anything else is a mis-assembled component.
    fn validate_grid(&self, points: &[Point2<f64>], geometry: &PatternGeometry) -> bool {
        let plane = geometry.plane_points();
        let Some(h) = estimate_homography(&plane, points) else {
            return false;
        };

        plane.iter().zip(points.iter()).all(|(pp, ip)| {
            let r = h.apply(*pp) - *ip;
            r.norm() <= self.params.max_homography_error
        })
    }
}

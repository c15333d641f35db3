//! Corner candidate extraction: thresholding, non-maximum suppression, and
//! center-of-mass peak refinement on the dense response map.

use nalgebra::Point2;

use camcal_core::GrayImageView;

use crate::params::ChessboardParams;
use crate::response::{corner_response_map, ResponseMap};

/// A corner-like feature found in the response map.
#[derive(Clone, Copy, Debug)]
pub struct CornerCandidate {
    /// Subpixel position from the 5x5 center-of-mass of the response peak.
    pub position: Point2<f64>,
    /// Peak response value.
    pub strength: f32,
}

fn is_local_maximum(map: &ResponseMap, x: usize, y: usize, radius: usize) -> bool {
    let v = map.at(x, y);
    let x0 = x.saturating_sub(radius);
    let y0 = y.saturating_sub(radius);
    let x1 = (x + radius).min(map.width - 1);
    let y1 = (y + radius).min(map.height - 1);

    for ny in y0..=y1 {
        for nx in x0..=x1 {
            if nx == x && ny == y {
                continue;
            }
            let nv = map.at(nx, ny);
            if nv > v {
                return false;
            }
            // Plateau tie-break: only the raster-first pixel survives.
            if nv == v && (ny < y || (ny == y && nx < x)) {
                return false;
            }
        }
    }
    true
}

fn center_of_mass(map: &ResponseMap, x: usize, y: usize) -> Point2<f64> {
    let mut wsum = 0.0f64;
    let mut cx = 0.0f64;
    let mut cy = 0.0f64;

    for dy in -2i32..=2 {
        for dx in -2i32..=2 {
            let nx = x as i32 + dx;
            let ny = y as i32 + dy;
            if nx < 0 || ny < 0 || nx >= map.width as i32 || ny >= map.height as i32 {
                continue;
            }
            let w = map.at(nx as usize, ny as usize).max(0.0) as f64;
            wsum += w;
            cx += w * nx as f64;
            cy += w * ny as f64;
        }
    }

    if wsum > 0.0 {
        Point2::new(cx / wsum, cy / wsum)
    } else {
        Point2::new(x as f64, y as f64)
    }
}

/// Extract corner candidates from a grayscale image.
///
/// Returns an empty list when the strongest response stays below
/// `params.min_response`, so blank or low-contrast images fail fast.
pub fn find_candidates(img: &GrayImageView<'_>, params: &ChessboardParams) -> Vec<CornerCandidate> {
    let map = corner_response_map(img);
    let max = map.max();
    if max < params.min_response {
        return Vec::new();
    }

    let threshold = max * params.threshold_rel;
    let mut out = Vec::new();

    for y in 0..map.height {
        for x in 0..map.width {
            let v = map.at(x, y);
            if v < threshold || !is_local_maximum(&map, x, y, params.nms_radius) {
                continue;
            }
            out.push(CornerCandidate {
                position: center_of_mass(&map, x, y),
                strength: v,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::GrayImage;

    fn two_saddle_image() -> GrayImage {
        // Two saddles at (16, 16) and (48, 16) in a 64x32 image.
        let mut img = GrayImage::new_filled(64, 32, 0);
        for y in 0..32usize {
            for x in 0..64usize {
                let cell_x = x / 16;
                let cell_y = y / 16;
                img.data[y * 64 + x] = if (cell_x + cell_y) % 2 == 0 { 20 } else { 220 };
            }
        }
        img
    }

    #[test]
    fn finds_both_saddles_near_their_true_positions() {
        let img = two_saddle_image();
        let found = find_candidates(&img.as_view(), &ChessboardParams::default());

        for expected in [(15.5, 15.5), (47.5, 15.5)] {
            let hit = found.iter().any(|c| {
                (c.position.x - expected.0).abs() < 1.5 && (c.position.y - expected.1).abs() < 1.5
            });
            assert!(hit, "no candidate near {expected:?}: {found:?}");
        }
    }

    #[test]
    fn blank_image_yields_no_candidates() {
        let img = GrayImage::new_filled(64, 64, 128);
        assert!(find_candidates(&img.as_view(), &ChessboardParams::default()).is_empty());
    }

    #[test]
    fn nms_keeps_a_single_candidate_per_saddle() {
        let img = two_saddle_image();
        let found = find_candidates(&img.as_view(), &ChessboardParams::default());

        let near_first = found
            .iter()
            .filter(|c| (c.position.x - 15.5).abs() < 4.0 && (c.position.y - 15.5).abs() < 4.0)
            .count();
        assert_eq!(near_first, 1, "expected one suppressed peak: {found:?}");
    }
}

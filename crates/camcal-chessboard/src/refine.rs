//! Subpixel corner refinement.
//!
//! Iterates the gradient-orthogonality condition: at the true corner, the
//! image gradient at every window pixel is orthogonal to the vector from the
//! corner to that pixel. Each iteration solves the 2x2 weighted normal
//! equations over the window and moves the estimate to the least-squares
//! solution, stopping when the displacement drops below `eps` or the
//! iteration cap is reached, whichever comes first.

use nalgebra::Point2;

use camcal_core::{sample_bilinear, CornerObservation, GrayImageView};

use crate::params::RefineParams;

/// Refine a single corner estimate to subpixel accuracy.
///
/// Degenerate situations (window out of image bounds, singular normal
/// matrix, estimate drifting beyond the window) return the original
/// estimate unchanged.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    corner: Point2<f64>,
    params: &RefineParams,
) -> Point2<f64> {
    let w = params.half_window as i32;
    // Window samples plus central-difference offsets plus bilinear support.
    let margin = params.half_window as f64 + 2.5;
    let sigma = (params.half_window as f64 / 2.0).max(1.0);

    let in_bounds = |p: &Point2<f64>| {
        p.x >= margin
            && p.y >= margin
            && p.x <= img.width as f64 - 1.0 - margin
            && p.y <= img.height as f64 - 1.0 - margin
    };

    let mut cur = corner;
    for _ in 0..params.max_iters {
        if !in_bounds(&cur) {
            return corner;
        }

        let mut a11 = 0.0f64;
        let mut a12 = 0.0f64;
        let mut a22 = 0.0f64;
        let mut b1 = 0.0f64;
        let mut b2 = 0.0f64;

        for dy in -w..=w {
            for dx in -w..=w {
                let px = cur.x + dx as f64;
                let py = cur.y + dy as f64;
                let weight = (-((dx * dx + dy * dy) as f64) / (2.0 * sigma * sigma)).exp();

                let gx = (sample_bilinear(img, px + 1.0, py) - sample_bilinear(img, px - 1.0, py))
                    * 0.5;
                let gy = (sample_bilinear(img, px, py + 1.0) - sample_bilinear(img, px, py - 1.0))
                    * 0.5;

                let gxx = weight * gx * gx;
                let gxy = weight * gx * gy;
                let gyy = weight * gy * gy;

                a11 += gxx;
                a12 += gxy;
                a22 += gyy;
                b1 += gxx * px + gxy * py;
                b2 += gxy * px + gyy * py;
            }
        }

        let det = a11 * a22 - a12 * a12;
        if det.abs() < 1e-9 {
            return corner;
        }

        let next = Point2::new((a22 * b1 - a12 * b2) / det, (a11 * b2 - a12 * b1) / det);
        let delta = next - cur;
        cur = next;

        if (cur - corner).norm() > w as f64 {
            return corner; // diverged out of the search window
        }
        if delta.norm() < params.eps {
            break;
        }
    }

    cur
}

/// Refine every corner of a successful observation; `NotFound` passes
/// through unchanged.
pub fn refine_observation(
    img: &GrayImageView<'_>,
    observation: &CornerObservation,
    params: &RefineParams,
) -> CornerObservation {
    match observation {
        CornerObservation::NotFound => CornerObservation::NotFound,
        CornerObservation::Detected { points } => CornerObservation::Detected {
            points: points
                .iter()
                .map(|&p| refine_corner(img, p, params))
                .collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::GrayImage;

    // Saddle with the true corner at (cx, cy), rendered with a linear ramp
    // across the boundary so gradients are well defined.
    fn saddle_image(w: usize, h: usize, cx: f64, cy: f64) -> GrayImage {
        let mut img = GrayImage::new_filled(w, h, 0);
        for y in 0..h {
            for x in 0..w {
                let sx = (x as f64 - cx).clamp(-1.0, 1.0);
                let sy = (y as f64 - cy).clamp(-1.0, 1.0);
                let v = 120.0 + 100.0 * sx * sy;
                img.data[y * w + x] = v.round() as u8;
            }
        }
        img
    }

    #[test]
    fn recovers_a_shifted_corner() {
        let img = saddle_image(48, 48, 24.3, 23.6);
        let refined = refine_corner(
            &img.as_view(),
            Point2::new(23.0, 25.0),
            &RefineParams::default(),
        );
        assert!(
            (refined.x - 24.3).abs() < 0.15 && (refined.y - 23.6).abs() < 0.15,
            "refined to {refined:?}"
        );
    }

    #[test]
    fn converged_estimate_is_a_fixed_point() {
        let img = saddle_image(48, 48, 24.3, 23.6);
        let params = RefineParams::default();
        let first = refine_corner(&img.as_view(), Point2::new(23.5, 24.0), &params);
        let second = refine_corner(&img.as_view(), first, &params);
        assert!(
            (second - first).norm() < params.eps,
            "fixed point moved by {}",
            (second - first).norm()
        );
    }

    #[test]
    fn window_outside_image_leaves_estimate_unchanged() {
        let img = saddle_image(48, 48, 24.0, 24.0);
        let p = Point2::new(3.0, 3.0);
        let refined = refine_corner(&img.as_view(), p, &RefineParams::default());
        assert_eq!(refined, p);
    }

    #[test]
    fn flat_region_leaves_estimate_unchanged() {
        let img = GrayImage::new_filled(48, 48, 128);
        let p = Point2::new(24.0, 24.0);
        let refined = refine_corner(&img.as_view(), p, &RefineParams::default());
        assert_eq!(refined, p);
    }

    #[test]
    fn not_found_passes_through() {
        let img = saddle_image(48, 48, 24.0, 24.0);
        let out = refine_observation(
            &img.as_view(),
            &CornerObservation::NotFound,
            &RefineParams::default(),
        );
        assert_eq!(out, CornerObservation::NotFound);
    }
}

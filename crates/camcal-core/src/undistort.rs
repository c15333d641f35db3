//! Undistortion engine.
//!
//! Maps pixels from a distorted source image into a corrected output image
//! by applying the forward distortion model along the inverse pixel mapping:
//! each output pixel is taken through the (optionally adjusted) output
//! intrinsics to the normalized plane, distorted, and projected back through
//! the calibrated intrinsics to find its source location.

use nalgebra::Point2;

use crate::camera::{CameraModel, PinholeIntrinsics};
use crate::image::{sample_bilinear, GrayImage, GrayImageView};

/// Resampling used when the inverse-mapped source coordinate is non-integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Bilinear,
    Nearest,
}

/// Map a single distorted pixel coordinate to its undistorted equivalent.
///
/// `new_intrinsics` selects the output view; pass `None` to reuse the
/// calibrated intrinsics. Used for validating a model independently of
/// image remapping.
pub fn undistort_point(
    model: &CameraModel,
    distorted: Point2<f64>,
    new_intrinsics: Option<&PinholeIntrinsics>,
) -> Point2<f64> {
    let k_out = new_intrinsics.unwrap_or(&model.intrinsics);
    let n = model.intrinsics.from_pixel(distorted);
    k_out.to_pixel(model.distortion.undistort(n))
}

/// Remap a distorted image into a corrected image of the same dimensions.
///
/// Out-of-bounds source coordinates fill with 0 (black).
pub fn undistort_image(
    src: &GrayImageView<'_>,
    model: &CameraModel,
    new_intrinsics: Option<&PinholeIntrinsics>,
    interpolation: Interpolation,
) -> GrayImage {
    let k_out = new_intrinsics.unwrap_or(&model.intrinsics);
    let (w, h) = (src.width, src.height);
    let mut out = vec![0u8; w * h];

    for y in 0..h {
        let row = &mut out[y * w..(y + 1) * w];
        for (x, px) in row.iter_mut().enumerate() {
            let n = k_out.from_pixel(Point2::new(x as f64, y as f64));
            let s = model.intrinsics.to_pixel(model.distortion.distort(n));

            // Small slack keeps border pixels in-bounds under floating
            // round-trip of the identity mapping.
            const EDGE: f64 = 1e-6;
            if s.x < -EDGE
                || s.y < -EDGE
                || s.x > (w - 1) as f64 + EDGE
                || s.y > (h - 1) as f64 + EDGE
            {
                continue; // fill value stays 0
            }
            *px = match interpolation {
                Interpolation::Bilinear => {
                    sample_bilinear(src, s.x, s.y).round().clamp(0.0, 255.0) as u8
                }
                Interpolation::Nearest => src.get(s.x.round() as i32, s.y.round() as i32),
            };
        }
    }

    GrayImage {
        width: w,
        height: h,
        data: out,
    }
}

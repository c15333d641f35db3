//! Dense ring-difference corner response.
//!
//! For each interior pixel a 16-sample ring of radius 5 is combined into a
//! response that is large at checkerboard saddle points and small on edges
//! and blobs:
//!
//! - sum response: opposite ring samples agree, quarter-turn samples differ,
//! - diff response: penalizes straight edges (opposite samples differ),
//! - mean response: penalizes blobs (ring mean far from the local mean).

use camcal_core::GrayImageView;

/// 16-point ring of radius 5, ordered so that sample `n + 8` is opposite
/// sample `n` and `n + 4` is a quarter turn away.
const RING: [(i32, i32); 16] = [
    (5, 0),
    (5, 2),
    (4, 4),
    (2, 5),
    (0, 5),
    (-2, 5),
    (-4, 4),
    (-5, 2),
    (-5, 0),
    (-5, -2),
    (-4, -4),
    (-2, -5),
    (0, -5),
    (2, -5),
    (4, -4),
    (5, -2),
];

const RING_RADIUS: usize = 5;

/// Dense response map in row-major layout. Pixels closer than the ring
/// radius to the border carry a zero response.
#[derive(Clone, Debug)]
pub struct ResponseMap {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl ResponseMap {
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    pub fn max(&self) -> f32 {
        self.data.iter().cloned().fold(0.0, f32::max)
    }
}

/// Compute the dense corner response for a grayscale image.
pub fn corner_response_map(img: &GrayImageView<'_>) -> ResponseMap {
    let (w, h) = (img.width, img.height);
    let mut data = vec![0.0f32; w * h];

    if w <= 2 * RING_RADIUS || h <= 2 * RING_RADIUS {
        return ResponseMap {
            width: w,
            height: h,
            data,
        };
    }

    for y in RING_RADIUS..h - RING_RADIUS {
        for x in RING_RADIUS..w - RING_RADIUS {
            let mut s = [0.0f32; 16];
            for (n, (dx, dy)) in RING.iter().enumerate() {
                s[n] = img.get(x as i32 + dx, y as i32 + dy) as f32;
            }

            let mut sum_response = 0.0;
            for n in 0..4 {
                sum_response += (s[n] + s[n + 8] - s[n + 4] - s[n + 12]).abs();
            }

            let mut diff_response = 0.0;
            for n in 0..8 {
                diff_response += (s[n] - s[n + 8]).abs();
            }

            let ring_mean = s.iter().sum::<f32>() / 16.0;
            let local_mean = (img.get(x as i32, y as i32) as f32
                + img.get(x as i32 + 1, y as i32) as f32
                + img.get(x as i32 - 1, y as i32) as f32
                + img.get(x as i32, y as i32 + 1) as f32
                + img.get(x as i32, y as i32 - 1) as f32)
                / 5.0;
            let mean_response = 4.0 * (ring_mean - local_mean).abs();

            data[y * w + x] = sum_response - diff_response - mean_response;
        }
    }

    ResponseMap {
        width: w,
        height: h,
        data,
    }
}

use nalgebra::{Isometry3, Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Rigid pose mapping pattern coordinates into the camera frame.
pub type ViewPose = Isometry3<f64>;

/// Pinhole intrinsics with zero skew.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinholeIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl PinholeIntrinsics {
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.fx, 0.0, self.cx, 0.0, self.fy, self.cy, 0.0, 0.0, 1.0)
    }

    /// Normalized image-plane coordinates of a pixel.
    #[inline]
    pub fn from_pixel(&self, p: Point2<f64>) -> Vector2<f64> {
        Vector2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    /// Pixel coordinates of a normalized image-plane point.
    #[inline]
    pub fn to_pixel(&self, n: Vector2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }
}

/// Brown-Conrady distortion with three radial and two tangential terms.
///
/// Operates on normalized image-plane coordinates. `undistort` inverts the
/// forward model by fixed-point iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5 {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl BrownConrady5 {
    const UNDISTORT_ITERS: usize = 10;

    pub fn is_zero(&self) -> bool {
        self.k1 == 0.0 && self.k2 == 0.0 && self.p1 == 0.0 && self.p2 == 0.0 && self.k3 == 0.0
    }

    /// Coefficients as a flat vector in `[k1, k2, p1, p2, k3]` order.
    pub fn as_vector(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    pub fn undistort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let mut u = n;
        for _ in 0..Self::UNDISTORT_ITERS {
            let e = self.distort(u) - n;
            u -= e;
        }
        u
    }
}

/// Shared camera model fitted by the calibration solver and consumed by the
/// undistortion engine. Serializes to a flat numeric record so a model can
/// be computed once and reused across sessions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: PinholeIntrinsics,
    pub distortion: BrownConrady5,
    /// Resolution the model was calibrated at (width, height).
    pub image_size: (usize, usize),
}

impl CameraModel {
    /// Project a camera-frame point to distorted pixel coordinates.
    ///
    /// Returns `None` for points at or behind the optical center.
    pub fn project_camera_point(&self, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= 0.0 {
            return None;
        }
        let n = Vector2::new(pc.x / pc.z, pc.y / pc.z);
        Some(self.intrinsics.to_pixel(self.distortion.distort(n)))
    }

    /// Project a pattern-frame point through `pose` to pixel coordinates.
    pub fn project_point(&self, pose: &ViewPose, pw: &Point3<f64>) -> Option<Point2<f64>> {
        self.project_camera_point(&pose.transform_point(pw))
    }
}

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// Logical shape of the planar calibration target: inner-corner grid
/// dimensions and the physical spacing between adjacent corners.
///
/// Supplied once per calibration session; all derived point sets are ordered
/// row-major (index `i = row * cols + col`), which is the order every
/// detector observation must follow.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternGeometry {
    /// Inner corners per row.
    pub cols: usize,
    /// Inner corners per column.
    pub rows: usize,
    /// Horizontal spacing between adjacent corners, in real-world units.
    pub dx: f64,
    /// Vertical spacing between adjacent corners, in real-world units.
    pub dy: f64,
}

impl PatternGeometry {
    pub fn new(cols: usize, rows: usize, dx: f64, dy: f64) -> Self {
        Self { cols, rows, dx, dy }
    }

    /// Square pattern with identical spacing in both directions.
    pub fn square(cols: usize, rows: usize, spacing: f64) -> Self {
        Self::new(cols, rows, spacing, spacing)
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.cols * self.rows
    }

    /// 3D corner coordinates on the z = 0 pattern plane, row-major.
    ///
    /// Identical across all views because the pattern is rigid and planar.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let mut points = Vec::with_capacity(self.corner_count());
        for r in 0..self.rows {
            for c in 0..self.cols {
                points.push(Point3::new(c as f64 * self.dx, r as f64 * self.dy, 0.0));
            }
        }
        points
    }

    /// Same corners projected to the 2D pattern plane, for homography fits.
    pub fn plane_points(&self) -> Vec<Point2<f64>> {
        self.object_points()
            .iter()
            .map(|p| Point2::new(p.x, p.y))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_are_row_major_on_z0() {
        let geom = PatternGeometry::new(3, 2, 30.0, 20.0);
        let pts = geom.object_points();

        assert_eq!(pts.len(), 6);
        assert_eq!(pts[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(pts[1], Point3::new(30.0, 0.0, 0.0));
        assert_eq!(pts[3], Point3::new(0.0, 20.0, 0.0));
        assert!(pts.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn plane_points_match_object_points() {
        let geom = PatternGeometry::square(4, 3, 25.0);
        let p3 = geom.object_points();
        let p2 = geom.plane_points();

        assert_eq!(p2.len(), p3.len());
        for (a, b) in p3.iter().zip(p2.iter()) {
            assert_eq!((a.x, a.y), (b.x, b.y));
        }
    }
}

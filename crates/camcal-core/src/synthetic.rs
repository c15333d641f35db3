//! Synthetic pinhole scenes for tests and examples.
//!
//! Builds deterministic camera poses, projects the calibration pattern, and
//! renders ideal (distortion-free) checkerboard views so the whole pipeline
//! can be exercised without image fixtures.

use nalgebra::{Matrix3, Point2, Translation3, UnitQuaternion, Vector3};

use crate::camera::{CameraModel, ViewPose};
use crate::image::GrayImage;
use crate::pattern::PatternGeometry;

/// Deterministic poses that orbit the pattern: yaw and pitch vary per view,
/// the distance ramps up slowly. Keeps the board in front of the camera
/// while providing the orientation diversity the intrinsic solve needs.
pub fn orbit_poses(n_views: usize, distance: f64, center: Vector3<f64>) -> Vec<ViewPose> {
    (0..n_views)
        .map(|view_idx| {
            let k = view_idx as f64;
            let yaw = 0.25 * (0.9 * k).sin();
            let pitch = 0.2 * (0.7 * k + 1.0).cos();
            let roll = 0.05 * (0.5 * k).sin();
            let rotation = UnitQuaternion::from_euler_angles(pitch, yaw, roll);
            let translation = rotation * -center + Vector3::new(0.0, 0.0, distance + 8.0 * k);
            ViewPose::from_parts(Translation3::from(translation), rotation)
        })
        .collect()
}

/// Project every pattern corner through `pose`; panics only on poses that
/// place corners behind the camera, which synthetic setups must avoid.
pub fn project_pattern(
    model: &CameraModel,
    pose: &ViewPose,
    geometry: &PatternGeometry,
) -> Vec<Point2<f64>> {
    geometry
        .object_points()
        .iter()
        .map(|pw| {
            model
                .project_point(pose, pw)
                .unwrap_or_else(|| panic!("pattern corner {pw} behind camera"))
        })
        .collect()
}

const SHADE_DARK: f64 = 25.0;
const SHADE_LIGHT: f64 = 230.0;
const SUPERSAMPLE: usize = 4;

/// Render a distortion-free checkerboard view of `geometry` as seen through
/// `model.intrinsics` at `pose`.
///
/// The board spans one square beyond the inner-corner grid on every side;
/// pixels outside the board read as the light shade. Each pixel averages a
/// 4x4 supersample grid so edges are soft enough for gradient-based
/// refinement.
pub fn render_checkerboard(
    model: &CameraModel,
    pose: &ViewPose,
    geometry: &PatternGeometry,
) -> GrayImage {
    let (w, h) = model.image_size;
    let k = model.intrinsics.matrix();

    // H maps (X, Y, 1) on the z=0 board plane to homogeneous pixels.
    let r = pose.rotation.to_rotation_matrix();
    let rm = r.matrix();
    let t = pose.translation.vector;
    let mut plane_to_img = Matrix3::zeros();
    plane_to_img.set_column(0, &(k * rm.column(0)));
    plane_to_img.set_column(1, &(k * rm.column(1)));
    plane_to_img.set_column(2, &(k * t));
    let img_to_plane = plane_to_img
        .try_inverse()
        .expect("synthetic pose must induce an invertible homography");

    let (x_min, x_max) = (-geometry.dx, geometry.cols as f64 * geometry.dx);
    let (y_min, y_max) = (-geometry.dy, geometry.rows as f64 * geometry.dy);

    let mut data = vec![0u8; w * h];
    let step = 1.0 / SUPERSAMPLE as f64;

    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for sy in 0..SUPERSAMPLE {
                for sx in 0..SUPERSAMPLE {
                    let px = x as f64 + (sx as f64 + 0.5) * step - 0.5;
                    let py = y as f64 + (sy as f64 + 0.5) * step - 0.5;
                    let v = img_to_plane * Vector3::new(px, py, 1.0);
                    let (bx, by) = (v.x / v.z, v.y / v.z);

                    acc += if bx < x_min || bx > x_max || by < y_min || by > y_max {
                        SHADE_LIGHT
                    } else {
                        let iu = (bx / geometry.dx).floor() as i64;
                        let iv = (by / geometry.dy).floor() as i64;
                        if (iu + iv).rem_euclid(2) == 0 {
                            SHADE_DARK
                        } else {
                            SHADE_LIGHT
                        }
                    };
                }
            }
            data[y * w + x] = (acc / (SUPERSAMPLE * SUPERSAMPLE) as f64).round() as u8;
        }
    }

    GrayImage {
        width: w,
        height: h,
        data,
    }
}

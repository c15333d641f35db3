//! End-to-end pipeline test on synthetic renderings: images in, validated
//! camera model out.

use nalgebra::{Point2, Vector3};

use camcal_core::synthetic::{orbit_poses, project_pattern, render_checkerboard};
use camcal_core::{
    undistort_point, BrownConrady5, CalibError, CameraModel, GrayImage, PatternGeometry,
    PinholeIntrinsics,
};
use camcal_pipeline::{CalibrationPipeline, PipelineConfig};

fn ground_truth() -> CameraModel {
    CameraModel {
        intrinsics: PinholeIntrinsics {
            fx: 600.0,
            fy: 600.0,
            cx: 320.0,
            cy: 240.0,
        },
        distortion: BrownConrady5::default(),
        image_size: (640, 480),
    }
}

fn board_center(geometry: &PatternGeometry) -> Vector3<f64> {
    Vector3::new(
        (geometry.cols - 1) as f64 * geometry.dx * 0.5,
        (geometry.rows - 1) as f64 * geometry.dy * 0.5,
        0.0,
    )
}

fn rendered_views(model: &CameraModel, geometry: &PatternGeometry, n: usize) -> Vec<GrayImage> {
    orbit_poses(n, 500.0, board_center(geometry))
        .iter()
        .map(|pose| render_checkerboard(model, pose, geometry))
        .collect()
}

#[test]
fn calibrates_a_rendered_checkerboard_scene() {
    let geometry = PatternGeometry::square(7, 7, 30.0);
    let model_gt = ground_truth();
    let images = rendered_views(&model_gt, &geometry, 6);

    let pipeline = CalibrationPipeline::new(geometry, PipelineConfig::default());
    let result = pipeline.calibrate(&images).expect("calibration succeeds");

    assert!(result.rms < 0.3, "rms = {}", result.rms);
    assert!(result.converged);
    assert_eq!(result.view_indices.len(), 6);

    let k = result.camera.intrinsics;
    assert!((k.fx - 600.0).abs() < 12.0, "fx = {}", k.fx);
    assert!((k.fy - 600.0).abs() < 12.0, "fy = {}", k.fy);
    assert!((k.cx - 320.0).abs() < 12.0, "cx = {}", k.cx);
    assert!((k.cy - 240.0).abs() < 12.0, "cy = {}", k.cy);

    // Rendered without distortion: the fitted coefficients stay small.
    let d = result.camera.distortion.as_vector();
    assert!(d.iter().all(|c| c.abs() < 0.05), "distortion {d:?}");
}

#[test]
fn refined_corners_stay_subpixel_accurate() {
    let geometry = PatternGeometry::square(7, 7, 30.0);
    let model_gt = ground_truth();
    let poses = orbit_poses(3, 500.0, board_center(&geometry));
    let images: Vec<GrayImage> = poses
        .iter()
        .map(|pose| render_checkerboard(&model_gt, pose, &geometry))
        .collect();

    let pipeline = CalibrationPipeline::new(geometry, PipelineConfig::default());
    let observations = pipeline.detect_all(&images);

    for (record, pose) in observations.iter().zip(poses.iter()) {
        let points = record.observation.points().expect("detected");
        let truth = project_pattern(&model_gt, pose, &geometry);
        let mean: f64 = points
            .iter()
            .zip(truth.iter())
            .map(|(p, t)| (p - t).norm())
            .sum::<f64>()
            / truth.len() as f64;
        assert!(mean < 0.35, "mean corner error {mean} px in view {}", record.index);
    }
}

#[test]
fn unreadable_views_get_not_found_records_at_their_index() {
    let geometry = PatternGeometry::square(7, 7, 30.0);
    let model_gt = ground_truth();
    let mut images = rendered_views(&model_gt, &geometry, 5);
    // A frame with no pattern at all, mid-batch.
    images[2] = GrayImage::new_filled(640, 480, 128);

    let pipeline = CalibrationPipeline::new(geometry, PipelineConfig::default());
    let observations = pipeline.detect_all(&images);

    assert_eq!(observations.len(), 5);
    for (i, record) in observations.iter().enumerate() {
        assert_eq!(record.index, i);
        assert_eq!(record.observation.is_detected(), i != 2);
    }

    let result = pipeline.calibrate(&images).expect("four views remain");
    assert_eq!(result.view_indices, vec![0, 1, 3, 4]);
}

#[test]
fn empty_batch_is_insufficient_views() {
    let geometry = PatternGeometry::square(7, 7, 30.0);
    let pipeline = CalibrationPipeline::new(geometry, PipelineConfig::default());
    let err = pipeline.calibrate(&[]).unwrap_err();
    assert!(matches!(err, CalibError::InsufficientViews { found: 0, .. }));
}

#[test]
fn mismatched_resolution_is_rejected() {
    let geometry = PatternGeometry::square(7, 7, 30.0);
    let model_gt = ground_truth();
    let mut images = rendered_views(&model_gt, &geometry, 3);
    images[1] = GrayImage::new_filled(320, 240, 128);

    let pipeline = CalibrationPipeline::new(geometry, PipelineConfig::default());
    let err = pipeline.calibrate(&images).unwrap_err();
    assert!(matches!(
        err,
        CalibError::ResolutionMismatch { index: 1, .. }
    ));
}

#[test]
fn calibrated_model_undistorts_its_own_corners() {
    let geometry = PatternGeometry::square(7, 7, 30.0);
    let model_gt = ground_truth();
    let images = rendered_views(&model_gt, &geometry, 6);

    let pipeline = CalibrationPipeline::new(geometry, PipelineConfig::default());
    let result = pipeline.calibrate(&images).expect("calibration succeeds");

    // With near-zero distortion the point-level inverse is near-identity.
    let p = Point2::new(123.0, 321.0);
    let u = undistort_point(&result.camera, p, None);
    assert!((u - p).norm() < 2.0, "undistorted {u:?} from {p:?}");

    let corrected = pipeline.undistort_all(&images, &result.camera);
    assert_eq!(corrected.len(), images.len());
    assert_eq!(corrected[0].width, images[0].width);
}

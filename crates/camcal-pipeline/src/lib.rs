//! Batch calibration pipeline.
//!
//! Runs detection and subpixel refinement concurrently per image (images
//! share no mutable state), collects the results keyed by original image
//! index, and hands the usable views to the solver in one pass. The
//! solver itself stays single-threaded; its iteration cap bounds runtime.

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use camcal_core::{
    undistort_image, CalibError, CameraModel, GrayImage, ImageObservation, Interpolation,
    PatternGeometry,
};
use camcal_chessboard::{refine_observation, ChessboardDetector, ChessboardParams, RefineParams};
use camcal_solve::{calibrate, CalibrationResult, SolveOptions};

/// Explicit configuration for one calibration run; no embedded constants.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub detector: ChessboardParams,
    pub refine: RefineParams,
    pub solve: SolveOptions,
}

/// Batch pipeline over a fixed pattern geometry.
pub struct CalibrationPipeline {
    pub geometry: PatternGeometry,
    pub config: PipelineConfig,
}

impl CalibrationPipeline {
    pub fn new(geometry: PatternGeometry, config: PipelineConfig) -> Self {
        Self { geometry, config }
    }

    /// Detect and refine pattern corners in every image.
    ///
    /// Images are processed in parallel; the output carries exactly one
    /// record per input image, in input order, regardless of completion
    /// order.
    pub fn detect_all(&self, images: &[GrayImage]) -> Vec<ImageObservation> {
        let detector = ChessboardDetector::new(self.config.detector);

        let observations: Vec<ImageObservation> = images
            .par_iter()
            .enumerate()
            .map(|(index, image)| {
                let view = image.as_view();
                let raw = detector.detect(&view, &self.geometry);
                let refined = refine_observation(&view, &raw, &self.config.refine);
                ImageObservation::new(index, refined)
            })
            .collect();

        let found = observations
            .iter()
            .filter(|o| o.observation.is_detected())
            .count();
        info!("pattern found in {} of {} images", found, images.len());
        observations
    }

    /// Full run: detect, refine, and solve.
    ///
    /// All images must share one resolution; the first image defines it.
    pub fn calibrate(&self, images: &[GrayImage]) -> Result<CalibrationResult, CalibError> {
        let Some(first) = images.first() else {
            return Err(CalibError::InsufficientViews {
                found: 0,
                required: self.config.solve.min_views.max(3),
            });
        };
        let image_size = (first.width, first.height);
        for (index, image) in images.iter().enumerate() {
            if (image.width, image.height) != image_size {
                return Err(CalibError::ResolutionMismatch {
                    index,
                    got: (image.width, image.height),
                    expected: image_size,
                });
            }
        }

        let observations = self.detect_all(images);
        self.solve(&observations, image_size)
    }

    /// Solve from observations produced earlier (e.g. to reuse them for
    /// diagnostics or overlays).
    pub fn solve(
        &self,
        observations: &[ImageObservation],
        image_size: (usize, usize),
    ) -> Result<CalibrationResult, CalibError> {
        calibrate(observations, &self.geometry, image_size, &self.config.solve)
    }

    /// Undistort a batch of images with a previously computed model.
    pub fn undistort_all(&self, images: &[GrayImage], model: &CameraModel) -> Vec<GrayImage> {
        images
            .par_iter()
            .map(|image| undistort_image(&image.as_view(), model, None, Interpolation::Bilinear))
            .collect()
    }
}

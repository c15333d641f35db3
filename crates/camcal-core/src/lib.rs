//! Core types and utilities for planar camera calibration.
//!
//! This crate is intentionally small and purely numeric. It does *not*
//! depend on any concrete corner detector or image codec; images are plain
//! row-major byte buffers and all geometry is `nalgebra`-based.

mod camera;
mod error;
mod homography;
mod image;
mod logger;
mod observation;
mod pattern;
mod undistort;

pub mod synthetic;

pub use camera::{BrownConrady5, CameraModel, PinholeIntrinsics, ViewPose};
pub use error::CalibError;
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};
pub use observation::{CornerObservation, ImageObservation};
pub use pattern::PatternGeometry;
pub use undistort::{undistort_image, undistort_point, Interpolation};

pub use logger::init_with_level;

//! `camcal`: planar camera calibration from checkerboard photos.
//!
//! `camcal calibrate` detects the pattern in every input image, solves for
//! the shared camera model, and stores it as JSON; `camcal undistort`
//! applies a stored model to new images. Unreadable images are skipped with
//! a warning and never abort the batch.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use log::{info, warn, LevelFilter};
use thiserror::Error;

use camcal_core::{init_with_level, CalibError, CameraModel, GrayImage, PatternGeometry};
use camcal_pipeline::{CalibrationPipeline, PipelineConfig};

#[derive(Parser)]
#[command(
    name = "camcal",
    version,
    about = "Planar camera calibration from checkerboard photos"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Calibrate a camera from checkerboard images.
    Calibrate(CalibrateArgs),
    /// Undistort images with a previously stored camera model.
    Undistort(UndistortArgs),
}

#[derive(Args)]
struct CalibrateArgs {
    /// Inner corners per row of the pattern.
    #[arg(long)]
    cols: usize,

    /// Inner corners per column of the pattern.
    #[arg(long)]
    rows: usize,

    /// Physical spacing between adjacent corners, in your world unit.
    #[arg(long, default_value_t = 1.0)]
    spacing: f64,

    /// Where to write the camera model JSON.
    #[arg(short, long)]
    output: PathBuf,

    /// Minimal number of usable views before calibration aborts.
    #[arg(long, default_value_t = 3)]
    min_views: usize,

    /// Write corner-overlay images into this directory.
    #[arg(long)]
    corners_dir: Option<PathBuf>,

    /// Write undistorted copies of the inputs into this directory.
    #[arg(long)]
    undistorted_dir: Option<PathBuf>,

    /// Calibration images.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Args)]
struct UndistortArgs {
    /// Camera model JSON produced by `camcal calibrate`.
    #[arg(short, long)]
    model: PathBuf,

    /// Directory for the corrected images.
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Images to undistort.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("none of the {0} input images could be read")]
    NoReadableImages(usize),

    #[error(transparent)]
    Calibration(#[from] CalibError),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("camera model: {0}")]
    Model(#[from] serde_json::Error),

    #[error("{}: {source}", .path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let _ = init_with_level(level);

    if let Err(err) = run(cli.command) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), CliError> {
    match command {
        Command::Calibrate(args) => run_calibrate(args),
        Command::Undistort(args) => run_undistort(args),
    }
}

/// Load every readable image as grayscale, keeping its path. Unreadable
/// files are skipped with a warning; an empty result is an error.
fn load_images(paths: &[PathBuf]) -> Result<Vec<(PathBuf, GrayImage)>, CliError> {
    let mut loaded = Vec::with_capacity(paths.len());
    for path in paths {
        match image::open(path) {
            Ok(img) => {
                let luma = img.to_luma8();
                let (w, h) = luma.dimensions();
                let gray = GrayImage::from_raw(w as usize, h as usize, luma.into_raw())
                    .expect("luma8 buffer length matches its dimensions");
                loaded.push((path.clone(), gray));
            }
            Err(err) => warn!("unable to load image {}: {err}", path.display()),
        }
    }
    if loaded.is_empty() {
        return Err(CliError::NoReadableImages(paths.len()));
    }
    info!("{} of {} images loaded", loaded.len(), paths.len());
    Ok(loaded)
}

fn save_gray(img: &GrayImage, path: &Path) -> Result<(), CliError> {
    if let Some(dir) = nonempty_parent(path) {
        fs::create_dir_all(dir).map_err(|source| CliError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let buf = image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data.clone())
        .expect("buffer length matches dimensions");
    buf.save(path).map_err(|source| CliError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Render detected corners as crosses on top of the grayscale input; the
/// first corner is highlighted so the scan origin is visible.
fn save_corner_overlay(
    img: &GrayImage,
    corners: &[nalgebra::Point2<f64>],
    path: &Path,
) -> Result<(), CliError> {
    let mut rgb = image::RgbImage::new(img.width as u32, img.height as u32);
    for (i, px) in img.data.iter().enumerate() {
        let (x, y) = ((i % img.width) as u32, (i / img.width) as u32);
        rgb.put_pixel(x, y, image::Rgb([*px, *px, *px]));
    }

    for (idx, corner) in corners.iter().enumerate() {
        let color = if idx == 0 {
            image::Rgb([0, 220, 0])
        } else {
            image::Rgb([230, 40, 40])
        };
        let (cx, cy) = (corner.x.round() as i64, corner.y.round() as i64);
        for d in -4i64..=4 {
            for (x, y) in [(cx + d, cy), (cx, cy + d)] {
                if x >= 0 && y >= 0 && (x as usize) < img.width && (y as usize) < img.height {
                    rgb.put_pixel(x as u32, y as u32, color);
                }
            }
        }
    }

    if let Some(dir) = nonempty_parent(path) {
        fs::create_dir_all(dir).map_err(|source| CliError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    rgb.save(path).map_err(|source| CliError::Image {
        path: path.to_path_buf(),
        source,
    })
}

fn output_name(dir: &Path, input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    dir.join(format!("{stem}_{suffix}.png"))
}

fn run_calibrate(args: CalibrateArgs) -> Result<(), CliError> {
    let loaded = load_images(&args.images)?;
    let images: Vec<GrayImage> = loaded.iter().map(|(_, img)| img.clone()).collect();

    let geometry = PatternGeometry::square(args.cols, args.rows, args.spacing);
    let mut config = PipelineConfig::default();
    config.solve.min_views = args.min_views;
    let pipeline = CalibrationPipeline::new(geometry, config);

    let image_size = (images[0].width, images[0].height);
    let observations = pipeline.detect_all(&images);

    if let Some(dir) = &args.corners_dir {
        for (record, (path, img)) in observations.iter().zip(loaded.iter()) {
            if let Some(points) = record.observation.points() {
                save_corner_overlay(img, points, &output_name(dir, path, "corners"))?;
            }
        }
    }

    let result = pipeline.solve(&observations, image_size)?;

    println!("Intrinsics:");
    println!("{:.4}", result.camera.intrinsics.matrix());
    println!(
        "Distortion coefficients [k1 k2 p1 p2 k3]: {:?}",
        result.camera.distortion.as_vector()
    );
    println!("RMS reprojection error: {:.4} px", result.rms);
    if !result.converged {
        warn!("refinement hit its iteration cap; judge the model by its RMS");
    }
    for &view in &result.view_indices {
        info!("used view {} ({})", view, loaded[view].0.display());
    }

    if let Some(dir) = nonempty_parent(&args.output) {
        fs::create_dir_all(dir).map_err(|source| CliError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let json = serde_json::to_string_pretty(&result.camera)?;
    fs::write(&args.output, json).map_err(|source| CliError::Io {
        path: args.output.clone(),
        source,
    })?;
    info!("camera model written to {}", args.output.display());

    if let Some(dir) = &args.undistorted_dir {
        let corrected = pipeline.undistort_all(&images, &result.camera);
        for ((path, _), img) in loaded.iter().zip(corrected.iter()) {
            save_gray(img, &output_name(dir, path, "undistorted"))?;
        }
        info!("{} undistorted images written", corrected.len());
    }

    Ok(())
}

fn nonempty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

fn run_undistort(args: UndistortArgs) -> Result<(), CliError> {
    let json = fs::read_to_string(&args.model).map_err(|source| CliError::Io {
        path: args.model.clone(),
        source,
    })?;
    let model: CameraModel = serde_json::from_str(&json)?;

    let loaded = load_images(&args.images)?;
    for (path, img) in &loaded {
        if (img.width, img.height) != model.image_size {
            warn!(
                "{}: resolution {}x{} differs from the calibrated {}x{}",
                path.display(),
                img.width,
                img.height,
                model.image_size.0,
                model.image_size.1
            );
        }
        let corrected = camcal_core::undistort_image(
            &img.as_view(),
            &model,
            None,
            camcal_core::Interpolation::Bilinear,
        );
        save_gray(&corrected, &output_name(&args.output_dir, path, "undistorted"))?;
    }
    info!("{} undistorted images written", loaded.len());
    Ok(())
}

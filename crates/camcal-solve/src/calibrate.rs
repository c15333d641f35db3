use log::{info, warn};
use nalgebra::{DVector, Point2, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use camcal_core::{
    estimate_homography, BrownConrady5, CalibError, CameraModel, ImageObservation,
    PatternGeometry, PinholeIntrinsics, ViewPose,
};

use crate::intrinsics::intrinsics_from_homographies;
use crate::lm::{minimize, LmOptions};
use crate::pose::pose_from_homography;

/// Options for the calibration solve.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SolveOptions {
    /// Minimal number of usable views; below it calibration aborts with
    /// [`CalibError::InsufficientViews`]. Clamped to 3, the closed-form
    /// minimum.
    pub min_views: usize,
    /// Iteration cap of the joint refinement.
    pub max_iters: usize,
    /// Relative cost-decrease tolerance of the joint refinement.
    pub ftol: f64,
    /// Step-norm tolerance of the joint refinement.
    pub xtol: f64,
    /// Keep the sixth-order radial term k3 fixed at zero. Most lenses and
    /// view sets do not constrain it well.
    pub fix_k3: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            min_views: 3,
            max_iters: 60,
            ftol: 1e-12,
            xtol: 1e-12,
            fix_k3: true,
        }
    }
}

/// Output of a calibration run: the shared camera model, per-view poses
/// keyed back to original image indices, and the quality measures a caller
/// needs to accept or reject the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera: CameraModel,
    /// One pose per solved view, ordered as `view_indices`.
    pub poses: Vec<ViewPose>,
    /// Original image index of each solved view.
    pub view_indices: Vec<usize>,
    /// Root-mean-square reprojection error over all views and corners,
    /// in pixels.
    pub rms: f64,
    /// False when the joint refinement hit its iteration cap; the model is
    /// then best-effort and must be judged by `rms`.
    pub converged: bool,
}

// Parameter vector layout: 9 shared + 6 per view.
const NUM_SHARED: usize = 9;
const NUM_PER_VIEW: usize = 6;

fn unpack_camera(params: &DVector<f64>, image_size: (usize, usize)) -> CameraModel {
    CameraModel {
        intrinsics: PinholeIntrinsics {
            fx: params[0],
            fy: params[1],
            cx: params[2],
            cy: params[3],
        },
        distortion: BrownConrady5 {
            k1: params[4],
            k2: params[5],
            p1: params[6],
            p2: params[7],
            k3: params[8],
        },
        image_size,
    }
}

fn unpack_pose(params: &DVector<f64>, view: usize) -> ViewPose {
    let base = NUM_SHARED + view * NUM_PER_VIEW;
    let rvec = Vector3::new(params[base], params[base + 1], params[base + 2]);
    let tvec = Vector3::new(params[base + 3], params[base + 4], params[base + 5]);
    ViewPose::from_parts(
        Translation3::from(tvec),
        UnitQuaternion::from_scaled_axis(rvec),
    )
}

fn pack_initial(
    intr: &PinholeIntrinsics,
    poses: &[ViewPose],
) -> DVector<f64> {
    let mut x = DVector::zeros(NUM_SHARED + poses.len() * NUM_PER_VIEW);
    x[0] = intr.fx;
    x[1] = intr.fy;
    x[2] = intr.cx;
    x[3] = intr.cy;
    // distortion starts at zero
    for (v, pose) in poses.iter().enumerate() {
        let base = NUM_SHARED + v * NUM_PER_VIEW;
        let rvec = pose.rotation.scaled_axis();
        let tvec = pose.translation.vector;
        x[base] = rvec.x;
        x[base + 1] = rvec.y;
        x[base + 2] = rvec.z;
        x[base + 3] = tvec.x;
        x[base + 4] = tvec.y;
        x[base + 5] = tvec.z;
    }
    x
}

/// Total reprojection residuals for the packed parameter vector.
fn reprojection_residuals(
    params: &DVector<f64>,
    views: &[&[Point2<f64>]],
    object_points: &[Point3<f64>],
    image_size: (usize, usize),
) -> DVector<f64> {
    let camera = unpack_camera(params, image_size);
    let total: usize = views.iter().map(|v| v.len()).sum();
    let mut r = DVector::zeros(2 * total);

    let mut row = 0;
    for (v, observed) in views.iter().enumerate() {
        let pose = unpack_pose(params, v);
        for (pw, obs) in object_points.iter().zip(observed.iter()) {
            match camera.project_point(&pose, pw) {
                Some(pred) => {
                    r[row] = pred.x - obs.x;
                    r[row + 1] = pred.y - obs.y;
                }
                None => {
                    // Point behind the camera: bounded penalty keeps the
                    // optimizer from chasing infinities.
                    r[row] = 1e4;
                    r[row + 1] = 1e4;
                }
            }
            row += 2;
        }
    }
    r
}

/// Calibrate a camera from per-image corner observations.
///
/// Only `Detected` observations participate; `NotFound` records are skipped
/// (their indices simply do not appear in `view_indices`). Fewer usable
/// views than `opts.min_views` aborts with a distinct error rather than
/// returning a low-confidence model.
pub fn calibrate(
    observations: &[ImageObservation],
    geometry: &PatternGeometry,
    image_size: (usize, usize),
    opts: &SolveOptions,
) -> Result<CalibrationResult, CalibError> {
    let expected = geometry.corner_count();
    let plane = geometry.plane_points();
    let object_points = geometry.object_points();

    let mut views: Vec<&[Point2<f64>]> = Vec::new();
    let mut view_indices = Vec::new();
    let mut homographies = Vec::new();

    for record in observations {
        let Some(points) = record.observation.points() else {
            continue;
        };
        if points.len() != expected {
            return Err(CalibError::CornerCountMismatch {
                index: record.index,
                got: points.len(),
                expected,
            });
        }
        match estimate_homography(&plane, points) {
            Some(h) => {
                views.push(points);
                view_indices.push(record.index);
                homographies.push(h.h);
            }
            None => warn!(
                "image {}: degenerate homography, view excluded",
                record.index
            ),
        }
    }

    let required = opts.min_views.max(3);
    if views.len() < required {
        return Err(CalibError::InsufficientViews {
            found: views.len(),
            required,
        });
    }
    info!("calibrating from {} views", views.len());

    let intr0 = intrinsics_from_homographies(&homographies)?;
    let k0 = intr0.matrix();
    let poses0 = homographies
        .iter()
        .map(|h| pose_from_homography(&k0, h))
        .collect::<Result<Vec<_>, _>>()?;

    let x0 = pack_initial(&intr0, &poses0);

    // Reduced parameterization: the LM sees only the free entries.
    let fixed_k3 = opts.fix_k3;
    let free: Vec<usize> = (0..x0.len()).filter(|&i| !(fixed_k3 && i == 8)).collect();
    let x0_red = DVector::from_iterator(free.len(), free.iter().map(|&i| x0[i]));

    let expand = {
        let x_full = x0.clone();
        let free = free.clone();
        move |x_red: &DVector<f64>| {
            let mut full = x_full.clone();
            for (slot, &i) in free.iter().enumerate() {
                full[i] = x_red[slot];
            }
            full
        }
    };

    let residual_fn = {
        let views = views.clone();
        let object_points = object_points.clone();
        let expand = expand.clone();
        move |x_red: &DVector<f64>| {
            reprojection_residuals(&expand(x_red), &views, &object_points, image_size)
        }
    };

    let lm_opts = LmOptions {
        max_iters: opts.max_iters,
        ftol: opts.ftol,
        xtol: opts.xtol,
        ..LmOptions::default()
    };
    let (x_opt_red, report) = minimize(residual_fn, x0_red, &lm_opts);
    if !report.converged {
        warn!(
            "joint refinement hit the iteration cap ({} iterations)",
            report.iterations
        );
    }

    let x_opt = expand(&x_opt_red);
    if x_opt.iter().any(|v| !v.is_finite()) {
        return Err(CalibError::DegenerateGeometry(
            "non-finite parameters after refinement".into(),
        ));
    }

    let camera = unpack_camera(&x_opt, image_size);
    let poses: Vec<ViewPose> = (0..views.len()).map(|v| unpack_pose(&x_opt, v)).collect();

    let total_points: usize = views.iter().map(|v| v.len()).sum();
    let r = reprojection_residuals(&x_opt, &views, &object_points, image_size);
    let rms = (r.norm_squared() / total_points as f64).sqrt();
    info!(
        "calibration finished: rms = {:.4} px over {} corners",
        rms, total_points
    );

    Ok(CalibrationResult {
        camera,
        poses,
        view_indices,
        rms,
        converged: report.converged,
    })
}

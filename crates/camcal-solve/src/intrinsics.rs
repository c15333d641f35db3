use nalgebra::{DMatrix, Matrix3, SVector};

use camcal_core::{CalibError, PinholeIntrinsics};

/// Build the 6-vector v_ij(H) of Zhang's method for columns i, j of H.
fn v_ij(hmtx: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = hmtx.column(i);
    let hj = hmtx.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate camera intrinsics from a set of plane homographies using Zhang's
/// closed-form solution (no distortion). The skew term of the closed form is
/// dropped; the returned model assumes zero skew.
///
/// Needs at least 3 homographies with orientation diversity; degenerate
/// configurations are reported, never asserted away.
pub fn intrinsics_from_homographies(
    hmtxs: &[Matrix3<f64>],
) -> Result<PinholeIntrinsics, CalibError> {
    if hmtxs.len() < 3 {
        return Err(CalibError::DegenerateGeometry(format!(
            "need at least 3 homographies for intrinsics estimation, got {}",
            hmtxs.len()
        )));
    }

    let m = hmtxs.len();
    let mut vmtx = DMatrix::<f64>::zeros(2 * m, 6);

    for (k, hmtx) in hmtxs.iter().enumerate() {
        let v11 = v_ij(hmtx, 0, 0);
        let v22 = v_ij(hmtx, 1, 1);
        let v12 = v_ij(hmtx, 0, 1);

        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    // Solve V b = 0: singular vector of the smallest singular value.
    let svd = vmtx.svd(true, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| CalibError::DegenerateGeometry("SVD failed on Zhang system".into()))?;
    let b = v_t.row(v_t.nrows() - 1);

    let mut b11 = b[0];
    let mut b12 = b[1];
    let mut b22 = b[2];
    let mut b13 = b[3];
    let mut b23 = b[4];
    let mut b33 = b[5];

    let solve_core = |b11: f64, b12: f64, b22: f64, b13: f64, b23: f64, b33: f64| {
        let denom = b11 * b22 - b12 * b12;
        if denom.abs() < 1e-18 || b11.abs() < 1e-18 {
            return None;
        }
        let v0 = (b12 * b13 - b11 * b23) / denom;
        let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
        Some((denom, v0, lambda))
    };

    let mut core = solve_core(b11, b12, b22, b13, b23, b33)
        .ok_or_else(|| CalibError::DegenerateGeometry("ill-conditioned Zhang system".into()))?;

    // The nullspace sign is arbitrary; flip once if it put lambda below zero.
    if core.2 <= 0.0 {
        b11 = -b11;
        b12 = -b12;
        b22 = -b22;
        b13 = -b13;
        b23 = -b23;
        b33 = -b33;
        core = solve_core(b11, b12, b22, b13, b23, b33).ok_or_else(|| {
            CalibError::DegenerateGeometry("ill-conditioned Zhang system after sign flip".into())
        })?;
    }

    let (denom, v0, lambda) = core;
    if lambda <= 0.0 || lambda / b11 <= 0.0 || lambda * b11 / denom <= 0.0 {
        return Err(CalibError::DegenerateGeometry(
            "invalid lambda in intrinsics estimation; check view diversity".into(),
        ));
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let intr = PinholeIntrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
    };
    if ![intr.fx, intr.fy, intr.cx, intr.cy]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(CalibError::DegenerateGeometry(
            "non-finite intrinsics from closed-form estimate".into(),
        ));
    }
    Ok(intr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Vector3};

    fn make_kmtx() -> (PinholeIntrinsics, Matrix3<f64>) {
        let intr = PinholeIntrinsics {
            fx: 900.0,
            fy: 880.0,
            cx: 640.0,
            cy: 360.0,
        };
        (intr, intr.matrix())
    }

    // For the Z=0 plane, H = K [r1 r2 t]
    fn synthetic_homography(
        kmtx: &Matrix3<f64>,
        rot: Rotation3<f64>,
        t: Vector3<f64>,
    ) -> Matrix3<f64> {
        let r_mat = rot.matrix();
        let mut hmtx = Matrix3::zeros();
        hmtx.set_column(0, &(kmtx * r_mat.column(0)));
        hmtx.set_column(1, &(kmtx * r_mat.column(1)));
        hmtx.set_column(2, &(kmtx * t));
        hmtx
    }

    fn three_views(kmtx: &Matrix3<f64>) -> Vec<Matrix3<f64>> {
        vec![
            synthetic_homography(
                kmtx,
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(0.1, -0.05, 1.0),
            ),
            synthetic_homography(
                kmtx,
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-0.05, 0.1, 1.2),
            ),
            synthetic_homography(
                kmtx,
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 0.9),
            ),
        ]
    }

    #[test]
    fn recovers_intrinsics_from_homographies() {
        let (intr_gt, kmtx) = make_kmtx();
        let intr_est = intrinsics_from_homographies(&three_views(&kmtx)).unwrap();

        assert!((intr_est.fx - intr_gt.fx).abs() < 5.0, "fx mismatch");
        assert!((intr_est.fy - intr_gt.fy).abs() < 5.0, "fy mismatch");
        assert!((intr_est.cx - intr_gt.cx).abs() < 10.0, "cx mismatch");
        assert!((intr_est.cy - intr_gt.cy).abs() < 10.0, "cy mismatch");
    }

    #[test]
    fn sign_flipped_nullspace_still_recovers() {
        let (intr_gt, kmtx) = make_kmtx();
        // The estimate must be invariant to the overall homography scale sign.
        let flipped: Vec<Matrix3<f64>> = three_views(&kmtx).iter().map(|h| -h).collect();
        let intr_est = intrinsics_from_homographies(&flipped).unwrap();
        assert!((intr_est.fx - intr_gt.fx).abs() < 5.0);
        assert!((intr_est.fy - intr_gt.fy).abs() < 5.0);
    }

    #[test]
    fn too_few_homographies_is_an_error() {
        let (_, kmtx) = make_kmtx();
        let hs = three_views(&kmtx);
        assert!(matches!(
            intrinsics_from_homographies(&hs[..2]),
            Err(CalibError::DegenerateGeometry(_))
        ));
    }
}

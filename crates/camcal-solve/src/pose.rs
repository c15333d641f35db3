use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

use camcal_core::{CalibError, ViewPose};

/// Decompose a plane-induced homography into a pose given intrinsics K.
///
/// Classic decomposition for a target on its own `Z = 0` plane:
/// `H ~ K [r1 r2 t]`. The first two rotation columns come from `K^{-1} H`
/// up to a common scale, the third completes the right-handed frame, and the
/// result is projected onto SO(3) by polar decomposition.
pub fn pose_from_homography(
    kmtx: &Matrix3<f64>,
    hmtx: &Matrix3<f64>,
) -> Result<ViewPose, CalibError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or_else(|| CalibError::DegenerateGeometry("non-invertible intrinsics".into()))?;

    // The homography scale sign is arbitrary; pick the one that puts the
    // target in front of the camera.
    let mut hm = *hmtx;
    if (k_inv * hm.column(2))[2] < 0.0 {
        hm = -hm;
    }

    let k_inv_h1 = k_inv * hm.column(0);
    let k_inv_h2 = k_inv * hm.column(1);

    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    if norm1 < 1e-12 || norm2 < 1e-12 {
        return Err(CalibError::DegenerateGeometry(
            "homography with vanishing rotation columns".into(),
        ));
    }
    let lambda = 1.0 / ((norm1 + norm2) * 0.5);

    let r1 = lambda * k_inv_h1;
    let r2 = lambda * k_inv_h2;
    let r3 = r1.cross(&r2);

    let mut r_mat = Matrix3::<f64>::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    // Project onto SO(3) (polar decomposition via SVD).
    let svd = r_mat.svd(true, true);
    let mut u = svd
        .u
        .ok_or_else(|| CalibError::DegenerateGeometry("SVD failed on rotation estimate".into()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| CalibError::DegenerateGeometry("SVD failed on rotation estimate".into()))?;
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    let r_orth = u * v_t;

    let t_vec: Vector3<f64> = lambda * (k_inv * hm.column(2));
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(ViewPose::from_parts(Translation3::from(t_vec), rot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camcal_core::PinholeIntrinsics;
    use nalgebra::Isometry3;

    fn make_kmtx() -> Matrix3<f64> {
        PinholeIntrinsics {
            fx: 800.0,
            fy: 780.0,
            cx: 640.0,
            cy: 360.0,
        }
        .matrix()
    }

    fn homography_for(kmtx: &Matrix3<f64>, iso: &Isometry3<f64>) -> Matrix3<f64> {
        let binding = iso.rotation.to_rotation_matrix();
        let r_mat = binding.matrix();
        let t = iso.translation.vector;

        let mut hmtx = Matrix3::zeros();
        hmtx.set_column(0, &(kmtx * r_mat.column(0)));
        hmtx.set_column(1, &(kmtx * r_mat.column(1)));
        hmtx.set_column(2, &(kmtx * t));
        hmtx
    }

    #[test]
    fn recovers_pose_from_homography() {
        let kmtx = make_kmtx();
        let rot = Rotation3::from_euler_angles(0.1, -0.05, 0.2);
        let iso_gt = Isometry3::from_parts(Translation3::new(0.1, -0.05, 1.0), rot.into());

        let hmtx = homography_for(&kmtx, &iso_gt);
        let iso_est = pose_from_homography(&kmtx, &hmtx).unwrap();

        assert!((iso_est.translation.vector - iso_gt.translation.vector).norm() < 1e-6);

        let r_est_binding = iso_est.rotation.to_rotation_matrix();
        let r_gt_binding = iso_gt.rotation.to_rotation_matrix();
        let r_diff = r_est_binding.matrix().transpose() * r_gt_binding.matrix();
        let angle = ((r_diff.trace() - 1.0) * 0.5).clamp(-1.0, 1.0).acos();
        assert!(angle < 1e-6, "rotation error too large: {angle}");
    }

    #[test]
    fn negated_homography_yields_the_same_pose() {
        let kmtx = make_kmtx();
        let rot = Rotation3::from_euler_angles(-0.15, 0.1, 0.0);
        let iso_gt = Isometry3::from_parts(Translation3::new(0.0, 0.1, 1.4), rot.into());

        let hmtx = homography_for(&kmtx, &iso_gt);
        let a = pose_from_homography(&kmtx, &hmtx).unwrap();
        let b = pose_from_homography(&kmtx, &(-hmtx)).unwrap();

        assert!((a.translation.vector - b.translation.vector).norm() < 1e-12);
        assert!(a.rotation.angle_to(&b.rotation) < 1e-12);
    }
}

//! Construction and validation of rigid transforms from raw components.
//!
//! An [`Isometry3`] built through nalgebra's checked constructors is always
//! a valid rigid transform.  Raw numbers arriving from the outside (message
//! fields, config files) pass through [`rigid_transform`] first, which
//! normalizes the rotation or rejects it.

use driftless_types::LocalizationError;
use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};

/// Quaternions shorter than this cannot be normalized meaningfully.
const MIN_QUATERNION_NORM: f64 = 1e-9;

/// Largest deviation from unit length tolerated by [`validate`].
const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// Build a rigid transform from a translation and an `[x, y, z, w]`
/// quaternion, normalizing the quaternion.
///
/// # Errors
///
/// [`LocalizationError::DegenerateTransform`] when any component is not
/// finite or the quaternion norm is (close to) zero.
pub fn rigid_transform(
    translation: [f64; 3],
    rotation_xyzw: [f64; 4],
) -> Result<Isometry3<f64>, LocalizationError> {
    if translation.iter().any(|c| !c.is_finite()) {
        return Err(LocalizationError::DegenerateTransform(format!(
            "non-finite translation {translation:?}"
        )));
    }
    let [x, y, z, w] = rotation_xyzw;
    let q = Quaternion::new(w, x, y, z);
    let norm = q.norm();
    if !norm.is_finite() || norm < MIN_QUATERNION_NORM {
        return Err(LocalizationError::DegenerateTransform(format!(
            "quaternion {rotation_xyzw:?} has norm {norm}"
        )));
    }
    Ok(Isometry3::from_parts(
        Translation3::new(translation[0], translation[1], translation[2]),
        UnitQuaternion::from_quaternion(q),
    ))
}

/// Planar pose: position in the XY plane and heading about +Z.
pub fn planar_pose(x: f64, y: f64, yaw: f64) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::new(x, y, 0.0),
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw),
    )
}

/// Check that `pose` holds finite numbers and a unit rotation.
///
/// Transforms assembled with `new_unchecked` or corrupted by arithmetic on
/// NaN inputs fail here.
pub fn validate(pose: &Isometry3<f64>) -> Result<(), LocalizationError> {
    if pose.translation.vector.iter().any(|c| !c.is_finite()) {
        return Err(LocalizationError::DegenerateTransform(format!(
            "non-finite translation {:?}",
            pose.translation.vector.as_slice()
        )));
    }
    let norm = pose.rotation.quaternion().norm();
    if !norm.is_finite() || (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
        return Err(LocalizationError::DegenerateTransform(format!(
            "rotation is not a unit quaternion (norm {norm})"
        )));
    }
    Ok(())
}

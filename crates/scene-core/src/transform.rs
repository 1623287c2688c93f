//! Placement-matrix resolution
//!
//! A source may report where its scene sits in the consumer's space. When it
//! doesn't, the placement is inferred from the first floor in the scene: the
//! floor's own placement is undone and the result is rotated so the floor
//! normal becomes the consumer's up axis.

use crate::constants::{FLOOR_ALIGNMENT_DEGREES, MIN_PLACEMENT_DETERMINANT};
use crate::scene::Scene;
use glam::Mat4;

/// Fixed rotation from the floor-relative convention to the consumer's up axis
pub fn floor_alignment() -> Mat4 {
    Mat4::from_rotation_x(FLOOR_ALIGNMENT_DEGREES.to_radians())
}

/// Infer a placement matrix from scene content.
///
/// Pure: no I/O, no errors. A scene without a floor, or whose floor placement
/// cannot be inverted, resolves to identity.
pub fn resolve(scene: &Scene) -> Mat4 {
    let Some(floor) = scene.floor() else {
        return Mat4::IDENTITY;
    };

    let det = floor.placement.determinant();
    if !det.is_finite() || det.abs() < MIN_PLACEMENT_DETERMINANT {
        return Mat4::IDENTITY;
    }

    floor_alignment() * floor.placement.inverse()
}

/// Prefer a device-reported transform, otherwise infer one.
/// Returns the matrix and whether it was inferred.
pub fn read_or_infer(scene: &Scene, device_transform: Option<Mat4>) -> (Mat4, bool) {
    match device_transform {
        Some(m) => (m, false),
        None => (resolve(scene), true),
    }
}

/// Rotation about +X that turns the floor-relative frame (floor normal along Z)
/// into the consumer frame (up along Y), in degrees
pub const FLOOR_ALIGNMENT_DEGREES: f32 = 90.0;

/// Determinants smaller than this are treated as a non-invertible placement
pub const MIN_PLACEMENT_DETERMINANT: f32 = 1e-12;

//! Geometric helpers for collision and support checks between placements.

use crate::model::Placement;
use crate::types::{BoundingBox, Vec3};

/// Checks whether two placed units overlap.
///
/// Axis-aligned test: the units do NOT overlap if they are separated on at least
/// one axis. Shared faces are allowed.
pub fn intersects(a: &Placement, b: &Placement, tolerance: f64) -> bool {
    a.bounding_box().intersects(&b.bounding_box(), tolerance)
}

/// Area of the candidate footprint resting on the top faces of `placed`.
///
/// Only placements whose top lies within `height_epsilon` of the candidate's base
/// contribute.
pub fn supported_area(
    candidate: &BoundingBox,
    placed: &[Placement],
    height_epsilon: f64,
) -> f64 {
    placed
        .iter()
        .map(|p| p.bounding_box())
        .filter(|below| (below.top_z() - candidate.min.z).abs() <= height_epsilon)
        .map(|below| below.overlap_area_xy(candidate))
        .sum()
}

/// Whether a box anchored at `position` with `dims` is physically supported:
/// either on the carton floor or resting on at least `support_ratio` of its base
/// (any positive contact when the ratio is 0).
pub fn is_supported(
    position: Vec3,
    dims: Vec3,
    placed: &[Placement],
    support_ratio: f64,
    height_epsilon: f64,
) -> bool {
    if position.z <= height_epsilon {
        return true;
    }

    let candidate = BoundingBox::from_position_and_dims(position, dims);
    let area = supported_area(&candidate, placed, height_epsilon);
    if area <= 0.0 {
        return false;
    }
    area / dims.base_area() + 1e-9 >= support_ratio
}

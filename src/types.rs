//! Common types and traits for carton geometry.
//!
//! Lengths are in a single consistent unit (whatever the catalog uses, usually cm)
//! and weights in kg.

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Global numerical tolerance for floating-point comparisons.
pub const EPSILON_GENERAL: f64 = 1e-6;

/// Tolerance for height comparisons when deciding whether a unit rests on another.
pub const EPSILON_HEIGHT: f64 = 1e-3;

/// A 3D vector or point.
///
/// `x` runs along the carton length, `y` along its width and `z` along its height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Origin of a carton interior.
    #[inline]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline]
    pub const fn as_tuple(&self) -> (f64, f64, f64) {
        (self.x, self.y, self.z)
    }

    /// Product of all components. Meaningful for dimension vectors.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Footprint (x × y).
    #[inline]
    pub fn base_area(&self) -> f64 {
        self.x * self.y
    }

    /// Checks if all components are strictly positive and finite.
    #[inline]
    pub fn is_valid_dimension(&self) -> bool {
        self.x > 0.0
            && self.y > 0.0
            && self.z > 0.0
            && self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
    }

    /// Component-wise `<=` against a container, with tolerance.
    #[inline]
    pub fn fits_within(&self, container: &Self, tolerance: f64) -> bool {
        self.x <= container.x + tolerance
            && self.y <= container.y + tolerance
            && self.z <= container.z + tolerance
    }

    /// Components sorted ascending. Two boxes with equal sorted dimensions are
    /// interchangeable under free rotation.
    pub fn sorted_components(&self) -> [f64; 3] {
        let mut dims = [self.x, self.y, self.z];
        dims.sort_by(f64::total_cmp);
        dims
    }
}

impl Add for Vec3 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: f64) -> Self::Output {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl From<(f64, f64, f64)> for Vec3 {
    #[inline]
    fn from(tuple: (f64, f64, f64)) -> Self {
        Self::new(tuple.0, tuple.1, tuple.2)
    }
}

impl From<Vec3> for (f64, f64, f64) {
    #[inline]
    fn from(vec: Vec3) -> Self {
        vec.as_tuple()
    }
}

/// Objects with a spatial extent.
pub trait Dimensional {
    fn dimensions(&self) -> Vec3;

    fn volume(&self) -> f64 {
        self.dimensions().volume()
    }

    fn base_area(&self) -> f64 {
        self.dimensions().base_area()
    }

    fn fits_in(&self, container_dims: &Vec3, tolerance: f64) -> bool {
        self.dimensions().fits_within(container_dims, tolerance)
    }
}

/// Objects anchored somewhere inside a carton (lower-left-front corner).
pub trait Positioned {
    fn position(&self) -> Vec3;
}

/// Objects with a weight in kg.
pub trait Weighted {
    fn weight(&self) -> f64;
}

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[inline]
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_position_and_dims(position: Vec3, dims: Vec3) -> Self {
        Self {
            min: position,
            max: position + dims,
        }
    }

    /// Two boxes overlap only if their interiors intersect on all three axes.
    /// Touching faces do not count.
    #[inline]
    pub fn intersects(&self, other: &Self, tolerance: f64) -> bool {
        !(self.max.x <= other.min.x + tolerance
            || other.max.x <= self.min.x + tolerance
            || self.max.y <= other.min.y + tolerance
            || other.max.y <= self.min.y + tolerance
            || self.max.z <= other.min.z + tolerance
            || other.max.z <= self.min.z + tolerance)
    }

    /// Checks whether `other` lies completely inside this box.
    #[inline]
    pub fn contains_box(&self, other: &Self, tolerance: f64) -> bool {
        other.min.x >= self.min.x - tolerance
            && other.min.y >= self.min.y - tolerance
            && other.min.z >= self.min.z - tolerance
            && other.max.x <= self.max.x + tolerance
            && other.max.y <= self.max.y + tolerance
            && other.max.z <= self.max.z + tolerance
    }

    #[inline]
    fn overlap_1d(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> f64 {
        (a_max.min(b_max) - a_min.max(b_min)).max(0.0)
    }

    /// Overlap area of the two footprints in the XY plane.
    #[inline]
    pub fn overlap_area_xy(&self, other: &Self) -> f64 {
        let overlap_x = Self::overlap_1d(self.min.x, self.max.x, other.min.x, other.max.x);
        let overlap_y = Self::overlap_1d(self.min.y, self.max.y, other.min.y, other.max.y);
        overlap_x * overlap_y
    }

    #[inline]
    pub fn top_z(&self) -> f64 {
        self.max.z
    }

    #[inline]
    pub fn dimensions(&self) -> Vec3 {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
        assert_eq!(b - a, Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(a * 2.0, Vec3::new(2.0, 4.0, 6.0));
    }

    #[test]
    fn test_vec3_volume_and_area() {
        let dims = Vec3::new(10.0, 20.0, 30.0);
        assert!((dims.volume() - 6000.0).abs() < EPSILON_GENERAL);
        assert!((dims.base_area() - 200.0).abs() < EPSILON_GENERAL);
    }

    #[test]
    fn test_vec3_fits_within() {
        let small = Vec3::new(5.0, 5.0, 5.0);
        let large = Vec3::new(10.0, 10.0, 10.0);

        assert!(small.fits_within(&large, EPSILON_GENERAL));
        assert!(!large.fits_within(&small, EPSILON_GENERAL));
    }

    #[test]
    fn test_sorted_components() {
        assert_eq!(Vec3::new(30.0, 10.0, 20.0).sorted_components(), [10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_bounding_box_intersects() {
        let a = BoundingBox::from_position_and_dims(Vec3::zero(), Vec3::new(10.0, 10.0, 10.0));
        let b = BoundingBox::from_position_and_dims(
            Vec3::new(5.0, 5.0, 5.0),
            Vec3::new(10.0, 10.0, 10.0),
        );
        let touching = BoundingBox::from_position_and_dims(
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(10.0, 10.0, 10.0),
        );

        assert!(a.intersects(&b, EPSILON_GENERAL));
        assert!(!a.intersects(&touching, EPSILON_GENERAL));
    }

    #[test]
    fn test_bounding_box_contains_box() {
        let outer = BoundingBox::from_position_and_dims(Vec3::zero(), Vec3::new(20.0, 20.0, 20.0));
        let inner = BoundingBox::from_position_and_dims(
            Vec3::new(10.0, 10.0, 10.0),
            Vec3::new(10.0, 10.0, 10.0),
        );
        let poking_out = BoundingBox::from_position_and_dims(
            Vec3::new(15.0, 0.0, 0.0),
            Vec3::new(10.0, 10.0, 10.0),
        );

        assert!(outer.contains_box(&inner, EPSILON_GENERAL));
        assert!(!outer.contains_box(&poking_out, EPSILON_GENERAL));
    }

    #[test]
    fn test_bounding_box_overlap_area() {
        let a = BoundingBox::from_position_and_dims(Vec3::zero(), Vec3::new(10.0, 10.0, 10.0));
        let b = BoundingBox::from_position_and_dims(
            Vec3::new(5.0, 5.0, 0.0),
            Vec3::new(10.0, 10.0, 10.0),
        );

        let overlap = a.overlap_area_xy(&b);
        assert!((overlap - 25.0).abs() < EPSILON_GENERAL);
    }
}

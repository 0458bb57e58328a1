//! Axis-aligned bounding box

use crate::core::types::DVec3;

/// Axis-aligned bounding box defined by min and max corners
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// Create AABB from min and max corners
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Create AABB from center and half-extents
    pub fn from_center_half_extent(center: DVec3, half_extent: DVec3) -> Self {
        Self {
            min: center - half_extent,
            max: center + half_extent,
        }
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Radius of the sphere enclosing the box
    pub fn bounding_radius(&self) -> f64 {
        self.size().length() * 0.5
    }

    /// Check if point is inside AABB
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Check if two AABBs intersect
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Return merged AABB containing both
    pub fn merged(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_accessors() {
        let aabb = Aabb::new(DVec3::ZERO, DVec3::new(2.0, 2.0, 1.0));
        assert_eq!(aabb.center(), DVec3::new(1.0, 1.0, 0.5));
        assert_eq!(aabb.size(), DVec3::new(2.0, 2.0, 1.0));
        assert!((aabb.bounding_radius() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_contains_point() {
        let aabb = Aabb::new(DVec3::ZERO, DVec3::ONE);
        assert!(aabb.contains_point(DVec3::splat(0.5)));
        assert!(aabb.contains_point(DVec3::ONE));
        assert!(!aabb.contains_point(DVec3::splat(2.0)));
    }

    #[test]
    fn test_intersects_and_merge() {
        let a = Aabb::new(DVec3::ZERO, DVec3::ONE);
        let b = Aabb::new(DVec3::splat(0.5), DVec3::splat(1.5));
        let c = Aabb::new(DVec3::splat(2.0), DVec3::splat(3.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));

        let m = a.merged(&c);
        assert_eq!(m.min, DVec3::ZERO);
        assert_eq!(m.max, DVec3::splat(3.0));
    }
}

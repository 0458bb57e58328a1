//! View frustum for culling

use crate::core::types::{DMat4, DVec3, DVec4};
use super::aabb::Aabb;

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug)]
pub struct Plane {
    pub normal: DVec3,
    pub distance: f64,
}

impl Plane {
    pub fn new(normal: DVec3, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: DVec3) -> f64 {
        self.normal.dot(point) + self.distance
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let row = |i: usize| vp.row(i);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        Self {
            planes: [
                Self::normalize_plane(r3 + r2), // near
                Self::normalize_plane(r3 - r2), // far
                Self::normalize_plane(r3 + r0), // left
                Self::normalize_plane(r3 - r0), // right
                Self::normalize_plane(r3 - r1), // top
                Self::normalize_plane(r3 + r1), // bottom
            ],
        }
    }

    fn normalize_plane(plane: DVec4) -> Plane {
        let normal = plane.truncate();
        let len = normal.length();
        Plane {
            normal: normal / len,
            distance: plane.w / len,
        }
    }

    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes.iter().all(|p| p.distance_to_point(point) >= 0.0)
    }

    /// Conservative sphere test; tile bounds are spheres
    pub fn intersects_sphere(&self, center: DVec3, radius: f64) -> bool {
        self.planes.iter().all(|p| p.distance_to_point(center) >= -radius)
    }

    /// Check if AABB intersects frustum (conservative test)
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            // p-vertex: corner most aligned with the plane normal
            let p = DVec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );

            if plane.distance_to_point(p) < 0.0 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_negative_z() -> Frustum {
        let proj = DMat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.1, 100.0);
        let view = DMat4::look_at_rh(DVec3::new(0.0, 0.0, 5.0), DVec3::ZERO, DVec3::Y);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn test_plane_distance() {
        let plane = Plane::new(DVec3::Y, 0.0);
        assert_eq!(plane.distance_to_point(DVec3::new(0.0, 5.0, 0.0)), 5.0);
        assert_eq!(plane.distance_to_point(DVec3::new(0.0, -3.0, 0.0)), -3.0);
    }

    #[test]
    fn test_frustum_contains_point() {
        let frustum = looking_down_negative_z();
        assert!(frustum.contains_point(DVec3::ZERO));
        assert!(!frustum.contains_point(DVec3::new(5.0, 0.0, 0.0)));
    }

    #[test]
    fn test_frustum_sphere_and_box() {
        let frustum = looking_down_negative_z();
        // Center outside, but the sphere reaches into the volume
        assert!(frustum.intersects_sphere(DVec3::new(1.5, 0.0, 0.0), 1.0));
        assert!(!frustum.intersects_sphere(DVec3::new(3.0, 0.0, 0.0), 1.0));

        let inside = Aabb::new(DVec3::splat(-0.5), DVec3::splat(0.5));
        let outside = Aabb::new(DVec3::new(4.0, 4.0, 0.0), DVec3::new(5.0, 5.0, 1.0));
        assert!(frustum.intersects_aabb(&inside));
        assert!(!frustum.intersects_aabb(&outside));
    }
}

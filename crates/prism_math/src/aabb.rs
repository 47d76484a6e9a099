use crate::Vec3;

/// Axis-aligned bounding box stored as componentwise min/max corners.
///
/// Meshes carry one of these alongside an origin (the box center) so the
/// viewport can frame and rescale geometry.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An empty box (min > max, contains nothing). Growing it by any point
    /// yields a degenerate box at that point.
    pub const EMPTY: Aabb = Aabb {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create an empty box.
    pub fn empty() -> Self {
        Self::EMPTY
    }

    /// Create a box from two corner points in any order.
    pub fn from_corners(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Componentwise min/max over a set of points.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = Vec3>,
    {
        points.into_iter().fold(Self::EMPTY, |bounds, p| bounds.grow(p))
    }

    /// Return a box that also contains `point`.
    pub fn grow(&self, point: Vec3) -> Self {
        Self {
            min: self.min.min(point),
            max: self.max.max(point),
        }
    }

    /// Create a box that surrounds two other boxes.
    pub fn surrounding(box0: &Aabb, box1: &Aabb) -> Self {
        Self {
            min: box0.min.min(box1.min),
            max: box0.max.max(box1.max),
        }
    }

    /// True when no point has been added.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> Vec3 {
        self.min + (self.max - self.min) * 0.5
    }

    /// Full edge lengths per axis.
    pub fn extent(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    /// Largest half edge length, i.e. the radius of the tightest cube around the box.
    pub fn largest_half_extent(&self) -> f32 {
        self.extent().max_element() * 0.5
    }

    /// Check whether a point lies inside the box (inclusive).
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_from_corners() {
        let aabb = Aabb::from_corners(Vec3::new(10.0, 0.0, 10.0), Vec3::new(0.0, 10.0, 0.0));

        assert_eq!(aabb.min, Vec3::ZERO);
        assert_eq!(aabb.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points([
            Vec3::new(-1.0, -2.0, -3.0),
            Vec3::new(4.0, 5.0, 6.0),
            Vec3::ZERO,
        ]);

        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(aabb.max, Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_aabb_empty() {
        let aabb = Aabb::from_points(std::iter::empty());
        assert!(aabb.is_empty());
        assert_eq!(aabb.extent(), Vec3::ZERO);

        let point = aabb.grow(Vec3::ONE);
        assert!(!point.is_empty());
        assert_eq!(point.extent(), Vec3::ZERO);
    }

    #[test]
    fn test_aabb_surrounding() {
        let box1 = Aabb::from_corners(Vec3::ZERO, Vec3::splat(5.0));
        let box2 = Aabb::from_corners(Vec3::splat(3.0), Vec3::splat(10.0));
        let surrounding = Aabb::surrounding(&box1, &box2);

        assert_eq!(surrounding.min, Vec3::ZERO);
        assert_eq!(surrounding.max, Vec3::splat(10.0));
    }

    #[test]
    fn test_aabb_centroid() {
        let aabb = Aabb::from_corners(Vec3::ZERO, Vec3::new(10.0, 4.0, 2.0));
        assert_eq!(aabb.centroid(), Vec3::new(5.0, 2.0, 1.0));
        assert!((aabb.largest_half_extent() - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_aabb_contains() {
        let aabb = Aabb::from_corners(Vec3::splat(-1.0), Vec3::ONE);
        assert!(aabb.contains(Vec3::ZERO));
        assert!(aabb.contains(Vec3::ONE));
        assert!(!aabb.contains(Vec3::new(0.0, 2.0, 0.0)));
    }
}

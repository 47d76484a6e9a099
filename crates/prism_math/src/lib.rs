//! Prism Math - shared math types for the viewport core.
//!
//! Re-exports glam and adds bounds, the viewport camera, and order-2
//! spherical harmonics used for ambient lighting.

// Re-export glam for convenience
pub use glam::*;

mod aabb;
mod camera;
pub mod sh;

pub use aabb::Aabb;
pub use camera::Camera;
pub use sh::{FinalizedSh, ShCoefficients, ShIrradiance, SH_COEFFICIENT_COUNT};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);
        assert_eq!(a + b, Vec3::new(5.0, 7.0, 9.0));
    }
}

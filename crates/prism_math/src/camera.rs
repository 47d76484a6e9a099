use glam::{Mat4, Vec3};

use crate::Aabb;

/// Viewport camera. World space is Z-up, matching the environment lighting.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Create a new camera
    pub fn new(position: Vec3, target: Vec3, aspect: f32) -> Self {
        Self {
            position,
            target,
            up: Vec3::Z,
            fov_y: 45.0_f32.to_radians(),
            aspect,
            near: 0.1,
            far: 1000.0,
        }
    }

    /// Get the view matrix (world → camera space)
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix (camera → clip space, depth in [0, 1])
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Get the combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Update aspect ratio (e.g., on viewport resize)
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Move the camera back along its current view direction until a sphere
    /// around `bounds` fits the vertical field of view.
    pub fn frame_bounds(&mut self, bounds: &Aabb) {
        if bounds.is_empty() {
            return;
        }

        let center = bounds.centroid();
        let radius = (bounds.extent().length() * 0.5).max(0.001);
        let distance = radius / (self.fov_y * 0.5).sin();

        let mut direction = (self.position - self.target).normalize_or_zero();
        if direction == Vec3::ZERO {
            direction = Vec3::new(0.0, -1.0, 0.5).normalize();
        }

        self.target = center;
        self.position = center + direction * distance;
        self.near = (distance - radius).max(0.01) * 0.5;
        self.far = (distance + radius) * 2.0;
    }
}

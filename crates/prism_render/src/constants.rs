//! Shader-constant register layouts.
//!
//! Every block is `#[repr(C)]` and `Pod`, so it uploads as a slice of
//! four-float registers. Matrices are stored one row per register.

use prism_core::Material;
use prism_math::{FinalizedSh, Mat4, Vec4, SH_COEFFICIENT_COUNT};

use crate::scene::RenderScene;

/// First vertex register of [`SceneConstants`].
pub const SCENE_REGISTER: u32 = 0;
/// Vertex register read by the constant-color debug program.
pub const DEBUG_COLOR_REGISTER: u32 = 8;
/// First pixel register of [`LightingConstants`].
pub const LIGHTING_REGISTER: u32 = 0;
/// First pixel register of [`MaterialConstants`].
pub const MATERIAL_REGISTER: u32 = 10;

fn rows(matrix: Mat4) -> [[f32; 4]; 4] {
    matrix.transpose().to_cols_array_2d()
}

fn registers<T: bytemuck::Pod>(block: &T) -> &[[f32; 4]] {
    bytemuck::cast_slice(std::slice::from_ref(block))
}

/// Vertex registers c0..c9.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneConstants {
    pub view_proj: [[f32; 4]; 4],
    pub world: [[f32; 4]; 4],
    /// Half viewport width and height
    pub screen: [f32; 4],
    pub eye: [f32; 4],
}

impl SceneConstants {
    pub fn new(scene: &RenderScene) -> Self {
        let eye = scene.camera.view_matrix().inverse().w_axis;
        Self {
            view_proj: rows(scene.camera.view_projection_matrix()),
            world: rows(scene.world),
            screen: [
                scene.viewport.width as f32 * 0.5,
                scene.viewport.height as f32 * 0.5,
                0.0,
                0.0,
            ],
            eye: eye.to_array(),
        }
    }

    pub fn registers(&self) -> &[[f32; 4]] {
        registers(self)
    }
}

/// Pixel registers c0..c9: exposure, then the finalized irradiance.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingConstants {
    pub exposure: [f32; 4],
    pub sh: [[f32; 4]; SH_COEFFICIENT_COUNT],
}

impl LightingConstants {
    pub fn new(scene: &RenderScene, sh: &FinalizedSh) -> Self {
        Self {
            exposure: [scene.exposure, scene.diffuse_light_scale, 0.0, 0.0],
            sh: sh.to_registers(),
        }
    }

    pub fn registers(&self) -> &[[f32; 4]] {
        registers(self)
    }
}

/// Pixel registers c10..c14 for one material.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialConstants {
    /// Normal scale and incandescent scale in x and w
    pub surface: [f32; 4],
    /// Parallax scale and bias
    pub parallax: [f32; 4],
    /// Environment scale, bias and LOD, then gloss scale
    pub environment: [f32; 4],
    pub gloss_tint: [f32; 4],
    pub base_tint: [f32; 4],
}

impl MaterialConstants {
    pub fn new(material: &Material, env_scale: f32, env_bias: f32) -> Self {
        let params = &material.params;
        Self {
            surface: [params.normal_scale, 0.0, 0.0, params.incandescent_scale],
            parallax: [params.parallax_scale, params.parallax_bias, 0.0, 0.0],
            environment: [env_scale, env_bias, params.env_lod, params.gloss_scale],
            gloss_tint: params.gloss_tint.to_array(),
            base_tint: params.base_tint.to_array(),
        }
    }

    pub fn registers(&self) -> &[[f32; 4]] {
        registers(self)
    }
}

/// Flat color for the constant-color debug program.
pub fn debug_color(color: Vec4) -> [[f32; 4]; 1] {
    [color.to_array()]
}

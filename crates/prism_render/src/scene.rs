//! Per-frame scene description.

use prism_core::device::Viewport;
use prism_core::{
    EnvironmentBinding, EnvironmentHandle, Material, MaterialBinding, MeshBinding, MeshHandle,
    ResourceManager,
};
use prism_math::{Aabb, Camera, Mat4, Vec3, Vec4};

/// How the mesh is shaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    /// Lit two-pass rendering
    #[default]
    Normal,
    /// Skip the mesh entirely
    Off,
    DebugColor,
    VertexNormal,
    VertexTangent,
    Uv,
    BaseMapAlpha,
    BaseMap,
    NormalMap,
    GlossMap,
    IncandescentMap,
    ParallaxMap,
    MaterialTint,
    GlossTint,
    AlphaType,
    /// Flat per-fragment index colors for picking
    FragmentIndex,
}

impl DrawMode {
    pub fn is_debug(self) -> bool {
        !matches!(self, DrawMode::Normal | DrawMode::Off)
    }
}

/// A light shining from `direction` (towards the light).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec4,
    pub direction: Vec3,
}

/// Everything the renderer needs to draw one viewport.
///
/// The scene holds bindings, so the mesh, environment and every material in
/// the shader table stay resident while the scene exists.
#[derive(Debug, Clone)]
pub struct RenderScene {
    pub viewport: Viewport,
    pub camera: Camera,
    pub world: Mat4,
    pub mesh: Option<MeshBinding>,
    /// One material per mesh fragment, in fragment order
    pub shader_table: Vec<MaterialBinding>,
    pub environment: Option<EnvironmentBinding>,
    pub draw_mode: DrawMode,
    pub wireframe: bool,
    pub normals: bool,
    pub tangents: bool,
    pub reference_grid: bool,
    /// Draw the environment cube behind the mesh instead of a flat clear
    pub render_env_cube: bool,
    pub exposure: f32,
    pub diffuse_light_scale: f32,
    pub ambient: Vec4,
    pub lights: Vec<DirectionalLight>,
    /// Reference grid half size; non-positive uses the default
    pub scene_scale: f32,
}

impl RenderScene {
    pub fn new(viewport: Viewport, camera: Camera) -> Self {
        Self {
            viewport,
            camera,
            world: Mat4::IDENTITY,
            mesh: None,
            shader_table: Vec::new(),
            environment: None,
            draw_mode: DrawMode::Normal,
            wireframe: false,
            normals: false,
            tangents: false,
            reference_grid: false,
            render_env_cube: false,
            exposure: 1.0,
            diffuse_light_scale: 1.0,
            ambient: Vec4::ZERO,
            lights: Vec::new(),
            scene_scale: 0.0,
        }
    }

    /// Bind a mesh and reset the shader table to its fragment materials.
    /// Returns false if the handle does not resolve.
    pub fn set_mesh(&mut self, resources: &ResourceManager, handle: MeshHandle) -> bool {
        let (Some(mesh), Some(binding)) = (resources.mesh(handle), resources.acquire_mesh(handle))
        else {
            return false;
        };

        self.shader_table = mesh.fragments.iter().map(|f| f.material.clone()).collect();
        self.mesh = Some(binding);
        true
    }

    pub fn clear_mesh(&mut self) {
        self.mesh = None;
        self.shader_table.clear();
    }

    /// Override the material drawn for one fragment. Returns false if the
    /// fragment is out of range.
    pub fn override_material(&mut self, fragment: usize, material: MaterialBinding) -> bool {
        match self.shader_table.get_mut(fragment) {
            Some(slot) => {
                *slot = material;
                true
            }
            None => false,
        }
    }

    pub fn set_environment(
        &mut self,
        resources: &ResourceManager,
        handle: EnvironmentHandle,
    ) -> bool {
        self.environment = resources.acquire_environment(handle);
        self.environment.is_some()
    }

    pub fn add_light(&mut self, color: Vec4, direction: Vec3) {
        self.lights.push(DirectionalLight { color, direction });
    }

    pub fn clear_lights(&mut self) {
        self.lights.clear();
    }

    /// Point the camera at the bound mesh and match the viewport aspect.
    pub fn frame_mesh(&mut self, resources: &ResourceManager) {
        self.camera.set_aspect(self.viewport.aspect());
        if let Some(mesh) = self.mesh.as_ref().and_then(|m| resources.mesh(m.handle())) {
            let (min, max) = (mesh.bounds.min, mesh.bounds.max);
            let corners = (0..8).map(|i| {
                let corner = Vec3::new(
                    if i & 1 == 0 { min.x } else { max.x },
                    if i & 2 == 0 { min.y } else { max.y },
                    if i & 4 == 0 { min.z } else { max.z },
                );
                self.world.transform_point3(corner)
            });
            self.camera.frame_bounds(&Aabb::from_points(corners));
        }
    }

    pub(crate) fn material<'a>(
        &self,
        resources: &'a ResourceManager,
        fragment: usize,
    ) -> Option<&'a Material> {
        self.shader_table
            .get(fragment)
            .and_then(|binding| resources.material(binding.handle()))
    }
}

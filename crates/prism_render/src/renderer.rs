//! Frame orchestration: environment, two material passes, debug views and overlays.

use std::mem::size_of;

use prism_core::device::{
    argb_to_color, AlphaTest, BufferId, DebugVertex, DeviceResult, PixelProgram, SamplerState,
    ScreenVertex, TextureId, VertexLayout, VertexProgram,
};
use prism_core::mesh::{Fragment, MeshVertex};
use prism_core::{
    AlphaMode, Environment, GraphicsDevice, Material, Mesh, ResourceManager, TextureHandle,
    TextureSlot,
};
use prism_math::{FinalizedSh, ShIrradiance, Vec3, Vec4};

use crate::constants::{
    debug_color, LightingConstants, MaterialConstants, SceneConstants, DEBUG_COLOR_REGISTER,
    LIGHTING_REGISTER, MATERIAL_REGISTER, SCENE_REGISTER,
};
use crate::picking;
use crate::scene::{DrawMode, RenderScene};

/// Clear color used without an environment or in debug modes (ARGB).
pub const DEBUG_CLEAR_COLOR: u32 = 0xffb8b8b8;
/// Environment scale and bias when no environment is bound.
pub const NO_ENVIRONMENT_SCALE: f32 = 1.0;
pub const NO_ENVIRONMENT_BIAS: f32 = -0.9;
/// Texture unit holding the environment cube.
pub const ENVIRONMENT_UNIT: u32 = 5;
/// Alpha-test reference for cutout materials.
pub const CUTOUT_REFERENCE: u8 = 0x80;

const WIREFRAME_DEPTH_BIAS: f32 = -0.0001;
const TANGENT_DEPTH_BIAS: f32 = -0.001;
const DEFAULT_GRID_SCALE: f32 = 10.0;
const AXIS_COLORS: [u32; 3] = [0xffff0000, 0xff00ff00, 0xff0000ff];

/// Constant color for fragments without a material in the tint views.
const MISSING_TINT: Vec4 = Vec4::new(0.0, 1.0, 0.0, 1.0);

/// Draw counts for one frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub opaque_draws: u32,
    pub blended_draws: u32,
    pub debug_draws: u32,
    /// Wireframe, normal, tangent and grid draws
    pub overlay_draws: u32,
    pub sky_draws: u32,
    /// Switches between the plain and combined-map lighting programs
    pub pixel_program_switches: u32,
    pub failed_draws: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawKind {
    Opaque,
    Blended,
    Debug,
    Overlay,
    Sky,
}

impl FrameStats {
    fn record(&mut self, kind: DrawKind, result: DeviceResult<()>) {
        if let Err(err) = result {
            log::error!("{:?} draw failed: {}", kind, err);
            self.failed_draws += 1;
            return;
        }
        match kind {
            DrawKind::Opaque => self.opaque_draws += 1,
            DrawKind::Blended => self.blended_draws += 1,
            DrawKind::Debug => self.debug_draws += 1,
            DrawKind::Overlay => self.overlay_draws += 1,
            DrawKind::Sky => self.sky_draws += 1,
        }
    }

    pub fn total_draws(&self) -> u32 {
        self.opaque_draws
            + self.blended_draws
            + self.debug_draws
            + self.overlay_draws
            + self.sky_draws
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Opaque,
    Blended,
}

/// Environment inputs shared by every fragment of a mesh.
#[derive(Debug, Clone, Copy)]
struct EnvironmentInputs {
    cube: Option<TextureId>,
    scale: f32,
    bias: f32,
}

impl EnvironmentInputs {
    fn new(environment: Option<&Environment>) -> Self {
        match environment {
            Some(env) => Self {
                cube: env.cube,
                scale: env.env_scale,
                bias: env.env_bias,
            },
            None => Self {
                cube: None,
                scale: NO_ENVIRONMENT_SCALE,
                bias: NO_ENVIRONMENT_BIAS,
            },
        }
    }
}

/// One mesh drawn for one scene.
#[derive(Clone, Copy)]
struct MeshDraw<'a> {
    resources: &'a ResourceManager,
    scene: &'a RenderScene,
    mesh: &'a Mesh,
}

impl<'a> MeshDraw<'a> {
    fn material(&self, fragment: usize) -> Option<&'a Material> {
        self.scene.material(self.resources, fragment)
    }

    fn draw_fragment(
        &self,
        device: &mut dyn GraphicsDevice,
        fragment: &Fragment,
        kind: DrawKind,
        stats: &mut FrameStats,
    ) {
        if fragment.primitive_count > 0 {
            let result = device.draw_indexed(
                fragment.base_index,
                fragment.primitive_count,
                self.mesh.vertex_count,
            );
            stats.record(kind, result);
        }
    }
}

/// Draws scenes against a [`GraphicsDevice`].
///
/// Holds no GPU state between frames; only the last frame's statistics are kept.
#[derive(Debug, Default)]
pub struct Renderer {
    last_frame: FrameStats,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> FrameStats {
        self.last_frame
    }

    /// Render one frame. Scenes draw in order; only the first clears the
    /// back buffer, and its reference grid draws after every scene.
    pub fn render_scenes(
        &mut self,
        device: &mut dyn GraphicsDevice,
        resources: &ResourceManager,
        scenes: &[&RenderScene],
    ) -> FrameStats {
        let mut stats = FrameStats::default();

        device.begin_frame();
        device.set_cull_mode(None);
        device.bind_back_buffer();

        for (index, scene) in scenes.iter().enumerate() {
            self.draw_scene(device, resources, scene, index == 0, &mut stats);
        }

        if let Some(first) = scenes.first() {
            if first.reference_grid {
                self.draw_reference_grid(device, first, &mut stats);
            }
        }

        for unit in 0..=ENVIRONMENT_UNIT {
            device.set_texture(unit, None);
        }
        device.end_frame();

        log::trace!("Frame: {:?}", stats);
        self.last_frame = stats;
        stats
    }

    /// Decode the fragment under `(x, y)` from a fragment-index frame.
    pub fn pick(&self, device: &dyn GraphicsDevice, x: u32, y: u32) -> Option<usize> {
        picking::pick_fragment(device, x, y)
    }

    fn draw_scene(
        &self,
        device: &mut dyn GraphicsDevice,
        resources: &ResourceManager,
        scene: &RenderScene,
        first: bool,
        stats: &mut FrameStats,
    ) {
        device.set_vertex_constants(SCENE_REGISTER, SceneConstants::new(scene).registers());
        device.set_viewport(&scene.viewport);

        let environment = scene
            .environment
            .as_ref()
            .and_then(|binding| resources.environment(binding.handle()));

        let sh = self.scene_lighting(device, scene, environment, first, stats);
        device.set_pixel_constants(
            LIGHTING_REGISTER,
            LightingConstants::new(scene, &sh).registers(),
        );

        let Some(mesh) = scene
            .mesh
            .as_ref()
            .and_then(|binding| resources.mesh(binding.handle()))
        else {
            return;
        };

        let draw = MeshDraw {
            resources,
            scene,
            mesh,
        };
        match scene.draw_mode {
            DrawMode::Normal => self.draw_mesh(device, draw, environment, stats),
            DrawMode::Off => {}
            mode => self.draw_debug(device, draw, mode, stats),
        }

        if scene.wireframe {
            self.draw_wireframe(device, draw, stats);
        }
        if scene.normals {
            if let Some(lines) = mesh.debug_normals {
                self.draw_vertex_lines(device, mesh, lines, stats);
            }
        }
        if scene.tangents {
            if let Some(lines) = mesh.debug_tangents {
                device.set_depth_bias(TANGENT_DEPTH_BIAS);
                self.draw_vertex_lines(device, mesh, lines, stats);
                device.set_depth_bias(0.0);
            }
        }
    }

    /// Clear or draw the sky for the first scene and accumulate the scene's
    /// irradiance.
    fn scene_lighting(
        &self,
        device: &mut dyn GraphicsDevice,
        scene: &RenderScene,
        environment: Option<&Environment>,
        first: bool,
        stats: &mut FrameStats,
    ) -> FinalizedSh {
        let mut sh = match environment.filter(|_| scene.draw_mode == DrawMode::Normal) {
            Some(env) => {
                if first {
                    self.draw_environment(device, scene, env, stats);
                }
                env.sh
            }
            None => {
                if first {
                    device.clear(argb_to_color(DEBUG_CLEAR_COLOR));
                }
                ShIrradiance::ZERO
            }
        };

        sh.add_ambient(scene.ambient);
        for light in &scene.lights {
            sh.add_light(light.color, light.direction);
        }
        sh.finalize()
    }

    fn draw_environment(
        &self,
        device: &mut dyn GraphicsDevice,
        scene: &RenderScene,
        environment: &Environment,
        stats: &mut FrameStats,
    ) {
        device.clear(argb_to_color(environment.clear_color));

        let Some(cube) = environment.cube.filter(|_| scene.render_env_cube) else {
            return;
        };

        device.set_vertex_layout(VertexLayout::Screen);
        device.set_vertex_program(Some(VertexProgram::ScreenSpace));
        device.set_pixel_program(Some(PixelProgram::Sky));
        device.set_sampler(0, &SamplerState::linear_clamp());
        device.set_texture(0, Some(cube));

        let quad = sky_quad(scene);
        stats.record(DrawKind::Sky, device.draw_screen_quad(&quad));
        device.set_texture(0, None);
    }

    fn draw_mesh(
        &self,
        device: &mut dyn GraphicsDevice,
        draw: MeshDraw<'_>,
        environment: Option<&Environment>,
        stats: &mut FrameStats,
    ) {
        device.set_vertex_layout(VertexLayout::Mesh);
        device.set_vertex_program(Some(VertexProgram::Mesh));
        device.set_pixel_program(Some(PixelProgram::Diffuse));
        bind_mesh_buffers(device, draw.mesh);

        let inputs = EnvironmentInputs::new(environment);
        device.set_sampler(ENVIRONMENT_UNIT, &SamplerState::linear_clamp());
        device.set_texture(ENVIRONMENT_UNIT, inputs.cube);

        let mut combined_gpi = false;
        self.draw_pass(device, draw, Pass::Opaque, inputs, &mut combined_gpi, stats);

        device.set_alpha_test(None);
        device.set_depth_write(false);
        self.draw_pass(device, draw, Pass::Blended, inputs, &mut combined_gpi, stats);

        device.set_blend(None);
        device.set_depth_write(true);
        device.set_vertex_program(None);
        device.set_pixel_program(None);
        device.set_cull_mode(Some(wgpu::Face::Back));
    }

    /// Draw every fragment whose material belongs to `pass`. The lighting
    /// program only changes when the combined-map flag differs from the
    /// previous fragment.
    fn draw_pass(
        &self,
        device: &mut dyn GraphicsDevice,
        draw: MeshDraw<'_>,
        pass: Pass,
        inputs: EnvironmentInputs,
        combined_gpi: &mut bool,
        stats: &mut FrameStats,
    ) {
        let mesh = draw.mesh;
        for (index, fragment) in mesh.fragments.iter().enumerate() {
            let Some(material) = draw.material(index) else {
                debug_assert!(false, "fragment {} of {} has no material", index, mesh.path);
                log::error!("Fragment {} of {} has no material", index, mesh.path);
                continue;
            };

            let kind = match pass {
                Pass::Opaque if material.alpha_mode.is_opaque_pass() => DrawKind::Opaque,
                Pass::Blended if material.alpha_mode.is_blended_pass() => DrawKind::Blended,
                _ => continue,
            };

            device.set_cull_mode(if material.is_two_sided() {
                None
            } else {
                Some(wgpu::Face::Back)
            });
            match pass {
                Pass::Opaque => {
                    let cutout = material.alpha_mode == AlphaMode::Cutout;
                    device.set_alpha_test(cutout.then_some(AlphaTest {
                        reference: CUTOUT_REFERENCE,
                        compare: wgpu::CompareFunction::GreaterEqual,
                    }));
                }
                Pass::Blended => device.set_blend(blend_state(material.alpha_mode)),
            }

            if material.is_combined_gpi() != *combined_gpi {
                *combined_gpi = material.is_combined_gpi();
                device.set_pixel_program(Some(if *combined_gpi {
                    PixelProgram::DiffuseGpi
                } else {
                    PixelProgram::Diffuse
                }));
                stats.pixel_program_switches += 1;
            }

            for (slot, texture) in material.textures() {
                bind_texture(device, draw.resources, slot.unit(), texture);
            }
            device.set_pixel_constants(
                MATERIAL_REGISTER,
                MaterialConstants::new(material, inputs.scale, inputs.bias).registers(),
            );

            draw.draw_fragment(device, fragment, kind, stats);
        }
    }

    /// Replace lighting with a flat visualization. Fragments without a
    /// material still draw, with fallback colors and cleared textures.
    fn draw_debug(
        &self,
        device: &mut dyn GraphicsDevice,
        draw: MeshDraw<'_>,
        mode: DrawMode,
        stats: &mut FrameStats,
    ) {
        let resources = draw.resources;
        let Some((vertex_program, pixel_program)) = debug_programs(mode) else {
            return;
        };

        device.set_vertex_layout(VertexLayout::Mesh);
        device.set_vertex_program(Some(vertex_program));
        device.set_pixel_program(Some(pixel_program));
        bind_mesh_buffers(device, draw.mesh);

        for (index, fragment) in draw.mesh.fragments.iter().enumerate() {
            let material = draw.material(index);
            // Combined maps pack these channels into the gloss slot
            let auxiliary = |slot: TextureSlot| {
                material
                    .filter(|m| !m.is_combined_gpi())
                    .and_then(|m| m.texture(slot))
            };

            match mode {
                DrawMode::BaseMap | DrawMode::BaseMapAlpha => {
                    let texture = material.and_then(|m| m.texture(TextureSlot::Base));
                    bind_texture(device, resources, 0, texture);
                }
                DrawMode::NormalMap => {
                    let texture = material.and_then(|m| m.texture(TextureSlot::Normal));
                    bind_texture(device, resources, 0, texture);
                }
                DrawMode::GlossMap => {
                    if let Some(material) = material {
                        // Combined maps show all channels
                        device.set_pixel_program(Some(if material.is_combined_gpi() {
                            PixelProgram::Texture
                        } else {
                            PixelProgram::TextureGreen
                        }));
                    }
                    let texture = material.and_then(|m| m.texture(TextureSlot::Gloss));
                    bind_texture(device, resources, 0, texture);
                }
                DrawMode::IncandescentMap => {
                    bind_texture(device, resources, 0, auxiliary(TextureSlot::Incandescent));
                }
                DrawMode::ParallaxMap => {
                    bind_texture(device, resources, 0, auxiliary(TextureSlot::Parallax));
                }
                DrawMode::MaterialTint => {
                    let tint = material.map_or(MISSING_TINT, |m| m.params.base_tint);
                    device.set_vertex_constants(DEBUG_COLOR_REGISTER, &debug_color(tint));
                }
                DrawMode::GlossTint => {
                    let tint = material
                        .map_or(MISSING_TINT, |m| m.params.gloss_tint.truncate().extend(1.0));
                    device.set_vertex_constants(DEBUG_COLOR_REGISTER, &debug_color(tint));
                }
                DrawMode::AlphaType => {
                    let color = match material.map(|m| m.alpha_mode) {
                        Some(AlphaMode::Blended) => Vec4::new(0.5, 0.0, 0.0, 1.0),
                        Some(AlphaMode::Additive) => Vec4::new(0.5, 0.5, 0.0, 1.0),
                        _ => Vec4::new(0.0, 0.5, 0.0, 1.0),
                    };
                    device.set_vertex_constants(DEBUG_COLOR_REGISTER, &debug_color(color));
                }
                DrawMode::FragmentIndex => {
                    let Some(color) = picking::fragment_color(index) else {
                        log::warn!("Fragment {} has no pick color, skipped", index);
                        continue;
                    };
                    device.set_vertex_constants(DEBUG_COLOR_REGISTER, &debug_color(color));
                }
                _ => {}
            }

            draw.draw_fragment(device, fragment, DrawKind::Debug, stats);
        }

        device.set_texture(0, None);
        device.set_vertex_program(None);
        device.set_pixel_program(None);
    }

    fn draw_wireframe(
        &self,
        device: &mut dyn GraphicsDevice,
        draw: MeshDraw<'_>,
        stats: &mut FrameStats,
    ) {
        device.set_polygon_mode(wgpu::PolygonMode::Line);
        device.set_depth_bias(WIREFRAME_DEPTH_BIAS);
        device.set_vertex_layout(VertexLayout::Mesh);
        device.set_vertex_program(Some(VertexProgram::MeshDebugColor));
        device.set_pixel_program(Some(PixelProgram::Color));
        bind_mesh_buffers(device, draw.mesh);

        for fragment in &draw.mesh.fragments {
            draw.draw_fragment(device, fragment, DrawKind::Overlay, stats);
        }

        device.set_polygon_mode(wgpu::PolygonMode::Fill);
        device.set_depth_bias(0.0);
    }

    /// Draw one of the mesh's per-vertex line buffers.
    fn draw_vertex_lines(
        &self,
        device: &mut dyn GraphicsDevice,
        mesh: &Mesh,
        lines: BufferId,
        stats: &mut FrameStats,
    ) {
        device.set_vertex_layout(VertexLayout::Debug);
        device.set_vertex_program(Some(VertexProgram::ObjectSpace));
        device.set_pixel_program(Some(PixelProgram::Color));
        device.set_vertex_buffer(lines, size_of::<DebugVertex>() as u32);
        stats.record(DrawKind::Overlay, device.draw_lines(0, mesh.vertex_count));
    }

    fn draw_reference_grid(
        &self,
        device: &mut dyn GraphicsDevice,
        scene: &RenderScene,
        stats: &mut FrameStats,
    ) {
        device.set_vertex_constants(SCENE_REGISTER, SceneConstants::new(scene).registers());
        device.set_viewport(&scene.viewport);
        device.set_vertex_layout(VertexLayout::Debug);
        device.set_vertex_program(Some(VertexProgram::WorldSpace));
        device.set_pixel_program(Some(PixelProgram::Color));

        let lines = reference_grid(scene.scene_scale);
        stats.record(DrawKind::Overlay, device.draw_user_lines(&lines));

        device.set_vertex_program(None);
        device.set_pixel_program(None);
    }
}

fn bind_mesh_buffers(device: &mut dyn GraphicsDevice, mesh: &Mesh) {
    device.set_vertex_buffer(mesh.vertex_buffer, size_of::<MeshVertex>() as u32);
    device.set_index_buffer(mesh.index_buffer, wgpu::IndexFormat::Uint32);
}

/// Bind a pool texture with its sampler, or clear the unit.
fn bind_texture(
    device: &mut dyn GraphicsDevice,
    resources: &ResourceManager,
    unit: u32,
    handle: Option<TextureHandle>,
) {
    match handle.and_then(|h| resources.texture(h)) {
        Some(texture) => {
            device.set_sampler(unit, &texture.sampler_state());
            device.set_texture(unit, Some(texture.gpu));
        }
        None => device.set_texture(unit, None),
    }
}

fn blend_state(mode: AlphaMode) -> Option<wgpu::BlendState> {
    let dst_factor = match mode {
        AlphaMode::Additive => wgpu::BlendFactor::One,
        AlphaMode::Blended => wgpu::BlendFactor::OneMinusSrcAlpha,
        AlphaMode::Opaque | AlphaMode::Cutout => return None,
    };
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor,
        operation: wgpu::BlendOperation::Add,
    };
    Some(wgpu::BlendState {
        color: component,
        alpha: component,
    })
}

fn debug_programs(mode: DrawMode) -> Option<(VertexProgram, PixelProgram)> {
    let programs = match mode {
        DrawMode::Normal | DrawMode::Off => return None,
        DrawMode::DebugColor => (VertexProgram::MeshDebugColor, PixelProgram::Color),
        DrawMode::VertexNormal => (VertexProgram::MeshDebugNormal, PixelProgram::Color),
        DrawMode::VertexTangent => (VertexProgram::MeshDebugTangent, PixelProgram::Color),
        DrawMode::Uv => (VertexProgram::MeshDebugUv, PixelProgram::Color),
        DrawMode::BaseMapAlpha => (VertexProgram::MeshDebugUv, PixelProgram::TextureAlpha),
        DrawMode::BaseMap | DrawMode::NormalMap => {
            (VertexProgram::MeshDebugUv, PixelProgram::Texture)
        }
        DrawMode::GlossMap | DrawMode::IncandescentMap | DrawMode::ParallaxMap => {
            (VertexProgram::MeshDebugUv, PixelProgram::TextureGreen)
        }
        DrawMode::MaterialTint
        | DrawMode::GlossTint
        | DrawMode::AlphaType
        | DrawMode::FragmentIndex => (VertexProgram::MeshConstantColor, PixelProgram::Color),
    };
    Some(programs)
}

/// Full-viewport quad whose vertices carry the world-space view ray through
/// each corner.
fn sky_quad(scene: &RenderScene) -> [ScreenVertex; 4] {
    let inverse = scene.camera.view_projection_matrix().inverse();
    let (width, height) = (scene.viewport.width as f32, scene.viewport.height as f32);

    let corner = |x: f32, y: f32, ndc_x: f32, ndc_y: f32| {
        let near = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 0.0));
        let far = inverse.project_point3(Vec3::new(ndc_x, ndc_y, 1.0));
        ScreenVertex {
            position: [x, y, 1.0, 1.0],
            direction: (far - near).normalize_or_zero().extend(0.0).to_array(),
        }
    };

    [
        corner(0.0, 0.0, -1.0, 1.0),
        corner(width, 0.0, 1.0, 1.0),
        corner(width, height, 1.0, -1.0),
        corner(0.0, height, -1.0, -1.0),
    ]
}

/// Three axis lines through the origin.
fn reference_grid(scene_scale: f32) -> [DebugVertex; 6] {
    let scale = if scene_scale > 0.0 {
        scene_scale * 2.0
    } else {
        DEFAULT_GRID_SCALE
    };
    let axes = [Vec3::X, Vec3::Y, Vec3::Z];
    let line = |i: usize| {
        [
            DebugVertex::new(-axes[i] * scale, AXIS_COLORS[i]),
            DebugVertex::new(axes[i] * scale, AXIS_COLORS[i]),
        ]
    };
    let [x, y, z] = [line(0), line(1), line(2)];
    [x[0], x[1], y[0], y[1], z[0], z[1]]
}

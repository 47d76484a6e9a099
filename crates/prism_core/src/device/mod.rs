//! Graphics device boundary.
//!
//! The viewport core never talks to a GPU API directly. Everything it needs
//! (buffer and texture creation, per-unit sampler state, stock programs,
//! fixed-function render state, draws, and back-buffer readback) goes through
//! [`GraphicsDevice`]. Value types come from wgpu so a wgpu backend can map
//! them one to one.
//!
//! Device bring-up, presentation, and lost-device recovery belong to the host.

mod recording;

pub use recording::{DeviceCommand, RecordingDevice};

use thiserror::Error;

/// Errors reported by a graphics device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Buffer creation failed for {label}: {message}")]
    BufferCreation { label: String, message: String },

    #[error("Texture creation failed for {label}: {message}")]
    TextureCreation { label: String, message: String },

    #[error("Draw failed: {0}")]
    Draw(String),
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Opaque id of a GPU buffer owned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Opaque id of a GPU texture owned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Usage hint for buffer creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
}

impl BufferUsage {
    pub fn to_wgpu(self) -> wgpu::BufferUsages {
        match self {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
        }
    }
}

/// Shape of a texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    /// Six square faces in +X, -X, +Y, -Y, +Z, -Z order.
    Cube,
}

/// Description of a texture to create. Data is tightly packed rows of the
/// top mip level; cube textures concatenate their six faces.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub mip_level_count: u32,
    pub kind: TextureKind,
}

/// Sampler state for one texture unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerState {
    pub address_u: wgpu::AddressMode,
    pub address_v: wgpu::AddressMode,
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    pub mipmap_filter: wgpu::FilterMode,
    pub anisotropy_clamp: u16,
    pub lod_bias: f32,
}

impl SamplerState {
    /// Trilinear sampling with clamped addressing, used for environment cubes.
    pub fn linear_clamp() -> Self {
        Self {
            address_u: wgpu::AddressMode::ClampToEdge,
            address_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            anisotropy_clamp: 1,
            lod_bias: 0.0,
        }
    }
}

/// Fixed-function alpha test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphaTest {
    pub reference: u8,
    pub compare: wgpu::CompareFunction,
}

/// Viewport rectangle in back-buffer pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

/// Stock vertex programs, addressed by integer id.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexProgram {
    Mesh = 0,
    MeshDebugColor = 1,
    MeshDebugNormal = 2,
    MeshDebugTangent = 3,
    MeshDebugUv = 4,
    MeshConstantColor = 5,
    ObjectSpace = 6,
    WorldSpace = 7,
    ScreenSpace = 8,
}

/// Stock pixel programs, addressed by integer id.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelProgram {
    Diffuse = 0,
    DiffuseGpi = 1,
    Color = 2,
    Texture = 3,
    TextureAlpha = 4,
    TextureGreen = 5,
    Sky = 6,
}

/// Vertex declarations the stock programs consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Interleaved [`crate::mesh::MeshVertex`].
    Mesh,
    /// [`DebugVertex`] lines.
    Debug,
    /// [`ScreenVertex`] quads.
    Screen,
}

/// Colored line vertex for overlays. Color is packed ARGB.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DebugVertex {
    pub position: [f32; 3],
    pub color: u32,
}

impl DebugVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Unorm8x4];

    pub fn new(position: glam::Vec3, color: u32) -> Self {
        Self {
            position: position.to_array(),
            color,
        }
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<DebugVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Pre-transformed screen vertex carrying a world-space view direction.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ScreenVertex {
    pub position: [f32; 4],
    pub direction: [f32; 4],
}

impl ScreenVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x4, 1 => Float32x4];

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ScreenVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// What the viewport core needs from a GPU.
///
/// State setters are fire-and-forget; creation and draw calls report
/// failures. Texture units 0..=4 hold material slots and unit 5 holds the
/// environment cube.
pub trait GraphicsDevice {
    /// Create a buffer initialized with `contents`.
    fn create_buffer(
        &mut self,
        label: &str,
        usage: BufferUsage,
        contents: &[u8],
    ) -> DeviceResult<BufferId>;

    /// Create a 2D or cube texture from the top-level pixel data.
    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> DeviceResult<TextureId>;

    fn destroy_buffer(&mut self, id: BufferId);

    fn destroy_texture(&mut self, id: TextureId);

    fn begin_frame(&mut self);

    fn end_frame(&mut self);

    /// Bind the back buffer and its depth buffer as render targets.
    fn bind_back_buffer(&mut self);

    fn back_buffer_size(&self) -> (u32, u32);

    fn set_viewport(&mut self, viewport: &Viewport);

    /// Clear color, depth (to 1.0), and stencil (to 0) of the bound targets.
    fn clear(&mut self, color: wgpu::Color);

    fn set_sampler(&mut self, unit: u32, sampler: &SamplerState);

    /// Bind a texture to a unit, or clear the unit with `None`.
    fn set_texture(&mut self, unit: u32, texture: Option<TextureId>);

    fn set_vertex_program(&mut self, program: Option<VertexProgram>);

    fn set_pixel_program(&mut self, program: Option<PixelProgram>);

    fn set_vertex_layout(&mut self, layout: VertexLayout);

    /// Upload float4 constants starting at `register`.
    fn set_vertex_constants(&mut self, register: u32, values: &[[f32; 4]]);

    /// Upload float4 constants starting at `register`.
    fn set_pixel_constants(&mut self, register: u32, values: &[[f32; 4]]);

    fn set_cull_mode(&mut self, cull: Option<wgpu::Face>);

    fn set_alpha_test(&mut self, test: Option<AlphaTest>);

    fn set_blend(&mut self, blend: Option<wgpu::BlendState>);

    fn set_depth_write(&mut self, enabled: bool);

    fn set_polygon_mode(&mut self, mode: wgpu::PolygonMode);

    fn set_depth_bias(&mut self, bias: f32);

    fn set_vertex_buffer(&mut self, buffer: BufferId, stride: u32);

    fn set_index_buffer(&mut self, buffer: BufferId, format: wgpu::IndexFormat);

    /// Indexed triangle-list draw from the bound buffers.
    fn draw_indexed(
        &mut self,
        first_index: u32,
        primitive_count: u32,
        vertex_count: u32,
    ) -> DeviceResult<()>;

    /// Non-indexed line-list draw from the bound vertex buffer.
    fn draw_lines(&mut self, first_vertex: u32, line_count: u32) -> DeviceResult<()>;

    /// Line-list draw from transient vertices.
    fn draw_user_lines(&mut self, vertices: &[DebugVertex]) -> DeviceResult<()>;

    /// Full-viewport quad in fan order (top-left, top-right, bottom-right, bottom-left).
    fn draw_screen_quad(&mut self, vertices: &[ScreenVertex; 4]) -> DeviceResult<()>;

    /// Read one back-buffer pixel as packed RGBA8 (`r << 24 | g << 16 | b << 8 | a`).
    fn read_pixel(&self, x: u32, y: u32) -> Option<u32>;
}

/// Convert packed ARGB into a wgpu clear color.
pub fn argb_to_color(argb: u32) -> wgpu::Color {
    let channel = |shift: u32| ((argb >> shift) & 0xff) as f64 / 255.0;
    wgpu::Color {
        r: channel(16),
        g: channel(8),
        b: channel(0),
        a: channel(24),
    }
}

//! A headless device that records every call.
//!
//! Used by tests and by tools that want to inspect what a frame would submit
//! without a GPU.

use std::collections::{HashMap, HashSet};

use super::{
    AlphaTest, BufferId, BufferUsage, DebugVertex, DeviceError, DeviceResult, GraphicsDevice,
    PixelProgram, SamplerState, ScreenVertex, TextureDesc, TextureId, VertexLayout,
    VertexProgram, Viewport,
};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateBuffer { id: BufferId, usage: BufferUsage, size: usize },
    CreateTexture { id: TextureId, desc: TextureDesc },
    DestroyBuffer(BufferId),
    DestroyTexture(TextureId),
    BeginFrame,
    EndFrame,
    BindBackBuffer,
    SetViewport(Viewport),
    Clear(wgpu::Color),
    SetSampler { unit: u32, sampler: SamplerState },
    SetTexture { unit: u32, texture: Option<TextureId> },
    SetVertexProgram(Option<VertexProgram>),
    SetPixelProgram(Option<PixelProgram>),
    SetVertexLayout(VertexLayout),
    SetVertexConstants { register: u32, values: Vec<[f32; 4]> },
    SetPixelConstants { register: u32, values: Vec<[f32; 4]> },
    SetCullMode(Option<wgpu::Face>),
    SetAlphaTest(Option<AlphaTest>),
    SetBlend(Option<wgpu::BlendState>),
    SetDepthWrite(bool),
    SetPolygonMode(wgpu::PolygonMode),
    SetDepthBias(f32),
    SetVertexBuffer { buffer: BufferId, stride: u32 },
    SetIndexBuffer { buffer: BufferId, format: wgpu::IndexFormat },
    DrawIndexed { first_index: u32, primitive_count: u32, vertex_count: u32 },
    DrawLines { first_vertex: u32, line_count: u32 },
    DrawUserLines(Vec<DebugVertex>),
    DrawScreenQuad([ScreenVertex; 4]),
}

impl DeviceCommand {
    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            DeviceCommand::DrawIndexed { .. }
                | DeviceCommand::DrawLines { .. }
                | DeviceCommand::DrawUserLines(_)
                | DeviceCommand::DrawScreenQuad(_)
        )
    }
}

/// Records commands and tracks live GPU objects.
#[derive(Debug)]
pub struct RecordingDevice {
    commands: Vec<DeviceCommand>,
    next_id: u32,
    buffers: HashMap<BufferId, usize>,
    textures: HashMap<TextureId, TextureDesc>,
    failing_labels: HashSet<String>,
    fail_draws: bool,
    pixels: HashMap<(u32, u32), u32>,
    width: u32,
    height: u32,
}

impl RecordingDevice {
    /// Create a device with a back buffer of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            commands: Vec::new(),
            next_id: 1,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            failing_labels: HashSet::new(),
            fail_draws: false,
            pixels: HashMap::new(),
            width,
            height,
        }
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Take the recorded commands, leaving the log empty.
    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Make buffer or texture creation fail for resources with this label.
    pub fn fail_label(&mut self, label: impl Into<String>) {
        self.failing_labels.insert(label.into());
    }

    /// Make every subsequent draw call fail.
    pub fn set_fail_draws(&mut self, fail: bool) {
        self.fail_draws = fail;
    }

    /// Set the value returned by [`GraphicsDevice::read_pixel`] at `(x, y)`.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: u32) {
        self.pixels.insert((x, y), rgba);
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn is_texture_live(&self, id: TextureId) -> bool {
        self.textures.contains_key(&id)
    }

    pub fn is_buffer_live(&self, id: BufferId) -> bool {
        self.buffers.contains_key(&id)
    }

    pub fn texture_desc(&self, id: TextureId) -> Option<&TextureDesc> {
        self.textures.get(&id)
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record_draw(&mut self, command: DeviceCommand) -> DeviceResult<()> {
        if self.fail_draws {
            return Err(DeviceError::Draw(format!("{command:?} rejected")));
        }
        self.commands.push(command);
        Ok(())
    }
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_buffer(
        &mut self,
        label: &str,
        usage: BufferUsage,
        contents: &[u8],
    ) -> DeviceResult<BufferId> {
        if self.failing_labels.contains(label) {
            return Err(DeviceError::BufferCreation {
                label: label.to_string(),
                message: "injected failure".to_string(),
            });
        }
        let id = BufferId(self.allocate_id());
        self.buffers.insert(id, contents.len());
        self.commands.push(DeviceCommand::CreateBuffer {
            id,
            usage,
            size: contents.len(),
        });
        Ok(id)
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: &[u8]) -> DeviceResult<TextureId> {
        if self.failing_labels.contains(&desc.label) {
            return Err(DeviceError::TextureCreation {
                label: desc.label.clone(),
                message: "injected failure".to_string(),
            });
        }
        if data.is_empty() {
            return Err(DeviceError::TextureCreation {
                label: desc.label.clone(),
                message: "no pixel data".to_string(),
            });
        }
        let id = TextureId(self.allocate_id());
        self.textures.insert(id, desc.clone());
        self.commands.push(DeviceCommand::CreateTexture {
            id,
            desc: desc.clone(),
        });
        Ok(id)
    }

    fn destroy_buffer(&mut self, id: BufferId) {
        self.buffers.remove(&id);
        self.commands.push(DeviceCommand::DestroyBuffer(id));
    }

    fn destroy_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
        self.commands.push(DeviceCommand::DestroyTexture(id));
    }

    fn begin_frame(&mut self) {
        self.commands.push(DeviceCommand::BeginFrame);
    }

    fn end_frame(&mut self) {
        self.commands.push(DeviceCommand::EndFrame);
    }

    fn bind_back_buffer(&mut self) {
        self.commands.push(DeviceCommand::BindBackBuffer);
    }

    fn back_buffer_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.commands.push(DeviceCommand::SetViewport(*viewport));
    }

    fn clear(&mut self, color: wgpu::Color) {
        self.commands.push(DeviceCommand::Clear(color));
    }

    fn set_sampler(&mut self, unit: u32, sampler: &SamplerState) {
        self.commands.push(DeviceCommand::SetSampler {
            unit,
            sampler: *sampler,
        });
    }

    fn set_texture(&mut self, unit: u32, texture: Option<TextureId>) {
        self.commands.push(DeviceCommand::SetTexture { unit, texture });
    }

    fn set_vertex_program(&mut self, program: Option<VertexProgram>) {
        self.commands.push(DeviceCommand::SetVertexProgram(program));
    }

    fn set_pixel_program(&mut self, program: Option<PixelProgram>) {
        self.commands.push(DeviceCommand::SetPixelProgram(program));
    }

    fn set_vertex_layout(&mut self, layout: VertexLayout) {
        self.commands.push(DeviceCommand::SetVertexLayout(layout));
    }

    fn set_vertex_constants(&mut self, register: u32, values: &[[f32; 4]]) {
        self.commands.push(DeviceCommand::SetVertexConstants {
            register,
            values: values.to_vec(),
        });
    }

    fn set_pixel_constants(&mut self, register: u32, values: &[[f32; 4]]) {
        self.commands.push(DeviceCommand::SetPixelConstants {
            register,
            values: values.to_vec(),
        });
    }

    fn set_cull_mode(&mut self, cull: Option<wgpu::Face>) {
        self.commands.push(DeviceCommand::SetCullMode(cull));
    }

    fn set_alpha_test(&mut self, test: Option<AlphaTest>) {
        self.commands.push(DeviceCommand::SetAlphaTest(test));
    }

    fn set_blend(&mut self, blend: Option<wgpu::BlendState>) {
        self.commands.push(DeviceCommand::SetBlend(blend));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.commands.push(DeviceCommand::SetDepthWrite(enabled));
    }

    fn set_polygon_mode(&mut self, mode: wgpu::PolygonMode) {
        self.commands.push(DeviceCommand::SetPolygonMode(mode));
    }

    fn set_depth_bias(&mut self, bias: f32) {
        self.commands.push(DeviceCommand::SetDepthBias(bias));
    }

    fn set_vertex_buffer(&mut self, buffer: BufferId, stride: u32) {
        self.commands
            .push(DeviceCommand::SetVertexBuffer { buffer, stride });
    }

    fn set_index_buffer(&mut self, buffer: BufferId, format: wgpu::IndexFormat) {
        self.commands
            .push(DeviceCommand::SetIndexBuffer { buffer, format });
    }

    fn draw_indexed(
        &mut self,
        first_index: u32,
        primitive_count: u32,
        vertex_count: u32,
    ) -> DeviceResult<()> {
        self.record_draw(DeviceCommand::DrawIndexed {
            first_index,
            primitive_count,
            vertex_count,
        })
    }

    fn draw_lines(&mut self, first_vertex: u32, line_count: u32) -> DeviceResult<()> {
        self.record_draw(DeviceCommand::DrawLines {
            first_vertex,
            line_count,
        })
    }

    fn draw_user_lines(&mut self, vertices: &[DebugVertex]) -> DeviceResult<()> {
        self.record_draw(DeviceCommand::DrawUserLines(vertices.to_vec()))
    }

    fn draw_screen_quad(&mut self, vertices: &[ScreenVertex; 4]) -> DeviceResult<()> {
        self.record_draw(DeviceCommand::DrawScreenQuad(*vertices))
    }

    fn read_pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels.get(&(x, y)).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TextureKind;

    fn desc(label: &str) -> TextureDesc {
        TextureDesc {
            label: label.to_string(),
            width: 1,
            height: 1,
            format: wgpu::TextureFormat::Rgba8Unorm,
            mip_level_count: 1,
            kind: TextureKind::D2,
        }
    }

    #[test]
    fn test_create_and_destroy() {
        let mut device = RecordingDevice::default();
        let texture = device.create_texture(&desc("a"), &[0; 4]).unwrap();
        let buffer = device
            .create_buffer("vb", BufferUsage::Vertex, &[0; 16])
            .unwrap();

        assert_ne!(texture.0, buffer.0);
        assert_eq!(device.live_texture_count(), 1);
        assert_eq!(device.live_buffer_count(), 1);

        device.destroy_texture(texture);
        device.destroy_buffer(buffer);
        assert_eq!(device.live_texture_count(), 0);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn test_injected_failures() {
        let mut device = RecordingDevice::default();
        device.fail_label("broken");

        assert!(device.create_texture(&desc("broken"), &[0; 4]).is_err());
        assert!(device
            .create_buffer("broken", BufferUsage::Index, &[0; 4])
            .is_err());
        assert!(device.create_texture(&desc("fine"), &[0; 4]).is_ok());

        device.set_fail_draws(true);
        assert!(device.draw_indexed(0, 1, 3).is_err());
        assert!(!device.commands().iter().any(DeviceCommand::is_draw));
    }

    #[test]
    fn test_read_pixel() {
        let mut device = RecordingDevice::new(4, 4);
        device.set_pixel(1, 2, 0x12345678);

        assert_eq!(device.read_pixel(1, 2), Some(0x12345678));
        assert_eq!(device.read_pixel(0, 0), Some(0));
        assert_eq!(device.read_pixel(4, 0), None);
    }
}

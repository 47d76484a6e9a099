use super::ResourceManager;
use crate::device::GraphicsDevice;
use crate::handle::{TextureBinding, TextureHandle};
use crate::pool::{PoolError, PoolResult};
use crate::texture::{Texture, TextureError, TextureRequest, TextureResult, TextureSettings};

impl ResourceManager {
    /// Load a texture, or return the handle already loaded for an equivalent
    /// path. Usage is not touched.
    pub fn load_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &str,
        format: Option<wgpu::TextureFormat>,
        levels: u32,
    ) -> TextureResult<TextureHandle> {
        if let Some(handle) = self.textures.find(path) {
            return Ok(handle);
        }

        match Texture::load(device, path, format, levels) {
            Ok(texture) => Ok(self.textures.insert(path, texture)),
            Err(err) => {
                log::error!("Failed to load texture '{}': {}", path, err);
                Err(err)
            }
        }
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle)
    }

    pub fn acquire_texture(&self, handle: TextureHandle) -> Option<TextureBinding> {
        self.textures.acquire(handle)
    }

    /// Load a texture, apply the request's sampler settings, and take one
    /// unit of usage on it.
    pub fn load_texture_with_settings(
        &mut self,
        device: &mut dyn GraphicsDevice,
        request: &TextureRequest,
    ) -> TextureResult<TextureBinding> {
        let handle = self.load_texture(device, &request.path, request.format, request.levels)?;
        self.update_texture_settings(handle, &request.settings)
            .map_err(|_| TextureError::NotLoaded(request.path.clone()))?;

        self.textures
            .acquire(handle)
            .ok_or_else(|| TextureError::NotLoaded(request.path.clone()))
    }

    /// Replace the sampler settings of a loaded texture. Every material
    /// sampling it sees the change.
    pub fn update_texture_settings(
        &mut self,
        handle: TextureHandle,
        settings: &TextureSettings,
    ) -> PoolResult<()> {
        let texture = self
            .textures
            .get_mut(handle)
            .ok_or(PoolError::InvalidHandle { kind: "texture" })?;
        texture.settings = *settings;
        Ok(())
    }

    /// Decode a loaded texture again from disk.
    ///
    /// The handle, usage, format, level count and sampler settings survive.
    /// On failure the previous texture stays resident.
    pub fn reload_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &str,
    ) -> TextureResult<TextureHandle> {
        let format = self
            .textures
            .find(path)
            .and_then(|handle| self.textures.get(handle))
            .and_then(|texture| texture.format);
        self.reload_texture_as(device, path, format)
    }

    /// Reload in `format`. On failure the resident texture, format included,
    /// is left untouched.
    pub(crate) fn reload_texture_as(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &str,
        format: Option<wgpu::TextureFormat>,
    ) -> TextureResult<TextureHandle> {
        let handle = self
            .textures
            .find(path)
            .ok_or_else(|| TextureError::NotLoaded(path.to_string()))?;
        let current = self
            .textures
            .get(handle)
            .ok_or_else(|| TextureError::NotLoaded(path.to_string()))?;
        let source = current.path.clone();
        let settings = current.settings;

        let mut texture = match Texture::load(device, &source, format, current.mip_levels) {
            Ok(texture) => texture,
            Err(err) => {
                log::error!("Failed to reload texture '{}': {}", path, err);
                return Err(err);
            }
        };
        texture.settings = settings;

        if let Some(slot) = self.textures.get_mut(handle) {
            let old = std::mem::replace(slot, texture);
            device.destroy_texture(old.gpu);
        }
        log::info!("Reloaded texture: {}", path);
        Ok(handle)
    }

    /// Reclaim an unused texture and destroy its GPU object.
    pub fn unload_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: TextureHandle,
    ) -> PoolResult<()> {
        let texture = self.textures.remove(handle)?;
        device.destroy_texture(texture.gpu);
        Ok(())
    }

    pub fn texture_paths(&self) -> Vec<String> {
        self.textures.paths()
    }
}

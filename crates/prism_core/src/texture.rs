//! Texture resources.
//!
//! Images are decoded on the CPU with the `image` crate and uploaded through
//! the [`GraphicsDevice`]. Each texture remembers its sampling settings so the
//! renderer can program the texture unit it binds to.

use std::path::Path;

use thiserror::Error;

use crate::device::{
    DeviceError, GraphicsDevice, SamplerState, TextureDesc, TextureId, TextureKind,
};

/// Largest anisotropy a texture may request.
pub const MAX_ANISOTROPY: u16 = 8;

/// Size of the flat-color default textures.
pub const DEFAULT_TEXTURE_SIZE: u32 = 16;

/// Errors that can occur during texture loading.
#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to decode texture {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Texture not loaded: {0}")]
    NotLoaded(String),
}

pub type TextureResult<T> = Result<T, TextureError>;

/// Filtering applied when sampling a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    Point,
    #[default]
    Linear,
    Anisotropic,
}

/// Per-texture sampling settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureSettings {
    pub wrap_u: wgpu::AddressMode,
    pub wrap_v: wgpu::AddressMode,
    pub filter: TextureFilter,
    /// Anisotropy exponent: the sampler uses `1 << anisotropy`, clamped to [`MAX_ANISOTROPY`].
    pub anisotropy: u8,
    pub mip_bias: f32,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            wrap_u: wgpu::AddressMode::Repeat,
            wrap_v: wgpu::AddressMode::Repeat,
            filter: TextureFilter::Linear,
            anisotropy: 0,
            mip_bias: 0.0,
        }
    }
}

impl TextureSettings {
    pub fn max_anisotropy(&self) -> u16 {
        1u16.checked_shl(self.anisotropy as u32)
            .unwrap_or(MAX_ANISOTROPY)
            .min(MAX_ANISOTROPY)
    }

    /// Sampler state for a texture unit.
    pub fn sampler_state(&self) -> SamplerState {
        use wgpu::FilterMode;

        let (mag, min, anisotropy) = match self.filter {
            TextureFilter::Point => (FilterMode::Nearest, FilterMode::Nearest, 1),
            TextureFilter::Linear => (FilterMode::Linear, FilterMode::Linear, 1),
            TextureFilter::Anisotropic => {
                (FilterMode::Linear, FilterMode::Linear, self.max_anisotropy())
            }
        };

        SamplerState {
            address_u: self.wrap_u,
            address_v: self.wrap_v,
            mag_filter: mag,
            min_filter: min,
            mipmap_filter: FilterMode::Linear,
            anisotropy_clamp: anisotropy,
            lod_bias: self.mip_bias,
        }
    }
}

/// A texture load together with the sampler settings to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureRequest {
    pub path: String,
    pub format: Option<wgpu::TextureFormat>,
    /// Mip levels to create; 0 requests a full chain
    pub levels: u32,
    pub settings: TextureSettings,
}

impl TextureRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format: None,
            levels: 0,
            settings: TextureSettings::default(),
        }
    }
}

/// Decoded RGBA8 pixels, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureImage {
    /// Decode an image file.
    pub fn open(path: &Path) -> TextureResult<Self> {
        let img = image::open(path).map_err(|source| TextureError::Decode {
            path: path.display().to_string(),
            source,
        })?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    /// A square image filled with one packed ARGB color.
    pub fn solid(size: u32, argb: u32) -> Self {
        let [a, r, g, b] = argb.to_be_bytes();
        let pixels = [r, g, b, a].repeat((size * size) as usize);
        Self {
            width: size,
            height: size,
            pixels,
        }
    }
}

/// Number of levels in a full mip chain.
pub fn full_mip_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// A texture resident in the pool.
#[derive(Debug, Clone)]
pub struct Texture {
    /// Source path (or built-in name such as `@@base`)
    pub path: String,
    pub settings: TextureSettings,
    /// Requested pixel format; `None` keeps the file's own layout
    pub format: Option<wgpu::TextureFormat>,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub gpu: TextureId,
}

impl Texture {
    /// Upload decoded pixels. `levels == 0` requests a full mip chain.
    pub fn upload(
        device: &mut dyn GraphicsDevice,
        path: &str,
        image: &TextureImage,
        format: Option<wgpu::TextureFormat>,
        levels: u32,
    ) -> TextureResult<Self> {
        let mip_levels = match levels {
            0 => full_mip_count(image.width, image.height),
            n => n.min(full_mip_count(image.width, image.height)),
        };

        let desc = TextureDesc {
            label: path.to_string(),
            width: image.width,
            height: image.height,
            format: upload_format(format),
            mip_level_count: mip_levels,
            kind: TextureKind::D2,
        };
        let gpu = device.create_texture(&desc, &image.pixels)?;

        Ok(Self {
            path: path.to_string(),
            settings: TextureSettings::default(),
            format,
            width: image.width,
            height: image.height,
            mip_levels,
            gpu,
        })
    }

    /// Decode `path` from disk and upload it.
    pub fn load(
        device: &mut dyn GraphicsDevice,
        path: &str,
        format: Option<wgpu::TextureFormat>,
        levels: u32,
    ) -> TextureResult<Self> {
        let image = TextureImage::open(Path::new(path))?;
        let texture = Self::upload(device, path, &image, format, levels)?;

        log::debug!(
            "Loaded texture: {} ({}x{}, {} mips)",
            path,
            texture.width,
            texture.height,
            texture.mip_levels
        );
        Ok(texture)
    }

    /// A flat-color default texture.
    pub fn solid(device: &mut dyn GraphicsDevice, name: &str, argb: u32) -> TextureResult<Self> {
        let image = TextureImage::solid(DEFAULT_TEXTURE_SIZE, argb);
        Self::upload(device, name, &image, None, 1)
    }

    pub fn sampler_state(&self) -> SamplerState {
        self.settings.sampler_state()
    }
}

/// Decoded pixels are always RGBA8; only the color space of the request survives.
fn upload_format(requested: Option<wgpu::TextureFormat>) -> wgpu::TextureFormat {
    match requested {
        Some(format) if format.is_srgb() => wgpu::TextureFormat::Rgba8UnormSrgb,
        _ => wgpu::TextureFormat::Rgba8Unorm,
    }
}

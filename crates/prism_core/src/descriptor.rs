//! Material descriptors.
//!
//! A descriptor is the already-parsed form of a material asset. The viewport
//! core does not read asset files itself; hosts deserialize descriptors with
//! serde (or build them in code) and hand them over through a
//! [`MaterialSource`].

use std::collections::HashMap;

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::material::{AlphaMode, MaterialFlags, MaterialParams};
use crate::texture::{TextureFilter, TextureRequest, TextureSettings};

/// Alpha modes as authored. Several collapse onto one runtime mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorAlphaMode {
    #[default]
    Opaque,
    Additive,
    Cutout,
    SoftEdge,
    Scunge,
    Overlay,
    Blended,
}

impl From<DescriptorAlphaMode> for AlphaMode {
    fn from(mode: DescriptorAlphaMode) -> Self {
        match mode {
            DescriptorAlphaMode::Opaque => AlphaMode::Opaque,
            DescriptorAlphaMode::Additive => AlphaMode::Additive,
            DescriptorAlphaMode::Cutout | DescriptorAlphaMode::SoftEdge => AlphaMode::Cutout,
            DescriptorAlphaMode::Scunge
            | DescriptorAlphaMode::Overlay
            | DescriptorAlphaMode::Blended => AlphaMode::Blended,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapMode {
    #[default]
    Wrap,
    Clamp,
}

impl From<WrapMode> for wgpu::AddressMode {
    fn from(mode: WrapMode) -> Self {
        match mode {
            WrapMode::Wrap => wgpu::AddressMode::Repeat,
            WrapMode::Clamp => wgpu::AddressMode::ClampToEdge,
        }
    }
}

/// Runtime filter as authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorFilter {
    Point,
    Bilinear,
    #[default]
    Trilinear,
    AnisotropicPoint,
    AnisotropicLinear,
}

impl From<DescriptorFilter> for TextureFilter {
    fn from(filter: DescriptorFilter) -> Self {
        match filter {
            DescriptorFilter::Point => TextureFilter::Point,
            DescriptorFilter::Bilinear | DescriptorFilter::Trilinear => TextureFilter::Linear,
            DescriptorFilter::AnisotropicPoint | DescriptorFilter::AnisotropicLinear => {
                TextureFilter::Anisotropic
            }
        }
    }
}

/// Requested storage format of a texture map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorFormat {
    /// Keep the file's own layout
    #[default]
    Auto,
    Rgba8,
    Bc1,
    Bc3,
    /// Two-channel normal map
    Rg8,
    /// Linear (non-color) RGBA data
    Linear,
}

impl DescriptorFormat {
    pub fn to_wgpu(self) -> Option<wgpu::TextureFormat> {
        match self {
            DescriptorFormat::Auto => None,
            DescriptorFormat::Rgba8 => Some(wgpu::TextureFormat::Rgba8UnormSrgb),
            DescriptorFormat::Bc1 => Some(wgpu::TextureFormat::Bc1RgbaUnormSrgb),
            DescriptorFormat::Bc3 => Some(wgpu::TextureFormat::Bc3RgbaUnormSrgb),
            DescriptorFormat::Rg8 => Some(wgpu::TextureFormat::Rg8Unorm),
            DescriptorFormat::Linear => Some(wgpu::TextureFormat::Rgba8Unorm),
        }
    }
}

/// One texture map reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureMapDesc {
    pub path: String,
    pub filter: DescriptorFilter,
    /// Anisotropy exponent, see [`TextureSettings::anisotropy`]
    pub anisotropy: u8,
    pub format: DescriptorFormat,
    pub mip_bias: f32,
}

impl Default for TextureMapDesc {
    fn default() -> Self {
        Self {
            path: String::new(),
            filter: DescriptorFilter::default(),
            anisotropy: 0,
            format: DescriptorFormat::Auto,
            mip_bias: 0.0,
        }
    }
}

impl TextureMapDesc {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Load request for this map with an explicit format.
    pub fn request(
        &self,
        wrap_u: WrapMode,
        wrap_v: WrapMode,
        format: Option<wgpu::TextureFormat>,
    ) -> TextureRequest {
        TextureRequest {
            path: self.path.clone(),
            format,
            levels: 0,
            settings: self.settings(wrap_u, wrap_v),
        }
    }

    pub fn settings(&self, wrap_u: WrapMode, wrap_v: WrapMode) -> TextureSettings {
        TextureSettings {
            wrap_u: wrap_u.into(),
            wrap_v: wrap_v.into(),
            filter: self.filter.into(),
            anisotropy: self.anisotropy,
            mip_bias: self.mip_bias,
        }
    }
}

/// Everything needed to build a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDescriptor {
    pub alpha_mode: DescriptorAlphaMode,
    pub double_sided: bool,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,

    pub base_map: Option<TextureMapDesc>,
    pub base_tint: [u8; 3],
    pub disable_base_tint: bool,
    /// Promote BC1 base maps to BC3 to make room for a detail mask in alpha
    pub detail_mask: bool,

    pub normal_map: Option<TextureMapDesc>,
    pub normal_scale: f32,

    /// Gloss map, or the combined gloss/parallax/incandescent map when
    /// `combined_gpi` is set
    pub gloss_map: Option<TextureMapDesc>,
    pub combined_gpi: bool,
    pub parallax_map: Option<TextureMapDesc>,
    pub incandescent_map: Option<TextureMapDesc>,

    pub parallax_enabled: bool,
    pub parallax_scale: f32,
    pub parallax_bias: f32,
    pub gloss_enabled: bool,
    pub gloss_scale: f32,
    pub gloss_tint: [u8; 3],
    pub gloss_dirty: f32,
    pub specular_power: f32,
    pub incandescent_enabled: bool,
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self {
            alpha_mode: DescriptorAlphaMode::Opaque,
            double_sided: false,
            wrap_u: WrapMode::Wrap,
            wrap_v: WrapMode::Wrap,
            base_map: None,
            base_tint: [255; 3],
            disable_base_tint: false,
            detail_mask: false,
            normal_map: None,
            normal_scale: 1.0,
            gloss_map: None,
            combined_gpi: true,
            parallax_map: None,
            incandescent_map: None,
            parallax_enabled: false,
            parallax_scale: 0.005,
            parallax_bias: 0.0,
            gloss_enabled: false,
            gloss_scale: 1.0,
            gloss_tint: [255; 3],
            gloss_dirty: 0.0,
            specular_power: 20.0,
            incandescent_enabled: false,
        }
    }
}

impl MaterialDescriptor {
    pub fn flags(&self) -> MaterialFlags {
        if self.double_sided {
            MaterialFlags::TWO_SIDED
        } else {
            MaterialFlags::empty()
        }
    }

    pub fn base_tint(&self) -> Vec4 {
        if self.disable_base_tint {
            Vec4::ONE
        } else {
            rgb_to_vec4(self.base_tint, 1.0)
        }
    }

    /// Requested base-map format after the detail-mask promotion.
    pub fn base_format(&self) -> Option<wgpu::TextureFormat> {
        let format = self.base_map.as_ref().and_then(|m| m.format.to_wgpu());
        match format {
            Some(wgpu::TextureFormat::Bc1RgbaUnormSrgb) if self.detail_mask => {
                Some(wgpu::TextureFormat::Bc3RgbaUnormSrgb)
            }
            other => other,
        }
    }

    /// Write the gloss, parallax, and incandescence parameters.
    pub fn apply_auxiliary(&self, params: &mut MaterialParams) {
        params.clear_auxiliary();

        if self.parallax_enabled {
            params.parallax_scale = self.parallax_scale;
            params.parallax_bias = self.parallax_bias;
        }
        if self.gloss_enabled {
            params.gloss_scale = self.gloss_scale;
            params.gloss_tint = rgb_to_vec4(self.gloss_tint, self.gloss_dirty);
            params.specular_power = self.specular_power;
        }
        params.incandescent_scale = if self.incandescent_enabled { 1.0 } else { 0.0 };
    }
}

fn rgb_to_vec4(rgb: [u8; 3], w: f32) -> Vec4 {
    Vec4::new(
        rgb[0] as f32 / 255.0,
        rgb[1] as f32 / 255.0,
        rgb[2] as f32 / 255.0,
        w,
    )
}

/// Resolves material paths to descriptors.
pub trait MaterialSource {
    fn descriptor(&self, path: &str) -> Option<MaterialDescriptor>;
}

impl MaterialSource for HashMap<String, MaterialDescriptor> {
    fn descriptor(&self, path: &str) -> Option<MaterialDescriptor> {
        self.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_mode_mapping() {
        use DescriptorAlphaMode::*;
        let mapped: Vec<AlphaMode> = [Opaque, Additive, Cutout, SoftEdge, Scunge, Overlay, Blended]
            .into_iter()
            .map(AlphaMode::from)
            .collect();

        assert_eq!(
            mapped,
            vec![
                AlphaMode::Opaque,
                AlphaMode::Additive,
                AlphaMode::Cutout,
                AlphaMode::Cutout,
                AlphaMode::Blended,
                AlphaMode::Blended,
                AlphaMode::Blended,
            ]
        );
    }

    #[test]
    fn test_filter_mapping() {
        assert_eq!(TextureFilter::from(DescriptorFilter::Point), TextureFilter::Point);
        assert_eq!(TextureFilter::from(DescriptorFilter::Trilinear), TextureFilter::Linear);
        assert_eq!(
            TextureFilter::from(DescriptorFilter::AnisotropicPoint),
            TextureFilter::Anisotropic
        );
    }

    #[test]
    fn test_deserialize_partial_descriptor() {
        let json = r#"{
            "alpha_mode": "soft_edge",
            "double_sided": true,
            "wrap_u": "clamp",
            "base_map": { "path": "textures/rock.png", "filter": "point", "format": "bc1" },
            "base_tint": [255, 128, 0],
            "detail_mask": true
        }"#;
        let desc: MaterialDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(AlphaMode::from(desc.alpha_mode), AlphaMode::Cutout);
        assert!(desc.flags().contains(MaterialFlags::TWO_SIDED));
        assert_eq!(desc.wrap_v, WrapMode::Wrap);
        assert_eq!(desc.normal_scale, 1.0);
        assert!(desc.combined_gpi);
        assert_eq!(
            desc.base_format(),
            Some(wgpu::TextureFormat::Bc3RgbaUnormSrgb)
        );

        let tint = desc.base_tint();
        assert!((tint.y - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(tint.w, 1.0);

        let settings = desc
            .base_map
            .as_ref()
            .unwrap()
            .settings(desc.wrap_u, desc.wrap_v);
        assert_eq!(settings.wrap_u, wgpu::AddressMode::ClampToEdge);
        assert_eq!(settings.filter, TextureFilter::Point);
    }

    #[test]
    fn test_apply_auxiliary() {
        let desc = MaterialDescriptor {
            gloss_enabled: true,
            gloss_scale: 2.0,
            gloss_tint: [255, 0, 255],
            gloss_dirty: 0.25,
            specular_power: 64.0,
            incandescent_enabled: true,
            ..Default::default()
        };
        let mut params = MaterialParams::default();
        desc.apply_auxiliary(&mut params);

        assert_eq!(params.gloss_scale, 2.0);
        assert_eq!(params.gloss_tint, Vec4::new(1.0, 0.0, 1.0, 0.25));
        assert_eq!(params.specular_power, 64.0);
        assert_eq!(params.incandescent_scale, 1.0);
        // Parallax disabled
        assert_eq!(params.parallax_scale, 0.0);
    }

    #[test]
    fn test_hashmap_source() {
        let mut source = HashMap::new();
        source.insert("a.xml".to_string(), MaterialDescriptor::default());

        assert!(source.descriptor("a.xml").is_some());
        assert!(source.descriptor("b.xml").is_none());
    }
}

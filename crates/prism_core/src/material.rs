//! Materials ("shaders"): alpha mode, flags, five texture slots, and the
//! scalar parameters the pixel programs read.

use bitflags::bitflags;
use glam::Vec4;
use thiserror::Error;

use crate::handle::{TextureBinding, TextureHandle};
use crate::pool::PoolError;
use crate::texture::TextureError;

/// Name of the material every fragment falls back to.
pub const DEFAULT_MATERIAL: &str = "@@default";

/// Name of the combined gloss/parallax/incandescent placeholder.
pub const GPI_PLACEHOLDER: &str = "@@gpi";

/// Errors that abort material construction.
#[derive(Error, Debug)]
pub enum MaterialError {
    #[error("No descriptor for material {0}")]
    NotFound(String),

    #[error("Material {material}: placeholder texture {placeholder} is unavailable")]
    PlaceholderUnavailable {
        material: String,
        placeholder: &'static str,
    },

    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
}

pub type MaterialResult<T> = Result<T, MaterialError>;

bitflags! {
    /// Material feature flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u32 {
        /// Gloss, parallax, and incandescence packed into the gloss slot
        const COMBINED_GPI = 1 << 0;
        const TWO_SIDED = 1 << 1;
    }
}

/// How a material composites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Additive,
    Blended,
    Cutout,
}

impl AlphaMode {
    /// Drawn in the depth-writing pass.
    pub fn is_opaque_pass(self) -> bool {
        matches!(self, AlphaMode::Opaque | AlphaMode::Cutout)
    }

    /// Drawn in the blended pass.
    pub fn is_blended_pass(self) -> bool {
        matches!(self, AlphaMode::Additive | AlphaMode::Blended)
    }
}

/// Texture slots, in texture-unit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Base = 0,
    Normal = 1,
    /// Gloss map, or the combined map when [`MaterialFlags::COMBINED_GPI`] is set
    Gloss = 2,
    Parallax = 3,
    Incandescent = 4,
}

pub const TEXTURE_SLOT_COUNT: usize = 5;

impl TextureSlot {
    pub const ALL: [TextureSlot; TEXTURE_SLOT_COUNT] = [
        TextureSlot::Base,
        TextureSlot::Normal,
        TextureSlot::Gloss,
        TextureSlot::Parallax,
        TextureSlot::Incandescent,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Texture unit the slot binds to.
    #[inline]
    pub fn unit(self) -> u32 {
        self as u32
    }

    /// Default texture substituted when the slot's map cannot be loaded.
    pub fn placeholder(self) -> &'static str {
        match self {
            TextureSlot::Base => "@@base",
            TextureSlot::Normal => "@@normal",
            TextureSlot::Gloss => "@@gloss",
            TextureSlot::Parallax => "@@parallax",
            TextureSlot::Incandescent => "@@incan",
        }
    }
}

/// Scalar and tint parameters uploaded with every fragment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParams {
    pub normal_scale: f32,
    pub parallax_scale: f32,
    pub parallax_bias: f32,
    pub gloss_scale: f32,
    pub specular_power: f32,
    pub incandescent_scale: f32,
    pub env_lod: f32,
    pub base_tint: Vec4,
    /// RGB gloss tint; alpha carries gloss dirtiness
    pub gloss_tint: Vec4,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            normal_scale: 1.0,
            parallax_scale: 0.005,
            parallax_bias: 0.0,
            gloss_scale: 1.0,
            specular_power: 20.0,
            incandescent_scale: 1.0,
            env_lod: 5.0,
            base_tint: Vec4::ONE,
            gloss_tint: Vec4::new(1.0, 1.0, 1.0, 0.0),
        }
    }
}

impl MaterialParams {
    /// Neutral parameters for a material without gloss, parallax, or incandescence.
    pub fn clear_auxiliary(&mut self) {
        self.parallax_scale = 0.0;
        self.parallax_bias = 0.0;
        self.gloss_scale = 0.0;
        self.gloss_tint = Vec4::ONE;
        self.incandescent_scale = 0.0;
        self.env_lod = 5.0;
    }
}

/// A material resident in the pool.
///
/// Each bound slot owns one unit of usage on its texture. Slots change only
/// through [`Material::replace_texture`], and dropping the material releases
/// every slot.
#[derive(Debug)]
pub struct Material {
    pub path: String,
    pub flags: MaterialFlags,
    pub alpha_mode: AlphaMode,
    pub params: MaterialParams,
    textures: [Option<TextureBinding>; TEXTURE_SLOT_COUNT],
}

impl Material {
    /// A material with default parameters, the combined-map flag, and no bound textures.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: MaterialFlags::COMBINED_GPI,
            alpha_mode: AlphaMode::Opaque,
            params: MaterialParams::default(),
            textures: Default::default(),
        }
    }

    /// Handle bound to a slot, if any.
    pub fn texture(&self, slot: TextureSlot) -> Option<TextureHandle> {
        self.textures[slot.index()].as_ref().map(|b| b.handle())
    }

    pub fn textures(&self) -> impl Iterator<Item = (TextureSlot, Option<TextureHandle>)> + '_ {
        TextureSlot::ALL
            .into_iter()
            .map(move |slot| (slot, self.texture(slot)))
    }

    /// Store a new binding in `slot` and hand back the previous one.
    ///
    /// Dropping the returned binding releases the old texture.
    pub fn replace_texture(
        &mut self,
        slot: TextureSlot,
        binding: Option<TextureBinding>,
    ) -> Option<TextureBinding> {
        std::mem::replace(&mut self.textures[slot.index()], binding)
    }

    pub fn is_combined_gpi(&self) -> bool {
        self.flags.contains(MaterialFlags::COMBINED_GPI)
    }

    pub fn is_two_sided(&self) -> bool {
        self.flags.contains(MaterialFlags::TWO_SIDED)
    }

    /// Copy under a new path. Every bound texture gains one more user.
    pub fn duplicate(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: self.flags,
            alpha_mode: self.alpha_mode,
            params: self.params,
            textures: self.textures.clone(),
        }
    }
}

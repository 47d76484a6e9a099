//! Environments: a cube map for the sky and its order-2 SH irradiance.
//!
//! Cube maps are read from a horizontal strip of six square faces in
//! +X, -X, +Y, -Y, +Z, -Z order. Radiance is projected onto spherical
//! harmonics once at load time, rotated from the authoring convention into
//! the Z-up world, and stored as irradiance ready for light accumulation.

use std::path::Path;

use prism_math::sh::{texel_solid_angle, FULL_SPHERE};
use prism_math::{Mat3, ShCoefficients, ShIrradiance, Vec3, Vec4, Vec4Swizzles};
use rayon::prelude::*;
use thiserror::Error;

use crate::device::{DeviceError, GraphicsDevice, TextureDesc, TextureId, TextureKind};

/// Name of the built-in environment.
pub const DEFAULT_ENVIRONMENT: &str = "@@default";

/// Clear color of the built-in environment (ARGB).
pub const DEFAULT_CLEAR_COLOR: u32 = 0xff404040;

pub const CUBE_FACE_COUNT: usize = 6;

/// Edge length of the built-in environment's faces.
const DEFAULT_FACE_SIZE: u32 = 16;

/// Maps authoring-space directions (Y up) into world space (Z up):
/// `(x, y, z) -> (-z, -x, y)`.
pub const AUTHORING_TO_WORLD: Mat3 = Mat3::from_cols(
    Vec3::new(0.0, -1.0, 0.0),
    Vec3::new(0.0, 0.0, 1.0),
    Vec3::new(-1.0, 0.0, 0.0),
);

/// Errors that can occur while loading an environment.
#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("Failed to decode cube map {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Cube map {path} is {width}x{height}; expected a strip of six square faces")]
    InvalidStrip {
        path: String,
        width: u32,
        height: u32,
    },

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
}

pub type EnvironmentResult<T> = Result<T, EnvironmentError>;

/// Linear RGBA cube faces, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeMap {
    pub size: u32,
    pub faces: [Vec<Vec4>; CUBE_FACE_COUNT],
}

impl CubeMap {
    /// One flat color per face.
    pub fn solid_faces(size: u32, colors: [Vec4; CUBE_FACE_COUNT]) -> Self {
        let texels = (size * size) as usize;
        Self {
            size,
            faces: colors.map(|color| vec![color; texels]),
        }
    }

    /// Split a horizontal strip whose width is six times its height.
    pub fn from_strip(path: &str, strip: &image::Rgba32FImage) -> EnvironmentResult<Self> {
        let (width, height) = strip.dimensions();
        if height == 0 || width != height * CUBE_FACE_COUNT as u32 {
            return Err(EnvironmentError::InvalidStrip {
                path: path.to_string(),
                width,
                height,
            });
        }

        let size = height;
        let faces = std::array::from_fn(|face| {
            let x0 = face as u32 * size;
            let mut texels = Vec::with_capacity((size * size) as usize);
            for y in 0..size {
                for x in 0..size {
                    texels.push(Vec4::from_array(strip.get_pixel(x0 + x, y).0));
                }
            }
            texels
        });

        Ok(Self { size, faces })
    }

    /// Decode a strip image from disk.
    pub fn load(path: &Path) -> EnvironmentResult<Self> {
        let display = path.display().to_string();
        let img = image::open(path).map_err(|source| EnvironmentError::Decode {
            path: display.clone(),
            source,
        })?;
        Self::from_strip(&display, &img.to_rgba32f())
    }

    /// Unit direction through the center of texel `(x, y)` of `face`.
    pub fn texel_direction(face: usize, x: u32, y: u32, size: u32) -> Vec3 {
        let u = 2.0 * (x as f32 + 0.5) / size as f32 - 1.0;
        let v = 2.0 * (y as f32 + 0.5) / size as f32 - 1.0;

        let dir = match face {
            0 => Vec3::new(1.0, -v, -u),
            1 => Vec3::new(-1.0, -v, u),
            2 => Vec3::new(u, 1.0, v),
            3 => Vec3::new(u, -1.0, -v),
            4 => Vec3::new(u, -v, 1.0),
            _ => Vec3::new(-u, -v, -1.0),
        };
        dir.normalize()
    }

    /// Project radiance onto SH, weighting each texel by its solid angle.
    /// Faces are integrated in parallel.
    pub fn project_sh(&self) -> ShCoefficients {
        let size = self.size;
        let (sum, weight) = self.faces[..]
            .par_iter()
            .enumerate()
            .map(|(face, texels)| {
                let mut sh = ShCoefficients::ZERO;
                let mut weight = 0.0;
                for y in 0..size {
                    for x in 0..size {
                        let u = 2.0 * (x as f32 + 0.5) / size as f32 - 1.0;
                        let v = 2.0 * (y as f32 + 0.5) / size as f32 - 1.0;
                        let solid_angle = texel_solid_angle(u, v, size);

                        let texel = texels[(y * size + x) as usize];
                        sh.add_sample(
                            Self::texel_direction(face, x, y, size),
                            texel.xyz(),
                            solid_angle,
                        );
                        weight += solid_angle;
                    }
                }
                (sh, weight)
            })
            .reduce(
                || (ShCoefficients::ZERO, 0.0),
                |a, b| (a.0 + b.0, a.1 + b.1),
            );

        if weight > 0.0 {
            sum.scaled(FULL_SPHERE / weight)
        } else {
            ShCoefficients::ZERO
        }
    }

    /// Rgba32Float bytes, faces concatenated.
    pub fn to_bytes(&self) -> Vec<u8> {
        let floats: Vec<f32> = self
            .faces
            .iter()
            .flat_map(|face| face.iter().flat_map(|t| t.to_array()))
            .collect();
        bytemuck::cast_slice(&floats).to_vec()
    }
}

/// An environment resident in the pool.
#[derive(Debug, Clone)]
pub struct Environment {
    pub path: String,
    pub cube: Option<TextureId>,
    /// Irradiance in world space, before per-frame lights
    pub sh: ShIrradiance,
    /// Clear color used when the sky is not drawn (ARGB)
    pub clear_color: u32,
    pub env_scale: f32,
    pub env_bias: f32,
}

impl Environment {
    /// Load a cube-map strip, project it, and upload the cube.
    pub fn load(
        device: &mut dyn GraphicsDevice,
        path: &str,
        clear_color: u32,
    ) -> EnvironmentResult<Self> {
        let cube = CubeMap::load(Path::new(path))?;
        let environment = Self::from_cube(device, path, &cube, clear_color)?;

        log::debug!("Loaded environment: {} ({} px faces)", path, cube.size);
        Ok(environment)
    }

    pub fn from_cube(
        device: &mut dyn GraphicsDevice,
        path: &str,
        cube: &CubeMap,
        clear_color: u32,
    ) -> EnvironmentResult<Self> {
        let sh = cube
            .project_sh()
            .rotate(AUTHORING_TO_WORLD)
            .to_irradiance();

        let desc = TextureDesc {
            label: path.to_string(),
            width: cube.size,
            height: cube.size,
            format: wgpu::TextureFormat::Rgba32Float,
            mip_level_count: 1,
            kind: TextureKind::Cube,
        };
        let texture = device.create_texture(&desc, &cube.to_bytes())?;

        Ok(Self {
            path: path.to_string(),
            cube: Some(texture),
            sh,
            clear_color,
            env_scale: 1.0,
            env_bias: 0.0,
        })
    }

    /// The built-in grey environment, brighter from above.
    pub fn builtin(device: &mut dyn GraphicsDevice) -> EnvironmentResult<Self> {
        let grey = |level: u8| {
            let g = level as f32 / 255.0;
            Vec4::new(g, g, g, 1.0)
        };
        let cube = CubeMap::solid_faces(
            DEFAULT_FACE_SIZE,
            [
                grey(0x20),
                grey(0x20),
                grey(0x60),
                grey(0x10),
                grey(0x40),
                grey(0x40),
            ],
        );
        Self::from_cube(device, DEFAULT_ENVIRONMENT, &cube, DEFAULT_CLEAR_COLOR)
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        if let Some(cube) = self.cube {
            device.destroy_texture(cube);
        }
    }
}

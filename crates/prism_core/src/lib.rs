//! Prism Core - render resources for the content viewport.
//!
//! This crate provides:
//!
//! - **Device boundary**: the `GraphicsDevice` trait and a `RecordingDevice`
//! - **Resource pools**: deduplicated, usage-counted textures, materials,
//!   meshes and environments behind generation-tagged handles
//! - **Mesh ingestion**: a tolerant OBJ parser and the compile step that
//!   produces indexed vertices per material
//! - **Environments**: cube-map strips projected to SH irradiance
//!
//! # Example
//!
//! ```ignore
//! use prism_core::{MeshLoadOptions, RecordingDevice, ResourceManager};
//! use std::collections::HashMap;
//!
//! let mut device = RecordingDevice::default();
//! let mut resources = ResourceManager::new(&mut device)?;
//!
//! let materials = HashMap::new();
//! let mesh = resources.load_mesh(
//!     &mut device,
//!     "props/crate.obj",
//!     &MeshLoadOptions::default(),
//!     &materials,
//! )?;
//! println!("{} fragments", resources.mesh(mesh).unwrap().fragments.len());
//! ```

pub mod descriptor;
pub mod device;
pub mod environment;
pub mod handle;
pub mod manager;
pub mod material;
pub mod mesh;
pub mod pool;
pub mod texture;

// Re-export commonly used types
pub use descriptor::{MaterialDescriptor, MaterialSource, TextureMapDesc};
pub use device::{GraphicsDevice, RecordingDevice};
pub use environment::{CubeMap, Environment, EnvironmentError};
pub use handle::{
    EnvironmentBinding, EnvironmentHandle, MaterialBinding, MaterialHandle, MeshBinding,
    MeshHandle, TextureBinding, TextureHandle,
};
pub use manager::{ResourceError, ResourceManager};
pub use material::{AlphaMode, Material, MaterialError, MaterialFlags, TextureSlot};
pub use mesh::{Mesh, MeshError, MeshLoadOptions, ParseStatus, Winding};
pub use pool::{PoolError, ResourcePool};
pub use texture::{Texture, TextureError, TextureRequest, TextureSettings};

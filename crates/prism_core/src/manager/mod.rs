//! The resource context shared by every scene.
//!
//! [`ResourceManager`] owns one pool per resource kind. Loads are
//! deduplicated by normalized path and never take usage on their own; callers
//! take usage with the `acquire_*` methods (or the pools' explicit
//! `increment_usage`). Entries are only reclaimed by the `unload_*` methods,
//! which refuse in-use and built-in entries.

mod environments;
mod materials;
mod meshes;
mod textures;

use thiserror::Error;

use crate::device::GraphicsDevice;
use crate::environment::{Environment, EnvironmentError, DEFAULT_ENVIRONMENT};
use crate::handle::{EnvironmentHandle, MaterialHandle, MeshHandle, TextureHandle};
use crate::material::{Material, MaterialError, TextureSlot, DEFAULT_MATERIAL, GPI_PLACEHOLDER};
use crate::mesh::procedural::{parametric, DEFAULT_MESHES, GRID_SEGMENTS};
use crate::mesh::{Mesh, MeshError, MeshLoadOptions};
use crate::pool::{PoolError, ResourcePool};
use crate::texture::{Texture, TextureError};

/// Flat default textures created with the manager.
pub const DEFAULT_TEXTURES: [(&str, u32); 6] = [
    ("@@base", 0xff808080),
    ("@@normal", 0xff8080ff),
    ("@@gloss", 0xff000000),
    ("@@parallax", 0xff000000),
    ("@@incan", 0xff000000),
    (GPI_PLACEHOLDER, 0xff000000),
];

/// Errors from creating the built-in resources.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),

    #[error("Material error: {0}")]
    Material(#[from] MaterialError),

    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
}

pub type ResourceResult<T> = Result<T, ResourceError>;

/// Texture, material, mesh and environment pools.
pub struct ResourceManager {
    textures: ResourcePool<TextureHandle, Texture>,
    materials: ResourcePool<MaterialHandle, Material>,
    meshes: ResourcePool<MeshHandle, Mesh>,
    environments: ResourcePool<EnvironmentHandle, Environment>,
}

impl ResourceManager {
    /// Create the manager along with its built-in defaults: flat textures,
    /// the `@@default` material, the procedural meshes and the grey
    /// environment. Defaults are pinned and never unloaded.
    pub fn new(device: &mut dyn GraphicsDevice) -> ResourceResult<Self> {
        let mut manager = Self::empty();

        for (name, argb) in DEFAULT_TEXTURES {
            let texture = Texture::solid(device, name, argb)?;
            manager.textures.insert_pinned(name, texture);
        }

        let material = manager.default_material()?;
        manager.materials.insert_pinned(DEFAULT_MATERIAL, material);

        let options = MeshLoadOptions::default();
        for (name, surface) in DEFAULT_MESHES {
            let compiled = parametric(surface, GRID_SEGMENTS, GRID_SEGMENTS);
            let material = manager
                .materials
                .find(DEFAULT_MATERIAL)
                .and_then(|handle| manager.materials.acquire(handle))
                .ok_or_else(|| MeshError::MissingMaterial(DEFAULT_MATERIAL.to_string()))?;
            let mesh = Mesh::upload(
                device,
                name,
                &compiled,
                vec![material],
                options.debug_line_scale,
            )?;
            manager.meshes.insert_pinned(name, mesh);
        }

        let environment = Environment::builtin(device)?;
        manager
            .environments
            .insert_pinned(DEFAULT_ENVIRONMENT, environment);

        log::info!(
            "Default resources created: {} textures, {} meshes",
            manager.textures.len(),
            manager.meshes.len()
        );
        Ok(manager)
    }

    /// A manager with no resources at all, not even defaults.
    pub fn empty() -> Self {
        Self {
            textures: ResourcePool::new("texture"),
            materials: ResourcePool::new("material"),
            meshes: ResourcePool::new("mesh"),
            environments: ResourcePool::new("environment"),
        }
    }

    /// The default material samples every flat texture, with the combined
    /// placeholder in the gloss slot.
    fn default_material(&self) -> Result<Material, MaterialError> {
        let mut material = Material::new(DEFAULT_MATERIAL);

        for slot in TextureSlot::ALL {
            let name = match slot {
                TextureSlot::Gloss => GPI_PLACEHOLDER,
                other => other.placeholder(),
            };
            let binding = self.placeholder(DEFAULT_MATERIAL, name)?;
            material.replace_texture(slot, Some(binding));
        }
        Ok(material)
    }

    pub fn textures(&self) -> &ResourcePool<TextureHandle, Texture> {
        &self.textures
    }

    pub fn materials(&self) -> &ResourcePool<MaterialHandle, Material> {
        &self.materials
    }

    pub fn meshes(&self) -> &ResourcePool<MeshHandle, Mesh> {
        &self.meshes
    }

    pub fn environments(&self) -> &ResourcePool<EnvironmentHandle, Environment> {
        &self.environments
    }

    /// Release every resource and its GPU objects, in use or not.
    pub fn shutdown(mut self, device: &mut dyn GraphicsDevice) {
        for mesh in self.meshes.drain() {
            mesh.destroy(device);
        }
        self.materials.drain();
        for texture in self.textures.drain() {
            device.destroy_texture(texture.gpu);
        }
        for environment in self.environments.drain() {
            environment.destroy(device);
        }
        log::debug!("Resource manager shut down");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::descriptor::MaterialDescriptor;
    use crate::device::RecordingDevice;
    use std::collections::HashMap;

    pub(crate) fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    pub(crate) fn setup() -> (RecordingDevice, ResourceManager) {
        init_logger();
        let mut device = RecordingDevice::default();
        let manager = ResourceManager::new(&mut device).unwrap();
        (device, manager)
    }

    pub(crate) fn descriptors(
        entries: &[(&str, MaterialDescriptor)],
    ) -> HashMap<String, MaterialDescriptor> {
        entries
            .iter()
            .map(|(path, desc)| (path.to_string(), desc.clone()))
            .collect()
    }

    #[test]
    fn test_defaults_created() {
        let (device, manager) = setup();

        assert_eq!(manager.textures().len(), DEFAULT_TEXTURES.len());
        assert_eq!(manager.materials().len(), 1);
        assert_eq!(manager.meshes().len(), DEFAULT_MESHES.len());
        assert_eq!(manager.environments().len(), 1);
        assert!(manager.environments().find(DEFAULT_ENVIRONMENT).is_some());

        // Six flat textures plus the environment cube
        assert_eq!(device.live_texture_count(), 7);
        // Four buffers per procedural mesh
        assert_eq!(device.live_buffer_count(), 16);
    }

    #[test]
    fn test_default_material_bindings() {
        let (_device, manager) = setup();
        let handle = manager.materials().find(DEFAULT_MATERIAL).unwrap();
        let material = manager.materials().get(handle).unwrap();

        assert!(material.is_combined_gpi());
        let gloss = material.texture(TextureSlot::Gloss).unwrap();
        assert_eq!(manager.textures().path(gloss), Some(GPI_PLACEHOLDER));

        let base = manager.textures().find("@@base").unwrap();
        assert_eq!(material.texture(TextureSlot::Base), Some(base));
        assert_eq!(manager.textures().usage(base), Some(1));

        // Each procedural mesh holds the default material once
        assert_eq!(
            manager.materials().usage(handle),
            Some(DEFAULT_MESHES.len() as u32)
        );
    }

    #[test]
    fn test_defaults_are_pinned() {
        let (mut device, mut manager) = setup();
        let base = manager.textures().find("@@base").unwrap();
        let torus = manager.meshes().find("@@torus").unwrap();

        assert!(matches!(
            manager.unload_texture(&mut device, base),
            Err(PoolError::Pinned { .. })
        ));
        assert!(matches!(
            manager.unload_mesh(&mut device, torus),
            Err(PoolError::Pinned { .. })
        ));
    }

    #[test]
    fn test_default_texture_failure_aborts() {
        init_logger();
        let mut device = RecordingDevice::default();
        device.fail_label("@@normal");

        let result = ResourceManager::new(&mut device);
        assert!(matches!(result, Err(ResourceError::Texture(_))));
    }

    #[test]
    fn test_shutdown_releases_gpu_objects() {
        let (mut device, mut manager) = setup();
        let sources = descriptors(&[]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.obj");
        std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

        let mesh = manager
            .load_mesh(
                &mut device,
                path.to_str().unwrap(),
                &MeshLoadOptions::default(),
                &sources,
            )
            .unwrap();
        let _binding = manager.acquire_mesh(mesh).unwrap();

        manager.shutdown(&mut device);
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn test_empty_manager() {
        let manager = ResourceManager::empty();
        assert!(manager.textures().is_empty());
        assert!(manager.materials().find(DEFAULT_MATERIAL).is_none());
    }
}

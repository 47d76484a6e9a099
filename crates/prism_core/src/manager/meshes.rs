use std::path::Path;

use super::ResourceManager;
use crate::descriptor::MaterialSource;
use crate::device::GraphicsDevice;
use crate::handle::{MaterialBinding, MeshBinding, MeshHandle};
use crate::material::DEFAULT_MATERIAL;
use crate::mesh::{Mesh, MeshError, MeshLoadOptions, MeshResult, MeshSource, ParseStatus};
use crate::pool::PoolResult;

impl ResourceManager {
    /// Parse, compile and upload a mesh, or return the handle already loaded
    /// for an equivalent path. Usage is not touched.
    ///
    /// Each fragment's material is loaded through `materials`; fragments
    /// whose material cannot be built use `@@default`.
    pub fn load_mesh(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &str,
        options: &MeshLoadOptions,
        materials: &dyn MaterialSource,
    ) -> MeshResult<MeshHandle> {
        if let Some(handle) = self.meshes.find(path) {
            return Ok(handle);
        }

        let mut source = MeshSource::parse(Path::new(path), options.winding).map_err(|err| {
            log::error!("Failed to load mesh '{}': {}", path, err);
            err
        })?;
        let status = source.status();
        let warnings = source.warnings();

        if let Some(radius) = options.rescale {
            source.rescale(radius);
        }
        let compiled = source.compile();

        let bindings = compiled
            .fragments
            .iter()
            .map(|fragment| self.fragment_material(device, path, &fragment.material, materials))
            .collect::<MeshResult<Vec<_>>>()?;

        let mut mesh = Mesh::upload(device, path, &compiled, bindings, options.debug_line_scale)?;
        mesh.parse_status = status;
        mesh.warnings = warnings;

        if status == ParseStatus::OkWithFixups {
            log::warn!("Mesh {} loaded with {} fixups", path, warnings);
        }
        log::info!(
            "Loaded mesh: {} ({} vertices, {} triangles, {} fragments)",
            path,
            mesh.vertex_count,
            mesh.triangle_count(),
            mesh.fragments.len()
        );
        Ok(self.meshes.insert(path, mesh))
    }

    fn fragment_material(
        &mut self,
        device: &mut dyn GraphicsDevice,
        mesh: &str,
        name: &str,
        materials: &dyn MaterialSource,
    ) -> MeshResult<MaterialBinding> {
        let handle = match self.load_material(device, name, materials) {
            Ok(handle) => handle,
            Err(err) => {
                log::warn!(
                    "Mesh {}: material '{}' unavailable ({}), using {}",
                    mesh,
                    name,
                    err,
                    DEFAULT_MATERIAL
                );
                self.materials
                    .find(DEFAULT_MATERIAL)
                    .ok_or_else(|| MeshError::MissingMaterial(name.to_string()))?
            }
        };

        self.materials
            .acquire(handle)
            .ok_or_else(|| MeshError::MissingMaterial(name.to_string()))
    }

    pub fn mesh(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(handle)
    }

    pub fn acquire_mesh(&self, handle: MeshHandle) -> Option<MeshBinding> {
        self.meshes.acquire(handle)
    }

    pub fn mesh_paths(&self) -> Vec<String> {
        self.meshes.paths()
    }

    /// Reclaim a mesh nothing uses, destroying its buffers and releasing its
    /// fragment materials.
    pub fn unload_mesh(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: MeshHandle,
    ) -> PoolResult<()> {
        let mesh = self.meshes.remove(handle)?;
        mesh.destroy(device);
        Ok(())
    }
}

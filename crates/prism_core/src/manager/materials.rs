use super::ResourceManager;
use crate::descriptor::{MaterialDescriptor, MaterialSource, TextureMapDesc};
use crate::device::GraphicsDevice;
use crate::handle::{MaterialBinding, MaterialHandle, TextureBinding, TextureHandle};
use crate::material::{Material, MaterialError, MaterialFlags, MaterialResult, TextureSlot};
use crate::pool::{PoolError, PoolResult};
use crate::texture::TextureRequest;

impl ResourceManager {
    /// Build a material from its descriptor, or return the handle already
    /// loaded for an equivalent path. Usage is not touched.
    ///
    /// Maps that fail to load are replaced by the slot's placeholder. If a
    /// placeholder itself is missing the material is not created.
    pub fn load_material(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &str,
        source: &dyn MaterialSource,
    ) -> MaterialResult<MaterialHandle> {
        if let Some(handle) = self.materials.find(path) {
            return Ok(handle);
        }

        let descriptor = source
            .descriptor(path)
            .ok_or_else(|| MaterialError::NotFound(path.to_string()))?;

        let material = self.build_material(device, path, &descriptor)?;
        log::debug!("Loaded material: {} ({:?})", path, material.alpha_mode);
        Ok(self.materials.insert(path, material))
    }

    fn build_material(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &str,
        desc: &MaterialDescriptor,
    ) -> MaterialResult<Material> {
        let mut material = Material::new(path);
        material.alpha_mode = desc.alpha_mode.into();
        material.flags = desc.flags();
        material.params.base_tint = desc.base_tint();

        let base = self.load_map(
            device,
            path,
            desc.base_map.as_ref(),
            desc,
            desc.base_format(),
            TextureSlot::Base,
        )?;
        material.replace_texture(TextureSlot::Base, Some(base.0));

        let normal = if desc.normal_scale > 0.0 {
            material.params.normal_scale = desc.normal_scale;
            let format = desc.normal_map.as_ref().and_then(|m| m.format.to_wgpu());
            self.load_map(
                device,
                path,
                desc.normal_map.as_ref(),
                desc,
                format,
                TextureSlot::Normal,
            )?
            .0
        } else {
            material.params.normal_scale = 0.0;
            self.placeholder(path, TextureSlot::Normal.placeholder())?
        };
        material.replace_texture(TextureSlot::Normal, Some(normal));

        if desc.combined_gpi {
            self.bind_combined(device, &mut material, desc)?;
        } else {
            self.bind_separate(device, &mut material, desc)?;
        }

        Ok(material)
    }

    /// Gloss, parallax and incandescence packed in one map in the gloss slot.
    fn bind_combined(
        &mut self,
        device: &mut dyn GraphicsDevice,
        material: &mut Material,
        desc: &MaterialDescriptor,
    ) -> MaterialResult<()> {
        let format = desc.gloss_map.as_ref().and_then(|m| m.format.to_wgpu());
        let (gloss, loaded) = self.load_map(
            device,
            &material.path,
            desc.gloss_map.as_ref(),
            desc,
            format,
            TextureSlot::Gloss,
        )?;

        if loaded {
            material.replace_texture(TextureSlot::Gloss, Some(gloss));
            material.replace_texture(TextureSlot::Parallax, None);
            material.replace_texture(TextureSlot::Incandescent, None);
            material.flags.insert(MaterialFlags::COMBINED_GPI);
            desc.apply_auxiliary(&mut material.params);
        } else {
            let path = material.path.clone();
            let parallax = self.placeholder(&path, TextureSlot::Parallax.placeholder())?;
            let incandescent = self.placeholder(&path, TextureSlot::Incandescent.placeholder())?;
            material.replace_texture(TextureSlot::Gloss, Some(gloss));
            material.replace_texture(TextureSlot::Parallax, Some(parallax));
            material.replace_texture(TextureSlot::Incandescent, Some(incandescent));
            material.flags.remove(MaterialFlags::COMBINED_GPI);
            material.params.clear_auxiliary();
        }
        Ok(())
    }

    fn bind_separate(
        &mut self,
        device: &mut dyn GraphicsDevice,
        material: &mut Material,
        desc: &MaterialDescriptor,
    ) -> MaterialResult<()> {
        let path = material.path.clone();
        let maps = [
            (TextureSlot::Gloss, desc.gloss_map.as_ref()),
            (TextureSlot::Parallax, desc.parallax_map.as_ref()),
            (TextureSlot::Incandescent, desc.incandescent_map.as_ref()),
        ];

        for (slot, map) in maps {
            let format = map.and_then(|m| m.format.to_wgpu());
            let (binding, _) = self.load_map(device, &path, map, desc, format, slot)?;
            material.replace_texture(slot, Some(binding));
        }

        material.flags.remove(MaterialFlags::COMBINED_GPI);
        desc.apply_auxiliary(&mut material.params);
        Ok(())
    }

    /// Load one map with the descriptor's wrap modes. Returns the binding and
    /// whether it is the requested map rather than the slot placeholder.
    fn load_map(
        &mut self,
        device: &mut dyn GraphicsDevice,
        material: &str,
        map: Option<&TextureMapDesc>,
        desc: &MaterialDescriptor,
        format: Option<wgpu::TextureFormat>,
        slot: TextureSlot,
    ) -> MaterialResult<(TextureBinding, bool)> {
        let placeholder = slot.placeholder();
        let Some(map) = map.filter(|m| !m.path.is_empty()) else {
            return Ok((self.placeholder(material, placeholder)?, false));
        };

        let request = map.request(desc.wrap_u, desc.wrap_v, format);
        match self.load_texture_with_settings(device, &request) {
            Ok(binding) => Ok((binding, true)),
            Err(err) => {
                log::warn!(
                    "Material {}: {:?} map '{}' unavailable ({}), using {}",
                    material,
                    slot,
                    map.path,
                    err,
                    placeholder
                );
                Ok((self.placeholder(material, placeholder)?, false))
            }
        }
    }

    /// Bind a built-in placeholder texture by name.
    pub(crate) fn placeholder(
        &self,
        material: &str,
        name: &'static str,
    ) -> MaterialResult<TextureBinding> {
        self.textures
            .find(name)
            .and_then(|handle| self.textures.acquire(handle))
            .ok_or_else(|| {
                log::error!(
                    "Material {}: placeholder texture {} is not loaded",
                    material,
                    name
                );
                MaterialError::PlaceholderUnavailable {
                    material: material.to_string(),
                    placeholder: name,
                }
            })
    }

    pub fn material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle)
    }

    pub fn acquire_material(&self, handle: MaterialHandle) -> Option<MaterialBinding> {
        self.materials.acquire(handle)
    }

    /// Copy a material's parameters and texture bindings under a new path.
    /// An existing material at `new_path` is returned unchanged.
    pub fn duplicate_material(
        &mut self,
        handle: MaterialHandle,
        new_path: &str,
    ) -> MaterialResult<MaterialHandle> {
        if let Some(existing) = self.materials.find(new_path) {
            log::warn!("Material {} already loaded, not duplicating", new_path);
            return Ok(existing);
        }

        let copy = self
            .materials
            .get(handle)
            .ok_or(PoolError::InvalidHandle { kind: "material" })?
            .duplicate(new_path);
        Ok(self.materials.insert(new_path, copy))
    }

    /// Rebind one texture slot. The old texture loses one unit of usage and
    /// the new one gains one.
    pub fn replace_texture(
        &mut self,
        material: MaterialHandle,
        slot: TextureSlot,
        texture: Option<TextureHandle>,
    ) -> MaterialResult<()> {
        let binding = match texture {
            Some(handle) => Some(
                self.textures
                    .acquire(handle)
                    .ok_or(PoolError::InvalidHandle { kind: "texture" })?,
            ),
            None => None,
        };

        let material = self
            .materials
            .get_mut(material)
            .ok_or(PoolError::InvalidHandle { kind: "material" })?;
        material.replace_texture(slot, binding);
        Ok(())
    }

    /// Put a slot back to its placeholder. Resetting the gloss slot also
    /// leaves combined mode and restores all three auxiliary placeholders.
    pub fn set_default_texture(&mut self, path: &str, slot: TextureSlot) -> MaterialResult<()> {
        let handle = self
            .materials
            .find(path)
            .ok_or_else(|| MaterialError::NotFound(path.to_string()))?;

        let slots: &[TextureSlot] = match slot {
            TextureSlot::Gloss => &[
                TextureSlot::Gloss,
                TextureSlot::Parallax,
                TextureSlot::Incandescent,
            ],
            _ => std::slice::from_ref(&slot),
        };

        let mut bindings = Vec::with_capacity(slots.len());
        for &slot in slots {
            bindings.push((slot, self.placeholder(path, slot.placeholder())?));
        }

        let material = self
            .materials
            .get_mut(handle)
            .ok_or(PoolError::InvalidHandle { kind: "material" })?;
        if slot == TextureSlot::Gloss {
            material.flags.remove(MaterialFlags::COMBINED_GPI);
        }
        for (slot, binding) in bindings {
            material.replace_texture(slot, Some(binding));
        }
        Ok(())
    }

    /// Point a slot at a texture with new settings, loading it if needed.
    ///
    /// A loaded texture whose format differs from the request is reloaded in
    /// the new format. Updating the gloss slot switches the material to
    /// combined mode.
    pub fn update_material_texture(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &str,
        slot: TextureSlot,
        request: &TextureRequest,
    ) -> MaterialResult<()> {
        let handle = self
            .materials
            .find(path)
            .ok_or_else(|| MaterialError::NotFound(path.to_string()))?;

        let binding = match self.textures.find(&request.path) {
            Some(texture) => {
                let reformat = self
                    .textures
                    .get(texture)
                    .is_some_and(|t| t.format != request.format);
                if reformat {
                    self.reload_texture_as(device, &request.path, request.format)?;
                }
                self.update_texture_settings(texture, &request.settings)?;
                self.textures
                    .acquire(texture)
                    .ok_or(PoolError::InvalidHandle { kind: "texture" })?
            }
            None => self.load_texture_with_settings(device, request)?,
        };

        let material = self
            .materials
            .get_mut(handle)
            .ok_or(PoolError::InvalidHandle { kind: "material" })?;
        if material.texture(slot) != Some(binding.handle()) {
            material.replace_texture(slot, Some(binding));
        }
        if slot == TextureSlot::Gloss {
            material.flags.insert(MaterialFlags::COMBINED_GPI);
        }
        Ok(())
    }

    pub fn material_paths(&self) -> Vec<String> {
        self.materials.paths()
    }

    /// Reclaim a material nothing uses. Its texture bindings are released.
    pub fn unload_material(&mut self, handle: MaterialHandle) -> PoolResult<()> {
        self.materials.remove(handle).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use crate::descriptor::{DescriptorAlphaMode, MaterialDescriptor, TextureMapDesc};
    use crate::handle::MaterialHandle;
    use crate::manager::tests::{descriptors, init_logger, setup};
    use crate::manager::ResourceManager;
    use crate::material::{AlphaMode, MaterialError, TextureSlot, DEFAULT_MATERIAL};
    use crate::pool::PoolError;
    use crate::texture::TextureRequest;
    use std::path::Path;

    fn write_png(dir: &Path, name: &str) -> String {
        let path = dir.join(name);
        image::RgbaImage::from_pixel(4, 4, image::Rgba([90, 90, 90, 255]))
            .save(&path)
            .unwrap();
        path.to_str().unwrap().to_string()
    }

    fn slot_path(manager: &ResourceManager, handle: MaterialHandle, slot: TextureSlot) -> String {
        let material = manager.material(handle).unwrap();
        material
            .texture(slot)
            .and_then(|t| manager.textures().path(t))
            .unwrap_or("<unbound>")
            .to_string()
    }

    #[test]
    fn test_combined_map_material() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_png(dir.path(), "base.png");
        let gpi = write_png(dir.path(), "gpi.png");

        let desc = MaterialDescriptor {
            alpha_mode: DescriptorAlphaMode::SoftEdge,
            double_sided: true,
            base_map: Some(TextureMapDesc::new(&base)),
            base_tint: [255, 0, 0],
            gloss_map: Some(TextureMapDesc::new(&gpi)),
            gloss_enabled: true,
            gloss_scale: 2.0,
            specular_power: 40.0,
            incandescent_enabled: true,
            ..Default::default()
        };
        let sources = descriptors(&[("rock", desc)]);
        let (mut device, mut manager) = setup();

        let handle = manager.load_material(&mut device, "rock", &sources).unwrap();
        let material = manager.material(handle).unwrap();

        assert_eq!(material.alpha_mode, AlphaMode::Cutout);
        assert!(material.is_two_sided());
        assert!(material.is_combined_gpi());
        assert_eq!(material.params.base_tint.x, 1.0);
        assert_eq!(material.params.base_tint.y, 0.0);
        assert_eq!(material.params.gloss_scale, 2.0);
        assert_eq!(material.params.specular_power, 40.0);
        assert_eq!(material.params.incandescent_scale, 1.0);
        // Parallax disabled
        assert_eq!(material.params.parallax_scale, 0.0);

        assert_eq!(slot_path(&manager, handle, TextureSlot::Base), base);
        assert_eq!(slot_path(&manager, handle, TextureSlot::Normal), "@@normal");
        assert_eq!(slot_path(&manager, handle, TextureSlot::Gloss), gpi);
        assert_eq!(slot_path(&manager, handle, TextureSlot::Parallax), "<unbound>");
        assert_eq!(slot_path(&manager, handle, TextureSlot::Incandescent), "<unbound>");
    }

    #[test]
    fn test_missing_maps_fall_back_to_placeholders() {
        let desc = MaterialDescriptor {
            base_map: Some(TextureMapDesc::new("missing/base.png")),
            normal_map: Some(TextureMapDesc::new("missing/normal.png")),
            gloss_map: Some(TextureMapDesc::new("missing/gpi.png")),
            gloss_enabled: true,
            ..Default::default()
        };
        let sources = descriptors(&[("broken", desc)]);
        let (mut device, mut manager) = setup();

        let handle = manager.load_material(&mut device, "broken", &sources).unwrap();
        let material = manager.material(handle).unwrap();

        assert!(!material.is_combined_gpi());
        assert_eq!(material.params.gloss_scale, 0.0);
        assert_eq!(material.params.incandescent_scale, 0.0);
        assert_eq!(material.params.env_lod, 5.0);
        assert_eq!(material.params.gloss_tint.w, 1.0);

        let names: Vec<String> = TextureSlot::ALL
            .iter()
            .map(|&slot| slot_path(&manager, handle, slot))
            .collect();
        assert_eq!(
            names,
            vec!["@@base", "@@normal", "@@gloss", "@@parallax", "@@incan"]
        );
        assert!(manager.textures().find("missing/base.png").is_none());
    }

    #[test]
    fn test_separate_maps() {
        let dir = tempfile::tempdir().unwrap();
        let gloss = write_png(dir.path(), "gloss.png");
        let incan = write_png(dir.path(), "incan.png");

        let desc = MaterialDescriptor {
            combined_gpi: false,
            gloss_map: Some(TextureMapDesc::new(&gloss)),
            incandescent_map: Some(TextureMapDesc::new(&incan)),
            parallax_map: Some(TextureMapDesc::new("missing/height.png")),
            parallax_enabled: true,
            parallax_scale: 0.02,
            ..Default::default()
        };
        let sources = descriptors(&[("split", desc)]);
        let (mut device, mut manager) = setup();

        let handle = manager.load_material(&mut device, "split", &sources).unwrap();
        let material = manager.material(handle).unwrap();

        assert!(!material.is_combined_gpi());
        assert_eq!(material.params.parallax_scale, 0.02);
        assert_eq!(slot_path(&manager, handle, TextureSlot::Gloss), gloss);
        assert_eq!(slot_path(&manager, handle, TextureSlot::Parallax), "@@parallax");
        assert_eq!(slot_path(&manager, handle, TextureSlot::Incandescent), incan);
    }

    #[test]
    fn test_zero_normal_scale_skips_normal_map() {
        let dir = tempfile::tempdir().unwrap();
        let normal = write_png(dir.path(), "normal.png");
        let desc = MaterialDescriptor {
            normal_map: Some(TextureMapDesc::new(&normal)),
            normal_scale: 0.0,
            ..Default::default()
        };
        let sources = descriptors(&[("flat", desc)]);
        let (mut device, mut manager) = setup();

        let handle = manager.load_material(&mut device, "flat", &sources).unwrap();
        assert_eq!(slot_path(&manager, handle, TextureSlot::Normal), "@@normal");
        assert_eq!(manager.material(handle).unwrap().params.normal_scale, 0.0);
        assert!(manager.textures().find(&normal).is_none());
    }

    #[test]
    fn test_missing_placeholder_is_hard_failure() {
        init_logger();
        let mut device = crate::device::RecordingDevice::default();
        let mut manager = ResourceManager::empty();
        let sources = descriptors(&[("m", MaterialDescriptor::default())]);

        let result = manager.load_material(&mut device, "m", &sources);
        assert!(matches!(
            result,
            Err(MaterialError::PlaceholderUnavailable {
                placeholder: "@@base",
                ..
            })
        ));
        assert!(manager.materials().find("m").is_none());
    }

    #[test]
    fn test_unknown_material() {
        let (mut device, mut manager) = setup();
        let sources = descriptors(&[]);
        assert!(matches!(
            manager.load_material(&mut device, "nope", &sources),
            Err(MaterialError::NotFound(_))
        ));
    }

    #[test]
    fn test_material_dedup_and_usage() {
        let sources = descriptors(&[("a", MaterialDescriptor::default())]);
        let (mut device, mut manager) = setup();

        let first = manager.load_material(&mut device, "a", &sources).unwrap();
        let second = manager.load_material(&mut device, "A", &sources).unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.materials().usage(first), Some(0));

        let binding = manager.acquire_material(first).unwrap();
        assert!(matches!(
            manager.unload_material(first),
            Err(PoolError::InUse { .. })
        ));
        drop(binding);
        manager.unload_material(first).unwrap();
        assert!(manager.material(first).is_none());
    }

    #[test]
    fn test_texture_usage_conserved() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_png(dir.path(), "shared.png");
        let desc = MaterialDescriptor {
            base_map: Some(TextureMapDesc::new(&base)),
            ..Default::default()
        };
        let sources = descriptors(&[("one", desc.clone()), ("two", desc)]);
        let (mut device, mut manager) = setup();

        let one = manager.load_material(&mut device, "one", &sources).unwrap();
        let two = manager.load_material(&mut device, "two", &sources).unwrap();
        let texture = manager.textures().find(&base).unwrap();
        assert_eq!(manager.textures().usage(texture), Some(2));

        let copy = manager.duplicate_material(one, "one_copy").unwrap();
        assert_eq!(manager.textures().usage(texture), Some(3));

        let placeholder = manager.textures().find("@@base").unwrap();
        let placeholder_usage = manager.textures().usage(placeholder).unwrap();
        manager
            .replace_texture(two, TextureSlot::Base, Some(placeholder))
            .unwrap();
        assert_eq!(manager.textures().usage(texture), Some(2));
        assert_eq!(
            manager.textures().usage(placeholder),
            Some(placeholder_usage + 1)
        );

        manager.replace_texture(one, TextureSlot::Base, None).unwrap();
        assert_eq!(manager.textures().usage(texture), Some(1));

        manager.unload_material(copy).unwrap();
        assert_eq!(manager.textures().usage(texture), Some(0));
        manager.unload_texture(&mut device, texture).unwrap();
    }

    #[test]
    fn test_set_default_gloss_slot() {
        let dir = tempfile::tempdir().unwrap();
        let gpi = write_png(dir.path(), "gpi.png");
        let desc = MaterialDescriptor {
            gloss_map: Some(TextureMapDesc::new(&gpi)),
            ..Default::default()
        };
        let sources = descriptors(&[("shiny", desc)]);
        let (mut device, mut manager) = setup();

        let handle = manager.load_material(&mut device, "shiny", &sources).unwrap();
        assert!(manager.material(handle).unwrap().is_combined_gpi());

        manager
            .set_default_texture("shiny", TextureSlot::Gloss)
            .unwrap();
        let material = manager.material(handle).unwrap();
        assert!(!material.is_combined_gpi());
        assert_eq!(slot_path(&manager, handle, TextureSlot::Gloss), "@@gloss");
        assert_eq!(slot_path(&manager, handle, TextureSlot::Parallax), "@@parallax");
        assert_eq!(slot_path(&manager, handle, TextureSlot::Incandescent), "@@incan");

        let texture = manager.textures().find(&gpi).unwrap();
        assert_eq!(manager.textures().usage(texture), Some(0));
    }

    #[test]
    fn test_update_material_texture() {
        let dir = tempfile::tempdir().unwrap();
        let gpi = write_png(dir.path(), "late_gpi.png");
        let (mut device, mut manager) = setup();
        let sources = descriptors(&[("m", MaterialDescriptor::default())]);
        let handle = manager.load_material(&mut device, "m", &sources).unwrap();
        assert!(!manager.material(handle).unwrap().is_combined_gpi());

        let mut request = TextureRequest::new(&gpi);
        request.levels = 1;
        manager
            .update_material_texture(&mut device, "m", TextureSlot::Gloss, &request)
            .unwrap();

        let material = manager.material(handle).unwrap();
        assert!(material.is_combined_gpi());
        assert_eq!(slot_path(&manager, handle, TextureSlot::Gloss), gpi);
        let texture = manager.textures().find(&gpi).unwrap();
        assert_eq!(manager.textures().usage(texture), Some(1));

        // Same texture, new format: reloaded in place, usage unchanged
        let gpu = manager.texture(texture).unwrap().gpu;
        request.format = Some(wgpu::TextureFormat::Rgba8UnormSrgb);
        request.settings.mip_bias = 1.0;
        manager
            .update_material_texture(&mut device, "m", TextureSlot::Gloss, &request)
            .unwrap();
        let reloaded = manager.texture(texture).unwrap();
        assert_ne!(reloaded.gpu, gpu);
        assert_eq!(reloaded.format, Some(wgpu::TextureFormat::Rgba8UnormSrgb));
        assert_eq!(reloaded.settings.mip_bias, 1.0);
        assert_eq!(manager.textures().usage(texture), Some(1));
    }

    #[test]
    fn test_failed_reformat_keeps_format() {
        let dir = tempfile::tempdir().unwrap();
        let gpi = write_png(dir.path(), "gone.png");
        let (mut device, mut manager) = setup();
        let sources = descriptors(&[("m", MaterialDescriptor::default())]);
        manager.load_material(&mut device, "m", &sources).unwrap();

        let mut request = TextureRequest::new(&gpi);
        manager
            .update_material_texture(&mut device, "m", TextureSlot::Gloss, &request)
            .unwrap();
        let texture = manager.textures().find(&gpi).unwrap();
        let before = manager.texture(texture).unwrap();
        let (format, gpu) = (before.format, before.gpu);

        std::fs::remove_file(&gpi).unwrap();
        request.format = Some(wgpu::TextureFormat::Rgba8UnormSrgb);
        assert!(matches!(
            manager.update_material_texture(&mut device, "m", TextureSlot::Gloss, &request),
            Err(MaterialError::Texture(_))
        ));

        let after = manager.texture(texture).unwrap();
        assert_eq!(after.format, format);
        assert_ne!(after.format, request.format);
        assert_eq!(after.gpu, gpu);
    }

    #[test]
    fn test_default_material_listed() {
        let (_device, manager) = setup();
        assert!(manager
            .material_paths()
            .contains(&DEFAULT_MATERIAL.to_string()));
    }
}

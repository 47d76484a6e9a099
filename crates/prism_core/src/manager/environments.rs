use super::ResourceManager;
use crate::device::GraphicsDevice;
use crate::environment::{Environment, EnvironmentResult};
use crate::handle::{EnvironmentBinding, EnvironmentHandle};
use crate::pool::PoolResult;

impl ResourceManager {
    /// Load a cube-map strip and project its lighting, or return the handle
    /// already loaded for an equivalent path. `clear_color` (ARGB) is used
    /// when the sky is not drawn.
    pub fn load_environment(
        &mut self,
        device: &mut dyn GraphicsDevice,
        path: &str,
        clear_color: u32,
    ) -> EnvironmentResult<EnvironmentHandle> {
        if let Some(handle) = self.environments.find(path) {
            return Ok(handle);
        }

        match Environment::load(device, path, clear_color) {
            Ok(environment) => Ok(self.environments.insert(path, environment)),
            Err(err) => {
                log::error!("Failed to load environment '{}': {}", path, err);
                Err(err)
            }
        }
    }

    pub fn environment(&self, handle: EnvironmentHandle) -> Option<&Environment> {
        self.environments.get(handle)
    }

    pub fn acquire_environment(&self, handle: EnvironmentHandle) -> Option<EnvironmentBinding> {
        self.environments.acquire(handle)
    }

    /// Reclaim an unused environment and destroy its cube texture.
    pub fn unload_environment(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: EnvironmentHandle,
    ) -> PoolResult<()> {
        let environment = self.environments.remove(handle)?;
        environment.destroy(device);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::environment::{EnvironmentError, DEFAULT_ENVIRONMENT};
    use crate::manager::tests::setup;
    use crate::pool::PoolError;

    fn write_strip(dir: &std::path::Path, name: &str, size: u32) -> String {
        let path = dir.join(name);
        let strip = image::RgbaImage::from_fn(size * 6, size, |x, _| {
            // Brightest on +Y
            if x / size == 2 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([32, 32, 32, 255])
            }
        });
        strip.save(&path).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_load_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_strip(dir.path(), "sky.png", 8);
        let (mut device, mut manager) = setup();

        let handle = manager
            .load_environment(&mut device, &path, 0xff102030)
            .unwrap();
        let again = manager
            .load_environment(&mut device, &path, 0xff000000)
            .unwrap();
        assert_eq!(handle, again);

        let environment = manager.environment(handle).unwrap();
        assert_eq!(environment.clear_color, 0xff102030);
        assert_eq!(environment.env_scale, 1.0);
        assert_eq!(environment.env_bias, 0.0);
        let cube = environment.cube.unwrap();
        assert!(device.is_texture_live(cube));
        assert_eq!(device.texture_desc(cube).unwrap().width, 8);

        // Authored +Y maps to world +Z, so the zenith is brighter than the nadir
        let up = environment.sh.evaluate(prism_math::Vec3::Z);
        let down = environment.sh.evaluate(-prism_math::Vec3::Z);
        assert!(up.x > down.x);
    }

    #[test]
    fn test_invalid_strip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("square.png");
        image::RgbaImage::new(8, 8).save(&path).unwrap();
        let (mut device, mut manager) = setup();

        let result = manager.load_environment(&mut device, path.to_str().unwrap(), 0);
        assert!(matches!(result, Err(EnvironmentError::InvalidStrip { .. })));
    }

    #[test]
    fn test_unload_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_strip(dir.path(), "unload.png", 4);
        let (mut device, mut manager) = setup();

        let handle = manager.load_environment(&mut device, &path, 0).unwrap();
        let cube = manager.environment(handle).unwrap().cube.unwrap();

        let binding = manager.acquire_environment(handle).unwrap();
        assert!(matches!(
            manager.unload_environment(&mut device, handle),
            Err(PoolError::InUse { .. })
        ));
        drop(binding);

        manager.unload_environment(&mut device, handle).unwrap();
        assert!(!device.is_texture_live(cube));

        let builtin = manager.environments().find(DEFAULT_ENVIRONMENT).unwrap();
        assert!(matches!(
            manager.unload_environment(&mut device, builtin),
            Err(PoolError::Pinned { .. })
        ));
    }
}

//! Prism Render - draw pipeline for the content viewport.
//!
//! This crate provides:
//!
//! - **Scenes**: per-viewport camera, mesh, material table, environment and
//!   lighting knobs
//! - **Renderer**: opaque then blended material passes, debug views,
//!   wireframe/normal/tangent overlays and a reference grid
//! - **Picking**: fragment indices encoded as colors and decoded from a
//!   read-back pixel
//!
//! # Example
//!
//! ```ignore
//! use prism_core::device::Viewport;
//! use prism_core::{RecordingDevice, ResourceManager};
//! use prism_math::{Camera, Vec3};
//! use prism_render::{DrawMode, RenderScene, Renderer};
//!
//! let mut device = RecordingDevice::default();
//! let resources = ResourceManager::new(&mut device)?;
//!
//! let camera = Camera::new(Vec3::new(0.0, -6.0, 2.0), Vec3::ZERO, 4.0 / 3.0);
//! let mut scene = RenderScene::new(Viewport::new(0, 0, 640, 480), camera);
//! scene.set_mesh(&resources, resources.meshes().find("@@torus").unwrap());
//! scene.draw_mode = DrawMode::FragmentIndex;
//!
//! let mut renderer = Renderer::new();
//! let stats = renderer.render_scenes(&mut device, &resources, &[&scene]);
//! let picked = renderer.pick(&device, 320, 240);
//! ```

pub mod constants;
pub mod picking;
mod renderer;
pub mod scene;

// Re-export commonly used types
pub use picking::{decode_color, encode_index, pick_fragment};
pub use renderer::{FrameStats, Renderer, DEBUG_CLEAR_COLOR, ENVIRONMENT_UNIT};
pub use scene::{DirectionalLight, DrawMode, RenderScene};

//! Meshes: ingestion, compilation, and GPU residency.
//!
//! A mesh file goes through three stages:
//!
//! 1. [`MeshSource::parse`] reads it into loose arrays ([`obj::ObjData`]).
//! 2. [`MeshSource::compile`] synthesizes missing attributes and produces
//!    indexed vertices per material group ([`CompiledMesh`]).
//! 3. [`Mesh::upload`] creates the GPU buffers and binds each fragment to a
//!    material.

pub mod compile;
pub mod obj;
pub mod procedural;

use std::path::Path;

use prism_math::{Aabb, Vec3};
use thiserror::Error;

pub use compile::{compile, CompiledFragment, CompiledMesh, MeshVertex};
pub use obj::{ObjData, ParseError, ParseResult, ParseStatus, Winding};

use crate::device::{BufferId, BufferUsage, DebugVertex, DeviceError, GraphicsDevice};
use crate::handle::MaterialBinding;

/// Color of vertex-normal debug lines (ARGB).
pub const NORMAL_LINE_COLOR: u32 = 0xffff0000;

/// Color of vertex-tangent debug lines (ARGB).
pub const TANGENT_LINE_COLOR: u32 = 0xff00ff00;

/// Errors that can occur while loading a mesh.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Unsupported mesh format: {0}")]
    UnsupportedFormat(String),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Mesh {0} has no vertices")]
    Empty(String),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("No material available for fragment {0}")]
    MissingMaterial(String),
}

pub type MeshResult<T> = Result<T, MeshError>;

/// Mesh file formats understood by [`MeshSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshFormat {
    Obj,
}

impl MeshFormat {
    /// Pick a format from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> MeshResult<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("obj") => Ok(MeshFormat::Obj),
            _ => Err(MeshError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Knobs for mesh loading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshLoadOptions {
    pub winding: Winding,
    /// Recenter and scale so the largest half-extent equals this radius
    pub rescale: Option<f32>,
    /// Length of debug normal/tangent lines
    pub debug_line_scale: f32,
}

impl Default for MeshLoadOptions {
    fn default() -> Self {
        Self {
            winding: Winding::Preserve,
            rescale: None,
            debug_line_scale: 0.1,
        }
    }
}

/// Parsed mesh data, one variant per supported format.
#[derive(Debug, Clone)]
pub enum MeshSource {
    Obj(ObjData),
}

impl MeshSource {
    pub fn parse(path: &Path, winding: Winding) -> MeshResult<Self> {
        match MeshFormat::from_path(path)? {
            MeshFormat::Obj => Ok(MeshSource::Obj(obj::parse_obj_file(path, winding)?)),
        }
    }

    pub fn status(&self) -> ParseStatus {
        match self {
            MeshSource::Obj(data) => data.status(),
        }
    }

    pub fn warnings(&self) -> u32 {
        match self {
            MeshSource::Obj(data) => data.warnings,
        }
    }

    /// Bounds of every source position, referenced or not.
    pub fn compute_bounding_box(&self) -> Aabb {
        match self {
            MeshSource::Obj(data) => Aabb::from_points(data.positions.iter().copied()),
        }
    }

    /// Move the bounds center to the origin and scale uniformly so the
    /// largest half-extent becomes `radius`.
    pub fn rescale(&mut self, radius: f32) {
        let bounds = self.compute_bounding_box();
        let half = bounds.largest_half_extent();
        if bounds.is_empty() || half <= 0.0 {
            return;
        }

        let center = bounds.centroid();
        let scale = radius / half;
        match self {
            MeshSource::Obj(data) => {
                for p in &mut data.positions {
                    *p = (*p - center) * scale;
                }
            }
        }
    }

    pub fn compile(self) -> CompiledMesh {
        match self {
            MeshSource::Obj(data) => compile::compile(data),
        }
    }
}

/// A contiguous index range drawn with one material.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub material: MaterialBinding,
    pub base_index: u32,
    pub primitive_count: u32,
}

/// A mesh resident in the pool.
#[derive(Debug)]
pub struct Mesh {
    pub path: String,
    pub vertex_buffer: BufferId,
    pub index_buffer: BufferId,
    pub vertex_count: u32,
    pub index_count: u32,
    pub bounds: Aabb,
    pub origin: Vec3,
    /// Draw ranges in first-seen material order
    pub fragments: Vec<Fragment>,
    /// Line list of `vertex_count` normals
    pub debug_normals: Option<BufferId>,
    /// Line list of `vertex_count` tangents
    pub debug_tangents: Option<BufferId>,
    pub parse_status: ParseStatus,
    pub warnings: u32,
}

impl Mesh {
    /// Create GPU buffers for compiled geometry. `materials` holds one
    /// binding per compiled fragment, in order.
    ///
    /// Buffers created before a failure are destroyed again.
    pub fn upload(
        device: &mut dyn GraphicsDevice,
        path: &str,
        compiled: &CompiledMesh,
        materials: Vec<MaterialBinding>,
        debug_line_scale: f32,
    ) -> MeshResult<Self> {
        if compiled.vertices.is_empty() {
            return Err(MeshError::Empty(path.to_string()));
        }
        if materials.len() != compiled.fragments.len() {
            let missing = compiled
                .fragments
                .get(materials.len())
                .map_or_else(|| path.to_string(), |f| f.material.clone());
            return Err(MeshError::MissingMaterial(missing));
        }

        let mut created = Vec::with_capacity(4);
        match Self::create_buffers(device, path, compiled, debug_line_scale, &mut created) {
            Ok([vertex_buffer, index_buffer, normals, tangents]) => {
                let mut fragments = Vec::with_capacity(materials.len());
                let mut base_index = 0;
                for (fragment, material) in compiled.fragments.iter().zip(materials) {
                    let count = fragment.indices.len() as u32;
                    fragments.push(Fragment {
                        material,
                        base_index,
                        primitive_count: count / 3,
                    });
                    base_index += count;
                }

                Ok(Self {
                    path: path.to_string(),
                    vertex_buffer,
                    index_buffer,
                    vertex_count: compiled.vertices.len() as u32,
                    index_count: base_index,
                    bounds: compiled.bounds,
                    origin: compiled.bounds.centroid(),
                    fragments,
                    debug_normals: Some(normals),
                    debug_tangents: Some(tangents),
                    parse_status: ParseStatus::Ok,
                    warnings: 0,
                })
            }
            Err(err) => {
                for buffer in created {
                    device.destroy_buffer(buffer);
                }
                Err(err.into())
            }
        }
    }

    fn create_buffers(
        device: &mut dyn GraphicsDevice,
        path: &str,
        compiled: &CompiledMesh,
        debug_line_scale: f32,
        created: &mut Vec<BufferId>,
    ) -> Result<[BufferId; 4], DeviceError> {
        let indices: Vec<u32> = compiled
            .fragments
            .iter()
            .flat_map(|f| f.indices.iter().copied())
            .collect();

        let (normals, tangents) = debug_lines(&compiled.vertices, debug_line_scale);

        let mut create = |label: String, usage, bytes: &[u8]| {
            let id = device.create_buffer(&label, usage, bytes)?;
            created.push(id);
            Ok::<_, DeviceError>(id)
        };

        Ok([
            create(
                format!("{path} vertices"),
                BufferUsage::Vertex,
                bytemuck::cast_slice(&compiled.vertices),
            )?,
            create(
                format!("{path} indices"),
                BufferUsage::Index,
                bytemuck::cast_slice(&indices),
            )?,
            create(
                format!("{path} normals"),
                BufferUsage::Vertex,
                bytemuck::cast_slice(&normals),
            )?,
            create(
                format!("{path} tangents"),
                BufferUsage::Vertex,
                bytemuck::cast_slice(&tangents),
            )?,
        ])
    }

    /// Release every GPU buffer. Fragment materials are released when `self` drops.
    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.destroy_buffer(self.vertex_buffer);
        device.destroy_buffer(self.index_buffer);
        for buffer in [self.debug_normals, self.debug_tangents].into_iter().flatten() {
            device.destroy_buffer(buffer);
        }
    }

    pub fn triangle_count(&self) -> u32 {
        self.fragments.iter().map(|f| f.primitive_count).sum()
    }
}

/// Red normal lines and green tangent lines, two vertices per mesh vertex.
fn debug_lines(vertices: &[MeshVertex], scale: f32) -> (Vec<DebugVertex>, Vec<DebugVertex>) {
    let mut normals = Vec::with_capacity(vertices.len() * 2);
    let mut tangents = Vec::with_capacity(vertices.len() * 2);

    for vertex in vertices {
        let p = vertex.position();
        normals.push(DebugVertex::new(p, NORMAL_LINE_COLOR));
        normals.push(DebugVertex::new(p + vertex.normal() * scale, NORMAL_LINE_COLOR));
        tangents.push(DebugVertex::new(p, TANGENT_LINE_COLOR));
        tangents.push(DebugVertex::new(
            p + vertex.tangent().truncate() * scale,
            TANGENT_LINE_COLOR,
        ));
    }

    (normals, tangents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::RecordingDevice;
    use crate::handle::MaterialHandle;
    use crate::pool::ResourcePool;

    const TRIANGLES: &str = "\
v 0 0 0
v 4 0 0
v 0 2 0
v 0 0 6
usemtl a
f 1 2 3
usemtl b
f 1 3 4
f 1 4 2
";

    fn compiled() -> CompiledMesh {
        compile(obj::parse_obj_str(TRIANGLES, Winding::Preserve))
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            MeshFormat::from_path(Path::new("a/b/Cube.OBJ")).unwrap(),
            MeshFormat::Obj
        );
        assert!(matches!(
            MeshFormat::from_path(Path::new("cube.fbx")),
            Err(MeshError::UnsupportedFormat(_))
        ));
        assert!(MeshFormat::from_path(Path::new("cube")).is_err());
    }

    #[test]
    fn test_rescale() {
        let mut source = MeshSource::Obj(obj::parse_obj_str(TRIANGLES, Winding::Preserve));
        source.rescale(1.0);

        let bounds = source.compute_bounding_box();
        assert!((bounds.largest_half_extent() - 1.0).abs() < 1e-6);
        assert!(bounds.centroid().length() < 1e-6);
    }

    #[test]
    fn test_upload_fragments() {
        let mut device = RecordingDevice::default();
        let mut materials: ResourcePool<MaterialHandle, ()> = ResourcePool::new("material");
        let a = materials.insert("a", ());
        let b = materials.insert("b", ());

        let compiled = compiled();
        let bindings = vec![materials.acquire(a).unwrap(), materials.acquire(b).unwrap()];
        let mesh = Mesh::upload(&mut device, "tri.obj", &compiled, bindings, 0.5).unwrap();

        assert_eq!(mesh.fragments.len(), 2);
        assert_eq!(mesh.fragments[0].base_index, 0);
        assert_eq!(mesh.fragments[0].primitive_count, 1);
        assert_eq!(mesh.fragments[1].base_index, 3);
        assert_eq!(mesh.fragments[1].primitive_count, 2);
        assert_eq!(mesh.index_count, 9);
        assert_eq!(mesh.bounds.max, Vec3::new(4.0, 2.0, 6.0));
        assert_eq!(mesh.origin, Vec3::new(2.0, 1.0, 3.0));
        assert_eq!(device.live_buffer_count(), 4);
        assert_eq!(materials.usage(b), Some(1));

        mesh.destroy(&mut device);
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(materials.usage(a), Some(0));
        assert_eq!(materials.usage(b), Some(0));
    }

    #[test]
    fn test_upload_failure_cleans_up() {
        let mut device = RecordingDevice::default();
        device.fail_label("tri.obj indices");

        let compiled = compiled();
        let mut materials: ResourcePool<MaterialHandle, ()> = ResourcePool::new("material");
        let a = materials.insert("a", ());
        let bindings = vec![materials.acquire(a).unwrap(), materials.acquire(a).unwrap()];

        let result = Mesh::upload(&mut device, "tri.obj", &compiled, bindings, 0.5);
        assert!(matches!(result, Err(MeshError::Device(_))));
        assert_eq!(device.live_buffer_count(), 0);
        assert_eq!(materials.usage(a), Some(0));
    }

    #[test]
    fn test_empty_mesh_rejected() {
        let mut device = RecordingDevice::default();
        let compiled = compile(obj::parse_obj_str("v 0 0 0\n", Winding::Preserve));

        let result = Mesh::upload(&mut device, "empty.obj", &compiled, Vec::new(), 0.5);
        assert!(matches!(result, Err(MeshError::Empty(_))));
    }

    #[test]
    fn test_debug_lines() {
        let compiled = compiled();
        let (normals, tangents) = debug_lines(&compiled.vertices, 2.0);

        assert_eq!(normals.len(), compiled.vertices.len() * 2);
        assert_eq!(normals[0].color, NORMAL_LINE_COLOR);
        assert_eq!(tangents[1].color, TANGENT_LINE_COLOR);

        let start = Vec3::from_array(normals[0].position);
        let end = Vec3::from_array(normals[1].position);
        assert!(((end - start).length() - 2.0).abs() < 1e-5);
    }
}

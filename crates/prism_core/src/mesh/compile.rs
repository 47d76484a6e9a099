//! Compile loose OBJ arrays into indexed, interleaved vertices.
//!
//! Missing attributes are synthesized first (white colors, crease-aware
//! normals, tangents with handedness, spherical texture coordinates), then
//! every distinct attribute-index tuple becomes one [`MeshVertex`].

use std::collections::HashMap;

use prism_math::{Aabb, Vec2, Vec3, Vec4, Vec4Swizzles};

use super::obj::ObjData;

/// Interleaved vertex consumed by the mesh programs.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Tangent along +U; `w` is the bitangent sign
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

impl MeshVertex {
    const ATTRIBS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x4,
        3 => Float32x2,
        4 => Float32x4
    ];

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }

    pub fn tangent(&self) -> Vec4 {
        Vec4::from_array(self.tangent)
    }
}

/// Indices of one material group into [`CompiledMesh::vertices`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFragment {
    pub material: String,
    pub indices: Vec<u32>,
}

/// Geometry ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMesh {
    pub vertices: Vec<MeshVertex>,
    pub fragments: Vec<CompiledFragment>,
    pub bounds: Aabb,
}

impl CompiledMesh {
    pub fn index_count(&self) -> usize {
        self.fragments.iter().map(|f| f.indices.len()).sum()
    }
}

/// Faces meeting at a vertex share a normal (or tangent) only when they
/// agree within this angle.
const CREASE_COS: f32 = 0.5; // cos(60°)

#[derive(Debug, Default)]
struct FragmentIndices {
    material: String,
    positions: Vec<u32>,
    normals: Vec<u32>,
    texcoords: Vec<u32>,
    tangents: Vec<u32>,
    colors: Vec<u32>,
}

/// Attribute arrays plus per-corner indices into each of them.
#[derive(Debug, Default)]
struct LooseMesh {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    texcoords: Vec<Vec2>,
    tangents: Vec<Vec4>,
    colors: Vec<Vec4>,
    fragments: Vec<FragmentIndices>,
}

impl From<ObjData> for LooseMesh {
    fn from(data: ObjData) -> Self {
        let fragments = data
            .fragments
            .into_iter()
            .map(|f| FragmentIndices {
                material: f.material,
                positions: f.positions,
                normals: f.normals,
                texcoords: f.texcoords,
                ..Default::default()
            })
            .collect();

        Self {
            positions: data.positions,
            normals: data.normals,
            texcoords: data.texcoords,
            tangents: Vec::new(),
            colors: Vec::new(),
            fragments,
        }
    }
}

/// Compile parsed OBJ data. Face indices must be in range, which the parser
/// guarantees.
pub fn compile(data: ObjData) -> CompiledMesh {
    let mut mesh = LooseMesh::from(data);

    mesh.insert_colors();
    mesh.compute_normals();
    mesh.compute_tangents();
    mesh.insert_texcoords();
    mesh.build()
}

impl LooseMesh {
    fn insert_colors(&mut self) {
        if !self.colors.is_empty() {
            return;
        }
        self.colors.push(Vec4::ONE);
        for fragment in &mut self.fragments {
            fragment.colors = vec![0; fragment.positions.len()];
        }
    }

    /// Area-weighted face normals, split where adjacent faces bend by more
    /// than the crease angle.
    fn compute_normals(&mut self) {
        if !self.normals.is_empty() {
            return;
        }

        self.normals = vec![Vec3::ZERO; self.positions.len()];
        // Alternate normal slots created for a position when faces disagree
        let mut splits: HashMap<u32, Vec<u32>> = HashMap::new();

        for fragment in &mut self.fragments {
            fragment.normals.clear();
            fragment.normals.reserve(fragment.positions.len());

            for triangle in fragment.positions.chunks_exact(3) {
                let p0 = self.positions[triangle[0] as usize];
                let p1 = self.positions[triangle[1] as usize];
                let p2 = self.positions[triangle[2] as usize];

                let face = (p1 - p0).cross(p2 - p0);
                let unit = face.normalize_or_zero();

                for &corner in triangle {
                    let current = self.normals[corner as usize];

                    let target = if current == Vec3::ZERO
                        || current.normalize_or_zero().dot(unit) >= CREASE_COS
                    {
                        corner
                    } else {
                        let normals = &self.normals;
                        let agreeing = splits.get(&corner).and_then(|alts| {
                            alts.iter().copied().find(|&alt| {
                                normals[alt as usize].normalize_or_zero().dot(unit) >= CREASE_COS
                            })
                        });

                        match agreeing {
                            Some(alt) => alt,
                            None => {
                                let slot = self.normals.len() as u32;
                                self.normals.push(Vec3::ZERO);
                                splits.entry(corner).or_default().push(slot);
                                slot
                            }
                        }
                    };

                    self.normals[target as usize] += face;
                    fragment.normals.push(target);
                }
            }
        }

        for normal in &mut self.normals {
            *normal = normal.normalize_or_zero();
        }
    }

    /// Per-texcoord tangents along +U with a handedness sign in `w`.
    fn compute_tangents(&mut self) {
        if !self.tangents.is_empty() {
            return;
        }

        if self.texcoords.is_empty() {
            self.tangents.push(Vec4::new(1.0, 0.0, 0.0, 1.0));
            for fragment in &mut self.fragments {
                fragment.tangents = vec![0; fragment.positions.len()];
            }
            return;
        }

        self.tangents = vec![Vec4::ZERO; self.texcoords.len()];

        for fragment in &mut self.fragments {
            fragment.tangents.clear();
            fragment.tangents.reserve(fragment.positions.len());
            let mut splits: HashMap<u32, Vec<u32>> = HashMap::new();

            for (positions, texcoords) in fragment
                .positions
                .chunks_exact(3)
                .zip(fragment.texcoords.chunks_exact(3))
            {
                let p0 = self.positions[positions[0] as usize];
                let p1 = self.positions[positions[1] as usize];
                let p2 = self.positions[positions[2] as usize];
                let st0 = self.texcoords[texcoords[0] as usize];
                let st1 = self.texcoords[texcoords[1] as usize];
                let st2 = self.texcoords[texcoords[2] as usize];

                let dp0 = p1 - p0;
                let dp1 = p2 - p0;
                let dst0 = st1 - st0;
                let dst1 = st2 - st0;

                let det = dst0.x * dst1.y - dst1.x * dst0.y;
                let flip = if (1.0 / det) < 0.0 { -1.0 } else { 1.0 };
                let s_tan = ((dp0 * dst1.y - dp1 * dst0.y) * flip).normalize_or_zero();

                let agrees = |tangent: Vec4| {
                    tangent.w == flip && tangent.xyz().normalize_or_zero().dot(s_tan) >= CREASE_COS
                };

                for &corner in texcoords {
                    let current = self.tangents[corner as usize];

                    let target = if current.xyz() == Vec3::ZERO {
                        self.tangents[corner as usize].w = flip;
                        corner
                    } else if agrees(current) {
                        corner
                    } else {
                        let tangents = &self.tangents;
                        let agreeing = splits.get(&corner).and_then(|alts| {
                            alts.iter()
                                .copied()
                                .find(|&alt| agrees(tangents[alt as usize]))
                        });

                        match agreeing {
                            Some(alt) => alt,
                            None => {
                                let slot = self.tangents.len() as u32;
                                self.tangents.push(Vec4::new(0.0, 0.0, 0.0, flip));
                                splits.entry(corner).or_default().push(slot);
                                slot
                            }
                        }
                    };

                    let tangent = &mut self.tangents[target as usize];
                    *tangent += s_tan.extend(0.0);
                    fragment.tangents.push(target);
                }
            }
        }

        for tangent in &mut self.tangents {
            *tangent = tangent.xyz().normalize_or_zero().extend(tangent.w);
        }
    }

    /// Sphere-mapped texture coordinates derived from the normals.
    fn insert_texcoords(&mut self) {
        if !self.texcoords.is_empty() {
            return;
        }

        self.texcoords = self
            .normals
            .iter()
            .map(|n| Vec2::new((n.x + 1.0) * 0.5, (n.y + 1.0) * 0.5))
            .collect();

        for fragment in &mut self.fragments {
            fragment.texcoords = fragment.normals.clone();
        }
    }

    /// Emit one vertex per distinct (position, normal, texcoord, tangent, color) tuple.
    fn build(self) -> CompiledMesh {
        let mut unique: HashMap<[u32; 5], u32> = HashMap::new();
        let mut vertices = Vec::new();
        let mut fragments = Vec::with_capacity(self.fragments.len());
        let mut bounds = Aabb::empty();

        for fragment in &self.fragments {
            let mut indices = Vec::with_capacity(fragment.positions.len());

            for corner in 0..fragment.positions.len() {
                let key = [
                    fragment.positions[corner],
                    fragment.normals[corner],
                    fragment.texcoords[corner],
                    fragment.tangents[corner],
                    fragment.colors[corner],
                ];

                let index = *unique.entry(key).or_insert_with(|| {
                    let position = self.positions[key[0] as usize];
                    bounds = bounds.grow(position);

                    vertices.push(MeshVertex {
                        position: position.to_array(),
                        normal: self.normals[key[1] as usize].to_array(),
                        uv: self.texcoords[key[2] as usize].to_array(),
                        tangent: self.tangents[key[3] as usize].to_array(),
                        color: self.colors[key[4] as usize].to_array(),
                    });
                    (vertices.len() - 1) as u32
                });
                indices.push(index);
            }

            fragments.push(CompiledFragment {
                material: fragment.material.clone(),
                indices,
            });
        }

        CompiledMesh {
            vertices,
            fragments,
            bounds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::obj::{parse_obj_str, Winding};

    const CUBE: &str = "\
v -1 -1 -1
v  1 -1 -1
v  1  1 -1
v -1  1 -1
v -1 -1  1
v  1 -1  1
v  1  1  1
v -1  1  1
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn  0  0 -1
vn  0  0  1
vn  0 -1  0
vn  0  1  0
vn -1  0  0
vn  1  0  0
usemtl cube
f 1/1/1 4/2/1 3/3/1 2/4/1
f 5/1/2 6/2/2 7/3/2 8/4/2
f 1/1/3 2/2/3 6/3/3 5/4/3
f 4/1/4 8/2/4 7/3/4 3/4/4
f 1/1/5 5/2/5 8/3/5 4/4/5
f 2/1/6 3/2/6 7/3/6 6/4/6
";

    #[test]
    fn test_compile_cube() {
        let mesh = compile(parse_obj_str(CUBE, Winding::Preserve));

        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.index_count(), 36);
        assert_eq!(mesh.fragments.len(), 1);
        assert_eq!(mesh.fragments[0].material, "cube");
        assert_eq!(mesh.bounds.min, Vec3::splat(-1.0));
        assert_eq!(mesh.bounds.max, Vec3::splat(1.0));
    }

    #[test]
    fn test_cube_tangents_are_unit() {
        let mesh = compile(parse_obj_str(CUBE, Winding::Preserve));
        for vertex in &mesh.vertices {
            let t = vertex.tangent();
            assert!((t.xyz().length() - 1.0).abs() < 1e-5);
            assert!(t.w == 1.0 || t.w == -1.0);
            // Tangents lie in the face plane
            assert!(t.xyz().dot(vertex.normal()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_computed_normals_split_at_crease() {
        // Position-only cube: every corner joins three faces at 90°
        let text = "\
v -1 -1 -1
v  1 -1 -1
v  1  1 -1
v -1  1 -1
v -1 -1  1
v  1 -1  1
v  1  1  1
v -1  1  1
f 1 4 3 2
f 5 6 7 8
f 1 2 6 5
f 4 8 7 3
f 1 5 8 4
f 2 3 7 6
";
        let mesh = compile(parse_obj_str(text, Winding::Preserve));

        assert_eq!(mesh.vertices.len(), 24);
        for vertex in &mesh.vertices {
            let n = vertex.normal();
            assert!((n.length() - 1.0).abs() < 1e-5);
            // Axis-aligned face normals, not averaged corner normals
            assert!((n.abs().max_element() - 1.0).abs() < 1e-5);
            // No texcoords: the single default tangent
            assert_eq!(vertex.tangent, [1.0, 0.0, 0.0, 1.0]);
            assert_eq!(vertex.color, [1.0; 4]);
        }
    }

    #[test]
    fn test_smooth_normals_merge() {
        // Two triangles folded by 30° share their edge normals
        let text = "\
v 0 0 0
v 1 0 0
v 0 1 0
v 1 1 0.5
f 1 2 3
f 2 4 3
";
        let mesh = compile(parse_obj_str(text, Winding::Preserve));
        assert_eq!(mesh.vertices.len(), 4);

        let shared = mesh.vertices[1].normal();
        assert!(shared.z > 0.9);
        assert!(shared.x < 0.0);
    }

    #[test]
    fn test_spherical_texcoords() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n";
        let mesh = compile(parse_obj_str(text, Winding::Preserve));

        assert_eq!(mesh.vertices.len(), 3);
        for vertex in &mesh.vertices {
            assert_eq!(vertex.uv, [0.5, 0.5]);
        }
    }

    #[test]
    fn test_mirrored_uvs_split_tangents() {
        // Shared texcoords across a mirrored seam must not average tangents
        let text = "\
v 0 0 0
v 1 0 0
v 0 1 0
v -1 0 0
vt 0 0
vt 1 0
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1
f 1/1/1 3/3/1 4/2/1
";
        let mesh = compile(parse_obj_str(text, Winding::Preserve));
        let signs: Vec<f32> = mesh.vertices.iter().map(|v| v.tangent[3]).collect();

        assert!(signs.contains(&1.0));
        assert!(signs.contains(&-1.0));
        assert_eq!(mesh.index_count(), 6);
    }

    #[test]
    fn test_vertex_layout_size() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 64);
        assert_eq!(MeshVertex::desc().array_stride, 64);
    }
}

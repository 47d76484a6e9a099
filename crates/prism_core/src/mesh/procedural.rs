//! Built-in parametric meshes shown when no asset mesh is loaded.

use std::f32::consts::TAU;

use prism_math::{Aabb, Vec3};

use super::compile::{CompiledFragment, CompiledMesh, MeshVertex};
use crate::material::DEFAULT_MATERIAL;

/// Grid resolution of every built-in mesh.
pub const GRID_SEGMENTS: u32 = 40;

/// Half-extent reported for every built-in mesh.
const HALF_EXTENT: f32 = 2.0;

/// Central-difference step for surface derivatives.
const DELTA: f32 = 0.01;

/// A surface over `(u, v)` in `[0, 1]²`.
pub type Surface = fn(f32, f32) -> Vec3;

/// Names and generators of the built-in meshes, in creation order.
pub const DEFAULT_MESHES: [(&str, Surface); 4] = [
    ("@@torus", torus),
    ("@@torus_deformed", torus_deformed),
    ("@@knot", knot),
    ("@@mobius", mobius),
];

pub fn torus(u: f32, v: f32) -> Vec3 {
    let (su, cu) = (u * TAU).sin_cos();
    let (sv, cv) = (v * TAU).sin_cos();
    Vec3::new(su * (2.1 + sv), cu * (2.1 + sv), cv)
}

/// Torus with a rippled tube radius.
pub fn torus_deformed(u: f32, v: f32) -> Vec3 {
    let (u, v) = (u * TAU, v * TAU);
    let (su, cu) = u.sin_cos();
    let (sv, cv) = v.sin_cos();

    let rad = 1.0 + 0.12 * (6.0 * u + 3.0 * v).sin() * (0.55 + 0.45 * sv);
    Vec3::new(su * (2.1 + rad * sv), cu * (2.1 + rad * sv), rad * cv)
}

fn mobius_spine(t: f32) -> Vec3 {
    Vec3::new(2.3 * t.sin(), 2.3 * t.cos(), 0.0)
}

pub fn mobius(u: f32, v: f32) -> Vec3 {
    let (u, v) = (u * TAU, v * TAU);

    let t = (mobius_spine(u + 0.01) - mobius_spine(u - 0.01)).normalize();
    let b = t.cross(Vec3::Z).normalize();
    let n = b.cross(t).normalize();

    let (s, c) = (1.5 * u).sin_cos();
    let b2 = (b * c + n * s) * (v + 0.5 * u).sin();
    let n2 = (b * -s + n * c) * (0.5 * (v + 0.5 * u).cos());

    mobius_spine(u) + b2 + n2
}

fn knot_spine(t: f32) -> Vec3 {
    let rad = 1.8 + 0.8 * (3.0 * t).cos();
    let phi = 0.2 * std::f32::consts::PI * (3.0 * t).sin();

    Vec3::new(
        rad * phi.cos() * (2.0 * t).sin(),
        rad * phi.cos() * (2.0 * t).cos(),
        rad * phi.sin(),
    )
}

/// Tube swept along a trefoil-like knot.
pub fn knot(u: f32, v: f32) -> Vec3 {
    let (mut u, v) = (u * TAU, v * TAU);
    u += -0.2 * (3.0 * u).sin() + 0.05 * (6.0 * u).sin();

    let t = (knot_spine(u + 0.01) - knot_spine(u - 0.01)).normalize();
    let b = t.cross(Vec3::Z).normalize();
    let n = t.cross(b).normalize();

    knot_spine(u) + b * (v.sin() * 0.55) + n * (v.cos() * 0.55)
}

fn deriv_u(f: Surface, u: f32, v: f32) -> Vec3 {
    (f(u + DELTA, v) - f(u - DELTA, v)) * (1.0 / (2.0 * DELTA))
}

fn deriv_v(f: Surface, u: f32, v: f32) -> Vec3 {
    (f(u, v + DELTA) - f(u, v - DELTA)) * (1.0 / (2.0 * DELTA))
}

/// Tessellate a surface into a `(num_u + 1) × (num_v + 1)` vertex grid with
/// one fragment bound to the default material.
pub fn parametric(f: Surface, num_u: u32, num_v: u32) -> CompiledMesh {
    let mut vertices = Vec::with_capacity(((num_u + 1) * (num_v + 1)) as usize);

    for j in 0..=num_v {
        for i in 0..=num_u {
            let u = i as f32 / num_u as f32;
            let v = j as f32 / num_v as f32;

            let pu = deriv_u(f, u, v);
            let pv = deriv_v(f, u, v);

            vertices.push(MeshVertex {
                position: f(u, v).to_array(),
                normal: pu.cross(pv).normalize_or_zero().to_array(),
                tangent: pu.normalize_or_zero().extend(1.0).to_array(),
                uv: [u, v],
                color: [1.0; 4],
            });
        }
    }

    let row = num_u + 1;
    let mut indices = Vec::with_capacity((num_u * num_v * 6) as usize);
    for j in 0..num_v {
        for i in 0..num_u {
            let k = j * row + i;
            indices.extend_from_slice(&[k, k + row, k + 1, k + row + 1, k + 1, k + row]);
        }
    }

    CompiledMesh {
        vertices,
        fragments: vec![CompiledFragment {
            material: DEFAULT_MATERIAL.to_string(),
            indices,
        }],
        bounds: Aabb::from_corners(Vec3::splat(-HALF_EXTENT), Vec3::splat(HALF_EXTENT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_counts() {
        let mesh = parametric(torus, GRID_SEGMENTS, GRID_SEGMENTS);
        assert_eq!(mesh.vertices.len(), 41 * 41);
        assert_eq!(mesh.index_count(), 40 * 40 * 6);
        assert_eq!(mesh.fragments[0].material, DEFAULT_MATERIAL);
        assert_eq!(mesh.bounds.max, Vec3::splat(2.0));

        let max_index = *mesh.fragments[0].indices.iter().max().unwrap();
        assert_eq!(max_index as usize, mesh.vertices.len() - 1);
    }

    #[test]
    fn test_torus_frame() {
        let mesh = parametric(torus, 8, 8);
        for vertex in &mesh.vertices {
            let n = vertex.normal();
            let t = vertex.tangent();
            assert!((n.length() - 1.0).abs() < 1e-4);
            assert!((t.truncate().length() - 1.0).abs() < 1e-4);
            assert_eq!(t.w, 1.0);
            assert!(n.dot(t.truncate()).abs() < 1e-3);
        }
    }

    #[test]
    fn test_surfaces_fit_bounds() {
        let bounds = Aabb::from_corners(Vec3::splat(-3.5), Vec3::splat(3.5));
        for (name, surface) in DEFAULT_MESHES {
            let mesh = parametric(surface, 16, 16);
            for vertex in &mesh.vertices {
                assert!(
                    bounds.contains(vertex.position()),
                    "{} vertex outside bounds",
                    name
                );
                assert!(vertex.normal().is_finite());
            }
        }
    }
}

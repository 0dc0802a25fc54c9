// SPDX-License-Identifier: CEPL-1.0
//! CPU-side meshes: procedural shapes and Wavefront OBJ files.
//!
//! Winding contract: the pipeline culls back faces with a clockwise front face
//! and the projection negates Y. Triangles must therefore be clockwise when
//! viewed from outside the surface. The generators here emit that order and
//! the OBJ loader reverses the counter-clockwise order OBJ files use.

use std::collections::HashMap;
use std::f32::consts::TAU;
use std::io::BufRead;
use std::path::Path;

use ember_math::glam::Vec3;
use tracing::debug;

use crate::{EngineError, Result, Vertex};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Rejects meshes the draw path cannot consume.
    pub fn validate(&self, name: &str) -> Result<()> {
        let fail = |reason: String| EngineError::MeshLoad {
            name: name.to_owned(),
            reason,
        };
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(fail("mesh is empty".into()));
        }
        if self.indices.len() % 3 != 0 {
            return Err(fail(format!("{} indices is not a triangle list", self.indices.len())));
        }
        let n = self.vertices.len() as u32;
        if let Some(bad) = self.indices.iter().find(|&&i| i >= n) {
            return Err(fail(format!("index {bad} out of range for {n} vertices")));
        }
        Ok(())
    }

    fn push_grid_quad(&mut self, a: u32, b: u32, c: u32, d: u32) {
        // a: (i, j), b: (i+1, j), c: (i, j+1), d: (i+1, j+1)
        self.indices.extend_from_slice(&[a, b, c, b, d, c]);
    }
}

/// Torus around the Y axis. `major` is the ring radius, `minor` the tube radius.
pub fn torus(major: f32, minor: f32, rings: u32, sides: u32) -> MeshData {
    let rings = rings.max(3);
    let sides = sides.max(3);
    let mut mesh = MeshData::default();

    for i in 0..=rings {
        let u = i as f32 / rings as f32;
        let (su, cu) = (u * TAU).sin_cos();
        for j in 0..=sides {
            let v = j as f32 / sides as f32;
            let (sv, cv) = (v * TAU).sin_cos();
            let r = major + minor * cv;
            mesh.vertices.push(Vertex::new(
                [r * cu, minor * sv, r * su],
                [cv * cu, sv, cv * su],
                [u, v],
            ));
        }
    }

    let stride = sides + 1;
    for i in 0..rings {
        for j in 0..sides {
            let a = i * stride + j;
            mesh.push_grid_quad(a, a + stride, a + 1, a + stride + 1);
        }
    }
    mesh
}

/// UV sphere centred on the origin, poles on the Y axis.
pub fn uv_sphere(radius: f32, stacks: u32, slices: u32) -> MeshData {
    let stacks = stacks.max(2);
    let slices = slices.max(3);
    let mut mesh = MeshData::default();

    for i in 0..=stacks {
        let v = i as f32 / stacks as f32;
        let (st, ct) = (v * std::f32::consts::PI).sin_cos();
        for j in 0..=slices {
            let u = j as f32 / slices as f32;
            let (sp, cp) = (u * TAU).sin_cos();
            let n = [st * cp, ct, st * sp];
            mesh.vertices.push(Vertex::new(
                [n[0] * radius, n[1] * radius, n[2] * radius],
                n,
                [u, v],
            ));
        }
    }

    let stride = slices + 1;
    for i in 0..stacks {
        for j in 0..slices {
            let a = i * stride + j;
            let (b, c, d) = (a + stride, a + 1, a + stride + 1);
            // The pole rows collapse one triangle of each quad.
            if i != 0 {
                mesh.indices.extend_from_slice(&[a, b, c]);
            }
            if i != stacks - 1 {
                mesh.indices.extend_from_slice(&[b, d, c]);
            }
        }
    }
    mesh
}

pub fn load_obj(path: &Path) -> Result<MeshData> {
    let name = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| EngineError::MeshLoad {
        name: name.clone(),
        reason: e.to_string(),
    })?;
    let mesh = parse_obj(&mut std::io::BufReader::new(file), &name)?;
    debug!(
        "loaded {name}: {} vertices, {} triangles",
        mesh.vertices.len(),
        mesh.indices.len() / 3
    );
    Ok(mesh)
}

fn parse_obj(reader: &mut impl BufRead, name: &str) -> Result<MeshData> {
    let (models, _) = tobj::load_obj_buf(
        reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |_| Ok(Default::default()),
    )
    .map_err(|e| EngineError::MeshLoad {
        name: name.to_owned(),
        reason: e.to_string(),
    })?;

    let mut mesh = MeshData::default();
    let mut unique: HashMap<[u32; 8], u32> = HashMap::new();
    let mut needs_normals = false;

    for model in &models {
        let m = &model.mesh;
        for &index in &m.indices {
            let i = index as usize;
            let position = [m.positions[3 * i], m.positions[3 * i + 1], m.positions[3 * i + 2]];
            let normal = if m.normals.len() >= 3 * i + 3 {
                [m.normals[3 * i], m.normals[3 * i + 1], m.normals[3 * i + 2]]
            } else {
                needs_normals = true;
                [0.0; 3]
            };
            let uv = if m.texcoords.len() >= 2 * i + 2 {
                [m.texcoords[2 * i], 1.0 - m.texcoords[2 * i + 1]]
            } else {
                [0.0; 2]
            };

            let vertex = Vertex::new(position, normal, uv);
            let key: [u32; 8] = bytemuck::cast(vertex);
            let next = mesh.vertices.len() as u32;
            let slot = *unique.entry(key).or_insert_with(|| {
                mesh.vertices.push(vertex);
                next
            });
            mesh.indices.push(slot);
        }
    }

    if needs_normals {
        accumulate_normals(&mut mesh);
    }
    reverse_winding(&mut mesh.indices);
    mesh.validate(name)?;
    Ok(mesh)
}

/// Smooth normals for files without `vn` records. Expects counter-clockwise input.
fn accumulate_normals(mesh: &mut MeshData) {
    let mut sums = vec![Vec3::ZERO; mesh.vertices.len()];
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(mesh.vertices[i as usize].position));
        let n = (b - a).cross(c - a);
        for &i in tri {
            sums[i as usize] += n;
        }
    }
    for (v, n) in mesh.vertices.iter_mut().zip(sums) {
        v.normal = n.normalize_or(Vec3::Y).to_array();
    }
}

fn reverse_winding(indices: &mut [u32]) {
    for tri in indices.chunks_exact_mut(3) {
        tri.swap(1, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri_normal(mesh: &MeshData, tri: &[u32]) -> (Vec3, Vec3) {
        let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| Vec3::from(mesh.vertices[i as usize].position));
        ((b - a).cross(c - a), (a + b + c) / 3.0)
    }

    #[test]
    fn sphere_is_clockwise_from_outside() {
        let mesh = uv_sphere(1.0, 12, 16);
        mesh.validate("sphere").unwrap();
        assert_eq!(mesh.indices.len() as u32, 16 * (12 - 2) * 6 + 2 * 16 * 3);
        for tri in mesh.indices.chunks_exact(3) {
            let (n, centroid) = tri_normal(&mesh, tri);
            assert!(n.dot(centroid) < 0.0, "triangle {tri:?} faces outward");
        }
    }

    #[test]
    fn torus_is_clockwise_from_outside() {
        let (major, minor) = (1.0, 0.25);
        let mesh = torus(major, minor, 24, 12);
        mesh.validate("torus").unwrap();
        assert_eq!(mesh.indices.len(), 24 * 12 * 6);
        for tri in mesh.indices.chunks_exact(3) {
            let (n, centroid) = tri_normal(&mesh, tri);
            let ring = Vec3::new(centroid.x, 0.0, centroid.z).normalize() * major;
            assert!(n.dot(centroid - ring) < 0.0, "triangle {tri:?} faces outward");
        }
    }

    #[test]
    fn obj_quad_is_triangulated_and_flipped() {
        let src = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let mesh = parse_obj(&mut src.as_bytes(), "quad").unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices.len(), 6);
        let (n, _) = tri_normal(&mesh, &mesh.indices[0..3]);
        assert!(n.z < 0.0);
        for v in &mesh.vertices {
            assert!((Vec3::from(v.normal) - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mesh = MeshData {
            vertices: vec![Vertex::default(); 3],
            indices: vec![0, 1, 3],
        };
        assert!(matches!(mesh.validate("bad"), Err(EngineError::MeshLoad { .. })));
    }
}

// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use ember_math::glam::Vec3;
use ember_math::Transform;

use crate::mesh::{self, MeshData};
use crate::{Result, TextureBlob};

#[derive(Clone, Debug, PartialEq)]
pub enum MeshSource {
    Torus,
    Sphere,
    Obj(PathBuf),
}

impl MeshSource {
    /// `"torus"` and `"sphere"` name the built-in shapes; anything else is a file path.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "torus" => Self::Torus,
            "sphere" => Self::Sphere,
            _ => Self::Obj(PathBuf::from(s)),
        }
    }

    pub fn load(&self) -> Result<MeshData> {
        let mesh = match self {
            Self::Torus => mesh::torus(1.0, 0.35, 48, 24),
            Self::Sphere => mesh::uv_sphere(1.0, 24, 48),
            Self::Obj(path) => return mesh::load_obj(path),
        };
        mesh.validate(&self.to_string())?;
        Ok(mesh)
    }
}

impl std::fmt::Display for MeshSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Torus => f.write_str("torus"),
            Self::Sphere => f.write_str("sphere"),
            Self::Obj(p) => write!(f, "{}", p.display()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelDesc {
    pub mesh: MeshSource,
    pub transform: Transform,
    /// Rotation rate per axis, radians per second.
    pub spin: Vec3,
}

/// What to load at startup. Model order is draw order and model ID.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneDesc {
    pub texture: Option<PathBuf>,
    pub models: Vec<ModelDesc>,
}

impl Default for SceneDesc {
    fn default() -> Self {
        Self {
            texture: None,
            models: vec![
                ModelDesc {
                    mesh: MeshSource::Torus,
                    transform: Transform::new(Vec3::ZERO, Vec3::new(180.0, 0.0, 0.0), Vec3::ONE),
                    spin: Vec3::new(1.0, 0.5, 0.0),
                },
                ModelDesc {
                    mesh: MeshSource::Sphere,
                    transform: Transform::new(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE),
                    spin: Vec3::ZERO,
                },
            ],
        }
    }
}

impl SceneDesc {
    pub fn load_texture(&self) -> Result<TextureBlob> {
        match &self.texture {
            Some(path) => TextureBlob::load(path),
            None => Ok(TextureBlob::checkerboard(256, 8)),
        }
    }
}

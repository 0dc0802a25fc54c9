// SPDX-License-Identifier: CEPL-1.0
//! Ordered drawables. A model's index is its ID and its offset in the
//! per-slot uniform and descriptor rings.

use ember_math::glam::{Mat4, Vec3};
use ember_math::{aspect_ratio, perspective_flipped, Camera, Transform};
use ember_render::UniformBlock;

use crate::mesh::GpuMesh;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub usize);

#[derive(Debug)]
pub struct Drawable<M = GpuMesh> {
    pub mesh: M,
    pub initial: Transform,
    pub current: Transform,
    /// Radians per second about each axis.
    pub spin: Vec3,
}

impl<M> Drawable<M> {
    pub fn new(mesh: M, transform: Transform, spin: Vec3) -> Self {
        Self {
            mesh,
            initial: transform,
            current: transform,
            spin,
        }
    }

    pub fn update(&mut self, dt: f32) {
        if self.spin != Vec3::ZERO {
            self.current.rotate_euler(self.spin * dt * (180.0 / std::f32::consts::PI));
        }
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Projection parameters taken from settings and the current swapchain extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub width: u32,
    pub height: u32,
}

impl Projection {
    pub fn matrix(&self) -> Mat4 {
        perspective_flipped(
            self.fov_y_degrees.to_radians(),
            aspect_ratio(self.width, self.height),
            self.near,
            self.far,
        )
    }
}

pub fn uniform_for(transform: &Transform, camera: &Camera, projection: &Projection) -> UniformBlock {
    UniformBlock::new(transform.matrix(), camera.view_matrix(), projection.matrix())
}

#[derive(Debug)]
pub struct ModelRegistry<M = GpuMesh> {
    models: Vec<Drawable<M>>,
}

impl<M> Default for ModelRegistry<M> {
    fn default() -> Self {
        Self { models: Vec::new() }
    }
}

impl<M> ModelRegistry<M> {
    pub fn push(&mut self, model: Drawable<M>) -> ModelId {
        self.models.push(model);
        ModelId(self.models.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, id: ModelId) -> Option<&Drawable<M>> {
        self.models.get(id.0)
    }

    /// Draw order.
    pub fn iter(&self) -> impl Iterator<Item = (ModelId, &Drawable<M>)> {
        self.models.iter().enumerate().map(|(i, m)| (ModelId(i), m))
    }

    pub fn update(&mut self, dt: f32) {
        for m in &mut self.models {
            m.update(dt);
        }
    }

    pub fn reset_all(&mut self) {
        for m in &mut self.models {
            m.reset();
        }
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Drawable<M>> + '_ {
        self.models.drain(..)
    }
}

impl ModelRegistry<GpuMesh> {
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for m in self.drain() {
            m.mesh.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry<&'static str> {
        let mut r = ModelRegistry::default();
        r.push(Drawable::new(
            "torus",
            Transform::new(Vec3::ZERO, Vec3::new(180.0, 0.0, 0.0), Vec3::ONE),
            Vec3::new(1.0, 0.5, 0.0),
        ));
        r.push(Drawable::new(
            "sphere",
            Transform::new(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE),
            Vec3::ZERO,
        ));
        r
    }

    #[test]
    fn ids_follow_insertion_order() {
        let r = registry();
        let names: Vec<(usize, &str)> = r.iter().map(|(id, m)| (id.0, m.mesh)).collect();
        assert_eq!(names, vec![(0, "torus"), (1, "sphere")]);
        assert_eq!(r.get(ModelId(1)).map(|m| m.mesh), Some("sphere"));
        assert!(r.get(ModelId(2)).is_none());
    }

    #[test]
    fn spin_advances_and_reset_restores() {
        let mut r = registry();
        r.update(0.5);
        let torus = r.get(ModelId(0)).unwrap();
        let expected_x = (180.0 + 0.5f32.to_degrees()).rem_euclid(360.0);
        assert!((torus.current.rotation.x - expected_x).abs() < 1e-3);
        assert!((torus.current.rotation.y - 0.25f32.to_degrees()).abs() < 1e-3);
        assert_eq!(r.get(ModelId(1)).unwrap().current, r.get(ModelId(1)).unwrap().initial);

        r.reset_all();
        let torus = r.get(ModelId(0)).unwrap();
        assert_eq!(torus.current, torus.initial);
    }

    #[test]
    fn uniform_combines_model_camera_and_flipped_projection() {
        let t = Transform::new(Vec3::new(3.0, 0.0, 0.0), Vec3::ZERO, Vec3::ONE);
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Projection {
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            width: 800,
            height: 600,
        };
        let ubo = uniform_for(&t, &camera, &proj);
        assert_eq!(ubo.model, t.matrix().to_cols_array_2d());
        assert_eq!(ubo.view, camera.view_matrix().to_cols_array_2d());
        assert!(ubo.proj[1][1] < 0.0);
        assert!(ubo.proj[0][0] > 0.0);
        let ratio = ubo.proj[0][0] / -ubo.proj[1][1];
        assert!((ratio - 600.0 / 800.0).abs() < 1e-5);
    }
}

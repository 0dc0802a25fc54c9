// SPDX-License-Identifier: CEPL-1.0
use glam::{EulerRot, Mat4, Quat, Vec3};

/// Position, Euler rotation in degrees (applied X, then Y, then Z) and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new(position: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    pub fn rotate_euler(&mut self, delta_degrees: Vec3) {
        self.rotation = wrap_degrees(self.rotation + delta_degrees);
    }

    pub fn matrix(&self) -> Mat4 {
        let r = self.rotation;
        let q = Quat::from_euler(
            EulerRot::XYZ,
            r.x.to_radians(),
            r.y.to_radians(),
            r.z.to_radians(),
        );
        Mat4::from_scale_rotation_translation(self.scale, q, self.position)
    }
}

fn wrap_degrees(v: Vec3) -> Vec3 {
    Vec3::new(v.x.rem_euclid(360.0), v.y.rem_euclid(360.0), v.z.rem_euclid(360.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_by_default() {
        assert!(Transform::default().matrix().abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn matrix_applies_scale_then_rotation_then_translation() {
        let t = Transform::new(Vec3::new(3.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 90.0), Vec3::splat(2.0));
        let p = t.matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(3.0, 2.0, 0.0), 1e-5), "{p}");
    }

    #[test]
    fn rotation_wraps() {
        let mut t = Transform::default();
        t.rotate_euler(Vec3::new(350.0, -10.0, 0.0));
        t.rotate_euler(Vec3::new(20.0, 0.0, 0.0));
        assert!((t.rotation.x - 10.0).abs() < 1e-4);
        assert!((t.rotation.y - 350.0).abs() < 1e-4);
    }
}

// SPDX-License-Identifier: CEPL-1.0
use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};

/// 89 degrees. Keeps the look direction away from the up axis.
pub const DEFAULT_MAX_PITCH: f32 = 89.0 * std::f32::consts::PI / 180.0;

bitflags! {
    /// Movement requested for one frame, usually from held keys.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CameraMotion: u8 {
        const FORWARD  = 1 << 0;
        const BACKWARD = 1 << 1;
        const LEFT     = 1 << 2;
        const RIGHT    = 1 << 3;
    }
}

/// Free-look camera described by eye, center and a fixed up vector.
///
/// Moving changes `eye` (and `center` when strafing or walking); looking around
/// only changes `center`, which always stays one unit in front of `eye`
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    eye: Vec3,
    center: Vec3,
    up: Vec3,
    max_pitch: f32,
}

impl Camera {
    pub fn new(eye: Vec3, center: Vec3, up: Vec3) -> Self {
        Self {
            eye,
            center,
            up: up.normalize_or(Vec3::Y),
            max_pitch: DEFAULT_MAX_PITCH,
        }
    }

    /// Pitch limit in radians, measured from the horizontal plane.
    pub fn with_max_pitch(mut self, radians: f32) -> Self {
        self.max_pitch = radians.clamp(0.0, std::f32::consts::FRAC_PI_2);
        self
    }

    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn max_pitch(&self) -> f32 {
        self.max_pitch
    }

    pub fn look_direction(&self) -> Vec3 {
        (self.center - self.eye).normalize_or(Vec3::NEG_Z)
    }

    fn right_direction(&self) -> Vec3 {
        self.look_direction().cross(self.up).normalize_or_zero()
    }

    /// Moves the eye along the look direction. `center` is left in place.
    pub fn move_forward(&mut self, amount: f32) {
        self.eye += self.look_direction() * amount;
    }

    /// Strafes eye and center together.
    pub fn move_right(&mut self, amount: f32) {
        let delta = self.right_direction() * amount;
        self.eye += delta;
        self.center += delta;
    }

    pub fn apply_motion(&mut self, motion: CameraMotion, amount: f32) {
        if motion.contains(CameraMotion::FORWARD) {
            self.move_forward(amount);
        }
        if motion.contains(CameraMotion::BACKWARD) {
            self.move_forward(-amount);
        }
        if motion.contains(CameraMotion::RIGHT) {
            self.move_right(amount);
        }
        if motion.contains(CameraMotion::LEFT) {
            self.move_right(-amount);
        }
    }

    /// Yaw about `up`, then pitch about the camera's right axis. Offsets are in degrees.
    pub fn look_around(&mut self, yaw_degrees: f32, pitch_degrees: f32) {
        let before = self.look_direction();
        let right = self.right_direction();

        let mut dir = Quat::from_axis_angle(self.up, yaw_degrees.to_radians()) * before;
        if right != Vec3::ZERO {
            dir = Quat::from_axis_angle(right, pitch_degrees.to_radians()) * dir;
        }

        let dir = clamp_pitch(dir.normalize_or(before), before, self.max_pitch);
        self.center = self.eye + dir;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.center, self.up)
    }
}

/// Limits `|asin(dir.y)|` to `max_pitch`, keeping the horizontal heading.
fn clamp_pitch(dir: Vec3, previous: Vec3, max_pitch: f32) -> Vec3 {
    let pitch = dir.y.clamp(-1.0, 1.0).asin();
    if pitch.abs() <= max_pitch {
        return dir;
    }

    // Straight up or down has no heading of its own; borrow the previous one.
    let heading = Vec3::new(dir.x, 0.0, dir.z)
        .try_normalize()
        .or_else(|| Vec3::new(previous.x, 0.0, previous.z).try_normalize())
        .unwrap_or(Vec3::NEG_Z);

    let limited = max_pitch.copysign(pitch);
    heading * limited.cos() + Vec3::Y * limited.sin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    fn cam() -> Camera {
        Camera::new(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y)
    }

    #[test]
    fn pitch_never_exceeds_limit() {
        let mut c = cam();
        for _ in 0..10 {
            c.look_around(3.0, 40.0);
            let y = c.look_direction().y;
            assert!(y.asin().abs() <= c.max_pitch() + 1e-3, "pitch {}", y.asin());
        }
        for _ in 0..10 {
            c.look_around(-7.0, -75.0);
            let y = c.look_direction().y;
            assert!(y.asin().abs() <= c.max_pitch() + 1e-3, "pitch {}", y.asin());
        }
    }

    #[test]
    fn pitch_clamp_keeps_heading() {
        let limited = clamp_pitch(Vec3::new(0.0, 1.0, 0.0), Vec3::X, 0.5);
        assert!((limited.y - 0.5f32.sin()).abs() < 1e-5);
        assert!(limited.x > 0.0);
        assert!((limited.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn yaw_turns_about_up() {
        let mut c = cam();
        c.look_around(90.0, 0.0);
        assert!(approx(c.look_direction(), Vec3::NEG_X));
        assert!(approx(c.center(), Vec3::NEG_X));
    }

    #[test]
    fn strafe_moves_eye_and_center() {
        let mut c = cam();
        c.move_right(2.0);
        assert!(approx(c.eye(), Vec3::new(2.0, 0.0, 0.0)));
        assert!(approx(c.center(), Vec3::new(2.0, 0.0, -1.0)));
        assert!(approx(c.look_direction(), Vec3::NEG_Z));
    }

    #[test]
    fn forward_moves_only_eye() {
        let mut c = Camera::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -10.0), Vec3::Y);
        c.move_forward(1.5);
        assert!(approx(c.eye(), Vec3::new(0.0, 0.0, -1.5)));
        assert!(approx(c.center(), Vec3::new(0.0, 0.0, -10.0)));
    }

    #[test]
    fn opposite_motions_cancel() {
        let mut c = cam();
        c.apply_motion(CameraMotion::FORWARD | CameraMotion::BACKWARD, 1.0);
        assert!(approx(c.eye(), Vec3::ZERO));
        c.apply_motion(CameraMotion::LEFT, 1.0);
        assert!(approx(c.eye(), Vec3::NEG_X));
    }
}

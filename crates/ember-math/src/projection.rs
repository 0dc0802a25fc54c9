// SPDX-License-Identifier: CEPL-1.0
use glam::Mat4;

/// Right-handed perspective with `[0, 1]` depth and the Y scale negated, so
/// +Y in view space ends up at the top of a Vulkan framebuffer.
pub fn perspective_flipped(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(fov_y_radians, aspect, near, far);
    proj.y_axis.y = -proj.y_axis.y;
    proj
}

/// Width over height; a zero height is treated as one pixel.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    width as f32 / height.max(1) as f32
}

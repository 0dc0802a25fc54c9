// SPDX-License-Identifier: CEPL-1.0
//! Camera, transform and projection math shared by the app and the renderer.

mod camera;
mod projection;
mod transform;

pub use camera::{Camera, CameraMotion, DEFAULT_MAX_PITCH};
pub use glam;
pub use projection::{aspect_ratio, perspective_flipped};
pub use transform::Transform;

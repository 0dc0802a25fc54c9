// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SurfaceFormatPref {
    #[default]
    Bgra8Srgb,
    Bgra8Unorm,
    Rgba8Srgb,
    Rgba8Unorm,
}

/// Optional device gating on top of the hard requirements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceRequirements {
    pub discrete_gpu: bool,
    pub geometry_shader: bool,
}

/// Startup parameters of the GPU backend.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub app_name: String,
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub surface_format: SurfaceFormatPref,
    pub prefer_mailbox: bool,
    pub validation: bool,
    pub device: DeviceRequirements,
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// SPIR-V overrides for the built-in shaders.
    pub vertex_shader: Option<PathBuf>,
    pub fragment_shader: Option<PathBuf>,
    pub screenshot_dir: PathBuf,
    pub starting_stage: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            app_name: "ember".into(),
            frames_in_flight: 2,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            surface_format: SurfaceFormatPref::default(),
            prefer_mailbox: true,
            validation: cfg!(debug_assertions),
            device: DeviceRequirements::default(),
            fov_y: 45.0,
            near: 0.1,
            far: 100.0,
            vertex_shader: None,
            fragment_shader: None,
            screenshot_dir: PathBuf::from("Screencaps/Raw"),
            starting_stage: 0,
        }
    }
}

// SPDX-License-Identifier: CEPL-1.0
//! Types exchanged between the application, the asset loaders and the GPU backend.

mod error;
mod gpu_types;
pub mod mesh;
mod scene;
mod settings;
mod texture;

use ember_math::Camera;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub use error::{EngineError, Result};
pub use gpu_types::{PushConstants, ShadingStage, UniformBlock, Vertex};
pub use mesh::MeshData;
pub use scene::{MeshSource, ModelDesc, SceneDesc};
pub use settings::{DeviceRequirements, RenderSettings, SurfaceFormatPref};
pub use texture::TextureBlob;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports 0x0; nothing can be presented at that size.
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// What one call to [`Renderer::render`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame was submitted and queued for presentation.
    Presented,
    /// The swapchain was out of date at acquire time and has been rebuilt. Nothing was drawn.
    Recreated,
    /// The framebuffer is 0x0; rendering waits for a usable size.
    Suspended,
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        scene: &SceneDesc,
        camera: Camera,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Records the new framebuffer size. The swapchain is rebuilt on the next frame.
    fn resize(&mut self, size: RenderSize);
    fn render(&mut self) -> Result<FrameStatus>;
    /// Advances model animation by `dt` seconds; `elapsed` is wall-clock time
    /// since start and feeds the shaders.
    fn update(&mut self, dt: f32, elapsed: f32);

    fn camera_mut(&mut self) -> &mut Camera;
    fn set_stage(&mut self, stage: ShadingStage);
    fn request_screenshot(&mut self);
    fn reset_models(&mut self);
    fn set_clear_color(&mut self, rgba: [f32; 4]);
    fn frame_counter(&self) -> u64;
}

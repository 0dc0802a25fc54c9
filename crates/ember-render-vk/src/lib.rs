// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device and swapchain management, resource factories and
//! the multi-frame render loop.

pub mod buffer;
pub mod commands;
pub mod descriptors;
pub mod device;
pub mod engine;
pub mod frame;
pub mod image;
pub mod instance;
pub mod layout;
pub mod memory;
pub mod mesh;
pub mod mipmap;
pub mod models;
pub mod pipeline;
pub mod screenshot;
pub mod swapchain;
pub mod texture;
pub mod uniforms;

use ember_math::Camera;
use ember_render::{FrameStatus, RenderSettings, RenderSize, Renderer, Result, SceneDesc, ShadingStage};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use engine::Engine;
use frame::FrameScheduler;

pub struct VkRenderer {
    scheduler: FrameScheduler,
    engine: Engine,
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        scene: &SceneDesc,
        camera: Camera,
    ) -> Result<Self> {
        let engine = unsafe { Engine::new(window, display, size, settings, scene, camera)? };
        Ok(Self {
            scheduler: FrameScheduler::new(settings.frames_in_flight, size),
            engine,
        })
    }

    fn resize(&mut self, size: RenderSize) {
        self.scheduler.request_resize(size);
    }

    fn render(&mut self) -> Result<FrameStatus> {
        self.scheduler.draw_frame(&mut self.engine)
    }

    fn update(&mut self, dt: f32, elapsed: f32) {
        self.engine.update(dt, elapsed);
    }

    fn camera_mut(&mut self) -> &mut Camera {
        self.engine.camera_mut()
    }

    fn set_stage(&mut self, stage: ShadingStage) {
        self.engine.set_stage(stage);
    }

    fn request_screenshot(&mut self) {
        self.engine.request_screenshot();
    }

    fn reset_models(&mut self) {
        self.engine.reset_models();
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.engine.set_clear_color(rgba);
    }

    fn frame_counter(&self) -> u64 {
        self.scheduler.frame_counter()
    }
}

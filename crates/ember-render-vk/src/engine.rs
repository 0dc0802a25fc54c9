// SPDX-License-Identifier: CEPL-1.0
//! GPU state for one window and the Vulkan side of the frame loop.

use ash::vk;
use ember_math::Camera;
use ember_render::{
    EngineError, MeshData, PushConstants, RenderSettings, RenderSize, Result, SceneDesc, ShadingStage,
    TextureBlob,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{error, info};

use crate::descriptors::{self, DescriptorRing};
use crate::device::DeviceContext;
use crate::frame::{self, AcquireOutcome, FrameBackend, FrameInfo, FrameSync, PresentOutcome};
use crate::instance::InstanceContext;
use crate::mesh::GpuMesh;
use crate::models::{uniform_for, Drawable, ModelId, ModelRegistry, Projection};
use crate::pipeline::ShaderSet;
use crate::screenshot;
use crate::swapchain::SwapchainBundle;
use crate::texture::Texture;
use crate::uniforms::UniformRing;

pub struct Engine {
    inst: InstanceContext,
    ctx: DeviceContext,
    settings: RenderSettings,
    frames_in_flight: usize,
    shaders: ShaderSet,
    set_layout: vk::DescriptorSetLayout,
    bundle: SwapchainBundle,
    texture: Texture,
    models: ModelRegistry,
    uniforms: UniformRing,
    descriptors: DescriptorRing,
    frames: Vec<FrameSync>,
    camera: Camera,
    stage: ShadingStage,
    clear_color: [f32; 4],
    /// Wall-clock seconds since start, pushed to the shaders.
    time: f32,
    screenshot_requested: bool,
}

impl Engine {
    pub unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        scene: &SceneDesc,
        camera: Camera,
    ) -> Result<Self> {
        // Host-side assets first: a bad file fails before any GPU object exists.
        let shaders = ShaderSet::load(settings)?;
        let texture = scene.load_texture()?;
        let meshes = scene
            .models
            .iter()
            .map(|m| m.mesh.load())
            .collect::<Result<Vec<MeshData>>>()?;

        let mut inst = InstanceContext::new(window, display, settings)?;
        let ctx = match DeviceContext::new(&inst, settings.device) {
            Ok(ctx) => ctx,
            Err(e) => {
                inst.destroy();
                return Err(e);
            }
        };

        // From here on, Drop releases whatever init managed to build.
        let mut engine = Self {
            inst,
            ctx,
            settings: settings.clone(),
            frames_in_flight: settings.frames_in_flight.max(1),
            shaders,
            set_layout: vk::DescriptorSetLayout::null(),
            bundle: SwapchainBundle::default(),
            texture: Texture::default(),
            models: ModelRegistry::default(),
            uniforms: UniformRing::default(),
            descriptors: DescriptorRing::default(),
            frames: Vec::new(),
            camera,
            stage: ShadingStage::wrapped(settings.starting_stage),
            clear_color: settings.clear_color,
            time: 0.0,
            screenshot_requested: false,
        };
        engine.init(size, scene, &texture, &meshes)?;
        info!(
            "engine ready: {} models, {} frames in flight",
            engine.models.len(),
            engine.frames_in_flight
        );
        Ok(engine)
    }

    // STRICT ORDER:
    // 1) set layout (pipeline layout needs it)
    // 2) swapchain bundle: views, color, depth, render pass, pipeline, framebuffers
    // 3) texture, then meshes (one-shot uploads on the graphics queue)
    // 4) uniform ring, then descriptor sets pointing into it and at the texture
    // 5) per-slot command buffers and sync objects
    unsafe fn init(
        &mut self,
        size: RenderSize,
        scene: &SceneDesc,
        texture: &TextureBlob,
        meshes: &[MeshData],
    ) -> Result<()> {
        self.set_layout = descriptors::create_set_layout(&self.ctx.device)?;
        self.bundle = self.build_bundle(size)?;
        self.texture = Texture::upload(&self.ctx, texture)?;
        for (desc, mesh) in scene.models.iter().zip(meshes) {
            let gpu = GpuMesh::upload(&self.ctx, mesh)?;
            self.models.push(Drawable::new(gpu, desc.transform, desc.spin));
        }
        self.build_frame_resources()?;
        frame::create_frame_ring(
            &self.ctx.device,
            self.ctx.cmd_pool,
            self.frames_in_flight,
            &mut self.frames,
        )
    }

    unsafe fn build_bundle(&self, size: RenderSize) -> Result<SwapchainBundle> {
        SwapchainBundle::new(
            &self.ctx,
            &self.inst.surface_loader,
            self.inst.surface,
            size,
            &self.settings,
            self.set_layout,
            &self.shaders,
        )
    }

    /// Uniform ring and descriptor sets; both sized `frames_in_flight * models`.
    unsafe fn build_frame_resources(&mut self) -> Result<()> {
        self.uniforms = UniformRing::new(&self.ctx, self.frames_in_flight, self.models.len())?;
        self.descriptors = DescriptorRing::new(
            &self.ctx.device,
            self.set_layout,
            self.frames_in_flight,
            self.models.len(),
            &self.uniforms,
            self.texture.binding(),
        )?;
        Ok(())
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn set_stage(&mut self, stage: ShadingStage) {
        self.stage = ShadingStage::wrapped(stage.0);
        info!("shading stage {}", self.stage.0);
    }

    pub fn request_screenshot(&mut self) {
        self.screenshot_requested = true;
    }

    pub fn reset_models(&mut self) {
        self.models.reset_all();
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    pub fn update(&mut self, dt: f32, elapsed: f32) {
        self.time = elapsed;
        self.models.update(dt);
    }

    fn projection(&self) -> Projection {
        Projection {
            fov_y_degrees: self.settings.fov_y,
            near: self.settings.near,
            far: self.settings.far,
            width: self.bundle.extent.width,
            height: self.bundle.extent.height,
        }
    }

    unsafe fn record_commands(&self, frame: &FrameInfo) -> Result<()> {
        let d = &self.ctx.device;
        let cmd = self.frames[frame.slot].cmd;
        let extent = self.bundle.extent;
        let layout = self.bundle.pipeline.layout;

        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            ..Default::default()
        };
        d.begin_command_buffer(cmd, &begin)
            .map_err(EngineError::CommandRecording)?;

        let clear = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.bundle.render_pass,
            framebuffer: self.bundle.framebuffers[frame.image_index as usize],
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_value_count: clear.len() as u32,
            p_clear_values: clear.as_ptr(),
            ..Default::default()
        };
        d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
        d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.bundle.pipeline.pipeline);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        d.cmd_set_viewport(cmd, 0, &[viewport]);
        d.cmd_set_scissor(cmd, 0, &[scissor]);

        let push = PushConstants::new(
            self.camera.eye(),
            self.camera.center(),
            self.camera.up(),
            self.stage,
            self.time,
        );
        d.cmd_push_constants(
            cmd,
            layout,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            0,
            bytemuck::bytes_of(&push),
        );

        for (id, model) in self.models.iter() {
            d.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[self.descriptors.set(frame.slot, id.0)],
                &[],
            );
            model.mesh.draw(d, cmd);
        }

        d.cmd_end_render_pass(cmd);
        d.end_command_buffer(cmd)
            .map_err(EngineError::CommandRecording)
    }

    /// Waits for this frame's work, then copies its image out.
    unsafe fn capture(&self, frame: &FrameInfo) -> Result<()> {
        self.ctx
            .device
            .wait_for_fences(&[self.frames[frame.slot].in_flight], true, u64::MAX)
            .map_err(EngineError::FenceWait)?;
        screenshot::capture(
            &self.ctx,
            self.bundle.images[frame.image_index as usize],
            self.bundle.surface_format.format,
            self.bundle.extent,
            &self.settings.screenshot_dir,
            frame.frame,
        )?;
        Ok(())
    }
}

impl FrameBackend for Engine {
    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        unsafe {
            self.ctx
                .device
                .wait_for_fences(&[self.frames[slot].in_flight], true, u64::MAX)
        }
        .map_err(EngineError::FenceWait)
    }

    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let acquired = unsafe {
            self.ctx.swapchain_loader.acquire_next_image(
                self.bundle.swapchain,
                u64::MAX,
                self.frames[slot].image_available,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(EngineError::Acquire(e)),
        }
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let sync = self.frames[slot];
        unsafe {
            self.ctx
                .device
                .reset_fences(&[sync.in_flight])
                .map_err(EngineError::FenceWait)?;
            self.ctx
                .device
                .reset_command_buffer(sync.cmd, vk::CommandBufferResetFlags::empty())
                .map_err(EngineError::CommandRecording)
        }
    }

    fn model_count(&self) -> usize {
        self.models.len()
    }

    fn write_uniform(&mut self, ring: usize, model: usize) -> Result<()> {
        let projection = self.projection();
        if let Some(drawable) = self.models.get(ModelId(model)) {
            let block = uniform_for(&drawable.current, &self.camera, &projection);
            unsafe { self.uniforms.write(ring, &block) };
        }
        Ok(())
    }

    fn record(&mut self, frame: &FrameInfo) -> Result<()> {
        unsafe { self.record_commands(frame) }
    }

    fn submit(&mut self, frame: &FrameInfo) -> Result<()> {
        let sync = self.frames[frame.slot];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &sync.image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &sync.cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &sync.render_finished,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.graphics_queue, &[submit], sync.in_flight)
        }
        .map_err(EngineError::Submit)?;

        if self.screenshot_requested {
            self.screenshot_requested = false;
            // A failed capture costs the picture, not the session.
            if let Err(e) = unsafe { self.capture(frame) } {
                error!("screenshot failed: {e}");
            }
        }
        Ok(())
    }

    fn present(&mut self, frame: &FrameInfo) -> Result<PresentOutcome> {
        let sync = self.frames[frame.slot];
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &sync.render_finished,
            swapchain_count: 1,
            p_swapchains: &self.bundle.swapchain,
            p_image_indices: &frame.image_index,
            ..Default::default()
        };
        let presented = unsafe {
            self.ctx
                .swapchain_loader
                .queue_present(self.ctx.present_queue, &present)
        };
        match presented {
            Ok(false) => Ok(PresentOutcome::Optimal),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(EngineError::Present(e)),
        }
    }

    fn recreate(&mut self, size: RenderSize) -> Result<()> {
        unsafe {
            self.ctx.wait_idle()?;
            let d = &self.ctx.device;
            self.descriptors.destroy(d);
            self.uniforms.destroy(d);
            self.bundle.destroy(d, &self.ctx.swapchain_loader);

            self.bundle = self.build_bundle(size)?;
            self.build_frame_resources()?;
        }
        info!(
            "swapchain recreated: {}x{}",
            self.bundle.extent.width, self.bundle.extent.height
        );
        Ok(())
    }
}

// STRICT TEARDOWN ORDER:
// - device_wait_idle() so no submit still references anything below
// - per-slot syncs and command buffers BEFORE their pool
// - descriptor pool BEFORE the uniform buffers and texture it points at
// - swapchain bundle (framebuffers, pipeline, render pass, attachments, views) BEFORE device
// - set layout BEFORE device; device BEFORE surface; instance last
impl Drop for Engine {
    fn drop(&mut self) {
        unsafe {
            // 1) QUIESCE
            if let Err(e) = self.ctx.wait_idle() {
                error!("teardown: {e}");
            }
            let d = &self.ctx.device;

            // 2) PER-SLOT SYNC + COMMAND BUFFERS
            frame::destroy_frame_ring(d, self.ctx.cmd_pool, &mut self.frames);

            // 3) DESCRIPTORS, UNIFORMS, MESHES, TEXTURE
            self.descriptors.destroy(d);
            self.uniforms.destroy(d);
            self.models.destroy(d);
            self.texture.destroy(d);

            // 4) SWAPCHAIN BUNDLE
            self.bundle.destroy(d, &self.ctx.swapchain_loader);
            d.destroy_descriptor_set_layout(self.set_layout, None);

            // 5) DEVICE, THEN SURFACE + MESSENGER + INSTANCE
            self.ctx.destroy();
            self.inst.destroy();
        }
    }
}

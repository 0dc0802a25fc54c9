// SPDX-License-Identifier: CEPL-1.0
//! Frame pacing: acquire, record, submit and present over `F` rotating slots.
//!
//! [`FrameScheduler`] owns the slot index and frame counter and drives any
//! [`FrameBackend`]. The Vulkan engine is one backend; tests use an in-memory one.

use ash::vk;
use ember_render::{EngineError, FrameStatus, RenderSize, Result};
use tracing::{debug, info};

use crate::commands;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Optimal,
    Suboptimal,
    OutOfDate,
}

/// The frame being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub slot: usize,
    pub image_index: u32,
    /// Frames presented before this one.
    pub frame: u64,
}

/// Offset of `(slot, model)` in the per-frame uniform and descriptor rings.
pub fn ring_index(slot: usize, model: usize, model_count: usize) -> usize {
    slot * model_count + model
}

pub trait FrameBackend {
    /// Blocks until the slot's in-flight fence is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;
    fn acquire(&mut self, slot: usize) -> Result<AcquireOutcome>;
    /// Unsignals the slot's fence and resets its command buffer.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;
    fn model_count(&self) -> usize;
    /// Writes model `model`'s uniform block into ring entry `ring`.
    fn write_uniform(&mut self, ring: usize, model: usize) -> Result<()>;
    fn record(&mut self, frame: &FrameInfo) -> Result<()>;
    fn submit(&mut self, frame: &FrameInfo) -> Result<()>;
    fn present(&mut self, frame: &FrameInfo) -> Result<PresentOutcome>;
    /// Rebuilds everything that depends on the surface size.
    fn recreate(&mut self, size: RenderSize) -> Result<()>;
}

#[derive(Debug)]
pub struct FrameScheduler {
    frames_in_flight: usize,
    slot: usize,
    frame_counter: u64,
    resize_requested: bool,
    surface_size: RenderSize,
    awaiting_surface: bool,
}

impl FrameScheduler {
    pub fn new(frames_in_flight: usize, size: RenderSize) -> Self {
        Self {
            frames_in_flight: frames_in_flight.max(1),
            slot: 0,
            frame_counter: 0,
            resize_requested: false,
            surface_size: size,
            awaiting_surface: false,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Called by the window system on every framebuffer size change.
    pub fn request_resize(&mut self, size: RenderSize) {
        self.surface_size = size;
        self.resize_requested = true;
    }

    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> Result<FrameStatus> {
        if self.awaiting_surface {
            if self.surface_size.is_zero() {
                return Ok(FrameStatus::Suspended);
            }
            self.recreate(backend)?;
        }

        let slot = self.slot;
        backend.wait_for_slot(slot)?;

        let (image_index, acquired_suboptimal) = match backend.acquire(slot)? {
            AcquireOutcome::Image { index, suboptimal } => (index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("acquire: out of date");
                self.recreate(backend)?;
                return Ok(if self.awaiting_surface {
                    FrameStatus::Suspended
                } else {
                    FrameStatus::Recreated
                });
            }
        };

        // The fence is only reset once work for this slot is certain to be submitted.
        backend.reset_slot(slot)?;

        let models = backend.model_count();
        for model in 0..models {
            backend.write_uniform(ring_index(slot, model, models), model)?;
        }

        let frame = FrameInfo {
            slot,
            image_index,
            frame: self.frame_counter,
        };
        backend.record(&frame)?;
        backend.submit(&frame)?;
        let presented = backend.present(&frame)?;

        if presented != PresentOutcome::Optimal || acquired_suboptimal || self.resize_requested {
            debug!(
                "present: {presented:?}, acquired suboptimal {acquired_suboptimal}, resize {}",
                self.resize_requested
            );
            self.recreate(backend)?;
        }

        self.slot = (slot + 1) % self.frames_in_flight;
        self.frame_counter += 1;
        Ok(FrameStatus::Presented)
    }

    /// Rebuilds at the current size, or parks until the window has a usable size.
    fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> Result<()> {
        self.resize_requested = false;
        if self.surface_size.is_zero() {
            if !self.awaiting_surface {
                info!("framebuffer is 0x0, waiting for a usable size");
            }
            self.awaiting_surface = true;
            return Ok(());
        }
        backend.recreate(self.surface_size)?;
        self.awaiting_surface = false;
        Ok(())
    }
}

/// Per-slot command buffer and synchronization.
#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    pub cmd: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    /// Created signaled so the first wait on every slot returns at once.
    pub in_flight: vk::Fence,
}

/// Allocates one [`FrameSync`] per slot. On failure, whatever was created is
/// left in `out` for the caller to destroy.
pub unsafe fn create_frame_ring(
    device: &ash::Device,
    pool: vk::CommandPool,
    frames: usize,
    out: &mut Vec<FrameSync>,
) -> Result<()> {
    let cmds = commands::allocate_primary(device, pool, frames as u32)?;
    let sem_info = vk::SemaphoreCreateInfo {
        s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
        ..Default::default()
    };
    let fence_info = vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    };

    for cmd in cmds {
        let mut sync = FrameSync {
            cmd,
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
        };
        let created = (|| {
            sync.image_available = device.create_semaphore(&sem_info, None)?;
            sync.render_finished = device.create_semaphore(&sem_info, None)?;
            sync.in_flight = device.create_fence(&fence_info, None)?;
            Ok::<(), vk::Result>(())
        })();
        out.push(sync);
        created.map_err(EngineError::SyncObjectCreation)?;
    }
    Ok(())
}

pub unsafe fn destroy_frame_ring(device: &ash::Device, pool: vk::CommandPool, ring: &mut Vec<FrameSync>) {
    for f in ring.drain(..) {
        device.destroy_semaphore(f.image_available, None);
        device.destroy_semaphore(f.render_finished, None);
        device.destroy_fence(f.in_flight, None);
        device.free_command_buffers(pool, &[f.cmd]);
    }
}

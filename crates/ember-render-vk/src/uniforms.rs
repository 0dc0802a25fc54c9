// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use ember_render::{Result, UniformBlock};

use crate::buffer::GpuBuffer;
use crate::device::DeviceContext;

/// One persistently mapped uniform buffer per (slot, model), laid out slot-major.
#[derive(Debug, Default)]
pub struct UniformRing {
    buffers: Vec<GpuBuffer>,
}

impl UniformRing {
    pub unsafe fn new(ctx: &DeviceContext, frames: usize, models: usize) -> Result<Self> {
        let mut ring = Self {
            buffers: Vec::with_capacity(frames * models),
        };
        for _ in 0..frames * models {
            match GpuBuffer::new_mapped(ctx, UniformBlock::SIZE, vk::BufferUsageFlags::UNIFORM_BUFFER) {
                Ok(buf) => ring.buffers.push(buf),
                Err(e) => {
                    ring.destroy(&ctx.device);
                    return Err(e);
                }
            }
        }
        Ok(ring)
    }

    pub fn buffer(&self, ring: usize) -> vk::Buffer {
        self.buffers[ring].buffer
    }

    /// Only the entry owned by the slot being recorded may be written.
    pub unsafe fn write(&self, ring: usize, block: &UniformBlock) {
        self.buffers[ring].write(0, std::slice::from_ref(block));
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for buf in self.buffers.drain(..) {
            buf.destroy(device);
        }
    }
}

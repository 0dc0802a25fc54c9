// SPDX-License-Identifier: CEPL-1.0
use std::ptr::NonNull;

use ash::vk;
use bytemuck::Pod;
use ember_render::{EngineError, Result};

use crate::device::DeviceContext;
use crate::memory;

/// A buffer bound to its own allocation at offset 0.
///
/// Host-visible buffers created with [`GpuBuffer::new_mapped`] stay mapped
/// until [`GpuBuffer::destroy`].
#[derive(Debug, Default)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    mapped: Option<NonNull<u8>>,
}

impl GpuBuffer {
    pub unsafe fn new(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let d = &ctx.device;
        let info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = d
            .create_buffer(&info, None)
            .map_err(EngineError::BufferCreation)?;

        let reqs = d.get_buffer_memory_requirements(buffer);
        let memory = match memory::allocate(d, &ctx.memory_props, reqs, properties) {
            Ok(m) => m,
            Err(e) => {
                d.destroy_buffer(buffer, None);
                return Err(e);
            }
        };
        if let Err(e) = d.bind_buffer_memory(buffer, memory, 0) {
            d.destroy_buffer(buffer, None);
            d.free_memory(memory, None);
            return Err(EngineError::MemoryAllocation(e));
        }

        Ok(Self {
            buffer,
            memory,
            size,
            mapped: None,
        })
    }

    /// Host-visible, coherent and persistently mapped.
    pub unsafe fn new_mapped(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        let mut buf = Self::new(
            ctx,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        match ctx
            .device
            .map_memory(buf.memory, 0, size, vk::MemoryMapFlags::empty())
        {
            Ok(ptr) => buf.mapped = NonNull::new(ptr.cast::<u8>()),
            Err(e) => {
                buf.destroy(&ctx.device);
                return Err(EngineError::MemoryMap(e));
            }
        }
        Ok(buf)
    }

    /// Device-local buffer filled from `bytes` through a temporary staging buffer.
    pub unsafe fn new_device_local(
        ctx: &DeviceContext,
        usage: vk::BufferUsageFlags,
        bytes: &[u8],
    ) -> Result<Self> {
        let size = bytes.len() as vk::DeviceSize;
        let staging = Self::new_mapped(ctx, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        staging.write(0, bytes);

        let result = Self::new(
            ctx,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .and_then(|dst| match copy_buffer(ctx, staging.buffer, dst.buffer, size) {
            Ok(()) => Ok(dst),
            Err(e) => {
                dst.destroy(&ctx.device);
                Err(e)
            }
        });
        staging.destroy(&ctx.device);
        result
    }

    /// Copies `data` to byte `offset` of the mapping. No-op on unmapped buffers.
    pub unsafe fn write<T: Pod>(&self, offset: usize, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let Some(base) = self.mapped else { return };
        debug_assert!(offset + bytes.len() <= self.size as usize);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), base.as_ptr().add(offset), bytes.len());
    }

    /// The whole mapping, for reading back GPU writes after a wait.
    pub unsafe fn mapped_bytes(&self) -> Option<&[u8]> {
        self.mapped
            .map(|p| std::slice::from_raw_parts(p.as_ptr(), self.size as usize))
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        if self.mapped.is_some() {
            device.unmap_memory(self.memory);
        }
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
    }
}

pub unsafe fn copy_buffer(
    ctx: &DeviceContext,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    ctx.one_shot(|cmd| {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        ctx.device.cmd_copy_buffer(cmd, src, dst, &[region]);
        Ok(())
    })
}

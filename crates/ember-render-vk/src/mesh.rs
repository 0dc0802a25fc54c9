// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use ember_render::{MeshData, Result};

use crate::buffer::GpuBuffer;
use crate::device::DeviceContext;

/// Device-local vertex and index buffers for one mesh.
#[derive(Debug, Default)]
pub struct GpuMesh {
    pub vertices: GpuBuffer,
    pub indices: GpuBuffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub unsafe fn upload(ctx: &DeviceContext, mesh: &MeshData) -> Result<Self> {
        let vertices = GpuBuffer::new_device_local(
            ctx,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let indices = match GpuBuffer::new_device_local(
            ctx,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&mesh.indices),
        ) {
            Ok(b) => b,
            Err(e) => {
                vertices.destroy(&ctx.device);
                return Err(e);
            }
        };
        Ok(Self {
            vertices,
            indices,
            index_count: mesh.index_count(),
        })
    }

    pub unsafe fn draw(&self, device: &ash::Device, cmd: vk::CommandBuffer) {
        device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertices.buffer], &[0]);
        device.cmd_bind_index_buffer(cmd, self.indices.buffer, 0, vk::IndexType::UINT32);
        device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        self.indices.destroy(device);
        self.vertices.destroy(device);
    }
}

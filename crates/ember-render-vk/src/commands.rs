// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use ember_render::{EngineError, Result};

pub unsafe fn create_command_pool(device: &ash::Device, queue_family: u32) -> Result<vk::CommandPool> {
    let info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        queue_family_index: queue_family,
        ..Default::default()
    };
    device
        .create_command_pool(&info, None)
        .map_err(EngineError::CommandPoolCreation)
}

pub unsafe fn allocate_primary(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>> {
    let info = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: count,
        ..Default::default()
    };
    device
        .allocate_command_buffers(&info)
        .map_err(EngineError::CommandBufferAllocation)
}

/// Records `record` into a throwaway command buffer, submits it on `queue`
/// and blocks until the queue is idle.
pub unsafe fn one_shot<F>(
    device: &ash::Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    record: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer) -> Result<()>,
{
    let cmd = allocate_primary(device, pool, 1)?[0];
    let result = record_and_wait(device, queue, cmd, record);
    device.free_command_buffers(pool, &[cmd]);
    result
}

unsafe fn record_and_wait<F>(
    device: &ash::Device,
    queue: vk::Queue,
    cmd: vk::CommandBuffer,
    record: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer) -> Result<()>,
{
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .map_err(EngineError::CommandRecording)?;
    record(cmd)?;
    device
        .end_command_buffer(cmd)
        .map_err(EngineError::CommandRecording)?;

    let submit = vk::SubmitInfo {
        s_type: vk::StructureType::SUBMIT_INFO,
        command_buffer_count: 1,
        p_command_buffers: &cmd,
        ..Default::default()
    };
    device
        .queue_submit(queue, std::slice::from_ref(&submit), vk::Fence::null())
        .map_err(EngineError::Submit)?;
    device.queue_wait_idle(queue).map_err(EngineError::DeviceWait)
}

// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Everything that can go wrong while bringing the engine up or drawing a frame.
///
/// Swapchain invalidation (out of date, suboptimal, resize) is not an error: the
/// frame scheduler handles it by rebuilding the swapchain.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("instance creation failed: {0}")]
    InstanceCreation(String),
    #[error("validation layer {0} requested but not available")]
    NoValidationLayers(String),
    #[error("required extension {0} is not supported")]
    RequiredExtensionMissing(String),
    #[error("window handle unavailable: {0}")]
    WindowHandle(String),

    #[error("no physical device satisfies the renderer's requirements")]
    NoSuitableDevice,
    #[error("graphics and presentation queue families could not both be resolved")]
    QueueFamilyIncomplete,
    #[error("physical device query failed: {0}")]
    DeviceQuery(vk::Result),
    #[error("logical device creation failed: {0}")]
    LogicalDeviceCreation(vk::Result),
    #[error("surface creation failed: {0}")]
    SurfaceCreation(vk::Result),

    #[error("swapchain creation failed: {0}")]
    SwapchainCreation(vk::Result),
    #[error("no depth format supports optimal-tiling depth/stencil attachments")]
    NoDepthFormat,
    #[error("surface reports no formats")]
    NoSurfaceFormats,
    #[error("surface reports no present modes")]
    NoPresentModes,

    #[error("image creation failed: {0}")]
    ImageCreation(vk::Result),
    #[error("image view creation failed: {0}")]
    ImageViewCreation(vk::Result),
    #[error("buffer creation failed: {0}")]
    BufferCreation(vk::Result),
    #[error("memory allocation failed: {0}")]
    MemoryAllocation(vk::Result),
    #[error("memory map failed: {0}")]
    MemoryMap(vk::Result),
    #[error("no memory type in mask {type_bits:#x} has properties {required:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    #[error("shader {name}: {reason}")]
    ShaderLoad { name: String, reason: String },
    #[error("pipeline layout creation failed: {0}")]
    PipelineLayoutCreation(vk::Result),
    #[error("graphics pipeline creation failed: {0}")]
    PipelineCreation(vk::Result),
    #[error("render pass creation failed: {0}")]
    RenderPassCreation(vk::Result),
    #[error("framebuffer creation failed: {0}")]
    FramebufferCreation(vk::Result),
    #[error("sampler creation failed: {0}")]
    SamplerCreation(vk::Result),

    #[error("command pool creation failed: {0}")]
    CommandPoolCreation(vk::Result),
    #[error("command buffer allocation failed: {0}")]
    CommandBufferAllocation(vk::Result),
    #[error("command buffer recording failed: {0}")]
    CommandRecording(vk::Result),
    #[error("semaphore or fence creation failed: {0}")]
    SyncObjectCreation(vk::Result),

    #[error("descriptor set layout creation failed: {0}")]
    DescriptorLayoutCreation(vk::Result),
    #[error("descriptor pool creation failed: {0}")]
    DescriptorPoolCreation(vk::Result),
    #[error("descriptor pool exhausted: {0}")]
    DescriptorAllocationExhausted(vk::Result),

    #[error("unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
    #[error("format {0:?} does not support linear blit filtering")]
    LinearBlitUnsupported(vk::Format),
    #[error("texture file {} not found", .0.display())]
    TextureFileMissing(PathBuf),
    #[error("texture decode failed: {0}")]
    TextureDecode(String),
    #[error("mesh {name}: {reason}")]
    MeshLoad { name: String, reason: String },

    #[error("fence wait failed: {0}")]
    FenceWait(vk::Result),
    #[error("swapchain image acquisition failed: {0}")]
    Acquire(vk::Result),
    #[error("queue submission failed: {0}")]
    Submit(vk::Result),
    #[error("presentation failed: {0}")]
    Present(vk::Result),
    #[error("device idle wait failed: {0}")]
    DeviceWait(vk::Result),

    #[error("screenshot: {0}")]
    Screenshot(#[from] std::io::Error),
    #[error("screenshot: swapchain format {0:?} is not 8-bit RGBA or BGRA")]
    ScreenshotFormat(vk::Format),
}

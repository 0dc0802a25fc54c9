// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use ember_render::{EngineError, Result};

use crate::device::DeviceContext;
use crate::memory;

#[derive(Debug, Clone, Copy)]
pub struct ImageSpec {
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub properties: vk::MemoryPropertyFlags,
}

impl ImageSpec {
    /// 2D, one layer, exclusive, starting in `UNDEFINED`.
    pub fn create_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            extent: vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            },
            mip_levels: self.mip_levels,
            array_layers: 1,
            format: self.format,
            tiling: self.tiling,
            initial_layout: vk::ImageLayout::UNDEFINED,
            usage: self.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            samples: self.samples,
            ..Default::default()
        }
    }
}

/// Image, its dedicated memory and one view over every mip level.
///
/// The default value holds null handles and is safe to destroy.
#[derive(Debug, Default)]
pub struct GpuImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
}

impl GpuImage {
    pub unsafe fn new(ctx: &DeviceContext, spec: &ImageSpec, aspect: vk::ImageAspectFlags) -> Result<Self> {
        let (image, memory) = create_image(ctx, spec)?;
        let view = match create_image_view(&ctx.device, image, spec.format, aspect, spec.mip_levels) {
            Ok(v) => v,
            Err(e) => {
                ctx.device.destroy_image(image, None);
                ctx.device.free_memory(memory, None);
                return Err(e);
            }
        };
        Ok(Self {
            image,
            memory,
            view,
            format: spec.format,
            extent: spec.extent,
            mip_levels: spec.mip_levels,
            samples: spec.samples,
        })
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_image_view(self.view, None);
        device.destroy_image(self.image, None);
        device.free_memory(self.memory, None);
    }
}

pub unsafe fn create_image(ctx: &DeviceContext, spec: &ImageSpec) -> Result<(vk::Image, vk::DeviceMemory)> {
    let d = &ctx.device;
    let image = d
        .create_image(&spec.create_info(), None)
        .map_err(EngineError::ImageCreation)?;

    let reqs = d.get_image_memory_requirements(image);
    let memory = match memory::allocate(d, &ctx.memory_props, reqs, spec.properties) {
        Ok(m) => m,
        Err(e) => {
            d.destroy_image(image, None);
            return Err(e);
        }
    };
    if let Err(e) = d.bind_image_memory(image, memory, 0) {
        d.destroy_image(image, None);
        d.free_memory(memory, None);
        return Err(EngineError::MemoryAllocation(e));
    }
    Ok((image, memory))
}

pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    device
        .create_image_view(&info, None)
        .map_err(EngineError::ImageViewCreation)
}

/// Tightly packed copy into mip 0. The image must be in `TRANSFER_DST_OPTIMAL`.
pub unsafe fn copy_buffer_to_image(
    ctx: &DeviceContext,
    buffer: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) -> Result<()> {
    ctx.one_shot(|cmd| {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: color_layer(0),
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };
        ctx.device.cmd_copy_buffer_to_image(
            cmd,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        Ok(())
    })
}

pub fn color_layer(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_info_is_single_layer_exclusive_2d() {
        let spec = ImageSpec {
            extent: vk::Extent2D { width: 64, height: 32 },
            mip_levels: 7,
            samples: vk::SampleCountFlags::TYPE_4,
            format: vk::Format::R8G8B8A8_SRGB,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::SAMPLED,
            properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        };
        let info = spec.create_info();
        assert_eq!(info.image_type, vk::ImageType::TYPE_2D);
        assert_eq!(info.array_layers, 1);
        assert_eq!(info.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(info.extent.depth, 1);
        assert_eq!(info.mip_levels, 7);
        assert_eq!(info.samples, vk::SampleCountFlags::TYPE_4);
    }
}

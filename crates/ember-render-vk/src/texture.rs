// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use ember_render::{EngineError, Result, TextureBlob};
use tracing::info;

use crate::buffer::GpuBuffer;
use crate::descriptors::SampledImage;
use crate::device::DeviceContext;
use crate::image::{copy_buffer_to_image, GpuImage, ImageSpec};
use crate::{layout, mipmap};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// The scene's single sampled texture with a full mip chain.
#[derive(Debug, Default)]
pub struct Texture {
    pub image: GpuImage,
    pub sampler: vk::Sampler,
}

impl Texture {
    pub unsafe fn upload(ctx: &DeviceContext, blob: &TextureBlob) -> Result<Self> {
        let extent = vk::Extent2D {
            width: blob.width,
            height: blob.height,
        };
        let levels = mipmap::mip_level_count(blob.width, blob.height);

        let staging = GpuBuffer::new_mapped(
            ctx,
            blob.byte_len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        staging.write(0, &blob.pixels);

        let mut texture = Self::default();
        let result = texture.fill(ctx, &staging, extent, levels);
        staging.destroy(&ctx.device);
        if let Err(e) = result {
            texture.destroy(&ctx.device);
            return Err(e);
        }
        info!(
            "texture uploaded: {}x{}, {levels} mip levels",
            blob.width, blob.height
        );
        Ok(texture)
    }

    unsafe fn fill(
        &mut self,
        ctx: &DeviceContext,
        staging: &GpuBuffer,
        extent: vk::Extent2D,
        levels: u32,
    ) -> Result<()> {
        self.image = GpuImage::new(
            ctx,
            &ImageSpec {
                extent,
                mip_levels: levels,
                samples: vk::SampleCountFlags::TYPE_1,
                format: TEXTURE_FORMAT,
                tiling: vk::ImageTiling::OPTIMAL,
                // TRANSFER_SRC: each level is blitted from the previous one.
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
            vk::ImageAspectFlags::COLOR,
        )?;
        let image = self.image.image;
        layout::transition(
            ctx,
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            levels,
        )?;
        copy_buffer_to_image(ctx, staging.buffer, image, extent)?;
        mipmap::generate(ctx, image, TEXTURE_FORMAT, extent, levels)?;

        let info = sampler_info(ctx.properties.limits.max_sampler_anisotropy, levels);
        self.sampler = ctx
            .device
            .create_sampler(&info, None)
            .map_err(EngineError::SamplerCreation)?;
        Ok(())
    }

    pub fn binding(&self) -> SampledImage {
        SampledImage {
            view: self.image.view,
            sampler: self.sampler,
        }
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_sampler(self.sampler, None);
        self.image.destroy(device);
        *self = Self::default();
    }
}

pub fn sampler_info(max_anisotropy: f32, mip_levels: u32) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::REPEAT,
        address_mode_v: vk::SamplerAddressMode::REPEAT,
        address_mode_w: vk::SamplerAddressMode::REPEAT,
        mip_lod_bias: 0.0,
        anisotropy_enable: vk::TRUE,
        max_anisotropy,
        compare_enable: vk::FALSE,
        compare_op: vk::CompareOp::ALWAYS,
        min_lod: 0.0,
        max_lod: mip_levels as f32,
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        unnormalized_coordinates: vk::FALSE,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_reaches_the_smallest_mip() {
        let info = sampler_info(16.0, 9);
        assert_eq!(info.max_lod, 9.0);
        assert_eq!(info.max_anisotropy, 16.0);
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
    }
}

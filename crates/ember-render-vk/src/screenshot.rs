// SPDX-License-Identifier: CEPL-1.0
//! Copies a presented swapchain image to disk.
//!
//! File layout: width (u32 LE), height (u32 LE), then `width * height` RGBA8
//! pixels, rows top to bottom.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use ash::vk;
use ember_render::{EngineError, Result};
use tracing::info;

use crate::buffer::GpuBuffer;
use crate::device::DeviceContext;
use crate::image::color_layer;
use crate::layout;

pub fn encode_raw<W: Write>(width: u32, height: u32, rgba: &[u8], out: &mut W) -> io::Result<()> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{width}x{height} needs {expected} bytes, got {}", rgba.len()),
        ));
    }
    out.write_all(&width.to_le_bytes())?;
    out.write_all(&height.to_le_bytes())?;
    out.write_all(rgba)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgba,
    Bgra,
}

/// Only 4-byte 8-bit formats can be written in the raw layout.
pub fn channel_order(format: vk::Format) -> Result<ChannelOrder> {
    use ash::vk::Format as F;
    match format {
        F::R8G8B8A8_SRGB | F::R8G8B8A8_UNORM | F::R8G8B8A8_SNORM => Ok(ChannelOrder::Rgba),
        F::B8G8R8A8_SRGB | F::B8G8R8A8_UNORM | F::B8G8R8A8_SNORM => Ok(ChannelOrder::Bgra),
        other => Err(EngineError::ScreenshotFormat(other)),
    }
}

/// In-place BGRA8 to RGBA8.
pub fn swizzle_bgra(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

pub fn screenshot_path(dir: &Path, frame: u64) -> PathBuf {
    dir.join(format!("{frame}.bin"))
}

/// Reads back `image`, which must be idle and in `PRESENT_SRC_KHR`; the image
/// is returned to that layout. Nothing is copied for formats other than 8-bit
/// RGBA/BGRA.
pub unsafe fn capture(
    ctx: &DeviceContext,
    image: vk::Image,
    format: vk::Format,
    extent: vk::Extent2D,
    dir: &Path,
    frame: u64,
) -> Result<PathBuf> {
    let order = channel_order(format)?;
    let size = extent.width as vk::DeviceSize * extent.height as vk::DeviceSize * 4;
    let staging = GpuBuffer::new_mapped(ctx, size, vk::BufferUsageFlags::TRANSFER_DST)?;

    let result = copy_out(ctx, image, extent, &staging).and_then(|()| {
        let mut pixels = staging.mapped_bytes().map(<[u8]>::to_vec).unwrap_or_default();
        if order == ChannelOrder::Bgra {
            swizzle_bgra(&mut pixels);
        }
        fs::create_dir_all(dir)?;
        let path = screenshot_path(dir, frame);
        let mut out = BufWriter::new(fs::File::create(&path)?);
        encode_raw(extent.width, extent.height, &pixels, &mut out)?;
        out.flush()?;
        Ok(path)
    });
    staging.destroy(&ctx.device);

    let path = result?;
    info!("screenshot: {}", path.display());
    Ok(path)
}

unsafe fn copy_out(
    ctx: &DeviceContext,
    image: vk::Image,
    extent: vk::Extent2D,
    staging: &GpuBuffer,
) -> Result<()> {
    let d = &ctx.device;
    ctx.one_shot(|cmd| {
        layout::record_transition(
            d,
            cmd,
            image,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            1,
        )?;
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
        d.cmd_copy_image_to_buffer(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            staging.buffer,
            &[region],
        );
        layout::record_transition(
            d,
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            1,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_four_by_two() {
        let pixels: Vec<u8> = [0xff, 0x00, 0x00, 0xff].repeat(8);
        let mut out = Vec::new();
        encode_raw(4, 2, &pixels, &mut out).unwrap();
        assert_eq!(out.len(), 40);
        assert_eq!(&out[..8], &[4, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(&out[8..12], &[0xff, 0x00, 0x00, 0xff]);
    }

    #[test]
    fn short_pixel_buffer_is_rejected() {
        let mut out = Vec::new();
        let err = encode_raw(4, 2, &[0u8; 12], &mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(out.is_empty());
    }

    #[test]
    fn bgra_surfaces_are_swizzled() {
        let mut px = vec![0x00, 0x00, 0xff, 0xff, 0x10, 0x20, 0x30, 0x40];
        assert_eq!(channel_order(vk::Format::B8G8R8A8_SRGB).unwrap(), ChannelOrder::Bgra);
        assert_eq!(channel_order(vk::Format::R8G8B8A8_UNORM).unwrap(), ChannelOrder::Rgba);
        swizzle_bgra(&mut px);
        assert_eq!(px, vec![0xff, 0x00, 0x00, 0xff, 0x30, 0x20, 0x10, 0x40]);
    }

    #[test]
    fn wide_or_packed_formats_are_refused() {
        for format in [
            vk::Format::A2B10G10R10_UNORM_PACK32,
            vk::Format::R16G16B16A16_SFLOAT,
            vk::Format::B5G6R5_UNORM_PACK16,
        ] {
            assert!(matches!(
                channel_order(format),
                Err(EngineError::ScreenshotFormat(f)) if f == format
            ));
        }
    }

    #[test]
    fn files_are_named_by_frame() {
        assert_eq!(
            screenshot_path(Path::new("Screencaps/Raw"), 42),
            PathBuf::from("Screencaps/Raw/42.bin")
        );
    }
}
